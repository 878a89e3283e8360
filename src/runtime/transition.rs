//! Resolved state changes.

use super::collection::{CollectionOptions, TransitionCollection};
use super::error::Error;
use super::event::Event;
use super::machine::Machine;
use super::registry::MachineRegistry;
use crate::entity::Entity;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A resolved, about-to-execute change of one machine's attribute.
///
/// Identity is `(machine, attribute, event, from, to)`; the arguments and the
/// execution bookkeeping (`success`, `result`, `transient`) do not take part
/// in equality.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Transition {
    machine: String,
    attribute: String,
    event: String,
    qualified_event: String,
    event_human_name: String,
    from: Value,
    from_name: String,
    qualified_from_name: String,
    to: Value,
    to_name: String,
    qualified_to_name: String,
    #[serde(default)]
    args: Vec<Value>,
    #[serde(default)]
    transient: bool,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    success: bool,
}

impl Transition {
    /// Build a transition between two declared states.
    ///
    /// With `read_state` the from-value is taken from the entity as-is;
    /// otherwise the declared value of `from_name` is used.
    pub(crate) fn new<E: Entity>(
        machine: &Machine<E>,
        entity: &E,
        event: &Event<E>,
        from_name: &str,
        to_name: &str,
        read_state: bool,
    ) -> Result<Self, Error> {
        let from_state = machine.fetch_state(from_name)?;
        let to_state = machine.fetch_state(to_name)?;
        let from = if read_state {
            machine.read(entity)
        } else {
            from_state.value().clone()
        };

        Ok(Transition {
            machine: machine.name().to_string(),
            attribute: machine.attribute_name().to_string(),
            event: event.name().to_string(),
            qualified_event: machine.qualified_event_name(event.name()),
            event_human_name: event.human_name().to_string(),
            from,
            from_name: from_state.name().to_string(),
            qualified_from_name: machine.qualified_state_name(from_state.name()),
            to: to_state.value().clone(),
            to_name: to_state.name().to_string(),
            qualified_to_name: machine.qualified_state_name(to_state.name()),
            args: Vec::new(),
            transient: false,
            result: None,
            success: false,
        })
    }

    /// Name of the machine the transition belongs to.
    pub fn machine(&self) -> &str {
        &self.machine
    }

    /// Entity attribute written on persist.
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Event name as declared, without the machine namespace.
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Event name as fired through the registry, e.g. `enable_alarm`.
    pub fn qualified_event(&self) -> &str {
        &self.qualified_event
    }

    pub fn event_human_name(&self) -> &str {
        &self.event_human_name
    }

    /// Attribute value before the transition; restored on rollback.
    pub fn from(&self) -> &Value {
        &self.from
    }

    pub fn from_name(&self) -> &str {
        &self.from_name
    }

    /// From-state name prefixed with the machine namespace, if any.
    pub fn qualified_from_name(&self) -> &str {
        &self.qualified_from_name
    }

    /// Attribute value written when the transition persists.
    pub fn to(&self) -> &Value {
        &self.to
    }

    pub fn to_name(&self) -> &str {
        &self.to_name
    }

    pub fn qualified_to_name(&self) -> &str {
        &self.qualified_to_name
    }

    /// Arguments passed when the event was fired.
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn set_args(&mut self, args: Vec<Value>) {
        self.args = args;
    }

    /// Builder form of [`Transition::set_args`].
    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    /// Whether the transition exists only while a deferred action runs.
    pub fn is_transient(&self) -> bool {
        self.transient
    }

    pub fn set_transient(&mut self, transient: bool) {
        self.transient = transient;
    }

    /// A loopback transition stays in its state, though callbacks and the
    /// action still run.
    pub fn is_loopback(&self) -> bool {
        self.from_name == self.to_name
    }

    /// Whether the last execution of this transition succeeded.
    pub fn success(&self) -> bool {
        self.success
    }

    /// Value returned by the machine's action during the last execution.
    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub(crate) fn record_outcome(&mut self, success: bool, result: Option<Value>) {
        self.success = success;
        self.result = result;
    }

    /// JSON descriptor handed to named callback methods.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub(crate) fn persist<E: Entity>(&self, entity: &mut E) {
        entity.write(&self.attribute, self.to.clone());
    }

    pub(crate) fn rollback<E: Entity>(&self, entity: &mut E) {
        entity.write(&self.attribute, self.from.clone());
    }

    /// Execute this transition on its own, with `args` as the event arguments.
    ///
    /// Returns the success flag; the action's own return value is available
    /// through [`Transition::result`] afterwards.
    pub fn perform<E: Entity>(
        &mut self,
        entity: &mut E,
        registry: &MachineRegistry<E>,
        args: Vec<Value>,
        run_action: bool,
    ) -> Result<bool, Error> {
        self.args = args;
        let options = CollectionOptions {
            actions: run_action,
            ..CollectionOptions::default()
        };
        let mut collection = TransitionCollection::new(vec![self.clone()], options)?;
        let performed = collection.perform(entity, registry)?;
        if let Some(done) = collection.into_transitions().into_iter().next() {
            *self = done;
        }
        Ok(performed.success)
    }
}

impl PartialEq for Transition {
    fn eq(&self, other: &Self) -> bool {
        self.machine == other.machine
            && self.attribute == other.attribute
            && self.event == other.event
            && self.from == other.from
            && self.from_name == other.from_name
            && self.to == other.to
            && self.to_name == other.to_name
    }
}
