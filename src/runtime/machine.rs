//! Machine definitions.
//!
//! A [`Machine`] binds one entity attribute to a set of states, events,
//! callbacks and an optional action. Machines are built once and shared
//! read-only by the registry; everything that changes lives on the entity.

use super::callback::{AroundCallback, Callback, CallbackKind, Outcome, Terminator};
use super::error::{CallbackError, Error, Interrupt};
use super::event::{Event, Requirements};
use super::path::{PathCollection, PathOptions};
use super::registry::MachineRegistry;
use super::transition::Transition;
use crate::config::Config;
use crate::core::{ConfigurationError, State};
use crate::entity::Entity;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

type ActionFn<E> = Arc<dyn Fn(&mut E) -> Outcome + Send + Sync>;

/// Work run once the machine's transitions have been persisted, such as
/// saving the entity. Its return value decides the collection's success.
pub struct Action<E> {
    name: String,
    method: Option<ActionFn<E>>,
}

impl<E: Entity> Action<E> {
    /// An action running `method`. Actions with the same name on several
    /// machines run once per collection.
    pub fn new<F>(name: impl Into<String>, method: F) -> Self
    where
        F: Fn(&mut E) -> Outcome + Send + Sync + 'static,
    {
        Action {
            name: name.into(),
            method: Some(Arc::new(method)),
        }
    }

    /// An action dispatched by name through [`Entity::invoke`].
    pub fn named(name: impl Into<String>) -> Self {
        Action {
            name: name.into(),
            method: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn call(&self, entity: &mut E) -> Result<Value, Interrupt> {
        let outcome = match &self.method {
            Some(method) => method(entity),
            None => entity.invoke(&self.name, &[]).ok_or_else(|| {
                ConfigurationError::UnknownMethod {
                    method: self.name.clone(),
                }
            })?,
        };
        match outcome {
            Ok(value) => Ok(value),
            Err(CallbackError::Halt) => Err(Interrupt::Halt),
            Err(CallbackError::Failed(cause)) => Err(Error::Action {
                action: self.name.clone(),
                cause,
            }
            .into()),
        }
    }
}

/// A state machine over one attribute of `E`.
///
/// # Example
///
/// ```rust
/// use waypoint::core::{Branch, State};
/// use waypoint::runtime::{Event, Machine};
/// # use waypoint::Entity;
/// # use serde_json::Value;
/// # struct Vehicle;
/// # impl Entity for Vehicle {
/// #     fn read(&self, _: &str) -> Value { Value::Null }
/// #     fn write(&mut self, _: &str, _: Value) {}
/// # }
///
/// let machine: Machine<Vehicle> = Machine::new("state")
///     .state(State::new("parked").initial())
///     .event(
///         Event::new("ignite")
///             .transition(Branch::builder().from("parked").to("idling"))
///             .unwrap(),
///     );
///
/// // "idling" is declared implicitly by the ignite branch.
/// assert_eq!(machine.states().len(), 2);
/// assert_eq!(machine.initial_state().map(|s| s.name()), Some("parked"));
/// ```
pub struct Machine<E> {
    name: String,
    attribute: String,
    namespace: Option<String>,
    states: Vec<State>,
    events: Vec<Event<E>>,
    before: Vec<Callback<E>>,
    after: Vec<Callback<E>>,
    failure: Vec<Callback<E>>,
    action: Option<Action<E>>,
    deferred: bool,
    use_transactions: Option<bool>,
    terminator: Option<Terminator>,
}

impl<E: Entity> Machine<E> {
    /// A machine stored in the attribute of the same name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Machine {
            attribute: name.clone(),
            name,
            namespace: None,
            states: Vec::new(),
            events: Vec::new(),
            before: Vec::new(),
            after: Vec::new(),
            failure: Vec::new(),
            action: None,
            deferred: false,
            use_transactions: None,
            terminator: None,
        }
    }

    /// Store the state in `attribute` instead of the machine's name.
    pub fn attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = attribute.into();
        self
    }

    /// Qualify event names as `{event}_{namespace}` and state names as
    /// `{namespace}_{state}`.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Declare a state, replacing an implicit declaration of the same name.
    pub fn state(mut self, state: State) -> Self {
        match self.states.iter_mut().find(|s| s.name() == state.name()) {
            Some(existing) => *existing = state,
            None => self.states.push(state),
        }
        self
    }

    /// Add an event, declaring every state its branches name.
    pub fn event(mut self, event: Event<E>) -> Self {
        self.declare_states(event.known_states().to_vec());
        self.events.push(event);
        self
    }

    /// Attach a before, after or failure callback.
    pub fn callback(mut self, mut callback: Callback<E>) -> Self {
        self.declare_states(callback.known_states());
        if let Some(terminator) = &self.terminator {
            callback.set_default_terminator(Arc::clone(terminator));
        }
        match callback.kind() {
            CallbackKind::Before | CallbackKind::Around => self.before.push(callback),
            CallbackKind::After => self.after.push(callback),
            CallbackKind::Failure => self.failure.push(callback),
        }
        self
    }

    /// Attach an around callback. It shares the before list, so before and
    /// around callbacks run in declaration order.
    pub fn around(mut self, callback: AroundCallback<E>) -> Self {
        self.declare_states(callback.known_states());
        self.before.push(callback.into_callback());
        self
    }

    pub fn action(mut self, action: Action<E>) -> Self {
        self.action = Some(action);
        self
    }

    /// Defer the action: firing an event only caches the transition on the
    /// entity, and the transition runs when the action is performed.
    pub fn deferred(mut self) -> Self {
        self.deferred = true;
        self
    }

    /// Override [`Config::use_transactions`] for this machine.
    pub fn use_transactions(mut self, enabled: bool) -> Self {
        self.use_transactions = Some(enabled);
        self
    }

    /// Default terminator for callbacks that do not set their own.
    pub fn terminator<F>(mut self, terminator: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        let terminator: Terminator = Arc::new(terminator);
        for callback in self
            .before
            .iter_mut()
            .chain(self.after.iter_mut())
            .chain(self.failure.iter_mut())
            .filter(|c| !c.has_terminator())
        {
            callback.set_default_terminator(Arc::clone(&terminator));
        }
        self.terminator = Some(terminator);
        self
    }

    fn declare_states(&mut self, names: Vec<String>) {
        for name in names {
            if !self.has_state(&name) {
                self.states.push(State::new(name));
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attribute holding this machine's state on the entity.
    pub fn attribute_name(&self) -> &str {
        &self.attribute
    }

    pub fn namespace_name(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Declared states, in the order they were first named.
    pub fn states(&self) -> &[State] {
        &self.states
    }

    pub fn events(&self) -> &[Event<E>] {
        &self.events
    }

    /// Before and around callbacks, in declaration order.
    pub fn before_callbacks(&self) -> &[Callback<E>] {
        &self.before
    }

    pub fn after_callbacks(&self) -> &[Callback<E>] {
        &self.after
    }

    pub fn failure_callbacks(&self) -> &[Callback<E>] {
        &self.failure
    }

    pub fn action_ref(&self) -> Option<&Action<E>> {
        self.action.as_ref()
    }

    /// Name the machine's action is shared under.
    pub fn action_name(&self) -> Option<&str> {
        self.action.as_ref().map(Action::name)
    }

    pub fn is_deferred(&self) -> bool {
        self.deferred
    }

    /// Whether collections touching this machine run inside a transaction.
    pub fn uses_transactions(&self, config: &Config) -> bool {
        self.use_transactions.unwrap_or(config.use_transactions)
    }

    pub fn has_state(&self, name: &str) -> bool {
        self.states.iter().any(|s| s.name() == name)
    }

    /// Look up a declared state by name.
    pub fn fetch_state(&self, name: &str) -> Result<&State, ConfigurationError> {
        self.states
            .iter()
            .find(|s| s.name() == name)
            .ok_or_else(|| ConfigurationError::UndeclaredState {
                machine: self.name.clone(),
                state: name.to_string(),
            })
    }

    pub fn initial_state(&self) -> Option<&State> {
        self.states.iter().find(|s| s.is_initial())
    }

    /// Look up an event by plain or qualified name.
    pub fn event_named(&self, name: &str) -> Option<&Event<E>> {
        self.events
            .iter()
            .find(|e| e.name() == name || self.qualified_event_name(e.name()) == name)
    }

    /// Name `event` is fired under through the registry.
    ///
    /// # Example
    ///
    /// ```rust
    /// use waypoint::runtime::Machine;
    /// # use waypoint::Entity;
    /// # use serde_json::Value;
    /// # struct Vehicle;
    /// # impl Entity for Vehicle {
    /// #     fn read(&self, _: &str) -> Value { Value::Null }
    /// #     fn write(&mut self, _: &str, _: Value) {}
    /// # }
    ///
    /// let alarm: Machine<Vehicle> = Machine::new("alarm_state").namespace("alarm");
    /// assert_eq!(alarm.qualified_event_name("enable"), "enable_alarm");
    /// assert_eq!(alarm.qualified_state_name("active"), "alarm_active");
    /// ```
    pub fn qualified_event_name(&self, event: &str) -> String {
        match &self.namespace {
            Some(namespace) => format!("{event}_{namespace}"),
            None => event.to_string(),
        }
    }

    pub fn qualified_state_name(&self, state: &str) -> String {
        match &self.namespace {
            Some(namespace) => format!("{namespace}_{state}"),
            None => state.to_string(),
        }
    }

    /// Current raw attribute value.
    pub fn read(&self, entity: &E) -> Value {
        entity.read(&self.attribute)
    }

    pub fn write(&self, entity: &mut E, value: Value) {
        entity.write(&self.attribute, value);
    }

    /// The declared state matching the entity's attribute value.
    pub fn state_for(&self, entity: &E) -> Result<&State, Error> {
        let value = self.read(entity);
        self.states
            .iter()
            .find(|s| s.matches(&value))
            .ok_or_else(|| Error::UnknownValue {
                attribute: self.attribute.clone(),
                value,
            })
    }

    /// Write the initial state's value unless the attribute is already set.
    pub fn initialize_state(&self, entity: &mut E) {
        if let Some(initial) = self.initial_state() {
            if self.read(entity).is_null() {
                self.write(entity, initial.value().clone());
            }
        }
    }

    /// Events that have a transition from the entity's current state.
    pub fn events_valid_for(
        &self,
        entity: &E,
        registry: &MachineRegistry<E>,
        requirements: &Requirements,
    ) -> Result<Vec<&Event<E>>, Error> {
        let mut valid = Vec::new();
        for event in &self.events {
            if event.can_fire(self, registry, entity, requirements)? {
                valid.push(event);
            }
        }
        Ok(valid)
    }

    /// The transition each event would perform, in event declaration order.
    pub fn transitions_for(
        &self,
        entity: &E,
        registry: &MachineRegistry<E>,
        requirements: &Requirements,
    ) -> Result<Vec<Transition>, Error> {
        let mut transitions = Vec::new();
        for event in &self.events {
            if let Some(transition) = event.transition_for(self, registry, entity, requirements)? {
                transitions.push(transition);
            }
        }
        Ok(transitions)
    }

    pub fn paths_for(
        &self,
        entity: &E,
        registry: &MachineRegistry<E>,
        options: PathOptions,
    ) -> Result<PathCollection, Error> {
        PathCollection::new(entity, self, registry, options)
    }
}

impl<E> fmt::Debug for Machine<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Machine")
            .field("name", &self.name)
            .field("attribute", &self.attribute)
            .field("namespace", &self.namespace)
            .field("states", &self.states)
            .field("events", &self.events)
            .field("deferred", &self.deferred)
            .finish()
    }
}
