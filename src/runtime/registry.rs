//! The set of machines attached to one entity type.

use super::collection::{self, CollectionOptions, Performed, TransitionCollection};
use super::error::Error;
use super::event::{Event, Requirements};
use super::machine::Machine;
use super::path::{PathCollection, PathOptions};
use super::transition::Transition;
use crate::config::{Config, MessageKey};
use crate::core::{ConfigurationError, StateIndex};
use crate::entity::Entity;
use crate::integration::{Integration, Message, NoIntegration};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;
use tracing::debug;

/// Every machine of an entity type, with the shared configuration and
/// integration hooks.
///
/// Events are addressed by qualified name (`{event}_{namespace}` for
/// namespaced machines) and looked up across all machines.
///
/// # Example
///
/// ```rust
/// use waypoint::core::{Branch, State};
/// use waypoint::runtime::{Event, Machine, MachineRegistry};
/// use waypoint::{Config, Entity};
/// use serde_json::{json, Value};
///
/// struct Vehicle {
///     state: Value,
/// }
///
/// impl Entity for Vehicle {
///     fn read(&self, _attribute: &str) -> Value {
///         self.state.clone()
///     }
///
///     fn write(&mut self, _attribute: &str, value: Value) {
///         self.state = value;
///     }
/// }
///
/// let registry = MachineRegistry::new(Config::default()).register(
///     Machine::new("state")
///         .state(State::new("parked").initial())
///         .event(
///             Event::new("ignite")
///                 .transition(Branch::builder().from("parked").to("idling"))
///                 .unwrap(),
///         ),
/// );
///
/// let mut vehicle = Vehicle { state: Value::Null };
/// registry.initialize_states(&mut vehicle);
/// assert!(registry.fire(&mut vehicle, "ignite", vec![]).unwrap());
/// assert_eq!(vehicle.state, json!("idling"));
/// assert!(!registry.fire(&mut vehicle, "ignite", vec![]).unwrap());
/// ```
pub struct MachineRegistry<E> {
    machines: Vec<Arc<Machine<E>>>,
    config: Config,
    integration: Arc<dyn Integration<E>>,
}

impl<E: Entity> MachineRegistry<E> {
    pub fn new(config: Config) -> Self {
        MachineRegistry {
            machines: Vec::new(),
            config,
            integration: Arc::new(NoIntegration),
        }
    }

    pub fn with_integration(mut self, integration: impl Integration<E> + 'static) -> Self {
        self.integration = Arc::new(integration);
        self
    }

    pub fn register(mut self, machine: Machine<E>) -> Self {
        self.machines.push(Arc::new(machine));
        self
    }

    pub fn machines(&self) -> &[Arc<Machine<E>>] {
        &self.machines
    }

    pub fn machine(&self, name: &str) -> Option<&Arc<Machine<E>>> {
        self.machines.iter().find(|m| m.name() == name)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn integration(&self) -> &dyn Integration<E> {
        self.integration.as_ref()
    }

    /// Find an event by qualified name.
    pub fn find_event(&self, name: &str) -> Option<(&Arc<Machine<E>>, &Event<E>)> {
        self.machines
            .iter()
            .find_map(|machine| machine.event_named(name).map(|event| (machine, event)))
    }

    fn fetch_event(&self, name: &str) -> Result<(&Arc<Machine<E>>, &Event<E>), Error> {
        self.find_event(name).ok_or_else(|| Error::InvalidEvent {
            event: name.to_string(),
        })
    }

    fn fetch_machine(&self, name: &str) -> Result<&Arc<Machine<E>>, Error> {
        self.machine(name).ok_or_else(|| {
            ConfigurationError::UnknownMachine {
                machine: name.to_string(),
            }
            .into()
        })
    }

    /// Render the message for `key` and report it through the integration.
    pub fn invalidate(
        &self,
        entity: &mut E,
        attribute: &str,
        key: MessageKey,
        values: Vec<(String, String)>,
    ) {
        let message = Message {
            key,
            text: self.config.messages.render(key, &values),
            values,
        };
        self.integration.invalidate(entity, attribute, &message);
    }

    /// Write each machine's initial state where the attribute is unset.
    pub fn initialize_states(&self, entity: &mut E) {
        for machine in &self.machines {
            machine.initialize_state(entity);
        }
    }

    /// Name of the state `machine` is in.
    pub fn state_name(&self, entity: &E, machine: &str) -> Result<String, Error> {
        Ok(self
            .fetch_machine(machine)?
            .state_for(entity)?
            .name()
            .to_string())
    }

    pub fn can_fire(&self, entity: &E, event: &str) -> Result<bool, Error> {
        let (machine, event) = self.fetch_event(event)?;
        event.can_fire(machine, self, entity, &Requirements::default())
    }

    pub fn transition_for(
        &self,
        entity: &E,
        event: &str,
        requirements: &Requirements,
    ) -> Result<Option<Transition>, Error> {
        let (machine, event) = self.fetch_event(event)?;
        event.transition_for(machine, self, entity, requirements)
    }

    /// Events of `machine` that can fire from the entity's current state.
    pub fn events_for(&self, entity: &E, machine: &str) -> Result<Vec<String>, Error> {
        let machine = self.fetch_machine(machine)?;
        Ok(machine
            .events_valid_for(entity, self, &Requirements::default())?
            .into_iter()
            .map(|event| machine.qualified_event_name(event.name()))
            .collect())
    }

    pub fn transitions_for(
        &self,
        entity: &E,
        machine: &str,
        requirements: &Requirements,
    ) -> Result<Vec<Transition>, Error> {
        self.fetch_machine(machine)?
            .transitions_for(entity, self, requirements)
    }

    /// Fire `event`. Returns whether the transition succeeded; `Ok(false)`
    /// covers both "no transition available" and "halted or rolled back".
    pub fn fire(&self, entity: &mut E, event: &str, args: Vec<Value>) -> Result<bool, Error> {
        let (machine, event) = self.fetch_event(event)?;
        event.fire(machine, self, entity, args, true)
    }

    /// Fire `event` without running the machine's action.
    pub fn fire_without_action(
        &self,
        entity: &mut E,
        event: &str,
        args: Vec<Value>,
    ) -> Result<bool, Error> {
        let (machine, event) = self.fetch_event(event)?;
        event.fire(machine, self, entity, args, false)
    }

    /// Fire `event`, returning the performed transition with its success
    /// flag and action result. `None` means no transition was available.
    pub fn fire_transition(
        &self,
        entity: &mut E,
        event: &str,
        args: Vec<Value>,
    ) -> Result<Option<Transition>, Error> {
        let (machine, event) = self.fetch_event(event)?;
        event.fire_transition(machine, self, entity, args, true)
    }

    /// Fire `event`, turning `false` into [`Error::InvalidTransition`].
    pub fn fire_strict(&self, entity: &mut E, event: &str, args: Vec<Value>) -> Result<(), Error> {
        if self.fire(entity, event, args)? {
            return Ok(());
        }
        let (machine, event) = self.fetch_event(event)?;
        Err(self.invalid_transition(entity, machine, event))
    }

    pub(crate) fn invalid_transition(
        &self,
        entity: &E,
        machine: &Machine<E>,
        event: &Event<E>,
    ) -> Error {
        let from = machine
            .state_for(entity)
            .map(|state| state.name().to_string())
            .unwrap_or_else(|_| machine.read(entity).to_string());
        Error::InvalidTransition {
            machine: machine.name().to_string(),
            event: machine.qualified_event_name(event.name()),
            from,
            reason: self.integration.errors_for(entity),
        }
    }

    /// Fire several events as one atomic unit; each must belong to a
    /// different machine.
    ///
    /// Every event is resolved before anything runs. If any cannot
    /// transition, its failure callbacks run and the result is `false`
    /// without touching the entity.
    pub fn fire_events(&self, entity: &mut E, events: &[&str]) -> Result<bool, Error> {
        self.fire_events_with(entity, events, CollectionOptions::default())
    }

    pub fn fire_events_with(
        &self,
        entity: &mut E,
        events: &[&str],
        options: CollectionOptions,
    ) -> Result<bool, Error> {
        match self.resolve_events(entity, events)? {
            Validation::Success(transitions) => {
                Ok(self.perform_transitions(entity, transitions, options)?.success)
            }
            Validation::Failure(_) => Ok(false),
        }
    }

    /// Like [`MachineRegistry::fire_events`], failing with
    /// [`Error::InvalidParallelTransition`] naming the events that could not
    /// transition.
    pub fn fire_events_strict(&self, entity: &mut E, events: &[&str]) -> Result<(), Error> {
        let failed: Vec<String> = match self.resolve_events(entity, events)? {
            Validation::Success(transitions) => {
                let performed =
                    self.perform_transitions(entity, transitions, CollectionOptions::default())?;
                if performed.success {
                    return Ok(());
                }
                events.iter().map(|e| e.to_string()).collect()
            }
            Validation::Failure(errors) => errors.iter().cloned().collect(),
        };
        debug!(failed = failed.len(), "parallel transition rejected");
        Err(Error::InvalidParallelTransition {
            events: events.iter().map(|e| e.to_string()).collect(),
            failed,
        })
    }

    /// Resolve every event, accumulating the names of those without a
    /// transition. Failure callbacks run for each of those.
    fn resolve_events(
        &self,
        entity: &mut E,
        events: &[&str],
    ) -> Result<Validation<Vec<Transition>, NonEmptyVec<String>>, Error> {
        self.integration.reset(entity);

        let mut resolved = Vec::with_capacity(events.len());
        for name in events {
            resolved.push((name, self.fetch_event(name)?));
        }
        let mut attributes: Vec<&str> = Vec::new();
        for (_, (machine, _)) in &resolved {
            if attributes.contains(&machine.attribute_name()) {
                return Err(Error::DuplicateAttribute {
                    attribute: machine.attribute_name().to_string(),
                });
            }
            attributes.push(machine.attribute_name());
        }

        let mut checks: Vec<Validation<Transition, NonEmptyVec<String>>> = Vec::new();
        for (name, (machine, event)) in resolved {
            match event.transition_for(machine, self, entity, &Requirements::default())? {
                Some(transition) => checks.push(Validation::success(transition)),
                None => {
                    event.on_failure(machine, self, entity, Vec::new())?;
                    checks.push(Validation::fail(name.to_string()));
                }
            }
        }
        Ok(Validation::all_vec(checks))
    }

    fn perform_transitions(
        &self,
        entity: &mut E,
        transitions: Vec<Transition>,
        options: CollectionOptions,
    ) -> Result<Performed, Error> {
        TransitionCollection::new(transitions, options)?.perform(entity, self)
    }

    /// Cache `event`'s transition on the entity for the next deferred run,
    /// without running anything. Returns whether a transition was available.
    pub fn queue_event(&self, entity: &mut E, event: &str) -> Result<bool, Error> {
        let (machine, event) = self.fetch_event(event)?;
        match event.transition_for(machine, self, entity, &Requirements::default())? {
            Some(transition) => {
                entity.set_event_transition(machine.name(), Some(transition));
                Ok(true)
            }
            None => {
                event.on_failure(machine, self, entity, Vec::new())?;
                Ok(false)
            }
        }
    }

    /// Run the transitions cached for machines whose action is `action`,
    /// wrapped around the action itself.
    pub fn perform_deferred(&self, entity: &mut E, action: &str) -> Result<Performed, Error> {
        self.perform_deferred_with(entity, action, CollectionOptions::default())
    }

    pub fn perform_deferred_with(
        &self,
        entity: &mut E,
        action: &str,
        options: CollectionOptions,
    ) -> Result<Performed, Error> {
        collection::perform_deferred(entity, self, action, options).map(|(performed, _)| performed)
    }

    pub fn paths_for(
        &self,
        entity: &E,
        machine: &str,
        options: PathOptions,
    ) -> Result<PathCollection, Error> {
        self.fetch_machine(machine)?.paths_for(entity, self, options)
    }
}

impl<E: Entity> StateIndex<E> for MachineRegistry<E> {
    fn has_state(&self, machine: &str, state: &str) -> Option<bool> {
        self.machine(machine).map(|m| m.has_state(state))
    }

    fn current_state(&self, entity: &E, machine: &str) -> Option<String> {
        let machine = self.machine(machine)?;
        machine.state_for(entity).ok().map(|s| s.name().to_string())
    }
}

impl<E> fmt::Debug for MachineRegistry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MachineRegistry")
            .field("machines", &self.machines)
            .field("config", &self.config)
            .finish()
    }
}
