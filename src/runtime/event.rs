//! Named events and transition resolution.

use super::collection::run_hooks;
use super::error::Error;
use super::machine::Machine;
use super::registry::MachineRegistry;
use super::transition::Transition;
use crate::config::MessageKey;
use crate::core::{Branch, BranchBuilder, ConfigurationError, Query};
use crate::entity::Entity;
use serde_json::Value;
use tracing::debug;

/// Constraints on the transition an event may resolve to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Requirements {
    /// Resolve from this state instead of the entity's current one.
    pub from: Option<String>,
    /// Only accept a branch that can lead to this state.
    pub to: Option<String>,
    /// Evaluate boolean and state guards.
    pub guard: bool,
}

impl Default for Requirements {
    fn default() -> Self {
        Requirements {
            from: None,
            to: None,
            guard: true,
        }
    }
}

impl Requirements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from(mut self, state: impl Into<String>) -> Self {
        self.from = Some(state.into());
        self
    }

    pub fn to(mut self, state: impl Into<String>) -> Self {
        self.to = Some(state.into());
        self
    }

    pub fn without_guards(mut self) -> Self {
        self.guard = false;
        self
    }
}

/// A named trigger owning an ordered list of branches.
///
/// Branches are tried in declaration order; the first one that matches the
/// entity's state and guards wins.
pub struct Event<E> {
    name: String,
    human_name: String,
    branches: Vec<Branch<E>>,
    known_states: Vec<String>,
}

impl<E: Entity> Event<E> {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Event {
            human_name: name.replace('_', " "),
            name,
            branches: Vec::new(),
            known_states: Vec::new(),
        }
    }

    pub fn with_human_name(mut self, human_name: impl Into<String>) -> Self {
        self.human_name = human_name.into();
        self
    }

    /// Append a branch. A branch without `to` loops back to its from-state.
    pub fn transition(mut self, branch: BranchBuilder<E>) -> Result<Self, ConfigurationError> {
        let branch = branch.build()?.bind_to_event(&self.name);
        for state in branch.known_states() {
            if !self.known_states.contains(&state) {
                self.known_states.push(state);
            }
        }
        self.branches.push(branch);
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn human_name(&self) -> &str {
        &self.human_name
    }

    pub fn branches(&self) -> &[Branch<E>] {
        &self.branches
    }

    /// States referenced by any branch, in first-seen order.
    pub fn known_states(&self) -> &[String] {
        &self.known_states
    }

    pub fn can_fire(
        &self,
        machine: &Machine<E>,
        registry: &MachineRegistry<E>,
        entity: &E,
        requirements: &Requirements,
    ) -> Result<bool, Error> {
        Ok(self
            .transition_for(machine, registry, entity, requirements)?
            .is_some())
    }

    /// Resolve the transition this event would perform, if any branch allows one.
    pub fn transition_for(
        &self,
        machine: &Machine<E>,
        registry: &MachineRegistry<E>,
        entity: &E,
        requirements: &Requirements,
    ) -> Result<Option<Transition>, Error> {
        let (from, custom_from) = match &requirements.from {
            Some(from) => (machine.fetch_state(from)?.name().to_string(), true),
            None => (machine.state_for(entity)?.name().to_string(), false),
        };

        let mut query = Query::new().from(&from).on(&self.name);
        if let Some(to) = requirements.to.as_deref() {
            query = query.to(to);
        }
        if !requirements.guard {
            query = query.without_guards();
        }

        for branch in &self.branches {
            let Some(requirement) = branch.match_query(entity, &query, registry)? else {
                continue;
            };

            let to = if requirement.to.is_loopback() {
                from.clone()
            } else {
                let candidates: Vec<String> = match &requirements.to {
                    Some(to) => vec![to.clone()],
                    None => std::iter::once(from.clone())
                        .chain(
                            machine
                                .states()
                                .iter()
                                .map(|s| s.name().to_string())
                                .filter(|name| *name != from),
                        )
                        .collect(),
                };
                match requirement.to.filter(&candidates).first() {
                    Some(to) => to.to_string(),
                    None => continue,
                }
            };

            let transition = Transition::new(machine, entity, self, &from, &to, !custom_from)?;
            return Ok(Some(transition));
        }
        Ok(None)
    }

    /// Fire the event with `args`, returning whether the transition succeeded.
    pub fn fire(
        &self,
        machine: &Machine<E>,
        registry: &MachineRegistry<E>,
        entity: &mut E,
        args: Vec<Value>,
        run_action: bool,
    ) -> Result<bool, Error> {
        Ok(self
            .fire_transition(machine, registry, entity, args, run_action)?
            .is_some_and(|t| t.success()))
    }

    /// Like [`Event::fire`], returning the performed transition. `None` means
    /// no branch matched and the failure path ran.
    pub(crate) fn fire_transition(
        &self,
        machine: &Machine<E>,
        registry: &MachineRegistry<E>,
        entity: &mut E,
        args: Vec<Value>,
        run_action: bool,
    ) -> Result<Option<Transition>, Error> {
        registry.integration().reset(entity);

        match self.transition_for(machine, registry, entity, &Requirements::default())? {
            Some(mut transition) => {
                debug!(
                    machine = machine.name(),
                    event = %self.name,
                    from = transition.from_name(),
                    to = transition.to_name(),
                    "firing event"
                );
                transition.perform(entity, registry, args, run_action)?;
                Ok(Some(transition))
            }
            None => {
                self.on_failure(machine, registry, entity, args)?;
                Ok(None)
            }
        }
    }

    /// Report that no transition was possible: invalidate the entity and run
    /// the machine's failure callbacks against a loopback transition.
    pub fn on_failure(
        &self,
        machine: &Machine<E>,
        registry: &MachineRegistry<E>,
        entity: &mut E,
        args: Vec<Value>,
    ) -> Result<(), Error> {
        let state = machine.state_for(entity)?;
        let state_name = state.name().to_string();
        debug!(
            machine = machine.name(),
            event = %self.name,
            state = %state_name,
            "no transition available"
        );

        registry.invalidate(
            entity,
            machine.attribute_name(),
            MessageKey::InvalidTransition,
            vec![
                ("event".to_string(), self.human_name.clone()),
                ("state".to_string(), state.human_name().to_string()),
            ],
        );

        let transition =
            Transition::new(machine, entity, self, &state_name, &state_name, true)?.with_args(args);
        run_hooks(machine.failure_callbacks(), entity, &transition, registry)
    }
}

impl<E> std::fmt::Debug for Event<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("name", &self.name)
            .field("branches", &self.branches)
            .finish()
    }
}
