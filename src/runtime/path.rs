//! Enumerating transition sequences between states.
//!
//! A [`PathCollection`] walks every event sequence that leads from a start
//! state, either to a target state or until no transition is left. Each
//! transition is walked at most once per path, so cyclic machines terminate.

use super::error::Error;
use super::event::Requirements;
use super::machine::Machine;
use super::registry::MachineRegistry;
use super::transition::Transition;
use crate::entity::Entity;
use tracing::trace;

/// Where a walk starts and ends.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathOptions {
    /// Start state; defaults to the entity's current state.
    pub from: Option<String>,
    /// Target state; without one, walks continue until they dead-end.
    pub to: Option<String>,
    /// Keep extending paths that already reached the target.
    pub deep: bool,
    /// Evaluate guards while walking.
    pub guard: bool,
}

impl Default for PathOptions {
    fn default() -> Self {
        PathOptions {
            from: None,
            to: None,
            deep: false,
            guard: true,
        }
    }
}

impl PathOptions {
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

    pub fn deep(mut self) -> Self {
        self.deep = true;
        self
    }

    pub fn without_guards(mut self) -> Self {
        self.guard = false;
        self
    }
}

/// One sequence of transitions.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Path {
    transitions: Vec<Transition>,
    target: Option<String>,
}

impl Path {
    fn new(target: Option<String>) -> Self {
        Path {
            transitions: Vec::new(),
            target,
        }
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    pub fn from_name(&self) -> Option<&str> {
        self.transitions.first().map(Transition::from_name)
    }

    pub fn to_name(&self) -> Option<&str> {
        self.transitions.last().map(Transition::to_name)
    }

    /// Distinct from-states in walk order.
    pub fn from_states(&self) -> Vec<&str> {
        distinct(self.transitions.iter().map(Transition::from_name))
    }

    /// Distinct to-states in walk order.
    pub fn to_states(&self) -> Vec<&str> {
        distinct(self.transitions.iter().map(Transition::to_name))
    }

    /// Event names in walk order.
    pub fn events(&self) -> Vec<&str> {
        self.transitions.iter().map(Transition::event).collect()
    }

    /// Whether the path reached its target, or dead-ended when it has none.
    fn is_complete(&self, next: &[Transition]) -> bool {
        !self.is_empty()
            && match &self.target {
                Some(target) => self.to_name() == Some(target.as_str()),
                None => next.is_empty(),
            }
    }

    /// Whether `transition` already appears in the loop walked since the
    /// target was first reached.
    fn recently_walked(&self, transition: &Transition) -> bool {
        let mut transitions = &self.transitions[..];
        if let Some(target) = &self.target {
            if self.to_name() != Some(target.as_str()) {
                if let Some(position) = transitions.iter().position(|t| t.to_name() == target) {
                    transitions = &transitions[position + 1..];
                }
            }
        }
        transitions.contains(transition)
    }

    fn next_transitions<E: Entity>(
        &self,
        entity: &E,
        machine: &Machine<E>,
        registry: &MachineRegistry<E>,
        guard: bool,
    ) -> Result<Vec<Transition>, Error> {
        let Some(from) = self.to_name() else {
            return Ok(Vec::new());
        };
        let mut requirements = Requirements::new().from(from);
        requirements.guard = guard;
        let candidates = machine.transitions_for(entity, registry, &requirements)?;
        Ok(candidates
            .into_iter()
            .filter(|t| !self.recently_walked(t))
            .collect())
    }

    fn extended(&self, transition: Transition) -> Self {
        let mut path = self.clone();
        path.transitions.push(transition);
        path
    }
}

/// Every path a machine can walk between two states.
///
/// Paths are listed in depth-first order following event declaration order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PathCollection {
    paths: Vec<Path>,
    from_name: String,
    to_name: Option<String>,
}

impl PathCollection {
    pub fn new<E: Entity>(
        entity: &E,
        machine: &Machine<E>,
        registry: &MachineRegistry<E>,
        options: PathOptions,
    ) -> Result<Self, Error> {
        let from_name = match &options.from {
            Some(from) => machine.fetch_state(from)?.name().to_string(),
            None => machine.state_for(entity)?.name().to_string(),
        };
        if let Some(to) = &options.to {
            machine.fetch_state(to)?;
        }

        let mut requirements = Requirements::new().from(from_name.clone());
        requirements.guard = options.guard;
        let first = machine.transitions_for(entity, registry, &requirements)?;

        // Explicit stack; reversed pushes keep depth-first pre-order.
        let mut paths = Vec::new();
        let mut stack: Vec<(Path, Transition)> = first
            .into_iter()
            .rev()
            .map(|t| (Path::new(options.to.clone()), t))
            .collect();
        while let Some((base, transition)) = stack.pop() {
            let path = base.extended(transition);
            let next = path.next_transitions(entity, machine, registry, options.guard)?;
            let complete = path.is_complete(&next);
            let stop = complete && options.to.is_some() && !options.deep;
            if !stop {
                for transition in next.into_iter().rev() {
                    stack.push((path.clone(), transition));
                }
            }
            if complete {
                trace!(events = ?path.events(), "found path");
                paths.push(path);
            }
        }

        Ok(PathCollection {
            paths,
            from_name,
            to_name: options.to,
        })
    }

    pub fn paths(&self) -> &[Path] {
        &self.paths
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Path> {
        self.paths.iter()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn from_name(&self) -> &str {
        &self.from_name
    }

    pub fn to_name(&self) -> Option<&str> {
        self.to_name.as_deref()
    }

    pub fn from_states(&self) -> Vec<&str> {
        distinct(self.paths.iter().flat_map(Path::from_states))
    }

    pub fn to_states(&self) -> Vec<&str> {
        distinct(self.paths.iter().flat_map(Path::to_states))
    }

    /// Distinct events used by any path.
    pub fn events(&self) -> Vec<&str> {
        distinct(self.paths.iter().flat_map(Path::events))
    }
}

impl<'a> IntoIterator for &'a PathCollection {
    type Item = &'a Path;
    type IntoIter = std::slice::Iter<'a, Path>;

    fn into_iter(self) -> Self::IntoIter {
        self.paths.iter()
    }
}

fn distinct<'a>(names: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut seen = Vec::new();
    for name in names {
        if !seen.contains(&name) {
            seen.push(name);
        }
    }
    seen
}
