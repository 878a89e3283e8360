//! Atomic execution of one or more transitions.
//!
//! A [`TransitionCollection`] runs its transitions as a single unit:
//!
//! 1. Before and around callbacks of each transition, in order. Around hooks
//!    wrap everything that follows them, including later transitions.
//! 2. Every attribute is written.
//! 3. Each distinct machine action runs once.
//! 4. On halt or a falsy action result every attribute is rolled back.
//! 5. After callbacks (on success) or failure callbacks (otherwise).
//!
//! Machines with a deferred action take a different route: firing only caches
//! the transition on the entity, and [`perform_deferred`] later runs the
//! cached transitions around the action itself.

use super::callback::{Callback, CallbackKind, Outcome};
use super::error::{CallbackError, Error, Interrupt};
use super::machine::Machine;
use super::registry::MachineRegistry;
use super::transition::Transition;
use crate::core::ConfigurationError;
use crate::entity::{truthy, Entity};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, trace};

type Block<'b, E> = &'b mut dyn FnMut(&mut E) -> Result<Value, Interrupt>;

/// Which phases a collection runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CollectionOptions {
    /// Run machine actions. When off, success depends on callbacks alone.
    pub actions: bool,
    /// Run after callbacks on success. Failure callbacks always run.
    pub after: bool,
    /// Wrap the run in the integration's transaction.
    pub transaction: bool,
}

impl Default for CollectionOptions {
    fn default() -> Self {
        CollectionOptions {
            actions: true,
            after: true,
            transaction: true,
        }
    }
}

/// What a collection reports after running.
///
/// `success` tells whether every transition went through; `result` carries
/// the action's own return value when exactly one action ran. The two are
/// independent: an action may return a truthy value that is not `true`.
#[derive(Clone, Debug, PartialEq)]
pub struct Performed {
    pub success: bool,
    pub result: Option<Value>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Immediate,
    Deferred,
}

/// Transitions executed together; they succeed or roll back as one.
#[derive(Debug)]
pub struct TransitionCollection {
    transitions: Vec<Transition>,
    options: CollectionOptions,
    mode: Mode,
}

impl TransitionCollection {
    /// Group transitions for execution. Two transitions may not write the
    /// same attribute.
    pub fn new(transitions: Vec<Transition>, options: CollectionOptions) -> Result<Self, Error> {
        Self::with_mode(transitions, options, Mode::Immediate)
    }

    fn with_mode(
        transitions: Vec<Transition>,
        options: CollectionOptions,
        mode: Mode,
    ) -> Result<Self, Error> {
        let mut seen: Vec<&str> = Vec::with_capacity(transitions.len());
        for transition in &transitions {
            if seen.contains(&transition.attribute()) {
                return Err(Error::DuplicateAttribute {
                    attribute: transition.attribute().to_string(),
                });
            }
            seen.push(transition.attribute());
        }
        Ok(TransitionCollection {
            transitions,
            options,
            mode,
        })
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn into_transitions(self) -> Vec<Transition> {
        self.transitions
    }

    pub fn options(&self) -> CollectionOptions {
        self.options
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    pub fn perform<E: Entity>(
        &mut self,
        entity: &mut E,
        registry: &MachineRegistry<E>,
    ) -> Result<Performed, Error> {
        self.execute(entity, registry, None)
    }

    /// Run the collection with `block` in place of the machine actions.
    ///
    /// The block's return value decides success. A failing block rolls the
    /// attributes back and surfaces as [`Error::Callback`].
    pub fn perform_with<E, F>(
        &mut self,
        entity: &mut E,
        registry: &MachineRegistry<E>,
        mut block: F,
    ) -> Result<Performed, Error>
    where
        E: Entity,
        F: FnMut(&mut E) -> Outcome,
    {
        let mut wrapped = |entity: &mut E| match block(entity) {
            Ok(value) => Ok(value),
            Err(CallbackError::Halt) => Err(Interrupt::Halt),
            Err(CallbackError::Failed(cause)) => Err(Error::Callback { cause }.into()),
        };
        self.execute(entity, registry, Some(&mut wrapped))
    }

    fn execute<E: Entity>(
        &mut self,
        entity: &mut E,
        registry: &MachineRegistry<E>,
        block: Option<Block<'_, E>>,
    ) -> Result<Performed, Error> {
        let machines = self
            .transitions
            .iter()
            .map(|t| {
                registry.machine(t.machine()).cloned().ok_or_else(|| {
                    ConfigurationError::UnknownMachine {
                        machine: t.machine().to_string(),
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let actions = distinct_actions(&machines);

        if self.mode == Mode::Deferred {
            for machine in &machines {
                entity.set_event_transition(machine.name(), None);
            }
        }

        let defer = self.mode == Mode::Immediate
            && block.is_none()
            && self.options.actions
            && self.options.after
            && matches!(actions.as_slice(), [Some(_)])
            && machines.first().is_some_and(|m| m.is_deferred());
        if defer {
            return self.defer(entity, registry, &machines);
        }

        let use_transactions = self.options.transaction
            && machines
                .first()
                .is_some_and(|m| m.uses_transactions(registry.config()));
        let has_block = block.is_some();

        let mut run = Run {
            registry,
            transitions: &self.transitions,
            progress: vec![Progress::default(); machines.len()],
            machines,
            options: self.options,
            mode: self.mode,
            block,
            actions,
            results: Vec::new(),
            block_result: None,
            success: false,
            persisted: false,
        };

        let outcome = if use_transactions {
            registry
                .integration()
                .within_transaction(entity, &mut |entity: &mut E| run.transact(entity))
        } else {
            run.transact(entity)
        };

        let Run {
            progress,
            actions,
            results,
            block_result,
            success,
            ..
        } = run;
        outcome?;

        for (transition, progress) in self.transitions.iter_mut().zip(progress) {
            transition.record_outcome(progress.success, progress.result);
        }

        let result = if has_block {
            block_result
        } else {
            match actions.as_slice() {
                [Some(action)] => results
                    .into_iter()
                    .find(|(name, _)| name == action)
                    .map(|(_, value)| value),
                _ => None,
            }
        };
        debug!(
            transitions = self.transitions.len(),
            success, "performed transitions"
        );
        Ok(Performed { success, result })
    }

    /// Cache the transitions on the entity and hand control to the deferred
    /// action, which runs them.
    fn defer<E: Entity>(
        &mut self,
        entity: &mut E,
        registry: &MachineRegistry<E>,
        machines: &[Arc<Machine<E>>],
    ) -> Result<Performed, Error> {
        for (transition, machine) in self.transitions.iter_mut().zip(machines) {
            transition.set_transient(true);
            entity.set_event_transition(machine.name(), Some(transition.clone()));
        }

        let Some(action) = machines.first().and_then(|m| m.action_name()) else {
            return Ok(Performed {
                success: false,
                result: None,
            });
        };
        trace!(action, "deferring transitions to action");

        let (performed, done) =
            perform_deferred(entity, registry, action, CollectionOptions::default())?;
        for transition in &mut self.transitions {
            if let Some(finished) = done.iter().find(|t| t.machine() == transition.machine()) {
                transition.record_outcome(finished.success(), finished.result().cloned());
            }
        }
        Ok(performed)
    }
}

/// Run the transitions cached on the entity for machines using `action`,
/// wrapped around the action itself.
///
/// Returns the outcome and the transitions that ran. Without cached
/// transitions the action simply runs.
pub(crate) fn perform_deferred<E: Entity>(
    entity: &mut E,
    registry: &MachineRegistry<E>,
    action: &str,
    options: CollectionOptions,
) -> Result<(Performed, Vec<Transition>), Error> {
    let mut owner: Option<Arc<Machine<E>>> = None;
    let mut transitions = Vec::new();
    for machine in registry.machines() {
        if machine.action_name() != Some(action) {
            continue;
        }
        if owner.is_none() {
            owner = Some(Arc::clone(machine));
        }
        if let Some(transition) = entity.event_transition(machine.name()) {
            transitions.push(transition);
        }
    }
    let Some(owner) = owner else {
        return Err(ConfigurationError::UnknownMethod {
            method: action.to_string(),
        }
        .into());
    };

    let mut collection = TransitionCollection::with_mode(transitions, options, Mode::Deferred)?;
    let mut call = |entity: &mut E| match owner.action_ref() {
        Some(action) => action.call(entity),
        None => Ok(Value::Bool(true)),
    };
    let performed = collection.execute(entity, registry, Some(&mut call))?;
    Ok((performed, collection.into_transitions()))
}

/// Run `callbacks` against `transition` until one halts.
pub(crate) fn run_hooks<E: Entity>(
    callbacks: &[Callback<E>],
    entity: &mut E,
    transition: &Transition,
    registry: &MachineRegistry<E>,
) -> Result<(), Error> {
    let bind = registry.config().bind_to_object;
    for callback in callbacks {
        match callback.run(entity, transition, registry, bind) {
            Ok(_) => {}
            Err(Interrupt::Halt) => break,
            Err(Interrupt::Failed(error)) => return Err(error),
        }
    }
    Ok(())
}

/// Distinct actions in machine order; `None` for machines without one.
fn distinct_actions<E: Entity>(machines: &[Arc<Machine<E>>]) -> Vec<Option<String>> {
    let mut actions: Vec<Option<String>> = Vec::new();
    for machine in machines {
        let action = machine.action_name().map(str::to_string);
        if !actions.contains(&action) {
            actions.push(action);
        }
    }
    actions
}

#[derive(Clone, Debug, Default)]
struct Progress {
    before_run: bool,
    after_run: bool,
    success: bool,
    result: Option<Value>,
}

/// State of one execution of a collection.
struct Run<'r, 'b, E> {
    registry: &'r MachineRegistry<E>,
    transitions: &'r [Transition],
    machines: Vec<Arc<Machine<E>>>,
    progress: Vec<Progress>,
    options: CollectionOptions,
    mode: Mode,
    block: Option<Block<'b, E>>,
    actions: Vec<Option<String>>,
    results: Vec<(String, Value)>,
    block_result: Option<Value>,
    success: bool,
    persisted: bool,
}

impl<E: Entity> Run<'_, '_, E> {
    /// Body of the transactional scope. Reports whether the unit succeeded.
    fn transact(&mut self, entity: &mut E) -> Result<bool, Error> {
        match self.run_callbacks(entity, 0) {
            Ok(()) | Err(Interrupt::Halt) => {}
            Err(Interrupt::Failed(error)) => {
                if self.mode == Mode::Deferred && !self.persisted {
                    self.rollback(entity);
                }
                self.success = false;
                return Err(error);
            }
        }

        if !self.success {
            self.rollback(entity);
        } else if self.mode == Mode::Deferred && !self.options.after {
            // Keep the transitions so a later run can finish them.
            for (transition, machine) in self.transitions.iter().zip(&self.machines) {
                entity.set_event_transition(machine.name(), Some(transition.clone()));
            }
        }
        Ok(self.success)
    }

    /// Run the transition at `index`, or persist and run the actions once
    /// every transition has had its before callbacks.
    fn run_callbacks(&mut self, entity: &mut E, index: usize) -> Result<(), Interrupt> {
        if index < self.transitions.len() {
            if !self.run_transition(entity, index)? {
                return Err(Interrupt::Halt);
            }
            Ok(())
        } else {
            self.persist(entity);
            self.run_actions(entity)
        }
    }

    /// Returns whether the before callbacks of `index` completed.
    fn run_transition(&mut self, entity: &mut E, index: usize) -> Result<bool, Interrupt> {
        self.progress[index].success = false;
        let halted = match self.before(entity, index, 0) {
            Ok(()) => false,
            Err(Interrupt::Halt) => true,
            Err(failed) => return Err(failed),
        };

        let progress = &self.progress[index];
        if !(progress.before_run && halted) && (self.options.after || !progress.success) {
            self.after(entity, index)?;
        }
        Ok(self.progress[index].before_run)
    }

    fn before(&mut self, entity: &mut E, index: usize, start: usize) -> Result<(), Interrupt> {
        if !self.progress[index].before_run {
            let machine = Arc::clone(&self.machines[index]);
            let transitions = self.transitions;
            let transition = &transitions[index];
            let registry = self.registry;
            let bind = registry.config().bind_to_object;

            let mut position = start;
            while let Some(callback) = machine.before_callbacks().get(position) {
                position += 1;
                if callback.kind() != CallbackKind::Around {
                    callback.run(entity, transition, registry, bind)?;
                    continue;
                }
                if !callback.matches(entity, transition, registry)? {
                    continue;
                }

                // Errors from the inner pipeline cross the user's hook as a
                // halt; the original is restored once the hook returns.
                let mut pending: Option<Interrupt> = None;
                let outcome = callback.nest(entity, transition, 0, &mut |entity: &mut E| {
                    match self.before(entity, index, position) {
                        Ok(()) => Ok(()),
                        Err(interrupt) => {
                            pending = Some(interrupt);
                            Err(CallbackError::Halt)
                        }
                    }
                });
                if let Some(interrupt) = pending {
                    return Err(interrupt);
                }
                return match outcome {
                    Ok(()) => Ok(()),
                    Err(CallbackError::Halt) => Err(Interrupt::Halt),
                    Err(CallbackError::Failed(cause)) => Err(Error::Callback { cause }.into()),
                };
            }
            self.progress[index].before_run = true;
        }

        self.run_callbacks(entity, index + 1)?;
        let action = self.machines[index].action_name();
        let result = match self.block_result.as_ref() {
            Some(value) => Some(value.clone()),
            None => self
                .results
                .iter()
                .find(|(name, _)| Some(name.as_str()) == action)
                .map(|(_, value)| value.clone()),
        };
        let progress = &mut self.progress[index];
        progress.result = result;
        progress.success = self.success;
        Ok(())
    }

    fn after(&mut self, entity: &mut E, index: usize) -> Result<(), Error> {
        if self.progress[index].after_run {
            return Ok(());
        }
        let machine = Arc::clone(&self.machines[index]);
        let callbacks = if self.progress[index].success {
            machine.after_callbacks()
        } else {
            machine.failure_callbacks()
        };
        run_hooks(callbacks, entity, &self.transitions[index], self.registry)?;
        self.progress[index].after_run = true;
        Ok(())
    }

    fn persist(&mut self, entity: &mut E) {
        if self.persisted {
            return;
        }
        for transition in self.transitions {
            transition.persist(entity);
        }
        self.persisted = true;
    }

    fn rollback(&mut self, entity: &mut E) {
        trace!(transitions = self.transitions.len(), "rolling back");
        for transition in self.transitions {
            transition.rollback(entity);
        }
        self.persisted = false;
        if self.mode == Mode::Deferred {
            for (transition, machine) in self.transitions.iter().zip(&self.machines) {
                if !transition.is_transient() {
                    entity.set_event_transition(machine.name(), Some(transition.clone()));
                }
            }
        }
    }

    fn run_actions(&mut self, entity: &mut E) -> Result<(), Interrupt> {
        if let Some(block) = self.block.as_mut() {
            match block(entity) {
                Ok(value) => {
                    self.success = truthy(&value);
                    for action in self.actions.iter().flatten() {
                        self.results.push((action.clone(), value.clone()));
                    }
                    self.block_result = Some(value);
                    return Ok(());
                }
                Err(Interrupt::Halt) => {
                    self.success = false;
                    return Err(Interrupt::Halt);
                }
                Err(failed) => {
                    self.success = false;
                    self.rollback(entity);
                    return Err(failed);
                }
            }
        }

        if self.options.actions {
            let pending: Vec<String> = self.actions.iter().flatten().cloned().collect();
            for name in pending {
                let Some(machine) = self
                    .machines
                    .iter()
                    .find(|m| m.action_name() == Some(name.as_str()))
                    .cloned()
                else {
                    continue;
                };
                let Some(action) = machine.action_ref() else {
                    continue;
                };
                match action.call(entity) {
                    Ok(value) => self.results.push((name, value)),
                    Err(Interrupt::Halt) => {
                        self.success = false;
                        return Err(Interrupt::Halt);
                    }
                    Err(failed) => {
                        self.success = false;
                        self.rollback(entity);
                        return Err(failed);
                    }
                }
            }
        }
        self.success = self.results.iter().all(|(_, value)| truthy(value));
        Ok(())
    }
}
