//! Firing events from concurrent tasks.
//!
//! Every firing on a [`SharedEntity`] holds the entity's lock from
//! resolution through the last callback, so when several tasks race to fire
//! mutually exclusive events only the first can transition; the rest see the
//! new state and fail resolution. Guards and callbacks may read the entity
//! through its handle while it fires.
//!
//! # Example
//!
//! ```rust
//! use waypoint::concurrent::SharedEntity;
//! use waypoint::core::{Branch, State};
//! use waypoint::runtime::{Event, Machine, MachineRegistry};
//! use waypoint::{Config, Entity};
//! use serde_json::{json, Value};
//! use std::sync::Arc;
//!
//! #[derive(Clone)]
//! struct Ship {
//!     status: Value,
//! }
//!
//! impl Entity for Ship {
//!     fn read(&self, _attribute: &str) -> Value {
//!         self.status.clone()
//!     }
//!
//!     fn write(&mut self, _attribute: &str, value: Value) {
//!         self.status = value;
//!     }
//! }
//!
//! # tokio_test();
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn tokio_test() {
//! let registry = Arc::new(MachineRegistry::new(Config::default()).register(
//!     Machine::new("status")
//!         .state(State::new("docked").initial())
//!         .event(
//!             Event::new("launch")
//!                 .transition(Branch::builder().from("docked").to("flying"))
//!                 .unwrap(),
//!         ),
//! ));
//! let ship = SharedEntity::new(Ship { status: json!("docked") });
//!
//! let results = registry
//!     .fire_events_async(&ship, &["launch", "launch"])
//!     .await
//!     .unwrap();
//! assert_eq!(results.iter().filter(|ok| **ok).count(), 1);
//! assert_eq!(ship.read(|s| s.status.clone()), json!("flying"));
//! # }
//! ```

mod shared;

pub use shared::SharedEntity;

use crate::entity::Entity;
use crate::runtime::{Error, MachineRegistry, TaskFailure};
use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

impl<E> MachineRegistry<E>
where
    E: Entity + Clone + Send + Sync + 'static,
{
    /// Fire `event` while holding the entity's lock.
    pub fn fire_locked(
        &self,
        shared: &SharedEntity<E>,
        event: &str,
        args: Vec<Value>,
    ) -> Result<bool, Error> {
        shared.transact(|entity| match self.fire_transition(entity, event, args) {
            Ok(performed) => {
                let success = performed.as_ref().is_some_and(|t| t.success());
                (Ok(success), performed)
            }
            Err(error) => (Err(error), None),
        })
    }

    /// Like [`MachineRegistry::fire_locked`], failing with
    /// [`Error::InvalidTransition`] when the event does not transition.
    pub fn fire_locked_strict(
        &self,
        shared: &SharedEntity<E>,
        event: &str,
        args: Vec<Value>,
    ) -> Result<(), Error> {
        shared.transact(|entity| match self.fire_transition(entity, event, args) {
            Ok(Some(transition)) if transition.success() => (Ok(()), Some(transition)),
            Ok(_) => {
                let error = match self.find_event(event) {
                    Some((machine, found)) => self.invalid_transition(entity, machine, found),
                    None => Error::InvalidEvent {
                        event: event.to_string(),
                    },
                };
                (Err(error), None)
            }
            Err(error) => (Err(error), None),
        })
    }

    /// Fire `event` on a blocking task. Callbacks run on that task.
    pub fn fire_async(
        self: &Arc<Self>,
        shared: &SharedEntity<E>,
        event: &str,
        args: Vec<Value>,
    ) -> JoinHandle<Result<bool, Error>> {
        let registry = Arc::clone(self);
        let shared = shared.clone();
        let event = event.to_string();
        tokio::task::spawn_blocking(move || registry.fire_locked(&shared, &event, args))
    }

    /// Like [`MachineRegistry::fire_async`]; the task fails with
    /// [`Error::InvalidTransition`] when the event does not transition.
    pub fn fire_async_strict(
        self: &Arc<Self>,
        shared: &SharedEntity<E>,
        event: &str,
        args: Vec<Value>,
    ) -> JoinHandle<Result<(), Error>> {
        let registry = Arc::clone(self);
        let shared = shared.clone();
        let event = event.to_string();
        tokio::task::spawn_blocking(move || registry.fire_locked_strict(&shared, &event, args))
    }

    /// Fire each event on its own task and wait for all of them.
    ///
    /// Results are in `events` order. Any task that errored or panicked
    /// turns the whole call into [`Error::Concurrency`]; tasks that merely
    /// could not transition report `false`.
    pub async fn fire_events_async(
        self: &Arc<Self>,
        shared: &SharedEntity<E>,
        events: &[&str],
    ) -> Result<Vec<bool>, Error> {
        let handles = events
            .iter()
            .map(|event| self.fire_async(shared, event, Vec::new()));
        let outcomes = join_all(handles).await;

        let mut results = Vec::with_capacity(outcomes.len());
        let mut failures = Vec::new();
        for (event, outcome) in events.iter().zip(outcomes) {
            match outcome {
                Ok(Ok(success)) => results.push(success),
                Ok(Err(error)) => failures.push(task_failure(event, &error)),
                Err(join) => failures.push(task_failure(event, &Error::Join(join))),
            }
        }
        if failures.is_empty() {
            debug!(events = events.len(), "concurrent firing finished");
            Ok(results)
        } else {
            Err(Error::Concurrency { failures })
        }
    }

    /// Like [`MachineRegistry::fire_events_async`], also treating an event
    /// that could not transition as a failure.
    pub async fn fire_events_async_strict(
        self: &Arc<Self>,
        shared: &SharedEntity<E>,
        events: &[&str],
    ) -> Result<(), Error> {
        let handles = events
            .iter()
            .map(|event| self.fire_async_strict(shared, event, Vec::new()));
        let outcomes = join_all(handles).await;

        let failures: Vec<TaskFailure> = events
            .iter()
            .zip(outcomes)
            .filter_map(|(event, outcome)| match outcome {
                Ok(Ok(())) => None,
                Ok(Err(error)) => Some(task_failure(event, &error)),
                Err(join) => Some(task_failure(event, &Error::Join(join))),
            })
            .collect();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Concurrency { failures })
        }
    }
}

fn task_failure(event: &str, error: &Error) -> TaskFailure {
    warn!(event, %error, "concurrent transition failed");
    TaskFailure {
        event: event.to_string(),
        reason: error.to_string(),
    }
}
