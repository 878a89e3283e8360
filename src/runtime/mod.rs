//! Firing events and executing transitions.
//!
//! This module turns the static graph from [`crate::core`] into behavior:
//! - Resolving which transition an event performs
//! - Running callbacks, persisting attributes and invoking actions
//! - Rolling back when anything halts or fails
//! - Walking paths between states

mod callback;
mod collection;
mod error;
mod event;
mod machine;
mod path;
mod registry;
mod transition;

pub use callback::{AroundCallback, Callback, CallbackKind, Method, Next, Outcome, Terminator};
pub use collection::{CollectionOptions, Performed, TransitionCollection};
pub use error::{BoxError, CallbackError, Error, TaskFailure};
pub use event::{Event, Requirements};
pub use machine::{Action, Machine};
pub use path::{Path, PathCollection, PathOptions};
pub use registry::MachineRegistry;
pub use transition::Transition;
