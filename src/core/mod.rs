//! Read-only machine graph.
//!
//! This module contains the parts of a machine that never change once it is
//! built and can be shared across concurrent firings without locking:
//! - Declared states
//! - Matchers and branches
//! - Boolean guards and cross-machine state guards
//! - Transition history records

mod branch;
mod error;
mod guard;
mod history;
mod matcher;
mod state;

pub use branch::{Branch, BranchBuilder, Query, StateRequirement};
pub use error::ConfigurationError;
pub use guard::{Combinator, Guard, Polarity, StateGuard, StateIndex};
pub use history::{StateHistory, TransitionRecord};
pub use matcher::{Matcher, Requirement};
pub use state::State;
