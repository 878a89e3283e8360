//! Transition history tracking.
//!
//! Records every transition an entity completed, across all of its machines,
//! as an immutable sequence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Record of a single completed transition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// Machine that changed
    pub machine: String,
    /// Event that was fired
    pub event: String,
    /// State name before the transition
    pub from: String,
    /// State name after the transition
    pub to: String,
    /// When the transition completed
    pub timestamp: DateTime<Utc>,
}

/// Ordered history of completed transitions.
///
/// `record` returns a new history with the transition appended.
///
/// # Example
///
/// ```rust
/// use waypoint::core::{StateHistory, TransitionRecord};
/// use chrono::Utc;
///
/// let history = StateHistory::new()
///     .record(TransitionRecord {
///         machine: "state".into(),
///         event: "ignite".into(),
///         from: "parked".into(),
///         to: "idling".into(),
///         timestamp: Utc::now(),
///     })
///     .record(TransitionRecord {
///         machine: "state".into(),
///         event: "shift_up".into(),
///         from: "idling".into(),
///         to: "first_gear".into(),
///         timestamp: Utc::now(),
///     });
///
/// assert_eq!(history.get_path("state"), vec!["parked", "idling", "first_gear"]);
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StateHistory {
    transitions: Vec<TransitionRecord>,
}

impl StateHistory {
    pub fn new() -> Self {
        Self {
            transitions: Vec::new(),
        }
    }

    /// Record a transition, returning a new history.
    pub fn record(&self, transition: TransitionRecord) -> Self {
        let mut transitions = self.transitions.clone();
        transitions.push(transition);
        Self { transitions }
    }

    /// States traversed by `machine`: the first from-state, then every to-state.
    pub fn get_path(&self, machine: &str) -> Vec<&str> {
        let mut records = self.transitions.iter().filter(|t| t.machine == machine);
        let mut path = Vec::new();
        if let Some(first) = records.next() {
            path.push(first.from.as_str());
            path.push(first.to.as_str());
        }
        path.extend(records.map(|t| t.to.as_str()));
        path
    }

    /// Elapsed time between the first and last recorded transition.
    pub fn duration(&self) -> Option<Duration> {
        if let (Some(first), Some(last)) = (self.transitions.first(), self.transitions.last()) {
            let duration = last.timestamp.signed_duration_since(first.timestamp);
            duration.to_std().ok()
        } else {
            None
        }
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }
}
