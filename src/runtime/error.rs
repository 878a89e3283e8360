//! Runtime errors and the outcome type of user callables.

use crate::core::ConfigurationError;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// What a callback, around hook or action returns instead of a value.
#[derive(Debug, Error)]
pub enum CallbackError {
    /// Stop the current transition attempt. Never reported to callers as an error.
    #[error("callback chain halted")]
    Halt,

    #[error("{0}")]
    Failed(BoxError),
}

impl CallbackError {
    pub fn failed(cause: impl Into<BoxError>) -> Self {
        CallbackError::Failed(cause.into())
    }
}

/// Errors surfaced by firing, resolving and walking machines.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("{value} is not a known {attribute} value")]
    UnknownValue { attribute: String, value: Value },

    #[error("{event} is an unknown state machine event")]
    InvalidEvent { event: String },

    #[error("Cannot transition {machine} via :{event} from :{from}{}", reason_suffix(.reason))]
    InvalidTransition {
        machine: String,
        event: String,
        from: String,
        reason: String,
    },

    #[error("Cannot run events in parallel: {}", .events.join(", "))]
    InvalidParallelTransition {
        events: Vec<String>,
        failed: Vec<String>,
    },

    #[error("Cannot perform multiple transitions in parallel for the same state machine attribute `{attribute}`")]
    DuplicateAttribute { attribute: String },

    #[error("action `{action}` failed: {cause}")]
    Action { action: String, cause: BoxError },

    #[error("callback failed: {cause}")]
    Callback { cause: BoxError },

    #[error("{} concurrent transition(s) failed: {}", .failures.len(), list(.failures))]
    Concurrency { failures: Vec<TaskFailure> },

    #[error("transition task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl Error {
    /// Events named by a structured transition error.
    pub fn failed_events(&self) -> Vec<&str> {
        match self {
            Error::InvalidTransition { event, .. } => vec![event.as_str()],
            Error::InvalidParallelTransition { failed, .. } => {
                failed.iter().map(String::as_str).collect()
            }
            Error::Concurrency { failures } => {
                failures.iter().map(|f| f.event.as_str()).collect()
            }
            _ => Vec::new(),
        }
    }
}

/// One task of a concurrent firing that did not transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskFailure {
    pub event: String,
    pub reason: String,
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.event, self.reason)
    }
}

fn reason_suffix(reason: &str) -> String {
    if reason.is_empty() {
        String::new()
    } else {
        format!(" (Reason(s): {reason})")
    }
}

fn list(failures: &[TaskFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Control flow inside a running collection.
#[derive(Debug)]
pub(crate) enum Interrupt {
    Halt,
    Failed(Error),
}

impl From<Error> for Interrupt {
    fn from(error: Error) -> Self {
        Interrupt::Failed(error)
    }
}

impl From<ConfigurationError> for Interrupt {
    fn from(error: ConfigurationError) -> Self {
        Interrupt::Failed(error.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn invalid_transition_message_includes_reason_when_present() {
        let bare = Error::InvalidTransition {
            machine: "state".into(),
            event: "ignite".into(),
            from: "idling".into(),
            reason: String::new(),
        };
        assert_eq!(
            bare.to_string(),
            "Cannot transition state via :ignite from :idling"
        );

        let explained = Error::InvalidTransition {
            machine: "state".into(),
            event: "ignite".into(),
            from: "idling".into(),
            reason: "state cannot transition via \"ignite\"".into(),
        };
        assert!(explained
            .to_string()
            .ends_with("(Reason(s): state cannot transition via \"ignite\")"));
    }

    #[test]
    fn parallel_error_lists_every_event() {
        let err = Error::InvalidParallelTransition {
            events: vec!["ignite".into(), "disable_alarm".into()],
            failed: vec!["disable_alarm".into()],
        };
        assert_eq!(
            err.to_string(),
            "Cannot run events in parallel: ignite, disable_alarm"
        );
        assert_eq!(err.failed_events(), vec!["disable_alarm"]);
    }

    #[test]
    fn unknown_value_shows_json_value() {
        let err = Error::UnknownValue {
            attribute: "state".into(),
            value: json!("invalid"),
        };
        assert_eq!(err.to_string(), "\"invalid\" is not a known state value");
    }

    #[test]
    fn concurrency_error_names_failing_tasks() {
        let err = Error::Concurrency {
            failures: vec![TaskFailure {
                event: "launch".into(),
                reason: "no transition".into(),
            }],
        };
        assert_eq!(
            err.to_string(),
            "1 concurrent transition(s) failed: launch (no transition)"
        );
    }
}
