//! Configuration errors raised while building or evaluating the graph.

use thiserror::Error;

/// Errors caused by a malformed machine graph.
///
/// These are always raised eagerly and never folded into a guard failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("state machine `{machine}` is not defined")]
    UnknownMachine { machine: String },

    #[error("state machine `{machine}` does not define a state named `{state}`")]
    UnknownState { machine: String, state: String },

    #[error("`{option}` option cannot use matchers; use `{whitelist}` instead")]
    MatcherNotAllowed {
        option: &'static str,
        whitelist: &'static str,
    },

    #[error("conflicting requirements: `{first}` and `{second}` cannot both be given")]
    ConflictingRequirements {
        first: &'static str,
        second: &'static str,
    },

    #[error("entity does not respond to `{method}`")]
    UnknownMethod { method: String },

    #[error("`{state}` is not a known state of `{machine}`")]
    UndeclaredState { machine: String, state: String },

    #[error("around callbacks take hooks; build them with `Callback::around`")]
    UnexpectedAround,
}
