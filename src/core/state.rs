//! Declared states of a machine.
//!
//! A state pairs a symbolic name with the value persisted in the entity's
//! attribute. States are immutable once the machine is built.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A named state and the attribute value that represents it.
///
/// # Example
///
/// ```rust
/// use waypoint::core::State;
/// use serde_json::json;
///
/// let parked = State::new("parked").initial();
/// assert_eq!(parked.value(), &json!("parked"));
/// assert!(parked.is_initial());
///
/// let first_gear = State::new("first_gear").with_value(json!(1));
/// assert_eq!(first_gear.human_name(), "first gear");
/// assert!(first_gear.matches(&json!(1)));
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct State {
    name: String,
    value: Value,
    human_name: String,
    initial: bool,
}

impl State {
    /// Declare a state whose persisted value is its own name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            value: Value::String(name.clone()),
            human_name: name.replace('_', " "),
            name,
            initial: false,
        }
    }

    /// Override the persisted value.
    pub fn with_value(mut self, value: Value) -> Self {
        self.value = value;
        self
    }

    /// Override the human-readable name.
    pub fn with_human_name(mut self, human_name: impl Into<String>) -> Self {
        self.human_name = human_name.into();
        self
    }

    /// Mark this state as the machine's initial state.
    pub fn initial(mut self) -> Self {
        self.initial = true;
        self
    }

    /// Symbolic name used by matchers, events and paths.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Value written to the entity attribute while in this state.
    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn human_name(&self) -> &str {
        &self.human_name
    }

    pub fn is_initial(&self) -> bool {
        self.initial
    }

    /// Whether `value` is this state's persisted representation.
    pub fn matches(&self, value: &Value) -> bool {
        self.value == *value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn value_defaults_to_name() {
        let state = State::new("idling");
        assert_eq!(state.name(), "idling");
        assert_eq!(state.value(), &json!("idling"));
        assert!(!state.is_initial());
    }

    #[test]
    fn human_name_replaces_underscores() {
        assert_eq!(State::new("first_gear").human_name(), "first gear");
        assert_eq!(
            State::new("first_gear").with_human_name("1st").human_name(),
            "1st"
        );
    }

    #[test]
    fn null_valued_state_matches_null() {
        let state = State::new("unset").with_value(Value::Null);
        assert!(state.matches(&Value::Null));
        assert!(!state.matches(&json!("unset")));
    }

    #[test]
    fn state_serializes_correctly() {
        let state = State::new("parked").initial();
        let json = serde_json::to_string(&state).unwrap();
        let deserialized: State = serde_json::from_str(&json).unwrap();
        assert_eq!(state, deserialized);
    }
}
