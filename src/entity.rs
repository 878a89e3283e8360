//! The contract a host object fulfils to carry state machines.

use crate::runtime::{CallbackError, Transition};
use serde_json::Value;

/// Host object carrying one attribute per machine.
///
/// Only `read` and `write` are required. The remaining methods back named
/// guards, named callback methods, and attribute-deferred transitions; their
/// defaults report that the entity has no such capability.
///
/// # Example
///
/// ```rust
/// use waypoint::Entity;
/// use serde_json::{json, Value};
/// use std::collections::HashMap;
///
/// #[derive(Default)]
/// struct Vehicle {
///     attributes: HashMap<String, Value>,
/// }
///
/// impl Entity for Vehicle {
///     fn read(&self, attribute: &str) -> Value {
///         self.attributes.get(attribute).cloned().unwrap_or(Value::Null)
///     }
///
///     fn write(&mut self, attribute: &str, value: Value) {
///         self.attributes.insert(attribute.to_string(), value);
///     }
/// }
///
/// let mut vehicle = Vehicle::default();
/// vehicle.write("state", json!("parked"));
/// assert_eq!(vehicle.read("state"), json!("parked"));
/// ```
pub trait Entity {
    fn read(&self, attribute: &str) -> Value;

    fn write(&mut self, attribute: &str, value: Value);

    /// Named boolean used by [`Guard::method`](crate::core::Guard::method).
    fn predicate(&self, _name: &str) -> Option<bool> {
        None
    }

    /// Named method used by callbacks and actions.
    fn invoke(&mut self, _name: &str, _args: &[Value]) -> Option<Result<Value, CallbackError>> {
        None
    }

    /// Transition cached for `machine` while its action is deferred.
    fn event_transition(&self, _machine: &str) -> Option<Transition> {
        None
    }

    fn set_event_transition(&mut self, _machine: &str, _transition: Option<Transition>) {}
}

/// Host truthiness: `null` and `false` are falsy, everything else is truthy.
pub fn truthy(value: &Value) -> bool {
    !matches!(value, Value::Null | Value::Bool(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn only_null_and_false_are_falsy() {
        assert!(!truthy(&Value::Null));
        assert!(!truthy(&json!(false)));
        assert!(truthy(&json!(true)));
        assert!(truthy(&json!(0)));
        assert!(truthy(&json!("")));
        assert!(truthy(&json!([])));
    }
}
