//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Settings shared by every machine in a registry.
///
/// # Example
///
/// ```rust
/// use waypoint::Config;
///
/// let config = Config::from_json(r#"{ "use_transactions": false }"#).unwrap();
/// assert!(!config.use_transactions);
/// assert!(!config.bind_to_object);
/// assert_eq!(config.messages.invalid, "is invalid");
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Wrap collections in the integration's transaction unless a machine says otherwise.
    pub use_transactions: bool,
    /// Dispatch named callback methods with the event arguments instead of the transition.
    pub bind_to_object: bool,
    pub messages: Messages,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            use_transactions: true,
            bind_to_object: false,
            messages: Messages::default(),
        }
    }
}

impl Config {
    pub fn from_json(document: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(document)
    }
}

/// Message templates; `{name}` placeholders are filled from invalidation values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Messages {
    pub invalid: String,
    pub invalid_event: String,
    pub invalid_transition: String,
}

impl Default for Messages {
    fn default() -> Self {
        Messages {
            invalid: "is invalid".to_string(),
            invalid_event: "cannot transition when {state}".to_string(),
            invalid_transition: "cannot transition via \"{event}\"".to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKey {
    Invalid,
    InvalidEvent,
    InvalidTransition,
}

impl Messages {
    pub fn template(&self, key: MessageKey) -> &str {
        match key {
            MessageKey::Invalid => &self.invalid,
            MessageKey::InvalidEvent => &self.invalid_event,
            MessageKey::InvalidTransition => &self.invalid_transition,
        }
    }

    pub fn render(&self, key: MessageKey, values: &[(String, String)]) -> String {
        values
            .iter()
            .fold(self.template(key).to_string(), |text, (name, value)| {
                text.replace(&format!("{{{name}}}"), value)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert!(config.use_transactions);
        assert!(!config.bind_to_object);
    }

    #[test]
    fn render_fills_named_placeholders() {
        let messages = Messages::default();
        let values = vec![
            ("event".to_string(), "ignite".to_string()),
            ("state".to_string(), "idling".to_string()),
        ];
        assert_eq!(
            messages.render(MessageKey::InvalidTransition, &values),
            "cannot transition via \"ignite\""
        );
        assert_eq!(
            messages.render(MessageKey::InvalidEvent, &values),
            "cannot transition when idling"
        );
    }

    #[test]
    fn partial_documents_keep_defaults() {
        let config =
            Config::from_json(r#"{ "messages": { "invalid": "is not allowed" } }"#).unwrap();
        assert!(config.use_transactions);
        assert_eq!(config.messages.invalid, "is not allowed");
        assert_eq!(
            config.messages.invalid_event,
            Messages::default().invalid_event
        );
    }

    #[test]
    fn config_roundtrips_through_json() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(Config::from_json(&json).unwrap(), config);
    }
}
