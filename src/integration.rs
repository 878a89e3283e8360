//! Hooks connecting the engine to a persistence or validation layer.

use crate::config::MessageKey;
use crate::runtime::Error;

/// An invalidation reported against an entity attribute.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub key: MessageKey,
    /// The configured template rendered with `values`.
    pub text: String,
    pub values: Vec<(String, String)>,
}

/// Transaction and error-reporting hooks. Every method defaults to a no-op.
pub trait Integration<E>: Send + Sync {
    /// Run `body` transactionally; `body` reports whether the work succeeded.
    fn within_transaction(
        &self,
        entity: &mut E,
        body: &mut dyn FnMut(&mut E) -> Result<bool, Error>,
    ) -> Result<bool, Error> {
        body(entity)
    }

    fn invalidate(&self, _entity: &mut E, _attribute: &str, _message: &Message) {}

    /// Clear errors recorded by previous attempts.
    fn reset(&self, _entity: &mut E) {}

    /// Human-readable summary of the recorded errors.
    fn errors_for(&self, _entity: &E) -> String {
        String::new()
    }
}

/// The integration used when none is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoIntegration;

impl<E> Integration<E> for NoIntegration {}
