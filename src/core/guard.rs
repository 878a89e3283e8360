//! Guard predicates for controlling transitions and callbacks.
//!
//! Guards come in two families: boolean conditions evaluated against the
//! entity, and state guards that inspect the live state of a sibling machine
//! on the same entity.

use super::error::ConfigurationError;
use crate::entity::Entity;
use std::fmt;
use std::sync::Arc;

/// Boolean condition gating a branch or callback.
///
/// The calling convention is fixed when the guard is built, so evaluation
/// never has to inspect the callable again.
///
/// # Example
///
/// ```rust
/// use waypoint::core::Guard;
/// use waypoint::Entity;
/// use serde_json::Value;
///
/// struct Door { locked: bool }
///
/// impl Entity for Door {
///     fn read(&self, _attribute: &str) -> Value { Value::Null }
///     fn write(&mut self, _attribute: &str, _value: Value) {}
///     fn predicate(&self, name: &str) -> Option<bool> {
///         (name == "locked").then_some(self.locked)
///     }
/// }
///
/// let door = Door { locked: true };
/// assert!(Guard::<Door>::always(|| true).check(&door).unwrap());
/// assert!(!Guard::new(|d: &Door| !d.locked).check(&door).unwrap());
/// assert!(Guard::<Door>::method("locked").check(&door).unwrap());
/// assert!(Guard::<Door>::method("ajar").check(&door).is_err());
/// ```
pub struct Guard<E> {
    condition: Condition<E>,
}

enum Condition<E> {
    Nullary(Arc<dyn Fn() -> bool + Send + Sync>),
    Unary(Arc<dyn Fn(&E) -> bool + Send + Sync>),
    Named(String),
}

impl<E: Entity> Guard<E> {
    /// Guard evaluated against the entity.
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        Guard {
            condition: Condition::Unary(Arc::new(predicate)),
        }
    }

    /// Guard that ignores the entity.
    pub fn always<F>(predicate: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        Guard {
            condition: Condition::Nullary(Arc::new(predicate)),
        }
    }

    /// Guard resolved through [`Entity::predicate`] by name.
    pub fn method(name: impl Into<String>) -> Self {
        Guard {
            condition: Condition::Named(name.into()),
        }
    }

    pub fn check(&self, entity: &E) -> Result<bool, ConfigurationError> {
        match &self.condition {
            Condition::Nullary(f) => Ok(f()),
            Condition::Unary(f) => Ok(f(entity)),
            Condition::Named(name) => {
                entity
                    .predicate(name)
                    .ok_or_else(|| ConfigurationError::UnknownMethod {
                        method: name.clone(),
                    })
            }
        }
    }
}

impl<E> Clone for Guard<E> {
    fn clone(&self) -> Self {
        let condition = match &self.condition {
            Condition::Nullary(f) => Condition::Nullary(Arc::clone(f)),
            Condition::Unary(f) => Condition::Unary(Arc::clone(f)),
            Condition::Named(name) => Condition::Named(name.clone()),
        };
        Guard { condition }
    }
}

impl<E> fmt::Debug for Guard<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.condition {
            Condition::Nullary(_) => f.write_str("Guard(fn())"),
            Condition::Unary(_) => f.write_str("Guard(fn(entity))"),
            Condition::Named(name) => write!(f, "Guard({name})"),
        }
    }
}

/// Lookup of sibling machines used by state guards.
pub trait StateIndex<E> {
    /// `None` if `machine` is not defined, otherwise whether it declares `state`.
    fn has_state(&self, machine: &str, state: &str) -> Option<bool>;

    /// Name of the state `machine` is currently in, if its value is known.
    fn current_state(&self, entity: &E, machine: &str) -> Option<String>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Combinator {
    All,
    Any,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Polarity {
    Allow,
    Forbid,
}

/// Guard on the current state of other machines of the same entity.
///
/// Referencing an undefined machine or state is a configuration error,
/// reported every time the guard is evaluated rather than read as `false`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateGuard {
    combinator: Combinator,
    polarity: Polarity,
    requirements: Vec<(String, String)>,
}

impl StateGuard {
    pub fn new<I, M, S>(combinator: Combinator, polarity: Polarity, requirements: I) -> Self
    where
        I: IntoIterator<Item = (M, S)>,
        M: Into<String>,
        S: Into<String>,
    {
        StateGuard {
            combinator,
            polarity,
            requirements: requirements
                .into_iter()
                .map(|(m, s)| (m.into(), s.into()))
                .collect(),
        }
    }

    pub fn if_state(machine: impl Into<String>, state: impl Into<String>) -> Self {
        Self::new(Combinator::All, Polarity::Allow, [(machine, state)])
    }

    pub fn unless_state(machine: impl Into<String>, state: impl Into<String>) -> Self {
        Self::new(Combinator::All, Polarity::Forbid, [(machine, state)])
    }

    pub fn if_all_states<I, M, S>(requirements: I) -> Self
    where
        I: IntoIterator<Item = (M, S)>,
        M: Into<String>,
        S: Into<String>,
    {
        Self::new(Combinator::All, Polarity::Allow, requirements)
    }

    pub fn unless_all_states<I, M, S>(requirements: I) -> Self
    where
        I: IntoIterator<Item = (M, S)>,
        M: Into<String>,
        S: Into<String>,
    {
        Self::new(Combinator::All, Polarity::Forbid, requirements)
    }

    pub fn if_any_state<I, M, S>(requirements: I) -> Self
    where
        I: IntoIterator<Item = (M, S)>,
        M: Into<String>,
        S: Into<String>,
    {
        Self::new(Combinator::Any, Polarity::Allow, requirements)
    }

    pub fn unless_any_state<I, M, S>(requirements: I) -> Self
    where
        I: IntoIterator<Item = (M, S)>,
        M: Into<String>,
        S: Into<String>,
    {
        Self::new(Combinator::Any, Polarity::Forbid, requirements)
    }

    pub fn check<E>(
        &self,
        entity: &E,
        index: &dyn StateIndex<E>,
    ) -> Result<bool, ConfigurationError> {
        let mut hits = Vec::with_capacity(self.requirements.len());
        for (machine, state) in &self.requirements {
            match index.has_state(machine, state) {
                None => {
                    return Err(ConfigurationError::UnknownMachine {
                        machine: machine.clone(),
                    })
                }
                Some(false) => {
                    return Err(ConfigurationError::UnknownState {
                        machine: machine.clone(),
                        state: state.clone(),
                    })
                }
                Some(true) => {}
            }
            hits.push(index.current_state(entity, machine).as_deref() == Some(state.as_str()));
        }

        let held = match self.combinator {
            Combinator::All => hits.iter().all(|hit| *hit),
            Combinator::Any => hits.iter().any(|hit| *hit),
        };
        Ok(match self.polarity {
            Polarity::Allow => held,
            Polarity::Forbid => !held,
        })
    }
}
