//! Branches: single guarded transition rules.
//!
//! A branch combines from/to/event matchers with optional boolean guards and
//! state guards. Events own branches describing where they may lead; callbacks
//! use branches to decide whether they apply to a transition.

use super::error::ConfigurationError;
use super::guard::{Guard, StateGuard, StateIndex};
use super::matcher::{Matcher, Requirement};
use crate::entity::Entity;

/// The dimensions a branch is asked about. `None` skips that check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Query<'a> {
    pub from: Option<&'a str>,
    pub to: Option<&'a str>,
    pub on: Option<&'a str>,
    pub guard: bool,
}

impl Default for Query<'_> {
    fn default() -> Self {
        Query {
            from: None,
            to: None,
            on: None,
            guard: true,
        }
    }
}

impl<'a> Query<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from(mut self, state: &'a str) -> Self {
        self.from = Some(state);
        self
    }

    pub fn to(mut self, state: &'a str) -> Self {
        self.to = Some(state);
        self
    }

    pub fn on(mut self, event: &'a str) -> Self {
        self.on = Some(event);
        self
    }

    /// Ignore boolean and state guards; matchers still apply.
    pub fn without_guards(mut self) -> Self {
        self.guard = false;
        self
    }
}

/// One from/to pair of a branch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateRequirement {
    pub from: Matcher,
    pub to: Matcher,
}

/// A guarded transition rule.
pub struct Branch<E> {
    state_requirements: Vec<StateRequirement>,
    event_requirement: Matcher,
    if_conditions: Vec<Guard<E>>,
    unless_conditions: Vec<Guard<E>>,
    state_guards: Vec<StateGuard>,
    explicit_to: bool,
}

impl<E: Entity> Branch<E> {
    pub fn builder() -> BranchBuilder<E> {
        BranchBuilder::default()
    }

    pub fn state_requirements(&self) -> &[StateRequirement] {
        &self.state_requirements
    }

    pub fn event_requirement(&self) -> &Matcher {
        &self.event_requirement
    }

    /// Names referenced explicitly by the from/to matchers, in first-seen order.
    pub fn known_states(&self) -> Vec<String> {
        let mut states: Vec<String> = Vec::new();
        for requirement in &self.state_requirements {
            for value in requirement.from.values().iter().chain(requirement.to.values()) {
                if !states.contains(value) {
                    states.push(value.clone());
                }
            }
        }
        states
    }

    /// Whether every queried dimension and every guard accepts.
    pub fn matches(
        &self,
        entity: &E,
        query: &Query<'_>,
        index: &dyn StateIndex<E>,
    ) -> Result<bool, ConfigurationError> {
        Ok(self.match_query(entity, query, index)?.is_some())
    }

    /// The first state requirement accepting the query, if the guards hold.
    pub fn match_query(
        &self,
        entity: &E,
        query: &Query<'_>,
        index: &dyn StateIndex<E>,
    ) -> Result<Option<&StateRequirement>, ConfigurationError> {
        if let Some(event) = query.on {
            if !self.event_requirement.matches(event, query.from) {
                return Ok(None);
            }
        }

        let accepts = |value: Option<&str>, matcher: &Matcher| {
            value.map_or(true, |value| matcher.matches(value, query.from))
        };
        let Some(requirement) = self
            .state_requirements
            .iter()
            .find(|r| accepts(query.from, &r.from) && accepts(query.to, &r.to))
        else {
            return Ok(None);
        };

        if query.guard && !self.guards_hold(entity, index)? {
            return Ok(None);
        }
        Ok(Some(requirement))
    }

    fn guards_hold(
        &self,
        entity: &E,
        index: &dyn StateIndex<E>,
    ) -> Result<bool, ConfigurationError> {
        // State guards run first so a misconfigured machine reference always surfaces.
        for guard in &self.state_guards {
            if !guard.check(entity, index)? {
                return Ok(false);
            }
        }
        for condition in &self.if_conditions {
            if !condition.check(entity)? {
                return Ok(false);
            }
        }
        for condition in &self.unless_conditions {
            if condition.check(entity)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Bind this branch to an event: it only answers for `event`, and a
    /// missing `to` means "stay where you are".
    pub(crate) fn bind_to_event(mut self, event: &str) -> Self {
        self.event_requirement = Matcher::Whitelist(vec![event.to_string()]);
        if !self.explicit_to {
            for requirement in &mut self.state_requirements {
                requirement.to = Matcher::Loopback;
            }
        }
        self
    }
}

impl<E> std::fmt::Debug for Branch<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Branch")
            .field("state_requirements", &self.state_requirements)
            .field("event_requirement", &self.event_requirement)
            .field("if_conditions", &self.if_conditions.len())
            .field("unless_conditions", &self.unless_conditions.len())
            .field("state_guards", &self.state_guards)
            .finish()
    }
}

/// Fluent builder for [`Branch`].
///
/// # Example
///
/// ```rust
/// use waypoint::core::{Branch, Matcher};
/// # use waypoint::Entity;
/// # use serde_json::Value;
/// # struct Vehicle;
/// # impl Entity for Vehicle {
/// #     fn read(&self, _: &str) -> Value { Value::Null }
/// #     fn write(&mut self, _: &str, _: Value) {}
/// # }
///
/// let branch = Branch::<Vehicle>::builder()
///     .from(["parked", "idling"])
///     .to("first_gear")
///     .build()
///     .unwrap();
/// assert_eq!(branch.known_states(), vec!["parked", "idling", "first_gear"]);
///
/// let invalid = Branch::<Vehicle>::builder().except_from(Matcher::All).build();
/// assert!(invalid.is_err());
/// ```
pub struct BranchBuilder<E> {
    from: Option<Requirement>,
    except_from: Option<Requirement>,
    to: Option<Requirement>,
    except_to: Option<Requirement>,
    on: Option<Requirement>,
    except_on: Option<Requirement>,
    pairs: Vec<(Requirement, Requirement)>,
    if_conditions: Vec<Guard<E>>,
    unless_conditions: Vec<Guard<E>>,
    state_guards: Vec<StateGuard>,
}

impl<E> Default for BranchBuilder<E> {
    fn default() -> Self {
        BranchBuilder {
            from: None,
            except_from: None,
            to: None,
            except_to: None,
            on: None,
            except_on: None,
            pairs: Vec::new(),
            if_conditions: Vec::new(),
            unless_conditions: Vec::new(),
            state_guards: Vec::new(),
        }
    }
}

impl<E: Entity> BranchBuilder<E> {
    pub fn from(mut self, requirement: impl Into<Requirement>) -> Self {
        self.from = Some(requirement.into());
        self
    }

    pub fn except_from(mut self, requirement: impl Into<Requirement>) -> Self {
        self.except_from = Some(requirement.into());
        self
    }

    pub fn to(mut self, requirement: impl Into<Requirement>) -> Self {
        self.to = Some(requirement.into());
        self
    }

    pub fn except_to(mut self, requirement: impl Into<Requirement>) -> Self {
        self.except_to = Some(requirement.into());
        self
    }

    pub fn on(mut self, requirement: impl Into<Requirement>) -> Self {
        self.on = Some(requirement.into());
        self
    }

    pub fn except_on(mut self, requirement: impl Into<Requirement>) -> Self {
        self.except_on = Some(requirement.into());
        self
    }

    /// Add an implicit `from => to` pair. Pairs are tried in order.
    pub fn pair(mut self, from: impl Into<Requirement>, to: impl Into<Requirement>) -> Self {
        self.pairs.push((from.into(), to.into()));
        self
    }

    pub fn when(mut self, guard: Guard<E>) -> Self {
        self.if_conditions.push(guard);
        self
    }

    pub fn unless(mut self, guard: Guard<E>) -> Self {
        self.unless_conditions.push(guard);
        self
    }

    pub fn state_guard(mut self, guard: StateGuard) -> Self {
        self.state_guards.push(guard);
        self
    }

    pub fn build(self) -> Result<Branch<E>, ConfigurationError> {
        let from = build_matcher(self.from, self.except_from, "from", "except_from")?;
        let to = build_matcher(self.to, self.except_to, "to", "except_to")?;
        let on = build_matcher(self.on, self.except_on, "on", "except_on")?;

        let explicit_to = to.is_some() || !self.pairs.is_empty();
        let state_requirements = if self.pairs.is_empty() {
            vec![StateRequirement {
                from: from.unwrap_or(Matcher::All),
                to: to.unwrap_or(Matcher::All),
            }]
        } else if from.is_some() || to.is_some() {
            return Err(ConfigurationError::ConflictingRequirements {
                first: "from/to",
                second: "pair",
            });
        } else {
            self.pairs
                .into_iter()
                .map(|(from, to)| StateRequirement {
                    from: from.into_whitelist(),
                    to: to.into_whitelist(),
                })
                .collect()
        };

        Ok(Branch {
            state_requirements,
            event_requirement: on.unwrap_or(Matcher::All),
            if_conditions: self.if_conditions,
            unless_conditions: self.unless_conditions,
            state_guards: self.state_guards,
            explicit_to,
        })
    }
}

fn build_matcher(
    whitelist: Option<Requirement>,
    blacklist: Option<Requirement>,
    whitelist_option: &'static str,
    blacklist_option: &'static str,
) -> Result<Option<Matcher>, ConfigurationError> {
    match (whitelist, blacklist) {
        (Some(_), Some(_)) => Err(ConfigurationError::ConflictingRequirements {
            first: whitelist_option,
            second: blacklist_option,
        }),
        (Some(requirement), None) => Ok(Some(requirement.into_whitelist())),
        (None, Some(requirement)) => requirement
            .into_blacklist(blacklist_option, whitelist_option)
            .map(Some),
        (None, None) => Ok(None),
    }
}
