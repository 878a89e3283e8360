//! Value-acceptance predicates over state and event names.

use super::error::ConfigurationError;

/// Predicate over a state or event name.
///
/// # Example
///
/// ```rust
/// use waypoint::core::Matcher;
///
/// assert!(Matcher::All.matches("parked", None));
/// assert!(Matcher::only(["parked", "idling"]).matches("idling", None));
/// assert!(!Matcher::except(["parked"]).matches("parked", None));
/// assert!(Matcher::Loopback.matches("idling", Some("idling")));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Matcher {
    /// Accepts every value.
    All,
    /// Accepts only the listed values.
    Whitelist(Vec<String>),
    /// Accepts everything except the listed values.
    Blacklist(Vec<String>),
    /// Accepts a value only if it equals the `from` state being evaluated.
    Loopback,
}

impl Matcher {
    /// Whitelist of names.
    ///
    /// # Example
    ///
    /// ```rust
    /// use waypoint::core::Matcher;
    ///
    /// let gears = Matcher::only(["first_gear", "second_gear"]);
    /// assert_eq!(gears.values(), ["first_gear", "second_gear"]);
    /// assert!(!gears.matches("parked", None));
    /// ```
    pub fn only<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Matcher::Whitelist(values.into_iter().map(Into::into).collect())
    }

    /// Blacklist of names. An empty blacklist accepts everything.
    pub fn except<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Matcher::Blacklist(values.into_iter().map(Into::into).collect())
    }

    /// Check `value`; `from` is the from-state of the surrounding evaluation.
    pub fn matches(&self, value: &str, from: Option<&str>) -> bool {
        match self {
            Matcher::All => true,
            Matcher::Whitelist(values) => values.iter().any(|v| v == value),
            Matcher::Blacklist(values) => !values.iter().any(|v| v == value),
            Matcher::Loopback => from == Some(value),
        }
    }

    /// Keep the candidates this matcher accepts, preserving their order.
    ///
    /// Loopback matchers have no fixed values and filter everything out;
    /// callers resolve them against the from-state instead.
    pub fn filter<'a>(&self, candidates: &'a [String]) -> Vec<&'a str> {
        candidates
            .iter()
            .map(String::as_str)
            .filter(|candidate| match self {
                Matcher::Loopback => false,
                other => other.matches(candidate, None),
            })
            .collect()
    }

    /// Values named explicitly by this matcher.
    pub fn values(&self) -> &[String] {
        match self {
            Matcher::Whitelist(values) | Matcher::Blacklist(values) => values,
            Matcher::All | Matcher::Loopback => &[],
        }
    }

    /// Whether this matcher only accepts the from-state itself.
    pub fn is_loopback(&self) -> bool {
        matches!(self, Matcher::Loopback)
    }
}

/// A requirement given while configuring a branch: either a ready matcher
/// or a plain set of names.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Requirement {
    Matcher(Matcher),
    Names(Vec<String>),
}

impl Requirement {
    pub(crate) fn into_whitelist(self) -> Matcher {
        match self {
            Requirement::Matcher(matcher) => matcher,
            Requirement::Names(names) => Matcher::Whitelist(names),
        }
    }

    pub(crate) fn into_blacklist(
        self,
        option: &'static str,
        whitelist: &'static str,
    ) -> Result<Matcher, ConfigurationError> {
        match self {
            Requirement::Matcher(_) => {
                Err(ConfigurationError::MatcherNotAllowed { option, whitelist })
            }
            Requirement::Names(names) => Ok(Matcher::Blacklist(names)),
        }
    }
}

impl From<Matcher> for Requirement {
    fn from(matcher: Matcher) -> Self {
        Requirement::Matcher(matcher)
    }
}

impl From<&str> for Requirement {
    fn from(name: &str) -> Self {
        Requirement::Names(vec![name.to_string()])
    }
}

impl From<String> for Requirement {
    fn from(name: String) -> Self {
        Requirement::Names(vec![name])
    }
}

impl From<Vec<&str>> for Requirement {
    fn from(names: Vec<&str>) -> Self {
        Requirement::Names(names.into_iter().map(str::to_string).collect())
    }
}

impl From<Vec<String>> for Requirement {
    fn from(names: Vec<String>) -> Self {
        Requirement::Names(names)
    }
}

impl<const N: usize> From<[&str; N]> for Requirement {
    fn from(names: [&str; N]) -> Self {
        Requirement::Names(names.iter().map(|n| n.to_string()).collect())
    }
}
