//! Before, after, around and failure hooks.
//!
//! A callback is a [`Branch`] plus an ordered list of methods. It applies to
//! a transition when its branch matches the transition's from-state, to-state
//! and event. Methods either receive the entity and the transition directly,
//! or are dispatched by name through [`Entity::invoke`].

use super::error::{CallbackError, Error, Interrupt};
use super::transition::Transition;
use crate::core::{Branch, BranchBuilder, ConfigurationError, Query, StateIndex};
use crate::entity::Entity;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Value produced by a callback method.
pub type Outcome = Result<Value, CallbackError>;

/// Decides from a method's return value whether the chain halts.
pub type Terminator = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

type MethodFn<E> = Arc<dyn Fn(&mut E, &Transition) -> Outcome + Send + Sync>;
type AroundFn<E> =
    Arc<dyn Fn(&mut E, &Transition, Next<'_, E>) -> Result<(), CallbackError> + Send + Sync>;

/// When a callback runs relative to the transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallbackKind {
    Before,
    After,
    Around,
    Failure,
}

/// One callable attached to a callback.
pub enum Method<E> {
    Call(MethodFn<E>),
    /// Dispatched through [`Entity::invoke`].
    Named(String),
}

impl<E> Clone for Method<E> {
    fn clone(&self) -> Self {
        match self {
            Method::Call(f) => Method::Call(Arc::clone(f)),
            Method::Named(name) => Method::Named(name.clone()),
        }
    }
}

impl<E> fmt::Debug for Method<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Call(_) => f.write_str("Method::Call(..)"),
            Method::Named(name) => f.debug_tuple("Method::Named").field(name).finish(),
        }
    }
}

/// Continuation handed to an around hook.
///
/// Consuming it with [`Next::proceed`] runs the rest of the pipeline: the
/// remaining before hooks, the later transitions of the collection and the
/// actions. It can be used at most once. Dropping it without proceeding
/// halts the transition.
pub struct Next<'a, E> {
    proceed: &'a mut dyn FnMut(&mut E) -> Result<(), CallbackError>,
}

impl<E> Next<'_, E> {
    /// Run the rest of the pipeline.
    ///
    /// Returns `Err(CallbackError::Halt)` if anything further in the pipeline
    /// halted or failed; returning that error from the hook keeps the
    /// original cause. A transition that completed without success still
    /// returns `Ok(())`, so code after `proceed` always runs in that case.
    pub fn proceed(self, entity: &mut E) -> Result<(), CallbackError> {
        (self.proceed)(entity)
    }
}

/// A hook attached to a machine.
///
/// # Example
///
/// ```rust
/// use waypoint::core::Branch;
/// use waypoint::runtime::Callback;
/// # use waypoint::Entity;
/// # use serde_json::{json, Value};
/// # struct Vehicle { seatbelt_on: bool }
/// # impl Entity for Vehicle {
/// #     fn read(&self, _: &str) -> Value { Value::Null }
/// #     fn write(&mut self, _: &str, _: Value) {}
/// # }
///
/// let callback: Callback<Vehicle> = Callback::before(Branch::builder().from("parked").to("idling"))
///     .unwrap()
///     .invoke(|vehicle: &mut Vehicle, _transition| {
///         vehicle.seatbelt_on = true;
///         Ok(json!(true))
///     });
/// assert_eq!(callback.known_states(), vec!["parked", "idling"]);
/// ```
pub struct Callback<E> {
    kind: CallbackKind,
    branch: Branch<E>,
    methods: Vec<Method<E>>,
    around: Vec<AroundFn<E>>,
    terminator: Option<Terminator>,
    bind_to_object: Option<bool>,
}

impl<E: Entity> Callback<E> {
    /// Build a callback of `kind` over `branch`.
    ///
    /// Around callbacks take hooks rather than methods and are built with
    /// [`Callback::around`]; asking for one here is an error.
    pub fn new(kind: CallbackKind, branch: BranchBuilder<E>) -> Result<Self, ConfigurationError> {
        if kind == CallbackKind::Around {
            return Err(ConfigurationError::UnexpectedAround);
        }
        Self::build(kind, branch)
    }

    fn build(kind: CallbackKind, branch: BranchBuilder<E>) -> Result<Self, ConfigurationError> {
        Ok(Callback {
            kind,
            branch: branch.build()?,
            methods: Vec::new(),
            around: Vec::new(),
            terminator: None,
            bind_to_object: None,
        })
    }

    pub fn before(branch: BranchBuilder<E>) -> Result<Self, ConfigurationError> {
        Self::new(CallbackKind::Before, branch)
    }

    pub fn after(branch: BranchBuilder<E>) -> Result<Self, ConfigurationError> {
        Self::new(CallbackKind::After, branch)
    }

    /// Start an around callback; add its hooks with [`AroundCallback::wrap`]
    /// and attach it with [`Machine::around`](super::Machine::around).
    pub fn around(branch: BranchBuilder<E>) -> Result<AroundCallback<E>, ConfigurationError> {
        Self::build(CallbackKind::Around, branch).map(AroundCallback)
    }

    pub fn failure(branch: BranchBuilder<E>) -> Result<Self, ConfigurationError> {
        Self::new(CallbackKind::Failure, branch)
    }

    /// Append a method receiving the entity and the transition.
    pub fn invoke<F>(mut self, method: F) -> Self
    where
        F: Fn(&mut E, &Transition) -> Outcome + Send + Sync + 'static,
    {
        self.methods.push(Method::Call(Arc::new(method)));
        self
    }

    /// Append a method dispatched by name through [`Entity::invoke`].
    pub fn invoke_named(mut self, name: impl Into<String>) -> Self {
        self.methods.push(Method::Named(name.into()));
        self
    }

    /// Halt the chain whenever `terminator` accepts a method's return value.
    pub fn terminator<F>(mut self, terminator: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.terminator = Some(Arc::new(terminator));
        self
    }

    /// Override the machine-wide binding of named methods for this callback.
    pub fn bind_to_object(mut self, bind: bool) -> Self {
        self.bind_to_object = Some(bind);
        self
    }

    pub fn kind(&self) -> CallbackKind {
        self.kind
    }

    pub fn branch(&self) -> &Branch<E> {
        &self.branch
    }

    pub fn methods(&self) -> &[Method<E>] {
        &self.methods
    }

    pub fn known_states(&self) -> Vec<String> {
        self.branch.known_states()
    }

    pub(crate) fn has_terminator(&self) -> bool {
        self.terminator.is_some()
    }

    pub(crate) fn set_default_terminator(&mut self, terminator: Terminator) {
        if self.terminator.is_none() {
            self.terminator = Some(terminator);
        }
    }

    pub fn matches(
        &self,
        entity: &E,
        transition: &Transition,
        index: &dyn StateIndex<E>,
    ) -> Result<bool, ConfigurationError> {
        let query = Query::new()
            .from(transition.from_name())
            .to(transition.to_name())
            .on(transition.event());
        self.branch.matches(entity, &query, index)
    }

    /// Run every method if the branch matches. Returns whether it matched.
    pub(crate) fn run(
        &self,
        entity: &mut E,
        transition: &Transition,
        index: &dyn StateIndex<E>,
        bind_default: bool,
    ) -> Result<bool, Interrupt> {
        if !self.matches(entity, transition, index)? {
            return Ok(false);
        }
        trace!(
            kind = ?self.kind,
            machine = transition.machine(),
            event = transition.event(),
            "running callback"
        );

        let bound = self.bind_to_object.unwrap_or(bind_default);
        for method in &self.methods {
            let value = match method {
                Method::Call(f) => f(entity, transition),
                Method::Named(name) => {
                    let args = if bound {
                        transition.args().to_vec()
                    } else {
                        vec![transition.to_value()]
                    };
                    entity.invoke(name, &args).ok_or_else(|| {
                        ConfigurationError::UnknownMethod {
                            method: name.clone(),
                        }
                    })?
                }
            };
            match value {
                Ok(value) => {
                    if self.terminator.as_ref().is_some_and(|t| t(&value)) {
                        return Err(Interrupt::Halt);
                    }
                }
                Err(CallbackError::Halt) => return Err(Interrupt::Halt),
                Err(CallbackError::Failed(cause)) => return Err(Error::Callback { cause }.into()),
            }
        }
        Ok(true)
    }

    /// Nest the around hooks from `index` outward-in around `inner`.
    pub(crate) fn nest(
        &self,
        entity: &mut E,
        transition: &Transition,
        index: usize,
        inner: &mut dyn FnMut(&mut E) -> Result<(), CallbackError>,
    ) -> Result<(), CallbackError> {
        let Some(hook) = self.around.get(index) else {
            return inner(entity);
        };

        let mut yielded = false;
        let mut proceed = |entity: &mut E| -> Result<(), CallbackError> {
            yielded = true;
            self.nest(entity, transition, index + 1, &mut *inner)
        };
        hook(
            entity,
            transition,
            Next {
                proceed: &mut proceed,
            },
        )?;

        if yielded {
            Ok(())
        } else {
            Err(CallbackError::Halt)
        }
    }
}

impl<E> fmt::Debug for Callback<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("kind", &self.kind)
            .field("branch", &self.branch)
            .field("methods", &self.methods)
            .field("around", &self.around.len())
            .finish()
    }
}

/// A callback wrapping the rest of a transition.
///
/// Only hooks can be added, so a method meant for a before or after
/// callback cannot end up here:
///
/// ```compile_fail
/// # use waypoint::core::Branch;
/// # use waypoint::runtime::Callback;
/// # use waypoint::Entity;
/// # use serde_json::Value;
/// # struct Vehicle;
/// # impl Entity for Vehicle {
/// #     fn read(&self, _: &str) -> Value { Value::Null }
/// #     fn write(&mut self, _: &str, _: Value) {}
/// # }
/// let around = Callback::<Vehicle>::around(Branch::builder())
///     .unwrap()
///     .invoke(|_, _| Ok(Value::Null));
/// ```
///
/// and hooks cannot be added to the other kinds:
///
/// ```compile_fail
/// # use waypoint::core::Branch;
/// # use waypoint::runtime::Callback;
/// # use waypoint::Entity;
/// # use serde_json::Value;
/// # struct Vehicle;
/// # impl Entity for Vehicle {
/// #     fn read(&self, _: &str) -> Value { Value::Null }
/// #     fn write(&mut self, _: &str, _: Value) {}
/// # }
/// let before = Callback::<Vehicle>::before(Branch::builder())
///     .unwrap()
///     .wrap(|vehicle, _, next| next.proceed(vehicle));
/// ```
pub struct AroundCallback<E>(Callback<E>);

impl<E: Entity> AroundCallback<E> {
    /// Append a hook. Hooks of one callback nest in order: the first added
    /// is the outermost.
    pub fn wrap<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut E, &Transition, Next<'_, E>) -> Result<(), CallbackError> + Send + Sync + 'static,
    {
        self.0.around.push(Arc::new(hook));
        self
    }

    pub fn branch(&self) -> &Branch<E> {
        &self.0.branch
    }

    pub fn known_states(&self) -> Vec<String> {
        self.0.known_states()
    }

    pub(crate) fn into_callback(self) -> Callback<E> {
        self.0
    }
}

impl<E> fmt::Debug for AroundCallback<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AroundCallback").field(&self.0).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Default)]
    struct Probe {
        log: Vec<String>,
    }

    impl Entity for Probe {
        fn read(&self, _attribute: &str) -> Value {
            Value::Null
        }

        fn write(&mut self, _attribute: &str, _value: Value) {}
    }

    fn around(name: &'static str) -> impl Fn(&mut Probe, &Transition, Next<'_, Probe>) -> Result<(), CallbackError> {
        move |probe, _t, next| {
            probe.log.push(format!("{name}.pre"));
            next.proceed(probe)?;
            probe.log.push(format!("{name}.post"));
            Ok(())
        }
    }

    fn dummy_transition() -> Transition {
        serde_json::from_value(json!({
            "machine": "state",
            "attribute": "state",
            "event": "ignite",
            "qualified_event": "ignite",
            "event_human_name": "ignite",
            "from": "parked",
            "from_name": "parked",
            "qualified_from_name": "parked",
            "to": "idling",
            "to_name": "idling",
            "qualified_to_name": "idling"
        }))
        .unwrap()
    }

    #[test]
    fn hooks_of_one_callback_nest_in_declaration_order() {
        let callback = Callback::<Probe>::around(Branch::builder())
            .unwrap()
            .wrap(around("a"))
            .wrap(around("b"))
            .into_callback();
        let mut probe = Probe::default();
        let transition = dummy_transition();

        let result = callback.nest(&mut probe, &transition, 0, &mut |probe: &mut Probe| {
            probe.log.push("inner".into());
            Ok(())
        });

        assert!(result.is_ok());
        assert_eq!(probe.log, vec!["a.pre", "b.pre", "inner", "b.post", "a.post"]);
    }

    #[test]
    fn hook_that_never_proceeds_halts() {
        let callback = Callback::<Probe>::around(Branch::builder())
            .unwrap()
            .wrap(|probe, _t, _next| {
                probe.log.push("pre".into());
                Ok(())
            })
            .into_callback();
        let mut probe = Probe::default();
        let transition = dummy_transition();

        let result = callback.nest(&mut probe, &transition, 0, &mut |probe: &mut Probe| {
            probe.log.push("inner".into());
            Ok(())
        });

        assert!(matches!(result, Err(CallbackError::Halt)));
        assert_eq!(probe.log, vec!["pre"]);
    }

    #[test]
    fn around_kind_is_only_built_through_around() {
        let error = Callback::<Probe>::new(CallbackKind::Around, Branch::builder()).unwrap_err();
        assert_eq!(error, ConfigurationError::UnexpectedAround);

        let around = Callback::<Probe>::around(Branch::builder().on("ignite")).unwrap();
        assert_eq!(around.into_callback().kind(), CallbackKind::Around);
    }

    #[test]
    fn debug_lists_methods() {
        let callback: Callback<Probe> = Callback::after(Branch::builder())
            .unwrap()
            .invoke_named("log");
        let rendered = format!("{callback:?}");
        assert!(rendered.contains("Named"));
        assert!(rendered.contains("log"));
    }
}
