use crate::core::{StateHistory, TransitionRecord};
use crate::runtime::Transition;
use chrono::Utc;
use parking_lot::{Mutex, RwLock, RwLockUpgradableReadGuard};
use std::sync::Arc;
use std::thread::{self, ThreadId};

struct Slot<E> {
    entity: E,
    history: StateHistory,
}

struct Inner<E> {
    slot: RwLock<Slot<E>>,
    /// Thread currently firing an event on this entity.
    firing: Mutex<Option<ThreadId>>,
}

/// An entity behind its own read/write lock, shareable across tasks.
///
/// Firing an event holds the lock's upgradable section for the whole
/// resolve-and-execute sequence, so racing firings on the same entity are
/// serialized. The firing works on a copy of the entity and commits it under
/// the write lock once it finishes. Reads never wait on a firing: they see
/// the last committed entity, including reads made by guards and callbacks
/// of the firing itself.
///
/// # Example
///
/// ```rust
/// use waypoint::{Entity, SharedEntity};
/// use serde_json::{json, Value};
///
/// #[derive(Clone)]
/// struct Ship {
///     status: Value,
/// }
///
/// impl Entity for Ship {
///     fn read(&self, _attribute: &str) -> Value {
///         self.status.clone()
///     }
///
///     fn write(&mut self, _attribute: &str, value: Value) {
///         self.status = value;
///     }
/// }
///
/// let ship = SharedEntity::new(Ship { status: json!("docked") });
/// ship.write(|s| s.write("status", json!("flying")));
/// assert_eq!(ship.read(|s| s.read("status")), json!("flying"));
/// ```
pub struct SharedEntity<E>(Arc<Inner<E>>);

impl<E> Clone for SharedEntity<E> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<E> SharedEntity<E> {
    pub fn new(entity: E) -> Self {
        Self(Arc::new(Inner {
            slot: RwLock::new(Slot {
                entity,
                history: StateHistory::new(),
            }),
            firing: Mutex::new(None),
        }))
    }

    /// Acquire read-only access to the committed entity.
    ///
    /// Safe to call from inside a guard or callback of a firing on this
    /// same entity.
    pub fn read<R>(&self, f: impl FnOnce(&E) -> R) -> R {
        let guard = self.0.slot.read_recursive();
        f(&guard.entity)
    }

    /// Acquire write access to the entity. Waits for a running firing to
    /// commit.
    ///
    /// # Panics
    ///
    /// Panics when called from a guard, callback or action of a firing on
    /// this same entity; mutate the entity handed to the callback instead.
    pub fn write<R>(&self, f: impl FnOnce(&mut E) -> R) -> R {
        if self.is_firing_here() {
            panic!("SharedEntity::write called while this thread is firing an event on the entity");
        }
        let mut guard = self.0.slot.write();
        f(&mut guard.entity)
    }

    /// Transitions completed through this handle, oldest first.
    pub fn history(&self) -> StateHistory {
        self.0.slot.read_recursive().history.clone()
    }

    /// Take the entity back once no other handle is alive.
    pub fn try_unwrap(self) -> Result<E, Self> {
        Arc::try_unwrap(self.0)
            .map(|inner| inner.slot.into_inner().entity)
            .map_err(Self)
    }

    fn is_firing_here(&self) -> bool {
        *self.0.firing.lock() == Some(thread::current().id())
    }
}

impl<E: Clone> SharedEntity<E> {
    /// Return a cloned copy of the entity.
    pub fn get(&self) -> E {
        self.0.slot.read_recursive().entity.clone()
    }

    /// Run `f` on a working copy of the entity, commit the copy and record
    /// the transition `f` reports.
    ///
    /// Firings hold the upgradable section until they commit, so two of
    /// them never overlap.
    pub(crate) fn transact<R>(&self, f: impl FnOnce(&mut E) -> (R, Option<Transition>)) -> R {
        let section = self.0.slot.upgradable_read();
        let mut working = section.entity.clone();

        *self.0.firing.lock() = Some(thread::current().id());
        let _firing = FiringMark(&self.0.firing);
        let (result, performed) = f(&mut working);

        let mut guard = RwLockUpgradableReadGuard::upgrade(section);
        guard.entity = working;
        if let Some(transition) = performed.filter(Transition::success) {
            let record = TransitionRecord {
                machine: transition.machine().to_string(),
                event: transition.event().to_string(),
                from: transition.from_name().to_string(),
                to: transition.to_name().to_string(),
                timestamp: Utc::now(),
            };
            guard.history = guard.history.record(record);
        }
        result
    }
}

/// Clears the firing thread on drop, also when a callback panics.
struct FiringMark<'a>(&'a Mutex<Option<ThreadId>>);

impl Drop for FiringMark<'_> {
    fn drop(&mut self) {
        *self.0.lock() = None;
    }
}
