//! Weak handles to receivers.
//!
//! The registry must never keep a receiver alive on its own, yet it needs to
//! hear about a receiver's death to drop the connections it owns. A
//! [`WeakHandle`] references the receiver's target without owning it and can
//! run callbacks once that target is destroyed.
//!
//! Bound methods are special: every `Method` built for the same (instance,
//! function) pair is the same receiver, so their handles are shared through
//! a process-wide table and each new request only appends its callback.


use dashmap::{DashMap, DashSet};
use dashmap::mapref::entry::Entry;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};

use crate::object::{ErasedCell, ObjectId};
use crate::panic_handler::{catch_panic, panic_message};
use crate::receiver::{Member, Receiver, ReceiverKind};

/// Identity of a receiver: the owning object plus, for methods, the bound
/// function. Stays valid after the receiver is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleKey {
    owner: ObjectId,
    member: usize,
}

impl HandleKey {
    pub(crate) fn new(owner: ObjectId, member: usize) -> Self {
        Self { owner, member }
    }

    /// The function, method instance, or callable object
    pub fn owner(&self) -> ObjectId {
        self.owner
    }

    /// Address of the bound function, `0` for anything but methods
    pub fn member(&self) -> usize {
        self.member
    }
}

impl fmt::Display for HandleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.member == 0 {
            write!(f, "{}", self.owner)
        } else {
            write!(f, "{}:{:#x}", self.owner, self.member)
        }
    }
}

/// Callback run with the handle once its target is destroyed.
pub type OnDestroy = Arc<dyn Fn(&WeakHandle) + Send + Sync>;

static BOUND_METHODS: Lazy<DashMap<HandleKey, Weak<BoundMethodRef>, ahash::RandomState>> =
    Lazy::new(|| DashMap::with_hasher(ahash::RandomState::new()));

/// Bound methods whose instance already carries a destruction watcher.
/// An entry lives exactly as long as the instance.
static WATCHED_METHODS: Lazy<DashSet<HandleKey, ahash::RandomState>> =
    Lazy::new(|| DashSet::with_hasher(ahash::RandomState::new()));

/// Shared weak reference to one (instance, function) pair.
pub(crate) struct BoundMethodRef {
    key: HandleKey,
    instance: Weak<ErasedCell>,
    member: Member,
    callbacks: Mutex<Vec<OnDestroy>>,
}

impl BoundMethodRef {
    fn fire(self: &Arc<Self>) {
        let this = Arc::as_ptr(self);
        BOUND_METHODS.remove_if(&self.key, |_, entry| std::ptr::eq(entry.as_ptr(), this));

        let callbacks = std::mem::take(&mut *self.callbacks.lock());
        let handle = WeakHandle {
            key: self.key,
            repr: Repr::Method(self.clone()),
        };
        for callback in callbacks {
            notify(&callback, &handle);
        }
    }
}

impl Drop for BoundMethodRef {
    fn drop(&mut self) {
        let this: *const BoundMethodRef = self;
        BOUND_METHODS.remove_if(&self.key, |_, entry| {
            entry.strong_count() == 0 && std::ptr::eq(entry.as_ptr(), this)
        });
    }
}

#[derive(Clone)]
enum Repr {
    Strong(Receiver),
    Weak {
        kind: ReceiverKind,
        target: Weak<ErasedCell>,
        member: Member,
    },
    Method(Arc<BoundMethodRef>),
}

/// A reference to a receiver that, unless created by [`strong_ref`], does
/// not keep it alive.
///
/// Handles compare, order, and hash by [`HandleKey`], so a handle can still
/// be found and removed after its target died.
#[derive(Clone)]
pub struct WeakHandle {
    key: HandleKey,
    repr: Repr,
}

impl WeakHandle {
    /// Identity of the referenced receiver
    pub fn key(&self) -> HandleKey {
        self.key
    }

    /// Rebuilds the receiver, or `None` once its target is gone
    pub fn resolve(&self) -> Option<Receiver> {
        match &self.repr {
            Repr::Strong(receiver) => Some(receiver.clone()),
            Repr::Weak {
                kind,
                target,
                member,
            } => target
                .upgrade()
                .map(|target| Receiver::from_parts(*kind, target, member.clone())),
            Repr::Method(bound) => bound
                .instance
                .upgrade()
                .map(|target| Receiver::from_parts(ReceiverKind::Method, target, bound.member.clone())),
        }
    }

    /// Whether the target is still alive
    pub fn is_alive(&self) -> bool {
        match &self.repr {
            Repr::Strong(_) => true,
            Repr::Weak { target, .. } => target.strong_count() > 0,
            Repr::Method(bound) => bound.instance.strong_count() > 0,
        }
    }

    /// Whether this handle owns its receiver
    pub fn is_strong(&self) -> bool {
        matches!(self.repr, Repr::Strong(_))
    }
}

impl PartialEq for WeakHandle {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for WeakHandle {}

impl Hash for WeakHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl PartialOrd for WeakHandle {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WeakHandle {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl fmt::Debug for WeakHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakHandle")
            .field("key", &self.key)
            .field("strong", &self.is_strong())
            .field("alive", &self.is_alive())
            .finish()
    }
}

fn notify(callback: &OnDestroy, handle: &WeakHandle) {
    if let Err(payload) = catch_panic(AssertUnwindSafe(|| callback(handle))) {
        tracing::error!(
            target: "relay::saferef",
            receiver = %handle.key,
            reason = %panic_message(&*payload),
            "on-destroy callback panicked"
        );
    }
}

/// Creates a weak handle to `receiver`.
///
/// `on_destroy`, if given, runs once with the handle after the receiver's
/// target is destroyed. For bound methods an existing live handle for the
/// same (instance, function) pair is reused and `on_destroy` is appended to
/// its callbacks.
pub fn safe_ref(receiver: &Receiver, on_destroy: Option<OnDestroy>) -> WeakHandle {
    if receiver.kind() == ReceiverKind::Method {
        return bound_method_ref(receiver, on_destroy);
    }

    let handle = WeakHandle {
        key: receiver.key(),
        repr: Repr::Weak {
            kind: receiver.kind(),
            target: Arc::downgrade(receiver.target()),
            member: receiver.member().clone(),
        },
    };
    if let Some(callback) = on_destroy {
        let notified = handle.clone();
        receiver
            .target()
            .lifeline()
            .observe(Box::new(move |_| notify(&callback, &notified)));
    }
    handle
}

/// Creates a handle that owns `receiver` and keeps it alive.
pub fn strong_ref(receiver: Receiver) -> WeakHandle {
    WeakHandle {
        key: receiver.key(),
        repr: Repr::Strong(receiver),
    }
}

fn bound_method_ref(receiver: &Receiver, on_destroy: Option<OnDestroy>) -> WeakHandle {
    let key = receiver.key();
    let fresh = || {
        Arc::new(BoundMethodRef {
            key,
            instance: Arc::downgrade(receiver.target()),
            member: receiver.member().clone(),
            callbacks: Mutex::new(Vec::new()),
        })
    };

    let (bound, created) = match BOUND_METHODS.entry(key) {
        Entry::Occupied(mut slot) => match slot.get().upgrade() {
            Some(existing) => (existing, false),
            None => {
                let bound = fresh();
                slot.insert(Arc::downgrade(&bound));
                (bound, true)
            }
        },
        Entry::Vacant(slot) => {
            let bound = fresh();
            slot.insert(Arc::downgrade(&bound));
            (bound, true)
        }
    };

    if let Some(callback) = on_destroy {
        bound.callbacks.lock().push(callback);
    }
    if created {
        tracing::trace!(target: "relay::saferef", receiver = %key, "bound method handle created");
    }
    if WATCHED_METHODS.insert(key) {
        receiver
            .target()
            .lifeline()
            .observe(Box::new(move |_| instance_destroyed(key)));
    }

    WeakHandle {
        key,
        repr: Repr::Method(bound),
    }
}

/// Fires whichever handle is registered for `key` when its instance dies.
fn instance_destroyed(key: HandleKey) {
    WATCHED_METHODS.remove(&key);
    let bound = BOUND_METHODS.get(&key).and_then(|entry| entry.upgrade());
    match bound {
        Some(bound) => bound.fire(),
        None => {
            BOUND_METHODS.remove_if(&key, |_, entry| entry.strong_count() == 0);
        }
    }
}

#[cfg(test)]
pub(crate) fn is_bound_method_watched(key: HandleKey) -> bool {
    WATCHED_METHODS.contains(&key)
}

#[cfg(test)]
pub(crate) fn is_bound_method_registered(key: HandleKey) -> bool {
    BOUND_METHODS
        .get(&key)
        .is_some_and(|entry| entry.strong_count() > 0)
}
