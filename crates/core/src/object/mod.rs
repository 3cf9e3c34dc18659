//! Tracked participants whose destruction can be observed.
//!
//! `Weak` alone cannot tell anyone that its target went away, so every
//! sender or receiver the registry watches lives inside a [`Tracked`] cell.
//! When the last strong handle drops, the cell runs its destruction
//! observers exactly once, in the order they were registered.

#[cfg(test)]
mod tests;

use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::ops::Deref;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crate::panic_handler::{catch_panic, panic_message};

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a tracked participant.
///
/// Ids are never reused, so a key recorded for a dead object can never
/// alias a live one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    pub(crate) fn next() -> Self {
        Self(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value of the id
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

type DropObserver = Box<dyn FnOnce(ObjectId) + Send>;

/// Destruction observers attached to one tracked cell.
#[derive(Default)]
pub(crate) struct Lifeline {
    observers: Mutex<Vec<DropObserver>>,
}

impl Lifeline {
    pub(crate) fn observe(&self, observer: DropObserver) {
        self.observers.lock().push(observer);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.observers.lock().len()
    }

    fn fire(&self, id: ObjectId) {
        let observers = std::mem::take(&mut *self.observers.lock());
        for observer in observers {
            if let Err(payload) = catch_panic(AssertUnwindSafe(move || observer(id))) {
                tracing::error!(
                    target: "relay::object",
                    object = %id,
                    reason = %panic_message(&*payload),
                    "destruction observer panicked"
                );
            }
        }
    }
}

/// Shared storage behind a [`Tracked`] handle.
pub(crate) struct TrackedCell<T: ?Sized> {
    id: ObjectId,
    lifeline: Lifeline,
    value: T,
}

/// A tracked cell with its value type erased.
pub(crate) type ErasedCell = TrackedCell<dyn Any + Send + Sync>;

impl<T: ?Sized> TrackedCell<T> {
    pub(crate) fn id(&self) -> ObjectId {
        self.id
    }

    pub(crate) fn lifeline(&self) -> &Lifeline {
        &self.lifeline
    }

    pub(crate) fn value(&self) -> &T {
        &self.value
    }
}

impl<T: ?Sized> Drop for TrackedCell<T> {
    fn drop(&mut self) {
        self.lifeline.fire(self.id);
    }
}

/// Shared ownership of a value whose destruction the registry can observe.
///
/// `Tracked` behaves like an `Arc`: clones share the same value and the same
/// identity. Senders and receivers are identified by that identity, never by
/// the value they hold.
///
/// # Examples
///
/// ```rust
/// use relay_core::Tracked;
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicBool, Ordering};
///
/// let dropped = Arc::new(AtomicBool::new(false));
/// let button = Tracked::new(String::from("ok"));
///
/// let flag = dropped.clone();
/// button.on_drop(move |_| flag.store(true, Ordering::SeqCst));
///
/// drop(button);
/// assert!(dropped.load(Ordering::SeqCst));
/// ```
pub struct Tracked<T> {
    cell: Arc<TrackedCell<T>>,
}

impl<T> Tracked<T>
where
    T: Any + Send + Sync,
{
    /// Moves `value` into a new tracked cell with a fresh identity
    pub fn new(value: T) -> Self {
        Self {
            cell: Arc::new(TrackedCell {
                id: ObjectId::next(),
                lifeline: Lifeline::default(),
                value,
            }),
        }
    }

    /// Identity shared by every clone of this handle
    pub fn id(&self) -> ObjectId {
        self.cell.id
    }

    /// Creates a weak handle that does not keep the value alive
    pub fn downgrade(&self) -> WeakTracked<T> {
        WeakTracked {
            cell: Arc::downgrade(&self.cell),
            id: self.cell.id,
        }
    }

    /// Registers an observer that runs once when the last strong handle drops.
    ///
    /// Observers run in registration order on the thread that drops the
    /// value. A panicking observer is logged and does not stop the others.
    pub fn on_drop<F>(&self, observer: F)
    where
        F: FnOnce(ObjectId) + Send + 'static,
    {
        self.cell.lifeline.observe(Box::new(observer));
    }

    /// Number of strong handles currently sharing the value
    pub fn strong_count(this: &Self) -> usize {
        Arc::strong_count(&this.cell)
    }

    /// Whether both handles share the same cell
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Arc::ptr_eq(&this.cell, &other.cell)
    }

    #[cfg(test)]
    pub(crate) fn observer_count(&self) -> usize {
        self.cell.lifeline.len()
    }

    pub(crate) fn erased(&self) -> Arc<ErasedCell> {
        let cell: Arc<ErasedCell> = self.cell.clone();
        cell
    }
}

impl<T> Clone for Tracked<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
        }
    }
}

impl<T> Deref for Tracked<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.cell.value
    }
}

impl<T: fmt::Debug> fmt::Debug for Tracked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracked")
            .field("id", &self.cell.id)
            .field("value", &self.cell.value)
            .finish()
    }
}

/// A weak reference to a [`Tracked`] value.
pub struct WeakTracked<T> {
    cell: Weak<TrackedCell<T>>,
    id: ObjectId,
}

impl<T> WeakTracked<T> {
    /// Attempts to recover a strong handle; `None` once the value dropped
    pub fn upgrade(&self) -> Option<Tracked<T>> {
        self.cell.upgrade().map(|cell| Tracked { cell })
    }

    /// Check if the value is still alive without upgrading
    pub fn is_alive(&self) -> bool {
        self.cell.strong_count() > 0
    }

    /// The identity of the value (available even if it is dead)
    pub fn id(&self) -> ObjectId {
        self.id
    }
}

impl<T> Clone for WeakTracked<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            id: self.id,
        }
    }
}

impl<T> fmt::Debug for WeakTracked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakTracked")
            .field("id", &self.id)
            .field("alive", &self.is_alive())
            .finish()
    }
}
