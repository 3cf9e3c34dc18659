use super::*;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[test]
fn test_ids_are_unique_and_shared_by_clones() {
    let a = Tracked::new(1_u8);
    let b = Tracked::new(1_u8);
    let a2 = a.clone();

    assert_ne!(a.id(), b.id());
    assert_eq!(a.id(), a2.id());
    assert!(Tracked::ptr_eq(&a, &a2));
    assert!(!Tracked::ptr_eq(&a, &b));
}

#[test]
fn test_deref_reaches_value() {
    let name = Tracked::new(String::from("sender"));
    assert_eq!(name.len(), 6);
    assert_eq!(&*name, "sender");
}

#[test]
fn test_observers_run_once_when_last_handle_drops() {
    let calls = Arc::new(AtomicUsize::new(0));
    let value = Tracked::new(());
    let clone = value.clone();

    let counter = calls.clone();
    value.on_drop(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    drop(value);
    assert_eq!(calls.load(Ordering::SeqCst), 0, "a clone is still alive");

    drop(clone);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_observers_run_in_registration_order_with_id() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let value = Tracked::new(5_i32);
    let id = value.id();

    for step in 0..3 {
        let order = order.clone();
        value.on_drop(move |dropped| order.lock().push((step, dropped)));
    }

    drop(value);
    assert_eq!(*order.lock(), vec![(0, id), (1, id), (2, id)]);
}

#[test]
fn test_panicking_observer_does_not_block_others() {
    let reached = Arc::new(AtomicUsize::new(0));
    let value = Tracked::new("boom");

    value.on_drop(|_| panic!("observer failure"));
    let counter = reached.clone();
    value.on_drop(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    drop(value);
    assert_eq!(reached.load(Ordering::SeqCst), 1);
}

#[test]
fn test_weak_tracked_upgrade_and_death() {
    let value = Tracked::new(vec![1, 2, 3]);
    let weak = value.downgrade();

    assert!(weak.is_alive());
    assert_eq!(weak.id(), value.id());
    assert_eq!(weak.upgrade().map(|v| v.len()), Some(3));

    drop(value);
    assert!(!weak.is_alive());
    assert!(weak.upgrade().is_none());
}

#[test]
fn test_erased_cell_keeps_identity_and_value() {
    let value = Tracked::new(42_u64);
    let erased = value.erased();

    assert_eq!(erased.id(), value.id());
    assert_eq!(erased.value().downcast_ref::<u64>(), Some(&42));
    assert_eq!(Tracked::strong_count(&value), 2);

    drop(erased);
    assert_eq!(Tracked::strong_count(&value), 1);
}

#[test]
fn test_erased_cell_can_be_the_last_owner() {
    let fired = Arc::new(AtomicUsize::new(0));
    let value = Tracked::new(String::from("held"));
    let counter = fired.clone();
    value.on_drop(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let erased = value.erased();
    drop(value);
    assert_eq!(fired.load(Ordering::SeqCst), 0);

    drop(erased);
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}
