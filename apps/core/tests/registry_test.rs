use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use windowwalker_core::model::{WindowEntry, WindowHandle};
use windowwalker_core::registry::{InMemoryRegistry, WindowRegistry};

fn counting_registry() -> (InMemoryRegistry, Arc<AtomicUsize>) {
    let registry = InMemoryRegistry::deterministic_fixture();
    let notifications = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&notifications);
    registry.subscribe(Arc::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    }));
    (registry, notifications)
}

#[test]
fn snapshot_is_detached_from_later_mutation() {
    let (registry, _) = counting_registry();
    let before = registry.snapshot().unwrap();

    registry.remove(WindowHandle(0x1001)).unwrap();

    assert_eq!(before.len(), 5);
    assert_eq!(registry.snapshot().unwrap().len(), 4);
}

#[test]
fn upsert_keeps_position_of_known_handle() {
    let (registry, notifications) = counting_registry();

    registry
        .upsert(WindowEntry::new(WindowHandle(0x1002), "PowerShell", "WindowsTerminal"))
        .unwrap();

    let snapshot = registry.snapshot().unwrap();
    assert_eq!(snapshot[1].title, "PowerShell");
    assert_eq!(snapshot.len(), 5);
    assert_eq!(notifications.load(Ordering::SeqCst), 1);
}

#[test]
fn removing_unknown_handle_does_not_notify() {
    let (registry, notifications) = counting_registry();

    assert!(!registry.remove(WindowHandle(0xdead)).unwrap());
    assert_eq!(notifications.load(Ordering::SeqCst), 0);
}

#[test]
fn set_windows_replaces_everything_and_notifies() {
    let (registry, notifications) = counting_registry();

    registry
        .set_windows(vec![WindowEntry::new(WindowHandle(9), "Only", "only")])
        .unwrap();

    assert_eq!(registry.snapshot().unwrap().len(), 1);
    assert_eq!(notifications.load(Ordering::SeqCst), 1);
}

#[test]
fn refresh_is_counted() {
    let registry = InMemoryRegistry::new(Vec::new());
    registry.refresh().unwrap();
    registry.refresh().unwrap();

    assert_eq!(registry.refresh_count(), 2);
    assert_eq!(registry.registry_name(), "in-memory");
}

#[test]
fn unsubscribed_listener_is_not_notified() {
    let registry = InMemoryRegistry::deterministic_fixture();
    let notifications = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&notifications);
    let id = registry.subscribe(Arc::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    }));
    assert_eq!(registry.listener_count(), 1);

    assert!(registry.unsubscribe(id));
    assert!(!registry.unsubscribe(id));
    registry.remove(WindowHandle(0x1001)).unwrap();

    assert_eq!(registry.listener_count(), 0);
    assert_eq!(notifications.load(Ordering::SeqCst), 0);
}
