//! Tests for the concurrent policy store.

use std::sync::Arc;

use tripwire::policy::PolicyStore;

use crate::support::{policy, rule};

#[test]
fn empty_store_lists_empty_vec() {
    let store = PolicyStore::new();
    assert!(store.list().is_empty());
    assert!(store.is_empty());
    assert!(store.get("missing").is_none());
}

#[test]
fn set_then_get_by_uid() {
    let store = PolicyStore::new();
    store.set(policy("uid-1", "require-labels", vec![rule("check", None)]));

    let found = store.get("uid-1").expect("policy should be stored");
    assert_eq!(found.name, "require-labels");
    assert_eq!(store.len(), 1);
}

#[test]
fn set_replaces_existing_uid() {
    let store = PolicyStore::new();
    store.set(policy("uid-1", "require-labels", Vec::new()));

    let mut renamed = policy("uid-1", "require-labels", vec![rule("check", None)]);
    renamed.severity = "high".to_owned();
    store.set(renamed);

    assert_eq!(store.len(), 1);
    let found = store.get("uid-1").expect("policy should be stored");
    assert_eq!(found.severity, "high");
    assert_eq!(found.rules.len(), 1);
}

#[test]
fn delete_removes_entry() {
    let store = PolicyStore::new();
    store.set(policy("uid-1", "a", Vec::new()));

    assert!(store.delete("uid-1").is_some());
    assert!(store.delete("uid-1").is_none());
    assert!(store.get("uid-1").is_none());
}

#[test]
fn list_is_sorted_snapshot() {
    let store = PolicyStore::new();
    store.set(policy("uid-3", "zeta", Vec::new()));
    store.set(policy("uid-1", "alpha", Vec::new()));
    store.set(policy("uid-2", "mid", Vec::new()));

    let snapshot = store.list();
    store.delete("uid-1");

    let names: Vec<&str> = snapshot.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["alpha", "mid", "zeta"]);
    assert_eq!(store.len(), 2);
}

#[test]
fn concurrent_writers_and_readers() {
    let store = Arc::new(PolicyStore::new());

    let writers: Vec<_> = (0..4)
        .map(|w| {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for i in 0..50 {
                    store.set(policy(&format!("uid-{w}-{i}"), "p", Vec::new()));
                }
            })
        })
        .collect();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for _ in 0..50 {
                    let _ = store.list();
                    let _ = store.get("uid-0-0");
                }
            })
        })
        .collect();

    for handle in writers.into_iter().chain(readers) {
        handle.join().expect("thread should not panic");
    }
    assert_eq!(store.len(), 200);
}
