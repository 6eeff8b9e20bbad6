//! Integration tests for page locking across threads

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::unbounded;
use strata::common::{LockWait, PageId, Permissions, TransactionId};
use strata::concurrency::LockManager;

fn pid(n: u32) -> PageId {
    PageId::new(7, n)
}

#[test]
fn test_many_readers_share_a_page() {
    let lm = Arc::new(LockManager::new(LockWait::fixed(Duration::from_millis(50))));
    let (tx, rx) = unbounded();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let lm = lm.clone();
            let tx = tx.clone();
            thread::spawn(move || {
                let tid = TransactionId::new();
                tx.send(lm.lock(tid, pid(0), Permissions::ReadOnly).is_ok())
                    .unwrap();
            })
        })
        .collect();
    drop(tx);
    for handle in handles {
        handle.join().unwrap();
    }

    assert!(rx.iter().all(|granted| granted));
}

#[test]
fn test_exclusive_request_times_out_within_bound() {
    let wait = LockWait::between(Duration::from_millis(40), Duration::from_millis(80));
    let lm = LockManager::new(wait);
    let (reader, writer) = (TransactionId::new(), TransactionId::new());
    lm.lock(reader, pid(0), Permissions::ReadOnly).unwrap();

    let start = Instant::now();
    let err = lm.lock(writer, pid(0), Permissions::ReadWrite).unwrap_err();
    let waited = start.elapsed();

    assert!(err.is_abort());
    assert!(waited >= Duration::from_millis(40));
    assert!(waited < Duration::from_secs(2));
    assert!(!lm.holds_lock(writer, pid(0)));
}

#[test]
fn test_shared_request_blocked_by_writer() {
    let lm = LockManager::new(LockWait::fixed(Duration::from_millis(30)));
    let (writer, reader) = (TransactionId::new(), TransactionId::new());
    lm.lock(writer, pid(1), Permissions::ReadWrite).unwrap();

    assert!(lm.lock(reader, pid(1), Permissions::ReadOnly).is_err());
    // Other pages are unaffected
    lm.lock(reader, pid(2), Permissions::ReadWrite).unwrap();
}

#[test]
fn test_upgrade_in_place() {
    let lm = LockManager::new(LockWait::fixed(Duration::from_millis(30)));
    let tid = TransactionId::new();

    lm.lock(tid, pid(0), Permissions::ReadOnly).unwrap();
    lm.lock(tid, pid(0), Permissions::ReadWrite).unwrap();

    assert_eq!(lm.lock_mode(tid, pid(0)), Some(Permissions::ReadWrite));
    assert_eq!(lm.pages_locked_by(tid), vec![pid(0)]);
}

#[test]
fn test_release_wakes_waiter() {
    let lm = Arc::new(LockManager::new(LockWait::fixed(Duration::from_secs(2))));
    let holder = TransactionId::new();
    lm.lock(holder, pid(0), Permissions::ReadWrite).unwrap();

    let (tx, rx) = unbounded();
    let waiter = {
        let lm = lm.clone();
        thread::spawn(move || {
            let tid = TransactionId::new();
            let start = Instant::now();
            let granted = lm.lock(tid, pid(0), Permissions::ReadWrite).is_ok();
            tx.send((granted, start.elapsed())).unwrap();
        })
    };

    thread::sleep(Duration::from_millis(30));
    lm.release_lock(holder, pid(0));

    let (granted, waited) = rx.recv().unwrap();
    waiter.join().unwrap();
    assert!(granted);
    assert!(waited < Duration::from_secs(2));
}

#[test]
fn test_release_all_frees_every_page() {
    let lm = LockManager::new(LockWait::fixed(Duration::from_millis(30)));
    let (t1, t2) = (TransactionId::new(), TransactionId::new());
    for n in 0..4 {
        lm.lock(t1, pid(n), Permissions::ReadWrite).unwrap();
    }

    assert_eq!(lm.release_all(t1).len(), 4);
    for n in 0..4 {
        lm.lock(t2, pid(n), Permissions::ReadWrite).unwrap();
    }
}
