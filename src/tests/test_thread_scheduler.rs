use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc,
    },
    thread,
    time::{Duration, Instant},
};

use crate::{Scheduler, ThreadScheduler};

#[test]
fn fires_in_deadline_order() {
    let scheduler = ThreadScheduler::new();
    let (tx, rx) = mpsc::channel();

    for (label, delay_ms) in [("late", 60), ("early", 10), ("middle", 30)] {
        let tx = tx.clone();
        scheduler.schedule_once(
            Duration::from_millis(delay_ms),
            Box::new(move || tx.send(label).unwrap()),
        );
    }

    let order: Vec<_> = (0..3)
        .map(|_| rx.recv_timeout(Duration::from_secs(2)).unwrap())
        .collect();
    assert_eq!(order, vec!["early", "middle", "late"]);
}

#[test]
fn does_not_fire_early() {
    let scheduler = ThreadScheduler::new();
    let (tx, rx) = mpsc::channel();
    let start = Instant::now();

    scheduler.schedule_once(
        Duration::from_millis(50),
        Box::new(move || tx.send(Instant::now()).unwrap()),
    );

    let fired_at = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert!(fired_at - start >= Duration::from_millis(50));
}

#[test]
fn never_runs_callback_on_calling_thread() {
    let scheduler = ThreadScheduler::new();
    let (tx, rx) = mpsc::channel();
    let caller = thread::current().id();

    scheduler.schedule_once(
        Duration::ZERO,
        Box::new(move || tx.send(thread::current().id()).unwrap()),
    );

    assert_ne!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), caller);
}

#[test]
fn survives_panicking_callback() {
    let scheduler = ThreadScheduler::new();
    let (tx, rx) = mpsc::channel();

    scheduler.schedule_once(Duration::ZERO, Box::new(|| panic!("callback failure")));
    scheduler.schedule_once(
        Duration::from_millis(5),
        Box::new(move || tx.send(()).unwrap()),
    );

    assert!(rx.recv_timeout(Duration::from_secs(2)).is_ok());
}

#[test]
fn drop_discards_unfired_callbacks() {
    let scheduler = ThreadScheduler::new();
    let fired = Arc::new(AtomicBool::new(false));

    let flag = fired.clone();
    scheduler.schedule_once(
        Duration::from_secs(60),
        Box::new(move || flag.store(true, Ordering::SeqCst)),
    );
    assert_eq!(scheduler.pending(), 1);

    drop(scheduler);
    assert!(!fired.load(Ordering::SeqCst));
}
