use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

use super::runtime::{ManualClock, ManualScheduler};
use crate::{
    LoadBudgetLimiter, LoadBudgetOptions, LoadRate, MaxLoad, RateLimiter, Task,
    store::{FifoStore, PendingStore},
};

type Limiter = LoadBudgetLimiter<&'static str, FifoStore<&'static str, Task>>;

fn setup(rate: f64, max_load: u64) -> (Limiter, ManualScheduler) {
    let clock = ManualClock::new();
    let scheduler = ManualScheduler::new(&clock);

    let limiter = LoadBudgetLimiter::new(
        LoadBudgetOptions {
            load_rate: LoadRate::try_from(rate).unwrap(),
            max_load: MaxLoad::from(max_load),
        },
        FifoStore::new(),
        scheduler.clone(),
    );

    (limiter, scheduler)
}

fn counting(limiter: &Limiter, ran: &Arc<AtomicUsize>) {
    let ran = ran.clone();
    limiter.submit_fn("k", move || {
        ran.fetch_add(1, Ordering::SeqCst);
    });
}

#[test]
fn starts_ticking_on_construction() {
    let (limiter, scheduler) = setup(10.0, 3);

    assert_eq!(limiter.period(), Duration::from_millis(100));
    assert_eq!(scheduler.delays(), vec![Duration::from_millis(100)]);
}

#[test]
fn overflow_is_held_and_released_by_tick() {
    let (limiter, scheduler) = setup(10.0, 3);
    let ran = Arc::new(AtomicUsize::new(0));

    for _ in 0..4 {
        counting(&limiter, &ran);
    }
    assert_eq!(ran.load(Ordering::SeqCst), 3);
    assert_eq!(limiter.load(), 3);
    assert_eq!(limiter.store().len(), 1);

    scheduler.fire_next();
    assert_eq!(ran.load(Ordering::SeqCst), 4);
    assert_eq!(limiter.load(), 3);
    assert!(limiter.store().is_empty());
    assert_eq!(scheduler.pending(), 1);
}

#[test]
fn idle_ticks_shed_load_down_to_zero() {
    let (limiter, scheduler) = setup(10.0, 2);
    let ran = Arc::new(AtomicUsize::new(0));

    counting(&limiter, &ran);
    counting(&limiter, &ran);
    assert_eq!(limiter.load(), 2);

    scheduler.fire_next();
    assert_eq!(limiter.load(), 1);
    scheduler.fire_next();
    assert_eq!(limiter.load(), 0);
    scheduler.fire_next();
    assert_eq!(limiter.load(), 0);

    counting(&limiter, &ran);
    assert_eq!(ran.load(Ordering::SeqCst), 3);
}

#[test]
fn zero_budget_runs_only_on_ticks() {
    let (limiter, scheduler) = setup(5.0, 0);
    let ran = Arc::new(AtomicUsize::new(0));

    for _ in 0..3 {
        counting(&limiter, &ran);
    }
    assert_eq!(ran.load(Ordering::SeqCst), 0);

    for expected in 1..=3 {
        scheduler.fire_next();
        assert_eq!(ran.load(Ordering::SeqCst), expected);
    }
    assert_eq!(limiter.load(), 0);
}

#[test]
fn manual_tick_releases_one_item() {
    let (limiter, _scheduler) = setup(1.0, 1);
    let ran = Arc::new(AtomicUsize::new(0));

    counting(&limiter, &ran);
    counting(&limiter, &ran);
    counting(&limiter, &ran);

    limiter.tick();
    assert_eq!(ran.load(Ordering::SeqCst), 2);
    assert_eq!(limiter.store().len(), 1);
}

#[test]
fn panicking_held_task_is_contained() {
    let (limiter, scheduler) = setup(10.0, 0);
    let ran = Arc::new(AtomicUsize::new(0));

    limiter.submit_fn("k", || panic!("held task failure"));
    counting(&limiter, &ran);

    scheduler.fire_next();
    scheduler.fire_next();
    assert_eq!(ran.load(Ordering::SeqCst), 1);
    assert_eq!(scheduler.pending(), 1);
}

#[test]
fn dropping_limiter_stops_the_ticker() {
    let (limiter, scheduler) = setup(10.0, 1);

    drop(limiter);
    scheduler.fire_next();

    assert_eq!(scheduler.pending(), 0);
}

#[test]
fn concurrent_submits_never_exceed_budget() {
    let (limiter, _scheduler) = setup(1.0, 25);
    let ran = Arc::new(AtomicUsize::new(0));

    thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                for _ in 0..50 {
                    counting(&limiter, &ran);
                }
            });
        }
    });

    assert_eq!(ran.load(Ordering::SeqCst), 25);
    assert_eq!(limiter.load(), 25);
    assert_eq!(limiter.store().len(), 8 * 50 - 25);
}
