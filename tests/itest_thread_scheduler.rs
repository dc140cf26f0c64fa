use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use parking_lot::Mutex;

use holdback::store::{FifoStore, PendingStore, RecencySwapStore, WeightedRandomStore};
use holdback::{
    Limit, LoadBudgetLimiter, LoadBudgetOptions, LoadRate, MaxKeys, MaxLoad, MaxPerKey,
    MaxStoredItems, RateLimiter, SlidingWindowLimiter, SlidingWindowOptions, Task,
    ThreadScheduler, UniformSlidingWindowLimiter, UniformSlidingWindowOptions, UniformingRate,
    WindowDuration,
};

fn eventually<T>(timeout: Duration, poll: Duration, mut f: impl FnMut() -> Option<T>) -> T {
    let start = Instant::now();
    loop {
        if let Some(val) = f() {
            return val;
        }
        if start.elapsed() >= timeout {
            panic!("condition not met within {timeout:?}");
        }
        thread::sleep(poll);
    }
}

#[test]
fn sliding_window_runs_every_task_within_rate() {
    let scheduler = Arc::new(ThreadScheduler::new());
    let limiter = SlidingWindowLimiter::new(
        SlidingWindowOptions {
            duration: WindowDuration::from_millis(100).unwrap(),
            limit: Limit::try_from(5).unwrap(),
        },
        FifoStore::new(),
        scheduler,
    );
    let runs = Arc::new(Mutex::new(Vec::new()));

    let start = Instant::now();
    for id in 0..20 {
        let runs = runs.clone();
        limiter.submit_fn("k", move || runs.lock().push((id, Instant::now())));
    }

    eventually(Duration::from_secs(5), Duration::from_millis(10), || {
        (runs.lock().len() == 20).then_some(())
    });

    let runs = runs.lock();
    let ids: Vec<_> = runs.iter().map(|(id, _)| *id).collect();
    assert_eq!(ids, (0..20).collect::<Vec<_>>());

    // 20 tasks at 5 per 100ms need three full windows after the first batch.
    let last = runs.last().map(|(_, at)| *at - start).unwrap();
    assert!(last >= Duration::from_millis(300), "finished after {last:?}");
}

#[test]
fn uniform_limiter_drains_and_spaces_releases() {
    let scheduler = Arc::new(ThreadScheduler::new());
    let limiter = UniformSlidingWindowLimiter::new(
        UniformSlidingWindowOptions {
            duration: WindowDuration::from_millis(150).unwrap(),
            limit: Limit::try_from(3).unwrap(),
            uniforming_rate: UniformingRate::UNIFORM,
        },
        FifoStore::new(),
        scheduler,
    );
    let runs = Arc::new(Mutex::new(Vec::new()));

    for _ in 0..6 {
        let runs = runs.clone();
        limiter.submit_fn("k", move || runs.lock().push(Instant::now()));
    }

    assert!(limiter.await_drain_timeout(Duration::from_secs(5)));

    let runs = runs.lock();
    assert_eq!(runs.len(), 6);
    // Interval is 50ms; each release is measured when its task starts.
    for pair in runs[3..].windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_millis(40));
    }
}

#[test]
fn recency_store_behind_limiter_serves_hot_key_first() {
    let scheduler = Arc::new(ThreadScheduler::new());
    let limiter = SlidingWindowLimiter::new(
        SlidingWindowOptions {
            duration: WindowDuration::from_millis(50).unwrap(),
            limit: Limit::try_from(1).unwrap(),
        },
        RecencySwapStore::new(MaxKeys::try_from(4).unwrap(), MaxPerKey::try_from(4).unwrap()),
        scheduler,
    );
    let order = Arc::new(Mutex::new(Vec::new()));

    for key in ["warmup", "cold", "hot"] {
        let order = order.clone();
        limiter.submit_fn(key, move || order.lock().push(key));
    }

    eventually(Duration::from_secs(5), Duration::from_millis(5), || {
        (order.lock().len() == 3).then_some(())
    });
    assert_eq!(*order.lock(), vec!["warmup", "hot", "cold"]);
}

#[test]
fn weighted_store_reports_evictions_and_runs_the_rest() {
    let scheduler = Arc::new(ThreadScheduler::new());
    let evicted = Arc::new(AtomicUsize::new(0));
    let ran = Arc::new(AtomicUsize::new(0));

    let sink = evicted.clone();
    let store = WeightedRandomStore::new(
        MaxStoredItems::try_from(5).unwrap(),
        move |_key: &'static str, _task: Task| {
            sink.fetch_add(1, Ordering::SeqCst);
        },
    );
    let limiter = SlidingWindowLimiter::new(
        SlidingWindowOptions {
            duration: WindowDuration::from_millis(20).unwrap(),
            limit: Limit::try_from(1).unwrap(),
        },
        store,
        scheduler,
    );

    for i in 0..30_u32 {
        let ran = ran.clone();
        let key = if i % 3 == 0 { "light" } else { "heavy" };
        limiter.submit_fn(key, move || {
            ran.fetch_add(1, Ordering::SeqCst);
        });
    }

    eventually(Duration::from_secs(5), Duration::from_millis(10), || {
        limiter.store().is_empty().then_some(())
    });
    thread::sleep(Duration::from_millis(20));

    assert_eq!(
        ran.load(Ordering::SeqCst) + evicted.load(Ordering::SeqCst),
        30
    );
}

#[test]
fn load_budget_ticks_on_its_own() {
    let scheduler = Arc::new(ThreadScheduler::new());
    let limiter = LoadBudgetLimiter::new(
        LoadBudgetOptions {
            load_rate: LoadRate::try_from(100.0).unwrap(),
            max_load: MaxLoad::from(2),
        },
        FifoStore::new(),
        scheduler,
    );
    let ran = Arc::new(AtomicUsize::new(0));

    for _ in 0..6 {
        let ran = ran.clone();
        limiter.submit_fn("k", move || {
            ran.fetch_add(1, Ordering::SeqCst);
        });
    }
    assert_eq!(ran.load(Ordering::SeqCst), 2);

    eventually(Duration::from_secs(5), Duration::from_millis(5), || {
        (ran.load(Ordering::SeqCst) == 6).then_some(())
    });
    eventually(Duration::from_secs(5), Duration::from_millis(5), || {
        (limiter.load() == 0).then_some(())
    });
}

#[cfg(feature = "tokio")]
#[test]
fn tokio_scheduler_drives_sliding_window() {
    use holdback::TokioScheduler;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_time()
        .build()
        .unwrap();

    let limiter = SlidingWindowLimiter::new(
        SlidingWindowOptions {
            duration: WindowDuration::from_millis(30).unwrap(),
            limit: Limit::try_from(2).unwrap(),
        },
        FifoStore::new(),
        TokioScheduler::new(runtime.handle().clone()),
    );
    let ran = Arc::new(AtomicUsize::new(0));

    for _ in 0..7 {
        let ran = ran.clone();
        limiter.submit_fn("k", move || {
            ran.fetch_add(1, Ordering::SeqCst);
        });
    }

    eventually(Duration::from_secs(5), Duration::from_millis(5), || {
        (ran.load(Ordering::SeqCst) == 7).then_some(())
    });
}
