use std::hint::black_box;

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use rand::{SeedableRng, rngs::StdRng};

use holdback::store::{FifoStore, PendingStore, RecencySwapStore, WeightedRandomStore};
use holdback::{MaxKeys, MaxPerKey, MaxStoredItems};

fn keys(key_space: usize) -> Vec<String> {
    (0..key_space).map(|i| format!("user_{i}")).collect()
}

fn bench_hold_release_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("stores/hold_release_cycle");
    group.sample_size(200);

    for key_space in [16_usize, 1_024] {
        let keys = keys(key_space);

        group.bench_function(format!("recency/keys={key_space}"), |b| {
            let store = RecencySwapStore::new(
                MaxKeys::try_from(key_space).unwrap(),
                MaxPerKey::try_from(64).unwrap(),
            );
            let mut idx = 0_usize;

            b.iter(|| {
                idx = idx.wrapping_add(1);
                store.hold(keys[idx % keys.len()].clone(), idx);
                black_box(store.release());
            });
        });

        group.bench_function(format!("weighted/keys={key_space}"), |b| {
            let store = WeightedRandomStore::with_rng(
                MaxStoredItems::try_from(key_space * 4).unwrap(),
                StdRng::seed_from_u64(7),
                |_, _| {},
            );
            let mut idx = 0_usize;

            b.iter(|| {
                idx = idx.wrapping_add(1);
                store.hold(keys[idx % keys.len()].clone(), idx);
                black_box(store.release());
            });
        });

        group.bench_function(format!("fifo/keys={key_space}"), |b| {
            let store = FifoStore::new();
            let mut idx = 0_usize;

            b.iter(|| {
                idx = idx.wrapping_add(1);
                store.hold(keys[idx % keys.len()].clone(), idx);
                black_box(store.release());
            });
        });
    }

    group.finish();
}

fn bench_hold_at_capacity(c: &mut Criterion) {
    let mut group = c.benchmark_group("stores/hold_at_capacity");
    group.sample_size(100);

    for capacity in [1_000_usize, 100_000] {
        let keys = keys(64);

        group.bench_function(format!("weighted/evict/items={capacity}"), |b| {
            b.iter_batched_ref(
                || {
                    let store = WeightedRandomStore::with_rng(
                        MaxStoredItems::try_from(capacity).unwrap(),
                        StdRng::seed_from_u64(11),
                        |_, _| {},
                    );
                    for i in 0..capacity {
                        store.hold(keys[i % keys.len()].clone(), i);
                    }
                    store
                },
                |store| {
                    for i in 0..64 {
                        store.hold(black_box(keys[i].clone()), i);
                    }
                },
                BatchSize::LargeInput,
            );
        });

        group.bench_function(format!("recency/cold_key_drop/keys={capacity}"), |b| {
            let store = RecencySwapStore::new(
                MaxKeys::try_from(capacity).unwrap(),
                MaxPerKey::try_from(4).unwrap(),
            );
            for i in 0..capacity {
                store.hold(i, i);
            }
            let mut next = capacity;

            b.iter(|| {
                next += 1;
                store.hold(black_box(next), next);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_hold_release_cycle, bench_hold_at_capacity);
criterion_main!(benches);
