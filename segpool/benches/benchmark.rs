use criterion::{Criterion, black_box, criterion_group, criterion_main};

use segpool::{AccessMode, GrowableConfig, GrowablePool, MappedConfig, MappedPool, Pool};

const PARTITION_SIZE: usize = 32;

const BATCH_SIZE: usize = 256;

//  Single-Threaded Single-Allocation Round-Trip.
//
//  This benchmark repeatedly allocates and deallocates a partition on a single thread.
//
//  The free list is never contended, this measures the lower-bound of the latency of each pool.
fn single_threaded_single_allocation_round_trip(c: &mut Criterion) {
    fn bencher(name: &'static str, c: &mut Criterion, pool: &dyn Pool) {
        c.bench_function(name, |b| b.iter(|| {
            let partition = black_box(pool.allocate().expect("Allocated"));

            unsafe { pool.deallocate(partition) };
        }));
    }

    c.bench_function("ST SA Round-trip - sys", |b| b.iter(|| {
        let _ = black_box(Box::new([0u8; PARTITION_SIZE]));
    }));

    let growable = growable_pool();
    bencher("ST SA Round-trip - growable", c, &growable);

    let directory = tempfile::tempdir().expect("Temporary directory");
    let mapped = mapped_pool(&directory);
    bencher("ST SA Round-trip - mapped", c, &mapped);
}

criterion_group!(
    single_threaded_single_allocation,
    single_threaded_single_allocation_round_trip
);

//  Single-Threaded Batch-Allocation Round-Trip.
//
//  This benchmark repeatedly allocates a batch of partitions on a single thread, then deallocates them all.
//
//  Consecutive partitions are handed out from different cache lines, unlike the single allocation round-trip.
fn single_threaded_batch_allocation_round_trip(c: &mut Criterion) {
    fn bencher(name: &'static str, c: &mut Criterion, pool: &dyn Pool) {
        let mut batch = Vec::with_capacity(BATCH_SIZE);

        c.bench_function(name, |b| b.iter(|| {
            for _ in 0..BATCH_SIZE {
                batch.push(black_box(pool.allocate().expect("Allocated")));
            }

            for partition in batch.drain(..) {
                unsafe { pool.deallocate(partition) };
            }
        }));
    }

    let mut batch = Vec::with_capacity(BATCH_SIZE);

    c.bench_function("ST BA Round-trip - sys", |b| b.iter(|| {
        for _ in 0..BATCH_SIZE {
            batch.push(black_box(Box::new([0u8; PARTITION_SIZE])));
        }

        batch.clear();
    }));

    let growable = growable_pool();
    bencher("ST BA Round-trip - growable", c, &growable);

    let directory = tempfile::tempdir().expect("Temporary directory");
    let mapped = mapped_pool(&directory);
    bencher("ST BA Round-trip - mapped", c, &mapped);
}

criterion_group!(
    single_threaded_batch_allocation,
    single_threaded_batch_allocation_round_trip
);

criterion_main!(
    single_threaded_single_allocation,
    single_threaded_batch_allocation
);

//
//  Implementation Details
//

fn growable_pool() -> GrowablePool {
    let config = GrowableConfig::new(PARTITION_SIZE).with_initial_partitions(BATCH_SIZE);

    GrowablePool::new(config).expect("Valid")
}

fn mapped_pool(directory: &tempfile::TempDir) -> MappedPool {
    let size = MappedPool::mapping_size_for(PARTITION_SIZE, BATCH_SIZE).expect("Valid size");

    let config = MappedConfig::new(directory.path().join("benchmark.pool"), PARTITION_SIZE)
        .with_mapping_size(size)
        .with_mode(AccessMode::CreateNew);

    MappedPool::open(config).expect("Opened")
}
