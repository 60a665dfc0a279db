use std::{
    alloc::Layout,
    collections::BTreeSet,
    ptr::NonNull,
    sync::{Arc, atomic::{AtomicBool, AtomicUsize, Ordering}},
};

use segpool::{AllocError, GrowableConfig, GrowablePool, PagePlatform, Platform, PoolError, PowerOf2};
use segpool_test::BurstyBuilder;

//  A platform counting the chunks it hands out and takes back, which may be told to fail.
#[derive(Clone, Default)]
struct CountingPlatform {
    inner: PagePlatform,
    counters: Arc<Counters>,
}

#[derive(Default)]
struct Counters {
    allocated: AtomicUsize,
    deallocated: AtomicUsize,
    failing: AtomicBool,
}

impl CountingPlatform {
    fn allocated(&self) -> usize { self.counters.allocated.load(Ordering::SeqCst) }

    fn deallocated(&self) -> usize { self.counters.deallocated.load(Ordering::SeqCst) }

    fn set_failing(&self, failing: bool) { self.counters.failing.store(failing, Ordering::SeqCst); }
}

impl Platform for CountingPlatform {
    fn page_size(&self) -> PowerOf2 { self.inner.page_size() }

    unsafe fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        if self.counters.failing.load(Ordering::SeqCst) {
            return None;
        }

        let result = self.inner.allocate(layout);

        if result.is_some() {
            self.counters.allocated.fetch_add(1, Ordering::SeqCst);
        }

        result
    }

    unsafe fn deallocate(&self, pointer: NonNull<u8>, layout: Layout) {
        self.counters.deallocated.fetch_add(1, Ordering::SeqCst);

        self.inner.deallocate(pointer, layout);
    }
}

fn counting_pool(config: GrowableConfig) -> (GrowablePool<CountingPlatform>, CountingPlatform) {
    let platform = CountingPlatform::default();
    let pool = GrowablePool::with_platform(config, platform.clone()).expect("Valid");

    (pool, platform)
}

#[test]
fn conservation() {
    const NUMBER_PARTITIONS: usize = 100;

    let (pool, platform) = counting_pool(GrowableConfig::new(16).with_initial_partitions(2));

    let partitions: Vec<_> = (0..NUMBER_PARTITIONS).map(|_| pool.allocate().expect("Allocated")).collect();
    let first: Vec<_> = partitions.iter().map(|partition| partition.as_ptr() as usize).collect();

    for partition in partitions {
        unsafe { pool.deallocate(partition) };
    }

    let partitions: Vec<_> = (0..NUMBER_PARTITIONS).map(|_| pool.allocate().expect("Allocated")).collect();
    let second: Vec<_> = partitions.iter().map(|partition| partition.as_ptr() as usize).collect();

    assert_eq!(first.iter().collect::<BTreeSet<_>>(), second.iter().collect::<BTreeSet<_>>());

    //  Most recently deallocated first.
    assert_eq!(first.iter().rev().collect::<Vec<_>>(), second.iter().collect::<Vec<_>>());

    assert_eq!(1, platform.allocated());

    for partition in partitions {
        unsafe { pool.deallocate(partition) };
    }
}

#[test]
fn growth_sizing() {
    let (pool, platform) = counting_pool(GrowableConfig::new(16));

    let per_page = platform.page_size().value() / 16;

    //  The first chunk holds the minimum of 2 partitions, rounded up to a page.
    let mut partitions = vec!(pool.allocate().expect("Allocated"));

    assert_eq!(per_page, pool.capacity());

    //  The next chunks are as large as the pool, doubling it each time.
    while pool.number_chunks() < 3 {
        partitions.push(pool.allocate().expect("Allocated"));
    }

    assert_eq!(4 * per_page, pool.capacity());
    assert_eq!(3, platform.allocated());
    assert_eq!(2 * per_page + 1, partitions.len());

    for partition in partitions {
        unsafe { pool.deallocate(partition) };
    }
}

#[test]
fn growth_capped() {
    let (pool, platform) = counting_pool(GrowableConfig::new(16).with_max_chunk_partitions(2));

    let per_page = platform.page_size().value() / 16;

    let partitions: Vec<_> = (0..(3 * per_page)).map(|_| pool.allocate().expect("Allocated")).collect();

    //  Each chunk is capped at 2 partitions, rounded up to a single page.
    assert_eq!(3, pool.number_chunks());
    assert_eq!(3 * per_page, pool.capacity());

    let addresses: BTreeSet<_> = partitions.iter().map(|partition| partition.as_ptr() as usize).collect();
    assert_eq!(partitions.len(), addresses.len());

    for partition in partitions {
        unsafe { pool.deallocate(partition) };
    }
}

#[test]
fn growth_once_from_empty() {
    const NUMBER_THREADS: usize = 4;

    let (pool, platform) = counting_pool(GrowableConfig::new(16));

    let mut builder = BurstyBuilder::new(pool, vec!(Vec::<usize>::new(); NUMBER_THREADS));

    builder.add_simple_step(|| |pool: &GrowablePool<CountingPlatform>, local: &mut Vec<usize>| {
        let partition = pool.allocate().expect("Allocated");

        local.push(partition.into_raw().as_ptr() as usize);
    });

    let bursty = builder.launch(1);

    let addresses: BTreeSet<_> = bursty.locals().into_iter().flatten().collect();

    assert_eq!(NUMBER_THREADS, addresses.len());
    assert_eq!(1, platform.allocated());
    assert_eq!(1, bursty.global().number_chunks());
}

#[test]
fn growth_once_from_last_partition() {
    const NUMBER_THREADS: usize = 4;

    let (pool, platform) = counting_pool(GrowableConfig::new(16).with_initial_partitions(2));

    //  Leave a single partition.
    let held: Vec<_> = (1..pool.capacity()).map(|_| pool.allocate().expect("Allocated").into_raw()).collect();

    assert_eq!(1, platform.allocated());

    let mut builder = BurstyBuilder::new(pool, vec!(Vec::<usize>::new(); NUMBER_THREADS));

    builder.add_simple_step(|| |pool: &GrowablePool<CountingPlatform>, local: &mut Vec<usize>| {
        let partition = pool.allocate().expect("Allocated");

        local.push(partition.into_raw().as_ptr() as usize);
    });

    let bursty = builder.launch(1);

    let addresses: BTreeSet<_> = bursty.locals().into_iter().flatten().collect();

    assert_eq!(NUMBER_THREADS, addresses.len());
    assert!(held.iter().all(|pointer| !addresses.contains(&(pointer.as_ptr() as usize))));

    assert_eq!(2, platform.allocated());
    assert_eq!(2, bursty.global().number_chunks());
}

#[test]
fn growth_under_contention() {
    const NUMBER_THREADS: usize = 4;
    const NUMBER_PARTITIONS: usize = 300;

    let (pool, platform) = counting_pool(GrowableConfig::new(64).with_max_chunk_partitions(64));

    let mut builder = BurstyBuilder::new(pool, vec!(0usize; NUMBER_THREADS));

    builder.add_simple_step(|| {
        let mut held = Vec::with_capacity(NUMBER_PARTITIONS);

        move |pool: &GrowablePool<CountingPlatform>, local: &mut usize| {
            for index in 0..NUMBER_PARTITIONS {
                let partition = pool.allocate().expect("Allocated");

                unsafe { partition.as_ptr().cast::<usize>().add(1).write(index) };

                held.push(partition);
            }

            for (index, partition) in held.drain(..).enumerate() {
                assert_eq!(index, unsafe { partition.as_ptr().cast::<usize>().add(1).read() });

                unsafe { pool.deallocate(partition) };
            }

            *local += NUMBER_PARTITIONS;
        }
    });

    let bursty = builder.launch(10);

    assert_eq!(vec!(10 * NUMBER_PARTITIONS; NUMBER_THREADS), bursty.locals());

    let pool = bursty.global();

    //  Threads do not necessarily all hold their partitions at the same time.
    assert!(pool.capacity() >= NUMBER_PARTITIONS, "{}", pool.capacity());
    assert!(pool.capacity() <= 2 * NUMBER_THREADS * NUMBER_PARTITIONS, "{}", pool.capacity());
    assert_eq!(pool.number_chunks(), platform.allocated());
}

#[test]
fn out_of_memory() {
    let (pool, platform) = counting_pool(GrowableConfig::new(16));

    platform.set_failing(true);

    let page_size = platform.page_size().value();

    assert_eq!(AllocError::OutOfMemory { bytes: page_size }, pool.allocate().unwrap_err());
    assert_eq!(0, pool.number_chunks());
    assert_eq!(0, pool.capacity());

    //  The pool remains usable.
    platform.set_failing(false);

    let partition = pool.allocate().expect("Allocated");

    assert_eq!(1, pool.number_chunks());

    unsafe { pool.deallocate(partition) };
}

#[test]
fn out_of_memory_initial() {
    let platform = CountingPlatform::default();
    platform.set_failing(true);

    let config = GrowableConfig::new(16).with_initial_partitions(2);

    let error = GrowablePool::with_platform(config, platform.clone()).err().expect("Failed");

    assert!(matches!(error, PoolError::Alloc(AllocError::OutOfMemory { .. })), "{:?}", error);
    assert_eq!(0, platform.allocated());
}

#[test]
fn out_of_memory_overflow() {
    let half = usize::MAX / 2;

    let (pool, platform) = counting_pool(GrowableConfig::new(16).with_min_chunk_partitions(half).with_max_chunk_partitions(half));

    assert_eq!(AllocError::OutOfMemory { bytes: usize::MAX }, pool.allocate().unwrap_err());
    assert_eq!(0, platform.allocated());
}

#[test]
fn teardown_releases_chunks() {
    for _ in 0..10 {
        let (pool, platform) = counting_pool(GrowableConfig::new(32).with_initial_partitions(2));

        let per_page = platform.page_size().value() / 32;

        //  Spread over several chunks, and keep some outstanding.
        let mut partitions: Vec<_> = (0..(3 * per_page)).map(|_| pool.allocate().expect("Allocated")).collect();

        for partition in partitions.drain(per_page..) {
            unsafe { pool.deallocate(partition) };
        }

        let chunks = pool.number_chunks();

        assert!(chunks >= 2, "{}", chunks);

        drop(partitions);
        drop(pool);

        assert_eq!(chunks, platform.allocated());
        assert_eq!(chunks, platform.deallocated());
    }
}

#[test]
fn invalid_configuration() {
    assert!(matches!(GrowablePool::new(GrowableConfig::new(4)), Err(PoolError::Config(_))));
    assert!(matches!(GrowablePool::new(GrowableConfig::new(16).with_min_chunk_partitions(0)), Err(PoolError::Config(_))));
    assert!(matches!(GrowablePool::new(GrowableConfig::new(16).with_initial_partitions(1)), Err(PoolError::Config(_))));
}
