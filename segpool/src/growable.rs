//! A pool which grows on demand, by requesting chunks of pages from the platform.
//!
//! The pool never returns its chunks to the platform until it is dropped.

use std::{alloc::Layout, ptr::NonNull};

use parking_lot::Mutex;
use segpool_core::{FreeList, HeapLinks, PartitionLayout, Platform};
use tracing::{debug, trace, warn};

use crate::{AllocError, ConfigError, PagePlatform, Partition, Pool, PoolError};

/// The configuration of a `GrowablePool`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct GrowableConfig {
    /// The size of each partition, in bytes.
    pub partition_size: usize,
    /// The number of partitions allocated at construction, 0 to allocate on first use.
    pub initial_partitions: usize,
    /// The minimum number of partitions of a chunk.
    pub min_chunk_partitions: usize,
    /// The maximum number of partitions of a chunk.
    pub max_chunk_partitions: usize,
}

impl GrowableConfig {
    /// The default minimum number of partitions of a chunk.
    pub const DEFAULT_MIN_CHUNK_PARTITIONS: usize = 2;

    /// The default maximum number of partitions of a chunk.
    pub const DEFAULT_MAX_CHUNK_PARTITIONS: usize = 1 << 20;

    /// Creates a configuration with default growth bounds, and no initial partition.
    pub fn new(partition_size: usize) -> Self {
        Self {
            partition_size,
            initial_partitions: 0,
            min_chunk_partitions: Self::DEFAULT_MIN_CHUNK_PARTITIONS,
            max_chunk_partitions: Self::DEFAULT_MAX_CHUNK_PARTITIONS,
        }
    }

    /// Sets the number of partitions allocated at construction.
    pub fn with_initial_partitions(mut self, partitions: usize) -> Self {
        self.initial_partitions = partitions;
        self
    }

    /// Sets the minimum number of partitions of a chunk.
    pub fn with_min_chunk_partitions(mut self, partitions: usize) -> Self {
        self.min_chunk_partitions = partitions;
        self
    }

    /// Sets the maximum number of partitions of a chunk.
    pub fn with_max_chunk_partitions(mut self, partitions: usize) -> Self {
        self.max_chunk_partitions = partitions;
        self
    }

    /// Validates the configuration, returning the layout of its partitions.
    pub fn validate(&self) -> Result<PartitionLayout, ConfigError> {
        let layout = PartitionLayout::new(self.partition_size)?;

        let (min, max) = (self.min_chunk_partitions, self.max_chunk_partitions);

        if min < 2 || min > max {
            return Err(ConfigError::InvalidGrowthBounds { min, max });
        }

        if self.initial_partitions == 1 {
            return Err(ConfigError::InvalidInitialPartitions { initial: self.initial_partitions });
        }

        Ok(layout)
    }
}

/// GrowablePool
///
/// A pool of partitions, handed out from a lock-free free list, which grows whenever the free list runs dry.
///
/// Growth is serialized: the thread which finds the free list empty takes the growth lock, and the threads waiting
/// on it find the list refilled once they obtain it. The size of each new chunk is the number of partitions already
/// linked, clamped within the configured bounds, so that the pool roughly doubles until it reaches the maximum.
pub struct GrowablePool<P: Platform = PagePlatform> {
    free_list: FreeList<HeapLinks>,
    growth: Mutex<Growth>,
    layout: PartitionLayout,
    min_chunk_partitions: usize,
    max_chunk_partitions: usize,
    platform: P,
}

impl GrowablePool<PagePlatform> {
    /// Creates a pool, backed by pages of the OS.
    pub fn new(config: GrowableConfig) -> Result<Self, PoolError> {
        Self::with_platform(config, PagePlatform::new())
    }
}

impl<P: Platform> GrowablePool<P> {
    /// Creates a pool, backed by the specified platform.
    ///
    /// The initial chunk, if any, is allocated immediately.
    pub fn with_platform(config: GrowableConfig, platform: P) -> Result<Self, PoolError> {
        let layout = config.validate()?;

        let pool = Self {
            free_list: FreeList::new(HeapLinks),
            growth: Mutex::new(Growth::default()),
            layout,
            min_chunk_partitions: config.min_chunk_partitions,
            max_chunk_partitions: config.max_chunk_partitions,
            platform,
        };

        if config.initial_partitions > 0 {
            let mut growth = pool.growth.lock();
            pool.add_chunk(&mut growth, config.initial_partitions)?;
            drop(growth);
        }

        Ok(pool)
    }

    /// Returns the size of the partitions, in bytes.
    pub fn partition_size(&self) -> usize { self.layout.size() }

    /// Returns a reference to the platform.
    pub fn platform(&self) -> &P { &self.platform }

    /// Allocates a partition, growing the pool if necessary.
    ///
    /// Fails only if the platform cannot provide a new chunk; the pool remains usable.
    pub fn allocate(&self) -> Result<Partition, AllocError> {
        loop {
            if let Some(partition) = self.free_list.pop() {
                return Ok(Partition::new(partition));
            }

            self.grow()?;
        }
    }

    /// Deallocates a partition.
    ///
    /// #   Safety
    ///
    /// -   Assumes that `partition` was allocated by this very pool.
    pub unsafe fn deallocate(&self, partition: Partition) {
        //  Safety:
        //  -   `partition` was allocated by this pool, hence belongs to one of its chunks.
        //  -   `partition` is consumed, hence exclusively accessible.
        self.free_list.push(partition.into_raw());
    }

    /// Returns the number of partitions ever linked into the pool.
    #[doc(hidden)]
    pub fn capacity(&self) -> usize { self.growth.lock().partitions }

    /// Returns the number of chunks allocated from the platform.
    #[doc(hidden)]
    pub fn number_chunks(&self) -> usize { self.growth.lock().chunks.len() }

    #[cold]
    #[inline(never)]
    fn grow(&self) -> Result<(), AllocError> {
        let mut growth = self.growth.lock();

        //  Another thread may have grown the pool whilst this one was waiting for the lock.
        if !self.free_list.is_empty() {
            trace!("free list refilled whilst waiting, skipping growth");
            return Ok(());
        }

        let partitions = growth.partitions.clamp(self.min_chunk_partitions, self.max_chunk_partitions);

        self.add_chunk(&mut growth, partitions)
    }

    //  Requests a chunk of at least `partitions` partitions from the platform, and splices it onto the free list.
    //
    //  The chunk is rounded up to a whole number of pages, and all whole partitions within are linked.
    fn add_chunk(&self, growth: &mut Growth, partitions: usize) -> Result<(), AllocError> {
        const OVERFLOW: AllocError = AllocError::OutOfMemory { bytes: usize::MAX };

        let partition_size = self.layout.size();
        let page_size = self.platform.page_size();

        let bytes = partitions.checked_mul(partition_size)
            .and_then(|bytes| page_size.round_up(bytes))
            .ok_or(OVERFLOW)?;

        let layout = Layout::from_size_align(bytes, page_size.value()).map_err(|_| OVERFLOW)?;

        //  Safety:
        //  -   `layout.size()` is a multiple of `layout.align()`, which is the page size.
        let Some(pointer) = (unsafe { self.platform.allocate(layout) }) else {
            warn!(bytes, partitions, "failed to allocate chunk");
            return Err(AllocError::OutOfMemory { bytes });
        };

        let chunk = Chunk { pointer, layout };
        let linked = bytes / partition_size;

        //  Safety:
        //  -   `pointer` points to at least `bytes` writeable bytes, owned by the pool until it is dropped.
        if let Err(error) = unsafe { self.free_list.link_and_splice(pointer, linked * partition_size, self.layout) } {
            warn!(%error, bytes, "platform returned an unusable chunk");

            //  Safety:
            //  -   `chunk` was allocated by `self.platform`, and was not spliced.
            unsafe { chunk.release(&self.platform) };

            return Err(AllocError::OutOfMemory { bytes });
        }

        growth.chunks.push(chunk);
        growth.partitions += linked;

        debug!(partitions = linked, bytes, total = growth.partitions, "grew pool");

        Ok(())
    }
}

impl<P: Platform> Pool for GrowablePool<P> {
    fn partition_size(&self) -> usize { self.partition_size() }

    fn allocate(&self) -> Result<Partition, AllocError> { self.allocate() }

    unsafe fn deallocate(&self, partition: Partition) { self.deallocate(partition) }
}

impl<P: Platform> Drop for GrowablePool<P> {
    fn drop(&mut self) {
        let platform = &self.platform;

        for chunk in self.growth.get_mut().chunks.drain(..) {
            //  Safety:
            //  -   `chunk` was allocated by `platform`, and the partitions within are no longer accessible.
            unsafe { chunk.release(platform) };
        }
    }
}

//
//  Implementation Details
//

#[derive(Default)]
struct Growth {
    chunks: Vec<Chunk>,
    partitions: usize,
}

struct Chunk {
    pointer: NonNull<u8>,
    layout: Layout,
}

impl Chunk {
    //  #   Safety
    //
    //  -   Assumes that the chunk was allocated by `platform`, and is no longer referenced.
    unsafe fn release<P: Platform>(self, platform: &P) {
        platform.deallocate(self.pointer, self.layout);
    }
}

//  Safety:
//  -   The chunk is only a record, accessed under the growth lock, to release the memory on drop.
unsafe impl Send for Chunk {}

// mod tests
