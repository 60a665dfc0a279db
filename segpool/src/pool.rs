//! The interface shared by all pools.

use crate::{AllocError, Partition};

/// A pool of fixed-size partitions, safe to allocate from and deallocate to from any number of threads.
pub trait Pool {
    /// Returns the size of the partitions handed out, in bytes.
    fn partition_size(&self) -> usize;

    /// Allocates a partition.
    ///
    /// The partition is aligned on `segpool_core::PartitionLayout::ALIGNMENT`, and its content is unspecified.
    fn allocate(&self) -> Result<Partition, AllocError>;

    /// Deallocates a partition.
    ///
    /// #   Safety
    ///
    /// -   Assumes that `partition` was allocated by this very pool.
    ///
    /// Violations, such as deallocating a partition recreated twice with `Partition::from_raw`, corrupt the pool and
    /// are not detected.
    unsafe fn deallocate(&self, partition: Partition);
}
