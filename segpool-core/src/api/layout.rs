//! The layout of partitions.
//!
//! A partition is the unit of allocation. Whilst free, its first word holds the link to the next free partition;
//! it must therefore be able to hold a `usize`, suitably aligned.

use core::{mem, num::NonZeroUsize, ptr::NonNull};

use crate::PowerOf2;
use crate::utils;

/// The validated size of the partitions of a pool.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct PartitionLayout(NonZeroUsize);

impl PartitionLayout {
    /// The minimum size of a partition.
    pub const MIN_SIZE: usize = mem::size_of::<usize>();

    /// The alignment of every partition; the size of a partition is a multiple of it.
    pub const ALIGNMENT: PowerOf2 = PowerOf2::align_of::<usize>();

    /// Creates a new instance.
    ///
    /// Returns an error if `size` is either smaller than `MIN_SIZE` or not a multiple of `ALIGNMENT`.
    pub fn new(size: usize) -> Result<Self, LayoutError> {
        if size < Self::MIN_SIZE {
            return Err(LayoutError::PartitionTooSmall { size, minimum: Self::MIN_SIZE });
        }

        if size % Self::ALIGNMENT != 0 {
            return Err(LayoutError::MisalignedPartition { size, alignment: Self::ALIGNMENT.value() });
        }

        //  Safety:
        //  -   `size >= MIN_SIZE > 0`.
        Ok(Self(unsafe { NonZeroUsize::new_unchecked(size) }))
    }

    /// Returns the size of a partition, in bytes.
    pub fn size(&self) -> usize { self.0.get() }

    /// Returns the number of partitions in a block of `block_size` bytes.
    ///
    /// A block must contain an exact number of partitions, and at least 2 of them, so that it can be linked
    /// internally before being spliced onto a free list.
    pub fn partitions_in(&self, block_size: usize) -> Result<usize, LayoutError> {
        let partition_size = self.size();

        if block_size % partition_size != 0 {
            return Err(LayoutError::RaggedBlock { block_size, partition_size });
        }

        let partitions = block_size / partition_size;

        if partitions < 2 {
            return Err(LayoutError::BlockTooSmall { block_size, partition_size });
        }

        Ok(partitions)
    }

    /// Checks that `block` is suitably aligned to host partitions.
    pub fn check_block_alignment(&self, block: NonNull<u8>) -> Result<(), LayoutError> {
        if utils::is_sufficiently_aligned_for(block, Self::ALIGNMENT) {
            Ok(())
        } else {
            Err(LayoutError::MisalignedBlock { address: block.as_ptr() as usize, alignment: Self::ALIGNMENT.value() })
        }
    }
}

/// A partition or block layout is not usable.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
pub enum LayoutError {
    /// The partition cannot hold a link.
    #[error("partition size {size} is smaller than a link ({minimum} bytes)")]
    PartitionTooSmall {
        /// The requested partition size.
        size: usize,
        /// The minimum partition size.
        minimum: usize,
    },
    /// The partition size would misalign the partitions following the first.
    #[error("partition size {size} is not a multiple of {alignment}")]
    MisalignedPartition {
        /// The requested partition size.
        size: usize,
        /// The required alignment.
        alignment: usize,
    },
    /// The block size is not a multiple of the partition size.
    #[error("block of {block_size} bytes is not a multiple of the partition size {partition_size}")]
    RaggedBlock {
        /// The size of the block.
        block_size: usize,
        /// The size of a partition.
        partition_size: usize,
    },
    /// The block holds fewer than 2 partitions.
    #[error("block of {block_size} bytes holds fewer than 2 partitions of {partition_size} bytes")]
    BlockTooSmall {
        /// The size of the block.
        block_size: usize,
        /// The size of a partition.
        partition_size: usize,
    },
    /// The block is not aligned on `PartitionLayout::ALIGNMENT`.
    #[error("block at {address:#x} is not aligned on {alignment}")]
    MisalignedBlock {
        /// The address of the block.
        address: usize,
        /// The required alignment.
        alignment: usize,
    },
}

// mod tests
