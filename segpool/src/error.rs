//! Errors reported by the pools.

use std::{io, path::PathBuf};

use segpool_core::LayoutError;

/// The configuration of a pool is invalid, or inconsistent with its backing file.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// The partition size is unusable.
    #[error("invalid partition layout: {0}")]
    Layout(#[from] LayoutError),
    /// The growth bounds do not satisfy `2 <= min <= max`.
    #[error("growth bounds must satisfy 2 <= min ({min}) <= max ({max})")]
    InvalidGrowthBounds {
        /// The minimum number of partitions per chunk.
        min: usize,
        /// The maximum number of partitions per chunk.
        max: usize,
    },
    /// The initial number of partitions is neither 0 nor at least 2.
    #[error("initial partitions ({initial}) must be either 0 or at least 2")]
    InvalidInitialPartitions {
        /// The requested initial number of partitions.
        initial: usize,
    },
    /// A missing file cannot be opened read-only.
    #[error("cannot map a missing file read-only")]
    ReadOnlyMissingFile,
    /// A read-only mapping cannot be zero-initialized.
    #[error("cannot zero-initialize a read-only mapping")]
    ReadOnlyZeroInit,
    /// A missing file cannot be created without a mapping size.
    #[error("cannot create a mapping of unspecified size")]
    UnknownMappingSize,
    /// A file of the wrong size cannot be zero-initialized.
    #[error("cannot zero-initialize a file of the wrong size")]
    ZeroInitWrongSize,
    /// The mapping cannot hold a single partition past its header.
    #[error("mapping of {size} bytes cannot hold a partition past its header of {header} bytes")]
    MappingTooSmall {
        /// The size of the mapping.
        size: usize,
        /// The size of the header.
        header: usize,
    },
    /// The header of the file is not recognized.
    #[error("file header is corrupt")]
    CorruptHeader,
    /// The file was laid out for partitions of a different size.
    #[error("file holds partitions of {existing} bytes, not {requested} bytes")]
    PartitionSizeMismatch {
        /// The partition size recorded in the file.
        existing: usize,
        /// The requested partition size.
        requested: usize,
    },
    /// The file is still marked open, its last user did not close it.
    #[error("file was not closed cleanly")]
    UncleanShutdown,
}

/// A pool failed to hand out a partition.
///
/// The pool remains usable; deallocations still succeed.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
pub enum AllocError {
    /// The platform could not provide a new chunk.
    #[error("out of memory, could not allocate a chunk of {bytes} bytes")]
    OutOfMemory {
        /// The size of the chunk requested, or `usize::MAX` if its computation overflowed.
        bytes: usize,
    },
    /// All the partitions of the mapping are in use.
    #[error("all partitions are in use")]
    Exhausted,
}

/// A pool could not be constructed, or closed.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The initial chunk could not be allocated.
    #[error(transparent)]
    Alloc(#[from] AllocError),
    /// An I/O operation on the backing file failed.
    #[error("I/O error on {path:?}")]
    Io {
        /// The path of the backing file.
        path: PathBuf,
        /// The underlying error.
        source: io::Error,
    },
}

impl PoolError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();

        move |source| PoolError::Io { path, source }
    }
}

impl From<LayoutError> for PoolError {
    fn from(error: LayoutError) -> Self { PoolError::Config(error.into()) }
}

// mod tests
