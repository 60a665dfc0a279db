#![deny(missing_docs)]

//! Lock-free pools of fixed-size partitions.
//!
//! Two pools are provided, both handing out partitions from the lock-free free list of `segpool_core`:
//!
//! -   `GrowablePool`, which requests chunks of pages from the OS whenever it runs dry.
//! -   `MappedPool`, whose partitions live in a file mapped in memory, and persist across restarts.
//!
//! Both implement the `Pool` trait, and hand out move-only `Partition` handles.
//!
//! #   Warning
//!
//! Deallocating a partition to a pool other than the one it was allocated from, or deallocating it twice, corrupts
//! the pool. Neither is detected.

#[cfg(not(unix))]
compile_error!("segpool only supports unix platforms");

mod error;
mod growable;
mod mapped;
mod partition;
mod platform;
mod pool;

pub use error::{AllocError, ConfigError, PoolError};
pub use growable::{GrowableConfig, GrowablePool};
pub use mapped::{AccessMode, FileState, MappedConfig, MappedPool};
pub use partition::Partition;
pub use platform::PagePlatform;
pub use pool::Pool;

pub use segpool_core::{LayoutError, PartitionLayout, Platform, PowerOf2};
