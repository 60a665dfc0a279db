#![cfg_attr(not(test), no_std)]

#![deny(missing_docs)]

//! Building blocks for lock-free fixed-size pools.
//!
//! segpool-core is the engine of fixed-size block pools, built around a lock-free segregated storage. It contains:
//! -   A free list, a stack of free partitions safe to pop from and push to concurrently, protected against ABA by
//!     a generation counter packed in the low bits of its head.
//! -   A links trait, used to interpret the link stored in each free partition, depending on the storage backing the
//!     pool.
//! -   A platform trait, used to allocate large raw blocks of memory to be carved up.
//!
//! #   Contract violations
//!
//! Pushing a partition twice, or a partition which does not belong to the storage of the list, corrupts the list.
//! Such violations are not detected, as detection would defeat the purpose of a lock-free design.

mod api;
mod internals;
mod utils;

pub use api::*;
pub use internals::free_list::FreeList;
pub use utils::PowerOf2;
