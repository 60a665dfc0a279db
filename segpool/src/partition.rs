//! The handle to an allocated partition.

use std::ptr::NonNull;

/// A partition handed out by a pool.
///
/// The handle is move-only: handing it back to its pool consumes it, which prevents deallocating it twice through the
/// same handle.
#[derive(Debug)]
pub struct Partition(NonNull<u8>);

impl Partition {
    pub(crate) fn new(pointer: NonNull<u8>) -> Self { Self(pointer) }

    /// Recreates a handle from a pointer previously obtained by `into_raw`.
    ///
    /// #   Safety
    ///
    /// -   Assumes that `pointer` was obtained by `into_raw`, and that no other handle to it exists.
    pub unsafe fn from_raw(pointer: NonNull<u8>) -> Self { Self(pointer) }

    /// Returns a pointer to the first byte of the partition.
    pub fn as_ptr(&self) -> *mut u8 { self.0.as_ptr() }

    /// Returns a pointer to the first byte of the partition.
    pub fn as_non_null(&self) -> NonNull<u8> { self.0 }

    /// Consumes the handle, returning a pointer to the first byte of the partition.
    pub fn into_raw(self) -> NonNull<u8> { self.0 }
}

//  Safety:
//  -   The partition is exclusively owned by the handle.
unsafe impl Send for Partition {}

//  Safety:
//  -   The handle grants no access to the memory by itself.
unsafe impl Sync for Partition {}
