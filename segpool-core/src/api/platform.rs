//! Platform
//!
//! The Platform trait is used to request memory directly from the Platform, for pools which grow on demand. By
//! abstracting the underlying platform, it becomes possible to easily port the code to a different OS, or to
//! instrument the requests.

use core::{
    alloc::Layout,
    ptr::NonNull,
};

use crate::PowerOf2;

/// Abstraction of platform specific memory allocation and deallocation.
pub trait Platform {
    /// Returns the size of the pages of the platform.
    ///
    /// Requests for memory are rounded up to a multiple of this size.
    fn page_size(&self) -> PowerOf2;

    /// Allocates a fresh block of memory as per the specified layout.
    ///
    /// May return None if the allocation request cannot be satisfied.
    ///
    /// #   Safety
    ///
    /// The caller may assume that if the returned pointer is not None then:
    /// -   The number of usable bytes is _greater than or equal_ to `layout.size()`.
    /// -   The pointer is _at least_ aligned to `layout.align()`.
    ///
    /// `allocate` assumes that:
    /// -   `layout.size()` is a multiple of `layout.align()`.
    /// -   `layout.align()` is at most `self.page_size()`.
    unsafe fn allocate(&self, layout: Layout) -> Option<NonNull<u8>>;

    /// Deallocates the supplied block of memory.
    ///
    /// #   Safety
    ///
    /// The caller should no longer reference the memory after calling this function.
    ///
    /// `deallocate` assumes that:
    /// -   `pointer` was allocated by this instance of `Platform`, with `layout` as argument.
    /// -   `pointer` is the value returned by `Platform`, and not an interior pointer.
    unsafe fn deallocate(&self, pointer: NonNull<u8>, layout: Layout);
}
