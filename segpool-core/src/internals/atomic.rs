//! Atomic words of the free list.
//!
//! All the orderings of the free list are spelled out here, and nowhere else.

use core::{
    ptr::NonNull,
    sync::atomic::{AtomicUsize, Ordering},
};

use super::tagged_pointer::TaggedPointer;

/// The head of a free list.
pub(crate) struct AtomicTaggedPointer(AtomicUsize);

impl AtomicTaggedPointer {
    /// Creates an instance.
    pub(crate) const fn new(head: TaggedPointer) -> Self { Self(AtomicUsize::new(head.into_raw())) }

    /// Loads the head, prior to reading its link.
    ///
    /// Synchronizes-with the `Release` exchange of the push (or splice) which installed this head, hence the link of
    /// the head is visible.
    pub(crate) fn load_for_pop(&self) -> TaggedPointer { TaggedPointer::from_raw(self.0.load(Ordering::Acquire)) }

    /// Loads the head, prior to linking a partition to it.
    ///
    /// The value is only used as expected value of `exchange_for_push`, and as link; no memory is read through it.
    pub(crate) fn load_for_push(&self) -> TaggedPointer { TaggedPointer::from_raw(self.0.load(Ordering::Relaxed)) }

    /// Attempts to replace `current` by `new`, as part of a pop.
    ///
    /// On failure, returns the current head, loaded with the same guarantees as `load_for_pop`.
    pub(crate) fn exchange_for_pop(&self, current: TaggedPointer, new: TaggedPointer) -> Result<(), TaggedPointer> {
        self.0.compare_exchange_weak(current.into_raw(), new.into_raw(), Ordering::Acquire, Ordering::Acquire)
            .map(|_| ())
            .map_err(TaggedPointer::from_raw)
    }

    /// Attempts to replace `current` by `new`, as part of a push.
    ///
    /// On success, publishes the link written to the new head.
    pub(crate) fn exchange_for_push(&self, current: TaggedPointer, new: TaggedPointer) -> Result<(), TaggedPointer> {
        self.0.compare_exchange_weak(current.into_raw(), new.into_raw(), Ordering::Release, Ordering::Relaxed)
            .map(|_| ())
            .map_err(TaggedPointer::from_raw)
    }
}

/// The link of a free partition, aliased over its first word.
///
/// The link is read by `pop` even though, by the time it is read, another thread may have popped the partition and
/// started writing to it. The CAS on the head then fails, and the value read is discarded; the access being atomic,
/// this race is benign.
#[repr(transparent)]
pub(crate) struct AtomicLink(AtomicUsize);

impl AtomicLink {
    /// Returns a reference to the link of the partition at `partition`.
    ///
    /// #   Safety
    ///
    /// -   Assumes that `partition` points to readable memory of at least one `usize`, suitably aligned.
    /// -   Assumes that the memory remains mapped for `'a`.
    pub(crate) unsafe fn of<'a>(partition: NonNull<u8>) -> &'a AtomicLink { &*(partition.as_ptr() as *const AtomicLink) }

    /// Loads the raw link.
    ///
    /// Ordered by the `Acquire` load of the head from which `self` was reached.
    pub(crate) fn load(&self) -> usize { self.0.load(Ordering::Relaxed) }

    /// Stores the raw link.
    ///
    /// Ordered by the `Release` exchange of the head which publishes `self`.
    pub(crate) fn store(&self, link: usize) { self.0.store(link, Ordering::Relaxed) }
}
