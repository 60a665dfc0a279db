//! A lock-free segregated storage: a stack of free partitions.
//!
//! Free partitions are linked intrusively, through their first word, and the top of the stack is a `TaggedPointer`
//! to defeat ABA during concurrent pops.
//!
//! #   Safety
//!
//! The free list assumes that the partitions linked within are:
//!
//! -   Exclusively accessible through the list; ie, the list _owns_ them.
//! -   Remain mapped as long as the list is used, even after being popped.
//!
//! The latter requirement stems from `pop` reading the link of the head it observed, even though this head may be
//! popped, and handed out, by another thread in the meantime.

use core::ptr::NonNull;

use crate::{LayoutError, Links, NoHook, PartitionLayout, PopHook};

use super::atomic::{AtomicLink, AtomicTaggedPointer};
use super::tagged_pointer::TaggedPointer;

/// FreeList
///
/// A stack of free partitions, safe to `pop` from and `push` to concurrently from any number of threads.
pub struct FreeList<L, H = NoHook> {
    head: AtomicTaggedPointer,
    links: L,
    hook: H,
}

impl<L> FreeList<L, NoHook> {
    /// Creates an empty instance.
    pub fn new(links: L) -> Self { Self::with_hook(links, NoHook) }
}

impl<L, H> FreeList<L, H> {
    /// Creates an empty instance, with an instrumentation hook.
    pub fn with_hook(links: L, hook: H) -> Self {
        let head = AtomicTaggedPointer::new(TaggedPointer::EMPTY);

        Self { head, links, hook, }
    }

    /// Returns a reference to the links.
    pub fn links(&self) -> &L { &self.links }

    /// Returns a reference to the hook.
    pub fn hook(&self) -> &H { &self.hook }

    /// Checks whether the list is empty, or not.
    ///
    /// The answer may be stale by the time it is returned.
    pub fn is_empty(&self) -> bool { self.head.load_for_push().is_empty() }

    /// Returns the partition at the top of the list, if any.
    ///
    /// The answer may be stale by the time it is returned.
    pub fn top(&self) -> Option<NonNull<u8>> { self.head.load_for_pop().pointer() }
}

impl<L, H> FreeList<L, H>
    where
        L: Links,
        H: PopHook,
{
    /// Creates an instance whose top is `head`.
    ///
    /// #   Safety
    ///
    /// -   Assumes that `head`, and all partitions reachable from it through `links`, are owned by the list.
    pub unsafe fn with_head(links: L, head: Option<NonNull<u8>>, hook: H) -> Self {
        let head = AtomicTaggedPointer::new(TaggedPointer::new(head, 0));

        Self { head, links, hook, }
    }

    /// Pops the top partition, if any.
    ///
    /// The returned partition, if any, is guaranteed to be exclusively accessible by the caller.
    pub fn pop(&self) -> Option<NonNull<u8>> {
        //  WARNING:
        //
        //  Due to concurrency, another thread may pop `head` and start using it prior to this call terminating.
        //
        //  DO NOT WRITE to `head` before having exclusive ownership of it.
        let mut current = self.head.load_for_pop();

        loop {
            let head = current.pointer()?;

            //  Safety:
            //  -   `head` is, or was, a partition of the list, and partitions remain mapped.
            let link = unsafe { AtomicLink::of(head) }.load();
            let next = self.links.decode(head, link);

            self.hook.before_exchange(head, next);

            match self.head.exchange_for_pop(current, current.successor(next)) {
                Ok(()) => return Some(head),
                Err(observed) => current = observed,
            }
        }
    }

    /// Pushes a partition at the top.
    ///
    /// #   Safety
    ///
    /// -   Assumes that `partition` is not already in the list.
    /// -   Assumes that `partition` belongs to the storage managed by the list, and is exclusively accessible.
    /// -   Assumes that the caller no longer accesses `partition`.
    pub unsafe fn push(&self, partition: NonNull<u8>) {
        debug_assert!(partition.as_ptr() as usize % PartitionLayout::ALIGNMENT == 0,
            "Misaligned partition: {:x}", partition.as_ptr() as usize);

        let link = AtomicLink::of(partition);
        let mut current = self.head.load_for_push();

        loop {
            link.store(self.links.encode(current.pointer()));

            match self.head.exchange_for_push(current, current.successor(Some(partition))) {
                Ok(()) => return,
                Err(observed) => current = observed,
            }
        }
    }

    /// Links all the partitions of `block` together, then splices them on top of the list.
    ///
    /// Returns the number of partitions added, or an error if `block` cannot be carved into at least 2 partitions.
    ///
    /// Concurrent calls to `pop` and `push` are fine, but the caller is expected to serialize the calls to this
    /// function, which is typically invoked as the list runs dry.
    ///
    /// #   Safety
    ///
    /// -   Assumes that `block` points to at least `block_size` writeable bytes.
    /// -   Assumes that the block is exclusively owned by the list from then on, and outlives it.
    pub unsafe fn link_and_splice(&self, block: NonNull<u8>, block_size: usize, layout: PartitionLayout)
        -> Result<usize, LayoutError>
    {
        layout.check_block_alignment(block)?;

        let partitions = layout.partitions_in(block_size)?;
        let partition_size = layout.size();

        let partition = |index: usize| {
            //  Safety:
            //  -   `index < partitions`, hence within the block.
            NonNull::new_unchecked(block.as_ptr().add(index * partition_size))
        };

        for index in 0..(partitions - 1) {
            AtomicLink::of(partition(index)).store(self.links.encode(Some(partition(index + 1))));
        }

        let last = AtomicLink::of(partition(partitions - 1));
        let mut current = self.head.load_for_push();

        loop {
            last.store(self.links.encode(current.pointer()));

            match self.head.exchange_for_push(current, current.successor(Some(block))) {
                Ok(()) => return Ok(partitions),
                Err(observed) => current = observed,
            }
        }
    }
}

// mod tests
