//! A pointer to a free partition, packed with a generation counter.
//!
//! Every partition is aligned on at least `PartitionLayout::ALIGNMENT`, hence the low bits of its address are always
//! 0. Those bits are used to store a generation counter, incremented on each modification of the head of a free list,
//! so that a compare-and-swap on the head fails if the head was modified, even if it now points to the same address.
//!
//! The empty list is the null address, still carrying its generation: going through an empty list does not reset the
//! counter, hence popping the last partition then pushing it back yields a different word than before.
//!
//! #   Limitation
//!
//! The generation counter is only `TAG_BITS` wide (3 bits on 64-bit platforms) and wraps around. Every successful
//! exchange of the head, be it a pop, a push or a splice, increments it by one. A `pop` suspended between reading the
//! head and attempting its exchange therefore succeeds wrongly only if, in the meantime, the head was exchanged a
//! non-zero multiple of `2^TAG_BITS` times and the very same partition is back on top.

use core::ptr::NonNull;

use crate::PartitionLayout;

/// A pointer to a partition, and a generation counter, packed in a single machine word.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct TaggedPointer(usize);

impl TaggedPointer {
    /// Number of bits available for the generation.
    pub(crate) const TAG_BITS: u32 = PartitionLayout::ALIGNMENT.bit_index();

    /// Mask of the generation bits.
    pub(crate) const TAG_MASK: usize = (1usize << Self::TAG_BITS) - 1;

    /// Mask of the pointer bits.
    pub(crate) const POINTER_MASK: usize = !Self::TAG_MASK;

    /// The empty list, at generation 0.
    ///
    /// A null address never designates a partition, hence no valid pointer + generation pair can collide with it.
    pub(crate) const EMPTY: TaggedPointer = TaggedPointer(0);

    /// Creates a new instance.
    ///
    /// If `pointer` is None, the result is the empty list, at `generation`.
    ///
    /// The low bits of `pointer` are expected to be 0, and are discarded otherwise.
    pub(crate) fn new(pointer: Option<NonNull<u8>>, generation: usize) -> Self {
        match pointer {
            Some(pointer) => {
                //  The link read by a losing `pop` may be garbage, hence the masking.
                let address = pointer.as_ptr() as usize & Self::POINTER_MASK;

                Self(address | (generation & Self::TAG_MASK))
            },
            None => Self(generation & Self::TAG_MASK),
        }
    }

    /// Creates an instance from its raw representation, as obtained by `into_raw`.
    pub(crate) const fn from_raw(raw: usize) -> Self { Self(raw) }

    /// Returns the raw representation.
    pub(crate) const fn into_raw(self) -> usize { self.0 }

    /// Returns whether this is the empty list, whatever its generation.
    pub(crate) fn is_empty(&self) -> bool { self.pointer().is_none() }

    /// Returns the pointer, or None if empty.
    pub(crate) fn pointer(&self) -> Option<NonNull<u8>> { NonNull::new((self.0 & Self::POINTER_MASK) as *mut u8) }

    /// Returns the generation.
    pub(crate) fn generation(&self) -> usize { self.0 & Self::TAG_MASK }

    /// Returns the value that should replace `self` as head of the list, to point at `pointer` instead.
    ///
    /// The generation of the result is one higher, modulo `2^TAG_BITS`.
    pub(crate) fn successor(&self, pointer: Option<NonNull<u8>>) -> Self {
        Self::new(pointer, self.generation().wrapping_add(1))
    }
}

// mod tests
