//! Links
//!
//! The link stored in a free partition designates the next free partition. How it designates it depends on the
//! backing storage of the pool:
//!
//! -   `HeapLinks`: the link is the address of the next partition, for storage living as long as the process.
//! -   `MappedLinks`: the link is an offset from the base of the mapping, for storage which may be re-mapped at a
//!     different address, and a never-written link designates the partition immediately following.
//!
//! In both cases, the raw value `END_OF_LIST` designates the end of the list.

use core::ptr::NonNull;

use crate::PartitionLayout;

/// The raw link designating the end of the list.
///
/// Since partitions are aligned, neither an address nor an offset of a partition can ever collide with it.
pub const END_OF_LIST: usize = PartitionLayout::ALIGNMENT.value() - 1;

/// Strategy to encode and decode the link stored in a free partition.
pub trait Links {
    /// Encodes the link to `next`, or to the end of the list if None.
    fn encode(&self, next: Option<NonNull<u8>>) -> usize;

    /// Decodes the `link` read from the free partition at `partition`.
    ///
    /// The link may be garbage, if another thread popped `partition` after it was read; the result is then discarded,
    /// but this function must not invoke Undefined Behavior.
    fn decode(&self, partition: NonNull<u8>, link: usize) -> Option<NonNull<u8>>;
}

/// Links for partitions of storage owned by the process: the link is the address of the next partition.
#[derive(Clone, Copy, Debug, Default)]
pub struct HeapLinks;

impl Links for HeapLinks {
    fn encode(&self, next: Option<NonNull<u8>>) -> usize {
        next.map(|next| next.as_ptr() as usize).unwrap_or(END_OF_LIST)
    }

    fn decode(&self, _: NonNull<u8>, link: usize) -> Option<NonNull<u8>> {
        //  Blocks are entirely linked before being spliced, a 0 link can only be garbage.
        if link == END_OF_LIST {
            return None;
        }

        NonNull::new(link as *mut u8)
    }
}

/// Links for partitions of a mapped region: the link is the offset of the next partition from the base.
///
/// A link of 0 designates a partition which was never linked since the region was zeroed; its successor is the
/// partition immediately following, unless it is the last partition of the region.
#[derive(Clone, Copy, Debug)]
pub struct MappedLinks {
    base: NonNull<u8>,
    first: usize,
    end: usize,
    partition_size: usize,
}

impl MappedLinks {
    /// Creates an instance, for partitions in `[base + first, base + end)`.
    ///
    /// #   Safety
    ///
    /// -   Assumes that `base` is aligned on `PartitionLayout::ALIGNMENT`.
    /// -   Assumes that `first` is strictly positive, and a multiple of `PartitionLayout::ALIGNMENT`.
    /// -   Assumes that `end - first` is a strictly positive multiple of `layout.size()`.
    /// -   Assumes that `base + end` does not overflow.
    pub unsafe fn new(base: NonNull<u8>, first: usize, end: usize, layout: PartitionLayout) -> Self {
        let partition_size = layout.size();

        debug_assert!(first > 0 && first % PartitionLayout::ALIGNMENT == 0, "Invalid first: {}", first);
        debug_assert!(end > first && (end - first) % partition_size == 0,
            "Invalid end: {} (first: {}, partition: {})", end, first, partition_size);

        Self { base, first, end, partition_size }
    }

    /// Returns the first partition.
    pub fn first(&self) -> NonNull<u8> {
        //  Safety:
        //  -   `first` is within the region, and `base` is not null.
        unsafe { NonNull::new_unchecked(self.base.as_ptr().add(self.first)) }
    }

    /// Returns the number of partitions in the region.
    pub fn number_partitions(&self) -> usize { (self.end - self.first) / self.partition_size }

    /// Returns the partition at `offset` from the base, if `offset` designates one.
    pub fn partition_at(&self, offset: usize) -> Option<NonNull<u8>> {
        if offset < self.first || offset >= self.end || (offset - self.first) % self.partition_size != 0 {
            return None;
        }

        //  Safety:
        //  -   `offset` is within the region, and `base` is not null.
        Some(unsafe { NonNull::new_unchecked(self.base.as_ptr().add(offset)) })
    }

    /// Returns the offset of `partition` from the base.
    pub fn offset_of(&self, partition: NonNull<u8>) -> usize {
        let offset = (partition.as_ptr() as usize).wrapping_sub(self.base.as_ptr() as usize);

        debug_assert!(self.partition_at(offset).is_some(), "{:x} not a partition of {:?}", partition.as_ptr() as usize, self);

        offset
    }
}

impl Links for MappedLinks {
    fn encode(&self, next: Option<NonNull<u8>>) -> usize {
        next.map(|next| self.offset_of(next)).unwrap_or(END_OF_LIST)
    }

    fn decode(&self, partition: NonNull<u8>, link: usize) -> Option<NonNull<u8>> {
        match link {
            0 => {
                //  Never linked: the successor is the adjacent partition.
                let next = (partition.as_ptr() as usize).wrapping_add(self.partition_size);
                let end = self.base.as_ptr() as usize + self.end;

                if next == end { None } else { NonNull::new(next as *mut u8) }
            },
            END_OF_LIST => None,
            offset => NonNull::new((self.base.as_ptr() as usize).wrapping_add(offset) as *mut u8),
        }
    }
}

//  Safety:
//  -   `MappedLinks` is a plain description of the region, it never accesses the memory itself.
unsafe impl Send for MappedLinks {}

//  Safety:
//  -   `MappedLinks` is a plain description of the region, it never accesses the memory itself.
unsafe impl Sync for MappedLinks {}

#[cfg(test)]
mod tests {

use super::*;

#[repr(align(4096))]
struct Region([u8; 128]);

fn layout(size: usize) -> PartitionLayout { PartitionLayout::new(size).expect("Valid") }

fn address(pointer: Option<NonNull<u8>>) -> Option<usize> { pointer.map(|p| p.as_ptr() as usize) }

#[test]
fn heap_links_round_trip() {
    let region = Region([0; 128]);
    let partition = NonNull::from(&region.0[16]);

    let links = HeapLinks;

    assert_eq!(END_OF_LIST, links.encode(None));
    assert_eq!(partition.as_ptr() as usize, links.encode(Some(partition)));

    assert_eq!(None, links.decode(partition, END_OF_LIST));
    assert_eq!(None, links.decode(partition, 0));
    assert_eq!(Some(partition), links.decode(partition, links.encode(Some(partition))));
}

#[test]
fn mapped_links_partition_at() {
    let region = Region([0; 128]);
    let base = NonNull::from(&region.0[0]);
    let links = unsafe { MappedLinks::new(base, 64, 128, layout(16)) };

    let base = base.as_ptr() as usize;

    assert_eq!(4, links.number_partitions());
    assert_eq!(base + 64, links.first().as_ptr() as usize);

    assert_eq!(None, address(links.partition_at(0)));
    assert_eq!(None, address(links.partition_at(48)));
    assert_eq!(Some(base + 64), address(links.partition_at(64)));
    assert_eq!(None, address(links.partition_at(72)));
    assert_eq!(Some(base + 112), address(links.partition_at(112)));
    assert_eq!(None, address(links.partition_at(128)));
}

#[test]
fn mapped_links_encode() {
    let region = Region([0; 128]);
    let base = NonNull::from(&region.0[0]);
    let links = unsafe { MappedLinks::new(base, 64, 128, layout(16)) };

    assert_eq!(END_OF_LIST, links.encode(None));
    assert_eq!(64, links.encode(links.partition_at(64)));
    assert_eq!(96, links.encode(links.partition_at(96)));
}

#[test]
fn mapped_links_decode() {
    let region = Region([0; 128]);
    let base = NonNull::from(&region.0[0]);
    let links = unsafe { MappedLinks::new(base, 64, 128, layout(16)) };

    let at = |offset: usize| links.partition_at(offset).expect("Partition");
    let base = base.as_ptr() as usize;

    //  Never linked: adjacent partition, or end of list for the last one.
    assert_eq!(Some(base + 80), address(links.decode(at(64), 0)));
    assert_eq!(Some(base + 112), address(links.decode(at(96), 0)));
    assert_eq!(None, address(links.decode(at(112), 0)));

    //  Explicitly linked.
    assert_eq!(None, address(links.decode(at(64), END_OF_LIST)));
    assert_eq!(Some(base + 112), address(links.decode(at(64), 112)));
    assert_eq!(Some(base + 64), address(links.decode(at(112), 64)));
}

} // mod tests
