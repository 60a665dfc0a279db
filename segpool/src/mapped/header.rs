//! The header at the start of a mapped file.
//!
//! The header records the layout of the file, the head of its free list, and whether it is in use. It is reserved
//! whole partitions, so that the partitions following it are aligned as if they started at the base of the mapping.

use std::ptr::NonNull;

use segpool_core::PartitionLayout;

use crate::ConfigError;

#[repr(C)]
pub(crate) struct Header {
    magic: u64,
    partition_size: u64,
    head: u64,
    state: u64,
}

impl Header {
    //  Room reserved for the header, before rounding up to whole partitions.
    const RESERVED: usize = 64;

    const MAGIC: u64 = u64::from_le_bytes(*b"SEGPOOL1");

    const CLOSED: u64 = 0;
    const OPEN: u64 = 1;

    /// Returns the number of bytes occupied by the header, a whole number of partitions.
    pub(crate) fn size(layout: PartitionLayout) -> usize {
        Self::RESERVED.div_ceil(layout.size()) * layout.size()
    }

    /// Returns the header at `base`.
    ///
    /// #   Safety
    ///
    /// -   Assumes that `base` points to at least `Header::size` bytes, readable and writeable, aligned on 8 bytes.
    /// -   Assumes that no other reference to the header exists for the lifetime `'a`.
    pub(crate) unsafe fn at<'a>(base: NonNull<u8>) -> &'a mut Header {
        debug_assert!(base.as_ptr() as usize % 8 == 0, "Misaligned header: {:x}", base.as_ptr() as usize);

        &mut *(base.as_ptr() as *mut Header)
    }

    /// Returns whether the header was never written, as in a freshly created file.
    pub(crate) fn is_blank(&self) -> bool {
        self.magic == 0 && self.partition_size == 0 && self.head == 0 && self.state == 0
    }

    /// Initializes the header: all the partitions are free, and never linked.
    pub(crate) fn initialize(&mut self, layout: PartitionLayout) {
        self.magic = Self::MAGIC;
        self.partition_size = layout.size() as u64;
        self.head = 0;
        self.state = Self::CLOSED;
    }

    /// Checks the header against `layout`, returning the persisted head link.
    pub(crate) fn check(&self, layout: PartitionLayout) -> Result<usize, ConfigError> {
        if self.magic != Self::MAGIC {
            return Err(ConfigError::CorruptHeader);
        }

        if self.partition_size != layout.size() as u64 {
            let existing = usize::try_from(self.partition_size).unwrap_or(usize::MAX);

            return Err(ConfigError::PartitionSizeMismatch { existing, requested: layout.size() });
        }

        match self.state {
            Self::CLOSED => (),
            Self::OPEN => return Err(ConfigError::UncleanShutdown),
            _ => return Err(ConfigError::CorruptHeader),
        }

        usize::try_from(self.head).map_err(|_| ConfigError::CorruptHeader)
    }

    /// Marks the file as in use.
    pub(crate) fn open(&mut self) { self.state = Self::OPEN; }

    /// Records the head link, and marks the file as no longer in use.
    pub(crate) fn close(&mut self, head: usize) {
        self.head = head as u64;
        self.state = Self::CLOSED;
    }
}

// mod tests
