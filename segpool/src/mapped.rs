//! A pool whose partitions live in a file mapped in memory, usable across restarts.
//!
//! The file starts with a header, followed by the partitions. Links between free partitions are recorded as offsets
//! from the base of the mapping, so the file may be mapped at a different address on each run, and a partition which
//! was never linked has a link of 0, designating the partition right after it. A freshly created, or zeroed, file is
//! therefore a free list of all its partitions, in ascending address order, without a single write.

mod config;
mod header;

pub use config::{AccessMode, FileState, MappedConfig};

use std::{
    fs::{self, File, OpenOptions},
    io,
    path::{Path, PathBuf},
    ptr::{self, NonNull},
};

use segpool_core::{END_OF_LIST, FreeList, Links, MappedLinks, NoHook, PartitionLayout};
use tracing::{debug, info, warn};

use crate::{AllocError, ConfigError, Partition, Pool, PoolError};
use crate::platform::FileMapping;

use header::Header;

/// MappedPool
///
/// A pool of partitions carved out of a file mapping, handed out from a lock-free free list.
///
/// The pool never grows: once all partitions are allocated, further allocations fail until some are deallocated.
///
/// When dropped, or closed, a writeable pool records the head of its free list in the header of the file, so that
/// the next pool opened on the file resumes where it left off.
pub struct MappedPool {
    free_list: FreeList<MappedLinks>,
    mapping: FileMapping,
    layout: PartitionLayout,
    path: PathBuf,
    mode: AccessMode,
    closed: bool,
}

impl MappedPool {
    /// Opens a pool, as per the configuration.
    ///
    /// The configuration is validated against the state of the file before the file is touched.
    pub fn open(config: MappedConfig) -> Result<Self, PoolError> {
        let path = config.path.as_path();

        let layout = PartitionLayout::new(config.partition_size)?;
        let existing = file_length(path)?;

        let state = config.file_state(layout, existing);
        config.validate(state)?;

        let header_size = Header::size(layout);
        let size = mapping_size(&config, existing);

        if size < header_size + layout.size() {
            return Err(ConfigError::MappingTooSmall { size, header: header_size }.into());
        }

        let file = open_file(&config, existing, size).map_err(PoolError::io(path))?;
        let shared = config.mode != AccessMode::ReadOnly;
        let mapping = FileMapping::map(&file, size, shared).map_err(PoolError::io(path))?;

        let base = mapping.base();

        if config.zero_init && config.mode != AccessMode::CreateNew {
            info!(path = %path.display(), size, "discarding previous content of mapping");

            //  Safety:
            //  -   `[base, base + size)` is mapped, and writeable.
            unsafe { ptr::write_bytes(base.as_ptr(), 0, size) };
        }

        let end = header_size + (size - header_size) / layout.size() * layout.size();

        //  Safety:
        //  -   `base` is page-aligned, and followed by at least `header_size` bytes.
        //  -   The mapping is not shared with any other thread yet.
        let header = unsafe { Header::at(base) };

        let fresh = header.is_blank();

        if fresh {
            header.initialize(layout);
        }

        let head_link = header.check(layout)?;

        //  The partitions of a grown file lie beyond the end recorded by the free list.
        let persisted_end = match existing {
            Some(length) if !fresh && length < size && length >= header_size + layout.size() => {
                header_size + (length - header_size) / layout.size() * layout.size()
            },
            _ => end,
        };

        //  Safety:
        //  -   `base` is page-aligned.
        //  -   `header_size` is a strictly positive multiple of the partition size, hence of its alignment.
        //  -   `persisted_end` and `end` are past at least one partition, and within the mapping.
        let (persisted, links) = unsafe {
            (MappedLinks::new(base, header_size, persisted_end, layout), MappedLinks::new(base, header_size, end, layout))
        };

        let head = match head_link {
            0 => Some(persisted.first()),
            END_OF_LIST => None,
            offset => Some(persisted.partition_at(offset).ok_or(ConfigError::CorruptHeader)?),
        };

        let head = if persisted_end < end {
            //  Safety:
            //  -   The mapping is not shared with any other thread yet.
            unsafe { extend(&persisted, &links, layout, head)? }
        } else {
            head
        };

        if shared {
            header.open();
        }

        debug!(path = %path.display(), mode = ?config.mode, size, partitions = links.number_partitions(), fresh,
            "opened mapping");

        //  Safety:
        //  -   `head`, and all partitions reachable from it, are within the mapping, owned by the pool.
        let free_list = unsafe { FreeList::with_head(links, head, NoHook) };

        Ok(Self { free_list, mapping, layout, path: config.path, mode: config.mode, closed: false })
    }

    /// Returns the size of a file holding `partitions` partitions of `partition_size` bytes, header included.
    ///
    /// Returns None if `partition_size` is not a valid partition size, or the size overflows.
    pub fn mapping_size_for(partition_size: usize, partitions: usize) -> Option<usize> {
        let layout = PartitionLayout::new(partition_size).ok()?;

        partitions.checked_mul(partition_size)?.checked_add(Header::size(layout))
    }

    /// Returns the size of the partitions, in bytes.
    pub fn partition_size(&self) -> usize { self.layout.size() }

    /// Returns the number of partitions of the mapping.
    pub fn number_partitions(&self) -> usize { self.free_list.links().number_partitions() }

    /// Returns the size of the mapping, in bytes.
    pub fn mapping_size(&self) -> usize { self.mapping.size() }

    /// Returns the path of the backing file.
    pub fn path(&self) -> &Path { &self.path }

    /// Returns the access mode.
    pub fn mode(&self) -> AccessMode { self.mode }

    /// Allocates a partition.
    ///
    /// Fails if all partitions are in use.
    pub fn allocate(&self) -> Result<Partition, AllocError> {
        self.free_list.pop().map(Partition::new).ok_or(AllocError::Exhausted)
    }

    /// Deallocates a partition.
    ///
    /// #   Safety
    ///
    /// -   Assumes that `partition` was allocated by this very pool, or by a previous pool on the same file.
    pub unsafe fn deallocate(&self, partition: Partition) {
        //  Safety:
        //  -   `partition` belongs to the mapping, and is consumed, hence exclusively accessible.
        self.free_list.push(partition.into_raw());
    }

    /// Closes the pool, recording its state in the file.
    ///
    /// Unlike dropping the pool, which logs them, errors writing back the state are reported.
    pub fn close(mut self) -> Result<(), PoolError> {
        let path = self.path.clone();

        self.persist().map_err(PoolError::io(path))
    }

    fn persist(&mut self) -> io::Result<()> {
        self.closed = true;

        if self.mode == AccessMode::ReadOnly {
            return Ok(());
        }

        let head = self.free_list.links().encode(self.free_list.top());

        //  Safety:
        //  -   The header is at the base of the mapping, and `self` is exclusively borrowed.
        unsafe { Header::at(self.mapping.base()) }.close(head);

        self.mapping.sync()
    }
}

impl Pool for MappedPool {
    fn partition_size(&self) -> usize { self.partition_size() }

    fn allocate(&self) -> Result<Partition, AllocError> { self.allocate() }

    unsafe fn deallocate(&self, partition: Partition) { self.deallocate(partition) }
}

impl Drop for MappedPool {
    fn drop(&mut self) {
        if self.closed {
            return;
        }

        if let Err(error) = self.persist() {
            warn!(path = %self.path.display(), %error, "failed to persist mapping");
        }
    }
}

//
//  Implementation Details
//

fn file_length(path: &Path) -> Result<Option<usize>, PoolError> {
    match fs::metadata(path) {
        Ok(metadata) => Ok(Some(usize::try_from(metadata.len()).unwrap_or(usize::MAX))),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(error) => Err(PoolError::io(path)(error)),
    }
}

//  Computes the size of the mapping; `config` is assumed to be valid for `existing`.
//
//  Files are never shrunk: an existing file larger than requested is mapped whole, unless recreated.
fn mapping_size(config: &MappedConfig, existing: Option<usize>) -> usize {
    let requested = config.mapping_size;
    let existing = existing.unwrap_or(0);

    match config.mode {
        AccessMode::CreateNew => if config.is_size_specified() { requested } else { existing },
        AccessMode::PersistentReuse if config.is_size_specified() => {
            if existing > requested {
                warn!(path = %config.path.display(), requested, existing, "mapping keeps the larger size of the file");

                return existing;
            }

            requested
        },
        AccessMode::PersistentReuse => existing,
        AccessMode::ReadOnly => {
            if config.is_size_specified() && requested != existing {
                warn!(path = %config.path.display(), requested, existing, "read-only mapping uses the size of the file");
            }

            existing
        },
    }
}

fn open_file(config: &MappedConfig, existing: Option<usize>, size: usize) -> io::Result<File> {
    let path = config.path.as_path();

    let file = match config.mode {
        AccessMode::CreateNew => OpenOptions::new().read(true).write(true).create(true).truncate(true).open(path)?,
        AccessMode::PersistentReuse => OpenOptions::new().read(true).write(true).create(true).truncate(false).open(path)?,
        AccessMode::ReadOnly => return File::open(path),
    };

    if config.mode == AccessMode::CreateNew || existing != Some(size) {
        file.set_len(size as u64)?;
    }

    Ok(file)
}

//  Makes the partitions added by growing the file reachable, exactly once, from the free list.
//
//  A free list ending with the last partition of the previous end, never linked, reaches the new partitions already.
//  Otherwise, the new partitions, which were never linked, are spliced on top.
//
//  #   Safety
//
//  -   Assumes that `head` is within `persisted`, and that the mapping is exclusively accessible.
unsafe fn extend(persisted: &MappedLinks, links: &MappedLinks, layout: PartitionLayout, head: Option<NonNull<u8>>)
    -> Result<Option<NonNull<u8>>, ConfigError>
{
    if reaches_end_implicitly(persisted, head)? {
        return Ok(head);
    }

    let first = persisted.offset_of(persisted.first());
    let old_end = first + persisted.number_partitions() * layout.size();
    let new_end = first + links.number_partitions() * layout.size();

    let (Some(first_new), Some(last_new)) = (links.partition_at(old_end), links.partition_at(new_end - layout.size()))
    else {
        return Err(ConfigError::CorruptHeader);
    };

    //  The partitions in between were never linked, each designates the next.
    ptr::write(last_new.as_ptr() as *mut usize, links.encode(head));

    Ok(Some(first_new))
}

//  Walks the free list, returning whether it ends with the last partition, never linked.
//
//  #   Safety
//
//  -   Assumes that `head` is within `links`, and that the mapping is exclusively accessible.
unsafe fn reaches_end_implicitly(links: &MappedLinks, head: Option<NonNull<u8>>) -> Result<bool, ConfigError> {
    let mut current = head;

    //  A well-formed free list visits each partition at most once.
    for _ in 0..links.number_partitions() {
        let Some(partition) = current else { return Ok(false) };

        let link = ptr::read(partition.as_ptr() as *const usize);

        if link != 0 && link != END_OF_LIST && links.partition_at(link).is_none() {
            return Err(ConfigError::CorruptHeader);
        }

        current = links.decode(partition, link);

        if current.is_none() {
            return Ok(link == 0);
        }
    }

    Err(ConfigError::CorruptHeader)
}
