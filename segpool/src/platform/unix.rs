//! Implementation of Unix specific calls.

use std::{
    alloc::Layout,
    fs::File,
    io,
    os::unix::io::AsRawFd,
    ptr::{self, NonNull},
};

use segpool_core::{Platform, PowerOf2};

/// Implementation of the Platform trait, for Unix, handing out whole pages obtained through `mmap`.
#[derive(Clone, Copy, Debug)]
pub struct PagePlatform {
    page_size: PowerOf2,
}

impl PagePlatform {
    //  4 KB
    const FALLBACK_PAGE_SIZE: PowerOf2 = unsafe { PowerOf2::new_unchecked(4 * 1024) };

    /// Creates an instance, querying the page size of the OS.
    pub fn new() -> Self {
        //  Safety:
        //  -   `sysconf` has no precondition.
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };

        let page_size = usize::try_from(page_size).ok()
            .and_then(PowerOf2::new)
            .unwrap_or(Self::FALLBACK_PAGE_SIZE);

        Self { page_size }
    }
}

impl Default for PagePlatform {
    fn default() -> Self { Self::new() }
}

impl Platform for PagePlatform {
    fn page_size(&self) -> PowerOf2 { self.page_size }

    unsafe fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        debug_assert!(layout.align() <= self.page_size.value(),
            "Incorrect alignment: {} > {}", layout.align(), self.page_size.value());

        //  `mmap` hands out whole pages, hence page-aligned memory.
        mmap_allocate(layout.size(), libc::MAP_PRIVATE | libc::MAP_ANONYMOUS, -1, libc::PROT_READ | libc::PROT_WRITE)
    }

    unsafe fn deallocate(&self, pointer: NonNull<u8>, layout: Layout) {
        munmap_deallocate(pointer.as_ptr(), layout.size());
    }
}

/// A mapping of a whole file in memory.
///
/// A shared mapping writes through to the file, whereas a private mapping is copy-on-write and never reaches it.
pub(crate) struct FileMapping {
    base: NonNull<u8>,
    size: usize,
    shared: bool,
}

impl FileMapping {
    /// Maps the first `size` bytes of `file`, readable and writeable.
    ///
    /// The file must have been opened for writing if `shared` is true.
    pub(crate) fn map(file: &File, size: usize, shared: bool) -> io::Result<Self> {
        let visibility = if shared { libc::MAP_SHARED } else { libc::MAP_PRIVATE };

        //  Safety:
        //  -   `file` is a valid file descriptor, for the duration of the call.
        let base = unsafe {
            mmap_allocate(size, visibility, file.as_raw_fd(), libc::PROT_READ | libc::PROT_WRITE)
        };

        base.map(|base| Self { base, size, shared })
            .ok_or_else(io::Error::last_os_error)
    }

    /// Returns the base of the mapping, aligned on a page boundary.
    pub(crate) fn base(&self) -> NonNull<u8> { self.base }

    /// Returns the size of the mapping, in bytes.
    pub(crate) fn size(&self) -> usize { self.size }

    /// Flushes the content of the mapping to the file, if shared.
    pub(crate) fn sync(&self) -> io::Result<()> {
        if !self.shared {
            return Ok(());
        }

        //  Safety:
        //  -   `[base, base + size)` is mapped.
        let result = unsafe { libc::msync(self.base.as_ptr() as *mut libc::c_void, self.size, libc::MS_SYNC) };

        if result == 0 { Ok(()) } else { Err(io::Error::last_os_error()) }
    }
}

impl Drop for FileMapping {
    fn drop(&mut self) {
        //  Safety:
        //  -   `[base, base + size)` is mapped, and no longer referenced once the mapping is dropped.
        unsafe { munmap_deallocate(self.base.as_ptr(), self.size) };
    }
}

//  Safety:
//  -   `FileMapping` only hands out the base pointer, accesses through it are synchronized by its users.
unsafe impl Send for FileMapping {}

//  Safety:
//  -   `FileMapping` only hands out the base pointer, accesses through it are synchronized by its users.
unsafe impl Sync for FileMapping {}

//  Wrapper around `mmap`.
//
//  Returns a pointer to `size` bytes of page-aligned memory, or None.
//
//  #   Safety
//
//  -   Assumes that `fd` is either -1, with `MAP_ANONYMOUS`, or a file descriptor opened with suitable permissions.
unsafe fn mmap_allocate(size: usize, flags: libc::c_int, fd: libc::c_int, prot: libc::c_int) -> Option<NonNull<u8>> {
    //  No specific address hint.
    let addr = ptr::null_mut();
    //  When used in conjunction with MAP_ANONYMOUS, offset is mandated to be 0 on some implementations; files are
    //  always mapped from their start.
    let offset = 0;

    let result = libc::mmap(addr, size, prot, flags, fd, offset);

    if result == libc::MAP_FAILED {
        return None;
    }

    NonNull::new(result as *mut u8)
}

//  Wrapper around `munmap`.
//
//  #   Panics
//
//  If `munmap` returns a non-0 result.
//
//  #   Safety
//
//  -   Assumes that `addr` points to a `mmap`ed area of at least `size` bytes.
//  -   Assumes that the range `[addr, addr + size)` is no longer in use.
unsafe fn munmap_deallocate(addr: *mut u8, size: usize) {
    let result = libc::munmap(addr as *mut libc::c_void, size);
    assert!(result == 0, "Could not munmap {:x}, {}: {}", addr as usize, size, result);
}

// mod tests
