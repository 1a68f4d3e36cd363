use std::{ptr::NonNull, sync::atomic::{AtomicUsize, Ordering}};
use crate::{
    block::{Block, Directory},
    error::AllocError,
    list::{List, Node},
    region::{Region, region_size_for},
    utils::checked_align,
};

/// Virtual memory page size of the computer. This is usually 4096.
/// This value should be a constant, but we can't do that since we
/// don't know the value at compile time.
static PAGE_SIZE: AtomicUsize = AtomicUsize::new(0);

/// The internal data structure of the allocator. Here is where
/// we manage the low level memory requests as well as platform-dependant
/// stuff.
///
/// The kernel owns every mapping it creates. They are only given back to
/// the OS when the kernel is dropped.
pub(crate) struct Kernel {
    /// Linked list of allocator memory [`Region`]
    pub regions: List<Region>,
    /// Every block of every region. See [`Directory`].
    pub blocks: Directory,
    /// Computer's page size (used for alignment of region lengths).
    pub page_size: usize,
    /// Regions are never smaller than this.
    pub min_region_size: usize,
}

/// This trait provides an abstraction to handle low level memory operations
/// and syscalls. As the allocator, our top level view of this, has nothing
/// to do with the concrete implementations / APIs offered by each kernel.
trait PlatformMemory {
    /// Request a zeroed read-write memory region of size `len`. It returns a
    /// pointer to the given location or None if the underlying syscall fails.
    unsafe fn request_memory(len: usize) -> Option<NonNull<u8>>;

    /// Returns the memory of size `len` starting from `addr` back to the kernel.
    unsafe fn return_memory(addr: NonNull<u8>, len: usize);

    /// Returns the virtual memory page size of the computer in bytes.
    unsafe fn page_size() -> usize;
}

/// Wrapper to calculate the computer's page size.
#[inline]
pub(crate) fn page_size() -> usize {
    match PAGE_SIZE.load(Ordering::Relaxed) {
        0 => {
            let size = unsafe { Kernel::page_size() };
            PAGE_SIZE.store(size, Ordering::Relaxed);
            size
        }
        size => size,
    }
}

/// Wrapper to use [`PlatformMemory::request_memory`]
#[inline]
pub(crate) unsafe fn request_memory(len: usize) -> Option<NonNull<u8>> {
    unsafe { Kernel::request_memory(len) }
}

/// Wrapper to use [`PlatformMemory::return_memory`]
#[inline]
pub(crate) unsafe fn return_memory(addr: NonNull<u8>, len: usize) {
    unsafe { Kernel::return_memory(addr, len); }
}

#[cfg(unix)]
mod unix {
    use super::{PlatformMemory, Kernel};

    use libc::{mmap, munmap, off_t, size_t};

    use std::{os::raw::{c_void, c_int}, ptr::{self, NonNull}};

    impl PlatformMemory for Kernel {
        unsafe fn request_memory(len: usize) -> Option<NonNull<u8>> {
            // Private anonymous mappings come back zeroed and page aligned,
            // which is what a fresh region needs.
            const PROT: c_int = libc::PROT_READ | libc::PROT_WRITE;
            const FLAGS: c_int = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;
            const NO_FD: c_int = -1;
            const OFFSET: off_t = 0;

            unsafe {
                match mmap(ptr::null_mut(), len as size_t, PROT, FLAGS, NO_FD, OFFSET) {
                    libc::MAP_FAILED => None,
                    region => NonNull::new(region.cast::<u8>()),
                }
            }
        }

        unsafe fn return_memory(addr: NonNull<u8>, len: usize) {
            if unsafe { munmap(addr.as_ptr().cast::<c_void>(), len as size_t) } != 0 {
                log::warn!("munmap of region {addr:p} ({len} bytes) failed");
            }
        }

        unsafe fn page_size() -> usize {
            unsafe { libc::sysconf(libc::_SC_PAGE_SIZE) as usize }
        }
    }
}

#[cfg(windows)]
mod windows {
    use std::{mem::MaybeUninit, ptr::NonNull, os::raw::c_void};

    use crate::kernel::{Kernel, PlatformMemory};

    use windows::Win32::System::{Memory, SystemInformation};

    impl PlatformMemory for Kernel {
        unsafe fn request_memory(len: usize) -> Option<NonNull<u8>> {
            // Reserving and committing in one go gives a zeroed read-write
            // region aligned to the allocation granularity.
            let flags = Memory::MEM_RESERVE | Memory::MEM_COMMIT;

            unsafe {
                let region = Memory::VirtualAlloc(None, len, flags, Memory::PAGE_READWRITE);

                NonNull::new(region.cast())
            }
        }

        unsafe fn return_memory(addr: NonNull<u8>, len: usize) {
            // MEM_RELEASE frees the whole reservation, its size must be 0.
            let released = unsafe {
                Memory::VirtualFree(addr.as_ptr().cast::<c_void>(), 0, Memory::MEM_RELEASE)
            };

            if let Err(err) = released {
                log::warn!("VirtualFree of region {addr:p} ({len} bytes) failed: {err}");
            }
        }

        unsafe fn page_size() -> usize {
            unsafe {
                let mut system_info = MaybeUninit::uninit();
                SystemInformation::GetSystemInfo(system_info.as_mut_ptr());

                system_info.assume_init().dwPageSize as usize
            }
        }
    }
}

impl Kernel {
    /// Create a new instance of the allocator's `Kernel` without any region.
    ///
    /// `min_region_size` is rounded up to the computer's page size, which
    /// fails if the rounded size can't be represented.
    pub(crate) fn new(min_region_size: usize) -> Result<Self, AllocError> {
        let page_size = page_size();
        let rounded = checked_align(min_region_size.max(1), page_size)
            .ok_or(AllocError::OutOfMemory { size: min_region_size })?;

        Ok(Self {
            regions: List::new(),
            blocks: Directory::new(),
            page_size,
            min_region_size: rounded,
        })
    }

    /// This function maps a new memory [`Region`] where a block of `payload`
    /// bytes fits, and tracks its only block (free) at the end of the directory.
    ///
    /// It's called once when the allocator is initialized and again every
    /// time no free block can satisfy a request.
    pub(crate) fn acquire_region(&mut self, payload: usize) -> Result<NonNull<Node<Block>>, AllocError> {
        let region_size = region_size_for(payload, self.min_region_size, self.page_size)
            .ok_or(AllocError::OutOfMemory { size: payload })?;

        unsafe {
            let Some(addr) = request_memory(region_size) else {
                log::warn!("could not map {region_size} bytes for a {payload} byte request");
                return Err(AllocError::OutOfMemory { size: payload });
            };

            let region = self.regions.append(Region { size: region_size }, addr);

            let block = Block {
                size: Region::initial_block_size(region_size),
                is_free: true,
                region,
            };

            // First Node<Block> right after Node<Region>
            let block_addr = Region::first_block(region);

            // The directory is a single list over all the regions, so blocks of
            // newer regions come after everything we already have.
            let node = if self.blocks.is_empty() {
                self.blocks.push_front(block, block_addr)
            } else {
                self.blocks.append(block, block_addr)
            };
            debug_assert_eq!(self.blocks.last(), Some(node));

            log::debug!(
                "mapped region #{} at {:p}: {} bytes, first block of {} bytes",
                self.regions.len(),
                addr,
                region_size,
                node.as_ref().data.size,
            );

            Ok(node)
        }
    }
}

impl Drop for Kernel {
    fn drop(&mut self) {
        let mut current = self.regions.first();

        while let Some(region) = current {
            unsafe {
                // Read everything we need before the header disappears.
                current = region.as_ref().next;
                let len = region.as_ref().data.size;

                return_memory(region.cast(), len);
            }
        }

        log::debug!("returned {} regions to the OS", self.regions.len());
    }
}
