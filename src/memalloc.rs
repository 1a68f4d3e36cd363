use std::{fmt, ptr::{self, NonNull}};

use crate::{
    block::{ALIGNMENT, BLOCK_HEADER_SIZE, Block, coalesce, split},
    error::AllocError,
    kernel::Kernel,
    placement::Strategy,
    region::DEFAULT_REGION_SIZE,
    utils::checked_align,
};

/// Settings fixed when the allocator is initialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Placement strategy used for every allocation.
    pub strategy: Strategy,
    /// Regions are never mapped with less than this many bytes. Rounded up to
    /// the page size.
    pub min_region_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            min_region_size: DEFAULT_REGION_SIZE,
        }
    }
}

impl Config {
    /// Default settings with the given placement `strategy`.
    pub fn new(strategy: Strategy) -> Self {
        Self { strategy, ..Self::default() }
    }

    /// Replaces the placement strategy.
    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Replaces the minimum region size.
    pub fn min_region_size(mut self, size: usize) -> Self {
        self.min_region_size = size;
        self
    }
}

/// General purpose allocator that manages memory mapped directly from the OS.
///
/// The heap is a list of regions, each of them split into blocks. All the
/// blocks are tracked by a single list ordered by address (region by region)
/// and every request is served by the first, smallest or biggest free block
/// depending on the [`Strategy`]:
///
/// ```text
///  directory
///  head ----+                                                tail
///           v                                                 v
/// +--------------------------------------+      +------------------------+
/// | Region | Used | Free | Used | Used   | ---> | Region | Used | Free   |
/// +--------------------------------------+      +------------------------+
/// ```
///
/// If no free block fits, a new region is mapped. Regions are never returned
/// to the OS while the allocator lives, dropping it unmaps all of them.
///
/// The allocator is single threaded. Every call that touches the heap takes
/// `&mut self`, and since it holds raw pointers it is neither [`Send`] nor
/// [`Sync`].
///
/// ```
/// use fitalloc::{MemAlloc, Strategy};
///
/// let mut allocator = MemAlloc::new();
/// allocator.init(Strategy::BestFit).unwrap();
///
/// let addr = allocator.alloc(100);
/// assert!(!addr.is_null());
///
/// unsafe { allocator.free(addr) };
/// ```
pub struct MemAlloc {
    strategy: Strategy,
    /// `None` until `init` succeeds.
    kernel: Option<Kernel>,
}

/// Snapshot of the heap computed by walking the directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Number of regions mapped.
    pub regions: usize,
    /// Bytes mapped from the OS, region headers included.
    pub mapped: usize,
    /// Sum of every block's header and content.
    pub heap_size: usize,
    /// Content bytes of blocks in use.
    pub allocated: usize,
    /// Content bytes of free blocks.
    pub free: usize,
    /// Number of blocks in the directory.
    pub blocks: usize,
    /// Number of free blocks in the directory.
    pub free_blocks: usize,
    /// Content size of the biggest free block, 0 if there is none.
    pub largest_free: usize,
}

/// Read only view of a single block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    /// Address of the content, the one `alloc` returns for this block.
    pub addr: *const u8,
    /// Content size, header excluded.
    pub size: usize,
    /// Whether the block can be handed out.
    pub is_free: bool,
}

impl MemAlloc {
    /// Size of the metadata placed before every block.
    pub const HEADER_SIZE: usize = BLOCK_HEADER_SIZE;

    /// Creates an allocator without any memory. Call [`MemAlloc::init`] before
    /// using it.
    pub const fn new() -> Self {
        Self {
            strategy: Strategy::FirstFit,
            kernel: None,
        }
    }

    /// Maps the first region and sets the placement `strategy` for the rest
    /// of the allocator's life.
    pub fn init(&mut self, strategy: Strategy) -> Result<(), AllocError> {
        self.init_with(Config::new(strategy))
    }

    /// Same as [`MemAlloc::init`] with every setting configurable.
    ///
    /// Fails with [`AllocError::AlreadyInitialized`] if the allocator already
    /// has a heap, which is left as it is. If the first region can't be mapped
    /// the allocator stays uninitialized.
    pub fn init_with(&mut self, config: Config) -> Result<(), AllocError> {
        if self.kernel.is_some() {
            log::warn!("init called twice, keeping the current heap");
            return Err(AllocError::AlreadyInitialized);
        }

        let mut kernel = Kernel::new(config.min_region_size)?;
        kernel.acquire_region(0)?;

        log::debug!("allocator initialized with {} strategy", config.strategy);

        self.strategy = config.strategy;
        self.kernel = Some(kernel);

        Ok(())
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.kernel.is_some()
    }

    #[inline]
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Allocates `size` bytes and returns the address of the first one. The
    /// address is aligned to [`ALIGNMENT`] and the memory is not initialized.
    ///
    /// A `size` of 0 is served like the smallest possible request.
    pub fn try_alloc(&mut self, size: usize) -> Result<NonNull<u8>, AllocError> {
        let strategy = self.strategy;

        let Some(kernel) = self.kernel.as_mut() else {
            log::warn!("alloc({size}) on an uninitialized allocator");
            return Err(AllocError::OutOfMemory { size });
        };

        // Every block keeps a size multiple of the alignment so the headers
        // we carve after it stay aligned.
        let needed = checked_align(size.max(1), ALIGNMENT).ok_or(AllocError::OutOfMemory { size })?;

        let node = match strategy.find(&kernel.blocks, needed) {
            Some(node) => node,
            None => {
                kernel.acquire_region(needed)?;
                strategy
                    .find(&kernel.blocks, needed)
                    .ok_or(AllocError::OutOfMemory { size })?
            }
        };

        unsafe {
            split(&mut kernel.blocks, node, needed);
            let addr = Block::payload(node);

            log::trace!("alloc({size}) -> {addr:p}");

            Ok(addr)
        }
    }

    /// Same as [`MemAlloc::try_alloc`] but returns a null pointer on failure.
    pub fn alloc(&mut self, size: usize) -> *mut u8 {
        match self.try_alloc(size) {
            Ok(addr) => addr.as_ptr(),
            Err(err) => {
                log::warn!("alloc({size}) -> null: {err}");
                ptr::null_mut()
            }
        }
    }

    /// Gives the memory at `addr` back to the allocator, merging it with the
    /// free blocks around it. Freeing a null pointer does nothing.
    ///
    /// # Safety
    ///
    /// `addr` must be null or an address returned by [`MemAlloc::alloc`] (or
    /// [`MemAlloc::try_alloc`]) of this same allocator that hasn't been freed
    /// yet. The memory must not be used after this call.
    pub unsafe fn free(&mut self, addr: *mut u8) {
        let Some(addr) = NonNull::new(addr) else {
            return;
        };

        let Some(kernel) = self.kernel.as_mut() else {
            log::warn!("free({addr:p}) on an uninitialized allocator");
            return;
        };

        unsafe {
            let node = Block::from_payload(addr);
            let merged = coalesce(&mut kernel.blocks, node);

            log::trace!("free({addr:p}) -> free block of {} bytes", merged.as_ref().data.size);
        }
    }

    /// Reserved for a future reclamation pass. It does nothing.
    pub fn collect(&mut self) {
        log::trace!("collect: nothing to do");
    }

    /// Walks the directory and summarizes it.
    pub fn stats(&self) -> HeapStats {
        let Some(kernel) = &self.kernel else {
            return HeapStats::default();
        };

        let mut stats = HeapStats {
            regions: kernel.regions.len(),
            mapped: kernel.regions.iter().map(|region| region.size).sum(),
            blocks: kernel.blocks.len(),
            ..HeapStats::default()
        };

        for block in &kernel.blocks {
            stats.heap_size += BLOCK_HEADER_SIZE + block.size;

            if block.is_free {
                stats.free += block.size;
                stats.free_blocks += 1;
                stats.largest_free = stats.largest_free.max(block.size);
            } else {
                stats.allocated += block.size;
            }
        }

        stats
    }

    /// Every block of the heap in directory order.
    pub fn blocks(&self) -> impl Iterator<Item = BlockInfo> + '_ {
        self.kernel.iter().flat_map(|kernel| {
            kernel.blocks.nodes().map(|node| unsafe {
                let block = &node.as_ref().data;

                BlockInfo {
                    addr: Block::payload(node).as_ptr(),
                    size: block.size,
                    is_free: block.is_free,
                }
            })
        })
    }
}

impl Default for MemAlloc {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for HeapStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "regions={} mapped={} heap={} allocated={} free={} blocks={} free_blocks={} largest_free={}",
            self.regions,
            self.mapped,
            self.heap_size,
            self.allocated,
            self.free,
            self.blocks,
            self.free_blocks,
            self.largest_free,
        )
    }
}
