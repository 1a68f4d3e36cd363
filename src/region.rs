use std::{mem, ptr::NonNull};
use crate::{block::{ALIGNMENT, BLOCK_HEADER_SIZE}, list::Node, utils::{align, checked_align}};


/// This is the overhead size introduced by the [`Region`] header in bytes.
/// The header is represented as a [`Node`] and rounded up so that the first
/// block of the region starts aligned.
pub(crate) const REGION_HEADER_SIZE: usize = align(mem::size_of::<Node<Region>>(), ALIGNMENT);

/// Minimum length of a region when the caller doesn't configure one. It will
/// be rounded up to the page size anyway.
pub const DEFAULT_REGION_SIZE: usize = 16 * 1024;

/// This struct contains the memory regions specific metadata. However,
/// as every other header, this is usually represented as a [`Node<Region>`]
/// so that would be the complete region data.
///
/// [`libc::mmap`] gives as memory regions aligned with the computer page size,
/// but we cannot assume this regions are adjacent. Every region starts with
/// its own header and the rest of it is partitioned into blocks:
///
/// ```text
/// +--------------------------------------------------------------+
/// | Node<Region> | Node<Block> | payload | Node<Block> | payload |
/// +--------------------------------------------------------------+
/// ^              ^
/// mmap address   first block
/// ```
///
/// Regions are chained in their own list, blocks of all the regions are
/// chained in a single directory (see [`crate::block::Directory`]):
///
/// ```text
/// +-----------------------------------------------+      +-----------------------------------------------+
/// |        | +-------+    +-------+    +-------+  |      |        | +-------+    +-------+    +-------+  |
/// | Region | | Block | -> | Block | -> | Block | -------> | Region | | Block | -> | Block | -> | Block |  |
/// |        | +-------+    +-------+    +-------+  |      |        | +-------+    +-------+    +-------+  |
/// +-----------------------------------------------+      +-----------------------------------------------+
/// ```
pub(crate) struct Region {
    /// Total length of the mapping, headers included.
    pub size: usize,
}

impl Region {
    /// Address of the first block of `region`.
    ///
    /// **SAFETY**: `region` must point to the start of a mapping of at least
    /// `REGION_HEADER_SIZE + BLOCK_HEADER_SIZE` bytes.
    #[inline]
    pub(crate) unsafe fn first_block(region: NonNull<Node<Region>>) -> NonNull<u8> {
        unsafe { region.cast::<u8>().add(REGION_HEADER_SIZE) }
    }

    /// Payload size of the single block a fresh region of `size` bytes holds.
    #[inline]
    pub(crate) const fn initial_block_size(size: usize) -> usize {
        size - REGION_HEADER_SIZE - BLOCK_HEADER_SIZE
    }
}

/// Computes how many bytes we have to map so that a new region can hold a
/// block of `payload` bytes.
///
/// Small requests get `min_size`. Anything bigger gets twice what it needs so
/// that a few more requests of the same size fit without mapping again.
/// Returns `None` if the computation overflows.
pub(crate) fn region_size_for(payload: usize, min_size: usize, page_size: usize) -> Option<usize> {
    let needed = payload.checked_add(REGION_HEADER_SIZE + BLOCK_HEADER_SIZE)?;

    let size = if needed <= min_size {
        min_size
    } else {
        needed.checked_mul(2)?
    };

    checked_align(size, page_size)
}
