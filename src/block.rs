use std::{mem, ptr::NonNull};
use crate::{list::{List, Node}, region::Region, utils::align};


/// Alignment of every block header and every pointer we give to the user.
pub const ALIGNMENT: usize = 16;

/// Header size of a block. We need to add the overhead introduced by our
/// [`Node`] structure since we always use our `Block` as a node of our linked list,
/// and round it up so that the payload keeps the alignment of the header.
pub(crate) const BLOCK_HEADER_SIZE: usize = align(mem::size_of::<Node<Block>>(), ALIGNMENT);

/// A split only happens if the leftover can hold a header plus this many bytes.
/// Otherwise the whole block is handed out.
pub(crate) const MIN_SPLIT_PAYLOAD: usize = ALIGNMENT;

/// Every block of every region, ordered by address inside each region and
/// by mapping order across regions.
pub(crate) type Directory = List<Block>;

/// This is the structure of a block. The fields of the block are it's metadata,
/// content is placed after this header.
///
/// The following diagram represents this structure ignoring that the block will be
/// wrapped inside a [`Node`]
///
/// ```text
/// +---------------------+ <------+
/// |        size         |        |
/// +---------------------+        |
/// |    is_free (1b)     |        | -> Header
/// +---------------------+        |
/// |       region        |        |
/// +---------------------+ <------+
/// |       Content       |        |
/// |         ...         |        |
/// |         ...         |        | -> Addressable content (`size` bytes)
/// |         ...         |        |
/// |                     |        |
/// +---------------------+ <------+
/// ```
///
/// Headers start at addresses that are multiples of [`ALIGNMENT`] and
/// [`BLOCK_HEADER_SIZE`] is a multiple of it too, so the content is always
/// aligned. Sizes are kept multiples of [`ALIGNMENT`] so the next header
/// stays aligned as well.
pub(crate) struct Block {
    /// Size of the content, header excluded.
    pub size: usize,
    /// Flag to tell whether the block is free or not.
    pub is_free: bool,
    /// Region which the block belongs to
    pub region: NonNull<Node<Region>>,
}

impl Block {
    /// Address of the content of the block at `node`. This is what the user gets.
    #[inline]
    pub(crate) unsafe fn payload(node: NonNull<Node<Block>>) -> NonNull<u8> {
        unsafe { node.cast::<u8>().add(BLOCK_HEADER_SIZE) }
    }

    /// Recovers the header of a block from the address returned by [`Block::payload`].
    ///
    /// This is the only place where user pointers are turned back into headers.
    ///
    /// **SAFETY**: `address` must have been obtained from [`Block::payload`]
    /// and the block must still be tracked by the directory.
    #[inline]
    pub(crate) unsafe fn from_payload(address: NonNull<u8>) -> NonNull<Node<Block>> {
        unsafe { address.sub(BLOCK_HEADER_SIZE).cast() }
    }
}

/// Marks the block at `node` as used. If it holds at least `size` bytes plus
/// a header and [`MIN_SPLIT_PAYLOAD`], the rest of it becomes a new free block
/// placed right after the first `size` bytes of content:
///
/// ```text
/// Before:
/// +--------+--------------------------------------------------+
/// | Header |                   free content                   |
/// +--------+--------------------------------------------------+
///
/// After:
/// +--------+------------+--------+----------------------------+
/// | Header | size bytes | Header |        free content        |
/// +--------+------------+--------+----------------------------+
/// ```
///
/// **SAFETY**: `node` must belong to `directory`, be free and hold at least
/// `size` bytes. `size` must be a multiple of [`ALIGNMENT`].
pub(crate) unsafe fn split(directory: &mut Directory, mut node: NonNull<Node<Block>>, size: usize) {
    unsafe {
        let block = &mut node.as_mut().data;

        if block.size >= size + BLOCK_HEADER_SIZE + MIN_SPLIT_PAYLOAD {
            let remainder = Block {
                size: block.size - size - BLOCK_HEADER_SIZE,
                is_free: true,
                region: block.region,
            };
            block.size = size;

            log::trace!("split block {:p}: {} used, {} left", node, size, remainder.size);

            let addr = Block::payload(node).add(size);
            directory.insert_after(node, remainder, addr);
        }

        node.as_mut().data.is_free = false;
    }
}

/// Marks the block at `node` as free and merges it with its neighbours if
/// they are free too. Returns the node that contains the block after merging.
///
/// Before this call no two free blocks are adjacent, so looking once to the
/// left and once to the right is enough to keep it that way.
///
/// **SAFETY**: `node` must belong to `directory`.
pub(crate) unsafe fn coalesce(directory: &mut Directory, mut node: NonNull<Node<Block>>) -> NonNull<Node<Block>> {
    unsafe {
        node.as_mut().data.is_free = true;

        merge_with_prev(directory, &mut node);
        merge_with_next(directory, node);
    }

    node
}

/// Whether `other` is free and lives in the same region as `node`. Blocks of
/// different regions are neighbours in the directory but not in memory.
unsafe fn can_merge(node: NonNull<Node<Block>>, other: NonNull<Node<Block>>) -> bool {
    unsafe {
        let other = &other.as_ref().data;
        other.is_free && other.region == node.as_ref().data.region
    }
}

/// Tries to merge the given block `node` with the previous one on the
/// list. If that happens, `node` now points to the previous block.
unsafe fn merge_with_prev(directory: &mut Directory, node: &mut NonNull<Node<Block>>) {
    unsafe {
        if let Some(mut prev_node) = node.as_ref().prev {
            if can_merge(*node, prev_node) {
                let size = node.as_ref().data.size;

                // We need to cover the header and the actual content of the block
                prev_node.as_mut().data.size += BLOCK_HEADER_SIZE + size;

                log::trace!("merged block {:p} into previous {:p}", *node, prev_node);

                // We remove the block from the list since it is now part of the previous one
                directory.remove(*node);

                // The current block is now its previous one
                *node = prev_node;
            }
        }
    }
}

/// Tries to merge the given block `node` with the next one on the list.
unsafe fn merge_with_next(directory: &mut Directory, mut node: NonNull<Node<Block>>) {
    unsafe {
        if let Some(next_node) = node.as_ref().next {
            if can_merge(node, next_node) {
                node.as_mut().data.size += BLOCK_HEADER_SIZE + next_node.as_ref().data.size;

                log::trace!("merged next block {:p} into {:p}", next_node, node);

                directory.remove(next_node);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SLOTS: usize = 256;

    /// Fake region backed by an aligned buffer. Blocks point to a dangling
    /// region, we only need every block to share the same one.
    struct Buffer(Box<[u128; SLOTS]>);

    impl Buffer {
        fn new() -> Self {
            Self(Box::new([0; SLOTS]))
        }

        fn start(&mut self) -> NonNull<u8> {
            NonNull::from(&mut *self.0).cast()
        }

        fn len(&self) -> usize {
            SLOTS * mem::size_of::<u128>()
        }
    }

    /// Builds a directory with a single free block spanning the whole buffer.
    fn single_block(buffer: &mut Buffer) -> (Directory, NonNull<Node<Block>>) {
        let mut directory = Directory::new();
        let block = Block {
            size: buffer.len() - BLOCK_HEADER_SIZE,
            is_free: true,
            region: NonNull::dangling(),
        };
        let node = unsafe { directory.append(block, buffer.start()) };

        (directory, node)
    }

    fn sizes(directory: &Directory) -> Vec<(usize, bool)> {
        directory.iter().map(|block| (block.size, block.is_free)).collect()
    }

    #[test]
    fn header_keeps_payload_aligned() {
        assert_eq!(BLOCK_HEADER_SIZE % ALIGNMENT, 0);
        assert!(BLOCK_HEADER_SIZE >= mem::size_of::<Node<Block>>());
    }

    #[test]
    fn payload_and_header_are_inverse() {
        let mut buffer = Buffer::new();
        let (_, node) = single_block(&mut buffer);

        unsafe {
            let payload = Block::payload(node);
            assert_eq!(payload.as_ptr() as usize - node.as_ptr() as usize, BLOCK_HEADER_SIZE);
            assert_eq!(Block::from_payload(payload), node);
        }
    }

    #[test]
    fn split_carves_free_remainder() {
        let mut buffer = Buffer::new();
        let total = buffer.len() - BLOCK_HEADER_SIZE;
        let (mut directory, node) = single_block(&mut buffer);

        unsafe { split(&mut directory, node, 64) };

        assert_eq!(sizes(&directory), vec![(64, false), (total - 64 - BLOCK_HEADER_SIZE, true)]);

        let remainder = directory.last().unwrap();
        assert_eq!(
            remainder.as_ptr() as usize,
            unsafe { Block::payload(node) }.as_ptr() as usize + 64
        );
        assert_eq!(remainder.as_ptr() as usize % ALIGNMENT, 0);
    }

    #[test]
    fn split_skipped_when_remainder_too_small() {
        let mut buffer = Buffer::new();
        let total = buffer.len() - BLOCK_HEADER_SIZE;
        let (mut directory, node) = single_block(&mut buffer);

        // Leaves exactly one header and nothing else, not enough to split.
        let size = total - BLOCK_HEADER_SIZE;
        unsafe { split(&mut directory, node, size) };

        assert_eq!(sizes(&directory), vec![(total, false)]);
        assert_eq!(directory.len(), 1);
    }

    #[test]
    fn split_at_the_minimum_remainder() {
        let mut buffer = Buffer::new();
        let total = buffer.len() - BLOCK_HEADER_SIZE;
        let (mut directory, node) = single_block(&mut buffer);

        let size = total - BLOCK_HEADER_SIZE - MIN_SPLIT_PAYLOAD;
        unsafe { split(&mut directory, node, size) };

        assert_eq!(sizes(&directory), vec![(size, false), (MIN_SPLIT_PAYLOAD, true)]);
    }

    #[test]
    fn coalesce_merges_both_sides() {
        let mut buffer = Buffer::new();
        let total = buffer.len() - BLOCK_HEADER_SIZE;
        let (mut directory, first) = single_block(&mut buffer);

        unsafe {
            split(&mut directory, first, 32);
            let second = first.as_ref().next.unwrap();
            split(&mut directory, second, 48);
            let third = second.as_ref().next.unwrap();
            split(&mut directory, third, 64);

            assert_eq!(directory.len(), 4);

            coalesce(&mut directory, first);
            coalesce(&mut directory, third);
            assert_eq!(directory.len(), 3);

            let merged = coalesce(&mut directory, second);
            assert_eq!(merged, first);
        }

        assert_eq!(sizes(&directory), vec![(total, true)]);
        assert_eq!(directory.first(), directory.last());
    }

    #[test]
    fn coalesce_updates_tail() {
        let mut buffer = Buffer::new();
        let (mut directory, first) = single_block(&mut buffer);

        unsafe {
            split(&mut directory, first, 32);
            let tail = directory.last().unwrap();
            // Use the tail so that freeing the first block doesn't merge it.
            split(&mut directory, tail, tail.as_ref().data.size);

            coalesce(&mut directory, first);
            assert_eq!(directory.len(), 2);

            coalesce(&mut directory, tail);
        }

        assert_eq!(directory.len(), 1);
        assert_eq!(directory.last(), Some(first));
    }

    #[test]
    fn blocks_of_different_regions_are_not_merged() {
        let mut left = Buffer::new();
        let mut right = Buffer::new();
        let mut directory = Directory::new();

        let (mut tag_a, mut tag_b) = (0u128, 0u128);
        let region_a = NonNull::from(&mut tag_a).cast::<Node<Region>>();
        let region_b = NonNull::from(&mut tag_b).cast::<Node<Region>>();

        unsafe {
            let a = directory.append(Block { size: 64, is_free: true, region: region_a }, left.start());
            let b = directory.append(Block { size: 64, is_free: false, region: region_b }, right.start());

            coalesce(&mut directory, b);

            assert_eq!(directory.len(), 2);
            assert!(a.as_ref().data.is_free);
            assert_eq!(b.as_ref().data.size, 64);
        }
    }
}
