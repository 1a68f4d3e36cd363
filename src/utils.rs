//! This file contains all the helper functions for the allocator.
//! This are functions that don't particularly belong to any concrete module of the program.


/// It aligns `to_be_aligned` using `alignment`, which must be a power of two.
///
/// This method is used to align region sizes to be a multiple of the page size,
/// headers to be a multiple of [`crate::ALIGNMENT`] and requested sizes so that
/// every block we carve starts at an aligned address.
pub(crate) const fn align(to_be_aligned: usize, alignment: usize) -> usize {
    (to_be_aligned + alignment - 1) & !(alignment - 1)
}

/// Same as [`align`] but returns `None` instead of overflowing. User sizes go
/// through this one since they can be anything up to `usize::MAX`.
pub(crate) const fn checked_align(to_be_aligned: usize, alignment: usize) -> Option<usize> {
    match to_be_aligned.checked_add(alignment - 1) {
        Some(size) => Some(size & !(alignment - 1)),
        None => None,
    }
}
