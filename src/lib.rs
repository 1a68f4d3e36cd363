//! User level memory allocator with selectable placement strategy.
//!
//! Memory is mapped directly from the OS (`mmap` on unix, `VirtualAlloc` on
//! Windows) in regions of at least 16 KiB. Every region is partitioned into
//! blocks, each one preceded by a small header, and all the blocks are
//! chained in a single address ordered list:
//!
//! ```text
//! +-------------------------------------------------------------+
//! | Region | Header | content | Header | content | Header | ... |
//! +-------------------------------------------------------------+
//!                      ^
//!                      pointer returned by `alloc`
//! ```
//!
//! Allocating searches that list with the [`Strategy`] chosen at
//! [`MemAlloc::init`] (first, best or worst fit), splits the chosen block if
//! it's too big and maps a new region when nothing fits. Freeing merges the
//! block with its free neighbours, so there are never two free blocks next
//! to each other.
//!
//! ```
//! use fitalloc::{MemAlloc, Strategy};
//!
//! let mut allocator = MemAlloc::new();
//! allocator.init(Strategy::FirstFit).unwrap();
//!
//! let first = allocator.alloc(100);
//! unsafe { allocator.free(first) };
//!
//! // The same block is used again.
//! let second = allocator.alloc(50);
//! assert_eq!(first, second);
//! ```
//!
//! The allocator is single threaded and it doesn't detect misuse: double
//! frees, freeing foreign pointers or writing past the end of an allocation
//! are undefined behaviour.

mod block;
mod error;
mod kernel;
mod list;
mod memalloc;
mod placement;
mod region;
mod utils;

pub use block::ALIGNMENT;
pub use error::{AllocError, ParseStrategyError};
pub use memalloc::{BlockInfo, Config, HeapStats, MemAlloc};
pub use placement::Strategy;
pub use region::DEFAULT_REGION_SIZE;
