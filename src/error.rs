use thiserror::Error;

/// Errors the allocator can report through its fallible API. The raw
/// [`crate::MemAlloc::alloc`] entry point turns all of them into a null pointer.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// The OS refused to map more memory, the request is too big to be
    /// represented, or the allocator has no heap to serve it from.
    #[error("out of memory while serving a request of {size} bytes")]
    OutOfMemory { size: usize },

    /// `init` was called on an allocator that already owns a heap.
    #[error("allocator is already initialized")]
    AlreadyInitialized,
}

/// Returned when a string doesn't name any [`crate::Strategy`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown placement strategy `{0}`")]
pub struct ParseStrategyError(pub String);
