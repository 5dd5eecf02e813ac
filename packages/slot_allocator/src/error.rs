use thiserror::Error;

/// Errors reported by the checked operations of [`SlotAllocator`][crate::SlotAllocator].
#[derive(Debug, Error, Eq, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// The caller addressed a slot index that does not exist in the allocator.
    #[error("slot index {index} is out of bounds for an allocator with capacity {capacity}")]
    IndexOutOfBounds {
        /// The index the caller provided.
        index: usize,

        /// The fixed capacity of the allocator.
        capacity: usize,
    },
}

/// A specialized `Result` type for slot allocator operations, returning the crate's
/// [`Error`] type as the error value.
pub(crate) type Result<T> = std::result::Result<T, Error>;
