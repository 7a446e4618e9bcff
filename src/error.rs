//! Error types returned by the fallible constructors.
use alloc::boxed::Box;
use core::{alloc::Layout, fmt};
use thiserror::Error;

/// The allocator could not provide memory for a control block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("memory allocation of {} bytes (align {}) failed", .layout.size(), .layout.align())]
pub struct AllocError {
    layout: Layout,
}

impl AllocError {
    pub fn new(layout: Layout) -> Self {
        AllocError { layout }
    }

    /// The request that could not be satisfied.
    pub fn layout(&self) -> Layout {
        self.layout
    }
}

/// Failure of a constructor that builds the managed object in place.
///
/// In both cases the block memory has already been released by the time
/// the error is returned.
#[derive(Debug, Error)]
pub enum ConstructError<E> {
    #[error(transparent)]
    Alloc(#[from] AllocError),
    #[error("managed object construction failed: {0}")]
    Init(E),
}

/// Wrapping a box failed because the control block could not be allocated.
/// The box is handed back untouched.
#[derive(Error)]
#[error("could not wrap boxed object: {error}")]
pub struct FromBoxError<T: ?Sized> {
    #[source]
    pub error: AllocError,
    pub value: Box<T>,
}

impl<T: ?Sized> fmt::Debug for FromBoxError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FromBoxError")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

/// `try_shared_from_this` was called on an object that no `SharedPtr` owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("object is not owned by any SharedPtr")]
pub struct BadWeakPtr;

#[cfg(test)]
mod tests {
    use super::*;
    use std::string::ToString;

    #[test]
    fn test_messages() {
        let e = AllocError::new(Layout::from_size_align(8, 8).unwrap());
        assert_eq!(e.to_string(), "memory allocation of 8 bytes (align 8) failed");

        let c: ConstructError<&str> = ConstructError::Init("bad input");
        assert_eq!(c.to_string(), "managed object construction failed: bad input");

        let c: ConstructError<&str> = e.into();
        assert_eq!(c.to_string(), e.to_string());

        assert_eq!(BadWeakPtr.to_string(), "object is not owned by any SharedPtr");
    }
}
