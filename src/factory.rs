//! Free-function factories for the co-allocated form.
//!
//! These build the object inside the control block, so a handle made here
//! costs exactly one allocation. The `*_from_this` variants additionally bind
//! the object's [`EnableSharedFromThis`][crate::EnableSharedFromThis].
use crate::{
    allocator::{Allocator, Global},
    error::ConstructError,
    shared::SharedPtr,
    this::SharedFromThis,
    Shared,
};

/// Wraps `value` in a new block on the global heap.
pub fn make_shared<'a, T: 'a>(value: T) -> SharedPtr<'a, T> {
    SharedPtr::new(value)
}

/// Wraps `value` in a new block taken from `alloc`. The block keeps `alloc`
/// and returns its memory through it.
pub fn allocate_shared<'a, T: 'a, A: Allocator + 'a>(alloc: A, value: T) -> SharedPtr<'a, T> {
    SharedPtr::new_in(value, alloc)
}

/// Builds the object in place with `init`. If `init` fails the block is
/// released and the error is returned.
pub fn try_make_shared_with<'a, T, E, F>(init: F) -> Result<SharedPtr<'a, T>, ConstructError<E>>
where
    T: 'a,
    F: FnOnce() -> Result<T, E>,
{
    SharedPtr::try_new_with_in(Global, init)
}

pub fn try_allocate_shared_with<'a, T, A, E, F>(
    alloc: A,
    init: F,
) -> Result<SharedPtr<'a, T>, ConstructError<E>>
where
    T: 'a,
    A: Allocator + 'a,
    F: FnOnce() -> Result<T, E>,
{
    SharedPtr::try_new_with_in(alloc, init)
}

/// [`make_shared`] for objects that can hand out handles to themselves.
pub fn make_shared_from_this<T: SharedFromThis>(value: T) -> Shared<T> {
    SharedPtr::new_enabled(value)
}

pub fn allocate_shared_from_this<T, A>(alloc: A, value: T) -> Shared<T>
where
    T: SharedFromThis,
    A: Allocator + 'static,
{
    SharedPtr::new_enabled_in(value, alloc)
}
