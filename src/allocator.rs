//! The allocator seam used for control blocks.
//!
//! `core::alloc::Allocator` is still unstable, so blocks are allocated
//! through this small stable trait instead. [`Global`] forwards to the
//! process heap; [`StackStorage`][crate::arena::StackStorage] hands out
//! memory from a fixed buffer.
use crate::error::AllocError;
use core::{alloc::Layout, ptr::NonNull};

/// Source of memory for control blocks.
///
/// # Safety
/// A pointer returned from `allocate` must be valid for reads and writes of
/// `layout.size()` bytes, aligned to `layout.align()`, and stay valid until
/// it is passed to `deallocate` with the same layout.
pub unsafe trait Allocator {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError>;

    /// # Safety
    /// `ptr` must have come from `allocate` on this allocator (or a copy of
    /// it) with the same `layout`, and must not be used afterwards.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

/// The default heap allocator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Global;

unsafe impl Allocator for Global {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        // Control blocks always contain the counts, so `layout` is never
        // zero-sized.
        debug_assert_ne!(layout.size(), 0);
        let p = unsafe { alloc::alloc::alloc(layout) };
        NonNull::new(p).ok_or_else(|| AllocError::new(layout))
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        unsafe { alloc::alloc::dealloc(ptr.as_ptr(), layout) }
    }
}

unsafe impl<A: Allocator + ?Sized> Allocator for &A {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        (**self).allocate(layout)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        unsafe { (**self).deallocate(ptr, layout) }
    }
}
