//! A fixed-capacity bump allocator.
//!
//! `StackStorage<N>` owns an `N`-byte buffer and hands out successive,
//! suitably aligned slices of it. Deallocation is a no-op; the memory comes
//! back only when the storage itself goes away. Because the storage is
//! borrowed by every block allocated from it, handles built on it cannot
//! outlive it:
//!
//! ```
//! use sharedptr::{arena::StackStorage, SharedPtr};
//!
//! let storage = StackStorage::<256>::new();
//! let a = SharedPtr::new_in([1u32; 4], &storage);
//! let b = SharedPtr::new_in(7u8, &storage);
//! assert_eq!(a[2] + u32::from(*b), 8);
//! assert!(storage.used() > 0);
//! ```
use crate::{allocator::Allocator, error::AllocError};
use core::{
    alloc::Layout,
    cell::{Cell, UnsafeCell},
    fmt,
    mem::MaybeUninit,
    ptr::NonNull,
};

pub struct StackStorage<const N: usize> {
    buf: UnsafeCell<[MaybeUninit<u8>; N]>,
    taken: Cell<usize>,
}

impl<const N: usize> StackStorage<N> {
    pub const fn new() -> Self {
        StackStorage {
            buf: UnsafeCell::new([MaybeUninit::uninit(); N]),
            taken: Cell::new(0),
        }
    }

    /// Bytes handed out so far, including alignment padding.
    pub fn used(&self) -> usize {
        self.taken.get()
    }

    pub fn remaining(&self) -> usize {
        N - self.taken.get()
    }

    pub const fn capacity(&self) -> usize {
        N
    }
}

impl<const N: usize> Default for StackStorage<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> fmt::Debug for StackStorage<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StackStorage")
            .field("capacity", &N)
            .field("used", &self.used())
            .finish()
    }
}

unsafe impl<const N: usize> Allocator for StackStorage<N> {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        let base = self.buf.get() as *mut u8;
        let taken = self.taken.get();
        let start = base as usize + taken;
        let pad = start.wrapping_neg() & (layout.align() - 1);
        let end = taken
            .checked_add(pad)
            .and_then(|n| n.checked_add(layout.size()))
            .filter(|&n| n <= N)
            .ok_or_else(|| AllocError::new(layout))?;
        self.taken.set(end);
        // Safety: `taken + pad` is within the buffer, checked above.
        Ok(unsafe { NonNull::new_unchecked(base.add(taken + pad)) })
    }

    unsafe fn deallocate(&self, _ptr: NonNull<u8>, _layout: Layout) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SharedPtr, WeakPtr};
    use std::string::String;

    #[test]
    fn test_alignment() {
        let s = StackStorage::<64>::new();
        let a = s.allocate(Layout::new::<u8>()).unwrap();
        let b = s.allocate(Layout::new::<u64>()).unwrap();
        assert_eq!(b.as_ptr() as usize % core::mem::align_of::<u64>(), 0);
        assert!(b.as_ptr() as usize > a.as_ptr() as usize);
        assert!(s.used() >= 9);
    }

    #[test]
    fn test_exhausted() {
        let s = StackStorage::<16>::new();
        assert!(s.allocate(Layout::from_size_align(12, 1).unwrap()).is_ok());
        let layout = Layout::from_size_align(8, 1).unwrap();
        assert_eq!(s.allocate(layout), Err(AllocError::new(layout)));
        // a failed request does not consume anything
        assert_eq!(s.remaining(), 4);
    }

    #[test]
    fn test_shared_in_arena() {
        let s = StackStorage::<512>::new();
        let a = SharedPtr::new_in(String::from("hello"), &s);
        let w = SharedPtr::downgrade(&a);
        let used = s.used();
        let b = a.clone();
        assert_eq!(s.used(), used, "cloning must not allocate");
        drop(a);
        drop(b);
        assert!(w.expired());
        drop(w);
    }

    #[test]
    fn test_arena_full() {
        let s = StackStorage::<8>::new();
        let r = SharedPtr::try_new_in([0u64; 4], &s);
        assert!(r.is_err());
        assert_eq!(s.used(), 0);
        let w: WeakPtr<'_, [u64; 4]> = WeakPtr::new();
        assert!(w.expired());
    }
}
