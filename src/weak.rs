//! `WeakPtr<'a, T>` observes an object owned by [`SharedPtr`]s without
//! keeping it alive. It keeps only the control block alive, so it can tell
//! whether the object still exists and upgrade to a new strong handle if so.
//!
//! Weak handles are how cycles are broken: an object graph in which every
//! back edge is a `WeakPtr` is freed once its last outside `SharedPtr` goes.
use crate::{
    block::{self, BlockRef},
    shared::SharedPtr,
};
use core::{fmt, marker::PhantomData, mem};

pub struct WeakPtr<'a, T: ?Sized> {
    raw: Option<BlockRef<T>>,
    phantom: PhantomData<(&'a (), *const T)>,
}

impl<'a, T: ?Sized + 'a> WeakPtr<'a, T> {
    /// A weak handle that observes nothing; it is always expired.
    pub const fn new() -> Self {
        WeakPtr {
            raw: None,
            phantom: PhantomData,
        }
    }

    // Takes over one weak count on `raw`'s block.
    pub(crate) fn from_block(raw: BlockRef<T>) -> Self {
        WeakPtr {
            raw: Some(raw),
            phantom: PhantomData,
        }
    }

    /// Returns a new strong handle if the object is still alive.
    pub fn upgrade(&self) -> Option<SharedPtr<'a, T>> {
        let raw = self.raw?;
        if raw.header().inc_strong_if_nonzero() {
            Some(SharedPtr::from_block(raw))
        } else {
            None
        }
    }

    /// Like [`upgrade`][WeakPtr::upgrade], but gives an empty `SharedPtr`
    /// when the object is gone.
    pub fn lock(&self) -> SharedPtr<'a, T> {
        self.upgrade().unwrap_or_default()
    }

    // Get the current strong count of the observed object.
    pub fn use_count(&self) -> usize {
        self.raw.map_or(0, |raw| raw.header().strong())
    }

    // Get the current number of weak handles, this one included.
    pub fn weak_count(&self) -> usize {
        self.raw.map_or(0, |raw| raw.header().weak())
    }

    // Returns true if all strong pointers have been dropped,
    // so `upgrade` will return None.
    pub fn expired(&self) -> bool {
        self.use_count() == 0
    }

    /// Returns true if both handles observe the same control block (or both
    /// observe nothing).
    pub fn root_ptr_eq<U: ?Sized>(&self, other: &WeakPtr<'_, U>) -> bool {
        match (self.raw, other.raw) {
            (Some(a), Some(b)) => a.header == b.header,
            (None, None) => true,
            _ => false,
        }
    }

    /// Weak counterpart of [`SharedPtr::project`]. The projection needs the
    /// object, so if it has already been destroyed the result is empty.
    pub fn project<U: ?Sized + 'a, F: FnOnce(&T) -> &U>(this: Self, f: F) -> WeakPtr<'a, U> {
        match this.upgrade() {
            Some(strong) => SharedPtr::downgrade(&SharedPtr::project(strong, f)),
            None => WeakPtr::new(),
        }
    }
}

impl<'a, T: ?Sized> Clone for WeakPtr<'a, T> {
    fn clone(&self) -> Self {
        if let Some(raw) = self.raw {
            raw.header().inc_weak();
        }
        WeakPtr {
            raw: self.raw,
            phantom: PhantomData,
        }
    }

    fn clone_from(&mut self, source: &Self) {
        let mut tmp = source.clone();
        mem::swap(self, &mut tmp);
    }
}

impl<'a, T: ?Sized> Drop for WeakPtr<'a, T> {
    fn drop(&mut self) {
        if let Some(raw) = self.raw.take() {
            unsafe { block::release_weak(raw.header) }
        }
    }
}

impl<'a, T: ?Sized> Default for WeakPtr<'a, T> {
    fn default() -> Self {
        WeakPtr {
            raw: None,
            phantom: PhantomData,
        }
    }
}

impl<'a, T: ?Sized + 'a> From<&SharedPtr<'a, T>> for WeakPtr<'a, T> {
    fn from(strong: &SharedPtr<'a, T>) -> Self {
        SharedPtr::downgrade(strong)
    }
}

impl<'a, T: ?Sized> fmt::Debug for WeakPtr<'a, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(Weak)")
    }
}
