//! `SharedPtr<'a, T>` is the owning handle: like `std::rc::Rc<T>`, but with
//! the capabilities of C++'s `shared_ptr`.
//!
//! - The object and its counts may live in one allocation ([`SharedPtr::new`],
//!   [`SharedPtr::new_in`]) or the handle may adopt an object allocated
//!   elsewhere together with a custom [`Deleter`] ([`SharedPtr::from_box`],
//!   [`SharedPtr::from_raw_in`]).
//! - Any allocator implementing [`Allocator`] can hold the control block.
//! - A handle can be re-viewed as any part of its object (a field, a slice,
//!   a `dyn Trait`) with [`SharedPtr::project`], still sharing the one
//!   control block.
//! - A handle may be empty, as a default-constructed `shared_ptr` is.
//!
//! The lifetime `'a` bounds everything the handle keeps alive (the object,
//! the allocator, the deleter). Most code uses the alias
//! [`Shared<T>`][crate::Shared], which is `SharedPtr<'static, T>`.
use crate::{
    allocator::{Allocator, Global},
    block::{self, BlockRef, DefaultDelete, Deleter},
    error::{AllocError, ConstructError, FromBoxError},
    weak::WeakPtr,
};
use alloc::{alloc::handle_alloc_error, boxed::Box};
use core::{
    borrow, cmp,
    convert::Infallible,
    fmt, hash,
    marker::PhantomData,
    mem::{self, ManuallyDrop},
    ops::Deref,
    ptr::{self, NonNull},
};

/// Owning handle to a reference-counted object. See the module docs.
pub struct SharedPtr<'a, T: ?Sized> {
    pub(crate) raw: Option<BlockRef<T>>,
    phantom: PhantomData<(&'a (), T)>,
}

fn or_handle_alloc_error<T>(r: Result<T, AllocError>) -> T {
    match r {
        Ok(v) => v,
        Err(e) => handle_alloc_error(e.layout()),
    }
}

fn alloc_only<T>(r: Result<T, ConstructError<Infallible>>) -> Result<T, AllocError> {
    r.map_err(|e| match e {
        ConstructError::Alloc(e) => e,
        ConstructError::Init(never) => match never {},
    })
}

impl<'a, T: 'a> SharedPtr<'a, T> {
    /// Constructs a new `SharedPtr<T>` holding `value`, with the counts and
    /// the object in a single heap allocation.
    pub fn new(value: T) -> Self {
        Self::new_in(value, Global)
    }

    /// Like [`new`][SharedPtr::new], allocating the combined block from
    /// `alloc`. The allocator is kept in the block and frees it once the
    /// last strong or weak handle is gone.
    pub fn new_in<A: Allocator + 'a>(value: T, alloc: A) -> Self {
        or_handle_alloc_error(Self::try_new_in(value, alloc))
    }

    /// Fallible version of [`new_in`][SharedPtr::new_in]. On failure `value`
    /// is dropped and no handle exists.
    pub fn try_new_in<A: Allocator + 'a>(value: T, alloc: A) -> Result<Self, AllocError> {
        let raw = alloc_only(block::try_new_inline(alloc, |_, _| Ok(value)))?;
        Ok(Self::from_block(raw))
    }

    /// Allocates the block first, then builds the object in it with `init`.
    /// If `init` fails (or panics) the block is released before the error
    /// propagates.
    pub fn try_new_with<E, F>(init: F) -> Result<Self, ConstructError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        Self::try_new_with_in(Global, init)
    }

    /// [`try_new_with`][SharedPtr::try_new_with] with a custom allocator.
    pub fn try_new_with_in<A, E, F>(alloc: A, init: F) -> Result<Self, ConstructError<E>>
    where
        A: Allocator + 'a,
        F: FnOnce() -> Result<T, E>,
    {
        let raw = block::try_new_inline(alloc, |_, _| init())?;
        Ok(Self::from_block(raw))
    }

    /// Constructs a new `SharedPtr<T>` while giving you a `WeakPtr<T>` to the
    /// allocation, to allow you to construct a `T` which holds a weak pointer
    /// to itself.
    ///
    /// See `std::rc::Rc::new_cyclic` for more details.
    pub fn new_cyclic<F>(data_fn: F) -> Self
    where
        F: FnOnce(&WeakPtr<'a, T>) -> T,
    {
        let raw = block::try_new_inline(Global, |header, ptr| {
            // Lend out the block's initial weak reference; it becomes the one
            // the strong handles share once construction succeeds.
            let weak = ManuallyDrop::new(WeakPtr::from_block(BlockRef { header, ptr }));
            Ok(data_fn(&weak))
        });
        Self::from_block(or_handle_alloc_error(alloc_only(raw)))
    }
}

impl<'a, T: ?Sized + 'a> SharedPtr<'a, T> {
    /// A handle that owns nothing.
    pub const fn empty() -> Self {
        SharedPtr {
            raw: None,
            phantom: PhantomData,
        }
    }

    // Takes over one strong count on `raw`'s block.
    pub(crate) fn from_block(raw: BlockRef<T>) -> Self {
        SharedPtr {
            raw: Some(raw),
            phantom: PhantomData,
        }
    }

    /// Return a `SharedPtr<T>` for a boxed value. This reuses the box
    /// allocation as-is and allocates a separate control block for the
    /// counts; the box is freed when the last strong handle goes away.
    pub fn from_box(value: Box<T>) -> Self {
        Self::from_box_in(value, Global)
    }

    /// Like [`from_box`][SharedPtr::from_box], with the control block
    /// allocated from `alloc`.
    pub fn from_box_in<A: Allocator + 'a>(value: Box<T>, alloc: A) -> Self {
        match Self::try_from_box_in(value, alloc) {
            Ok(p) => p,
            Err(e) => handle_alloc_error(e.error.layout()),
        }
    }

    /// Fallible version of [`from_box_in`][SharedPtr::from_box_in]. The box
    /// is handed back inside the error.
    pub fn try_from_box_in<A: Allocator + 'a>(
        value: Box<T>,
        alloc: A,
    ) -> Result<Self, FromBoxError<T>> {
        // Safety: Box::into_raw is never null
        let object = unsafe { NonNull::new_unchecked(Box::into_raw(value)) };
        match block::try_new_out_of_line(object, DefaultDelete, alloc) {
            Ok(raw) => Ok(Self::from_block(raw)),
            Err(error) => Err(FromBoxError {
                error,
                // Safety: the block was not created, so we still own the box
                value: unsafe { Box::from_raw(object.as_ptr()) },
            }),
        }
    }

    /// Takes ownership of `ptr`, which `deleter` will tear down when the last
    /// strong handle goes away. The control block comes from the global heap.
    ///
    /// # Safety
    /// `ptr` must point to a valid `T` that stays valid until `deleter` runs,
    /// and nothing else may free it or hand out `&mut` to it.
    pub unsafe fn from_raw_with<D>(ptr: NonNull<T>, deleter: D) -> Self
    where
        D: Deleter<T> + 'a,
    {
        unsafe { Self::from_raw_in(ptr, deleter, Global) }
    }

    /// Takes ownership of `ptr` with a custom deleter and allocator.
    ///
    /// # Safety
    /// As for [`from_raw_with`][SharedPtr::from_raw_with].
    pub unsafe fn from_raw_in<D, A>(ptr: NonNull<T>, deleter: D, alloc: A) -> Self
    where
        D: Deleter<T> + 'a,
        A: Allocator + 'a,
    {
        or_handle_alloc_error(unsafe { Self::try_from_raw_in(ptr, deleter, alloc) })
    }

    /// Fallible version of [`from_raw_in`][SharedPtr::from_raw_in]. If the
    /// control block can't be allocated `ptr` is left alone and remains the
    /// caller's responsibility; `deleter` is dropped without being called.
    ///
    /// # Safety
    /// As for [`from_raw_with`][SharedPtr::from_raw_with].
    pub unsafe fn try_from_raw_in<D, A>(
        ptr: NonNull<T>,
        deleter: D,
        alloc: A,
    ) -> Result<Self, AllocError>
    where
        D: Deleter<T> + 'a,
        A: Allocator + 'a,
    {
        let raw = block::try_new_out_of_line(ptr, deleter, alloc)?;
        Ok(Self::from_block(raw))
    }

    /// Give up this handle's ownership, leaving it empty.
    pub fn reset(this: &mut Self) {
        drop(mem::replace(this, SharedPtr::empty()));
    }

    /// Release the current object and take ownership of `value` instead,
    /// through a freshly allocated control block.
    pub fn reset_box(this: &mut Self, value: Box<T>) {
        let mut tmp = SharedPtr::from_box(value);
        mem::swap(this, &mut tmp);
    }

    /// Return a `SharedPtr<U>` for any type U contained within T, e.g. a
    /// field, an element of a slice, or a `&dyn` view of the object. The
    /// result shares this handle's control block.
    ///
    /// Projecting an empty handle gives an empty handle without calling `f`.
    pub fn project<U: ?Sized + 'a, F: FnOnce(&T) -> &U>(this: Self, f: F) -> SharedPtr<'a, U> {
        let raw = match this.raw {
            Some(raw) => raw,
            None => return SharedPtr::empty(),
        };
        let ptr = NonNull::from(f(unsafe { raw.ptr.as_ref() }));
        // the strong count moves to the new handle
        mem::forget(this);
        SharedPtr::from_block(raw.with_ptr(ptr))
    }

    /// Fallible version of `project()`. If `f` returns `None` the handle is
    /// dropped.
    pub fn try_project<U: ?Sized + 'a, F: FnOnce(&T) -> Option<&U>>(
        this: Self,
        f: F,
    ) -> Option<SharedPtr<'a, U>> {
        let raw = this.raw?;
        let ptr = NonNull::from(f(unsafe { raw.ptr.as_ref() })?);
        mem::forget(this);
        Some(SharedPtr::from_block(raw.with_ptr(ptr)))
    }

    /// Convert `SharedPtr<T>` to `SharedPtr<U>`, as long as &T converts to &U.
    ///
    /// This should be spelled `from()`, but that conflicts with the blanket
    /// impl converting T->T.
    pub fn cast<U: ?Sized + 'a>(this: Self) -> SharedPtr<'a, U>
    where
        for<'u> &'u U: From<&'u T>,
    {
        SharedPtr::project(this, |x| From::from(x))
    }

    /// Return a [`WeakPtr`] to this object. Downgrading an empty handle
    /// gives an empty weak handle.
    pub fn downgrade(this: &Self) -> WeakPtr<'a, T> {
        match this.raw {
            Some(raw) => {
                raw.header().inc_weak();
                WeakPtr::from_block(raw)
            }
            None => WeakPtr::new(),
        }
    }

    /// Number of `SharedPtr`s sharing this object, or 0 for an empty handle.
    pub fn use_count(this: &Self) -> usize {
        this.raw.map_or(0, |raw| raw.header().strong())
    }

    /// Number of `WeakPtr`s observing this object, or 0 for an empty handle.
    pub fn weak_count(this: &Self) -> usize {
        this.raw.map_or(0, |raw| raw.header().weak())
    }

    pub fn is_empty(this: &Self) -> bool {
        this.raw.is_none()
    }

    /// The object, or `None` for an empty handle.
    pub fn get(this: &Self) -> Option<&T> {
        // Safety: a non-empty handle keeps the object alive
        this.raw.map(|raw| unsafe { &*raw.ptr.as_ptr() })
    }

    /// Returns a mutable reference to the object if no other `SharedPtr` or
    /// [`WeakPtr`] to it exists.
    pub fn get_mut(this: &mut Self) -> Option<&mut T> {
        match this.raw {
            Some(raw) if raw.header().strong() == 1 && raw.header().weak() == 0 => {
                Some(unsafe { &mut *raw.ptr.as_ptr() })
            }
            _ => None,
        }
    }

    /// Address of the whole object the control block manages (not of the
    /// projected view), or null for an empty handle.
    pub fn root_ptr(this: &Self) -> *const u8 {
        match this.raw {
            Some(raw) => unsafe { block::fetch_pointer(raw.header) },
            None => ptr::null(),
        }
    }

    /// Returns true if two handles point to the same object. Note that this
    /// is not the same as sharing the same control block: both might be
    /// projections of different fields of one object.
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        match (this.raw, other.raw) {
            (Some(a), Some(b)) => a.ptr == b.ptr,
            (None, None) => true,
            _ => false,
        }
    }

    /// Returns true if two handles share a control block, i.e. the same
    /// counts, whatever part of the object each one views.
    pub fn root_ptr_eq<U: ?Sized>(this: &Self, other: &SharedPtr<'_, U>) -> bool {
        match (this.raw, other.raw) {
            (Some(a), Some(b)) => a.header == b.header,
            (None, None) => true,
            _ => false,
        }
    }
}

impl<'a, T: ?Sized> Clone for SharedPtr<'a, T> {
    fn clone(&self) -> Self {
        if let Some(raw) = self.raw {
            raw.header().inc_strong();
        }
        SharedPtr {
            raw: self.raw,
            phantom: PhantomData,
        }
    }

    /// The old object is released only after `source` has been counted, so
    /// assigning a handle to itself is harmless.
    fn clone_from(&mut self, source: &Self) {
        let mut tmp = source.clone();
        mem::swap(self, &mut tmp);
    }
}

impl<'a, T: ?Sized> Drop for SharedPtr<'a, T> {
    fn drop(&mut self) {
        if let Some(raw) = self.raw.take() {
            unsafe { block::release_strong(raw.header) }
        }
    }
}

impl<'a, T: ?Sized> Default for SharedPtr<'a, T> {
    fn default() -> Self {
        SharedPtr {
            raw: None,
            phantom: PhantomData,
        }
    }
}

/// # Panics
/// Dereferencing an empty handle panics; use [`SharedPtr::get`] when the
/// handle may be empty.
impl<'a, T: ?Sized> Deref for SharedPtr<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        match self.raw {
            // Safety: ptr is valid for as long as we hold a strong count,
            // there's just no way to spell that lifetime in Rust.
            Some(raw) => unsafe { &*raw.ptr.as_ptr() },
            None => panic!("dereferenced an empty SharedPtr"),
        }
    }
}

impl<'a, T: ?Sized> AsRef<T> for SharedPtr<'a, T> {
    fn as_ref(&self) -> &T {
        self
    }
}

impl<'a, T: ?Sized> borrow::Borrow<T> for SharedPtr<'a, T> {
    fn borrow(&self) -> &T {
        self
    }
}

impl<'a, T: ?Sized + 'a> From<Box<T>> for SharedPtr<'a, T> {
    fn from(value: Box<T>) -> Self {
        SharedPtr::from_box(value)
    }
}

impl<'a, T: ?Sized + 'a + PartialEq> PartialEq for SharedPtr<'a, T> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        SharedPtr::get(self) == SharedPtr::get(other)
    }
}

impl<'a, T: ?Sized + 'a + Eq> Eq for SharedPtr<'a, T> {}

impl<'a, T: ?Sized + 'a + PartialOrd> PartialOrd for SharedPtr<'a, T> {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        SharedPtr::get(self).partial_cmp(&SharedPtr::get(other))
    }
}

impl<'a, T: ?Sized + 'a + Ord> Ord for SharedPtr<'a, T> {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        SharedPtr::get(self).cmp(&SharedPtr::get(other))
    }
}

impl<'a, T: ?Sized + 'a + hash::Hash> hash::Hash for SharedPtr<'a, T> {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        SharedPtr::get(self).hash(state)
    }
}

impl<'a, T: ?Sized + 'a + fmt::Display> fmt::Display for SharedPtr<'a, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match SharedPtr::get(self) {
            Some(v) => fmt::Display::fmt(v, f),
            None => Ok(()),
        }
    }
}

impl<'a, T: ?Sized + 'a + fmt::Debug> fmt::Debug for SharedPtr<'a, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match SharedPtr::get(self) {
            Some(v) => fmt::Debug::fmt(v, f),
            None => f.write_str("(empty)"),
        }
    }
}

impl<'a, T: ?Sized> fmt::Pointer for SharedPtr<'a, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.raw {
            Some(raw) => fmt::Pointer::fmt(&raw.ptr, f),
            None => fmt::Pointer::fmt(&ptr::null::<u8>(), f),
        }
    }
}
