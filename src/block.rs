//! Control blocks: the reference counts for one managed object, plus
//! type-erased operations to find, destroy and free it.
//!
//! There are two variants. An *inline* block embeds the object's storage
//! (one allocation for both; used by `SharedPtr::new` and friends). An
//! *out-of-line* block points at an object allocated elsewhere and carries
//! the [`Deleter`] that tears it down (used by `SharedPtr::from_box` and
//! `SharedPtr::from_raw_in`). Handles only ever see the common [`Header`].
use crate::{
    allocator::Allocator,
    error::{AllocError, ConstructError},
};
use alloc::boxed::Box;
use core::{
    alloc::Layout,
    cell::Cell,
    mem::{self, ManuallyDrop, MaybeUninit},
    ptr::{self, NonNull},
};
use log::{debug, trace};

/// How a separately allocated object is torn down when its last
/// `SharedPtr` goes away.
///
/// Any `FnOnce(NonNull<T>)` is a deleter.
pub trait Deleter<T: ?Sized> {
    /// # Safety
    /// `ptr` must be the pointer the deleter was registered with, and it is
    /// called at most once.
    unsafe fn delete(self, ptr: NonNull<T>);
}

impl<T: ?Sized, F: FnOnce(NonNull<T>)> Deleter<T> for F {
    unsafe fn delete(self, ptr: NonNull<T>) {
        self(ptr)
    }
}

/// Frees an object that was allocated by `Box`. This is the deleter behind
/// [`SharedPtr::from_box`][crate::SharedPtr::from_box].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DefaultDelete;

impl<T: ?Sized> Deleter<T> for DefaultDelete {
    unsafe fn delete(self, ptr: NonNull<T>) {
        drop(unsafe { Box::from_raw(ptr.as_ptr()) });
    }
}

// Counts and type-erased operations. Every block variant is `repr(C)` with a
// `Header` first, so a pointer to the block is also a pointer to its header.
pub(crate) struct Header {
    strong: Cell<usize>,
    // Weak handles, plus one reference held collectively by the strong
    // handles while `strong > 0`.
    weak: Cell<usize>,
    fetch_pointer: unsafe fn(NonNull<Header>) -> *mut u8,
    destroy_value: unsafe fn(NonNull<Header>),
    release_block: unsafe fn(NonNull<Header>),
}

impl Header {
    pub(crate) fn strong(&self) -> usize {
        self.strong.get()
    }

    /// Number of weak handles, not counting the one the strong handles share.
    pub(crate) fn weak(&self) -> usize {
        let w = self.weak.get();
        if self.strong.get() > 0 {
            w - 1
        } else {
            w
        }
    }

    pub(crate) fn inc_strong(&self) {
        self.strong.set(self.strong.get() + 1);
    }

    pub(crate) fn inc_strong_if_nonzero(&self) -> bool {
        let s = self.strong.get();
        if s == 0 {
            false
        } else {
            self.strong.set(s + 1);
            true
        }
    }

    pub(crate) fn inc_weak(&self) {
        self.weak.set(self.weak.get() + 1);
    }
}

/// Address of the managed object's root, or null once it has been destroyed
/// (out-of-line blocks only).
///
/// # Safety
/// `header` must point to a live block.
pub(crate) unsafe fn fetch_pointer(header: NonNull<Header>) -> *mut u8 {
    unsafe {
        let f = header.as_ref().fetch_pointer;
        f(header)
    }
}

/// Drops one strong reference. The last one destroys the object and then
/// gives up the weak reference the strong handles share.
///
/// # Safety
/// `header` must point to a live block, and the caller gives up one strong
/// reference it owned.
pub(crate) unsafe fn release_strong(header: NonNull<Header>) {
    let h = unsafe { header.as_ref() };
    let s = h.strong.get() - 1;
    h.strong.set(s);
    if s != 0 {
        return;
    }
    // last strong pointer was just dropped
    trace!("destroying object of control block {:p}", header);
    unsafe {
        let f = h.destroy_value;
        f(header);
    }
    // Weak handles dropped by the destructor above can't free the block,
    // since this reference is still outstanding.
    unsafe { release_weak(header) };
}

/// Drops one weak reference, freeing the block if it was the last.
///
/// # Safety
/// `header` must point to a live block, and the caller gives up one weak
/// reference it owned.
pub(crate) unsafe fn release_weak(header: NonNull<Header>) {
    let h = unsafe { header.as_ref() };
    let w = h.weak.get() - 1;
    h.weak.set(w);
    if w != 0 {
        return;
    }
    debug_assert_eq!(h.strong.get(), 0);
    trace!("releasing control block {:p}", header);
    unsafe {
        let f = h.release_block;
        f(header);
    }
}

/// Header and a typed view into the block's object. Handles hold one of
/// these (or nothing, when empty).
pub(crate) struct BlockRef<T: ?Sized> {
    pub(crate) header: NonNull<Header>,
    pub(crate) ptr: NonNull<T>,
}

impl<T: ?Sized> Clone for BlockRef<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized> Copy for BlockRef<T> {}

impl<T: ?Sized> BlockRef<T> {
    pub(crate) fn header(&self) -> &Header {
        // Safety: a handle holding a BlockRef owns a count on the block,
        // which keeps the header alive.
        unsafe { self.header.as_ref() }
    }

    /// Same block, different view.
    pub(crate) fn with_ptr<U: ?Sized>(self, ptr: NonNull<U>) -> BlockRef<U> {
        BlockRef {
            header: self.header,
            ptr,
        }
    }
}

#[repr(C)]
struct InlineBlock<T, A> {
    header: Header,
    alloc: ManuallyDrop<A>,
    value: MaybeUninit<T>,
}

#[repr(C)]
struct OutOfLineBlock<T: ?Sized, D, A> {
    header: Header,
    alloc: ManuallyDrop<A>,
    deleter: ManuallyDrop<D>,
    object: Option<NonNull<T>>,
}

// Owns the initial weak reference of a block under construction.
struct ReleaseOnUnwind(NonNull<Header>);

impl Drop for ReleaseOnUnwind {
    fn drop(&mut self) {
        unsafe { release_weak(self.0) }
    }
}

/// Allocates an inline block and builds the value in place with `init`,
/// which is given the block's header and the address the value will occupy.
///
/// While `init` runs the block has no strong reference and one weak one.
/// If `init` fails or panics that weak reference is released, which frees
/// the memory unless `init` cloned it. On success the strong count is 1.
pub(crate) fn try_new_inline<T, A, E, F>(alloc: A, init: F) -> Result<BlockRef<T>, ConstructError<E>>
where
    A: Allocator,
    F: FnOnce(NonNull<Header>, NonNull<T>) -> Result<T, E>,
{
    let layout = Layout::new::<InlineBlock<T, A>>();
    let raw = alloc.allocate(layout).map_err(|e| {
        debug!("control block allocation failed: {}", e);
        e
    })?;
    let b = raw.cast::<InlineBlock<T, A>>().as_ptr();
    unsafe {
        ptr::addr_of_mut!((*b).header).write(Header {
            strong: Cell::new(0),
            weak: Cell::new(1),
            fetch_pointer: fetch_inline::<T, A>,
            destroy_value: destroy_inline::<T, A>,
            release_block: release_inline::<T, A>,
        });
        ptr::addr_of_mut!((*b).alloc).write(ManuallyDrop::new(alloc));
    }
    let header = raw.cast::<Header>();
    // Safety: derived from a non-null allocation
    let value = unsafe { NonNull::new_unchecked(ptr::addr_of_mut!((*b).value) as *mut T) };
    trace!("allocated inline control block {:p} ({} bytes)", header, layout.size());

    let guard = ReleaseOnUnwind(header);
    match init(header, value) {
        Ok(v) => {
            mem::forget(guard);
            unsafe {
                value.as_ptr().write(v);
                let h = header.as_ref();
                debug_assert_eq!(h.strong.get(), 0, "No prior strong references should exist");
                h.strong.set(1);
            }
            Ok(BlockRef { header, ptr: value })
        }
        Err(e) => {
            debug!("construction failed, rolling back control block {:p}", header);
            drop(guard);
            Err(ConstructError::Init(e))
        }
    }
}

/// Allocates an out-of-line block owning `object`, with a strong count of 1.
///
/// On failure nothing is done to `object`; it stays the caller's.
pub(crate) fn try_new_out_of_line<T, D, A>(
    object: NonNull<T>,
    deleter: D,
    alloc: A,
) -> Result<BlockRef<T>, AllocError>
where
    T: ?Sized,
    D: Deleter<T>,
    A: Allocator,
{
    let layout = Layout::new::<OutOfLineBlock<T, D, A>>();
    let raw = alloc.allocate(layout).map_err(|e| {
        debug!("control block allocation failed: {}", e);
        e
    })?;
    let b = raw.cast::<OutOfLineBlock<T, D, A>>();
    unsafe {
        b.as_ptr().write(OutOfLineBlock {
            header: Header {
                strong: Cell::new(1),
                weak: Cell::new(1),
                fetch_pointer: fetch_out_of_line::<T, D, A>,
                destroy_value: destroy_out_of_line::<T, D, A>,
                release_block: release_out_of_line::<T, D, A>,
            },
            alloc: ManuallyDrop::new(alloc),
            deleter: ManuallyDrop::new(deleter),
            object: Some(object),
        });
    }
    let header = raw.cast::<Header>();
    trace!("allocated control block {:p} for object {:p}", header, object);
    Ok(BlockRef {
        header,
        ptr: object,
    })
}

unsafe fn fetch_inline<T, A>(header: NonNull<Header>) -> *mut u8 {
    let b = header.cast::<InlineBlock<T, A>>().as_ptr();
    unsafe { ptr::addr_of_mut!((*b).value) as *mut u8 }
}

unsafe fn destroy_inline<T, A>(header: NonNull<Header>) {
    let b = header.cast::<InlineBlock<T, A>>().as_ptr();
    unsafe { ptr::drop_in_place(ptr::addr_of_mut!((*b).value) as *mut T) }
}

unsafe fn release_inline<T, A: Allocator>(header: NonNull<Header>) {
    let b = header.cast::<InlineBlock<T, A>>();
    unsafe {
        let alloc = ManuallyDrop::take(&mut (*b.as_ptr()).alloc);
        alloc.deallocate(b.cast(), Layout::new::<InlineBlock<T, A>>());
    }
}

unsafe fn fetch_out_of_line<T: ?Sized, D, A>(header: NonNull<Header>) -> *mut u8 {
    let b = header.cast::<OutOfLineBlock<T, D, A>>().as_ptr();
    match unsafe { (*b).object } {
        Some(p) => p.as_ptr() as *mut u8,
        None => ptr::null_mut(),
    }
}

unsafe fn destroy_out_of_line<T: ?Sized, D: Deleter<T>, A>(header: NonNull<Header>) {
    let b = header.cast::<OutOfLineBlock<T, D, A>>().as_ptr();
    unsafe {
        if let Some(object) = (*b).object.take() {
            let deleter = ManuallyDrop::take(&mut (*b).deleter);
            deleter.delete(object);
        }
    }
}

unsafe fn release_out_of_line<T: ?Sized, D, A: Allocator>(header: NonNull<Header>) {
    let b = header.cast::<OutOfLineBlock<T, D, A>>();
    unsafe {
        debug_assert!((*b.as_ptr()).object.is_none());
        let alloc = ManuallyDrop::take(&mut (*b.as_ptr()).alloc);
        alloc.deallocate(b.cast(), Layout::new::<OutOfLineBlock<T, D, A>>());
    }
}
