//! Letting an object hand out owning handles to itself.
//!
//! An object opts in by embedding an [`EnableSharedFromThis<Self>`] and
//! implementing [`SharedFromThis`] to expose it. When such an object is
//! first wrapped by one of the `*_enabled` constructors (or the
//! [`make_shared_from_this`][crate::make_shared_from_this] factories) the
//! embedded weak handle is pointed at the new control block, after which
//! `shared_from_this()` works from any `&self`.
//!
//! ```
//! use sharedptr::{EnableSharedFromThis, Shared, SharedFromThis};
//!
//! struct Session {
//!     id: u32,
//!     this: EnableSharedFromThis<Session>,
//! }
//!
//! impl SharedFromThis for Session {
//!     fn enable_shared_from_this(&self) -> &EnableSharedFromThis<Self> {
//!         &self.this
//!     }
//! }
//!
//! impl Session {
//!     fn handle(&self) -> Shared<Session> {
//!         self.shared_from_this()
//!     }
//! }
//!
//! let s = Shared::new_enabled(Session { id: 3, this: EnableSharedFromThis::new() });
//! let h = s.handle();
//! assert_eq!(h.id, 3);
//! assert_eq!(Shared::use_count(&s), 2);
//! assert!(Shared::ptr_eq(&s, &h));
//! ```
//!
//! The embedded handle is weak, so it never keeps its own object alive.
use crate::{
    allocator::{Allocator, Global},
    block::Deleter,
    error::BadWeakPtr,
    shared::SharedPtr,
    Shared, Weak,
};
use alloc::boxed::Box;
use core::{cell::OnceCell, fmt, ptr::NonNull};
use log::debug;

/// Storage for an object's weak handle to itself. Set once, when the object
/// is first wrapped, and never changed afterwards.
pub struct EnableSharedFromThis<T: ?Sized + 'static> {
    weak_this: OnceCell<Weak<T>>,
}

impl<T: ?Sized + 'static> EnableSharedFromThis<T> {
    pub const fn new() -> Self {
        EnableSharedFromThis {
            weak_this: OnceCell::new(),
        }
    }

    /// A new owning handle to the enclosing object.
    ///
    /// If the object was never wrapped by an enabled constructor (or is
    /// being destroyed) the result is empty. Use
    /// [`try_shared_from_this`][Self::try_shared_from_this] to treat that as
    /// an error instead.
    pub fn shared_from_this(&self) -> Shared<T> {
        self.try_shared_from_this().unwrap_or_else(|_| {
            debug!("shared_from_this called on an object with no owner");
            SharedPtr::empty()
        })
    }

    pub fn try_shared_from_this(&self) -> Result<Shared<T>, BadWeakPtr> {
        self.weak_this
            .get()
            .and_then(Weak::upgrade)
            .ok_or(BadWeakPtr)
    }

    /// A weak handle to the enclosing object; empty if it was never wrapped.
    pub fn weak_from_this(&self) -> Weak<T> {
        self.weak_this.get().cloned().unwrap_or_default()
    }

    pub(crate) fn bind(&self, weak: Weak<T>) {
        if self.weak_this.set(weak).is_err() {
            debug!("object is already bound to a control block");
        }
    }
}

impl<T: ?Sized + 'static> Default for EnableSharedFromThis<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A copy of an object is a different object, so it starts out unbound.
impl<T: ?Sized + 'static> Clone for EnableSharedFromThis<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T: ?Sized + 'static> fmt::Debug for EnableSharedFromThis<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnableSharedFromThis")
            .field("bound", &self.weak_this.get().is_some())
            .finish()
    }
}

/// Implemented by objects that embed an [`EnableSharedFromThis`].
pub trait SharedFromThis: 'static {
    fn enable_shared_from_this(&self) -> &EnableSharedFromThis<Self>;

    fn shared_from_this(&self) -> Shared<Self> {
        self.enable_shared_from_this().shared_from_this()
    }

    fn try_shared_from_this(&self) -> Result<Shared<Self>, BadWeakPtr> {
        self.enable_shared_from_this().try_shared_from_this()
    }

    fn weak_from_this(&self) -> Weak<Self> {
        self.enable_shared_from_this().weak_from_this()
    }
}

impl<T: SharedFromThis> SharedPtr<'static, T> {
    /// [`SharedPtr::new`], then binds the object's self reference.
    pub fn new_enabled(value: T) -> Self {
        Self::enable(SharedPtr::new(value))
    }

    /// [`SharedPtr::new_in`], then binds the object's self reference.
    pub fn new_enabled_in<A: Allocator + 'static>(value: T, alloc: A) -> Self {
        Self::enable(SharedPtr::new_in(value, alloc))
    }
}

impl<T: SharedFromThis + ?Sized> SharedPtr<'static, T> {
    /// [`SharedPtr::from_box`], then binds the object's self reference.
    pub fn from_box_enabled(value: Box<T>) -> Self {
        Self::enable(SharedPtr::from_box(value))
    }

    /// [`SharedPtr::from_raw_in`], then binds the object's self reference.
    ///
    /// # Safety
    /// As for [`SharedPtr::from_raw_with`].
    pub unsafe fn from_raw_enabled_in<D, A>(ptr: NonNull<T>, deleter: D, alloc: A) -> Self
    where
        D: Deleter<T> + 'static,
        A: Allocator + 'static,
    {
        Self::enable(unsafe { SharedPtr::from_raw_in(ptr, deleter, alloc) })
    }

    /// [`SharedPtr::from_raw_with`] on the global heap, then binds the
    /// object's self reference.
    ///
    /// # Safety
    /// As for [`SharedPtr::from_raw_with`].
    pub unsafe fn from_raw_enabled<D>(ptr: NonNull<T>, deleter: D) -> Self
    where
        D: Deleter<T> + 'static,
    {
        unsafe { Self::from_raw_enabled_in(ptr, deleter, Global) }
    }

    // The bound handle is weak: it adds to the weak count, never the strong.
    fn enable(this: Self) -> Self {
        if let Some(obj) = SharedPtr::get(&this) {
            obj.enable_shared_from_this().bind(SharedPtr::downgrade(&this));
        }
        this
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::testing::CountingAlloc;
    use core::cell::Cell;
    use std::{boxed::Box, rc::Rc};

    struct Widget {
        value: i32,
        this: EnableSharedFromThis<Widget>,
        drops: Rc<Cell<usize>>,
    }

    impl Widget {
        fn new(value: i32, drops: &Rc<Cell<usize>>) -> Self {
            Widget {
                value,
                this: EnableSharedFromThis::new(),
                drops: drops.clone(),
            }
        }
    }

    impl SharedFromThis for Widget {
        fn enable_shared_from_this(&self) -> &EnableSharedFromThis<Self> {
            &self.this
        }
    }

    impl Drop for Widget {
        fn drop(&mut self) {
            // the object is already unowned while it is being destroyed
            assert!(self.try_shared_from_this().is_err());
            self.drops.set(self.drops.get() + 1);
        }
    }

    #[test]
    fn test_identity() {
        let drops = Rc::new(Cell::new(0));
        let w = Shared::new_enabled(Widget::new(42, &drops));
        assert_eq!(Shared::use_count(&w), 1);
        assert_eq!(Shared::weak_count(&w), 1);

        let again = w.shared_from_this();
        assert_eq!(Shared::use_count(&w), 2);
        assert_eq!(Shared::use_count(&again), 2);
        assert!(Shared::ptr_eq(&w, &again));
        assert!(Shared::root_ptr_eq(&w, &again));
        assert_eq!(again.value, 42);

        drop(again);
        assert_eq!(Shared::use_count(&w), 1);
        drop(w);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn test_unbound() {
        let drops = Rc::new(Cell::new(0));
        let local = Widget::new(1, &drops);
        assert!(Shared::is_empty(&local.shared_from_this()));
        assert!(matches!(local.try_shared_from_this(), Err(BadWeakPtr)));
        assert!(local.weak_from_this().expired());

        // wrapping without the enabled constructor leaves it unbound
        let plain = Shared::new(local);
        assert!(Shared::is_empty(&plain.shared_from_this()));
        assert_eq!(Shared::weak_count(&plain), 0);
    }

    #[test]
    fn test_weak_from_this() {
        let drops = Rc::new(Cell::new(0));
        let w = Shared::new_enabled(Widget::new(5, &drops));
        let weak = w.weak_from_this();
        assert_eq!(weak.use_count(), 1);
        assert_eq!(Shared::weak_count(&w), 2);
        drop(w);
        assert!(weak.expired());
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn test_from_box_enabled() {
        let drops = Rc::new(Cell::new(0));
        let w = Shared::from_box_enabled(Box::new(Widget::new(9, &drops)));
        let again = w.shared_from_this();
        assert!(Shared::root_ptr_eq(&w, &again));
        assert_eq!(Shared::use_count(&w), 2);
        drop((w, again));
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn test_from_raw_enabled() {
        let drops = Rc::new(Cell::new(0));
        let deleted = Rc::new(Cell::new(0));
        let raw = NonNull::from(Box::leak(Box::new(Widget::new(4, &drops))));
        let d = deleted.clone();
        let deleter = move |p: NonNull<Widget>| {
            d.set(d.get() + 1);
            drop(unsafe { Box::from_raw(p.as_ptr()) });
        };
        let w = unsafe { Shared::from_raw_enabled(raw, deleter) };
        assert_eq!(w.shared_from_this().value, 4);
        drop(w);
        assert_eq!((deleted.get(), drops.get()), (1, 1));
    }

    #[test]
    fn test_single_free_with_self_reference() {
        // The object's own weak handle is released while the object is being
        // destroyed; the block must still be freed exactly once.
        let counter: &'static CountingAlloc = Box::leak(Box::new(CountingAlloc::default()));
        let drops = Rc::new(Cell::new(0));
        let w = Shared::new_enabled_in(Widget::new(7, &drops), counter);
        let outside = Shared::downgrade(&w);
        assert_eq!(counter.counts(), (1, 0));
        drop(w);
        assert_eq!(drops.get(), 1);
        assert_eq!(counter.counts(), (1, 0));
        drop(outside);
        assert_eq!(counter.counts(), (1, 1));

        let w = Shared::new_enabled_in(Widget::new(8, &drops), counter);
        drop(w);
        assert_eq!(counter.counts(), (2, 2));
    }

    #[test]
    fn test_clone_is_unbound() {
        let e: EnableSharedFromThis<i32> = EnableSharedFromThis::new();
        e.bind(Shared::downgrade(&Shared::new(1)));
        assert_eq!(std::format!("{:?}", e), "EnableSharedFromThis { bound: true }");
        assert_eq!(std::format!("{:?}", e.clone()), "EnableSharedFromThis { bound: false }");
    }
}
