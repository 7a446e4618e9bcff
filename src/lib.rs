/*!
This crate provides reference-counted pointers modelled on C++'s
[`shared_ptr`](https://en.cppreference.com/w/cpp/memory/shared_ptr) and
[`weak_ptr`](https://en.cppreference.com/w/cpp/memory/weak_ptr), for
single-threaded use.

A [`SharedPtr<T>`] owns a share of an object; a [`WeakPtr<T>`] observes it.
Both point at a type-erased *control block* holding the strong and weak
counts. The object is destroyed when the last `SharedPtr` goes away, and the
block itself once the last handle of either kind is gone.

```rust
    use sharedptr::{make_shared, SharedPtr, WeakPtr};

    struct Widget {
        id: i32,
    }

    let a = make_shared(Widget { id: 42 });
    assert_eq!(SharedPtr::use_count(&a), 1);

    let b = a.clone();
    assert_eq!(SharedPtr::use_count(&a), 2);
    assert_eq!(b.id, 42);
    drop(b);

    let w: WeakPtr<Widget> = SharedPtr::downgrade(&a);
    assert!(!w.expired());
    drop(a);
    assert!(w.expired());
    assert!(SharedPtr::is_empty(&w.lock()));
```

# Two kinds of control block

[`SharedPtr::new`] (and the [`make_shared`]/[`allocate_shared`] factories)
allocate the counts and the object together, in one allocation.

[`SharedPtr::from_box`] and [`SharedPtr::from_raw_in`] take an object that
already exists and put the counts in a separate allocation. The object is
torn down by a [`Deleter`], which by default frees the box:

```
    # use core::{cell::Cell, ptr::NonNull};
    # use sharedptr::SharedPtr;
    let freed = Cell::new(false);
    let raw = NonNull::from(Box::leak(Box::new(17u32)));
    let deleter = |p: NonNull<u32>| {
        freed.set(true);
        drop(unsafe { Box::from_raw(p.as_ptr()) });
    };
    let p = unsafe { SharedPtr::from_raw_with(raw, deleter) };
    assert_eq!(*p, 17);
    drop(p);
    assert!(freed.get());
```

Either way, the block remembers how to destroy the object and how to free
itself, so every handle to it has the same type regardless of how it was
made.

# Views of an object

A handle can be narrowed to any part of its object with
[`SharedPtr::project`]: a field, a slice element, or a trait object. The new
handle shares the control block, so the whole object stays alive as long as
any view of it does.

```
    use sharedptr::{Shared, SharedPtr};

    trait Shape {
        fn area(&self) -> f64;
    }
    struct Square(f64);
    impl Shape for Square {
        fn area(&self) -> f64 {
            self.0 * self.0
        }
    }

    let sq: Shared<Square> = Shared::new(Square(3.0));
    let shape: Shared<dyn Shape> = SharedPtr::project(sq.clone(), |s| s as &dyn Shape);
    assert_eq!(shape.area(), 9.0);
    assert_eq!(Shared::use_count(&sq), 2);
    assert!(Shared::root_ptr_eq(&sq, &shape));

    let arr: Shared<[i32; 3]> = Shared::new([1, 2, 3]);
    let second: Shared<i32> = SharedPtr::project(arr, |a| &a[1]);
    assert_eq!(*second, 2);
```

[`SharedPtr::ptr_eq`] asks whether two handles view the same address;
[`SharedPtr::root_ptr_eq`] asks whether they share a control block. Two
views of different fields of one object differ in the first and agree in
the second.

# Handles to yourself

An object that embeds an [`EnableSharedFromThis`] and implements
[`SharedFromThis`] can produce new owning handles to itself from `&self`,
once it has been wrapped by [`make_shared_from_this`] or one of the
`*_enabled` constructors. See the [`this`] module.

# Allocators

Control blocks are allocated through the [`Allocator`] trait. [`Global`] is
the process heap; [`arena::StackStorage`] is a fixed buffer. A handle whose
block lives in borrowed storage carries that borrow in its lifetime:

```
    use sharedptr::{allocate_shared, arena::StackStorage, SharedPtr};

    let storage = StackStorage::<128>::new();
    let p: SharedPtr<'_, u64> = allocate_shared(&storage, 5);
    assert_eq!(*p + 1, 6);
```

# Lifetimes

[`SharedPtr<'a, T>`][SharedPtr] and [`WeakPtr<'a, T>`][WeakPtr] carry a lifetime bounding
everything the handle keeps alive: the object, its deleter, and the
allocator. Since `project` can turn a `SharedPtr<&'a T>` into a
`SharedPtr<T>`, the lifetime has to live on the handle rather than inside
`T`. [`Shared<T>`] and [`Weak<T>`] are the `'static` aliases.

# Differences from `shared_ptr`

Handles can be empty, as in C++, and [`SharedPtr::get`] returns `None` for
them. Dereferencing an empty handle panics instead of being undefined.

Converting a handle to a base type is spelled `project` (or
[`SharedPtr::cast`] when `&U: From<&T>`), since Rust has no implicit
derived-to-base conversion.

There is no atomic variant: the counts are plain cells, so neither handle is
`Send` or `Sync`.
*/
#![no_std]
#[cfg(test)]
extern crate std;

extern crate alloc;

pub mod allocator;
pub mod arena;
mod block;
pub mod error;
pub mod factory;
pub mod shared;
pub mod this;
pub mod weak;

pub use self::allocator::{Allocator, Global};
pub use self::block::{DefaultDelete, Deleter};
pub use self::error::{AllocError, BadWeakPtr, ConstructError, FromBoxError};
pub use self::factory::{
    allocate_shared, allocate_shared_from_this, make_shared, make_shared_from_this,
    try_allocate_shared_with, try_make_shared_with,
};
pub use self::shared::SharedPtr;
pub use self::this::{EnableSharedFromThis, SharedFromThis};
pub use self::weak::WeakPtr;

/// An owning handle with no borrowed data.
pub type Shared<T> = SharedPtr<'static, T>;
/// A non-owning handle with no borrowed data.
pub type Weak<T> = WeakPtr<'static, T>;
