//! Ref Implementation
//!
//! A Ref is the fundamental reactive primitive. It holds a single boxed value
//! and the dependency set of the computations that read it.
//!
//! # How Refs Work
//!
//! 1. When a ref is read within a reactive context (computed cell or effect),
//!    the ref registers that context as a subscriber.
//!
//! 2. When a ref is assigned a value that differs from the current one, all
//!    subscribers are notified. Assigning an equal value is silent.
//!
//! 3. Force mode skips the comparison: every assignment notifies. In-place
//!    mutation through [`Ref::update`] always notifies, since the ref cannot
//!    tell what the closure changed.
//!
//! Equality defaults to `PartialEq` and can be replaced per ref, e.g. to
//! compare by identity instead of structure.

use std::cell::{Cell, RefCell};
use std::fmt::{self, Debug};
use std::rc::Rc;

use super::dep::Dep;

type EqualityFn<T> = Box<dyn Fn(&T, &T) -> bool>;

struct RefInner<T> {
    value: RefCell<T>,
    dep: Dep,
    equals: EqualityFn<T>,
    force: Cell<bool>,
}

/// A reactive box holding a value of type T.
///
/// Cloning a `Ref` yields another handle to the same box.
///
/// # Example
///
/// ```rust
/// use ripple_core::Ref;
///
/// let count = Ref::new(0);
/// count.set(5);
/// assert_eq!(count.get(), 5);
/// ```
pub struct Ref<T> {
    inner: Rc<RefInner<T>>,
}

impl<T: 'static> Ref<T> {
    /// Create a new ref compared with `PartialEq`.
    pub fn new(value: T) -> Self
    where
        T: PartialEq,
    {
        Self::with_equality(value, |a, b| a == b)
    }

    /// Create a new ref with a custom change test.
    ///
    /// `equals(old, new)` returning `true` suppresses the notification.
    pub fn with_equality<F>(value: T, equals: F) -> Self
    where
        F: Fn(&T, &T) -> bool + 'static,
    {
        Self {
            inner: Rc::new(RefInner {
                value: RefCell::new(value),
                dep: Dep::new(),
                equals: Box::new(equals),
                force: Cell::new(false),
            }),
        }
    }

    /// Get the current value.
    ///
    /// If called within a reactive context, this also registers the
    /// current computation as a subscriber.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.inner.dep.depend();
        self.inner.value.borrow().clone()
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        self.inner.value.borrow().clone()
    }

    /// Borrow the current value, tracking the read.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.inner.dep.depend();
        f(&self.inner.value.borrow())
    }

    /// Assign a new value.
    ///
    /// Subscribers are notified if the value changed or force mode is on.
    /// Returns whether a notification was sent.
    pub fn set(&self, value: T) -> bool {
        let notify = {
            let mut current = self.inner.value.borrow_mut();
            let changed = !(self.inner.equals)(&current, &value);
            if changed || self.inner.force.get() {
                *current = value;
                true
            } else {
                false
            }
        };

        if notify {
            self.inner.dep.notify();
        }
        notify
    }

    /// Mutate the value in place and notify unconditionally.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        f(&mut self.inner.value.borrow_mut());
        self.inner.dep.notify();
    }

    /// Turn force mode on or off.
    pub fn set_force(&self, force: bool) {
        self.inner.force.set(force);
    }

    /// Check whether force mode is on.
    pub fn is_forced(&self) -> bool {
        self.inner.force.get()
    }

    /// Notify subscribers without changing the value.
    pub fn trigger(&self) {
        self.inner.dep.notify();
    }

    /// The ref's dependency set.
    pub fn dep(&self) -> &Dep {
        &self.inner.dep
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.dep.subscriber_count()
    }

    /// Check whether two handles refer to the same ref.
    pub fn ptr_eq(&self, other: &Ref<T>) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Clone for Ref<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Debug> Debug for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Ref");
        debug.field("dep", &self.inner.dep.id());
        match self.inner.value.try_borrow() {
            Ok(value) => debug.field("value", &*value),
            Err(_) => debug.field("value", &"<borrowed>"),
        };
        debug.finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
