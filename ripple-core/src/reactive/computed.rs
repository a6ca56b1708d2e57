//! Computed Cell Implementation
//!
//! A Computed cell is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Computed Cells Work
//!
//! 1. Nothing runs at creation. The cell starts `Dirty`.
//!
//! 2. Reading a dirty cell runs the getter inside a fresh reactive context,
//!    caches the result and marks the cell `Clean`.
//!
//! 3. Reading a clean cell returns the cache without touching the getter.
//!
//! 4. When any dependency notifies, a clean cell turns `Dirty` and notifies
//!    its own subscribers. It does not re-derive: a chain of computed cells
//!    invalidates top to bottom immediately but recomputes only when read.
//!
//! Every read also subscribes the active tracking context to the cell's own
//! dependency set, so whoever reads a computed cell hears about its
//! invalidation.

use std::cell::{Cell, RefCell};
use std::fmt::{self, Debug};
use std::rc::Rc;

use super::context::{tracked, untrack};
use super::dep::{unsubscribe_all, Dep, WeakDep};
use super::subscriber::{Subscriber, SubscriberId};
use crate::error::{ReactiveError, Result};
use crate::scope::{self, ScopeOwned};

/// Cache state of a computed cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellState {
    /// The cached value is up-to-date.
    Clean,

    /// A dependency changed (or the cell was never read).
    Dirty,
}

struct ComputedInner<T> {
    id: SubscriberId,
    getter: Box<dyn Fn() -> T>,
    setter: Option<Box<dyn Fn(T)>>,
    value: RefCell<Option<T>>,
    state: Cell<CellState>,
    /// Dependency set of this cell's own output.
    dep: Dep,
    /// Sets this cell joined during its latest evaluation.
    sources: RefCell<Vec<WeakDep>>,
    stopped: Cell<bool>,
}

impl<T> Subscriber for ComputedInner<T> {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn update(&self) {
        if self.state.get() == CellState::Clean {
            self.state.set(CellState::Dirty);
            self.dep.notify();
        }
    }
}

impl<T> ScopeOwned for ComputedInner<T> {
    fn stop(&self) {
        if self.stopped.replace(true) {
            return;
        }
        let sources = self.sources.take();
        unsubscribe_all(&sources, self.id);
    }

    fn is_stopped(&self) -> bool {
        self.stopped.get()
    }
}

/// A lazily evaluated, cached derivation.
///
/// Cloning a `Computed` yields another handle to the same cell.
///
/// # Example
///
/// ```rust
/// use ripple_core::{computed, Ref};
///
/// let count = Ref::new(2);
/// let count_clone = count.clone();
/// let doubled = computed(move || count_clone.get() * 2);
///
/// assert_eq!(doubled.get(), 4);
/// count.set(5);
/// assert_eq!(doubled.get(), 10);
/// ```
pub struct Computed<T> {
    inner: Rc<ComputedInner<T>>,
}

impl<T: Clone + 'static> Computed<T> {
    fn build(getter: Box<dyn Fn() -> T>, setter: Option<Box<dyn Fn(T)>>) -> Self {
        let inner = Rc::new(ComputedInner {
            id: SubscriberId::new(),
            getter,
            setter,
            value: RefCell::new(None),
            state: Cell::new(CellState::Dirty),
            dep: Dep::new(),
            sources: RefCell::new(Vec::new()),
            stopped: Cell::new(false),
        });
        scope::record(inner.clone());
        Self { inner }
    }

    /// Create a read-only computed cell.
    pub fn new<F>(getter: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Self::build(Box::new(getter), None)
    }

    /// Create a computed cell whose writes are delegated to `setter`.
    pub fn writable<G, S>(getter: G, setter: S) -> Self
    where
        G: Fn() -> T + 'static,
        S: Fn(T) + 'static,
    {
        Self::build(Box::new(getter), Some(Box::new(setter)))
    }

    /// Get the current value, recomputing if necessary.
    pub fn get(&self) -> T {
        let value = self.get_untracked();
        self.inner.dep.depend();
        value
    }

    /// Get the current value without subscribing the active context.
    pub fn get_untracked(&self) -> T {
        if self.inner.state.get() == CellState::Clean {
            if let Some(value) = self.inner.value.borrow().as_ref() {
                return value.clone();
            }
        }
        self.evaluate()
    }

    fn evaluate(&self) -> T {
        let inner = &self.inner;

        if inner.stopped.get() {
            // A stopped cell no longer tracks; it derives once and freezes.
            let value = untrack(|| (inner.getter)());
            *inner.value.borrow_mut() = Some(value.clone());
            inner.state.set(CellState::Clean);
            return value;
        }

        let stale = inner.sources.take();
        unsubscribe_all(&stale, inner.id);

        let subscriber: Rc<dyn Subscriber> = inner.clone();
        let value = tracked(
            subscriber,
            || (inner.getter)(),
            |deps| *inner.sources.borrow_mut() = deps.iter().map(Dep::downgrade).collect(),
        );

        *inner.value.borrow_mut() = Some(value.clone());
        inner.state.set(CellState::Clean);
        value
    }

    /// Write through the setter.
    ///
    /// A cell without a setter ignores the write, logs a warning and returns
    /// [`ReactiveError::ReadOnly`].
    pub fn set(&self, value: T) -> Result<()> {
        match &self.inner.setter {
            Some(setter) => {
                setter(value);
                Ok(())
            }
            None => {
                let err = ReactiveError::ReadOnly;
                tracing::warn!(computed = %self.inner.id, "{err}");
                Err(err)
            }
        }
    }

    /// Whether the cell has a setter.
    pub fn is_writable(&self) -> bool {
        self.inner.setter.is_some()
    }

    /// Get the current cache state.
    pub fn state(&self) -> CellState {
        self.inner.state.get()
    }

    /// Force the next read to recompute.
    pub fn mark_dirty(&self) {
        self.inner.state.set(CellState::Dirty);
    }

    /// Check if the cell has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.value.borrow().is_some()
    }

    /// Get the number of subscribers to this cell's output.
    pub fn dependent_count(&self) -> usize {
        self.inner.dep.subscriber_count()
    }

    /// Stop tracking dependencies. The cell keeps its last value.
    pub fn stop(&self) {
        ScopeOwned::stop(&*self.inner);
    }

    /// The cell's own dependency set.
    pub fn dep(&self) -> &Dep {
        &self.inner.dep
    }
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Debug> Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.inner.id)
            .field("state", &self.inner.state.get())
            .field("has_value", &self.inner.value.borrow().is_some())
            .field("dependent_count", &self.inner.dep.subscriber_count())
            .finish()
    }
}

/// Create a read-only computed cell.
pub fn computed<T, F>(getter: F) -> Computed<T>
where
    T: Clone + 'static,
    F: Fn() -> T + 'static,
{
    Computed::new(getter)
}

/// Create a computed cell with a setter.
pub fn writable_computed<T, G, S>(getter: G, setter: S) -> Computed<T>
where
    T: Clone + 'static,
    G: Fn() -> T + 'static,
    S: Fn(T) + 'static,
{
    Computed::writable(getter, setter)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
