//! Effect Scopes
//!
//! An effect scope is a disposable node in a tree of teardown contexts. Every
//! watcher and computed cell created while a scope is active belongs to it,
//! and so does every scope created inside it unless detached. Stopping a
//! scope tears all of that down in one call.
//!
//! # Stopping
//!
//! [`EffectScope::stop`] runs at most once and, in order:
//!
//! 1. destroys the scope's host instance, if it has one;
//! 2. stops every watcher and computed cell the scope owns;
//! 3. stops every child scope, depth-first;
//! 4. runs the registered cleanups in registration order, swallowing and
//!    logging panics;
//! 5. marks the scope stopped and detaches it from its parent.
//!
//! The active scope is tracked on a thread-local stack. [`EffectScope::run`]
//! and [`EffectScope::on`] push onto it and pop through a guard, so the
//! stack is restored even if the scoped code panics.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::error::{run_guarded, ReactiveError, Result};
use crate::runtime::Runtime;
use crate::scheduler::{Host, HostHandle};

/// Something an effect scope stops when it is stopped.
pub(crate) trait ScopeOwned {
    fn stop(&self);

    /// Stopped through its own handle, before the scope got to it.
    fn is_stopped(&self) -> bool;
}

/// Smallest `owned` length at which a scope sweeps out stopped items.
const PRUNE_FLOOR: usize = 16;

type Cleanup = Box<dyn FnOnce()>;

thread_local! {
    static SCOPE_STACK: RefCell<Vec<Rc<ScopeInner>>> = const { RefCell::new(Vec::new()) };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeState {
    Active,
    Stopping,
    Stopped,
}

struct ScopeInner {
    state: Cell<ScopeState>,
    host: Option<HostHandle>,
    owned: RefCell<Vec<Rc<dyn ScopeOwned>>>,
    /// `owned` length that triggers the next sweep.
    prune_at: Cell<usize>,
    cleanups: RefCell<Vec<Cleanup>>,
    children: RefCell<Vec<Rc<ScopeInner>>>,
    parent: Weak<ScopeInner>,
}

impl ScopeInner {
    fn is_active(&self) -> bool {
        self.state.get() == ScopeState::Active
    }

    /// Take ownership of `item`, first sweeping out items that were stopped
    /// through their own handles once the list has doubled since the last
    /// sweep.
    fn adopt(&self, item: Rc<dyn ScopeOwned>) {
        let mut owned = self.owned.borrow_mut();
        if owned.len() >= self.prune_at.get() {
            owned.retain(|existing| !existing.is_stopped());
            self.prune_at.set((owned.len() * 2).max(PRUNE_FLOOR));
        }
        owned.push(item);
    }

    fn stop(self: &Rc<Self>) {
        if !self.is_active() {
            return;
        }
        self.state.set(ScopeState::Stopping);
        tracing::debug!(
            owned = self.owned.borrow().len(),
            children = self.children.borrow().len(),
            cleanups = self.cleanups.borrow().len(),
            "stopping effect scope"
        );

        if let Some(host) = &self.host {
            host.host().destroy();
        }

        let owned = self.owned.take();
        for item in owned {
            item.stop();
        }

        let children = self.children.take();
        for child in children {
            child.stop();
        }

        let cleanups = self.cleanups.take();
        for cleanup in cleanups {
            run_guarded("effect scope", cleanup);
        }

        self.state.set(ScopeState::Stopped);

        if let Some(parent) = self.parent.upgrade() {
            if let Ok(mut siblings) = parent.children.try_borrow_mut() {
                siblings.retain(|child| !Rc::ptr_eq(child, self));
            }
        }
    }
}

/// Pops the scope it pushed when dropped.
#[must_use = "the scope is only active while the guard is alive"]
pub struct ScopeGuard {
    scope: Rc<ScopeInner>,
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        SCOPE_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();
            debug_assert!(
                popped.is_some_and(|top| Rc::ptr_eq(&top, &self.scope)),
                "effect scope stack mismatch"
            );
        });
    }
}

/// A disposable group of watchers, computed cells, child scopes and cleanup
/// callbacks.
///
/// Cloning an `EffectScope` yields another handle to the same scope.
///
/// # Example
///
/// ```rust
/// use ripple_core::{effect_scope, on_scope_dispose};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let disposed = Rc::new(Cell::new(false));
/// let scope = effect_scope(false);
///
/// let flag = disposed.clone();
/// scope.run(|| on_scope_dispose(move || flag.set(true)));
///
/// scope.stop();
/// assert!(disposed.get());
/// assert!(scope.run(|| 1).is_none());
/// ```
#[derive(Clone)]
pub struct EffectScope {
    inner: Rc<ScopeInner>,
}

impl EffectScope {
    /// Create a scope owned by the active scope, if any.
    pub fn new() -> Self {
        Self::create(Runtime::create_host(), false)
    }

    /// Create a scope with no parent.
    pub fn detached() -> Self {
        Self::create(Runtime::create_host(), true)
    }

    /// Create a scope backed by `host`, bypassing the installed factory.
    pub fn with_host(host: Rc<dyn Host>, detached: bool) -> Self {
        Self::create(Some(host), detached)
    }

    fn create(host: Option<Rc<dyn Host>>, detached: bool) -> Self {
        let parent = if detached {
            None
        } else {
            current_inner()
        };

        let inner = Rc::new(ScopeInner {
            state: Cell::new(ScopeState::Active),
            host: host.map(HostHandle::new),
            owned: RefCell::new(Vec::new()),
            prune_at: Cell::new(PRUNE_FLOOR),
            cleanups: RefCell::new(Vec::new()),
            children: RefCell::new(Vec::new()),
            parent: parent.as_ref().map(Rc::downgrade).unwrap_or_default(),
        });

        if let Some(host) = &inner.host {
            let weak = Rc::downgrade(&inner);
            host.host().on_destroyed(Rc::new(move || {
                if let Some(scope) = weak.upgrade() {
                    tracing::debug!("host destroyed, stopping its scope");
                    scope.stop();
                }
            }));
        }

        if let Some(parent) = parent {
            parent.children.borrow_mut().push(Rc::clone(&inner));
        }

        tracing::trace!(detached, hosted = inner.host.is_some(), "effect scope created");
        Self { inner }
    }

    /// The innermost active scope.
    pub fn current() -> Option<Self> {
        current_inner().map(|inner| Self { inner })
    }

    /// Run `f` with this scope active and return its result.
    ///
    /// On a stopped scope, logs a warning and returns `None` without
    /// calling `f`.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        if !self.inner.is_active() {
            tracing::warn!("{}", ReactiveError::InactiveScope);
            return None;
        }
        let _guard = self.on();
        Some(f())
    }

    /// Make this scope active until the returned guard is dropped.
    pub fn on(&self) -> ScopeGuard {
        SCOPE_STACK.with(|stack| stack.borrow_mut().push(Rc::clone(&self.inner)));
        ScopeGuard {
            scope: Rc::clone(&self.inner),
        }
    }

    /// Stop the scope. Idempotent.
    pub fn stop(&self) {
        self.inner.stop();
    }

    /// Register a callback to run when the scope stops.
    pub fn on_dispose(&self, cleanup: impl FnOnce() + 'static) -> Result<()> {
        if !self.inner.is_active() {
            let err = ReactiveError::InactiveScope;
            tracing::warn!("on_dispose: {err}");
            return Err(err);
        }
        self.inner.cleanups.borrow_mut().push(Box::new(cleanup));
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.inner.is_active()
    }

    /// Whether this scope was created without a parent.
    pub fn is_detached(&self) -> bool {
        self.inner.parent.upgrade().is_none()
    }

    /// This scope's own host, if it has one.
    pub fn host(&self) -> Option<HostHandle> {
        self.inner.host.clone()
    }

    /// This scope's host, or the nearest ancestor's.
    pub fn nearest_host(&self) -> Option<HostHandle> {
        let mut scope = Some(Rc::clone(&self.inner));
        while let Some(current) = scope {
            if let Some(host) = &current.host {
                return Some(host.clone());
            }
            scope = current.parent.upgrade();
        }
        None
    }

    pub fn child_count(&self) -> usize {
        self.inner.children.borrow().len()
    }

    /// Number of live watchers and computed cells owned by this scope.
    pub fn owned_count(&self) -> usize {
        self.inner
            .owned
            .borrow()
            .iter()
            .filter(|item| !item.is_stopped())
            .count()
    }

    pub fn ptr_eq(&self, other: &EffectScope) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for EffectScope {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EffectScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectScope")
            .field("state", &self.inner.state.get())
            .field("host", &self.inner.host)
            .field("owned", &self.owned_count())
            .field("children", &self.child_count())
            .field("cleanups", &self.inner.cleanups.borrow().len())
            .finish()
    }
}

fn current_inner() -> Option<Rc<ScopeInner>> {
    SCOPE_STACK.with(|stack| stack.borrow().last().cloned())
}

/// Hand `item` to the active scope.
///
/// An item created inside a scope that is already stopping is stopped
/// right away.
pub(crate) fn record(item: Rc<dyn ScopeOwned>) {
    let Some(scope) = current_inner() else {
        return;
    };
    if scope.is_active() {
        scope.adopt(item);
    } else {
        tracing::debug!("owner created in an inactive scope; stopping it");
        item.stop();
    }
}

/// Create an effect scope. A non-detached scope is owned by the active
/// scope, if any.
pub fn effect_scope(detached: bool) -> EffectScope {
    if detached {
        EffectScope::detached()
    } else {
        EffectScope::new()
    }
}

/// Register a callback on the active scope.
///
/// Outside any scope, logs a warning and returns
/// [`ReactiveError::InactiveScope`].
pub fn on_scope_dispose(cleanup: impl FnOnce() + 'static) -> Result<()> {
    match EffectScope::current() {
        Some(scope) => scope.on_dispose(cleanup),
        None => {
            tracing::warn!("on_scope_dispose called with no active effect scope");
            Err(ReactiveError::InactiveScope)
        }
    }
}

/// The innermost active scope.
pub fn get_current_scope() -> Option<EffectScope> {
    EffectScope::current()
}
