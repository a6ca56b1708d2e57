//! Effect Implementation
//!
//! An Effect is a tracked computation that re-runs (or asks its scheduler to
//! re-run it) whenever one of its dependencies changes. It is the engine
//! underneath every watcher.
//!
//! # How Effects Work
//!
//! 1. Running an effect executes its function inside a reactive context, so
//!    every ref, container property or computed cell it reads subscribes it.
//!
//! 2. Before each run, the effect leaves every dependency set it joined on
//!    the previous run. Dependencies are therefore exactly those touched by
//!    the most recent run, never an accumulation.
//!
//! 3. When a dependency notifies, the effect hands control to its scheduler
//!    if it has one, or re-runs synchronously if not.
//!
//! 4. A run requested while the effect is already running is dropped.
//!
//! A run that panics keeps the dependencies it read before the panic, and
//! the panic propagates to whoever triggered the run.
//!
//! # Teardown
//!
//! [`Effect::stop`] unsubscribes from every dependency and then runs the
//! effect's stop hooks, in registration order, exactly once.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use super::context::tracked;
use super::dep::{unsubscribe_all, Dep, WeakDep};
use super::subscriber::{Subscriber, SubscriberId};
use super::value::Value;

/// Called instead of an immediate re-run when a dependency changes.
pub type Scheduler = Rc<dyn Fn()>;

type EffectFn = Box<dyn FnMut() -> Value>;
type StopHook = Box<dyn FnOnce()>;

pub(crate) struct EffectInner {
    id: SubscriberId,
    func: RefCell<EffectFn>,
    scheduler: RefCell<Option<Scheduler>>,
    dependencies: RefCell<Vec<WeakDep>>,
    active: Cell<bool>,
    running: Cell<bool>,
    run_count: Cell<usize>,
    on_stop: RefCell<Vec<StopHook>>,
    self_weak: Weak<EffectInner>,
}

impl Subscriber for EffectInner {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn update(&self) {
        if !self.active.get() {
            return;
        }

        let scheduler = self.scheduler.borrow().clone();
        match scheduler {
            Some(scheduler) => scheduler(),
            None => {
                if let Some(inner) = self.self_weak.upgrade() {
                    Effect { inner }.run();
                }
            }
        }
    }
}

/// Clears the running flag on every exit path.
struct RunningGuard<'a>(&'a Cell<bool>);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// A tracked computation that re-runs when its dependencies change.
///
/// Cloning an `Effect` yields another handle to the same computation.
#[derive(Clone)]
pub struct Effect {
    inner: Rc<EffectInner>,
}

impl Effect {
    /// Create a new effect and run it immediately to collect its
    /// dependencies.
    pub fn new<F>(func: F) -> Self
    where
        F: FnMut() -> Value + 'static,
    {
        let effect = Self::new_lazy(func);
        effect.run();
        effect
    }

    /// Create a new effect without running it.
    pub fn new_lazy<F>(func: F) -> Self
    where
        F: FnMut() -> Value + 'static,
    {
        let inner = Rc::new_cyclic(|self_weak| EffectInner {
            id: SubscriberId::new(),
            func: RefCell::new(Box::new(func)),
            scheduler: RefCell::new(None),
            dependencies: RefCell::new(Vec::new()),
            active: Cell::new(true),
            running: Cell::new(false),
            run_count: Cell::new(0),
            on_stop: RefCell::new(Vec::new()),
            self_weak: self_weak.clone(),
        });
        Self { inner }
    }

    /// Get the effect's subscriber ID.
    pub fn id(&self) -> SubscriberId {
        self.inner.id
    }

    /// Route change notifications through `scheduler` instead of re-running
    /// synchronously.
    pub fn set_scheduler(&self, scheduler: Scheduler) {
        *self.inner.scheduler.borrow_mut() = Some(scheduler);
    }

    /// Run the effect function, re-collecting dependencies.
    ///
    /// Returns `None` without running if the effect was stopped or is
    /// already running.
    pub fn run(&self) -> Option<Value> {
        let inner = &self.inner;
        if !inner.active.get() {
            return None;
        }
        if inner.running.get() {
            tracing::trace!(effect = %inner.id, "re-entrant run dropped");
            return None;
        }

        inner.running.set(true);
        let _running = RunningGuard(&inner.running);

        let stale = inner.dependencies.take();
        unsubscribe_all(&stale, inner.id);

        let subscriber: Rc<dyn Subscriber> = inner.clone();
        let value = tracked(
            subscriber,
            || {
                let mut func = inner.func.borrow_mut();
                (&mut **func)()
            },
            // Also reached by a panicking run, so `stop` can still find
            // what it subscribed to.
            |deps| {
                let collected: Vec<WeakDep> = deps.iter().map(Dep::downgrade).collect();
                if inner.active.get() {
                    *inner.dependencies.borrow_mut() = collected;
                } else {
                    // Stopped from inside its own run.
                    unsubscribe_all(&collected, inner.id);
                }
            },
        );
        inner.run_count.set(inner.run_count.get() + 1);

        Some(value)
    }

    /// Register a hook to run when the effect is stopped.
    pub fn on_stop<F: FnOnce() + 'static>(&self, hook: F) {
        if self.inner.active.get() {
            self.inner.on_stop.borrow_mut().push(Box::new(hook));
        } else {
            hook();
        }
    }

    /// Stop the effect. Idempotent.
    ///
    /// After stopping, the effect will not run again.
    pub fn stop(&self) {
        if !self.inner.active.replace(false) {
            return;
        }

        let deps = self.inner.dependencies.take();
        unsubscribe_all(&deps, self.inner.id);
        // The scheduler usually holds a handle back to this effect.
        self.inner.scheduler.take();

        let hooks = self.inner.on_stop.take();
        for hook in hooks {
            hook();
        }
        tracing::trace!(effect = %self.inner.id, "effect stopped");
    }

    /// Check if the effect is still active.
    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    /// Check if the effect is currently running.
    pub fn is_running(&self) -> bool {
        self.inner.running.get()
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.get()
    }

    /// Get the number of live dependencies from the latest run.
    pub fn dependency_count(&self) -> usize {
        self.inner
            .dependencies
            .borrow()
            .iter()
            .filter(|dep| dep.upgrade().is_some())
            .count()
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("active", &self.is_active())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
