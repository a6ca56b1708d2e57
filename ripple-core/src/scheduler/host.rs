//! Host Collaborators
//!
//! A host is whatever drives the update cycle around the reactive core: it
//! emits "about to update" and "did update" signals, offers a deferred
//! callback primitive (the next tick), and can be destroyed.
//!
//! [`LocalHost`] is a manual, in-process host. Ticks queue up until
//! [`LocalHost::tick`] is called, which makes flush timing fully
//! deterministic.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::mem;
use std::rc::Rc;

/// A deferred callback handed to [`Host::next_tick`].
pub type TickCallback = Box<dyn FnOnce()>;

/// A lifecycle listener.
pub type Hook = Rc<dyn Fn()>;

/// The capabilities the reactive core needs from its host.
pub trait Host {
    /// Run `callback` on the host's next tick.
    fn next_tick(&self, callback: TickCallback);

    /// Listen for the "about to update" signal.
    fn on_before_update(&self, hook: Hook);

    /// Listen for the "did update" signal.
    fn on_updated(&self, hook: Hook);

    /// Listen for the host's destruction.
    fn on_destroyed(&self, hook: Hook);

    /// Destroy the host. Idempotent.
    fn destroy(&self);

    fn is_destroyed(&self) -> bool;
}

/// Creates the host instance backing a new effect scope.
pub trait HostFactory {
    fn create(&self) -> Rc<dyn Host>;
}

impl<F> HostFactory for F
where
    F: Fn() -> Rc<dyn Host>,
{
    fn create(&self) -> Rc<dyn Host> {
        self()
    }
}

/// Lifecycle listener lists shared by the bundled hosts.
#[derive(Default)]
pub struct Lifecycle {
    before_update: RefCell<Vec<Hook>>,
    updated: RefCell<Vec<Hook>>,
    destroyed_hooks: RefCell<Vec<Hook>>,
    destroyed: Rc<Cell<bool>>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_before_update(&self, hook: Hook) {
        if !self.is_destroyed() {
            self.before_update.borrow_mut().push(hook);
        }
    }

    pub fn on_updated(&self, hook: Hook) {
        if !self.is_destroyed() {
            self.updated.borrow_mut().push(hook);
        }
    }

    pub fn on_destroyed(&self, hook: Hook) {
        if !self.is_destroyed() {
            self.destroyed_hooks.borrow_mut().push(hook);
        }
    }

    /// Emit "about to update" followed by "did update".
    pub fn update(&self) {
        if self.is_destroyed() {
            return;
        }
        emit(&self.before_update);
        emit(&self.updated);
    }

    /// Mark destroyed, run the destruction hooks once and drop every
    /// listener.
    pub fn destroy(&self) {
        if self.destroyed.replace(true) {
            return;
        }
        self.before_update.borrow_mut().clear();
        self.updated.borrow_mut().clear();
        let hooks = self.destroyed_hooks.take();
        for hook in hooks {
            hook();
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }

    /// A flag that outlives borrows of the lifecycle, for deferred work.
    pub fn destroyed_flag(&self) -> Rc<Cell<bool>> {
        Rc::clone(&self.destroyed)
    }
}

/// Snapshot the listener list so hooks may register more hooks.
fn emit(hooks: &RefCell<Vec<Hook>>) {
    let snapshot: Vec<Hook> = hooks.borrow().clone();
    for hook in snapshot {
        hook();
    }
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("before_update", &self.before_update.borrow().len())
            .field("updated", &self.updated.borrow().len())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

/// Returns callbacks a tick did not reach to the front of the queue.
struct Unrun<'a> {
    ticks: &'a RefCell<VecDeque<TickCallback>>,
    rest: VecDeque<TickCallback>,
}

impl Drop for Unrun<'_> {
    fn drop(&mut self) {
        if self.rest.is_empty() {
            return;
        }
        let mut ticks = self.ticks.borrow_mut();
        let later = mem::replace(&mut *ticks, mem::take(&mut self.rest));
        ticks.extend(later);
    }
}

/// A host driven by hand.
///
/// # Example
///
/// ```rust
/// use ripple_core::{EffectScope, LocalHost, Ref, watch, WatchOptions};
///
/// let host = LocalHost::new();
/// let scope = EffectScope::with_host(host.clone(), false);
/// let count = Ref::new(ripple_core::Value::from(0));
///
/// let source = count.clone();
/// scope.run(|| watch(source, |_, _, _| {}, WatchOptions::default()));
///
/// count.set(1.into());
/// assert_eq!(host.pending_ticks(), 1);
/// host.tick();
/// assert_eq!(host.pending_ticks(), 0);
/// ```
#[derive(Default)]
pub struct LocalHost {
    lifecycle: Lifecycle,
    ticks: RefCell<VecDeque<TickCallback>>,
}

impl LocalHost {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Run the callbacks queued so far. Callbacks queued while these run
    /// wait for the next tick. Returns how many ran.
    ///
    /// If a callback panics, the callbacks after it stay queued for the next
    /// tick.
    pub fn tick(&self) -> usize {
        let batch = self.ticks.take();
        let count = batch.len();
        let mut pending = Unrun {
            ticks: &self.ticks,
            rest: batch,
        };
        while let Some(callback) = pending.rest.pop_front() {
            callback();
        }
        count
    }

    /// Tick until nothing is queued. Returns the number of ticks taken.
    pub fn run_until_idle(&self) -> usize {
        let mut ticks = 0;
        while self.pending_ticks() > 0 {
            self.tick();
            ticks += 1;
        }
        ticks
    }

    /// Emit one update cycle: "about to update", then "did update".
    pub fn update(&self) {
        self.lifecycle.update();
    }

    pub fn pending_ticks(&self) -> usize {
        self.ticks.borrow().len()
    }
}

impl Host for LocalHost {
    fn next_tick(&self, callback: TickCallback) {
        if self.lifecycle.is_destroyed() {
            tracing::trace!("next tick requested on a destroyed host");
            return;
        }
        self.ticks.borrow_mut().push_back(callback);
    }

    fn on_before_update(&self, hook: Hook) {
        self.lifecycle.on_before_update(hook);
    }

    fn on_updated(&self, hook: Hook) {
        self.lifecycle.on_updated(hook);
    }

    fn on_destroyed(&self, hook: Hook) {
        self.lifecycle.on_destroyed(hook);
    }

    fn destroy(&self) {
        self.ticks.borrow_mut().clear();
        self.lifecycle.destroy();
    }

    fn is_destroyed(&self) -> bool {
        self.lifecycle.is_destroyed()
    }
}

impl fmt::Debug for LocalHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalHost")
            .field("lifecycle", &self.lifecycle)
            .field("pending_ticks", &self.pending_ticks())
            .finish()
    }
}
