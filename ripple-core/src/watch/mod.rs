//! Watch Engine
//!
//! Watchers connect reactive state to side effects. Both shapes share one
//! core: an [`Effect`] whose scheduler comes from the flush scheduler of the
//! nearest host.
//!
//! # Effect Watchers
//!
//! [`watch_effect`] runs its function right away, collecting dependencies,
//! and again whenever a dependency from its latest run changes.
//!
//! # Source Watchers
//!
//! [`watch`] evaluates a [`WatchSource`] and calls back with the new value,
//! the previous value and an [`OnCleanup`] registrar. The callback fires
//! when the value changed (identity for objects and refs), always when
//! `deep` is set, and for multi-sources when any slot changed.
//!
//! # Cleanup
//!
//! A cleanup registered through [`OnCleanup`] runs before the next
//! invocation and when the watcher stops, exactly once each. Panics inside
//! a cleanup are caught and logged.

mod options;
mod source;
mod traverse;

pub use options::WatchOptions;
pub use source::{Getter, WatchSource};

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::error::run_guarded;
use crate::reactive::{untrack, Effect, Object, Value};
use crate::runtime::Runtime;
use crate::scheduler::{create_scheduler, FlushMode, Job};
use crate::scope::{self, ScopeOwned};
use traverse::traverse;

type Cleanup = Box<dyn FnOnce()>;

/// Holds the cleanup registered by the latest invocation.
struct CleanupSlot {
    context: &'static str,
    cleanup: RefCell<Option<Cleanup>>,
    stopped: Cell<bool>,
}

impl CleanupSlot {
    fn new(context: &'static str) -> Rc<Self> {
        Rc::new(Self {
            context,
            cleanup: RefCell::new(None),
            stopped: Cell::new(false),
        })
    }

    fn run(&self) {
        let cleanup = self.cleanup.borrow_mut().take();
        if let Some(cleanup) = cleanup {
            untrack(|| run_guarded(self.context, cleanup));
        }
    }

    fn stop(&self) {
        self.stopped.set(true);
        self.run();
    }
}

/// Registers the cleanup for the current invocation.
///
/// Registering again replaces the previous cleanup. On a stopped watcher the
/// cleanup runs immediately.
#[derive(Clone)]
pub struct OnCleanup {
    slot: Rc<CleanupSlot>,
}

impl OnCleanup {
    pub fn register(&self, cleanup: impl FnOnce() + 'static) {
        if self.slot.stopped.get() {
            untrack(|| run_guarded(self.slot.context, cleanup));
            return;
        }
        *self.slot.cleanup.borrow_mut() = Some(Box::new(cleanup));
    }
}

impl fmt::Debug for OnCleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnCleanup")
            .field("context", &self.slot.context)
            .field("pending", &self.slot.cleanup.borrow().is_some())
            .finish()
    }
}

/// Stops a watcher.
///
/// Dropping the handle does not stop the watcher; it lives until stopped
/// here or by its owning scope.
#[derive(Clone)]
pub struct StopHandle {
    effect: Effect,
}

impl StopHandle {
    /// Tear down the subscription and run the latest cleanup. Idempotent.
    pub fn stop(&self) {
        self.effect.stop();
    }

    pub fn is_stopped(&self) -> bool {
        !self.effect.is_active()
    }

    /// The effect driving the watcher.
    pub fn effect(&self) -> &Effect {
        &self.effect
    }
}

impl fmt::Debug for StopHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StopHandle")
            .field("effect", &self.effect.id())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

impl ScopeOwned for Effect {
    fn stop(&self) {
        Effect::stop(self);
    }

    fn is_stopped(&self) -> bool {
        !self.is_active()
    }
}

/// Wire `effect` to the flush scheduler, hand it to the active scope and
/// return its stop handle.
fn install(effect: Effect, slot: Rc<CleanupSlot>, mode: FlushMode, job: Job) -> StopHandle {
    let scheduler = create_scheduler(Runtime::current_host(), mode, job);
    effect.set_scheduler(scheduler);
    effect.on_stop(move || slot.stop());
    scope::record(Rc::new(effect.clone()));
    StopHandle { effect }
}

/// Run `f` now and whenever the reactive state it read changes.
///
/// # Example
///
/// ```rust
/// use ripple_core::{watch_effect, Ref, WatchOptions};
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let count = Ref::new(0);
/// let log = Rc::new(RefCell::new(Vec::new()));
///
/// let (source, sink) = (count.clone(), log.clone());
/// let handle = watch_effect(move |_| sink.borrow_mut().push(source.get()), WatchOptions::default());
///
/// count.set(1);
/// assert_eq!(*log.borrow(), vec![0, 1]);
/// handle.stop();
/// ```
pub fn watch_effect<F>(mut f: F, options: WatchOptions) -> StopHandle
where
    F: FnMut(&OnCleanup) + 'static,
{
    let slot = CleanupSlot::new("watch_effect");
    let on_cleanup = OnCleanup { slot: slot.clone() };

    let effect = {
        let slot = slot.clone();
        Effect::new_lazy(move || {
            slot.run();
            f(&on_cleanup);
            Value::Undefined
        })
    };

    let job: Job = {
        let effect = effect.clone();
        Rc::new(move || {
            effect.run();
        })
    };

    let handle = install(effect.clone(), slot, options.flush, job);
    effect.run();
    handle
}

/// [`watch_effect`] flushed after host updates.
pub fn watch_post_effect<F>(f: F) -> StopHandle
where
    F: FnMut(&OnCleanup) + 'static,
{
    watch_effect(f, WatchOptions::default().flush(FlushMode::Post))
}

/// [`watch_effect`] run inline on every change.
pub fn watch_sync_effect<F>(f: F) -> StopHandle
where
    F: FnMut(&OnCleanup) + 'static,
{
    watch_effect(f, WatchOptions::default().flush(FlushMode::Sync))
}

type Callback = Box<dyn FnMut(&Value, &Value, &OnCleanup)>;

struct SourceWatcher {
    effect: Effect,
    callback: RefCell<Callback>,
    old_value: RefCell<Value>,
    on_cleanup: OnCleanup,
    multi: bool,
    deep: bool,
}

impl SourceWatcher {
    /// Re-evaluate and call back if the value changed.
    fn job(&self) {
        if !self.effect.is_active() {
            return;
        }
        let Some(new_value) = self.effect.run() else {
            return;
        };
        // Stored first: a re-entrant run from the callback must not be
        // overwritten by this one.
        let old_value = self.old_value.replace(new_value.clone());
        if self.deep || self.changed(&new_value, &old_value) {
            self.invoke(&new_value, &old_value);
        }
    }

    fn changed(&self, new_value: &Value, old_value: &Value) -> bool {
        if !self.multi {
            return new_value != old_value;
        }
        match (new_value.to_vec(), old_value.to_vec()) {
            (Some(new_slots), Some(old_slots)) => new_slots != old_slots,
            _ => true,
        }
    }

    fn invoke(&self, new_value: &Value, old_value: &Value) {
        let Ok(mut callback) = self.callback.try_borrow_mut() else {
            tracing::trace!(effect = %self.effect.id(), "re-entrant watch callback dropped");
            return;
        };
        self.on_cleanup.slot.run();
        untrack(|| callback(new_value, old_value, &self.on_cleanup));
    }
}

/// Call `callback` whenever `source` changes.
///
/// With `immediate`, the callback also runs once at registration, with an
/// `Undefined` previous value (an empty array for multi-sources).
///
/// # Example
///
/// ```rust
/// use ripple_core::{watch, Ref, Value, WatchOptions};
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let count = Ref::new(Value::from(0));
/// let calls = Rc::new(RefCell::new(Vec::new()));
///
/// let sink = calls.clone();
/// watch(
///     count.clone(),
///     move |new, old, _| sink.borrow_mut().push((new.clone(), old.clone())),
///     WatchOptions::default(),
/// );
///
/// count.set(1.into());
/// assert_eq!(*calls.borrow(), vec![(Value::from(1), Value::from(0))]);
/// ```
pub fn watch<S, C>(source: S, callback: C, options: WatchOptions) -> StopHandle
where
    S: Into<WatchSource>,
    C: FnMut(&Value, &Value, &OnCleanup) + 'static,
{
    let resolved = source.into().resolve();
    let deep = options.deep || resolved.force_deep;
    let multi = resolved.multi;

    let effect = {
        let getter = resolved.getter;
        Effect::new_lazy(move || {
            let value = getter();
            if deep {
                traverse(&value);
            }
            value
        })
    };

    let slot = CleanupSlot::new("watch callback");
    let watcher = Rc::new(SourceWatcher {
        effect: effect.clone(),
        callback: RefCell::new(Box::new(callback)),
        old_value: RefCell::new(Value::Undefined),
        on_cleanup: OnCleanup { slot: slot.clone() },
        multi,
        deep,
    });

    let job: Job = {
        let watcher = Rc::clone(&watcher);
        Rc::new(move || watcher.job())
    };
    let handle = install(effect.clone(), slot, options.flush, job);

    let initial = effect.run().unwrap_or_default();
    // From here on the job owns the previous value, including runs the
    // immediate callback triggers itself.
    watcher.old_value.replace(initial.clone());
    if options.immediate {
        let old_value = if multi {
            Value::Object(Object::array(Vec::<Value>::new()))
        } else {
            Value::Undefined
        };
        watcher.invoke(&initial, &old_value);
    }

    handle
}
