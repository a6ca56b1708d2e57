//! Tokio-backed host.
//!
//! Next-tick callbacks become local tasks on the current
//! [`tokio::task::LocalSet`], so they run the next time the set is polled.
//! Reactive handles are `!Send`; this host never leaves its thread.

use std::fmt;
use std::rc::Rc;

use super::host::{Hook, Host, Lifecycle, TickCallback};

/// A host whose ticks are scheduled on a tokio `LocalSet`.
///
/// [`Host::next_tick`] must be called from within a `LocalSet` context;
/// `tokio::task::spawn_local` panics otherwise.
#[derive(Default)]
pub struct TokioHost {
    lifecycle: Lifecycle,
}

impl TokioHost {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Emit one update cycle: "about to update", then "did update".
    pub fn update(&self) {
        self.lifecycle.update();
    }
}

impl Host for TokioHost {
    fn next_tick(&self, callback: TickCallback) {
        let destroyed = self.lifecycle.destroyed_flag();
        if destroyed.get() {
            return;
        }
        tokio::task::spawn_local(async move {
            if !destroyed.get() {
                callback();
            }
        });
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
        self.lifecycle.destroy();
    }

    fn is_destroyed(&self) -> bool {
        self.lifecycle.is_destroyed()
    }
}

impl fmt::Debug for TokioHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokioHost")
            .field("lifecycle", &self.lifecycle)
            .finish()
    }
}
