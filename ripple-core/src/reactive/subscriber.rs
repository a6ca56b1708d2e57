//! Subscriber types for the reactive system.
//!
//! A Subscriber represents any computation that depends on reactive values.
//! This includes computed cells and the effects behind watchers.
//!
//! Dependency sets only ever see a subscriber through the opaque
//! [`Subscriber`] trait: an ID for deduplication and an `update()` entry
//! point. They never need to know what kind of computation sits behind it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a subscriber.
///
/// Each subscriber (computed cell, effect, or other reactive computation) gets
/// a unique ID when created. This ID is used to deduplicate subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Anything that can be notified when a dependency changes.
pub trait Subscriber {
    /// The subscriber's unique ID.
    fn id(&self) -> SubscriberId;

    /// Called when one of the subscriber's dependencies changed.
    fn update(&self);
}

/// A subscriber backed by a plain callback.
///
/// Useful for wiring a dependency set to something that is not a computation,
/// for example a manual subscription in tests or an external bridge.
pub struct Listener {
    id: SubscriberId,
    notify: Box<dyn Fn()>,
}

impl Listener {
    /// Create a new listener with the given notification callback.
    pub fn new<F>(notify: F) -> Self
    where
        F: Fn() + 'static,
    {
        Self {
            id: SubscriberId::new(),
            notify: Box::new(notify),
        }
    }
}

impl Subscriber for Listener {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn update(&self) {
        (self.notify)();
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener").field("id", &self.id).finish()
    }
}
