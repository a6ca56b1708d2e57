//! Dependency Sets
//!
//! A [`Dep`] is the subscriber registry attached to one tracked value: a ref,
//! one property of a reactive container, or a computed cell's own output.
//!
//! # How Dependency Sets Work
//!
//! 1. When a tracked value is read, it calls [`Dep::depend`]. If a tracking
//!    context is active, the context's subscriber is added to the set and the
//!    set is recorded in the context so the subscriber can leave it later.
//!
//! 2. When the value changes, [`Dep::notify`] calls `update()` on every
//!    subscriber.
//!
//! # Ordering and Mutation
//!
//! Notification iterates over a snapshot taken before the first `update()`
//! call. Subscribers can subscribe or unsubscribe themselves (or others) while
//! the notification is in flight without anyone being skipped or called twice.
//! No ordering is promised between distinct subscribers of one set beyond
//! registration order of the snapshot.
//!
//! # Ownership
//!
//! The set holds its subscribers strongly; subscribers hold the sets they read
//! from weakly ([`WeakDep`]). A subscriber therefore lives as long as anything
//! it depends on can still notify it, and dropping a ref releases everything
//! that was only waiting on it.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

use super::context::ReactiveContext;
use super::subscriber::{Subscriber, SubscriberId};

/// Unique identifier for a dependency set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DepId(u64);

impl DepId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

struct DepInner {
    id: DepId,
    /// Keyed by subscriber ID, so re-subscribing replaces the previous entry.
    subscribers: RefCell<IndexMap<SubscriberId, Rc<dyn Subscriber>>>,
}

/// An ordered set of subscribers attached to one tracked value.
///
/// Cloning a `Dep` yields another handle to the same set.
#[derive(Clone)]
pub struct Dep {
    inner: Rc<DepInner>,
}

impl Dep {
    /// Create an empty dependency set.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(DepInner {
                id: DepId::next(),
                subscribers: RefCell::new(IndexMap::new()),
            }),
        }
    }

    /// Get the set's unique ID.
    pub fn id(&self) -> DepId {
        self.inner.id
    }

    /// Register the active tracking context, if any, as a subscriber.
    pub fn depend(&self) {
        if let Some(subscriber) = ReactiveContext::track(self) {
            self.subscribe(subscriber);
        }
    }

    /// Add a subscriber directly, bypassing the tracking context.
    pub fn subscribe(&self, subscriber: Rc<dyn Subscriber>) {
        self.inner
            .subscribers
            .borrow_mut()
            .insert(subscriber.id(), subscriber);
    }

    /// Remove a subscriber.
    pub fn unsubscribe(&self, subscriber_id: SubscriberId) {
        self.inner
            .subscribers
            .borrow_mut()
            .shift_remove(&subscriber_id);
    }

    /// Notify every current subscriber.
    pub fn notify(&self) {
        let snapshot: Vec<Rc<dyn Subscriber>> =
            self.inner.subscribers.borrow().values().cloned().collect();

        if snapshot.is_empty() {
            return;
        }

        tracing::trace!(dep = self.id().raw(), subscribers = snapshot.len(), "notify");

        for subscriber in snapshot {
            subscriber.update();
        }
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.borrow().len()
    }

    /// Check whether the given subscriber is registered.
    pub fn has_subscriber(&self, subscriber_id: SubscriberId) -> bool {
        self.inner.subscribers.borrow().contains_key(&subscriber_id)
    }

    /// Create a weak handle to this set.
    pub fn downgrade(&self) -> WeakDep {
        WeakDep {
            id: self.inner.id,
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Check whether two handles refer to the same set.
    pub fn ptr_eq(&self, other: &Dep) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for Dep {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dep")
            .field("id", &self.inner.id)
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

/// A weak handle to a dependency set, held by subscribers.
#[derive(Clone)]
pub struct WeakDep {
    id: DepId,
    inner: Weak<DepInner>,
}

impl WeakDep {
    /// The ID of the referenced set, available even after it was dropped.
    pub fn id(&self) -> DepId {
        self.id
    }

    /// Upgrade to a strong handle if the set is still alive.
    pub fn upgrade(&self) -> Option<Dep> {
        self.inner.upgrade().map(|inner| Dep { inner })
    }
}

impl fmt::Debug for WeakDep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakDep").field("id", &self.id).finish()
    }
}

/// Remove `subscriber_id` from every set in `deps` that is still alive.
pub(crate) fn unsubscribe_all(deps: &[WeakDep], subscriber_id: SubscriberId) {
    for dep in deps.iter().filter_map(WeakDep::upgrade) {
        dep.unsubscribe(subscriber_id);
    }
}
