//! Reactive Containers
//!
//! A [`Reactive`] is a tracked view over a raw [`Object`] target.
//!
//! # How Containers Work
//!
//! 1. Wrapping a target installs an [`Observer`] on it. The observer is
//!    stored on the target itself, so wrapping the same target again hands
//!    back the same observer: one target never has two containers.
//!
//! 2. Per-property dependency sets are created lazily, the first time a
//!    property is read or written through the container. Nothing is walked
//!    eagerly at wrap time.
//!
//! 3. Reading a property through a deep container observes nested plain
//!    objects and arrays on the spot, so they are tracked the next time they
//!    are read. Assigning a nested object does not wrap it.
//!
//! 4. A stored [`Ref`](super::refs::Ref) is unwrapped transparently on read
//!    (except under [`REF_KEY`]), and a plain assignment to a ref-holding
//!    property writes through to the ref instead of replacing it.
//!
//! Targets marked raw, maps, sets and non-extensible targets are never
//! observed; wrapping one yields a pass-through view that neither tracks nor
//! notifies.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use super::dep::Dep;
use super::value::{Key, Object, ObjectKind, Value};

/// Reserved property whose stored ref is returned as-is instead of being
/// unwrapped. Used to carry ref identity through a container.
pub const REF_KEY: &str = "__ref__";

/// Tracking state attached to an observed target.
pub(crate) struct Observer {
    shallow: bool,
    /// One dependency set per property, created on first access.
    keys: RefCell<HashMap<Key, Dep>>,
    /// Tracks the key set: additions, removals, and iteration.
    structure: Dep,
}

impl Observer {
    fn new(shallow: bool) -> Self {
        Self {
            shallow,
            keys: RefCell::new(HashMap::new()),
            structure: Dep::new(),
        }
    }

    fn key_dep(&self, key: &Key) -> Dep {
        self.keys
            .borrow_mut()
            .entry(key.clone())
            .or_default()
            .clone()
    }

    fn existing_dep(&self, key: &Key) -> Option<Dep> {
        self.keys.borrow().get(key).cloned()
    }

    fn notify_key(&self, key: &Key) {
        if let Some(dep) = self.existing_dep(key) {
            dep.notify();
        }
    }

    /// Notify every index at or after `from`, for arrays whose elements
    /// shifted.
    fn notify_indices_from(&self, from: usize) {
        let deps: Vec<Dep> = self
            .keys
            .borrow()
            .iter()
            .filter(|(key, _)| matches!(key, Key::Index(i) if *i >= from))
            .map(|(_, dep)| dep.clone())
            .collect();
        for dep in deps {
            dep.notify();
        }
    }
}

fn is_wrappable(target: &Object) -> bool {
    matches!(target.kind(), ObjectKind::Plain | ObjectKind::Array)
        && !target.is_raw()
        && target.is_extensible()
}

/// Install an observer on `target` if it can have one, returning the
/// target's observer either way.
fn observe(target: &Object, shallow: bool) -> Option<Rc<Observer>> {
    if let Some(existing) = target.observer() {
        return Some(existing);
    }
    if !is_wrappable(target) {
        return None;
    }

    tracing::trace!(object = target.id().raw(), shallow, "observing object");
    let observer = Rc::new(Observer::new(shallow));
    target.install_observer(observer.clone());
    Some(observer)
}

/// A tracked view over an object target.
///
/// Cloning a `Reactive` yields another handle to the same container.
#[derive(Clone)]
pub struct Reactive {
    target: Object,
    observer: Option<Rc<Observer>>,
}

impl Reactive {
    fn wrap(target: &Object, shallow: bool) -> Self {
        Self {
            target: target.clone(),
            observer: observe(target, shallow),
        }
    }

    /// View a target through the observer it already has, without
    /// installing one.
    pub(crate) fn existing(target: &Object) -> Option<Self> {
        target.observer().map(|observer| Self {
            target: target.clone(),
            observer: Some(observer),
        })
    }

    /// Whether reads and writes through this view are tracked.
    pub fn is_reactive(&self) -> bool {
        self.observer.is_some()
    }

    /// Whether nested values are left unobserved.
    pub fn is_shallow(&self) -> bool {
        self.observer.as_ref().is_some_and(|o| o.shallow)
    }

    /// Read a property, tracking it.
    ///
    /// Stored refs are unwrapped unless the key is [`REF_KEY`]. In a deep
    /// container, nested plain objects and arrays become observed.
    pub fn get(&self, key: impl Into<Key>) -> Option<Value> {
        let key = key.into();
        let Some(observer) = &self.observer else {
            return self.target.get(key);
        };

        observer.key_dep(&key).depend();
        let stored = self.target.get(key.clone())?;

        Some(match stored {
            Value::Ref(r) if !is_ref_key(&key) => r.get(),
            Value::Object(child) => {
                if !observer.shallow {
                    observe(&child, false);
                }
                Value::Object(child)
            }
            other => other,
        })
    }

    /// Read a nested object property as a container.
    ///
    /// Children of a shallow container are only reactive if they were
    /// observed independently.
    pub fn child(&self, key: impl Into<Key>) -> Option<Reactive> {
        let Value::Object(child) = self.get(key)? else {
            return None;
        };
        if self.is_shallow() || self.observer.is_none() {
            Some(Reactive::existing(&child).unwrap_or(Reactive {
                target: child,
                observer: None,
            }))
        } else {
            Some(Reactive::wrap(&child, false))
        }
    }

    /// Write a property.
    ///
    /// If the property holds a ref and `value` is not a ref, the write goes
    /// through to the ref. Otherwise the stored value is replaced and the
    /// property's subscribers are notified if it changed; adding a new key
    /// also notifies the container's structure subscribers.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        let Some(observer) = &self.observer else {
            self.target.insert(key, value);
            return;
        };
        if !self.target.accepts(&key) {
            tracing::warn!(object = self.target.id().raw(), key = %key, "key does not fit container; write ignored");
            return;
        }

        let old = self.target.get(key.clone());
        if let Some(Value::Ref(r)) = &old {
            if !matches!(value, Value::Ref(_)) && !is_ref_key(&key) {
                r.set(value);
                return;
            }
        }

        let is_new = old.is_none();
        if is_new && !self.target.is_extensible() {
            tracing::warn!(object = self.target.id().raw(), key = %key, "cannot add key to a non-extensible object");
            return;
        }

        let changed = old.as_ref() != Some(&value);
        let len_before = self.target.len();
        self.target.insert(key.clone(), value);

        match &key {
            // Padded array writes create several indices at once.
            Key::Index(i) if is_new => observer.notify_indices_from(len_before.min(*i)),
            _ if changed => observer.notify_key(&key),
            _ => {}
        }
        if is_new {
            observer.structure.notify();
        }
    }

    /// Delete a property, notifying its subscribers and the container's
    /// structure subscribers. Removing an array element notifies every
    /// shifted index.
    pub fn remove(&self, key: impl Into<Key>) -> Option<Value> {
        let key = key.into();
        let removed = self.target.remove(key.clone())?;

        if let Some(observer) = &self.observer {
            match key {
                Key::Index(i) => observer.notify_indices_from(i),
                key => observer.notify_key(&key),
            }
            observer.structure.notify();
        }
        Some(removed)
    }

    /// Append to an array container.
    pub fn push(&self, value: impl Into<Value>) -> Option<usize> {
        let index = self.target.push(value)?;
        if let Some(observer) = &self.observer {
            observer.notify_key(&Key::Index(index));
            observer.structure.notify();
        }
        Some(index)
    }

    /// The container's keys, tracking the key set.
    pub fn keys(&self) -> Vec<Key> {
        self.track_structure();
        self.target.keys()
    }

    /// The container's size, tracking the key set.
    pub fn len(&self) -> usize {
        self.track_structure();
        self.target.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn track_structure(&self) {
        if let Some(observer) = &self.observer {
            observer.structure.depend();
        }
    }

    /// The raw target behind this view.
    pub fn to_raw(&self) -> Object {
        self.target.clone()
    }

    /// The target as a [`Value`].
    pub fn to_value(&self) -> Value {
        Value::Object(self.target.clone())
    }

    /// Check whether two views share a target.
    pub fn ptr_eq(&self, other: &Reactive) -> bool {
        self.target.ptr_eq(&other.target)
    }

    /// Number of properties that have a dependency set.
    pub fn tracked_key_count(&self) -> usize {
        self.observer
            .as_ref()
            .map_or(0, |observer| observer.keys.borrow().len())
    }
}

impl From<Reactive> for Value {
    fn from(r: Reactive) -> Self {
        Value::Object(r.target)
    }
}

impl fmt::Debug for Reactive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reactive")
            .field("target", &self.target)
            .field("reactive", &self.is_reactive())
            .field("shallow", &self.is_shallow())
            .finish()
    }
}

fn is_ref_key(key: &Key) -> bool {
    matches!(key, Key::Name(name) if &**name == REF_KEY)
}

/// Wrap `target` in a deep reactive container.
///
/// Wrapping is idempotent: a target that is already observed keeps its
/// existing observer (deep or shallow). Raw, non-extensible, map and set
/// targets come back as an untracked pass-through view.
pub fn reactive(target: &Object) -> Reactive {
    Reactive::wrap(target, false)
}

/// Wrap `target` tracking only its own properties. Nested objects are left
/// unobserved.
pub fn shallow_reactive(target: &Object) -> Reactive {
    Reactive::wrap(target, true)
}

/// Mark `target` so it is never made reactive, nor walked by deep watchers.
pub fn mark_raw(target: &Object) -> Object {
    target.mark_raw();
    target.clone()
}

/// The raw target behind a container.
pub fn to_raw(container: &Reactive) -> Object {
    container.to_raw()
}

/// Check whether `value` is an observed object.
pub fn is_reactive(value: &Value) -> bool {
    matches!(value, Value::Object(o) if o.observer().is_some())
}

/// Check whether `value` is an object marked raw.
pub fn is_raw(value: &Value) -> bool {
    matches!(value, Value::Object(o) if o.is_raw())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::refs::Ref;
    use crate::reactive::subscriber::Listener;
    use std::cell::Cell;

    fn count_notifications(dep: &Dep) -> Rc<Cell<u32>> {
        let count = Rc::new(Cell::new(0));
        let count_clone = count.clone();
        dep.subscribe(Rc::new(Listener::new(move || count_clone.set(count_clone.get() + 1))));
        count
    }

    fn key_dep(r: &Reactive, key: &str) -> Dep {
        r.observer.as_ref().unwrap().key_dep(&Key::from(key))
    }

    #[test]
    fn wrapping_is_idempotent() {
        let target = Object::from_entries([("a", 1)]);
        let first = reactive(&target);
        let second = reactive(&target);

        assert!(first.ptr_eq(&second));
        assert!(Rc::ptr_eq(
            first.observer.as_ref().unwrap(),
            second.observer.as_ref().unwrap()
        ));

        // An existing deep observer wins over a later shallow request.
        assert!(!shallow_reactive(&target).is_shallow());
    }

    #[test]
    fn keys_are_tracked_lazily() {
        let state = reactive(&Object::from_entries([("a", 1), ("b", 2)]));
        assert_eq!(state.tracked_key_count(), 0);

        state.get("a");
        assert_eq!(state.tracked_key_count(), 1);
    }

    #[test]
    fn set_notifies_only_on_change() {
        let state = reactive(&Object::from_entries([("a", 1)]));
        let count = count_notifications(&key_dep(&state, "a"));

        state.set("a", 2);
        assert_eq!(count.get(), 1);
        assert_eq!(state.get("a"), Some(Value::Int(2)));

        state.set("a", 2);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn refs_are_unwrapped_and_written_through() {
        let inner = Ref::new(Value::Int(1));
        let state = reactive(&Object::from_entries([("count", Value::Ref(inner.clone()))]));

        assert_eq!(state.get("count"), Some(Value::Int(1)));

        state.set("count", 5);
        assert_eq!(inner.get(), Value::Int(5));
        // The ref itself is still stored.
        assert!(matches!(state.to_raw().get("count"), Some(Value::Ref(_))));

        // Assigning a different ref replaces it.
        let other = Ref::new(Value::Int(9));
        state.set("count", Value::Ref(other.clone()));
        assert_eq!(state.get("count"), Some(Value::Int(9)));
        assert_eq!(inner.get(), Value::Int(5));
    }

    #[test]
    fn reserved_key_preserves_ref_identity() {
        let inner = Ref::new(Value::Int(1));
        let state = reactive(&Object::from_entries([(REF_KEY, Value::Ref(inner.clone()))]));

        match state.get(REF_KEY) {
            Some(Value::Ref(r)) => assert!(r.ptr_eq(&inner)),
            other => panic!("expected the raw ref, got {other:?}"),
        }
    }

    #[test]
    fn nested_objects_are_observed_on_access() {
        let nested = Object::from_entries([("x", 1)]);
        let state = reactive(&Object::from_entries([("nested", Value::Object(nested.clone()))]));

        assert!(nested.observer().is_none());
        let child = state.child("nested").unwrap();
        assert!(child.is_reactive());
        assert!(nested.observer().is_some());
    }

    #[test]
    fn assigned_objects_are_not_wrapped_eagerly() {
        let state = reactive(&Object::new());
        let nested = Object::from_entries([("x", 1)]);

        state.set("nested", Value::Object(nested.clone()));
        assert!(nested.observer().is_none());

        state.get("nested");
        assert!(nested.observer().is_some());
    }

    #[test]
    fn shallow_containers_leave_children_alone() {
        let nested = Object::from_entries([("x", 1)]);
        let state = shallow_reactive(&Object::from_entries([("nested", Value::Object(nested.clone()))]));

        let child = state.child("nested").unwrap();
        assert!(!child.is_reactive());
        assert!(nested.observer().is_none());
    }

    #[test]
    fn raw_targets_are_never_wrapped() {
        let target = mark_raw(&Object::from_entries([("a", 1)]));
        let view = reactive(&target);
        assert!(!view.is_reactive());
        assert!(is_raw(&Value::Object(target.clone())));

        // Raw children stay raw when reached through a container.
        let state = reactive(&Object::from_entries([("raw", Value::Object(target.clone()))]));
        assert!(!state.child("raw").unwrap().is_reactive());
        assert!(!is_reactive(&Value::Object(target)));
    }

    #[test]
    fn maps_sets_and_frozen_objects_pass_through() {
        assert!(!reactive(&Object::map()).is_reactive());
        assert!(!reactive(&Object::set()).is_reactive());

        let frozen = Object::new();
        frozen.prevent_extensions();
        assert!(!reactive(&frozen).is_reactive());
    }

    #[test]
    fn adding_and_removing_keys_notifies_structure() {
        let state = reactive(&Object::new());
        let structure = count_notifications(&state.observer.as_ref().unwrap().structure);

        state.set("a", 1);
        assert_eq!(structure.get(), 1);

        state.set("a", 2);
        assert_eq!(structure.get(), 1);

        state.remove("a");
        assert_eq!(structure.get(), 2);
        assert_eq!(state.len(), 0);
    }

    #[test]
    fn array_push_notifies_new_index() {
        let list = reactive(&Object::array([1, 2]));
        let index_two = count_notifications(&list.observer.as_ref().unwrap().key_dep(&Key::Index(2)));

        assert_eq!(list.push(3), Some(2));
        assert_eq!(index_two.get(), 1);
        assert_eq!(list.get(2_usize), Some(Value::Int(3)));
    }

    #[test]
    fn to_raw_returns_the_target() {
        let target = Object::new();
        let state = reactive(&target);
        assert!(to_raw(&state).ptr_eq(&target));
    }

    #[test]
    fn mismatched_keys_do_not_notify_structure() {
        let list = reactive(&Object::array([1, 2]));
        let structure = count_notifications(&list.observer.as_ref().unwrap().structure);
        list.set("name", 3);
        assert_eq!(structure.get(), 0);
        assert_eq!(list.len(), 2);

        let state = reactive(&Object::from_entries([("a", 1)]));
        let structure = count_notifications(&state.observer.as_ref().unwrap().structure);
        state.set(0_usize, 3);
        state.set("b", 2);
        assert_eq!(structure.get(), 1);
    }
}
