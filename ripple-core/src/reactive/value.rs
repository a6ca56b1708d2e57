//! Dynamic values and raw object graphs.
//!
//! Reactive containers wrap plain object graphs whose shape is only known at
//! runtime, so they work over a small dynamic value model:
//!
//! - [`Value`]: primitives, refs, and shared [`Object`] handles.
//! - [`Object`]: a shared target that is a plain keyed object, an array, a
//!   map or a set.
//!
//! Everything in this module is *raw*: reading never tracks and writing never
//! notifies. Tracking lives in [`Reactive`](super::container::Reactive),
//! which wraps an `Object`.
//!
//! # Equality
//!
//! Primitives compare by value (with `NaN` equal to itself). Refs and objects
//! compare by identity: two handles are equal when they point at the same
//! target, regardless of contents.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::mem;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

use super::container::Observer;
use super::refs::Ref;

/// A dynamically typed value stored in object graphs and watched by the
/// watch engine.
#[derive(Clone, Default)]
pub enum Value {
    /// No value. Also used as "no previous value" by watch callbacks.
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Ref(Ref<Value>),
    Object(Object),
}

impl Value {
    /// Create a string value.
    pub fn str(s: impl AsRef<str>) -> Self {
        Value::Str(Rc::from(s.as_ref()))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_ref_handle(&self) -> Option<&Ref<Value>> {
        match self {
            Value::Ref(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// The elements of an array or set value, in order.
    pub fn to_vec(&self) -> Option<Vec<Value>> {
        match self {
            Value::Object(o) if matches!(o.kind(), ObjectKind::Array | ObjectKind::Set) => {
                Some(o.values())
            }
            _ => None,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Ref(_) => "ref",
            Value::Object(_) => "object",
        }
    }

    /// Short description used in diagnostics.
    pub(crate) fn describe(&self) -> String {
        match self {
            Value::Object(o) => format!("{:?} object #{}", o.kind(), o.id().raw()),
            Value::Ref(_) => "ref".to_string(),
            other => format!("{} {:?}", other.type_name(), other),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Ref(a), Value::Ref(b)) => a.ptr_eq(b),
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("Undefined"),
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(i) => write!(f, "Int({i})"),
            Value::Float(x) => write!(f, "Float({x})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            // Refs and objects may be cyclic; never recurse into them.
            Value::Ref(r) => write!(f, "Ref(dep {})", r.dep().id().raw()),
            Value::Object(o) => write!(f, "{o:?}"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<Ref<Value>> for Value {
    fn from(r: Ref<Value>) -> Self {
        Value::Ref(r)
    }
}

impl From<Object> for Value {
    fn from(o: Object) -> Self {
        Value::Object(o)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// A property key: a name for plain objects and maps, an index for arrays
/// and sets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Name(Rc<str>),
    Index(usize),
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Name(Rc::from(s))
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Name(Rc::from(s))
    }
}

impl From<usize> for Key {
    fn from(i: usize) -> Self {
        Key::Index(i)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Name(name) => f.write_str(name),
            Key::Index(i) => write!(f, "[{i}]"),
        }
    }
}

/// The shape of an object target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Plain,
    Array,
    Map,
    Set,
}

/// Most `Undefined` slots a single array write may pad in.
pub const MAX_ARRAY_PADDING: usize = 1 << 16;

/// Unique identifier for an object target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

enum Shape {
    Plain(IndexMap<Rc<str>, Value>),
    Array(Vec<Value>),
    Map(IndexMap<Rc<str>, Value>),
    Set(Vec<Value>),
}

impl Shape {
    fn kind(&self) -> ObjectKind {
        match self {
            Shape::Plain(_) => ObjectKind::Plain,
            Shape::Array(_) => ObjectKind::Array,
            Shape::Map(_) => ObjectKind::Map,
            Shape::Set(_) => ObjectKind::Set,
        }
    }
}

struct ObjectInner {
    id: ObjectId,
    shape: RefCell<Shape>,
    raw: Cell<bool>,
    extensible: Cell<bool>,
    /// Installed once, the first time the target is wrapped.
    observer: RefCell<Option<Rc<Observer>>>,
}

impl Shape {
    fn take_values(&mut self) -> Vec<Value> {
        match self {
            Shape::Plain(m) | Shape::Map(m) => mem::take(m).into_values().collect(),
            Shape::Array(v) | Shape::Set(v) => mem::take(v),
        }
    }
}

impl Drop for ObjectInner {
    /// Empties solely owned descendants before they drop, so a long chain
    /// of nested objects is released in a loop instead of recursively.
    fn drop(&mut self) {
        let mut pending = self.shape.get_mut().take_values();
        while let Some(value) = pending.pop() {
            if let Value::Object(mut object) = value {
                if let Some(inner) = Rc::get_mut(&mut object.inner) {
                    pending.extend(inner.shape.get_mut().take_values());
                }
            }
        }
    }
}

/// A shared, raw object target.
///
/// Cloning an `Object` yields another handle to the same target.
#[derive(Clone)]
pub struct Object {
    inner: Rc<ObjectInner>,
}

impl Object {
    fn with_shape(shape: Shape) -> Self {
        Self {
            inner: Rc::new(ObjectInner {
                id: ObjectId::next(),
                shape: RefCell::new(shape),
                raw: Cell::new(false),
                extensible: Cell::new(true),
                observer: RefCell::new(None),
            }),
        }
    }

    /// Create an empty plain object.
    pub fn new() -> Self {
        Self::with_shape(Shape::Plain(IndexMap::new()))
    }

    /// Create a plain object from key/value pairs.
    pub fn from_entries<K, V, I>(entries: I) -> Self
    where
        K: AsRef<str>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let map = entries
            .into_iter()
            .map(|(k, v)| (Rc::from(k.as_ref()), v.into()))
            .collect();
        Self::with_shape(Shape::Plain(map))
    }

    /// Create an array.
    pub fn array<V, I>(values: I) -> Self
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        Self::with_shape(Shape::Array(values.into_iter().map(Into::into).collect()))
    }

    /// Create an empty map.
    pub fn map() -> Self {
        Self::with_shape(Shape::Map(IndexMap::new()))
    }

    /// Create an empty set.
    pub fn set() -> Self {
        Self::with_shape(Shape::Set(Vec::new()))
    }

    pub fn id(&self) -> ObjectId {
        self.inner.id
    }

    pub fn kind(&self) -> ObjectKind {
        self.inner.shape.borrow().kind()
    }

    /// Check whether two handles refer to the same target.
    pub fn ptr_eq(&self, other: &Object) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Mark this target as never-reactive.
    pub fn mark_raw(&self) {
        self.inner.raw.set(true);
    }

    pub fn is_raw(&self) -> bool {
        self.inner.raw.get()
    }

    /// Forbid adding new keys.
    pub fn prevent_extensions(&self) {
        self.inner.extensible.set(false);
    }

    pub fn is_extensible(&self) -> bool {
        self.inner.extensible.get()
    }

    pub(crate) fn observer(&self) -> Option<Rc<Observer>> {
        self.inner.observer.borrow().clone()
    }

    pub(crate) fn install_observer(&self, observer: Rc<Observer>) {
        *self.inner.observer.borrow_mut() = Some(observer);
    }

    pub fn len(&self) -> usize {
        match &*self.inner.shape.borrow() {
            Shape::Plain(m) | Shape::Map(m) => m.len(),
            Shape::Array(v) | Shape::Set(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_key(&self, key: &Key) -> bool {
        self.get(key.clone()).is_some()
    }

    /// Whether a write to `key` can land on this target: the key kind fits
    /// the object kind, and an array write would not pad the array by more
    /// than [`MAX_ARRAY_PADDING`] slots.
    pub fn accepts(&self, key: &Key) -> bool {
        match (&*self.inner.shape.borrow(), key) {
            (Shape::Plain(_) | Shape::Map(_), Key::Name(_)) => true,
            (Shape::Array(v), Key::Index(i)) => *i <= v.len().saturating_add(MAX_ARRAY_PADDING),
            _ => false,
        }
    }

    /// Read a property without tracking.
    pub fn get(&self, key: impl Into<Key>) -> Option<Value> {
        let key = key.into();
        match (&*self.inner.shape.borrow(), &key) {
            (Shape::Plain(m) | Shape::Map(m), Key::Name(name)) => m.get(name).cloned(),
            (Shape::Array(v) | Shape::Set(v), Key::Index(i)) => v.get(*i).cloned(),
            _ => None,
        }
    }

    /// Write a property without notifying. Returns the previous value.
    ///
    /// Writing past the end of an array pads it with `Undefined`. Adding a
    /// key to a non-extensible target, or a key of the wrong kind, is
    /// ignored with a warning.
    pub fn insert(&self, key: impl Into<Key>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        let extensible = self.is_extensible();
        let mut shape = self.inner.shape.borrow_mut();

        match (&mut *shape, &key) {
            (Shape::Plain(m) | Shape::Map(m), Key::Name(name)) => {
                if let Some(slot) = m.get_mut(name) {
                    return Some(mem::replace(slot, value));
                }
                if extensible {
                    m.insert(name.clone(), value);
                } else {
                    tracing::warn!(object = self.id().raw(), key = %key, "cannot add key to a non-extensible object");
                }
                None
            }
            (Shape::Array(v), Key::Index(i)) => {
                if let Some(slot) = v.get_mut(*i) {
                    return Some(mem::replace(slot, value));
                }
                if *i - v.len() > MAX_ARRAY_PADDING {
                    tracing::warn!(object = self.id().raw(), key = %key, len = v.len(), "array write too far past the end; ignored");
                    return None;
                }
                if extensible {
                    v.resize(*i, Value::Undefined);
                    v.push(value);
                } else {
                    tracing::warn!(object = self.id().raw(), key = %key, "cannot grow a non-extensible array");
                }
                None
            }
            (shape, _) => {
                tracing::warn!(kind = ?shape.kind(), key = %key, "key does not fit object kind; write ignored");
                None
            }
        }
    }

    /// Remove a property without notifying. Array removal shifts later
    /// elements down.
    pub fn remove(&self, key: impl Into<Key>) -> Option<Value> {
        let key = key.into();
        match (&mut *self.inner.shape.borrow_mut(), &key) {
            (Shape::Plain(m) | Shape::Map(m), Key::Name(name)) => m.shift_remove(name),
            (Shape::Array(v) | Shape::Set(v), Key::Index(i)) if *i < v.len() => Some(v.remove(*i)),
            _ => None,
        }
    }

    /// Append to an array, or add to a set if not already present.
    ///
    /// Returns the index the value now lives at.
    pub fn push(&self, value: impl Into<Value>) -> Option<usize> {
        let value = value.into();
        let extensible = self.is_extensible();
        match &mut *self.inner.shape.borrow_mut() {
            Shape::Set(v) => {
                if let Some(pos) = v.iter().position(|existing| *existing == value) {
                    return Some(pos);
                }
                if !extensible {
                    return None;
                }
                v.push(value);
                Some(v.len() - 1)
            }
            Shape::Array(v) if extensible => {
                v.push(value);
                Some(v.len() - 1)
            }
            shape => {
                tracing::warn!(kind = ?shape.kind(), "push on an object that cannot grow; ignored");
                None
            }
        }
    }

    /// The target's keys, in order.
    pub fn keys(&self) -> Vec<Key> {
        match &*self.inner.shape.borrow() {
            Shape::Plain(m) | Shape::Map(m) => m.keys().cloned().map(Key::Name).collect(),
            Shape::Array(v) | Shape::Set(v) => (0..v.len()).map(Key::Index).collect(),
        }
    }

    /// The target's values, in order.
    pub fn values(&self) -> Vec<Value> {
        match &*self.inner.shape.borrow() {
            Shape::Plain(m) | Shape::Map(m) => m.values().cloned().collect(),
            Shape::Array(v) | Shape::Set(v) => v.clone(),
        }
    }
}

impl Default for Object {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Object");
        debug.field("id", &self.id().raw());
        match self.inner.shape.try_borrow() {
            Ok(shape) => debug.field("kind", &shape.kind()),
            Err(_) => debug.field("kind", &"<borrowed>"),
        };
        debug
            .field("raw", &self.is_raw())
            .field("observed", &self.inner.observer.borrow().is_some())
            .finish()
    }
}

/// Follow a `Value::Ref` to its inner value (tracked); anything else is
/// returned as-is.
pub fn unref(value: &Value) -> Value {
    match value {
        Value::Ref(r) => r.get(),
        other => other.clone(),
    }
}

/// Check whether a value is a ref.
pub fn is_ref(value: &Value) -> bool {
    matches!(value, Value::Ref(_))
}
