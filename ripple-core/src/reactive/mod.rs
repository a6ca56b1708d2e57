//! Reactive Primitives
//!
//! This module implements the core reactive system: dependency sets, refs,
//! reactive containers, computed cells and effects.
//!
//! # Concepts
//!
//! ## Dependency Sets
//!
//! Every tracked value owns a [`Dep`]: the set of computations that read it
//! during their latest run. Reading a tracked value inside a reactive
//! context joins the set; changing the value notifies every member.
//!
//! ## Refs
//!
//! A [`Ref`] is a single mutable box. Assigning a different value notifies
//! its subscribers; assigning an equal one is silent unless force mode is on.
//!
//! ## Reactive Containers
//!
//! A [`Reactive`] is a tracked view over an [`Object`] graph, with one
//! dependency set per property. Nested objects become observed on first
//! access, refs stored in properties are unwrapped on read, and objects
//! marked raw are never observed.
//!
//! ## Computed Cells
//!
//! A [`Computed`] is a derived value that caches its result and recomputes
//! only when read after one of its dependencies changed.
//!
//! ## Effects
//!
//! An [`Effect`] is a tracked computation that re-runs, or hands itself to
//! a scheduler, whenever its dependencies change. Watchers are built on it.
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local tracking context to detect
//! dependencies automatically. When a tracked value is read, we check if
//! there is an active context and, if so, register the dependency.

mod computed;
mod container;
mod context;
mod dep;
mod effect;
mod refs;
mod subscriber;
mod value;

pub use computed::{computed, writable_computed, CellState, Computed};
pub use container::{
    is_raw, is_reactive, mark_raw, reactive, shallow_reactive, to_raw, Reactive, REF_KEY,
};
pub use context::{untrack, ReactiveContext};
pub use dep::{Dep, DepId, WeakDep};
pub use effect::{Effect, Scheduler};
pub use refs::Ref;
pub use subscriber::{Listener, Subscriber, SubscriberId};
pub use value::{is_ref, unref, Key, Object, ObjectId, ObjectKind, Value, MAX_ARRAY_PADDING};
