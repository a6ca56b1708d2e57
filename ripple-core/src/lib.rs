//! Ripple Core
//!
//! This crate provides a dependency-tracking and effect-scheduling runtime.
//! It implements:
//!
//! - Reactive primitives (refs, reactive containers, computed cells)
//! - Watchers with pre/post/sync flush semantics
//! - Effect scopes for bulk teardown
//! - Host integration: a manual host and a tokio `LocalSet` host
//!
//! The runtime is single-threaded: handles are `Rc`-based and all global
//! state (tracking context, scope stack, host factory) is thread-local.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Dependency sets, refs, containers, computed cells, effects
//! - `watch`: Source normalization, deep traversal and watcher callbacks
//! - `scheduler`: Flush modes, per-host flush queues and host collaborators
//! - `scope`: Effect scope tree and the active-scope stack
//! - `runtime`: Host factory installation and runtime introspection
//!
//! # Example
//!
//! ```rust
//! use ripple_core::{computed, watch_effect, Ref, WatchOptions};
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! // Create a ref
//! let count = Ref::new(0);
//!
//! // Create a derived value
//! let c = count.clone();
//! let doubled = computed(move || c.get() * 2);
//!
//! // Create a watcher
//! let log = Rc::new(RefCell::new(Vec::new()));
//! let (d, sink) = (doubled.clone(), log.clone());
//! watch_effect(move |_| sink.borrow_mut().push(d.get()), WatchOptions::default());
//!
//! // Update the ref; without a host the watcher re-runs inline
//! count.set(5);
//! assert_eq!(*log.borrow(), vec![0, 10]);
//! ```

pub mod error;
pub mod reactive;
pub mod runtime;
pub mod scheduler;
pub mod scope;
pub mod watch;

pub use error::{ReactiveError, Result};
pub use reactive::{
    computed, is_raw, is_reactive, is_ref, mark_raw, reactive, shallow_reactive, to_raw, unref,
    untrack, writable_computed, CellState, Computed, Dep, Effect, Key, Object, ObjectKind,
    Reactive, Ref, Value, REF_KEY,
};
pub use runtime::Runtime;
pub use scheduler::{FlushMode, Host, HostFactory, HostHandle, LocalHost, TokioHost};
pub use scope::{effect_scope, get_current_scope, on_scope_dispose, EffectScope, ScopeGuard};
pub use watch::{
    watch, watch_effect, watch_post_effect, watch_sync_effect, OnCleanup, StopHandle,
    WatchOptions, WatchSource,
};
