//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a ref is read,
//! we can register the current computation as a dependent.
//!
//! # Implementation
//!
//! We use a thread-local stack to track the currently executing computation.
//! When entering a reactive context (e.g., running a computed cell or an
//! effect), we push the subscriber onto the stack. When the computation
//! completes, we pop it.
//!
//! The push/pop is tied to a guard value, so the stack is restored on every
//! exit path, panics included. Untracked frames (see [`untrack`]) push an
//! entry without a subscriber, which hides outer contexts from reads.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use smallvec::SmallVec;

use super::dep::{Dep, DepId};
use super::subscriber::{Subscriber, SubscriberId};

/// Dependencies collected by one evaluation pass.
pub(crate) type CollectedDeps = SmallVec<[Dep; 4]>;

/// Past this many dependencies a frame dedupes through a hash set instead
/// of a linear scan.
const LINEAR_SCAN_LIMIT: usize = 32;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = const { RefCell::new(Vec::new()) };
}

/// An entry in the reactive context stack.
struct ContextEntry {
    /// The computation reads should register against. `None` for an
    /// untracked frame.
    subscriber: Option<Rc<dyn Subscriber>>,
    /// Dependency sets touched during this pass, deduplicated.
    dependencies: CollectedDeps,
    /// Built once `dependencies` outgrows a linear scan.
    index: Option<HashSet<DepId>>,
}

impl ContextEntry {
    fn new(subscriber: Option<Rc<dyn Subscriber>>) -> Self {
        Self {
            subscriber,
            dependencies: SmallVec::new(),
            index: None,
        }
    }

    fn record(&mut self, dep: &Dep) {
        let id = dep.id();
        let known = match &mut self.index {
            Some(index) => !index.insert(id),
            None => {
                let known = self.dependencies.iter().any(|d| d.id() == id);
                if !known && self.dependencies.len() >= LINEAR_SCAN_LIMIT {
                    let index = self.dependencies.iter().map(Dep::id).chain([id]).collect();
                    self.index = Some(index);
                }
                known
            }
        };
        if !known {
            self.dependencies.push(dep.clone());
        }
    }
}

/// Guard that pops the context when dropped.
///
/// This ensures the context stack is properly maintained even if
/// the computation panics.
pub struct ReactiveContext {
    subscriber_id: Option<SubscriberId>,
    finished: bool,
}

impl ReactiveContext {
    /// Enter a new reactive context for the given subscriber.
    ///
    /// While this context is active, any tracked value that is read will
    /// register the subscriber as a dependent.
    pub fn enter(subscriber: Rc<dyn Subscriber>) -> Self {
        let subscriber_id = Some(subscriber.id());
        Self::push(ContextEntry::new(Some(subscriber)));
        Self {
            subscriber_id,
            finished: false,
        }
    }

    /// Enter a frame in which reads are not tracked.
    pub fn untracked() -> Self {
        Self::push(ContextEntry::new(None));
        Self {
            subscriber_id: None,
            finished: false,
        }
    }

    fn push(entry: ContextEntry) {
        CONTEXT_STACK.with(|stack| stack.borrow_mut().push(entry));
    }

    /// Check if a tracking context is active.
    pub fn is_active() -> bool {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .is_some_and(|entry| entry.subscriber.is_some())
        })
    }

    /// Get the current subscriber ID, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .and_then(|entry| entry.subscriber.as_ref().map(|s| s.id()))
        })
    }

    /// Number of dependency sets recorded by the innermost frame so far.
    pub fn dependency_count() -> usize {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .map_or(0, |entry| entry.dependencies.len())
        })
    }

    /// Record a read of `dep` and return the subscriber to register, if any.
    pub(crate) fn track(dep: &Dep) -> Option<Rc<dyn Subscriber>> {
        CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            let entry = stack.last_mut()?;
            let subscriber = entry.subscriber.clone()?;
            entry.record(dep);
            Some(subscriber)
        })
    }

    /// Leave the context and hand back the dependencies it collected.
    pub(crate) fn finish(mut self) -> CollectedDeps {
        self.finished = true;
        self.pop().map(|entry| entry.dependencies).unwrap_or_default()
    }

    fn pop(&self) -> Option<ContextEntry> {
        let popped = CONTEXT_STACK.with(|stack| stack.borrow_mut().pop());

        // Verify we're popping the right context.
        if let Some(entry) = &popped {
            debug_assert_eq!(
                entry.subscriber.as_ref().map(|s| s.id()),
                self.subscriber_id,
                "ReactiveContext mismatch"
            );
        }
        popped
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        if !self.finished {
            self.pop();
        }
    }
}

/// Run `f` tracked by `subscriber` and hand the dependencies it read to
/// `on_exit`.
///
/// `on_exit` also runs when `f` panics, with whatever was read up to that
/// point, so the caller can keep account of live subscriptions.
pub(crate) fn tracked<R>(
    subscriber: Rc<dyn Subscriber>,
    f: impl FnOnce() -> R,
    on_exit: impl FnOnce(CollectedDeps),
) -> R {
    struct Exit<G: FnOnce(CollectedDeps)> {
        ctx: Option<ReactiveContext>,
        on_exit: Option<G>,
    }

    impl<G: FnOnce(CollectedDeps)> Drop for Exit<G> {
        fn drop(&mut self) {
            if let (Some(ctx), Some(on_exit)) = (self.ctx.take(), self.on_exit.take()) {
                on_exit(ctx.finish());
            }
        }
    }

    let _exit = Exit {
        ctx: Some(ReactiveContext::enter(subscriber)),
        on_exit: Some(on_exit),
    };
    f()
}

/// Run `f` without tracking any reads it performs.
pub fn untrack<R>(f: impl FnOnce() -> R) -> R {
    let _ctx = ReactiveContext::untracked();
    f()
}
