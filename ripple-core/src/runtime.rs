//! Reactive Runtime
//!
//! The runtime is the installation seam between the reactive core and its
//! host. It holds the per-thread host factory that new effect scopes use to
//! create their host instance, and answers questions about the current
//! tracking and scope state.
//!
//! # How It Works
//!
//! 1. [`Runtime::install`] registers a [`HostFactory`] for this thread.
//!
//! 2. Every effect scope created afterwards asks the factory for its own
//!    host, pairs it with flush queues and destroys it when stopped.
//!
//! 3. A watcher created inside a scope schedules through the nearest host
//!    up the scope chain. With no factory installed and no explicit host,
//!    watchers run synchronously.
//!
//! # Thread Safety
//!
//! All reactive state is `Rc`-based. The factory, the tracking context and
//! the scope stack are thread-local, so each thread runs its own
//! independent runtime.

use std::cell::RefCell;
use std::rc::Rc;

use crate::reactive::{ReactiveContext, SubscriberId};
use crate::scheduler::{Host, HostFactory, HostHandle};
use crate::scope::EffectScope;

thread_local! {
    static HOST_FACTORY: RefCell<Option<Rc<dyn HostFactory>>> = const { RefCell::new(None) };
}

/// The per-thread reactive runtime.
pub struct Runtime;

impl Runtime {
    /// Install the factory that creates a host for every new effect scope
    /// on this thread, replacing any previous one.
    pub fn install<F>(factory: F)
    where
        F: HostFactory + 'static,
    {
        tracing::debug!("host factory installed");
        HOST_FACTORY.with(|slot| *slot.borrow_mut() = Some(Rc::new(factory)));
    }

    /// Remove the installed factory. Scopes created afterwards are
    /// host-less.
    pub fn uninstall() {
        HOST_FACTORY.with(|slot| slot.borrow_mut().take());
    }

    /// Check if a host factory is installed.
    pub fn is_installed() -> bool {
        HOST_FACTORY.with(|slot| slot.borrow().is_some())
    }

    /// Create a host through the installed factory.
    pub(crate) fn create_host() -> Option<Rc<dyn Host>> {
        // Release the slot before calling into user code.
        let factory = HOST_FACTORY.with(|slot| slot.borrow().clone())?;
        Some(factory.create())
    }

    /// The host that watchers created right now would schedule on: the
    /// nearest one up the active scope chain.
    pub fn current_host() -> Option<HostHandle> {
        EffectScope::current().and_then(|scope| scope.nearest_host())
    }

    /// Get the current subscriber being tracked, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        ReactiveContext::current_subscriber()
    }

    /// Check if we're inside a reactive context.
    pub fn is_tracking() -> bool {
        ReactiveContext::is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{computed, Ref};
    use crate::scheduler::LocalHost;
    use std::cell::Cell;

    #[test]
    fn tracking_state_follows_context() {
        assert!(!Runtime::is_tracking());
        assert!(Runtime::current_subscriber().is_none());

        let seen = Rc::new(Cell::new(false));
        let seen_clone = seen.clone();
        let source = Ref::new(1);
        let source_clone = source.clone();
        let cell = computed(move || {
            seen_clone.set(Runtime::is_tracking() && Runtime::current_subscriber().is_some());
            source_clone.get()
        });

        assert_eq!(cell.get(), 1);
        assert!(seen.get());
        assert!(!Runtime::is_tracking());
    }

    #[test]
    fn installed_factory_backs_new_scopes() {
        let created = Rc::new(Cell::new(0));
        let created_clone = created.clone();
        Runtime::install(move || -> Rc<dyn Host> {
            created_clone.set(created_clone.get() + 1);
            LocalHost::new()
        });
        assert!(Runtime::is_installed());

        let scope = EffectScope::new();
        assert_eq!(created.get(), 1);
        assert!(scope.host().is_some());
        assert!(scope.run(Runtime::current_host).flatten().is_some());

        Runtime::uninstall();
        assert!(!Runtime::is_installed());
        assert!(EffectScope::new().host().is_none());
        assert!(Runtime::current_host().is_none());
    }
}
