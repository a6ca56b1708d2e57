//! Flush Scheduler
//!
//! Decides when a triggered watcher actually runs.
//!
//! # Flush Modes
//!
//! - `sync`: the job runs inline, inside the notifying write.
//! - `pre`: the job waits in the host's pre queue, drained when the host
//!   signals "about to update".
//! - `post`: the job waits in the host's post queue, drained when the host
//!   signals "did update".
//!
//! Whatever the mode, enqueueing also schedules one fallback drain on the
//! host's next tick. The fallback is idempotent per tick and drains the pre
//! queue, then the post queue, each in FIFO order.
//!
//! Every drain works on a snapshot: jobs enqueued while a drain runs wait for
//! the next scheduled drain. If a job panics, the panic reaches whoever
//! triggered the drain and the jobs it did not reach stay queued for the
//! next one.
//!
//! Without a host, every mode degrades to `sync`.

mod host;
mod tokio_host;

pub use host::{Hook, Host, HostFactory, Lifecycle, LocalHost, TickCallback};
pub use tokio_host::TokioHost;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::mem;
use std::rc::{Rc, Weak};
use std::str::FromStr;
use std::vec;

use serde::{Deserialize, Serialize};

use crate::error::ReactiveError;
use crate::reactive::Scheduler;

/// A queued unit of work.
pub type Job = Rc<dyn Fn()>;

/// When a triggered watcher runs relative to host updates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlushMode {
    /// Before the host updates.
    #[default]
    Pre,
    /// After the host updates.
    Post,
    /// Inline, as soon as a dependency changes.
    Sync,
}

impl FlushMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlushMode::Pre => "pre",
            FlushMode::Post => "post",
            FlushMode::Sync => "sync",
        }
    }
}

impl FromStr for FlushMode {
    type Err = ReactiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pre" => Ok(FlushMode::Pre),
            "post" => Ok(FlushMode::Post),
            "sync" => Ok(FlushMode::Sync),
            other => Err(ReactiveError::UnknownFlushMode(other.to_string())),
        }
    }
}

impl fmt::Display for FlushMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pending jobs of one host.
struct FlushQueue {
    host: Weak<dyn Host>,
    pre: RefCell<Vec<Job>>,
    post: RefCell<Vec<Job>>,
    tick_pending: Cell<bool>,
}

/// Puts the jobs a drain did not reach back at the front of their queue.
///
/// Only has work to do when a job panicked: the rest of the snapshot stays
/// pending and a fresh fallback tick is requested for it.
struct Requeue<'a> {
    queue: &'a Rc<FlushQueue>,
    mode: FlushMode,
    rest: vec::IntoIter<Job>,
}

impl Drop for Requeue<'_> {
    fn drop(&mut self) {
        let rest: Vec<Job> = self.rest.by_ref().collect();
        if rest.is_empty() {
            return;
        }
        tracing::warn!(mode = %self.mode, jobs = rest.len(), "flush interrupted; requeueing remaining jobs");
        {
            let mut queue = self.queue.queue(self.mode).borrow_mut();
            let later = mem::replace(&mut *queue, rest);
            queue.extend(later);
        }
        self.queue.schedule_fallback();
    }
}

impl FlushQueue {
    fn new(host: &Rc<dyn Host>) -> Rc<Self> {
        Rc::new(Self {
            host: Rc::downgrade(host),
            pre: RefCell::new(Vec::new()),
            post: RefCell::new(Vec::new()),
            tick_pending: Cell::new(false),
        })
    }

    fn queue(&self, mode: FlushMode) -> &RefCell<Vec<Job>> {
        match mode {
            FlushMode::Post => &self.post,
            _ => &self.pre,
        }
    }

    fn drain(self: &Rc<Self>, mode: FlushMode) -> usize {
        let jobs = mem::take(&mut *self.queue(mode).borrow_mut());
        if jobs.is_empty() {
            return 0;
        }
        tracing::trace!(mode = %mode, jobs = jobs.len(), "draining flush queue");
        let count = jobs.len();
        let mut pending = Requeue {
            queue: self,
            mode,
            rest: jobs.into_iter(),
        };
        while let Some(job) = pending.rest.next() {
            job();
        }
        count
    }

    /// Ask the host for one fallback drain on its next tick.
    fn schedule_fallback(self: &Rc<Self>) {
        if self.tick_pending.replace(true) {
            return;
        }
        let Some(host) = self.host.upgrade() else {
            return;
        };
        let queue = Rc::clone(self);
        host.next_tick(Box::new(move || {
            queue.tick_pending.set(false);
            queue.drain(FlushMode::Pre);
            queue.drain(FlushMode::Post);
        }));
    }

    fn len(&self) -> usize {
        self.pre.borrow().len() + self.post.borrow().len()
    }
}

/// A host paired with its flush queues.
///
/// Creating the handle wires the host's "about to update" signal to the pre
/// queue and its "did update" signal to the post queue.
#[derive(Clone)]
pub struct HostHandle {
    host: Rc<dyn Host>,
    queue: Rc<FlushQueue>,
}

impl HostHandle {
    pub fn new(host: Rc<dyn Host>) -> Self {
        let queue = FlushQueue::new(&host);

        let weak = Rc::downgrade(&queue);
        host.on_before_update(Rc::new(move || {
            if let Some(queue) = weak.upgrade() {
                queue.drain(FlushMode::Pre);
            }
        }));
        let weak = Rc::downgrade(&queue);
        host.on_updated(Rc::new(move || {
            if let Some(queue) = weak.upgrade() {
                queue.drain(FlushMode::Post);
            }
        }));

        Self { host, queue }
    }

    pub fn host(&self) -> &Rc<dyn Host> {
        &self.host
    }

    /// Queue `job` for `mode`, or run it now for [`FlushMode::Sync`].
    pub fn schedule(&self, mode: FlushMode, job: Job) {
        if mode == FlushMode::Sync {
            job();
            return;
        }
        self.queue.queue(mode).borrow_mut().push(job);
        self.queue.schedule_fallback();
    }

    /// Drain the pre queue, then the post queue. Returns how many jobs ran.
    pub fn flush(&self) -> usize {
        self.queue.drain(FlushMode::Pre) + self.queue.drain(FlushMode::Post)
    }

    /// Number of jobs waiting in either queue.
    pub fn pending_jobs(&self) -> usize {
        self.queue.len()
    }
}

impl fmt::Debug for HostHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostHandle")
            .field("destroyed", &self.host.is_destroyed())
            .field("pre", &self.queue.pre.borrow().len())
            .field("post", &self.queue.post.borrow().len())
            .field("tick_pending", &self.queue.tick_pending.get())
            .finish()
    }
}

/// Build the scheduler a watcher hands to its effect.
///
/// Without a host, or in [`FlushMode::Sync`], the job runs inline. Otherwise
/// it is queued, at most once until it runs.
pub fn create_scheduler(host: Option<HostHandle>, mode: FlushMode, job: Job) -> Scheduler {
    let host = match host {
        Some(host) if mode != FlushMode::Sync => host,
        _ => return job,
    };

    let queued = Rc::new(Cell::new(false));
    let job: Job = {
        let queued = Rc::clone(&queued);
        Rc::new(move || {
            queued.set(false);
            job();
        })
    };
    Rc::new(move || {
        if !queued.replace(true) {
            host.schedule(mode, Rc::clone(&job));
        }
    })
}
