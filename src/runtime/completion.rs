use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::rc::Rc;

use crate::lang::value::Value;
use crate::runtime::runtime_error::{ErrorKind, RuntimeError};
use crate::runtime::thread::ThreadId;

enum Phase {
    Pending,
    Ready(Result<Value, RuntimeError>),
    /// The result was handed to the waiting state.
    Taken,
    /// The waiter went away; later completions are dropped.
    Cancelled,
}

struct Inner {
    phase: Phase,
    waker: Option<Box<dyn FnOnce()>>,
}

/// Two-phase handle for a host operation a proc is waiting on.
///
/// The host keeps one clone and resolves it with [`complete`] or [`fail`];
/// the waiting state keeps another. Only the first resolution counts, and
/// the waker runs at most once.
///
/// [`complete`]: Completion::complete
/// [`fail`]: Completion::fail
#[derive(Clone)]
pub struct Completion {
    inner: Rc<RefCell<Inner>>,
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self.inner.borrow().phase {
            Phase::Pending => "pending",
            Phase::Ready(_) => "ready",
            Phase::Taken => "taken",
            Phase::Cancelled => "cancelled",
        };
        f.debug_struct("Completion").field("phase", &phase).finish()
    }
}

impl Default for Completion {
    fn default() -> Self {
        Self::new()
    }
}

impl Completion {
    pub fn new() -> Self {
        Completion {
            inner: Rc::new(RefCell::new(Inner {
                phase: Phase::Pending,
                waker: None,
            })),
        }
    }

    /// A completion that is already resolved.
    pub fn ready(value: Value) -> Self {
        let completion = Completion::new();
        completion.complete(value);
        completion
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.inner.borrow().phase, Phase::Pending)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.inner.borrow().phase, Phase::Ready(_))
    }

    /// Resolve with a value. Returns false if already resolved or cancelled.
    pub fn complete(&self, value: Value) -> bool {
        self.resolve(Ok(value))
    }

    /// Resolve with an error, raised in the waiting proc.
    pub fn fail(&self, error: RuntimeError) -> bool {
        self.resolve(Err(error))
    }

    fn resolve(&self, result: Result<Value, RuntimeError>) -> bool {
        let waker = {
            let mut inner = self.inner.borrow_mut();
            if !matches!(inner.phase, Phase::Pending) {
                return false;
            }
            inner.phase = Phase::Ready(result);
            inner.waker.take()
        };
        // Run outside the borrow so the waker may inspect this completion.
        if let Some(wake) = waker {
            wake();
        }
        true
    }

    /// Install the callback run on resolution. Replaces any previous one.
    /// Runs it immediately when the completion is already resolved.
    pub fn set_waker(&self, waker: impl FnOnce() + 'static) {
        let run_now = {
            let mut inner = self.inner.borrow_mut();
            match inner.phase {
                Phase::Pending => {
                    inner.waker = Some(Box::new(waker));
                    return;
                }
                Phase::Ready(_) => true,
                Phase::Taken | Phase::Cancelled => false,
            }
        };
        if run_now {
            waker();
        }
    }

    /// Take the result once it is ready.
    pub fn take(&self) -> Option<Result<Value, RuntimeError>> {
        let mut inner = self.inner.borrow_mut();
        match std::mem::replace(&mut inner.phase, Phase::Taken) {
            Phase::Ready(result) => Some(result),
            other => {
                inner.phase = other;
                None
            }
        }
    }

    /// Stop waiting. Drops the waker; later resolutions are ignored.
    pub fn cancel(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.waker = None;
        if matches!(inner.phase, Phase::Pending) {
            inner.phase = Phase::Cancelled;
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.inner.borrow().phase, Phase::Cancelled)
    }

    /// Shorthand for failing with a cancellation error.
    pub fn abort(&self) -> bool {
        self.fail(RuntimeError::new(ErrorKind::Cancelled))
    }
}

/// FIFO of threads that are ready to resume.
///
/// A thread that is already queued is not queued again, so several wakeups
/// before the next resume coalesce into one.
#[derive(Debug, Clone, Default)]
pub struct WakeQueue {
    inner: Rc<RefCell<WakeInner>>,
}

#[derive(Debug, Default)]
struct WakeInner {
    queue: VecDeque<ThreadId>,
    queued: HashSet<ThreadId>,
}

impl WakeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the thread was already queued.
    pub fn push(&self, id: ThreadId) -> bool {
        let mut inner = self.inner.borrow_mut();
        if !inner.queued.insert(id) {
            return false;
        }
        inner.queue.push_back(id);
        true
    }

    pub fn pop(&self) -> Option<ThreadId> {
        let mut inner = self.inner.borrow_mut();
        let id = inner.queue.pop_front()?;
        inner.queued.remove(&id);
        Some(id)
    }

    pub fn remove(&self, id: ThreadId) {
        let mut inner = self.inner.borrow_mut();
        if inner.queued.remove(&id) {
            inner.queue.retain(|queued| *queued != id);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().queue.len()
    }

    /// A waker that queues `id`.
    pub fn waker_for(&self, id: ThreadId) -> impl FnOnce() + 'static {
        let queue = self.clone();
        move || {
            queue.push(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_first_resolution_wins() {
        let c = Completion::new();
        assert!(c.complete(Value::Integer(1)));
        assert!(!c.complete(Value::Integer(2)));
        assert!(!c.abort());
        assert_eq!(c.take().unwrap().unwrap(), Value::Integer(1));
        assert!(c.take().is_none());
    }

    #[test]
    fn test_waker_runs_once() {
        let hits = Rc::new(Cell::new(0));
        let c = Completion::new();
        let counter = hits.clone();
        c.set_waker(move || counter.set(counter.get() + 1));
        c.complete(Value::Null);
        c.complete(Value::Null);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_waker_set_after_resolution_runs_immediately() {
        let hits = Rc::new(Cell::new(0));
        let c = Completion::ready(Value::Null);
        let counter = hits.clone();
        c.set_waker(move || counter.set(counter.get() + 1));
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_cancel_ignores_late_reply() {
        let hits = Rc::new(Cell::new(0));
        let c = Completion::new();
        let counter = hits.clone();
        c.set_waker(move || counter.set(counter.get() + 1));
        c.cancel();
        assert!(!c.complete(Value::Integer(1)));
        assert_eq!(hits.get(), 0);
        assert!(c.is_cancelled());
    }

    #[test]
    fn test_wake_queue_coalesces() {
        let q = WakeQueue::new();
        assert!(q.push(ThreadId(1)));
        assert!(!q.push(ThreadId(1)));
        assert!(q.push(ThreadId(2)));
        assert_eq!(q.len(), 2);
        assert_eq!(q.pop(), Some(ThreadId(1)));
        assert!(q.push(ThreadId(1)));
        assert_eq!(q.pop(), Some(ThreadId(2)));
        q.remove(ThreadId(1));
        assert!(q.is_empty());
    }
}
