//! Cooperative cancellation.
//!
//! A [`CancelToken`] is a shared flag plus a list of wake-up callbacks. Blocking
//! code checks the flag under its own lock; the callbacks are how a canceller
//! reaches threads that are parked on some other condition variable.

use std::{
    fmt,
    mem,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use crate::sync::{Condvar, Mutex};

type Callback = Box<dyn FnOnce() + Send>;

#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

struct Inner {
    cancelled: AtomicBool,
    callbacks: Mutex<Callbacks>,
    cond: Condvar,
    /// Registration this token holds on its parent, removed when the last
    /// clone goes away.
    parent: Option<(Arc<Inner>, u64)>,
}

#[derive(Default)]
struct Callbacks {
    next_id: u64,
    list: Vec<(u64, Callback)>,
}

impl Callbacks {
    fn push(&mut self, f: Callback) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.list.push((id, f));
        id
    }
}

impl Inner {
    fn new(cancelled: bool, parent: Option<(Arc<Inner>, u64)>) -> Self {
        Self {
            cancelled: AtomicBool::new(cancelled),
            callbacks: Mutex::new(Callbacks::default()),
            cond: Condvar::new(),
            parent,
        }
    }

    fn cancel(&self) -> bool {
        let mut callbacks = self.callbacks.lock();
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return false;
        }
        let pending = mem::take(&mut callbacks.list);
        self.cond.broadcast();
        drop(callbacks);

        for (_, callback) in pending {
            callback();
        }
        true
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some((parent, id)) = self.parent.take() {
            parent.callbacks.lock().list.retain(|(i, _)| *i != id);
        }
    }
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner::new(false, None)),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Cancels the token and runs every registered callback once.
    ///
    /// Returns `false` if the token was already cancelled; repeated calls are no-ops.
    pub fn cancel(&self) -> bool {
        self.inner.cancel()
    }

    /// Registers `f` to run on cancellation. Runs it immediately if the token
    /// is already cancelled.
    ///
    /// The callback lives as long as this token does. Anything it captures is
    /// released on cancellation or when the last clone is dropped.
    pub fn on_cancel(&self, f: impl FnOnce() + Send + 'static) {
        let mut callbacks = self.inner.callbacks.lock();
        if self.is_cancelled() {
            drop(callbacks);
            f();
            return;
        }
        callbacks.push(Box::new(f));
    }

    /// A token that is cancelled together with `self`, but can also be
    /// cancelled on its own.
    ///
    /// The parent only keeps a weak link to the child. Dropping every clone
    /// of the child (and of its own children) removes that link again.
    pub fn child(&self) -> CancelToken {
        let mut callbacks = self.inner.callbacks.lock();
        if self.is_cancelled() {
            return Self {
                inner: Arc::new(Inner::new(true, None)),
            };
        }

        let id = callbacks.next_id;
        let inner = Arc::new(Inner::new(false, Some((self.inner.clone(), id))));
        let child = Arc::downgrade(&inner);
        let registered = callbacks.push(Box::new(move || {
            if let Some(child) = child.upgrade() {
                child.cancel();
            }
        }));
        debug_assert_eq!(registered, id);
        drop(callbacks);

        Self { inner }
    }

    /// Sleeps for `duration` unless cancelled first. Returns `true` if the
    /// token was cancelled.
    ///
    /// A duration too long to represent as a deadline sleeps until cancelled.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now().checked_add(duration);
        let mut guard = self.inner.callbacks.lock();
        while !self.is_cancelled() {
            guard = match deadline {
                None => self.inner.cond.wait(guard),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    self.inner.cond.wait_timeout(guard, deadline - now).0
                }
            };
        }
        self.is_cancelled()
    }

    #[cfg(test)]
    pub(crate) fn registered(&self) -> usize {
        self.inner.callbacks.lock().list.len()
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
