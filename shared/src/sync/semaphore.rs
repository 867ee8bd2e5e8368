use std::time::{Duration, Instant};

use tracing::{trace, warn};

use crate::{cancel::CancelToken, error::WaitError};

use super::{Condvar, Mutex};

/// How long, and under which cancellation, a blocking acquire may wait.
#[derive(Debug, Clone, Copy, Default)]
pub struct Wait<'a> {
    pub cancel: Option<&'a CancelToken>,
    pub timeout: Option<Duration>,
}

impl<'a> Wait<'a> {
    pub fn forever() -> Self {
        Self::default()
    }

    pub fn cancellable(token: &'a CancelToken) -> Self {
        Self {
            cancel: Some(token),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_some_and(CancelToken::is_cancelled)
    }
}

#[derive(Debug)]
struct State {
    /// Negative values count the threads blocked in `acquire`.
    value: i64,
    /// Releases handed to blocked threads that have not woken up yet.
    wakeups: u64,
}

/// Counting semaphore with classic P/V semantics.
///
/// A `release` with nobody waiting is banked in the counter, so a later
/// `acquire` returns immediately. Each `release` that finds the counter
/// negative hands exactly one wakeup to a blocked thread. Which thread gets it
/// is up to the scheduler.
#[derive(Debug)]
pub struct Semaphore {
    state: Mutex<State>,
    cond: Condvar,
    ceiling: Option<i64>,
}

impl Semaphore {
    pub fn new(permits: u32) -> Self {
        Self {
            state: Mutex::new(State {
                value: i64::from(permits),
                wakeups: 0,
            }),
            cond: Condvar::new(),
            ceiling: None,
        }
    }

    /// One permit, never more. Used as a lock.
    pub fn binary() -> Self {
        Self {
            ceiling: Some(1),
            ..Self::new(1)
        }
    }

    pub fn acquire(&self) {
        let mut state = self.state.lock();
        state.value -= 1;
        if state.value >= 0 {
            return;
        }

        trace!(waiters = -state.value, "semaphore: blocking");
        while state.wakeups == 0 {
            state = self.cond.wait(state);
        }
        state.wakeups -= 1;
    }

    /// Like [`Semaphore::acquire`], but gives up on cancellation or timeout.
    ///
    /// A token that is already cancelled fails fast without touching the
    /// counter. A permit handed over while the waiter was being cancelled is
    /// still taken, so no release is ever lost.
    pub fn acquire_with(&self, wait: Wait<'_>) -> Result<(), WaitError> {
        if wait.is_cancelled() {
            return Err(WaitError::Interrupted);
        }
        // A timeout too long to represent is the same as none.
        let deadline = wait.timeout.and_then(|t| Instant::now().checked_add(t));

        let mut state = self.state.lock();
        state.value -= 1;
        if state.value >= 0 {
            return Ok(());
        }

        trace!(waiters = -state.value, "semaphore: blocking");
        loop {
            if state.wakeups > 0 {
                state.wakeups -= 1;
                return Ok(());
            }
            if wait.is_cancelled() {
                state.value += 1;
                return Err(WaitError::Interrupted);
            }
            state = match deadline {
                None => self.cond.wait(state),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        state.value += 1;
                        return Err(WaitError::TimedOut);
                    }
                    self.cond.wait_timeout(state, deadline - now).0
                }
            };
        }
    }

    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock();
        if state.value > 0 {
            state.value -= 1;
            true
        } else {
            false
        }
    }

    pub fn release(&self) {
        let mut state = self.state.lock();
        if self.ceiling.is_some_and(|c| state.value >= c) {
            warn!(value = state.value, "semaphore: release above ceiling ignored");
            return;
        }
        state.value += 1;
        if state.value <= 0 {
            state.wakeups += 1;
            self.cond.signal();
        }
    }

    /// Acquires and returns a guard that releases on drop.
    pub fn guard(&self) -> SemaphoreGuard<'_> {
        self.acquire();
        SemaphoreGuard { sem: self }
    }

    /// Wakes every blocked thread so it re-checks its cancellation token.
    /// No permits are granted.
    pub fn wake_waiters(&self) {
        let _state = self.state.lock();
        self.cond.broadcast();
    }

    pub fn value(&self) -> i64 {
        self.state.lock().value
    }

    pub fn waiters(&self) -> usize {
        usize::try_from(-self.value()).unwrap_or(0)
    }
}

#[must_use = "the permit is released as soon as the guard is dropped"]
pub struct SemaphoreGuard<'a> {
    sem: &'a Semaphore,
}

impl Drop for SemaphoreGuard<'_> {
    fn drop(&mut self) {
        self.sem.release();
    }
}

#[cfg(test)]
mod test {
    use std::{
        sync::atomic::{AtomicUsize, Ordering::SeqCst},
        thread,
        time::Duration,
    };

    use super::{Semaphore, Wait};
    use crate::{cancel::CancelToken, error::WaitError};

    fn wait_for_waiters(sem: &Semaphore, n: usize) {
        while sem.waiters() < n {
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn release_is_banked() {
        let sem = Semaphore::new(0);
        assert!(!sem.try_acquire());
        sem.release();
        sem.release();
        assert_eq!(sem.value(), 2);
        sem.acquire();
        assert!(sem.try_acquire());
        assert!(!sem.try_acquire());
    }

    #[test]
    fn negative_value_counts_waiters() {
        let sem = Semaphore::new(0);
        thread::scope(|s| {
            for _ in 0..3 {
                s.spawn(|| sem.acquire());
            }
            wait_for_waiters(&sem, 3);
            assert_eq!(sem.value(), -3);
            for _ in 0..3 {
                sem.release();
            }
        });
        assert_eq!(sem.value(), 0);
    }

    #[test]
    fn limits_concurrency() {
        let sem = Semaphore::new(2);
        let active = AtomicUsize::new(0);
        let max_active = AtomicUsize::new(0);

        thread::scope(|s| {
            for _ in 0..10 {
                s.spawn(|| {
                    let _permit = sem.guard();
                    let current = active.fetch_add(1, SeqCst) + 1;
                    max_active.fetch_max(current, SeqCst);
                    thread::sleep(Duration::from_millis(5));
                    active.fetch_sub(1, SeqCst);
                });
            }
        });

        assert!(max_active.load(SeqCst) <= 2);
        assert_eq!(sem.value(), 2);
    }

    #[test]
    fn binary_never_exceeds_one() {
        let sem = Semaphore::binary();
        sem.release();
        assert_eq!(sem.value(), 1);

        let guard = sem.guard();
        assert!(!sem.try_acquire());
        drop(guard);
        assert!(sem.try_acquire());
    }

    #[test]
    fn timeout_gives_back_decrement() {
        let sem = Semaphore::new(0);
        let res = sem.acquire_with(Wait::forever().with_timeout(Some(Duration::from_millis(20))));
        assert_eq!(res, Err(WaitError::TimedOut));
        assert_eq!(sem.value(), 0);

        sem.release();
        assert!(sem.try_acquire());
    }

    #[test]
    fn unbounded_timeout_still_acquires() {
        let sem = Semaphore::new(1);
        let wait = || Wait::forever().with_timeout(Some(Duration::MAX));
        assert_eq!(sem.acquire_with(wait()), Ok(()));

        thread::scope(|s| {
            let waiter = s.spawn(|| sem.acquire_with(wait()));
            wait_for_waiters(&sem, 1);
            sem.release();
            assert_eq!(waiter.join().unwrap(), Ok(()));
        });
        assert_eq!(sem.value(), 0);
    }

    #[test]
    fn cancellation_interrupts_waiter() {
        let sem = Semaphore::new(0);
        let token = CancelToken::new();

        thread::scope(|s| {
            let waiter = s.spawn(|| sem.acquire_with(Wait::cancellable(&token)));
            wait_for_waiters(&sem, 1);
            token.cancel();
            sem.wake_waiters();
            assert_eq!(waiter.join().unwrap(), Err(WaitError::Interrupted));
        });
        assert_eq!(sem.value(), 0);
    }

    #[test]
    fn cancelled_token_fails_fast() {
        let sem = Semaphore::new(3);
        let token = CancelToken::new();
        token.cancel();
        assert_eq!(
            sem.acquire_with(Wait::cancellable(&token)),
            Err(WaitError::Interrupted)
        );
        assert_eq!(sem.value(), 3);
    }
}
