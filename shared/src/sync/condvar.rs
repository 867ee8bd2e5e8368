use std::{cell::UnsafeCell, mem::MaybeUninit, time::Duration};

use libc::{
    clock_gettime, pthread_cond_broadcast, pthread_cond_destroy, pthread_cond_init,
    pthread_cond_signal, pthread_cond_t, pthread_cond_timedwait, pthread_cond_wait,
    pthread_condattr_destroy, pthread_condattr_init, pthread_condattr_setclock, timespec,
    CLOCK_MONOTONIC, ETIMEDOUT,
};

use super::{check, MutexGuard};

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Condition variable paired with [`super::Mutex`].
///
/// Timed waits are measured against `CLOCK_MONOTONIC`, so wall clock jumps
/// neither shorten nor extend them.
#[derive(Debug)]
pub struct Condvar {
    inner: Box<UnsafeCell<MaybeUninit<pthread_cond_t>>>,
}

impl Condvar {
    pub fn new() -> Self {
        let inner = Box::new(UnsafeCell::new(MaybeUninit::uninit()));
        let mut attr = MaybeUninit::uninit();
        unsafe {
            check(pthread_condattr_init(attr.as_mut_ptr()), "condattr_init");
            check(
                pthread_condattr_setclock(attr.as_mut_ptr(), CLOCK_MONOTONIC),
                "condattr_setclock",
            );
            check(
                pthread_cond_init((*inner.get()).as_mut_ptr(), attr.as_ptr()),
                "cond_init",
            );
            pthread_condattr_destroy(attr.as_mut_ptr());
        }

        Self { inner }
    }

    pub fn signal(&self) {
        unsafe { check(pthread_cond_signal(self.raw()), "cond_signal") }
    }

    pub fn broadcast(&self) {
        unsafe { check(pthread_cond_broadcast(self.raw()), "cond_broadcast") }
    }

    pub fn wait<'m, T>(&self, guard: MutexGuard<'m, T>) -> MutexGuard<'m, T> {
        unsafe { check(pthread_cond_wait(self.raw(), guard.raw_lock()), "cond_wait") }
        guard
    }

    /// Waits for a signal or until `timeout` has passed.
    ///
    /// The returned flag is `true` when the wait ended because of the timeout.
    /// The lock is held again in both cases.
    pub fn wait_timeout<'m, T>(
        &self,
        guard: MutexGuard<'m, T>,
        timeout: Duration,
    ) -> (MutexGuard<'m, T>, bool) {
        let deadline = deadline_after(timeout);
        let result = unsafe { pthread_cond_timedwait(self.raw(), guard.raw_lock(), &deadline) };
        match result {
            0 => (guard, false),
            ETIMEDOUT => (guard, true),
            e => panic!("failed to wait for condvar: {e}"),
        }
    }

    fn raw(&self) -> *mut pthread_cond_t {
        unsafe { (*self.inner.get()).as_mut_ptr() }
    }
}

impl Default for Condvar {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl Send for Condvar {}
unsafe impl Sync for Condvar {}

impl Drop for Condvar {
    fn drop(&mut self) {
        unsafe { check(pthread_cond_destroy(self.raw()), "cond_destroy") }
    }
}

fn deadline_after(timeout: Duration) -> timespec {
    let mut now = MaybeUninit::<timespec>::uninit();
    let now = unsafe {
        check(clock_gettime(CLOCK_MONOTONIC, now.as_mut_ptr()), "clock_gettime");
        now.assume_init()
    };

    let secs = i64::try_from(timeout.as_secs()).unwrap_or(i64::MAX / 2);
    let mut tv_sec = (now.tv_sec as i64).saturating_add(secs);
    let mut tv_nsec = now.tv_nsec as i64 + i64::from(timeout.subsec_nanos());
    if tv_nsec >= NANOS_PER_SEC {
        tv_sec = tv_sec.saturating_add(1);
        tv_nsec -= NANOS_PER_SEC;
    }

    timespec {
        tv_sec: tv_sec as libc::time_t,
        tv_nsec: tv_nsec as libc::c_long,
    }
}
