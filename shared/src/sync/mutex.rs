use std::{
    cell::UnsafeCell,
    mem::MaybeUninit,
    ops::{Deref, DerefMut},
};

use libc::{
    pthread_mutex_destroy, pthread_mutex_init, pthread_mutex_lock, pthread_mutex_t,
    pthread_mutex_trylock, pthread_mutex_unlock, pthread_mutexattr_destroy,
    pthread_mutexattr_init, pthread_mutexattr_settype, PTHREAD_MUTEX_ERRORCHECK,
};

use super::check;

/// Thin wrapper around a process-private `pthread_mutex_t`.
///
/// The raw lock lives on the heap so the wrapper can be moved freely after
/// initialization. Error-checking mutexes are used so a relock from the
/// owning thread panics instead of deadlocking.
#[derive(Debug)]
pub struct Mutex<T> {
    inner: Box<UnsafeCell<MaybeUninit<pthread_mutex_t>>>,
    data: UnsafeCell<T>,
}

impl<T> Mutex<T> {
    pub fn new(data: T) -> Self {
        let inner = Box::new(UnsafeCell::new(MaybeUninit::uninit()));
        let mut attr = MaybeUninit::uninit();
        unsafe {
            check(pthread_mutexattr_init(attr.as_mut_ptr()), "mutexattr_init");
            check(
                pthread_mutexattr_settype(attr.as_mut_ptr(), PTHREAD_MUTEX_ERRORCHECK),
                "mutexattr_settype",
            );
            check(
                pthread_mutex_init((*inner.get()).as_mut_ptr(), attr.as_ptr()),
                "mutex_init",
            );
            pthread_mutexattr_destroy(attr.as_mut_ptr());
        }

        Self {
            inner,
            data: UnsafeCell::new(data),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, T> {
        unsafe {
            check(pthread_mutex_lock(self.raw()), "mutex_lock");
            MutexGuard {
                lock: self,
                data: &mut *self.data.get(),
            }
        }
    }

    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        unsafe {
            if pthread_mutex_trylock(self.raw()) != 0 {
                return None;
            }
            Some(MutexGuard {
                lock: self,
                data: &mut *self.data.get(),
            })
        }
    }

    fn raw(&self) -> *mut pthread_mutex_t {
        unsafe { (*self.inner.get()).as_mut_ptr() }
    }
}

impl<T: Default> Default for Mutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

pub struct MutexGuard<'a, T: 'a> {
    lock: &'a Mutex<T>,
    data: &'a mut T,
}

impl<'a, T: 'a> MutexGuard<'a, T> {
    pub(crate) fn raw_lock(&self) -> *mut pthread_mutex_t {
        self.lock.raw()
    }
}

impl<T> Deref for MutexGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        self.data
    }
}

impl<T> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.data
    }
}

impl<T> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        unsafe { check(pthread_mutex_unlock(self.lock.raw()), "mutex_unlock") }
    }
}

unsafe impl<T: Send> Send for Mutex<T> {}
unsafe impl<T: Send> Sync for Mutex<T> {}

impl<T> Drop for Mutex<T> {
    fn drop(&mut self) {
        unsafe { check(pthread_mutex_destroy(self.raw()), "mutex_destroy") }
    }
}

#[cfg(test)]
mod test {
    use std::thread;

    use super::Mutex;

    #[test]
    fn counter() {
        let counter = Mutex::new(0usize);
        thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..1000 {
                        *counter.lock() += 1;
                    }
                });
            }
        });
        assert_eq!(*counter.lock(), 8000);
    }

    #[test]
    fn try_lock_while_held() {
        let m = Mutex::new(());
        let guard = m.lock();
        thread::scope(|s| {
            s.spawn(|| assert!(m.try_lock().is_none()));
        });
        drop(guard);
        assert!(m.try_lock().is_some());
    }
}
