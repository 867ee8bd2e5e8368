use crate::{
    cancel::CancelToken,
    sync::{Condvar, Mutex},
};

/// Counts cars that have shown up but are not done yet, either serviced or
/// gone. Reaching zero after the last arrival means the queue is empty and
/// every pump is idle.
#[derive(Debug, Default)]
pub struct InFlight {
    count: Mutex<usize>,
    idle: Condvar,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) {
        *self.count.lock() += 1;
    }

    pub fn finish(&self) {
        let mut count = self.count.lock();
        *count = count
            .checked_sub(1)
            .expect("finish called more often than begin");
        if *count == 0 {
            self.idle.broadcast();
        }
    }

    pub fn count(&self) -> usize {
        *self.count.lock()
    }

    /// Blocks until the count drops to zero. Returns `false` if `cancel`
    /// fired first; pair it with [`InFlight::wake`] in a cancel callback.
    pub fn wait_idle(&self, cancel: &CancelToken) -> bool {
        let mut count = self.count.lock();
        while *count > 0 {
            if cancel.is_cancelled() {
                return false;
            }
            count = self.idle.wait(count);
        }
        true
    }

    pub fn wake(&self) {
        let _count = self.count.lock();
        self.idle.broadcast();
    }
}
