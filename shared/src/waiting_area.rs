//! Bounded FIFO between arrivals and pumps.
//!
//! Three semaphores coordinate access:
//!
//! - `spaces` counts free slots and starts at the capacity,
//! - `mutex` is a binary semaphore guarding the queue itself,
//! - `ready` counts queued units and starts at zero.
//!
//! Producers go `spaces → mutex → push → ready`, consumers go
//! `ready → mutex → pop → spaces`. The queue is only ever touched while
//! `mutex` is held.

use std::{
    cell::UnsafeCell,
    collections::VecDeque,
    sync::atomic::{AtomicUsize, Ordering},
};

use tracing::trace;

use crate::{
    error::{EnterError, WaitError},
    sync::{Semaphore, Wait},
};

pub struct WaitingArea<T> {
    capacity: usize,
    queue: UnsafeCell<VecDeque<T>>,
    spaces: Semaphore,
    mutex: Semaphore,
    ready: Semaphore,
    high_water: AtomicUsize,
}

// The queue is only reached through `with_queue`, which holds `mutex`.
unsafe impl<T: Send> Sync for WaitingArea<T> {}

impl<T> WaitingArea<T> {
    /// # Panics
    ///
    /// If `capacity` is zero or does not fit a semaphore count. Configuration
    /// is validated before an area is built.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "waiting area needs at least one slot");
        let permits = u32::try_from(capacity).expect("capacity fits in u32");

        Self {
            capacity,
            queue: UnsafeCell::new(VecDeque::with_capacity(capacity)),
            spaces: Semaphore::new(permits),
            mutex: Semaphore::binary(),
            ready: Semaphore::new(0),
            high_water: AtomicUsize::new(0),
        }
    }

    /// Blocks until a slot is free, then appends `unit`. Returns the queue
    /// depth right after the append.
    pub fn enter(&self, unit: T) -> usize {
        self.spaces.acquire();
        self.push(unit, |_, _| {})
    }

    /// Like [`WaitingArea::enter`], but the wait for a free slot honours `wait`.
    ///
    /// `on_enqueued` runs inside the critical section with the new depth, so
    /// anything it records happens before a consumer can see the unit. On
    /// failure the unit is handed back.
    pub fn enter_with<F>(
        &self,
        unit: T,
        wait: Wait<'_>,
        on_enqueued: F,
    ) -> Result<usize, EnterError<T>>
    where
        F: FnOnce(&T, usize),
    {
        match self.spaces.acquire_with(wait) {
            Ok(()) => Ok(self.push(unit, on_enqueued)),
            Err(reason) => Err(EnterError { unit, reason }),
        }
    }

    /// Enters only if a slot is free right now. A full area hands the unit
    /// straight back.
    pub fn try_enter<F>(&self, unit: T, on_enqueued: F) -> Result<usize, T>
    where
        F: FnOnce(&T, usize),
    {
        if self.spaces.try_acquire() {
            Ok(self.push(unit, on_enqueued))
        } else {
            Err(unit)
        }
    }

    /// Blocks until a unit is queued and removes the head.
    pub fn take_next(&self) -> T {
        self.ready.acquire();
        self.pop(|_, _| {})
    }

    /// Like [`WaitingArea::take_next`], but the wait for a unit honours `wait`.
    ///
    /// `on_dequeued` runs inside the critical section with the depth left
    /// behind, so removals are observed in the same order as entries.
    pub fn take_next_with<F>(&self, wait: Wait<'_>, on_dequeued: F) -> Result<T, WaitError>
    where
        F: FnOnce(&T, usize),
    {
        self.ready.acquire_with(wait)?;
        Ok(self.pop(on_dequeued))
    }

    /// Makes blocked producers re-check their cancellation tokens.
    pub fn wake_producers(&self) {
        self.spaces.wake_waiters();
    }

    /// Makes blocked consumers re-check their cancellation tokens.
    pub fn wake_consumers(&self) {
        self.ready.wake_waiters();
    }

    pub fn len(&self) -> usize {
        self.with_queue(|queue| queue.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Deepest the queue has ever been.
    pub fn high_water(&self) -> usize {
        self.high_water.load(Ordering::Relaxed)
    }

    /// Producers currently blocked waiting for a slot.
    pub fn blocked_producers(&self) -> usize {
        self.spaces.waiters()
    }

    fn push(&self, unit: T, on_enqueued: impl FnOnce(&T, usize)) -> usize {
        let depth = self.with_queue(|queue| {
            queue.push_back(unit);
            let depth = queue.len();
            debug_assert!(depth <= self.capacity);
            if let Some(back) = queue.back() {
                on_enqueued(back, depth);
            }
            depth
        });
        self.high_water.fetch_max(depth, Ordering::Relaxed);
        trace!(depth, capacity = self.capacity, "waiting area: unit entered");
        self.ready.release();
        depth
    }

    fn pop(&self, on_dequeued: impl FnOnce(&T, usize)) -> T {
        let unit = self.with_queue(|queue| {
            let unit = queue
                .pop_front()
                .expect("a ready permit guarantees a queued unit");
            on_dequeued(&unit, queue.len());
            unit
        });
        self.spaces.release();
        unit
    }

    fn with_queue<R>(&self, f: impl FnOnce(&mut VecDeque<T>) -> R) -> R {
        let _mutex = self.mutex.guard();
        // Safety: `mutex` is held for the whole closure, so this is the only
        // live reference to the queue.
        let queue = unsafe { &mut *self.queue.get() };
        f(queue)
    }
}

impl<T> std::fmt::Debug for WaitingArea<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaitingArea")
            .field("capacity", &self.capacity)
            .field("high_water", &self.high_water())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod test {
    use std::{
        sync::{
            atomic::{AtomicBool, AtomicUsize, Ordering},
            Mutex,
        },
        thread,
        time::Duration,
    };

    use super::WaitingArea;
    use crate::{cancel::CancelToken, error::WaitError, sync::Wait};

    #[test]
    fn fifo_single_consumer() {
        let area = WaitingArea::new(4);
        for i in 0..4 {
            area.enter(i);
        }
        assert_eq!(area.len(), 4);
        let drained: Vec<_> = (0..4).map(|_| area.take_next()).collect();
        assert_eq!(drained, vec![0, 1, 2, 3]);
        assert!(area.is_empty());
    }

    #[test]
    fn enter_reports_depth() {
        let area = WaitingArea::new(3);
        assert_eq!(area.enter('a'), 1);
        assert_eq!(area.enter('b'), 2);
        area.take_next();
        assert_eq!(area.enter('c'), 2);
        assert_eq!(area.high_water(), 2);
    }

    #[test]
    fn full_area_blocks_until_drained() {
        let area = WaitingArea::new(1);
        area.enter(1);
        assert_eq!(area.try_enter(9, |_, _| {}), Err(9));

        thread::scope(|s| {
            let producer = s.spawn(|| area.enter(2));
            while area.blocked_producers() == 0 {
                thread::sleep(Duration::from_millis(1));
            }
            assert_eq!(area.take_next(), 1);
            assert_eq!(producer.join().unwrap(), 1);
        });
        assert_eq!(area.take_next(), 2);
    }

    #[test]
    fn capacity_never_exceeded() {
        const CAPACITY: usize = 3;
        const UNITS: usize = 200;

        let area = WaitingArea::new(CAPACITY);
        let done = AtomicBool::new(false);
        let max_seen = AtomicUsize::new(0);
        let taken = Mutex::new(Vec::new());

        thread::scope(|s| {
            for p in 0..4 {
                let area = &area;
                s.spawn(move || {
                    for i in 0..UNITS / 4 {
                        let depth = area.enter(p * 1000 + i);
                        assert!(depth <= CAPACITY);
                    }
                });
            }
            s.spawn(|| {
                while !done.load(Ordering::Relaxed) {
                    max_seen.fetch_max(area.len(), Ordering::Relaxed);
                }
            });
            let consumers: Vec<_> = (0..2)
                .map(|_| {
                    s.spawn(|| {
                        for _ in 0..UNITS / 2 {
                            let unit = area.take_next();
                            taken.lock().unwrap().push(unit);
                        }
                    })
                })
                .collect();
            for c in consumers {
                c.join().unwrap();
            }
            done.store(true, Ordering::Relaxed);
        });

        assert!(max_seen.load(Ordering::Relaxed) <= CAPACITY);
        assert!(area.high_water() <= CAPACITY);

        let mut taken = taken.into_inner().unwrap();
        taken.sort();
        let mut expected: Vec<_> = (0..4)
            .flat_map(|p| (0..UNITS / 4).map(move |i| p * 1000 + i))
            .collect();
        expected.sort();
        assert_eq!(taken, expected);
    }

    #[test]
    fn enter_timeout_hands_unit_back() {
        let area = WaitingArea::new(1);
        area.enter("first");
        let err = area
            .enter_with(
                "second",
                Wait::forever().with_timeout(Some(Duration::from_millis(10))),
                |_, _| {},
            )
            .unwrap_err();
        assert_eq!(err.reason, WaitError::TimedOut);
        assert_eq!(err.into_unit(), "second");
        assert_eq!(area.len(), 1);
    }

    #[test]
    fn enqueue_hook_sees_depth() {
        let area = WaitingArea::new(2);
        let mut seen = None;
        area.enter_with(7, Wait::forever(), |unit, depth| seen = Some((*unit, depth)))
            .unwrap();
        assert_eq!(seen, Some((7, 1)));
    }

    #[test]
    fn try_enter_takes_free_slot() {
        let area = WaitingArea::new(2);
        assert_eq!(area.try_enter('a', |_, _| {}), Ok(1));
        assert_eq!(area.try_enter('b', |_, _| {}), Ok(2));
        assert_eq!(area.try_enter('c', |_, _| {}), Err('c'));
        assert_eq!(area.take_next(), 'a');
        assert_eq!(area.try_enter('c', |_, _| {}), Ok(2));
    }

    #[test]
    fn dequeue_hook_tracks_depth_down_to_zero() {
        let area = WaitingArea::new(3);
        for unit in 1..=3 {
            area.enter(unit);
        }

        let mut seen = Vec::new();
        for _ in 0..3 {
            area.take_next_with(Wait::forever(), |unit, depth| seen.push((*unit, depth)))
                .unwrap();
        }
        assert_eq!(seen, vec![(1, 2), (2, 1), (3, 0)]);
        assert!(area.is_empty());
    }

    #[test]
    fn take_next_cancelled() {
        let area: WaitingArea<u32> = WaitingArea::new(2);
        let token = CancelToken::new();

        thread::scope(|s| {
            let consumer = s.spawn(|| area.take_next_with(Wait::cancellable(&token), |_, _| {}));
            while area.ready.waiters() == 0 {
                thread::sleep(Duration::from_millis(1));
            }
            token.cancel();
            area.wake_consumers();
            assert_eq!(consumer.join().unwrap(), Err(WaitError::Interrupted));
        });

        // The abandoned wait must not eat a later unit.
        area.enter(5);
        assert_eq!(area.take_next(), 5);
    }
}
