use std::{
    io,
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};

use tracing::debug;

use crate::{
    arrival::Car,
    cancel::CancelToken,
    error::WaitError,
    events::{Emitter, Event, WorkerId},
    in_flight::InFlight,
    sync::{Semaphore, Wait},
    waiting_area::WaitingArea,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PumpState {
    WaitingForUnit = 0,
    Servicing = 1,
    ShuttingDown = 2,
}

impl PumpState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => PumpState::WaitingForUnit,
            1 => PumpState::Servicing,
            _ => PumpState::ShuttingDown,
        }
    }
}

/// A service worker. Drains the waiting area one car at a time.
pub struct Pump {
    id: WorkerId,
    area: Arc<WaitingArea<Car>>,
    bays: Arc<Semaphore>,
    in_flight: Arc<InFlight>,
    emitter: Emitter,
    state: Arc<AtomicU8>,
}

impl Pump {
    pub fn new(
        id: WorkerId,
        area: Arc<WaitingArea<Car>>,
        bays: Arc<Semaphore>,
        in_flight: Arc<InFlight>,
        emitter: Emitter,
    ) -> Self {
        Self {
            id,
            area,
            bays,
            in_flight,
            emitter,
            state: Arc::new(AtomicU8::new(PumpState::WaitingForUnit as u8)),
        }
    }

    /// Starts the pump on its own thread. Cancelling `cancel` stops it after
    /// the car it is servicing, if any.
    pub fn spawn(self, cancel: CancelToken) -> io::Result<PumpHandle> {
        let id = self.id;
        let state = self.state.clone();

        let area = self.area.clone();
        cancel.on_cancel(move || area.wake_consumers());

        let token = cancel.clone();
        let thread = thread::Builder::new()
            .name(format!("pump-{id}"))
            .spawn(move || self.run(&token))?;

        Ok(PumpHandle {
            id,
            cancel,
            state,
            thread,
        })
    }

    /// Returns the number of cars serviced.
    fn run(&self, cancel: &CancelToken) -> usize {
        debug!(pump = self.id, "pump ready");
        let mut serviced = 0;

        while !cancel.is_cancelled() {
            self.set_state(PumpState::WaitingForUnit);
            let dequeued = self.area.take_next_with(Wait::cancellable(cancel), |car, depth| {
                self.emitter.emit(Event::UnitDequeued {
                    worker: self.id,
                    unit: car.id,
                    depth,
                });
            });
            let car = match dequeued {
                Ok(car) => car,
                Err(WaitError::Interrupted) => break,
                Err(WaitError::TimedOut) => continue,
            };
            // Dequeued: serviced to completion whatever happens to `cancel`.
            self.service(car);
            serviced += 1;
        }

        self.set_state(PumpState::ShuttingDown);
        debug!(pump = self.id, serviced, "pump shutting down");
        self.emitter.emit(Event::WorkerShutdown { worker: self.id });
        serviced
    }

    fn service(&self, car: Car) {
        self.set_state(PumpState::Servicing);
        let bay = self.bays.guard();
        self.emitter.emit(Event::ServiceStarted {
            worker: self.id,
            unit: car.id,
        });

        thread::sleep(car.service);

        self.emitter.emit(Event::ServiceFinished {
            worker: self.id,
            unit: car.id,
        });
        drop(bay);
        self.in_flight.finish();
    }

    fn set_state(&self, state: PumpState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

pub struct PumpHandle {
    id: WorkerId,
    cancel: CancelToken,
    state: Arc<AtomicU8>,
    thread: JoinHandle<usize>,
}

impl PumpHandle {
    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn state(&self) -> PumpState {
        PumpState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Asks the pump to stop. Returns `false` if it had already been asked.
    pub fn cancel(&self) -> bool {
        self.cancel.cancel()
    }

    /// Waits for the pump to exit and returns how many cars it serviced.
    pub fn join(self) -> usize {
        self.thread
            .join()
            .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
    }
}
