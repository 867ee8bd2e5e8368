use std::time::Duration;

use crate::{
    error::WaitError,
    events::{Emitter, Event, UnitId},
    sync::Wait,
    waiting_area::WaitingArea,
};

/// A unit of work: one car and the service time it needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Car {
    pub id: UnitId,
    pub service: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrivalOutcome {
    Entered { depth: usize },
    Abandoned(WaitError),
}

impl ArrivalOutcome {
    pub fn entered(&self) -> bool {
        matches!(self, ArrivalOutcome::Entered { .. })
    }
}

impl Car {
    /// Tries once to get into the waiting area, blocking while it is full.
    ///
    /// `ArrivalBlocked` is emitted only when no slot could be taken without
    /// waiting. There is no retry. With neither a timeout nor a cancellation
    /// token in `wait`, this blocks until some pump frees a slot.
    pub fn arrive(
        self,
        area: &WaitingArea<Car>,
        wait: Wait<'_>,
        emitter: &Emitter,
    ) -> ArrivalOutcome {
        let unit = self.id;
        emitter.emit(Event::ArrivalAttempted { unit });

        let on_enqueued = |car: &Car, depth| {
            emitter.emit(Event::ArrivalEntered {
                unit: car.id,
                depth,
            });
        };
        let entered = match area.try_enter(self, &on_enqueued) {
            Ok(depth) => Ok(depth),
            Err(car) => {
                emitter.emit(Event::ArrivalBlocked { unit });
                area.enter_with(car, wait, &on_enqueued)
            }
        };

        match entered {
            Ok(depth) => ArrivalOutcome::Entered { depth },
            Err(err) => {
                emitter.emit(Event::ArrivalAbandoned {
                    unit,
                    reason: err.reason,
                });
                ArrivalOutcome::Abandoned(err.reason)
            }
        }
    }
}
