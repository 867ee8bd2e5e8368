//! State transitions emitted by the core.
//!
//! Renderers subscribe through an [`EventSink`]; the core never looks at how
//! events are displayed.

use std::{
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

use crossbeam_channel::Sender;

use crate::{error::WaitError, sync::Mutex};

pub type UnitId = u32;
pub type WorkerId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    ArrivalAttempted { unit: UnitId },
    /// No slot was free at the first attempt; the arrival is about to block.
    ArrivalBlocked { unit: UnitId },
    ArrivalEntered { unit: UnitId, depth: usize },
    ArrivalAbandoned { unit: UnitId, reason: WaitError },
    /// A pump took the unit off the queue; `depth` is what is left behind.
    /// Service starts once the pump also holds a bay.
    UnitDequeued { worker: WorkerId, unit: UnitId, depth: usize },
    ServiceStarted { worker: WorkerId, unit: UnitId },
    ServiceFinished { worker: WorkerId, unit: UnitId },
    WorkerShutdown { worker: WorkerId },
}

impl Event {
    pub fn unit(&self) -> Option<UnitId> {
        match *self {
            Event::ArrivalAttempted { unit }
            | Event::ArrivalBlocked { unit }
            | Event::ArrivalEntered { unit, .. }
            | Event::ArrivalAbandoned { unit, .. }
            | Event::UnitDequeued { unit, .. }
            | Event::ServiceStarted { unit, .. }
            | Event::ServiceFinished { unit, .. } => Some(unit),
            Event::WorkerShutdown { .. } => None,
        }
    }

    pub fn worker(&self) -> Option<WorkerId> {
        match *self {
            Event::UnitDequeued { worker, .. }
            | Event::ServiceStarted { worker, .. }
            | Event::ServiceFinished { worker, .. }
            | Event::WorkerShutdown { worker } => Some(worker),
            _ => None,
        }
    }

    /// Short machine-readable name, used as the `kind` column of traces.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::ArrivalAttempted { .. } => "arrival-attempted",
            Event::ArrivalBlocked { .. } => "arrival-blocked",
            Event::ArrivalEntered { .. } => "arrival-entered",
            Event::ArrivalAbandoned { .. } => "arrival-abandoned",
            Event::UnitDequeued { .. } => "unit-dequeued",
            Event::ServiceStarted { .. } => "service-started",
            Event::ServiceFinished { .. } => "service-finished",
            Event::WorkerShutdown { .. } => "worker-shutdown",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::ArrivalAttempted { unit } => write!(f, "C{unit} arrived"),
            Event::ArrivalBlocked { unit } => write!(f, "C{unit} waiting for space"),
            Event::ArrivalEntered { unit, depth } => {
                write!(f, "C{unit} entered waiting area (depth {depth})")
            }
            Event::ArrivalAbandoned { unit, reason } => write!(f, "C{unit} left: {reason}"),
            Event::UnitDequeued { unit, depth, .. } => {
                write!(f, "C{unit} leaves waiting area for service (depth {depth})")
            }
            Event::ServiceStarted { worker, unit } => {
                write!(f, "Pump {worker}: C{unit} begins service")
            }
            Event::ServiceFinished { worker, unit } => {
                write!(f, "Pump {worker}: C{unit} finishes service")
            }
            Event::WorkerShutdown { worker } => write!(f, "Pump {worker}: shut down"),
        }
    }
}

/// An event plus the time elapsed since the run started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record {
    pub at: Duration,
    pub event: Event,
}

pub trait EventSink: Send + Sync {
    fn record(&self, record: Record);
}

impl EventSink for Sender<Record> {
    fn record(&self, record: Record) {
        // A renderer that went away is not the core's problem.
        let _ = self.send(record);
    }
}

/// Drops everything.
#[derive(Debug, Default)]
pub struct Discard;

impl EventSink for Discard {
    fn record(&self, _record: Record) {}
}

/// Keeps every record in memory, in emission order.
#[derive(Debug, Default)]
pub struct Recorder {
    records: Mutex<Vec<Record>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<Record> {
        self.records.lock().clone()
    }

    pub fn events(&self) -> Vec<Event> {
        self.records.lock().iter().map(|r| r.event).collect()
    }
}

impl EventSink for Recorder {
    fn record(&self, record: Record) {
        self.records.lock().push(record);
    }
}

/// Stamps events relative to a fixed start and forwards them to a sink.
#[derive(Clone)]
pub struct Emitter {
    start: Instant,
    sink: Arc<dyn EventSink>,
}

impl Emitter {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            start: Instant::now(),
            sink,
        }
    }

    pub fn emit(&self, event: Event) {
        self.sink.record(Record {
            at: self.start.elapsed(),
            event,
        });
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl fmt::Debug for Emitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter").field("start", &self.start).finish()
    }
}
