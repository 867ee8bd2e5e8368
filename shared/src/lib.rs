//! Concurrency core of the service station simulation.
//!
//! Cars are produced into a bounded [`WaitingArea`] and drained by a pool of
//! [`Pump`]s. A [`Station`] owns one run from start to orderly shutdown and
//! reports every state change through an [`EventSink`].

pub mod arrival;
pub mod cancel;
pub mod config;
pub mod error;
pub mod events;
pub mod in_flight;
pub mod pump;
pub mod station;
pub mod sync;
pub mod waiting_area;

pub use arrival::{ArrivalOutcome, Car};
pub use cancel::CancelToken;
pub use config::{ServiceTime, StationConfig};
pub use error::{ConfigError, EnterError, StationError, WaitError};
pub use events::{Discard, Emitter, Event, EventSink, Record, Recorder, UnitId, WorkerId};
pub use in_flight::InFlight;
pub use pump::{Pump, PumpHandle, PumpState};
pub use station::{Report, Station};
pub use waiting_area::WaitingArea;
