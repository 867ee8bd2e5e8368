//! Lifecycle of one simulation run.
//!
//! Pumps start first, then cars arrive one by one with the configured delay.
//! Once every car has made its single entry attempt, the station waits for
//! the in-flight count to drain. After that it stops the pumps and reports.

use std::{
    fmt,
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use rand::{rngs::StdRng, SeedableRng};
use tracing::{debug, info, warn};

use crate::{
    arrival::{ArrivalOutcome, Car},
    cancel::CancelToken,
    config::StationConfig,
    error::{ConfigError, StationError},
    events::{Emitter, EventSink},
    in_flight::InFlight,
    pump::{Pump, PumpHandle},
    sync::{Semaphore, Wait},
    waiting_area::WaitingArea,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub arrivals: usize,
    pub entered: usize,
    pub abandoned: usize,
    pub serviced: usize,
    /// Cars still queued when the run ended. Only non-zero after a cancel.
    pub unserviced: usize,
    pub peak_depth: usize,
    /// Cars serviced by each pump, pump 1 first.
    pub per_pump: Vec<usize>,
    pub elapsed: Duration,
    pub cancelled: bool,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} cars arrived, {} entered, {} left without entering",
            self.arrivals, self.entered, self.abandoned
        )?;
        writeln!(
            f,
            "{} serviced, {} still waiting, peak waiting area depth {}",
            self.serviced, self.unserviced, self.peak_depth
        )?;
        for (i, n) in self.per_pump.iter().enumerate() {
            writeln!(f, "Pump {}: {} cars", i + 1, n)?;
        }
        write!(f, "finished in {:.1}s", self.elapsed.as_secs_f64())?;
        if self.cancelled {
            write!(f, " (cancelled)")?;
        }
        Ok(())
    }
}

pub struct Station {
    config: StationConfig,
    sink: Arc<dyn EventSink>,
}

impl Station {
    pub fn new(config: StationConfig, sink: Arc<dyn EventSink>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config, sink })
    }

    pub fn config(&self) -> &StationConfig {
        &self.config
    }

    pub fn run(&self) -> Result<Report, StationError> {
        self.run_until(&CancelToken::new())
    }

    /// Runs the simulation to completion, or until `cancel` fires.
    ///
    /// On cancellation no more cars arrive, blocked arrivals give up, and each
    /// pump finishes the car it is servicing before exiting.
    pub fn run_until(&self, cancel: &CancelToken) -> Result<Report, StationError> {
        let config = &self.config;
        let emitter = Emitter::new(self.sink.clone());

        let area = Arc::new(WaitingArea::new(config.waiting_capacity));
        let bays = Arc::new(Semaphore::new(permits(config.bays())?));
        let in_flight = Arc::new(InFlight::new());

        let run = cancel.child();
        {
            let area = area.clone();
            let in_flight = in_flight.clone();
            run.on_cancel(move || {
                area.wake_producers();
                in_flight.wake();
            });
        }

        info!(
            capacity = config.waiting_capacity,
            pumps = config.pumps,
            bays = config.bays(),
            arrivals = config.arrivals,
            "station opening"
        );

        let pumps = start_pumps(config.pumps, &area, &bays, &in_flight, &emitter, &run)?;

        let (arrivals, spawn_error) = self.feed(&area, &in_flight, &emitter, &run);
        if let Some(err) = &spawn_error {
            warn!("aborting run: {err}");
            run.cancel();
        }

        let outcomes: Vec<ArrivalOutcome> = arrivals
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
            })
            .collect();
        debug!(count = outcomes.len(), "all arrivals done");

        if in_flight.wait_idle(&run) {
            debug!("waiting area drained, pumps idle");
        }

        for pump in &pumps {
            if pump.cancel() {
                debug!(pump = pump.id(), "stopping pump");
            }
        }
        let per_pump: Vec<usize> = pumps.into_iter().map(PumpHandle::join).collect();

        if let Some(err) = spawn_error {
            return Err(err);
        }

        let entered = outcomes.iter().filter(|o| o.entered()).count();
        let report = Report {
            arrivals: outcomes.len(),
            entered,
            abandoned: outcomes.len() - entered,
            serviced: per_pump.iter().sum(),
            unserviced: area.len(),
            peak_depth: area.high_water(),
            per_pump,
            elapsed: emitter.elapsed(),
            cancelled: run.is_cancelled(),
        };
        info!(
            serviced = report.serviced,
            abandoned = report.abandoned,
            cancelled = report.cancelled,
            "station closed"
        );
        Ok(report)
    }

    fn feed(
        &self,
        area: &Arc<WaitingArea<Car>>,
        in_flight: &Arc<InFlight>,
        emitter: &Emitter,
        run: &CancelToken,
    ) -> (Vec<JoinHandle<ArrivalOutcome>>, Option<StationError>) {
        let config = &self.config;
        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut handles = Vec::with_capacity(config.arrivals);

        for id in (1..).take(config.arrivals) {
            if id > 1 && run.sleep(config.arrival_interval) {
                break;
            }
            if run.is_cancelled() {
                break;
            }

            let car = Car {
                id,
                service: config.service.sample(&mut rng),
            };
            in_flight.begin();

            match spawn_arrival(car, area, in_flight, emitter, run, config.entry_timeout) {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    in_flight.finish();
                    return (handles, Some(err));
                }
            }
        }

        (handles, None)
    }
}

fn spawn_arrival(
    car: Car,
    area: &Arc<WaitingArea<Car>>,
    in_flight: &Arc<InFlight>,
    emitter: &Emitter,
    run: &CancelToken,
    entry_timeout: Option<Duration>,
) -> Result<JoinHandle<ArrivalOutcome>, StationError> {
    let id = car.id;
    let area = area.clone();
    let in_flight = in_flight.clone();
    let emitter = emitter.clone();
    let run = run.clone();

    thread::Builder::new()
        .name(format!("car-{id}"))
        .spawn(move || {
            let wait = Wait::cancellable(&run).with_timeout(entry_timeout);
            let outcome = car.arrive(&area, wait, &emitter);
            if !outcome.entered() {
                in_flight.finish();
            }
            outcome
        })
        .map_err(|source| StationError::Spawn {
            what: format!("car {id}"),
            source,
        })
}

fn start_pumps(
    count: usize,
    area: &Arc<WaitingArea<Car>>,
    bays: &Arc<Semaphore>,
    in_flight: &Arc<InFlight>,
    emitter: &Emitter,
    run: &CancelToken,
) -> Result<Vec<PumpHandle>, StationError> {
    let mut pumps = Vec::with_capacity(count);
    for id in (1..).take(count) {
        let pump = Pump::new(id, area.clone(), bays.clone(), in_flight.clone(), emitter.clone());
        match pump.spawn(run.child()) {
            Ok(handle) => pumps.push(handle),
            Err(source) => {
                for pump in pumps {
                    pump.cancel();
                    pump.join();
                }
                return Err(StationError::Spawn {
                    what: format!("pump {id}"),
                    source,
                });
            }
        }
    }
    Ok(pumps)
}

fn permits(n: usize) -> Result<u32, ConfigError> {
    u32::try_from(n).map_err(|_| ConfigError::TooLarge {
        what: "bays",
        value: n,
    })
}
