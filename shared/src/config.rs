use std::time::Duration;

use rand::Rng;

use crate::error::ConfigError;

/// How long a pump spends on one car.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceTime {
    Fixed(Duration),
    /// Drawn per car, uniformly from `min..=max`.
    Uniform { min: Duration, max: Duration },
}

impl ServiceTime {
    pub fn sample(&self, rng: &mut impl Rng) -> Duration {
        match *self {
            ServiceTime::Fixed(d) => d,
            ServiceTime::Uniform { min, max } => rng.gen_range(min..=max),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationConfig {
    /// Slots in the waiting area.
    pub waiting_capacity: usize,
    pub pumps: usize,
    /// Service bays shared by the pumps. Defaults to one per pump.
    pub bays: Option<usize>,
    pub arrivals: usize,
    pub service: ServiceTime,
    /// Delay between two consecutive arrivals.
    pub arrival_interval: Duration,
    /// How long an arrival waits for a slot before leaving. `None` waits forever.
    pub entry_timeout: Option<Duration>,
    /// Seed for per-car service times.
    pub seed: u64,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            waiting_capacity: 5,
            pumps: 3,
            bays: None,
            arrivals: 10,
            service: ServiceTime::Fixed(Duration::from_millis(2000)),
            arrival_interval: Duration::from_millis(500),
            entry_timeout: None,
            seed: 0,
        }
    }
}

impl StationConfig {
    pub fn bays(&self) -> usize {
        self.bays.unwrap_or(self.pumps)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.waiting_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.pumps == 0 {
            return Err(ConfigError::NoPumps);
        }
        if self.bays() == 0 {
            return Err(ConfigError::NoBays);
        }
        for (what, value) in [
            ("waiting capacity", self.waiting_capacity),
            ("pumps", self.pumps),
            ("bays", self.bays()),
            ("arrivals", self.arrivals),
        ] {
            if u32::try_from(value).is_err() {
                return Err(ConfigError::TooLarge { what, value });
            }
        }
        if let ServiceTime::Uniform { min, max } = self.service {
            if min > max {
                return Err(ConfigError::InvertedServiceRange {
                    min_ms: min.as_millis(),
                    max_ms: max.as_millis(),
                });
            }
        }
        Ok(())
    }
}
