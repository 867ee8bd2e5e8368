use std::{path::PathBuf, time::Duration};

use clap::Parser;
use shared::{ServiceTime, StationConfig};

/// Service Station Simulation
#[derive(Debug, Clone, Parser)]
pub struct Args {
    /// Slots in the waiting area
    #[arg(short = 'c', long, default_value_t = 5)]
    pub capacity: usize,
    /// Number of pumps
    #[arg(short, long, default_value_t = 3)]
    pub pumps: usize,
    /// Service bays shared by the pumps (default: one per pump)
    #[arg(short, long)]
    pub bays: Option<usize>,
    /// Number of cars
    #[arg(short = 'n', long, default_value_t = 10)]
    pub cars: usize,
    /// Service time per car, in milliseconds
    #[arg(long, default_value_t = 2000)]
    pub service_ms: u64,
    /// Draw each car's service time uniformly between --service-ms and this
    #[arg(long)]
    pub service_max_ms: Option<u64>,
    /// Delay between two arrivals, in milliseconds
    #[arg(long, default_value_t = 500)]
    pub interval_ms: u64,
    /// Cars leave if no slot frees up within this many milliseconds
    ///
    /// Without it, cars wait as long as it takes.
    #[arg(long)]
    pub entry_timeout_ms: Option<u64>,
    /// Seed for the random service times
    #[arg(long)]
    pub seed: Option<u64>,
    /// Write every event to this CSV file
    #[arg(long)]
    pub trace: Option<PathBuf>,
    /// More diagnostics on stderr (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
    /// Only print the final report
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    pub fn config(&self, seed: u64) -> StationConfig {
        let min = Duration::from_millis(self.service_ms);
        let service = match self.service_max_ms {
            Some(max) => ServiceTime::Uniform {
                min,
                max: Duration::from_millis(max),
            },
            None => ServiceTime::Fixed(min),
        };

        StationConfig {
            waiting_capacity: self.capacity,
            pumps: self.pumps,
            bays: self.bays,
            arrivals: self.cars,
            service,
            arrival_interval: Duration::from_millis(self.interval_ms),
            entry_timeout: self.entry_timeout_ms.map(Duration::from_millis),
            seed,
        }
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use clap::Parser;
    use shared::ServiceTime;

    use super::Args;

    #[test]
    fn defaults() {
        let args = Args::parse_from(["station"]);
        let config = args.config(3);
        assert_eq!(config.waiting_capacity, 5);
        assert_eq!(config.pumps, 3);
        assert_eq!(config.bays(), 3);
        assert_eq!(config.service, ServiceTime::Fixed(Duration::from_secs(2)));
        assert_eq!(config.seed, 3);
    }

    #[test]
    fn random_service_range() {
        let args = Args::parse_from(["station", "--service-ms", "100", "--service-max-ms", "300"]);
        assert_eq!(
            args.config(0).service,
            ServiceTime::Uniform {
                min: Duration::from_millis(100),
                max: Duration::from_millis(300),
            }
        );
    }

    #[test]
    fn short_flags() {
        let args = Args::parse_from(["station", "-c", "2", "-p", "1", "-b", "1", "-n", "4", "-vv"]);
        assert_eq!(args.capacity, 2);
        assert_eq!(args.pumps, 1);
        assert_eq!(args.bays, Some(1));
        assert_eq!(args.cars, 4);
        assert_eq!(args.verbose, 2);
    }
}
