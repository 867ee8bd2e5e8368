use std::{fmt, io};

/// Rejected station configuration. Raised before any thread is started.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("waiting area capacity must be at least 1")]
    ZeroCapacity,
    #[error("at least one pump is required")]
    NoPumps,
    #[error("at least one service bay is required")]
    NoBays,
    #[error("service time range is inverted: {min_ms}ms > {max_ms}ms")]
    InvertedServiceRange { min_ms: u128, max_ms: u128 },
    #[error("{what} is too large: {value}")]
    TooLarge { what: &'static str, value: usize },
}

/// Why a blocking acquire returned without a permit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WaitError {
    #[error("wait interrupted by cancellation")]
    Interrupted,
    #[error("wait timed out")]
    TimedOut,
}

/// A unit that could not be placed in the waiting area. The unit is handed back.
pub struct EnterError<T> {
    pub unit: T,
    pub reason: WaitError,
}

impl<T> EnterError<T> {
    pub fn into_unit(self) -> T {
        self.unit
    }
}

impl<T: fmt::Debug> fmt::Debug for EnterError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnterError")
            .field("unit", &self.unit)
            .field("reason", &self.reason)
            .finish()
    }
}

impl<T> fmt::Display for EnterError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "could not enter waiting area: {}", self.reason)
    }
}

impl<T: fmt::Debug> std::error::Error for EnterError<T> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.reason)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StationError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to spawn {what}")]
    Spawn {
        what: String,
        #[source]
        source: io::Error,
    },
}
