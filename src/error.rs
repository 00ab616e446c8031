/// Error kinds of the tone engine.
///
/// There is no degraded mode: either the requested tone is playing or the
/// caller is expected to halt.
use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToneError {
    /// The frequency cannot be represented at the fixed tick rate: its
    /// rounded sample count is zero or exceeds the table capacity.
    ConfigurationInfeasible {
        frequency_hz: u32,
        sample_count: u32,
        capacity: usize,
    },
    /// One-time bring-up of the timer or DAC failed.
    PeripheralInit(&'static str),
}

impl fmt::Display for ToneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToneError::ConfigurationInfeasible {
                frequency_hz,
                sample_count,
                capacity,
            } => write!(
                f,
                "{} Hz needs {} samples per cycle, table holds 1..={}",
                frequency_hz, sample_count, capacity
            ),
            ToneError::PeripheralInit(what) => write!(f, "peripheral init failed: {}", what),
        }
    }
}
