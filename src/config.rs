/// Tone engine configuration.
///
/// Everything here is fixed at build time (board and shape features) and
/// validated once at startup. Only the frequency changes at runtime.
use crate::board;
use crate::error::ToneError;
use crate::waveform::{checked_sample_count, min_feasible_frequency, WaveShape};

/// Timer ISR period in microseconds. The ISR itself takes ~5.5 µs and the
/// interrupt watchdog fires below that; 7 µs stays clear of it.
pub const TICK_PERIOD_US: u32 = 7;

/// Samples per cycle the table can hold.
pub const TABLE_CAPACITY: usize = 200;

/// Tone played after boot and offered by the HTTP form.
pub const DEFAULT_FREQUENCY_HZ: u32 = 1000;

/// Settling delay between peripheral bring-up and the first tone.
pub const BOOT_DELAY_MS: u64 = 2000;

/// Port of the HTTP frequency form.
pub const HTTP_PORT: u16 = 3500;

/// Lowest frequency that fits the table at the fixed tick period (713 Hz).
pub const MIN_FEASIBLE_FREQUENCY_HZ: u32 = min_feasible_frequency(TICK_PERIOD_US, TABLE_CAPACITY);

/// Static configuration of the tone engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToneConfig {
    /// Timer period in microseconds
    pub tick_period_us: u32,
    /// Requests below this are raised to it
    pub min_frequency_hz: u32,
    /// Wave shape written to the table
    pub shape: WaveShape,
    /// Supply rail in millivolts, for diagnostics
    pub supply_mv: u16,
    /// DAC channel the tone is routed to
    pub dac_channel: u8,
}

impl ToneConfig {
    pub const fn new() -> Self {
        Self {
            tick_period_us: TICK_PERIOD_US,
            min_frequency_hz: MIN_FEASIBLE_FREQUENCY_HZ,
            shape: WaveShape::CONFIGURED,
            supply_mv: board::SUPPLY_MV,
            dac_channel: board::DAC_CHANNEL,
        }
    }

    /// Check that the floor itself fits a table of `capacity`: not below
    /// the feasible minimum, and not so high it rounds to zero samples.
    pub fn validate(&self, capacity: usize) -> Result<(), ToneError> {
        let floor = min_feasible_frequency(self.tick_period_us, capacity);
        if self.tick_period_us == 0 || self.min_frequency_hz < floor {
            return Err(ToneError::ConfigurationInfeasible {
                frequency_hz: self.min_frequency_hz,
                sample_count: crate::waveform::sample_count(
                    self.min_frequency_hz,
                    self.tick_period_us,
                ),
                capacity,
            });
        }
        // A floor too high for even one sample per cycle
        checked_sample_count(self.min_frequency_hz, self.tick_period_us, capacity)?;
        Ok(())
    }

    /// Raise a request to the configured floor.
    pub fn clamp(&self, request: FrequencyRequest) -> u32 {
        request.hz().max(self.min_frequency_hz)
    }
}

impl Default for ToneConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// A positive frequency in Hz as submitted by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrequencyRequest(u32);

impl FrequencyRequest {
    /// Accepts any positive value; zero and negatives are rejected.
    pub fn new(hz: i64) -> Option<Self> {
        if hz <= 0 {
            return None;
        }
        Some(Self(u32::try_from(hz).unwrap_or(u32::MAX)))
    }

    pub const fn hz(&self) -> u32 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_floor_is_feasible_minimum() {
        assert_eq!(MIN_FEASIBLE_FREQUENCY_HZ, 713);
        let config = ToneConfig::new();
        assert_eq!(config.min_frequency_hz, 713);
        assert_eq!(config.validate(TABLE_CAPACITY), Ok(()));
    }

    #[test]
    fn validate_rejects_floor_below_feasible() {
        let config = ToneConfig {
            min_frequency_hz: 700,
            ..ToneConfig::new()
        };
        assert!(matches!(
            config.validate(TABLE_CAPACITY),
            Err(ToneError::ConfigurationInfeasible {
                frequency_hz: 700,
                sample_count: 204,
                capacity: TABLE_CAPACITY,
            })
        ));
    }

    #[test]
    fn validate_accepts_raised_floor() {
        let config = ToneConfig {
            min_frequency_hz: 1000,
            ..ToneConfig::new()
        };
        assert_eq!(config.validate(TABLE_CAPACITY), Ok(()));
    }

    #[test]
    fn validate_rejects_floor_above_one_sample_per_cycle() {
        let config = ToneConfig {
            min_frequency_hz: 300_000,
            ..ToneConfig::new()
        };
        assert_eq!(
            config.validate(TABLE_CAPACITY),
            Err(ToneError::ConfigurationInfeasible {
                frequency_hz: 300_000,
                sample_count: 0,
                capacity: TABLE_CAPACITY,
            })
        );
    }

    #[test]
    fn validate_rejects_zero_tick() {
        let config = ToneConfig {
            tick_period_us: 0,
            ..ToneConfig::new()
        };
        assert!(config.validate(TABLE_CAPACITY).is_err());
    }

    #[test]
    fn default_shape_is_sine() {
        #[cfg(not(any(
            feature = "wave-triangle",
            feature = "wave-sawtooth",
            feature = "wave-square"
        )))]
        assert_eq!(ToneConfig::new().shape, WaveShape::Sine);
    }

    #[test]
    fn clamp_raises_low_requests() {
        let config = ToneConfig::new();
        assert_eq!(config.clamp(FrequencyRequest::new(1).unwrap()), 713);
        assert_eq!(config.clamp(FrequencyRequest::new(712).unwrap()), 713);
        assert_eq!(config.clamp(FrequencyRequest::new(713).unwrap()), 713);
        assert_eq!(config.clamp(FrequencyRequest::new(1500).unwrap()), 1500);
    }

    #[test]
    fn request_rejects_non_positive() {
        assert_eq!(FrequencyRequest::new(0), None);
        assert_eq!(FrequencyRequest::new(-440), None);
        assert_eq!(FrequencyRequest::new(440).map(|r| r.hz()), Some(440));
    }

    #[test]
    fn request_saturates_huge_values() {
        assert_eq!(
            FrequencyRequest::new(i64::MAX).map(|r| r.hz()),
            Some(u32::MAX)
        );
    }
}
