/// Waveform table builder.
///
/// Maps a requested frequency onto a whole number of timer ticks per cycle
/// and fills a fixed-capacity table with one cycle of DAC levels for the
/// configured wave shape. Pure computation apart from the in-place table
/// write; never called from interrupt context.
use core::f64::consts::TAU;

use crate::error::ToneError;

/// Full-scale DAC level (8-bit DAC; 256 and above reads back as 0 on the ESP32).
pub const AMPLITUDE_MAX: u8 = 255;

const MICROS_PER_SEC: u64 = 1_000_000;

/// Closed set of wave shapes the table builder can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaveShape {
    Sine,
    Triangle,
    Sawtooth,
    Square,
}

impl WaveShape {
    /// Shape selected by the `wave-*` cargo features. A non-default shape
    /// wins over the default `wave-sine`.
    pub const CONFIGURED: WaveShape = if cfg!(feature = "wave-square") {
        WaveShape::Square
    } else if cfg!(feature = "wave-sawtooth") {
        WaveShape::Sawtooth
    } else if cfg!(feature = "wave-triangle") {
        WaveShape::Triangle
    } else {
        WaveShape::Sine
    };

    pub fn as_str(&self) -> &'static str {
        match self {
            WaveShape::Sine => "sine",
            WaveShape::Triangle => "triangle",
            WaveShape::Sawtooth => "sawtooth",
            WaveShape::Square => "square",
        }
    }
}

/// Number of ticks that make up one cycle, `round(1e6 / (tick * f))` with
/// halves rounded up. A zero frequency or tick period yields `u32::MAX`.
pub fn sample_count(frequency_hz: u32, tick_period_us: u32) -> u32 {
    let ticks_per_sec_scaled = tick_period_us as u64 * frequency_hz as u64;
    if ticks_per_sec_scaled == 0 {
        return u32::MAX;
    }
    let rounded = (2 * MICROS_PER_SEC + ticks_per_sec_scaled) / (2 * ticks_per_sec_scaled);
    rounded.min(u32::MAX as u64) as u32
}

/// Sample count for `frequency_hz`, rejected unless it lies in `1..=capacity`.
pub fn checked_sample_count(
    frequency_hz: u32,
    tick_period_us: u32,
    capacity: usize,
) -> Result<usize, ToneError> {
    let n = sample_count(frequency_hz, tick_period_us);
    if n == 0 || n as usize > capacity {
        return Err(ToneError::ConfigurationInfeasible {
            frequency_hz,
            sample_count: n,
            capacity,
        });
    }
    Ok(n as usize)
}

/// Lowest frequency whose rounded sample count still fits `capacity`.
///
/// `round(1e6 / (t * f)) <= C` holds exactly when `f > 2e6 / (t * (2C + 1))`.
pub const fn min_feasible_frequency(tick_period_us: u32, capacity: usize) -> u32 {
    let denom = tick_period_us as u64 * (2 * capacity as u64 + 1);
    if denom == 0 {
        return u32::MAX;
    }
    (2 * MICROS_PER_SEC / denom + 1) as u32
}

/// DAC level of sample `i` in a cycle of `n` samples.
pub fn generate_sample(shape: WaveShape, i: usize, n: usize) -> u8 {
    debug_assert!(n > 0 && i < n);
    let a = AMPLITUDE_MAX as u32;
    let (i, n) = (i as u32, n as u32);
    let level = match shape {
        WaveShape::Sine => {
            let phase = TAU * i as f64 / n as f64;
            libm::floor((libm::sin(phase) + 1.0) * a as f64 / 2.0 + 0.5) as u32
        }
        WaveShape::Triangle => {
            if i > n / 2 {
                2 * a * (n - i) / n
            } else {
                2 * a * i / n
            }
        }
        WaveShape::Sawtooth => i * a / n,
        WaveShape::Square => {
            if i < n / 2 {
                a
            } else {
                0
            }
        }
    };
    level.min(a) as u8
}

/// Millivolt equivalent of a DAC level against the supply rail.
pub const fn level_to_millivolts(level: u8, supply_mv: u16) -> u16 {
    (supply_mv as u32 * level as u32 / AMPLITUDE_MAX as u32) as u16
}

/// One cycle of DAC levels in a buffer of fixed capacity `N`.
///
/// Only the first `len()` entries are valid; anything past that is left
/// over from an earlier, longer cycle and is never exposed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleTable<const N: usize> {
    levels: [u8; N],
    len: usize,
}

impl<const N: usize> SampleTable<N> {
    pub const fn new() -> Self {
        Self {
            levels: [0; N],
            len: 0,
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Valid samples of the current cycle.
    pub fn as_slice(&self) -> &[u8] {
        &self.levels[..self.len]
    }

    /// Sample at `index` without bounds or validity checks beyond the
    /// physical array. Callers keep `index < len()`.
    #[inline(always)]
    pub(crate) fn level(&self, index: usize) -> u8 {
        self.levels[index]
    }

    /// Overwrite the table in place with one cycle of `shape` at
    /// `frequency_hz`. Returns the new sample count. The table is left
    /// untouched when the frequency is infeasible.
    pub fn rebuild(
        &mut self,
        frequency_hz: u32,
        shape: WaveShape,
        tick_period_us: u32,
    ) -> Result<usize, ToneError> {
        let n = checked_sample_count(frequency_hz, tick_period_us, N)?;
        for (i, slot) in self.levels[..n].iter_mut().enumerate() {
            *slot = generate_sample(shape, i, n);
        }
        self.len = n;
        Ok(n)
    }

    /// Millivolt series of the valid samples (diagnostics only).
    pub fn millivolts(&self, supply_mv: u16) -> impl Iterator<Item = u16> + '_ {
        self.as_slice()
            .iter()
            .map(move |&level| level_to_millivolts(level, supply_mv))
    }
}

impl<const N: usize> Default for SampleTable<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a fresh table of capacity `N` for `frequency_hz`.
pub fn build<const N: usize>(
    frequency_hz: u32,
    shape: WaveShape,
    tick_period_us: u32,
) -> Result<SampleTable<N>, ToneError> {
    let mut table = SampleTable::new();
    table.rebuild(frequency_hz, shape, tick_period_us)?;
    Ok(table)
}
