/// Frequency controller: the control-plane side of the tone engine.
///
/// Each request clamps the frequency, rewrites the table inside the
/// emitter's paused section and reports the resulting configuration.
/// Requests run synchronously on one context; the latest one wins.
use crate::board;
use crate::config::{FrequencyRequest, ToneConfig};
use crate::emitter::{EmitterControl, SampleEmitter, ToneTimer};
use crate::error::ToneError;
use crate::waveform::{checked_sample_count, SampleTable, WaveShape};

/// Diagnostics record of the tone currently playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToneSettings {
    pub channel: u8,
    pub shape: WaveShape,
    pub frequency_hz: u32,
    pub sample_count: usize,
}

pub struct FrequencyController<'a, T: ToneTimer, const N: usize> {
    control: EmitterControl<'a, N>,
    timer: T,
    config: ToneConfig,
    current: Option<ToneSettings>,
}

impl<'a, T: ToneTimer, const N: usize> FrequencyController<'a, T, N> {
    /// Take over an emitter's control side and its timer. Fails if the
    /// configured floor cannot fit a table of `N` samples.
    pub fn new(control: EmitterControl<'a, N>, timer: T, config: ToneConfig) -> Result<Self, ToneError> {
        config.validate(N)?;
        Ok(Self {
            control,
            timer,
            config,
            current: None,
        })
    }

    /// Replace the playing tone with `request`.
    ///
    /// An infeasible frequency is rejected before the emitter is touched,
    /// so the previous tone (or silence) stays in place.
    pub fn set_frequency(&mut self, request: FrequencyRequest) -> Result<ToneSettings, ToneError> {
        let frequency_hz = self.config.clamp(request);
        if frequency_hz != request.hz() {
            log::debug!("{} Hz raised to floor {} Hz", request.hz(), frequency_hz);
        }
        let tick = self.config.tick_period_us;
        checked_sample_count(frequency_hz, tick, N)?;

        let shape = self.config.shape;
        let mut paused = self.control.pause(&mut self.timer);
        let sample_count = paused.table_mut().rebuild(frequency_hz, shape, tick)?;
        paused.resume();

        let settings = ToneSettings {
            channel: self.config.dac_channel,
            shape,
            frequency_hz,
            sample_count,
        };
        self.current = Some(settings);
        self.report(&settings);
        Ok(settings)
    }

    fn report(&self, settings: &ToneSettings) {
        log::info!(
            "DAC channel {} (GPIO{}), waveform {}, {} Hz, {} samples/cycle",
            settings.channel,
            board::dac_gpio(settings.channel),
            settings.shape.as_str(),
            settings.frequency_hz,
            settings.sample_count,
        );
        if log::log_enabled!(log::Level::Debug) {
            let (lo, hi) = self
                .table()
                .millivolts(self.config.supply_mv)
                .fold((u16::MAX, 0), |(lo, hi), mv| (lo.min(mv), hi.max(mv)));
            log::debug!("Output swing {}..{} mV", lo, hi);
        }
    }

    /// Configuration of the last successful request.
    pub fn current(&self) -> Option<ToneSettings> {
        self.current
    }

    pub fn config(&self) -> &ToneConfig {
        &self.config
    }

    pub fn table(&self) -> &SampleTable<N> {
        self.control.table()
    }

    pub fn emitter(&self) -> &'a SampleEmitter<N> {
        self.control.emitter()
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }
}
