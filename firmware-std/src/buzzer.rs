/// Piezo buzzer hardware for ESP-IDF: DAC oneshot channel plus a
/// hardware timer whose alarm ISR emits one sample per tick.
use esp_idf_svc::hal::peripheral::Peripheral;
use esp_idf_svc::hal::timer::{Timer, TimerConfig, TimerDriver};
use esp_idf_svc::sys::{
    dac_channel_t, dac_channel_t_DAC_CHAN_0, dac_channel_t_DAC_CHAN_1, dac_oneshot_config_t,
    dac_oneshot_handle_t, dac_oneshot_new_channel, dac_oneshot_output_voltage, esp,
};

use anyhow::anyhow;

use piezotone::{board, SampleSink, ToneEmitter, ToneError, ToneTimer, TICK_PERIOD_US};

/// Emitter shared by the timer ISR and the frequency controller.
pub static EMITTER: ToneEmitter = ToneEmitter::new();

/// Oneshot DAC channel wired to the buzzer.
pub struct DacSink(dac_oneshot_handle_t);

// SAFETY: the handle is an opaque driver pointer; after init it is only
// used from the timer ISR.
unsafe impl Send for DacSink {}

impl SampleSink for DacSink {
    #[inline(always)]
    fn write_sample(&mut self, level: u8) {
        unsafe {
            dac_oneshot_output_voltage(self.0, level);
        }
    }
}

fn dac_channel_id(channel: u8) -> dac_channel_t {
    if channel == 2 {
        dac_channel_t_DAC_CHAN_1
    } else {
        dac_channel_t_DAC_CHAN_0
    }
}

/// Open the configured DAC channel.
pub fn dac_init() -> anyhow::Result<DacSink> {
    let config = dac_oneshot_config_t {
        chan_id: dac_channel_id(board::DAC_CHANNEL),
    };
    let mut handle: dac_oneshot_handle_t = core::ptr::null_mut();
    esp!(unsafe { dac_oneshot_new_channel(&config, &mut handle) })
        .map_err(|e| anyhow!("{}: {}", ToneError::PeripheralInit("DAC oneshot channel"), e))?;
    Ok(DacSink(handle))
}

/// Hardware timer driving the sample tick.
pub struct TickTimer(TimerDriver<'static>);

impl ToneTimer for TickTimer {
    fn pause(&mut self) {
        // The emitter is already disabled, so a failed stop only costs
        // a few empty ticks.
        if let Err(e) = self.0.enable(false) {
            log::warn!("Tick timer stop failed: {}", e);
        }
    }

    fn resume(&mut self) {
        let started = self.0.set_counter(0).and_then(|_| self.0.enable(true));
        if let Err(e) = started {
            log::error!("Tick timer start failed: {}", e);
            panic!("tick timer start failed: {}", e);
        }
    }
}

/// Configure the auto-reloading tick alarm and attach the sample ISR.
/// The timer stays stopped until the first frequency request.
pub fn timer_init<T: Timer>(
    timer: impl Peripheral<P = T> + 'static,
    mut dac: DacSink,
) -> anyhow::Result<TickTimer> {
    let mut driver = TimerDriver::new(timer, &TimerConfig::new().auto_reload(true))
        .map_err(|e| anyhow!("{}: {}", ToneError::PeripheralInit("tick timer"), e))?;
    let alarm_ticks = driver.tick_hz() * TICK_PERIOD_US as u64 / 1_000_000;
    driver.set_alarm(alarm_ticks)?;

    // SAFETY: the callback runs in ISR context; `tick` never blocks or
    // allocates.
    unsafe {
        driver.subscribe(move || EMITTER.tick(&mut dac))?;
    }
    driver.enable_interrupt()?;
    driver.enable_alarm(true)?;

    log::info!(
        "Buzzer on DAC channel {} (GPIO{}), {} us tick ({} timer ticks)",
        board::DAC_CHANNEL,
        board::DAC_GPIO,
        TICK_PERIOD_US,
        alarm_ticks
    );
    Ok(TickTimer(driver))
}
