/// Piezo buzzer hardware: DAC output and the sample tick timer.
///
/// The tick timer is a TIMG1 auto-reloading alarm whose interrupt pushes
/// one table sample through the DAC. Both are installed into [`IsrSlot`]s
/// before the interrupt is enabled; from then on the handler owns the DAC
/// and only clears its own alarm, so a tick never takes a lock. The control
/// side only starts and stops the timer.
use esp_hal::analog::dac::Dac;
use esp_hal::handler;
use esp_hal::interrupt::Priority;
use esp_hal::time::Duration;
use esp_hal::timer::timg::Timer as TimgTimer;
use esp_hal::timer::Timer as _;

use piezotone::{IsrSlot, SampleSink, ToneEmitter, ToneTimer, TICK_PERIOD_US};

#[cfg(not(feature = "dac-channel-2"))]
pub type DacPeripheral = esp_hal::peripherals::DAC1<'static>;
#[cfg(feature = "dac-channel-2")]
pub type DacPeripheral = esp_hal::peripherals::DAC2<'static>;

#[cfg(not(feature = "dac-channel-2"))]
pub type DacPin = esp_hal::peripherals::GPIO25<'static>;
#[cfg(feature = "dac-channel-2")]
pub type DacPin = esp_hal::peripherals::GPIO26<'static>;

/// Emitter shared by the tick ISR and the frequency controller.
pub static EMITTER: ToneEmitter = ToneEmitter::new();

/// Tick timer. Read by the ISR (alarm clear) and the control side
/// (start/stop); the two touch different registers.
static TICK_TIMER: IsrSlot<TimgTimer<'static>> = IsrSlot::new();

/// DAC output, owned by `tone_tick` once installed.
static DAC_OUT: IsrSlot<DacSink> = IsrSlot::new();

/// DAC channel wired to the buzzer.
pub struct DacSink(Dac<'static, DacPeripheral>);

impl SampleSink for DacSink {
    #[inline(always)]
    fn write_sample(&mut self, level: u8) {
        self.0.write(level);
    }
}

/// Sample tick: clear the alarm and emit the next level.
#[handler(priority = Priority::Priority3)]
fn tone_tick() {
    if let Some(timer) = TICK_TIMER.get() {
        timer.clear_interrupt();
    }
    // SAFETY: this handler is the only user of DAC_OUT and does not
    // preempt itself.
    if let Some(dac) = unsafe { DAC_OUT.get_mut() } {
        EMITTER.tick(dac);
    }
}

/// Control-side handle on the tick timer.
pub struct TickTimer {
    timer: &'static TimgTimer<'static>,
}

impl ToneTimer for TickTimer {
    fn pause(&mut self) {
        self.timer.stop();
    }

    fn resume(&mut self) {
        // Keep the restart sequence in one piece on this core; the alarm
        // cannot fire while the timer is stopped, so the ISR never waits here.
        critical_section::with(|_| {
            self.timer.reset();
            self.timer.start();
        });
    }
}

/// Bring up the DAC and arm the tick interrupt. The timer stays stopped
/// until the first frequency request resumes it.
pub fn init(dac: DacPeripheral, pin: DacPin, timer: TimgTimer<'static>) -> TickTimer {
    let mut out = Dac::new(dac, pin);
    out.write(0);

    timer.stop();
    timer.enable_auto_reload(true);
    if let Err(e) = timer.load_value(Duration::from_micros(TICK_PERIOD_US as u64)) {
        panic!("tick period rejected: {:?}", e);
    }

    // Both slots are filled before the interrupt is enabled
    if DAC_OUT.put(DacSink(out)).is_err() || TICK_TIMER.put(timer).is_err() {
        panic!("buzzer initialized twice");
    }
    let timer = match TICK_TIMER.get() {
        Some(t) => t,
        None => panic!("tick timer slot empty after init"),
    };
    timer.set_interrupt_handler(tone_tick);
    timer.enable_interrupt(true);

    log::info!(
        "Buzzer on DAC channel {} (GPIO{}), {} us tick",
        piezotone::board::DAC_CHANNEL,
        piezotone::board::DAC_GPIO,
        TICK_PERIOD_US
    );
    TickTimer { timer }
}
