//! Piezotone: DAC-driven piezo buzzer firmware.
//!
//! A TIMG1 alarm fires every few microseconds and replays one precomputed
//! waveform cycle through the ESP32 DAC. Frequency requests arrive as
//! NDJSON commands on the serial console; every reconfiguration is echoed
//! back as a `tone` record.

#![no_std]
#![no_main]

use esp_backtrace as _;

esp_bootloader_esp_idf::esp_app_desc!();

// Hardware-specific module (binary crate only)
mod buzzer;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Instant, Timer};
use esp_hal::interrupt::software::SoftwareInterruptControl;
use esp_hal::timer::timg::TimerGroup;
use esp_hal::uart::{Config as UartConfig, UartRx};
use esp_hal::Async;

use piezotone::comm::{self, CommandOutcome, LineReader};
use piezotone::config::{BOOT_DELAY_MS, DEFAULT_FREQUENCY_HZ, MIN_FEASIBLE_FREQUENCY_HZ};
use piezotone::protocol::{DeviceMessage, HostCommand, MsgBuffer, MAX_MSG_LEN, VERSION};
use piezotone::{board, FrequencyController, ToneConfig, ToneError, TABLE_CAPACITY};

use buzzer::{TickTimer, EMITTER};

type Controller = FrequencyController<'static, TickTimer, TABLE_CAPACITY>;

// ── Static channels ──────────────────────────────────────────────────

/// Pending host command. A newer command replaces one not yet picked up.
static CMD_SIGNAL: Signal<CriticalSectionRawMutex, HostCommand> = Signal::new();

/// Serialized output messages
static OUTPUT_CHANNEL: Channel<CriticalSectionRawMutex, MsgBuffer, 4> = Channel::new();

// ── Entry point ──────────────────────────────────────────────────────

#[esp_rtos::main]
async fn main(spawner: embassy_executor::Spawner) {
    esp_println::logger::init_logger_from_env();

    let peripherals = esp_hal::init(esp_hal::Config::default());

    // Start the RTOS: needs a timer and a software interrupt
    let timg0 = TimerGroup::new(peripherals.TIMG0);
    let sw_int = SoftwareInterruptControl::new(peripherals.SW_INTERRUPT);
    esp_rtos::start(timg0.timer0, sw_int.software_interrupt0);

    log::info!("Piezotone v{} starting on {}", VERSION, board::BOARD_NAME);
    if !board::HAS_DAC {
        log::warn!("Board has no DAC wiring configured, buzzer will stay silent");
    }

    // ── Tone engine ─────────────────────────────────────────────────
    let timg1 = TimerGroup::new(peripherals.TIMG1);
    #[cfg(not(feature = "dac-channel-2"))]
    let tick_timer = buzzer::init(peripherals.DAC1, peripherals.GPIO25, timg1.timer0);
    #[cfg(feature = "dac-channel-2")]
    let tick_timer = buzzer::init(peripherals.DAC2, peripherals.GPIO26, timg1.timer0);

    let control = EMITTER.take_control().expect("tone emitter already claimed");
    let controller = FrequencyController::new(control, tick_timer, ToneConfig::new())
        .unwrap_or_else(|e| panic!("Tone config rejected: {}", e));
    log::info!(
        "Tone engine ready: {}-sample table, floor {} Hz, waveform {}",
        TABLE_CAPACITY,
        MIN_FEASIBLE_FREQUENCY_HZ,
        controller.config().shape.as_str(),
    );

    // ── Serial console ──────────────────────────────────────────────
    let uart_rx = UartRx::new(
        peripherals.UART0,
        UartConfig::default().with_baudrate(comm::SERIAL_BAUD),
    )
    .unwrap_or_else(|e| panic!("{}: {:?}", ToneError::PeripheralInit("UART0"), e))
    .with_rx(peripherals.GPIO3)
    .into_async();

    spawner.spawn(output_serial_task()).unwrap();
    spawner.spawn(serial_rx_task(uart_rx)).unwrap();
    spawner.spawn(tone_task(controller)).unwrap();
}

// ── Tasks ────────────────────────────────────────────────────────────

/// Owns the controller. Plays the boot tone, then applies host commands
/// one at a time.
#[embassy_executor::task]
async fn tone_task(mut controller: Controller) {
    Timer::after(Duration::from_millis(BOOT_DELAY_MS)).await;
    apply(
        &mut controller,
        HostCommand::SetFrequency {
            hz: DEFAULT_FREQUENCY_HZ as i64,
        },
    );

    loop {
        let cmd = CMD_SIGNAL.wait().await;
        apply(&mut controller, cmd);
    }
}

/// Run one command through the controller and queue the reply.
/// An infeasible tone configuration halts the firmware.
fn apply(controller: &mut Controller, cmd: HostCommand) {
    let outcome = match comm::handle_command(&cmd, controller) {
        Ok(outcome) => outcome,
        Err(e) => {
            log::error!("Cannot play requested tone: {}", e);
            panic!("{}", e);
        }
    };

    let msg = match outcome {
        CommandOutcome::StatusRequested => status_message(controller),
        other => match other.reply() {
            Some(msg) => msg,
            None => return,
        },
    };
    send(&msg);
}

fn status_message(controller: &Controller) -> DeviceMessage {
    let uptime_secs = (Instant::now().as_millis() / 1000) as u32;
    DeviceMessage::status(controller, uptime_secs)
}

fn send(msg: &DeviceMessage) {
    let mut buf = MsgBuffer::new();
    buf.resize_default(MAX_MSG_LEN).ok();
    if let Some(len) = comm::serialize_message(msg, &mut buf) {
        buf.truncate(len);
        if OUTPUT_CHANNEL.try_send(buf).is_err() {
            log::warn!("Output channel full, message dropped");
        }
    }
}

/// Serial input task: accumulates console bytes into NDJSON lines and
/// hands parsed commands to the tone task.
#[embassy_executor::task]
async fn serial_rx_task(mut uart: UartRx<'static, Async>) {
    log::info!("Serial command task started");

    let mut reader = LineReader::new();
    let mut chunk = [0u8; 32];

    loop {
        let n = match uart.read_async(&mut chunk).await {
            Ok(n) => n,
            Err(e) => {
                log::warn!("UART read error: {:?}", e);
                continue;
            }
        };
        for &byte in &chunk[..n] {
            if let Some(line) = reader.feed(byte) {
                match comm::parse_command(line) {
                    Some(cmd) => CMD_SIGNAL.signal(cmd),
                    None => log::warn!("Ignoring unrecognized command line"),
                }
            }
        }
    }
}

/// Serial output task: writes queued NDJSON records to the console.
#[embassy_executor::task]
async fn output_serial_task() {
    log::info!("Serial output task started");

    let output_rx = OUTPUT_CHANNEL.receiver();

    loop {
        let msg = output_rx.receive().await;
        if let Ok(s) = core::str::from_utf8(&msg) {
            log::info!("{}", s.trim_end());
        }
    }
}
