//! Piezotone: ESP-IDF std firmware
//!
//! Same tone engine as the bare-metal build, driven from FreeRTOS threads.
//! Frequency requests arrive from a WiFi access point serving a one-field
//! HTTP form and from NDJSON commands on the console.

mod buzzer;

use std::io::{ErrorKind, Read};
use std::sync::mpsc::{self, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::http::server::{Configuration as HttpConfig, EspHttpServer};
use esp_idf_svc::http::Method;
use esp_idf_svc::io::Write;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{AccessPointConfiguration, AuthMethod, BlockingWifi, Configuration, EspWifi};

use piezotone::comm::{self, CommandOutcome, FormPage, LineReader};
use piezotone::config::{BOOT_DELAY_MS, DEFAULT_FREQUENCY_HZ, HTTP_PORT, MIN_FEASIBLE_FREQUENCY_HZ};
use piezotone::protocol::{DeviceMessage, HostCommand, MsgBuffer, MAX_MSG_LEN, VERSION};
use piezotone::{board, FrequencyController, ToneConfig, TABLE_CAPACITY};

use buzzer::{TickTimer, EMITTER};

type Controller = FrequencyController<'static, TickTimer, TABLE_CAPACITY>;
type SharedController = Arc<Mutex<Controller>>;

// ── Access point settings (override at build time) ───────────────────

const WIFI_SSID: &str = match option_env!("PIEZOTONE_WIFI_SSID") {
    Some(ssid) => ssid,
    None => "piezotone",
};
const WIFI_PASS: &str = match option_env!("PIEZOTONE_WIFI_PASS") {
    Some(pass) => pass,
    None => "piezotone",
};
const WIFI_CHANNEL: u8 = 1;
const MAX_STA_CONN: u16 = 4;

/// Boot time, captured once in main for uptime reports.
static BOOT_INSTANT: Mutex<Option<Instant>> = Mutex::new(None);

fn uptime_secs() -> u32 {
    BOOT_INSTANT
        .lock()
        .ok()
        .and_then(|i| i.map(|boot| boot.elapsed().as_secs() as u32))
        .unwrap_or(0)
}

fn main() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();

    // Bind the ESP-IDF logger to the `log` facade
    esp_idf_svc::log::EspLogger::initialize_default();

    *BOOT_INSTANT.lock().map_err(|_| anyhow!("boot clock poisoned"))? = Some(Instant::now());

    log::info!("Piezotone v{} starting on {} (std)", VERSION, board::BOARD_NAME);

    // ── Peripherals ──────────────────────────────────────────────────

    let peripherals = Peripherals::take()?;
    let sys_loop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    // ── Tone engine ──────────────────────────────────────────────────

    let dac = buzzer::dac_init()?;
    let tick_timer = buzzer::timer_init(peripherals.timer00, dac)?;
    let control = EMITTER
        .take_control()
        .ok_or_else(|| anyhow!("tone emitter already claimed"))?;
    let controller = FrequencyController::new(control, tick_timer, ToneConfig::new())
        .map_err(|e| anyhow!("tone config rejected: {}", e))?;
    log::info!(
        "Tone engine ready: {}-sample table, floor {} Hz, waveform {}",
        TABLE_CAPACITY,
        MIN_FEASIBLE_FREQUENCY_HZ,
        controller.config().shape.as_str(),
    );
    let controller: SharedController = Arc::new(Mutex::new(controller));

    // ── Output thread ────────────────────────────────────────────────

    let (output_tx, output_rx) = mpsc::sync_channel::<MsgBuffer>(8);
    thread::Builder::new()
        .name("output".into())
        .stack_size(4096)
        .spawn(move || {
            output_thread(output_rx);
        })?;

    // ── Boot tone ────────────────────────────────────────────────────

    thread::sleep(Duration::from_millis(BOOT_DELAY_MS));
    apply(
        &controller,
        HostCommand::SetFrequency {
            hz: DEFAULT_FREQUENCY_HZ as i64,
        },
        &output_tx,
    );

    // ── Console thread ───────────────────────────────────────────────

    let console_controller = controller.clone();
    let console_output_tx = output_tx.clone();
    thread::Builder::new()
        .name("console".into())
        .stack_size(4096)
        .spawn(move || {
            console_thread(console_controller, console_output_tx);
        })?;
    log::info!("Console thread spawned");

    // ── Status thread ────────────────────────────────────────────────

    let status_controller = controller.clone();
    let status_output_tx = output_tx.clone();
    thread::Builder::new()
        .name("status".into())
        .stack_size(4096)
        .spawn(move || {
            status_thread(status_controller, status_output_tx);
        })?;
    log::info!("Status thread spawned");

    // ── WiFi access point ────────────────────────────────────────────

    let mut wifi = BlockingWifi::wrap(
        EspWifi::new(peripherals.modem, sys_loop.clone(), Some(nvs))?,
        sys_loop,
    )?;
    wifi.set_configuration(&Configuration::AccessPoint(AccessPointConfiguration {
        ssid: WIFI_SSID
            .try_into()
            .map_err(|_| anyhow!("SSID too long: {}", WIFI_SSID))?,
        password: WIFI_PASS
            .try_into()
            .map_err(|_| anyhow!("WiFi password too long"))?,
        channel: WIFI_CHANNEL,
        auth_method: if WIFI_PASS.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        },
        max_connections: MAX_STA_CONN,
        ..Default::default()
    }))?;
    wifi.start()?;
    wifi.wait_netif_up()?;
    log::info!(
        "WiFi AP '{}' up on channel {}, max {} stations",
        WIFI_SSID,
        WIFI_CHANNEL,
        MAX_STA_CONN
    );

    // ── HTTP form ────────────────────────────────────────────────────

    let _server = http_server(controller, output_tx)?;
    log::info!("HTTP form listening on port {}", HTTP_PORT);

    // Keep wifi and the server alive
    loop {
        thread::sleep(Duration::from_secs(60));
    }
}

// ── Request handling ─────────────────────────────────────────────────

/// Run one command through the controller and queue the reply.
/// An infeasible tone configuration halts the firmware.
fn apply(controller: &SharedController, cmd: HostCommand, output_tx: &SyncSender<MsgBuffer>) {
    let mut ctl = match controller.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    let outcome = match comm::handle_command(&cmd, &mut *ctl) {
        Ok(outcome) => outcome,
        Err(e) => {
            log::error!("Cannot play requested tone: {}", e);
            panic!("{}", e);
        }
    };

    let msg = match outcome {
        CommandOutcome::StatusRequested => status_message(&ctl),
        other => match other.reply() {
            Some(msg) => msg,
            None => return,
        },
    };
    drop(ctl);
    send(&msg, output_tx);
}

fn status_message(controller: &Controller) -> DeviceMessage {
    DeviceMessage::status(controller, uptime_secs())
}

fn send(msg: &DeviceMessage, output_tx: &SyncSender<MsgBuffer>) {
    let mut buf = MsgBuffer::new();
    buf.resize_default(MAX_MSG_LEN).ok();
    if let Some(len) = comm::serialize_message(msg, &mut buf) {
        buf.truncate(len);
        if output_tx.try_send(buf).is_err() {
            log::warn!("Output queue full, message dropped");
        }
    }
}

fn http_server(
    controller: SharedController,
    output_tx: SyncSender<MsgBuffer>,
) -> anyhow::Result<EspHttpServer<'static>> {
    let mut server = EspHttpServer::new(&HttpConfig {
        http_port: HTTP_PORT,
        ..Default::default()
    })?;

    server.fn_handler("/", Method::Get, move |req| -> anyhow::Result<()> {
        match comm::parse_frequency_query(req.uri()) {
            Ok(Some(request)) => apply(
                &controller,
                HostCommand::SetFrequency {
                    hz: request.hz() as i64,
                },
                &output_tx,
            ),
            Ok(None) => {}
            Err(e) => log::warn!("Ignoring frequency query {}: {:?}", req.uri(), e),
        }

        let shown_hz = controller
            .lock()
            .ok()
            .and_then(|ctl| ctl.current())
            .map(|s| s.frequency_hz)
            .unwrap_or(DEFAULT_FREQUENCY_HZ);
        let mut page = FormPage::new();
        comm::render_form_page(shown_hz, &mut page).map_err(|_| anyhow!("form page overflow"))?;

        req.into_ok_response()?.write_all(page.as_bytes())?;
        Ok(())
    })?;

    Ok(server)
}

// ── Console thread ───────────────────────────────────────────────────

fn console_thread(controller: SharedController, output_tx: SyncSender<MsgBuffer>) {
    log::info!("Console thread started");

    let mut stdin = std::io::stdin();
    let mut reader = LineReader::new();
    let mut byte = [0u8; 1];

    loop {
        match stdin.read(&mut byte) {
            Ok(1) => {
                if let Some(line) = reader.feed(byte[0]) {
                    match comm::parse_command(line) {
                        Some(cmd) => apply(&controller, cmd, &output_tx),
                        None => log::warn!("Ignoring unrecognized command line"),
                    }
                }
            }
            Ok(_) => thread::sleep(Duration::from_millis(10)),
            Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(Duration::from_millis(10)),
            Err(e) => {
                log::warn!("Console read error: {}", e);
                thread::sleep(Duration::from_millis(100));
            }
        }
    }
}

// ── Output thread ────────────────────────────────────────────────────

fn output_thread(output_rx: mpsc::Receiver<MsgBuffer>) {
    log::info!("Output thread started");

    while let Ok(msg) = output_rx.recv() {
        if let Ok(s) = std::str::from_utf8(&msg) {
            log::info!("{}", s.trim_end());
        }
    }
}

// ── Status thread ────────────────────────────────────────────────────

fn status_thread(controller: SharedController, output_tx: SyncSender<MsgBuffer>) {
    loop {
        thread::sleep(Duration::from_secs(30));

        let msg = match controller.lock() {
            Ok(ctl) => status_message(&ctl),
            Err(_) => continue,
        };
        send(&msg, &output_tx);
    }
}
