/// JSON message protocol between the tone generator and a host.
///
/// All messages are newline-delimited JSON (NDJSON).
/// Uses `heapless` types for no_std/no-alloc operation.
use heapless::Vec;
use serde::{Deserialize, Serialize};

use crate::board;
use crate::controller::{FrequencyController, ToneSettings};
use crate::emitter::ToneTimer;

/// Messages sent from the device to the host
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum DeviceMessage {
    /// Emitted after every successful reconfiguration
    #[serde(rename = "tone")]
    Tone {
        channel: u8,
        shape: &'static str,
        frequency_hz: u32,
        sample_count: u32,
    },
    /// Device status report
    #[serde(rename = "status")]
    Status {
        /// Whether the emitter is producing samples
        playing: bool,
        /// Current tone, absent before the first request
        #[serde(skip_serializing_if = "Option::is_none")]
        frequency_hz: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        sample_count: Option<u32>,
        shape: &'static str,
        /// Uptime in seconds
        uptime: u32,
        /// Board identifier
        board: &'static str,
        /// Firmware version
        version: &'static str,
    },
    /// A host command was refused
    #[serde(rename = "error")]
    Error { reason: &'static str },
}

impl DeviceMessage {
    /// Diagnostics record for a reconfiguration.
    pub fn tone(settings: &ToneSettings) -> Self {
        DeviceMessage::Tone {
            channel: settings.channel,
            shape: settings.shape.as_str(),
            frequency_hz: settings.frequency_hz,
            sample_count: settings.sample_count as u32,
        }
    }

    /// Status report taken straight from the controller, for the board
    /// this firmware was built for.
    pub fn status<T: ToneTimer, const N: usize>(
        controller: &FrequencyController<'_, T, N>,
        uptime: u32,
    ) -> Self {
        let current = controller.current();
        DeviceMessage::Status {
            playing: controller.emitter().is_enabled(),
            frequency_hz: current.map(|s| s.frequency_hz),
            sample_count: current.map(|s| s.sample_count as u32),
            shape: controller.config().shape.as_str(),
            uptime,
            board: board::BOARD_NAME,
            version: VERSION,
        }
    }
}

/// Commands sent from the host to the device.
///
/// Deserialized manually via [`RawCommand`] in `comm::parse_command()` because
/// `serde_json_core` does not support internally tagged enums (`deserialize_any`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCommand {
    /// Replace the playing tone. The raw value is validated by the handler.
    SetFrequency { hz: i64 },
    /// Request current status
    GetStatus,
}

/// Wire format for host commands: a flat struct that `serde_json_core` can
/// deserialize without `deserialize_any`. Converted to [`HostCommand`] in
/// `comm::parse_command()`.
#[derive(Deserialize)]
pub(crate) struct RawCommand {
    pub cmd: heapless::String<16>,
    #[serde(default)]
    pub hz: Option<i64>,
}

/// Firmware version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum size of a serialized JSON message
pub const MAX_MSG_LEN: usize = 256;

/// Buffer type for serialized JSON messages
pub type MsgBuffer = Vec<u8, MAX_MSG_LEN>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FrequencyRequest, ToneConfig};
    use crate::emitter::SampleEmitter;
    use crate::waveform::WaveShape;

    fn to_json(msg: &DeviceMessage, buf: &mut [u8]) -> usize {
        serde_json_core::to_slice(msg, buf).unwrap()
    }

    #[test]
    fn host_command_equality() {
        assert_eq!(HostCommand::GetStatus, HostCommand::GetStatus);
        assert_eq!(
            HostCommand::SetFrequency { hz: 1000 },
            HostCommand::SetFrequency { hz: 1000 }
        );
        assert_ne!(
            HostCommand::SetFrequency { hz: 1000 },
            HostCommand::SetFrequency { hz: 1001 }
        );
    }

    #[test]
    fn serialize_tone_record() {
        let settings = ToneSettings {
            channel: 1,
            shape: WaveShape::Sine,
            frequency_hz: 1000,
            sample_count: 143,
        };
        let msg = DeviceMessage::tone(&settings);
        let mut buf = [0u8; 256];
        let len = to_json(&msg, &mut buf);
        let json = core::str::from_utf8(&buf[..len]).unwrap();
        assert_eq!(
            json,
            r#"{"type":"tone","channel":1,"shape":"sine","frequency_hz":1000,"sample_count":143}"#
        );
    }

    #[test]
    fn serialize_status_message() {
        let msg = DeviceMessage::Status {
            playing: true,
            frequency_hz: Some(1500),
            sample_count: Some(95),
            shape: "square",
            uptime: 120,
            board: "test_board",
            version: "0.1.0",
        };
        let mut buf = [0u8; 256];
        let len = to_json(&msg, &mut buf);
        let json = core::str::from_utf8(&buf[..len]).unwrap();
        assert!(json.contains(r#""type":"status""#));
        assert!(json.contains(r#""playing":true"#));
        assert!(json.contains(r#""frequency_hz":1500"#));
        assert!(json.contains(r#""sample_count":95"#));
        assert!(json.contains(r#""board":"test_board""#));
    }

    #[test]
    fn serialize_status_before_first_tone_omits_frequency() {
        let msg = DeviceMessage::Status {
            playing: false,
            frequency_hz: None,
            sample_count: None,
            shape: "sine",
            uptime: 1,
            board: "test_board",
            version: "0.1.0",
        };
        let mut buf = [0u8; 256];
        let len = to_json(&msg, &mut buf);
        let json = core::str::from_utf8(&buf[..len]).unwrap();
        assert!(json.contains(r#""playing":false"#));
        assert!(!json.contains("frequency_hz"));
        assert!(!json.contains("sample_count"));
    }

    struct NoopTimer;

    impl ToneTimer for NoopTimer {
        fn pause(&mut self) {}
        fn resume(&mut self) {}
    }

    #[test]
    fn status_follows_controller_state() {
        let emitter = SampleEmitter::<200>::new();
        let control = emitter.take_control().unwrap();
        let config = ToneConfig {
            shape: WaveShape::Triangle,
            ..ToneConfig::new()
        };
        let mut ctl = FrequencyController::new(control, NoopTimer, config).unwrap();

        match DeviceMessage::status(&ctl, 1) {
            DeviceMessage::Status {
                playing,
                frequency_hz,
                sample_count,
                shape,
                ..
            } => {
                assert!(!playing);
                assert_eq!(frequency_hz, None);
                assert_eq!(sample_count, None);
                assert_eq!(shape, "triangle");
            }
            other => panic!("expected status, got {:?}", other),
        }

        ctl.set_frequency(FrequencyRequest::new(2000).unwrap()).unwrap();
        match DeviceMessage::status(&ctl, 7) {
            DeviceMessage::Status {
                playing,
                frequency_hz,
                sample_count,
                shape,
                uptime,
                board: name,
                version,
            } => {
                assert!(playing);
                assert_eq!(frequency_hz, Some(2000));
                assert_eq!(sample_count, Some(71));
                assert_eq!(shape, "triangle");
                assert_eq!(uptime, 7);
                assert_eq!(name, board::BOARD_NAME);
                assert_eq!(version, VERSION);
            }
            other => panic!("expected status, got {:?}", other),
        }
    }

    #[test]
    fn serialize_error_message() {
        let msg = DeviceMessage::Error {
            reason: "frequency must be positive",
        };
        let mut buf = [0u8; 128];
        let len = to_json(&msg, &mut buf);
        let json = core::str::from_utf8(&buf[..len]).unwrap();
        assert_eq!(json, r#"{"type":"error","reason":"frequency must be positive"}"#);
    }

    #[test]
    fn version_is_semver() {
        let parts: heapless::Vec<&str, 4> = VERSION.split('.').collect();
        assert_eq!(
            parts.len(),
            3,
            "VERSION should be semver (major.minor.patch)"
        );
        for part in &parts {
            assert!(part.parse::<u32>().is_ok(), "'{part}' is not a number");
        }
    }
}
