/// Request sources and diagnostics output.
///
/// Frequency requests arrive either as NDJSON commands over serial or as
/// `GET /?frequency=N` on the HTTP form. Both funnel into
/// [`handle_command`], which hands validated requests to the controller.
/// Reconfigurations are reported back as NDJSON records.
use core::fmt::Write;

use crate::config::FrequencyRequest;
use crate::controller::{FrequencyController, ToneSettings};
use crate::emitter::ToneTimer;
use crate::error::ToneError;
use crate::protocol::{DeviceMessage, HostCommand, RawCommand};

/// Serial baud rate
pub const SERIAL_BAUD: u32 = 115200;

/// Longest accepted command line
pub const MAX_CMD_LEN: usize = 64;

/// Capacity of the rendered HTML form
pub const FORM_PAGE_LEN: usize = 256;

/// HTML form page buffer
pub type FormPage = heapless::String<FORM_PAGE_LEN>;

// ── Serialization helpers ──────────────────────────────────────────────

/// Serialize a DeviceMessage to JSON bytes and write to the output buffer.
/// Returns the number of bytes written, or None if serialization failed.
pub fn serialize_message(msg: &DeviceMessage, buf: &mut [u8]) -> Option<usize> {
    match serde_json_core::to_slice(msg, buf) {
        Ok(len) => {
            // Append newline for NDJSON
            if len < buf.len() {
                buf[len] = b'\n';
                Some(len + 1)
            } else {
                Some(len)
            }
        }
        Err(_) => None,
    }
}

/// Deserialize a HostCommand from a JSON byte slice.
pub fn parse_command(data: &[u8]) -> Option<HostCommand> {
    let trimmed = trim_trailing_whitespace(data);
    if trimmed.is_empty() {
        return None;
    }
    let (raw, _) = serde_json_core::from_slice::<RawCommand>(trimmed).ok()?;
    match raw.cmd.as_str() {
        "set_frequency" => raw.hz.map(|hz| HostCommand::SetFrequency { hz }),
        "get_status" => Some(HostCommand::GetStatus),
        _ => None,
    }
}

// ── Command handling ───────────────────────────────────────────────────

/// What a host command did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The tone was replaced
    Applied(ToneSettings),
    /// The request never reached the controller
    Rejected(&'static str),
    /// Caller should answer with a status report
    StatusRequested,
}

impl CommandOutcome {
    /// Message to send back to the host, if any. Status reports need
    /// runtime data only the caller has.
    pub fn reply(&self) -> Option<DeviceMessage> {
        match self {
            CommandOutcome::Applied(settings) => Some(DeviceMessage::tone(settings)),
            CommandOutcome::Rejected(reason) => Some(DeviceMessage::Error { reason: *reason }),
            CommandOutcome::StatusRequested => None,
        }
    }
}

/// Apply a host command to the controller.
///
/// Errors are the controller's infeasible-configuration failures, which the
/// caller treats as fatal.
pub fn handle_command<T: ToneTimer, const N: usize>(
    cmd: &HostCommand,
    controller: &mut FrequencyController<'_, T, N>,
) -> Result<CommandOutcome, ToneError> {
    match *cmd {
        HostCommand::SetFrequency { hz } => match FrequencyRequest::new(hz) {
            Some(request) => controller.set_frequency(request).map(CommandOutcome::Applied),
            None => {
                log::warn!("Rejected frequency {} Hz", hz);
                Ok(CommandOutcome::Rejected("frequency must be positive"))
            }
        },
        HostCommand::GetStatus => Ok(CommandOutcome::StatusRequested),
    }
}

// ── HTTP form ──────────────────────────────────────────────────────────

/// Why a `frequency` query parameter was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryError {
    /// Not an integer
    Malformed,
    /// Zero or negative
    NonPositive,
}

/// Extract the `frequency` parameter from a request URI such as
/// `/?frequency=1200`. `Ok(None)` means the URI carries no frequency.
pub fn parse_frequency_query(uri: &str) -> Result<Option<FrequencyRequest>, QueryError> {
    let query = match uri.split_once('?') {
        Some((_, query)) => query,
        None => return Ok(None),
    };
    let value = query
        .split('&')
        .find_map(|pair| pair.strip_prefix("frequency="));
    let value = match value {
        Some(v) if !v.is_empty() => v,
        _ => return Ok(None),
    };
    let hz: i64 = value.parse().map_err(|_| QueryError::Malformed)?;
    FrequencyRequest::new(hz).map(Some).ok_or(QueryError::NonPositive)
}

/// Render the frequency form pre-filled with `frequency_hz`.
pub fn render_form_page(frequency_hz: u32, page: &mut FormPage) -> core::fmt::Result {
    page.clear();
    write!(
        page,
        "<html><body> <form action=\"\" method=\"get\"> \
         <input type=\"number\" id=\"frequency\" name=\"frequency\" value=\"{}\" /> \
         <input type=\"submit\" value=\"Send\" /> </form></body></html>\r\n\r\n",
        frequency_hz
    )
}

// ── Serial NDJSON reader ───────────────────────────────────────────────

/// Serial NDJSON reader state machine.
/// Accumulates bytes until a newline is found, then yields the line.
pub struct LineReader {
    buf: [u8; MAX_CMD_LEN],
    pos: usize,
}

impl LineReader {
    pub const fn new() -> Self {
        Self {
            buf: [0; MAX_CMD_LEN],
            pos: 0,
        }
    }

    /// Feed a byte into the reader. Returns a complete line (without newline)
    /// when one is detected.
    pub fn feed(&mut self, byte: u8) -> Option<&[u8]> {
        if byte == b'\n' || byte == b'\r' {
            if self.pos > 0 {
                let line = &self.buf[..self.pos];
                self.pos = 0;
                Some(line)
            } else {
                None
            }
        } else if self.pos < self.buf.len() {
            self.buf[self.pos] = byte;
            self.pos += 1;
            None
        } else {
            // Overflow: discard and reset
            self.pos = 0;
            None
        }
    }
}

impl Default for LineReader {
    fn default() -> Self {
        Self::new()
    }
}

fn trim_trailing_whitespace(data: &[u8]) -> &[u8] {
    let mut end = data.len();
    while end > 0 && matches!(data[end - 1], b' ' | b'\n' | b'\r' | b'\t') {
        end -= 1;
    }
    &data[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ToneConfig;
    use crate::emitter::SampleEmitter;

    const CAP: usize = 200;

    struct NoopTimer;

    impl ToneTimer for NoopTimer {
        fn pause(&mut self) {}
        fn resume(&mut self) {}
    }

    fn feed_all(reader: &mut LineReader, bytes: &[u8]) -> Option<heapless::Vec<u8, MAX_CMD_LEN>> {
        let mut out = None;
        for &b in bytes {
            if let Some(line) = reader.feed(b) {
                out = heapless::Vec::from_slice(line).ok();
            }
        }
        out
    }

    // ── Command parsing ─────────────────────────────────────────────

    #[test]
    fn parse_set_frequency() {
        assert_eq!(
            parse_command(br#"{"cmd":"set_frequency","hz":1200}"#),
            Some(HostCommand::SetFrequency { hz: 1200 })
        );
    }

    #[test]
    fn parse_set_frequency_keeps_negative_for_handler() {
        assert_eq!(
            parse_command(br#"{"cmd":"set_frequency","hz":-5}"#),
            Some(HostCommand::SetFrequency { hz: -5 })
        );
    }

    #[test]
    fn parse_set_frequency_without_hz_is_ignored() {
        assert_eq!(parse_command(br#"{"cmd":"set_frequency"}"#), None);
    }

    #[test]
    fn parse_get_status_with_trailing_newline() {
        assert_eq!(
            parse_command(b"{\"cmd\":\"get_status\"}\r\n"),
            Some(HostCommand::GetStatus)
        );
    }

    #[test]
    fn parse_rejects_unknown_and_garbage() {
        assert_eq!(parse_command(br#"{"cmd":"reboot"}"#), None);
        assert_eq!(parse_command(b"not json"), None);
        assert_eq!(parse_command(b"   "), None);
    }

    // ── Command handling ────────────────────────────────────────────

    #[test]
    fn handle_set_frequency_applies_and_replies_with_tone() {
        let emitter = SampleEmitter::<CAP>::new();
        let control = emitter.take_control().unwrap();
        let mut ctl = FrequencyController::new(control, NoopTimer, ToneConfig::new()).unwrap();

        let outcome = handle_command(&HostCommand::SetFrequency { hz: 1000 }, &mut ctl).unwrap();
        let settings = match outcome {
            CommandOutcome::Applied(s) => s,
            other => panic!("unexpected outcome {:?}", other),
        };
        assert_eq!(settings.sample_count, 143);

        let mut buf = [0u8; 128];
        let len = serialize_message(&outcome.reply().unwrap(), &mut buf).unwrap();
        let json = core::str::from_utf8(&buf[..len]).unwrap();
        assert!(json.starts_with(r#"{"type":"tone""#));
        assert!(json.ends_with('\n'));
    }

    #[test]
    fn handle_non_positive_is_rejected_without_touching_emitter() {
        let emitter = SampleEmitter::<CAP>::new();
        let control = emitter.take_control().unwrap();
        let mut ctl = FrequencyController::new(control, NoopTimer, ToneConfig::new()).unwrap();

        let outcome = handle_command(&HostCommand::SetFrequency { hz: 0 }, &mut ctl).unwrap();
        assert_eq!(outcome, CommandOutcome::Rejected("frequency must be positive"));
        assert!(matches!(outcome.reply(), Some(DeviceMessage::Error { .. })));
        assert!(!emitter.is_enabled());
        assert_eq!(ctl.current(), None);
    }

    #[test]
    fn handle_get_status_defers_to_caller() {
        let emitter = SampleEmitter::<CAP>::new();
        let control = emitter.take_control().unwrap();
        let mut ctl = FrequencyController::new(control, NoopTimer, ToneConfig::new()).unwrap();

        let outcome = handle_command(&HostCommand::GetStatus, &mut ctl).unwrap();
        assert_eq!(outcome, CommandOutcome::StatusRequested);
        assert!(outcome.reply().is_none());
    }

    #[test]
    fn handle_infeasible_frequency_propagates_error() {
        let emitter = SampleEmitter::<CAP>::new();
        let control = emitter.take_control().unwrap();
        let mut ctl = FrequencyController::new(control, NoopTimer, ToneConfig::new()).unwrap();

        let result = handle_command(&HostCommand::SetFrequency { hz: 400_000 }, &mut ctl);
        assert!(matches!(result, Err(ToneError::ConfigurationInfeasible { .. })));
    }

    // ── HTTP query ──────────────────────────────────────────────────

    #[test]
    fn query_with_frequency() {
        let req = parse_frequency_query("/?frequency=1200").unwrap().unwrap();
        assert_eq!(req.hz(), 1200);
    }

    #[test]
    fn query_among_other_params() {
        let req = parse_frequency_query("/?x=1&frequency=880&y=2").unwrap().unwrap();
        assert_eq!(req.hz(), 880);
    }

    #[test]
    fn query_absent_or_empty() {
        assert_eq!(parse_frequency_query("/"), Ok(None));
        assert_eq!(parse_frequency_query("/?"), Ok(None));
        assert_eq!(parse_frequency_query("/?frequency="), Ok(None));
        assert_eq!(parse_frequency_query("/?volume=3"), Ok(None));
    }

    #[test]
    fn query_rejects_bad_values() {
        assert_eq!(parse_frequency_query("/?frequency=abc"), Err(QueryError::Malformed));
        assert_eq!(parse_frequency_query("/?frequency=12.5"), Err(QueryError::Malformed));
        assert_eq!(parse_frequency_query("/?frequency=0"), Err(QueryError::NonPositive));
        assert_eq!(parse_frequency_query("/?frequency=-100"), Err(QueryError::NonPositive));
    }

    #[test]
    fn form_page_carries_current_frequency() {
        let mut page = FormPage::new();
        render_form_page(1000, &mut page).unwrap();
        assert!(page.starts_with("<html>"));
        assert!(page.contains(r#"name="frequency" value="1000""#));
        assert!(page.ends_with("</html>\r\n\r\n"));
    }

    // ── LineReader ──────────────────────────────────────────────────

    #[test]
    fn line_reader_yields_complete_lines() {
        let mut reader = LineReader::new();
        let line = feed_all(&mut reader, b"{\"cmd\":\"get_status\"}\n").unwrap();
        assert_eq!(parse_command(&line), Some(HostCommand::GetStatus));
    }

    #[test]
    fn line_reader_skips_blank_lines() {
        let mut reader = LineReader::new();
        assert_eq!(reader.feed(b'\r'), None);
        assert_eq!(reader.feed(b'\n'), None);
    }

    #[test]
    fn line_reader_discards_overflow() {
        let mut reader = LineReader::new();
        let long = [b'x'; MAX_CMD_LEN + 1];
        assert_eq!(feed_all(&mut reader, &long), None);
        // The byte after the overflow starts a fresh line
        let line = feed_all(&mut reader, b"ab\n").unwrap();
        assert_eq!(&line[..], b"ab");
    }
}
