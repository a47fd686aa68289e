use std::time::{Duration, Instant};

use tracing::{debug, info, instrument};

use crate::error::{Result, XcmpError};
use crate::transport::ByteTransport;
use crate::xcmp::messages::{
    DisplayTextMessage, DisplayTimer, DisplayUpdateQuery, SoftpotMessage, SoftpotOperation, SoftpotValue,
    TextEncoding, PRIMARY_ID, PRIMARY_REGION,
};
use crate::xcmp::{MessageType, Opcode, ResultCode, XcmpMessage};

const SEND_BYTES_TIMEOUT: Duration = Duration::from_secs(5);
const REPLY_MARKER_OFFSET: u16 = 0x8000;

const HZ_PER_STEP: u64 = 5;
const P25_FRAME_BITS: u64 = 3456;
const BER_FRAME_GAP: Duration = Duration::from_millis(800);

/// Device identity captured by [`XcmpClient::connect`].
#[derive(Debug, Clone, Default)]
pub struct DeviceIdentity {
    pub serial: String,
    pub model: String,
    pub host_version: String,
    pub dsp_version: String,
}

/// The BER sync status carried by byte 1 of each report group in a
/// [`BerSyncReport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BerSyncStatus {
    InSync,
    NoSync,
    Lost,
    Unknown(u8),
}

impl BerSyncStatus {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0x00 => Self::InSync,
            0x01 => Self::NoSync,
            0x02 => Self::Lost,
            other => Self::Unknown(other),
        }
    }
}

/// One 5-byte group from a BER_SYNC_REPORT payload.
#[derive(Debug, Clone, Copy)]
struct BerReportFrame {
    sync_status: BerSyncStatus,
    bit_errors: u32,
}

/// The high-level client: owns a [`ByteTransport`] (typically an
/// [`crate::xnl::XnlSession`]) and builds/interprets the typed XCMP
/// messages the operations below exchange over it.
pub struct XcmpClient<T: ByteTransport> {
    transport: T,
    identity: Option<DeviceIdentity>,
}

impl<T: ByteTransport> XcmpClient<T> {
    pub fn new(transport: T) -> Self {
        Self { transport, identity: None }
    }

    pub fn identity(&self) -> Option<&DeviceIdentity> {
        self.identity.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Bring up the transport and populate [`Self::identity`] from the
    /// device. Skip identity population with [`Self::connect_without_probe`]
    /// when driving the client against a test double that doesn't answer
    /// those requests.
    #[instrument(skip(self))]
    pub fn connect(&mut self) -> Result<()> {
        self.transport.connect()?;
        let serial = self.get_serial()?;
        let model = self.get_model()?;
        let host_version = self.get_host_version()?;
        let dsp_version = self.get_dsp_version()?;
        self.identity = Some(DeviceIdentity { serial, model, host_version, dsp_version });
        info!(identity = ?self.identity, "client connected");
        Ok(())
    }

    /// Bring up the transport without the identity probe sequence.
    pub fn connect_without_probe(&mut self) -> Result<()> {
        self.transport.connect()
    }

    pub fn disconnect(&mut self) -> Result<()> {
        self.identity = None;
        self.transport.disconnect()
    }

    /// Send a request and read back its matching response, verifying
    /// message type, opcode, and result along the way.
    fn send(&mut self, message: &XcmpMessage, expected_reply_type: MessageType) -> Result<XcmpMessage> {
        self.transport.send(&message.encode())?;
        let bytes = self.transport.receive()?;
        let reply = XcmpMessage::decode(&bytes)?;

        if reply.message_type != expected_reply_type {
            return Err(XcmpError::UnexpectedReplyType { expected: expected_reply_type, got: reply.message_type });
        }
        if reply.opcode.raw() != message.opcode.raw() {
            return Err(XcmpError::OpcodeMismatch { expected: message.opcode.raw(), got: reply.opcode.raw() });
        }
        match reply.result {
            Some(result) if !result.is_success() => return Err(XcmpError::ResultFailure(result)),
            _ => {}
        }
        Ok(reply)
    }

    /// Fire-and-forget: write the message, do not wait for a reply.
    pub fn write(&mut self, message: &XcmpMessage) -> Result<()> {
        self.transport.send(&message.encode())
    }

    /// Raw opcode-first byte exchange, for opcodes this client has no
    /// typed wrapper for: `body` is a header-and-payload pair (what
    /// [`XcmpMessage::encode`] produces without its 2-byte length prefix).
    /// The length prefix is added here, the frame is sent, and `receive()`
    /// is polled until a frame's header word equals the outgoing header
    /// plus the reply-marker offset (0x8000), or five seconds elapse.
    pub fn send_bytes(&mut self, body: &[u8]) -> Result<Vec<u8>> {
        if body.len() < 2 {
            return Err(XcmpError::Framing("sendBytes body must carry at least a 2-byte header".into()));
        }
        let outgoing_header = u16::from_be_bytes([body[0], body[1]]);

        let mut frame = Vec::with_capacity(2 + body.len());
        frame.extend_from_slice(&(body.len() as u16).to_be_bytes());
        frame.extend_from_slice(body);
        self.transport.send(&frame)?;

        let marker = outgoing_header.wrapping_add(REPLY_MARKER_OFFSET);
        let deadline = Instant::now() + SEND_BYTES_TIMEOUT;
        while Instant::now() < deadline {
            let reply = match self.transport.receive() {
                Ok(reply) => reply,
                // The transport's own receive timeout (e.g. TcpTransport's
                // 1-second default) is shorter than sendBytes' 5-second
                // overall wait; keep polling until our deadline, not its.
                Err(XcmpError::Timeout) => continue,
                Err(err) => return Err(err),
            };
            if reply.len() >= 4 && u16::from_be_bytes([reply[2], reply[3]]) == marker {
                return Ok(reply);
            }
            debug!("sendBytes: discarding frame not matching reply marker {marker:#06x}");
        }
        Err(XcmpError::Timeout)
    }

    /// `width` is the byte width of the addressed softpot type (1, 2, or
    /// 4) — configuration knowledge about that softpot, not carried on
    /// the wire (spec §4.3). For a request that already carries a value
    /// (e.g. a write), `msg.values`' own width is authoritative and
    /// `width` is ignored; for a bare read/query, `width` is what the
    /// reply is decoded with.
    fn send_softpot(&mut self, msg: &SoftpotMessage, width: u8) -> Result<SoftpotMessage> {
        let reply = self.send(&XcmpMessage::request(Opcode::Softpot, msg.encode()), MessageType::Response)?;
        let width = msg.values.first().map_or(width, |v| v.width() as u8);
        let decoded = SoftpotMessage::decode(&reply.payload, width)?;
        if decoded.softpot_type != msg.softpot_type {
            return Err(XcmpError::Framing(format!(
                "softpot type echo mismatch: sent {}, got {}",
                msg.softpot_type, decoded.softpot_type
            )));
        }
        Ok(decoded)
    }

    pub fn ping(&mut self) -> Result<bool> {
        self.send(&XcmpMessage::request(Opcode::Ping, Vec::new()), MessageType::Response)?;
        Ok(true)
    }

    fn get_identity_string(&mut self, opcode: Opcode) -> Result<String> {
        let reply = self.send(&XcmpMessage::request(opcode, Vec::new()), MessageType::Response)?;
        let text = reply.payload.iter().take_while(|&&b| b != 0).map(|&b| b as char).collect();
        Ok(text)
    }

    pub fn get_serial(&mut self) -> Result<String> {
        self.get_identity_string(Opcode::SerialNumber)
    }

    pub fn get_model(&mut self) -> Result<String> {
        self.get_identity_string(Opcode::ModelNumber)
    }

    pub fn get_host_version(&mut self) -> Result<String> {
        self.get_identity_string(Opcode::HostVersion)
    }

    pub fn get_dsp_version(&mut self) -> Result<String> {
        self.get_identity_string(Opcode::DspVersion)
    }

    pub fn set_tx_frequency(&mut self, hz: u64) -> Result<()> {
        self.send(&XcmpMessage::request(Opcode::TxFrequency, frequency_to_bytes(hz).to_vec()), MessageType::Response)?;
        Ok(())
    }

    pub fn set_rx_frequency(&mut self, hz: u64) -> Result<()> {
        self.send(&XcmpMessage::request(Opcode::RxFrequency, frequency_to_bytes(hz).to_vec()), MessageType::Response)?;
        Ok(())
    }

    pub fn get_tx_frequency(&mut self) -> Result<u64> {
        let reply = self.send(&XcmpMessage::request(Opcode::TxFrequency, Vec::new()), MessageType::Response)?;
        decode_frequency_payload(&reply.payload)
    }

    pub fn get_rx_frequency(&mut self) -> Result<u64> {
        let reply = self.send(&XcmpMessage::request(Opcode::RxFrequency, Vec::new()), MessageType::Response)?;
        decode_frequency_payload(&reply.payload)
    }

    pub fn keyup(&mut self) -> Result<()> {
        self.send(&XcmpMessage::request(Opcode::Keyup, Vec::new()), MessageType::Response)?;
        Ok(())
    }

    pub fn dekey(&mut self) -> Result<()> {
        self.send(&XcmpMessage::request(Opcode::Dekey, Vec::new()), MessageType::Response)?;
        Ok(())
    }

    pub fn set_display_text(&mut self, token: u8, class: u8, encoding: TextEncoding, text: &str) -> Result<()> {
        let msg = DisplayTextMessage::Update(DisplayUpdateQuery {
            token,
            region: PRIMARY_REGION,
            id: PRIMARY_ID,
            timer: DisplayTimer::Permanent,
            class,
            encoding,
            text: text.to_string(),
        });
        self.send(&XcmpMessage::request(Opcode::DisplayText, msg.encode()), MessageType::Response)?;
        Ok(())
    }

    pub fn get_display_text(&mut self, token: u8, class: u8, encoding: TextEncoding) -> Result<String> {
        let query = DisplayTextMessage::Query(DisplayUpdateQuery {
            token,
            region: PRIMARY_REGION,
            id: PRIMARY_ID,
            timer: DisplayTimer::Permanent,
            class,
            encoding,
            text: String::new(),
        });
        let reply = self.send(&XcmpMessage::request(Opcode::DisplayText, query.encode()), MessageType::Response)?;
        match DisplayTextMessage::decode(&reply.payload)? {
            DisplayTextMessage::Query(fields) | DisplayTextMessage::Update(fields) => Ok(fields.text),
            other => Err(XcmpError::Framing(format!("unexpected display-text reply shape: {other:?}"))),
        }
    }

    /// `width` (1, 2, or 4 bytes) is caller-supplied configuration
    /// knowledge about the addressed softpot type — it is not carried on
    /// the wire, so a bare read request cannot infer it from the request
    /// itself (spec §4.3).
    pub fn softpot_get_value(&mut self, softpot_type: u8, width: u8) -> Result<SoftpotValue> {
        let reply = self.send_softpot(&SoftpotMessage::query(SoftpotOperation::Read, softpot_type), width)?;
        reply.values.into_iter().next().ok_or_else(|| XcmpError::Framing("softpot read returned no value".into()))
    }

    pub fn softpot_set_value(&mut self, softpot_type: u8, value: SoftpotValue) -> Result<()> {
        let width = value.width() as u8;
        self.send_softpot(&SoftpotMessage::single(SoftpotOperation::Write, softpot_type, value), width)?;
        Ok(())
    }

    /// See [`Self::softpot_get_value`] for why `width` must be supplied.
    pub fn softpot_get_params(&mut self, softpot_type: u8, width: u8) -> Result<(SoftpotValue, SoftpotValue)> {
        let min = self.send_softpot(&SoftpotMessage::query(SoftpotOperation::ReadMin, softpot_type), width)?;
        let max = self.send_softpot(&SoftpotMessage::query(SoftpotOperation::ReadMax, softpot_type), width)?;
        let min = min.values.into_iter().next().ok_or_else(|| XcmpError::Framing("softpot min read returned no value".into()))?;
        let max = max.values.into_iter().next().ok_or_else(|| XcmpError::Framing("softpot max read returned no value".into()))?;
        Ok((min, max))
    }

    pub fn get_device_init_status(&mut self) -> Result<crate::xcmp::messages::DeviceInitStatus> {
        let reply = self.send(&XcmpMessage::request(Opcode::DeviceInitStatus, Vec::new()), MessageType::Broadcast)?;
        crate::xcmp::messages::DeviceInitStatus::decode(&reply.payload)
    }

    /// Configure the RX chain for the P25 BER test pattern, arm a
    /// continuous-mode BER test for `frame_count` frames, wait for the
    /// frames to accumulate, then request and interpret the sync report.
    ///
    /// Returns the fraction of erroneous bits among accepted (in-sync)
    /// frames: `totalErrors / (P25_FRAME_BITS * frame_count * acceptedFrames)`.
    #[instrument(skip(self))]
    pub fn get_p25_ber(&mut self, frame_count: u32) -> Result<f64> {
        self.send(&XcmpMessage::request(Opcode::RxChainConfig, vec![P25_PATTERN_ID]), MessageType::Response)?;

        let mut arm_payload = Vec::with_capacity(5);
        arm_payload.push(BER_MODE_CONTINUOUS);
        arm_payload.extend_from_slice(&frame_count.to_be_bytes());
        self.send(&XcmpMessage::request(Opcode::BerTestControl, arm_payload), MessageType::Response)?;

        std::thread::sleep(BER_FRAME_GAP * frame_count);

        let reply = self.send(&XcmpMessage::request(Opcode::BerSyncReport, Vec::new()), MessageType::Response)?;
        let frames = parse_ber_report(&reply.payload)?;

        let mut total_errors: u64 = 0;
        let mut accepted_frames: u64 = 0;
        for frame in frames {
            if matches!(frame.sync_status, BerSyncStatus::NoSync | BerSyncStatus::Lost) {
                continue;
            }
            total_errors += u64::from(frame.bit_errors);
            accepted_frames += 1;
        }

        if accepted_frames == 0 {
            return Err(XcmpError::Framing("BER sync report had no accepted frames".into()));
        }

        Ok(total_errors as f64 / (P25_FRAME_BITS * u64::from(frame_count) * accepted_frames) as f64)
    }
}

const P25_PATTERN_ID: u8 = 0x01;
const BER_MODE_CONTINUOUS: u8 = 0x01;
const BER_REPORT_GROUP_LEN: usize = 5;

fn parse_ber_report(payload: &[u8]) -> Result<Vec<BerReportFrame>> {
    if payload.len() % BER_REPORT_GROUP_LEN != 0 {
        return Err(XcmpError::Framing(format!(
            "BER sync report length {} is not a multiple of {BER_REPORT_GROUP_LEN}",
            payload.len()
        )));
    }
    Ok(payload
        .chunks_exact(BER_REPORT_GROUP_LEN)
        .map(|group| BerReportFrame {
            sync_status: BerSyncStatus::from_raw(group[1]),
            bit_errors: u32::from_be_bytes([0, group[2], group[3], group[4]]),
        })
        .collect())
}

fn frequency_to_bytes(hz: u64) -> [u8; 4] {
    ((hz / HZ_PER_STEP) as u32).to_be_bytes()
}

fn bytes_to_frequency(bytes: [u8; 4]) -> u64 {
    u64::from(u32::from_be_bytes(bytes)) * HZ_PER_STEP
}

fn decode_frequency_payload(payload: &[u8]) -> Result<u64> {
    let bytes: [u8; 4] = payload
        .get(0..4)
        .ok_or_else(|| XcmpError::Framing(format!("frequency payload too short: {} bytes", payload.len())))?
        .try_into()
        .unwrap();
    Ok(bytes_to_frequency(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::XcmpError;
    use crate::xcmp::ResultCode;
    use std::collections::VecDeque;

    struct ScriptedTransport {
        incoming: VecDeque<Vec<u8>>,
        connected: bool,
    }

    impl ScriptedTransport {
        fn new(incoming: Vec<Vec<u8>>) -> Self {
            Self { incoming: incoming.into(), connected: true }
        }
    }

    impl ByteTransport for ScriptedTransport {
        fn connect(&mut self) -> Result<()> {
            self.connected = true;
            Ok(())
        }
        fn disconnect(&mut self) -> Result<()> {
            self.connected = false;
            Ok(())
        }
        fn send(&mut self, _bytes: &[u8]) -> Result<()> {
            Ok(())
        }
        fn receive(&mut self) -> Result<Vec<u8>> {
            self.incoming.pop_front().ok_or(XcmpError::Timeout)
        }
        fn is_connected(&self) -> bool {
            self.connected
        }
    }

    #[test]
    fn ping_reads_a_success_response() {
        let reply = XcmpMessage::response(Opcode::Ping, ResultCode::Success, Vec::new()).encode();
        let transport = ScriptedTransport::new(vec![reply]);
        let mut client = XcmpClient::new(transport);
        assert!(client.ping().unwrap());
    }

    #[test]
    fn get_serial_strips_the_trailing_nul() {
        let reply = XcmpMessage::response(Opcode::SerialNumber, ResultCode::Success, b"ABC123\0".to_vec()).encode();
        let transport = ScriptedTransport::new(vec![reply]);
        let mut client = XcmpClient::new(transport);
        assert_eq!(client.get_serial().unwrap(), "ABC123");
    }

    #[test]
    fn non_success_result_is_a_result_failure_error() {
        let reply = XcmpMessage::response(Opcode::Ping, ResultCode::Busy, Vec::new()).encode();
        let transport = ScriptedTransport::new(vec![reply]);
        let mut client = XcmpClient::new(transport);
        let err = client.ping().unwrap_err();
        assert!(matches!(err, XcmpError::ResultFailure(ResultCode::Busy)));
    }

    #[test]
    fn frequency_round_trips_through_the_wire_encoding() {
        let bytes = frequency_to_bytes(851_012_500);
        let hz = bytes_to_frequency(bytes);
        assert_eq!(hz, 851_012_500);
    }

    #[test]
    fn wrong_opcode_in_reply_is_an_opcode_mismatch() {
        let reply = XcmpMessage::response(Opcode::Dekey, ResultCode::Success, Vec::new()).encode();
        let transport = ScriptedTransport::new(vec![reply]);
        let mut client = XcmpClient::new(transport);
        let err = client.keyup().unwrap_err();
        assert!(matches!(err, XcmpError::OpcodeMismatch { .. }));
    }

    #[test]
    fn ber_report_ignores_no_sync_and_lost_frames() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&[0x00, 0x00, 0x00, 0x00, 0x0A]); // in-sync, 10 errors
        payload.extend_from_slice(&[0x01, 0x01, 0x00, 0x00, 0xFF]); // no-sync, ignored
        payload.extend_from_slice(&[0x02, 0x00, 0x00, 0x00, 0x06]); // in-sync, 6 errors
        let frames = parse_ber_report(&payload).unwrap();
        let accepted: u64 = frames
            .iter()
            .filter(|f| !matches!(f.sync_status, BerSyncStatus::NoSync | BerSyncStatus::Lost))
            .map(|f| u64::from(f.bit_errors))
            .sum();
        assert_eq!(accepted, 16);
    }

    #[test]
    fn send_bytes_skips_frames_until_the_reply_marker_matches() {
        let wrong_opcode_reply = XcmpMessage::response(Opcode::Dekey, ResultCode::Success, Vec::new()).encode();
        let matching_reply = XcmpMessage::response(Opcode::Keyup, ResultCode::Success, vec![0xAB]).encode();
        let transport = ScriptedTransport::new(vec![wrong_opcode_reply, matching_reply.clone()]);
        let mut client = XcmpClient::new(transport);

        let body = [0x04, 0x20]; // request header for Opcode::Keyup (0x420)
        let reply = client.send_bytes(&body).unwrap();
        assert_eq!(reply, matching_reply);
    }

    #[test]
    fn send_bytes_rejects_a_body_without_a_header() {
        let transport = ScriptedTransport::new(Vec::new());
        let mut client = XcmpClient::new(transport);
        assert!(matches!(client.send_bytes(&[0x01]).unwrap_err(), XcmpError::Framing(_)));
    }

    /// A transport whose `receive()` times out a few times (as a real
    /// transport's own shorter read timeout would) before finally handing
    /// back the scripted reply, to confirm `send_bytes` keeps polling past
    /// those instead of surfacing the first one.
    struct FlakyTransport {
        timeouts_before_reply: u32,
        reply: Option<Vec<u8>>,
    }

    impl ByteTransport for FlakyTransport {
        fn connect(&mut self) -> Result<()> {
            Ok(())
        }
        fn disconnect(&mut self) -> Result<()> {
            Ok(())
        }
        fn send(&mut self, _bytes: &[u8]) -> Result<()> {
            Ok(())
        }
        fn receive(&mut self) -> Result<Vec<u8>> {
            if self.timeouts_before_reply > 0 {
                self.timeouts_before_reply -= 1;
                return Err(XcmpError::Timeout);
            }
            self.reply.take().ok_or(XcmpError::Timeout)
        }
        fn is_connected(&self) -> bool {
            true
        }
    }

    #[test]
    fn softpot_get_value_decodes_a_two_byte_value_at_the_caller_supplied_width() {
        let reply_msg = SoftpotMessage::single(SoftpotOperation::Read, 9, SoftpotValue::U16(0x1234));
        let reply = XcmpMessage::response(Opcode::Softpot, ResultCode::Success, reply_msg.encode()).encode();
        let transport = ScriptedTransport::new(vec![reply]);
        let mut client = XcmpClient::new(transport);
        assert_eq!(client.softpot_get_value(9, 2).unwrap(), SoftpotValue::U16(0x1234));
    }

    #[test]
    fn softpot_get_params_decodes_four_byte_min_and_max() {
        let min_reply = SoftpotMessage::single(SoftpotOperation::ReadMin, 2, SoftpotValue::U32(10)).encode();
        let max_reply = SoftpotMessage::single(SoftpotOperation::ReadMax, 2, SoftpotValue::U32(2000)).encode();
        let transport = ScriptedTransport::new(vec![
            XcmpMessage::response(Opcode::Softpot, ResultCode::Success, min_reply).encode(),
            XcmpMessage::response(Opcode::Softpot, ResultCode::Success, max_reply).encode(),
        ]);
        let mut client = XcmpClient::new(transport);
        let (min, max) = client.softpot_get_params(2, 4).unwrap();
        assert_eq!(min, SoftpotValue::U32(10));
        assert_eq!(max, SoftpotValue::U32(2000));
    }

    #[test]
    fn send_bytes_retries_past_the_transports_own_timeout() {
        let matching_reply = XcmpMessage::response(Opcode::Keyup, ResultCode::Success, vec![0xAB]).encode();
        let transport = FlakyTransport { timeouts_before_reply: 3, reply: Some(matching_reply.clone()) };
        let mut client = XcmpClient::new(transport);

        let body = [0x04, 0x20]; // request header for Opcode::Keyup (0x420)
        let reply = client.send_bytes(&body).unwrap();
        assert_eq!(reply, matching_reply);
    }
}
