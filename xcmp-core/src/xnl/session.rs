use rand::Rng;
use tracing::{debug, info, instrument};

use crate::error::{Result, XcmpError};
use crate::transport::ByteTransport;
use crate::xnl::codec::{XnlFrame, XnlProtocol};
use crate::xnl::tea::{self, TeaKey};

// XNL control opcodes are not part of the fielded opcode catalogue this
// crate exposes publicly (see xcmp::Opcode); they only need to agree with
// themselves across encode and decode, so they're kept as session-private
// constants.
const OPCODE_DEVICE_MASTER_QUERY: u16 = 0x0001;
const OPCODE_MASTER_STATUS_BROADCAST: u16 = 0x0002;
const OPCODE_DEVICE_AUTH_KEY_REQUEST: u16 = 0x0003;
const OPCODE_DEVICE_AUTH_KEY_REPLY: u16 = 0x0004;
const OPCODE_DEVICE_CONN_REQUEST: u16 = 0x0005;
const OPCODE_DEVICE_CONN_REPLY: u16 = 0x0006;
const OPCODE_DATA_MSG: u16 = 0x0007;
const OPCODE_DATA_MSG_ACK: u16 = 0x0008;

const DEVICE_TYPE_PC_APPLICATION: u8 = 0x0A;
const AUTH_LEVEL_INTERNAL: u8 = 0x00;
const CONN_REPLY_SUCCESS: u8 = 0x00;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Idle,
    Querying,
    Authenticating,
    Connecting,
    Ready,
}

/// The XNL session state machine: master discovery, authentication,
/// connection, then reliability-tagged data exchange — all layered over an
/// inner [`ByteTransport`]. Implements [`ByteTransport`] itself so an
/// [`crate::client::XcmpClient`] can sit on top of either a raw socket or
/// an authenticated XNL session without caring which.
pub struct XnlSession<T: ByteTransport> {
    transport: T,
    tea_key: TeaKey,
    state: SessionState,
    master_address: u16,
    source_address: u16,
    logical_address: u16,
    txn_id_base: u8,
    rollover: u8,
}

impl<T: ByteTransport> XnlSession<T> {
    pub fn new(transport: T, tea_key: TeaKey) -> Self {
        Self {
            transport,
            tea_key,
            state: SessionState::Idle,
            master_address: 0,
            source_address: 0,
            logical_address: 0,
            txn_id_base: 0,
            rollover: 0,
        }
    }

    pub fn logical_address(&self) -> u16 {
        self.logical_address
    }

    fn send_frame(&mut self, frame: &XnlFrame) -> Result<()> {
        self.transport.send(&frame.encode())
    }

    fn recv_frame(&mut self) -> Result<XnlFrame> {
        let bytes = self.transport.receive()?;
        XnlFrame::decode(&bytes)
    }

    fn query_master(&mut self) -> Result<()> {
        self.state = SessionState::Querying;
        self.send_frame(&XnlFrame {
            opcode: OPCODE_DEVICE_MASTER_QUERY,
            protocol: XnlProtocol::XnlCtrl,
            rollover: 0,
            ack_needed: false,
            destination: 0,
            source: 0,
            transaction_id: 0,
            payload: Vec::new(),
        })?;

        let reply = self.recv_frame()?;
        if reply.opcode != OPCODE_MASTER_STATUS_BROADCAST {
            return Err(XcmpError::OpcodeMismatch { expected: OPCODE_MASTER_STATUS_BROADCAST, got: reply.opcode });
        }
        self.master_address = reply.source;
        debug!(master = self.master_address, "master discovered");
        Ok(())
    }

    fn authenticate(&mut self) -> Result<[u8; 8]> {
        self.state = SessionState::Authenticating;
        self.send_frame(&XnlFrame {
            opcode: OPCODE_DEVICE_AUTH_KEY_REQUEST,
            protocol: XnlProtocol::XnlCtrl,
            rollover: 0,
            ack_needed: false,
            destination: self.master_address,
            source: 0,
            transaction_id: 0,
            payload: Vec::new(),
        })?;

        let reply = self.recv_frame()?;
        if reply.opcode != OPCODE_DEVICE_AUTH_KEY_REPLY {
            return Err(XcmpError::OpcodeMismatch { expected: OPCODE_DEVICE_AUTH_KEY_REPLY, got: reply.opcode });
        }
        if reply.payload.len() < 10 {
            return Err(XcmpError::Framing("DEVICE_AUTH_KEY_REPLY payload too short".into()));
        }

        let temporary_source = u16::from_be_bytes([reply.payload[0], reply.payload[1]]);
        let mut challenge = [0u8; 8];
        challenge.copy_from_slice(&reply.payload[2..10]);

        self.source_address = temporary_source;
        let response = tea::encrypt_block(challenge, &self.tea_key);
        Ok(response)
    }

    fn establish_connection(&mut self, encrypted_response: [u8; 8]) -> Result<()> {
        self.state = SessionState::Connecting;

        let mut payload = Vec::with_capacity(12);
        payload.extend_from_slice(&[0, 0]); // reserved
        payload.push(DEVICE_TYPE_PC_APPLICATION);
        payload.push(AUTH_LEVEL_INTERNAL);
        payload.extend_from_slice(&encrypted_response);

        self.send_frame(&XnlFrame {
            opcode: OPCODE_DEVICE_CONN_REQUEST,
            protocol: XnlProtocol::XnlCtrl,
            rollover: 0,
            ack_needed: false,
            destination: self.master_address,
            source: self.source_address,
            transaction_id: 0,
            payload,
        })?;

        let reply = self.recv_frame()?;
        if reply.opcode != OPCODE_DEVICE_CONN_REPLY {
            return Err(XcmpError::OpcodeMismatch { expected: OPCODE_DEVICE_CONN_REPLY, got: reply.opcode });
        }
        // result(1) + txn-id-base(1) + source(2) + logical(2) + 8 opaque echo bytes.
        const CONN_REPLY_MIN_LEN: usize = 14;
        if reply.payload.len() < CONN_REPLY_MIN_LEN {
            return Err(XcmpError::Framing(format!(
                "DEVICE_CONN_REPLY payload too short: {} bytes, need at least {CONN_REPLY_MIN_LEN}",
                reply.payload.len()
            )));
        }
        if reply.payload[0] != CONN_REPLY_SUCCESS {
            return Err(XcmpError::AuthFailure(format!(
                "DEVICE_CONN_REPLY result byte {:#04x}",
                reply.payload[0]
            )));
        }

        self.txn_id_base = reply.payload[1];
        self.source_address = u16::from_be_bytes([reply.payload[2], reply.payload[3]]);
        self.logical_address = u16::from_be_bytes([reply.payload[4], reply.payload[5]]);
        // payload[6..] (if present) is an opaque echo we have no use for.

        self.state = SessionState::Ready;
        info!(
            source = self.source_address,
            logical = self.logical_address,
            "xnl session ready"
        );
        Ok(())
    }

    fn next_transaction_id(&self) -> u16 {
        let low: u8 = rand::rng().random();
        (u16::from(self.txn_id_base) << 8) | u16::from(low)
    }
}

impl<T: ByteTransport> ByteTransport for XnlSession<T> {
    #[instrument(skip(self))]
    fn connect(&mut self) -> Result<()> {
        if self.state != SessionState::Idle {
            return Err(XcmpError::Config("session is already connecting or connected".into()));
        }
        self.transport.connect()?;

        // Any failure during this sequence is fatal; the session is left
        // disconnected and requires a fresh connect() to recover.
        let result = (|| {
            self.query_master()?;
            let response = self.authenticate()?;
            self.establish_connection(response)
        })();

        if result.is_err() {
            self.state = SessionState::Idle;
            let _ = self.transport.disconnect();
        }
        result
    }

    fn disconnect(&mut self) -> Result<()> {
        if self.state == SessionState::Idle {
            return Ok(());
        }
        self.state = SessionState::Idle;
        self.transport.disconnect()
    }

    fn send(&mut self, data: &[u8]) -> Result<()> {
        if self.state != SessionState::Ready {
            return Err(XcmpError::NotConnected);
        }

        let transaction_id = self.next_transaction_id();
        let frame = XnlFrame {
            opcode: OPCODE_DATA_MSG,
            protocol: XnlProtocol::Xcmp,
            rollover: self.rollover,
            ack_needed: true,
            destination: self.master_address,
            source: self.source_address,
            transaction_id,
            payload: data.to_vec(),
        };
        self.send_frame(&frame)?;

        let ack = self.recv_frame()?;
        if ack.opcode != OPCODE_DATA_MSG_ACK {
            return Err(XcmpError::OpcodeMismatch { expected: OPCODE_DATA_MSG_ACK, got: ack.opcode });
        }
        if ack.rollover != self.rollover || ack.transaction_id != transaction_id {
            return Err(XcmpError::AckMismatch);
        }

        self.rollover = (self.rollover + 1) % 8;
        Ok(())
    }

    fn receive(&mut self) -> Result<Vec<u8>> {
        if self.state != SessionState::Ready {
            return Err(XcmpError::NotConnected);
        }

        let frame = self.recv_frame()?;
        if frame.protocol != XnlProtocol::Xcmp {
            return Err(XcmpError::Framing("expected an XCMP-carrying XNL frame".into()));
        }

        if frame.opcode == OPCODE_DATA_MSG && frame.ack_needed {
            let ack = XnlFrame {
                opcode: OPCODE_DATA_MSG_ACK,
                protocol: XnlProtocol::XnlCtrl,
                rollover: frame.rollover,
                ack_needed: false,
                destination: frame.source,
                source: self.source_address,
                transaction_id: frame.transaction_id,
                payload: Vec::new(),
            };
            self.send_frame(&ack)?;
        }

        Ok(frame.payload)
    }

    fn is_connected(&self) -> bool {
        self.state == SessionState::Ready
    }
}
