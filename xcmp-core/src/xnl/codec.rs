use tracing::warn;

use crate::error::{Result, XcmpError};

const HEADER_LEN: usize = 12;

/// The protocol id carried in byte 2 of the XNL header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XnlProtocol {
    XnlCtrl,
    Xcmp,
}

impl XnlProtocol {
    const fn raw(self) -> u8 {
        match self {
            Self::XnlCtrl => 0,
            Self::Xcmp => 1,
        }
    }

    const fn from_raw(raw: u8) -> Result<Self> {
        match raw {
            0 => Ok(Self::XnlCtrl),
            1 => Ok(Self::Xcmp),
            other => Err(XcmpError::Framing(format!("unrecognized XNL protocol id {other}"))),
        }
    }
}

/// A decoded XNL frame: the fixed 12-byte header plus a variable payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XnlFrame {
    pub opcode: u16,
    pub protocol: XnlProtocol,
    pub rollover: u8,
    pub ack_needed: bool,
    pub destination: u16,
    pub source: u16,
    pub transaction_id: u16,
    pub payload: Vec<u8>,
}

impl XnlFrame {
    pub fn encode(&self) -> Vec<u8> {
        let flags = (self.rollover & 0x07) | (u8::from(self.ack_needed) << 3);
        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len());
        out.extend_from_slice(&self.opcode.to_be_bytes());
        out.push(self.protocol.raw());
        out.push(flags);
        out.extend_from_slice(&self.destination.to_be_bytes());
        out.extend_from_slice(&self.source.to_be_bytes());
        out.extend_from_slice(&self.transaction_id.to_be_bytes());
        out.extend_from_slice(&(self.payload.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    /// Decode a frame. Payload length is authoritative; any bytes beyond
    /// `header + payload_length` are logged and ignored, not treated as an
    /// error.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_LEN {
            return Err(XcmpError::Framing(format!(
                "XNL frame shorter than the 12-byte header: {} bytes",
                data.len()
            )));
        }

        let opcode = u16::from_be_bytes([data[0], data[1]]);
        let protocol = XnlProtocol::from_raw(data[2])?;
        let flags = data[3];
        let rollover = flags & 0x07;
        let ack_needed = flags & 0x08 != 0;
        let destination = u16::from_be_bytes([data[4], data[5]]);
        let source = u16::from_be_bytes([data[6], data[7]]);
        let transaction_id = u16::from_be_bytes([data[8], data[9]]);
        let payload_len = u16::from_be_bytes([data[10], data[11]]) as usize;

        let available = data.len() - HEADER_LEN;
        if payload_len > available {
            return Err(XcmpError::Framing(format!(
                "XNL payload length {payload_len} exceeds the {available} bytes available"
            )));
        }
        if payload_len < available {
            warn!(extra = available - payload_len, "ignoring trailing bytes beyond declared XNL payload length");
        }

        let payload = data[HEADER_LEN..HEADER_LEN + payload_len].to_vec();
        Ok(Self { opcode, protocol, rollover, ack_needed, destination, source, transaction_id, payload })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> XnlFrame {
        XnlFrame {
            opcode: 0x0102,
            protocol: XnlProtocol::Xcmp,
            rollover: 5,
            ack_needed: true,
            destination: 0x1111,
            source: 0x2222,
            transaction_id: 0x3344,
            payload: vec![0xAA, 0xBB, 0xCC],
        }
    }

    #[test]
    fn round_trip() {
        let frame = sample();
        let bytes = frame.encode();
        assert_eq!(bytes.len(), HEADER_LEN + 3);
        let decoded = XnlFrame::decode(&bytes).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn flags_pack_rollover_and_ack_bit() {
        let frame = XnlFrame { rollover: 7, ack_needed: false, ..sample() };
        let bytes = frame.encode();
        assert_eq!(bytes[3], 0x07);

        let frame = XnlFrame { rollover: 0, ack_needed: true, ..sample() };
        let bytes = frame.encode();
        assert_eq!(bytes[3], 0x08);
    }

    #[test]
    fn zero_length_payload_is_valid() {
        let frame = XnlFrame { payload: Vec::new(), ..sample() };
        let bytes = frame.encode();
        assert_eq!(bytes.len(), HEADER_LEN);
        assert_eq!(XnlFrame::decode(&bytes).unwrap().payload.len(), 0);
    }

    #[test]
    fn trailing_bytes_beyond_declared_length_are_ignored() {
        let mut bytes = sample().encode();
        bytes.extend_from_slice(&[0xFF, 0xFF]);
        let decoded = XnlFrame::decode(&bytes).unwrap();
        assert_eq!(decoded.payload, vec![0xAA, 0xBB, 0xCC]);
    }

    #[test]
    fn declared_length_longer_than_available_is_a_framing_error() {
        let mut bytes = sample().encode();
        bytes[10] = 0xFF;
        bytes[11] = 0xFF;
        let err = XnlFrame::decode(&bytes).unwrap_err();
        assert!(matches!(err, XcmpError::Framing(_)));
    }
}
