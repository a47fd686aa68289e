use crate::error::{Result, XcmpError};
use crate::xcmp::{Opcode, ResultCode};

/// The three message shapes carried by the outer XCMP framing.
///
/// Values are the wire-level nibble occupying the top 4 bits of the
/// 2-byte header; the 0x8 high bit distinguishes a reply from the request
/// it answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Request,
    Response,
    Broadcast,
}

impl MessageType {
    const fn nibble(self) -> u8 {
        match self {
            Self::Request => 0x0,
            Self::Broadcast => 0x4,
            Self::Response => 0x8,
        }
    }

    const fn from_nibble(nibble: u8) -> Result<Self> {
        match nibble {
            0x0 => Ok(Self::Request),
            0x4 => Ok(Self::Broadcast),
            0x8 => Ok(Self::Response),
            other => Err(XcmpError::Framing(format!("unrecognized message type nibble {other:#x}"))),
        }
    }
}

/// A decoded XCMP frame: header plus an optional result code plus payload.
///
/// Owns its bytes — there is no shared-buffer reparsing here, by design
/// (see the typed-view notes in the typed message modules).
#[derive(Debug, Clone)]
pub struct XcmpMessage {
    pub message_type: MessageType,
    pub opcode: Opcode,
    pub result: Option<ResultCode>,
    pub payload: Vec<u8>,
}

impl XcmpMessage {
    pub fn request(opcode: Opcode, payload: Vec<u8>) -> Self {
        Self { message_type: MessageType::Request, opcode, result: None, payload }
    }

    pub fn response(opcode: Opcode, result: ResultCode, payload: Vec<u8>) -> Self {
        Self { message_type: MessageType::Response, opcode, result: Some(result), payload }
    }

    pub fn broadcast(opcode: Opcode, payload: Vec<u8>) -> Self {
        Self { message_type: MessageType::Broadcast, opcode, result: None, payload }
    }

    /// Encode this message to its wire bytes, including the 2-byte length
    /// prefix.
    pub fn encode(&self) -> Vec<u8> {
        let opcode = self.opcode.raw();
        let header_hi = (self.message_type.nibble() << 4) | ((opcode >> 8) as u8 & 0x0F);
        let header_lo = (opcode & 0xFF) as u8;

        let has_result = matches!(self.message_type, MessageType::Response);
        let body_len = 2 + usize::from(has_result) + self.payload.len();

        let mut out = Vec::with_capacity(2 + body_len);
        out.extend_from_slice(&(body_len as u16).to_be_bytes());
        out.push(header_hi);
        out.push(header_lo);
        if let Some(result) = self.result {
            out.push(result.raw());
        }
        out.extend_from_slice(&self.payload);
        out
    }

    /// Decode a message from its wire bytes, including the 2-byte length
    /// prefix. Fails with [`XcmpError::Framing`] if the declared length
    /// disagrees with the bytes actually present (invariant (i) of the
    /// protocol).
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(XcmpError::Framing(format!(
                "frame too short: {} bytes, need at least 4",
                data.len()
            )));
        }

        let declared_len = u16::from_be_bytes([data[0], data[1]]) as usize;
        let available = data.len() - 2;
        if declared_len != available {
            return Err(XcmpError::Framing(format!(
                "declared length {declared_len} does not match available {available} bytes"
            )));
        }

        let header = u16::from_be_bytes([data[2], data[3]]);
        let message_type = MessageType::from_nibble((header >> 12) as u8)?;
        let opcode = Opcode::from_raw(header & 0x0FFF);

        let mut offset = 4;
        let result = if message_type == MessageType::Response {
            let byte = *data
                .get(offset)
                .ok_or_else(|| XcmpError::Framing("response missing result byte".into()))?;
            offset += 1;
            Some(ResultCode::from_raw(byte))
        } else {
            None
        };

        let payload = data[offset..].to_vec();
        Ok(Self { message_type, opcode, result, payload })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_request_round_trip() {
        let msg = XcmpMessage::request(Opcode::Ping, Vec::new());
        let bytes = msg.encode();
        assert_eq!(bytes, [0x00, 0x02, 0x00, 0x00]);

        let decoded = XcmpMessage::decode(&bytes).unwrap();
        assert_eq!(decoded.message_type, MessageType::Request);
        assert_eq!(decoded.opcode.raw(), Opcode::Ping.raw());
        assert!(decoded.result.is_none());
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn ping_response_round_trip() {
        let msg = XcmpMessage::response(Opcode::Ping, ResultCode::Success, Vec::new());
        let bytes = msg.encode();
        assert_eq!(bytes, [0x00, 0x03, 0x80, 0x00, 0x00]);

        let decoded = XcmpMessage::decode(&bytes).unwrap();
        assert_eq!(decoded.message_type, MessageType::Response);
        assert_eq!(decoded.result, Some(ResultCode::Success));
    }

    #[test]
    fn get_serial_number_round_trip() {
        let request = XcmpMessage::request(Opcode::SerialNumber, Vec::new());
        assert_eq!(request.encode(), [0x00, 0x02, 0x04, 0x00]);

        let reply = XcmpMessage::response(Opcode::SerialNumber, ResultCode::Success, b"ABC123\0".to_vec());
        let bytes = reply.encode();
        let decoded = XcmpMessage::decode(&bytes).unwrap();
        assert_eq!(decoded.payload, b"ABC123\0");
    }

    #[test]
    fn declared_length_mismatch_is_a_framing_error() {
        let mut bytes = XcmpMessage::request(Opcode::Ping, Vec::new()).encode();
        bytes[1] += 1; // corrupt the declared length
        let err = XcmpMessage::decode(&bytes).unwrap_err();
        assert!(matches!(err, XcmpError::Framing(_)));
    }

    #[test]
    fn pack_unpack_header_round_trip() {
        for opcode_raw in [0x000u16, 0x400, 0x7FF, 0xFFF] {
            for ty in [MessageType::Request, MessageType::Response, MessageType::Broadcast] {
                let header_hi = (ty.nibble() << 4) | ((opcode_raw >> 8) as u8 & 0x0F);
                let header_lo = (opcode_raw & 0xFF) as u8;
                let header = u16::from_be_bytes([header_hi, header_lo]);
                let round_type = MessageType::from_nibble((header >> 12) as u8).unwrap();
                let round_opcode = header & 0x0FFF;
                assert_eq!(round_type, ty);
                assert_eq!(round_opcode, opcode_raw);
            }
        }
    }
}
