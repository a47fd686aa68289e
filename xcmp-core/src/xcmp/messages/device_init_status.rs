use crate::error::{Result, XcmpError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitType {
    InitStatus,
    InitComplete,
    StatusUpdate,
}

impl InitType {
    const fn raw(self) -> u8 {
        match self {
            Self::InitStatus => 0x00,
            Self::InitComplete => 0x01,
            Self::StatusUpdate => 0x02,
        }
    }

    const fn from_raw(raw: u8) -> Result<Self> {
        match raw {
            0x00 => Ok(Self::InitStatus),
            0x01 => Ok(Self::InitComplete),
            0x02 => Ok(Self::StatusUpdate),
            other => Err(XcmpError::Framing(format!("unrecognized init type {other:#04x}"))),
        }
    }
}

/// One (attribute-id, value) pair from the trailing attribute list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeEntry {
    pub id: u8,
    pub value: u8,
}

/// A decoded device-init-status broadcast.
///
/// `status.msb_fatal()` reports whether the device status bitfield's most
/// significant bit — the fatal-condition flag — is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInitStatus {
    pub protocol_version: u32,
    pub init_type: InitType,
    pub device_type: u8,
    pub status: u16,
    pub attributes: Vec<AttributeEntry>,
}

impl DeviceInitStatus {
    pub fn status_is_fatal(&self) -> bool {
        self.status & 0x8000 != 0
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(10 + self.attributes.len() * 2);
        out.extend_from_slice(&self.protocol_version.to_be_bytes());
        out.push(self.init_type.raw());
        out.push(self.device_type);
        out.extend_from_slice(&self.status.to_be_bytes());
        out.push(self.attributes.len() as u8);
        out.push(0); // reserved
        for attr in &self.attributes {
            out.push(attr.id);
            out.push(attr.value);
        }
        out
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < 10 {
            return Err(XcmpError::Framing(format!(
                "device-init-status payload too short: {} bytes",
                payload.len()
            )));
        }
        let protocol_version = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
        let init_type = InitType::from_raw(payload[4])?;
        let device_type = payload[5];
        let status = u16::from_be_bytes([payload[6], payload[7]]);
        let attribute_count = payload[8] as usize;
        // payload[9] is reserved.
        let attr_span = 2 * attribute_count;
        let attr_bytes = payload
            .get(10..10 + attr_span)
            .ok_or_else(|| XcmpError::Framing("attribute list exceeds payload".into()))?;
        let attributes =
            attr_bytes.chunks_exact(2).map(|c| AttributeEntry { id: c[0], value: c[1] }).collect();

        Ok(Self { protocol_version, init_type, device_type, status, attributes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_with_attributes() {
        let msg = DeviceInitStatus {
            protocol_version: 0x0001_0002,
            init_type: InitType::StatusUpdate,
            device_type: 7,
            status: 0x8001,
            attributes: vec![AttributeEntry { id: 1, value: 10 }, AttributeEntry { id: 2, value: 20 }],
        };
        let bytes = msg.encode();
        let decoded = DeviceInitStatus::decode(&bytes).unwrap();
        assert_eq!(decoded, msg);
        assert!(decoded.status_is_fatal());
    }

    #[test]
    fn attribute_span_is_twice_the_count() {
        let msg = DeviceInitStatus {
            protocol_version: 1,
            init_type: InitType::InitStatus,
            device_type: 0,
            status: 0,
            attributes: vec![],
        };
        let bytes = msg.encode();
        assert_eq!(bytes.len(), 10);
    }
}
