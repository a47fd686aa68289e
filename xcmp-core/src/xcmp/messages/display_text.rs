use crate::error::{Result, XcmpError};

/// A logical text zone on the device's display. Only the `PRIMARY` region
/// and id pair is named here; other packed values round-trip fine but have
/// no assigned meaning in this crate.
pub const PRIMARY_REGION: u8 = 1;
pub const PRIMARY_ID: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Iso8859_1,
    Ucs2,
}

impl TextEncoding {
    const fn raw(self) -> u8 {
        match self {
            Self::Iso8859_1 => 0x00,
            Self::Ucs2 => 0x01,
        }
    }

    const fn from_raw(raw: u8) -> Result<Self> {
        match raw {
            0x00 => Ok(Self::Iso8859_1),
            0x01 => Ok(Self::Ucs2),
            other => Err(XcmpError::EncodingError(other)),
        }
    }

    fn encode_text(self, text: &str) -> Vec<u8> {
        match self {
            Self::Iso8859_1 => text.chars().map(|c| c as u32 as u8).collect(),
            Self::Ucs2 => {
                let mut out = Vec::with_capacity(text.len() * 2);
                for c in text.encode_utf16() {
                    out.extend_from_slice(&c.to_be_bytes());
                }
                out
            }
        }
    }

    fn decode_text(self, bytes: &[u8]) -> String {
        match self {
            Self::Iso8859_1 => bytes.iter().map(|&b| b as char).collect(),
            Self::Ucs2 => {
                let units: Vec<u16> =
                    bytes.chunks_exact(2).map(|c| u16::from_be_bytes([c[0], c[1]])).collect();
                String::from_utf16_lossy(&units)
            }
        }
    }
}

/// The 0 = permanent / N * 500ms / default timer carried by update and
/// query messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayTimer {
    Permanent,
    Milliseconds(u32),
    Default,
}

const TIMER_DEFAULT_RAW: u16 = 0xFFFF;

impl DisplayTimer {
    fn raw(self) -> u16 {
        match self {
            Self::Permanent => 0,
            Self::Milliseconds(ms) => (ms / 500) as u16,
            Self::Default => TIMER_DEFAULT_RAW,
        }
    }

    fn from_raw(raw: u16) -> Self {
        match raw {
            0 => Self::Permanent,
            TIMER_DEFAULT_RAW => Self::Default,
            other => Self::Milliseconds(u32::from(other) * 500),
        }
    }
}

/// The fields shared by the `update` and `query` display-text functions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayUpdateQuery {
    pub token: u8,
    pub region: u8,
    pub id: u8,
    pub timer: DisplayTimer,
    pub class: u8,
    pub encoding: TextEncoding,
    pub text: String,
}

/// A typed view over a display-text XCMP payload, decoded once into an
/// owned structure (see the design notes on typed views over byte buffers).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayTextMessage {
    Update(DisplayUpdateQuery),
    Query(DisplayUpdateQuery),
    Close,
    AllPixelsOn,
    AllPixelsOff,
    Refresh,
}

const FN_UPDATE: u8 = 0;
const FN_QUERY: u8 = 1;
const FN_CLOSE: u8 = 2;
const FN_ALL_PIXELS_ON: u8 = 3;
const FN_ALL_PIXELS_OFF: u8 = 4;
const FN_REFRESH: u8 = 5;
const NO_TOKEN: u8 = 0xFF;

impl DisplayTextMessage {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Update(fields) => encode_update_query(FN_UPDATE, fields),
            Self::Query(fields) => encode_update_query(FN_QUERY, fields),
            Self::Close => vec![FN_CLOSE, NO_TOKEN],
            Self::AllPixelsOn => vec![FN_ALL_PIXELS_ON, NO_TOKEN],
            Self::AllPixelsOff => vec![FN_ALL_PIXELS_OFF, NO_TOKEN],
            Self::Refresh => vec![FN_REFRESH, NO_TOKEN],
        }
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        let function = *payload
            .first()
            .ok_or_else(|| XcmpError::Framing("display-text payload is empty".into()))?;
        match function {
            FN_UPDATE => Ok(Self::Update(decode_update_query(payload)?)),
            FN_QUERY => Ok(Self::Query(decode_update_query(payload)?)),
            FN_CLOSE => Ok(Self::Close),
            FN_ALL_PIXELS_ON => Ok(Self::AllPixelsOn),
            FN_ALL_PIXELS_OFF => Ok(Self::AllPixelsOff),
            FN_REFRESH => Ok(Self::Refresh),
            other => Err(XcmpError::Framing(format!("unrecognized display function {other:#04x}"))),
        }
    }
}

fn encode_update_query(function: u8, fields: &DisplayUpdateQuery) -> Vec<u8> {
    let text_bytes = fields.encoding.encode_text(&fields.text);
    let mut out = Vec::with_capacity(9 + text_bytes.len());
    out.push(function);
    out.push(fields.token);
    out.push((fields.id << 5) | (fields.region & 0x1F));
    out.extend_from_slice(&fields.timer.raw().to_be_bytes());
    out.push(fields.class);
    out.push(fields.encoding.raw());
    out.extend_from_slice(&(text_bytes.len() as u16).to_be_bytes());
    out.extend_from_slice(&text_bytes);
    out
}

fn decode_update_query(payload: &[u8]) -> Result<DisplayUpdateQuery> {
    if payload.len() < 9 {
        return Err(XcmpError::Framing(format!(
            "update/query payload too short: {} bytes",
            payload.len()
        )));
    }
    let token = payload[1];
    let region = payload[2] & 0x1F;
    let id = payload[2] >> 5;
    let timer = DisplayTimer::from_raw(u16::from_be_bytes([payload[3], payload[4]]));
    let class = payload[5];
    let encoding = TextEncoding::from_raw(payload[6])?;
    let text_len = u16::from_be_bytes([payload[7], payload[8]]) as usize;
    let text_bytes = payload
        .get(9..9 + text_len)
        .ok_or_else(|| XcmpError::Framing("display text length exceeds payload".into()))?;
    let text = encoding.decode_text(text_bytes);
    Ok(DisplayUpdateQuery { token, region, id, timer, class, encoding, text })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_text_matches_literal_payload() {
        let msg = DisplayTextMessage::Update(DisplayUpdateQuery {
            token: 0xFF,
            region: PRIMARY_REGION,
            id: PRIMARY_ID,
            timer: DisplayTimer::Permanent,
            class: 3,
            encoding: TextEncoding::Iso8859_1,
            text: "HELLO".to_string(),
        });
        let bytes = msg.encode();
        assert_eq!(
            bytes,
            [0x00, 0xFF, 0x21, 0x00, 0x00, 0x03, 0x00, 0x00, 0x05, 0x48, 0x45, 0x4C, 0x4C, 0x4F]
        );
    }

    #[test]
    fn update_text_round_trip() {
        let msg = DisplayTextMessage::Update(DisplayUpdateQuery {
            token: 7,
            region: 2,
            id: 3,
            timer: DisplayTimer::Milliseconds(1500),
            class: 1,
            encoding: TextEncoding::Ucs2,
            text: "hi".to_string(),
        });
        let bytes = msg.encode();
        let decoded = DisplayTextMessage::decode(&bytes).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn unsupported_encoding_is_an_error() {
        let mut bytes = DisplayTextMessage::Update(DisplayUpdateQuery {
            token: 0,
            region: 0,
            id: 0,
            timer: DisplayTimer::Permanent,
            class: 1,
            encoding: TextEncoding::Iso8859_1,
            text: String::new(),
        })
        .encode();
        bytes[6] = 0x42;
        let err = DisplayTextMessage::decode(&bytes).unwrap_err();
        assert!(matches!(err, XcmpError::EncodingError(0x42)));
    }

    #[test]
    fn close_is_a_no_op_payload() {
        let bytes = DisplayTextMessage::Close.encode();
        assert_eq!(bytes, [FN_CLOSE, NO_TOKEN]);
        assert_eq!(DisplayTextMessage::decode(&bytes).unwrap(), DisplayTextMessage::Close);
    }
}
