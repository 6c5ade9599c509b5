pub mod codec;
pub mod frame_parser;
pub mod message;
pub mod payload;

pub use message::Frame;

/// Escape byte announcing a 2 byte big endian length field.
pub const LENGTH_ESCAPE: u8 = 0x82;
const CHECKSUM_SEED: u16 = 0x5725;

/// Compute the 16 bit XOR fold used by the module.
///
/// The input is folded as big endian words into the seed; an odd trailing byte
/// is folded in as the high byte of a word.
pub fn checksum(bytes: &[u8]) -> u16 {
    let mut words = bytes.chunks_exact(2);
    let mut acc = words
        .by_ref()
        .fold(CHECKSUM_SEED, |acc, w| acc ^ u16::from_be_bytes([w[0], w[1]]));
    if let [last] = words.remainder() {
        acc ^= (*last as u16) << 8;
    }
    acc
}

/// The checksum as it appears on the wire (little endian).
pub fn checksum_bytes(bytes: &[u8]) -> [u8; 2] {
    checksum(bytes).to_le_bytes()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlByte {
    StartOfFrame = 0x02,
    EndOfTransmission = 0x04,
    Acknowledge = 0x06,
}

impl ControlByte {
    pub fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0x02 => Self::StartOfFrame,
            0x04 => Self::EndOfTransmission,
            0x06 => Self::Acknowledge,
            _ => return None,
        })
    }

    /// Only start-of-frame frames carry a length, a message id and a payload.
    pub fn has_body(&self) -> bool {
        matches!(self, Self::StartOfFrame)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageType {
    Command = 0xa0,
    Response = 0xa1,
    Notification = 0xbb,
}

impl MessageType {
    pub fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0xa0 => Self::Command,
            0xa1 => Self::Response,
            0xbb => Self::Notification,
            _ => return None,
        })
    }
}
