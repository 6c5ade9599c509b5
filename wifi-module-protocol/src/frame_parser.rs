use thiserror::Error;

use crate::{ControlByte, MessageType, checksum_bytes, codec::decode_length, message::Frame};

/// A parser which reassembles frames out of the raw byte stream of the module.
///
/// Bytes are fed in any chunking. Bytes before a control byte are skipped as line noise.
/// A frame with an unknown message type or a bad checksum is dropped together with
/// every byte consumed for it; parsing then resumes by looking for the next control byte.
pub struct FrameParser {
    state: State,
    control: ControlByte,
    message_type: MessageType,
    /// header pair, length field and body; exactly what the checksum covers
    buf: Vec<u8>,
    body_start: usize,
    crc: Vec<u8>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Seek,
    Header,
    Length,
    ExtendedLength,
    Body { remaining: usize },
    Checksum,
}

pub enum FrameParserResult {
    /// A whole frame was read and its checksum matched.
    Ready { frame: Frame, consumed: usize },
    /// We need more bytes to complete the frame.
    /// If bytes_needed is Some, then it represents the amount of bytes needed until the completion of the frame.
    Incomplete { bytes_needed: Option<usize> },
    /// The frame in progress was discarded.
    Error {
        err: FrameParserError,
        consumed: usize,
    },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FrameParserError {
    #[error("unknown message type: 0x{msg_type:x}")]
    UnknownMessageType { msg_type: u8 },
    #[error("checksum failed, got: {got:x?}, expected: {expected:x?}")]
    ChecksumMismatch { got: [u8; 2], expected: [u8; 2] },
}

impl FrameParser {
    pub fn new() -> Self {
        Self {
            state: State::Seek,
            control: ControlByte::StartOfFrame,
            message_type: MessageType::Command,
            buf: Vec::new(),
            body_start: 0,
            crc: Vec::with_capacity(2),
        }
    }

    pub fn parse(&mut self, bytes: &[u8]) -> FrameParserResult {
        for (idx, byte) in bytes.iter().enumerate() {
            match self.parse_byte(*byte) {
                Ok(Some(frame)) => {
                    return FrameParserResult::Ready {
                        frame,
                        consumed: idx + 1,
                    };
                }
                Ok(None) => {}
                Err(err) => {
                    return FrameParserResult::Error {
                        err,
                        consumed: idx + 1,
                    };
                }
            }
        }
        FrameParserResult::Incomplete {
            bytes_needed: self.bytes_needed(),
        }
    }

    /// True while no frame is in progress.
    pub fn is_idle(&self) -> bool {
        self.state == State::Seek
    }

    /// Drop any partially read frame.
    pub fn reset(&mut self) {
        self.state = State::Seek;
        self.buf.clear();
        self.crc.clear();
    }

    fn bytes_needed(&self) -> Option<usize> {
        match self.state {
            State::Body { remaining } => Some(remaining + 2),
            State::Checksum => Some(2 - self.crc.len()),
            State::Header if !self.control.has_body() => Some(2 - self.buf.len() + 2),
            _ => None,
        }
    }

    fn start_body(&mut self, len: usize) {
        self.body_start = self.buf.len();
        self.state = if len == 0 {
            State::Checksum
        } else {
            State::Body { remaining: len }
        };
    }

    fn parse_byte(&mut self, byte: u8) -> Result<Option<Frame>, FrameParserError> {
        match self.state {
            State::Seek => {
                if let Some(control) = ControlByte::from_byte(byte) {
                    self.reset();
                    self.control = control;
                    self.state = State::Header;
                }
            }
            State::Header => {
                self.buf.push(byte);
                if self.buf.len() == 2 {
                    let Some(message_type) = MessageType::from_byte(byte) else {
                        self.reset();
                        return Err(FrameParserError::UnknownMessageType { msg_type: byte });
                    };
                    self.message_type = message_type;
                    if self.control.has_body() {
                        self.state = State::Length;
                    } else {
                        self.body_start = self.buf.len();
                        self.state = State::Checksum;
                    }
                }
            }
            State::Length | State::ExtendedLength => {
                self.buf.push(byte);
                // the length field starts after the 2 header bytes
                match decode_length(&self.buf[2..]) {
                    Some((len, _)) => self.start_body(len),
                    None => self.state = State::ExtendedLength,
                }
            }
            State::Body { remaining } => {
                self.buf.push(byte);
                self.state = if remaining == 1 {
                    State::Checksum
                } else {
                    State::Body {
                        remaining: remaining - 1,
                    }
                };
            }
            State::Checksum => {
                self.crc.push(byte);
                if self.crc.len() == 2 {
                    let got = [self.crc[0], self.crc[1]];
                    let expected = checksum_bytes(&self.buf);
                    let frame = self.frame();
                    self.reset();
                    if got != expected {
                        return Err(FrameParserError::ChecksumMismatch { got, expected });
                    }
                    return Ok(Some(frame));
                }
            }
        }
        Ok(None)
    }

    fn frame(&self) -> Frame {
        Frame {
            control: self.control,
            sequence_id: self.buf[0],
            message_type: self.message_type,
            body: self.buf[self.body_start..].to_vec(),
        }
    }
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}
