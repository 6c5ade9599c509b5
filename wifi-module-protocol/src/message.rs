use thiserror::Error;

use crate::{
    ControlByte, MessageType, checksum_bytes,
    codec::encode_length,
    frame_parser::{FrameParser, FrameParserError, FrameParserResult},
};

/// A complete, checksum validated frame.
///
/// `body` holds the message id followed by the payload; it is empty for
/// acknowledge and end-of-transmission frames.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub control: ControlByte,
    /// For acknowledge frames this is the echoed sequence id of the acknowledged frame.
    pub sequence_id: u8,
    pub message_type: MessageType,
    pub body: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] FrameParserError),
    #[error("the given bytes end before the frame is complete")]
    Incomplete,
    #[error("{count} bytes left over after the frame")]
    TrailingBytes { count: usize },
}

impl Frame {
    pub fn message_id(&self) -> Option<u8> {
        self.body.first().copied()
    }

    pub fn payload(&self) -> &[u8] {
        self.body.get(1..).unwrap_or_default()
    }

    /// Byte count of message id + payload, as carried in the length field.
    pub fn length(&self) -> usize {
        self.body.len()
    }

    /// Every byte covered by the checksum: the header pair, and for
    /// start-of-frame frames the length field and the body.
    pub fn checksum_input(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.body.len() + 5);
        out.push(self.sequence_id);
        out.push(self.message_type as u8);
        if self.control.has_body() {
            out.extend(encode_length(self.body.len()));
            out.extend(&self.body);
        }
        out
    }

    /// Serialize the frame back into its wire form.
    pub fn to_bytes(&self) -> Vec<u8> {
        let checked = self.checksum_input();
        let mut out = Vec::with_capacity(checked.len() + 3);
        out.push(self.control as u8);
        out.extend(&checked);
        out.extend(checksum_bytes(&checked));
        out
    }

    /// Decode exactly one frame from `bytes`.
    /// Noise before the first control byte is skipped, the same way the link reader does.
    pub fn decode(bytes: &[u8]) -> Result<Frame, DecodeError> {
        let mut parser = FrameParser::new();
        match parser.parse(bytes) {
            FrameParserResult::Ready { frame, consumed } => {
                if consumed != bytes.len() {
                    return Err(DecodeError::TrailingBytes {
                        count: bytes.len() - consumed,
                    });
                }
                Ok(frame)
            }
            FrameParserResult::Incomplete { .. } => Err(DecodeError::Incomplete),
            FrameParserResult::Error { err, .. } => Err(err.into()),
        }
    }
}
