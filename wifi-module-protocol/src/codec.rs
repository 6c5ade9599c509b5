use std::sync::atomic::{AtomicU8, Ordering};

use crate::{ControlByte, LENGTH_ESCAPE, MessageType, checksum_bytes};

/// Tags outgoing frames. Wraps after 255 and is never checked on receive.
#[derive(Debug, Default)]
pub struct SequenceCounter(AtomicU8);

impl SequenceCounter {
    pub const fn new() -> Self {
        Self(AtomicU8::new(0))
    }

    /// Return the current id and advance the counter.
    pub fn next_id(&self) -> u8 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

/// Encode a length field: one byte up to 255, otherwise the escape byte
/// followed by a big endian u16.
///
/// A length equal to the escape byte itself also takes the long form, since a lone
/// `0x82` reads as the start of one.
///
/// # Panics
/// In debug builds, if `len` exceeds `u16::MAX`, which the module cannot express.
pub fn encode_length(len: usize) -> Vec<u8> {
    debug_assert!(
        len <= u16::MAX as usize,
        "length {len} does not fit the length field"
    );
    match u8::try_from(len) {
        Ok(short) if short != LENGTH_ESCAPE => vec![short],
        _ => {
            let [hi, lo] = (len as u16).to_be_bytes();
            vec![LENGTH_ESCAPE, hi, lo]
        }
    }
}

/// Decode a length field from the front of `bytes`.
/// Returns the length and the number of bytes the field occupied.
pub fn decode_length(bytes: &[u8]) -> Option<(usize, usize)> {
    match bytes {
        [LENGTH_ESCAPE, hi, lo, ..] => Some((u16::from_be_bytes([*hi, *lo]) as usize, 3)),
        [LENGTH_ESCAPE, ..] => None,
        [len, ..] => Some((*len as usize, 1)),
        [] => None,
    }
}

/// Build a start-of-frame frame:
///
/// `[control][sequence id][message type][length][message id][payload][checksum LE]`
///
/// The checksum covers everything after the control byte.
pub fn encode_frame(
    sequence_id: u8,
    message_type: MessageType,
    message_id: u8,
    payload: &[u8],
) -> Vec<u8> {
    let len = encode_length(payload.len() + 1);
    let mut body = Vec::with_capacity(payload.len() + len.len() + 3);
    body.push(sequence_id);
    body.push(message_type as u8);
    body.extend(len);
    body.push(message_id);
    body.extend(payload);

    let mut out = Vec::with_capacity(body.len() + 3);
    out.push(ControlByte::StartOfFrame as u8);
    out.extend(&body);
    out.extend(checksum_bytes(&body));
    out
}

/// Build a command frame, tagging it with the next sequence id.
pub fn encode_command(seq: &SequenceCounter, message_id: u8, payload: &[u8]) -> Vec<u8> {
    encode_frame(seq.next_id(), MessageType::Command, message_id, payload)
}

/// Build the acknowledgement for a received frame (given in its wire form).
///
/// # Panics
/// If `received` is shorter than 3 bytes.
pub fn encode_ack(received: &[u8]) -> Vec<u8> {
    let pair = &received[1..3];
    let mut out = Vec::with_capacity(5);
    out.push(ControlByte::Acknowledge as u8);
    out.extend(pair);
    out.extend(checksum_bytes(pair));
    out
}
