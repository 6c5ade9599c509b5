use thiserror::Error;

use crate::{MessageType, message::Frame};

/// Status byte the module uses to report a successful connect or disconnect.
pub const STATUS_SUCCESS: u8 = 0x11;

/// The message ids of the wifi commands, derived from one base id.
///
/// Requests use even offsets, responses the odd ones (plus the base itself for the scan count).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WifiIds {
    pub base: u8,
}

impl WifiIds {
    pub const DEFAULT_BASE: u8 = 0xf0;

    pub fn new(base: u8) -> Self {
        Self { base }
    }

    pub fn scan(&self) -> u8 {
        self.base
    }
    pub fn connect(&self) -> u8 {
        self.base | 2
    }
    pub fn disconnect(&self) -> u8 {
        self.base | 4
    }

    /// Classify a frame. Returns None for anything that is not a wifi response.
    pub fn classify<'a>(&self, frame: &'a Frame) -> Option<WifiResponse<'a>> {
        if frame.message_type != MessageType::Response {
            return None;
        }
        let id = frame.message_id()?;
        let payload = frame.payload();
        Some(match id {
            _ if id == self.base => WifiResponse::ScanCount(payload),
            _ if id == self.base | 1 => WifiResponse::ScanEntry(payload),
            _ if id == self.base | 3 => WifiResponse::ConnectResult(payload),
            _ if id == self.base | 5 => WifiResponse::DisconnectResult(payload),
            _ => return None,
        })
    }
}

impl Default for WifiIds {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BASE)
    }
}

/// A wifi response with its raw payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WifiResponse<'a> {
    ScanCount(&'a [u8]),
    ScanEntry(&'a [u8]),
    ConnectResult(&'a [u8]),
    DisconnectResult(&'a [u8]),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WifiScanEntry {
    pub ssid: String,
    pub bssid: [u8; 6],
    pub rssi: i32,
    pub channel: u32,
    pub encryption_mode: u16,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParsePayloadError {
    #[error("The given payload is empty")]
    Empty,
    #[error("Payload is too small: needed at least {needed} bytes, got {got}")]
    TooShort { needed: usize, got: usize },
}

impl WifiScanEntry {
    // bssid, rssi, channel, encryption mode, then at least the ssid terminator
    const MIN_LEN: usize = 6 + 4 + 4 + 2 + 1;

    /// Decode one scan result:
    /// `[bssid:6][rssi:i32 LE][channel:u32 LE][encryption:u16 LE][ssid][NUL]`
    pub fn parse(payload: &[u8]) -> Result<Self, ParsePayloadError> {
        if payload.len() < Self::MIN_LEN {
            return Err(ParsePayloadError::TooShort {
                needed: Self::MIN_LEN,
                got: payload.len(),
            });
        }
        let mut bssid = [0; 6];
        bssid.copy_from_slice(&payload[..6]);
        Ok(Self {
            ssid: String::from_utf8_lossy(&payload[16..payload.len() - 1]).into_owned(),
            bssid,
            rssi: i32::from_le_bytes([payload[6], payload[7], payload[8], payload[9]]),
            channel: u32::from_le_bytes([payload[10], payload[11], payload[12], payload[13]]),
            encryption_mode: u16::from_le_bytes([payload[14], payload[15]]),
        })
    }

    /// The bssid as lowercase hex without separators.
    pub fn bssid_hex(&self) -> String {
        self.bssid.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl std::fmt::Display for WifiScanEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{} ({}) rssi: {} channel: {} encryption: {}",
            self.ssid,
            self.bssid_hex(),
            self.rssi,
            self.channel,
            self.encryption_mode
        )
    }
}

/// The number of networks announced by a scan count response.
pub fn parse_scan_count(payload: &[u8]) -> Result<u8, ParsePayloadError> {
    payload.first().copied().ok_or(ParsePayloadError::Empty)
}

/// Decode a connect result. Returns the assigned ip when the module reports success.
pub fn parse_connect_result(payload: &[u8]) -> Result<Option<String>, ParsePayloadError> {
    let (status, ip) = payload.split_first().ok_or(ParsePayloadError::Empty)?;
    Ok((*status == STATUS_SUCCESS).then(|| String::from_utf8_lossy(ip).into_owned()))
}

/// Decode a disconnect result. Returns whether the module reports success.
pub fn parse_disconnect_result(payload: &[u8]) -> Result<bool, ParsePayloadError> {
    let status = payload.first().ok_or(ParsePayloadError::Empty)?;
    Ok(*status == STATUS_SUCCESS)
}

/// `ssid NUL password NUL`
pub fn connect_request(ssid: &str, password: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(ssid.len() + password.len() + 2);
    out.extend(ssid.as_bytes());
    out.push(0);
    out.extend(password.as_bytes());
    out.push(0);
    out
}
