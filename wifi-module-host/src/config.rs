use std::time::Duration;

use wifi_module_protocol::payload::WifiIds;

/// Settings of the raw byte link and its frame reader.
#[derive(Clone, Debug)]
pub struct LinkConfig {
    pub baud_rate: u32,
    /// Upper bound of a single read; the reader rechecks the open flag at least this often.
    pub read_timeout: Duration,
    /// Capacity of the frame queue. Overflowing it stops the reader.
    pub queue_capacity: usize,
    /// How long `close` waits for the reader to finish.
    pub close_grace: Duration,
    /// Answer every received start-of-frame frame with an ACK.
    pub acknowledge_frames: bool,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            baud_rate: 460_800,
            read_timeout: Duration::from_secs(1),
            queue_capacity: 100,
            close_grace: Duration::from_secs(3),
            acknowledge_frames: false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub ids: WifiIds,
    pub connect_attempts: usize,
    pub connect_timeout: Duration,
    pub scan_timeout: Duration,
    /// Bound of each pop while draining scan results.
    pub result_pop_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ids: WifiIds::default(),
            connect_attempts: 5,
            connect_timeout: Duration::from_secs(15),
            scan_timeout: Duration::from_secs(10),
            result_pop_timeout: Duration::from_secs(1),
        }
    }
}
