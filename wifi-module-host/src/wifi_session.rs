use std::{
    sync::{
        Arc,
        atomic::{AtomicI32, Ordering},
    },
    time::Duration,
};

use log::{debug, info, warn};
use tokio::sync::{Mutex, mpsc, watch};
use wifi_module_protocol::{
    Frame,
    codec::{SequenceCounter, encode_command},
    payload::{
        WifiResponse, WifiScanEntry, connect_request, parse_connect_result,
        parse_disconnect_result, parse_scan_count,
    },
};

use crate::{
    config::SessionConfig,
    error::{Error, Result},
    transport::Transport,
};

/// Where the session writes its encoded commands.
pub trait CommandSink: Send + Sync {
    fn send(&self, bytes: &[u8]) -> impl Future<Output = Result<()>> + Send;
}

impl CommandSink for Transport {
    fn send(&self, bytes: &[u8]) -> impl Future<Output = Result<()>> + Send {
        Transport::send(self, bytes)
    }
}

impl<T: CommandSink> CommandSink for Arc<T> {
    fn send(&self, bytes: &[u8]) -> impl Future<Output = Result<()>> + Send {
        T::send(self, bytes)
    }
}

/// Scan / connect / disconnect on top of the module's wifi commands.
///
/// Commands go out through the sink. Answers come in through [`WifiSession::parse`],
/// which the dispatch loop calls for every frame; callers observe the results with
/// the waiting methods, from any task.
pub struct WifiSession<S> {
    sink: S,
    sequence: Arc<SequenceCounter>,
    config: SessionConfig,
    /// Some(ip) while connected
    connection: watch::Sender<Option<String>>,
    scan_done: watch::Sender<bool>,
    networks_remaining: AtomicI32,
    results_tx: mpsc::UnboundedSender<WifiScanEntry>,
    results_rx: Mutex<mpsc::UnboundedReceiver<WifiScanEntry>>,
}

impl<S: CommandSink> WifiSession<S> {
    pub fn new(sink: S, sequence: Arc<SequenceCounter>, config: SessionConfig) -> Self {
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        Self {
            sink,
            sequence,
            config,
            connection: watch::Sender::new(None),
            scan_done: watch::Sender::new(false),
            networks_remaining: AtomicI32::new(0),
            results_tx,
            results_rx: Mutex::new(results_rx),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.connection.borrow().is_some()
    }

    /// The ip the module got assigned, while connected.
    pub fn ip(&self) -> Option<String> {
        self.connection.borrow().clone()
    }

    /// Networks announced by the last scan count minus the entries received since.
    pub fn networks_remaining(&self) -> i32 {
        self.networks_remaining.load(Ordering::SeqCst)
    }

    async fn send_command(&self, message_id: u8, payload: &[u8]) -> Result<()> {
        let cmd = encode_command(&self.sequence, message_id, payload);
        self.sink.send(&cmd).await
    }

    /// Start a scan. The results arrive asynchronously.
    pub async fn scan(&self) -> Result<()> {
        self.networks_remaining.store(0, Ordering::SeqCst);
        self.scan_done.send_replace(false);
        self.send_command(self.config.ids.scan(), &[]).await
    }

    /// Wait for the scan to complete and return the remaining count.
    ///
    /// The scan count response already completes the scan, so this may return the announced
    /// number of networks before any entry has been received.
    pub async fn wait_for_scan_completion(&self, timeout: Duration) -> i32 {
        if !wait_until(&self.scan_done, timeout, |done| *done).await {
            debug!("scan did not complete within {timeout:?}");
        }
        self.networks_remaining()
    }

    /// Wait for the last scan entry (bounded by `timeout`), then collect whatever is queued.
    pub async fn drain_scan_results(&self, timeout: Duration) -> Vec<WifiScanEntry> {
        self.scan_done.send_replace(false);
        wait_until(&self.scan_done, timeout, |done| *done).await;

        let mut rx = self.results_rx.lock().await;
        let mut entries = Vec::with_capacity(rx.len());
        while !rx.is_empty() {
            match tokio::time::timeout(self.config.result_pop_timeout, rx.recv()).await {
                Ok(Some(entry)) => entries.push(entry),
                Ok(None) | Err(_) => break,
            }
        }
        entries
    }

    /// Connect with the configured number of attempts and per attempt timeout.
    pub async fn connect(&self, ssid: &str, password: &str) -> Result<bool> {
        self.connect_with(
            ssid,
            password,
            self.config.connect_attempts,
            self.config.connect_timeout,
        )
        .await
    }

    /// Send the connect command until the module reports a connection or `max_attempts` ran out.
    pub async fn connect_with(
        &self,
        ssid: &str,
        password: &str,
        max_attempts: usize,
        per_attempt_timeout: Duration,
    ) -> Result<bool> {
        self.connection.send_replace(None);
        let payload = connect_request(ssid, password);
        for attempt in 1..=max_attempts {
            debug!("connecting to {ssid}, attempt {attempt}/{max_attempts}");
            self.send_command(self.config.ids.connect(), &payload).await?;
            if wait_until(&self.connection, per_attempt_timeout, Option::is_some).await {
                break;
            }
        }
        Ok(self.is_connected())
    }

    /// Like [`WifiSession::connect`], but failing with [`Error::RetriesExhausted`].
    /// Returns the assigned ip.
    pub async fn ensure_connected(&self, ssid: &str, password: &str) -> Result<String> {
        if !self.connect(ssid, password).await? {
            return Err(Error::RetriesExhausted {
                attempts: self.config.connect_attempts,
            });
        }
        self.ip().ok_or(Error::RetriesExhausted {
            attempts: self.config.connect_attempts,
        })
    }

    /// Wait until the session is connected and return the ip.
    pub async fn wait_connected(&self, timeout: Duration) -> Result<String> {
        let mut rx = self.connection.subscribe();
        match tokio::time::timeout(timeout, rx.wait_for(Option::is_some)).await {
            Ok(Ok(ip)) => Ok((*ip).clone().unwrap_or_default()),
            _ => Err(Error::OperationTimeout(timeout)),
        }
    }

    /// Ask the module to disconnect, if connected.
    ///
    /// The returned connection state is read right after sending and does not wait for
    /// the module's answer, so it is not a confirmation.
    pub async fn disconnect(&self) -> Result<bool> {
        if self.is_connected() {
            self.send_command(self.config.ids.disconnect(), &[]).await?;
        }
        Ok(self.is_connected())
    }

    /// Apply one received frame to the session state.
    pub fn parse(&self, frame: &Frame) {
        let Some(response) = self.config.ids.classify(frame) else {
            return;
        };
        match response {
            WifiResponse::ScanEntry(payload) => {
                debug!("received scan result");
                let entry = match WifiScanEntry::parse(payload) {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!("bad scan result: {e}; ignoring");
                        return;
                    }
                };
                // the receiving end lives in self; sending can't fail
                let _ = self.results_tx.send(entry);
                let remaining = self.networks_remaining.fetch_sub(1, Ordering::SeqCst) - 1;
                if remaining == 0 {
                    debug!("received all scanned APs");
                    self.scan_done.send_replace(true);
                }
            }

            WifiResponse::ScanCount(payload) => match parse_scan_count(payload) {
                Ok(count) => {
                    debug!("received scan response: {count} APs found");
                    self.networks_remaining.store(count as i32, Ordering::SeqCst);
                    self.scan_done.send_replace(true);
                }
                Err(e) => warn!("bad scan response: {e}; ignoring"),
            },

            WifiResponse::ConnectResult(payload) => match parse_connect_result(payload) {
                Ok(Some(ip)) => {
                    info!("WiFi connected with {ip}");
                    self.connection.send_replace(Some(ip));
                }
                Ok(None) => debug!("connect response without success: {payload:x?}"),
                Err(e) => warn!("bad connect response: {e}; ignoring"),
            },

            WifiResponse::DisconnectResult(payload) => match parse_disconnect_result(payload) {
                Ok(true) => {
                    info!("WiFi disconnected");
                    self.connection.send_replace(None);
                }
                Ok(false) => debug!("disconnect response without success: {payload:x?}"),
                Err(e) => warn!("bad disconnect response: {e}; ignoring"),
            },
        }
    }
}

/// Wait until `signal` satisfies `f`. Returns false on timeout.
async fn wait_until<T>(
    signal: &watch::Sender<T>,
    timeout: Duration,
    f: impl FnMut(&T) -> bool,
) -> bool {
    let mut rx = signal.subscribe();
    matches!(
        tokio::time::timeout(timeout, rx.wait_for(f)).await,
        Ok(Ok(_))
    )
}
