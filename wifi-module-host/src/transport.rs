use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use futures::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use log::{debug, info, warn};
use tokio::{
    sync::{Mutex, mpsc},
    task::JoinHandle,
};
use tokio_serial::SerialPortBuilderExt;
use tokio_util::compat::TokioAsyncReadCompatExt;
use wifi_module_protocol::{Frame, codec::SequenceCounter};

use crate::{
    config::LinkConfig,
    error::{Error, Result},
    frame_reader::{FrameReader, Inbound, SharedWriter, StopCause},
};

/// An open byte link to the module.
///
/// Opening the link spawns the frame reader task; frames it reassembles come out of the
/// [`FrameReceiver`] returned alongside the transport.
pub struct Transport {
    open: Arc<AtomicBool>,
    writer: SharedWriter,
    running: Mutex<Option<Running>>,
    stop_cause: StopCause,
    sequence: Arc<SequenceCounter>,
    config: LinkConfig,
}

struct Running {
    /// weak, so the queue ends by itself once the reader is gone
    sentinel: mpsc::WeakSender<Inbound>,
    reader: JoinHandle<Result<()>>,
}

/// The consuming end of the frame queue.
pub struct FrameReceiver {
    rx: mpsc::Receiver<Inbound>,
}

impl FrameReceiver {
    /// Wait for the next frame. Returns None once the link has been closed, or once the
    /// reader stopped on its own and every frame it queued was taken.
    pub async fn recv(&mut self) -> Option<Frame> {
        match self.rx.recv().await? {
            Inbound::Frame(frame) => Some(frame),
            Inbound::Closed => None,
        }
    }
}

impl Transport {
    /// Open the serial device at `path`.
    pub async fn open(path: &str, config: LinkConfig) -> Result<(Self, FrameReceiver)> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(Error::LinkUnavailable {
                path: path.to_string(),
            });
        }
        let port = tokio_serial::new(path, config.baud_rate).open_native_async()?;
        info!("opened {path} at {} baud", config.baud_rate);
        Ok(Self::from_stream(port.compat(), config))
    }

    /// Run the link over an already open duplex stream.
    /// Must be called from within a tokio runtime.
    pub fn from_stream<S>(stream: S, config: LinkConfig) -> (Self, FrameReceiver)
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (source, sink) = stream.split();
        let sink: Box<dyn AsyncWrite + Send + Unpin> = Box::new(sink);
        let writer: SharedWriter = Arc::new(Mutex::new(sink));
        let open = Arc::new(AtomicBool::new(true));
        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let sentinel = tx.downgrade();

        let mut reader = FrameReader::new(source, open.clone(), tx, config.read_timeout);
        if config.acknowledge_frames {
            reader = reader.acknowledge_with(writer.clone());
        }
        let stop_cause = reader.stop_cause();
        let reader = tokio::spawn(reader.run());

        let transport = Self {
            open,
            writer,
            running: Mutex::new(Some(Running { sentinel, reader })),
            stop_cause,
            sequence: Arc::new(SequenceCounter::new()),
            config,
        };
        (transport, FrameReceiver { rx })
    }

    /// False once closed, or once the reader stopped on its own (end of stream, i/o error,
    /// queue overflow).
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// The counter tagging every command sent over this link.
    pub fn sequence_counter(&self) -> Arc<SequenceCounter> {
        self.sequence.clone()
    }

    /// Write one encoded frame.
    ///
    /// Once the link is down this fails with the error that stopped the reader (e.g. a
    /// queue overflow), or [`Error::Closed`] if it stopped without one.
    pub async fn send(&self, bytes: &[u8]) -> Result<()> {
        if !self.is_open() {
            return Err(self.stop_cause.get().unwrap_or(Error::Closed));
        }
        debug!("writing: {bytes:x?}");
        let mut writer = self.writer.lock().await;
        writer.write_all(bytes).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Stop the reader and unblock whoever waits on the frame queue.
    ///
    /// Returns the error that stopped the reader, if any (e.g. a queue overflow).
    /// Closing twice is a no-op.
    pub async fn close(&self) -> Result<()> {
        let Some(Running { sentinel, reader }) = self.running.lock().await.take() else {
            return Ok(());
        };
        self.open.store(false, Ordering::Release);
        // no sender left means the reader is already gone and the queue ends by itself
        if let Some(sentinel) = sentinel.upgrade()
            && sentinel.try_send(Inbound::Closed).is_err()
        {
            // the queue is full; the receiver still sees the end once the reader is gone
            debug!("couldn't queue the close sentinel");
        }

        let grace = self.config.close_grace;
        let mut reader = reader;
        let res = match tokio::time::timeout(grace, &mut reader).await {
            Ok(Ok(res)) => res,
            Ok(Err(e)) if e.is_panic() => Err(Error::ReaderPanicked),
            Ok(Err(_)) => Ok(()),
            Err(_) => {
                warn!("frame reader did not stop within {grace:?}; aborting it");
                reader.abort();
                Ok(())
            }
        };
        if let Err(e) = self.writer.lock().await.close().await {
            warn!("closing the link failed: {e}");
        }
        info!("link closed");
        res
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.open.store(false, Ordering::Release);
    }
}
