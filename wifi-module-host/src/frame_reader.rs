use std::{
    sync::{
        Arc, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use futures::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use log::{debug, error, warn};
use tokio::sync::{
    Mutex,
    mpsc::{self, error::TrySendError},
};
use wifi_module_protocol::{
    Frame,
    codec::encode_ack,
    frame_parser::{FrameParser, FrameParserResult},
};

use crate::error::{Error, Result};

/// Items of the frame queue. `Closed` is pushed once when the link is closed.
#[derive(Debug)]
pub(crate) enum Inbound {
    Frame(Frame),
    Closed,
}

pub(crate) type SharedWriter = Arc<Mutex<Box<dyn AsyncWrite + Send + Unpin>>>;

/// The error the reader stopped on, if it stopped on one.
#[derive(Clone, Default)]
pub(crate) struct StopCause(Arc<std::sync::Mutex<Option<Error>>>);

impl StopCause {
    pub(crate) fn get(&self) -> Option<Error> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn set(&self, err: Error) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = Some(err);
    }
}

/// Drains the link one byte at a time and pushes every valid frame onto the frame queue.
pub(crate) struct FrameReader<R> {
    source: R,
    parser: FrameParser,
    open: Arc<AtomicBool>,
    frames: mpsc::Sender<Inbound>,
    read_timeout: Duration,
    ack_writer: Option<SharedWriter>,
    stop_cause: StopCause,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub(crate) fn new(
        source: R,
        open: Arc<AtomicBool>,
        frames: mpsc::Sender<Inbound>,
        read_timeout: Duration,
    ) -> Self {
        Self {
            source,
            parser: FrameParser::new(),
            open,
            frames,
            read_timeout,
            ack_writer: None,
            stop_cause: StopCause::default(),
        }
    }

    /// Where the error that stops the reader gets recorded.
    pub(crate) fn stop_cause(&self) -> StopCause {
        self.stop_cause.clone()
    }

    /// Acknowledge every start-of-frame frame through `writer`.
    pub(crate) fn acknowledge_with(mut self, writer: SharedWriter) -> Self {
        self.ack_writer = Some(writer);
        self
    }

    /// Runs until the link is closed, the stream ends, or the frame queue overflows.
    ///
    /// Dropping the reader's sender on the way out ends the frame queue once it is drained.
    pub(crate) async fn run(mut self) -> Result<()> {
        let res = self.run_inner().await;
        if let Err(e) = &res {
            self.stop_cause.set(e.clone());
        }
        self.open.store(false, Ordering::Release);
        debug!("frame reader stopped");
        res
    }

    async fn run_inner(&mut self) -> Result<()> {
        let mut byte = [0u8];
        while self.open.load(Ordering::Acquire) {
            let read = tokio::time::timeout(self.read_timeout, self.source.read(&mut byte)).await;
            let n = match read {
                // nothing on the line; look at the open flag again
                Err(_) => continue,
                Ok(Ok(n)) => n,
                Ok(Err(e)) => {
                    error!("link read failed: {e}");
                    return Err(e.into());
                }
            };
            if n == 0 {
                debug!("link reached end of stream");
                return Ok(());
            }
            match self.parser.parse(&byte) {
                FrameParserResult::Ready { frame, .. } => self.emit(frame).await?,
                FrameParserResult::Incomplete { .. } => {}
                FrameParserResult::Error { err, .. } => {
                    warn!("discarding malformed frame: {err}");
                }
            }
        }
        Ok(())
    }

    async fn emit(&mut self, frame: Frame) -> Result<()> {
        debug!("received frame: {frame:x?}");
        if frame.control.has_body()
            && let Some(writer) = &self.ack_writer
        {
            let ack = encode_ack(&frame.to_bytes());
            debug!("acknowledging: {ack:x?}");
            let mut writer = writer.lock().await;
            writer.write_all(&ack).await?;
            writer.flush().await?;
        }
        match self.frames.try_send(Inbound::Frame(frame)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                let capacity = self.frames.max_capacity();
                error!("frame queue is full ({capacity} frames); stopping the reader");
                Err(Error::QueueOverflow { capacity })
            }
            Err(TrySendError::Closed(_)) => Err(Error::Closed),
        }
    }
}
