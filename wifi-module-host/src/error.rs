use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{path} not found!")]
    LinkUnavailable { path: String },
    #[error("couldn't open serial port: {0}")]
    Serial(#[from] tokio_serial::Error),
    #[error("link i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame queue overflowed ({capacity} frames); nobody is draining it")]
    QueueOverflow { capacity: usize },
    #[error("no answer within {0:?}")]
    OperationTimeout(Duration),
    #[error("not connected after {attempts} attempts")]
    RetriesExhausted { attempts: usize },
    #[error("the frame reader panicked")]
    ReaderPanicked,
    #[error("the link is closed")]
    Closed,
}

/// Io and serial errors are copied by kind and message.
impl Clone for Error {
    fn clone(&self) -> Self {
        match self {
            Self::LinkUnavailable { path } => Self::LinkUnavailable { path: path.clone() },
            Self::Serial(e) => {
                Self::Serial(tokio_serial::Error::new(e.kind(), e.description.clone()))
            }
            Self::Io(e) => Self::Io(std::io::Error::new(e.kind(), e.to_string())),
            Self::QueueOverflow { capacity } => Self::QueueOverflow {
                capacity: *capacity,
            },
            Self::OperationTimeout(timeout) => Self::OperationTimeout(*timeout),
            Self::RetriesExhausted { attempts } => Self::RetriesExhausted {
                attempts: *attempts,
            },
            Self::ReaderPanicked => Self::ReaderPanicked,
            Self::Closed => Self::Closed,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
