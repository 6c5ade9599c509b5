pub mod config;
pub mod dispatcher;
pub mod error;
mod frame_reader;
pub mod transport;
pub mod wifi_session;

pub use config::{LinkConfig, SessionConfig};
pub use dispatcher::Dispatcher;
pub use error::{Error, Result};
pub use transport::{FrameReceiver, Transport};
pub use wifi_session::{CommandSink, WifiSession};
