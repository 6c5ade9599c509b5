use log::debug;
use wifi_module_protocol::Frame;

use crate::transport::FrameReceiver;

pub type Handler = Box<dyn Fn(&Frame) + Send + Sync>;

/// Hands every received frame to each registered handler, in registration order.
#[derive(Default)]
pub struct Dispatcher {
    handlers: Vec<Handler>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: impl Fn(&Frame) + Send + Sync + 'static) {
        self.handlers.push(Box::new(handler));
    }

    pub fn dispatch(&self, frame: &Frame) {
        for handler in &self.handlers {
            handler(frame);
        }
    }

    /// Pop frames until the link is closed.
    pub async fn run(self, mut frames: FrameReceiver) {
        while let Some(frame) = frames.recv().await {
            self.dispatch(&frame);
        }
        debug!("dispatcher stopped: link closed");
    }
}
