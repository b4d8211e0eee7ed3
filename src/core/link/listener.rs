use crate::domain::error::LinkError;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

/// Receiver of link events.
///
/// Callbacks arrive on the link's worker threads, or on the caller's thread
/// for `send` and `disconnect`. Implementations must not block for long and
/// are responsible for moving work onto whatever thread they need.
pub trait LinkListener: Send + Sync {
    fn on_connected(&self, device_name: &str);
    fn on_disconnected(&self);
    fn on_data_received(&self, data: &str);
    fn on_error(&self, error: &LinkError);

    /// Raw chunk as read from the socket. The default decodes it lossily
    /// and hands it to `on_data_received`.
    fn on_bytes_received(&self, data: &[u8]) {
        self.on_data_received(&String::from_utf8_lossy(data));
    }
}

/// Owned form of a listener callback
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "value", rename_all = "snake_case")]
pub enum LinkEvent {
    Connected {
        device_name: String,
    },
    Disconnected,
    /// `text` is the lossy UTF-8 reading of `bytes`
    DataReceived {
        text: String,
        #[serde(skip)]
        bytes: Vec<u8>,
    },
    Error(String),
}

impl LinkEvent {
    pub fn data(bytes: &[u8]) -> Self {
        LinkEvent::DataReceived {
            text: String::from_utf8_lossy(bytes).into_owned(),
            bytes: bytes.to_vec(),
        }
    }
}

/// Listener that turns every callback into a `LinkEvent` for a closure
pub struct FnListener<F>(F);

impl<F> FnListener<F>
where
    F: Fn(LinkEvent) + Send + Sync,
{
    pub fn new(handler: F) -> Self {
        Self(handler)
    }
}

impl<F> LinkListener for FnListener<F>
where
    F: Fn(LinkEvent) + Send + Sync,
{
    fn on_connected(&self, device_name: &str) {
        (self.0)(LinkEvent::Connected {
            device_name: device_name.to_string(),
        });
    }

    fn on_disconnected(&self) {
        (self.0)(LinkEvent::Disconnected);
    }

    fn on_data_received(&self, data: &str) {
        (self.0)(LinkEvent::data(data.as_bytes()));
    }

    fn on_bytes_received(&self, data: &[u8]) {
        (self.0)(LinkEvent::data(data));
    }

    fn on_error(&self, error: &LinkError) {
        (self.0)(LinkEvent::Error(error.to_string()));
    }
}

/// Listener that forwards events to a tokio task
pub struct ChannelListener {
    sender: mpsc::UnboundedSender<LinkEvent>,
}

impl ChannelListener {
    pub fn new(sender: mpsc::UnboundedSender<LinkEvent>) -> Self {
        Self { sender }
    }

    /// Listener plus the receiving end it feeds
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<LinkEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::new(sender), receiver)
    }

    fn forward(&self, event: LinkEvent) {
        if let Err(e) = self.sender.send(event) {
            debug!("Dropping link event, receiver gone: {:?}", e.0);
        }
    }
}

impl LinkListener for ChannelListener {
    fn on_connected(&self, device_name: &str) {
        self.forward(LinkEvent::Connected {
            device_name: device_name.to_string(),
        });
    }

    fn on_disconnected(&self) {
        self.forward(LinkEvent::Disconnected);
    }

    fn on_data_received(&self, data: &str) {
        self.forward(LinkEvent::data(data.as_bytes()));
    }

    fn on_bytes_received(&self, data: &[u8]) {
        self.forward(LinkEvent::data(data));
    }

    fn on_error(&self, error: &LinkError) {
        self.forward(LinkEvent::Error(error.to_string()));
    }
}
