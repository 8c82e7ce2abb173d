use std::sync::Arc;

use {
    async_trait::async_trait,
    parley_common::{ChannelRef, InboundMessage},
    tokio::sync::mpsc,
};

/// A received message together with the channel it was resolved against.
#[derive(Debug, Clone)]
pub struct MessageEvent {
    pub message: Arc<InboundMessage>,
    pub channel: ChannelRef,
}

impl MessageEvent {
    pub fn new(message: InboundMessage, channel: ChannelRef) -> Self {
        Self {
            message: Arc::new(message),
            channel,
        }
    }
}

/// Delivers inbound message events from a chat platform.
///
/// Events from one source are consumed in order; the consumer awaits each
/// event's intake before asking for the next one.
#[async_trait]
pub trait EventSource: Send {
    /// Source identifier (e.g. "console", "discord:main").
    fn name(&self) -> &str;

    /// Wait for the next event. `None` means the source is exhausted.
    async fn next_event(&mut self) -> Option<MessageEvent>;
}

/// [`EventSource`] backed by a tokio mpsc channel.
pub struct ChannelSource {
    name: String,
    rx: mpsc::Receiver<MessageEvent>,
}

impl ChannelSource {
    pub fn new(name: impl Into<String>, rx: mpsc::Receiver<MessageEvent>) -> Self {
        Self {
            name: name.into(),
            rx,
        }
    }

    /// Create a source plus the sender that feeds it.
    pub fn pair(name: impl Into<String>, buffer: usize) -> (mpsc::Sender<MessageEvent>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, Self::new(name, rx))
    }
}

#[async_trait]
impl EventSource for ChannelSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn next_event(&mut self) -> Option<MessageEvent> {
        self.rx.recv().await
    }
}
