use {async_trait::async_trait, parley_common::ChannelRef, tracing::debug};

use crate::Result;

/// Send messages to a channel.
#[async_trait]
pub trait ChannelOutbound: Send + Sync {
    async fn send_text(&self, channel: &ChannelRef, text: &str) -> Result<()>;

    /// Send a "typing" indicator. No-op by default.
    async fn send_typing(&self, _channel: &ChannelRef) -> Result<()> {
        Ok(())
    }
}

/// Outbound that discards everything. Used when a bot has no reply path.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullOutbound;

#[async_trait]
impl ChannelOutbound for NullOutbound {
    async fn send_text(&self, channel: &ChannelRef, text: &str) -> Result<()> {
        debug!(channel_id = %channel.id, len = text.len(), "null outbound dropped reply");
        Ok(())
    }
}
