//! Platform-neutral chat message model shared by event sources and the
//! dispatch pipeline.

use serde::{Deserialize, Serialize};

/// Whether a message was written by a participant or generated by the platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Authored by a user (or another bot) account.
    #[default]
    User,
    /// Join notices, pins, thread renames and similar platform notices.
    System,
}

/// The account that authored a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub is_bot: bool,
}

impl Author {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_bot: false,
        }
    }

    #[must_use]
    pub fn bot(mut self) -> Self {
        self.is_bot = true;
        self
    }
}

/// Reference to the channel a message was posted in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelRef {
    pub id: String,
    /// Set when the channel belongs to a guild (server); `None` for DMs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChannelRef {
    pub fn direct(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            guild_id: None,
            name: None,
        }
    }

    pub fn guild(id: impl Into<String>, guild_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            guild_id: Some(guild_id.into()),
            name: None,
        }
    }

    pub fn is_guild(&self) -> bool {
        self.guild_id.is_some()
    }
}

/// Immutable snapshot of a received chat message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: String,
    #[serde(default)]
    pub kind: MessageKind,
    pub author: Author,
    pub channel_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<String>,
    pub content: String,
    /// User IDs mentioned in the message.
    #[serde(default)]
    pub mentions: Vec<String>,
    /// Name of the event source that produced the message (e.g. "console").
    #[serde(default)]
    pub source: String,
    /// Unix timestamp (seconds) at which the source received the message.
    #[serde(default)]
    pub received_at: i64,
}

impl InboundMessage {
    /// Build a user message with the current receive time.
    pub fn user(
        id: impl Into<String>,
        author: Author,
        channel: &ChannelRef,
        content: impl Into<String>,
    ) -> Self {
        let received_at = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;
        Self {
            id: id.into(),
            kind: MessageKind::User,
            author,
            channel_id: channel.id.clone(),
            guild_id: channel.guild_id.clone(),
            content: content.into(),
            mentions: Vec::new(),
            source: String::new(),
            received_at,
        }
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    #[must_use]
    pub fn with_kind(mut self, kind: MessageKind) -> Self {
        self.kind = kind;
        self
    }

    /// Returns true for messages a command can originate from.
    pub fn is_user_message(&self) -> bool {
        self.kind == MessageKind::User
    }

    pub fn is_direct(&self) -> bool {
        self.guild_id.is_none()
    }
}
