use serde::{Deserialize, Serialize};

/// Root configuration for a parley bot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParleyConfig {
    pub bot: BotConfig,
    pub queue: QueueConfig,
    pub gating: GatingConfig,
}

/// Command prefix settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Literal prefixes, tried in order.
    pub prefixes: Vec<String>,

    /// Whether literal prefixes are matched case-sensitively.
    pub case_sensitive: bool,

    /// Also accept `<@bot>` mentions as a prefix (requires `user_id`).
    pub mention_prefix: bool,

    /// The bot's own user ID on the chat platform.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            prefixes: vec!["!".into()],
            case_sensitive: true,
            mention_prefix: false,
            user_id: None,
        }
    }
}

/// Execution queue settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum number of queued executions. `0` means unbounded.
    pub capacity: usize,
}

impl QueueConfig {
    /// `None` when the queue is unbounded.
    pub fn bound(&self) -> Option<usize> {
        (self.capacity > 0).then_some(self.capacity)
    }
}

/// Which messages are considered for command handling at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatingConfig {
    /// Ignore messages authored by bot accounts.
    pub ignore_bots: bool,

    /// Channel IDs whose messages are ignored.
    pub muted_channels: Vec<String>,

    /// User ID allowlist (empty = everyone).
    pub user_allowlist: Vec<String>,

    /// Channel ID allowlist (empty = every channel).
    pub channel_allowlist: Vec<String>,
}

impl Default for GatingConfig {
    fn default() -> Self {
        Self {
            ignore_bots: true,
            muted_channels: Vec::new(),
            user_allowlist: Vec::new(),
            channel_allowlist: Vec::new(),
        }
    }
}
