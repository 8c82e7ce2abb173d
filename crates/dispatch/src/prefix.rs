//! Command prefixes: what marks a message as a command invocation.

use std::{fmt, sync::Arc};

use {async_trait::async_trait, parley_common::InboundMessage, parley_config::BotConfig};

/// A leading marker in message text.
pub trait Prefix: fmt::Display + fmt::Debug + Send + Sync {
    /// Returns the text after the prefix when `message` starts with it.
    fn try_match(&self, message: &InboundMessage) -> Option<String>;
}

pub type PrefixRef = Arc<dyn Prefix>;

/// A literal string prefix such as `!` or `bot `.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringPrefix {
    value: String,
    case_sensitive: bool,
}

impl StringPrefix {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            case_sensitive: true,
        }
    }

    /// Match ignoring ASCII case.
    pub fn case_insensitive(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            case_sensitive: false,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

impl Prefix for StringPrefix {
    fn try_match(&self, message: &InboundMessage) -> Option<String> {
        let content = message.content.as_str();
        // `get` returns None when the prefix length splits a multi-byte char.
        let head = content.get(..self.value.len())?;
        let matched = if self.case_sensitive {
            head == self.value
        } else {
            head.eq_ignore_ascii_case(&self.value)
        };
        matched.then(|| content[self.value.len()..].to_string())
    }
}

impl fmt::Display for StringPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// Matches a leading mention of the bot: `<@id>` or `<@!id>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MentionPrefix {
    user_id: String,
}

impl MentionPrefix {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

impl Prefix for MentionPrefix {
    fn try_match(&self, message: &InboundMessage) -> Option<String> {
        let rest = message.content.strip_prefix("<@")?;
        let rest = rest.strip_prefix('!').unwrap_or(rest);
        let rest = rest.strip_prefix(self.user_id.as_str())?;
        let rest = rest.strip_prefix('>')?;
        Some(rest.trim_start().to_string())
    }
}

impl fmt::Display for MentionPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<@{}>", self.user_id)
    }
}

/// The winning prefix and the text following it.
#[derive(Debug, Clone)]
pub struct PrefixMatch {
    pub prefix: PrefixRef,
    pub remainder: String,
}

/// Try candidates in order; the first match wins.
pub fn find_prefix(candidates: &[PrefixRef], message: &InboundMessage) -> Option<PrefixMatch> {
    candidates.iter().find_map(|prefix| {
        prefix.try_match(message).map(|remainder| PrefixMatch {
            prefix: Arc::clone(prefix),
            remainder,
        })
    })
}

/// Supplies the ordered candidate prefixes for a message.
#[async_trait]
pub trait PrefixProvider: Send + Sync {
    /// `Ok(None)` or an empty list drops the message.
    async fn get_prefixes(&self, message: &InboundMessage)
    -> anyhow::Result<Option<Vec<PrefixRef>>>;
}

/// Static prefix set, the same for every message.
#[derive(Debug, Clone, Default)]
pub struct DefaultPrefixProvider {
    prefixes: Vec<PrefixRef>,
}

impl DefaultPrefixProvider {
    pub fn new(prefixes: Vec<PrefixRef>) -> Self {
        Self { prefixes }
    }

    /// Literal prefixes in configured order, then the mention prefix.
    /// Empty literals are skipped.
    pub fn from_config(config: &BotConfig) -> Self {
        let mut prefixes: Vec<PrefixRef> = config
            .prefixes
            .iter()
            .filter(|p| !p.is_empty())
            .map(|p| -> PrefixRef {
                if config.case_sensitive {
                    Arc::new(StringPrefix::new(p.as_str()))
                } else {
                    Arc::new(StringPrefix::case_insensitive(p.as_str()))
                }
            })
            .collect();
        if config.mention_prefix
            && let Some(user_id) = &config.user_id
        {
            prefixes.push(Arc::new(MentionPrefix::new(user_id.as_str())));
        }
        Self { prefixes }
    }

    pub fn prefixes(&self) -> &[PrefixRef] {
        &self.prefixes
    }
}

#[async_trait]
impl PrefixProvider for DefaultPrefixProvider {
    async fn get_prefixes(
        &self,
        _message: &InboundMessage,
    ) -> anyhow::Result<Option<Vec<PrefixRef>>> {
        Ok(Some(self.prefixes.clone()))
    }
}
