//! Message gating: the default pre-check deciding whether a message is
//! considered for command handling at all.

use {
    parley_common::InboundMessage,
    parley_config::GatingConfig,
    tracing::trace,
};

/// Check an ID against an allowlist.
///
/// An empty allowlist means everyone is allowed (open policy).
/// Entries are matched case-insensitively, either exactly or as a glob where
/// `*` stands for any run of characters.
pub fn is_allowed(id: &str, allowlist: &[String]) -> bool {
    if allowlist.is_empty() {
        return true;
    }
    let id = id.to_lowercase();
    allowlist
        .iter()
        .any(|pattern| glob_match(&pattern.to_lowercase(), &id))
}

fn glob_match(pattern: &str, text: &str) -> bool {
    let mut segments = pattern.split('*');
    // A pattern without '*' yields exactly one segment.
    let Some(head) = segments.next() else {
        return text.is_empty();
    };
    let Some(mut rest) = text.strip_prefix(head) else {
        return false;
    };
    if !pattern.contains('*') {
        return rest.is_empty();
    }

    let middle: Vec<&str> = segments.collect();
    let (tail, inner) = match middle.split_last() {
        Some((tail, inner)) => (*tail, inner),
        None => ("", &[][..]),
    };
    for part in inner.iter().filter(|p| !p.is_empty()) {
        match rest.find(part) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }
    rest.ends_with(tail)
}

/// Pre-check built from [`GatingConfig`].
#[derive(Debug, Clone, Default)]
pub struct MessageGate {
    config: GatingConfig,
}

impl MessageGate {
    pub fn from_config(config: &GatingConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Returns true when the message should go on to prefix resolution.
    pub fn permits(&self, message: &InboundMessage) -> bool {
        let cfg = &self.config;
        let verdict = if cfg.ignore_bots && message.author.is_bot {
            Err("bot author")
        } else if cfg
            .muted_channels
            .iter()
            .any(|c| c.eq_ignore_ascii_case(&message.channel_id))
        {
            Err("muted channel")
        } else if !is_allowed(&message.author.id, &cfg.user_allowlist) {
            Err("user not on allowlist")
        } else if !is_allowed(&message.channel_id, &cfg.channel_allowlist) {
            Err("channel not on allowlist")
        } else {
            Ok(())
        };

        if let Err(reason) = verdict {
            trace!(message_id = %message.id, reason, "message gated");
            return false;
        }
        true
    }
}
