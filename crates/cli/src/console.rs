//! Stdin/stdout adapters for running a bot in a terminal.

use {
    async_trait::async_trait,
    parley_channels::{ChannelOutbound, EventSource, MessageEvent, error::Context as _},
    parley_common::{Author, ChannelRef, InboundMessage},
    tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin},
    tracing::warn,
};

/// Every non-blank input line becomes a user message in one channel.
pub struct ConsoleSource<R> {
    lines: Lines<R>,
    channel: ChannelRef,
    author: Author,
    seq: u64,
}

impl ConsoleSource<BufReader<Stdin>> {
    pub fn stdin(channel_id: String, guild_id: Option<String>) -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), channel_id, guild_id)
    }
}

impl<R: AsyncBufRead + Unpin + Send> ConsoleSource<R> {
    pub fn new(reader: R, channel_id: String, guild_id: Option<String>) -> Self {
        let channel = match guild_id {
            Some(guild) => ChannelRef::guild(channel_id, guild),
            None => ChannelRef::direct(channel_id),
        };
        let user = std::env::var("USER").unwrap_or_else(|_| "operator".into());
        Self {
            lines: reader.lines(),
            channel,
            author: Author::new(user.clone(), user),
            seq: 0,
        }
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> EventSource for ConsoleSource<R> {
    fn name(&self) -> &str {
        "console"
    }

    async fn next_event(&mut self) -> Option<MessageEvent> {
        loop {
            match self.lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => {
                    self.seq += 1;
                    let message = InboundMessage::user(
                        self.seq.to_string(),
                        self.author.clone(),
                        &self.channel,
                        line.trim_end(),
                    )
                    .with_source("console");
                    return Some(MessageEvent::new(message, self.channel.clone()));
                },
                Ok(None) => return None,
                Err(e) => {
                    warn!(error = %e, "failed to read from console");
                    return None;
                },
            }
        }
    }
}

/// Prints replies to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleOutbound;

#[async_trait]
impl ChannelOutbound for ConsoleOutbound {
    async fn send_text(&self, channel: &ChannelRef, text: &str) -> parley_channels::Result<()> {
        let mut stdout = tokio::io::stdout();
        stdout
            .write_all(format!("[#{}] {text}\n", channel.id).as_bytes())
            .await
            .context("write reply to stdout")?;
        stdout.flush().await.context("flush stdout")?;
        Ok(())
    }
}
