//! A tiny command engine for trying the pipeline from a terminal.

use std::sync::Arc;

use {
    async_trait::async_trait,
    parley_dispatch::{
        CommandContext, CommandEngine, CommandError, CommandInfo, ContextKind, EngineObserver,
        EngineObservers, ExecutionResult, ExecutionStep, FailedResult, FailureKind, TextReply,
    },
};

const COMMANDS: &[(&str, &str)] = &[
    ("ping", "reply with pong"),
    ("echo", "repeat the rest of the line"),
    ("whoami", "describe the invocation context"),
    ("guild", "only works in a guild channel"),
    ("help", "list commands"),
];

#[derive(Default)]
pub struct DemoEngine {
    observers: EngineObservers,
}

impl DemoEngine {
    pub fn new() -> Self {
        Self::default()
    }

    async fn reply(&self, ctx: Arc<CommandContext>, text: String) -> ExecutionResult {
        self.observers
            .executed(ctx, Some(Box::new(TextReply(text))))
            .await;
        ExecutionResult::Success
    }
}

#[async_trait]
impl CommandEngine for DemoEngine {
    async fn execute(&self, input: &str, ctx: Arc<CommandContext>) -> ExecutionResult {
        let (name, args) = input
            .trim()
            .split_once(char::is_whitespace)
            .map_or((input.trim(), ""), |(n, a)| (n, a.trim()));

        match name.to_ascii_lowercase().as_str() {
            "ping" => self.reply(ctx, "pong".into()).await,
            "echo" if args.is_empty() => FailedResult::new(
                FailureKind::ArgumentParseFailed,
                "echo needs something to repeat",
            )
            .with_command(CommandInfo::new("echo", "Demo"))
            .into(),
            "echo" => self.reply(ctx, args.to_string()).await,
            "whoami" => {
                let text = format!(
                    "{} in #{} via {} ({})",
                    ctx.author().name,
                    ctx.channel().id,
                    ctx.prefix(),
                    ctx.kind()
                );
                self.reply(ctx, text).await
            },
            "guild" => {
                let info = CommandInfo::new("guild", "Demo");
                if let Err(mismatch) = ctx.require(&ContextKind::Guild) {
                    let failed = FailedResult::execution_failed(
                        ExecutionStep::Command,
                        CommandError::from(mismatch),
                    )
                    .with_command(info);
                    self.observers.execution_failed(ctx, failed.clone()).await;
                    return failed.into();
                }
                let guild = ctx.channel().guild_id.clone().unwrap_or_default();
                self.reply(ctx, format!("hello, guild {guild}")).await
            },
            "help" => {
                let text = COMMANDS
                    .iter()
                    .map(|(name, about)| format!("{name}: {about}"))
                    .collect::<Vec<_>>()
                    .join("\n");
                self.reply(ctx, text).await
            },
            _ => FailedResult::new(FailureKind::CommandNotFound, format!("unknown command {name}"))
                .into(),
        }
    }

    fn subscribe(&self, observer: Arc<dyn EngineObserver>) {
        self.observers.subscribe(observer);
    }
}
