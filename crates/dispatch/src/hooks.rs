//! Overridable behaviour at the edges of the pipeline.

use {
    async_trait::async_trait,
    parley_channels::MessageGate,
    parley_common::InboundMessage,
    parley_config::GatingConfig,
};

use crate::{
    context::CommandContext,
    engine::{FailedResult, FailureKind},
};

/// Text reported for a failure when no hook overrides it. `None` means the
/// failure is not reported to the user.
pub fn default_failure_reason(result: &FailedResult) -> Option<String> {
    let text = match result.kind {
        FailureKind::CommandNotFound => return None,
        FailureKind::ExecutionFailed => match result.command_name() {
            Some(name) => format!("An error occurred while executing `{name}`."),
            None => "An error occurred while executing the command.".to_string(),
        },
        FailureKind::ChecksFailed => format!("Checks failed: {}", result.reason),
        FailureKind::CommandOnCooldown => format!("Slow down: {}", result.reason),
        FailureKind::CommandDisabled => "That command is disabled.".to_string(),
        FailureKind::ArgumentParseFailed
        | FailureKind::TypeParseFailed
        | FailureKind::OverloadsFailed => format!("Invalid arguments: {}", result.reason),
    };
    Some(text)
}

/// Hooks a bot can override. Every method has a working default.
///
/// Errors returned from any hook are caught and logged by the pipeline.
#[async_trait]
pub trait BotHooks: Send + Sync {
    /// Pre-check run before prefixes are resolved. `false` drops the message.
    async fn check_message(&self, message: &InboundMessage) -> anyhow::Result<bool> {
        Ok(!message.author.is_bot)
    }

    /// Runs once the context exists. `false` drops the invocation.
    async fn before_execute(&self, _ctx: &CommandContext) -> anyhow::Result<bool> {
        Ok(true)
    }

    fn format_failure_reason(&self, _ctx: &CommandContext, result: &FailedResult) -> Option<String> {
        default_failure_reason(result)
    }

    /// Report a structured failure returned by the engine.
    async fn handle_failed_result(
        &self,
        ctx: &CommandContext,
        result: &FailedResult,
    ) -> anyhow::Result<()> {
        if let Some(text) = self.format_failure_reason(ctx, result) {
            ctx.reply(&text).await?;
        }
        Ok(())
    }

    /// Report a failure raised by the command body. Kept apart from
    /// [`handle_failed_result`](Self::handle_failed_result) so that a
    /// failure is never reported twice.
    async fn handle_execution_failed(
        &self,
        ctx: &CommandContext,
        result: &FailedResult,
    ) -> anyhow::Result<()> {
        if let Some(text) = self.format_failure_reason(ctx, result) {
            ctx.reply(&text).await?;
        }
        Ok(())
    }
}

/// Hooks driven by configuration: the pre-check is a [`MessageGate`].
#[derive(Debug, Clone, Default)]
pub struct DefaultHooks {
    gate: MessageGate,
}

impl DefaultHooks {
    pub fn new(gate: MessageGate) -> Self {
        Self { gate }
    }

    pub fn from_config(config: &GatingConfig) -> Self {
        Self::new(MessageGate::from_config(config))
    }
}

#[async_trait]
impl BotHooks for DefaultHooks {
    async fn check_message(&self, message: &InboundMessage) -> anyhow::Result<bool> {
        Ok(self.gate.permits(message))
    }
}
