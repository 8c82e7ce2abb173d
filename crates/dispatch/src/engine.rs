//! Seam to the command-matching engine.
//!
//! The engine resolves a command from the input text, binds arguments, runs
//! checks and invokes the handler. The pipeline only sees its single entry
//! point ([`CommandEngine::execute`]) and two out-of-band notifications
//! delivered to [`EngineObserver`]s.

use std::{
    fmt,
    sync::{Arc, Mutex},
};

use {async_trait::async_trait, tracing::debug};

use crate::context::{CommandContext, ContextTypeMismatch};

// ── Results ─────────────────────────────────────────────────────────────────

/// Where in the engine's pipeline a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionStep {
    Checks,
    ArgumentParsing,
    TypeParsing,
    BeforeExecuted,
    Command,
}

impl fmt::Display for ExecutionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    CommandNotFound,
    ChecksFailed,
    ArgumentParseFailed,
    TypeParseFailed,
    OverloadsFailed,
    CommandOnCooldown,
    CommandDisabled,
    /// The command body itself failed. Reported through
    /// [`EngineObserver::command_execution_failed`] only.
    ExecutionFailed,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CommandNotFound => "command_not_found",
            Self::ChecksFailed => "checks_failed",
            Self::ArgumentParseFailed => "argument_parse_failed",
            Self::TypeParseFailed => "type_parse_failed",
            Self::OverloadsFailed => "overloads_failed",
            Self::CommandOnCooldown => "command_on_cooldown",
            Self::CommandDisabled => "command_disabled",
            Self::ExecutionFailed => "execution_failed",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A check declared on a command's module.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ModuleCheck {
    RequireGuild,
    RequireOwner,
    Custom(String),
}

/// What the engine knows about the command it matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInfo {
    pub name: String,
    pub module: String,
    pub module_checks: Vec<ModuleCheck>,
}

impl CommandInfo {
    pub fn new(name: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            module: module.into(),
            module_checks: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_check(mut self, check: ModuleCheck) -> Self {
        self.module_checks.push(check);
        self
    }

    pub fn has_check(&self, check: &ModuleCheck) -> bool {
        self.module_checks.contains(check)
    }
}

/// Error raised while the engine was running a command.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("operation canceled")]
    Canceled,

    #[error("context type mismatch: {0}")]
    ContextTypeMismatch(#[from] ContextTypeMismatch),

    #[error("command panicked: {0}")]
    Panicked(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CommandError {
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }
}

/// Structured failure returned by the engine.
#[derive(Debug, Clone)]
pub struct FailedResult {
    pub kind: FailureKind,
    pub reason: String,
    pub step: ExecutionStep,
    pub error: Option<Arc<CommandError>>,
    pub command: Option<CommandInfo>,
}

impl FailedResult {
    pub fn new(kind: FailureKind, reason: impl Into<String>) -> Self {
        let step = match kind {
            FailureKind::ChecksFailed => ExecutionStep::Checks,
            FailureKind::ArgumentParseFailed | FailureKind::OverloadsFailed => {
                ExecutionStep::ArgumentParsing
            },
            FailureKind::TypeParseFailed => ExecutionStep::TypeParsing,
            _ => ExecutionStep::Command,
        };
        Self {
            kind,
            reason: reason.into(),
            step,
            error: None,
            command: None,
        }
    }

    /// A failure raised by the command body.
    pub fn execution_failed(step: ExecutionStep, error: CommandError) -> Self {
        Self {
            kind: FailureKind::ExecutionFailed,
            reason: error.to_string(),
            step,
            error: Some(Arc::new(error)),
            command: None,
        }
    }

    #[must_use]
    pub fn with_step(mut self, step: ExecutionStep) -> Self {
        self.step = step;
        self
    }

    #[must_use]
    pub fn with_error(mut self, error: CommandError) -> Self {
        self.error = Some(Arc::new(error));
        self
    }

    #[must_use]
    pub fn with_command(mut self, command: CommandInfo) -> Self {
        self.command = Some(command);
        self
    }

    pub fn is_execution_failed(&self) -> bool {
        self.kind == FailureKind::ExecutionFailed
    }

    pub fn command_name(&self) -> Option<&str> {
        self.command.as_ref().map(|c| c.name.as_str())
    }
}

#[derive(Debug, Clone)]
pub enum ExecutionResult {
    Success,
    Failed(FailedResult),
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    pub fn failure(&self) -> Option<&FailedResult> {
        match self {
            Self::Success => None,
            Self::Failed(failed) => Some(failed),
        }
    }
}

impl From<FailedResult> for ExecutionResult {
    fn from(failed: FailedResult) -> Self {
        Self::Failed(failed)
    }
}

// ── Replies ─────────────────────────────────────────────────────────────────

/// Side effect produced by a successful command, run by the success handler.
#[async_trait]
pub trait CommandReply: Send + Sync {
    /// Short label used in logs.
    fn kind(&self) -> &'static str;

    async fn execute(&self, ctx: &CommandContext) -> anyhow::Result<()>;
}

/// Reply with plain text in the channel the command came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextReply(pub String);

impl TextReply {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }
}

#[async_trait]
impl CommandReply for TextReply {
    fn kind(&self) -> &'static str {
        "text"
    }

    async fn execute(&self, ctx: &CommandContext) -> anyhow::Result<()> {
        ctx.reply(&self.0).await?;
        Ok(())
    }
}

// ── Engine ──────────────────────────────────────────────────────────────────

/// Receives the engine's out-of-band notifications.
///
/// Each notification hands over ownership of the context's terminal
/// handling; the observer must dispose it.
#[async_trait]
pub trait EngineObserver: Send + Sync {
    async fn command_executed(&self, ctx: Arc<CommandContext>, reply: Option<Box<dyn CommandReply>>);

    async fn command_execution_failed(&self, ctx: Arc<CommandContext>, result: FailedResult);
}

/// Command-matching, argument-binding and invocation engine.
///
/// Contract: a `Success` result is preceded by exactly one
/// `command_executed` notification, and a failure of kind
/// [`FailureKind::ExecutionFailed`] by exactly one
/// `command_execution_failed` notification. Any other failure is only
/// returned.
#[async_trait]
pub trait CommandEngine: Send + Sync {
    async fn execute(&self, input: &str, ctx: Arc<CommandContext>) -> ExecutionResult;

    fn subscribe(&self, observer: Arc<dyn EngineObserver>);
}

/// Observer list for engine implementations.
#[derive(Default)]
pub struct EngineObservers {
    observers: Mutex<Vec<Arc<dyn EngineObserver>>>,
}

impl EngineObservers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, observer: Arc<dyn EngineObserver>) {
        self.observers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<Arc<dyn EngineObserver>> {
        self.observers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Notify a successful execution. The reply goes to the first observer;
    /// later observers see `None`.
    pub async fn executed(&self, ctx: Arc<CommandContext>, reply: Option<Box<dyn CommandReply>>) {
        let observers = self.snapshot();
        if observers.is_empty() {
            debug!(context_id = %ctx.id(), "command executed with no observers");
        }
        let mut reply = reply;
        for observer in observers {
            observer.command_executed(Arc::clone(&ctx), reply.take()).await;
        }
    }

    pub async fn execution_failed(&self, ctx: Arc<CommandContext>, result: FailedResult) {
        for observer in self.snapshot() {
            observer
                .command_execution_failed(Arc::clone(&ctx), result.clone())
                .await;
        }
    }
}

impl fmt::Debug for EngineObservers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineObservers")
            .field("len", &self.len())
            .finish()
    }
}
