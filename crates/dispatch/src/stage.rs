//! The gate chain: intake stages run in order, each fault-isolated.
//!
//! A stage either lets the message continue, aborts it silently, or fails.
//! [`StageChain`] catches errors and panics from every stage, logs them once
//! with the stage's name, and disposes any context the intake already owns.

use std::{fmt, panic::AssertUnwindSafe, sync::Arc};

use {
    anyhow::Context as _,
    async_trait::async_trait,
    futures::FutureExt,
    parley_channels::MessageEvent,
    parley_common::{ChannelRef, InboundMessage},
    tracing::{error, trace},
};

#[cfg(feature = "metrics")]
use parley_metrics::{counter, dispatch as dispatch_metrics, labels};

use crate::{
    context::{CommandContext, ContextEnv, ContextFactory},
    executor::{CommandExecutor, panic_message},
    hooks::BotHooks,
    lifecycle::LifecycleManager,
    prefix::{PrefixMatch, PrefixProvider, PrefixRef, find_prefix},
    queue::ExecutionQueue,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageFlow {
    Continue,
    Abort,
}

/// State carried through the chain for one inbound message.
#[derive(Debug)]
pub struct Intake {
    pub message: Arc<InboundMessage>,
    pub channel: ChannelRef,
    pub prefixes: Vec<PrefixRef>,
    pub matched: Option<PrefixMatch>,
    /// Set once a context exists. Whoever takes it out owns its disposal.
    pub context: Option<Arc<CommandContext>>,
}

impl Intake {
    pub fn new(event: MessageEvent) -> Self {
        Self {
            message: event.message,
            channel: event.channel,
            prefixes: Vec::new(),
            matched: None,
            context: None,
        }
    }
}

/// One step of message intake.
#[async_trait]
pub trait IntakeStage: Send + Sync {
    /// Stable name used in logs and metrics.
    fn name(&self) -> &'static str;

    async fn run(&self, intake: &mut Intake) -> anyhow::Result<StageFlow>;
}

/// How a run of the chain ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainOutcome {
    Completed,
    Aborted { stage: &'static str },
    Failed { stage: &'static str },
}

pub struct StageChain {
    stages: Vec<Arc<dyn IntakeStage>>,
    lifecycle: Arc<LifecycleManager>,
}

impl StageChain {
    pub fn new(lifecycle: Arc<LifecycleManager>) -> Self {
        Self {
            stages: Vec::new(),
            lifecycle,
        }
    }

    pub fn push(&mut self, stage: Arc<dyn IntakeStage>) {
        self.stages.push(stage);
    }

    /// Insert `stage` ahead of the stage named `before`, or at the end when
    /// there is no such stage. Returns whether `before` was found.
    pub fn insert_before(&mut self, before: &str, stage: Arc<dyn IntakeStage>) -> bool {
        match self.stages.iter().position(|s| s.name() == before) {
            Some(idx) => {
                self.stages.insert(idx, stage);
                true
            },
            None => {
                self.stages.push(stage);
                false
            },
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Drive `intake` through every stage until one aborts or fails.
    pub async fn run(&self, mut intake: Intake) -> ChainOutcome {
        let mut outcome = ChainOutcome::Completed;
        for stage in &self.stages {
            let name = stage.name();
            let result = AssertUnwindSafe(stage.run(&mut intake))
                .catch_unwind()
                .await;
            match result {
                Ok(Ok(StageFlow::Continue)) => continue,
                Ok(Ok(StageFlow::Abort)) => {
                    trace!(stage = name, message_id = %intake.message.id, "message dropped");
                    #[cfg(feature = "metrics")]
                    counter!(dispatch_metrics::MESSAGES_DROPPED_TOTAL, labels::STAGE => name)
                        .increment(1);
                    outcome = ChainOutcome::Aborted { stage: name };
                },
                Ok(Err(e)) => {
                    error!(stage = name, message_id = %intake.message.id, error = %e, "intake stage failed");
                    #[cfg(feature = "metrics")]
                    counter!(dispatch_metrics::STAGE_ERRORS_TOTAL, labels::STAGE => name)
                        .increment(1);
                    outcome = ChainOutcome::Failed { stage: name };
                },
                Err(payload) => {
                    error!(
                        stage = name,
                        message_id = %intake.message.id,
                        panic = %panic_message(payload.as_ref()),
                        "intake stage panicked"
                    );
                    #[cfg(feature = "metrics")]
                    counter!(dispatch_metrics::STAGE_ERRORS_TOTAL, labels::STAGE => name)
                        .increment(1);
                    outcome = ChainOutcome::Failed { stage: name };
                },
            }
            break;
        }

        if let Some(ctx) = intake.context.take() {
            self.lifecycle.dispose_context(&ctx).await;
        }
        outcome
    }
}

impl fmt::Debug for StageChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageChain")
            .field("stages", &self.names())
            .finish()
    }
}

// ── Built-in stages ─────────────────────────────────────────────────────────

/// Runs [`BotHooks::check_message`].
pub struct CheckMessage {
    hooks: Arc<dyn BotHooks>,
}

impl CheckMessage {
    pub const NAME: &'static str = "check_message";

    pub fn new(hooks: Arc<dyn BotHooks>) -> Self {
        Self { hooks }
    }
}

#[async_trait]
impl IntakeStage for CheckMessage {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn run(&self, intake: &mut Intake) -> anyhow::Result<StageFlow> {
        Ok(if self.hooks.check_message(&intake.message).await? {
            StageFlow::Continue
        } else {
            StageFlow::Abort
        })
    }
}

/// Asks the [`PrefixProvider`] for candidates. `None` or an empty list aborts.
pub struct ResolvePrefixes {
    provider: Arc<dyn PrefixProvider>,
}

impl ResolvePrefixes {
    pub const NAME: &'static str = "resolve_prefixes";

    pub fn new(provider: Arc<dyn PrefixProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl IntakeStage for ResolvePrefixes {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn run(&self, intake: &mut Intake) -> anyhow::Result<StageFlow> {
        match self.provider.get_prefixes(&intake.message).await? {
            Some(prefixes) if !prefixes.is_empty() => {
                intake.prefixes = prefixes;
                Ok(StageFlow::Continue)
            },
            _ => Ok(StageFlow::Abort),
        }
    }
}

pub struct MatchPrefix;

impl MatchPrefix {
    pub const NAME: &'static str = "match_prefix";
}

#[async_trait]
impl IntakeStage for MatchPrefix {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn run(&self, intake: &mut Intake) -> anyhow::Result<StageFlow> {
        intake.matched = find_prefix(&intake.prefixes, &intake.message);
        Ok(if intake.matched.is_some() {
            StageFlow::Continue
        } else {
            StageFlow::Abort
        })
    }
}

/// Builds the context through the [`ContextFactory`].
pub struct CreateContext {
    factory: Arc<dyn ContextFactory>,
    env: ContextEnv,
}

impl CreateContext {
    pub const NAME: &'static str = "create_context";

    pub fn new(factory: Arc<dyn ContextFactory>, env: ContextEnv) -> Self {
        Self { factory, env }
    }
}

#[async_trait]
impl IntakeStage for CreateContext {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn run(&self, intake: &mut Intake) -> anyhow::Result<StageFlow> {
        let matched = intake
            .matched
            .as_ref()
            .context("no prefix matched before context creation")?;
        let ctx = self.factory.create_context(
            Arc::clone(&matched.prefix),
            Arc::clone(&intake.message),
            intake.channel.clone(),
            &self.env,
        )?;
        trace!(context_id = %ctx.id(), kind = %ctx.kind(), "command context created");
        intake.context = Some(Arc::new(ctx));
        Ok(StageFlow::Continue)
    }
}

/// Runs [`BotHooks::before_execute`] against the new context.
pub struct BeforeExecute {
    hooks: Arc<dyn BotHooks>,
}

impl BeforeExecute {
    pub const NAME: &'static str = "before_execute";

    pub fn new(hooks: Arc<dyn BotHooks>) -> Self {
        Self { hooks }
    }
}

#[async_trait]
impl IntakeStage for BeforeExecute {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn run(&self, intake: &mut Intake) -> anyhow::Result<StageFlow> {
        let ctx = intake
            .context
            .as_ref()
            .context("no context before the before-execute hook")?;
        Ok(if self.hooks.before_execute(ctx).await? {
            StageFlow::Continue
        } else {
            StageFlow::Abort
        })
    }
}

/// Posts `(remainder, context)` to the [`ExecutionQueue`].
///
/// The context leaves the intake only once the post succeeded.
pub struct Enqueue {
    queue: Arc<ExecutionQueue>,
    executor: Arc<CommandExecutor>,
}

impl Enqueue {
    pub const NAME: &'static str = "enqueue";

    pub fn new(queue: Arc<ExecutionQueue>, executor: Arc<CommandExecutor>) -> Self {
        Self { queue, executor }
    }
}

#[async_trait]
impl IntakeStage for Enqueue {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn run(&self, intake: &mut Intake) -> anyhow::Result<StageFlow> {
        let input = intake
            .matched
            .as_ref()
            .map(|m| m.remainder.clone())
            .context("no prefix matched before enqueue")?;
        let ctx = intake
            .context
            .as_ref()
            .map(Arc::clone)
            .context("no context to enqueue")?;

        let executor = Arc::clone(&self.executor);
        self.queue
            .post((input, ctx), move |(input, ctx)| async move {
                executor.execute(&input, ctx).await;
            })
            .context("failed to post to the execution queue")?;

        intake.context = None;
        Ok(StageFlow::Continue)
    }
}
