//! Wiring of the full pipeline and its event-source loops.

use std::sync::{Arc, Mutex};

use {
    parley_channels::{ChannelOutbound, EventSource, MessageEvent, NullOutbound},
    parley_common::{ChannelRef, InboundMessage},
    parley_config::ParleyConfig,
    tokio::task::JoinHandle,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, trace, warn},
};

#[cfg(feature = "metrics")]
use parley_metrics::{counter, dispatch as dispatch_metrics, labels};

use crate::{
    Result,
    context::{CommandContext, ContextEnv, ContextFactory, DefaultContextFactory},
    engine::{CommandEngine, ExecutionResult},
    executor::CommandExecutor,
    hooks::{BotHooks, DefaultHooks},
    lifecycle::LifecycleManager,
    prefix::{DefaultPrefixProvider, PrefixProvider, PrefixRef},
    queue::ExecutionQueue,
    services::Services,
    stage::{
        BeforeExecute, ChainOutcome, CheckMessage, CreateContext, Enqueue, Intake, IntakeStage,
        MatchPrefix, ResolvePrefixes, StageChain,
    },
};

/// A running dispatch pipeline.
pub struct Bot {
    chain: StageChain,
    executor: Arc<CommandExecutor>,
    lifecycle: Arc<LifecycleManager>,
    queue: Arc<ExecutionQueue>,
    factory: Arc<dyn ContextFactory>,
    env: ContextEnv,
    shutdown: CancellationToken,
    sources: Mutex<Vec<JoinHandle<()>>>,
}

impl Bot {
    pub fn builder(engine: Arc<dyn CommandEngine>) -> BotBuilder {
        BotBuilder::new(engine)
    }

    /// Run one inbound event through the gate chain.
    ///
    /// Returns `None` without side effects for anything that is not a
    /// user-authored message.
    pub async fn on_message_event(&self, event: MessageEvent) -> Option<ChainOutcome> {
        if !event.message.is_user_message() {
            trace!(message_id = %event.message.id, "ignoring non-user message");
            return None;
        }

        #[cfg(feature = "metrics")]
        counter!(dispatch_metrics::MESSAGES_RECEIVED_TOTAL, labels::SOURCE => event.message.source.clone())
            .increment(1);

        Some(self.chain.run(Intake::new(event)).await)
    }

    /// Execute `input` directly, bypassing the gate chain and the queue.
    /// The context is disposed by the usual terminal handlers.
    pub async fn execute_async(&self, input: &str, ctx: Arc<CommandContext>) -> ExecutionResult {
        self.executor.execute(input, ctx).await
    }

    /// Build a context with the bot's factory and services, for callers of
    /// [`execute_async`](Self::execute_async).
    pub fn create_context(
        &self,
        prefix: PrefixRef,
        message: Arc<InboundMessage>,
        channel: ChannelRef,
    ) -> anyhow::Result<Arc<CommandContext>> {
        let ctx = self
            .factory
            .create_context(prefix, message, channel, &self.env)?;
        Ok(Arc::new(ctx))
    }

    /// Consume `source` on its own task until it ends or the bot shuts down.
    ///
    /// Events of one source go through intake strictly one after another.
    pub fn start<S>(self: &Arc<Self>, source: S)
    where
        S: EventSource + 'static,
    {
        let bot = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut source = source;
            let name = source.name().to_string();
            info!(source = %name, "event source started");
            loop {
                tokio::select! {
                    biased;
                    _ = bot.shutdown.cancelled() => break,
                    event = source.next_event() => match event {
                        Some(event) => {
                            bot.on_message_event(event).await;
                        },
                        None => {
                            debug!(source = %name, "event source exhausted");
                            break;
                        },
                    },
                }
            }
            info!(source = %name, "event source stopped");
        });
        self.sources
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(handle);
    }

    /// Signal shutdown, stop every source loop, then drain the queue.
    ///
    /// Queued executions still run; the signal only changes how their
    /// cancellations are reported.
    pub async fn shutdown(&self) {
        info!("bot shutting down");
        self.shutdown.cancel();
        self.join_sources().await;
        self.queue.shutdown().await;
        info!("bot stopped");
    }

    /// Wait until every started source is exhausted, then drain the queue.
    pub async fn run_to_completion(&self) {
        self.join_sources().await;
        self.queue.shutdown().await;
    }

    async fn join_sources(&self) {
        let handles = std::mem::take(&mut *self.sources.lock().unwrap_or_else(|e| e.into_inner()));
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "event source task ended abnormally");
            }
        }
    }

    pub fn shutdown_signal(&self) -> &CancellationToken {
        &self.shutdown
    }

    pub fn queue(&self) -> &Arc<ExecutionQueue> {
        &self.queue
    }

    pub fn lifecycle(&self) -> &Arc<LifecycleManager> {
        &self.lifecycle
    }

    pub fn services(&self) -> &Arc<Services> {
        &self.env.services
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.chain.names()
    }
}

impl std::fmt::Debug for Bot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bot")
            .field("chain", &self.chain)
            .field("queue", &self.queue)
            .field("shutting_down", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Assembles a [`Bot`]. Anything not set falls back to the configuration
/// driven defaults.
pub struct BotBuilder {
    engine: Arc<dyn CommandEngine>,
    config: ParleyConfig,
    hooks: Option<Arc<dyn BotHooks>>,
    prefixes: Option<Arc<dyn PrefixProvider>>,
    factory: Arc<dyn ContextFactory>,
    services: Arc<Services>,
    outbound: Arc<dyn ChannelOutbound>,
    shutdown: CancellationToken,
    stages: Vec<Arc<dyn IntakeStage>>,
}

impl BotBuilder {
    pub fn new(engine: Arc<dyn CommandEngine>) -> Self {
        Self {
            engine,
            config: ParleyConfig::default(),
            hooks: None,
            prefixes: None,
            factory: Arc::new(DefaultContextFactory),
            services: Arc::new(Services::new()),
            outbound: Arc::new(NullOutbound),
            shutdown: CancellationToken::new(),
            stages: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: ParleyConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn BotHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn with_prefix_provider(mut self, provider: Arc<dyn PrefixProvider>) -> Self {
        self.prefixes = Some(provider);
        self
    }

    pub fn with_context_factory(mut self, factory: Arc<dyn ContextFactory>) -> Self {
        self.factory = factory;
        self
    }

    pub fn with_services(mut self, services: Arc<Services>) -> Self {
        self.services = services;
        self
    }

    pub fn with_outbound(mut self, outbound: Arc<dyn ChannelOutbound>) -> Self {
        self.outbound = outbound;
        self
    }

    /// Use an existing host shutdown signal instead of a fresh one.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Add a custom stage. Custom stages run after `before_execute`, in the
    /// order they were added, right before `enqueue`.
    pub fn with_stage(mut self, stage: Arc<dyn IntakeStage>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Spawn the queue worker and subscribe the lifecycle manager to the
    /// engine. Must be called inside a tokio runtime.
    pub fn build(self) -> Result<Arc<Bot>> {
        let hooks = self
            .hooks
            .unwrap_or_else(|| Arc::new(DefaultHooks::from_config(&self.config.gating)));
        let prefixes = self
            .prefixes
            .unwrap_or_else(|| Arc::new(DefaultPrefixProvider::from_config(&self.config.bot)));

        let queue = Arc::new(ExecutionQueue::spawn(self.config.queue.bound())?);
        let lifecycle = Arc::new(LifecycleManager::new(
            Arc::clone(&hooks),
            self.shutdown.clone(),
        ));
        self.engine.subscribe(Arc::clone(&lifecycle) as _);
        let executor = Arc::new(CommandExecutor::new(self.engine, Arc::clone(&lifecycle)));

        let env = ContextEnv {
            services: self.services,
            outbound: self.outbound,
        };

        let mut chain = StageChain::new(Arc::clone(&lifecycle));
        chain.push(Arc::new(CheckMessage::new(Arc::clone(&hooks))));
        chain.push(Arc::new(ResolvePrefixes::new(prefixes)));
        chain.push(Arc::new(MatchPrefix));
        chain.push(Arc::new(CreateContext::new(
            Arc::clone(&self.factory),
            env.clone(),
        )));
        chain.push(Arc::new(BeforeExecute::new(hooks)));
        chain.push(Arc::new(Enqueue::new(
            Arc::clone(&queue),
            Arc::clone(&executor),
        )));
        for stage in self.stages {
            chain.insert_before(Enqueue::NAME, stage);
        }

        debug!(stages = ?chain.names(), capacity = ?queue.capacity(), "bot built");

        Ok(Arc::new(Bot {
            chain,
            executor,
            lifecycle,
            queue,
            factory: self.factory,
            env,
            shutdown: self.shutdown,
            sources: Mutex::new(Vec::new()),
        }))
    }
}
