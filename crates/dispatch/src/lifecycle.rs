//! Terminal handling of an invocation: run the result, report failures,
//! dispose the context.
//!
//! Every handler here ends in exactly one call to
//! [`LifecycleManager::dispose_context`], and none of them propagate errors.

use std::sync::Arc;

use {
    async_trait::async_trait,
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, trace},
};

#[cfg(feature = "metrics")]
use parley_metrics::{counter, dispatch as dispatch_metrics, labels};

use crate::{
    context::CommandContext,
    engine::{CommandError, CommandReply, EngineObserver, ExecutionStep, FailedResult},
    hooks::BotHooks,
    mismatch,
};

pub struct LifecycleManager {
    hooks: Arc<dyn BotHooks>,
    shutdown: CancellationToken,
}

impl LifecycleManager {
    pub fn new(hooks: Arc<dyn BotHooks>, shutdown: CancellationToken) -> Self {
        Self { hooks, shutdown }
    }

    pub fn hooks(&self) -> &Arc<dyn BotHooks> {
        &self.hooks
    }

    /// The host shutdown signal consulted when classifying cancellations.
    pub fn shutdown_signal(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Dispose a context, logging instead of propagating any failure.
    pub async fn dispose_context(&self, ctx: &CommandContext) {
        match ctx.dispose().await {
            Ok(true) => {
                debug!(context_id = %ctx.id(), "command context disposed");
                #[cfg(feature = "metrics")]
                counter!(dispatch_metrics::CONTEXTS_DISPOSED_TOTAL).increment(1);
            },
            Ok(false) => trace!(context_id = %ctx.id(), "command context already disposed"),
            Err(e) => {
                error!(context_id = %ctx.id(), error = %e, "failed to dispose command context");
                #[cfg(feature = "metrics")]
                counter!(dispatch_metrics::DISPOSAL_ERRORS_TOTAL).increment(1);
            },
        }
    }

    /// Run the reply of a successful command, then dispose.
    pub async fn handle_success(
        &self,
        ctx: Arc<CommandContext>,
        reply: Option<Box<dyn CommandReply>>,
    ) {
        if let Some(reply) = reply
            && let Err(e) = reply.execute(&ctx).await
        {
            error!(
                context_id = %ctx.id(),
                reply_kind = reply.kind(),
                error = %e,
                "failed to execute command reply"
            );
        }
        self.dispose_context(&ctx).await;
    }

    /// Report a structured failure through the failure hook, then dispose.
    pub async fn handle_failed_result(&self, ctx: Arc<CommandContext>, result: &FailedResult) {
        #[cfg(feature = "metrics")]
        counter!(dispatch_metrics::COMMAND_FAILURES_TOTAL, labels::FAILURE_KIND => result.kind.as_str())
            .increment(1);

        debug!(
            context_id = %ctx.id(),
            kind = %result.kind,
            reason = %result.reason,
            "command failed"
        );
        if let Err(e) = self.hooks.handle_failed_result(&ctx, result).await {
            error!(
                context_id = %ctx.id(),
                kind = %result.kind,
                error = %e,
                "failed to handle failed result"
            );
        }
        self.dispose_context(&ctx).await;
    }

    /// Handle a failure raised by the command body, then dispose.
    ///
    /// A cancellation while the host is shutting down is expected and is
    /// neither logged nor reported.
    pub async fn handle_execution_failed(&self, ctx: Arc<CommandContext>, result: FailedResult) {
        let command = result.command_name().unwrap_or("<unknown>");
        match result.error.as_deref() {
            Some(CommandError::ContextTypeMismatch(m)) if result.step == ExecutionStep::Command => {
                let diagnostic = mismatch::describe(result.command.as_ref(), m);
                error!(context_id = %ctx.id(), command, "{diagnostic}");
            },
            Some(e) if e.is_canceled() && self.shutdown.is_cancelled() => {
                self.dispose_context(&ctx).await;
                return;
            },
            Some(e) => {
                error!(
                    context_id = %ctx.id(),
                    command,
                    step = %result.step,
                    error = %e,
                    "{}", result.reason
                );
            },
            None => {
                error!(context_id = %ctx.id(), command, step = %result.step, "{}", result.reason);
            },
        }

        #[cfg(feature = "metrics")]
        counter!(dispatch_metrics::COMMAND_FAILURES_TOTAL, labels::FAILURE_KIND => result.kind.as_str())
            .increment(1);

        if let Err(e) = self.hooks.handle_execution_failed(&ctx, &result).await {
            error!(
                context_id = %ctx.id(),
                command,
                error = %e,
                "failed to handle execution failure"
            );
        }
        self.dispose_context(&ctx).await;
    }
}

impl std::fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("shutting_down", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl EngineObserver for LifecycleManager {
    async fn command_executed(
        &self,
        ctx: Arc<CommandContext>,
        reply: Option<Box<dyn CommandReply>>,
    ) {
        self.handle_success(ctx, reply).await;
    }

    async fn command_execution_failed(&self, ctx: Arc<CommandContext>, result: FailedResult) {
        self.handle_execution_failed(ctx, result).await;
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use {
        parley_channels::NullOutbound,
        parley_common::{Author, ChannelRef, InboundMessage},
    };

    use {
        super::*,
        crate::{
            context::{ContextEnv, ContextFactory, ContextScope, DefaultContextFactory},
            engine::{FailureKind, TextReply},
            prefix::StringPrefix,
            services::Services,
        },
    };

    #[derive(Default)]
    struct Recorder {
        failed: AtomicUsize,
        execution_failed: AtomicUsize,
        fail_hook: bool,
    }

    #[async_trait]
    impl BotHooks for Recorder {
        async fn handle_failed_result(
            &self,
            _ctx: &CommandContext,
            _result: &FailedResult,
        ) -> anyhow::Result<()> {
            self.failed.fetch_add(1, Ordering::SeqCst);
            if self.fail_hook {
                anyhow::bail!("hook exploded");
            }
            Ok(())
        }

        async fn handle_execution_failed(
            &self,
            _ctx: &CommandContext,
            _result: &FailedResult,
        ) -> anyhow::Result<()> {
            self.execution_failed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct CountDispose(Arc<AtomicUsize>);

    #[async_trait]
    impl ContextScope for CountDispose {
        async fn dispose(self: Box<Self>) -> anyhow::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingReply(Mutex<usize>);

    #[async_trait]
    impl CommandReply for FailingReply {
        fn kind(&self) -> &'static str {
            "failing"
        }

        async fn execute(&self, _ctx: &CommandContext) -> anyhow::Result<()> {
            *self.0.lock().unwrap() += 1;
            anyhow::bail!("send failed")
        }
    }

    fn context(disposals: &Arc<AtomicUsize>) -> Arc<CommandContext> {
        let env = ContextEnv {
            services: Arc::new(Services::new()),
            outbound: Arc::new(NullOutbound),
        };
        let channel = ChannelRef::direct("c1");
        let message = InboundMessage::user("m1", Author::new("u1", "alice"), &channel, "!x");
        let ctx = DefaultContextFactory
            .create_context(Arc::new(StringPrefix::new("!")), Arc::new(message), channel, &env)
            .unwrap();
        ctx.attach(Box::new(CountDispose(Arc::clone(disposals))))
            .map_err(|_| ())
            .unwrap();
        Arc::new(ctx)
    }

    fn manager(hooks: Arc<Recorder>) -> LifecycleManager {
        LifecycleManager::new(hooks, CancellationToken::new())
    }

    #[tokio::test]
    async fn success_disposes_even_when_reply_fails() {
        let disposals = Arc::new(AtomicUsize::new(0));
        let ctx = context(&disposals);
        let lifecycle = manager(Arc::new(Recorder::default()));

        lifecycle
            .handle_success(Arc::clone(&ctx), Some(Box::new(FailingReply(Mutex::new(0)))))
            .await;

        assert!(ctx.is_disposed());
        assert_eq!(disposals.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn success_without_reply_disposes() {
        let disposals = Arc::new(AtomicUsize::new(0));
        let ctx = context(&disposals);
        manager(Arc::new(Recorder::default()))
            .handle_success(Arc::clone(&ctx), Some(Box::new(TextReply::new("pong"))))
            .await;
        assert_eq!(disposals.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_result_disposes_when_hook_errors() {
        let disposals = Arc::new(AtomicUsize::new(0));
        let hooks = Arc::new(Recorder {
            fail_hook: true,
            ..Default::default()
        });
        let ctx = context(&disposals);
        manager(Arc::clone(&hooks))
            .handle_failed_result(
                Arc::clone(&ctx),
                &FailedResult::new(FailureKind::ChecksFailed, "nope"),
            )
            .await;

        assert_eq!(hooks.failed.load(Ordering::SeqCst), 1);
        assert_eq!(disposals.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn execution_failure_uses_its_own_hook() {
        let disposals = Arc::new(AtomicUsize::new(0));
        let hooks = Arc::new(Recorder::default());
        let ctx = context(&disposals);
        manager(Arc::clone(&hooks))
            .command_execution_failed(
                Arc::clone(&ctx),
                FailedResult::execution_failed(
                    ExecutionStep::Command,
                    CommandError::Other(anyhow::anyhow!("boom")),
                ),
            )
            .await;

        assert_eq!(hooks.failed.load(Ordering::SeqCst), 0);
        assert_eq!(hooks.execution_failed.load(Ordering::SeqCst), 1);
        assert_eq!(disposals.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancel_during_shutdown_skips_hook_but_disposes() {
        let disposals = Arc::new(AtomicUsize::new(0));
        let hooks = Arc::new(Recorder::default());
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let lifecycle = LifecycleManager::new(Arc::clone(&hooks) as Arc<dyn BotHooks>, shutdown);
        let ctx = context(&disposals);

        lifecycle
            .handle_execution_failed(
                Arc::clone(&ctx),
                FailedResult::execution_failed(ExecutionStep::Command, CommandError::Canceled),
            )
            .await;

        assert_eq!(hooks.execution_failed.load(Ordering::SeqCst), 0);
        assert_eq!(disposals.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dispose_twice_is_harmless() {
        let disposals = Arc::new(AtomicUsize::new(0));
        let ctx = context(&disposals);
        let lifecycle = manager(Arc::new(Recorder::default()));
        lifecycle.dispose_context(&ctx).await;
        lifecycle.dispose_context(&ctx).await;
        assert_eq!(disposals.load(Ordering::SeqCst), 1);
    }
}
