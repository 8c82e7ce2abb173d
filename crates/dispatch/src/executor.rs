//! Invokes the command engine and routes its result.

use std::{any::Any, panic::AssertUnwindSafe, sync::Arc};

use {futures::FutureExt, tracing::trace};

#[cfg(feature = "metrics")]
use parley_metrics::{counter, dispatch as dispatch_metrics, histogram};

use crate::{
    context::CommandContext,
    engine::{CommandEngine, CommandError, ExecutionResult, ExecutionStep, FailedResult},
    lifecycle::LifecycleManager,
};

pub struct CommandExecutor {
    engine: Arc<dyn CommandEngine>,
    lifecycle: Arc<LifecycleManager>,
}

impl CommandExecutor {
    pub fn new(engine: Arc<dyn CommandEngine>, lifecycle: Arc<LifecycleManager>) -> Self {
        Self { engine, lifecycle }
    }

    pub fn engine(&self) -> &Arc<dyn CommandEngine> {
        &self.engine
    }

    pub fn lifecycle(&self) -> &Arc<LifecycleManager> {
        &self.lifecycle
    }

    /// Run `input` through the engine and route the result.
    ///
    /// - `Success`: the engine's `command_executed` notification owns the context.
    /// - `ExecutionFailed`: the `command_execution_failed` notification owns it.
    /// - any other failure: handed to the failure handler here.
    ///
    /// A panic inside the engine becomes an `ExecutionFailed` result and goes
    /// to the execution-failure handler directly, since no notification was sent.
    pub async fn execute(&self, input: &str, ctx: Arc<CommandContext>) -> ExecutionResult {
        #[cfg(feature = "metrics")]
        let start = std::time::Instant::now();

        let outcome = AssertUnwindSafe(self.engine.execute(input, Arc::clone(&ctx)))
            .catch_unwind()
            .await;

        #[cfg(feature = "metrics")]
        {
            counter!(dispatch_metrics::COMMANDS_EXECUTED_TOTAL).increment(1);
            histogram!(dispatch_metrics::EXECUTION_DURATION_SECONDS)
                .record(start.elapsed().as_secs_f64());
        }

        let result = match outcome {
            Ok(result) => result,
            Err(payload) => {
                let failed = FailedResult::execution_failed(
                    ExecutionStep::Command,
                    CommandError::Panicked(panic_message(payload.as_ref())),
                );
                self.lifecycle
                    .handle_execution_failed(ctx, failed.clone())
                    .await;
                return ExecutionResult::Failed(failed);
            },
        };

        match &result {
            ExecutionResult::Success => {
                trace!(context_id = %ctx.id(), "command succeeded");
            },
            ExecutionResult::Failed(failed) if failed.is_execution_failed() => {
                trace!(context_id = %ctx.id(), "execution failure left to observers");
            },
            ExecutionResult::Failed(failed) => {
                self.lifecycle.handle_failed_result(ctx, failed).await;
            },
        }
        result
    }
}

impl std::fmt::Debug for CommandExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandExecutor").finish_non_exhaustive()
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
