//! Inbound message → command dispatch pipeline.
//!
//! Flow: event source → check message → resolve prefixes → match prefix →
//! create context → before-execute hook → execution queue → command engine →
//! success/failure handling → context disposal.
//!
//! Every accepted invocation owns exactly one [`CommandContext`], and every
//! exit path ends in exactly one disposal of it.

pub mod bot;
pub mod context;
pub mod engine;
pub mod error;
pub mod executor;
pub mod hooks;
pub mod lifecycle;
pub mod mismatch;
pub mod prefix;
pub mod queue;
pub mod services;
pub mod stage;

pub use {
    bot::{Bot, BotBuilder},
    context::{
        CommandContext, ContextEnv, ContextFactory, ContextKind, ContextScope, ContextTypeMismatch,
        DefaultContextFactory, DisposeError,
    },
    engine::{
        CommandEngine, CommandError, CommandInfo, CommandReply, EngineObserver, EngineObservers,
        ExecutionResult, ExecutionStep, FailedResult, FailureKind, ModuleCheck, TextReply,
    },
    error::{Error, Result},
    executor::CommandExecutor,
    hooks::{BotHooks, DefaultHooks, default_failure_reason},
    lifecycle::LifecycleManager,
    prefix::{
        DefaultPrefixProvider, MentionPrefix, Prefix, PrefixMatch, PrefixProvider, PrefixRef,
        StringPrefix, find_prefix,
    },
    queue::{ExecutionQueue, QueueError},
    services::{ServiceScope, Services},
    stage::{ChainOutcome, Intake, IntakeStage, StageChain, StageFlow},
};
