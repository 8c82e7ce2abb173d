//! Test doubles shared by the dispatch integration tests.
#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    parley_channels::{ChannelOutbound, MessageEvent},
    parley_common::{Author, ChannelRef, InboundMessage},
    parley_dispatch::{
        BotHooks, CommandContext, CommandEngine, CommandError, CommandInfo, CommandReply,
        ContextEnv, ContextFactory, ContextKind, ContextScope, DefaultContextFactory,
        EngineObserver, EngineObservers, ExecutionResult, ExecutionStep, FailedResult,
        FailureKind, PrefixRef, StringPrefix, TextReply,
    },
    tokio::sync::Notify,
    tracing::{
        Level,
        field::{Field, Visit},
    },
    tracing_subscriber::{Layer, layer::Context, prelude::*},
};

// ── Engine ──────────────────────────────────────────────────────────────────

/// What the mock engine does for a command name (first word of the input).
#[derive(Debug, Clone)]
pub enum Script {
    /// Succeed and reply with the text after the command name.
    Echo,
    Reply(String),
    /// Succeed without a reply.
    Silent,
    /// Succeed with a reply whose side effect fails.
    FailingReply,
    /// Return a structured failure without notifying observers.
    Fail(FailureKind),
    /// Command body raised an error.
    Throw(String),
    /// Command body was canceled.
    Canceled,
    /// Handler requires a context kind.
    Requires(ContextKind),
    /// Sleep, then succeed silently.
    Sleep(u64),
    /// Signal `started`, wait for `release`, then succeed silently.
    Block,
    Panic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCall {
    pub input: String,
    pub message_id: String,
    pub channel_id: String,
    pub content: String,
}

pub struct MockEngine {
    scripts: Mutex<HashMap<String, Script>>,
    observers: EngineObservers,
    calls: Mutex<Vec<EngineCall>>,
    events: Mutex<Vec<String>>,
    pub started: Notify,
    pub release: Notify,
}

impl MockEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(HashMap::new()),
            observers: EngineObservers::new(),
            calls: Mutex::new(Vec::new()),
            events: Mutex::new(Vec::new()),
            started: Notify::new(),
            release: Notify::new(),
        })
    }

    pub fn script(self: &Arc<Self>, command: &str, script: Script) -> Arc<Self> {
        self.scripts
            .lock()
            .unwrap()
            .insert(command.to_string(), script);
        Arc::clone(self)
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn inputs(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.input).collect()
    }

    /// `"<command>:start"` / `"<command>:end"` markers in execution order.
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    fn info(command: &str) -> CommandInfo {
        CommandInfo::new(command, "Test")
    }

    async fn body_failed(&self, ctx: Arc<CommandContext>, command: &str, error: CommandError) -> ExecutionResult {
        let failed = FailedResult::execution_failed(ExecutionStep::Command, error)
            .with_command(Self::info(command));
        self.observers.execution_failed(ctx, failed.clone()).await;
        failed.into()
    }
}

#[async_trait]
impl CommandEngine for MockEngine {
    async fn execute(&self, input: &str, ctx: Arc<CommandContext>) -> ExecutionResult {
        self.calls.lock().unwrap().push(EngineCall {
            input: input.to_string(),
            message_id: ctx.message().id.clone(),
            channel_id: ctx.channel().id.clone(),
            content: ctx.message().content.clone(),
        });

        let (command, rest) = input.split_once(' ').unwrap_or((input, ""));
        let script = self.scripts.lock().unwrap().get(command).cloned();
        self.events.lock().unwrap().push(format!("{command}:start"));

        let result = match script {
            None => FailedResult::new(FailureKind::CommandNotFound, "unknown command").into(),
            Some(Script::Echo) => {
                self.observers
                    .executed(ctx, Some(Box::new(TextReply::new(rest))))
                    .await;
                ExecutionResult::Success
            },
            Some(Script::Reply(text)) => {
                self.observers
                    .executed(ctx, Some(Box::new(TextReply::new(text))))
                    .await;
                ExecutionResult::Success
            },
            Some(Script::Silent) => {
                self.observers.executed(ctx, None).await;
                ExecutionResult::Success
            },
            Some(Script::FailingReply) => {
                self.observers
                    .executed(ctx, Some(Box::new(BrokenReply)))
                    .await;
                ExecutionResult::Success
            },
            Some(Script::Fail(kind)) => FailedResult::new(kind, "scripted failure")
                .with_command(Self::info(command))
                .into(),
            Some(Script::Throw(message)) => {
                self.body_failed(ctx, command, CommandError::Other(anyhow::anyhow!(message)))
                    .await
            },
            Some(Script::Canceled) => self.body_failed(ctx, command, CommandError::Canceled).await,
            Some(Script::Requires(kind)) => match ctx.require(&kind) {
                Ok(()) => {
                    self.observers.executed(ctx, None).await;
                    ExecutionResult::Success
                },
                Err(mismatch) => self.body_failed(ctx, command, mismatch.into()).await,
            },
            Some(Script::Sleep(ms)) => {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                self.observers.executed(ctx, None).await;
                ExecutionResult::Success
            },
            Some(Script::Block) => {
                self.started.notify_one();
                self.release.notified().await;
                self.observers.executed(ctx, None).await;
                ExecutionResult::Success
            },
            Some(Script::Panic) => panic!("engine exploded"),
        };

        self.events.lock().unwrap().push(format!("{command}:end"));
        result
    }

    fn subscribe(&self, observer: Arc<dyn EngineObserver>) {
        self.observers.subscribe(observer);
    }
}

struct BrokenReply;

#[async_trait]
impl CommandReply for BrokenReply {
    fn kind(&self) -> &'static str {
        "broken"
    }

    async fn execute(&self, _ctx: &CommandContext) -> anyhow::Result<()> {
        anyhow::bail!("reply transport unavailable")
    }
}

// ── Outbound ────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingOutbound {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingOutbound {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// `(channel id, text)` pairs in send order.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChannelOutbound for RecordingOutbound {
    async fn send_text(&self, channel: &ChannelRef, text: &str) -> parley_channels::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((channel.id.clone(), text.to_string()));
        Ok(())
    }
}

// ── Context factory ─────────────────────────────────────────────────────────

struct DisposalProbe {
    id: String,
    counts: Arc<Mutex<HashMap<String, usize>>>,
}

#[async_trait]
impl ContextScope for DisposalProbe {
    async fn dispose(self: Box<Self>) -> anyhow::Result<()> {
        *self.counts.lock().unwrap().entry(self.id).or_default() += 1;
        Ok(())
    }
}

/// Default factory that counts creations and per-context disposals.
#[derive(Default)]
pub struct CountingFactory {
    created: AtomicUsize,
    disposals: Arc<Mutex<HashMap<String, usize>>>,
    pub fail: bool,
}

impl CountingFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Default::default()
        })
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Disposal count per created context.
    pub fn disposals(&self) -> Vec<usize> {
        self.disposals.lock().unwrap().values().copied().collect()
    }

    pub fn disposed_total(&self) -> usize {
        self.disposals().iter().sum()
    }

    /// Every created context was disposed exactly once.
    pub fn assert_each_disposed_once(&self) {
        let disposals = self.disposals.lock().unwrap();
        assert_eq!(disposals.len(), self.created(), "some contexts were never disposed");
        assert!(
            disposals.values().all(|n| *n == 1),
            "disposal counts: {disposals:?}"
        );
    }
}

impl ContextFactory for CountingFactory {
    fn create_context(
        &self,
        prefix: PrefixRef,
        message: Arc<InboundMessage>,
        channel: ChannelRef,
        env: &ContextEnv,
    ) -> anyhow::Result<CommandContext> {
        if self.fail {
            anyhow::bail!("factory refused");
        }
        let ctx = DefaultContextFactory.create_context(prefix, message, channel, env)?;
        self.created.fetch_add(1, Ordering::SeqCst);
        let id = ctx.id().to_string();
        self.disposals.lock().unwrap().insert(id.clone(), 0);
        ctx.attach(Box::new(DisposalProbe {
            id,
            counts: Arc::clone(&self.disposals),
        }))
        .map_err(|_| anyhow::anyhow!("fresh context rejected a resource"))?;
        Ok(ctx)
    }
}

// ── Hooks ───────────────────────────────────────────────────────────────────

pub struct CountingHooks {
    pub accept: bool,
    pub before_execute: bool,
    pub check_calls: AtomicUsize,
    pub failed: AtomicUsize,
    pub execution_failed: AtomicUsize,
}

impl Default for CountingHooks {
    fn default() -> Self {
        Self {
            accept: true,
            before_execute: true,
            check_calls: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            execution_failed: AtomicUsize::new(0),
        }
    }
}

impl CountingHooks {
    pub fn failed_calls(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    pub fn execution_failed_calls(&self) -> usize {
        self.execution_failed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BotHooks for CountingHooks {
    async fn check_message(&self, _message: &InboundMessage) -> anyhow::Result<bool> {
        self.check_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.accept)
    }

    async fn before_execute(&self, _ctx: &CommandContext) -> anyhow::Result<bool> {
        Ok(self.before_execute)
    }

    async fn handle_failed_result(
        &self,
        _ctx: &CommandContext,
        _result: &FailedResult,
    ) -> anyhow::Result<()> {
        self.failed.fetch_add(1, Ordering::SeqCst);
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

// ── Prefix provider ─────────────────────────────────────────────────────────

pub struct CountingProvider {
    prefixes: Option<Vec<PrefixRef>>,
    fail: bool,
    calls: AtomicUsize,
}

impl CountingProvider {
    pub fn literal(prefixes: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            prefixes: Some(
                prefixes
                    .iter()
                    .map(|p| Arc::new(StringPrefix::new(*p)) as PrefixRef)
                    .collect(),
            ),
            fail: false,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn none() -> Arc<Self> {
        Arc::new(Self {
            prefixes: None,
            fail: false,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            prefixes: None,
            fail: true,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl parley_dispatch::PrefixProvider for CountingProvider {
    async fn get_prefixes(
        &self,
        _message: &InboundMessage,
    ) -> anyhow::Result<Option<Vec<PrefixRef>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("prefix store offline");
        }
        Ok(self.prefixes.clone())
    }
}

// ── Log capture ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Captured {
    pub level: Level,
    pub message: String,
    pub fields: HashMap<String, String>,
}

#[derive(Clone, Default)]
pub struct LogCapture {
    records: Arc<Mutex<Vec<Captured>>>,
}

impl LogCapture {
    /// Install as the thread's default subscriber for the guard's lifetime.
    /// Tests using this must run on the current-thread runtime.
    pub fn install() -> (Self, tracing::subscriber::DefaultGuard) {
        let capture = Self::default();
        let subscriber = tracing_subscriber::registry().with(capture.clone());
        let guard = tracing::subscriber::set_default(subscriber);
        (capture, guard)
    }

    /// WARN and ERROR records.
    pub fn problems(&self) -> Vec<Captured> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.level <= Level::WARN)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.records.lock().unwrap().clear();
    }
}

struct FieldVisitor {
    message: String,
    fields: HashMap<String, String>,
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.fields
                .insert(field.name().to_string(), format!("{value:?}"));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.insert(field.name().to_string(), value.to_string());
        }
    }
}

impl<S: tracing::Subscriber> Layer<S> for LogCapture {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor {
            message: String::new(),
            fields: HashMap::new(),
        };
        event.record(&mut visitor);
        self.records.lock().unwrap().push(Captured {
            level: *event.metadata().level(),
            message: visitor.message,
            fields: visitor.fields,
        });
    }
}

// ── Messages ────────────────────────────────────────────────────────────────

pub fn event(id: &str, channel: ChannelRef, content: &str) -> MessageEvent {
    let message = InboundMessage::user(id, Author::new("u1", "alice"), &channel, content)
        .with_source("test");
    MessageEvent::new(message, channel)
}

pub fn direct(id: &str, content: &str) -> MessageEvent {
    event(id, ChannelRef::direct("dm-1"), content)
}
