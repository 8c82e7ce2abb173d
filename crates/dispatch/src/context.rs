//! Per-invocation execution context.

use std::{
    fmt,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use {
    async_trait::async_trait,
    parley_channels::ChannelOutbound,
    parley_common::{Author, ChannelRef, InboundMessage},
    tracing::warn,
    uuid::Uuid,
};

use crate::{
    prefix::PrefixRef,
    services::{ServiceScope, Services},
};

/// Runtime type tag of a [`CommandContext`].
///
/// `Standard` is the base every command accepts. `Guild` is the restricted
/// variant only produced for guild channels. `Custom` tags come from custom
/// [`ContextFactory`] implementations.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContextKind {
    Standard,
    Guild,
    Custom(String),
}

impl ContextKind {
    /// Whether a handler declared for `self` can run with a context of kind `actual`.
    pub fn accepts(&self, actual: &ContextKind) -> bool {
        match (self, actual) {
            (Self::Standard, Self::Standard | Self::Guild) => true,
            (Self::Guild, Self::Guild) => true,
            (Self::Custom(expected), Self::Custom(actual)) => expected == actual,
            _ => false,
        }
    }

    /// True for the kinds [`DefaultContextFactory`] produces.
    pub fn is_builtin(&self) -> bool {
        !matches!(self, Self::Custom(_))
    }
}

impl fmt::Display for ContextKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standard => f.write_str("StandardContext"),
            Self::Guild => f.write_str("GuildContext"),
            Self::Custom(name) => f.write_str(name),
        }
    }
}

/// A handler required one context kind but was given another.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("expected {expected}, got {actual}")]
pub struct ContextTypeMismatch {
    pub expected: ContextKind,
    pub actual: ContextKind,
}

/// A resource owned by a context and released on disposal.
#[async_trait]
pub trait ContextScope: Send + Sync {
    async fn dispose(self: Box<Self>) -> anyhow::Result<()>;
}

/// One or more owned resources failed to dispose.
#[derive(Debug, thiserror::Error)]
#[error("failed to dispose {count} context resource(s): {first}")]
pub struct DisposeError {
    pub count: usize,
    pub first: anyhow::Error,
}

/// Shared collaborators every context is built with.
#[derive(Clone)]
pub struct ContextEnv {
    pub services: Arc<Services>,
    pub outbound: Arc<dyn ChannelOutbound>,
}

/// Correlates a matched command request with its source message, channel
/// and the bot's services for the duration of one invocation.
pub struct CommandContext {
    id: Uuid,
    kind: ContextKind,
    prefix: PrefixRef,
    message: Arc<InboundMessage>,
    channel: ChannelRef,
    services: ServiceScope,
    outbound: Arc<dyn ChannelOutbound>,
    resources: Mutex<Vec<Box<dyn ContextScope>>>,
    disposed: AtomicBool,
}

impl CommandContext {
    pub fn new(
        kind: ContextKind,
        prefix: PrefixRef,
        message: Arc<InboundMessage>,
        channel: ChannelRef,
        env: &ContextEnv,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            prefix,
            message,
            channel,
            services: ServiceScope::new(Arc::clone(&env.services)),
            outbound: Arc::clone(&env.outbound),
            resources: Mutex::new(Vec::new()),
            disposed: AtomicBool::new(false),
        }
    }

    /// Correlation ID, unique per invocation.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> &ContextKind {
        &self.kind
    }

    pub fn prefix(&self) -> &PrefixRef {
        &self.prefix
    }

    pub fn message(&self) -> &Arc<InboundMessage> {
        &self.message
    }

    pub fn author(&self) -> &Author {
        &self.message.author
    }

    pub fn channel(&self) -> &ChannelRef {
        &self.channel
    }

    pub fn services(&self) -> &ServiceScope {
        &self.services
    }

    pub fn service<T: std::any::Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.services.get::<T>()
    }

    pub fn outbound(&self) -> &Arc<dyn ChannelOutbound> {
        &self.outbound
    }

    /// Send text to the channel the command came from.
    pub async fn reply(&self, text: &str) -> parley_channels::Result<()> {
        self.outbound.send_text(&self.channel, text).await
    }

    /// Capability check engines run before invoking a handler that declares
    /// the context kind it needs.
    pub fn require(&self, expected: &ContextKind) -> Result<(), ContextTypeMismatch> {
        if expected.accepts(&self.kind) {
            Ok(())
        } else {
            Err(ContextTypeMismatch {
                expected: expected.clone(),
                actual: self.kind.clone(),
            })
        }
    }

    /// Hand a resource to the context. Rejected once the context is disposed.
    pub fn attach(&self, resource: Box<dyn ContextScope>) -> Result<(), Box<dyn ContextScope>> {
        let mut resources = self.resources.lock().unwrap_or_else(|e| e.into_inner());
        if self.is_disposed() {
            return Err(resource);
        }
        resources.push(resource);
        Ok(())
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Release scoped services and owned resources, newest first.
    ///
    /// Only the first call does any work; later calls return `Ok(false)`.
    /// Every resource is disposed even if an earlier one fails.
    pub async fn dispose(&self) -> Result<bool, DisposeError> {
        let resources = {
            let mut resources = self.resources.lock().unwrap_or_else(|e| e.into_inner());
            if self.disposed.swap(true, Ordering::AcqRel) {
                return Ok(false);
            }
            std::mem::take(&mut *resources)
        };

        self.services.release();

        let mut count = 0;
        let mut first = None;
        for resource in resources.into_iter().rev() {
            if let Err(e) = resource.dispose().await {
                count += 1;
                first.get_or_insert(e);
            }
        }

        match first {
            Some(first) => Err(DisposeError { count, first }),
            None => Ok(true),
        }
    }
}

impl fmt::Debug for CommandContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandContext")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("prefix", &self.prefix.to_string())
            .field("message_id", &self.message.id)
            .field("channel_id", &self.channel.id)
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

impl Drop for CommandContext {
    fn drop(&mut self) {
        if !self.is_disposed() {
            warn!(context_id = %self.id, message_id = %self.message.id, "command context dropped without being disposed");
        }
    }
}

/// Builds the context for an accepted message.
pub trait ContextFactory: Send + Sync {
    fn create_context(
        &self,
        prefix: PrefixRef,
        message: Arc<InboundMessage>,
        channel: ChannelRef,
        env: &ContextEnv,
    ) -> anyhow::Result<CommandContext>;
}

/// Produces [`ContextKind::Guild`] for guild channels and
/// [`ContextKind::Standard`] everywhere else.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultContextFactory;

impl ContextFactory for DefaultContextFactory {
    fn create_context(
        &self,
        prefix: PrefixRef,
        message: Arc<InboundMessage>,
        channel: ChannelRef,
        env: &ContextEnv,
    ) -> anyhow::Result<CommandContext> {
        let kind = if channel.is_guild() {
            ContextKind::Guild
        } else {
            ContextKind::Standard
        };
        Ok(CommandContext::new(kind, prefix, message, channel, env))
    }
}
