//! Shared types, error definitions, and utilities used across all parley crates.

pub mod error;
pub mod sync_map;
pub mod types;

pub use {
    error::FromMessage,
    sync_map::SyncMap,
    types::{Author, ChannelRef, InboundMessage, MessageKind},
};
