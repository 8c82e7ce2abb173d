//! Chat platform seams.
//!
//! An [`EventSource`] delivers inbound messages, a [`ChannelOutbound`] sends
//! text back, and [`gating`] decides which messages are worth looking at.

pub mod error;
pub mod gating;
pub mod outbound;
pub mod source;

pub use {
    error::{Error, Result},
    gating::MessageGate,
    outbound::{ChannelOutbound, NullOutbound},
    source::{ChannelSource, EventSource, MessageEvent},
};
