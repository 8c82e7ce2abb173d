//! Metric names for parley and the `metrics` facade macros.
//!
//! Crates record through the re-exported macros behind their own optional
//! `metrics` feature. Nothing is exported until the host installs a
//! recorder (Prometheus, statsd, ...).
//!
//! ```rust,ignore
//! use parley_metrics::{counter, dispatch, labels};
//!
//! counter!(dispatch::MESSAGES_DROPPED_TOTAL, labels::STAGE => "match_prefix").increment(1);
//! ```

mod definitions;

pub use definitions::*;

// Re-export metrics macros for convenience
pub use metrics::{counter, gauge, histogram};
