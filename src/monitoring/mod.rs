//! Monitoring for the shard tailer
//!
//! When enabled, the tailer streams [`TailerEvent`]s over a bounded channel.
//! [`MetricsAggregator`] folds them into per-shard [`TailerMetrics`].

mod metrics;
mod types;

pub use metrics::{MetricsAggregator, TailerMetrics};
pub use types::{IteratorEventType, MonitoringConfig, TailerEvent, TailerEventType};
