use super::types::{IteratorEventType, TailerEvent, TailerEventType};
use crate::tailer::TailerState;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;
use tracing::{debug, info, trace, warn};

/// Aggregated metrics for one tailed shard
#[derive(Debug, Clone)]
pub struct TailerMetrics {
    // Poll metrics
    pub polls: u64,
    pub empty_polls: u64,
    pub poll_failures: u64,
    pub millis_behind_latest: Option<i64>,

    // Record metrics
    pub records_delivered: u64,
    pub records_failed: u64,
    pub retry_attempts: u64,
    /// Handler invocations, retries included
    pub record_attempts: u64,
    pub processing_time: Duration,
    /// Mean duration of a single handler attempt
    pub avg_processing_time: Duration,
    pub max_processing_time: Duration,

    // Iterator metrics
    pub iterator_refreshes: u64,
    pub iterator_failures: u64,

    pub terminated: bool,
    pub last_updated: Instant,
}

impl Default for TailerMetrics {
    fn default() -> Self {
        Self {
            polls: 0,
            empty_polls: 0,
            poll_failures: 0,
            millis_behind_latest: None,
            records_delivered: 0,
            records_failed: 0,
            retry_attempts: 0,
            record_attempts: 0,
            processing_time: Duration::default(),
            avg_processing_time: Duration::default(),
            max_processing_time: Duration::default(),
            iterator_refreshes: 0,
            iterator_failures: 0,
            terminated: false,
            last_updated: Instant::now(),
        }
    }
}

/// Folds monitoring events into metrics and logs them periodically
pub struct MetricsAggregator {
    metrics: Arc<RwLock<HashMap<String, TailerMetrics>>>,
    window_duration: Duration,
    monitoring_rx: mpsc::Receiver<TailerEvent>,
}

impl MetricsAggregator {
    pub fn new(window_duration: Duration, monitoring_rx: mpsc::Receiver<TailerEvent>) -> Self {
        Self {
            metrics: Arc::new(RwLock::new(HashMap::new())),
            window_duration,
            monitoring_rx,
        }
    }

    /// Shared view of the metrics, usable after `run` has consumed the aggregator
    pub fn metrics_handle(&self) -> Arc<RwLock<HashMap<String, TailerMetrics>>> {
        self.metrics.clone()
    }

    /// Process events until every sender is dropped
    pub async fn run(mut self) {
        let mut ticker = interval(self.window_duration);

        loop {
            tokio::select! {
                event = self.monitoring_rx.recv() => match event {
                    Some(event) => self.process_event(event).await,
                    None => {
                        debug!("Monitoring channel closed");
                        break;
                    }
                },
                _ = ticker.tick() => {
                    self.emit_metrics().await;
                }
            }
        }

        self.emit_metrics().await;
    }

    pub async fn process_event(&self, event: TailerEvent) {
        let mut metrics = self.metrics.write().await;
        let shard_metrics = metrics.entry(event.shard_id.clone()).or_default();

        match event.event_type {
            TailerEventType::StateChanged { state } => {
                trace!(shard_id = %event.shard_id, state = ?state, "Tailer state changed");
                if state == TailerState::Terminated {
                    shard_metrics.terminated = true;
                }
            }
            TailerEventType::PollSucceeded {
                record_count,
                millis_behind_latest,
                ..
            } => {
                shard_metrics.polls += 1;
                if record_count == 0 {
                    shard_metrics.empty_polls += 1;
                }
                if millis_behind_latest.is_some() {
                    shard_metrics.millis_behind_latest = millis_behind_latest;
                }
            }
            TailerEventType::PollFailed {
                error,
                consecutive_failures,
                ..
            } => {
                shard_metrics.polls += 1;
                shard_metrics.poll_failures += 1;
                debug!(
                    shard_id = %event.shard_id,
                    error = %error,
                    consecutive_failures = consecutive_failures,
                    "Poll failed"
                );
            }
            TailerEventType::RecordAttempt {
                success,
                attempt_number,
                duration,
                is_final_attempt,
                ..
            } => {
                if success {
                    shard_metrics.records_delivered += 1;
                } else if is_final_attempt {
                    shard_metrics.records_failed += 1;
                }

                if attempt_number > 1 {
                    shard_metrics.retry_attempts += 1;
                }

                shard_metrics.record_attempts += 1;
                shard_metrics.processing_time += duration;
                shard_metrics.avg_processing_time = shard_metrics
                    .processing_time
                    .div_f64(shard_metrics.record_attempts as f64);
                if duration > shard_metrics.max_processing_time {
                    shard_metrics.max_processing_time = duration;
                }
            }
            TailerEventType::RecordFailure {
                sequence_number,
                error,
            } => {
                warn!(
                    shard_id = %event.shard_id,
                    sequence = %sequence_number,
                    error = %error,
                    "Record dead-lettered"
                );
            }
            TailerEventType::Iterator { event_type, error } => match event_type {
                IteratorEventType::Initial => {
                    trace!(shard_id = %event.shard_id, "Initial iterator acquired");
                }
                IteratorEventType::Refreshed => {
                    shard_metrics.iterator_refreshes += 1;
                }
                IteratorEventType::Failed => {
                    shard_metrics.iterator_failures += 1;
                    warn!(shard_id = %event.shard_id, error = ?error, "Iterator operation failed");
                }
            },
            TailerEventType::Terminated { reason } => {
                shard_metrics.terminated = true;
                info!(shard_id = %event.shard_id, reason = ?reason, "Tailer terminated");
            }
        }

        shard_metrics.last_updated = Instant::now();
    }

    async fn emit_metrics(&self) {
        let metrics = self.metrics.read().await;

        for (shard_id, metrics) in metrics.iter() {
            info!(
                shard_id = %shard_id,
                polls = metrics.polls,
                empty_polls = metrics.empty_polls,
                poll_failures = metrics.poll_failures,
                millis_behind_latest = ?metrics.millis_behind_latest,
                records_delivered = metrics.records_delivered,
                records_failed = metrics.records_failed,
                retry_attempts = metrics.retry_attempts,
                avg_processing_time_ms = %metrics.avg_processing_time.as_millis(),
                max_processing_time_ms = %metrics.max_processing_time.as_millis(),
                iterator_refreshes = metrics.iterator_refreshes,
                "Metrics for window"
            );

            if metrics.records_failed > 0 {
                warn!(
                    shard_id = %shard_id,
                    failed = metrics.records_failed,
                    "Records failed processing"
                );
            }
        }
    }

    pub async fn get_metrics(&self) -> HashMap<String, TailerMetrics> {
        self.metrics.read().await.clone()
    }

    pub async fn get_shard_metrics(&self, shard_id: &str) -> Option<TailerMetrics> {
        self.metrics.read().await.get(shard_id).cloned()
    }
}
