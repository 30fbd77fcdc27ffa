use crate::tailer::{TailerState, TerminationReason};
use std::time::{Duration, SystemTime};

/// Configuration for the monitoring channel
#[derive(Debug, Clone)]
pub struct MonitoringConfig {
    /// Whether monitoring events are emitted
    pub enabled: bool,
    /// Size of the monitoring channel buffer
    pub channel_size: usize,
    /// How often the aggregator logs its metrics
    pub metrics_interval: Duration,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            channel_size: 1000,
            metrics_interval: Duration::from_secs(60),
        }
    }
}

/// A monitoring event emitted by the tailer
#[derive(Debug, Clone)]
pub struct TailerEvent {
    pub timestamp: SystemTime,
    pub shard_id: String,
    pub event_type: TailerEventType,
}

#[derive(Debug, Clone)]
pub enum TailerEventType {
    StateChanged {
        state: TailerState,
    },
    PollSucceeded {
        record_count: usize,
        millis_behind_latest: Option<i64>,
        duration: Duration,
    },
    PollFailed {
        error: String,
        consecutive_failures: u32,
        retry_delay: Option<Duration>,
    },
    RecordAttempt {
        sequence_number: String,
        success: bool,
        attempt_number: u32,
        duration: Duration,
        error: Option<String>,
        is_final_attempt: bool,
    },
    RecordFailure {
        sequence_number: String,
        error: String,
    },
    Iterator {
        event_type: IteratorEventType,
        error: Option<String>,
    },
    Terminated {
        reason: TerminationReason,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IteratorEventType {
    /// Iterator obtained from the start position
    Initial,
    /// Iterator re-acquired after expiry
    Refreshed,
    /// Failed to get an iterator
    Failed,
}

impl TailerEvent {
    fn new(shard_id: String, event_type: TailerEventType) -> Self {
        Self {
            timestamp: SystemTime::now(),
            shard_id,
            event_type,
        }
    }

    pub fn state_changed(shard_id: String, state: TailerState) -> Self {
        Self::new(shard_id, TailerEventType::StateChanged { state })
    }

    pub fn poll_succeeded(
        shard_id: String,
        record_count: usize,
        millis_behind_latest: Option<i64>,
        duration: Duration,
    ) -> Self {
        Self::new(
            shard_id,
            TailerEventType::PollSucceeded {
                record_count,
                millis_behind_latest,
                duration,
            },
        )
    }

    pub fn poll_failed(
        shard_id: String,
        error: String,
        consecutive_failures: u32,
        retry_delay: Option<Duration>,
    ) -> Self {
        Self::new(
            shard_id,
            TailerEventType::PollFailed {
                error,
                consecutive_failures,
                retry_delay,
            },
        )
    }

    pub fn record_attempt(
        shard_id: String,
        sequence_number: String,
        success: bool,
        attempt_number: u32,
        duration: Duration,
        error: Option<String>,
        is_final_attempt: bool,
    ) -> Self {
        Self::new(
            shard_id,
            TailerEventType::RecordAttempt {
                sequence_number,
                success,
                attempt_number,
                duration,
                error,
                is_final_attempt,
            },
        )
    }

    pub fn record_failure(shard_id: String, sequence_number: String, error: String) -> Self {
        Self::new(
            shard_id,
            TailerEventType::RecordFailure {
                sequence_number,
                error,
            },
        )
    }

    pub fn iterator(shard_id: String, event_type: IteratorEventType, error: Option<String>) -> Self {
        Self::new(shard_id, TailerEventType::Iterator { event_type, error })
    }

    pub fn terminated(shard_id: String, reason: TerminationReason) -> Self {
        Self::new(shard_id, TailerEventType::Terminated { reason })
    }
}
