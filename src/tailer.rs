//! Shard tailer
//!
//! Follows a single shard of a Kinesis stream:
//!
//! - resolves the shard from the stream descriptor and opens an iterator at
//!   the configured start position
//! - polls at a fixed interval, handing each record to a [`RecordHandler`]
//!   in service order
//! - retries failed polls according to a [`PollRetryPolicy`]
//! - stops when the shard is closed or a shutdown signal arrives
//!
//! Handler failures never stop the tailer: a record that exhausts its
//! attempts is logged, optionally dead-lettered, and skipped.

use crate::client::{KinesisClientError, KinesisClientTrait, PollOutput};
use crate::error::{ProcessingError, Result, TailerError};
use crate::monitoring::{IteratorEventType, MonitoringConfig, TailerEvent};
use crate::retry::{ExponentialBackoff, PollRetryPolicy, RetryDecision};
use async_trait::async_trait;
use aws_sdk_kinesis::types::{Record, ShardIteratorType};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

/// Business logic invoked once per record
///
/// # Examples
///
/// ```rust
/// use kinesis_tail::RecordHandler;
/// use kinesis_tail::error::ProcessingError;
/// use aws_sdk_kinesis::types::Record;
///
/// struct PrintHandler;
///
/// #[async_trait::async_trait]
/// impl RecordHandler for PrintHandler {
///     async fn handle_record(&self, record: &Record) -> Result<(), ProcessingError> {
///         let text = std::str::from_utf8(record.data().as_ref())
///             .map_err(ProcessingError::hard)?;
///         println!("{}: {}", record.sequence_number(), text);
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait RecordHandler: Send + Sync {
    /// * `Ok(())` when the record was handled
    /// * `Err(ProcessingError::SoftFailure)` to ask for another attempt
    /// * `Err(ProcessingError::HardFailure)` to skip the record
    async fn handle_record(&self, record: &Record) -> std::result::Result<(), ProcessingError>;
}

/// Where the tailer opens its iterator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartPosition {
    /// Oldest record still retained
    TrimHorizon,
    /// Only records written after the iterator is opened
    Latest,
    AtSequenceNumber(String),
    AfterSequenceNumber(String),
    AtTimestamp(DateTime<Utc>),
}

impl StartPosition {
    fn iterator_args(&self) -> (ShardIteratorType, Option<&str>, Option<&DateTime<Utc>>) {
        match self {
            StartPosition::TrimHorizon => (ShardIteratorType::TrimHorizon, None, None),
            StartPosition::Latest => (ShardIteratorType::Latest, None, None),
            StartPosition::AtSequenceNumber(seq) => {
                (ShardIteratorType::AtSequenceNumber, Some(seq.as_str()), None)
            }
            StartPosition::AfterSequenceNumber(seq) => {
                (ShardIteratorType::AfterSequenceNumber, Some(seq.as_str()), None)
            }
            StartPosition::AtTimestamp(ts) => (ShardIteratorType::AtTimestamp, None, Some(ts)),
        }
    }
}

impl FromStr for StartPosition {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "trim-horizon" | "oldest" | "from-oldest" => Ok(StartPosition::TrimHorizon),
            "latest" | "from-latest" => Ok(StartPosition::Latest),
            other => Err(format!(
                "unknown start position '{}', expected trim-horizon or latest",
                other
            )),
        }
    }
}

/// Configuration for the shard tailer
#[derive(Debug, Clone)]
pub struct TailerConfig {
    /// Name of the stream to tail
    pub stream_name: String,
    /// Shard to tail; the first listed shard when `None`
    pub shard_id: Option<String>,
    pub start_position: StartPosition,
    /// Delay between successful polls
    pub poll_interval: Duration,
    /// Maximum number of records per GetRecords call
    pub batch_size: i32,
    /// Defaults to [`PollRetryPolicy::uniform`] with a 1s delay, so poll
    /// errors never end the run; use [`PollRetryPolicy::default`] for
    /// throttling backoff and failing fast on permanent errors
    pub retry_policy: PollRetryPolicy,
    /// Extra attempts for records whose handler reports a soft failure
    pub handler_max_retries: u32,
    /// First handler retry delay, doubled on every further attempt
    pub handler_retry_delay: Duration,
    pub monitoring: MonitoringConfig,
}

impl Default for TailerConfig {
    fn default() -> Self {
        Self {
            stream_name: "TestingDataStream".to_string(),
            shard_id: None,
            start_position: StartPosition::TrimHorizon,
            poll_interval: Duration::from_secs(1),
            batch_size: 100,
            retry_policy: PollRetryPolicy::uniform(Duration::from_secs(1)),
            handler_max_retries: 0,
            handler_retry_delay: Duration::from_millis(100),
            monitoring: MonitoringConfig::default(),
        }
    }
}

/// Lifecycle of a tailer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailerState {
    Initializing,
    Polling,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// The shard reported that no more data will arrive
    ShardClosed,
    ShutdownRequested,
}

/// Outcome of a completed run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailSummary {
    /// `None` when shutdown arrived before the shard was resolved
    pub shard_id: Option<String>,
    pub reason: TerminationReason,
    /// GetRecords calls issued, failed ones included
    pub polls: u64,
    pub records_delivered: u64,
    pub records_failed: u64,
}

/// A record that could not be handled
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub shard_id: String,
    pub sequence_number: String,
    pub partition_key: String,
    pub data: Bytes,
    pub error: String,
    pub attempts: u32,
}

enum Delivery {
    Delivered,
    Failed,
    Interrupted,
}

/// Per-run cursor and counters
struct Cursor {
    shard_id: String,
    position: String,
    last_sequence: Option<String>,
    consecutive_failures: u32,
    polls: u64,
    delivered: u64,
    failed: u64,
}

/// Tails one shard and feeds its records to a [`RecordHandler`]
///
/// # Examples
///
/// ```rust,no_run
/// use kinesis_tail::{RecordHandler, ShardTailer, TailerConfig};
/// use aws_sdk_kinesis::Client;
///
/// async fn tail(handler: impl RecordHandler + 'static, client: Client) -> anyhow::Result<()> {
///     let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
///     let (tailer, _monitoring_rx) = ShardTailer::new(TailerConfig::default(), handler, client);
///
///     let handle = tokio::spawn(async move { tailer.run(shutdown_rx).await });
///     // ... later
///     shutdown_tx.send(true)?;
///     let summary = handle.await??;
///     println!("delivered {} records", summary.records_delivered);
///     Ok(())
/// }
/// ```
pub struct ShardTailer<H, C>
where
    H: RecordHandler + 'static,
    C: KinesisClientTrait + 'static,
{
    handler: Arc<H>,
    client: Arc<C>,
    config: TailerConfig,
    handler_backoff: ExponentialBackoff,
    monitoring_tx: Option<mpsc::Sender<TailerEvent>>,
    dead_letter_tx: Option<mpsc::Sender<DeadLetter>>,
    state_tx: watch::Sender<TailerState>,
}

impl<H, C> ShardTailer<H, C>
where
    H: RecordHandler + 'static,
    C: KinesisClientTrait + 'static,
{
    /// Returns the tailer and, when monitoring is enabled, the event receiver
    pub fn new(
        config: TailerConfig,
        handler: H,
        client: C,
    ) -> (Self, Option<mpsc::Receiver<TailerEvent>>) {
        let (monitoring_tx, monitoring_rx) = if config.monitoring.enabled {
            let (tx, rx) = mpsc::channel(config.monitoring.channel_size);
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        let handler_backoff = ExponentialBackoff::builder()
            .initial_delay(config.handler_retry_delay)
            .max_delay(Duration::from_secs(10))
            .jitter_factor(0.0)
            .build();

        let (state_tx, _) = watch::channel(TailerState::Initializing);

        let tailer = Self {
            handler: Arc::new(handler),
            client: Arc::new(client),
            config,
            handler_backoff,
            monitoring_tx,
            dead_letter_tx: None,
            state_tx,
        };

        (tailer, monitoring_rx)
    }

    /// Publish records that exhaust their attempts on `tx`
    pub fn with_dead_letter_channel(mut self, tx: mpsc::Sender<DeadLetter>) -> Self {
        self.dead_letter_tx = Some(tx);
        self
    }

    pub fn config(&self) -> &TailerConfig {
        &self.config
    }

    /// Watch the tailer move through its states
    pub fn state(&self) -> watch::Receiver<TailerState> {
        self.state_tx.subscribe()
    }

    /// Tail the shard until it closes or `shutdown` turns true
    ///
    /// Setup failures and polls failing under a `Fail` retry decision are
    /// returned as errors; every other stop is an `Ok` summary.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<TailSummary> {
        info!(stream = %self.config.stream_name, "Starting shard tailer");
        self.state_tx.send_replace(TailerState::Initializing);

        let result = self.run_inner(&mut shutdown).await;
        if let Err(e) = &result {
            let shard_id = e
                .shard_id()
                .or(self.config.shard_id.as_deref())
                .unwrap_or(&self.config.stream_name);
            self.set_state(shard_id, TailerState::Terminated).await;
        }
        self.state_tx.send_replace(TailerState::Terminated);

        match &result {
            Ok(summary) => info!(
                stream = %self.config.stream_name,
                shard_id = ?summary.shard_id,
                reason = ?summary.reason,
                polls = summary.polls,
                delivered = summary.records_delivered,
                failed = summary.records_failed,
                "Shard tailer terminated"
            ),
            Err(e) => error!(
                stream = %self.config.stream_name,
                error = %e,
                "Shard tailer failed"
            ),
        }

        result
    }

    async fn run_inner(&self, shutdown: &mut watch::Receiver<bool>) -> Result<TailSummary> {
        let shard_id = match until_shutdown(self.resolve_shard(), shutdown).await {
            Some(shard_id) => shard_id?,
            None => {
                info!("Shutdown requested before shard was resolved");
                return Ok(TailSummary {
                    shard_id: None,
                    reason: TerminationReason::ShutdownRequested,
                    polls: 0,
                    records_delivered: 0,
                    records_failed: 0,
                });
            }
        };

        let position = match until_shutdown(self.initial_iterator(&shard_id), shutdown).await {
            Some(position) => position?,
            None => {
                let cursor = Cursor::new(shard_id, String::new());
                return Ok(self.finish(cursor, TerminationReason::ShutdownRequested).await);
            }
        };

        let mut cursor = Cursor::new(shard_id, position);
        self.set_state(&cursor.shard_id, TailerState::Polling).await;

        loop {
            let poll_start = Instant::now();
            let poll = self
                .client
                .get_records(&cursor.position, self.config.batch_size);

            let polled = until_shutdown(poll, shutdown).await;
            let result = match polled {
                Some(result) => result,
                None => return Ok(self.finish(cursor, TerminationReason::ShutdownRequested).await),
            };
            cursor.polls += 1;

            let output = match result {
                Ok(output) => output,
                Err(error) => {
                    cursor.consecutive_failures += 1;
                    let decision = self
                        .config
                        .retry_policy
                        .decide(&error, cursor.consecutive_failures);

                    match decision {
                        RetryDecision::RetryAfter(delay) => {
                            warn!(
                                shard_id = %cursor.shard_id,
                                error = %error,
                                attempt = cursor.consecutive_failures,
                                delay_ms = ?delay.as_millis(),
                                "Poll failed, retrying at same position"
                            );
                            self.send_event(TailerEvent::poll_failed(
                                cursor.shard_id.clone(),
                                error.to_string(),
                                cursor.consecutive_failures,
                                Some(delay),
                            ))
                            .await;

                            if !pause(delay, shutdown).await {
                                return Ok(self.finish(cursor, TerminationReason::ShutdownRequested).await);
                            }
                        }
                        RetryDecision::RefreshIterator => {
                            self.send_event(TailerEvent::poll_failed(
                                cursor.shard_id.clone(),
                                error.to_string(),
                                cursor.consecutive_failures,
                                None,
                            ))
                            .await;

                            if !self.refresh_iterator(&mut cursor, shutdown).await {
                                return Ok(self.finish(cursor, TerminationReason::ShutdownRequested).await);
                            }
                        }
                        RetryDecision::Fail => {
                            error!(
                                shard_id = %cursor.shard_id,
                                error = %error,
                                attempts = cursor.consecutive_failures,
                                "Poll failed, giving up"
                            );
                            self.send_event(TailerEvent::poll_failed(
                                cursor.shard_id.clone(),
                                error.to_string(),
                                cursor.consecutive_failures,
                                None,
                            ))
                            .await;

                            return Err(TailerError::PollFailed {
                                shard_id: cursor.shard_id,
                                attempts: cursor.consecutive_failures,
                                source: error,
                            });
                        }
                    }
                    continue;
                }
            };

            cursor.consecutive_failures = 0;
            let PollOutput {
                records,
                next_iterator,
                millis_behind_latest,
            } = output;

            trace!(
                shard_id = %cursor.shard_id,
                records = records.len(),
                millis_behind_latest = ?millis_behind_latest,
                "Poll succeeded"
            );
            self.send_event(TailerEvent::poll_succeeded(
                cursor.shard_id.clone(),
                records.len(),
                millis_behind_latest,
                poll_start.elapsed(),
            ))
            .await;

            for record in &records {
                let delivery = self.deliver(&cursor.shard_id, record, shutdown).await;
                match delivery {
                    Delivery::Delivered => cursor.delivered += 1,
                    Delivery::Failed => cursor.failed += 1,
                    Delivery::Interrupted => {
                        return Ok(self.finish(cursor, TerminationReason::ShutdownRequested).await);
                    }
                }
                cursor.last_sequence = Some(record.sequence_number().to_string());
            }

            // An absent next iterator means the shard is closed and drained;
            // an unchanged one on an empty poll means no progress is possible.
            let next = match next_iterator.filter(|it| !it.is_empty()) {
                Some(next) if !(records.is_empty() && next == cursor.position) => next,
                _ => {
                    info!(shard_id = %cursor.shard_id, "Shard closed, no further records");
                    return Ok(self.finish(cursor, TerminationReason::ShardClosed).await);
                }
            };
            cursor.position = next;

            if !pause(self.config.poll_interval, shutdown).await {
                return Ok(self.finish(cursor, TerminationReason::ShutdownRequested).await);
            }
        }
    }

    async fn resolve_shard(&self) -> Result<String> {
        let stream = &self.config.stream_name;

        let descriptor = self.client.describe_stream(stream).await.map_err(|source| {
            error!(stream = %stream, error = %source, "Failed to describe stream");
            TailerError::DescribeFailed {
                stream: stream.clone(),
                source,
            }
        })?;

        debug!(stream = %stream, shards = ?descriptor.shards, "Described stream");

        if descriptor.shards.is_empty() {
            return Err(TailerError::NoShards(stream.clone()));
        }

        match &self.config.shard_id {
            Some(shard_id) if descriptor.contains(shard_id) => Ok(shard_id.clone()),
            Some(shard_id) => Err(TailerError::ShardNotFound {
                stream: stream.clone(),
                shard_id: shard_id.clone(),
            }),
            None => descriptor
                .first_shard()
                .map(String::from)
                .ok_or_else(|| TailerError::NoShards(stream.clone())),
        }
    }

    async fn initial_iterator(&self, shard_id: &str) -> Result<String> {
        match self.open_iterator(shard_id, &self.config.start_position).await {
            Ok(iterator) => {
                debug!(
                    shard_id = %shard_id,
                    start_position = ?self.config.start_position,
                    "Acquired initial iterator"
                );
                self.send_event(TailerEvent::iterator(
                    shard_id.to_string(),
                    IteratorEventType::Initial,
                    None,
                ))
                .await;
                Ok(iterator)
            }
            Err(source) => {
                error!(shard_id = %shard_id, error = %source, "Failed to get initial iterator");
                self.send_event(TailerEvent::iterator(
                    shard_id.to_string(),
                    IteratorEventType::Failed,
                    Some(source.to_string()),
                ))
                .await;
                Err(TailerError::IteratorFailed {
                    shard_id: shard_id.to_string(),
                    source,
                })
            }
        }
    }

    async fn open_iterator(
        &self,
        shard_id: &str,
        position: &StartPosition,
    ) -> std::result::Result<String, KinesisClientError> {
        let (iterator_type, sequence_number, timestamp) = position.iterator_args();
        self.client
            .get_shard_iterator(
                &self.config.stream_name,
                shard_id,
                iterator_type,
                sequence_number,
                timestamp,
            )
            .await
    }

    /// Replace an expired iterator, resuming after the last delivered record
    ///
    /// Returns false if shutdown was requested while waiting.
    async fn refresh_iterator(&self, cursor: &mut Cursor, shutdown: &mut watch::Receiver<bool>) -> bool {
        let position = match &cursor.last_sequence {
            Some(seq) => StartPosition::AfterSequenceNumber(seq.clone()),
            None => self.config.start_position.clone(),
        };

        let refreshed = match until_shutdown(self.open_iterator(&cursor.shard_id, &position), shutdown).await {
            Some(result) => result,
            None => return false,
        };

        match refreshed {
            Ok(iterator) => {
                info!(
                    shard_id = %cursor.shard_id,
                    position = ?position,
                    "Refreshed expired iterator"
                );
                cursor.position = iterator;
                self.send_event(TailerEvent::iterator(
                    cursor.shard_id.clone(),
                    IteratorEventType::Refreshed,
                    None,
                ))
                .await;
                true
            }
            Err(e) => {
                warn!(
                    shard_id = %cursor.shard_id,
                    error = %e,
                    "Failed to refresh expired iterator, will retry"
                );
                self.send_event(TailerEvent::iterator(
                    cursor.shard_id.clone(),
                    IteratorEventType::Failed,
                    Some(e.to_string()),
                ))
                .await;
                pause(self.config.retry_policy.error_delay, shutdown).await
            }
        }
    }

    /// Hand one record to the handler, retrying soft failures
    async fn deliver(
        &self,
        shard_id: &str,
        record: &Record,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Delivery {
        let sequence = record.sequence_number();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let start = Instant::now();

            match self.handler.handle_record(record).await {
                Ok(()) => {
                    trace!(shard_id = %shard_id, sequence = %sequence, attempt = attempt, "Record handled");
                    self.send_event(TailerEvent::record_attempt(
                        shard_id.to_string(),
                        sequence.to_string(),
                        true,
                        attempt,
                        start.elapsed(),
                        None,
                        false,
                    ))
                    .await;
                    return Delivery::Delivered;
                }
                Err(e) => {
                    let is_final_attempt =
                        !e.is_retriable() || attempt > self.config.handler_max_retries;

                    self.send_event(TailerEvent::record_attempt(
                        shard_id.to_string(),
                        sequence.to_string(),
                        false,
                        attempt,
                        start.elapsed(),
                        Some(e.to_string()),
                        is_final_attempt,
                    ))
                    .await;

                    if is_final_attempt {
                        warn!(
                            shard_id = %shard_id,
                            sequence = %sequence,
                            attempts = attempt,
                            error = %e,
                            "Record handling failed, skipping"
                        );
                        self.send_event(TailerEvent::record_failure(
                            shard_id.to_string(),
                            sequence.to_string(),
                            e.to_string(),
                        ))
                        .await;
                        if !self.dead_letter(shard_id, record, &e, attempt, shutdown).await {
                            return Delivery::Interrupted;
                        }
                        return Delivery::Failed;
                    }

                    let delay = self.handler_backoff.next_delay(attempt - 1);
                    warn!(
                        shard_id = %shard_id,
                        sequence = %sequence,
                        attempt = attempt,
                        error = %e,
                        "Soft failure, will retry"
                    );

                    if !pause(delay, shutdown).await {
                        return Delivery::Interrupted;
                    }
                }
            }
        }
    }

    /// Returns false if shutdown was requested while the channel was full
    async fn dead_letter(
        &self,
        shard_id: &str,
        record: &Record,
        error: &ProcessingError,
        attempts: u32,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        if let Some(tx) = &self.dead_letter_tx {
            let letter = DeadLetter {
                shard_id: shard_id.to_string(),
                sequence_number: record.sequence_number().to_string(),
                partition_key: record.partition_key().to_string(),
                data: Bytes::copy_from_slice(record.data().as_ref()),
                error: error.to_string(),
                attempts,
            };
            match until_shutdown(tx.send(letter), shutdown).await {
                Some(Ok(())) => {}
                Some(Err(e)) => {
                    warn!(shard_id = %shard_id, error = %e, "Failed to publish dead letter");
                }
                None => {
                    warn!(
                        shard_id = %shard_id,
                        sequence = %record.sequence_number(),
                        "Shutdown while dead-letter channel was full"
                    );
                    return false;
                }
            }
        }
        true
    }

    async fn set_state(&self, shard_id: &str, state: TailerState) {
        self.state_tx.send_replace(state);
        self.send_event(TailerEvent::state_changed(shard_id.to_string(), state))
            .await;
    }

    async fn finish(&self, cursor: Cursor, reason: TerminationReason) -> TailSummary {
        self.set_state(&cursor.shard_id, TailerState::Terminated).await;
        self.send_event(TailerEvent::terminated(cursor.shard_id.clone(), reason))
            .await;

        TailSummary {
            shard_id: Some(cursor.shard_id),
            reason,
            polls: cursor.polls,
            records_delivered: cursor.delivered,
            records_failed: cursor.failed,
        }
    }

    async fn send_event(&self, event: TailerEvent) {
        if let Some(tx) = &self.monitoring_tx {
            if let Err(e) = tx.try_send(event) {
                warn!(error = %e, "Dropped monitoring event");
            }
        }
    }
}

impl Cursor {
    fn new(shard_id: String, position: String) -> Self {
        Self {
            shard_id,
            position,
            last_sequence: None,
            consecutive_failures: 0,
            polls: 0,
            delivered: 0,
            failed: 0,
        }
    }
}

/// Resolves once `shutdown` reads true; never if the sender is gone
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Drive `fut` unless shutdown is requested first
async fn until_shutdown<F: Future>(fut: F, shutdown: &mut watch::Receiver<bool>) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = wait_for_shutdown(shutdown) => None,
        output = fut => Some(output),
    }
}

/// Returns false if shutdown was requested before `delay` elapsed
async fn pause(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    until_shutdown(tokio::time::sleep(delay), shutdown).await.is_some()
}
