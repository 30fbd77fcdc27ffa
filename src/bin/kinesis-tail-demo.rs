use anyhow::{Context, Result};
use aws_config::BehaviorVersion;
use clap::Parser;
use kinesis_tail::monitoring::{MetricsAggregator, MonitoringConfig};
use kinesis_tail::{
    DecodingHandler, Encoding, LoggingEnvelopeHandler, PollRetryPolicy, Producer, ShardTailer,
    StartPosition, TailerConfig, TailerState, UserIdRequest,
};
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Put user-id envelopes on a stream and tail them back from one shard
#[derive(Parser, Debug)]
#[command(name = "kinesis-tail-demo")]
struct Cli {
    #[arg(long, env = "STREAM_NAME", default_value = "TestingDataStream")]
    stream_name: String,

    /// trim-horizon or latest
    #[arg(long, env = "START_POSITION", default_value = "trim-horizon")]
    start_position: StartPosition,

    #[arg(long, env = "POLL_INTERVAL_MS", default_value_t = 1000)]
    poll_interval_ms: u64,

    /// json or protobuf
    #[arg(long, env = "ENCODING", default_value = "json")]
    encoding: Encoding,

    #[arg(long, default_value = "1")]
    partition_key: String,

    /// Number of envelopes to put after the tailer starts
    #[arg(long, default_value_t = 1)]
    records: usize,

    /// Shard to tail instead of the first one
    #[arg(long)]
    shard_id: Option<String>,

    /// Override the service endpoint, e.g. a local emulator
    #[arg(long, env = "AWS_ENDPOINT_URL")]
    endpoint_url: Option<String>,

    /// Back off on throttling and stop on permanent poll errors instead of
    /// retrying every error once a second
    #[arg(long)]
    fail_fast: bool,

    /// Log aggregated tailer metrics every N seconds
    #[arg(long)]
    metrics_interval_secs: Option<u64>,
}

/// Turn `signal` resolving to true into a shutdown request
fn forward_shutdown<F>(signal: F, shutdown_tx: watch::Sender<bool>) -> JoinHandle<()>
where
    F: Future<Output = bool> + Send + 'static,
{
    tokio::spawn(async move {
        if signal.await {
            info!("Shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(url) = &cli.endpoint_url {
        loader = loader.endpoint_url(url);
    }
    let sdk_config = loader.load().await;
    let client = aws_sdk_kinesis::Client::new(&sdk_config);

    let config = TailerConfig {
        stream_name: cli.stream_name.clone(),
        shard_id: cli.shard_id.clone(),
        start_position: cli.start_position.clone(),
        poll_interval: Duration::from_millis(cli.poll_interval_ms),
        retry_policy: if cli.fail_fast {
            PollRetryPolicy::default()
        } else {
            PollRetryPolicy::uniform(Duration::from_secs(1))
        },
        monitoring: MonitoringConfig {
            enabled: cli.metrics_interval_secs.is_some(),
            metrics_interval: Duration::from_secs(cli.metrics_interval_secs.unwrap_or(60)),
            ..Default::default()
        },
        ..Default::default()
    };

    let codec = cli.encoding.codec();
    let handler = DecodingHandler::new(codec.clone(), LoggingEnvelopeHandler);
    let (tailer, monitoring_rx) = ShardTailer::new(config.clone(), handler, client.clone());

    if let Some(rx) = monitoring_rx {
        let aggregator = MetricsAggregator::new(config.monitoring.metrics_interval, rx);
        tokio::spawn(aggregator.run());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    forward_shutdown(
        async { tokio::signal::ctrl_c().await.is_ok() },
        shutdown_tx,
    );

    let mut state = tailer.state();
    let tailer_handle = tokio::spawn(async move { tailer.run(shutdown_rx).await });

    // Put only once the iterator is open so a Latest start still sees the records
    let opened = state
        .wait_for(|s| *s != TailerState::Initializing)
        .await
        .map(|s| *s);
    if matches!(opened, Ok(TailerState::Polling)) {
        let producer = Producer::new(client, cli.stream_name.as_str());
        for _ in 0..cli.records {
            let envelope = UserIdRequest::random();
            match producer
                .put_envelope(&envelope, codec.as_ref(), &cli.partition_key)
                .await
            {
                Ok(ack) => info!(
                    correlation_id = %envelope.correlation_id,
                    shard_id = %ack.shard_id,
                    sequence = %ack.sequence_number,
                    "Put envelope"
                ),
                Err(e) => error!(error = %e, "Put failed"),
            }
        }
    }

    let summary = tailer_handle
        .await
        .context("tailer task panicked")?
        .context("tailer failed")?;

    info!(
        reason = ?summary.reason,
        polls = summary.polls,
        delivered = summary.records_delivered,
        failed = summary.records_failed,
        "Done"
    );
    Ok(())
}
