#[cfg(test)]
mod tests {
    use crate::client::KinesisClientError;
    use crate::monitoring::{IteratorEventType, TailerEventType};
    use crate::retry::{ExponentialBackoff, PollRetryPolicy};
    use crate::tailer::{ShardTailer, StartPosition, TailerConfig, TerminationReason};
    use crate::test::mocks::{MockKinesisClient, MockRecordHandler};
    use crate::test::{init_logging, TestUtils};
    use crate::tests::common;
    use crate::TailerError;
    use anyhow::Result;
    use aws_sdk_kinesis::types::ShardIteratorType;
    use std::time::Duration;
    use tokio::sync::watch;

    fn fail_fast_policy() -> PollRetryPolicy {
        PollRetryPolicy {
            error_delay: Duration::from_millis(10),
            throttle_backoff: Some(
                ExponentialBackoff::builder()
                    .initial_delay(Duration::from_millis(5))
                    .max_delay(Duration::from_millis(20))
                    .jitter_factor(0.0)
                    .build(),
            ),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_permanent_error_fails_fast() {
        init_logging();
        let client = MockKinesisClient::new();
        let handler = MockRecordHandler::new();
        client.mock_error(KinesisClientError::AccessDenied).await;

        let mut config = common::create_test_config();
        config.retry_policy = fail_fast_policy();

        let err = common::run_to_completion(config, &client, &handler)
            .await
            .unwrap_err();

        match err {
            TailerError::PollFailed {
                shard_id,
                attempts,
                source,
            } => {
                assert_eq!(shard_id, "shard-1");
                assert_eq!(attempts, 1);
                assert_eq!(source, KinesisClientError::AccessDenied);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(client.get_records_call_count().await, 1);
    }

    #[tokio::test]
    async fn test_uniform_policy_retries_permanent_errors() -> Result<()> {
        let client = MockKinesisClient::new();
        let handler = MockRecordHandler::new();
        client.mock_error(KinesisClientError::AccessDenied).await;
        client
            .mock_records(TestUtils::create_test_records(1), None)
            .await;

        let summary = common::run_to_completion(common::create_test_config(), &client, &handler).await?;

        assert_eq!(summary.reason, TerminationReason::ShardClosed);
        assert_eq!(summary.records_delivered, 1);
        assert_eq!(summary.polls, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_gives_up_after_max_consecutive_failures() {
        let client = MockKinesisClient::new();
        let handler = MockRecordHandler::new();
        for _ in 0..5 {
            client
                .mock_error(KinesisClientError::ConnectionError("reset".to_string()))
                .await;
        }

        let mut config = common::create_test_config();
        config.retry_policy.max_consecutive_failures = Some(3);

        let err = common::run_to_completion(config, &client, &handler)
            .await
            .unwrap_err();

        assert!(matches!(err, TailerError::PollFailed { attempts: 3, .. }));
        assert!(!err.is_setup_failure());
        assert_eq!(client.get_records_call_count().await, 3);
    }

    #[tokio::test]
    async fn test_success_resets_consecutive_failures() -> Result<()> {
        let client = MockKinesisClient::new();
        let handler = MockRecordHandler::new();
        let error = || KinesisClientError::Other("flaky".to_string());

        client.mock_error(error()).await;
        client
            .mock_records(TestUtils::create_test_records(1), Some("iterator-2"))
            .await;
        client.mock_error(error()).await;
        client.mock_records(vec![], None).await;

        let mut config = common::create_test_config();
        config.retry_policy.max_consecutive_failures = Some(2);

        let summary = common::run_to_completion(config, &client, &handler).await?;
        assert_eq!(summary.reason, TerminationReason::ShardClosed);
        assert_eq!(summary.polls, 4);
        Ok(())
    }

    #[tokio::test]
    async fn test_throttling_backs_off_exponentially() -> Result<()> {
        let client = MockKinesisClient::new();
        let handler = MockRecordHandler::new();
        for _ in 0..4 {
            client.mock_error(KinesisClientError::ThroughputExceeded).await;
        }

        let mut config = common::create_test_config();
        config.retry_policy = fail_fast_policy();
        config.monitoring.enabled = true;

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let (tailer, monitoring_rx) = ShardTailer::new(config, handler, client.clone());
        let mut monitoring_rx = monitoring_rx.expect("monitoring enabled");

        let summary = tailer.run(shutdown_rx).await?;
        assert_eq!(summary.reason, TerminationReason::ShardClosed);

        let delays: Vec<Option<Duration>> = common::drain_events(&mut monitoring_rx)
            .into_iter()
            .filter_map(|event| match event.event_type {
                TailerEventType::PollFailed { retry_delay, .. } => Some(retry_delay),
                _ => None,
            })
            .collect();

        assert_eq!(
            delays,
            vec![
                Some(Duration::from_millis(5)),
                Some(Duration::from_millis(10)),
                Some(Duration::from_millis(20)),
                Some(Duration::from_millis(20)),
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_expired_iterator_resumes_after_last_delivered_record() -> Result<()> {
        init_logging();
        let client = MockKinesisClient::new();
        let handler = MockRecordHandler::new();

        client.mock_get_iterator(Ok("initial".to_string())).await;
        client.mock_get_iterator(Ok("refreshed".to_string())).await;
        client
            .mock_records(TestUtils::create_test_records(2), Some("iterator-2"))
            .await;
        client.mock_error(KinesisClientError::ExpiredIterator).await;
        client
            .mock_records(TestUtils::create_records_from(2, 1), None)
            .await;

        let mut config = common::create_test_config();
        config.retry_policy = fail_fast_policy();
        config.monitoring.enabled = true;

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let (tailer, monitoring_rx) = ShardTailer::new(config, handler.clone(), client.clone());
        let mut monitoring_rx = monitoring_rx.expect("monitoring enabled");

        let summary = tailer.run(shutdown_rx).await?;
        assert_eq!(summary.records_delivered, 3);

        let requests = client.get_iterator_requests().await;
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].iterator_type, ShardIteratorType::AfterSequenceNumber);
        assert_eq!(requests[1].sequence_number.as_deref(), Some("sequence-1"));
        assert_eq!(
            client.get_polled_iterators().await,
            vec![
                "initial".to_string(),
                "iterator-2".to_string(),
                "refreshed".to_string()
            ]
        );

        let refreshed = common::drain_events(&mut monitoring_rx)
            .into_iter()
            .filter(|event| {
                matches!(
                    event.event_type,
                    TailerEventType::Iterator {
                        event_type: IteratorEventType::Refreshed,
                        ..
                    }
                )
            })
            .count();
        assert_eq!(refreshed, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_expired_iterator_before_any_delivery_reopens_start_position() -> Result<()> {
        let client = MockKinesisClient::new();
        let handler = MockRecordHandler::new();
        client.mock_error(KinesisClientError::ExpiredIterator).await;

        let mut config = common::create_test_config();
        config.start_position = StartPosition::AtSequenceNumber("sequence-7".to_string());

        common::run_to_completion(config, &client, &handler).await?;

        let requests = client.get_iterator_requests().await;
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].iterator_type, ShardIteratorType::AtSequenceNumber);
        assert_eq!(requests[1].sequence_number.as_deref(), Some("sequence-7"));
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_refresh_is_retried() -> Result<()> {
        let client = MockKinesisClient::new();
        let handler = MockRecordHandler::new();
        client.mock_get_iterator(Ok("initial".to_string())).await;
        client
            .mock_get_iterator(Err(KinesisClientError::Timeout("slow".to_string())))
            .await;
        client.mock_error(KinesisClientError::ExpiredIterator).await;
        client.mock_error(KinesisClientError::ExpiredIterator).await;

        let summary = common::run_to_completion(common::create_test_config(), &client, &handler).await?;

        assert_eq!(summary.reason, TerminationReason::ShardClosed);
        // initial, failed refresh, successful refresh
        assert_eq!(client.get_iterator_request_count().await, 3);
        assert_eq!(
            client.get_polled_iterators().await,
            vec![
                "initial".to_string(),
                "initial".to_string(),
                "mock-iterator".to_string()
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_default_config_retries_permanent_errors() -> Result<()> {
        let client = MockKinesisClient::new();
        let handler = MockRecordHandler::new();
        client
            .mock_error(KinesisClientError::ResourceNotFound("gone".to_string()))
            .await;
        client
            .mock_records(TestUtils::create_test_records(1), None)
            .await;

        let config = TailerConfig {
            stream_name: common::TEST_STREAM.to_string(),
            poll_interval: Duration::from_millis(10),
            ..Default::default()
        };
        let summary = common::run_to_completion(config, &client, &handler).await?;

        assert_eq!(summary.reason, TerminationReason::ShardClosed);
        assert_eq!(summary.polls, 2);
        assert_eq!(summary.records_delivered, 1);
        Ok(())
    }
}
