use std::sync::Arc;
use std::time::Duration;

use datapulse::query::{
    verify_column_sizes, verify_ordering, verify_source_uniqueness, verify_time_domains,
    DecompositionStrategy, QueryChannel, QueryChannelConfig, QueryRequest, StreamType,
};
use datapulse::{DataPlatformError, DataTable, TimeInterval};

use crate::{init_logging, second, MockArchive};

fn request(sources: &[&str], begin: i64, end: i64) -> QueryRequest {
    QueryRequest::new(
        sources.iter().map(|s| s.to_string()).collect(),
        TimeInterval::new(second(begin), second(end)).unwrap(),
    )
    .unwrap()
}

fn channel(config: QueryChannelConfig) -> QueryChannel<MockArchive> {
    QueryChannel::new(Arc::new(MockArchive::default()), config)
}

#[tokio::test]
async fn backward_recovery_buffers_every_fragment() {
    init_logging();
    let channel = channel(QueryChannelConfig::default());
    let recovered = channel
        .recover(&request(&["a", "b", "c"], 0, 10))
        .await
        .unwrap();
    assert_eq!(recovered, 3);

    let buffer = channel.buffer();
    assert!(buffer.is_shutdown());
    assert_eq!(buffer.len(), 3);
}

#[tokio::test]
async fn forward_recovery_is_one_fragment_per_sub_request() {
    let channel = channel(QueryChannelConfig {
        stream_type: StreamType::Forward,
        strategy: DecompositionStrategy::Horizontal(4),
        ..QueryChannelConfig::default()
    });
    let recovered = channel
        .recover(&request(
            &["a", "b", "c", "d", "e", "f", "g", "h"],
            0,
            10,
        ))
        .await
        .unwrap();
    assert_eq!(recovered, 4);
}

#[tokio::test]
async fn bidirectional_recovery_paces_with_credits() {
    let channel = channel(QueryChannelConfig {
        stream_type: StreamType::Bidirectional,
        ..QueryChannelConfig::default()
    });
    let recovered = channel
        .recover(&request(&["a", "b", "c", "d"], 0, 5))
        .await
        .unwrap();
    assert_eq!(recovered, 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn multi_stream_recovery_is_deterministic() {
    init_logging();
    let sources: Vec<String> = (0..20).map(|i| format!("pv{i:02}")).collect();
    let logical = QueryRequest::new(
        sources,
        TimeInterval::new(second(0), second(60)).unwrap(),
    )
    .unwrap();

    let config = QueryChannelConfig {
        strategy: DecompositionStrategy::Horizontal(4),
        stream_count: 4,
        correlate_while_streaming: true,
        correlation_concurrency: Some(4),
        ..QueryChannelConfig::default()
    };
    let connection = Arc::new(MockArchive {
        fragment_delay: Some(Duration::from_millis(1)),
    });

    let (first, first_stats) = QueryChannel::new(connection.clone(), config.clone())
        .recover_correlated(&logical)
        .await
        .unwrap();
    let (second_run, second_stats) = QueryChannel::new(connection, config)
        .recover_correlated(&logical)
        .await
        .unwrap();

    assert_eq!(first, second_run);
    assert_eq!(first_stats, second_stats);
    verify_ordering(&first).unwrap();
    verify_column_sizes(&first).unwrap();
    verify_source_uniqueness(&first).unwrap();
    verify_time_domains(&first).unwrap();

    // All 20 sources share one clock, so they correlate into one block.
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].column_count(), 20);
    assert_eq!(first[0].sample_count(), 61);
}

#[tokio::test]
async fn sibling_streams_finish_when_one_fails() {
    init_logging();
    let channel = channel(QueryChannelConfig {
        strategy: DecompositionStrategy::Horizontal(3),
        ..QueryChannelConfig::default()
    });
    let error = channel
        .recover(&request(&["a", "poison", "b"], 0, 10))
        .await
        .unwrap_err();
    assert!(matches!(error, DataPlatformError::Transport { .. }));

    // The healthy sub-requests delivered their fragments before the failure
    // was reported.
    assert_eq!(channel.buffer().len(), 2);
}

#[tokio::test]
async fn fail_fast_aborts_the_recovery() {
    let channel = channel(QueryChannelConfig {
        strategy: DecompositionStrategy::Horizontal(3),
        fail_fast: true,
        ..QueryChannelConfig::default()
    });
    assert!(channel
        .recover(&request(&["poison", "a", "b"], 0, 10))
        .await
        .is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_streams_trip_the_request_timeout() {
    let connection = Arc::new(MockArchive {
        fragment_delay: Some(Duration::from_millis(100)),
    });
    let channel = QueryChannel::new(
        connection,
        QueryChannelConfig {
            request_timeout: Some(Duration::from_millis(10)),
            ..QueryChannelConfig::default()
        },
    );
    let error = channel.recover(&request(&["a"], 0, 10)).await.unwrap_err();
    assert!(matches!(error, DataPlatformError::Transport { .. }));
}

#[tokio::test]
async fn short_domains_force_a_single_stream() {
    // Forward streams yield one fragment per sub-request, which makes the
    // effective decomposition observable in the fragment count.
    let config = QueryChannelConfig {
        stream_type: StreamType::Forward,
        strategy: DecompositionStrategy::Horizontal(4),
        multi_stream_domain_threshold: Some(Duration::from_secs(120)),
        ..QueryChannelConfig::default()
    };
    let narrow = channel(config.clone());
    let recovered = narrow
        .recover(&request(&["a", "b", "c", "d"], 0, 60))
        .await
        .unwrap();
    assert_eq!(recovered, 1);

    let wide = channel(QueryChannelConfig {
        multi_stream_domain_threshold: Some(Duration::from_secs(30)),
        ..config
    });
    let recovered = wide
        .recover(&request(&["a", "b", "c", "d"], 0, 60))
        .await
        .unwrap();
    assert_eq!(recovered, 4);
}
