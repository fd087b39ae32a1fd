use std::time::Duration;

use datapulse::ingest::{drive_ingest_stream, IngestionFrameProcessor, ProcessorConfig};
use datapulse::{
    ColumnValues, DataColumn, DataPlatformError, IngestionFrame, ProviderRegistrar,
    Timestamp, REQUEST_ENVELOPE_MAX,
};

use crate::{clock_schedule, init_logging, ramp_frame, second, MockIngestor};

// 2024-01-01T00:00:00Z
const JAN_2024: i64 = 1_704_067_200;

#[tokio::test]
async fn single_frame_without_decomposition() {
    init_logging();
    let processor = IngestionFrameProcessor::new(ProcessorConfig {
        provider_uid: 1,
        ..ProcessorConfig::default()
    });
    processor.activate().unwrap();

    let schedule = clock_schedule(second(JAN_2024), 10, Duration::from_secs(1));
    let frame = IngestionFrame::new(
        schedule.clone(),
        vec![DataColumn::new(
            "pv1",
            ColumnValues::Float64((0..10).map(|i| i as f64).collect()),
        )],
    )
    .unwrap();
    processor.submit(frame).await.unwrap();
    processor.shutdown().await.unwrap();

    let message = processor.take().await.unwrap();
    assert_eq!(message.provider_uid, 1);
    assert_eq!(message.timestamps, schedule);
    assert_eq!(message.columns.len(), 1);
    assert_eq!(message.columns[0].name, "pv1");
    assert_eq!(
        message.columns[0].values.as_f64().unwrap(),
        (0..10).map(|i| i as f64).collect::<Vec<_>>().as_slice()
    );
    assert!(processor.take().await.is_err());
    assert!(!processor.has_processing_failure());
}

#[tokio::test]
async fn decomposition_reassembles_in_row_order() {
    init_logging();
    let max_frame_size = 2000;
    let processor = IngestionFrameProcessor::new(ProcessorConfig {
        provider_uid: 7,
        max_frame_size,
        ..ProcessorConfig::default()
    });
    processor.activate().unwrap();

    let frame = ramp_frame("pv1", second(0), 1000);
    assert!(frame.allocation() > max_frame_size);
    processor.submit(frame).await.unwrap();
    processor.shutdown().await.unwrap();

    let mut messages = Vec::new();
    while let Some(message) = processor.poll().unwrap() {
        messages.push(message);
    }
    assert!(messages.len() >= 2);

    let mut recovered = Vec::new();
    let mut expected_start = second(0);
    for message in &messages {
        assert!(message.encoded_size() <= max_frame_size + REQUEST_ENVELOPE_MAX);
        // Per-message clocks are contiguous with the rows consumed so far.
        assert_eq!(message.timestamps.timestamp_at(0), Some(expected_start));
        let count = message.timestamps.sample_count();
        expected_start = expected_start
            .checked_add(Duration::from_secs(count as u64))
            .unwrap();
        recovered.extend_from_slice(message.columns[0].values.as_f64().unwrap());
    }
    let expected: Vec<f64> = (0..1000).map(|i| i as f64).collect();
    assert_eq!(recovered, expected);
}

#[tokio::test]
async fn exact_fit_frame_is_one_message() {
    let frame = ramp_frame("pv1", second(0), 100);
    let processor = IngestionFrameProcessor::new(ProcessorConfig {
        max_frame_size: frame.allocation(),
        ..ProcessorConfig::default()
    });
    processor.activate().unwrap();
    processor.submit(frame).await.unwrap();
    processor.shutdown().await.unwrap();

    assert_eq!(processor.request_queue_size(), 1);
}

#[tokio::test]
async fn single_row_frame_survives_decomposition() {
    let processor = IngestionFrameProcessor::new(ProcessorConfig {
        max_frame_size: 1,
        ..ProcessorConfig::default()
    });
    processor.activate().unwrap();
    processor.submit(ramp_frame("pv1", second(0), 1)).await.unwrap();
    processor.shutdown().await.unwrap();

    let message = processor.take().await.unwrap();
    assert_eq!(message.timestamps.sample_count(), 1);
}

#[tokio::test]
async fn empty_batch_terminates_with_zero_messages() {
    let processor = IngestionFrameProcessor::new(ProcessorConfig::default());
    processor.activate().unwrap();
    processor.submit_all(vec![]).await.unwrap();
    processor.shutdown().await.unwrap();

    assert_eq!(processor.request_queue_size(), 0);
    assert!(!processor.is_supplying());
    assert!(matches!(
        processor.take().await,
        Err(DataPlatformError::State(_))
    ));
}

#[tokio::test]
async fn request_ids_are_unique_across_messages() {
    let processor = IngestionFrameProcessor::new(ProcessorConfig {
        max_frame_size: 1000,
        ..ProcessorConfig::default()
    });
    processor.activate().unwrap();
    processor.submit(ramp_frame("pv1", second(0), 500)).await.unwrap();
    processor.shutdown().await.unwrap();

    let mut ids = Vec::new();
    while let Some(message) = processor.poll().unwrap() {
        ids.push(message.client_request_id);
    }
    assert!(ids.len() >= 2);
    let unique: std::collections::HashSet<&String> = ids.iter().collect();
    assert_eq!(unique.len(), ids.len());
}

#[tokio::test]
async fn registration_and_streaming_end_to_end() {
    init_logging();
    let connection = MockIngestor::default();

    let registration = ProviderRegistrar::builder("beamline-7")
        .attribute("facility", "ring-1")
        .build()
        .unwrap()
        .register(&connection)
        .await
        .unwrap();
    assert!(registration.is_new);

    let again = ProviderRegistrar::builder("beamline-7")
        .build()
        .unwrap()
        .register(&connection)
        .await
        .unwrap();
    assert!(!again.is_new);

    let processor = IngestionFrameProcessor::new(ProcessorConfig {
        provider_uid: registration.uid,
        ..ProcessorConfig::default()
    });
    processor.activate().unwrap();
    processor
        .submit_all(vec![
            ramp_frame("pv1", second(0), 10),
            ramp_frame("pv2", second(10), 10),
        ])
        .await
        .unwrap();
    processor.shutdown().await.unwrap();

    let sent = drive_ingest_stream(&connection, &processor).await.unwrap();
    assert_eq!(sent, 2);

    let recorded = connection.ingested_requests();
    assert_eq!(recorded.len(), 2);
    assert!(recorded.iter().all(|r| r.provider_uid == registration.uid));
    assert_eq!(recorded[0].columns[0].name, "pv1");
    assert_eq!(recorded[1].columns[0].name, "pv2");
}

#[tokio::test]
async fn rejected_request_surfaces_as_transport_error() {
    let connection = MockIngestor {
        reject_column: Some("pv1".to_string()),
        ..MockIngestor::default()
    };

    let processor = IngestionFrameProcessor::new(ProcessorConfig::default());
    processor.activate().unwrap();
    processor.submit(ramp_frame("pv1", second(0), 4)).await.unwrap();
    processor.shutdown().await.unwrap();

    let error = drive_ingest_stream(&connection, &processor)
        .await
        .unwrap_err();
    assert!(matches!(error, DataPlatformError::Transport { .. }));
    assert!(error.to_string().contains("pv1"));
}

#[tokio::test]
async fn frame_timestamp_and_label_do_not_reach_the_wire() {
    let processor = IngestionFrameProcessor::new(ProcessorConfig::default());
    processor.activate().unwrap();

    let frame = ramp_frame("pv1", second(0), 4)
        .with_label("calibration")
        .with_timestamp(Timestamp::new(123, 0))
        .with_attribute("shift", "night");
    processor.submit(frame).await.unwrap();
    processor.shutdown().await.unwrap();

    let message = processor.take().await.unwrap();
    assert_eq!(
        message.attributes,
        vec![("shift".to_string(), "night".to_string())]
    );
}
