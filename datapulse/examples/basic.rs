use std::time::Duration;

use datapulse::ingest::{IngestionFrameProcessor, ProcessorConfig};
use datapulse::{ColumnValues, DataColumn, IngestionFrame, SamplingClock, Schedule, Timestamp};

#[tokio::main]
async fn main() {
    env_logger::Builder::new()
        .parse_env(env_logger::Env::default().default_filter_or("info"))
        .init();

    let processor = IngestionFrameProcessor::new(ProcessorConfig {
        provider_uid: 1,
        concurrency: Some(2),
        max_frame_size: 16 * 1024,
        ..ProcessorConfig::default()
    });
    processor.activate().unwrap();

    // A minute of 1 kHz float data for two sources.
    let clock = SamplingClock::new(
        Timestamp::new(1_704_067_200, 0),
        60_000,
        Duration::from_millis(1),
    )
    .unwrap();
    let frame = IngestionFrame::new(
        Schedule::Clock(clock),
        vec![
            DataColumn::new(
                "beam_current",
                ColumnValues::Float64((0..60_000).map(|i| (i as f64).sin()).collect()),
            ),
            DataColumn::new(
                "vacuum_pressure",
                ColumnValues::Float64((0..60_000).map(|i| 1e-9 + i as f64 * 1e-15).collect()),
            ),
        ],
    )
    .unwrap()
    .with_label("minute-roll")
    .with_attribute("facility", "ring-1");

    processor.submit(frame).await.unwrap();
    processor.shutdown().await.unwrap();

    let mut messages = 0usize;
    let mut bytes = 0usize;
    while let Some(request) = processor.poll().unwrap() {
        messages += 1;
        bytes += request.encoded_size();
        println!(
            "request {}: {} samples, {} bytes",
            request.client_request_id,
            request.sample_count(),
            request.encoded_size()
        );
    }
    println!("{messages} requests, {bytes} bytes total");
}
