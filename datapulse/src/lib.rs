//! Datapulse is a pure Rust client SDK for a time-series Data Platform: an
//! ingestion pipeline that turns tabular sample frames into size-bounded wire
//! requests under backpressure, and a query pipeline that recovers streamed
//! sample buckets over parallel streams and correlates them into sorted
//! blocks of time-aligned columns.
//!
//! The gRPC codecs and connections are supplied by the environment through
//! the [`QueryConnection`] and [`IngestionConnection`] capabilities; this
//! crate drives them.

mod buffer;
mod column;
mod connection;
mod errors;
mod frame;
pub mod ingest;
pub mod query;
mod registrar;
mod table;
mod time;
mod types;
mod values;
mod wire;

pub use buffer::MessageBuffer;
pub use column::DataColumn;
pub use connection::{
    FragmentStream, IngestionConnection, ProviderRegistration, QueryConnection, QueryControl,
    ResponseStream,
};
pub use errors::{DataPlatformError, Result};
pub use frame::{IngestionFrame, SubFrame};
pub use registrar::{ProviderRegistrar, ProviderRegistrarBuilder};
pub use table::{column_names, row_count, row_values, table_allocation, DataTable};
pub use time::{SamplingClock, Schedule, TimeInterval, Timestamp, TimestampList};
pub use types::ColumnType;
pub use values::{ColumnValues, ImageValue, Value};
pub use wire::{
    IngestRequest, IngestResponse, IngestResult, QueryFragment, SampleBucket,
    REQUEST_ENVELOPE_MAX, TRANSPORT_MESSAGE_CAP,
};
