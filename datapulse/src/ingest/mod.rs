//! The ingestion pipeline: frame decomposition, request conversion, and the
//! concurrent frame processor feeding an ingestion stream.

mod convert;
mod decompose;
mod processor;
mod stream;

pub use convert::{sub_frame_to_request, RequestIdMinter};
pub use decompose::decompose_frame;
pub use processor::{IngestionFrameProcessor, ProcessorConfig};
pub use stream::{drive_ingest_bidi, drive_ingest_stream};
