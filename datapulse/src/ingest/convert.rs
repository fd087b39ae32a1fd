use log::debug;
use uuid::Uuid;

use crate::{IngestRequest, SubFrame};

/// Mints client request ids unique within one processor instance: a short
/// instance prefix plus a fresh v4 uuid per message.
#[derive(Debug)]
pub struct RequestIdMinter {
    prefix: String,
}

impl RequestIdMinter {
    pub fn new() -> Self {
        let mut prefix = Uuid::new_v4().simple().to_string();
        prefix.truncate(8);
        RequestIdMinter { prefix }
    }

    pub fn mint(&self) -> String {
        format!("{}-{}", self.prefix, Uuid::new_v4())
    }
}

impl Default for RequestIdMinter {
    fn default() -> Self {
        Self::new()
    }
}

/// Turns one decomposed frame piece into the wire request for it. The piece's
/// schedule and columns carry over unchanged; frame attributes are
/// snapshotted into the request.
pub fn sub_frame_to_request(
    provider_uid: u64,
    client_request_id: String,
    piece: SubFrame,
) -> IngestRequest {
    debug!(
        "converting piece at row offset {} ({} samples) into request {}",
        piece.row_offset,
        piece.sample_count(),
        client_request_id
    );
    let frame = piece.into_frame();
    let attributes = frame
        .attributes()
        .iter()
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    let (timestamps, columns) = frame.into_schedule_columns();
    IngestRequest {
        provider_uid,
        client_request_id,
        timestamps,
        columns,
        attributes,
    }
}
