use axum::{Json, extract::State};
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use utoipa::ToSchema;

use crate::AppState;
use crate::services::ingest::IngestTrigger;

/// Storage-created notification as delivered by the object store
/// (S3 event notification shape).
#[derive(Debug, Deserialize, ToSchema)]
pub struct StorageEventNotification {
    #[serde(rename = "Records", default)]
    pub records: Vec<StorageRecord>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct StorageRecord {
    pub s3: S3Entity,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct S3Entity {
    pub bucket: BucketRef,
    pub object: ObjectRef,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BucketRef {
    pub name: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ObjectRef {
    pub key: String,
    #[serde(default)]
    pub size: Option<u64>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EventAck {
    pub received: usize,
    pub ingested: usize,
}

/// Event keys arrive URL-encoded with '+' for spaces.
fn decode_event_key(raw: &str) -> String {
    let plus_decoded = raw.replace('+', " ");
    percent_decode_str(&plus_decoded)
        .decode_utf8_lossy()
        .into_owned()
}

#[utoipa::path(
    post,
    path = "/events/storage",
    request_body = StorageEventNotification,
    responses(
        (status = 200, description = "Event batch accepted; per-record failures are logged only", body = EventAck)
    ),
    tag = "ingest"
)]
pub async fn storage_event(
    State(state): State<AppState>,
    Json(event): Json<StorageEventNotification>,
) -> Json<EventAck> {
    let received = event.records.len();
    let mut ingested = 0;

    // There is no response channel back to the event source: every record is
    // attempted, failures are logged, and the source's bounded redelivery is
    // the only retry mechanism. Redelivered events are safe because
    // materialization is idempotent.
    for record in event.records {
        let key = decode_event_key(&record.s3.object.key);
        let bucket = record.s3.bucket.name;

        if !state
            .config
            .event_key_prefixes
            .iter()
            .any(|p| key.starts_with(p.as_str()))
        {
            debug!(bucket, key, "skipping event outside configured prefixes");
            continue;
        }

        // The record carries the object size; reject oversized objects
        // before fetching anything.
        if let Some(size) = record.s3.object.size {
            if size > state.config.max_object_size {
                warn!(
                    bucket,
                    key,
                    size,
                    max = state.config.max_object_size,
                    "skipping oversized object from storage event"
                );
                continue;
            }
        }

        match state
            .ingest
            .handle_trigger(IngestTrigger::StorageEvent { key: key.clone() })
            .await
        {
            Ok(ident) => {
                ingested += 1;
                info!(
                    bucket,
                    key,
                    file_id = %ident.file_id,
                    status = ?ident.status,
                    "storage event ingested"
                );
            }
            Err(e) => {
                error!(bucket, key, error = %e, "storage event ingestion failed");
            }
        }
    }

    Json(EventAck { received, ingested })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_event_key() {
        assert_eq!(decode_event_key("models/demo.bin"), "models/demo.bin");
        assert_eq!(decode_event_key("models/my+model.bin"), "models/my model.bin");
        assert_eq!(decode_event_key("models/v1%2Fdemo.bin"), "models/v1/demo.bin");
    }
}
