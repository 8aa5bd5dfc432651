//! Event ingestion and daily rollup writes
//!
//! An event goes through three steps, and nothing is written unless the
//! first one succeeds:
//! 1. decode and validate the client payload
//! 2. replace the caller's address with its keyed digest
//! 3. store the event and bump its day's counters in one transaction

use chrono::{DateTime, SubsecRound, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::analytics::digest::IpHasher;
use crate::models::{Event, NewEvent, TrackEventRequest};
use crate::storage::{Storage, StorageError};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("request body is required")]
    EmptyBody,
    #[error("invalid event: {0}")]
    Invalid(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub struct IngestService {
    storage: Arc<dyn Storage>,
    hasher: Arc<IpHasher>,
}

impl IngestService {
    pub fn new(storage: Arc<dyn Storage>, hasher: Arc<IpHasher>) -> Self {
        Self { storage, hasher }
    }

    /// Decode a raw request body into a track request
    pub fn parse(body: &[u8]) -> Result<TrackEventRequest, IngestError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(IngestError::EmptyBody);
        }

        serde_json::from_slice(body).map_err(|e| IngestError::Invalid(e.to_string()))
    }

    /// Validate a request and digest the resolved client address.
    /// Consumes the request so the raw `ip` field cannot leak further.
    pub fn prepare(
        &self,
        request: TrackEventRequest,
        client_address: &str,
    ) -> Result<NewEvent, IngestError> {
        let timestamp = parse_timestamp(&request.timestamp)?;

        Ok(NewEvent {
            event_type: request.event_type,
            content_id: request.content_id.filter(|id| !id.is_empty()),
            timestamp,
            user_agent: request.user_agent,
            referrer: request.referrer,
            ip_digest: self.hasher.digest(client_address),
            session_id: request.session_id,
            metadata: request.metadata,
            browser_info: request.browser_info,
        })
    }

    /// Validate, digest and store one event
    pub async fn ingest(
        &self,
        request: TrackEventRequest,
        client_address: &str,
    ) -> Result<Event, IngestError> {
        let event = self.prepare(request, client_address)?;
        let stored = self.storage.record_event(&event).await?;

        debug!(
            event_id = stored.id,
            event_type = %stored.event_type,
            day = %stored.timestamp.date_naive(),
            "Recorded analytics event"
        );

        Ok(stored)
    }
}

/// Client timestamps are RFC 3339; stored at millisecond precision
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, IngestError> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|ts| ts.with_timezone(&Utc).trunc_subsecs(3))
        .map_err(|e| IngestError::Invalid(format!("timestamp '{raw}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_parse_rejects_empty_body() {
        assert!(matches!(IngestService::parse(b""), Err(IngestError::EmptyBody)));
        assert!(matches!(IngestService::parse(b"  \n"), Err(IngestError::EmptyBody)));
    }

    #[test]
    fn test_parse_rejects_malformed_json() {
        assert!(matches!(
            IngestService::parse(b"{\"type\":"),
            Err(IngestError::Invalid(_))
        ));
        assert!(matches!(
            IngestService::parse(b"[]"),
            Err(IngestError::Invalid(_))
        ));
    }

    #[test]
    fn test_parse_timestamp_normalizes_to_utc_millis() {
        let ts = parse_timestamp("2024-03-01T23:30:00.123456+02:00").unwrap();
        assert_eq!(ts.day(), 1);
        assert_eq!(ts.hour(), 21);
        assert_eq!(ts.nanosecond(), 123_000_000);
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert!(matches!(
            parse_timestamp("yesterday"),
            Err(IngestError::Invalid(_))
        ));
    }
}
