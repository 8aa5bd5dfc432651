//! Delivery of tracked events to the ingestion endpoint

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::models::TrackEventRequest;

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, event: &TrackEventRequest) -> Result<()>;
}

/// JSON `POST` to the track endpoint
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        Self::with_timeout(endpoint, Duration::from_secs(10))
    }

    /// Short-deadline transport, for sends that must not hold up shutdown
    pub fn beacon(endpoint: impl Into<String>) -> Result<Self> {
        Self::with_timeout(endpoint, Duration::from_secs(2))
    }

    pub fn with_timeout(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, event: &TrackEventRequest) -> Result<()> {
        self.client
            .post(&self.endpoint)
            .json(event)
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", self.endpoint))?
            .error_for_status()?;
        Ok(())
    }
}

/// Try `primary`; on failure hand the same event to `fallback`
pub struct FallbackTransport {
    primary: Arc<dyn Transport>,
    fallback: Arc<dyn Transport>,
}

impl FallbackTransport {
    pub fn new(primary: Arc<dyn Transport>, fallback: Arc<dyn Transport>) -> Self {
        Self { primary, fallback }
    }

    /// Beacon-style send with a regular request as fallback
    pub fn http(endpoint: &str) -> Result<Self> {
        Ok(Self::new(
            Arc::new(HttpTransport::beacon(endpoint)?),
            Arc::new(HttpTransport::new(endpoint)?),
        ))
    }
}

#[async_trait]
impl Transport for FallbackTransport {
    async fn send(&self, event: &TrackEventRequest) -> Result<()> {
        match self.primary.send(event).await {
            Ok(()) => Ok(()),
            Err(e) => {
                debug!("Primary transport failed, falling back: {:#}", e);
                self.fallback.send(event).await
            }
        }
    }
}
