use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of interaction a client reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    View,
    Interaction,
    Click,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::View => "view",
            EventType::Interaction => "interaction",
            EventType::Click => "click",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "view" => Ok(EventType::View),
            "interaction" => Ok(EventType::Interaction),
            "click" => Ok(EventType::Click),
            other => Err(anyhow::anyhow!("unknown event type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMetadata {
    pub path: String,
    pub title: String,
    pub category: String,
    /// Any JSON values; clients are not required to send strings
    pub tags: Vec<serde_json::Value>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub scroll_depth: Option<f64>,
    #[serde(default)]
    pub click_target: Option<String>,
}

/// Self-reported client environment. Never verified server side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserInfo {
    pub language: String,
    pub screen_resolution: String,
    pub viewport: String,
    pub timezone: String,
}

/// Event payload as posted by a client to the track endpoint.
///
/// Required fields are plain `String`s so that a missing or non-text value
/// fails deserialization; that is the validation gate for ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackEventRequest {
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(default)]
    pub content_id: Option<String>,
    pub timestamp: String,
    pub user_agent: String,
    pub referrer: String,
    /// Advisory only; request headers win.
    #[serde(default)]
    pub ip: Option<String>,
    pub session_id: String,
    pub metadata: EventMetadata,
    pub browser_info: BrowserInfo,
}

/// A validated event ready to be written. The raw address is already gone.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub event_type: EventType,
    pub content_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub user_agent: String,
    pub referrer: String,
    pub ip_digest: String,
    pub session_id: String,
    pub metadata: EventMetadata,
    pub browser_info: BrowserInfo,
}

impl NewEvent {
    /// Category counted in the daily rollup, if one was supplied
    pub fn rollup_category(&self) -> Option<&str> {
        let category = self.metadata.category.as_str();
        (!category.is_empty()).then_some(category)
    }

    /// The persisted form of this event
    pub fn stored(&self, id: i64, created_at: DateTime<Utc>) -> Event {
        Event {
            id,
            event_type: self.event_type,
            content_id: self.content_id.clone(),
            timestamp: self.timestamp,
            user_agent: self.user_agent.clone(),
            referrer: self.referrer.clone(),
            ip_digest: self.ip_digest.clone(),
            session_id: self.session_id.clone(),
            metadata: self.metadata.clone(),
            browser_info: self.browser_info.clone(),
            created_at,
        }
    }
}

/// Stored, immutable event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: i64,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub content_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub user_agent: String,
    pub referrer: String,
    pub ip_digest: String,
    pub session_id: String,
    pub metadata: EventMetadata,
    pub browser_info: BrowserInfo,
    pub created_at: DateTime<Utc>,
}
