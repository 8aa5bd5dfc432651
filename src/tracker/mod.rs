//! Client-side event tracker
//!
//! A [`Tracker`] owns one visit: it is started with the landing page, emits
//! events through a background sender task and is stopped explicitly, at
//! which point the time-on-page event is queued and the sender drained.
//! Delivery is best effort. Transport failures are logged and dropped.

pub mod page;
pub mod transport;

pub use page::PageContext;
pub use transport::{FallbackTransport, HttpTransport, Transport};

use chrono::{SecondsFormat, Utc};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::models::{BrowserInfo, EventMetadata, EventType, TrackEventRequest};

/// Sessions shorter than this do not report time on page
const MIN_REPORTED_SESSION_SECS: f64 = 1.0;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrackerError {
    #[error("tracker is not started")]
    NotStarted,
    #[error("tracker is already started")]
    AlreadyStarted,
    #[error("event queue is full")]
    QueueFull,
}

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Track endpoint, e.g. `http://localhost:8080/api/analytics/track`
    pub endpoint: String,
    /// Events queued ahead of the sender task before new ones are rejected
    pub buffer_size: usize,
}

impl TrackerConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            buffer_size: 256,
        }
    }
}

/// What the client knows about itself; copied into every event
#[derive(Debug, Clone, Default)]
pub struct ClientEnvironment {
    pub user_agent: String,
    pub referrer: String,
    pub language: String,
    pub screen_resolution: String,
    pub viewport: String,
    pub timezone: String,
}

impl ClientEnvironment {
    fn browser_info(&self) -> BrowserInfo {
        BrowserInfo {
            language: self.language.clone(),
            screen_resolution: self.screen_resolution.clone(),
            viewport: self.viewport.clone(),
            timezone: self.timezone.clone(),
        }
    }
}

struct Session {
    id: String,
    started: Instant,
    page: PageContext,
    max_scroll_depth: f64,
    tx: mpsc::Sender<TrackEventRequest>,
    sender: JoinHandle<()>,
}

pub struct Tracker {
    config: TrackerConfig,
    environment: ClientEnvironment,
    transport: Arc<dyn Transport>,
    session: Option<Session>,
}

impl Tracker {
    pub fn new(
        config: TrackerConfig,
        environment: ClientEnvironment,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            config,
            environment,
            transport,
            session: None,
        }
    }

    /// Tracker posting to `config.endpoint`, short-deadline first
    pub fn http(config: TrackerConfig, environment: ClientEnvironment) -> anyhow::Result<Self> {
        let transport = Arc::new(FallbackTransport::http(&config.endpoint)?);
        Ok(Self::new(config, environment, transport))
    }

    pub fn is_started(&self) -> bool {
        self.session.is_some()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.id.as_str())
    }

    /// Open a session on `page` and record its page view
    pub fn start(&mut self, page: PageContext) -> Result<(), TrackerError> {
        if self.session.is_some() {
            return Err(TrackerError::AlreadyStarted);
        }

        let (tx, rx) = mpsc::channel(self.config.buffer_size.max(1));
        let sender = tokio::spawn(run_sender(rx, Arc::clone(&self.transport)));
        let id = new_session_id();
        debug!("Tracker session {} started on {}", id, page.path);

        self.session = Some(Session {
            id,
            started: Instant::now(),
            page,
            max_scroll_depth: 0.0,
            tx,
            sender,
        });

        self.track_page_view(None)
    }

    /// Queue the time-on-page event and wait for the sender to drain
    pub async fn stop(&mut self) -> Result<(), TrackerError> {
        let Some(session) = self.session.as_ref() else {
            return Err(TrackerError::NotStarted);
        };

        let elapsed = session.started.elapsed().as_secs_f64();
        if elapsed > MIN_REPORTED_SESSION_SECS {
            let mut metadata = self.metadata(session);
            metadata.duration = Some(elapsed.round());
            metadata.scroll_depth = Some(session.max_scroll_depth);
            if let Err(e) = self.enqueue(session, EventType::Interaction, None, metadata) {
                warn!("Dropping time on page event: {}", e);
            }
        }

        if let Some(session) = self.session.take() {
            drop(session.tx);
            if let Err(e) = session.sender.await {
                warn!("Tracker sender task failed: {}", e);
            }
            debug!("Tracker session {} stopped", session.id);
        }

        Ok(())
    }

    /// Move to `page`; a page view is recorded only if the path changed
    pub fn navigate(&mut self, page: PageContext) -> Result<(), TrackerError> {
        let session = self.session.as_mut().ok_or(TrackerError::NotStarted)?;
        let changed = session.page.path != page.path;
        session.page = page;
        if changed {
            self.track_page_view(None)
        } else {
            Ok(())
        }
    }

    /// Keep the deepest scroll position seen, as a percentage
    pub fn record_scroll_depth(&mut self, percent: f64) {
        if let Some(session) = self.session.as_mut() {
            let percent = percent.clamp(0.0, 100.0);
            if percent > session.max_scroll_depth {
                session.max_scroll_depth = percent;
            }
        }
    }

    pub fn max_scroll_depth(&self) -> Option<f64> {
        self.session.as_ref().map(|s| s.max_scroll_depth)
    }

    pub fn track_page_view(&self, content_id: Option<&str>) -> Result<(), TrackerError> {
        let session = self.session.as_ref().ok_or(TrackerError::NotStarted)?;
        let metadata = self.metadata(session);
        self.enqueue(session, EventType::View, content_id, metadata)
    }

    pub fn track_click(&self, target: &str, content_id: Option<&str>) -> Result<(), TrackerError> {
        let session = self.session.as_ref().ok_or(TrackerError::NotStarted)?;
        let mut metadata = self.metadata(session);
        metadata.click_target = Some(target.to_string());
        self.enqueue(session, EventType::Click, content_id, metadata)
    }

    /// Interaction labelled `action`; the label is appended to the page tags
    pub fn track_interaction(
        &self,
        action: &str,
        content_id: Option<&str>,
        duration: Option<f64>,
    ) -> Result<(), TrackerError> {
        let session = self.session.as_ref().ok_or(TrackerError::NotStarted)?;
        let mut metadata = self.metadata(session);
        metadata.tags.push(serde_json::Value::String(action.to_string()));
        metadata.duration = duration;
        metadata.scroll_depth = Some(session.max_scroll_depth);
        self.enqueue(session, EventType::Interaction, content_id, metadata)
    }

    fn metadata(&self, session: &Session) -> EventMetadata {
        EventMetadata {
            path: session.page.path.clone(),
            title: session.page.title.clone(),
            category: session.page.category().to_string(),
            tags: session
                .page
                .tags()
                .into_iter()
                .map(serde_json::Value::String)
                .collect(),
            duration: None,
            scroll_depth: None,
            click_target: None,
        }
    }

    fn enqueue(
        &self,
        session: &Session,
        event_type: EventType,
        content_id: Option<&str>,
        metadata: EventMetadata,
    ) -> Result<(), TrackerError> {
        let event = TrackEventRequest {
            event_type,
            content_id: content_id.map(str::to_string),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            user_agent: self.environment.user_agent.clone(),
            referrer: self.environment.referrer.clone(),
            ip: None,
            session_id: session.id.clone(),
            metadata,
            browser_info: self.environment.browser_info(),
        };

        session.tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TrackerError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => TrackerError::NotStarted,
        })
    }
}

async fn run_sender(mut rx: mpsc::Receiver<TrackEventRequest>, transport: Arc<dyn Transport>) {
    while let Some(event) = rx.recv().await {
        if let Err(e) = transport.send(&event).await {
            warn!("Failed to deliver {} event: {:#}", event.event_type, e);
        }
    }
}

/// `session_<unix millis>_<9 base36 chars>`
fn new_session_id() -> String {
    use rand::RngExt;

    let mut rng = rand::rng();
    let suffix: String = (0..9)
        .filter_map(|_| char::from_digit(rng.random_range(0..36u32), 36))
        .collect();
    format!("session_{}_{}", Utc::now().timestamp_millis(), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<TrackEventRequest>>,
    }

    impl RecordingTransport {
        fn sent(&self) -> Vec<TrackEventRequest> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send(&self, event: &TrackEventRequest) -> anyhow::Result<()> {
            self.sent.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    struct FailingTransport;

    #[async_trait]
    impl Transport for FailingTransport {
        async fn send(&self, _event: &TrackEventRequest) -> anyhow::Result<()> {
            anyhow::bail!("connection refused")
        }
    }

    fn environment() -> ClientEnvironment {
        ClientEnvironment {
            user_agent: "Mozilla/5.0 Firefox/121.0".to_string(),
            referrer: "https://example.com/".to_string(),
            language: "en-US".to_string(),
            screen_resolution: "1920x1080".to_string(),
            viewport: "1280x720".to_string(),
            timezone: "UTC".to_string(),
        }
    }

    fn tracker(transport: Arc<dyn Transport>) -> Tracker {
        Tracker::new(TrackerConfig::new("http://localhost/track"), environment(), transport)
    }

    #[test]
    fn test_session_id_format() {
        let id = new_session_id();
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "session");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 9);
        assert!(parts[2]
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[tokio::test]
    async fn test_start_records_page_view() {
        let transport = Arc::new(RecordingTransport::default());
        let mut tracker = tracker(transport.clone());

        tracker
            .start(PageContext::new("/blog/create", "New post"))
            .unwrap();
        let session_id = tracker.session_id().unwrap().to_string();
        tracker.stop().await.unwrap();

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].event_type, EventType::View);
        assert_eq!(sent[0].session_id, session_id);
        assert_eq!(sent[0].metadata.category, "blog");
        assert_eq!(sent[0].metadata.tags, vec!["create"]);
        assert_eq!(sent[0].browser_info.timezone, "UTC");
        assert!(!tracker.is_started());
    }

    #[tokio::test]
    async fn test_requires_start() {
        let transport = Arc::new(RecordingTransport::default());
        let mut tracker = tracker(transport.clone());

        assert_eq!(tracker.track_page_view(None), Err(TrackerError::NotStarted));
        assert_eq!(tracker.stop().await, Err(TrackerError::NotStarted));

        tracker.start(PageContext::new("/", "Home")).unwrap();
        assert_eq!(
            tracker.start(PageContext::new("/", "Home")),
            Err(TrackerError::AlreadyStarted)
        );
        tracker.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_navigate_only_tracks_path_changes() {
        let transport = Arc::new(RecordingTransport::default());
        let mut tracker = tracker(transport.clone());

        tracker.start(PageContext::new("/dashboard", "Home")).unwrap();
        tracker
            .navigate(PageContext::new("/dashboard", "Home again"))
            .unwrap();
        tracker
            .navigate(PageContext::new("/products/manage", "Products"))
            .unwrap();
        tracker.track_click("buy-button", Some("p-1")).unwrap();
        tracker.stop().await.unwrap();

        let sent = transport.sent();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[1].metadata.category, "products");
        assert_eq!(sent[2].event_type, EventType::Click);
        assert_eq!(sent[2].metadata.click_target.as_deref(), Some("buy-button"));
        assert_eq!(sent[2].content_id.as_deref(), Some("p-1"));
    }

    #[tokio::test]
    async fn test_scroll_depth_keeps_clamped_max() {
        let mut tracker = tracker(Arc::new(RecordingTransport::default()));
        tracker.record_scroll_depth(40.0);
        assert_eq!(tracker.max_scroll_depth(), None);

        tracker.start(PageContext::new("/", "Home")).unwrap();
        tracker.record_scroll_depth(40.0);
        tracker.record_scroll_depth(25.0);
        assert_eq!(tracker.max_scroll_depth(), Some(40.0));
        tracker.record_scroll_depth(180.0);
        assert_eq!(tracker.max_scroll_depth(), Some(100.0));
        tracker.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_reports_time_on_page() {
        let transport = Arc::new(RecordingTransport::default());
        let mut tracker = tracker(transport.clone());

        tracker.start(PageContext::new("/blog/post", "Post")).unwrap();
        tracker.record_scroll_depth(75.0);
        tokio::time::advance(Duration::from_secs(5)).await;
        tracker.stop().await.unwrap();

        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        let last = &sent[1];
        assert_eq!(last.event_type, EventType::Interaction);
        assert_eq!(last.metadata.duration, Some(5.0));
        assert_eq!(last.metadata.scroll_depth, Some(75.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_session_skips_time_on_page() {
        let transport = Arc::new(RecordingTransport::default());
        let mut tracker = tracker(transport.clone());

        tracker.start(PageContext::new("/", "Home")).unwrap();
        tokio::time::advance(Duration::from_millis(500)).await;
        tracker.stop().await.unwrap();

        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_transport_failures_are_swallowed() {
        let mut tracker = tracker(Arc::new(FailingTransport));
        tracker.start(PageContext::new("/", "Home")).unwrap();
        tracker.track_interaction("share", Some("c-1"), Some(3.0)).unwrap();
        assert!(tracker.stop().await.is_ok());
    }

    #[tokio::test]
    async fn test_interaction_carries_action_tag() {
        let transport = Arc::new(RecordingTransport::default());
        let mut tracker = tracker(transport.clone());

        tracker
            .start(PageContext::new("/blog/create", "New post").with_keywords("rust"))
            .unwrap();
        tracker.record_scroll_depth(30.0);
        tracker
            .track_interaction("bookmark", Some("post-7"), Some(4.0))
            .unwrap();
        tracker.stop().await.unwrap();

        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        let interaction = &sent[1];
        assert_eq!(interaction.event_type, EventType::Interaction);
        assert_eq!(interaction.content_id.as_deref(), Some("post-7"));
        assert_eq!(interaction.metadata.tags, vec!["create", "rust", "bookmark"]);
        assert_eq!(interaction.metadata.duration, Some(4.0));
        assert_eq!(interaction.metadata.scroll_depth, Some(30.0));
    }

    #[tokio::test]
    async fn test_fallback_transport() {
        let recorder = Arc::new(RecordingTransport::default());
        let transport = FallbackTransport::new(Arc::new(FailingTransport), recorder.clone());
        let mut tracker = tracker(Arc::new(transport));

        tracker.start(PageContext::new("/files", "Files")).unwrap();
        tracker.stop().await.unwrap();

        let sent = recorder.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].metadata.category, "files");
    }
}
