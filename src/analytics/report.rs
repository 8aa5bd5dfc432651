//! Analytics report generation
//!
//! Totals come from the daily rollups and are exact for the window. Session,
//! visitor, top-content and browser figures come from a capped sample of the
//! newest raw events and are approximations: a visitor whose address
//! changes counts twice, and two visitors sharing a digest count once.

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

use crate::analytics::browser::BrowserFamily;
use crate::models::{DailyAggregate, Event, EventType};
use crate::storage::{Storage, StorageError};

/// Lookback used when the caller does not pass one
pub const DEFAULT_WINDOW_DAYS: i64 = 30;
/// Raw events sampled for the approximate figures
pub const EVENT_SAMPLE_LIMIT: i64 = 100;
pub const DAILY_STATS_LIMIT: usize = 30;
pub const RECENT_EVENTS_LIMIT: usize = 20;
pub const TOP_CONTENT_LIMIT: usize = 10;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("user not found")]
    UserNotFound,
    #[error("invalid lookback window: {0} days")]
    InvalidWindow(i64),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsReport {
    pub period: ReportPeriod,
    pub summary: ReportSummary,
    pub event_types: BTreeMap<String, i64>,
    pub categories: BTreeMap<String, i64>,
    pub daily_stats: Vec<DailyAggregate>,
    pub top_content: Vec<TopContent>,
    pub browsers: BTreeMap<String, i64>,
    pub recent_events: Vec<Event>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportPeriod {
    pub days: i64,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub total_events: i64,
    pub unique_sessions: usize,
    pub unique_visitors: usize,
    pub avg_events_per_session: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopContent {
    pub content_id: String,
    pub title: String,
    pub views: i64,
}

/// Window-wide sums over a set of daily rollups
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollupTotals {
    pub total_events: i64,
    pub event_types: BTreeMap<String, i64>,
    pub categories: BTreeMap<String, i64>,
}

pub struct ReportService {
    storage: Arc<dyn Storage>,
}

impl ReportService {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Build the report for `uid` over the last `days` days
    pub async fn generate(&self, uid: &str, days: i64) -> Result<AnalyticsReport, ReportError> {
        self.generate_at(uid, days, Utc::now()).await
    }

    pub async fn generate_at(
        &self,
        uid: &str,
        days: i64,
        now: DateTime<Utc>,
    ) -> Result<AnalyticsReport, ReportError> {
        if !self.storage.user_exists(uid).await? {
            return Err(ReportError::UserNotFound);
        }

        let window_start = window_start(now, days)?;

        let mut daily = self
            .storage
            .daily_aggregates_since(window_start.date_naive())
            .await?;
        let totals = merge_rollups(&daily);

        let mut sample = self
            .storage
            .recent_events_since(window_start, EVENT_SAMPLE_LIMIT)
            .await?;

        let unique_sessions = count_distinct(&sample, |e| e.session_id.as_str());
        let unique_visitors = count_distinct(&sample, |e| e.ip_digest.as_str());

        let summary = ReportSummary {
            total_events: totals.total_events,
            unique_sessions,
            unique_visitors,
            avg_events_per_session: average_per_session(totals.total_events, unique_sessions),
        };

        let top_content = top_content(&sample, TOP_CONTENT_LIMIT);
        let browsers = browser_histogram(&sample);

        daily.truncate(DAILY_STATS_LIMIT);
        sample.truncate(RECENT_EVENTS_LIMIT);

        Ok(AnalyticsReport {
            period: ReportPeriod {
                days,
                start_date: window_start,
                end_date: now,
            },
            summary,
            event_types: totals.event_types,
            categories: totals.categories,
            daily_stats: daily,
            top_content,
            browsers,
            recent_events: sample,
            generated_at: Utc::now(),
        })
    }
}

/// `now - days`, rejecting non-positive or out-of-range windows
pub fn window_start(now: DateTime<Utc>, days: i64) -> Result<DateTime<Utc>, ReportError> {
    if days < 1 {
        return Err(ReportError::InvalidWindow(days));
    }

    TimeDelta::try_days(days)
        .and_then(|delta| now.checked_sub_signed(delta))
        .ok_or(ReportError::InvalidWindow(days))
}

/// Sum rollups key by key. Order of `days` does not matter.
pub fn merge_rollups(days: &[DailyAggregate]) -> RollupTotals {
    days.iter().fold(RollupTotals::default(), |mut acc, day| {
        acc.total_events += day.total_events;
        for (event_type, count) in &day.event_types {
            *acc.event_types.entry(event_type.clone()).or_insert(0) += count;
        }
        for (category, count) in &day.categories {
            *acc.categories.entry(category.clone()).or_insert(0) += count;
        }
        acc
    })
}

fn count_distinct<'a, F>(events: &'a [Event], key: F) -> usize
where
    F: Fn(&'a Event) -> &'a str,
{
    events.iter().map(key).collect::<HashSet<_>>().len()
}

/// Total events per session, rounded to two decimals; zero without sessions
pub fn average_per_session(total_events: i64, sessions: usize) -> f64 {
    if sessions == 0 {
        return 0.0;
    }
    let average = total_events as f64 / sessions as f64;
    (average * 100.0).round() / 100.0
}

/// Most viewed `(contentId, title)` pairs among `view` events.
///
/// The sort is stable, so equal counts keep the order in which each pair
/// first appeared in `events`.
pub fn top_content(events: &[Event], limit: usize) -> Vec<TopContent> {
    let mut ranked: Vec<TopContent> = Vec::new();
    let mut index: HashMap<(&str, &str), usize> = HashMap::new();

    for event in events {
        if event.event_type != EventType::View {
            continue;
        }
        let Some(content_id) = event.content_id.as_deref() else {
            continue;
        };
        let title = event.metadata.title.as_str();

        match index.get(&(content_id, title)) {
            Some(&i) => ranked[i].views += 1,
            None => {
                index.insert((content_id, title), ranked.len());
                ranked.push(TopContent {
                    content_id: content_id.to_string(),
                    title: title.to_string(),
                    views: 1,
                });
            }
        }
    }

    ranked.sort_by(|a, b| b.views.cmp(&a.views));
    ranked.truncate(limit);
    ranked
}

/// Events per browser family
pub fn browser_histogram(events: &[Event]) -> BTreeMap<String, i64> {
    let mut histogram = BTreeMap::new();
    for event in events {
        let family = BrowserFamily::classify(&event.user_agent);
        *histogram.entry(family.as_str().to_string()).or_insert(0) += 1;
    }
    histogram
}
