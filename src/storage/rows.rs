//! Row shapes shared by the SQL backends and their conversion into models

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::FromRow;
use std::collections::{BTreeMap, HashMap};

use crate::models::{BrowserInfo, DailyAggregate, Event, EventMetadata, UserAccount};

/// Column list matching [`EventRow`], in select order
pub const EVENT_COLUMNS: &str = "id, event_type, content_id, occurred_at, user_agent, referrer, \
    ip_digest, session_id, path, title, category, tags, duration, scroll_depth, click_target, \
    language, screen_resolution, viewport, timezone, created_at";

#[derive(Debug, FromRow)]
pub struct EventRow {
    pub id: i64,
    pub event_type: String,
    pub content_id: Option<String>,
    /// Unix milliseconds
    pub occurred_at: i64,
    pub user_agent: String,
    pub referrer: String,
    pub ip_digest: String,
    pub session_id: String,
    pub path: String,
    pub title: String,
    pub category: String,
    /// JSON array
    pub tags: String,
    pub duration: Option<f64>,
    pub scroll_depth: Option<f64>,
    pub click_target: Option<String>,
    pub language: String,
    pub screen_resolution: String,
    pub viewport: String,
    pub timezone: String,
    /// Unix milliseconds
    pub created_at: i64,
}

impl TryFrom<EventRow> for Event {
    type Error = anyhow::Error;

    fn try_from(row: EventRow) -> Result<Self> {
        let tags: Vec<serde_json::Value> = serde_json::from_str(&row.tags)
            .with_context(|| format!("corrupt tags on event {}", row.id))?;

        Ok(Event {
            id: row.id,
            event_type: row.event_type.parse()?,
            content_id: row.content_id,
            timestamp: from_millis(row.occurred_at)?,
            user_agent: row.user_agent,
            referrer: row.referrer,
            ip_digest: row.ip_digest,
            session_id: row.session_id,
            metadata: EventMetadata {
                path: row.path,
                title: row.title,
                category: row.category,
                tags,
                duration: row.duration,
                scroll_depth: row.scroll_depth,
                click_target: row.click_target,
            },
            browser_info: BrowserInfo {
                language: row.language,
                screen_resolution: row.screen_resolution,
                viewport: row.viewport,
                timezone: row.timezone,
            },
            created_at: from_millis(row.created_at)?,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct DailyStatsRow {
    pub day: String,
    pub total_events: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// One `(day, key) -> hits` cell of a rollup map
#[derive(Debug, FromRow)]
pub struct DailyCountRow {
    pub day: String,
    pub name: String,
    pub hits: i64,
}

#[derive(Debug, FromRow)]
pub struct UserRow {
    pub uid: String,
    pub email: Option<String>,
    pub created_at: i64,
}

impl TryFrom<UserRow> for UserAccount {
    type Error = anyhow::Error;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(UserAccount {
            uid: row.uid,
            email: row.email,
            created_at: from_millis(row.created_at)?,
        })
    }
}

/// Stitch the per-day totals and their count maps back into aggregates.
/// Output order follows `stats`.
pub fn assemble_daily(
    stats: Vec<DailyStatsRow>,
    event_types: Vec<DailyCountRow>,
    categories: Vec<DailyCountRow>,
) -> Result<Vec<DailyAggregate>> {
    let mut types_by_day = group_counts(event_types);
    let mut categories_by_day = group_counts(categories);

    stats
        .into_iter()
        .map(|row| {
            let date = NaiveDate::parse_from_str(&row.day, "%Y-%m-%d")
                .with_context(|| format!("corrupt rollup day '{}'", row.day))?;
            Ok(DailyAggregate {
                date,
                total_events: row.total_events,
                event_types: types_by_day.remove(&row.day).unwrap_or_default(),
                categories: categories_by_day.remove(&row.day).unwrap_or_default(),
                created_at: from_millis(row.created_at)?,
                updated_at: from_millis(row.updated_at)?,
            })
        })
        .collect()
}

fn group_counts(rows: Vec<DailyCountRow>) -> HashMap<String, BTreeMap<String, i64>> {
    let mut grouped: HashMap<String, BTreeMap<String, i64>> = HashMap::new();
    for row in rows {
        grouped.entry(row.day).or_default().insert(row.name, row.hits);
    }
    grouped
}

pub fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| anyhow!("timestamp out of range: {ms}"))
}

pub fn tags_json(tags: &[serde_json::Value]) -> Result<String> {
    Ok(serde_json::to_string(tags)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assemble_daily_groups_counts_by_date() {
        let stats = vec![
            DailyStatsRow {
                day: "2024-03-02".into(),
                total_events: 2,
                created_at: 1_709_337_600_000,
                updated_at: 1_709_337_600_500,
            },
            DailyStatsRow {
                day: "2024-03-01".into(),
                total_events: 1,
                created_at: 1_709_251_200_000,
                updated_at: 1_709_251_200_000,
            },
        ];
        let types = vec![
            DailyCountRow { day: "2024-03-01".into(), name: "view".into(), hits: 1 },
            DailyCountRow { day: "2024-03-02".into(), name: "click".into(), hits: 1 },
            DailyCountRow { day: "2024-03-02".into(), name: "view".into(), hits: 1 },
        ];
        let categories = vec![DailyCountRow {
            day: "2024-03-02".into(),
            name: "blog".into(),
            hits: 2,
        }];

        let days = assemble_daily(stats, types, categories).unwrap();
        assert_eq!(days.len(), 2);
        assert_eq!(days[0].date.to_string(), "2024-03-02");
        assert_eq!(days[0].event_types.values().sum::<i64>(), 2);
        assert_eq!(days[0].categories.get("blog"), Some(&2));
        assert!(days[1].categories.is_empty());
    }

    #[test]
    fn test_corrupt_date_is_an_error() {
        let stats = vec![DailyStatsRow {
            day: "yesterday".into(),
            total_events: 1,
            created_at: 0,
            updated_at: 0,
        }];
        assert!(assemble_daily(stats, vec![], vec![]).is_err());
    }
}
