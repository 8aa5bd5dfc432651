use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::json;
use std::sync::Arc;
use tally::models::{BrowserInfo, EventMetadata, EventType, NewEvent};
use tally::storage::{SqliteStorage, Storage, StorageError};

async fn create_test_storage() -> Arc<dyn Storage> {
    let storage = SqliteStorage::new("sqlite::memory:", 5).await.unwrap();
    storage.init().await.unwrap();
    Arc::new(storage)
}

fn new_event(
    event_type: EventType,
    timestamp: DateTime<Utc>,
    category: &str,
    session_id: &str,
) -> NewEvent {
    NewEvent {
        event_type,
        content_id: Some("post-1".to_string()),
        timestamp,
        user_agent: "Mozilla/5.0 Safari/605.1.15".to_string(),
        referrer: String::new(),
        ip_digest: "0123456789abcdef".to_string(),
        session_id: session_id.to_string(),
        metadata: EventMetadata {
            path: "/blog/post-1".to_string(),
            title: "Post 1".to_string(),
            category: category.to_string(),
            tags: vec![json!("rust"), json!(["nested", 1])],
            duration: Some(12.0),
            scroll_depth: None,
            click_target: None,
        },
        browser_info: BrowserInfo {
            language: "de-DE".to_string(),
            screen_resolution: "2560x1440".to_string(),
            viewport: "1200x800".to_string(),
            timezone: "Europe/Berlin".to_string(),
        },
    }
}

fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

#[tokio::test]
async fn test_init_is_idempotent() {
    let storage = create_test_storage().await;
    storage.init().await.unwrap();
    storage.init().await.unwrap();
}

#[tokio::test]
async fn test_record_event_round_trips() {
    let storage = create_test_storage().await;
    let event = new_event(EventType::View, at(2024, 3, 1, 10), "blog", "s1");

    let stored = storage.record_event(&event).await.unwrap();
    assert!(stored.id > 0);
    assert_eq!(stored.timestamp, event.timestamp);

    let events = storage
        .recent_events_since(at(2024, 2, 1, 0), 100)
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0], stored);
    assert_eq!(events[0].metadata.tags, vec![json!("rust"), json!(["nested", 1])]);
    assert_eq!(events[0].metadata.duration, Some(12.0));
    assert_eq!(events[0].browser_info.timezone, "Europe/Berlin");
}

#[tokio::test]
async fn test_rollups_keyed_by_event_day() {
    let storage = create_test_storage().await;

    // Late on the 1st and early on the 2nd, UTC
    storage
        .record_event(&new_event(EventType::View, at(2024, 3, 1, 23), "blog", "s1"))
        .await
        .unwrap();
    storage
        .record_event(&new_event(EventType::Click, at(2024, 3, 2, 0), "blog", "s1"))
        .await
        .unwrap();
    storage
        .record_event(&new_event(EventType::View, at(2024, 3, 2, 8), "", "s2"))
        .await
        .unwrap();

    let days = storage
        .daily_aggregates_since(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
        .await
        .unwrap();
    assert_eq!(days.len(), 2);

    // Newest day first
    assert_eq!(days[0].date, NaiveDate::from_ymd_opt(2024, 3, 2).unwrap());
    assert_eq!(days[0].total_events, 2);
    assert_eq!(days[0].event_types["click"], 1);
    assert_eq!(days[0].event_types["view"], 1);
    // An empty category is not counted
    assert_eq!(days[0].categories.len(), 1);
    assert_eq!(days[0].categories["blog"], 1);

    assert_eq!(days[1].date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    assert_eq!(days[1].total_events, 1);
    assert_eq!(days[1].event_types.values().sum::<i64>(), days[1].total_events);

    let later = storage
        .daily_aggregates_since(NaiveDate::from_ymd_opt(2024, 3, 2).unwrap())
        .await
        .unwrap();
    assert_eq!(later.len(), 1);
}

#[tokio::test]
async fn test_recent_events_order_and_limit() {
    let storage = create_test_storage().await;

    for hour in 0..5 {
        storage
            .record_event(&new_event(EventType::View, at(2024, 3, 1, hour), "blog", "s1"))
            .await
            .unwrap();
    }

    let events = storage
        .recent_events_since(at(2024, 3, 1, 1), 3)
        .await
        .unwrap();
    assert_eq!(events.len(), 3);
    assert_eq!(events[0].timestamp, at(2024, 3, 1, 4));
    assert_eq!(events[2].timestamp, at(2024, 3, 1, 2));

    let none = storage
        .recent_events_since(at(2024, 3, 2, 0), 100)
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn test_user_lifecycle() {
    let storage = create_test_storage().await;

    assert!(!storage.user_exists("alice").await.unwrap());

    let user = storage
        .create_user("alice", Some("alice@example.com"))
        .await
        .unwrap();
    assert_eq!(user.uid, "alice");
    assert!(storage.user_exists("alice").await.unwrap());

    let err = storage.create_user("alice", None).await.unwrap_err();
    assert!(matches!(err, StorageError::Conflict));

    storage.create_user("bob", None).await.unwrap();
    let users = storage.list_users().await.unwrap();
    assert_eq!(users.len(), 2);
    assert!(users
        .iter()
        .any(|u| u.uid == "alice" && u.email.as_deref() == Some("alice@example.com")));

    assert!(storage.delete_user("alice").await.unwrap());
    assert!(!storage.delete_user("alice").await.unwrap());
    assert!(!storage.user_exists("alice").await.unwrap());
}
