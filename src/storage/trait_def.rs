use crate::models::{DailyAggregate, Event, NewEvent, UserAccount};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("user already exists")]
    Conflict,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        StorageError::Other(err.into())
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

#[async_trait]
pub trait Storage: Send + Sync {
    /// Initialize the storage (create tables, indexes)
    async fn init(&self) -> Result<()>;

    /// Persist an event and fold it into its day's rollup.
    ///
    /// Runs as one database transaction: either the event row and every
    /// counter increment are committed together, or nothing is.
    async fn record_event(&self, event: &NewEvent) -> StorageResult<Event>;

    /// Daily rollups with `date >= since`, newest first
    async fn daily_aggregates_since(&self, since: NaiveDate) -> StorageResult<Vec<DailyAggregate>>;

    /// Most recent events with `timestamp >= since`, newest first, at most `limit`
    async fn recent_events_since(
        &self,
        since: DateTime<Utc>,
        limit: i64,
    ) -> StorageResult<Vec<Event>>;

    /// Whether `uid` names a known account
    async fn user_exists(&self, uid: &str) -> StorageResult<bool>;

    /// Register an account
    async fn create_user(&self, uid: &str, email: Option<&str>) -> StorageResult<UserAccount>;

    /// Remove an account; returns false when it did not exist
    async fn delete_user(&self, uid: &str) -> StorageResult<bool>;

    /// All accounts, newest first
    async fn list_users(&self) -> StorageResult<Vec<UserAccount>>;
}
