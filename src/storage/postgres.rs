use crate::models::{day_key, DailyAggregate, Event, NewEvent, UserAccount};
use crate::storage::rows::{
    assemble_daily, from_millis, tags_json, DailyCountRow, DailyStatsRow, EventRow, UserRow,
    EVENT_COLUMNS,
};
use crate::storage::{Storage, StorageError, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;

pub struct PostgresStorage {
    pool: Arc<PgPool>,
}

impl PostgresStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                uid TEXT PRIMARY KEY,
                email TEXT,
                created_at BIGINT NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id BIGSERIAL PRIMARY KEY,
                event_type TEXT NOT NULL,
                content_id TEXT,
                occurred_at BIGINT NOT NULL,
                event_day TEXT NOT NULL,
                user_agent TEXT NOT NULL,
                referrer TEXT NOT NULL,
                ip_digest TEXT NOT NULL,
                session_id TEXT NOT NULL,
                path TEXT NOT NULL,
                title TEXT NOT NULL,
                category TEXT NOT NULL,
                tags TEXT NOT NULL,
                duration DOUBLE PRECISION,
                scroll_depth DOUBLE PRECISION,
                click_target TEXT,
                language TEXT NOT NULL,
                screen_resolution TEXT NOT NULL,
                viewport TEXT NOT NULL,
                timezone TEXT NOT NULL,
                created_at BIGINT NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_occurred_at ON events(occurred_at)")
            .execute(self.pool.as_ref())
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS daily_stats (
                day TEXT PRIMARY KEY,
                total_events BIGINT NOT NULL,
                created_at BIGINT NOT NULL,
                updated_at BIGINT NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS daily_event_types (
                day TEXT NOT NULL,
                event_type TEXT NOT NULL,
                hits BIGINT NOT NULL,
                PRIMARY KEY (day, event_type)
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS daily_categories (
                day TEXT NOT NULL,
                category TEXT NOT NULL,
                hits BIGINT NOT NULL,
                PRIMARY KEY (day, category)
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn record_event(&self, event: &NewEvent) -> StorageResult<Event> {
        let now_ms = Utc::now().timestamp_millis();
        let day = day_key(event.timestamp.date_naive());
        let tags = tags_json(&event.metadata.tags)?;

        let mut tx = self.pool.begin().await?;

        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO events (
                event_type, content_id, occurred_at, event_day, user_agent, referrer,
                ip_digest, session_id, path, title, category, tags, duration,
                scroll_depth, click_target, language, screen_resolution, viewport,
                timezone, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            RETURNING id
            "#,
        )
        .bind(event.event_type.as_str())
        .bind(event.content_id.as_deref())
        .bind(event.timestamp.timestamp_millis())
        .bind(&day)
        .bind(&event.user_agent)
        .bind(&event.referrer)
        .bind(&event.ip_digest)
        .bind(&event.session_id)
        .bind(&event.metadata.path)
        .bind(&event.metadata.title)
        .bind(&event.metadata.category)
        .bind(&tags)
        .bind(event.metadata.duration)
        .bind(event.metadata.scroll_depth)
        .bind(event.metadata.click_target.as_deref())
        .bind(&event.browser_info.language)
        .bind(&event.browser_info.screen_resolution)
        .bind(&event.browser_info.viewport)
        .bind(&event.browser_info.timezone)
        .bind(now_ms)
        .fetch_one(&mut *tx)
        .await?;

        // Row-level upserts: concurrent same-day writers queue on the row lock
        sqlx::query(
            r#"
            INSERT INTO daily_stats (day, total_events, created_at, updated_at)
            VALUES ($1, 1, $2, $2)
            ON CONFLICT (day) DO UPDATE SET
                total_events = daily_stats.total_events + 1,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&day)
        .bind(now_ms)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO daily_event_types (day, event_type, hits)
            VALUES ($1, $2, 1)
            ON CONFLICT (day, event_type) DO UPDATE SET
                hits = daily_event_types.hits + 1
            "#,
        )
        .bind(&day)
        .bind(event.event_type.as_str())
        .execute(&mut *tx)
        .await?;

        if let Some(category) = event.rollup_category() {
            sqlx::query(
                r#"
                INSERT INTO daily_categories (day, category, hits)
                VALUES ($1, $2, 1)
                ON CONFLICT (day, category) DO UPDATE SET
                    hits = daily_categories.hits + 1
                "#,
            )
            .bind(&day)
            .bind(category)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(event.stored(id, from_millis(now_ms)?))
    }

    async fn daily_aggregates_since(&self, since: NaiveDate) -> StorageResult<Vec<DailyAggregate>> {
        let since = day_key(since);

        let mut tx = self.pool.begin().await?;

        // READ COMMITTED would let the three selects see different commits
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;

        let stats = sqlx::query_as::<_, DailyStatsRow>(
            r#"
            SELECT day, total_events, created_at, updated_at
            FROM daily_stats
            WHERE day >= $1
            ORDER BY day DESC
            "#,
        )
        .bind(&since)
        .fetch_all(&mut *tx)
        .await?;

        let event_types = sqlx::query_as::<_, DailyCountRow>(
            r#"
            SELECT day, event_type AS name, hits
            FROM daily_event_types
            WHERE day >= $1
            "#,
        )
        .bind(&since)
        .fetch_all(&mut *tx)
        .await?;

        let categories = sqlx::query_as::<_, DailyCountRow>(
            r#"
            SELECT day, category AS name, hits
            FROM daily_categories
            WHERE day >= $1
            "#,
        )
        .bind(&since)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(assemble_daily(stats, event_types, categories)?)
    }

    async fn recent_events_since(
        &self,
        since: DateTime<Utc>,
        limit: i64,
    ) -> StorageResult<Vec<Event>> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE occurred_at >= $1 \
             ORDER BY occurred_at DESC, id DESC LIMIT $2"
        );

        let rows = sqlx::query_as::<_, EventRow>(&sql)
            .bind(since.timestamp_millis())
            .bind(limit)
            .fetch_all(self.pool.as_ref())
            .await?;

        let events = rows
            .into_iter()
            .map(Event::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok(events)
    }

    async fn user_exists(&self, uid: &str) -> StorageResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM users WHERE uid = $1)",
        )
        .bind(uid)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(exists)
    }

    async fn create_user(&self, uid: &str, email: Option<&str>) -> StorageResult<UserAccount> {
        let created_at = Utc::now().timestamp_millis();

        let result = sqlx::query(
            r#"
            INSERT INTO users (uid, email, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (uid) DO NOTHING
            "#,
        )
        .bind(uid)
        .bind(email)
        .bind(created_at)
        .execute(self.pool.as_ref())
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::Conflict);
        }

        Ok(UserAccount {
            uid: uid.to_string(),
            email: email.map(str::to_string),
            created_at: from_millis(created_at)?,
        })
    }

    async fn delete_user(&self, uid: &str) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM users WHERE uid = $1")
            .bind(uid)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_users(&self) -> StorageResult<Vec<UserAccount>> {
        let rows = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT uid, email, created_at
            FROM users
            ORDER BY created_at DESC, uid
            "#,
        )
        .fetch_all(self.pool.as_ref())
        .await?;

        let users = rows
            .into_iter()
            .map(UserAccount::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok(users)
    }
}
