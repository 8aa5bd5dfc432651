pub mod postgres;
pub mod rows;
pub mod sqlite;
pub mod trait_def;

pub use postgres::PostgresStorage;
pub use sqlite::SqliteStorage;
pub use trait_def::{Storage, StorageError, StorageResult};

use std::sync::Arc;
use tracing::{error, info};

use crate::config::{DatabaseBackend, DatabaseConfig};

/// Storage handle as seen by request handlers.
///
/// A failed startup connection is kept as a value so the server can still
/// answer, and report the backend as not configured rather than crashing.
#[derive(Clone)]
pub enum Backend {
    Ready(Arc<dyn Storage>),
    Unavailable(Arc<str>),
}

impl Backend {
    pub fn ready(storage: Arc<dyn Storage>) -> Self {
        Backend::Ready(storage)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Backend::Ready(_))
    }

    /// Connect and initialize the configured backend, capturing failure
    pub async fn connect(config: &DatabaseConfig) -> Self {
        match open_storage(config).await {
            Ok(storage) => Backend::Ready(storage),
            Err(e) => {
                error!("Storage backend initialization failed: {:#}", e);
                Backend::Unavailable(Arc::from(format!("{e:#}")))
            }
        }
    }
}

/// Open the configured storage and create its schema
pub async fn open_storage(config: &DatabaseConfig) -> anyhow::Result<Arc<dyn Storage>> {
    let storage: Arc<dyn Storage> = match config.backend {
        DatabaseBackend::Sqlite => {
            info!("Using SQLite storage: {}", config.url);
            Arc::new(SqliteStorage::new(&config.url, config.max_connections).await?)
        }
        DatabaseBackend::Postgres => {
            info!("Using PostgreSQL storage");
            Arc::new(PostgresStorage::new(&config.url, config.max_connections).await?)
        }
    };

    info!("Initializing database...");
    storage.init().await?;
    info!("Database initialized successfully");

    Ok(storage)
}
