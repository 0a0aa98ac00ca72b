use std::sync::Arc;
use std::time::Duration;

use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use thiserror::Error;

use crate::repository::{CatalogRepository, EnrollmentRepository, ProgressRepository, Storage};

mod catalog_repo;
mod enrollment_repo;
mod mapping;
mod migrate;
mod progress_repo;

#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SqliteInitError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Pool sizing and lock waiting for the progress database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SqlitePoolConfig {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    /// How long a writer waits on a locked database before failing.
    pub busy_timeout: Duration,
}

impl Default for SqlitePoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 5,
            acquire_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// A plain `:memory:` database lives and dies with one connection.
fn is_private_memory(database_url: &str) -> bool {
    let url = database_url.trim();
    url == "sqlite::memory:" || url == ":memory:"
}

impl SqliteRepository {
    /// Connect with the default pool settings.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if the connection cannot be established or a
    /// connection PRAGMA fails.
    pub async fn connect(database_url: &str) -> Result<Self, SqliteInitError> {
        Self::connect_with(database_url, SqlitePoolConfig::default()).await
    }

    /// Connect using `config`. Every pooled connection enforces foreign keys,
    /// uses WAL and waits `busy_timeout` on locks, so concurrent progress
    /// flushes queue up instead of failing.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if the connection cannot be established or a
    /// connection PRAGMA fails.
    pub async fn connect_with(
        database_url: &str,
        config: SqlitePoolConfig,
    ) -> Result<Self, SqliteInitError> {
        let max_connections = if is_private_memory(database_url) {
            1
        } else {
            config.max_connections.max(1)
        };
        let busy_ms = u64::try_from(config.busy_timeout.as_millis()).unwrap_or(u64::MAX);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(config.acquire_timeout)
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    sqlx::query("PRAGMA foreign_keys = ON;")
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query("PRAGMA journal_mode = WAL;")
                        .execute(&mut *conn)
                        .await?;
                    let busy = format!("PRAGMA busy_timeout = {busy_ms};");
                    sqlx::query(&busy).execute(&mut *conn).await?;
                    Ok(())
                })
            })
            .connect(database_url)
            .await?;
        tracing::debug!(url = database_url, max_connections, "connected to sqlite");
        Ok(Self { pool })
    }

    /// Apply pending schema migrations.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if a migration fails.
    pub async fn migrate(&self) -> Result<(), SqliteInitError> {
        migrate::run_migrations(&self.pool).await
    }
}

impl Storage {
    /// Build a `Storage` backed by `SQLite`.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if connection or migrations cannot be
    /// completed.
    pub async fn sqlite(database_url: &str) -> Result<Self, SqliteInitError> {
        let repo = SqliteRepository::connect(database_url).await?;
        repo.migrate().await?;
        let catalog: Arc<dyn CatalogRepository> = Arc::new(repo.clone());
        let enrollments: Arc<dyn EnrollmentRepository> = Arc::new(repo.clone());
        let progress: Arc<dyn ProgressRepository> = Arc::new(repo);
        Ok(Self {
            catalog,
            enrollments,
            progress,
        })
    }
}
