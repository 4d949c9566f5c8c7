use quarry_core::AppError;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteSynchronous};
use sqlx::{ConnectOptions, Connection, SqliteConnection};

use crate::config::DatabaseConfig;
use crate::pool::ConnectionPool;
use crate::repository::Repository;

static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

/// Central database facade: owns the connection pool, runs migrations,
/// and vends repository instances.
#[derive(Clone)]
pub struct Database {
    pool: ConnectionPool<SqliteConnection>,
}

impl Database {
    /// Open `pool_size` connections to the SQLite file in `config`,
    /// creating the file (and its directory) if needed.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, AppError> {
        if let Some(parent) = config.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::DatabaseError(format!(
                    "Failed to create database directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&config.path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(config.busy_timeout)
            .pragma("cache_size", "-64000")
            .pragma("temp_store", "MEMORY");

        let mut connections = Vec::with_capacity(config.pool_size);
        for _ in 0..config.pool_size {
            let conn = options
                .connect()
                .await
                .map_err(|e| AppError::DatabaseError(format!("Failed to connect: {e}")))?;
            connections.push(conn);
        }

        tracing::info!(
            path = %config.path.display(),
            pool_size = config.pool_size,
            "Database connected"
        );
        Ok(Self {
            pool: ConnectionPool::from_connections(connections, config.acquire_timeout)?,
        })
    }

    /// Create a `Database` from an existing pool (useful for testing).
    pub fn from_pool(pool: ConnectionPool<SqliteConnection>) -> Self {
        Self { pool }
    }

    /// Run all pending migrations.
    pub async fn migrate(&self) -> Result<(), AppError> {
        let mut conn = self.pool.acquire().await?;
        MIGRATOR
            .run(&mut *conn)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// Get a [`Repository`] backed by this pool.
    pub fn repository(&self) -> Repository {
        Repository::new(self.pool.clone())
    }

    /// Get a reference to the underlying pool.
    pub fn pool(&self) -> &ConnectionPool<SqliteConnection> {
        &self.pool
    }

    /// Close the pool. Idle connections are closed now; checked-out ones
    /// when their holder releases them.
    pub async fn close(&self) {
        for conn in self.pool.close() {
            if let Err(e) = conn.close().await {
                tracing::warn!(error = %e, "Failed to close database connection");
            }
        }
        tracing::info!("Database closed");
    }
}
