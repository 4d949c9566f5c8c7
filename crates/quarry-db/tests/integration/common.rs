use std::time::Duration;

use quarry_db::{Database, DatabaseConfig, Repository};
use tempfile::TempDir;

/// Opens a migrated SQLite database in a fresh temporary directory.
///
/// The `TempDir` must be kept in scope for the test duration;
/// dropping it deletes the database file.
pub async fn setup_test_db() -> (Database, TempDir) {
    setup_test_db_with(DatabaseConfig::new("unused")).await
}

/// Like [`setup_test_db`], with a custom pool size and acquire timeout.
pub async fn setup_test_db_with(config: DatabaseConfig) -> (Database, TempDir) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let config = DatabaseConfig {
        path: dir.path().join("quarry_test.db"),
        ..config
    };

    let db = Database::connect(&config)
        .await
        .expect("Failed to open test database");
    db.migrate().await.expect("Failed to run migrations");
    (db, dir)
}

pub async fn setup_test_repo() -> (Repository, Database, TempDir) {
    let (db, dir) = setup_test_db().await;
    (db.repository(), db, dir)
}

pub fn short_timeout(pool_size: usize) -> DatabaseConfig {
    DatabaseConfig::new("unused")
        .with_pool_size(pool_size)
        .with_acquire_timeout(Duration::from_millis(200))
}
