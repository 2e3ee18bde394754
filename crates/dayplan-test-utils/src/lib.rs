//! Shared test utilities for dayplan integration tests.
//!
//! Each test gets its own SQLite database file inside a fresh temporary
//! directory, with all migrations applied. The directory (and the database
//! with it) is removed when the returned [`TestDb`] is dropped.

use sqlx::SqlitePool;
use tempfile::TempDir;

use dayplan_db::config::DbConfig;
use dayplan_db::pool;

/// A migrated temporary database.
///
/// Keep the value alive for the duration of the test; dropping it deletes
/// the backing directory.
pub struct TestDb {
    pub pool: SqlitePool,
    pub config: DbConfig,
    _dir: TempDir,
}

impl TestDb {
    /// Close the pool. The directory is removed when `self` drops.
    pub async fn close(self) {
        self.pool.close().await;
    }
}

/// Create a temporary database with migrations applied.
pub async fn create_test_db() -> TestDb {
    let dir = TempDir::new().expect("failed to create temp dir for test database");
    let path = dir.path().join("plans.db");
    let config = DbConfig::new(format!("sqlite://{}", path.display()));

    let pool = pool::open(&config)
        .await
        .unwrap_or_else(|e| panic!("failed to open test database at {}: {e:#}", path.display()));

    TestDb {
        pool,
        config,
        _dir: dir,
    }
}
