use sqlx::SqlitePool;
use tempfile::TempDir;

/// Builds a fresh, migrated SQLite pool backed by a temp-dir file. The
/// `TempDir` is returned alongside the pool so callers keep it alive for the
/// duration of the test (dropping it deletes the backing file).
pub async fn setup_test_pool() -> (SqlitePool, TempDir) {
    let dir = TempDir::new().expect("create temp dir for test db");
    let db_path = dir.path().join("router-test.sqlite");
    let url = format!("sqlite://{}", db_path.display());
    let pool = crate::connect(&url, 5).await.expect("connect test pool");
    (pool, dir)
}
