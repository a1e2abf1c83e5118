pub mod error;
pub mod models;
pub mod store;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

pub use error::StoreError;
pub use store::{PeriodFilter, SqliteSubmissionStore, SubmissionStore};

/// Opens a SQLite pool at `database_url` (a `sqlite://` URL) and runs the
/// crate's migrations. `max_connections` follows the same
/// env-override-with-default convention used for other router tunables.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

pub fn get_max_connections() -> u32 {
    router_utils::env_or_filtered("ROUTER_DB_MAX_CONNECTIONS", 10, |v: &u32| *v > 0)
}
