use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

/// Connection options shared by the server and the integration tests.
pub fn connect_options(database_url: &str) -> anyhow::Result<SqliteConnectOptions> {
    // grant tables cascade on user/resource deletion, so foreign keys must
    // be enforced per connection
    Ok(SqliteConnectOptions::from_str(database_url)
        .context("invalid DATABASE_URL")?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5)))
}

/// Open the pool and run the embedded migrations.
///
/// SQLite starts transactions deferred, and a lock-upgrade conflict fails
/// with SQLITE_BUSY without consulting the busy timeout. The pool holds a
/// single connection, which serializes every writer (the activity listener
/// included) so a handler transaction never races another connection for
/// the write lock. Handlers must not acquire a second connection while a
/// transaction is open.
pub async fn connect(database_url: &str) -> anyhow::Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(connect_options(database_url)?)
        .await
        .context("failed to connect to database")?;

    sqlx::migrate!()
        .run(&pool)
        .await
        .context("failed to run migrations")?;

    Ok(pool)
}

pub async fn init() -> anyhow::Result<SqlitePool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    connect(&database_url).await
}
