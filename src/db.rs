use anyhow::Result;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{ConnectOptions, SqlitePool};
use std::str::FromStr;
use std::time::Duration;
use tracing::log::LevelFilter;

/// Connection options shared by every pool.
///
/// Applied per connection rather than once per pool, so connections opened
/// later by the pool carry the same settings:
/// - busy_timeout reduces SQLITE_BUSY errors
/// - synchronous=NORMAL is safe with WAL
/// - foreign_keys must be explicitly enabled (disabled by default)
/// - temp_store=memory speeds up temporary tables
fn base_options(database_url: &str) -> Result<SqliteConnectOptions> {
    Ok(SqliteConnectOptions::from_str(database_url)?
        .busy_timeout(Duration::from_secs(5))
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .pragma("cache_size", "-20000")
        .pragma("temp_store", "memory")
        .log_statements(LevelFilter::Debug))
}

/// Options for connections allowed to write; creates the file when missing
/// and switches it to WAL so readers never block the writer.
fn write_options(database_url: &str) -> Result<SqliteConnectOptions> {
    Ok(base_options(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal))
}

/// Create a read-only connection pool for concurrent reads
///
/// The database must already exist (run `migrate` first).
pub async fn create_read_pool(database_url: &str, max_connections: u32) -> Result<SqlitePool> {
    let options = base_options(database_url)?.read_only(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    tracing::info!(
        "Created read-only pool with {} max connections",
        max_connections
    );

    Ok(pool)
}

/// Create a read-write connection pool
///
/// Limited to 1 connection to avoid SQLITE_BUSY errors on writes.
pub async fn create_write_pool(database_url: &str) -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(write_options(database_url)?)
        .await?;

    tracing::info!("Created read-write pool with 1 max connection");

    Ok(pool)
}

/// Create a standard pool without read/write separation, used by CLI
/// commands and tests.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(write_options(database_url)?)
        .await?;

    tracing::info!("Created pool with {} max connections", max_connections);

    Ok(pool)
}
