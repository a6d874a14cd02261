pub mod config;
mod db;
pub mod error;
pub mod migrate;
pub mod observability;
pub mod routes;
pub mod scheduler;

pub use config::Config;
pub use db::*;
pub use routes::{AppState, router};

use std::sync::Arc;

use newsletter_tracking::{Clock, Tracking, storage::SqliteStorage};
use sqlx::SqlitePool;

/// Wires the tracking core to the given pools.
pub fn build_tracking(
    config: &Config,
    read_db: SqlitePool,
    write_db: SqlitePool,
    clock: Arc<dyn Clock>,
) -> Tracking {
    Tracking::new(
        config.tracking.core(),
        SqliteStorage::with_pools(read_db, write_db),
        clock,
    )
}
