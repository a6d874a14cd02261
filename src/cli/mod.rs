use std::sync::Arc;

use newsletter_tracking::{SystemClock, Tracking};
use sqlx::SqlitePool;

pub mod link;
pub mod maintenance;
pub mod server;
pub mod token;

/// Single-connection pool plus tracking core for one-shot commands.
async fn connect(config: &newsletter::Config) -> anyhow::Result<(SqlitePool, Tracking)> {
    let pool = newsletter::create_pool(&config.database.url, 1).await?;
    let tracking = newsletter::build_tracking(
        config,
        pool.clone(),
        pool.clone(),
        Arc::new(SystemClock),
    );

    Ok((pool, tracking))
}
