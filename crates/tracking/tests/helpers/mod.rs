use std::{path::PathBuf, str::FromStr, sync::Arc};

use newsletter_tracking::{
    Context, ManualClock, Tracking, TrackingConfig, storage::SqliteStorage, token,
};
use sqlx::{SqlitePool, sqlite::SqliteConnectOptions};
use sqlx_migrator::{Migrate, Plan};
use time::Duration;

pub const SECRET: &str = "integration-secret-with-at-least-32-chars";

/// 2025-01-01T00:00:00Z
pub const START: i64 = 1_735_689_600;

pub struct TestState {
    pub pool: SqlitePool,
    pub clock: ManualClock,
    pub tracking: Tracking,
}

pub async fn setup_test_state(path: PathBuf) -> anyhow::Result<TestState> {
    let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.to_str().unwrap()))?
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await?;
    let mut conn = pool.acquire().await?;
    newsletter_db::migrator()?
        .run(&mut conn, &Plan::apply_all())
        .await?;
    drop(conn);

    let clock = ManualClock::at_secs(START);
    let tracking = Tracking::new(
        TrackingConfig {
            secret: SECRET.to_owned(),
            token_ttl: Duration::days(14),
            dedup_window: Duration::seconds(10),
            base_url: "https://news.example.com/".to_owned(),
        },
        SqliteStorage::new(pool.clone()),
        Arc::new(clock.clone()),
    );

    Ok(TestState {
        pool,
        clock,
        tracking,
    })
}

#[allow(dead_code)]
pub fn context(newsletter_id: &str, article_id: Option<&str>) -> Context {
    let mut ctx = Context::new();
    ctx.insert(token::NEWSLETTER_ID.to_owned(), newsletter_id.into());
    if let Some(article_id) = article_id {
        ctx.insert(token::ARTICLE_ID.to_owned(), article_id.into());
    }

    ctx
}

#[allow(dead_code)]
pub async fn count_events(pool: &SqlitePool, event_type: &str) -> anyhow::Result<i64> {
    Ok(
        sqlx::query_scalar("SELECT COUNT(*) FROM engagement_event WHERE event_type = ?")
            .bind(event_type)
            .fetch_one(pool)
            .await?,
    )
}
