//! Database migration utilities

use sqlx::{SqlitePool, migrate::MigrateDatabase};
use sqlx_migrator::{Migrate, Plan};

use crate::config::Config;

/// Apply every pending migration of the tracking schema
pub async fn migrate(config: &Config) -> anyhow::Result<()> {
    tracing::info!("Migrating database {}", config.database.url);

    let pool = crate::create_pool(&config.database.url, 1).await?;
    run(&pool).await?;
    pool.close().await;

    tracing::info!("Migrations completed successfully");

    Ok(())
}

/// Drop the database if it exists and run migrations
pub async fn reset(config: &Config) -> anyhow::Result<()> {
    if sqlx::Sqlite::database_exists(&config.database.url).await? {
        tracing::warn!("Dropping existing database: {}", config.database.url);
        sqlx::Sqlite::drop_database(&config.database.url).await?;
    } else {
        tracing::info!("Database does not exist, nothing to drop");
    }

    migrate(config).await
}

pub async fn run(pool: &SqlitePool) -> anyhow::Result<()> {
    let mut conn = pool.acquire().await?;
    newsletter_db::migrator()?
        .run(&mut conn, &Plan::apply_all())
        .await?;

    Ok(())
}
