use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use newsletter_tracking::Tracking;
use sqlx::SqlitePool;

mod health;
mod report;
mod track;

#[derive(Clone)]
pub struct AppState {
    pub config: crate::config::Config,
    pub tracking: Arc<Tracking>,
    pub pool: SqlitePool,
}

pub fn router(app_state: AppState) -> Router {
    Router::new()
        // Health check endpoints
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .with_state(app_state.pool.clone())
        .route("/track/open", get(track::open))
        .route("/track/click", get(track::click))
        .route("/track/events", post(track::events))
        .route(
            "/api/users/{user_id}/newsletters/{newsletter_id}/read-articles",
            get(report::read_articles),
        )
        .route(
            "/api/snapshots",
            get(report::list_snapshots).post(report::regenerate_snapshots),
        )
        .with_state(app_state)
}
