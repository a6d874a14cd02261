use axum::{
    Json,
    extract::{Path, Query, State},
};
use newsletter_tracking::{AnalyticsSnapshot, SnapshotScope, snapshot::parse_date};
use serde::Deserialize;

use crate::{error::AppError, routes::AppState};

#[derive(Debug, Deserialize)]
pub struct SnapshotRange {
    pub from: String,
    pub to: String,
    #[serde(flatten)]
    pub scope: SnapshotScope,
}

/// GET /api/users/{user_id}/newsletters/{newsletter_id}/read-articles
pub async fn read_articles(
    State(state): State<AppState>,
    Path((user_id, newsletter_id)): Path<(String, String)>,
) -> Result<Json<Vec<String>>, AppError> {
    let articles = state
        .tracking
        .recorder
        .get_read_articles(&user_id, &newsletter_id)
        .await?;

    Ok(Json(articles))
}

/// POST /api/snapshots
pub async fn regenerate_snapshots(
    State(state): State<AppState>,
    Json(input): Json<SnapshotRange>,
) -> Result<Json<Vec<AnalyticsSnapshot>>, AppError> {
    let snapshots = state
        .tracking
        .snapshots
        .regenerate(parse_date(&input.from)?, parse_date(&input.to)?, &input.scope)
        .await?;

    Ok(Json(snapshots))
}

/// GET /api/snapshots?from=&to=&newsletter_id=&article_id=&class_id=
pub async fn list_snapshots(
    State(state): State<AppState>,
    Query(input): Query<SnapshotRange>,
) -> Result<Json<Vec<AnalyticsSnapshot>>, AppError> {
    let snapshots = state
        .tracking
        .snapshots
        .list(parse_date(&input.from)?, parse_date(&input.to)?, &input.scope)
        .await?;

    Ok(Json(snapshots))
}
