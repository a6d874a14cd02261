use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use newsletter_tracking::TrackingError;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Tracking(#[from] TrackingError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status_code, message) = match self {
            AppError::Tracking(TrackingError::Validation(errors)) => {
                (StatusCode::UNPROCESSABLE_ENTITY, errors.to_string())
            }
            AppError::Tracking(TrackingError::InvalidInput(msg)) => {
                (StatusCode::UNPROCESSABLE_ENTITY, msg)
            }
            AppError::Tracking(err) => {
                tracing::error!("Tracking error: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An unexpected error occurred. Please try again later.".to_string(),
                )
            }
        };

        (status_code, Json(json!({ "error": message }))).into_response()
    }
}
