//! Public tracking endpoints hit from inside emails and tracked pages.
//!
//! Nothing here ever fails towards the client: the pixel is always served and
//! a click always ends in a redirect, whatever the token looks like.

use axum::{
    Json,
    extract::{Query, State, rejection::QueryRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use axum_extra::{TypedHeader, headers::UserAgent};
use newsletter_tracking::{
    Context, EventType, NewEvent, RecordOutcome, TrackingError, Verification, meta, token,
};
use serde::Deserialize;

use crate::{error::AppError, routes::AppState};

/// 1x1 transparent GIF
static PIXEL: [u8; 43] = [
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
    0x00, 0xff, 0xff, 0xff, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3b,
];

const NO_STORE: &str = "no-store, no-cache, must-revalidate, max-age=0";

#[derive(Debug, Default, Deserialize)]
pub struct OpenQuery {
    t: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ClickQuery {
    t: Option<String>,
    to: Option<String>,
}

fn context_str<'a>(context: &'a Context, key: &str) -> Option<&'a str> {
    context.get(key).and_then(|value| value.as_str())
}

fn event_from_token(event_type: EventType, subject: String, context: &Context) -> NewEvent {
    let mut event = NewEvent::new(event_type)
        .user(Some(subject))
        .newsletter(context_str(context, token::NEWSLETTER_ID))
        .article(context_str(context, token::ARTICLE_ID));

    if let Some(class_id) = context_str(context, token::CLASS_ID) {
        event = event.meta(meta::CLASS_ID, class_id);
    }

    event
}

async fn record(state: &AppState, event: NewEvent) {
    let event_type = event.event_type;
    if let Err(err) = state.tracking.recorder.record(event).await {
        tracing::warn!(%event_type, err = %err, "failed to record engagement event");
    }
}

/// GET /track/open?t=<token>
pub async fn open(
    State(state): State<AppState>,
    query: Result<Query<OpenQuery>, QueryRejection>,
    user_agent: Option<TypedHeader<UserAgent>>,
) -> impl IntoResponse {
    let query = query.map(|Query(query)| query).unwrap_or_default();

    if let Some(token) = query.t.as_deref() {
        let verification = state.tracking.verifier.verify(token).await;

        if let Verification::Valid {
            subject, context, ..
        } = verification
        {
            let mut event = event_from_token(EventType::EmailOpen, subject, &context);
            if let Some(TypedHeader(user_agent)) = user_agent {
                event = event.meta(meta::USER_AGENT, user_agent.as_str());
            }

            record(&state, event).await;
        }
    }

    (
        [
            (header::CONTENT_TYPE, "image/gif"),
            (header::CACHE_CONTROL, NO_STORE),
        ],
        &PIXEL[..],
    )
}

/// GET /track/click?t=<token>&to=<link_id>
pub async fn click(
    State(state): State<AppState>,
    query: Result<Query<ClickQuery>, QueryRejection>,
) -> Response {
    let query = query.map(|Query(query)| query).unwrap_or_default();
    let target = click_target(&state, query)
        .await
        .unwrap_or_else(|| state.config.tracking.fallback_url.to_owned());

    (
        StatusCode::FOUND,
        [(header::LOCATION, target), (header::CACHE_CONTROL, NO_STORE.to_owned())],
    )
        .into_response()
}

/// Resolves the redirect target, recording the click on the way.
/// `None` sends the visitor to the fallback.
async fn click_target(state: &AppState, query: ClickQuery) -> Option<String> {
    let (token, link_id) = (query.t?, query.to?);

    let Verification::Valid {
        subject, context, ..
    } = state.tracking.verifier.verify(&token).await
    else {
        return None;
    };

    let link = match state.tracking.outbound.resolve_link(&link_id).await {
        Ok(Some(link)) => link,
        Ok(None) => {
            tracing::debug!(link_id = %link_id, "unknown tracked link");
            return None;
        }
        Err(err) => {
            tracing::error!(err = %err, "failed to resolve tracked link");
            return None;
        }
    };

    let mut event = event_from_token(EventType::LinkClick, subject, &context)
        .meta(meta::LINK_ID, link.id.as_str())
        .meta(meta::TARGET_URL, link.url.as_str());

    if event.article_id.is_none() {
        event = event.article(link.article_id.as_deref());
    }
    if event.newsletter_id.is_none() {
        event = event.newsletter(link.newsletter_id.as_deref());
    }

    record(state, event).await;

    Some(link.url)
}

/// POST /track/events, fed by the page session tracker
pub async fn events(
    State(state): State<AppState>,
    Json(input): Json<NewEvent>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = match state.tracking.recorder.record(input).await {
        Ok(outcome) => outcome,
        Err(err @ (TrackingError::Validation(_) | TrackingError::InvalidInput(_))) => {
            return Err(err.into());
        }
        Err(err) => {
            tracing::warn!(err = %err, "engagement event dropped");
            RecordOutcome::rejected()
        }
    };

    Ok((StatusCode::ACCEPTED, Json(outcome)))
}
