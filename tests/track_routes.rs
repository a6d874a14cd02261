use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use serde_json::json;
use temp_dir::TempDir;

mod helpers;

#[tokio::test]
pub async fn test_open_records_event_and_serves_pixel() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let app = helpers::setup_test_app(dir.child("db.sqlite3")).await?;
    let token = app.issue("u1", "n1", Some("a1")).await?;

    let response = app
        .send(
            Request::builder()
                .uri(format!("/track/open?t={token}"))
                .header(header::USER_AGENT, "Mozilla/5.0 (test)")
                .body(Body::empty())?,
        )
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/gif");
    assert!(
        response.headers()[header::CACHE_CONTROL]
            .to_str()?
            .contains("no-store")
    );

    let body = helpers::body_bytes(response).await?;
    assert_eq!(body.len(), 43);
    assert!(body.starts_with(b"GIF89a"));

    let (user_id, newsletter_id, article_id, metadata): (String, String, String, String) =
        sqlx::query_as(
            "SELECT user_id, newsletter_id, article_id, metadata FROM engagement_event WHERE event_type = 'email_open'",
        )
        .fetch_one(&app.pool)
        .await?;
    assert_eq!(user_id, "u1");
    assert_eq!(newsletter_id, "n1");
    assert_eq!(article_id, "a1");

    let metadata: serde_json::Value = serde_json::from_str(&metadata)?;
    assert_eq!(metadata["user_agent"], "Mozilla/5.0 (test)");

    Ok(())
}

#[tokio::test]
pub async fn test_open_with_bad_token_still_serves_pixel() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let app = helpers::setup_test_app(dir.child("db.sqlite3")).await?;

    for uri in ["/track/open?t=not-a-token", "/track/open", "/track/open?t="] {
        let response = app.get(uri).await?;
        assert_eq!(response.status(), StatusCode::OK, "{uri}");
        assert_eq!(helpers::body_bytes(response).await?.len(), 43);
    }

    assert_eq!(app.count_events("email_open").await?, 0);

    Ok(())
}

#[tokio::test]
pub async fn test_repeated_open_is_deduplicated() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let app = helpers::setup_test_app(dir.child("db.sqlite3")).await?;
    let token = app.issue("u1", "n1", None).await?;

    app.get(&format!("/track/open?t={token}")).await?;
    app.get(&format!("/track/open?t={token}")).await?;
    assert_eq!(app.count_events("email_open").await?, 1);

    app.clock.advance(time::Duration::seconds(11));
    app.get(&format!("/track/open?t={token}")).await?;
    assert_eq!(app.count_events("email_open").await?, 2);

    Ok(())
}

#[tokio::test]
pub async fn test_click_redirects_to_link() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let app = helpers::setup_test_app(dir.child("db.sqlite3")).await?;
    let token = app.issue("u1", "n1", None).await?;
    let link_id = app
        .state
        .tracking
        .outbound
        .register_link("https://example.org/story", Some("n1"), Some("a7"))
        .await?;

    let response = app
        .get(&format!("/track/click?t={token}&to={link_id}"))
        .await?;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers()[header::LOCATION],
        "https://example.org/story"
    );

    let (article_id, metadata): (String, String) = sqlx::query_as(
        "SELECT article_id, metadata FROM engagement_event WHERE event_type = 'link_click'",
    )
    .fetch_one(&app.pool)
    .await?;
    assert_eq!(article_id, "a7");

    let metadata: serde_json::Value = serde_json::from_str(&metadata)?;
    assert_eq!(metadata["link_id"], json!(link_id));
    assert_eq!(metadata["target_url"], "https://example.org/story");

    Ok(())
}

#[tokio::test]
pub async fn test_click_falls_back_when_untrackable() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let app = helpers::setup_test_app(dir.child("db.sqlite3")).await?;
    let link_id = app
        .state
        .tracking
        .outbound
        .register_link("https://example.org/story", None, None)
        .await?;
    let valid = app.issue("u1", "n1", None).await?;
    let revoked = app.issue("u2", "n1", None).await?;
    app.state.tracking.revocations.revoke(&revoked).await?;

    for uri in [
        format!("/track/click?t=garbage&to={link_id}"),
        format!("/track/click?t={revoked}&to={link_id}"),
        format!("/track/click?t={valid}&to=unknown"),
        format!("/track/click?t={valid}"),
        "/track/click".to_string(),
    ] {
        let response = app.get(&uri).await?;
        assert_eq!(response.status(), StatusCode::FOUND, "{uri}");
        assert_eq!(response.headers()[header::LOCATION], helpers::FALLBACK_URL, "{uri}");
    }

    assert_eq!(app.count_events("link_click").await?, 0);

    Ok(())
}

#[tokio::test]
pub async fn test_click_with_expired_token_falls_back() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let app = helpers::setup_test_app(dir.child("db.sqlite3")).await?;
    let token = app.issue("u1", "n1", None).await?;
    let link_id = app
        .state
        .tracking
        .outbound
        .register_link("https://example.org/story", None, None)
        .await?;

    app.clock.advance(time::Duration::days(15));

    let response = app
        .get(&format!("/track/click?t={token}&to={link_id}"))
        .await?;
    assert_eq!(response.headers()[header::LOCATION], helpers::FALLBACK_URL);

    Ok(())
}

#[tokio::test]
pub async fn test_post_events() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let app = helpers::setup_test_app(dir.child("db.sqlite3")).await?;
    let event = json!({
        "event_type": "scroll_50",
        "user_id": "u1",
        "newsletter_id": "n1",
        "article_id": "a1",
        "session_id": "s1",
        "metadata": { "week_number": "2025-W01" }
    });

    let response = app.post_json("/track/events", event.clone()).await?;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = helpers::body_json(response).await?;
    assert_eq!(body["accepted"], true);
    assert!(body["id"].is_string());

    let response = app.post_json("/track/events", event).await?;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = helpers::body_json(response).await?;
    assert_eq!(body["accepted"], false);
    assert!(body["id"].is_null());

    assert_eq!(app.count_events("scroll_50").await?, 1);

    Ok(())
}

#[tokio::test]
pub async fn test_post_events_rejects_invalid_input() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let app = helpers::setup_test_app(dir.child("db.sqlite3")).await?;

    let response = app
        .post_json("/track/events", json!({ "event_type": "scroll_75" }))
        .await?;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = app
        .post_json(
            "/track/events",
            json!({ "event_type": "page_view", "user_id": "x".repeat(65) }),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    Ok(())
}
