use newsletter_tracking::TrackingError;
use temp_dir::TempDir;

mod helpers;

#[tokio::test]
pub async fn test_register_and_resolve_link() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let state = helpers::setup_test_state(dir.child("db.sqlite3")).await?;
    let outbound = &state.tracking.outbound;

    let id = outbound
        .register_link("https://example.org/article?id=7", Some("n1"), Some("a1"))
        .await?;

    let link = outbound.resolve_link(&id).await?.unwrap();
    assert_eq!(link.url, "https://example.org/article?id=7");
    assert_eq!(link.newsletter_id.as_deref(), Some("n1"));
    assert_eq!(link.article_id.as_deref(), Some("a1"));
    assert_eq!(link.created_at, helpers::START);

    assert_eq!(outbound.resolve_link("missing").await?, None);

    Ok(())
}

#[tokio::test]
pub async fn test_register_link_rejects_bad_urls() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let state = helpers::setup_test_state(dir.child("db.sqlite3")).await?;

    for url in ["not a url", "javascript:alert(1)", "ftp://example.org/file"] {
        let err = state
            .tracking
            .outbound
            .register_link(url, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, TrackingError::InvalidInput(_)), "{url}");
    }

    Ok(())
}

#[tokio::test]
pub async fn test_record_send_is_unique_per_recipient() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let state = helpers::setup_test_state(dir.child("db.sqlite3")).await?;
    let outbound = &state.tracking.outbound;

    outbound.record_send("n1", "u1", None).await?;
    outbound.record_send("n1", "u1", None).await?;
    outbound.record_send("n1", "u2", None).await?;

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM newsletter_send")
        .fetch_one(&state.pool)
        .await?;
    assert_eq!(rows, 2);

    Ok(())
}

#[tokio::test]
pub async fn test_tracking_urls() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let state = helpers::setup_test_state(dir.child("db.sqlite3")).await?;
    let outbound = &state.tracking.outbound;

    assert_eq!(
        outbound.pixel_url("h.p.s"),
        "https://news.example.com/track/open?t=h.p.s"
    );
    assert_eq!(
        outbound.click_url("h.p.s", "01J/x"),
        "https://news.example.com/track/click?t=h.p.s&to=01J%2Fx"
    );

    Ok(())
}
