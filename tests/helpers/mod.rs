#![allow(dead_code)]

use std::{path::PathBuf, sync::Arc};

use axum::{Router, body::Body, http::Request, response::Response};
use http_body_util::BodyExt;
use newsletter::{
    AppState,
    config::{
        Config, DatabaseConfig, ObservabilityConfig, SchedulerConfig, ServerConfig, TrackingConfig,
    },
};
use newsletter_tracking::{Context, ManualClock, token};
use sqlx::SqlitePool;
use tower::ServiceExt;

/// 2025-01-01T00:00:00Z
pub const START: i64 = 1_735_689_600;

pub const FALLBACK_URL: &str = "https://news.example.com/";

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub clock: ManualClock,
    pub pool: SqlitePool,
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> anyhow::Result<Response> {
        Ok(self.router.clone().oneshot(request).await?)
    }

    pub async fn get(&self, uri: &str) -> anyhow::Result<Response> {
        self.send(Request::builder().uri(uri).body(Body::empty())?)
            .await
    }

    pub async fn post_json(&self, uri: &str, body: serde_json::Value) -> anyhow::Result<Response> {
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))?,
        )
        .await
    }

    pub async fn issue(&self, user_id: &str, newsletter_id: &str, article_id: Option<&str>) -> anyhow::Result<String> {
        let mut context = Context::new();
        context.insert(token::NEWSLETTER_ID.to_owned(), newsletter_id.into());
        if let Some(article_id) = article_id {
            context.insert(token::ARTICLE_ID.to_owned(), article_id.into());
        }

        Ok(self
            .state
            .tracking
            .issue_token(user_id, context, None)
            .await?)
    }

    pub async fn count_events(&self, event_type: &str) -> anyhow::Result<i64> {
        Ok(
            sqlx::query_scalar("SELECT COUNT(*) FROM engagement_event WHERE event_type = ?")
                .bind(event_type)
                .fetch_one(&self.pool)
                .await?,
        )
    }
}

pub fn test_config(database_url: String) -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 3000,
        },
        database: DatabaseConfig {
            url: database_url,
            max_connections: 1,
        },
        tracking: TrackingConfig {
            secret: "test_secret_key_minimum_32_characters_long".to_string(),
            token_ttl_days: 14,
            dedup_window_secs: 10,
            base_url: "https://news.example.com".to_string(),
            fallback_url: FALLBACK_URL.to_string(),
        },
        scheduler: SchedulerConfig {
            enabled: false,
            ..Default::default()
        },
        observability: ObservabilityConfig::default(),
    }
}

pub async fn setup_test_app(path: PathBuf) -> anyhow::Result<TestApp> {
    let url = format!("sqlite:{}", path.to_str().unwrap());
    let pool = newsletter::create_pool(&url, 1).await?;
    newsletter::migrate::run(&pool).await?;

    let config = test_config(url);
    let clock = ManualClock::at_secs(START);
    let tracking = Arc::new(newsletter::build_tracking(
        &config,
        pool.clone(),
        pool.clone(),
        Arc::new(clock.clone()),
    ));

    let state = AppState {
        config,
        tracking,
        pool: pool.clone(),
    };

    Ok(TestApp {
        router: newsletter::router(state.clone()),
        state,
        clock,
        pool,
    })
}

pub async fn body_bytes(response: Response) -> anyhow::Result<Vec<u8>> {
    Ok(response.into_body().collect().await?.to_bytes().to_vec())
}

pub async fn body_json(response: Response) -> anyhow::Result<serde_json::Value> {
    Ok(serde_json::from_slice(&body_bytes(response).await?)?)
}
