use std::sync::Arc;

use serde::Serialize;
use sqlx::prelude::FromRow;
use ulid::Ulid;
use url::Url;

use crate::{Clock, Result, storage::OutboundStorage};

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct TrackedLink {
    pub id: String,
    pub newsletter_id: Option<String>,
    pub article_id: Option<String>,
    pub url: String,
    pub created_at: i64,
}

/// Builds the pixel and click URLs embedded in outgoing emails.
pub struct Outbound {
    storage: Arc<dyn OutboundStorage>,
    clock: Arc<dyn Clock>,
    base_url: String,
}

impl Outbound {
    pub fn new(
        storage: Arc<dyn OutboundStorage>,
        clock: Arc<dyn Clock>,
        base_url: impl Into<String>,
    ) -> Self {
        let base_url = base_url.into();

        Self {
            storage,
            clock,
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    pub async fn register_link(
        &self,
        url: &str,
        newsletter_id: Option<&str>,
        article_id: Option<&str>,
    ) -> Result<String> {
        let parsed = match Url::parse(url) {
            Ok(parsed) => parsed,
            Err(err) => crate::invalid!("invalid link url: {err}"),
        };

        if !matches!(parsed.scheme(), "http" | "https") {
            crate::invalid!("link url must use http or https");
        }

        let link = TrackedLink {
            id: Ulid::new().to_string(),
            newsletter_id: newsletter_id.map(ToOwned::to_owned),
            article_id: article_id.map(ToOwned::to_owned),
            url: parsed.to_string(),
            created_at: self.clock.now_secs(),
        };

        self.storage.insert_link(&link).await?;

        Ok(link.id)
    }

    pub async fn resolve_link(&self, id: &str) -> Result<Option<TrackedLink>> {
        Ok(self.storage.find_link(id).await?)
    }

    /// Remembers that `newsletter_id` went out to `user_id`.
    pub async fn record_send(
        &self,
        newsletter_id: &str,
        user_id: &str,
        class_id: Option<&str>,
    ) -> Result<()> {
        self.storage
            .insert_send(
                &Ulid::new().to_string(),
                newsletter_id,
                user_id,
                class_id,
                self.clock.now_secs(),
            )
            .await?;

        Ok(())
    }

    pub fn pixel_url(&self, token: &str) -> String {
        format!(
            "{}/track/open?t={}",
            self.base_url,
            urlencoding::encode(token)
        )
    }

    pub fn click_url(&self, token: &str, link_id: &str) -> String {
        format!(
            "{}/track/click?t={}&to={}",
            self.base_url,
            urlencoding::encode(token),
            urlencoding::encode(link_id)
        )
    }
}
