use std::sync::Arc;

use serde::Serialize;
use time::Duration;
use ulid::Ulid;
use validator::Validate;

use crate::{
    Clock, DedupKey, EngagementEvent, NewEvent, Result, storage::EventStorage,
};

pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::seconds(10);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordOutcome {
    pub accepted: bool,
    pub id: Option<String>,
}

impl RecordOutcome {
    pub fn rejected() -> Self {
        Self {
            accepted: false,
            id: None,
        }
    }
}

/// Deduplicating, append-only sink for engagement events.
///
/// Deduplication is a read followed by a conditional insert. Two identical
/// submissions racing each other can both be accepted; that is tolerated
/// for a pixel workload in exchange for not serializing writes.
pub struct EventRecorder {
    storage: Arc<dyn EventStorage>,
    clock: Arc<dyn Clock>,
    dedup_window: Duration,
}

impl EventRecorder {
    pub fn new(storage: Arc<dyn EventStorage>, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            clock,
            dedup_window: DEFAULT_DEDUP_WINDOW,
        }
    }

    pub fn with_dedup_window(mut self, window: Duration) -> Self {
        self.dedup_window = window;
        self
    }

    pub async fn record(&self, event: NewEvent) -> Result<RecordOutcome> {
        event.validate()?;

        let now = self.clock.now_secs();

        // anonymous events carry no identity to collapse on
        if let Some(user_id) = event.user_id.as_deref() {
            let key = DedupKey {
                event_type: event.event_type,
                user_id,
                article_id: event.article_id.as_deref(),
            };
            let since = now - self.dedup_window.whole_seconds();

            if let Some(existing) = self.storage.find_recent_event(key, since).await? {
                tracing::debug!(
                    event_type = %event.event_type,
                    user_id,
                    existing = %existing,
                    "duplicate engagement event dropped"
                );

                return Ok(RecordOutcome::rejected());
            }
        }

        let id = Ulid::new().to_string();
        let row = EngagementEvent {
            id: id.to_owned(),
            event_type: event.event_type,
            user_id: event.user_id,
            newsletter_id: event.newsletter_id,
            article_id: event.article_id,
            session_id: event.session_id,
            metadata: event.metadata,
            created_at: now,
        };

        self.storage.insert_event(&row).await?;

        tracing::debug!(event_type = %row.event_type, id = %id, "engagement event recorded");

        Ok(RecordOutcome {
            accepted: true,
            id: Some(id),
        })
    }

    /// Distinct articles of `newsletter_id` the user has engaged with.
    pub async fn get_read_articles(
        &self,
        user_id: &str,
        newsletter_id: &str,
    ) -> Result<Vec<String>> {
        Ok(self
            .storage
            .find_read_articles(user_id, newsletter_id)
            .await?)
    }
}
