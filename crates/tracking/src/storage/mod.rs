//! Storage seams for the tracking pipeline.
//!
//! Verifier, recorder and aggregator only talk to these traits; the SQLite
//! implementation lives in [`sqlite`]. Every write is a single-row insert or
//! upsert, so no in-process locking is needed on top of the database.

use async_trait::async_trait;

use crate::{
    AnalyticsSnapshot, DedupKey, EngagementEvent, RevokedToken, SnapshotScope, TrackedLink,
};

mod sqlite;

pub use sqlite::SqliteStorage;

#[async_trait]
pub trait RevocationStorage: Send + Sync {
    async fn find_revocation(&self, token_hash: &str) -> anyhow::Result<Option<RevokedToken>>;

    /// Inserts the record or overwrites `is_revoked` on an existing one.
    async fn upsert_revocation(&self, record: &RevokedToken) -> anyhow::Result<()>;

    /// Inserts the record only if its hash is unknown.
    async fn insert_known_token(&self, record: &RevokedToken) -> anyhow::Result<()>;

    /// Flags every unexpired, unrevoked token of `user_id`; returns how many.
    async fn revoke_for_user(&self, user_id: &str, now: i64) -> anyhow::Result<u64>;

    /// Deletes records whose `expires_at` is before `now`.
    async fn prune_revocations(&self, now: i64) -> anyhow::Result<u64>;
}

#[async_trait]
pub trait EventStorage: Send + Sync {
    /// Id of the newest event matching `key` created at or after `since`.
    async fn find_recent_event(
        &self,
        key: DedupKey<'_>,
        since: i64,
    ) -> anyhow::Result<Option<String>>;

    async fn insert_event(&self, event: &EngagementEvent) -> anyhow::Result<()>;

    async fn find_read_articles(
        &self,
        user_id: &str,
        newsletter_id: &str,
    ) -> anyhow::Result<Vec<String>>;

    /// Events with `from <= created_at < to`, narrowed by newsletter/article.
    async fn find_events_between(
        &self,
        from: i64,
        to: i64,
        newsletter_id: Option<&str>,
        article_id: Option<&str>,
    ) -> anyhow::Result<Vec<EngagementEvent>>;
}

#[async_trait]
pub trait SnapshotStorage: Send + Sync {
    async fn upsert_snapshot(&self, snapshot: &AnalyticsSnapshot, now: i64) -> anyhow::Result<()>;

    /// Snapshots of exactly `scope` with `from <= snapshot_date <= to`.
    async fn find_snapshots(
        &self,
        from: &str,
        to: &str,
        scope: &SnapshotScope,
    ) -> anyhow::Result<Vec<AnalyticsSnapshot>>;
}

#[async_trait]
pub trait OutboundStorage: Send + Sync {
    async fn insert_link(&self, link: &TrackedLink) -> anyhow::Result<()>;

    async fn find_link(&self, id: &str) -> anyhow::Result<Option<TrackedLink>>;

    /// Records a delivery; repeated sends to the same recipient are ignored.
    async fn insert_send(
        &self,
        id: &str,
        newsletter_id: &str,
        user_id: &str,
        class_id: Option<&str>,
        sent_at: i64,
    ) -> anyhow::Result<()>;

    /// Distinct recipients sent before `before`, narrowed by newsletter/class.
    async fn count_sent(
        &self,
        newsletter_id: Option<&str>,
        class_id: Option<&str>,
        before: i64,
    ) -> anyhow::Result<u64>;
}
