use async_trait::async_trait;
use newsletter_db::table::{
    AnalyticsSnapshot as SnapshotTable, EngagementEvent as EventTable, NewsletterSend,
    RevokedToken as RevokedTable, TrackedLink as LinkTable,
};
use sea_query::{Expr, ExprTrait, OnConflict, Order, Query, SqliteQueryBuilder};
use sea_query_sqlx::SqlxBinder;
use sqlx::{SqlitePool, prelude::FromRow};
use strum::VariantArray;

use super::{EventStorage, OutboundStorage, RevocationStorage, SnapshotStorage};
use crate::{
    AnalyticsSnapshot, DedupKey, EngagementEvent, EventType, Metric, RevokedToken,
    SnapshotScope, TrackedLink,
};

/// SQLite backed storage. Reads go to `read_db`, every write to `write_db`.
#[derive(Clone)]
pub struct SqliteStorage {
    pub read_db: SqlitePool,
    pub write_db: SqlitePool,
}

impl SqliteStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            read_db: pool.clone(),
            write_db: pool,
        }
    }

    pub fn with_pools(read_db: SqlitePool, write_db: SqlitePool) -> Self {
        Self { read_db, write_db }
    }
}

#[async_trait]
impl RevocationStorage for SqliteStorage {
    async fn find_revocation(&self, token_hash: &str) -> anyhow::Result<Option<RevokedToken>> {
        let statement = Query::select()
            .columns([
                RevokedTable::TokenHash,
                RevokedTable::UserId,
                RevokedTable::IsRevoked,
                RevokedTable::ExpiresAt,
                RevokedTable::CreatedAt,
            ])
            .from(RevokedTable::Table)
            .and_where(Expr::col(RevokedTable::TokenHash).eq(token_hash))
            .limit(1)
            .to_owned();

        let (sql, values) = statement.build_sqlx(SqliteQueryBuilder);

        Ok(sqlx::query_as_with::<_, RevokedToken, _>(&sql, values)
            .fetch_optional(&self.read_db)
            .await?)
    }

    async fn upsert_revocation(&self, record: &RevokedToken) -> anyhow::Result<()> {
        let statement = Query::insert()
            .into_table(RevokedTable::Table)
            .columns([
                RevokedTable::TokenHash,
                RevokedTable::UserId,
                RevokedTable::IsRevoked,
                RevokedTable::ExpiresAt,
                RevokedTable::CreatedAt,
            ])
            .values([
                record.token_hash.to_owned().into(),
                record.user_id.to_owned().into(),
                record.is_revoked.into(),
                record.expires_at.into(),
                record.created_at.into(),
            ])?
            .on_conflict(
                OnConflict::column(RevokedTable::TokenHash)
                    .update_column(RevokedTable::IsRevoked)
                    .to_owned(),
            )
            .to_owned();

        let (sql, values) = statement.build_sqlx(SqliteQueryBuilder);
        sqlx::query_with(&sql, values).execute(&self.write_db).await?;

        Ok(())
    }

    async fn insert_known_token(&self, record: &RevokedToken) -> anyhow::Result<()> {
        let statement = Query::insert()
            .into_table(RevokedTable::Table)
            .columns([
                RevokedTable::TokenHash,
                RevokedTable::UserId,
                RevokedTable::IsRevoked,
                RevokedTable::ExpiresAt,
                RevokedTable::CreatedAt,
            ])
            .values([
                record.token_hash.to_owned().into(),
                record.user_id.to_owned().into(),
                record.is_revoked.into(),
                record.expires_at.into(),
                record.created_at.into(),
            ])?
            .on_conflict(
                OnConflict::column(RevokedTable::TokenHash)
                    .do_nothing()
                    .to_owned(),
            )
            .to_owned();

        let (sql, values) = statement.build_sqlx(SqliteQueryBuilder);
        sqlx::query_with(&sql, values).execute(&self.write_db).await?;

        Ok(())
    }

    async fn revoke_for_user(&self, user_id: &str, now: i64) -> anyhow::Result<u64> {
        let statement = Query::update()
            .table(RevokedTable::Table)
            .value(RevokedTable::IsRevoked, true)
            .and_where(Expr::col(RevokedTable::UserId).eq(user_id))
            .and_where(Expr::col(RevokedTable::IsRevoked).eq(false))
            .and_where(Expr::col(RevokedTable::ExpiresAt).gte(now))
            .to_owned();

        let (sql, values) = statement.build_sqlx(SqliteQueryBuilder);
        let result = sqlx::query_with(&sql, values)
            .execute(&self.write_db)
            .await?;

        Ok(result.rows_affected())
    }

    async fn prune_revocations(&self, now: i64) -> anyhow::Result<u64> {
        let statement = Query::delete()
            .from_table(RevokedTable::Table)
            .and_where(Expr::col(RevokedTable::ExpiresAt).lt(now))
            .to_owned();

        let (sql, values) = statement.build_sqlx(SqliteQueryBuilder);
        let result = sqlx::query_with(&sql, values)
            .execute(&self.write_db)
            .await?;

        Ok(result.rows_affected())
    }
}

#[derive(FromRow)]
struct EventRow {
    id: String,
    event_type: sqlx::types::Text<EventType>,
    user_id: Option<String>,
    newsletter_id: Option<String>,
    article_id: Option<String>,
    session_id: Option<String>,
    metadata: String,
    created_at: i64,
}

impl TryFrom<EventRow> for EngagementEvent {
    type Error = serde_json::Error;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        Ok(EngagementEvent {
            id: row.id,
            event_type: row.event_type.0,
            user_id: row.user_id,
            newsletter_id: row.newsletter_id,
            article_id: row.article_id,
            session_id: row.session_id,
            metadata: serde_json::from_str(&row.metadata)?,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl EventStorage for SqliteStorage {
    async fn find_recent_event(
        &self,
        key: DedupKey<'_>,
        since: i64,
    ) -> anyhow::Result<Option<String>> {
        let mut statement = Query::select()
            .column(EventTable::Id)
            .from(EventTable::Table)
            .and_where(Expr::col(EventTable::EventType).eq(key.event_type.to_string()))
            .and_where(Expr::col(EventTable::UserId).eq(key.user_id))
            .and_where(Expr::col(EventTable::CreatedAt).gte(since))
            .order_by(EventTable::CreatedAt, Order::Desc)
            .limit(1)
            .to_owned();

        match key.article_id {
            Some(article_id) => {
                statement.and_where(Expr::col(EventTable::ArticleId).eq(article_id));
            }
            None => {
                statement.and_where(Expr::col(EventTable::ArticleId).is_null());
            }
        }

        let (sql, values) = statement.build_sqlx(SqliteQueryBuilder);

        Ok(sqlx::query_scalar_with::<_, String, _>(&sql, values)
            .fetch_optional(&self.read_db)
            .await?)
    }

    async fn insert_event(&self, event: &EngagementEvent) -> anyhow::Result<()> {
        let metadata = serde_json::to_string(&event.metadata)?;
        let statement = Query::insert()
            .into_table(EventTable::Table)
            .columns([
                EventTable::Id,
                EventTable::EventType,
                EventTable::UserId,
                EventTable::NewsletterId,
                EventTable::ArticleId,
                EventTable::SessionId,
                EventTable::Metadata,
                EventTable::CreatedAt,
            ])
            .values([
                event.id.to_owned().into(),
                event.event_type.to_string().into(),
                event.user_id.to_owned().into(),
                event.newsletter_id.to_owned().into(),
                event.article_id.to_owned().into(),
                event.session_id.to_owned().into(),
                metadata.into(),
                event.created_at.into(),
            ])?
            .to_owned();

        let (sql, values) = statement.build_sqlx(SqliteQueryBuilder);
        sqlx::query_with(&sql, values).execute(&self.write_db).await?;

        Ok(())
    }

    async fn find_read_articles(
        &self,
        user_id: &str,
        newsletter_id: &str,
    ) -> anyhow::Result<Vec<String>> {
        let read_types = EventType::VARIANTS
            .iter()
            .filter(|event_type| event_type.counts_as_read())
            .map(|event_type| event_type.to_string());

        let statement = Query::select()
            .distinct()
            .column(EventTable::ArticleId)
            .from(EventTable::Table)
            .and_where(Expr::col(EventTable::UserId).eq(user_id))
            .and_where(Expr::col(EventTable::NewsletterId).eq(newsletter_id))
            .and_where(Expr::col(EventTable::ArticleId).is_not_null())
            .and_where(Expr::col(EventTable::EventType).is_in(read_types))
            .order_by(EventTable::ArticleId, Order::Asc)
            .to_owned();

        let (sql, values) = statement.build_sqlx(SqliteQueryBuilder);

        Ok(sqlx::query_scalar_with::<_, String, _>(&sql, values)
            .fetch_all(&self.read_db)
            .await?)
    }

    async fn find_events_between(
        &self,
        from: i64,
        to: i64,
        newsletter_id: Option<&str>,
        article_id: Option<&str>,
    ) -> anyhow::Result<Vec<EngagementEvent>> {
        let mut statement = Query::select()
            .columns([
                EventTable::Id,
                EventTable::EventType,
                EventTable::UserId,
                EventTable::NewsletterId,
                EventTable::ArticleId,
                EventTable::SessionId,
                EventTable::Metadata,
                EventTable::CreatedAt,
            ])
            .from(EventTable::Table)
            .and_where(Expr::col(EventTable::CreatedAt).gte(from))
            .and_where(Expr::col(EventTable::CreatedAt).lt(to))
            .order_by(EventTable::CreatedAt, Order::Asc)
            .to_owned();

        if let Some(newsletter_id) = newsletter_id {
            statement.and_where(Expr::col(EventTable::NewsletterId).eq(newsletter_id));
        }

        if let Some(article_id) = article_id {
            statement.and_where(Expr::col(EventTable::ArticleId).eq(article_id));
        }

        let (sql, values) = statement.build_sqlx(SqliteQueryBuilder);
        let rows = sqlx::query_as_with::<_, EventRow, _>(&sql, values)
            .fetch_all(&self.read_db)
            .await?;

        Ok(rows
            .into_iter()
            .map(EngagementEvent::try_from)
            .collect::<Result<Vec<_>, _>>()?)
    }
}

#[derive(FromRow)]
struct SnapshotRow {
    snapshot_date: String,
    newsletter_id: String,
    article_id: String,
    class_id: String,
    metric_name: sqlx::types::Text<Metric>,
    metric_value: f64,
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

impl From<SnapshotRow> for AnalyticsSnapshot {
    fn from(row: SnapshotRow) -> Self {
        AnalyticsSnapshot {
            snapshot_date: row.snapshot_date,
            scope: SnapshotScope {
                newsletter_id: non_empty(row.newsletter_id),
                article_id: non_empty(row.article_id),
                class_id: non_empty(row.class_id),
            },
            metric_name: row.metric_name.0,
            metric_value: row.metric_value,
        }
    }
}

#[async_trait]
impl SnapshotStorage for SqliteStorage {
    async fn upsert_snapshot(&self, snapshot: &AnalyticsSnapshot, now: i64) -> anyhow::Result<()> {
        let scope = &snapshot.scope;
        let statement = Query::insert()
            .into_table(SnapshotTable::Table)
            .columns([
                SnapshotTable::SnapshotDate,
                SnapshotTable::NewsletterId,
                SnapshotTable::ArticleId,
                SnapshotTable::ClassId,
                SnapshotTable::MetricName,
                SnapshotTable::MetricValue,
                SnapshotTable::UpdatedAt,
            ])
            .values([
                snapshot.snapshot_date.to_owned().into(),
                scope.newsletter_id.to_owned().unwrap_or_default().into(),
                scope.article_id.to_owned().unwrap_or_default().into(),
                scope.class_id.to_owned().unwrap_or_default().into(),
                snapshot.metric_name.to_string().into(),
                snapshot.metric_value.into(),
                now.into(),
            ])?
            .on_conflict(
                OnConflict::columns([
                    SnapshotTable::SnapshotDate,
                    SnapshotTable::NewsletterId,
                    SnapshotTable::ArticleId,
                    SnapshotTable::ClassId,
                    SnapshotTable::MetricName,
                ])
                .update_columns([SnapshotTable::MetricValue, SnapshotTable::UpdatedAt])
                .to_owned(),
            )
            .to_owned();

        let (sql, values) = statement.build_sqlx(SqliteQueryBuilder);
        sqlx::query_with(&sql, values).execute(&self.write_db).await?;

        Ok(())
    }

    async fn find_snapshots(
        &self,
        from: &str,
        to: &str,
        scope: &SnapshotScope,
    ) -> anyhow::Result<Vec<AnalyticsSnapshot>> {
        let statement = Query::select()
            .columns([
                SnapshotTable::SnapshotDate,
                SnapshotTable::NewsletterId,
                SnapshotTable::ArticleId,
                SnapshotTable::ClassId,
                SnapshotTable::MetricName,
                SnapshotTable::MetricValue,
            ])
            .from(SnapshotTable::Table)
            .and_where(Expr::col(SnapshotTable::SnapshotDate).gte(from))
            .and_where(Expr::col(SnapshotTable::SnapshotDate).lte(to))
            .and_where(
                Expr::col(SnapshotTable::NewsletterId)
                    .eq(scope.newsletter_id.to_owned().unwrap_or_default()),
            )
            .and_where(
                Expr::col(SnapshotTable::ArticleId)
                    .eq(scope.article_id.to_owned().unwrap_or_default()),
            )
            .and_where(
                Expr::col(SnapshotTable::ClassId).eq(scope.class_id.to_owned().unwrap_or_default()),
            )
            .order_by(SnapshotTable::SnapshotDate, Order::Asc)
            .order_by(SnapshotTable::MetricName, Order::Asc)
            .to_owned();

        let (sql, values) = statement.build_sqlx(SqliteQueryBuilder);
        let rows = sqlx::query_as_with::<_, SnapshotRow, _>(&sql, values)
            .fetch_all(&self.read_db)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl OutboundStorage for SqliteStorage {
    async fn insert_link(&self, link: &TrackedLink) -> anyhow::Result<()> {
        let statement = Query::insert()
            .into_table(LinkTable::Table)
            .columns([
                LinkTable::Id,
                LinkTable::NewsletterId,
                LinkTable::ArticleId,
                LinkTable::Url,
                LinkTable::CreatedAt,
            ])
            .values([
                link.id.to_owned().into(),
                link.newsletter_id.to_owned().into(),
                link.article_id.to_owned().into(),
                link.url.to_owned().into(),
                link.created_at.into(),
            ])?
            .to_owned();

        let (sql, values) = statement.build_sqlx(SqliteQueryBuilder);
        sqlx::query_with(&sql, values).execute(&self.write_db).await?;

        Ok(())
    }

    async fn find_link(&self, id: &str) -> anyhow::Result<Option<TrackedLink>> {
        let statement = Query::select()
            .columns([
                LinkTable::Id,
                LinkTable::NewsletterId,
                LinkTable::ArticleId,
                LinkTable::Url,
                LinkTable::CreatedAt,
            ])
            .from(LinkTable::Table)
            .and_where(Expr::col(LinkTable::Id).eq(id))
            .limit(1)
            .to_owned();

        let (sql, values) = statement.build_sqlx(SqliteQueryBuilder);

        Ok(sqlx::query_as_with::<_, TrackedLink, _>(&sql, values)
            .fetch_optional(&self.read_db)
            .await?)
    }

    async fn insert_send(
        &self,
        id: &str,
        newsletter_id: &str,
        user_id: &str,
        class_id: Option<&str>,
        sent_at: i64,
    ) -> anyhow::Result<()> {
        let statement = Query::insert()
            .into_table(NewsletterSend::Table)
            .columns([
                NewsletterSend::Id,
                NewsletterSend::NewsletterId,
                NewsletterSend::UserId,
                NewsletterSend::ClassId,
                NewsletterSend::SentAt,
            ])
            .values([
                id.into(),
                newsletter_id.into(),
                user_id.into(),
                class_id.map(ToOwned::to_owned).into(),
                sent_at.into(),
            ])?
            .on_conflict(
                OnConflict::columns([NewsletterSend::NewsletterId, NewsletterSend::UserId])
                    .do_nothing()
                    .to_owned(),
            )
            .to_owned();

        let (sql, values) = statement.build_sqlx(SqliteQueryBuilder);
        sqlx::query_with(&sql, values).execute(&self.write_db).await?;

        Ok(())
    }

    async fn count_sent(
        &self,
        newsletter_id: Option<&str>,
        class_id: Option<&str>,
        before: i64,
    ) -> anyhow::Result<u64> {
        let mut statement = Query::select()
            .expr(Expr::cust("COUNT(DISTINCT \"user_id\")"))
            .from(NewsletterSend::Table)
            .and_where(Expr::col(NewsletterSend::SentAt).lt(before))
            .to_owned();

        if let Some(newsletter_id) = newsletter_id {
            statement.and_where(Expr::col(NewsletterSend::NewsletterId).eq(newsletter_id));
        }

        if let Some(class_id) = class_id {
            statement.and_where(Expr::col(NewsletterSend::ClassId).eq(class_id));
        }

        let (sql, values) = statement.build_sqlx(SqliteQueryBuilder);
        let count = sqlx::query_scalar_with::<_, i64, _>(&sql, values)
            .fetch_one(&self.read_db)
            .await?;

        Ok(u64::try_from(count).unwrap_or_default())
    }
}
