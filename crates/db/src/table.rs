use sea_query::Iden;

#[derive(Iden, Clone)]
pub enum RevokedToken {
    Table,
    TokenHash,
    UserId,
    IsRevoked,
    ExpiresAt,
    CreatedAt,
}

#[derive(Iden, Clone)]
pub enum EngagementEvent {
    Table,
    Id,
    EventType,
    UserId,
    NewsletterId,
    ArticleId,
    SessionId,
    Metadata,
    CreatedAt,
}

#[derive(Iden, Clone)]
pub enum AnalyticsSnapshot {
    Table,
    SnapshotDate,
    NewsletterId,
    ArticleId,
    ClassId,
    MetricName,
    MetricValue,
    UpdatedAt,
}

#[derive(Iden, Clone)]
pub enum TrackedLink {
    Table,
    Id,
    NewsletterId,
    ArticleId,
    Url,
    CreatedAt,
}

#[derive(Iden, Clone)]
pub enum NewsletterSend {
    Table,
    Id,
    NewsletterId,
    UserId,
    ClassId,
    SentAt,
}
