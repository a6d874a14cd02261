//! Daily metric snapshots reduced from raw engagement events.

use std::{collections::HashSet, sync::Arc};

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString, VariantArray};
use time::{Date, OffsetDateTime, macros::format_description};

use crate::{
    Clock, EngagementEvent, EventType, Result,
    storage::{EventStorage, OutboundStorage, SnapshotStorage},
};

pub const MAX_RANGE_DAYS: i64 = 366;

const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotScope {
    pub newsletter_id: Option<String>,
    pub article_id: Option<String>,
    pub class_id: Option<String>,
}

impl SnapshotScope {
    /// Blank fields collapse to `None`; storage keys an absent field as ''.
    pub fn normalized(&self) -> Self {
        let field = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(ToOwned::to_owned)
        };

        Self {
            newsletter_id: field(&self.newsletter_id),
            article_id: field(&self.article_id),
            class_id: field(&self.class_id),
        }
    }
}

#[derive(
    EnumString,
    Display,
    AsRefStr,
    VariantArray,
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    OpenRate,
    ClickRate,
    AvgTimeSpent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsSnapshot {
    pub snapshot_date: String,
    #[serde(flatten)]
    pub scope: SnapshotScope,
    pub metric_name: Metric,
    pub metric_value: f64,
}

pub fn parse_date(value: &str) -> Result<Date> {
    match Date::parse(value, format_description!("[year]-[month]-[day]")) {
        Ok(date) => Ok(date),
        Err(_) => crate::invalid!("invalid date '{value}', expected YYYY-MM-DD"),
    }
}

pub fn format_date(date: Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

/// The UTC day before the clock's current day.
pub fn yesterday(clock: &dyn Clock) -> Result<Date> {
    let today = match OffsetDateTime::from_unix_timestamp(clock.now_secs()) {
        Ok(now) => now.date(),
        Err(err) => crate::invalid!("clock out of range: {err}"),
    };

    match today.previous_day() {
        Some(day) => Ok(day),
        None => crate::invalid!("no day before {today}"),
    }
}

pub struct SnapshotAggregator {
    events: Arc<dyn EventStorage>,
    snapshots: Arc<dyn SnapshotStorage>,
    outbound: Arc<dyn OutboundStorage>,
    clock: Arc<dyn Clock>,
}

impl SnapshotAggregator {
    pub fn new(
        events: Arc<dyn EventStorage>,
        snapshots: Arc<dyn SnapshotStorage>,
        outbound: Arc<dyn OutboundStorage>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            events,
            snapshots,
            outbound,
            clock,
        }
    }

    /// Recomputes and upserts every metric for each day of `from..=to`.
    /// Running it twice for the same inputs leaves the same rows behind.
    pub async fn regenerate(
        &self,
        from: Date,
        to: Date,
        scope: &SnapshotScope,
    ) -> Result<Vec<AnalyticsSnapshot>> {
        check_range(from, to)?;

        let scope = &scope.normalized();
        let now = self.clock.now_secs();
        let mut snapshots = vec![];
        let mut day = from;

        loop {
            let start = day.midnight().assume_utc().unix_timestamp();
            let end = start + SECONDS_PER_DAY;

            let events = self
                .events
                .find_events_between(
                    start,
                    end,
                    scope.newsletter_id.as_deref(),
                    scope.article_id.as_deref(),
                )
                .await?
                .into_iter()
                .filter(|event| match scope.class_id.as_deref() {
                    Some(class_id) => event.class_id() == Some(class_id),
                    None => true,
                })
                .collect::<Vec<_>>();

            let sent = self
                .outbound
                .count_sent(
                    scope.newsletter_id.as_deref(),
                    scope.class_id.as_deref(),
                    end,
                )
                .await?;

            for (metric, value) in compute_metrics(&events, sent) {
                let snapshot = AnalyticsSnapshot {
                    snapshot_date: format_date(day),
                    scope: scope.clone(),
                    metric_name: metric,
                    metric_value: value,
                };

                self.snapshots.upsert_snapshot(&snapshot, now).await?;
                snapshots.push(snapshot);
            }

            if day >= to {
                break;
            }

            let Some(next) = day.next_day() else {
                break;
            };
            day = next;
        }

        tracing::info!(
            from = %format_date(from),
            to = %format_date(to),
            rows = snapshots.len(),
            "analytics snapshots regenerated"
        );

        Ok(snapshots)
    }

    pub async fn list(
        &self,
        from: Date,
        to: Date,
        scope: &SnapshotScope,
    ) -> Result<Vec<AnalyticsSnapshot>> {
        check_range(from, to)?;

        Ok(self
            .snapshots
            .find_snapshots(&format_date(from), &format_date(to), &scope.normalized())
            .await?)
    }
}

fn check_range(from: Date, to: Date) -> Result<()> {
    if to < from {
        crate::invalid!("snapshot range ends before it starts");
    }

    if (to - from).whole_days() >= MAX_RANGE_DAYS {
        crate::invalid!("snapshot range is limited to {MAX_RANGE_DAYS} days");
    }

    Ok(())
}

fn compute_metrics(events: &[EngagementEvent], sent: u64) -> [(Metric, f64); 3] {
    let rate = |count: usize| {
        if sent == 0 {
            0.0
        } else {
            count as f64 / sent as f64
        }
    };

    let durations = events
        .iter()
        .filter(|event| event.event_type == EventType::SessionEnd)
        .filter_map(EngagementEvent::time_spent_seconds)
        .collect::<Vec<_>>();

    let avg_time_spent = if durations.is_empty() {
        0.0
    } else {
        durations.iter().sum::<f64>() / durations.len() as f64
    };

    [
        (
            Metric::OpenRate,
            rate(distinct_actors(events, EventType::EmailOpen)),
        ),
        (
            Metric::ClickRate,
            rate(distinct_actors(events, EventType::LinkClick)),
        ),
        (Metric::AvgTimeSpent, avg_time_spent),
    ]
}

/// Distinct users behind `event_type`; anonymous events count one each.
fn distinct_actors(events: &[EngagementEvent], event_type: EventType) -> usize {
    let mut users = HashSet::new();
    let mut anonymous = 0;

    for event in events.iter().filter(|event| event.event_type == event_type) {
        match event.user_id.as_deref() {
            Some(user_id) => {
                users.insert(user_id);
            }
            None => anonymous += 1,
        }
    }

    users.len() + anonymous
}

#[cfg(test)]
mod tests {
    use time::Month;

    use super::*;
    use crate::Metadata;

    fn event(event_type: EventType, user_id: Option<&str>, metadata: Metadata) -> EngagementEvent {
        EngagementEvent {
            id: ulid::Ulid::new().to_string(),
            event_type,
            user_id: user_id.map(ToOwned::to_owned),
            newsletter_id: Some("n1".to_owned()),
            article_id: None,
            session_id: None,
            metadata,
            created_at: 0,
        }
    }

    #[test]
    fn parse_and_format_dates() {
        let date = parse_date("2025-01-06").unwrap();

        assert_eq!(date, Date::from_calendar_date(2025, Month::January, 6).unwrap());
        assert_eq!(format_date(date), "2025-01-06");
        assert!(parse_date("06/01/2025").is_err());
    }

    #[test]
    fn range_must_be_ordered_and_bounded() {
        let from = parse_date("2025-01-10").unwrap();

        assert!(check_range(from, parse_date("2025-01-09").unwrap()).is_err());
        assert!(check_range(from, from).is_ok());
        assert!(check_range(from, parse_date("2026-01-11").unwrap()).is_err());
    }

    #[test]
    fn blank_scope_fields_are_absent() {
        let scope = SnapshotScope {
            newsletter_id: Some(String::new()),
            article_id: Some("  ".to_owned()),
            class_id: Some("c1".to_owned()),
        };

        let normalized = scope.normalized();

        assert_eq!(normalized.newsletter_id, None);
        assert_eq!(normalized.article_id, None);
        assert_eq!(normalized.class_id.as_deref(), Some("c1"));
    }

    #[test]
    fn rates_count_distinct_users() {
        let mut spent = Metadata::new();
        spent.insert("time_spent_seconds".to_owned(), 30.into());
        let mut spent_more = Metadata::new();
        spent_more.insert("time_spent_seconds".to_owned(), 90.into());

        let events = vec![
            event(EventType::EmailOpen, Some("u1"), Metadata::new()),
            event(EventType::EmailOpen, Some("u1"), Metadata::new()),
            event(EventType::EmailOpen, Some("u2"), Metadata::new()),
            event(EventType::EmailOpen, None, Metadata::new()),
            event(EventType::LinkClick, Some("u2"), Metadata::new()),
            event(EventType::SessionEnd, Some("u1"), spent),
            event(EventType::SessionEnd, Some("u2"), spent_more),
        ];

        let metrics = compute_metrics(&events, 10);

        assert_eq!(metrics[0], (Metric::OpenRate, 0.3));
        assert_eq!(metrics[1], (Metric::ClickRate, 0.1));
        assert_eq!(metrics[2], (Metric::AvgTimeSpent, 60.0));
    }

    #[test]
    fn nothing_sent_yields_zero_rates() {
        let events = vec![event(EventType::EmailOpen, Some("u1"), Metadata::new())];

        let metrics = compute_metrics(&events, 0);

        assert_eq!(metrics[0].1, 0.0);
        assert_eq!(metrics[2].1, 0.0);
    }
}
