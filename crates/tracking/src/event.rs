use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString, VariantArray};
use validator::Validate;

/// Free-form event attributes, persisted as a JSON object.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

pub mod meta {
    pub const TIME_SPENT_SECONDS: &str = "time_spent_seconds";
    pub const WEEK_NUMBER: &str = "week_number";
    pub const CLASS_ID: &str = "class_id";
    pub const USER_AGENT: &str = "user_agent";
    pub const TARGET_URL: &str = "target_url";
    pub const LINK_ID: &str = "link_id";
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
    Hash,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PageView,
    #[strum(serialize = "scroll_50")]
    #[serde(rename = "scroll_50")]
    Scroll50,
    #[strum(serialize = "scroll_90")]
    #[serde(rename = "scroll_90")]
    Scroll90,
    LinkClick,
    EmailOpen,
    SessionStart,
    SessionEnd,
}

impl EventType {
    /// Whether an event of this type marks its article as read.
    pub fn counts_as_read(self) -> bool {
        matches!(
            self,
            EventType::PageView
                | EventType::Scroll50
                | EventType::Scroll90
                | EventType::LinkClick
                | EventType::SessionEnd
        )
    }
}

/// An event as submitted, before deduplication assigns it an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct NewEvent {
    pub event_type: EventType,
    #[validate(length(min = 1, max = 64))]
    pub user_id: Option<String>,
    #[validate(length(min = 1, max = 64))]
    pub newsletter_id: Option<String>,
    #[validate(length(min = 1, max = 64))]
    pub article_id: Option<String>,
    #[validate(length(min = 1, max = 64))]
    pub session_id: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl NewEvent {
    pub fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            user_id: None,
            newsletter_id: None,
            article_id: None,
            session_id: None,
            metadata: Metadata::new(),
        }
    }

    pub fn user(mut self, user_id: Option<impl Into<String>>) -> Self {
        self.user_id = user_id.map(Into::into);
        self
    }

    pub fn newsletter(mut self, newsletter_id: Option<impl Into<String>>) -> Self {
        self.newsletter_id = newsletter_id.map(Into::into);
        self
    }

    pub fn article(mut self, article_id: Option<impl Into<String>>) -> Self {
        self.article_id = article_id.map(Into::into);
        self
    }

    pub fn session(mut self, session_id: Option<impl Into<String>>) -> Self {
        self.session_id = session_id.map(Into::into);
        self
    }

    pub fn meta(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_owned(), value.into());
        self
    }
}

/// A persisted, immutable engagement event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngagementEvent {
    pub id: String,
    pub event_type: EventType,
    pub user_id: Option<String>,
    pub newsletter_id: Option<String>,
    pub article_id: Option<String>,
    pub session_id: Option<String>,
    pub metadata: Metadata,
    pub created_at: i64,
}

impl EngagementEvent {
    pub fn time_spent_seconds(&self) -> Option<f64> {
        self.metadata
            .get(meta::TIME_SPENT_SECONDS)
            .and_then(|value| value.as_f64())
    }

    pub fn class_id(&self) -> Option<&str> {
        self.metadata
            .get(meta::CLASS_ID)
            .and_then(|value| value.as_str())
    }
}

/// The tuple two events must share to be considered duplicates.
#[derive(Debug, Clone, Copy)]
pub struct DedupKey<'a> {
    pub event_type: EventType,
    pub user_id: &'a str,
    pub article_id: Option<&'a str>,
}
