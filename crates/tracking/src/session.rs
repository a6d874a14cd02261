//! Page-level session lifecycle.
//!
//! A [`PageSession`] is created when a tracked page mounts and walks
//! `Idle -> Active -> Terminated`. Every transition hands an event to an
//! [`EventSink`] and returns immediately; submission failures never reach
//! the caller.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use serde::Deserialize;
use ulid::Ulid;

use crate::{Clock, EventRecorder, EventType, NewEvent, event::meta};

/// Inputs of a tracked page.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SessionInput {
    pub article_id: String,
    #[serde(default)]
    pub newsletter_id: Option<String>,
    pub week_number: String,
    #[serde(default)]
    pub class_id: Option<String>,
    pub enabled: bool,
}

/// Client-local key/value storage holding session ids.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
}

#[derive(Debug, Default)]
pub struct MemorySessionStore(Mutex<HashMap<String, String>>);

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> Option<String> {
        self.0.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        if let Ok(mut entries) = self.0.lock() {
            entries.insert(key.to_owned(), value.to_owned());
        }
    }
}

/// Fire-and-forget destination for emitted events.
pub trait EventSink: Send + Sync {
    fn submit(&self, event: NewEvent);
}

/// Hands events to an [`EventRecorder`] on a background task.
pub struct RecorderSink {
    recorder: Arc<EventRecorder>,
}

impl RecorderSink {
    pub fn new(recorder: Arc<EventRecorder>) -> Self {
        Self { recorder }
    }
}

impl EventSink for RecorderSink {
    fn submit(&self, event: NewEvent) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(event_type = %event.event_type, "no runtime, engagement event dropped");
            return;
        };

        let recorder = self.recorder.clone();
        handle.spawn(async move {
            if let Err(err) = recorder.record(event).await {
                tracing::warn!(err = %err, "failed to submit engagement event");
            }
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Active,
    Terminated,
}

pub struct SessionTracker {
    store: Arc<dyn SessionStore>,
    sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
}

impl SessionTracker {
    pub fn new(
        store: Arc<dyn SessionStore>,
        sink: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { store, sink, clock }
    }

    /// Storage key of the session id for a given week.
    pub fn session_key(week_number: &str) -> String {
        format!("tracking-session:{week_number}")
    }

    pub fn mount(&self, input: SessionInput, user_id: Option<String>) -> PageSession {
        let mut page = PageSession {
            sink: self.sink.clone(),
            clock: self.clock.clone(),
            session_id: None,
            user_id,
            mounted_at: self.clock.now_millis(),
            max_depth: 0.0,
            state: SessionState::Idle,
            input,
        };

        if !page.input.enabled {
            return page;
        }

        let key = Self::session_key(&page.input.week_number);
        let (session_id, created) = match self.store.get(&key) {
            Some(id) => (id, false),
            None => {
                let id = Ulid::new().to_string();
                self.store.set(&key, &id);
                (id, true)
            }
        };

        page.session_id = Some(session_id);
        page.state = SessionState::Active;

        if created {
            page.emit(EventType::SessionStart, None);
        }
        page.emit(EventType::PageView, None);

        page
    }
}

pub struct PageSession {
    sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    input: SessionInput,
    user_id: Option<String>,
    session_id: Option<String>,
    mounted_at: i64,
    max_depth: f64,
    state: SessionState,
}

impl PageSession {
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Feeds a scroll position; each milestone fires once per mount.
    pub fn on_scroll(&mut self, scroll_top: f64, viewport_height: f64, document_height: f64) {
        if self.state != SessionState::Active {
            return;
        }

        let Some(depth) = scroll_depth(scroll_top, viewport_height, document_height) else {
            return;
        };
        let previous = self.max_depth;
        if depth <= previous {
            return;
        }
        self.max_depth = depth;

        if previous < 50.0 && depth >= 50.0 {
            self.emit(EventType::Scroll50, None);
        }
        if previous < 90.0 && depth >= 90.0 {
            self.emit(EventType::Scroll90, None);
        }
    }

    /// Ends the session. Dropping an active session does the same.
    pub fn unmount(mut self) {
        self.terminate();
    }

    fn terminate(&mut self) {
        if self.state != SessionState::Active {
            return;
        }

        let elapsed = (self.clock.now_millis() - self.mounted_at).max(0);
        let time_spent_seconds = (elapsed as f64 / 1000.0).round() as i64;

        self.emit(
            EventType::SessionEnd,
            Some((meta::TIME_SPENT_SECONDS, time_spent_seconds.into())),
        );
        self.state = SessionState::Terminated;
    }

    fn emit(&self, event_type: EventType, extra: Option<(&str, serde_json::Value)>) {
        let mut event = NewEvent::new(event_type)
            .user(self.user_id.as_deref())
            .newsletter(self.input.newsletter_id.as_deref())
            .article(Some(self.input.article_id.as_str()))
            .session(self.session_id.as_deref())
            .meta(meta::WEEK_NUMBER, self.input.week_number.as_str());

        if let Some(class_id) = self.input.class_id.as_deref() {
            event = event.meta(meta::CLASS_ID, class_id);
        }
        if let Some((key, value)) = extra {
            event = event.meta(key, value);
        }

        self.sink.submit(event);
    }
}

impl Drop for PageSession {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Percentage of the document seen once the viewport bottom reaches
/// `scroll_top + viewport_height`. `None` for non-finite measurements.
pub fn scroll_depth(scroll_top: f64, viewport_height: f64, document_height: f64) -> Option<f64> {
    if ![scroll_top, viewport_height, document_height]
        .iter()
        .all(|value| value.is_finite())
    {
        return None;
    }

    if document_height <= viewport_height {
        return Some(100.0);
    }

    Some(((scroll_top + viewport_height) / document_height * 100.0).clamp(0.0, 100.0))
}
