use std::sync::{Arc, Mutex};

use newsletter_tracking::{
    EventSink, EventType, MemorySessionStore, NewEvent, SessionInput, SessionState,
    SessionStore, SessionTracker,
};
use temp_dir::TempDir;
use time::Duration;

mod helpers;

#[derive(Default)]
struct CollectingSink(Mutex<Vec<NewEvent>>);

impl CollectingSink {
    fn take(&self) -> Vec<NewEvent> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

impl EventSink for CollectingSink {
    fn submit(&self, event: NewEvent) {
        self.0.lock().unwrap().push(event);
    }
}

fn input(enabled: bool) -> SessionInput {
    SessionInput {
        article_id: "a1".to_owned(),
        newsletter_id: Some("n1".to_owned()),
        week_number: "2025-W01".to_owned(),
        class_id: Some("c1".to_owned()),
        enabled,
    }
}

fn of_type(events: &[NewEvent], event_type: EventType) -> Vec<&NewEvent> {
    events
        .iter()
        .filter(|event| event.event_type == event_type)
        .collect()
}

#[tokio::test]
pub async fn test_page_lifecycle() -> anyhow::Result<()> {
    let clock = newsletter_tracking::ManualClock::at_secs(helpers::START);
    let sink = Arc::new(CollectingSink::default());
    let store = Arc::new(MemorySessionStore::default());
    let tracker = SessionTracker::new(store.clone(), sink.clone(), Arc::new(clock.clone()));

    let session = tracker.mount(input(true), Some("u1".to_owned()));
    assert_eq!(session.state(), SessionState::Active);

    let session_id = session.session_id().map(ToOwned::to_owned);
    assert_eq!(
        store.get(&SessionTracker::session_key("2025-W01")),
        session_id
    );

    let events = sink.take();
    let page_views = of_type(&events, EventType::PageView);
    assert_eq!(page_views.len(), 1);
    assert_eq!(page_views[0].article_id.as_deref(), Some("a1"));
    assert_eq!(page_views[0].user_id.as_deref(), Some("u1"));
    assert_eq!(page_views[0].session_id, session_id);
    assert_eq!(page_views[0].metadata["week_number"], "2025-W01");
    assert_eq!(page_views[0].metadata["class_id"], "c1");
    assert_eq!(of_type(&events, EventType::SessionStart).len(), 1);

    clock.advance(Duration::milliseconds(5000));
    session.unmount();

    let events = sink.take();
    let ends = of_type(&events, EventType::SessionEnd);
    assert_eq!(events.len(), 1);
    assert_eq!(ends[0].metadata["time_spent_seconds"], 5);

    Ok(())
}

#[tokio::test]
pub async fn test_session_id_is_reused_within_week() -> anyhow::Result<()> {
    let clock = newsletter_tracking::ManualClock::at_secs(helpers::START);
    let sink = Arc::new(CollectingSink::default());
    let tracker = SessionTracker::new(
        Arc::new(MemorySessionStore::default()),
        sink.clone(),
        Arc::new(clock),
    );

    let first = tracker.mount(input(true), Some("u1".to_owned()));
    let first_id = first.session_id().map(ToOwned::to_owned);
    drop(first);
    sink.take();

    let second = tracker.mount(input(true), Some("u1".to_owned()));
    assert_eq!(second.session_id().map(ToOwned::to_owned), first_id);

    let events = sink.take();
    assert!(of_type(&events, EventType::SessionStart).is_empty());
    assert_eq!(of_type(&events, EventType::PageView).len(), 1);

    Ok(())
}

#[tokio::test]
pub async fn test_scroll_milestones_fire_once() -> anyhow::Result<()> {
    let clock = newsletter_tracking::ManualClock::at_secs(helpers::START);
    let sink = Arc::new(CollectingSink::default());
    let tracker = SessionTracker::new(
        Arc::new(MemorySessionStore::default()),
        sink.clone(),
        Arc::new(clock),
    );

    let mut session = tracker.mount(input(true), None);
    sink.take();

    // 1000px viewport over a 4000px document
    session.on_scroll(500.0, 1000.0, 4000.0);
    assert!(sink.take().is_empty());

    session.on_scroll(1000.0, 1000.0, 4000.0);
    session.on_scroll(1200.0, 1000.0, 4000.0);
    session.on_scroll(0.0, 1000.0, 4000.0);
    session.on_scroll(1100.0, 1000.0, 4000.0);
    let events = sink.take();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::Scroll50);

    session.on_scroll(3000.0, 1000.0, 4000.0);
    session.on_scroll(2900.0, 1000.0, 4000.0);
    let events = sink.take();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::Scroll90);

    Ok(())
}

#[tokio::test]
pub async fn test_non_finite_scroll_keeps_milestones_live() -> anyhow::Result<()> {
    let clock = newsletter_tracking::ManualClock::at_secs(helpers::START);
    let sink = Arc::new(CollectingSink::default());
    let tracker = SessionTracker::new(
        Arc::new(MemorySessionStore::default()),
        sink.clone(),
        Arc::new(clock),
    );

    let mut session = tracker.mount(input(true), None);
    sink.take();

    session.on_scroll(f64::NAN, 1000.0, 4000.0);
    session.on_scroll(0.0, 1000.0, f64::NAN);
    assert!(sink.take().is_empty());

    session.on_scroll(1000.0, 1000.0, 4000.0);
    let events = sink.take();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::Scroll50);

    Ok(())
}

#[tokio::test]
pub async fn test_jump_to_bottom_fires_both_milestones() -> anyhow::Result<()> {
    let sink = Arc::new(CollectingSink::default());
    let tracker = SessionTracker::new(
        Arc::new(MemorySessionStore::default()),
        sink.clone(),
        Arc::new(newsletter_tracking::ManualClock::at_secs(helpers::START)),
    );

    let mut session = tracker.mount(input(true), Some("u1".to_owned()));
    sink.take();

    session.on_scroll(3000.0, 1000.0, 4000.0);
    let types = sink
        .take()
        .into_iter()
        .map(|event| event.event_type)
        .collect::<Vec<_>>();
    assert_eq!(types, vec![EventType::Scroll50, EventType::Scroll90]);

    Ok(())
}

#[tokio::test]
pub async fn test_disabled_page_emits_nothing() -> anyhow::Result<()> {
    let sink = Arc::new(CollectingSink::default());
    let store = Arc::new(MemorySessionStore::default());
    let tracker = SessionTracker::new(
        store.clone(),
        sink.clone(),
        Arc::new(newsletter_tracking::ManualClock::at_secs(helpers::START)),
    );

    let mut session = tracker.mount(input(false), Some("u1".to_owned()));
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(session.session_id(), None);

    session.on_scroll(3000.0, 1000.0, 4000.0);
    session.unmount();

    assert!(sink.take().is_empty());
    assert_eq!(store.get(&SessionTracker::session_key("2025-W01")), None);

    Ok(())
}

#[tokio::test]
pub async fn test_recorder_sink_persists_events() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let state = helpers::setup_test_state(dir.child("db.sqlite3")).await?;
    let tracker = state
        .tracking
        .session_tracker(Arc::new(MemorySessionStore::default()));

    let session = tracker.mount(input(true), Some("u1".to_owned()));
    state.clock.advance(Duration::seconds(30));
    session.unmount();

    let mut stored = 0;
    for _ in 0..100 {
        stored = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM engagement_event")
            .fetch_one(&state.pool)
            .await?;
        if stored == 3 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert_eq!(stored, 3);

    let articles = state.tracking.recorder.get_read_articles("u1", "n1").await?;
    assert_eq!(articles, vec!["a1".to_owned()]);

    Ok(())
}
