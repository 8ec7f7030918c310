//! Director runtime tests.
//!
//! All tests run with a paused tokio clock: the runtime auto-advances to
//! the next timer whenever every task is idle, so an 8 second caption
//! takes no wall time.

use std::time::Duration;

use broadcast_director::config::DirectorConfig;
use broadcast_director::engine::spawn;
use broadcast_director::error::Error;
use broadcast_director::event::{DirectorEvent, DirectorEventKind};
use broadcast_director::model::{EventKind, NormalizedEvent, PresenterState};
use tokio::sync::broadcast;
use tokio::time::Instant;

fn event(id: &str, kind: EventKind, priority: u8) -> NormalizedEvent {
    NormalizedEvent::new(id, kind, priority, format!("caption for {id}"))
}

/// Everything journalled so far, without waiting.
fn drain(journal: &mut broadcast::Receiver<DirectorEvent>) -> Vec<DirectorEvent> {
    let mut events = Vec::new();
    while let Ok(event) = journal.try_recv() {
        events.push(event);
    }
    events
}

fn started(events: &[DirectorEvent]) -> Vec<&str> {
    events.iter().filter_map(|e| e.kind.started_id()).collect()
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn fresh_director_is_idle() {
    let (director, task) = spawn(DirectorConfig::default());

    assert!(director.state().is_idle());
    director.idle().await.unwrap();

    director.shutdown();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn shutdown_closes_the_handle() {
    let (director, task) = spawn(DirectorConfig::default());

    director.shutdown();
    task.await.unwrap();

    assert!(director.is_closed());
    let err = director
        .enqueue(event("late", EventKind::IncidentNew, 2))
        .unwrap_err();
    assert!(matches!(err, Error::DirectorClosed));
    assert!(matches!(director.idle().await, Err(Error::DirectorClosed)));
}

#[tokio::test(start_paused = true)]
async fn stops_when_every_handle_is_dropped() {
    let (director, task) = spawn(DirectorConfig::default());
    let mut states = director.subscribe();

    drop(director);
    task.await.unwrap();
    assert!(states.changed().await.is_err());
}

#[tokio::test(start_paused = true)]
async fn handles_share_one_session() {
    let (director, task) = spawn(DirectorConfig::default());
    let other = director.clone();

    assert_eq!(director.session(), other.session());

    other.shutdown();
    task.await.unwrap();
}

// ---------------------------------------------------------------------------
// Narration
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn state_watch_follows_a_narration() {
    let (director, task) = spawn(DirectorConfig::default());
    let mut states = director.subscribe();

    let start = Instant::now();
    director
        .enqueue(NormalizedEvent::new(
            "n1",
            EventKind::IncidentNew,
            2,
            "New outage: X",
        ))
        .unwrap();

    states.changed().await.unwrap();
    let state = states.borrow_and_update().clone();
    assert_eq!(state.presenter_state, PresenterState::Alert);
    assert_eq!(state.caption_text.as_deref(), Some("New outage: X"));
    assert!(state.is_speaking);

    states.changed().await.unwrap();
    let state = states.borrow_and_update().clone();
    assert!(state.is_idle());
    assert!(!state.is_speaking);
    assert!(state.last_spoken_at.is_some());
    assert!(start.elapsed() >= Duration::from_millis(8000));

    director.idle().await.unwrap();
    director.shutdown();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn burst_plays_in_priority_order() {
    let (director, task) = spawn(DirectorConfig::default());
    let mut journal = director.journal();

    director.enqueue(event("A", EventKind::ContextChange, 5)).unwrap();
    director.enqueue(event("C", EventKind::IncidentResolved, 3)).unwrap();
    director.enqueue(event("B", EventKind::ManualAnnounce, 1)).unwrap();
    director.idle().await.unwrap();

    let events = drain(&mut journal);
    assert_eq!(started(&events), vec!["B", "C", "A"]);
    assert!(matches!(
        events.last().map(|e| &e.kind),
        Some(DirectorEventKind::WentIdle)
    ));

    director.shutdown();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn duplicates_are_journalled_and_skipped() {
    let (director, task) = spawn(DirectorConfig::default());
    let mut journal = director.journal();

    director.enqueue(event("dup", EventKind::IncidentUpdate, 4)).unwrap();
    director.enqueue(event("dup", EventKind::IncidentUpdate, 4)).unwrap();
    director.idle().await.unwrap();

    let events = drain(&mut journal);
    assert_eq!(started(&events), vec!["dup"]);
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e.kind, DirectorEventKind::Duplicate { .. }))
            .count(),
        1
    );

    director.shutdown();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn announcement_preempts_and_update_resumes() {
    let (director, task) = spawn(DirectorConfig::default());
    let mut journal = director.journal();
    let mut states = director.subscribe();

    director.enqueue(event("E", EventKind::IncidentUpdate, 4)).unwrap();
    states.changed().await.unwrap();
    assert_eq!(states.borrow_and_update().caption_text.as_deref(), Some("caption for E"));

    tokio::time::sleep(Duration::from_secs(2)).await;
    director
        .enqueue(event("M", EventKind::ManualAnnounce, 1).with_subtitle("Manual announcement"))
        .unwrap();

    // cut to idle first, then the announcement
    states.changed().await.unwrap();
    assert!(states.borrow_and_update().is_idle());
    states.changed().await.unwrap();
    let state = states.borrow_and_update().clone();
    assert_eq!(state.caption_text.as_deref(), Some("caption for M"));
    assert_eq!(state.subtitle_text.as_deref(), Some("Manual announcement"));

    director.idle().await.unwrap();
    let events = drain(&mut journal);
    assert_eq!(started(&events), vec!["E", "M", "E"]);
    assert!(events.iter().any(|e| matches!(
        &e.kind,
        DirectorEventKind::Preempted { interrupted, by, .. } if interrupted == "E" && by == "M"
    )));

    director.shutdown();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn shutdown_mid_narration_stops_promptly() {
    let (director, task) = spawn(DirectorConfig::default());
    let mut states = director.subscribe();

    director.enqueue(event("long", EventKind::IncidentNew, 2)).unwrap();
    states.changed().await.unwrap();
    assert!(states.borrow().is_speaking);

    let before = Instant::now();
    director.shutdown();
    task.await.unwrap();
    assert!(before.elapsed() < Duration::from_millis(8000));
}
