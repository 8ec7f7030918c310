//! The director: turns a stream of normalized events into one orderly
//! narration at a time.
//!
//! The director is a plain state machine. It never sleeps and never reads
//! the clock; every mutating call takes the current instant, and the only
//! delayed work is a single pending [`Timer`] whose deadline the caller
//! waits for before calling [`Director::poll`]. Each scheduling cycle bumps
//! a cancellation token, and a timer only acts if its token is still the
//! current one.
//!
//! Starting from idle is itself a zero-delay timer, so events that arrive
//! at the same instant are ordered by priority before the first one plays.

use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use tokio::time::Instant;
use tracing::{Span, debug, info, trace};

use crate::config::DirectorConfig;
use crate::event::{DirectorEvent, DirectorEventKind};
use crate::model::{DirectorState, EventKind, NormalizedEvent, PresenterState};
use crate::telemetry::{metrics, narration};

use super::queue::NarrationQueue;
use super::seen::SeenIds;

// ---------------------------------------------------------------------------
// Timers
// ---------------------------------------------------------------------------

/// Which delayed continuation a timer represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// The active caption's display time ran out.
    Display,
    /// The idle beat after a caption is over; pick the next event.
    Gap,
    /// The fade after a preemption is over; start the announcement.
    Settle,
    /// The director was idle when an event arrived; start at once.
    Start,
}

impl TimerKind {
    fn as_str(self) -> &'static str {
        match self {
            TimerKind::Display => "display",
            TimerKind::Gap => "gap",
            TimerKind::Settle => "settle",
            TimerKind::Start => "start",
        }
    }
}

/// A cancellable delayed continuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timer {
    pub kind: TimerKind,
    pub token: u64,
    pub deadline: Instant,
}

/// Outcome of [`Director::enqueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Queued; starts at the same instant if the director was idle.
    Admitted,
    /// Cut the active narration short; plays after the settle delay.
    Preempting,
    /// Id already seen. Nothing changed.
    Duplicate,
}

impl Admission {
    fn as_str(self) -> &'static str {
        match self {
            Admission::Admitted => "admitted",
            Admission::Preempting => "preempting",
            Admission::Duplicate => "duplicate",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Narrating,
    Gap,
    /// Waiting on a settle or start timer to pick the next event.
    Pending,
}

/// The narration currently on screen.
struct Active {
    event: NormalizedEvent,
    started: Instant,
    span: Span,
}

/// An event cut short by an announcement, kept for possible replay.
struct Interrupted {
    event: NormalizedEvent,
    /// The announcement that cut it short. Only a different announcement
    /// starting supersedes the replay.
    by: String,
}

// ---------------------------------------------------------------------------
// Director
// ---------------------------------------------------------------------------

/// The director. Owns the queue, the screen state and the single pending
/// timer, and enforces every ordering rule.
pub struct Director {
    config: DirectorConfig,
    queue: NarrationQueue,
    seen: SeenIds,
    phase: Phase,
    active: Option<Active>,
    interrupted: Option<Interrupted>,
    token: u64,
    timer: Option<Timer>,
    state: DirectorState,
    journal: Vec<DirectorEvent>,
    seq: u64,
    /// `origin` on the injected clock corresponds to `epoch` on the wall.
    origin: Instant,
    epoch: DateTime<Utc>,
}

impl Director {
    pub fn new(config: DirectorConfig) -> Self {
        Self::anchored(config, Instant::now(), Utc::now())
    }

    /// A director whose journal timestamps read `epoch` at `origin` and
    /// advance with the instants passed in, never with the wall clock.
    pub fn anchored(config: DirectorConfig, origin: Instant, epoch: DateTime<Utc>) -> Self {
        let seen = SeenIds::new(config.dedup_retention(), config.dedup_capacity);
        Self {
            config,
            queue: NarrationQueue::new(),
            seen,
            phase: Phase::Idle,
            active: None,
            interrupted: None,
            token: 0,
            timer: None,
            state: DirectorState::default(),
            journal: Vec::new(),
            seq: 0,
            origin,
            epoch,
        }
    }

    /// Current on-screen state.
    pub fn state(&self) -> &DirectorState {
        &self.state
    }

    pub fn config(&self) -> &DirectorConfig {
        &self.config
    }

    /// Number of events waiting to be narrated.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Ids waiting to be narrated, in play order.
    pub fn pending_ids(&self) -> Vec<String> {
        self.queue.ids().map(str::to_string).collect()
    }

    /// Id of the event on screen, if any.
    pub fn active_id(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.event.id.as_str())
    }

    /// Id of the event remembered for replay after an announcement.
    pub fn interrupted_id(&self) -> Option<&str> {
        self.interrupted.as_ref().map(|i| i.event.id.as_str())
    }

    /// Current cancellation token.
    pub fn token(&self) -> u64 {
        self.token
    }

    /// The pending timer, if any.
    pub fn pending_timer(&self) -> Option<Timer> {
        self.timer
    }

    /// Nothing on screen, queued, or scheduled.
    pub fn is_quiescent(&self) -> bool {
        self.phase == Phase::Idle && self.queue.is_empty() && self.timer.is_none()
    }

    /// When the caller must next call [`Director::poll`].
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timer.map(|t| t.deadline)
    }

    /// Take the journal accumulated since the last drain.
    pub fn drain_events(&mut self) -> Vec<DirectorEvent> {
        std::mem::take(&mut self.journal)
    }

    // -----------------------------------------------------------------------
    // Triggers
    // -----------------------------------------------------------------------

    /// Admit one event.
    ///
    /// Timers due strictly before `now` fire first; timers due at `now`
    /// are left for [`Director::poll`], so simultaneous arrivals batch.
    pub fn enqueue(&mut self, event: NormalizedEvent, now: Instant) -> Admission {
        self.fire_due(|deadline| deadline < now);
        self.admit(event, now)
    }

    /// Fire every timer due at or before `now`.
    ///
    /// Each timer runs at its own deadline, so a late poll replays the
    /// timeline exactly as if it had been on time.
    pub fn poll(&mut self, now: Instant) {
        self.fire_due(|deadline| deadline <= now);
    }

    fn fire_due(&mut self, due: impl Fn(Instant) -> bool) {
        while let Some(timer) = self.timer {
            if !due(timer.deadline) {
                break;
            }
            self.timer = None;
            self.fire(timer);
        }
    }

    /// Run a timer callback. A timer whose token is no longer current was
    /// cancelled by a preemption and does nothing.
    pub fn fire(&mut self, timer: Timer) -> bool {
        if timer.token != self.token {
            trace!(
                timer = timer.kind.as_str(),
                token = timer.token,
                current = self.token,
                "stale timer ignored"
            );
            metrics::stale_timers().add(1, &[KeyValue::new("timer", timer.kind.as_str())]);
            return false;
        }

        let now = timer.deadline;
        match timer.kind {
            TimerKind::Display => self.finish_active(now),
            TimerKind::Gap | TimerKind::Settle | TimerKind::Start => {
                self.phase = Phase::Idle;
                self.process(now);
            }
        }
        true
    }

    // -----------------------------------------------------------------------
    // Scheduling
    // -----------------------------------------------------------------------

    fn admit(&mut self, event: NormalizedEvent, now: Instant) -> Admission {
        let kind = event.kind;

        if self.is_known(&event.id, now) {
            debug!(event_id = %event.id, "duplicate event dropped");
            self.record(
                DirectorEventKind::Duplicate {
                    event_id: event.id.clone(),
                },
                now,
            );
            count_enqueued(kind, Admission::Duplicate);
            return Admission::Duplicate;
        }

        self.seen.insert(&event.id, now);
        self.record(
            DirectorEventKind::Admitted {
                event_id: event.id.clone(),
                kind,
                priority: event.priority,
            },
            now,
        );

        let admission = if kind == EventKind::ManualAnnounce && self.phase == Phase::Narrating {
            self.preempt(event, now);
            Admission::Preempting
        } else {
            debug!(event_id = %event.id, %kind, priority = event.priority, "event queued");
            self.queue.insert(event);
            if self.phase == Phase::Idle {
                self.phase = Phase::Pending;
                self.schedule(TimerKind::Start, now);
            }
            Admission::Admitted
        };

        count_enqueued(kind, admission);
        admission
    }

    fn is_known(&mut self, id: &str, now: Instant) -> bool {
        self.seen.contains(id, now)
            || self.queue.contains(id)
            || self.active_id() == Some(id)
            || self.interrupted_id() == Some(id)
    }

    /// Cut the active narration short in favour of `announcement`.
    fn preempt(&mut self, announcement: NormalizedEvent, now: Instant) {
        // Invalidate the display timer before touching any state.
        self.token += 1;
        self.timer = None;

        let by = announcement.id.clone();
        if let Some(active) = self.active.take() {
            let event = active.event.clone();
            self.close_active(active, "preempted", now);
            self.interrupted = Some(Interrupted {
                event,
                by: by.clone(),
            });
        }
        let interrupted_id = self.interrupted_id().unwrap_or_default().to_string();

        let dropped = self.queue.remove_kind(EventKind::ManualAnnounce);

        info!(
            interrupted = %interrupted_id,
            by = %by,
            dropped = dropped.len(),
            "narration preempted by announcement"
        );
        metrics::preemptions().add(1, &[]);
        self.record(
            DirectorEventKind::Preempted {
                interrupted: interrupted_id,
                by,
                dropped_announcements: dropped,
            },
            now,
        );

        self.state.clear();
        self.queue.push_front(announcement);
        self.phase = Phase::Pending;
        self.schedule(TimerKind::Settle, now + self.config.settle());
    }

    /// Decide what plays next.
    fn process(&mut self, now: Instant) {
        if self.queue.is_empty() {
            self.try_resume(now);
            if self.queue.is_empty() {
                self.go_idle(now);
                return;
            }
        }

        let Some(event) = self.queue.pop() else {
            return;
        };
        self.seen.insert(&event.id, now);

        let resumed = self
            .interrupted
            .as_ref()
            .is_some_and(|i| i.event.id == event.id);
        if resumed {
            self.interrupted = None;
        } else if event.kind == EventKind::ManualAnnounce
            && self.interrupted.as_ref().is_some_and(|i| i.by != event.id)
        {
            // A fresh announcement supersedes any pending replay.
            if let Some(dropped) = self.interrupted.take() {
                debug!(event_id = %dropped.event.id, "replay superseded by new announcement");
            }
        }

        self.token += 1;
        let presenter_state = event.kind.presenter_state();
        let from = self.state.presenter_state;

        self.state = DirectorState {
            presenter_state,
            caption_text: Some(event.caption.clone()),
            subtitle_text: event.subtitle.clone(),
            is_speaking: true,
            last_spoken_at: Some(event.timestamp),
            active_incident_id: event.incident_id(),
        };

        let span = narration::start_narration_span(&event);
        narration::record_presenter_transition(
            &span,
            &from.to_string(),
            &presenter_state.to_string(),
        );
        info!(
            event_id = %event.id,
            kind = %event.kind,
            %presenter_state,
            resumed,
            pending = self.queue.len(),
            "narration started"
        );
        metrics::narrations_started().add(
            1,
            &[
                KeyValue::new("kind", event.kind.as_str()),
                KeyValue::new("resumed", resumed),
            ],
        );
        self.record(
            DirectorEventKind::NarrationStarted {
                event_id: event.id.clone(),
                kind: event.kind,
                presenter_state,
                resumed,
            },
            now,
        );

        self.active = Some(Active {
            event,
            started: now,
            span,
        });
        self.phase = Phase::Narrating;
        self.schedule(TimerKind::Display, now + self.config.display_duration());
    }

    /// Re-admit the interrupted event if it is still worth showing.
    fn try_resume(&mut self, now: Instant) {
        let Some(event) = self.interrupted.as_ref().map(|i| i.event.clone()) else {
            return;
        };

        if event.kind.is_resumable() {
            info!(event_id = %event.id, kind = %event.kind, "resuming interrupted narration");
            self.record(
                DirectorEventKind::Resumed {
                    event_id: event.id.clone(),
                },
                now,
            );
            // Stays remembered until it actually starts, so `process` can
            // tag the narration as resumed.
            self.queue.insert(event);
        } else {
            debug!(event_id = %event.id, kind = %event.kind, "interrupted narration is stale");
            self.record(
                DirectorEventKind::Abandoned {
                    event_id: event.id,
                    kind: event.kind,
                },
                now,
            );
            self.interrupted = None;
        }
    }

    /// The display timer ran out: clear the screen, then wait out the gap.
    fn finish_active(&mut self, now: Instant) {
        if let Some(active) = self.active.take() {
            self.close_active(active, "completed", now);
        }
        self.state.clear();
        self.phase = Phase::Gap;
        self.schedule(TimerKind::Gap, now + self.config.gap());
    }

    fn close_active(&mut self, active: Active, outcome: &str, now: Instant) {
        let Active {
            event,
            started,
            span,
        } = active;

        let shown = now.saturating_duration_since(started);
        narration::record_outcome(&span, outcome);
        narration::record_presenter_transition(
            &span,
            &self.state.presenter_state.to_string(),
            &PresenterState::Idle.to_string(),
        );
        metrics::narration_duration_ms().record(
            shown.as_secs_f64() * 1000.0,
            &[
                KeyValue::new("kind", event.kind.as_str()),
                KeyValue::new("outcome", outcome.to_string()),
            ],
        );
        debug!(event_id = %event.id, outcome, shown_ms = shown.as_millis() as u64, "narration ended");
        self.record(DirectorEventKind::NarrationEnded { event_id: event.id }, now);
    }

    fn go_idle(&mut self, now: Instant) {
        self.phase = Phase::Idle;
        self.active = None;
        self.timer = None;

        let was_idle = self.state.is_idle();
        self.state.clear();
        if !was_idle {
            info!("director idle");
        }
        self.record(DirectorEventKind::WentIdle, now);
    }

    fn schedule(&mut self, kind: TimerKind, deadline: Instant) {
        trace!(timer = kind.as_str(), token = self.token, "timer scheduled");
        self.timer = Some(Timer {
            kind,
            token: self.token,
            deadline,
        });
    }

    fn record(&mut self, kind: DirectorEventKind, now: Instant) {
        self.seq += 1;
        let elapsed = now.saturating_duration_since(self.origin);
        let at = chrono::Duration::from_std(elapsed)
            .ok()
            .and_then(|d| self.epoch.checked_add_signed(d))
            .unwrap_or(self.epoch);
        self.journal.push(DirectorEvent {
            seq: self.seq,
            at,
            kind,
        });
    }
}

fn count_enqueued(kind: EventKind, admission: Admission) {
    metrics::events_enqueued().add(
        1,
        &[
            KeyValue::new("kind", kind.as_str()),
            KeyValue::new("result", admission.as_str()),
        ],
    );
}
