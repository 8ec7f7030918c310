//! Structured journal emitted by the director on every decision.
//!
//! The journal is how tests, the replay tool, and any audit consumer
//! observe choreography without polling state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{EventKind, PresenterState};

/// A structured event emitted by the director.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectorEvent {
    /// Monotonic sequence number per director.
    pub seq: u64,
    /// When the decision was made, on the clock driving the director.
    pub at: DateTime<Utc>,
    /// What happened.
    pub kind: DirectorEventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DirectorEventKind {
    Admitted {
        event_id: String,
        kind: EventKind,
        priority: u8,
    },
    Duplicate {
        event_id: String,
    },
    Preempted {
        interrupted: String,
        by: String,
        dropped_announcements: Vec<String>,
    },
    NarrationStarted {
        event_id: String,
        kind: EventKind,
        presenter_state: PresenterState,
        resumed: bool,
    },
    NarrationEnded {
        event_id: String,
    },
    Resumed {
        event_id: String,
    },
    Abandoned {
        event_id: String,
        kind: EventKind,
    },
    WentIdle,
}

impl DirectorEventKind {
    /// Event id for narration starts, used to read play order off a journal.
    pub fn started_id(&self) -> Option<&str> {
        match self {
            DirectorEventKind::NarrationStarted { event_id, .. } => Some(event_id),
            _ => None,
        }
    }
}
