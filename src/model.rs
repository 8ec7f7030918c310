//! Core data model.
//!
//! A normalized event is one thing worth narrating. The director state is
//! what the presenter is showing right now, and nothing more.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Event Kind
// ---------------------------------------------------------------------------

/// Classification of a narratable occurrence. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    IncidentNew,
    IncidentUpdate,
    IncidentResolved,
    ContextChange,
    ManualAnnounce,
}

impl EventKind {
    /// Presenter pose while an event of this kind is on screen.
    pub fn presenter_state(self) -> PresenterState {
        match self {
            EventKind::IncidentNew => PresenterState::Alert,
            EventKind::IncidentResolved => PresenterState::Resolved,
            EventKind::IncidentUpdate | EventKind::ContextChange | EventKind::ManualAnnounce => {
                PresenterState::Talking
            }
        }
    }

    /// Whether an interrupted event of this kind is still worth replaying.
    ///
    /// Context changes and resolutions go stale too quickly to replay.
    pub fn is_resumable(self) -> bool {
        !matches!(self, EventKind::ContextChange | EventKind::IncidentResolved)
    }

    /// Incident-family kinds carry the incident row as metadata.
    pub fn is_incident(self) -> bool {
        matches!(
            self,
            EventKind::IncidentNew | EventKind::IncidentUpdate | EventKind::IncidentResolved
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::IncidentNew => "INCIDENT_NEW",
            EventKind::IncidentUpdate => "INCIDENT_UPDATE",
            EventKind::IncidentResolved => "INCIDENT_RESOLVED",
            EventKind::ContextChange => "CONTEXT_CHANGE",
            EventKind::ManualAnnounce => "MANUAL_ANNOUNCE",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Priority
// ---------------------------------------------------------------------------

/// Lower is more urgent.
pub type Priority = u8;

pub mod priority {
    use super::Priority;

    pub const MANUAL_ANNOUNCE: Priority = 1;
    pub const INCIDENT_NEW: Priority = 2;
    pub const INCIDENT_RESOLVED: Priority = 3;
    pub const INCIDENT_EVENT: Priority = 3;
    pub const INCIDENT_UPDATE: Priority = 4;
    pub const CONTEXT_CHANGE: Priority = 5;
}

// ---------------------------------------------------------------------------
// Normalized Event
// ---------------------------------------------------------------------------

/// The unit of narration. Immutable once admitted to the director.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedEvent {
    /// Unique per (source table, source row, arrival instant).
    pub id: String,

    #[serde(rename = "type")]
    pub kind: EventKind,

    pub priority: Priority,

    /// Narration text. Always present.
    pub caption: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,

    /// Creation instant. Display only; never used for ordering.
    pub timestamp: DateTime<Utc>,

    /// Opaque payload for downstream consumers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl NormalizedEvent {
    pub fn new(
        id: impl Into<String>,
        kind: EventKind,
        priority: Priority,
        caption: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            priority,
            caption: caption.into(),
            subtitle: None,
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    pub fn with_subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = Some(subtitle.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Incident to highlight elsewhere in the UI while this event plays.
    ///
    /// An explicit `incident_id` in the metadata wins; otherwise the row id
    /// is used, but only when the metadata is an incident row.
    pub fn incident_id(&self) -> Option<String> {
        let metadata = self.metadata.as_ref()?;
        if let Some(id) = metadata.get("incident_id").and_then(scalar_to_string) {
            return Some(id);
        }
        if self.kind.is_incident() {
            return metadata.get("id").and_then(scalar_to_string);
        }
        None
    }
}

/// Render a string or number JSON value as an id.
pub(crate) fn scalar_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Presenter State
// ---------------------------------------------------------------------------

/// Pose of the on-screen presenter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PresenterState {
    #[default]
    Idle,
    Alert,
    Talking,
    Resolved,
}

impl std::fmt::Display for PresenterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PresenterState::Idle => "IDLE",
            PresenterState::Alert => "ALERT",
            PresenterState::Talking => "TALKING",
            PresenterState::Resolved => "RESOLVED",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Director State
// ---------------------------------------------------------------------------

/// What is narrated right now. Single source of truth for consumers.
///
/// Consumers must treat `caption_text == None` as "nothing to show".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectorState {
    pub presenter_state: PresenterState,
    pub caption_text: Option<String>,
    pub subtitle_text: Option<String>,
    pub is_speaking: bool,
    /// Never cleared once set.
    pub last_spoken_at: Option<DateTime<Utc>>,
    pub active_incident_id: Option<String>,
}

impl DirectorState {
    /// Return to idle, keeping `last_spoken_at`.
    pub(crate) fn clear(&mut self) {
        self.presenter_state = PresenterState::Idle;
        self.caption_text = None;
        self.subtitle_text = None;
        self.is_speaking = false;
        self.active_incident_id = None;
    }

    pub fn is_idle(&self) -> bool {
        self.presenter_state == PresenterState::Idle && self.caption_text.is_none()
    }
}
