//! Change notification → normalized event.
//!
//! Pure classification with no state. A notification that carries nothing
//! worth narrating yields `None` and never reaches the director.

pub mod rows;

use chrono::{DateTime, SecondsFormat, Utc};
use opentelemetry::KeyValue;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::model::{EventKind, NormalizedEvent, Priority, priority};
use crate::telemetry::metrics;

use rows::{IncidentEventRow, IncidentRow, InternetConditionsRow, ProducerEventRow};

// ---------------------------------------------------------------------------
// Change notification
// ---------------------------------------------------------------------------

/// Row-level change kind reported by the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// One notification as delivered by the change feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeNotification {
    pub table: String,
    #[serde(rename = "eventType")]
    pub event_type: ChangeKind,
    #[serde(default)]
    pub new: Option<serde_json::Value>,
    #[serde(default)]
    pub old: Option<serde_json::Value>,
}

impl ChangeNotification {
    pub fn new(table: impl Into<String>, event_type: ChangeKind, row: serde_json::Value) -> Self {
        Self {
            table: table.into(),
            event_type,
            new: Some(row),
            old: None,
        }
    }

    /// Parse one JSON document.
    pub fn from_json(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line)?)
    }

    /// The row to classify: `new`, falling back to `old` when `new` is
    /// absent or an empty object.
    pub fn row(&self) -> Option<&serde_json::Value> {
        let usable = |v: &&serde_json::Value| match v {
            serde_json::Value::Null => false,
            serde_json::Value::Object(map) => !map.is_empty(),
            _ => true,
        };
        self.new
            .as_ref()
            .filter(usable)
            .or_else(|| self.old.as_ref().filter(usable))
    }
}

// ---------------------------------------------------------------------------
// Source tables
// ---------------------------------------------------------------------------

/// Tables the dashboard narrates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceTable {
    Incidents,
    IncidentEvents,
    ProducerEvents,
    InternetConditions,
}

impl SourceTable {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "incidents" => Some(Self::Incidents),
            "incident_events" => Some(Self::IncidentEvents),
            "producer_events" => Some(Self::ProducerEvents),
            "internet_conditions" => Some(Self::InternetConditions),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Incidents => "incidents",
            Self::IncidentEvents => "incident_events",
            Self::ProducerEvents => "producer_events",
            Self::InternetConditions => "internet_conditions",
        }
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Classify using the current wall clock.
pub fn classify_now(notification: &ChangeNotification) -> Option<NormalizedEvent> {
    classify(notification, Utc::now())
}

/// Classify one notification as of `now`.
///
/// `now` becomes the event timestamp and part of its id, so repeated
/// updates to the same row yield distinct events.
pub fn classify(notification: &ChangeNotification, now: DateTime<Utc>) -> Option<NormalizedEvent> {
    let result = classify_inner(notification, now);

    let outcome = if result.is_some() { "narratable" } else { "ignored" };
    debug!(
        table = %notification.table,
        event_type = ?notification.event_type,
        outcome,
        kind = ?result.as_ref().map(|e| e.kind),
        "notification classified"
    );
    metrics::notifications_classified().add(
        1,
        &[
            KeyValue::new("table", notification.table.clone()),
            KeyValue::new("result", outcome),
        ],
    );

    result
}

fn classify_inner(notification: &ChangeNotification, now: DateTime<Utc>) -> Option<NormalizedEvent> {
    let table = SourceTable::from_name(&notification.table)?;
    let raw = notification.row()?;
    let is_insert = notification.event_type == ChangeKind::Insert;

    let id = format!(
        "{}-{}-{}",
        table.as_str(),
        rows::row_id(raw),
        now.to_rfc3339_opts(SecondsFormat::Nanos, true)
    );
    let event = |kind: EventKind, urgency: Priority, caption: String| {
        NormalizedEvent::new(id.clone(), kind, urgency, caption)
            .at(now)
            .with_metadata(raw.clone())
    };

    match table {
        SourceTable::Incidents => {
            let row: IncidentRow = typed(raw)?;
            if row.is_resolved() {
                let provider = row.provider().unwrap_or("Service");
                Some(
                    event(
                        EventKind::IncidentResolved,
                        priority::INCIDENT_RESOLVED,
                        format!("Service restored: {}", row.title()),
                    )
                    .with_subtitle(format!("{provider} is now operational")),
                )
            } else if is_insert {
                Some(
                    event(
                        EventKind::IncidentNew,
                        priority::INCIDENT_NEW,
                        format!("New outage: {}", row.title()),
                    )
                    .with_subtitle(row.provider().unwrap_or("Unknown provider")),
                )
            } else {
                let update = event(
                    EventKind::IncidentUpdate,
                    priority::INCIDENT_UPDATE,
                    format!("Update: {}", row.title()),
                );
                Some(match row.status.as_deref().filter(|s| !s.is_empty()) {
                    Some(status) => update.with_subtitle(status),
                    None => update,
                })
            }
        }
        SourceTable::IncidentEvents => {
            if !is_insert {
                return None;
            }
            let row: IncidentEventRow = typed(raw)?;
            let caption = row
                .description
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| "Service update received".to_string());
            Some(event(
                EventKind::IncidentUpdate,
                priority::INCIDENT_EVENT,
                caption,
            ))
        }
        SourceTable::ProducerEvents => {
            if !is_insert {
                return None;
            }
            let row: ProducerEventRow = typed(raw)?;
            let message = row.announcement()?;
            Some(
                event(
                    EventKind::ManualAnnounce,
                    priority::MANUAL_ANNOUNCE,
                    message.to_string(),
                )
                .with_subtitle("Manual announcement"),
            )
        }
        SourceTable::InternetConditions => {
            let row: InternetConditionsRow = typed(raw)?;
            if !row.is_unstable() {
                return None;
            }
            let subtitle = row
                .description
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| "Monitoring conditions".to_string());
            Some(
                event(
                    EventKind::ContextChange,
                    priority::CONTEXT_CHANGE,
                    "Internet instability detected".to_string(),
                )
                .with_subtitle(subtitle),
            )
        }
    }
}

fn typed<T: serde::de::DeserializeOwned>(raw: &serde_json::Value) -> Option<T> {
    match serde_json::from_value(raw.clone()) {
        Ok(row) => Some(row),
        Err(e) => {
            debug!(error = %e, "row does not match expected shape");
            None
        }
    }
}
