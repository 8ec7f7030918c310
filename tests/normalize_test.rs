//! Classification rules for each source table.

use broadcast_director::model::{EventKind, PresenterState};
use broadcast_director::normalize::{ChangeKind, ChangeNotification, SourceTable, classify};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;

fn at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 14, 15, 9, 26).unwrap()
}

fn insert(table: &str, row: serde_json::Value) -> ChangeNotification {
    ChangeNotification::new(table, ChangeKind::Insert, row)
}

fn update(table: &str, row: serde_json::Value) -> ChangeNotification {
    ChangeNotification::new(table, ChangeKind::Update, row)
}

// ---------------------------------------------------------------------------
// incidents
// ---------------------------------------------------------------------------

#[test]
fn inserted_incident_is_new_outage() {
    let row = json!({
        "id": 7,
        "title": "API errors",
        "status": "Investigating",
        "active": true,
        "providers": {"name": "Acme Cloud"}
    });
    let event = classify(&insert("incidents", row.clone()), at()).unwrap();

    assert_eq!(event.kind, EventKind::IncidentNew);
    assert_eq!(event.priority, 2);
    assert_eq!(event.caption, "New outage: API errors");
    assert_eq!(event.subtitle.as_deref(), Some("Acme Cloud"));
    assert_eq!(event.timestamp, at());
    assert_eq!(event.metadata, Some(row));
    assert_eq!(event.incident_id().as_deref(), Some("7"));
    assert_eq!(event.kind.presenter_state(), PresenterState::Alert);
}

#[test]
fn inserted_incident_without_provider() {
    let event = classify(&insert("incidents", json!({"id": "a", "title": "DNS"})), at()).unwrap();
    assert_eq!(event.subtitle.as_deref(), Some("Unknown provider"));
}

#[test]
fn updated_incident_is_update_with_status() {
    let row = json!({"id": 7, "title": "API errors", "status": "Monitoring", "active": true});
    let event = classify(&update("incidents", row), at()).unwrap();

    assert_eq!(event.kind, EventKind::IncidentUpdate);
    assert_eq!(event.priority, 4);
    assert_eq!(event.caption, "Update: API errors");
    assert_eq!(event.subtitle.as_deref(), Some("Monitoring"));
}

#[test]
fn updated_incident_without_status_has_no_subtitle() {
    let event = classify(&update("incidents", json!({"id": 7, "title": "API"})), at()).unwrap();
    assert_eq!(event.kind, EventKind::IncidentUpdate);
    assert_eq!(event.subtitle, None);
}

#[test]
fn resolved_status_wins_over_insert() {
    let row = json!({"id": 7, "title": "API errors", "status": "Resolved", "providers": {"name": "Acme"}});
    for notification in [insert("incidents", row.clone()), update("incidents", row.clone())] {
        let event = classify(&notification, at()).unwrap();
        assert_eq!(event.kind, EventKind::IncidentResolved);
        assert_eq!(event.priority, 3);
        assert_eq!(event.caption, "Service restored: API errors");
        assert_eq!(event.subtitle.as_deref(), Some("Acme is now operational"));
    }
}

#[test]
fn inactive_incident_is_resolved() {
    let row = json!({"id": 7, "title": "API errors", "status": "Monitoring", "active": false});
    let event = classify(&update("incidents", row), at()).unwrap();
    assert_eq!(event.kind, EventKind::IncidentResolved);
    assert_eq!(event.subtitle.as_deref(), Some("Service is now operational"));
}

#[test]
fn missing_title_is_rendered_as_unknown() {
    let event = classify(&insert("incidents", json!({"id": 1})), at()).unwrap();
    assert_eq!(event.caption, "New outage: Unknown incident");
}

#[test]
fn deleted_incident_falls_back_to_old_row() {
    let notification = ChangeNotification {
        table: "incidents".to_string(),
        event_type: ChangeKind::Delete,
        new: Some(json!({})),
        old: Some(json!({"id": 9, "title": "Gone", "active": false})),
    };
    let event = classify(&notification, at()).unwrap();
    assert_eq!(event.kind, EventKind::IncidentResolved);
    assert_eq!(event.caption, "Service restored: Gone");
    assert!(event.id.starts_with("incidents-9-"));
}

// ---------------------------------------------------------------------------
// incident_events
// ---------------------------------------------------------------------------

#[test]
fn incident_event_caption_is_verbatim() {
    let row = json!({"id": 3, "incident_id": 7, "description": "Engineers have identified the cause."});
    let event = classify(&insert("incident_events", row), at()).unwrap();

    assert_eq!(event.kind, EventKind::IncidentUpdate);
    assert_eq!(event.priority, 3);
    assert_eq!(event.caption, "Engineers have identified the cause.");
    assert_eq!(event.subtitle, None);
    // highlights the parent incident, not the event row
    assert_eq!(event.incident_id().as_deref(), Some("7"));
}

#[test]
fn incident_event_without_description_gets_generic_caption() {
    for row in [json!({"id": 3}), json!({"id": 3, "description": "  "})] {
        let event = classify(&insert("incident_events", row), at()).unwrap();
        assert_eq!(event.caption, "Service update received");
    }
}

#[test]
fn incident_event_updates_are_ignored() {
    let row = json!({"id": 3, "description": "edited"});
    assert!(classify(&update("incident_events", row), at()).is_none());
}

// ---------------------------------------------------------------------------
// producer_events
// ---------------------------------------------------------------------------

#[test]
fn announce_action_is_manual_announcement() {
    let row = json!({"id": 11, "type": "ANNOUNCE", "payload": {"message": "  Back after the break  "}});
    let event = classify(&insert("producer_events", row), at()).unwrap();

    assert_eq!(event.kind, EventKind::ManualAnnounce);
    assert_eq!(event.priority, 1);
    assert_eq!(event.caption, "Back after the break");
    assert_eq!(event.subtitle.as_deref(), Some("Manual announcement"));
    assert_eq!(event.incident_id(), None);
}

#[test]
fn other_producer_events_are_ignored() {
    let rows = [
        json!({"id": 1, "type": "SCENE", "payload": {"message": "hi"}}),
        json!({"id": 2, "type": "ANNOUNCE", "payload": {"message": "   "}}),
        json!({"id": 3, "type": "ANNOUNCE", "payload": {}}),
        json!({"id": 4, "type": "ANNOUNCE"}),
    ];
    for row in rows {
        assert!(classify(&insert("producer_events", row.clone()), at()).is_none(), "{row}");
    }

    let edited = json!({"id": 5, "type": "ANNOUNCE", "payload": {"message": "hi"}});
    assert!(classify(&update("producer_events", edited), at()).is_none());
}

// ---------------------------------------------------------------------------
// internet_conditions
// ---------------------------------------------------------------------------

#[test]
fn unstable_network_is_context_change() {
    let row = json!({"id": 1, "status": "unstable", "description": "Packet loss in EU-West"});
    let event = classify(&update("internet_conditions", row), at()).unwrap();

    assert_eq!(event.kind, EventKind::ContextChange);
    assert_eq!(event.priority, 5);
    assert_eq!(event.caption, "Internet instability detected");
    assert_eq!(event.subtitle.as_deref(), Some("Packet loss in EU-West"));
    assert_eq!(event.incident_id(), None);
}

#[test]
fn unstable_network_without_description() {
    let event = classify(
        &insert("internet_conditions", json!({"id": 1, "status": "unstable"})),
        at(),
    )
    .unwrap();
    assert_eq!(event.subtitle.as_deref(), Some("Monitoring conditions"));
}

#[test]
fn stable_network_is_ignored() {
    let row = json!({"id": 1, "status": "stable"});
    assert!(classify(&update("internet_conditions", row), at()).is_none());
}

// ---------------------------------------------------------------------------
// General
// ---------------------------------------------------------------------------

#[test]
fn unknown_tables_are_ignored() {
    assert!(classify(&insert("providers", json!({"id": 1})), at()).is_none());
    assert_eq!(SourceTable::from_name("providers"), None);
    assert_eq!(
        SourceTable::from_name("incident_events").map(SourceTable::as_str),
        Some("incident_events")
    );
}

#[test]
fn rowless_or_malformed_notifications_are_ignored() {
    let empty = ChangeNotification {
        table: "incidents".to_string(),
        event_type: ChangeKind::Insert,
        new: None,
        old: None,
    };
    assert!(classify(&empty, at()).is_none());

    // a row that is not an object cannot be read as an incident
    assert!(classify(&insert("incidents", json!("oops")), at()).is_none());
    assert!(classify(&insert("incidents", json!([1, 2])), at()).is_none());
}

#[test]
fn wrongly_typed_incident_fields_read_as_absent() {
    let row = json!({"id": 1, "title": "API down", "active": 1});
    let event = classify(&insert("incidents", row), at()).unwrap();
    assert_eq!(event.kind, EventKind::IncidentNew);
    assert_eq!(event.caption, "New outage: API down");

    let row = json!({"id": 1, "title": "API down", "providers": [{"name": "AWS"}]});
    let event = classify(&insert("incidents", row), at()).unwrap();
    assert_eq!(event.subtitle.as_deref(), Some("Unknown provider"));

    let row = json!({"id": 1, "title": "API down", "status": {"code": 3}, "providers": {"name": false}});
    let event = classify(&update("incidents", row), at()).unwrap();
    assert_eq!(event.kind, EventKind::IncidentUpdate);
    assert_eq!(event.subtitle, None);
}

#[test]
fn numeric_text_fields_are_rendered() {
    let event = classify(&insert("incidents", json!({"id": 1, "title": 42})), at()).unwrap();
    assert_eq!(event.caption, "New outage: 42");

    let event = classify(&insert("incident_events", json!({"id": 3, "description": 7})), at()).unwrap();
    assert_eq!(event.kind, EventKind::IncidentUpdate);
    assert_eq!(event.caption, "7");
}

#[test]
fn every_incident_event_insert_is_narrated() {
    let rows = [
        json!({"id": 3, "description": null}),
        json!({"id": 3, "description": ["a", "b"]}),
        json!({"id": 3, "description": {"text": "nested"}}),
    ];
    for row in rows {
        let event = classify(&insert("incident_events", row.clone()), at());
        assert_eq!(
            event.map(|e| e.caption),
            Some("Service update received".to_string()),
            "{row}"
        );
    }
}

#[test]
fn wrongly_typed_producer_and_network_fields() {
    let row = json!({"id": 1, "type": "ANNOUNCE", "payload": "Back soon"});
    assert!(classify(&insert("producer_events", row), at()).is_none());

    let row = json!({"id": 1, "type": "ANNOUNCE", "payload": {"message": "Back soon", "extra": [1]}});
    let event = classify(&insert("producer_events", row), at()).unwrap();
    assert_eq!(event.caption, "Back soon");

    let row = json!({"id": 1, "status": "unstable", "description": false});
    let event = classify(&update("internet_conditions", row), at()).unwrap();
    assert_eq!(event.subtitle.as_deref(), Some("Monitoring conditions"));
}

#[test]
fn ids_are_unique_per_instant() {
    let row = json!({"id": 7, "title": "API", "status": "Monitoring"});
    let first = classify(&update("incidents", row.clone()), at()).unwrap();
    let again = classify(&update("incidents", row.clone()), at()).unwrap();
    let later = classify(
        &update("incidents", row),
        at() + chrono::Duration::nanoseconds(1),
    )
    .unwrap();

    // deterministic for the same instant
    assert_eq!(first.id, again.id);
    assert_ne!(first.id, later.id);
    assert!(first.id.starts_with("incidents-7-2025-03-14T15:09:26"));
}

#[test]
fn missing_row_id_is_unknown() {
    let event = classify(&insert("incidents", json!({"title": "X"})), at()).unwrap();
    assert!(event.id.starts_with("incidents-unknown-"));
}

#[test]
fn notification_parses_from_feed_json() {
    let line = r#"{"table":"incidents","eventType":"INSERT","new":{"id":1,"title":"Edge"},"old":null}"#;
    let notification = ChangeNotification::from_json(line).unwrap();

    assert_eq!(notification.table, "incidents");
    assert_eq!(notification.event_type, ChangeKind::Insert);
    assert_eq!(notification.old, None);
    assert_eq!(
        classify(&notification, at()).map(|e| e.caption),
        Some("New outage: Edge".to_string())
    );

    assert!(ChangeNotification::from_json(r#"{"table":"incidents"}"#).is_err());
    assert!(ChangeNotification::from_json(r#"{"table":"x","eventType":"UPSERT"}"#).is_err());
}
