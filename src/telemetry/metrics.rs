//! Metric instrument factories for broadcast-director.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments come from the `"broadcast-director"` meter; with no
//! provider installed they are no-ops.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for broadcast-director instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("broadcast-director")
}

/// Counter: events offered to the director.
/// Labels: `kind`, `result` ("admitted" | "preempting" | "duplicate").
pub fn events_enqueued() -> Counter<u64> {
    meter()
        .u64_counter("director.events.enqueued")
        .with_description("Number of events offered to the director")
        .build()
}

/// Counter: narrations put on screen.
/// Labels: `kind`, `resumed`.
pub fn narrations_started() -> Counter<u64> {
    meter()
        .u64_counter("director.narrations.started")
        .with_description("Number of narrations started")
        .build()
}

/// Counter: narrations cut short by a manual announcement.
pub fn preemptions() -> Counter<u64> {
    meter()
        .u64_counter("director.preemptions")
        .with_description("Number of narrations preempted by an announcement")
        .build()
}

/// Counter: timer callbacks ignored because their token went stale.
/// Labels: `timer`.
pub fn stale_timers() -> Counter<u64> {
    meter()
        .u64_counter("director.timers.stale")
        .with_description("Timer firings ignored after cancellation")
        .build()
}

/// Histogram: time a caption actually stayed on screen.
/// Labels: `kind`, `outcome` ("completed" | "preempted").
pub fn narration_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("director.narration.duration_ms")
        .with_description("On-screen time per narration in milliseconds")
        .with_unit("ms")
        .build()
}

/// Counter: change notifications run through the normalizer.
/// Labels: `table`, `result` ("narratable" | "ignored").
pub fn notifications_classified() -> Counter<u64> {
    meter()
        .u64_counter("director.notifications.classified")
        .with_description("Number of change notifications classified")
        .build()
}
