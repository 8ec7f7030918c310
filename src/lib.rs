//! # broadcast-director
//!
//! Event choreography for a live status broadcast.
//!
//! Raw change notifications are normalized into narratable events, and a
//! single director turns them into one caption at a time: prioritized,
//! preemptable by operator announcements, and always settling back to idle.

pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod model;
pub mod normalize;
pub mod telemetry;
