//! Error types for broadcast-director.
//!
//! The choreography core itself never fails; these cover the edges
//! around it (config, feed parsing, telemetry setup, the runtime task).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("malformed change notification: {0}")]
    Notification(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("director is no longer running")]
    DirectorClosed,

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
