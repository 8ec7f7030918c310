//! Typed configuration from a TOML file and environment variables.
//!
//! Loads once at startup and fails fast on malformed values. Every key is
//! optional; the defaults reproduce the broadcast's usual pacing.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Director timings
// ---------------------------------------------------------------------------

/// Pacing of the director. Fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DirectorConfig {
    /// How long each caption stays on screen.
    pub display_duration_ms: u64,
    /// Idle beat between consecutive narrations.
    pub gap_ms: u64,
    /// Fade delay between a preemption and the announcement taking over.
    pub settle_ms: u64,
    /// How long a seen event id is remembered for de-duplication.
    pub dedup_retention_secs: u64,
    /// Upper bound on remembered event ids.
    pub dedup_capacity: usize,
}

impl Default for DirectorConfig {
    fn default() -> Self {
        Self {
            display_duration_ms: 8000,
            gap_ms: 500,
            settle_ms: 200,
            dedup_retention_secs: 600,
            dedup_capacity: 4096,
        }
    }
}

impl DirectorConfig {
    pub fn display_duration(&self) -> Duration {
        Duration::from_millis(self.display_duration_ms)
    }

    pub fn gap(&self) -> Duration {
        Duration::from_millis(self.gap_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn dedup_retention(&self) -> Duration {
        Duration::from_secs(self.dedup_retention_secs)
    }

    /// Parse the `[director]` table of a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        #[derive(Deserialize, Default)]
        struct File {
            #[serde(default)]
            director: DirectorConfig,
        }

        let file: File =
            toml::from_str(content).map_err(|e| Error::Config(format!("bad director config: {e}")))?;
        file.director.validate()?;
        Ok(file.director)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read director config {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    fn validate(&self) -> Result<()> {
        if self.display_duration_ms == 0 {
            return Err(Error::Config(
                "display_duration_ms must be greater than zero".to_string(),
            ));
        }
        if self.dedup_retention_secs == 0 {
            return Err(Error::Config(
                "dedup_retention_secs must be greater than zero".to_string(),
            ));
        }
        if self.dedup_capacity == 0 {
            return Err(Error::Config(
                "dedup_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Process config
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Config {
    pub director: DirectorConfig,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// `DIRECTOR_CONFIG` optionally names a TOML file; individual
    /// `DIRECTOR_*` variables override whatever it sets.
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let mut director = match std::env::var("DIRECTOR_CONFIG") {
            Ok(path) => DirectorConfig::from_toml_file(Path::new(&path))?,
            Err(_) => DirectorConfig::default(),
        };

        if let Some(v) = parsed_var("DIRECTOR_DISPLAY_MS")? {
            director.display_duration_ms = v;
        }
        if let Some(v) = parsed_var("DIRECTOR_GAP_MS")? {
            director.gap_ms = v;
        }
        if let Some(v) = parsed_var("DIRECTOR_SETTLE_MS")? {
            director.settle_ms = v;
        }
        if let Some(v) = parsed_var("DIRECTOR_DEDUP_RETENTION_SECS")? {
            director.dedup_retention_secs = v;
        }
        if let Some(v) = parsed_var("DIRECTOR_DEDUP_CAPACITY")? {
            director.dedup_capacity = v;
        }
        director.validate()?;

        Ok(Self {
            director,
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn parsed_var<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("environment variable {name}={raw:?}: {e}"))),
        Err(_) => Ok(None),
    }
}
