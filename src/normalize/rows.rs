//! Typed views over change-feed rows.
//!
//! Only the fields the normalizer reads are modelled, and every one of
//! them is optional. A field of the wrong JSON type reads as absent
//! instead of failing the row. The raw row travels on as event metadata
//! untouched.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

use crate::model::scalar_to_string;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct IncidentRow {
    pub id: Option<serde_json::Value>,
    #[serde(deserialize_with = "text")]
    pub title: Option<String>,
    #[serde(deserialize_with = "text")]
    pub status: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub active: Option<bool>,
    #[serde(deserialize_with = "lenient")]
    pub providers: Option<ProviderRef>,
}

impl IncidentRow {
    pub fn is_resolved(&self) -> bool {
        self.status.as_deref() == Some("Resolved") || self.active == Some(false)
    }

    pub fn title(&self) -> &str {
        self.title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or("Unknown incident")
    }

    pub fn provider(&self) -> Option<&str> {
        self.providers
            .as_ref()
            .and_then(|p| p.name.as_deref())
            .filter(|n| !n.is_empty())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProviderRef {
    #[serde(deserialize_with = "text")]
    pub name: Option<String>,
}

/// Bot-written caption attached to an incident.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct IncidentEventRow {
    #[serde(deserialize_with = "text")]
    pub description: Option<String>,
}

/// Operator action written from the producer console.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProducerEventRow {
    #[serde(rename = "type", deserialize_with = "text")]
    pub action: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub payload: Option<ProducerPayload>,
}

impl ProducerEventRow {
    /// The announcement text, if this row is a usable announcement.
    pub fn announcement(&self) -> Option<&str> {
        if self.action.as_deref() != Some("ANNOUNCE") {
            return None;
        }
        self.payload
            .as_ref()
            .and_then(|p| p.message.as_deref())
            .map(str::trim)
            .filter(|m| !m.is_empty())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProducerPayload {
    #[serde(deserialize_with = "text")]
    pub message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct InternetConditionsRow {
    #[serde(deserialize_with = "text")]
    pub status: Option<String>,
    #[serde(deserialize_with = "text")]
    pub description: Option<String>,
}

impl InternetConditionsRow {
    pub fn is_unstable(&self) -> bool {
        self.status.as_deref() == Some("unstable")
    }
}

/// Row id rendered for event ids; `unknown` when absent.
pub fn row_id(row: &serde_json::Value) -> String {
    row.get("id")
        .and_then(scalar_to_string)
        .unwrap_or_else(|| "unknown".to_string())
}

/// Read a field as `T`, or as absent when it has another shape.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Read a text field. Numbers are rendered as text; other shapes are absent.
fn text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}
