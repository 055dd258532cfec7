//! Backend resource shapes.
//!
//! Every entity here is owned by the server; the client only observes it
//! through JSON. Unknown fields are ignored and optional fields default, so
//! older and newer backends both deserialize.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// An uploaded document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    #[serde(alias = "document_id")]
    pub id: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default, alias = "uploaded_at", deserialize_with = "lenient_timestamp")]
    pub upload_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub chunk_count: u64,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub folder: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

/// A registered user as seen by the admin pages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub last_login: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

/// An LLM model advertised by `/api/system/models`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub modified_at: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    #[serde(default)]
    pub status: String,
    #[serde(flatten)]
    pub components: BTreeMap<String, serde_json::Value>,
}

impl Health {
    pub fn is_healthy(&self) -> bool {
        matches!(self.status.as_str(), "ok" | "healthy" | "up")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStats {
    #[serde(default)]
    pub document_count: Option<u64>,
    #[serde(default)]
    pub total_chunks: Option<u64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Parse a backend timestamp. RFC 3339 first, then a naive ISO 8601
/// date-time (as Python's `datetime.isoformat()` emits) read as UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// `deserialize_with` for optional timestamps. Null, missing, non-string
/// and unparseable values all become `None` so one odd field never fails
/// a whole listing.
pub(crate) fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(serde_json::Value::String(s)) => parse_timestamp(&s),
        _ => None,
    })
}

/// List endpoints return either a bare array or an object wrapping one.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum Listing<T> {
    Bare(Vec<T>),
    Wrapped(BTreeMap<String, serde_json::Value>),
}

impl<T: serde::de::DeserializeOwned> Listing<T> {
    /// Extract the items, looking under `key` for the wrapped form.
    pub(crate) fn into_items(self, key: &str) -> Result<Vec<T>, serde_json::Error> {
        match self {
            Listing::Bare(items) => Ok(items),
            Listing::Wrapped(mut map) => match map.remove(key) {
                Some(v) => serde_json::from_value(v),
                None => Ok(Vec::new()),
            },
        }
    }
}
