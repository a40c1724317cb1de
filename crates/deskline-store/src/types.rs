//! Data types for directory records.

use serde::{Deserialize, Serialize};

/// A course taught by the person a record describes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
}

impl Course {
    /// "Title (code, room)" with whichever parts are present.
    pub fn describe(&self) -> String {
        let extras: Vec<&str> = [self.code.as_deref(), self.room.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.trim().is_empty())
            .collect();
        if extras.is_empty() {
            self.title.clone()
        } else {
            format!("{} ({})", self.title, extras.join(", "))
        }
    }
}

/// A directory entry. Read-only snapshot for the duration of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub canonical_name: String,
    #[serde(default)]
    pub office_location: String,
    #[serde(default)]
    pub extension: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_days: Option<String>,
    #[serde(default)]
    pub courses: Vec<Course>,
}

/// Store-level statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_records: i64,
    pub total_courses: i64,
    pub db_path: String,
    pub db_size_mb: f64,
}

/// Normalized lookup key: Unicode lowercase with whitespace collapsed.
pub fn name_key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Case-insensitive, substring-tolerant name match in either direction.
///
/// Both keys must already be normalized with [`name_key`].
pub fn keys_match(stored_key: &str, query_key: &str) -> bool {
    !query_key.is_empty()
        && !stored_key.is_empty()
        && (stored_key.contains(query_key) || query_key.contains(stored_key))
}
