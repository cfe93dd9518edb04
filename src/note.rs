//! Core data structures returned by the flomo API.
//!
//! Notes, file descriptors, tag entries and recommendations are read-only
//! snapshots of server state. Timestamps are kept as the raw server strings so
//! exports reproduce them exactly; use [`parse_timestamp`] when a point in time
//! is needed.
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::{FlomoError, Result};

/// Represents a single note (a "memo" on the service side)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Note {
    /// Opaque, globally unique identifier
    pub slug: String,
    /// When the note was created
    #[serde(default)]
    pub created_at: String,
    /// Last modification time
    #[serde(default)]
    pub updated_at: String,
    /// Raw markup, may embed inline tags
    #[serde(default)]
    pub content: String,
    /// Tags as tracked by the service
    #[serde(default)]
    pub tags: Vec<String>,
    /// Attached files, in display order
    #[serde(default)]
    pub files: Vec<FileDescriptor>,
    #[serde(default)]
    pub creator_id: Option<i64>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default, deserialize_with = "flag")]
    pub pin: bool,
    #[serde(default)]
    pub linked_count: u64,
}

/// An attached file as listed on a note or returned by the file endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileDescriptor {
    pub id: Value,
    #[serde(rename = "type", default)]
    pub file_type: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    /// Download URL, only present on file detail responses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// An entry of the tag collection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TagInfo {
    pub name: String,
    #[serde(default)]
    pub updated_at: Option<String>,
    /// Remaining fields, kept as received
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// One entry of a note's "recommended" list
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recommendation {
    #[serde(deserialize_with = "number_or_string")]
    pub similarity: f64,
    pub memo: Note,
}

/// Exclusive lower bound for the next page request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    /// Tiebreak key, never computed by the client
    pub latest_slug: Option<String>,
    /// `updated_at` of the last item, as Unix seconds
    pub latest_updated_at: i64,
}

impl PageCursor {
    /// Query parameters carrying this cursor
    pub fn params(&self) -> Vec<(String, String)> {
        let mut params = Vec::with_capacity(2);
        if let Some(slug) = &self.latest_slug {
            params.push(("latest_slug".to_string(), slug.clone()));
        }
        params.push((
            "latest_updated_at".to_string(),
            self.latest_updated_at.to_string(),
        ));
        params
    }
}

/// An item of a cursor-paginated collection.
pub trait PageItem {
    /// Derives the cursor that follows this item.
    ///
    /// `offset` interprets timestamps that carry no zone of their own.
    fn cursor(&self, offset: FixedOffset) -> Result<PageCursor>;
}

impl PageItem for Note {
    fn cursor(&self, offset: FixedOffset) -> Result<PageCursor> {
        Ok(PageCursor {
            latest_slug: Some(self.slug.clone()),
            latest_updated_at: parse_timestamp(&self.updated_at, offset)?.timestamp(),
        })
    }
}

impl PageItem for TagInfo {
    fn cursor(&self, offset: FixedOffset) -> Result<PageCursor> {
        let updated_at = self
            .updated_at
            .as_deref()
            .ok_or_else(|| FlomoError::InvalidTimestamp {
                value: format!("tag {} has no updated_at", self.name),
            })?;

        Ok(PageCursor {
            latest_slug: None,
            latest_updated_at: parse_timestamp(updated_at, offset)?.timestamp(),
        })
    }
}

/// Parses a server timestamp.
///
/// RFC 3339 values keep their own offset; naive `YYYY-MM-DD HH:MM:SS` values
/// (optionally with a `T` separator or fractional seconds) are read in `offset`.
pub fn parse_timestamp(value: &str, offset: FixedOffset) -> Result<DateTime<FixedOffset>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed);
    }

    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .and_then(|naive| offset.from_local_datetime(&naive).single())
        .ok_or_else(|| FlomoError::InvalidTimestamp {
            value: value.to_string(),
        })
}

fn flag<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !matches!(s.as_str(), "" | "0" | "false"),
        _ => false,
    })
}

fn number_or_string<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| serde::de::Error::custom("similarity out of range")),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid similarity: {}", s))),
        other => Err(serde::de::Error::custom(format!(
            "invalid similarity: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn utc8() -> FixedOffset {
        FixedOffset::east_opt(8 * 3600).unwrap()
    }

    #[test]
    fn test_naive_timestamp_uses_offset() {
        let parsed = parse_timestamp("2024-03-01 08:00:00", utc8()).unwrap();
        assert_eq!(parsed.timestamp(), 1_709_251_200);
    }

    #[test]
    fn test_rfc3339_keeps_own_offset() {
        let parsed = parse_timestamp("2024-03-01T00:00:00Z", utc8()).unwrap();
        assert_eq!(parsed.timestamp(), 1_709_251_200);
    }

    #[test]
    fn test_garbage_timestamp_is_rejected() {
        let err = parse_timestamp("yesterday", utc8()).unwrap_err();
        assert!(matches!(err, FlomoError::InvalidTimestamp { .. }));
    }

    #[test]
    fn test_note_deserializes_service_shape() {
        let note: Note = serde_json::from_value(json!({
            "slug": "MTUyNzU0MDU3",
            "created_at": "2024-03-01 08:00:00",
            "updated_at": "2024-03-02 09:30:00",
            "content": "<p>hello #rust</p>",
            "tags": ["rust"],
            "files": [{"id": 42, "type": "image", "name": "a.png", "size": 1024}],
            "creator_id": 6782846,
            "source": "web",
            "pin": 1,
            "linked_count": 3
        }))
        .unwrap();

        assert!(note.pin);
        assert_eq!(note.files[0].file_type.as_deref(), Some("image"));
        assert_eq!(note.linked_count, 3);

        let cursor = note.cursor(utc8()).unwrap();
        assert_eq!(cursor.latest_slug.as_deref(), Some("MTUyNzU0MDU3"));
        assert_eq!(cursor.latest_updated_at, 1_709_343_000);
    }

    #[test]
    fn test_similarity_accepts_strings() {
        let rec: Recommendation = serde_json::from_value(json!({
            "similarity": "0.91",
            "memo": {"slug": "abc"}
        }))
        .unwrap();
        assert_eq!(rec.similarity, 0.91);
        assert!(!rec.memo.pin);
    }

    #[test]
    fn test_tag_cursor_has_no_slug() {
        let tag: TagInfo = serde_json::from_value(json!({
            "name": "reading/books",
            "updated_at": "2024-03-01 08:00:00",
            "order": 3
        }))
        .unwrap();

        let cursor = tag.cursor(utc8()).unwrap();
        assert_eq!(cursor.latest_slug, None);
        assert_eq!(
            cursor.params(),
            vec![("latest_updated_at".to_string(), "1709251200".to_string())]
        );
        assert_eq!(tag.extra.get("order"), Some(&json!(3)));
    }
}
