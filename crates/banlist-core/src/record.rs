//! Records as delivered by the store or the host, and actor id parsing.
//!
//! Only `event_id`, `room_id`, `type`, `state_key`, `sender` and `content`
//! are read; any other field of the incoming JSON is ignored.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{BanlistError, Result};

/// Opaque record identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl RecordId {
    /// Records with an empty id carry no identity.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One typed, keyed unit of data from a container.
///
/// Records without a `state_key` are ordinary events, not policy records.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RawRecord {
    #[serde(default)]
    pub event_id: RecordId,
    #[serde(default)]
    pub room_id: String,
    #[serde(rename = "type", default)]
    pub record_type: String,
    #[serde(default)]
    pub state_key: Option<String>,
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub content: Map<String, Value>,
}

impl RawRecord {
    /// String field of `content`, if present and a string.
    pub fn content_str(&self, field: &str) -> Option<&str> {
        self.content.get(field).and_then(Value::as_str)
    }

    /// True when both records carry the same non-empty id.
    pub fn same_identity(&self, other: &RawRecord) -> bool {
        !self.event_id.is_empty() && self.event_id == other.event_id
    }

    /// True when `other` has the same type and key as `self`.
    pub fn same_slot(&self, other: &RawRecord) -> bool {
        self.state_key.is_some()
            && self.record_type == other.record_type
            && self.state_key == other.state_key
    }
}

/// A parsed `@localpart:domain` user id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserId {
    raw: String,
    colon: usize,
}

impl UserId {
    pub fn parse(s: &str) -> Result<Self> {
        if !s.starts_with('@') {
            return Err(BanlistError::InvalidUserId(format!("{s} (missing '@' sigil)")));
        }
        let colon = s
            .find(':')
            .ok_or_else(|| BanlistError::InvalidUserId(format!("{s} (missing ':domain')")))?;
        Ok(Self {
            raw: s.to_string(),
            colon,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn localpart(&self) -> &str {
        &self.raw[1..self.colon]
    }

    pub fn domain(&self) -> &str {
        &self.raw[self.colon + 1..]
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
