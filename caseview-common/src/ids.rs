//! Canonical identifiers and the identifier normalizer
//!
//! Upstream resources reference each other through a storage-native object id
//! that serializes differently depending on the transport path:
//! - a bare hex string (`"65a1f0c2e4b0a1b2c3d4e5f6"`)
//! - an object carrying a nested `_id` / `id`
//! - a driver wrapper exposing a string conversion (`Display`)
//! - extended JSON (`{ "$oid": "65a1f0c2e4b0a1b2c3d4e5f6" }`)
//!
//! Every join point goes through [`IdNormalizer::normalize`] so the fallback
//! chain exists in exactly one place. The canonical form is [`ObjectId`]:
//! 24 lowercase hexadecimal characters.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Length of a canonical object id in hex characters
pub const OBJECT_ID_LEN: usize = 24;

/// Maximum `_id`/`id` nesting followed before giving up
const MAX_NESTING: usize = 8;

/// Longest input excerpt carried in an error message
const MAX_EXCERPT: usize = 96;

/// `"_id": "<hex>"`, `"id": "<hex>"` or `"$oid": "<hex>"` anywhere in serialized JSON
static KEYED_HEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""(?:_id|id|\$oid)"\s*:\s*"([0-9a-fA-F]{24})""#).expect("keyed id pattern")
});

/// Standalone 24-hex run (not part of a longer hex run)
static ANY_HEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[^0-9a-fA-F])([0-9a-fA-F]{24})(?:[^0-9a-fA-F]|$)").expect("hex run pattern")
});

/// Driver shell form, e.g. `ObjectId("65a1...")`
static SHELL_FORM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^ObjectId\(\s*"?([0-9a-fA-F]{24})"?\s*\)$"#).expect("shell form pattern")
});

/// Identifier normalization errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    /// No valid 24-hex id could be extracted by any strategy
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),
}

/// Canonical identifier: 24 lowercase hex characters
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectId(String);

impl ObjectId {
    /// Parse a canonical id from text (surrounding whitespace and upper case accepted)
    pub fn parse(text: &str) -> Result<Self, IdError> {
        from_text(text).ok_or_else(|| IdError::InvalidIdentifier(excerpt(text)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ObjectId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ObjectId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ObjectId> for String {
    fn from(id: ObjectId) -> Self {
        id.0
    }
}

/// How the last-resort extraction scans a serialized object
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdScanMode {
    /// Only accept a 24-hex string stored under a key named `_id`, `id` or `$oid`
    #[default]
    Keyed,
    /// Accept any standalone 24-hex run in the serialized text
    Anywhere,
}

/// Identifier as received, before normalization
#[derive(Clone, Copy)]
pub enum RawId<'a> {
    /// Bare string
    Text(&'a str),
    /// JSON value of unknown shape
    Json(&'a Value),
    /// Driver wrapper exposing a string conversion
    Wrapper(&'a dyn fmt::Display),
}

impl<'a> From<&'a Value> for RawId<'a> {
    fn from(value: &'a Value) -> Self {
        RawId::Json(value)
    }
}

impl<'a> From<&'a str> for RawId<'a> {
    fn from(text: &'a str) -> Self {
        RawId::Text(text)
    }
}

impl fmt::Debug for RawId<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawId::Text(s) => f.debug_tuple("Text").field(s).finish(),
            RawId::Json(v) => f.debug_tuple("Json").field(v).finish(),
            RawId::Wrapper(w) => f.debug_tuple("Wrapper").field(&w.to_string()).finish(),
        }
    }
}

/// Identifier normalizer
///
/// Ordered fallback, first success wins:
/// 1. string → validate directly
/// 2. object with nested `_id` / `id` → recurse into it
/// 3. wrapper whose string conversion is a 24-hex id (or `ObjectId("...")`)
/// 4. object carrying `$oid`
/// 5. serialize and extract a 24-hex run (see [`IdScanMode`])
/// 6. fail with [`IdError::InvalidIdentifier`]
#[derive(Debug, Clone, Copy, Default)]
pub struct IdNormalizer {
    mode: IdScanMode,
}

impl IdNormalizer {
    pub fn new(mode: IdScanMode) -> Self {
        Self { mode }
    }

    /// Normalize any supported encoding into its canonical form
    ///
    /// # Errors
    /// Returns `IdError::InvalidIdentifier` if no strategy yields a valid id.
    /// A malformed string is never returned.
    pub fn normalize(&self, raw: RawId<'_>) -> Result<ObjectId, IdError> {
        self.decode(raw, 0)
            .ok_or_else(|| IdError::InvalidIdentifier(describe(raw)))
    }

    /// Normalize a JSON value
    pub fn value(&self, value: &Value) -> Result<ObjectId, IdError> {
        self.normalize(RawId::Json(value))
    }

    /// Normalize a bare string
    pub fn text(&self, text: &str) -> Result<ObjectId, IdError> {
        self.normalize(RawId::Text(text))
    }

    fn decode(&self, raw: RawId<'_>, depth: usize) -> Option<ObjectId> {
        match raw {
            RawId::Text(text) => from_text(text),
            RawId::Wrapper(wrapper) => {
                let converted = wrapper.to_string();
                from_text(&converted)
                    .or_else(|| from_shell_form(&converted))
                    .or_else(|| scan(&converted, self.mode))
            }
            RawId::Json(value) => match value {
                Value::String(text) => from_text(text),
                Value::Object(map) => {
                    if depth < MAX_NESTING {
                        for key in ["_id", "id"] {
                            if let Some(inner) = map.get(key) {
                                if let Some(id) = self.decode(RawId::Json(inner), depth + 1) {
                                    return Some(id);
                                }
                            }
                        }
                    }

                    // A plain JSON object has no string conversion besides its JSON text,
                    // which the serialized scan covers.
                    if let Some(Value::String(oid)) = map.get("$oid") {
                        if let Some(id) = from_text(oid) {
                            return Some(id);
                        }
                    }

                    scan(&value.to_string(), self.mode)
                }
                _ => None,
            },
        }
    }
}

/// Normalize a JSON value with the default (keyed) scan mode
pub fn normalize_value(value: &Value) -> Result<ObjectId, IdError> {
    IdNormalizer::default().value(value)
}

/// Normalize a bare string
pub fn normalize_str(text: &str) -> Result<ObjectId, IdError> {
    IdNormalizer::default().text(text)
}

/// Returns true if `text` is exactly 24 hex digits
pub fn is_object_id_hex(text: &str) -> bool {
    text.len() == OBJECT_ID_LEN && text.bytes().all(|b| b.is_ascii_hexdigit())
}

fn from_text(text: &str) -> Option<ObjectId> {
    let trimmed = text.trim();
    if is_object_id_hex(trimmed) {
        Some(ObjectId(trimmed.to_ascii_lowercase()))
    } else {
        None
    }
}

fn from_shell_form(text: &str) -> Option<ObjectId> {
    SHELL_FORM
        .captures(text.trim())
        .and_then(|caps| caps.get(1))
        .and_then(|m| from_text(m.as_str()))
}

fn scan(serialized: &str, mode: IdScanMode) -> Option<ObjectId> {
    let pattern = match mode {
        IdScanMode::Keyed => &*KEYED_HEX,
        IdScanMode::Anywhere => &*ANY_HEX,
    };
    pattern
        .captures(serialized)
        .and_then(|caps| caps.get(1))
        .and_then(|m| from_text(m.as_str()))
}

fn describe(raw: RawId<'_>) -> String {
    match raw {
        RawId::Text(text) => excerpt(text),
        RawId::Json(value) => excerpt(&value.to_string()),
        RawId::Wrapper(wrapper) => excerpt(&wrapper.to_string()),
    }
}

fn excerpt(text: &str) -> String {
    if text.chars().count() <= MAX_EXCERPT {
        text.to_string()
    } else {
        let head: String = text.chars().take(MAX_EXCERPT).collect();
        format!("{}...", head)
    }
}
