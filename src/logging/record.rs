//! Log record model: severity levels, bounded tag/message storage, JSON encoding.
//!
//! Records are sized for memory-constrained targets: tag and message are
//! truncated into fixed budgets at construction time, so a record can never
//! grow past `MAX_TAG_LEN + MAX_MESSAGE_LEN` bytes of text no matter what the
//! caller formats into it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Write as _;

/// Maximum stored tag size in bytes; one byte is reserved, so stored tags are
/// at most `MAX_TAG_LEN - 1` bytes long.
pub const MAX_TAG_LEN: usize = 20;

/// Maximum stored message size in bytes; one byte is reserved, so stored
/// messages are at most `MAX_MESSAGE_LEN - 1` bytes long.
pub const MAX_MESSAGE_LEN: usize = 156;

/// Marker appended (within the message budget) when a message was cut short.
pub const TRUNCATION_MARKER: &str = " [truncated]";

/// Tag used when a caller passes an empty tag.
pub const DEFAULT_TAG: &str = "device";

/// Log severity, ordered from least to most severe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
}

impl Severity {
    /// Stable numeric form, used for atomic filter storage.
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            Severity::Debug => 0,
            Severity::Info => 1,
            Severity::Warning => 2,
            Severity::Error => 3,
        }
    }

    pub(crate) fn from_u8(raw: u8) -> Severity {
        match raw {
            0 => Severity::Debug,
            1 => Severity::Info,
            2 => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        f.write_str(name)
    }
}

/// A single structured log entry. Immutable once constructed; the constructor
/// enforces the tag and message budgets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub tag: String,
    #[serde(rename = "level")]
    pub severity: Severity,
    pub message: String,
}

impl LogRecord {
    /// Build a record, truncating `tag` and `message` into their budgets.
    ///
    /// An oversized message is cut on a char boundary and gets
    /// [`TRUNCATION_MARKER`] appended at the tail; the marker wins over message
    /// content when both cannot fit. Tags are truncated without a marker. An
    /// empty tag becomes [`DEFAULT_TAG`].
    pub fn new(tag: &str, severity: Severity, message: &str) -> Self {
        let tag = if tag.is_empty() { DEFAULT_TAG } else { tag };
        LogRecord {
            tag: clip(tag, MAX_TAG_LEN - 1).to_string(),
            severity,
            message: bound_message(message),
        }
    }

    /// Build a record from format arguments, rendering through a writer that
    /// stops at the message budget regardless of argument count or size.
    pub fn from_args(tag: &str, severity: Severity, args: fmt::Arguments<'_>) -> Self {
        let mut out = ClippedWriter::new(MAX_MESSAGE_LEN);
        // Infallible by construction; ClippedWriter never reports an error.
        let _ = out.write_fmt(args);
        Self::new(tag, severity, &out.buf)
    }

    /// Encode as a JSON object with `tag`/`level`/`message` keys.
    pub fn to_json(&self) -> String {
        // A record only holds strings and an enum; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Decode a record previously produced by [`LogRecord::to_json`].
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Truncate to at most `limit` bytes on a char boundary.
fn clip(s: &str, limit: usize) -> &str {
    if s.len() <= limit {
        return s;
    }
    let mut end = limit;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn bound_message(message: &str) -> String {
    let budget = MAX_MESSAGE_LEN - 1;
    if message.len() <= budget {
        return message.to_string();
    }
    if budget <= TRUNCATION_MARKER.len() {
        return clip(TRUNCATION_MARKER, budget).to_string();
    }
    let mut out = clip(message, budget - TRUNCATION_MARKER.len()).to_string();
    out.push_str(TRUNCATION_MARKER);
    out
}

/// `fmt::Write` sink that silently discards everything past its limit.
struct ClippedWriter {
    buf: String,
    limit: usize,
}

impl ClippedWriter {
    fn new(limit: usize) -> Self {
        ClippedWriter {
            buf: String::with_capacity(limit.min(64)),
            limit,
        }
    }
}

impl fmt::Write for ClippedWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = self.limit - self.buf.len();
        if room == 0 {
            return Ok(());
        }
        self.buf.push_str(clip(s, room));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering() {
        assert!(Severity::Debug < Severity::Info);
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
    }

    #[test]
    fn severity_u8_round_trip() {
        for sev in [
            Severity::Debug,
            Severity::Info,
            Severity::Warning,
            Severity::Error,
        ] {
            assert_eq!(Severity::from_u8(sev.as_u8()), sev);
        }
    }

    #[test]
    fn short_fields_stored_verbatim() {
        let record = LogRecord::new("sensors", Severity::Info, "boot complete");
        assert_eq!(record.tag, "sensors");
        assert_eq!(record.message, "boot complete");
    }

    #[test]
    fn empty_tag_gets_default() {
        let record = LogRecord::new("", Severity::Debug, "hello");
        assert_eq!(record.tag, DEFAULT_TAG);
    }

    #[test]
    fn oversized_tag_is_truncated_without_marker() {
        let tag = "a".repeat(MAX_TAG_LEN * 2);
        let record = LogRecord::new(&tag, Severity::Info, "msg");
        assert_eq!(record.tag.len(), MAX_TAG_LEN - 1);
        assert!(!record.tag.contains(TRUNCATION_MARKER.trim()));
    }

    #[test]
    fn oversized_message_gets_marker_within_budget() {
        let message = "x".repeat(MAX_MESSAGE_LEN * 3);
        let record = LogRecord::new("t", Severity::Warning, &message);
        assert!(record.message.len() <= MAX_MESSAGE_LEN - 1);
        assert!(record.message.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn message_at_budget_is_not_marked() {
        let message = "y".repeat(MAX_MESSAGE_LEN - 1);
        let record = LogRecord::new("t", Severity::Info, &message);
        assert_eq!(record.message, message);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        // Multibyte characters straddling the cut point must not split.
        let message = "é".repeat(MAX_MESSAGE_LEN);
        let record = LogRecord::new("t", Severity::Info, &message);
        assert!(record.message.len() <= MAX_MESSAGE_LEN - 1);
        assert!(record.message.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn from_args_renders_bounded() {
        let record = LogRecord::from_args(
            "fmt",
            Severity::Info,
            format_args!("value = {}", "z".repeat(1000)),
        );
        assert!(record.message.len() <= MAX_MESSAGE_LEN - 1);
        assert!(record.message.starts_with("value = z"));
        assert!(record.message.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn from_args_small_values_unchanged() {
        let record = LogRecord::from_args("fmt", Severity::Debug, format_args!("n = {}", 42));
        assert_eq!(record.message, "n = 42");
    }

    #[test]
    fn json_round_trip_preserves_fields() {
        let record = LogRecord::new("net", Severity::Error, "link down");
        let parsed = LogRecord::from_json(&record.to_json()).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn json_uses_level_key() {
        let record = LogRecord::new("net", Severity::Warning, "m");
        let json = record.to_json();
        assert!(json.contains("\"level\":\"warning\""));
        assert!(json.contains("\"tag\":\"net\""));
    }
}
