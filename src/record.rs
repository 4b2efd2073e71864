//! Chat records as handed to the pipeline.
//!
//! A [`Record`] is one message from one source (channel), optionally quoting
//! the message it replies to and describing where it was forwarded from.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::SourceError;

/// One unit of input content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub source_id: i64,
    pub record_id: i64,
    #[serde(default)]
    pub author_id: Option<i64>,
    /// Always timezone-aware; naive inputs are read as UTC.
    #[serde(deserialize_with = "deserialize_instant")]
    pub timestamp: DateTime<FixedOffset>,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<ReplyStub>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forward: Option<ForwardStub>,
}

/// The message a record replies to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplyStub {
    #[serde(default)]
    pub record_id: Option<i64>,
    #[serde(default)]
    pub author_id: Option<i64>,
    #[serde(default)]
    pub text: String,
}

/// Origin of a forwarded record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForwardStub {
    #[serde(default)]
    pub from_author_id: Option<i64>,
    #[serde(default)]
    pub from_source_id: Option<i64>,
    #[serde(default)]
    pub from_name: Option<String>,
    #[serde(default)]
    pub from_record_id: Option<i64>,
}

impl Record {
    pub fn new(
        source_id: i64,
        record_id: i64,
        timestamp: DateTime<FixedOffset>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            source_id,
            record_id,
            author_id: None,
            timestamp,
            text: text.into(),
            reply: None,
            forward: None,
        }
    }

    pub fn with_author(mut self, author_id: i64) -> Self {
        self.author_id = Some(author_id);
        self
    }

    pub fn with_reply(mut self, reply: ReplyStub) -> Self {
        self.reply = Some(reply);
        self
    }

    pub fn with_forward(mut self, forward: ForwardStub) -> Self {
        self.forward = Some(forward);
        self
    }

    /// Text of the quoted reply, empty when there is none.
    pub fn reply_text(&self) -> &str {
        self.reply.as_ref().map_or("", |r| r.text.as_str())
    }

    /// Copy of this record with its own and its reply's text replaced.
    /// Nothing else changes.
    pub fn with_texts(&self, text: String, reply_text: String) -> Self {
        let mut out = self.clone();
        out.text = text;
        if let Some(reply) = out.reply.as_mut() {
            reply.text = reply_text;
        }
        out
    }
}

/// Attach UTC to a naive instant.
pub fn ensure_aware(value: NaiveDateTime) -> DateTime<FixedOffset> {
    Utc.from_utc_datetime(&value).fixed_offset()
}

/// Parse an ISO-8601 instant. Values without an offset are taken as UTC.
pub fn parse_instant(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if let Ok(aware) = DateTime::parse_from_rfc3339(raw) {
        return Some(aware);
    }
    const NAIVE_FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];
    if let Some(naive) = NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
    {
        return Some(ensure_aware(naive));
    }
    chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(ensure_aware)
}

fn deserialize_instant<'de, D>(deserializer: D) -> Result<DateTime<FixedOffset>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_instant(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
}

/// Stable sort by instant, oldest first. Offsets do not affect the order.
pub fn sort_chronologically(records: &mut [Record]) {
    records.sort_by_key(|r| r.timestamp.with_timezone(&Utc));
}

/// Inclusive time window for fetching records.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    pub start: Option<DateTime<FixedOffset>>,
    pub end: Option<DateTime<FixedOffset>>,
}

impl TimeRange {
    /// Unbounded on both sides.
    pub fn all() -> Self {
        Self {
            start: None,
            end: None,
        }
    }

    pub fn new(
        start: Option<DateTime<FixedOffset>>,
        end: Option<DateTime<FixedOffset>>,
    ) -> Result<Self, SourceError> {
        if let (Some(s), Some(e)) = (start, end) {
            if e < s {
                return Err(SourceError::InvalidRange {
                    start: s.to_rfc3339(),
                    end: e.to_rfc3339(),
                });
            }
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, instant: &DateTime<FixedOffset>) -> bool {
        self.start.map_or(true, |s| *instant >= s) && self.end.map_or(true, |e| *instant <= e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_naive_timestamp_is_utc() {
        let parsed = parse_instant("2026-01-01T10:30:00").unwrap();
        assert_eq!(parsed.offset().local_minus_utc(), 0);
        assert_eq!(parsed.to_rfc3339(), "2026-01-01T10:30:00+00:00");
    }

    #[test]
    fn test_aware_timestamp_keeps_offset() {
        let parsed = parse_instant("2026-01-01T10:30:00+03:00").unwrap();
        assert_eq!(parsed.offset().local_minus_utc(), 3 * 3600);
    }

    #[test]
    fn test_record_deserialize_minimal() {
        let record: Record = serde_json::from_str(
            r#"{"source_id": 1, "record_id": 2, "timestamp": "2026-01-01 00:00:00"}"#,
        )
        .unwrap();
        assert_eq!(record.text, "");
        assert!(record.author_id.is_none());
        assert!(record.reply.is_none());
        assert_eq!(record.timestamp.to_rfc3339(), "2026-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_record_rejects_bad_timestamp() {
        let result: Result<Record, _> = serde_json::from_str(
            r#"{"source_id": 1, "record_id": 2, "timestamp": "yesterday"}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_sort_compares_instants() {
        let a = Record::new(1, 1, parse_instant("2026-01-01T12:00:00+05:00").unwrap(), "a");
        let b = Record::new(1, 2, parse_instant("2026-01-01T08:00:00Z").unwrap(), "b");
        let mut records = vec![b.clone(), a.clone()];
        sort_chronologically(&mut records);
        // 12:00+05:00 is 07:00 UTC, before 08:00 UTC
        assert_eq!(records[0].record_id, 1);
        assert_eq!(records[1].record_id, 2);
    }

    #[test]
    fn test_with_texts_only_touches_text() {
        let record = Record::new(1, 2, parse_instant("2026-01-01").unwrap(), "hello")
            .with_author(7)
            .with_reply(ReplyStub {
                record_id: Some(1),
                author_id: Some(8),
                text: "quoted".into(),
            });
        let trimmed = record.with_texts("he".into(), String::new());
        assert_eq!(trimmed.text, "he");
        assert_eq!(trimmed.reply_text(), "");
        assert_eq!(trimmed.author_id, Some(7));
        assert_eq!(trimmed.reply.as_ref().unwrap().author_id, Some(8));
    }

    #[test]
    fn test_time_range() {
        let start = parse_instant("2026-01-01").unwrap();
        let end = parse_instant("2026-01-31").unwrap();
        assert!(TimeRange::new(Some(end), Some(start)).is_err());

        let range = TimeRange::new(Some(start), Some(end)).unwrap();
        assert!(range.contains(&parse_instant("2026-01-15").unwrap()));
        assert!(range.contains(&end));
        assert!(!range.contains(&parse_instant("2026-02-01").unwrap()));
        assert!(TimeRange::all().contains(&start));
    }
}
