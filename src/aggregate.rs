//! Aggregation of per-chunk model replies.
//!
//! Each reply is expected to carry `{"hashtags": [{"tag": "...", "count": N}]}`,
//! possibly wrapped in prose or a fenced code block. Replies are parsed in
//! two stages (strict, then the outermost brace span) and their items are
//! merged into one [`TagCounts`]. Bad items are dropped; a reply that cannot
//! be parsed at all is an error for the caller to surface.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ParseFailure;

/// Key of the item list in a model reply.
pub const HASHTAGS_FIELD: &str = "hashtags";

fn fence_open() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^```(?:json)?\s*").expect("valid regex"))
}

fn fence_close() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*```$").expect("valid regex"))
}

fn brace_span() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\{.*\}").expect("valid regex"))
}

/// Strip a surrounding code fence, if any.
fn strip_fences(reply: &str) -> &str {
    let trimmed = reply.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }
    let start = fence_open().find(trimmed).map_or(0, |m| m.end());
    let body = &trimmed[start..];
    let end = fence_close().find(body).map_or(body.len(), |m| m.start());
    &body[..end]
}

/// Pull the JSON payload out of a model reply.
pub fn extract_payload(reply: &str) -> Result<Value, ParseFailure> {
    let body = strip_fences(reply);
    if body.is_empty() {
        return Err(ParseFailure::Empty);
    }

    let strict_error = match serde_json::from_str::<Value>(body) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    let Some(span) = brace_span().find(body) else {
        return Err(if body.contains('{') {
            ParseFailure::InvalidJson(strict_error.to_string())
        } else {
            ParseFailure::NoJsonObject
        });
    };
    serde_json::from_str::<Value>(span.as_str())
        .map_err(|e| ParseFailure::InvalidJson(e.to_string()))
}

/// The item list of a parsed payload.
pub fn hashtag_items(payload: &Value) -> Result<&[Value], ParseFailure> {
    let object = payload.as_object().ok_or(ParseFailure::NotAnObject)?;
    object
        .get(HASHTAGS_FIELD)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .ok_or_else(|| ParseFailure::MissingList(HASHTAGS_FIELD.to_string()))
}

/// Canonical tag form: trimmed, lower-cased, `#`-prefixed, no whitespace.
pub fn normalize_tag(raw: &str) -> Option<String> {
    let value = raw.trim().to_lowercase();
    if value.is_empty() {
        return None;
    }
    let value = if value.starts_with('#') {
        value
    } else {
        format!("#{value}")
    };
    if value.chars().any(char::is_whitespace) {
        return None;
    }
    Some(value)
}

fn item_tag(item: &Value) -> Option<String> {
    match item.get("tag")? {
        Value::String(s) => normalize_tag(s),
        Value::Number(n) => normalize_tag(&n.to_string()),
        _ => None,
    }
}

/// Positive integer count. Accepts integers, floats (truncated) and
/// numeric strings.
pub fn parse_count(value: &Value) -> Option<u64> {
    let count = match value {
        Value::Number(n) => match n.as_i64() {
            Some(i) => i,
            None => match n.as_u64() {
                Some(u) => return (u > 0).then_some(u),
                None => {
                    let f = n.as_f64()?;
                    if !f.is_finite() {
                        return None;
                    }
                    f.trunc() as i64
                }
            },
        },
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    u64::try_from(count).ok().filter(|c| *c > 0)
}

/// Outcome of merging one reply's items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub accepted: usize,
    pub dropped: usize,
}

/// One ranked tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagCount {
    pub tag: String,
    pub count: u64,
}

/// Cumulative counts by normalized tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagCounts {
    counts: BTreeMap<String, u64>,
}

impl TagCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add well-formed items; skip the rest.
    pub fn merge(&mut self, items: &[Value]) -> MergeStats {
        let mut stats = MergeStats::default();
        for item in items {
            let parsed = item_tag(item).zip(item.get("count").and_then(parse_count));
            match parsed {
                Some((tag, count)) => {
                    self.add(tag, count);
                    stats.accepted += 1;
                }
                None => stats.dropped += 1,
            }
        }
        stats
    }

    /// Add another set of counts into this one.
    pub fn absorb(&mut self, other: TagCounts) {
        for (tag, count) in other.counts {
            self.add(tag, count);
        }
    }

    fn add(&mut self, tag: String, count: u64) {
        let entry = self.counts.entry(tag).or_insert(0);
        *entry = entry.saturating_add(count);
    }

    pub fn get(&self, tag: &str) -> Option<u64> {
        self.counts.get(tag).copied()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Tags by descending count, ties in ascending tag order.
    pub fn ranked(&self) -> Vec<TagCount> {
        let mut ranked: Vec<TagCount> = self
            .counts
            .iter()
            .map(|(tag, count)| TagCount {
                tag: tag.clone(),
                count: *count,
            })
            .collect();
        ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.tag.cmp(&b.tag)));
        ranked
    }
}
