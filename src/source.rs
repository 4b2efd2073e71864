//! Record sources.
//!
//! The pipeline never fetches history itself; a [`RecordSource`] does. The
//! bundled [`JsonFileSource`] reads an exported history file (a JSON array
//! or JSON Lines) so the CLI can run without a live messaging backend.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::SourceError;
use crate::record::{sort_chronologically, Record, TimeRange};

/// Something that can produce chat history.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Records of `source_ids` (all sources when empty) inside `range`,
    /// at most `max_per_source` per source, oldest first, without
    /// duplicates within a source.
    async fn fetch(
        &self,
        source_ids: &[i64],
        range: TimeRange,
        max_per_source: Option<usize>,
    ) -> Result<Vec<Record>, SourceError>;
}

/// History export on disk.
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parse(&self, content: &str) -> Result<Vec<Record>, SourceError> {
        let trimmed = content.trim_start();
        if trimmed.starts_with('[') {
            return serde_json::from_str(trimmed).map_err(|e| SourceError::InvalidRecord {
                line: e.line(),
                message: e.to_string(),
            });
        }

        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                serde_json::from_str(line).map_err(|e| SourceError::InvalidRecord {
                    line: i + 1,
                    message: e.to_string(),
                })
            })
            .collect()
    }
}

#[async_trait]
impl RecordSource for JsonFileSource {
    async fn fetch(
        &self,
        source_ids: &[i64],
        range: TimeRange,
        max_per_source: Option<usize>,
    ) -> Result<Vec<Record>, SourceError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| SourceError::Io {
                path: self.path.display().to_string(),
                source,
            })?;
        let records = self.parse(&content)?;
        let total = records.len();
        let selected = select_records(records, source_ids, range, max_per_source);
        debug!(path = %self.path.display(), total, selected = selected.len(), "Loaded records");
        Ok(selected)
    }
}

/// Filter, deduplicate and cap records, returning them oldest first.
pub fn select_records(
    records: Vec<Record>,
    source_ids: &[i64],
    range: TimeRange,
    max_per_source: Option<usize>,
) -> Vec<Record> {
    let wanted: HashSet<i64> = source_ids.iter().copied().collect();
    let mut seen = HashSet::new();
    let mut records: Vec<Record> = records
        .into_iter()
        .filter(|r| wanted.is_empty() || wanted.contains(&r.source_id))
        .filter(|r| range.contains(&r.timestamp))
        .filter(|r| seen.insert((r.source_id, r.record_id)))
        .collect();

    sort_chronologically(&mut records);
    match max_per_source {
        Some(limit) => keep_newest_per_source(records, limit),
        None => records,
    }
}

/// Keep the last `limit` records of each source, preserving order.
pub fn keep_newest_per_source(records: Vec<Record>, limit: usize) -> Vec<Record> {
    let mut remaining: HashMap<i64, usize> = HashMap::new();
    for r in &records {
        *remaining.entry(r.source_id).or_insert(0) += 1;
    }
    records
        .into_iter()
        .filter(|r| {
            let left = remaining.get_mut(&r.source_id).map_or(0, |n| {
                let current = *n;
                *n -= 1;
                current
            });
            left <= limit
        })
        .collect()
}
