//! Analysis pipeline
//!
//! Flow: validate budget → build prefix → trim records → format blocks →
//! pack chunks → one model call per chunk, in order → merge replies → rank.
//!
//! A run is all-or-nothing: any transport failure, timeout or unparseable
//! reply aborts it without a partial result.

pub mod progress;

pub use progress::ProgressTracker;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn, Instrument};

use crate::aggregate::{extract_payload, hashtag_items, normalize_tag, MergeStats, TagCounts};
use crate::chunking::{format_block, trim_record, Chunk, ChunkPacker};
use crate::config::Config;
use crate::error::{AnalysisError, LlmError};
use crate::llm::{ChatCompletion, ChatRequest, PackingBudget, TokenBudget};
use crate::record::Record;
use crate::source::keep_newest_per_source;
use crate::tokenizer::TokenCounter;

/// Settings that stay fixed for the lifetime of an [`Analyzer`].
#[derive(Debug, Clone)]
pub struct AnalysisSettings {
    pub model: String,
    pub temperature: f32,
    pub timeout: Duration,
    pub budget: TokenBudget,
    pub system_prompt: String,
    pub prompt_template: String,
}

impl AnalysisSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.model.name.clone(),
            temperature: config.model.temperature,
            timeout: Duration::from_secs(config.model.timeout_secs),
            budget: config.budget,
            system_prompt: config.prompts.system.clone(),
            prompt_template: config.prompts.template.clone(),
        }
    }
}

/// Input of one run.
#[derive(Debug, Clone, Default)]
pub struct AnalysisRequest {
    /// Instructions for the model
    pub prompt: String,
    /// Tags already known to the caller
    pub hint_tags: Vec<String>,
    /// Records, oldest first
    pub records: Vec<Record>,
    /// Override of the configured input ceiling (may only lower it)
    pub max_input_tokens: Option<usize>,
    /// Keep only the newest N records of each source
    pub max_messages_per_source: Option<usize>,
}

/// One tag in the final result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedTag {
    pub tag: String,
    pub count: u64,
    /// The tag was among the hints
    pub already_known: bool,
}

/// Result of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub tags_ranked: Vec<RankedTag>,
    pub total_records_considered: usize,
    /// Number of model requests made
    pub chunks: usize,
}

/// A packed run, ready to be sent.
#[derive(Debug, Clone)]
pub struct PreparedRun {
    pub prefix: String,
    pub prefix_tokens: usize,
    pub chunks: Vec<Chunk>,
    pub known_tags: BTreeSet<String>,
    pub total_records: usize,
    pub budget: PackingBudget,
}

/// Fill the prompt template. Hints go in one per line.
pub fn build_prefix(template: &str, prompt: &str, hints: &[String]) -> String {
    let hints_block = hints.join("\n");
    template
        .split("{prompt}")
        .map(|piece| piece.replace("{hashtags}", &hints_block))
        .collect::<Vec<_>>()
        .join(prompt)
        .trim()
        .to_string()
}

/// Normalized hints in input order, without duplicates or invalid tags.
pub fn normalize_hints(hints: &[String]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    hints
        .iter()
        .filter_map(|h| normalize_tag(h))
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Runs analyses against one model with one tokenizer.
pub struct Analyzer {
    llm: Arc<dyn ChatCompletion>,
    counter: Arc<dyn TokenCounter>,
    settings: AnalysisSettings,
}

impl Analyzer {
    pub fn new(
        llm: Arc<dyn ChatCompletion>,
        counter: Arc<dyn TokenCounter>,
        settings: AnalysisSettings,
    ) -> Self {
        Self {
            llm,
            counter,
            settings,
        }
    }

    pub fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    /// Everything up to the model calls: budget checks, trimming, packing.
    pub fn prepare(&self, request: &AnalysisRequest) -> Result<PreparedRun, AnalysisError> {
        if request.prompt.trim().is_empty() {
            return Err(AnalysisError::Validation("Prompt must not be empty".into()));
        }

        let counter = self.counter.as_ref();
        let budget = &self.settings.budget;
        let max_input = budget.resolve(request.max_input_tokens)?;
        let system_tokens = counter.count(&self.settings.system_prompt);
        let packing = budget.packing_budget(max_input, system_tokens)?;

        let hints = normalize_hints(&request.hint_tags);
        let prefix = build_prefix(&self.settings.prompt_template, &request.prompt, &hints);
        let packer = ChunkPacker::new(counter, packing.user_content_tokens);
        let prefix_tokens = packer.prefix_tokens(&prefix);
        if prefix_tokens >= packing.user_content_tokens {
            return Err(AnalysisError::BudgetInfeasible(format!(
                "Prompt and hashtags need {} tokens, only {} available",
                prefix_tokens, packing.user_content_tokens
            )));
        }

        let records = match request.max_messages_per_source {
            Some(limit) => keep_newest_per_source(request.records.clone(), limit),
            None => request.records.clone(),
        };

        let record_ceiling = packing.user_content_tokens - prefix_tokens;
        let blocks: Vec<String> = records
            .iter()
            .map(|r| format_block(&trim_record(r, record_ceiling, counter)))
            .collect();
        let chunks = packer.pack(&prefix, &blocks)?;

        debug!(
            records = records.len(),
            chunks = chunks.len(),
            prefix_tokens,
            budget = packer.budget(),
            tokenizer = counter.name(),
            "Prepared analysis"
        );

        Ok(PreparedRun {
            prefix,
            prefix_tokens,
            chunks,
            known_tags: hints.into_iter().collect(),
            total_records: records.len(),
            budget: packing,
        })
    }

    /// Run an analysis without progress output.
    pub async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisReport, AnalysisError> {
        self.analyze_with_progress(request, &mut ProgressTracker::quiet())
            .await
    }

    /// Run an analysis, reporting each chunk to `progress`.
    pub async fn analyze_with_progress(
        &self,
        request: AnalysisRequest,
        progress: &mut ProgressTracker,
    ) -> Result<AnalysisReport, AnalysisError> {
        let run_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("analysis", %run_id, model = %self.settings.model);
        self.run(request, progress).instrument(span).await
    }

    async fn run(
        &self,
        request: AnalysisRequest,
        progress: &mut ProgressTracker,
    ) -> Result<AnalysisReport, AnalysisError> {
        let prepared = self.prepare(&request)?;
        progress.begin(prepared.chunks.len());
        info!(
            records = prepared.total_records,
            chunks = prepared.chunks.len(),
            "Starting analysis"
        );

        let mut counts = TagCounts::new();
        for (index, chunk) in prepared.chunks.iter().enumerate() {
            progress.start_chunk(index);
            match self.run_chunk(index, chunk, &prepared.prefix).await {
                Ok((chunk_counts, stats)) => {
                    counts.absorb(chunk_counts);
                    progress.finish_chunk(stats.accepted);
                }
                Err(e) => {
                    progress.fail_chunk();
                    warn!(chunk = index, error = %e, "Analysis aborted");
                    return Err(e);
                }
            }
        }

        if counts.is_empty() {
            debug!("No hashtags reported");
        }
        let tags_ranked: Vec<RankedTag> = counts
            .ranked()
            .into_iter()
            .map(|t| RankedTag {
                already_known: prepared.known_tags.contains(&t.tag),
                tag: t.tag,
                count: t.count,
            })
            .collect();
        progress.complete(tags_ranked.len());
        info!(tags = tags_ranked.len(), "Analysis complete");

        Ok(AnalysisReport {
            tags_ranked,
            total_records_considered: prepared.total_records,
            chunks: prepared.chunks.len(),
        })
    }

    /// One model call and the counts parsed from its reply.
    async fn run_chunk(
        &self,
        index: usize,
        chunk: &Chunk,
        prefix: &str,
    ) -> Result<(TagCounts, MergeStats), AnalysisError> {
        let request = ChatRequest {
            system: self.settings.system_prompt.clone(),
            user: chunk.render(prefix),
            max_output_tokens: self.settings.budget.max_output_tokens,
            temperature: self.settings.temperature,
            model: self.settings.model.clone(),
        };
        debug!(chunk = index, parts = chunk.parts.len(), tokens = chunk.tokens, "Sending chunk");

        let reply = tokio::time::timeout(self.settings.timeout, self.llm.complete(&request))
            .await
            .map_err(|_| LlmError::Timeout {
                timeout_secs: self.settings.timeout.as_secs(),
            })??;

        let malformed = |reason| AnalysisError::MalformedReply {
            chunk: index,
            reason,
        };
        let payload = extract_payload(&reply).map_err(malformed)?;
        let items = hashtag_items(&payload).map_err(malformed)?;

        let mut counts = TagCounts::new();
        let stats = counts.merge(items);
        if stats.dropped > 0 {
            debug!(chunk = index, dropped = stats.dropped, "Dropped malformed items");
        }
        Ok((counts, stats))
    }
}
