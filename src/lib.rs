//! tagtally - hashtag analysis of chat history with a language model
//!
//! Records are trimmed to fit a token budget, formatted into text blocks,
//! packed into as few requests as the budget allows, and the per-request
//! hashtag counts are merged into one ranking.

pub mod aggregate;
pub mod chunking;
pub mod config;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod record;
pub mod source;
pub mod tokenizer;

pub use aggregate::{extract_payload, normalize_tag, TagCount, TagCounts};
pub use chunking::{format_block, trim_record, Chunk, ChunkPacker, Part};
pub use config::Config;
pub use error::{AnalysisError, LlmError, ParseFailure, SourceError};
pub use llm::{ChatCompletion, ChatRequest, OpenAiCompatClient, PackingBudget, TokenBudget};
pub use pipeline::{
    AnalysisReport, AnalysisRequest, AnalysisSettings, Analyzer, PreparedRun, ProgressTracker,
    RankedTag,
};
pub use record::{ForwardStub, Record, ReplyStub, TimeRange};
pub use source::{JsonFileSource, RecordSource};
pub use tokenizer::{counter_for, BpeTokenizer, CharEstimator, TokenCounter, TokenizerKind};
