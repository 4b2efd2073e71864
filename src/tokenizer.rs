//! Token counting.
//!
//! Every size decision in the pipeline (trimming, packing, budget checks)
//! goes through a [`TokenCounter`]. Two implementations exist:
//! - [`BpeTokenizer`]: real BPE vocabularies from `tiktoken-rs`, chosen by
//!   model name with a `cl100k_base` fallback for models it does not know.
//! - [`CharEstimator`]: the classic "four characters per token" estimate.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use tiktoken_rs::tokenizer::Tokenizer;
use tiktoken_rs::{CoreBPE, Rank};
use tracing::{debug, warn};

/// Vocabulary used when the model name is not recognised.
pub const FALLBACK_VOCABULARY: &str = "cl100k_base";

/// Characters per token assumed by [`CharEstimator`].
pub const CHARS_PER_TOKEN: usize = 4;

/// Measures and cuts text in tokens.
pub trait TokenCounter: Send + Sync {
    /// Number of tokens in `text`. Zero exactly when `text` is empty.
    fn count(&self, text: &str) -> usize;

    /// Longest prefix of `text` that fits in `max_tokens`, trailing
    /// whitespace stripped. Text that already fits is returned unchanged.
    fn truncate(&self, text: &str, max_tokens: usize) -> String;

    /// Cut `text` into ordered fragments of at most `max_tokens` each.
    ///
    /// Concatenating the fragments gives back `text`. A fragment can only
    /// exceed `max_tokens` when the vocabulary cannot represent a smaller
    /// piece (e.g. one character spanning several byte-level tokens).
    fn split(&self, text: &str, max_tokens: usize) -> Vec<String>;

    /// Vocabulary name, for logs.
    fn name(&self) -> &str;
}

fn vocabulary_cache() -> &'static Mutex<HashMap<String, BpeTokenizer>> {
    static CACHE: OnceLock<Mutex<HashMap<String, BpeTokenizer>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Encoding name of a tiktoken vocabulary.
fn vocabulary_name(kind: Tokenizer) -> &'static str {
    match kind {
        Tokenizer::O200kHarmony => "o200k_harmony",
        Tokenizer::O200kBase => "o200k_base",
        Tokenizer::Cl100kBase => "cl100k_base",
        Tokenizer::P50kBase => "p50k_base",
        Tokenizer::R50kBase | Tokenizer::Gpt2 => "r50k_base",
        Tokenizer::P50kEdit => "p50k_edit",
    }
}

/// BPE tokenizer backed by a process-wide, read-only vocabulary.
#[derive(Clone)]
pub struct BpeTokenizer {
    bpe: Arc<CoreBPE>,
    vocabulary: String,
}

impl BpeTokenizer {
    /// Tokenizer for `model`, falling back to `cl100k_base` for unknown names.
    ///
    /// Vocabularies are loaded once per process and shared by every model
    /// that maps to them. Returns `None` only if the vocabulary fails to load.
    pub fn for_model(model: &str) -> Option<Self> {
        let kind = tiktoken_rs::tokenizer::get_tokenizer(model).unwrap_or_else(|| {
            debug!(model, "No model-specific vocabulary, using {}", FALLBACK_VOCABULARY);
            Tokenizer::Cl100kBase
        });
        let vocabulary = vocabulary_name(kind);

        let mut cache = vocabulary_cache()
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(tokenizer) = cache.get(vocabulary) {
            return Some(tokenizer.clone());
        }

        let tokenizer = Self {
            bpe: Arc::new(tiktoken_rs::get_bpe_from_tokenizer(kind).ok()?),
            vocabulary: vocabulary.to_string(),
        };
        cache.insert(vocabulary.to_string(), tokenizer.clone());
        Some(tokenizer)
    }

    /// Token ids of `text`.
    pub fn encode(&self, text: &str) -> Vec<Rank> {
        self.bpe.encode_with_special_tokens(text)
    }

    /// Text of `tokens`, or `None` if they do not form valid UTF-8
    /// (a slice that starts or ends inside a multi-byte character).
    pub fn decode(&self, tokens: &[Rank]) -> Option<String> {
        self.bpe.decode(tokens.to_vec()).ok()
    }

    /// Longest decodable slice `tokens[start..end]` with `end <= limit`
    /// whose text re-encodes within `max_tokens`.
    fn fitting_piece(
        &self,
        tokens: &[Rank],
        start: usize,
        limit: usize,
        max_tokens: usize,
    ) -> Option<(String, usize)> {
        let mut end = limit;
        while end > start {
            if let Some(piece) = self.decode(&tokens[start..end]) {
                if self.count(&piece) <= max_tokens {
                    return Some((piece, end));
                }
            }
            end -= 1;
        }
        None
    }

    /// Shortest decodable slice starting at `start`.
    fn smallest_piece(&self, tokens: &[Rank], start: usize) -> (String, usize) {
        for end in start + 1..=tokens.len() {
            if let Some(piece) = self.decode(&tokens[start..end]) {
                return (piece, end);
            }
        }
        (String::new(), tokens.len())
    }
}

impl TokenCounter for BpeTokenizer {
    fn count(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        self.encode(text).len()
    }

    fn truncate(&self, text: &str, max_tokens: usize) -> String {
        if max_tokens == 0 {
            return String::new();
        }
        let tokens = self.encode(text);
        if tokens.len() <= max_tokens {
            return text.to_string();
        }
        self.fitting_piece(&tokens, 0, max_tokens, max_tokens)
            .map(|(piece, _)| piece.trim_end().to_string())
            .unwrap_or_default()
    }

    fn split(&self, text: &str, max_tokens: usize) -> Vec<String> {
        let tokens = self.encode(text);
        if tokens.len() <= max_tokens || max_tokens == 0 {
            return vec![text.to_string()];
        }

        let mut fragments = Vec::new();
        let mut start = 0;
        while start < tokens.len() {
            let limit = (start + max_tokens).min(tokens.len());
            let (piece, end) = match self.fitting_piece(&tokens, start, limit, max_tokens) {
                Some(found) => found,
                None => self.smallest_piece(&tokens, start),
            };
            fragments.push(piece);
            start = end;
        }
        fragments
    }

    fn name(&self) -> &str {
        &self.vocabulary
    }
}

/// Character-based estimate: one token per four characters, rounded up.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharEstimator;

impl TokenCounter for CharEstimator {
    fn count(&self, text: &str) -> usize {
        let chars = text.chars().count();
        chars.div_ceil(CHARS_PER_TOKEN)
    }

    fn truncate(&self, text: &str, max_tokens: usize) -> String {
        if max_tokens == 0 {
            return String::new();
        }
        let max_chars = max_tokens * CHARS_PER_TOKEN;
        if text.chars().count() <= max_chars {
            return text.to_string();
        }
        let cut: String = text.chars().take(max_chars).collect();
        cut.trim_end().to_string()
    }

    fn split(&self, text: &str, max_tokens: usize) -> Vec<String> {
        if max_tokens == 0 || self.count(text) <= max_tokens {
            return vec![text.to_string()];
        }
        let chars: Vec<char> = text.chars().collect();
        chars
            .chunks(max_tokens * CHARS_PER_TOKEN)
            .map(|window| window.iter().collect())
            .collect()
    }

    fn name(&self) -> &str {
        "chars/4"
    }
}

/// Tokenizer choice from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenizerKind {
    /// BPE vocabulary selected by model name
    #[default]
    Bpe,
    /// Four characters per token
    Estimate,
}

impl TokenizerKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bpe => "bpe",
            Self::Estimate => "estimate",
        }
    }
}

/// Build the configured counter. Never fails: if no BPE vocabulary can be
/// loaded the character estimate is used instead.
pub fn counter_for(kind: TokenizerKind, model: &str) -> Arc<dyn TokenCounter> {
    match kind {
        TokenizerKind::Estimate => Arc::new(CharEstimator),
        TokenizerKind::Bpe => match BpeTokenizer::for_model(model) {
            Some(tokenizer) => Arc::new(tokenizer),
            None => {
                warn!(model, "BPE vocabulary unavailable, estimating tokens from characters");
                Arc::new(CharEstimator)
            }
        },
    }
}
