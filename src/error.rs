//! Error types for tagtally.
//!
//! Library boundaries return these typed errors; the CLI wraps them in
//! `anyhow` with context.

/// Terminal error of one analysis run. No partial result accompanies it.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Token budget infeasible: {0}")]
    BudgetInfeasible(String),

    #[error("Model request failed: {0}")]
    Transport(#[from] LlmError),

    #[error("Model response parsing failed in chunk {chunk}: {reason}")]
    MalformedReply { chunk: usize, reason: ParseFailure },
}

impl AnalysisError {
    /// Whether the failure came from the external model service
    /// (transport or reply parsing), as opposed to the caller's input.
    pub fn is_external(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::MalformedReply { .. })
    }
}

/// Errors from the chat completion collaborator.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API returned status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Provider returned no content")]
    EmptyReply,

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Missing API key (set DEEPSEEK_API_KEY or TAGTALLY_API_KEY)")]
    MissingApiKey,
}

/// Why a model reply could not be turned into a structured payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseFailure {
    #[error("reply is empty")]
    Empty,

    #[error("no JSON object found in reply")]
    NoJsonObject,

    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("payload has no `{0}` list")]
    MissingList(String),
}

/// Errors from a record source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Failed to read records from {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid record at line {line}: {message}")]
    InvalidRecord { line: usize, message: String },

    #[error("Invalid time range: end {end} is before start {start}")]
    InvalidRange { start: String, end: String },
}
