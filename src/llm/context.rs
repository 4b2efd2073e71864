//! Token budget for one request.
//!
//! The model's context window is shared by the request envelope, the system
//! instructions, the user content and the reply. This module works out how
//! much of it the packer may fill with user content.

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

/// Messages per request: system instructions and user content.
pub const MESSAGES_PER_REQUEST: usize = 2;

/// Token ceilings, fixed for the duration of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenBudget {
    /// Context window of the model (input + output)
    pub max_total_tokens: usize,
    /// Tokens reserved for the reply
    pub max_output_tokens: usize,
    /// Ceiling on input tokens per request
    pub max_input_tokens: usize,
    /// Slack kept free to absorb estimation error
    pub safety_margin: usize,
    /// Envelope overhead per message (role, separators)
    pub tokens_per_message: usize,
    /// Envelope overhead per request (reply priming)
    pub tokens_per_request: usize,
}

impl Default for TokenBudget {
    fn default() -> Self {
        Self {
            max_total_tokens: 64_000,
            max_output_tokens: 4_000,
            max_input_tokens: 60_000,
            safety_margin: 512,
            tokens_per_message: 4,
            tokens_per_request: 3,
        }
    }
}

/// What the packer may use in one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackingBudget {
    /// Input ceiling in force for this run
    pub max_input_tokens: usize,
    /// Tokens available for prefix plus blocks
    pub user_content_tokens: usize,
}

impl TokenBudget {
    /// Check that the configured ceilings are consistent.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.max_output_tokens == 0 {
            return Err(AnalysisError::Validation(
                "max_output_tokens must be positive".into(),
            ));
        }
        let requested = self
            .max_input_tokens
            .checked_add(self.max_output_tokens)
            .ok_or_else(|| AnalysisError::Validation("token ceilings overflow".into()))?;
        if requested > self.max_total_tokens {
            return Err(AnalysisError::Validation(format!(
                "max_input_tokens ({}) + max_output_tokens ({}) exceeds max_total_tokens ({})",
                self.max_input_tokens, self.max_output_tokens, self.max_total_tokens
            )));
        }
        Ok(())
    }

    /// Input ceiling for one run: the requested value, or the configured one.
    pub fn resolve(&self, requested: Option<usize>) -> Result<usize, AnalysisError> {
        let max_input = requested.unwrap_or(self.max_input_tokens);
        if max_input == 0 {
            return Err(AnalysisError::Validation(
                "Input token budget must be positive".into(),
            ));
        }
        if max_input > self.max_input_tokens {
            return Err(AnalysisError::Validation(format!(
                "Input token budget {} exceeds limit {}",
                max_input, self.max_input_tokens
            )));
        }
        let requested = max_input
            .checked_add(self.max_output_tokens)
            .ok_or_else(|| AnalysisError::Validation("token ceilings overflow".into()))?;
        if requested > self.max_total_tokens {
            return Err(AnalysisError::Validation(format!(
                "Token budget exceeds model limit of {}",
                self.max_total_tokens
            )));
        }
        Ok(max_input)
    }

    /// Tokens spent on message framing for a request with `messages` messages.
    /// `None` if the configured overheads overflow.
    pub fn envelope_tokens(&self, messages: usize) -> Option<usize> {
        messages
            .checked_mul(self.tokens_per_message)?
            .checked_add(self.tokens_per_request)
    }

    /// Room left for user content once margin, envelope and system
    /// instructions are paid for.
    ///
    /// available = max_input - safety_margin - envelope - system_prompt
    pub fn packing_budget(
        &self,
        max_input_tokens: usize,
        system_tokens: usize,
    ) -> Result<PackingBudget, AnalysisError> {
        let reserved = self
            .envelope_tokens(MESSAGES_PER_REQUEST)
            .and_then(|envelope| envelope.checked_add(self.safety_margin))
            .and_then(|fixed| fixed.checked_add(system_tokens))
            .ok_or_else(|| {
                AnalysisError::BudgetInfeasible(
                    "reserved tokens for margin, envelope and system prompt overflow".into(),
                )
            })?;
        if reserved >= max_input_tokens {
            return Err(AnalysisError::BudgetInfeasible(format!(
                "{} tokens reserved for margin, envelope and system prompt leave nothing of {}",
                reserved, max_input_tokens
            )));
        }
        Ok(PackingBudget {
            max_input_tokens,
            user_content_tokens: max_input_tokens - reserved,
        })
    }
}
