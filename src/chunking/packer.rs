//! Greedy, order-preserving chunk packing.
//!
//! Blocks are appended to the running chunk until the next one would push
//! it over the request budget, then a new chunk is started. A block that is
//! too large for an empty chunk is split into token-aligned fragments first.

use std::collections::VecDeque;

use tracing::debug;

use crate::error::AnalysisError;
use crate::tokenizer::TokenCounter;

use super::{render_parts, Chunk, Part, BLOCK_SEPARATOR, PREFIX_SEPARATOR};

/// Packs blocks into chunks that fit a fixed token budget.
pub struct ChunkPacker<'a> {
    counter: &'a dyn TokenCounter,
    budget: usize,
}

impl<'a> ChunkPacker<'a> {
    pub fn new(counter: &'a dyn TokenCounter, budget: usize) -> Self {
        Self { counter, budget }
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Tokens taken by the prefix and the newline joining it to the blocks.
    pub fn prefix_tokens(&self, prefix: &str) -> usize {
        if prefix.is_empty() {
            0
        } else {
            self.counter.count(&format!("{prefix}{PREFIX_SEPARATOR}"))
        }
    }

    /// Partition `blocks` into ordered chunks.
    ///
    /// Every chunk rendered with `prefix` stays within the budget; no block
    /// content is dropped or duplicated. Fails when the prefix leaves no
    /// room, or when a fragment that cannot be split further still does not
    /// fit into an empty chunk.
    pub fn pack(&self, prefix: &str, blocks: &[String]) -> Result<Vec<Chunk>, AnalysisError> {
        let prefix_tokens = self.prefix_tokens(prefix);
        if prefix_tokens >= self.budget {
            return Err(AnalysisError::BudgetInfeasible(format!(
                "prefix needs {} tokens, budget is {}",
                prefix_tokens, self.budget
            )));
        }
        let room = self.budget - prefix_tokens;
        let separator_tokens = self.counter.count(BLOCK_SEPARATOR);

        let mut pending: VecDeque<(Part, usize)> = VecDeque::new();
        for (index, block) in blocks.iter().enumerate() {
            let tokens = self.counter.count(block);
            if tokens <= room {
                pending.push_back((part(index, block.clone()), tokens));
                continue;
            }
            let fragments = self.counter.split(block, room);
            debug!(block = index, tokens, fragments = fragments.len(), "Splitting oversized block");
            for fragment in fragments {
                let tokens = self.counter.count(&fragment);
                pending.push_back((part(index, fragment), tokens));
            }
        }

        let mut chunks = Vec::new();
        let mut current: Vec<(Part, usize)> = Vec::new();
        let mut running = prefix_tokens;

        while let Some((piece, tokens)) = pending.pop_front() {
            if tokens > room {
                return Err(AnalysisError::BudgetInfeasible(format!(
                    "block {} has an unsplittable fragment of {} tokens, only {} available",
                    piece.block, tokens, room
                )));
            }
            let cost = if current.is_empty() {
                tokens
            } else {
                separator_tokens + tokens
            };
            if !current.is_empty() && running + cost > self.budget {
                let carry = self.close(prefix, &mut current, &mut chunks);
                for item in carry.into_iter().rev() {
                    pending.push_front(item);
                }
                pending.push_front((piece, tokens));
                running = prefix_tokens;
                continue;
            }
            running += cost;
            current.push((piece, tokens));
        }

        while !current.is_empty() {
            let carry = self.close(prefix, &mut current, &mut chunks);
            current = carry;
        }
        Ok(chunks)
    }

    /// Move `current` into `chunks`. If the rendered text turns out larger
    /// than the per-part estimate, trailing parts are handed back to be
    /// packed into the next chunk.
    fn close(
        &self,
        prefix: &str,
        current: &mut Vec<(Part, usize)>,
        chunks: &mut Vec<Chunk>,
    ) -> Vec<(Part, usize)> {
        let mut parts = std::mem::take(current);
        let mut carry = Vec::new();
        let mut tokens = self.rendered_tokens(prefix, &parts);
        while tokens > self.budget && parts.len() > 1 {
            if let Some(last) = parts.pop() {
                carry.insert(0, last);
            }
            tokens = self.rendered_tokens(prefix, &parts);
        }
        chunks.push(Chunk {
            parts: parts.into_iter().map(|(p, _)| p).collect(),
            tokens,
        });
        carry
    }

    fn rendered_tokens(&self, prefix: &str, parts: &[(Part, usize)]) -> usize {
        let text = render_parts(prefix, parts.iter().map(|(p, _)| p.text.as_str()));
        self.counter.count(&text)
    }
}

fn part(block: usize, text: String) -> Part {
    Part { block, text }
}
