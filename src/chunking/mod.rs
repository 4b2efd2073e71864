//! Chunking: records to budget-respecting model requests.
//!
//! - `format`: canonical text block for one record
//! - `trim`: shortens a record's texts so its block fits a token ceiling
//! - `packer`: groups blocks into ordered chunks under the request budget

pub mod format;
pub mod packer;
pub mod trim;

pub use format::format_block;
pub use packer::ChunkPacker;
pub use trim::trim_record;

/// Joins blocks inside one chunk.
pub const BLOCK_SEPARATOR: &str = "\n\n";

/// Joins the shared prefix to the first block.
pub const PREFIX_SEPARATOR: &str = "\n";

/// A block, or a fragment of one, placed in a chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    /// Index of the block this text came from
    pub block: usize,
    pub text: String,
}

/// Ordered parts sent together in one model request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub parts: Vec<Part>,
    /// Estimated cost including prefix and separators
    pub tokens: usize,
}

impl Chunk {
    /// Final request text: prefix, newline, then parts separated by blank lines.
    pub fn render(&self, prefix: &str) -> String {
        render_parts(prefix, self.parts.iter().map(|p| p.text.as_str()))
    }

    /// First and last block index touched by this chunk.
    pub fn block_span(&self) -> Option<(usize, usize)> {
        let first = self.parts.first()?.block;
        let last = self.parts.last()?.block;
        Some((first, last))
    }
}

pub(crate) fn render_parts<'a>(prefix: &str, parts: impl Iterator<Item = &'a str>) -> String {
    let body = parts.collect::<Vec<_>>().join(BLOCK_SEPARATOR);
    if prefix.is_empty() {
        body
    } else {
        format!("{prefix}{PREFIX_SEPARATOR}{body}")
    }
}
