//! Progress tracker for analysis runs
//!
//! Reports per-chunk progress on stderr while model calls are in flight.

use std::io::{self, Write};

/// Tracks and displays progress through the chunks of a run
pub struct ProgressTracker {
    /// Total number of chunks to send
    total_chunks: usize,
    /// Number of chunks answered
    processed_chunks: usize,
    /// Number of tag items accepted so far
    accepted_items: usize,
    /// Chunk currently awaiting a reply
    current_chunk: Option<usize>,
    /// Whether to show output (false for tests/quiet mode)
    show_output: bool,
}

impl ProgressTracker {
    /// Create a new progress tracker
    pub fn new() -> Self {
        Self {
            total_chunks: 0,
            processed_chunks: 0,
            accepted_items: 0,
            current_chunk: None,
            show_output: true,
        }
    }

    /// Create a quiet progress tracker (no output)
    pub fn quiet() -> Self {
        Self {
            show_output: false,
            ..Self::new()
        }
    }

    /// Set the number of chunks once packing is done
    pub fn begin(&mut self, total_chunks: usize) {
        self.total_chunks = total_chunks;
        self.processed_chunks = 0;
        self.accepted_items = 0;
    }

    /// A request for chunk `index` (zero-based) is about to be sent
    pub fn start_chunk(&mut self, index: usize) {
        self.current_chunk = Some(index);
        if self.show_output {
            eprint!("  Chunk {}/{}... ", index + 1, self.total_chunks);
            let _ = io::stderr().flush();
        }
    }

    /// The reply for the current chunk was merged
    pub fn finish_chunk(&mut self, accepted: usize) {
        if self.show_output && self.current_chunk.is_some() {
            eprintln!("done ({} items)", accepted);
        }
        self.current_chunk = None;
        self.processed_chunks += 1;
        self.accepted_items += accepted;
    }

    /// The current chunk failed; the run is over
    pub fn fail_chunk(&mut self) {
        if self.show_output && self.current_chunk.is_some() {
            eprintln!("failed");
        }
        self.current_chunk = None;
    }

    /// Get the number of answered chunks
    pub fn chunks_processed(&self) -> usize {
        self.processed_chunks
    }

    /// Get the number of accepted tag items
    pub fn items_accepted(&self) -> usize {
        self.accepted_items
    }

    /// Display final completion message
    pub fn complete(&self, distinct_tags: usize) {
        if self.show_output {
            eprintln!(
                "  Completed: {} chunks, {} distinct tags",
                self.processed_chunks, distinct_tags
            );
        }
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}
