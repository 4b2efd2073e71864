//! Fit a record under a per-record token ceiling.
//!
//! Only the record's own text and its reply's quoted text are shortened;
//! ids, timestamps and the forward section are never touched. The remaining
//! budget after the fixed fields is shared between the two texts in
//! proportion to their size, then the block is re-measured and corrected.

use crate::record::Record;
use crate::tokenizer::TokenCounter;

use super::format::format_block;

/// Return a copy of `record` whose formatted block costs at most
/// `max_tokens`, whenever the block without any text already fits.
pub fn trim_record(record: &Record, max_tokens: usize, counter: &dyn TokenCounter) -> Record {
    let measure = |r: &Record| counter.count(&format_block(r));

    if measure(record) <= max_tokens {
        return record.clone();
    }

    let skeleton = record.with_texts(String::new(), String::new());
    let skeleton_tokens = measure(&skeleton);
    if skeleton_tokens >= max_tokens {
        return skeleton;
    }
    let available = max_tokens - skeleton_tokens;

    let text_tokens = counter.count(&record.text);
    let reply_tokens = counter.count(record.reply_text());
    let total = text_tokens + reply_tokens;
    if total == 0 {
        return record.clone();
    }

    let text_share = if text_tokens > 0 {
        (available * text_tokens / total).max(1)
    } else {
        0
    };
    let reply_share = available.saturating_sub(text_share);

    let mut trimmed = record.with_texts(
        counter.truncate(&record.text, text_share),
        counter.truncate(record.reply_text(), reply_share),
    );
    let mut tokens = measure(&trimmed);
    if tokens <= max_tokens {
        return trimmed;
    }

    if !trimmed.reply_text().is_empty() {
        trimmed = trimmed.with_texts(trimmed.text.clone(), String::new());
        tokens = measure(&trimmed);
    }

    // Shrink the primary text by the remaining excess until it fits.
    while tokens > max_tokens && !trimmed.text.is_empty() {
        let excess = tokens - max_tokens;
        let keep = counter.count(&trimmed.text).saturating_sub(excess.max(1));
        let text = counter.truncate(&trimmed.text, keep);
        trimmed = trimmed.with_texts(text, String::new());
        tokens = measure(&trimmed);
    }
    trimmed
}
