//! Property-based tests for the chunking and aggregation core using proptest.

use proptest::prelude::*;
use serde_json::{json, Value};

use tagtally::chunking::BLOCK_SEPARATOR;
use tagtally::record::parse_instant;
use tagtally::{
    format_block, normalize_tag, trim_record, BpeTokenizer, CharEstimator, ChunkPacker, Record,
    ReplyStub, TagCounts, TokenCounter,
};

fn record(text: String, reply: Option<String>) -> Record {
    let mut r = Record::new(7, 42, parse_instant("2026-02-01T09:30:00Z").unwrap(), text)
        .with_author(3);
    if let Some(reply) = reply {
        r = r.with_reply(ReplyStub {
            record_id: Some(41),
            author_id: Some(4),
            text: reply,
        });
    }
    r
}

fn items(pairs: &[(String, u64)]) -> Vec<Value> {
    pairs
        .iter()
        .map(|(tag, count)| json!({"tag": tag, "count": count}))
        .collect()
}

fn tag_strategy() -> impl Strategy<Value = String> {
    "#?[a-zA-Z0-9_]{1,8}"
}

fn bpe() -> BpeTokenizer {
    BpeTokenizer::for_model("deepseek-chat").unwrap()
}

/// Trimmed block fits whenever the text-less skeleton does, and only the
/// texts are shortened.
fn check_trim(counter: &dyn TokenCounter, r: Record, slack: usize) -> Result<(), TestCaseError> {
    let skeleton = r.with_texts(String::new(), String::new());
    let max = counter.count(&format_block(&skeleton)) + slack;

    let trimmed = trim_record(&r, max, counter);

    prop_assert!(counter.count(&format_block(&trimmed)) <= max);
    prop_assert!(r.text.starts_with(&trimmed.text));
    prop_assert!(r.reply_text().starts_with(trimmed.reply_text()));
    prop_assert_eq!(trimmed.record_id, r.record_id);
    prop_assert_eq!(trimmed.timestamp, r.timestamp);
    Ok(())
}

/// Every rendered chunk fits, parts keep block order, and the parts of
/// each block concatenate back to it.
fn check_pack(
    counter: &dyn TokenCounter,
    prefix: &str,
    blocks: &[String],
    budget: usize,
) -> Result<(), TestCaseError> {
    let packer = ChunkPacker::new(counter, budget);
    let chunks = packer.pack(prefix, blocks).unwrap();

    let mut rebuilt = vec![String::new(); blocks.len()];
    let mut last_block = 0;
    for chunk in &chunks {
        prop_assert!(!chunk.parts.is_empty());
        prop_assert!(counter.count(&chunk.render(prefix)) <= budget);
        for part in &chunk.parts {
            prop_assert!(part.block >= last_block);
            last_block = part.block;
            rebuilt[part.block].push_str(&part.text);
        }
    }
    prop_assert_eq!(rebuilt.as_slice(), blocks);
    Ok(())
}

// --- Tokenizer properties ---

proptest! {
    #[test]
    fn estimate_count_is_zero_only_for_empty(text in "\\PC{0,200}") {
        let tokens = CharEstimator.count(&text);
        prop_assert_eq!(tokens == 0, text.is_empty());
    }

    #[test]
    fn estimate_truncate_fits(text in "\\PC{0,300}", max in 0usize..80) {
        let cut = CharEstimator.truncate(&text, max);
        prop_assert!(CharEstimator.count(&cut) <= max);
        prop_assert!(text.starts_with(&cut));
    }

    #[test]
    fn estimate_split_concatenates(text in "\\PC{0,300}", max in 1usize..40) {
        let fragments = CharEstimator.split(&text, max);
        prop_assert_eq!(fragments.concat(), text);
        for f in &fragments {
            prop_assert!(CharEstimator.count(f) <= max);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn bpe_split_concatenates(text in "[a-zа-я #,.!\\n]{0,200}", max in 1usize..30) {
        let bpe = bpe();
        let fragments = bpe.split(&text, max);
        prop_assert_eq!(fragments.concat(), text);
    }

    #[test]
    fn bpe_truncate_fits(text in "[a-zа-я #,.!\\n]{0,200}", max in 0usize..30) {
        let bpe = bpe();
        let cut = bpe.truncate(&text, max);
        prop_assert!(bpe.count(&cut) <= max);
        prop_assert!(text.starts_with(&cut));
    }

    #[test]
    fn bpe_trimmed_block_fits_when_skeleton_fits(
        text in "\\PC{0,400}",
        reply in proptest::option::of("\\PC{0,400}"),
        slack in 0usize..150,
    ) {
        check_trim(&bpe(), record(text, reply), slack)?;
    }

    #[test]
    fn bpe_packed_chunks_fit_and_preserve_content(
        blocks in proptest::collection::vec("[a-zа-я #,.!\\n]{1,300}", 0..12),
        prefix in "[A-Za-z ]{0,40}",
        budget in 60usize..200,
    ) {
        check_pack(&bpe(), &prefix, &blocks, budget)?;
    }
}

// --- Trimmer properties ---

proptest! {
    #[test]
    fn trimmed_block_fits_when_skeleton_fits(
        text in "\\PC{0,400}",
        reply in proptest::option::of("\\PC{0,400}"),
        slack in 0usize..150,
    ) {
        check_trim(&CharEstimator, record(text, reply), slack)?;
    }

    #[test]
    fn record_that_fits_is_untouched(text in "\\PC{0,200}", reply in proptest::option::of("\\PC{0,200}")) {
        let r = record(text, reply);
        let cost = CharEstimator.count(&format_block(&r));
        prop_assert_eq!(trim_record(&r, cost, &CharEstimator), r);
    }
}

// --- Packer properties ---

proptest! {
    #[test]
    fn packed_chunks_fit_and_preserve_content(
        blocks in proptest::collection::vec("[a-z #\\n]{1,300}", 0..12),
        prefix in "[A-Za-z ]{0,40}",
        budget in 60usize..200,
    ) {
        check_pack(&CharEstimator, &prefix, &blocks, budget)?;
    }

    #[test]
    fn blocks_are_split_only_when_oversized(
        blocks in proptest::collection::vec("[a-z ]{1,120}", 1..8),
    ) {
        let packer = ChunkPacker::new(&CharEstimator, 100);
        let chunks = packer.pack("", &blocks).unwrap();
        let parts: usize = chunks.iter().map(|c| c.parts.len()).sum();
        // every block fits in 100 tokens, so no block is split
        prop_assert_eq!(parts, blocks.len());
        let rendered: Vec<String> = chunks.iter().map(|c| c.render("")).collect();
        prop_assert_eq!(rendered.join(BLOCK_SEPARATOR), blocks.join(BLOCK_SEPARATOR));
    }
}

// --- Aggregator properties ---

proptest! {
    #[test]
    fn normalize_is_idempotent(raw in "\\PC{0,20}") {
        if let Some(tag) = normalize_tag(&raw) {
            prop_assert!(tag.starts_with('#'));
            prop_assert_eq!(normalize_tag(&tag), Some(tag.clone()));
        }
    }

    #[test]
    fn merge_order_does_not_matter(
        replies in proptest::collection::vec(
            proptest::collection::vec((tag_strategy(), 1u64..50), 0..6),
            1..5,
        ),
    ) {
        let mut forward = TagCounts::new();
        for reply in &replies {
            forward.merge(&items(reply));
        }
        let mut backward = TagCounts::new();
        for reply in replies.iter().rev() {
            backward.merge(&items(reply));
        }
        prop_assert_eq!(forward.ranked(), backward.ranked());

        let total: u64 = replies.iter().flatten().map(|(_, c)| c).sum();
        let merged: u64 = forward.ranked().iter().map(|t| t.count).sum();
        prop_assert_eq!(merged, total);
    }

    #[test]
    fn ranking_is_sorted_and_unique(
        pairs in proptest::collection::vec((tag_strategy(), 1u64..20), 0..20),
    ) {
        let mut counts = TagCounts::new();
        counts.merge(&items(&pairs));
        let ranked = counts.ranked();
        for w in ranked.windows(2) {
            let ordered = w[0].count > w[1].count
                || (w[0].count == w[1].count && w[0].tag < w[1].tag);
            prop_assert!(ordered);
        }
    }
}
