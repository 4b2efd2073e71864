//! Canonical text rendering of a record.
//!
//! Section order is fixed: header, reply, forwarded, text. The same record
//! always renders to the same block, which the trimmer relies on when it
//! re-measures.

use std::fmt::Display;

use crate::record::Record;

fn field(name: &str, value: Option<impl Display>) -> String {
    match value {
        Some(v) => format!("{name}: {v}"),
        None => format!("{name}:"),
    }
}

/// Render one record as a multi-line block.
pub fn format_block(record: &Record) -> String {
    let mut lines = vec![
        "record:".to_string(),
        field("source_id", Some(record.source_id)),
        field("record_id", Some(record.record_id)),
        field("author_id", record.author_id),
        field("timestamp", Some(record.timestamp.to_rfc3339())),
    ];

    if let Some(reply) = &record.reply {
        lines.push("reply:".to_string());
        lines.push(format!("  {}", field("record_id", reply.record_id)));
        lines.push(format!("  {}", field("author_id", reply.author_id)));
        if !reply.text.is_empty() {
            lines.push(format!("  text: {}", reply.text));
        }
    }

    if let Some(fwd) = &record.forward {
        lines.push("forwarded:".to_string());
        lines.push(format!("  {}", field("from_author_id", fwd.from_author_id)));
        lines.push(format!("  {}", field("from_source_id", fwd.from_source_id)));
        lines.push(format!("  {}", field("from_name", fwd.from_name.as_deref())));
        lines.push(format!("  {}", field("from_record_id", fwd.from_record_id)));
    }

    lines.push("text:".to_string());
    lines.push(record.text.clone());
    lines.join("\n")
}
