//! Packing labeled sources into a bounded prompt context.

use crate::types::Source;

/// Characters reserved for the blank-line separator after each block.
const SEPARATOR_BUDGET: usize = 2;

/// Build the `[S1] ...` context block for the grounded prompt.
///
/// Sources are taken greedily in rank order. The first block that would
/// push the total past `max_chars` ends the context; nothing after it is
/// considered. Blocks that are empty after trimming are skipped for free.
/// Lengths are counted in characters.
pub fn build_context(sources: &[Source], max_chars: usize) -> (String, Vec<Source>) {
    let mut blocks: Vec<String> = Vec::new();
    let mut kept: Vec<Source> = Vec::new();
    let mut total = 0;

    for source in sources {
        let block = format!("[{}] {}", source.source_id, source.text);
        let block = block.trim();
        if block.is_empty() {
            continue;
        }

        let len = block.chars().count();
        if total + len + SEPARATOR_BUDGET > max_chars {
            break;
        }

        total += len + SEPARATOR_BUDGET;
        blocks.push(block.to_string());
        kept.push(source.clone());
    }

    (blocks.join("\n\n"), kept)
}
