//! Assembly of the paginated document from final slide candidates.
//!
//! The output is the input text with `---` markers added between slides and
//! nothing else changed: every byte of every block is emitted verbatim, in
//! order. An inserted marker always sits on its own line with a blank line on
//! each side, so it can never be read as a setext underline or a table rule.

use crate::pipeline::pack::{Separator, SlideCandidate};

/// The Marp slide separator.
pub const SLIDE_BREAK: &str = "---";

/// Concatenate candidates, placing a break marker before every slide but the
/// first.
pub fn assemble(candidates: &[SlideCandidate]) -> String {
    let capacity = candidates
        .iter()
        .flat_map(|c| c.blocks.iter())
        .map(|b| b.raw_text.len() + 8)
        .sum();
    let mut out = String::with_capacity(capacity);

    for (i, candidate) in candidates.iter().enumerate() {
        if i > 0 {
            match &candidate.separator {
                Separator::Existing(text) => out.push_str(text),
                Separator::Inserted | Separator::None => {
                    out.push_str(&inserted_break(&candidates[i - 1]))
                }
            }
        }
        for block in &candidate.blocks {
            out.push_str(&block.raw_text);
        }
    }
    out
}

/// Marker text to emit after `previous`.
///
/// The padding depends only on how the previous slide ends, which makes the
/// output stable when it is paginated again.
pub fn inserted_break(previous: &SlideCandidate) -> String {
    let ends_blank = previous.blocks.last().is_some_and(|b| b.is_blank());
    let ends_newline = previous
        .blocks
        .last()
        .is_some_and(|b| b.raw_text.ends_with('\n'));

    let padding = if previous.blocks.is_empty() || ends_blank {
        ""
    } else if ends_newline {
        "\n"
    } else {
        "\n\n"
    };
    format!("{padding}{SLIDE_BREAK}\n\n")
}
