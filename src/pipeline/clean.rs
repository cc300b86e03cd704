//! Cleaning: normalise a hand-written document before pagination.
//!
//! Authors paste Markdown from many sources. Before the engine decides where
//! slides break, a few deterministic rules remove what would confuse it:
//! a frontmatter block that would be taken for slide content, manual `---`
//! markers that would fight the computed breaks, headings glued to the
//! preceding paragraph (which Markdown renders as paragraph text), and long
//! runs of blank lines.
//!
//! Every rule except line-ending normalisation skips fenced code, so a shell
//! comment such as `# install deps` inside a code block is never treated as
//! a heading.
//!
//! The pagination engine itself does not require cleaned input; cleaning is
//! the caller-side step that [`crate::convert::convert`] runs.

use crate::pipeline::segment::{atx_level, fence_open, fence_closes};

/// Options for [`clean_document`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CleanOptions {
    /// Keep manual `---` markers instead of removing them.
    pub keep_breaks: bool,
}

/// Apply all cleaning rules.
///
/// Rules (applied in order):
/// 1. Normalise line endings (CRLF → LF)
/// 2. Strip a leading YAML frontmatter block
/// 3. Remove manual `---` slide markers (unless `keep_breaks`)
/// 4. Put a blank line before any heading that directly follows text
/// 5. Collapse runs of blank lines to one
/// 6. Trim leading blank lines and trailing whitespace; end with one newline
pub fn clean_document(input: &str, opts: &CleanOptions) -> String {
    let s = normalise_line_endings(input);
    let s = strip_frontmatter(&s);
    let s = if opts.keep_breaks {
        s
    } else {
        remove_manual_breaks(&s)
    };
    let s = separate_headings(&s);
    let s = collapse_blank_lines(&s);
    finish(&s)
}

/// For each line, whether it belongs to a fenced code block (delimiters included).
fn fence_mask(lines: &[&str]) -> Vec<bool> {
    let mut mask = Vec::with_capacity(lines.len());
    let mut open: Option<(char, usize)> = None;
    for line in lines {
        match open {
            Some((ch, len)) => {
                mask.push(true);
                if fence_closes(line, ch, len) {
                    open = None;
                }
            }
            None => {
                open = fence_open(line);
                mask.push(open.is_some());
            }
        }
    }
    mask
}

fn join_lines(lines: &[&str]) -> String {
    lines.join("\n")
}

// ── Rule 1: Normalise line endings ──────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Strip frontmatter ───────────────────────────────────────────────

/// Remove a `---` … `---` block at the very start of the document.
///
/// An opening `---` without a closing one is left alone: it is more likely a
/// manual slide marker than a broken frontmatter block.
fn strip_frontmatter(input: &str) -> String {
    let body = input.trim_start();
    let mut lines = body.split('\n');
    if lines.next().map(str::trim_end) != Some("---") {
        return input.to_string();
    }
    let mut offset = body.find('\n').map_or(body.len(), |i| i + 1);
    for line in lines {
        offset += line.len() + 1;
        let t = line.trim_end();
        if t == "---" || t == "..." {
            return body.get(offset.min(body.len())..).unwrap_or("").to_string();
        }
    }
    input.to_string()
}

// ── Rule 3: Remove manual slide markers ─────────────────────────────────────

fn remove_manual_breaks(input: &str) -> String {
    let lines: Vec<&str> = input.split('\n').collect();
    let mask = fence_mask(&lines);
    let kept: Vec<&str> = lines
        .iter()
        .zip(&mask)
        .map(|(line, &in_fence)| {
            if !in_fence && line.trim() == "---" {
                ""
            } else {
                *line
            }
        })
        .collect();
    join_lines(&kept)
}

// ── Rule 4: Blank line before headings ──────────────────────────────────────

fn separate_headings(input: &str) -> String {
    let lines: Vec<&str> = input.split('\n').collect();
    let mask = fence_mask(&lines);
    let mut out: Vec<&str> = Vec::with_capacity(lines.len());
    for (i, line) in lines.iter().enumerate() {
        let glued = i > 0
            && !mask[i]
            && !mask[i - 1]
            && atx_level(line).is_some()
            && !lines[i - 1].trim().is_empty();
        if glued {
            out.push("");
        }
        out.push(line);
    }
    join_lines(&out)
}

// ── Rule 5: Collapse blank lines ────────────────────────────────────────────

fn collapse_blank_lines(input: &str) -> String {
    let lines: Vec<&str> = input.split('\n').collect();
    let mask = fence_mask(&lines);
    let mut out: Vec<&str> = Vec::with_capacity(lines.len());
    let mut prev_blank = false;
    for (line, &in_fence) in lines.iter().zip(&mask) {
        let blank = !in_fence && line.trim().is_empty();
        if blank && prev_blank {
            continue;
        }
        out.push(if blank { "" } else { line });
        prev_blank = blank;
    }
    join_lines(&out)
}

// ── Rule 6: Trim ────────────────────────────────────────────────────────────

fn finish(input: &str) -> String {
    let start = input
        .split_inclusive('\n')
        .take_while(|l| l.trim().is_empty())
        .map(str::len)
        .sum::<usize>();
    let body = input[start..].trim_end();
    if body.is_empty() {
        String::new()
    } else {
        format!("{body}\n")
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn clean(input: &str) -> String {
        clean_document(input, &CleanOptions::default())
    }

    #[test]
    fn test_normalise_line_endings() {
        assert_eq!(normalise_line_endings("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn test_strip_frontmatter() {
        let input = "---\ntitle: Talk\nmarp: true\n---\n\n# Hello\n";
        assert_eq!(strip_frontmatter(input), "\n# Hello\n");
    }

    #[test]
    fn test_unclosed_frontmatter_is_kept() {
        let input = "---\n# Hello\n";
        assert_eq!(strip_frontmatter(input), input);
    }

    #[test]
    fn test_remove_manual_breaks() {
        assert_eq!(remove_manual_breaks("a\n---\nb\n  ---  \nc"), "a\n\nb\n\nc");
    }

    #[test]
    fn test_manual_break_inside_fence_is_kept() {
        let input = "```yaml\n---\nkey: v\n```";
        assert_eq!(remove_manual_breaks(input), input);
    }

    #[test]
    fn test_longer_rules_are_not_markers() {
        assert_eq!(remove_manual_breaks("a\n-----\nb"), "a\n-----\nb");
    }

    #[test]
    fn test_separate_headings() {
        assert_eq!(separate_headings("text\n## Heading"), "text\n\n## Heading");
        assert_eq!(separate_headings("text\n\n## Heading"), "text\n\n## Heading");
    }

    #[test]
    fn test_heading_inside_fence_not_separated() {
        let input = "```bash\necho hi\n# comment\n```";
        assert_eq!(separate_headings(input), input);
    }

    #[test]
    fn test_hashtag_is_not_heading() {
        assert_eq!(separate_headings("text\n#tag"), "text\n#tag");
    }

    #[test]
    fn test_collapse_blank_lines() {
        assert_eq!(collapse_blank_lines("a\n\n\n\n\nb"), "a\n\nb");
    }

    #[test]
    fn test_collapse_keeps_blank_lines_in_code() {
        let input = "```\na\n\n\n\nb\n```";
        assert_eq!(collapse_blank_lines(input), input);
    }

    #[test]
    fn test_clean_full() {
        let input = "\r\n---\r\ntheme: x\r\n---\r\n\r\n# A\r\nintro\r\n## B\r\n---\r\n\r\n\r\n\r\nbody  \r\n";
        assert_eq!(clean(input), "# A\nintro\n\n## B\n\nbody\n");
    }

    #[test]
    fn test_clean_keep_breaks() {
        let out = clean_document("# A\n\n---\n\n# B\n", &CleanOptions { keep_breaks: true });
        assert_eq!(out, "# A\n\n---\n\n# B\n");
    }

    #[test]
    fn test_clean_empty() {
        assert_eq!(clean("  \n\n"), "");
    }
}
