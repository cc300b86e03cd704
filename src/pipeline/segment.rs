//! Block segmentation: split Markdown into an ordered sequence of blocks.
//!
//! The segmenter is line-oriented and deliberately shallow. It does not build
//! a Markdown AST; it only needs to know where a slide break may legally go.
//! Every byte of the input ends up in exactly one [`Block`], so concatenating
//! the blocks' `raw_text` reproduces the document.
//!
//! Code fences, `$$` math, tables and images are atomic. Lists are emitted as
//! one block per item so the packer can tell "between two items" apart from
//! "between two paragraphs". Malformed constructs (an unclosed fence, for
//! example) never abort: the rest of the document becomes one atomic block
//! and a [`ParseError`] is recorded.

use crate::error::ParseError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Kind of a [`Block`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockKind {
    Heading,
    Paragraph,
    CodeFence,
    Table,
    Image,
    List,
    /// `$$ … $$` display math.
    Math,
    Blank,
    /// A top-level thematic break (`---`, `***`, `___`, ...). Marp starts a
    /// new slide at every one of them.
    Break,
    Other,
}

impl BlockKind {
    /// Atomic kinds must never be divided across slides.
    pub fn is_atomic(self) -> bool {
        matches!(
            self,
            BlockKind::CodeFence | BlockKind::Table | BlockKind::Image | BlockKind::Math
        )
    }
}

/// A contiguous span of the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub kind: BlockKind,
    /// 1–6 for headings, None otherwise.
    pub heading_level: Option<u8>,
    /// Exact original text of the span, line endings included.
    pub raw_text: String,
    /// False for atomic blocks.
    pub splittable: bool,
    /// True for headings at or above the split level.
    pub hard_break: bool,
    /// 1-based line number of the first line.
    pub line: usize,
}

impl Block {
    fn new(kind: BlockKind, raw_text: String, line: usize) -> Self {
        Self {
            kind,
            heading_level: None,
            raw_text,
            splittable: !kind.is_atomic() && kind != BlockKind::Break,
            hard_break: false,
            line,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.kind == BlockKind::Blank
    }

    /// Source lines without their line endings.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.raw_text.lines()
    }

    /// Split a multi-line block after `n` lines, keeping line endings intact.
    ///
    /// Returns None when `n` is not strictly inside the block.
    pub(crate) fn split_at_line(&self, n: usize) -> Option<(Block, Block)> {
        let mut offset = 0;
        for (i, line) in self.raw_text.split_inclusive('\n').enumerate() {
            if i == n {
                break;
            }
            offset += line.len();
        }
        if n == 0 || offset == 0 || offset >= self.raw_text.len() {
            return None;
        }
        let mut head = self.clone();
        head.raw_text = self.raw_text[..offset].to_string();
        let mut tail = self.clone();
        tail.raw_text = self.raw_text[offset..].to_string();
        tail.line = self.line + n;
        tail.hard_break = false;
        Some((head, tail))
    }
}

/// Options controlling segmentation.
#[derive(Debug, Clone, Copy)]
pub struct SegmentOptions {
    /// Headings with level ≤ this value are hard break points.
    pub heading_split_levels: u8,
}

/// Segmenter output.
#[derive(Debug, Clone)]
pub struct Segmentation {
    pub blocks: Vec<Block>,
    /// Structural problems that were degraded to atomic blocks.
    pub issues: Vec<ParseError>,
}

// ── Line classifiers ────────────────────────────────────────────────────────

static RE_ATX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^ {0,3}(#{1,6})(?:[ \t]|$)").unwrap());

static RE_FENCE_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^ {0,3}(`{3,}|~{3,})(.*)$").unwrap());

static RE_FENCE_ANY_INDENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[ \t]*(`{3,}|~{3,})(.*)$").unwrap());

static RE_THEMATIC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^ {0,3}(?:(?:\*[ \t]*){3,}|(?:-[ \t]*){3,}|(?:_[ \t]*){3,})$").unwrap()
});

static RE_SETEXT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^ {0,3}(=+|-+)[ \t]*$").unwrap());

static RE_LIST_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[ \t]*(?:[-*+]|\d{1,9}[.)])(?:[ \t]+|$)").unwrap());

static RE_IMAGE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[ \t]*(?:\[?!\[[^\]]*\]\([^)]*\)(?:\]\([^)]*\))?[ \t]*)+$").unwrap()
});

static RE_TABLE_DELIMITER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[ \t]*\|?[ \t]*:?-+:?[ \t]*(?:\|[ \t]*:?-+:?[ \t]*)*\|?[ \t]*$").unwrap()
});

static RE_HTML_BLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"^ {0,3}</?[A-Za-z][A-Za-z0-9-]*").unwrap());

fn content(line: &str) -> &str {
    line.trim_end_matches(['\n', '\r'])
}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

pub(crate) fn atx_level(line: &str) -> Option<u8> {
    RE_ATX.captures(line).map(|c| c[1].len() as u8)
}

pub(crate) fn fence_open(line: &str) -> Option<(char, usize)> {
    let caps = RE_FENCE_OPEN.captures(line)?;
    let fence = &caps[1];
    let ch = fence.chars().next()?;
    // A backtick fence's info string may not contain backticks.
    if ch == '`' && caps[2].contains('`') {
        return None;
    }
    Some((ch, fence.len()))
}

pub(crate) fn fence_closes(line: &str, ch: char, len: usize) -> bool {
    let trimmed = line.trim();
    trimmed.len() >= len && trimmed.chars().all(|c| c == ch)
}

fn is_table_delimiter(line: &str) -> bool {
    line.contains('|') && RE_TABLE_DELIMITER.is_match(line)
}

fn is_indented(line: &str) -> bool {
    line.starts_with('\t') || line.starts_with("  ")
}

fn is_indented_code(line: &str) -> bool {
    line.starts_with('\t') || line.starts_with("    ")
}

fn is_math_open(line: &str) -> bool {
    line.trim_start().starts_with("$$")
}

// ── Segmenter ───────────────────────────────────────────────────────────────

/// Split `doc` into blocks and mark hard break points.
pub fn segment(doc: &str, opts: &SegmentOptions) -> Segmentation {
    let mut seg = Segmenter {
        lines: doc.split_inclusive('\n').collect(),
        pos: 0,
        blocks: Vec::new(),
        issues: Vec::new(),
        opts: *opts,
    };
    while seg.pos < seg.lines.len() {
        seg.next_block();
    }
    debug!(
        "Segmented {} lines into {} blocks ({} issues)",
        seg.lines.len(),
        seg.blocks.len(),
        seg.issues.len()
    );
    Segmentation {
        blocks: seg.blocks,
        issues: seg.issues,
    }
}

struct Segmenter<'a> {
    lines: Vec<&'a str>,
    pos: usize,
    blocks: Vec<Block>,
    issues: Vec<ParseError>,
    opts: SegmentOptions,
}

impl<'a> Segmenter<'a> {
    fn line(&self, i: usize) -> &'a str {
        content(self.lines[i])
    }

    fn push(&mut self, kind: BlockKind, start: usize, end: usize) {
        let raw: String = self.lines[start..end].concat();
        self.blocks.push(Block::new(kind, raw, start + 1));
        self.pos = end;
    }

    fn push_heading(&mut self, level: u8, start: usize, end: usize) {
        self.push(BlockKind::Heading, start, end);
        if let Some(block) = self.blocks.last_mut() {
            block.heading_level = Some(level);
            block.hard_break = level <= self.opts.heading_split_levels;
        }
    }

    fn last_content_kind(&self) -> Option<BlockKind> {
        self.blocks.iter().rev().find(|b| !b.is_blank()).map(|b| b.kind)
    }

    fn next_block(&mut self) {
        let start = self.pos;
        let line = self.line(start);

        if is_blank(line) {
            let end = self.scan_while(start, is_blank);
            return self.push(BlockKind::Blank, start, end);
        }
        if let Some((ch, len)) = fence_open(line) {
            return self.consume_fence(start, ch, len);
        }
        if is_math_open(line) {
            return self.consume_math(start);
        }
        if line.trim_start().starts_with("<!--") {
            return self.consume_comment(start);
        }
        if let Some(level) = atx_level(line) {
            return self.push_heading(level, start, start + 1);
        }
        if RE_THEMATIC.is_match(line) {
            return self.push(BlockKind::Break, start, start + 1);
        }
        if RE_LIST_ITEM.is_match(line) {
            return self.consume_list_item(start);
        }
        if is_indented(line) && self.last_content_kind() == Some(BlockKind::List) {
            // Continuation paragraph of a loose list item.
            return self.consume_list_item(start);
        }
        if is_indented_code(line) {
            let end = self.scan_while(start + 1, |l| !is_blank(l) && is_indented_code(l));
            return self.push(BlockKind::CodeFence, start, end);
        }
        if self.is_table_start(start) {
            let end = self.scan_while(start + 1, |l| !is_blank(l) && l.contains('|'));
            return self.push(BlockKind::Table, start, end);
        }
        if RE_IMAGE_LINE.is_match(line) {
            let end = self.scan_while(start + 1, |l| RE_IMAGE_LINE.is_match(l));
            return self.push(BlockKind::Image, start, end);
        }
        if RE_HTML_BLOCK.is_match(line) {
            let end = self.scan_while(start + 1, |l| !is_blank(l));
            return self.push(BlockKind::Other, start, end);
        }
        self.consume_paragraph(start)
    }

    /// First index at or after `from` whose line does not satisfy `pred`.
    fn scan_while(&self, from: usize, pred: impl Fn(&str) -> bool) -> usize {
        let mut i = from;
        while i < self.lines.len() && pred(self.line(i)) {
            i += 1;
        }
        i
    }

    fn is_table_start(&self, i: usize) -> bool {
        let line = self.line(i);
        if line.trim_start().starts_with('|') {
            return true;
        }
        line.contains('|') && i + 1 < self.lines.len() && is_table_delimiter(self.line(i + 1))
    }

    fn consume_fence(&mut self, start: usize, ch: char, len: usize) {
        let close = (start + 1..self.lines.len()).find(|&i| fence_closes(self.line(i), ch, len));
        match close {
            Some(i) => self.push(BlockKind::CodeFence, start, i + 1),
            None => {
                self.issues
                    .push(ParseError::UnterminatedFence { line: start + 1 });
                let end = self.lines.len();
                self.push(BlockKind::CodeFence, start, end);
            }
        }
    }

    fn consume_math(&mut self, start: usize) {
        let opener = self.line(start).trim();
        if opener.len() >= 4 && opener.ends_with("$$") {
            return self.push(BlockKind::Math, start, start + 1);
        }
        let close = (start + 1..self.lines.len()).find(|&i| self.line(i).trim_end().ends_with("$$"));
        match close {
            Some(i) => self.push(BlockKind::Math, start, i + 1),
            None => {
                self.issues.push(ParseError::UnterminatedMath { line: start + 1 });
                let end = self.lines.len();
                self.push(BlockKind::Math, start, end);
            }
        }
    }

    fn consume_comment(&mut self, start: usize) {
        let first = self.line(start);
        let after_open = &first[first.find("<!--").map_or(0, |p| p + 4)..];
        if after_open.contains("-->") {
            return self.push(BlockKind::Other, start, start + 1);
        }
        let close = (start + 1..self.lines.len()).find(|&i| self.line(i).contains("-->"));
        match close {
            Some(i) => self.push(BlockKind::Other, start, i + 1),
            None => {
                self.issues
                    .push(ParseError::UnterminatedComment { line: start + 1 });
                let end = self.lines.len();
                // Nothing after an open comment renders; keep it whole.
                self.blocks.push(Block {
                    splittable: false,
                    ..Block::new(BlockKind::Other, self.lines[start..end].concat(), start + 1)
                });
                self.pos = end;
            }
        }
    }

    /// One list item: the marker line plus continuation lines, including any
    /// fenced code nested in the item.
    fn consume_list_item(&mut self, start: usize) {
        let mut i = start + 1;
        while i < self.lines.len() {
            let line = self.line(i);
            if is_blank(line)
                || RE_THEMATIC.is_match(line)
                || RE_LIST_ITEM.is_match(line)
                || atx_level(line).is_some()
            {
                break;
            }
            if let Some(caps) = RE_FENCE_ANY_INDENT.captures(line) {
                let fence = &caps[1];
                let (ch, len) = (fence.chars().next().unwrap_or('`'), fence.len());
                match (i + 1..self.lines.len()).find(|&j| fence_closes(self.line(j), ch, len)) {
                    Some(j) => i = j + 1,
                    None => {
                        self.issues.push(ParseError::UnterminatedFence { line: i + 1 });
                        i = self.lines.len();
                    }
                }
                continue;
            }
            i += 1;
        }
        self.push(BlockKind::List, start, i);
    }

    fn consume_paragraph(&mut self, start: usize) {
        let mut i = start + 1;
        while i < self.lines.len() {
            let line = self.line(i);
            if let Some(caps) = RE_SETEXT.captures(line) {
                let level = if caps[1].starts_with('=') { 1 } else { 2 };
                return self.push_heading(level, start, i + 1);
            }
            if is_blank(line)
                || atx_level(line).is_some()
                || fence_open(line).is_some()
                || is_math_open(line)
                || line.trim_start().starts_with("<!--")
                || RE_THEMATIC.is_match(line)
                || RE_LIST_ITEM.is_match(line)
            {
                break;
            }
            i += 1;
        }
        self.push(BlockKind::Paragraph, start, i);
    }
}
