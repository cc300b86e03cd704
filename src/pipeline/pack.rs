//! Layout packing: decide where slide breaks go.
//!
//! ## Two passes
//!
//! **Pass 1** groups blocks into slide candidates at hard break points only
//! (headings at or above the split level, plus thematic breaks, where Marp
//! itself starts a new slide). No height is known yet; this is an optimistic
//! guess.
//!
//! **Pass 2** sends every candidate to the [`RenderProbe`] in one batch. A
//! candidate whose measured height fits the budget is final. An overflowing
//! candidate is partitioned greedily: [`plan_split`] cuts off a first slide,
//! then keeps cutting the remainder until its estimated height fits. All the
//! pieces go into the next batch and are measured again. Rounds continue
//! until nothing overflows or `max_repair_rounds` is reached, so the renderer
//! is invoked at most `1 + max_repair_rounds` times per document.
//!
//! ## Choosing a split point
//!
//! The renderer reports one height per candidate, not per block. To place a
//! cut, each block gets a cheap estimate from [`HeightHeuristic`] and the
//! estimates are rescaled so that they add up to the measured height. The
//! estimate only chooses the cut; the resulting halves are always measured.

use crate::config::{ConversionConfig, HeightHeuristic};
use crate::error::{AutosplitError, ProbeError};
use crate::output::{SlideWarning, WarningKind};
use crate::pipeline::probe::RenderProbe;
use crate::pipeline::segment::{Block, BlockKind};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// What precedes a candidate in the assembled deck.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Separator {
    /// First slide of the deck.
    None,
    /// A marker the assembler must insert.
    Inserted,
    /// A marker already present in the input, emitted verbatim.
    Existing(String),
}

/// Lifecycle of a [`SlideCandidate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateState {
    /// Waiting for a measurement.
    Pending,
    /// Measured within budget (or has no renderable content).
    Final,
    /// Over budget with no legal split point.
    Irreducible,
    /// Over budget when the repair-round cap was hit.
    RoundsExhausted,
    /// Its batch failed; emitted without a measurement.
    Unmeasured,
}

/// A contiguous run of blocks proposed as one slide.
#[derive(Debug, Clone)]
pub struct SlideCandidate {
    pub blocks: Vec<Block>,
    pub separator: Separator,
    pub state: CandidateState,
    /// Last measurement of exactly this content.
    pub height: Option<f64>,
}

impl SlideCandidate {
    fn new(separator: Separator) -> Self {
        Self {
            blocks: Vec::new(),
            separator,
            state: CandidateState::Pending,
            height: None,
        }
    }

    /// Concatenated block text, verbatim.
    pub fn text(&self) -> String {
        self.blocks.iter().map(|b| b.raw_text.as_str()).collect()
    }

    /// Whether any block would render something.
    pub fn has_content(&self) -> bool {
        self.blocks.iter().any(|b| !b.is_blank())
    }

    /// 1-based input line of the first block.
    pub fn start_line(&self) -> usize {
        self.blocks.first().map_or(1, |b| b.line)
    }

    /// Content other than blank lines and hard-break headings.
    fn has_body(&self) -> bool {
        self.blocks.iter().any(|b| !b.is_blank() && !b.hard_break)
    }

    fn split(mut self, point: SplitPoint) -> (SlideCandidate, SlideCandidate) {
        let mut tail = SlideCandidate::new(Separator::Inserted);
        match point {
            SplitPoint::Boundary(j) => {
                tail.blocks = self.blocks.split_off(j);
            }
            SplitPoint::Line { block, line } => {
                let rest = self.blocks.split_off(block + 1);
                let target = self.blocks.pop();
                match target.as_ref().and_then(|b| b.split_at_line(line)) {
                    Some((head, first)) => {
                        self.blocks.push(head);
                        tail.blocks.push(first);
                    }
                    None => tail.blocks.extend(target),
                }
                tail.blocks.extend(rest);
            }
        }
        self.state = CandidateState::Pending;
        self.height = None;
        (self, tail)
    }
}

// ── Pass 1 ──────────────────────────────────────────────────────────────────

/// Group blocks into candidates at hard break points.
///
/// A hard heading starts a new candidate unless the current one holds nothing
/// but blank lines and other hard headings, so consecutive headings share a
/// slide instead of producing an empty one. Thematic breaks always close the
/// current candidate and travel as the next one's separator.
pub fn initial_candidates(blocks: Vec<Block>) -> Vec<SlideCandidate> {
    let mut out = Vec::new();
    let mut current = SlideCandidate::new(Separator::None);

    for block in blocks {
        match block.kind {
            BlockKind::Break => {
                let next = SlideCandidate::new(Separator::Existing(block.raw_text));
                out.push(std::mem::replace(&mut current, next));
            }
            _ if block.hard_break && current.has_body() => {
                let next = SlideCandidate::new(Separator::Inserted);
                out.push(std::mem::replace(&mut current, next));
                current.blocks.push(block);
            }
            _ => current.blocks.push(block),
        }
    }

    if !current.blocks.is_empty() || current.separator != Separator::None {
        out.push(current);
    }
    out
}

// ── Split planning ──────────────────────────────────────────────────────────

/// Where to cut an overflowing candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitPoint {
    /// The second half starts at this block index.
    Boundary(usize),
    /// Cut paragraph `block` after `line` lines.
    Line { block: usize, line: usize },
}

/// Preference order of block boundaries; lower is better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Tier {
    /// Between paragraphs, before a sub-heading, around code or tables.
    Block,
    /// Between two items of the same list.
    ListItem,
}

/// Approximate rendered size of a block, in heuristic line units.
pub fn estimate_block(block: &Block, h: &HeightHeuristic) -> f64 {
    let wrapped = |line: &str| -> f64 {
        let chars = line.trim().chars().count().max(1);
        chars.div_ceil(h.chars_per_line.max(1)) as f64
    };
    let line_count = block.lines().count().max(1) as f64;
    match block.kind {
        BlockKind::Blank => line_count * h.blank_weight,
        BlockKind::Break => 0.0,
        BlockKind::Image => line_count * h.image_lines,
        BlockKind::CodeFence | BlockKind::Math => line_count * h.code_weight,
        BlockKind::Table => {
            let rows = block
                .lines()
                .filter(|l| !l.chars().all(|c| matches!(c, '|' | '-' | ':' | ' ' | '\t')))
                .count()
                .max(1);
            rows as f64 * h.table_row_weight
        }
        BlockKind::Heading => block.lines().map(wrapped).sum::<f64>() * h.heading_weight,
        _ => block.lines().map(wrapped).sum::<f64>() * h.body_weight,
    }
}

/// Pick the cut for a candidate of measured `height` that exceeds `budget`.
///
/// Legal cuts never fall inside an atomic block, never directly after a
/// heading, and never leave a half with nothing but blank lines; trailing
/// blank lines stay with the first half. Among fitting cuts the most
/// preferred tier wins, and within a tier the cut whose first half is closest
/// to the budget without exceeding it. When no block boundary fits, a
/// multi-line paragraph straddling the budget is cut between lines. Failing
/// that, the earliest legal boundary isolates the oversized leading block.
///
/// Returns None when the candidate cannot be split at all.
pub fn plan_split(
    blocks: &[Block],
    height: f64,
    budget: f64,
    h: &HeightHeuristic,
) -> Option<SplitPoint> {
    let weights: Vec<f64> = blocks.iter().map(|b| estimate_block(b, h)).collect();
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return None;
    }
    let scale = height / total;

    // cumulative[j] = scaled estimate of blocks[..j]
    let mut cumulative = Vec::with_capacity(blocks.len() + 1);
    cumulative.push(0.0);
    for w in &weights {
        let last = cumulative.last().copied().unwrap_or(0.0);
        cumulative.push(last + w * scale);
    }

    let mut legal: Vec<(usize, Tier, f64)> = Vec::new();
    let mut last_content: Option<usize> = None;
    for j in 0..blocks.len() {
        if j > 0 && !blocks[j].is_blank() {
            if let Some(prev) = last_content {
                let prev_kind = blocks[prev].kind;
                if prev_kind != BlockKind::Heading {
                    let tier = if prev_kind == BlockKind::List && blocks[j].kind == BlockKind::List {
                        Tier::ListItem
                    } else {
                        Tier::Block
                    };
                    // Trailing blank lines of the first half render nothing.
                    legal.push((j, tier, cumulative[prev + 1]));
                }
            }
        }
        if !blocks[j].is_blank() {
            last_content = Some(j);
        }
    }

    for tier in [Tier::Block, Tier::ListItem] {
        let best = legal
            .iter()
            .filter(|(_, t, est)| *t == tier && *est <= budget)
            .max_by(|a, b| a.2.total_cmp(&b.2));
        if let Some(&(j, _, est)) = best {
            debug!("Split at block {} ({:?}), estimated {:.0}/{:.0}", j, tier, est, budget);
            return Some(SplitPoint::Boundary(j));
        }
    }

    // The first content block whose end crosses the budget.
    let crossing = (0..blocks.len()).find(|&i| !blocks[i].is_blank() && cumulative[i + 1] > budget);
    if let Some(k) = crossing {
        let block = &blocks[k];
        let lines: Vec<&str> = block.lines().collect();
        if block.kind == BlockKind::Paragraph && block.splittable && lines.len() > 1 {
            let per_line = (cumulative[k + 1] - cumulative[k]) / lines.len() as f64;
            let fitting = (1..lines.len())
                .rev()
                .find(|&m| cumulative[k] + per_line * m as f64 <= budget);
            let has_earlier_content = blocks[..k].iter().any(|b| !b.is_blank());
            let cut = match (fitting, has_earlier_content) {
                (Some(m), _) => Some(m),
                // Nothing before this paragraph: isolate its first line.
                (None, false) => Some(1),
                (None, true) => None,
            };
            if let Some(line) = cut {
                debug!("Split inside paragraph at block {} after {} lines", k, line);
                return Some(SplitPoint::Line { block: k, line });
            }
        }
    }

    legal.first().map(|&(j, _, _)| {
        debug!("No fitting split; isolating leading blocks before block {}", j);
        SplitPoint::Boundary(j)
    })
}

/// Cut an overflowing candidate into as many pieces as its height calls for.
///
/// The remainder's height is the measured height rescaled by the heuristic,
/// so the pieces are only estimates until the next round measures them.
/// Stops once the remainder is estimated to fit, once `height / budget`
/// pieces exist, or when no further cut is legal. A single returned piece
/// means the candidate could not be split.
fn partition(
    candidate: SlideCandidate,
    height: f64,
    budget: f64,
    h: &HeightHeuristic,
) -> Vec<SlideCandidate> {
    let total: f64 = candidate.blocks.iter().map(|b| estimate_block(b, h)).sum();
    let scale = if total > 0.0 { height / total } else { 0.0 };
    let target = (height / budget).ceil().max(2.0) as usize;

    let mut parts = Vec::new();
    let mut rest = candidate;
    let mut rest_height = height;
    loop {
        if !parts.is_empty() && (rest_height <= budget || parts.len() + 1 >= target) {
            break;
        }
        let Some(point) = plan_split(&rest.blocks, rest_height, budget, h) else {
            break;
        };
        let (head, tail) = rest.split(point);
        parts.push(head);
        rest = tail;
        rest_height = rest.blocks.iter().map(|b| estimate_block(b, h)).sum::<f64>() * scale;
    }
    parts.push(rest);
    parts
}

// ── Pass 2 ──────────────────────────────────────────────────────────────────

/// Result of [`pack`].
#[derive(Debug)]
pub struct PackOutcome {
    pub candidates: Vec<SlideCandidate>,
    /// Document-level warnings (failed batches).
    pub warnings: Vec<SlideWarning>,
    pub repair_rounds: u32,
    pub probe_invocations: u32,
    pub slides_measured: usize,
}

/// Measure and repair candidates until every one is final or irreducible.
///
/// # Errors
/// Only [`ProbeError::Unavailable`] is propagated (as
/// [`AutosplitError::RendererUnavailable`]). Any other probe failure marks
/// that batch's candidates unmeasured and the loop continues.
pub async fn pack(
    mut candidates: Vec<SlideCandidate>,
    probe: &dyn RenderProbe,
    config: &ConversionConfig,
) -> Result<PackOutcome, AutosplitError> {
    let budget = config.height_budget;
    let progress = config.progress_callback.as_ref();
    let mut measured: HashMap<String, f64> = HashMap::new();
    let mut warnings = Vec::new();
    let mut probe_invocations = 0u32;
    let mut repair_rounds = 0u32;
    let mut slides_measured = 0usize;
    let mut round = 0u32;

    loop {
        // ── Build this round's batch ─────────────────────────────────────
        let mut batch: Vec<String> = Vec::new();
        let mut queued: HashSet<String> = HashSet::new();
        for c in candidates
            .iter_mut()
            .filter(|c| c.state == CandidateState::Pending)
        {
            if !c.has_content() {
                c.state = CandidateState::Final;
                continue;
            }
            let text = c.text();
            if !measured.contains_key(&text) && queued.insert(text.clone()) {
                batch.push(text);
            }
        }

        if !batch.is_empty() {
            if let Some(cb) = progress {
                cb.on_round_start(round, batch.len());
            }
            info!("Round {}: measuring {} slides", round, batch.len());
            probe_invocations += 1;
            if round > 0 {
                repair_rounds += 1;
            }

            let result = probe
                .measure(&batch, &config.theme)
                .await
                .and_then(|heights| {
                    if heights.len() == batch.len() {
                        Ok(heights)
                    } else {
                        Err(ProbeError::Malformed {
                            detail: format!(
                                "expected {} heights, got {}",
                                batch.len(),
                                heights.len()
                            ),
                        })
                    }
                });

            match result {
                Ok(heights) => {
                    slides_measured += batch.len();
                    measured.extend(batch.into_iter().zip(heights));
                }
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    warn!("Round {}: measurement failed, slides kept as-is: {}", round, e);
                    if let Some(cb) = progress {
                        cb.on_probe_error(round, &e.to_string());
                    }
                    warnings.push(SlideWarning {
                        slide: None,
                        kind: WarningKind::ProbeFailed(e),
                    });
                }
            }
        }

        // ── Evaluate ─────────────────────────────────────────────────────
        let mut next = Vec::with_capacity(candidates.len());
        let (mut final_count, mut split_count) = (0usize, 0usize);

        for mut c in candidates {
            if c.state != CandidateState::Pending {
                next.push(c);
                continue;
            }
            let Some(&height) = measured.get(&c.text()) else {
                c.state = CandidateState::Unmeasured;
                next.push(c);
                continue;
            };
            c.height = Some(height);

            if height <= budget {
                c.state = CandidateState::Final;
                final_count += 1;
                next.push(c);
            } else if round >= config.max_repair_rounds {
                debug!(
                    "Slide at line {} still {:.0} > {:.0} after {} rounds",
                    c.start_line(),
                    height,
                    budget,
                    round
                );
                c.state = CandidateState::RoundsExhausted;
                next.push(c);
            } else {
                let line = c.start_line();
                let mut parts = partition(c, height, budget, &config.heuristic);
                if parts.len() > 1 {
                    debug!("Slide at line {} cut into {} slides", line, parts.len());
                    split_count += 1;
                    next.append(&mut parts);
                } else if let Some(mut c) = parts.pop() {
                    debug!(
                        "Slide at line {} is irreducible ({:.0} > {:.0})",
                        line, height, budget
                    );
                    c.state = CandidateState::Irreducible;
                    next.push(c);
                }
            }
        }
        candidates = next;

        if let Some(cb) = progress {
            cb.on_round_complete(round, final_count, split_count);
        }
        if split_count == 0 {
            break;
        }
        round += 1;
    }

    Ok(PackOutcome {
        candidates,
        warnings,
        repair_rounds,
        probe_invocations,
        slides_measured,
    })
}
