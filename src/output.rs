//! Result types returned by the pagination engine and the full conversion.

use crate::config::OutputFormat;
use crate::error::{ExportError, ParseError, ProbeError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Outcome of [`crate::convert::paginate`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationOutput {
    /// The input with slide-break markers inserted, otherwise byte-identical.
    pub markdown: String,
    /// Final slides in deck order.
    pub slides: Vec<SlideResult>,
    /// Recovered problems, in the order they were found.
    pub warnings: Vec<SlideWarning>,
    pub stats: PaginationStats,
}

impl PaginationOutput {
    /// Slides that were measured over budget and emitted anyway.
    pub fn irreducible_slides(&self) -> impl Iterator<Item = &SlideResult> {
        self.slides.iter().filter(|s| s.status.is_overflow())
    }

    /// Slides whose batch failed, so their height is unknown.
    pub fn unmeasured_slides(&self) -> impl Iterator<Item = &SlideResult> {
        self.slides
            .iter()
            .filter(|s| s.status == SlideStatus::Unmeasured)
    }
}

/// One slide of the final deck.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlideResult {
    /// 1-indexed position in the deck.
    pub index: usize,
    /// Verbatim block text of the slide, without any break marker.
    pub markdown: String,
    /// Last measured rendered height, if the slide was measured.
    pub height: Option<f64>,
    pub status: SlideStatus,
    /// 1-based line of the input where the slide starts.
    pub start_line: usize,
}

/// How a slide left the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlideStatus {
    /// Measured within the height budget.
    Fit,
    /// Over budget, and no legal split point remains.
    Irreducible,
    /// Still over budget when the repair-round cap was reached.
    RoundsExhausted,
    /// Never measured because its batch failed.
    Unmeasured,
}

impl SlideStatus {
    /// Measured, and taller than the budget.
    pub fn is_overflow(self) -> bool {
        matches!(self, SlideStatus::Irreducible | SlideStatus::RoundsExhausted)
    }
}

/// A recovered condition attached to a slide (or to the document).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlideWarning {
    /// 1-indexed slide, or None when the warning concerns the whole document.
    pub slide: Option<usize>,
    pub kind: WarningKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WarningKind {
    /// Malformed structure degraded to an atomic block.
    Parse(ParseError),
    /// The slide could not be split below the budget.
    IrreducibleOverflow { height: f64, budget: f64 },
    /// Repair stopped at the round cap with the slide still overflowing.
    RepairRoundExceeded { height: f64, budget: f64, rounds: u32 },
    /// A measurement batch failed; affected slides were emitted unmeasured.
    ProbeFailed(ProbeError),
}

impl std::fmt::Display for SlideWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(slide) = self.slide {
            write!(f, "slide {slide}: ")?;
        }
        match &self.kind {
            WarningKind::Parse(e) => write!(f, "{e}"),
            WarningKind::IrreducibleOverflow { height, budget } => write!(
                f,
                "{height:.0} units exceeds budget {budget:.0} and cannot be split"
            ),
            WarningKind::RepairRoundExceeded {
                height,
                budget,
                rounds,
            } => write!(
                f,
                "{height:.0} units exceeds budget {budget:.0} after {rounds} repair rounds"
            ),
            WarningKind::ProbeFailed(e) => write!(f, "measurement failed: {e}"),
        }
    }
}

/// Aggregate statistics for one pagination run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaginationStats {
    /// Blocks produced by the segmenter.
    pub blocks: usize,
    /// Slides produced by pass 1 (heading breaks only).
    pub initial_candidates: usize,
    /// Slides in the final deck.
    pub final_slides: usize,
    /// Repair rounds that sent a batch to the renderer.
    pub repair_rounds: u32,
    /// External measurement invocations (always `1 + repair_rounds` or fewer).
    pub probe_invocations: u32,
    /// Slides measured across all batches.
    pub slides_measured: usize,
    /// Slides measured over budget (`Irreducible` or `RoundsExhausted`).
    pub irreducible_slides: usize,
    /// Slides emitted without a measurement.
    pub unmeasured_slides: usize,
    /// Wall-clock time of the whole run.
    pub duration_ms: u64,
}

/// Outcome of [`crate::convert::convert`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutput {
    /// Full deck: Marp header followed by the paginated Markdown.
    pub markdown: String,
    /// Path of the written `<stem>_slide.md`.
    pub markdown_path: PathBuf,
    pub pagination: PaginationOutput,
    /// One entry per requested export format, in request order.
    pub exports: Vec<ExportResult>,
}

impl ConversionOutput {
    /// Every file that exists on disk after the conversion.
    pub fn files(&self) -> Vec<PathBuf> {
        self.exports
            .iter()
            .filter(|e| e.error.is_none())
            .map(|e| e.path.clone())
            .collect()
    }
}

/// Result of exporting one format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportResult {
    pub format: OutputFormat,
    pub path: PathBuf,
    pub duration_ms: u64,
    /// Set when the export failed; the other formats are unaffected.
    pub error: Option<ExportError>,
}
