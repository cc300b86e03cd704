//! Error types for the marp-autosplit library.
//!
//! Failures fall into two groups:
//!
//! * [`AutosplitError`] is **fatal**: the conversion cannot proceed at all
//!   (input missing, renderer not installed, invalid configuration).
//!   Returned as `Err(AutosplitError)` from the top-level entry points.
//!
//! * Non-fatal conditions: [`ParseError`], [`ProbeError`] (except
//!   [`ProbeError::Unavailable`]) and [`ExportError`]. These degrade the
//!   result instead of discarding it: a malformed block becomes atomic, an
//!   unmeasured slide is emitted as-is, a failed PPTX export still leaves the
//!   Markdown and PDF on disk. They are reported through
//!   [`crate::output::SlideWarning`] and [`crate::output::ExportResult`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the marp-autosplit library.
#[derive(Debug, Error)]
pub enum AutosplitError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Markdown file not found: '{path}'\nCheck the path exists and is readable.")]
    InputNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file was read but is not valid UTF-8 text.
    #[error("Input '{path}' is not valid UTF-8 Markdown: {detail}")]
    InvalidInput { path: PathBuf, detail: String },

    // ── Renderer errors ───────────────────────────────────────────────────
    /// The Marp executable or the browser it drives could not be found or
    /// started. Never retried.
    #[error("Renderer unavailable: {what}\n{hint}")]
    RendererUnavailable { what: String, hint: String },

    /// A slide overflowed the height budget, could not be split, and the
    /// configured overflow policy is `Reject`.
    #[error(
        "Slide {slide} is {height:.0} units tall (budget {budget:.0}) and cannot be split \
without breaking an atomic block"
    )]
    IrreducibleOverflow { slide: usize, height: f64, budget: f64 },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create the output directory or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A structural problem found while segmenting a document.
///
/// Never fatal: the offending region is kept as a single atomic block that
/// runs to the end of the document.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum ParseError {
    /// A code fence opened on `line` is never closed.
    #[error("Line {line}: code fence is never closed")]
    UnterminatedFence { line: usize },

    /// A `$$` display-math block opened on `line` is never closed.
    #[error("Line {line}: math block is never closed")]
    UnterminatedMath { line: usize },

    /// An HTML comment opened on `line` is never closed.
    #[error("Line {line}: HTML comment is never closed")]
    UnterminatedComment { line: usize },
}

/// Failure of one measurement batch.
///
/// Only [`ProbeError::Unavailable`] aborts a conversion; every other variant
/// marks the batch's slides as unmeasured.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum ProbeError {
    /// Executable or browser missing.
    #[error("{what} is not available: {hint}")]
    Unavailable { what: String, hint: String },

    /// The external process exceeded the bounded wait.
    #[error("{program} timed out after {secs}s")]
    Timeout { program: String, secs: u64 },

    /// The external process exited non-zero.
    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    /// The renderer ran but its output could not be interpreted.
    #[error("Unreadable measurement output: {detail}")]
    Malformed { detail: String },

    /// Reading or writing the probe workspace failed.
    #[error("Probe workspace I/O failed: {0}")]
    Io(String),
}

impl ProbeError {
    /// Whether this failure must abort the whole conversion.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ProbeError::Unavailable { .. })
    }
}

impl From<ProbeError> for AutosplitError {
    fn from(e: ProbeError) -> Self {
        match e {
            ProbeError::Unavailable { what, hint } => {
                AutosplitError::RendererUnavailable { what, hint }
            }
            other => AutosplitError::Internal(other.to_string()),
        }
    }
}

/// A non-fatal error for a single export format.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum ExportError {
    /// Marp exited non-zero or could not be started.
    #[error("{format} export failed: {detail}")]
    Failed { format: String, detail: String },

    /// Marp did not finish within the bounded wait.
    #[error("{format} export timed out after {secs}s")]
    Timeout { format: String, secs: u64 },
}
