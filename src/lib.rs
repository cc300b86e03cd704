//! # marp-autosplit
//!
//! Turn a long Markdown document into a Marp slide deck whose slides never
//! overflow.
//!
//! ## Why this crate?
//!
//! Splitting at headings alone produces slides that run off the bottom as
//! soon as a section holds a long list, a tall table or a figure. Counting
//! characters or lines to guess the height is wrong for every theme, font and
//! image. Instead this crate renders candidate slides with Marp in a headless
//! browser, reads back their true heights, and cuts only the slides that
//! overflow, at the best block boundary, until everything fits.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Markdown
//!  │
//!  ├─ 1. Clean     strip frontmatter and manual markers, fix heading spacing
//!  ├─ 2. Segment   blocks (headings, paragraphs, code, tables, images, lists)
//!  ├─ 3. Pass 1    one slide per hard heading section
//!  ├─ 4. Pass 2    measure all slides in one batch; split the overflowing
//!  │               ones and re-measure only those, for a bounded number of rounds
//!  ├─ 5. Assemble  insert `---` markers, prepend the Marp header
//!  └─ 6. Export    PPTX / PDF / HTML via Marp
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use marp_autosplit::{convert, ConversionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Marp and Chrome/Edge are auto-detected (MARP_BIN / CHROME_PATH override)
//!     let config = ConversionConfig::default();
//!     let output = convert("talk.md", &config).await?;
//!     println!("{}", output.markdown_path.display());
//!     eprintln!("{} slides, {} renderer calls",
//!         output.pagination.stats.final_slides,
//!         output.pagination.stats.probe_invocations);
//!     Ok(())
//! }
//! ```
//!
//! ## Bring your own renderer
//!
//! [`paginate`] works with any [`RenderProbe`], which makes the layout engine
//! usable with another renderer and testable without one:
//!
//! ```rust
//! use marp_autosplit::{paginate, ConversionConfig, ProbeError, RenderProbe};
//!
//! struct LineCounter;
//!
//! #[async_trait::async_trait]
//! impl RenderProbe for LineCounter {
//!     async fn measure(&self, slides: &[String], _theme: &str) -> Result<Vec<f64>, ProbeError> {
//!         Ok(slides.iter().map(|s| s.lines().count() as f64 * 40.0).collect())
//!     }
//! }
//!
//! # tokio_test::block_on(async {
//! let config = ConversionConfig::default();
//! let out = paginate("# One\n\ntext\n\n# Two\n\ntext\n", &LineCounter, &config).await.unwrap();
//! assert_eq!(out.slides.len(), 2);
//! # });
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `marp-autosplit` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! marp-autosplit = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    ConversionConfig, ConversionConfigBuilder, HeightHeuristic, OutputFormat, OverflowPolicy,
};
pub use convert::{convert, convert_many, convert_sync, convert_to_file, deck_header, paginate};
pub use error::{AutosplitError, ExportError, ParseError, ProbeError};
pub use output::{
    ConversionOutput, ExportResult, PaginationOutput, PaginationStats, SlideResult, SlideStatus,
    SlideWarning, WarningKind,
};
pub use pipeline::probe::{MarpProbe, RenderProbe};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
