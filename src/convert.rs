//! Conversion entry points.
//!
//! [`paginate`] is the layout engine on its own: Markdown in, Markdown with
//! slide breaks out, measured through whatever [`RenderProbe`] the caller
//! supplies. The remaining functions wrap it into the file-to-deck workflow:
//! read and clean the input, discover Marp and a browser, paginate, write
//! `<stem>_slide.md` with a Marp header, and export the requested formats.

use crate::config::{ConversionConfig, OverflowPolicy};
use crate::error::{AutosplitError, ParseError};
use crate::output::{
    ConversionOutput, PaginationOutput, PaginationStats, SlideResult, SlideStatus, SlideWarning,
    WarningKind,
};
use crate::pipeline::assemble::assemble;
use crate::pipeline::clean::{clean_document, CleanOptions};
use crate::pipeline::export::export_all;
use crate::pipeline::locate::Renderer;
use crate::pipeline::pack::{initial_candidates, pack, CandidateState};
use crate::pipeline::probe::{MarpProbe, RenderProbe};
use crate::pipeline::segment::{segment, SegmentOptions};
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Insert slide breaks into `markdown` so that no slide overflows.
///
/// This is the core of the crate. The text is segmented into blocks, grouped
/// into slides at hard heading breaks, then measured with `probe` and
/// repaired in rounds (see [`crate::pipeline::pack`]). The returned Markdown
/// is the input with `---` markers inserted and is otherwise byte-identical.
///
/// # Errors
/// * [`AutosplitError::RendererUnavailable`] if the probe reports the renderer
///   missing
/// * [`AutosplitError::IrreducibleOverflow`] for the first slide left over
///   budget, only when `config.overflow_policy` is `Reject`
pub async fn paginate(
    markdown: &str,
    probe: &dyn RenderProbe,
    config: &ConversionConfig,
) -> Result<PaginationOutput, AutosplitError> {
    let started = Instant::now();

    // ── Step 1: Segment ──────────────────────────────────────────────────
    let segmentation = segment(
        markdown,
        &SegmentOptions {
            heading_split_levels: config.heading_split_levels,
        },
    );
    let block_count = segmentation.blocks.len();
    for issue in &segmentation.issues {
        warn!("{}", issue);
    }

    // ── Step 2: Pass 1 at hard breaks ────────────────────────────────────
    let candidates = initial_candidates(segmentation.blocks);
    let initial = candidates.len();
    info!(
        "Segmented {} blocks into {} initial slides (split level {})",
        block_count, initial, config.heading_split_levels
    );
    if let Some(cb) = &config.progress_callback {
        cb.on_conversion_start(initial);
    }

    // ── Step 3: Measure and repair ───────────────────────────────────────
    let outcome = pack(candidates, probe, config).await?;

    // ── Step 4: Assemble ─────────────────────────────────────────────────
    let assembled = assemble(&outcome.candidates);

    let slides: Vec<SlideResult> = outcome
        .candidates
        .iter()
        .enumerate()
        .map(|(i, c)| SlideResult {
            index: i + 1,
            markdown: c.text(),
            height: c.height,
            status: match c.state {
                CandidateState::Irreducible => SlideStatus::Irreducible,
                CandidateState::RoundsExhausted => SlideStatus::RoundsExhausted,
                CandidateState::Unmeasured => SlideStatus::Unmeasured,
                CandidateState::Final | CandidateState::Pending => SlideStatus::Fit,
            },
            start_line: c.start_line(),
        })
        .collect();

    // ── Step 5: Warnings, in document order ──────────────────────────────
    let mut warnings = outcome.warnings;
    for issue in segmentation.issues {
        let line = match &issue {
            ParseError::UnterminatedFence { line }
            | ParseError::UnterminatedMath { line }
            | ParseError::UnterminatedComment { line } => *line,
        };
        warnings.push(SlideWarning {
            slide: slide_at_line(&slides, line),
            kind: WarningKind::Parse(issue),
        });
    }
    for slide in &slides {
        let height = slide.height.unwrap_or_default();
        let kind = match slide.status {
            SlideStatus::Irreducible => WarningKind::IrreducibleOverflow {
                height,
                budget: config.height_budget,
            },
            SlideStatus::RoundsExhausted => WarningKind::RepairRoundExceeded {
                height,
                budget: config.height_budget,
                rounds: config.max_repair_rounds,
            },
            _ => continue,
        };
        warn!("Slide {} left over budget ({:.0} > {:.0})", slide.index, height, config.height_budget);
        warnings.push(SlideWarning {
            slide: Some(slide.index),
            kind,
        });
    }

    let over_budget: Vec<&SlideResult> = slides
        .iter()
        .filter(|s| s.status.is_overflow())
        .collect();
    if config.overflow_policy == OverflowPolicy::Reject {
        if let Some(first) = over_budget.first() {
            return Err(AutosplitError::IrreducibleOverflow {
                slide: first.index,
                height: first.height.unwrap_or_default(),
                budget: config.height_budget,
            });
        }
    }

    let stats = PaginationStats {
        blocks: block_count,
        initial_candidates: initial,
        final_slides: slides.len(),
        repair_rounds: outcome.repair_rounds,
        probe_invocations: outcome.probe_invocations,
        slides_measured: outcome.slides_measured,
        irreducible_slides: slides.iter().filter(|s| s.status.is_overflow()).count(),
        unmeasured_slides: slides
            .iter()
            .filter(|s| s.status == SlideStatus::Unmeasured)
            .count(),
        duration_ms: started.elapsed().as_millis() as u64,
    };

    if let Some(cb) = &config.progress_callback {
        cb.on_conversion_complete(stats.final_slides, stats.irreducible_slides);
    }
    info!(
        "Paginated into {} slides ({} repair rounds, {} renderer calls) in {}ms",
        stats.final_slides, stats.repair_rounds, stats.probe_invocations, stats.duration_ms
    );

    Ok(PaginationOutput {
        markdown: assembled,
        slides,
        warnings,
        stats,
    })
}

/// Last slide starting at or before `line`.
fn slide_at_line(slides: &[SlideResult], line: usize) -> Option<usize> {
    slides
        .iter()
        .take_while(|s| s.start_line <= line)
        .last()
        .map(|s| s.index)
}

/// Convert a Markdown file into a paginated Marp deck and export it.
///
/// This is the primary entry point for the library.
///
/// # Arguments
/// * `input`: Path to a UTF-8 Markdown file
/// * `config`: Conversion configuration
///
/// # Returns
/// `Ok(ConversionOutput)` once `<output_dir>/<stem>_slide.md` is written,
/// even if some exports failed (check each [`crate::output::ExportResult`]).
///
/// # Errors
/// Returns `Err(AutosplitError)` only for fatal errors:
/// - File not found / permission denied / not UTF-8
/// - Marp or the browser not installed
/// - The deck could not be written
/// - An over-budget slide under [`OverflowPolicy::Reject`]
pub async fn convert(
    input: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, AutosplitError> {
    let input = input.as_ref();
    info!("Starting conversion: {}", input.display());

    let (pagination, renderer) = paginate_file(input, config).await?;

    // ── Write the deck ───────────────────────────────────────────────────
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "slides".to_string());
    let markdown = format!("{}{}", deck_header(config), pagination.markdown);
    let markdown_path = config.output_dir.join(format!("{stem}_slide.md"));
    write_atomic(&markdown_path, &markdown).await?;
    info!("Deck written: {}", markdown_path.display());

    // ── Export ───────────────────────────────────────────────────────────
    let exports = export_all(
        &markdown_path,
        &stem,
        &config.output_dir,
        &config.output_formats,
        &renderer,
    )
    .await;

    Ok(ConversionOutput {
        markdown,
        markdown_path,
        pagination,
        exports,
    })
}

/// Convert a Markdown file and write the deck to `output_path`.
///
/// Uses atomic write (temp file + rename) to prevent partial files. No
/// export formats are produced.
pub async fn convert_to_file(
    input: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<PaginationOutput, AutosplitError> {
    let (pagination, _) = paginate_file(input.as_ref(), config).await?;
    let deck = format!("{}{}", deck_header(config), pagination.markdown);
    write_atomic(output_path.as_ref(), &deck).await?;
    Ok(pagination)
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    input: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, AutosplitError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| AutosplitError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(input, config))
}

/// Convert several files, up to `config.concurrency` at a time.
///
/// Results come back in completion order, each paired with its input path.
/// One failing file does not affect the others.
pub async fn convert_many(
    inputs: &[PathBuf],
    config: &ConversionConfig,
) -> Vec<(PathBuf, Result<ConversionOutput, AutosplitError>)> {
    info!(
        "Converting {} files (concurrency {})",
        inputs.len(),
        config.concurrency
    );
    stream::iter(inputs.iter().cloned())
        .map(|path| async move {
            let result = convert(&path, config).await;
            if let Err(e) = &result {
                warn!("{}: {}", path.display(), e);
            }
            (path, result)
        })
        .buffer_unordered(config.concurrency.max(1))
        .collect()
        .await
}

/// The Marp frontmatter prepended to the paginated body.
pub fn deck_header(config: &ConversionConfig) -> String {
    let mut header = format!("---\nmarp: true\ntheme: {}\n", config.theme);
    if !config.style_class.is_empty() {
        header.push_str(&format!("class: {}\n", config.style_class));
    }
    if config.paginate {
        header.push_str("paginate: true\n");
    }
    header.push_str("---\n\n");
    header
}

/// Read, clean, discover the renderer and paginate.
async fn paginate_file(
    input: &Path,
    config: &ConversionConfig,
) -> Result<(PaginationOutput, Renderer), AutosplitError> {
    let raw = read_input(input).await?;
    let cleaned = clean_document(
        &raw,
        &CleanOptions {
            keep_breaks: config.preserve_existing_breaks,
        },
    );
    debug!("Cleaned document: {} → {} bytes", raw.len(), cleaned.len());

    let renderer = Renderer::discover(config)?;
    let mut probe = MarpProbe::new(renderer.clone()).with_style_class(&config.style_class);
    if let Some(dir) = input.parent().filter(|d| !d.as_os_str().is_empty()) {
        probe = probe.with_asset_dir(dir);
    }

    let pagination = paginate(&cleaned, &probe, config).await?;
    Ok((pagination, renderer))
}

/// Read a Markdown file, mapping I/O failures to input errors.
async fn read_input(path: &Path) -> Result<String, AutosplitError> {
    if !path.exists() {
        return Err(AutosplitError::InputNotFound {
            path: path.to_path_buf(),
        });
    }
    let bytes = match tokio::fs::read(path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(AutosplitError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(e) => {
            return Err(AutosplitError::InvalidInput {
                path: path.to_path_buf(),
                detail: e.to_string(),
            });
        }
    };
    String::from_utf8(bytes).map_err(|e| AutosplitError::InvalidInput {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}

/// Write via a temp file and rename so readers never see a partial deck.
async fn write_atomic(path: &Path, contents: &str) -> Result<(), AutosplitError> {
    let fail = |source| AutosplitError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(fail)?;
    }
    let tmp_path = path.with_extension("md.tmp");
    tokio::fs::write(&tmp_path, contents).await.map_err(fail)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(fail)?;
    Ok(())
}
