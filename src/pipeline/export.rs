//! Export: render the paginated deck to the requested output formats.
//!
//! Each format is one `marp <deck> -o <stem>.<ext>` invocation; Marp infers
//! the output type from the extension. Formats run one after another because
//! each PDF or PPTX export launches its own browser. A failed format is
//! recorded in its [`ExportResult`] and does not stop the others.

use crate::config::OutputFormat;
use crate::error::{ExportError, ProbeError};
use crate::output::ExportResult;
use crate::pipeline::locate::Renderer;
use crate::pipeline::process::run_bounded;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

/// Export `deck` (an already written `<stem>_slide.md`) into `output_dir`.
pub async fn export_all(
    deck: &Path,
    stem: &str,
    output_dir: &Path,
    formats: &[OutputFormat],
    renderer: &Renderer,
) -> Vec<ExportResult> {
    let mut results = Vec::with_capacity(formats.len());
    for &format in formats {
        let started = Instant::now();
        let (path, error) = match format {
            OutputFormat::Md => (deck.to_path_buf(), None),
            _ => {
                let path = output_path(output_dir, stem, format);
                let error = export_one(deck, &path, format, renderer).await.err();
                (path, error)
            }
        };
        let duration_ms = started.elapsed().as_millis() as u64;
        match &error {
            None => info!("{} written: {} ({}ms)", format, path.display(), duration_ms),
            Some(e) => warn!("{} export failed: {}", format, e),
        }
        results.push(ExportResult {
            format,
            path,
            duration_ms,
            error,
        });
    }
    results
}

/// `<output_dir>/<stem>.<ext>`.
pub fn output_path(output_dir: &Path, stem: &str, format: OutputFormat) -> PathBuf {
    output_dir.join(format!("{stem}.{}", format.extension()))
}

async fn export_one(
    deck: &Path,
    out: &Path,
    format: OutputFormat,
    renderer: &Renderer,
) -> Result<(), ExportError> {
    let mut cmd = renderer.marp_command();
    cmd.arg(deck).arg("-o").arg(out).arg("--allow-local-files");
    if let Some(themes) = &renderer.theme_set {
        cmd.arg("--theme-set").arg(themes);
    }

    run_bounded(cmd, "marp", renderer.timeout)
        .await
        .map_err(|e| match e {
            ProbeError::Timeout { secs, .. } => ExportError::Timeout {
                format: format.label().to_string(),
                secs,
            },
            other => ExportError::Failed {
                format: format.label().to_string(),
                detail: other.to_string(),
            },
        })?;

    if !out.exists() {
        return Err(ExportError::Failed {
            format: format.label().to_string(),
            detail: format!("marp exited successfully but {} was not created", out.display()),
        });
    }
    Ok(())
}
