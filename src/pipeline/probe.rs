//! Render probe: measure the true rendered height of candidate slides.
//!
//! ## How a batch is measured
//!
//! 1. All candidates of the batch are written into one throwaway Marp deck
//!    inside a fresh [`TempDir`], one candidate per slide.
//! 2. `marp --template bare` renders the deck to HTML.
//! 3. A small script is injected before `</body>`. On `load` it releases the
//!    fixed slide height on every `<section>`, reads `scrollHeight` minus the
//!    vertical padding, and writes the list as JSON into a `<pre>` element.
//! 4. The headless browser loads the page and prints the final DOM; the JSON
//!    is read back out of it.
//!
//! One batch costs exactly one Marp run and one browser run, whatever its
//! size. The temp directory is removed when the probe call returns, on every
//! path.

use crate::error::ProbeError;
use crate::pipeline::locate::Renderer;
use crate::pipeline::process::run_bounded;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::time::Instant;
use tracing::{debug, info};

/// Id of the element the measurement script writes into.
const RESULT_ID: &str = "marp-autosplit-heights";

/// Runs in the rendered deck once images and fonts have loaded.
///
/// Sections created for advanced backgrounds (`data-marpit-advanced-background`
/// set to `background` or `pseudo`) are layers of a content slide, not slides.
const MEASURE_SCRIPT: &str = r#"<script>
window.addEventListener('load', function () {
  var sections = Array.prototype.slice.call(
    document.querySelectorAll('svg[data-marpit-svg] > foreignObject > section')
  ).filter(function (s) {
    var bg = s.getAttribute('data-marpit-advanced-background');
    return bg !== 'background' && bg !== 'pseudo';
  });
  var heights = sections.map(function (s) {
    s.style.height = 'auto';
    s.style.minHeight = '0';
    s.style.maxHeight = 'none';
    s.style.overflow = 'visible';
    var cs = window.getComputedStyle(s);
    return s.scrollHeight - parseFloat(cs.paddingTop) - parseFloat(cs.paddingBottom);
  });
  var out = document.createElement('pre');
  out.id = 'marp-autosplit-heights';
  out.textContent = JSON.stringify(heights);
  document.body.appendChild(out);
});
</script>
"#;

static RE_RESULT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<pre id="marp-autosplit-heights">([^<]*)</pre>"#).unwrap());

/// Measures rendered slide heights.
///
/// Implementations must return exactly one height per input slide, in order,
/// in the same unit as the configured height budget. The engine calls
/// [`RenderProbe::measure`] once per round, so an implementation that talks to
/// an external program should do all of a batch's work in one invocation.
#[async_trait]
pub trait RenderProbe: Send + Sync {
    /// Measure each slide in `slides` as rendered with `theme`.
    ///
    /// # Errors
    /// [`ProbeError::Unavailable`] aborts the conversion. Every other error
    /// leaves the batch unmeasured and the conversion continues.
    async fn measure(&self, slides: &[String], theme: &str) -> Result<Vec<f64>, ProbeError>;
}

/// [`RenderProbe`] backed by Marp CLI and a headless Chromium browser.
#[derive(Debug, Clone)]
pub struct MarpProbe {
    renderer: Renderer,
    style_class: String,
    asset_dir: Option<PathBuf>,
}

impl MarpProbe {
    pub fn new(renderer: Renderer) -> Self {
        Self {
            renderer,
            style_class: String::new(),
            asset_dir: None,
        }
    }

    /// Deck-wide `class:` directive applied while measuring.
    pub fn with_style_class(mut self, class: impl Into<String>) -> Self {
        self.style_class = class.into();
        self
    }

    /// Directory that relative image paths in the slides resolve against.
    ///
    /// The probe deck lives in a temp directory, so without this a relative
    /// `![](figure.png)` would render as a broken image of the wrong size.
    pub fn with_asset_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.asset_dir = Some(dir.into());
        self
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    fn workspace(&self) -> Result<TempDir, ProbeError> {
        let builder = {
            let mut b = tempfile::Builder::new();
            b.prefix("marp-autosplit-");
            b
        };
        match &self.renderer.work_dir {
            Some(dir) => builder.tempdir_in(dir),
            None => builder.tempdir(),
        }
        .map_err(|e| ProbeError::Io(format!("creating probe workspace: {e}")))
    }

    async fn render_html(&self, md: &Path, html: &Path, deadline: Instant) -> Result<(), ProbeError> {
        let mut cmd = self.renderer.marp_command();
        cmd.arg(md)
            .args(["--html", "--template", "bare", "--allow-local-files", "-o"])
            .arg(html);
        if let Some(themes) = &self.renderer.theme_set {
            cmd.arg("--theme-set").arg(themes);
        }
        run_bounded(cmd, "marp", remaining(deadline)).await?;
        Ok(())
    }

    async fn dump_dom(&self, html: &Path, deadline: Instant) -> Result<String, ProbeError> {
        let mut cmd = self.renderer.browser_command();
        cmd.args([
            "--headless=new",
            "--disable-gpu",
            "--hide-scrollbars",
            "--allow-file-access-from-files",
            "--virtual-time-budget=10000",
        ])
        .args(&self.renderer.browser_args)
        .arg("--dump-dom")
        .arg(html);
        let output = run_bounded(cmd, "browser", remaining(deadline)).await?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl RenderProbe for MarpProbe {
    async fn measure(&self, slides: &[String], theme: &str) -> Result<Vec<f64>, ProbeError> {
        if slides.is_empty() {
            return Ok(Vec::new());
        }
        let started = Instant::now();
        let deadline = started + self.renderer.timeout;

        let workspace = self.workspace()?;
        let md = workspace.path().join("probe.md");
        let html = workspace.path().join("probe.html");

        tokio::fs::write(&md, probe_deck(slides, theme, &self.style_class))
            .await
            .map_err(|e| ProbeError::Io(format!("writing {}: {e}", md.display())))?;

        self.render_html(&md, &html, deadline).await?;

        let rendered = tokio::fs::read_to_string(&html)
            .await
            .map_err(|e| ProbeError::Io(format!("reading {}: {e}", html.display())))?;
        let base = self.asset_dir.as_deref().map(file_url);
        tokio::fs::write(&html, inject_measurement(&rendered, base.as_deref()))
            .await
            .map_err(|e| ProbeError::Io(format!("writing {}: {e}", html.display())))?;

        let dom = self.dump_dom(&html, deadline).await?;
        let heights = parse_heights(&dom, slides.len())?;

        info!(
            "Measured {} slides in {}ms",
            heights.len(),
            started.elapsed().as_millis()
        );
        Ok(heights)
    }
}

/// Time left before `deadline`, so the whole batch shares one bound.
fn remaining(deadline: Instant) -> std::time::Duration {
    deadline.saturating_duration_since(Instant::now())
}

/// The measurement deck: a Marp header, then one slide per candidate.
pub fn probe_deck(slides: &[String], theme: &str, style_class: &str) -> String {
    let mut deck = format!("---\nmarp: true\ntheme: {theme}\n");
    if !style_class.is_empty() {
        deck.push_str(&format!("class: {style_class}\n"));
    }
    deck.push_str("---\n\n");
    let body: Vec<&str> = slides.iter().map(|s| s.trim_end()).collect();
    deck.push_str(&body.join("\n\n---\n\n"));
    deck.push('\n');
    deck
}

/// Insert the measurement script (and an optional `<base>`) into Marp's HTML.
pub fn inject_measurement(html: &str, base_href: Option<&str>) -> String {
    let mut out = html.to_string();
    if let Some(href) = base_href {
        let tag = format!("<base href=\"{}\">", href.replace('"', "%22"));
        match out.find("<head>") {
            Some(i) => out.insert_str(i + "<head>".len(), &tag),
            None => out.insert_str(0, &tag),
        }
    }
    match out.rfind("</body>") {
        Some(i) => out.insert_str(i, MEASURE_SCRIPT),
        None => out.push_str(MEASURE_SCRIPT),
    }
    out
}

/// Read the heights written by the measurement script out of a dumped DOM.
///
/// # Errors
/// [`ProbeError::Malformed`] if the result element is missing, is not a JSON
/// array of numbers, or holds a different number of heights than `expected`.
pub fn parse_heights(dom: &str, expected: usize) -> Result<Vec<f64>, ProbeError> {
    let caps = RE_RESULT.captures(dom).ok_or_else(|| ProbeError::Malformed {
        detail: format!("no #{RESULT_ID} element in browser output"),
    })?;
    let heights: Vec<f64> = serde_json::from_str(caps[1].trim()).map_err(|e| ProbeError::Malformed {
        detail: format!("height list is not valid JSON: {e}"),
    })?;
    if heights.len() != expected {
        return Err(ProbeError::Malformed {
            detail: format!("expected {expected} heights, renderer produced {}", heights.len()),
        });
    }
    debug!("Heights: {:?}", heights);
    Ok(heights)
}

/// `file://` URL of a directory, with a trailing slash so it works as a base.
fn file_url(dir: &Path) -> String {
    let abs = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
    let mut s = abs.to_string_lossy().replace('\\', "/");
    if let Some(stripped) = s.strip_prefix("//?/") {
        s = stripped.to_string();
    }
    if !s.starts_with('/') {
        s.insert(0, '/');
    }
    if !s.ends_with('/') {
        s.push('/');
    }
    format!("file://{s}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_deck_layout() {
        let slides = vec!["# A\n\ntext\n\n".to_string(), "# B\n".to_string()];
        let deck = probe_deck(&slides, "gaia", "");
        assert_eq!(
            deck,
            "---\nmarp: true\ntheme: gaia\n---\n\n# A\n\ntext\n\n---\n\n# B\n"
        );
    }

    #[test]
    fn test_probe_deck_with_class() {
        let deck = probe_deck(&["x".to_string()], "default", "lead");
        assert!(deck.starts_with("---\nmarp: true\ntheme: default\nclass: lead\n---\n\n"));
    }

    #[test]
    fn test_inject_before_body_close() {
        let html = "<html><head></head><body><div></div></body></html>";
        let out = inject_measurement(html, None);
        let script_at = out.find("<script>").unwrap();
        assert!(script_at < out.find("</body>").unwrap());
        assert!(out.contains(RESULT_ID));
    }

    #[test]
    fn test_inject_without_body_appends() {
        let out = inject_measurement("<div></div>", None);
        assert!(out.starts_with("<div></div><script>"));
    }

    #[test]
    fn test_inject_base_href() {
        let html = "<html><head><meta charset=\"utf-8\"></head><body></body></html>";
        let out = inject_measurement(html, Some("file:///docs/talk/"));
        assert!(out.contains("<head><base href=\"file:///docs/talk/\"><meta"));
    }

    #[test]
    fn test_parse_heights_ok() {
        let dom = r#"<body><pre id="marp-autosplit-heights">[120.5,300,0]</pre></body>"#;
        assert_eq!(parse_heights(dom, 3).unwrap(), vec![120.5, 300.0, 0.0]);
    }

    #[test]
    fn test_parse_heights_missing_element() {
        let err = parse_heights("<body></body>", 1).unwrap_err();
        assert!(matches!(err, ProbeError::Malformed { .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_parse_heights_count_mismatch() {
        let dom = r#"<pre id="marp-autosplit-heights">[1,2]</pre>"#;
        let err = parse_heights(dom, 3).unwrap_err();
        assert!(err.to_string().contains("expected 3"), "got: {err}");
    }

    #[test]
    fn test_parse_heights_not_json() {
        let dom = r#"<pre id="marp-autosplit-heights">NaN, oops</pre>"#;
        assert!(parse_heights(dom, 1).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_file_url_has_trailing_slash() {
        let url = file_url(Path::new("/nonexistent/dir"));
        assert_eq!(url, "file:///nonexistent/dir/");
    }
}
