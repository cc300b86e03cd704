//! Configuration types for Markdown-to-slides conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. The pagination engine only reads the
//! layout fields (`heading_split_levels`, `height_budget`, `max_repair_rounds`,
//! `overflow_policy`, `heuristic`, `preserve_existing_breaks`); the remaining
//! fields drive renderer discovery, header assembly and export.

use crate::error::AutosplitError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Configuration for a Markdown-to-slides conversion.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use marp_autosplit::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .theme("gaia")
///     .heading_split_levels(2)
///     .height_budget(620.0)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Marp theme name, passed through to the renderer. Default: `"default"`.
    pub theme: String,

    /// Extra CSS class written into the deck header (`class:`). Default: empty.
    pub style_class: String,

    /// Deepest heading level that forces a new slide. Range: 1–6. Default: 2.
    pub heading_split_levels: u8,

    /// Usable rendered height per slide, in renderer CSS pixels. Default: 620.
    ///
    /// A 16:9 Marp slide is 720 px tall; the default leaves room for the
    /// page number and the theme's vertical padding.
    pub height_budget: f64,

    /// Maximum number of repair rounds after the first measurement. Default: 3.
    ///
    /// Each round is one renderer invocation, so the total number of external
    /// calls per conversion is at most `1 + max_repair_rounds`.
    pub max_repair_rounds: u32,

    /// What to do with a slide that overflows and cannot be split. Default: accept.
    pub overflow_policy: OverflowPolicy,

    /// Approximate per-block height model used to choose split points.
    pub heuristic: HeightHeuristic,

    /// Keep `---` slide markers already present in the input instead of
    /// letting the cleaning pre-pass strip them. Default: false.
    ///
    /// Pagination itself always starts a new slide at a thematic break, as
    /// Marp does; this only decides whether [`crate::convert::convert`]
    /// removes the manual markers first. Turn it on to re-run on already
    /// paginated output.
    pub preserve_existing_breaks: bool,

    /// Write `paginate: true` into the deck header. Default: true.
    pub paginate: bool,

    /// Formats to produce after pagination. Default: PPTX and PDF.
    pub output_formats: Vec<OutputFormat>,

    /// Directory receiving `<stem>_slide.md` and exports. Default: `output_slides`.
    pub output_dir: PathBuf,

    /// Explicit Marp executable. If None, discovered (see [`crate::pipeline::locate`]).
    pub marp_path: Option<PathBuf>,

    /// Explicit Chrome/Edge executable. If None, discovered.
    pub browser_path: Option<PathBuf>,

    /// Directory of custom Marp themes (`--theme-set`). If None, discovered.
    pub theme_set: Option<PathBuf>,

    /// Extra command-line arguments for the headless browser.
    pub browser_args: Vec<String>,

    /// Parent directory for temporary probe workspaces. If None, the system temp dir.
    pub work_dir: Option<PathBuf>,

    /// Bound on each external renderer invocation, in seconds. Default: 120.
    pub renderer_timeout_secs: u64,

    /// Documents converted at once by [`crate::convert::convert_many`]. Default: 2.
    ///
    /// Each conversion launches its own browser, so this stays low.
    pub concurrency: usize,

    /// Optional per-round progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            theme: "default".to_string(),
            style_class: String::new(),
            heading_split_levels: 2,
            height_budget: 620.0,
            max_repair_rounds: 3,
            overflow_policy: OverflowPolicy::default(),
            heuristic: HeightHeuristic::default(),
            preserve_existing_breaks: false,
            paginate: true,
            output_formats: vec![OutputFormat::Pptx, OutputFormat::Pdf],
            output_dir: PathBuf::from("output_slides"),
            marp_path: None,
            browser_path: None,
            theme_set: None,
            browser_args: Vec::new(),
            work_dir: None,
            renderer_timeout_secs: 120,
            concurrency: 2,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("theme", &self.theme)
            .field("style_class", &self.style_class)
            .field("heading_split_levels", &self.heading_split_levels)
            .field("height_budget", &self.height_budget)
            .field("max_repair_rounds", &self.max_repair_rounds)
            .field("overflow_policy", &self.overflow_policy)
            .field("heuristic", &self.heuristic)
            .field("preserve_existing_breaks", &self.preserve_existing_breaks)
            .field("output_formats", &self.output_formats)
            .field("output_dir", &self.output_dir)
            .field("marp_path", &self.marp_path)
            .field("browser_path", &self.browser_path)
            .field("theme_set", &self.theme_set)
            .field("renderer_timeout_secs", &self.renderer_timeout_secs)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn theme(mut self, theme: impl Into<String>) -> Self {
        self.config.theme = theme.into();
        self
    }

    pub fn style_class(mut self, class: impl Into<String>) -> Self {
        self.config.style_class = class.into();
        self
    }

    pub fn heading_split_levels(mut self, levels: u8) -> Self {
        self.config.heading_split_levels = levels;
        self
    }

    pub fn height_budget(mut self, budget: f64) -> Self {
        self.config.height_budget = budget;
        self
    }

    pub fn max_repair_rounds(mut self, rounds: u32) -> Self {
        self.config.max_repair_rounds = rounds;
        self
    }

    pub fn overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.config.overflow_policy = policy;
        self
    }

    pub fn heuristic(mut self, heuristic: HeightHeuristic) -> Self {
        self.config.heuristic = heuristic;
        self
    }

    pub fn preserve_existing_breaks(mut self, v: bool) -> Self {
        self.config.preserve_existing_breaks = v;
        self
    }

    pub fn paginate(mut self, v: bool) -> Self {
        self.config.paginate = v;
        self
    }

    pub fn output_formats(mut self, formats: Vec<OutputFormat>) -> Self {
        self.config.output_formats = formats;
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn marp_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.marp_path = Some(path.into());
        self
    }

    pub fn browser_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.browser_path = Some(path.into());
        self
    }

    pub fn theme_set(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.theme_set = Some(dir.into());
        self
    }

    pub fn browser_args(mut self, args: Vec<String>) -> Self {
        self.config.browser_args = args;
        self
    }

    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.work_dir = Some(dir.into());
        self
    }

    pub fn renderer_timeout_secs(mut self, secs: u64) -> Self {
        self.config.renderer_timeout_secs = secs;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, AutosplitError> {
        let c = &self.config;
        if !(1..=6).contains(&c.heading_split_levels) {
            return Err(AutosplitError::InvalidConfig(format!(
                "heading split level must be 1–6, got {}",
                c.heading_split_levels
            )));
        }
        if !c.height_budget.is_finite() || c.height_budget <= 0.0 {
            return Err(AutosplitError::InvalidConfig(format!(
                "height budget must be a positive number, got {}",
                c.height_budget
            )));
        }
        if c.renderer_timeout_secs == 0 {
            return Err(AutosplitError::InvalidConfig(
                "renderer timeout must be ≥ 1 second".into(),
            ));
        }
        if c.theme.trim().is_empty() {
            return Err(AutosplitError::InvalidConfig("theme must not be empty".into()));
        }
        c.heuristic.validate()?;
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// What happens to a slide that overflows the budget but has no legal split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OverflowPolicy {
    /// Emit the slide as-is and record a warning. (default)
    #[default]
    Accept,
    /// Fail the conversion with [`AutosplitError::IrreducibleOverflow`].
    Reject,
}

/// Output produced after pagination. `Md` keeps only the paginated Markdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Pptx,
    Pdf,
    Html,
    Md,
}

impl OutputFormat {
    /// File extension Marp infers the output type from.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Pptx => "pptx",
            OutputFormat::Pdf => "pdf",
            OutputFormat::Html => "html",
            OutputFormat::Md => "md",
        }
    }

    /// Upper-case name for log lines.
    pub fn label(self) -> &'static str {
        match self {
            OutputFormat::Pptx => "PPTX",
            OutputFormat::Pdf => "PDF",
            OutputFormat::Html => "HTML",
            OutputFormat::Md => "MD",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Cheap per-block height model used only to pick split points.
///
/// The model never replaces a measurement: the estimates of a candidate's
/// blocks are rescaled so they sum to the candidate's one true measured
/// height, and every candidate produced from them is measured again.
///
/// Each source line counts as `ceil(chars / chars_per_line)` wrapped lines,
/// multiplied by the weight of its block kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeightHeuristic {
    /// Characters that fit on one rendered line of body text. Default: 56.
    pub chars_per_line: usize,
    /// Weight of a heading line. Default: 1.6.
    pub heading_weight: f64,
    /// Weight of a code line. Code does not wrap, so one source line is one line. Default: 0.9.
    pub code_weight: f64,
    /// Weight of a table row. Default: 1.3.
    pub table_row_weight: f64,
    /// Lines occupied by one image. Default: 8.0.
    pub image_lines: f64,
    /// Weight of a blank line. Default: 0.5.
    pub blank_weight: f64,
    /// Weight of paragraph, list and other lines. Default: 1.0.
    pub body_weight: f64,
}

impl Default for HeightHeuristic {
    fn default() -> Self {
        Self {
            chars_per_line: 56,
            heading_weight: 1.6,
            code_weight: 0.9,
            table_row_weight: 1.3,
            image_lines: 8.0,
            blank_weight: 0.5,
            body_weight: 1.0,
        }
    }
}

impl HeightHeuristic {
    fn validate(&self) -> Result<(), AutosplitError> {
        if self.chars_per_line == 0 {
            return Err(AutosplitError::InvalidConfig(
                "heuristic chars_per_line must be ≥ 1".into(),
            ));
        }
        let weights = [
            self.heading_weight,
            self.code_weight,
            self.table_row_weight,
            self.image_lines,
            self.blank_weight,
            self.body_weight,
        ];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(AutosplitError::InvalidConfig(
                "heuristic weights must be finite and non-negative".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = ConversionConfig::default();
        assert_eq!(c.theme, "default");
        assert_eq!(c.heading_split_levels, 2);
        assert_eq!(c.height_budget, 620.0);
        assert_eq!(c.max_repair_rounds, 3);
        assert_eq!(c.output_formats, vec![OutputFormat::Pptx, OutputFormat::Pdf]);
        assert_eq!(c.renderer_timeout_secs, 120);
    }

    #[test]
    fn builder_rejects_bad_level() {
        let err = ConversionConfig::builder()
            .heading_split_levels(7)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("1–6"), "got: {err}");
        assert!(ConversionConfig::builder()
            .heading_split_levels(0)
            .build()
            .is_err());
    }

    #[test]
    fn builder_rejects_non_positive_budget() {
        assert!(ConversionConfig::builder().height_budget(0.0).build().is_err());
        assert!(ConversionConfig::builder()
            .height_budget(f64::NAN)
            .build()
            .is_err());
    }

    #[test]
    fn builder_rejects_zero_chars_per_line() {
        let heuristic = HeightHeuristic {
            chars_per_line: 0,
            ..Default::default()
        };
        assert!(ConversionConfig::builder().heuristic(heuristic).build().is_err());
    }

    #[test]
    fn concurrency_is_clamped() {
        let c = ConversionConfig::builder().concurrency(0).build().unwrap();
        assert_eq!(c.concurrency, 1);
    }

    #[test]
    fn output_format_extensions() {
        assert_eq!(OutputFormat::Pptx.extension(), "pptx");
        assert_eq!(OutputFormat::Html.to_string(), "HTML");
    }
}
