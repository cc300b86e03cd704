//! CLI binary for marp-autosplit.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use marp_autosplit::{
    convert_many, ConversionConfig, ConversionOutput, ConversionProgressCallback, OutputFormat,
    OverflowPolicy, ProgressCallback,
};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a spinner that follows the measurement rounds
/// and prints one log line per round.
struct CliProgressCallback {
    bar: ProgressBar,
    started: Instant,
    probe_errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading document…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            started: Instant::now(),
            probe_errors: AtomicUsize::new(0),
        })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
        let errors = self.probe_errors.load(Ordering::SeqCst);
        if errors > 0 {
            eprintln!(
                "{} {} measurement rounds failed; affected slides were kept unsplit",
                yellow("⚠"),
                errors
            );
        }
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, candidates: usize) {
        self.bar.set_prefix("Measuring");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("{candidates} sections found at heading breaks"))
        ));
    }

    fn on_round_start(&self, round: u32, batch: usize) {
        let what = if round == 0 { "initial layout" } else { "repair" };
        self.bar
            .set_message(format!("round {round} ({what}): rendering {batch} slides"));
    }

    fn on_round_complete(&self, round: u32, final_slides: usize, overflowing: usize) {
        let mark = if overflowing == 0 { green("✓") } else { yellow("↻") };
        self.bar.println(format!(
            "  {} Round {:<2} {:>4} fit  {:>4} split  {}",
            mark,
            round,
            final_slides,
            overflowing,
            dim(&format!("{:.1}s", self.started.elapsed().as_secs_f64())),
        ));
    }

    fn on_probe_error(&self, round: u32, error: &str) {
        self.probe_errors.fetch_add(1, Ordering::SeqCst);
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar
            .println(format!("  {} Round {:<2} {}", red("✗"), round, red(&msg)));
    }

    fn on_conversion_complete(&self, slides: usize, irreducible: usize) {
        let line = if irreducible == 0 {
            format!("{} {} slides, all within budget", green("✔"), bold(&slides.to_string()))
        } else {
            format!(
                "{} {} slides, {} over budget",
                yellow("⚠"),
                bold(&slides.to_string()),
                yellow(&irreducible.to_string())
            )
        };
        self.bar.println(line);
        self.bar.set_prefix("Exporting");
        self.bar.set_message("writing deck…");
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Paginate and export PPTX + PDF into ./output_slides
  marp-autosplit talk.md

  # Split at every heading down to ###, Gaia theme, centred lead class
  marp-autosplit -l 3 -t gaia -c lead talk.md

  # Only the paginated Markdown and an HTML deck
  marp-autosplit -f md,html talk.md

  # Fail instead of emitting a slide that cannot be made to fit
  marp-autosplit --overflow reject talk.md

  # Re-run on an already paginated deck, keeping its breaks
  marp-autosplit --keep-breaks output_slides/talk_slide.md -o again

  # Several files, JSON report
  marp-autosplit --json chapter1.md chapter2.md > report.json

HOW IT WORKS:
  1. Each heading at or above --level starts a new slide.
  2. All slides are rendered once with Marp in a headless browser and their
     real heights are read back.
  3. Slides taller than --height-budget are cut at the best paragraph or list
     boundary (never inside code, tables, images or math) and only those are
     rendered again, for at most --max-repair-rounds rounds.

ENVIRONMENT VARIABLES:
  MARP_BIN                Path to the Marp CLI executable
  CHROME_PATH             Path to Chrome / Edge
  MARP_AUTOSPLIT_*        Default for the matching flag (e.g. MARP_AUTOSPLIT_THEME)
  RUST_LOG                Override log filtering (e.g. marp_autosplit=debug)

SETUP:
  1. Install Marp:    npm install -g @marp-team/marp-cli
  2. Install Chrome or Edge (or point CHROME_PATH at Chromium)
  3. Convert:         marp-autosplit talk.md

  A `bin/<platform>/marp` and a `themes/` directory next to this executable
  are picked up automatically.
"#;

/// Split Markdown into Marp slides that never overflow.
#[derive(Parser, Debug)]
#[command(
    name = "marp-autosplit",
    version,
    about = "Split Markdown into Marp slides that never overflow",
    long_about = "Convert a Markdown document into a Marp slide deck. Slides break at headings, \
then every slide is rendered in a headless browser and any slide taller than the height budget \
is split at the best block boundary until the whole deck fits. Exports PPTX, PDF and HTML via Marp.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Markdown files to convert.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Marp theme (default, gaia, uncover, or a theme from --theme-set).
    #[arg(short, long, env = "MARP_AUTOSPLIT_THEME", default_value = "default")]
    theme: String,

    /// CSS class written into the deck header (e.g. lead, invert).
    #[arg(short = 'c', long = "class", env = "MARP_AUTOSPLIT_CLASS", default_value = "")]
    style_class: String,

    /// Deepest heading level that starts a new slide (1–6).
    #[arg(short, long, env = "MARP_AUTOSPLIT_LEVEL", default_value_t = 2,
          value_parser = clap::value_parser!(u8).range(1..=6))]
    level: u8,

    /// Output formats: pptx, pdf, html, md.
    #[arg(short, long = "format", env = "MARP_AUTOSPLIT_FORMATS", value_enum,
          num_args = 1.., value_delimiter = ',', default_values = ["pptx", "pdf"])]
    formats: Vec<FormatArg>,

    /// Usable slide height in rendered pixels.
    #[arg(long, env = "MARP_AUTOSPLIT_HEIGHT_BUDGET", default_value_t = 620.0)]
    height_budget: f64,

    /// Maximum repair rounds after the first measurement.
    #[arg(long, env = "MARP_AUTOSPLIT_MAX_REPAIR_ROUNDS", default_value_t = 3)]
    max_repair_rounds: u32,

    /// What to do with a slide that cannot be split below the budget.
    #[arg(long, env = "MARP_AUTOSPLIT_OVERFLOW", value_enum, default_value = "accept")]
    overflow: OverflowArg,

    /// Keep `---` markers already in the input instead of stripping them.
    #[arg(long, env = "MARP_AUTOSPLIT_KEEP_BREAKS")]
    keep_breaks: bool,

    /// Directory for `<name>_slide.md` and exports.
    #[arg(short, long, env = "MARP_AUTOSPLIT_OUTPUT_DIR", default_value = "output_slides")]
    output_dir: PathBuf,

    /// Marp CLI executable (default: $MARP_BIN, bundled copy, then PATH).
    #[arg(long, env = "MARP_AUTOSPLIT_MARP")]
    marp: Option<PathBuf>,

    /// Chrome/Edge executable (default: $CHROME_PATH, then standard locations).
    #[arg(long, env = "MARP_AUTOSPLIT_BROWSER")]
    browser: Option<PathBuf>,

    /// Directory of custom Marp theme CSS files.
    #[arg(long, env = "MARP_AUTOSPLIT_THEME_SET")]
    theme_set: Option<PathBuf>,

    /// Extra flag for the headless browser (repeatable), e.g. --browser-arg=--no-sandbox.
    #[arg(long = "browser-arg", env = "MARP_AUTOSPLIT_BROWSER_ARGS",
          value_delimiter = ',', allow_hyphen_values = true)]
    browser_args: Vec<String>,

    /// Timeout for each renderer invocation, in seconds.
    #[arg(long, env = "MARP_AUTOSPLIT_TIMEOUT", default_value_t = 120)]
    timeout: u64,

    /// Number of files converted at once.
    #[arg(long, env = "MARP_AUTOSPLIT_CONCURRENCY", default_value_t = 2)]
    concurrency: usize,

    /// Print a JSON report (ConversionOutput per file) to stdout.
    #[arg(long, env = "MARP_AUTOSPLIT_JSON")]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "MARP_AUTOSPLIT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "MARP_AUTOSPLIT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "MARP_AUTOSPLIT_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Pptx,
    Pdf,
    Html,
    Md,
}

impl From<FormatArg> for OutputFormat {
    fn from(v: FormatArg) -> Self {
        match v {
            FormatArg::Pptx => OutputFormat::Pptx,
            FormatArg::Pdf => OutputFormat::Pdf,
            FormatArg::Html => OutputFormat::Html,
            FormatArg::Md => OutputFormat::Md,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum OverflowArg {
    Accept,
    Reject,
}

impl From<OverflowArg> for OverflowPolicy {
    fn from(v: OverflowArg) -> Self {
        match v {
            OverflowArg::Accept => OverflowPolicy::Accept,
            OverflowArg::Reject => OverflowPolicy::Reject,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner replaces INFO logs; -v brings them back alongside it.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let progress = show_progress.then(CliProgressCallback::new);
    let config = build_config(
        &cli,
        progress
            .clone()
            .map(|cb| cb as Arc<dyn ConversionProgressCallback>),
    )?;

    // ── Run conversion ───────────────────────────────────────────────────
    let started = Instant::now();
    let results = convert_many(&cli.inputs, &config).await;
    if let Some(cb) = &progress {
        cb.finish();
    }

    let mut failed = 0usize;
    let mut report = Vec::with_capacity(results.len());
    for (input, result) in results {
        match result {
            Ok(output) => {
                if !cli.quiet && !cli.json {
                    print_summary(&input, &output);
                }
                report.push(serde_json::json!({ "input": input, "output": output }));
            }
            Err(e) => {
                failed += 1;
                eprintln!("{} {}: {}", red("✘"), bold(&input.display().to_string()), e);
                report.push(serde_json::json!({ "input": input, "error": e.to_string() }));
            }
        }
    }

    if cli.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialise report")?;
        println!("{json}");
    }

    if !cli.quiet && !cli.json && cli.inputs.len() > 1 {
        eprintln!(
            "{} {}/{} files converted in {:.1}s",
            if failed == 0 { green("✔") } else { yellow("⚠") },
            cli.inputs.len() - failed,
            cli.inputs.len(),
            started.elapsed().as_secs_f64()
        );
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} conversions failed", cli.inputs.len());
    }
    Ok(())
}

/// Per-file summary on stderr.
fn print_summary(input: &std::path::Path, output: &ConversionOutput) {
    let stats = &output.pagination.stats;
    eprintln!(
        "{}  {}  {} slides  {} renderer calls  {}ms",
        if stats.irreducible_slides + stats.unmeasured_slides == 0 {
            green("✔")
        } else {
            yellow("⚠")
        },
        bold(&input.display().to_string()),
        stats.final_slides,
        stats.probe_invocations,
        stats.duration_ms,
    );
    for warning in &output.pagination.warnings {
        eprintln!("   {} {}", yellow("⚠"), warning);
    }
    eprintln!("   {} {}", dim("→"), output.markdown_path.display());
    for export in &output.exports {
        match &export.error {
            None => eprintln!("   {} {}", dim("→"), export.path.display()),
            Some(e) => eprintln!("   {} {}", red("✗"), e),
        }
    }
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .theme(&cli.theme)
        .style_class(&cli.style_class)
        .heading_split_levels(cli.level)
        .height_budget(cli.height_budget)
        .max_repair_rounds(cli.max_repair_rounds)
        .overflow_policy(cli.overflow.into())
        .preserve_existing_breaks(cli.keep_breaks)
        .output_formats(cli.formats.iter().map(|&f| f.into()).collect())
        .output_dir(&cli.output_dir)
        .browser_args(cli.browser_args.clone())
        .renderer_timeout_secs(cli.timeout)
        .concurrency(cli.concurrency);

    if let Some(ref p) = cli.marp {
        builder = builder.marp_path(p);
    }
    if let Some(ref p) = cli.browser {
        builder = builder.browser_path(p);
    }
    if let Some(ref p) = cli.theme_set {
        builder = builder.theme_set(p);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
