//! Integration tests for the pagination engine.
//!
//! The renderer is replaced by deterministic fake probes, so these tests run
//! anywhere without Marp or a browser. See `tests/marp_probe.rs` for tests
//! against the real (or a scripted) renderer.

use async_trait::async_trait;
use marp_autosplit::pipeline::probe::probe_deck;
use marp_autosplit::{
    paginate, AutosplitError, ConversionConfig, ConversionProgressCallback, OverflowPolicy,
    ProbeError, RenderProbe, SlideStatus, WarningKind,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ── Fake probes ──────────────────────────────────────────────────────────────

/// Measures each slide with a plain function and records every batch.
struct ScriptedProbe<F> {
    height: F,
    batches: Mutex<Vec<Vec<String>>>,
}

impl<F> ScriptedProbe<F>
where
    F: Fn(&str) -> f64 + Send + Sync,
{
    fn new(height: F) -> Self {
        Self {
            height,
            batches: Mutex::new(Vec::new()),
        }
    }

    fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl<F> RenderProbe for ScriptedProbe<F>
where
    F: Fn(&str) -> f64 + Send + Sync,
{
    async fn measure(&self, slides: &[String], _theme: &str) -> Result<Vec<f64>, ProbeError> {
        self.batches.lock().unwrap().push(slides.to_vec());
        Ok(slides.iter().map(|s| (self.height)(s)).collect())
    }
}

/// Splits the measurement deck the way Marp does, at every top-level
/// thematic break, and measures each resulting slide with [`line_heights`].
/// Returns as many heights as Marp would render sections.
struct MarpLikeProbe;

fn is_rule(line: &str) -> bool {
    let marks: Vec<char> = line.chars().filter(|c| !c.is_whitespace()).collect();
    marks.len() >= 3
        && ['-', '*', '_']
            .iter()
            .any(|m| marks.iter().all(|c| c == m))
}

fn marp_sections(deck: &str) -> Vec<String> {
    // Drop the front matter header.
    let body = deck.splitn(3, "---\n").nth(2).unwrap_or("");
    let mut sections = vec![String::new()];
    let mut in_fence = false;
    for line in body.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
        }
        if !in_fence && is_rule(line) {
            sections.push(String::new());
        } else if let Some(current) = sections.last_mut() {
            current.push_str(line);
            current.push('\n');
        }
    }
    sections
}

#[async_trait]
impl RenderProbe for MarpLikeProbe {
    async fn measure(&self, slides: &[String], theme: &str) -> Result<Vec<f64>, ProbeError> {
        let deck = probe_deck(slides, theme, "");
        Ok(marp_sections(&deck).iter().map(|s| line_heights(s)).collect())
    }
}

/// Always fails with the given error.
struct FailingProbe(ProbeError);

#[async_trait]
impl RenderProbe for FailingProbe {
    async fn measure(&self, _slides: &[String], _theme: &str) -> Result<Vec<f64>, ProbeError> {
        Err(self.0.clone())
    }
}

/// 60 per heading line, 40 per other non-blank line, blank lines free.
fn line_heights(slide: &str) -> f64 {
    slide
        .lines()
        .map(|l| {
            if l.trim().is_empty() {
                0.0
            } else if l.starts_with('#') {
                60.0
            } else {
                40.0
            }
        })
        .sum()
}

/// Number of blank-line separated chunks.
fn paragraphs(slide: &str) -> usize {
    slide
        .split("\n\n")
        .filter(|chunk| !chunk.trim().is_empty())
        .count()
}

fn config(budget: f64, level: u8) -> ConversionConfig {
    ConversionConfig::builder()
        .height_budget(budget)
        .heading_split_levels(level)
        .build()
        .unwrap()
}

fn fences_balanced(slide: &str) -> bool {
    slide
        .lines()
        .filter(|l| l.trim_start().starts_with("```"))
        .count()
        % 2
        == 0
}

const RICH_DOC: &str = "# Quarterly Review

Opening remarks that set the scene for the rest of the talk.

## Results

Revenue grew in every region.
Costs stayed flat.
Margins improved for the third quarter running.

- North: up 12%
- South: up 8%
- East: up 5%
- West: up 3%
- Online: up 21%

| Region | Growth |
|--------|--------|
| North  | 12%    |
| South  | 8%     |

## Implementation

```python
def growth(a, b):
    return (b - a) / a
```

![chart](chart.png)

Closing paragraph with a short summary.
";

// ── Worked examples ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_two_sections_fit_without_repair() {
    let doc = "# Intro\n\nHello.\n\n# Details\n\nMore text.\n";
    let probe = ScriptedProbe::new(line_heights);
    let out = paginate(doc, &probe, &config(620.0, 1)).await.unwrap();

    assert_eq!(
        out.markdown,
        "# Intro\n\nHello.\n\n---\n\n# Details\n\nMore text.\n"
    );
    assert_eq!(out.slides.len(), 2);
    assert!(out.slides.iter().all(|s| s.status == SlideStatus::Fit));
    assert_eq!(out.stats.repair_rounds, 0);
    assert_eq!(out.stats.probe_invocations, 1);
    assert_eq!(probe.batches()[0].len(), 2);
}

#[tokio::test]
async fn test_double_height_slide_splits_at_paragraph() {
    let doc = "First paragraph.\n\nSecond paragraph.\n\nThird paragraph.\n";
    let probe = ScriptedProbe::new(|s: &str| match paragraphs(s) {
        1 => 300.0,
        2 => 600.0,
        3 => 1240.0,
        n => n as f64 * 400.0,
    });
    let out = paginate(doc, &probe, &config(620.0, 2)).await.unwrap();

    assert_eq!(
        out.markdown,
        "First paragraph.\n\n---\n\nSecond paragraph.\n\nThird paragraph.\n"
    );
    assert_eq!(out.slides.len(), 2);
    assert_eq!(out.slides[0].height, Some(300.0));
    assert_eq!(out.slides[1].height, Some(600.0));
    assert!(out.slides.iter().all(|s| s.status == SlideStatus::Fit));
    assert_eq!(out.stats.repair_rounds, 1);

    // Only the two halves were sent in the repair round.
    let batches = probe.batches();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[1].len(), 2);
}

// ── Properties ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_content_is_preserved() {
    let probe = ScriptedProbe::new(line_heights);
    let out = paginate(RICH_DOC, &probe, &config(300.0, 2)).await.unwrap();

    assert!(out.slides.len() > 3, "expected repairs, got {:?}", out.slides);
    let joined: String = out.slides.iter().map(|s| s.markdown.as_str()).collect();
    assert_eq!(joined, RICH_DOC);

    let markers = out.markdown.lines().filter(|l| *l == "---").count();
    assert_eq!(markers, out.slides.len() - 1);
}

#[tokio::test]
async fn test_fitting_slides_respect_budget() {
    let probe = ScriptedProbe::new(line_heights);
    let out = paginate(RICH_DOC, &probe, &config(300.0, 2)).await.unwrap();
    for slide in &out.slides {
        assert_eq!(slide.status, SlideStatus::Fit, "slide {}", slide.index);
        assert!(slide.height.unwrap() <= 300.0, "slide {}", slide.index);
    }
}

#[tokio::test]
async fn test_atomic_blocks_are_never_split() {
    let code: String = (0..20).map(|i| format!("let x{i} = {i};\n")).collect();
    let doc = format!("## Code\n\nintro\n\n```rust\n{code}```\n\nafter\n");
    let probe = ScriptedProbe::new(line_heights);
    let out = paginate(&doc, &probe, &config(400.0, 2)).await.unwrap();

    for slide in &out.slides {
        assert!(fences_balanced(&slide.markdown), "split fence in {:?}", slide.markdown);
    }
    let code_slide = out
        .slides
        .iter()
        .find(|s| s.markdown.contains("```rust"))
        .unwrap();
    assert_eq!(code_slide.status, SlideStatus::Irreducible);
    assert!(out.warnings.iter().any(|w| w.slide == Some(code_slide.index)
        && matches!(w.kind, WarningKind::IrreducibleOverflow { .. })));
    assert_eq!(out.slides.last().unwrap().markdown, "after\n");
}

#[tokio::test]
async fn test_hard_headings_start_slides_and_no_slide_ends_with_heading() {
    let doc = "# A\n\na\n\n## B\n\nb\n\n### C\n\nc\n";
    let probe = ScriptedProbe::new(line_heights);
    let out = paginate(doc, &probe, &config(620.0, 2)).await.unwrap();

    let texts: Vec<&str> = out.slides.iter().map(|s| s.markdown.as_str()).collect();
    assert_eq!(texts, vec!["# A\n\na\n\n", "## B\n\nb\n\n### C\n\nc\n"]);

    let tight = paginate(doc, &probe, &config(150.0, 2)).await.unwrap();
    for slide in &tight.slides {
        let last = slide.markdown.lines().rev().find(|l| !l.trim().is_empty());
        assert!(
            !last.unwrap_or("").starts_with('#'),
            "slide {} ends with a heading: {:?}",
            slide.index,
            slide.markdown
        );
    }
}

#[tokio::test]
async fn test_long_list_splits_between_items() {
    let items: String = (1..=20).map(|i| format!("- item {i}\n")).collect();
    let doc = format!("## List\n\n{items}");
    let probe = ScriptedProbe::new(line_heights);
    let out = paginate(&doc, &probe, &config(620.0, 2)).await.unwrap();

    assert!(out.slides.len() >= 2);
    assert!(out.slides.iter().all(|s| s.status == SlideStatus::Fit));
    assert!(out.slides[0].markdown.starts_with("## List\n\n- item 1\n"));
    for slide in &out.slides[1..] {
        assert!(slide.markdown.starts_with("- item "), "{:?}", slide.markdown);
    }
}

#[tokio::test]
async fn test_rerun_with_preserved_breaks_is_identical() {
    let probe = ScriptedProbe::new(line_heights);
    let first = paginate(RICH_DOC, &probe, &config(300.0, 2)).await.unwrap();

    let keep = ConversionConfig::builder()
        .height_budget(300.0)
        .preserve_existing_breaks(true)
        .build()
        .unwrap();
    let second = paginate(&first.markdown, &probe, &keep).await.unwrap();

    assert_eq!(second.markdown, first.markdown);
    assert_eq!(second.stats.repair_rounds, 0);
}

// ── Termination ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_long_slide_is_partitioned_in_one_round() {
    let doc = (1..=30)
        .map(|i| format!("Paragraph {i}."))
        .collect::<Vec<_>>()
        .join("\n\n")
        + "\n";
    let probe = ScriptedProbe::new(|s: &str| {
        s.lines().filter(|l| !l.trim().is_empty()).count() as f64 * 100.0
    });
    let out = paginate(&doc, &probe, &ConversionConfig::default())
        .await
        .unwrap();

    assert_eq!(out.slides.len(), 5);
    for slide in &out.slides {
        assert_eq!(slide.status, SlideStatus::Fit, "slide {}", slide.index);
        assert_eq!(slide.height, Some(600.0), "slide {}", slide.index);
    }
    assert!(out.warnings.is_empty());
    assert_eq!(out.stats.repair_rounds, 1);
    assert_eq!(out.stats.probe_invocations, 2);
}

#[tokio::test]
async fn test_many_paragraphs_need_one_repair_round() {
    let doc: String = (0..500).map(|i| format!("Paragraph {i}.\n\n")).collect();
    let probe = ScriptedProbe::new(|s: &str| paragraphs(s) as f64 * 619.0);
    let out = paginate(&doc, &probe, &ConversionConfig::default())
        .await
        .unwrap();

    assert_eq!(out.slides.len(), 500);
    assert!(out.slides.iter().all(|s| s.status == SlideStatus::Fit));
    assert_eq!(out.stats.probe_invocations, 2);
    assert_eq!(out.stats.repair_rounds, 1);
    let joined: String = out.slides.iter().map(|s| s.markdown.as_str()).collect();
    assert_eq!(joined, doc);
}

#[tokio::test]
async fn test_round_cap_bounds_renderer_calls() {
    let doc = "First paragraph.\n\nSecond paragraph.\n\nThird paragraph.\n";
    // Any two paragraphs together overflow, so the tail never fits.
    let probe = ScriptedProbe::new(|s: &str| if paragraphs(s) >= 2 { 1000.0 } else { 300.0 });
    let cfg = ConversionConfig::builder()
        .max_repair_rounds(1)
        .build()
        .unwrap();
    let out = paginate(doc, &probe, &cfg).await.unwrap();

    assert_eq!(out.stats.probe_invocations, 2);
    assert_eq!(out.stats.repair_rounds, 1);
    assert_eq!(out.slides.len(), 2);
    assert_eq!(out.slides[0].status, SlideStatus::Fit);
    let last = out.slides.last().unwrap();
    assert_eq!(last.status, SlideStatus::RoundsExhausted);
    assert_eq!(last.height, Some(1000.0));
    assert!(out.warnings.iter().any(|w| w.slide == Some(last.index)
        && matches!(w.kind, WarningKind::RepairRoundExceeded { rounds: 1, .. })));
    assert_eq!(out.stats.irreducible_slides, 1);

    let no_repair = ConversionConfig::builder()
        .max_repair_rounds(0)
        .build()
        .unwrap();
    let out = paginate(doc, &probe, &no_repair).await.unwrap();
    assert_eq!(out.stats.probe_invocations, 1);
    assert_eq!(out.slides.len(), 1);
    assert_eq!(out.slides[0].status, SlideStatus::RoundsExhausted);
}

#[tokio::test]
async fn test_huge_unterminated_fence_is_one_irreducible_slide() {
    let body: String = (0..10_000).map(|i| format!("line {i}\n")).collect();
    let doc = format!("```\n{body}");
    let probe = ScriptedProbe::new(line_heights);
    let out = paginate(&doc, &probe, &config(620.0, 2)).await.unwrap();

    assert_eq!(out.slides.len(), 1);
    assert_eq!(out.slides[0].status, SlideStatus::Irreducible);
    assert_eq!(out.stats.probe_invocations, 1);
    assert_eq!(out.markdown, doc);
    assert!(out
        .warnings
        .iter()
        .any(|w| matches!(w.kind, WarningKind::Parse(_)) && w.slide == Some(1)));
}

#[tokio::test]
async fn test_huge_terminated_fence_is_isolated() {
    let body: String = (0..10_000).map(|i| format!("line {i}\n")).collect();
    let doc = format!("intro\n\n```\n{body}```\n\noutro\n");
    let probe = ScriptedProbe::new(line_heights);
    let out = paginate(&doc, &probe, &config(620.0, 2)).await.unwrap();

    let texts: Vec<&str> = out.slides.iter().map(|s| s.markdown.as_str()).collect();
    assert_eq!(texts.len(), 3);
    assert_eq!(texts[0], "intro\n\n");
    assert_eq!(texts[2], "outro\n");
    assert_eq!(out.slides[1].status, SlideStatus::Irreducible);
    assert!(out.stats.probe_invocations <= 4);
}

// ── Failure handling ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_renderer_timeout_keeps_heading_layout() {
    let doc = "# A\n\none\n\n# B\n\ntwo\n";
    let probe = FailingProbe(ProbeError::Timeout {
        program: "browser".into(),
        secs: 120,
    });
    let out = paginate(doc, &probe, &config(620.0, 1)).await.unwrap();

    assert_eq!(out.markdown, "# A\n\none\n\n---\n\n# B\n\ntwo\n");
    assert!(out.slides.iter().all(|s| s.status == SlideStatus::Unmeasured));
    assert!(out.slides.iter().all(|s| s.height.is_none()));
    assert_eq!(out.warnings.len(), 1);
    assert!(matches!(out.warnings[0].kind, WarningKind::ProbeFailed(_)));
    assert_eq!(out.warnings[0].slide, None);
    assert_eq!(out.stats.unmeasured_slides, 2);
    assert_eq!(out.stats.irreducible_slides, 0);
    assert_eq!(out.irreducible_slides().count(), 0);
}

#[tokio::test]
async fn test_missing_renderer_is_fatal() {
    let probe = FailingProbe(ProbeError::Unavailable {
        what: "Marp CLI".into(),
        hint: "install it".into(),
    });
    let err = paginate("# A\n\ntext\n", &probe, &config(620.0, 2))
        .await
        .unwrap_err();
    assert!(matches!(err, AutosplitError::RendererUnavailable { .. }), "got: {err:?}");
}

#[tokio::test]
async fn test_reject_policy_fails_on_irreducible_slide() {
    let doc = "## Wide\n\n| a |\n|---|\n| 1 |\n| 2 |\n| 3 |\n";
    let probe = ScriptedProbe::new(|_: &str| 900.0);
    let cfg = ConversionConfig::builder()
        .overflow_policy(OverflowPolicy::Reject)
        .build()
        .unwrap();
    let err = paginate(doc, &probe, &cfg).await.unwrap_err();
    match err {
        AutosplitError::IrreducibleOverflow { slide, height, budget } => {
            assert_eq!(slide, 1);
            assert_eq!(height, 900.0);
            assert_eq!(budget, 620.0);
        }
        other => panic!("expected IrreducibleOverflow, got {other:?}"),
    }
}

// ── Existing breaks ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_thematic_break_in_input_is_a_slide_boundary() {
    let doc = "# A\n\none\n\n***\n\ntwo\n\n# B\n\nthree\n";
    let out = paginate(doc, &MarpLikeProbe, &config(620.0, 1)).await.unwrap();

    assert_eq!(out.markdown, "# A\n\none\n\n***\n\ntwo\n\n---\n\n# B\n\nthree\n");
    assert_eq!(out.slides.len(), 3);
    assert!(out.slides.iter().all(|s| s.status == SlideStatus::Fit));
    assert_eq!(out.slides[1].height, Some(40.0));
    assert!(out.warnings.is_empty(), "{:?}", out.warnings);
}

#[tokio::test]
async fn test_every_rule_style_splits_like_marp() {
    for rule in ["---", "___", "- - -", "-----"] {
        let doc = format!("intro\n\n{rule}\n\n- a\n{rule}\n\nend\n");
        let out = paginate(&doc, &MarpLikeProbe, &config(620.0, 2)).await.unwrap();
        assert_eq!(out.markdown, doc, "rule {rule:?}");
        assert_eq!(out.slides.len(), 3, "rule {rule:?}");
        assert!(
            out.slides.iter().all(|s| s.status == SlideStatus::Fit),
            "rule {rule:?}: {:?}",
            out.warnings
        );
    }
}

// ── Batching ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_identical_slides_are_measured_once() {
    let doc = "## Same\n\ntext\n\n## Same\n\ntext\n\n";
    let probe = ScriptedProbe::new(line_heights);
    let out = paginate(doc, &probe, &config(620.0, 2)).await.unwrap();
    assert_eq!(out.slides.len(), 2);
    assert_eq!(probe.batches(), vec![vec!["## Same\n\ntext\n\n".to_string()]]);
    assert_eq!(out.stats.slides_measured, 1);
}

#[tokio::test]
async fn test_empty_document_needs_no_renderer() {
    let probe = FailingProbe(ProbeError::Unavailable {
        what: "Marp CLI".into(),
        hint: String::new(),
    });
    let out = paginate("", &probe, &config(620.0, 2)).await.unwrap();
    assert_eq!(out.markdown, "");
    assert!(out.slides.is_empty());
    assert_eq!(out.stats.probe_invocations, 0);
}

#[derive(Default)]
struct Counter {
    starts: AtomicUsize,
    rounds: AtomicUsize,
    completed: AtomicUsize,
}

impl ConversionProgressCallback for Counter {
    fn on_conversion_start(&self, _candidates: usize) {
        self.starts.fetch_add(1, Ordering::SeqCst);
    }

    fn on_round_complete(&self, _round: u32, _final_slides: usize, _overflowing: usize) {
        self.rounds.fetch_add(1, Ordering::SeqCst);
    }

    fn on_conversion_complete(&self, slides: usize, _irreducible: usize) {
        self.completed.store(slides, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_progress_callback_sees_every_round() {
    let counter = Arc::new(Counter::default());
    let cfg = ConversionConfig::builder()
        .progress_callback(counter.clone() as Arc<dyn ConversionProgressCallback>)
        .build()
        .unwrap();
    let doc = "First paragraph.\n\nSecond paragraph.\n\nThird paragraph.\n";
    let probe = ScriptedProbe::new(|s: &str| paragraphs(s) as f64 * 300.0);
    let out = paginate(doc, &probe, &cfg).await.unwrap();

    assert_eq!(counter.starts.load(Ordering::SeqCst), 1);
    assert_eq!(
        counter.rounds.load(Ordering::SeqCst),
        out.stats.probe_invocations as usize
    );
    assert_eq!(counter.completed.load(Ordering::SeqCst), out.slides.len());
}

#[test]
fn test_paginate_from_blocking_code() {
    let probe = ScriptedProbe::new(line_heights);
    let out = tokio_test::block_on(paginate("# One\n\ntext\n", &probe, &config(620.0, 2))).unwrap();
    assert_eq!(out.markdown, "# One\n\ntext\n");
}
