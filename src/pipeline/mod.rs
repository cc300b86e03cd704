//! Pipeline stages for Markdown-to-slides conversion.
//!
//! Each submodule implements exactly one step. The layout engine proper
//! (`segment`, `probe`, `pack`, `assemble`) never touches the file system
//! except through a [`probe::RenderProbe`], so it can be driven by a fake
//! prober in tests.
//!
//! ## Data Flow
//!
//! ```text
//! clean ──▶ segment ──▶ pack ◀──▶ probe ──▶ assemble ──▶ export
//!           (blocks)    (rounds)  (marp+browser)  (---)   (pptx/pdf)
//! ```
//!
//! 1. [`clean`]: normalise the document (frontmatter, manual markers,
//!    heading spacing, blank lines)
//! 2. [`segment`]: split the text into blocks; mark hard break points
//! 3. [`pack`]: build candidates at hard breaks, then measure and repair
//!    overflowing ones in batched rounds
//! 4. [`probe`]: measure a batch of slides with one renderer invocation
//! 5. [`assemble`]: emit the text with `---` markers between slides
//! 6. [`export`]: render the deck to PPTX/PDF/HTML with Marp
//!
//! [`locate`] finds the renderer binaries; [`process`] runs them with a bound.

pub mod assemble;
pub mod clean;
pub mod export;
pub mod locate;
pub mod pack;
pub mod probe;
pub mod process;
pub mod segment;
