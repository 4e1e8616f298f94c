//! # edgequake-recompose
//!
//! Recompose a photo or the first page of a PDF into a new aspect ratio and
//! style using generative vision models.
//!
//! ## What it does
//!
//! Reframing a landscape photo for a portrait display (or a flyer for a TV
//! screen) usually means cropping away the subject or letterboxing it. Instead,
//! this crate asks a vision model which elements the image holds, lets the user
//! keep the ones that matter, and has an image model compose them into a fresh
//! frame of the requested ratio and style. A description alone is also enough
//! to create a new image from scratch.
//!
//! ## Workflow Overview
//!
//! ```text
//! file
//!  │
//!  ├─ 1. Upload      image read directly, PDF page 1 rasterised via pdfium
//!  ├─ 2. Analyzing   vision LLM lists elements (fallback set on failure)
//!  ├─ 3. Selecting   keep / discard each element
//!  ├─ 4. Configuring ratio, template, freeform instructions, inspirations
//!  ├─ 5. Generating  Gemini image model, source image as reference
//!  └─ 6. Result      export as PNG, JPEG, or a one-page PDF sized to the image
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_recompose::{AspectRatio, ExportFormat, RecomposeConfig, WorkflowController};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Analysis provider auto-detected from GEMINI_API_KEY / OPENAI_API_KEY / …
//!     let config = RecomposeConfig::default();
//!     let mut workflow = WorkflowController::from_config(config);
//!
//!     workflow.accept_source("flyer.pdf").await?;
//!     for el in workflow.session().elements() {
//!         println!("{} {} ({}) keep={}", el.id, el.label, el.category.as_str(), el.keep);
//!     }
//!     workflow.proceed_to_configuration()?;
//!     workflow.set_ratio(AspectRatio::Portrait9x16)?;
//!     workflow.set_template("neon_city")?;
//!     workflow.generate().await?;
//!
//!     let file = workflow.export(ExportFormat::Pdf).await?;
//!     std::fs::write(&file.file_name, &file.bytes)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `recompose` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! edgequake-recompose = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod catalog;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod session;
pub mod workflow;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use catalog::{Inspiration, Template};
pub use config::{RecomposeConfig, RecomposeConfigBuilder};
pub use error::RecomposeError;
pub use pipeline::input::{InputFile, InputKind};
pub use pipeline::{
    Collaborators, DocumentConverter, ElementAnalyzer, GeminiImageSynthesizer, ImageSynthesizer,
    Orientation, PackagedDocument, PdfDocumentConverter, VisionElementAnalyzer,
};
pub use progress::{NoopObserver, SharedObserver, WorkflowObserver};
pub use prompts::Instructions;
pub use session::{
    AnalyzedElement, AspectRatio, Composition, DetectedElement, ElementCategory, GeneratedImage,
    ImagePayload, InstructionSource, Mode, Session, Stage, Step,
};
pub use workflow::{ExportFormat, ExportedFile, WorkflowController};
