//! Collaborators that do the heavy lifting for the workflow controller.
//!
//! The controller never talks to pdfium or a model API directly. It calls
//! three traits, each backed by one or two submodules:
//!
//! ```text
//!            ┌──────────────────────────┐
//! input ───▶ │ DocumentConverter        │ render (pdfium) / package (lopdf)
//!            ├──────────────────────────┤
//!            │ ElementAnalyzer          │ analyze (vision LLM) + postprocess
//!            ├──────────────────────────┤
//!            │ ImageSynthesizer         │ synthesize (Gemini REST)
//!            └──────────────────────────┘
//! ```
//!
//! 1. [`input`]       : path / URL / buffer → classified [`input::InputFile`]
//! 2. [`render`]      : rasterise page 1; runs in `spawn_blocking` because
//!    pdfium is not async-safe
//! 3. [`encode`]      : media-type sniffing, base64 `ImageData`, PNG/JPEG export
//! 4. [`analyze`]     : vision call listing the separable elements
//! 5. [`postprocess`] : cleanup of the model's JSON reply
//! 6. [`synthesize`]  : image generation request/response handling
//! 7. [`package`]     : one-page PDF sized to the image

pub mod analyze;
pub mod encode;
pub mod input;
pub mod package;
pub mod postprocess;
pub mod render;
pub mod synthesize;

use crate::config::RecomposeConfig;
use crate::error::RecomposeError;
use crate::session::{AnalyzedElement, AspectRatio, ImagePayload};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use analyze::VisionElementAnalyzer;
pub use synthesize::GeminiImageSynthesizer;

// ── Collaborator traits ──────────────────────────────────────────────────

/// Lists the separable visual elements of an image.
#[async_trait]
pub trait ElementAnalyzer: Send + Sync {
    async fn analyze(&self, image: &ImagePayload) -> Result<Vec<AnalyzedElement>, RecomposeError>;
}

/// Produces a new image from instructions, a target ratio, and an optional
/// reference image.
#[async_trait]
pub trait ImageSynthesizer: Send + Sync {
    async fn synthesize(
        &self,
        instructions: &str,
        ratio: AspectRatio,
        reference: Option<&ImagePayload>,
    ) -> Result<ImagePayload, RecomposeError>;
}

/// Converts between documents and images.
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    /// Render the first page of a PDF to an image.
    async fn rasterize_first_page(&self, document: &[u8]) -> Result<ImagePayload, RecomposeError>;

    /// Wrap an image in a single-page document whose page size equals the
    /// image's pixel dimensions.
    async fn package_as_document(
        &self,
        image: &ImagePayload,
        width: u32,
        height: u32,
    ) -> Result<PackagedDocument, RecomposeError>;
}

// ── Packaged documents ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Landscape,
    Portrait,
}

impl Orientation {
    /// Landscape only when strictly wider than tall. Squares are portrait.
    pub fn for_dimensions(width: u32, height: u32) -> Self {
        if width > height {
            Orientation::Landscape
        } else {
            Orientation::Portrait
        }
    }
}

/// A one-page PDF holding a single image.
#[derive(Clone, PartialEq, Eq)]
pub struct PackagedDocument {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub orientation: Orientation,
}

impl std::fmt::Debug for PackagedDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackagedDocument")
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .field("width", &self.width)
            .field("height", &self.height)
            .field("orientation", &self.orientation)
            .finish()
    }
}

// ── PDF converter ────────────────────────────────────────────────────────

/// [`DocumentConverter`] backed by pdfium for reading and lopdf for writing.
#[derive(Debug, Clone)]
pub struct PdfDocumentConverter {
    config: RecomposeConfig,
}

impl PdfDocumentConverter {
    pub fn new(config: RecomposeConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl DocumentConverter for PdfDocumentConverter {
    async fn rasterize_first_page(&self, document: &[u8]) -> Result<ImagePayload, RecomposeError> {
        let image = render::render_first_page(document.to_vec(), &self.config).await?;
        encode::encode_png(&image)
    }

    async fn package_as_document(
        &self,
        image: &ImagePayload,
        width: u32,
        height: u32,
    ) -> Result<PackagedDocument, RecomposeError> {
        let payload = image.clone();
        let quality = self.config.jpeg_quality;
        tokio::task::spawn_blocking(move || {
            package::package_image(&payload, width, height, quality)
        })
        .await
        .map_err(|e| RecomposeError::Internal(format!("Packaging task panicked: {e}")))?
    }
}

// ── Bundle ───────────────────────────────────────────────────────────────

/// The three collaborators a controller needs.
#[derive(Clone)]
pub struct Collaborators {
    pub analyzer: Arc<dyn ElementAnalyzer>,
    pub synthesizer: Arc<dyn ImageSynthesizer>,
    pub converter: Arc<dyn DocumentConverter>,
}

impl Collaborators {
    /// Production collaborators built from one config.
    pub fn from_config(config: &RecomposeConfig) -> Self {
        Self {
            analyzer: Arc::new(VisionElementAnalyzer::new(config.clone())),
            synthesizer: Arc::new(GeminiImageSynthesizer::new(config.clone())),
            converter: Arc::new(PdfDocumentConverter::new(config.clone())),
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orientation_rule() {
        assert_eq!(Orientation::for_dimensions(1920, 1080), Orientation::Landscape);
        assert_eq!(Orientation::for_dimensions(1080, 1920), Orientation::Portrait);
        assert_eq!(Orientation::for_dimensions(1024, 1024), Orientation::Portrait);
    }

    #[tokio::test]
    async fn converter_packages_png() {
        let img = image::DynamicImage::ImageRgb8(image::RgbImage::new(40, 20));
        let payload = encode::encode_png(&img).unwrap();
        let converter = PdfDocumentConverter::new(RecomposeConfig::default());
        let doc = converter.package_as_document(&payload, 40, 20).await.unwrap();
        assert_eq!(doc.orientation, Orientation::Landscape);
        assert!(doc.bytes.starts_with(b"%PDF"));
    }
}
