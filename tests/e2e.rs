//! End-to-end tests for edgequake-recompose.
//!
//! These tests load a real pdfium library and call live model APIs. They are
//! gated behind the `E2E_ENABLED` environment variable so they do not run in
//! CI unless explicitly requested.
//!
//! Run with:
//!   E2E_ENABLED=1 PDFIUM_LIB_PATH=. GEMINI_API_KEY=... cargo test --test e2e -- --nocapture
//!
//! To restrict to a specific test:
//!   E2E_ENABLED=1 cargo test --test e2e test_rasterise -- --nocapture

use edgequake_recompose::pipeline::{encode, package};
use edgequake_recompose::{
    AspectRatio, DocumentConverter, ElementAnalyzer, ExportFormat, ImagePayload, ImageSynthesizer,
    InputFile, Orientation, PdfDocumentConverter, RecomposeConfig, Step, VisionElementAnalyzer,
    GeminiImageSynthesizer, WorkflowController,
};
use image::{DynamicImage, Rgb, RgbImage};
use std::path::PathBuf;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn output_dir() -> PathBuf {
    let d = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("target/e2e-output");
    std::fs::create_dir_all(&d).ok();
    d
}

/// Skip this test unless E2E_ENABLED is set and every listed env var exists.
macro_rules! e2e_skip_unless_ready {
    ($($var:expr),*) => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        $(
            if std::env::var($var).map(|v| v.is_empty()).unwrap_or(true) {
                println!("SKIP — {} is not set", $var);
                return;
            }
        )*
    }};
}

fn has_gemini_key() -> bool {
    ["GEMINI_API_KEY", "GOOGLE_API_KEY"]
        .iter()
        .any(|k| std::env::var(k).map(|v| !v.is_empty()).unwrap_or(false))
}

/// A two-tone test card: red left half, blue right half.
fn test_card(w: u32, h: u32) -> ImagePayload {
    let img = RgbImage::from_fn(w, h, |x, _| {
        if x < w / 2 {
            Rgb([200, 30, 30])
        } else {
            Rgb([30, 30, 200])
        }
    });
    encode::encode_png(&DynamicImage::ImageRgb8(img)).unwrap()
}

/// A one-page PDF holding the test card, written with the crate's own packager.
fn test_pdf(w: u32, h: u32) -> Vec<u8> {
    package::package_image(&test_card(w, h), w, h, 90).unwrap().bytes
}

// ── Document conversion (pdfium) ─────────────────────────────────────────────

#[tokio::test]
async fn test_rasterise_first_page() {
    e2e_skip_unless_ready!();

    let converter = PdfDocumentConverter::new(RecomposeConfig::default());
    let image = converter
        .rasterize_first_page(&test_pdf(400, 300))
        .await
        .expect("rasterise should succeed");

    let (w, h) = encode::dimensions(&image).unwrap();
    // Default scale is 2.0: 400x300 points render to roughly 800x600 px.
    assert!((790..=810).contains(&w), "width {w}");
    assert!((590..=610).contains(&h), "height {h}");
    assert_eq!(image.mime_type, "image/png");
}

#[tokio::test]
async fn test_rasterise_respects_pixel_cap() {
    e2e_skip_unless_ready!();

    let config = RecomposeConfig::builder()
        .max_rendered_pixels(500)
        .build()
        .unwrap();
    let converter = PdfDocumentConverter::new(config);
    let image = converter
        .rasterize_first_page(&test_pdf(1000, 500))
        .await
        .unwrap();
    let (w, h) = encode::dimensions(&image).unwrap();
    assert!(w <= 500 && h <= 500, "got {w}x{h}");
}

#[tokio::test]
async fn test_rasterise_corrupt_pdf_is_conversion_error() {
    e2e_skip_unless_ready!();

    let converter = PdfDocumentConverter::new(RecomposeConfig::default());
    let err = converter
        .rasterize_first_page(b"%PDF-1.7\nthis is not a pdf")
        .await
        .unwrap_err();
    assert!(
        matches!(err, edgequake_recompose::RecomposeError::Conversion { .. }),
        "got {err:?}"
    );
}

#[tokio::test]
async fn test_accept_pdf_reaches_selecting_without_keys() {
    e2e_skip_unless_ready!();

    // Analysis may fail without credentials; the fallback still gets us to
    // Selecting, which is the behaviour under test.
    let mut workflow = WorkflowController::from_config(RecomposeConfig::default());
    let file = InputFile::from_bytes("card.pdf", test_pdf(320, 200));
    workflow.accept_file(file).await.expect("accept should succeed");
    assert_eq!(workflow.step(), Step::Selecting);
    assert!(!workflow.session().elements().is_empty());
}

// ── Live models ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_live_analysis() {
    e2e_skip_unless_ready!();
    if !has_gemini_key() && std::env::var("OPENAI_API_KEY").is_err() {
        println!("SKIP — no analysis provider key set");
        return;
    }

    let analyzer = VisionElementAnalyzer::new(RecomposeConfig::default());
    let elements = analyzer
        .analyze(&test_card(512, 512))
        .await
        .expect("analysis should succeed");
    println!("Elements: {elements:#?}");
    assert!(!elements.is_empty());
}

#[tokio::test]
async fn test_live_create_new() {
    e2e_skip_unless_ready!();
    if !has_gemini_key() {
        println!("SKIP — set GEMINI_API_KEY to run");
        return;
    }

    let synth = GeminiImageSynthesizer::new(RecomposeConfig::default());
    let image = synth
        .synthesize("A red bicycle leaning on a white wall", AspectRatio::Landscape16x9, None)
        .await
        .expect("synthesis should succeed");
    let (w, h) = encode::dimensions(&image).unwrap();
    println!("Generated {w}x{h} {}", image.mime_type);
    assert!(w > h, "16:9 output should be landscape, got {w}x{h}");
}

#[tokio::test]
async fn test_live_full_recompose_to_pdf() {
    e2e_skip_unless_ready!("GEMINI_API_KEY");

    let mut workflow = WorkflowController::from_config(RecomposeConfig::default());
    let file = InputFile::from_bytes("card.png", test_card(640, 360).bytes);
    workflow.accept_file(file).await.unwrap();
    workflow.proceed_to_configuration().unwrap();
    workflow.set_ratio(AspectRatio::Portrait9x16).unwrap();
    workflow.set_template("studio_clean").unwrap();
    workflow.generate().await.expect("generation should succeed");

    let exported = workflow.export(ExportFormat::Pdf).await.unwrap();
    assert_eq!(exported.orientation, Some(Orientation::Portrait));
    let path = output_dir().join(&exported.file_name);
    exported.write_to(&path).await.unwrap();
    println!("Wrote {}", path.display());
}
