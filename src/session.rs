//! Session data model: the complete working state of one pass through the
//! upload → analysis → selection → configuration → generation → result flow.
//!
//! Data that only exists in one step travels inside that step's [`Stage`]
//! variant. The generated image lives in `Stage::Result`, so a session can never
//! be in the result step without a result, and leaving the step drops it.

use crate::catalog::{self, Template};
use crate::error::RecomposeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ── Steps ────────────────────────────────────────────────────────────────

/// The screen the workflow is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Step {
    Upload,
    Analyzing,
    Selecting,
    Configuring,
    Generating,
    Result,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Upload => "Upload",
            Step::Analyzing => "Analyzing",
            Step::Selecting => "Selecting",
            Step::Configuring => "Configuring",
            Step::Generating => "Generating",
            Step::Result => "Result",
        };
        f.write_str(name)
    }
}

/// The current step plus any data owned exclusively by it.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Upload,
    Analyzing,
    Selecting,
    Configuring,
    Generating,
    Result(GeneratedImage),
}

impl Stage {
    pub fn step(&self) -> Step {
        match self {
            Stage::Upload => Step::Upload,
            Stage::Analyzing => Step::Analyzing,
            Stage::Selecting => Step::Selecting,
            Stage::Configuring => Step::Configuring,
            Stage::Generating => Step::Generating,
            Stage::Result(_) => Step::Result,
        }
    }
}

// ── Configuration values ─────────────────────────────────────────────────

/// Generation mode. Chosen on the way into the configuring step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Mode {
    /// Reuse the source image and the kept elements.
    #[default]
    Recompose,
    /// Generate purely from the freeform description.
    CreateNew,
}

/// Mode together with the inputs only that mode has.
///
/// Create-new carries no source image and no elements, so neither can leak
/// into a create-new generation.
#[derive(Debug, Clone, PartialEq)]
pub enum Composition {
    Recompose {
        source_image: Option<ImagePayload>,
        elements: Vec<DetectedElement>,
    },
    CreateNew,
}

impl Default for Composition {
    fn default() -> Self {
        Composition::Recompose {
            source_image: None,
            elements: Vec::new(),
        }
    }
}

impl Composition {
    /// Recompose mode holding an accepted source image, elements pending.
    pub fn with_source(image: ImagePayload) -> Self {
        Composition::Recompose {
            source_image: Some(image),
            elements: Vec::new(),
        }
    }

    pub fn mode(&self) -> Mode {
        match self {
            Composition::Recompose { .. } => Mode::Recompose,
            Composition::CreateNew => Mode::CreateNew,
        }
    }
}

/// The supported output aspect ratios (width:height).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "2:3")]
    Portrait2x3,
    #[serde(rename = "3:2")]
    Landscape3x2,
    #[serde(rename = "3:4")]
    Portrait3x4,
    #[serde(rename = "4:3")]
    Landscape4x3,
    #[serde(rename = "9:16")]
    Portrait9x16,
    #[default]
    #[serde(rename = "16:9")]
    Landscape16x9,
    #[serde(rename = "21:9")]
    Cinematic21x9,
}

impl AspectRatio {
    /// Every supported ratio, in display order.
    pub const ALL: [AspectRatio; 8] = [
        AspectRatio::Square,
        AspectRatio::Portrait2x3,
        AspectRatio::Landscape3x2,
        AspectRatio::Portrait3x4,
        AspectRatio::Landscape4x3,
        AspectRatio::Portrait9x16,
        AspectRatio::Landscape16x9,
        AspectRatio::Cinematic21x9,
    ];

    /// The `W:H` form sent to the image model.
    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Portrait2x3 => "2:3",
            AspectRatio::Landscape3x2 => "3:2",
            AspectRatio::Portrait3x4 => "3:4",
            AspectRatio::Landscape4x3 => "4:3",
            AspectRatio::Portrait9x16 => "9:16",
            AspectRatio::Landscape16x9 => "16:9",
            AspectRatio::Cinematic21x9 => "21:9",
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AspectRatio {
    type Err = RecomposeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace(['x', '/'], ":");
        AspectRatio::ALL
            .into_iter()
            .find(|r| r.as_str() == wanted)
            .ok_or_else(|| RecomposeError::InvalidRatio(s.to_string()))
    }
}

// ── Images ───────────────────────────────────────────────────────────────

/// Encoded image bytes with their media type.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    /// e.g. `image/png`
    pub mime_type: String,
}

impl ImagePayload {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

// Keep multi-megabyte buffers out of debug logs.
impl fmt::Debug for ImagePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImagePayload")
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

// ── Elements ─────────────────────────────────────────────────────────────

/// What kind of visual element the analyzer found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementCategory {
    Person,
    Text,
    Background,
    /// Also used for any category the model invents.
    #[serde(other)]
    Object,
}

impl ElementCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementCategory::Person => "person",
            ElementCategory::Text => "text",
            ElementCategory::Background => "background",
            ElementCategory::Object => "object",
        }
    }

    /// Whether newly detected elements of this category start out kept.
    pub fn kept_by_default(&self) -> bool {
        !matches!(self, ElementCategory::Background)
    }
}

/// One element as reported by the analyzer, before ids and keep flags exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzedElement {
    pub label: String,
    #[serde(rename = "type", alias = "category")]
    pub category: ElementCategory,
    #[serde(default)]
    pub description: String,
}

impl AnalyzedElement {
    pub fn new(label: impl Into<String>, category: ElementCategory) -> Self {
        Self {
            label: label.into(),
            category,
            description: String::new(),
        }
    }
}

/// An element in the session with its keep/discard flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedElement {
    /// `el-<index>` in arrival order.
    pub id: String,
    pub label: String,
    pub category: ElementCategory,
    pub description: String,
    pub keep: bool,
}

/// Assign ids and default keep flags to analyzer output.
pub fn ingest_elements(analyzed: Vec<AnalyzedElement>) -> Vec<DetectedElement> {
    analyzed
        .into_iter()
        .enumerate()
        .map(|(index, el)| DetectedElement {
            id: format!("el-{index}"),
            keep: el.category.kept_by_default(),
            label: el.label,
            category: el.category,
            description: el.description,
        })
        .collect()
}

/// Substitute element set used when analysis fails.
pub fn fallback_elements() -> Vec<AnalyzedElement> {
    vec![
        AnalyzedElement::new("Main Subject", ElementCategory::Person),
        AnalyzedElement::new("Background", ElementCategory::Background),
    ]
}

// ── Results ──────────────────────────────────────────────────────────────

/// Which branch of the prompt rule produced the instructions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InstructionSource {
    /// The user's freeform text was sent verbatim.
    Freeform,
    /// Instructions were composed from kept elements and a template.
    Template { template_id: String },
}

/// A successfully generated image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedImage {
    pub image: ImagePayload,
    pub ratio: AspectRatio,
    pub instructions_used: String,
    pub source: InstructionSource,
}

// ── Session ──────────────────────────────────────────────────────────────

/// The working state for one user pass through the tool.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub(crate) stage: Stage,
    pub(crate) composition: Composition,
    pub(crate) target_ratio: AspectRatio,
    pub(crate) template: Template,
    pub(crate) freeform_instructions: String,
    pub(crate) last_error: Option<String>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(catalog::default_template().clone(), AspectRatio::default())
    }
}

impl Session {
    /// A fresh session on the upload step.
    pub fn new(template: Template, target_ratio: AspectRatio) -> Self {
        Self {
            stage: Stage::Upload,
            composition: Composition::default(),
            target_ratio,
            template,
            freeform_instructions: String::new(),
            last_error: None,
        }
    }

    pub fn step(&self) -> Step {
        self.stage.step()
    }

    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    pub fn composition(&self) -> &Composition {
        &self.composition
    }

    /// Always `None` in create-new mode.
    pub fn source_image(&self) -> Option<&ImagePayload> {
        match &self.composition {
            Composition::Recompose { source_image, .. } => source_image.as_ref(),
            Composition::CreateNew => None,
        }
    }

    /// Always empty in create-new mode.
    pub fn elements(&self) -> &[DetectedElement] {
        match &self.composition {
            Composition::Recompose { elements, .. } => elements,
            Composition::CreateNew => &[],
        }
    }

    /// Labels of kept elements in arrival order.
    pub fn kept_labels(&self) -> Vec<&str> {
        self.elements()
            .iter()
            .filter(|el| el.keep)
            .map(|el| el.label.as_str())
            .collect()
    }

    pub fn mode(&self) -> Mode {
        self.composition.mode()
    }

    pub fn target_ratio(&self) -> AspectRatio {
        self.target_ratio
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn freeform_instructions(&self) -> &str {
        &self.freeform_instructions
    }

    pub fn result(&self) -> Option<&GeneratedImage> {
        match &self.stage {
            Stage::Result(generated) => Some(generated),
            _ => None,
        }
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_parse_accepts_all_supported() {
        for ratio in AspectRatio::ALL {
            assert_eq!(ratio.as_str().parse::<AspectRatio>().unwrap(), ratio);
        }
        assert_eq!("16x9".parse::<AspectRatio>().unwrap(), AspectRatio::Landscape16x9);
        assert!("5:4".parse::<AspectRatio>().is_err());
        assert!("".parse::<AspectRatio>().is_err());
    }

    #[test]
    fn ratio_serde_uses_colon_form() {
        let json = serde_json::to_string(&AspectRatio::Cinematic21x9).unwrap();
        assert_eq!(json, "\"21:9\"");
    }

    #[test]
    fn ingest_assigns_ids_and_default_keep() {
        let elements = ingest_elements(vec![
            AnalyzedElement::new("Chef", ElementCategory::Person),
            AnalyzedElement::new("Kitchen", ElementCategory::Background),
            AnalyzedElement::new("Pan", ElementCategory::Object),
        ]);
        let ids: Vec<&str> = elements.iter().map(|e| e.id.as_str()).collect();
        let keep: Vec<bool> = elements.iter().map(|e| e.keep).collect();
        assert_eq!(ids, ["el-0", "el-1", "el-2"]);
        assert_eq!(keep, [true, false, true]);
    }

    #[test]
    fn unknown_category_deserialises_as_object() {
        let el: AnalyzedElement =
            serde_json::from_str(r#"{"label":"Logo","type":"graphic","description":"x"}"#).unwrap();
        assert_eq!(el.category, ElementCategory::Object);
    }

    #[test]
    fn new_session_defaults() {
        let session = Session::default();
        assert_eq!(session.step(), Step::Upload);
        assert_eq!(session.mode(), Mode::Recompose);
        assert_eq!(session.target_ratio(), AspectRatio::Landscape16x9);
        assert_eq!(session.template().id, "pub_warm");
        assert!(session.result().is_none());
        assert!(session.source_image().is_none());
    }

    #[test]
    fn create_new_exposes_no_source_or_elements() {
        let mut session = Session::default();
        session.composition = Composition::with_source(ImagePayload::new(vec![1], "image/png"));
        assert_eq!(session.mode(), Mode::Recompose);
        assert!(session.source_image().is_some());

        session.composition = Composition::CreateNew;
        assert_eq!(session.mode(), Mode::CreateNew);
        assert!(session.source_image().is_none());
        assert!(session.elements().is_empty());
        assert!(session.kept_labels().is_empty());
    }

    #[test]
    fn payload_debug_hides_bytes() {
        let payload = ImagePayload::new(vec![0u8; 2048], "image/png");
        let dbg = format!("{payload:?}");
        assert!(dbg.contains("<2048 bytes>"));
    }
}
