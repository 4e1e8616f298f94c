//! The workflow controller: one owned [`Session`] plus the transition table.
//!
//! ```text
//!            accept_file                 proceed
//!  Upload ─────────────▶ Analyzing ─────▶ Selecting ─────────▶ Configuring
//!    │  ▲  (read/convert      │ (analysis fails:       ▲  back    │  ▲
//!    │  │   failure)          │  fallback elements)    └──────────┘  │ adjust
//!    │  └─────────────────────┘                                      │
//!    │ start_new_creation                          generate ▼        │
//!    └──────────────────────────────▶ Configuring ───▶ Generating ─▶ Result
//!                                         ▲  (synthesis fails)  │
//!                                         └─────────────────────┘
//! ```
//!
//! Every operation checks the current step first and returns
//! [`RecomposeError::InvalidTransition`] without touching the session when it
//! is not allowed. `reset` is allowed everywhere.
//!
//! The async operations hold `&mut self` across the remote call, so no other
//! operation (`reset` included) runs until the call resolves.

use crate::catalog;
use crate::config::RecomposeConfig;
use crate::error::RecomposeError;
use crate::pipeline::input::{InputFile, InputKind};
use crate::pipeline::{encode, Collaborators, Orientation};
use crate::progress::{NoopObserver, SharedObserver};
use crate::prompts::{self, Instructions};
use crate::session::{
    fallback_elements, ingest_elements, AspectRatio, Composition, GeneratedImage, ImagePayload,
    Mode, Session, Stage, Step,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Base name of exported files.
pub const EXPORT_BASE_NAME: &str = "recompose-output";

// ── Export formats ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Png,
    Jpeg,
    Pdf,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Png => "png",
            ExportFormat::Jpeg => "jpeg",
            ExportFormat::Pdf => "pdf",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ExportFormat::Png => "image/png",
            ExportFormat::Jpeg => "image/jpeg",
            ExportFormat::Pdf => "application/pdf",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = RecomposeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(ExportFormat::Png),
            "jpeg" | "jpg" => Ok(ExportFormat::Jpeg),
            "pdf" => Ok(ExportFormat::Pdf),
            other => Err(RecomposeError::InvalidConfig(format!(
                "Unknown export format '{other}' (expected png, jpeg, or pdf)"
            ))),
        }
    }
}

/// Bytes ready to hand to the user.
#[derive(Clone, PartialEq, Eq)]
pub struct ExportedFile {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
    pub file_name: String,
    /// Set for document exports.
    pub orientation: Option<Orientation>,
}

impl ExportedFile {
    /// Write the bytes to `path`, creating parent directories.
    ///
    /// Uses atomic write (temp file + rename) to prevent partial files.
    pub async fn write_to(&self, path: impl AsRef<Path>) -> Result<(), RecomposeError> {
        let path = path.as_ref();
        let write_failed = |source: std::io::Error| RecomposeError::OutputWriteFailed {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
        }

        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        tokio::fs::write(&tmp_path, &self.bytes)
            .await
            .map_err(write_failed)?;
        tokio::fs::rename(&tmp_path, path)
            .await
            .map_err(write_failed)?;
        Ok(())
    }
}

impl fmt::Debug for ExportedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportedFile")
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .field("mime_type", &self.mime_type)
            .field("file_name", &self.file_name)
            .field("orientation", &self.orientation)
            .finish()
    }
}

// ── Controller ───────────────────────────────────────────────────────────

/// Drives one session through the recompose workflow.
pub struct WorkflowController {
    session: Session,
    collaborators: Collaborators,
    config: RecomposeConfig,
    observer: SharedObserver,
}

impl fmt::Debug for WorkflowController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowController")
            .field("session", &self.session)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl WorkflowController {
    /// A controller on a fresh session, using the given collaborators.
    pub fn new(collaborators: Collaborators, config: RecomposeConfig) -> Self {
        let observer = config
            .observer
            .clone()
            .unwrap_or_else(|| Arc::new(NoopObserver));
        let session = fresh_session(&config);
        Self {
            session,
            collaborators,
            config,
            observer,
        }
    }

    /// A controller wired to the production collaborators.
    pub fn from_config(config: RecomposeConfig) -> Self {
        let collaborators = Collaborators::from_config(&config);
        Self::new(collaborators, config)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn step(&self) -> Step {
        self.session.step()
    }

    // ── Upload ───────────────────────────────────────────────────────────

    /// Load a local path or an HTTP(S) URL, then continue as
    /// [`accept_file`](Self::accept_file).
    ///
    /// Read and download failures record `last_error` and leave the session
    /// on Upload.
    pub async fn accept_source(&mut self, source: &str) -> Result<(), RecomposeError> {
        self.require("accept a file", &[Step::Upload])?;
        let file = match InputFile::load(source, self.config.download_timeout_secs).await {
            Ok(file) => file,
            Err(e) => {
                self.fail(&e);
                return Err(e);
            }
        };
        self.accept_file(file).await
    }

    /// Take a file, rasterise it if it is a document, and analyse it.
    ///
    /// Read and conversion failures return the session to Upload with
    /// `last_error` set. Analysis failures do not: the fallback elements are
    /// substituted and the session still reaches Selecting.
    pub async fn accept_file(&mut self, file: InputFile) -> Result<(), RecomposeError> {
        self.require("accept a file", &[Step::Upload])?;
        self.session.last_error = None;
        info!("Accepting {:?}", file);

        let image = match self.load_source(file).await {
            Ok(image) => image,
            Err(e) => {
                self.fail(&e);
                return Err(e);
            }
        };

        self.session.composition = Composition::with_source(image);
        self.enter(Stage::Analyzing);

        let analysis = match self.session.source_image() {
            Some(source) => self.collaborators.analyzer.analyze(source).await,
            None => Err(RecomposeError::Internal("source image vanished".into())),
        };

        let analyzed = match analysis {
            Ok(elements) => elements,
            Err(e) => {
                let reason = e.to_string();
                warn!("Analysis failed, using fallback elements: {}", reason);
                self.observer.on_analysis_fallback(&reason);
                fallback_elements()
            }
        };

        if let Composition::Recompose { elements, .. } = &mut self.session.composition {
            *elements = ingest_elements(analyzed);
        }
        let count = self.session.elements().len();
        debug!("Elements: {:?}", self.session.elements());
        self.observer.on_elements_ready(count);
        self.enter(Stage::Selecting);
        Ok(())
    }

    async fn load_source(&self, file: InputFile) -> Result<ImagePayload, RecomposeError> {
        match file.kind() {
            InputKind::Unsupported => Err(RecomposeError::UnsupportedFile {
                name: file.name,
                media_type: file.media_type,
            }),
            InputKind::Image => {
                if file.bytes.is_empty() {
                    return Err(RecomposeError::FileRead {
                        name: file.name,
                        reason: "file is empty".into(),
                    });
                }
                match encode::sniff_image_mime(&file.bytes) {
                    Some(mime) => Ok(ImagePayload::new(file.bytes, mime)),
                    None => Err(RecomposeError::FileRead {
                        name: file.name,
                        reason: "not a readable image".into(),
                    }),
                }
            }
            InputKind::Document => {
                info!("Rasterising first page of {}", file.name);
                self.collaborators
                    .converter
                    .rasterize_first_page(&file.bytes)
                    .await
            }
        }
    }

    /// Skip upload and analysis; generate from a description only.
    pub fn start_new_creation(&mut self) -> Result<(), RecomposeError> {
        self.require("start a new creation", &[Step::Upload])?;
        self.session.composition = Composition::CreateNew;
        self.session.last_error = None;
        self.enter(Stage::Configuring);
        Ok(())
    }

    // ── Selecting ────────────────────────────────────────────────────────

    /// Flip the keep flag of one element. Returns the new flag.
    pub fn toggle_element(&mut self, id: &str) -> Result<bool, RecomposeError> {
        self.require("toggle an element", &[Step::Selecting])?;
        let found = match &mut self.session.composition {
            Composition::Recompose { elements, .. } => elements.iter_mut().find(|el| el.id == id),
            Composition::CreateNew => None,
        };
        let element = found.ok_or_else(|| RecomposeError::UnknownElement { id: id.to_string() })?;
        element.keep = !element.keep;
        debug!("{} '{}' keep={}", element.id, element.label, element.keep);
        Ok(element.keep)
    }

    pub fn proceed_to_configuration(&mut self) -> Result<(), RecomposeError> {
        self.require("proceed to configuration", &[Step::Selecting])?;
        self.enter(Stage::Configuring);
        Ok(())
    }

    // ── Configuring ──────────────────────────────────────────────────────

    /// Leave configuration.
    ///
    /// Create-new goes back to Upload with the mode reset. Recompose goes back
    /// to Selecting, or to Upload when there is no source image to select from.
    pub fn back(&mut self) -> Result<(), RecomposeError> {
        self.require("go back", &[Step::Configuring])?;
        let has_source = match &self.session.composition {
            Composition::Recompose { source_image, .. } => source_image.is_some(),
            Composition::CreateNew => false,
        };
        if has_source {
            self.enter(Stage::Selecting);
        } else {
            self.session.composition = Composition::default();
            self.enter(Stage::Upload);
        }
        Ok(())
    }

    pub fn set_template(&mut self, id: &str) -> Result<(), RecomposeError> {
        self.require("change the template", &[Step::Configuring])?;
        let template = catalog::find_template(id)?;
        self.session.template = template.clone();
        debug!("Template → {}", template.id);
        Ok(())
    }

    pub fn set_ratio(&mut self, ratio: AspectRatio) -> Result<(), RecomposeError> {
        self.require("change the aspect ratio", &[Step::Configuring])?;
        self.session.target_ratio = ratio;
        debug!("Ratio → {}", ratio);
        Ok(())
    }

    /// Switch mode. Switching to create-new drops the source image and the
    /// elements.
    pub fn set_mode(&mut self, mode: Mode) -> Result<(), RecomposeError> {
        self.require("change the mode", &[Step::Configuring])?;
        if self.session.mode() != mode {
            self.session.composition = match mode {
                Mode::CreateNew => Composition::CreateNew,
                Mode::Recompose => Composition::default(),
            };
        }
        debug!("Mode → {:?}", mode);
        Ok(())
    }

    pub fn set_instructions(&mut self, text: impl Into<String>) -> Result<(), RecomposeError> {
        self.require("edit the instructions", &[Step::Configuring])?;
        self.session.freeform_instructions = text.into();
        Ok(())
    }

    /// Append an inspiration style to the freeform instructions.
    pub fn apply_inspiration(&mut self, id: &str) -> Result<&str, RecomposeError> {
        self.require("apply an inspiration", &[Step::Configuring])?;
        let clause = catalog::find_inspiration(id)?.clause();
        let current = self.session.freeform_instructions.trim_end();
        self.session.freeform_instructions = if current.trim().is_empty() {
            clause
        } else {
            format!("{current} {clause}")
        };
        Ok(&self.session.freeform_instructions)
    }

    /// The payload `generate` would send right now.
    pub fn instructions(&self) -> Result<Instructions, RecomposeError> {
        let freeform = &self.session.freeform_instructions;
        match &self.session.composition {
            Composition::CreateNew => prompts::create_new_instructions(freeform)
                .ok_or(RecomposeError::MissingInstructions),
            Composition::Recompose {
                source_image: None, ..
            } => Err(RecomposeError::MissingSourceImage),
            Composition::Recompose { .. } => Ok(prompts::recompose_instructions(
                freeform,
                &self.session.kept_labels(),
                &self.session.template,
            )),
        }
    }

    /// Ask the synthesizer for an image.
    ///
    /// Precondition failures are rejected before any remote call. A synthesis
    /// failure records `last_error` and returns to Configuring.
    pub async fn generate(&mut self) -> Result<&GeneratedImage, RecomposeError> {
        self.require("generate", &[Step::Configuring])?;
        let instructions = self.instructions()?;
        let ratio = self.session.target_ratio;
        self.session.last_error = None;
        self.enter(Stage::Generating);

        let reference = self.session.source_image();
        info!(
            "Generating {} image ({:?}, {} chars of instructions)",
            ratio,
            instructions.source,
            instructions.text.len()
        );

        let outcome = self
            .collaborators
            .synthesizer
            .synthesize(&instructions.text, ratio, reference)
            .await
            .and_then(|image| {
                if image.is_empty() {
                    Err(RecomposeError::Synthesis {
                        detail: "model returned an empty image".into(),
                    })
                } else {
                    Ok(image)
                }
            });

        match outcome {
            Ok(image) => {
                info!("Generated {} ({} bytes)", image.mime_type, image.len());
                self.enter(Stage::Result(GeneratedImage {
                    image,
                    ratio,
                    instructions_used: instructions.text,
                    source: instructions.source,
                }));
                self.session.result().ok_or_else(|| {
                    RecomposeError::Internal("result missing after generation".into())
                })
            }
            Err(e) => {
                self.fail(&e);
                self.enter(Stage::Configuring);
                Err(e)
            }
        }
    }

    // ── Result ───────────────────────────────────────────────────────────

    /// Go back to configuration. The current result is discarded.
    pub fn adjust(&mut self) -> Result<(), RecomposeError> {
        self.require("adjust", &[Step::Result])?;
        self.enter(Stage::Configuring);
        Ok(())
    }

    /// Encode the result. Failure keeps the result so export can be retried.
    pub async fn export(&mut self, format: ExportFormat) -> Result<ExportedFile, RecomposeError> {
        self.require("export", &[Step::Result])?;
        let Some(result) = self.session.result() else {
            return Err(RecomposeError::Internal("result step without a result".into()));
        };

        let outcome = self.encode_result(&result.image, format).await;
        match outcome {
            Ok(file) => {
                info!("Exported {} ({} bytes)", file.file_name, file.bytes.len());
                self.session.last_error = None;
                Ok(file)
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    async fn encode_result(
        &self,
        image: &ImagePayload,
        format: ExportFormat,
    ) -> Result<ExportedFile, RecomposeError> {
        let (bytes, orientation) = match format {
            ExportFormat::Png => (encode::transcode_png(image)?, None),
            ExportFormat::Jpeg => (encode::transcode_jpeg(image, self.config.jpeg_quality)?, None),
            ExportFormat::Pdf => {
                let (width, height) = encode::dimensions(image)?;
                let doc = self
                    .collaborators
                    .converter
                    .package_as_document(image, width, height)
                    .await?;
                (doc.bytes, Some(doc.orientation))
            }
        };
        Ok(ExportedFile {
            bytes,
            mime_type: format.mime_type(),
            file_name: format!("{EXPORT_BASE_NAME}.{}", format.extension()),
            orientation,
        })
    }

    // ── Any step ─────────────────────────────────────────────────────────

    /// Discard everything and return to Upload.
    pub fn reset(&mut self) {
        let from = self.session.step();
        self.session = fresh_session(&self.config);
        info!("Session reset from {}", from);
        if from != Step::Upload {
            self.observer.on_step_change(from, Step::Upload);
        }
    }

    // ── Helpers ──────────────────────────────────────────────────────────

    fn require(&self, operation: &'static str, allowed: &[Step]) -> Result<(), RecomposeError> {
        let step = self.session.step();
        if allowed.contains(&step) {
            Ok(())
        } else {
            Err(RecomposeError::InvalidTransition { operation, step })
        }
    }

    fn enter(&mut self, stage: Stage) {
        let from = self.session.step();
        self.session.stage = stage;
        let to = self.session.step();
        if from != to {
            info!("Step: {} → {}", from, to);
            self.observer.on_step_change(from, to);
        }
    }

    /// Record a collaborator failure. The caller picks the step to land on.
    /// Caller mistakes are not recorded.
    fn fail(&mut self, error: &RecomposeError) {
        if !error.is_collaborator_failure() {
            debug!("Not recorded as session error: {}", error);
            return;
        }
        let message = error.to_string();
        warn!("{}", message);
        self.observer.on_error(&message);
        self.session.last_error = Some(message);
    }
}

fn fresh_session(config: &RecomposeConfig) -> Session {
    let template = catalog::find_template(&config.default_template)
        .unwrap_or_else(|_| catalog::default_template())
        .clone();
    Session::new(template, config.default_ratio)
}
