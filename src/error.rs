//! Error types for the edgequake-recompose library.
//!
//! A single enum, [`RecomposeError`], covers every failure the workflow can
//! report. The variants fall into two groups that the controller treats
//! differently:
//!
//! * **Collaborator failures** (`FileRead`, `Conversion`, `Analysis`,
//!   `Synthesis`, `Export`, …) come from I/O, pdfium, or a remote model. The
//!   controller records their message as the session's `last_error` and then
//!   returns them to the caller.
//!
//! * **Caller mistakes** (`InvalidTransition`, `UnknownElement`,
//!   `MissingInstructions`, …) are returned without touching the session, so a
//!   host can reject the action without the user seeing a spurious error banner.
//!
//! No variant is fatal: after any error the session stays interactable and
//! [`crate::workflow::WorkflowController::reset`] always succeeds.

use crate::session::Step;
use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the edgequake-recompose library.
#[derive(Debug, Error)]
pub enum RecomposeError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The source file could not be read or is not a decodable image.
    #[error("Failed to read '{name}': {reason}")]
    FileRead { name: String, reason: String },

    /// The file is neither an image nor a PDF document.
    #[error("Unsupported file '{name}' ({media_type}). Upload an image or a PDF.")]
    UnsupportedFile { name: String, media_type: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    // ── Document errors ───────────────────────────────────────────────────
    /// The PDF is encrypted, corrupt, or has no pages.
    #[error("Could not process PDF: {detail}\nPlease ensure it is not password protected.")]
    Conversion { detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium (or pass --pdfium-lib) to use an\n\
existing copy, or install pdfium system-wide.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Remote model errors ───────────────────────────────────────────────
    /// Element analysis failed. The controller recovers from this one.
    #[error("Element analysis failed: {detail}")]
    Analysis { detail: String },

    /// The image model rejected the request or returned no image.
    #[error("Image generation failed: {detail}")]
    Synthesis { detail: String },

    /// The configured provider is not initialised (missing API key etc.).
    #[error("Provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Export errors ─────────────────────────────────────────────────────
    /// The result could not be encoded in the requested format.
    #[error("Export failed: {detail}")]
    Export { detail: String },

    /// Could not create or write the exported file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Workflow errors ───────────────────────────────────────────────────
    /// The operation is not available in the current step.
    #[error("Cannot {operation} while in the {step} step")]
    InvalidTransition { operation: &'static str, step: Step },

    /// No detected element has this identifier.
    #[error("No element with id '{id}'")]
    UnknownElement { id: String },

    /// No template in the catalog has this identifier.
    #[error("Unknown template '{id}'")]
    UnknownTemplate { id: String },

    /// No inspiration style in the catalog has this identifier.
    #[error("Unknown inspiration style '{id}'")]
    UnknownInspiration { id: String },

    /// The ratio string is not one of the supported ratios.
    #[error("Unsupported aspect ratio '{0}' (expected one of 1:1, 2:3, 3:2, 3:4, 4:3, 9:16, 16:9, 21:9)")]
    InvalidRatio(String),

    /// Create-new mode needs a description of the image to create.
    #[error("Describe the image you want to create before generating")]
    MissingInstructions,

    /// Recompose mode needs a source image to recompose.
    #[error("Recompose mode requires a source image; upload one first")]
    MissingSourceImage,

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RecomposeError {
    /// True for errors produced by a collaborator (I/O, pdfium, remote model),
    /// as opposed to an operation the caller was not allowed to make.
    pub fn is_collaborator_failure(&self) -> bool {
        matches!(
            self,
            RecomposeError::FileRead { .. }
                | RecomposeError::UnsupportedFile { .. }
                | RecomposeError::DownloadFailed { .. }
                | RecomposeError::Conversion { .. }
                | RecomposeError::PdfiumBindingFailed(_)
                | RecomposeError::Analysis { .. }
                | RecomposeError::Synthesis { .. }
                | RecomposeError::ProviderNotConfigured { .. }
                | RecomposeError::Export { .. }
                | RecomposeError::OutputWriteFailed { .. }
                | RecomposeError::Internal(_)
        )
    }
}
