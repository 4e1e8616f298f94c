//! Input resolution: turn a path, URL, or in-memory buffer into an
//! [`InputFile`] and decide whether it is an image, a document, or neither.
//!
//! Classification uses magic bytes, not the file extension. Unsupported
//! files are rejected before any remote call.

use crate::error::RecomposeError;
use crate::pipeline::encode;
use std::path::Path;
use tracing::{debug, info};

pub const PDF_MEDIA_TYPE: &str = "application/pdf";
const UNKNOWN_MEDIA_TYPE: &str = "application/octet-stream";

/// What the workflow does with an accepted file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// Read directly into the session as the source image.
    Image,
    /// Rasterised (first page only) before analysis.
    Document,
    /// Rejected before any remote call.
    Unsupported,
}

/// A file offered to the workflow.
#[derive(Clone, PartialEq, Eq)]
pub struct InputFile {
    /// Display name, used in error messages.
    pub name: String,
    /// Sniffed media type, e.g. `image/png` or `application/pdf`.
    pub media_type: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for InputFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputFile")
            .field("name", &self.name)
            .field("media_type", &self.media_type)
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .finish()
    }
}

impl InputFile {
    /// Wrap an in-memory buffer, sniffing its media type.
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let media_type = sniff_media_type(&bytes).to_string();
        Self {
            name: name.into(),
            media_type,
            bytes,
        }
    }

    /// Wrap a buffer whose media type the host already knows.
    pub fn with_media_type(
        name: impl Into<String>,
        media_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            bytes,
        }
    }

    /// Load from a local path or an HTTP(S) URL.
    pub async fn load(source: &str, download_timeout_secs: u64) -> Result<Self, RecomposeError> {
        if is_url(source) {
            download_url(source, download_timeout_secs).await
        } else {
            read_local(Path::new(source)).await
        }
    }

    pub fn kind(&self) -> InputKind {
        classify(&self.media_type)
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Classify a media type.
pub fn classify(media_type: &str) -> InputKind {
    let media_type = media_type.trim().to_ascii_lowercase();
    if media_type == PDF_MEDIA_TYPE {
        InputKind::Document
    } else if media_type.starts_with("image/") {
        InputKind::Image
    } else {
        InputKind::Unsupported
    }
}

/// Media type from magic bytes; `application/octet-stream` when unknown.
pub fn sniff_media_type(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(b"%PDF") {
        return PDF_MEDIA_TYPE;
    }
    encode::sniff_image_mime(bytes).unwrap_or(UNKNOWN_MEDIA_TYPE)
}

async fn read_local(path: &Path) -> Result<InputFile, RecomposeError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let bytes = tokio::fs::read(path).await.map_err(|e| RecomposeError::FileRead {
        name: path.display().to_string(),
        reason: e.to_string(),
    })?;

    if bytes.is_empty() {
        return Err(RecomposeError::FileRead {
            name,
            reason: "file is empty".into(),
        });
    }

    let file = InputFile::from_bytes(name, bytes);
    debug!("Read local input: {:?}", file);
    Ok(file)
}

/// Download a URL into memory.
async fn download_url(url: &str, timeout_secs: u64) -> Result<InputFile, RecomposeError> {
    info!("Downloading input from: {}", url);

    let failed = |reason: String| RecomposeError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            failed(format!("timed out after {timeout_secs}s"))
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
    let file = InputFile::from_bytes(filename_from_url(url), bytes.to_vec());
    info!("Downloaded {} ({} bytes, {})", file.name, file.bytes.len(), file.media_type);
    Ok(file)
}

/// Last path segment of the URL, or a generic name.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() {
                    return last.to_string();
                }
            }
        }
    }
    "download".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/photo.png"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn classify_media_types() {
        assert_eq!(classify("image/png"), InputKind::Image);
        assert_eq!(classify("IMAGE/JPEG"), InputKind::Image);
        assert_eq!(classify("application/pdf"), InputKind::Document);
        assert_eq!(classify("text/plain"), InputKind::Unsupported);
        assert_eq!(classify(""), InputKind::Unsupported);
    }

    #[test]
    fn sniffs_pdf_and_text() {
        assert_eq!(sniff_media_type(b"%PDF-1.7\n..."), PDF_MEDIA_TYPE);
        assert_eq!(sniff_media_type(b"hello world"), UNKNOWN_MEDIA_TYPE);
        let file = InputFile::from_bytes("notes.txt", b"hello".to_vec());
        assert_eq!(file.kind(), InputKind::Unsupported);
    }

    #[test]
    fn filename_from_url_segments() {
        assert_eq!(filename_from_url("https://x.test/a/b/shot.png"), "shot.png");
        assert_eq!(filename_from_url("https://x.test/"), "download");
    }

    #[tokio::test]
    async fn load_local_pdf() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"%PDF-1.4\n%%EOF").unwrap();
        let file = InputFile::load(tmp.path().to_str().unwrap(), 5).await.unwrap();
        assert_eq!(file.kind(), InputKind::Document);
    }

    #[tokio::test]
    async fn load_missing_file_is_file_read_error() {
        let err = InputFile::load("/definitely/not/here.png", 5).await.unwrap_err();
        assert!(matches!(err, RecomposeError::FileRead { .. }));
    }
}
