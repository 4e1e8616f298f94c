//! Configuration for the recompose workflow and its collaborators.
//!
//! All knobs live in [`RecomposeConfig`], built via
//! [`RecomposeConfigBuilder`]. Each production collaborator holds its own
//! clone.

use crate::catalog;
use crate::error::RecomposeError;
use crate::progress::SharedObserver;
use crate::session::AspectRatio;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Default vision model for element analysis when a Gemini key is found.
pub const DEFAULT_ANALYSIS_MODEL: &str = "gemini-2.5-flash";

/// Default image model for synthesis.
pub const DEFAULT_SYNTHESIS_MODEL: &str = "gemini-3-pro-image-preview";

/// Default Gemini REST base URL.
pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Configuration for a recompose session.
///
/// Built via [`RecomposeConfig::builder()`] or using
/// [`RecomposeConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_recompose::{AspectRatio, RecomposeConfig};
///
/// let config = RecomposeConfig::builder()
///     .default_ratio(AspectRatio::Portrait9x16)
///     .image_size("2K")
///     .api_timeout_secs(180)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct RecomposeConfig {
    /// Pre-constructed vision provider for analysis. Takes precedence over
    /// `analysis_provider_name`.
    pub analysis_provider: Option<Arc<dyn LLMProvider>>,

    /// Analysis provider name (e.g. "gemini", "openai", "anthropic").
    /// If None, the provider is auto-detected from the environment.
    pub analysis_provider_name: Option<String>,

    /// Analysis model identifier. If None, a provider default is used.
    pub analysis_model: Option<String>,

    /// Custom analysis system prompt. If None, uses the built-in prompt.
    pub analysis_prompt: Option<String>,

    /// Sampling temperature for analysis. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens for the analysis reply. Default: 2048.
    pub max_tokens: usize,

    /// Image model used for synthesis. Default: [`DEFAULT_SYNTHESIS_MODEL`].
    pub synthesis_model: String,

    /// Gemini REST base URL. If None, `GEMINI_API_BASE` or the public endpoint.
    pub gemini_api_base: Option<String>,

    /// Gemini API key. If None, `GEMINI_API_KEY` or `GOOGLE_API_KEY` is read at
    /// call time.
    pub gemini_api_key: Option<String>,

    /// Output size hint sent with synthesis requests: "1K", "2K", or "4K". Default: "1K".
    pub image_size: String,

    /// Per-remote-call timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Scale factor applied to the first PDF page when rasterising. Default: 2.0.
    pub render_scale: f32,

    /// Maximum rasterised edge length in pixels. Default: 4096.
    ///
    /// Caps memory on poster-sized pages independently of `render_scale`.
    pub max_rendered_pixels: u32,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Directory or file of the pdfium library. If None, `PDFIUM_LIB_PATH`
    /// or the system library.
    pub pdfium_lib_path: Option<PathBuf>,

    /// JPEG quality for JPEG and PDF exports (1–100). Default: 92.
    pub jpeg_quality: u8,

    /// Template id a new session starts with. Default: "pub_warm".
    pub default_template: String,

    /// Ratio a new session starts with. Default: 16:9.
    pub default_ratio: AspectRatio,

    /// Optional observer for step-change events.
    pub observer: Option<SharedObserver>,
}

impl Default for RecomposeConfig {
    fn default() -> Self {
        Self {
            analysis_provider: None,
            analysis_provider_name: None,
            analysis_model: None,
            analysis_prompt: None,
            temperature: 0.1,
            max_tokens: 2048,
            synthesis_model: DEFAULT_SYNTHESIS_MODEL.to_string(),
            gemini_api_base: None,
            gemini_api_key: None,
            image_size: "1K".to_string(),
            api_timeout_secs: 120,
            download_timeout_secs: 120,
            render_scale: 2.0,
            max_rendered_pixels: 4096,
            password: None,
            pdfium_lib_path: None,
            jpeg_quality: 92,
            default_template: catalog::DEFAULT_TEMPLATE_ID.to_string(),
            default_ratio: AspectRatio::default(),
            observer: None,
        }
    }
}

impl fmt::Debug for RecomposeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecomposeConfig")
            .field(
                "analysis_provider",
                &self.analysis_provider.as_ref().map(|_| "<dyn LLMProvider>"),
            )
            .field("analysis_provider_name", &self.analysis_provider_name)
            .field("analysis_model", &self.analysis_model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("synthesis_model", &self.synthesis_model)
            .field("gemini_api_base", &self.gemini_api_base)
            .field("gemini_api_key", &self.gemini_api_key.as_ref().map(|_| "<redacted>"))
            .field("image_size", &self.image_size)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("render_scale", &self.render_scale)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("pdfium_lib_path", &self.pdfium_lib_path)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("default_template", &self.default_template)
            .field("default_ratio", &self.default_ratio)
            .field("observer", &self.observer.as_ref().map(|_| "<dyn WorkflowObserver>"))
            .finish()
    }
}

impl RecomposeConfig {
    /// Create a new builder for `RecomposeConfig`.
    pub fn builder() -> RecomposeConfigBuilder {
        RecomposeConfigBuilder {
            config: Self::default(),
        }
    }

    /// The Gemini base URL, honouring `GEMINI_API_BASE`.
    pub fn resolved_gemini_api_base(&self) -> String {
        self.gemini_api_base
            .clone()
            .or_else(|| std::env::var("GEMINI_API_BASE").ok())
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_GEMINI_API_BASE.to_string())
    }

    /// The Gemini API key from config, `GEMINI_API_KEY`, or `GOOGLE_API_KEY`.
    pub fn resolved_gemini_api_key(&self) -> Option<String> {
        self.gemini_api_key
            .clone()
            .or_else(|| non_empty_env("GEMINI_API_KEY"))
            .or_else(|| non_empty_env("GOOGLE_API_KEY"))
            .filter(|k| !k.trim().is_empty())
    }

    /// The pdfium library location from config or `PDFIUM_LIB_PATH`.
    pub fn resolved_pdfium_lib_path(&self) -> Option<PathBuf> {
        self.pdfium_lib_path
            .clone()
            .or_else(|| non_empty_env("PDFIUM_LIB_PATH").map(PathBuf::from))
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Builder for [`RecomposeConfig`].
#[derive(Debug)]
pub struct RecomposeConfigBuilder {
    config: RecomposeConfig,
}

impl RecomposeConfigBuilder {
    pub fn analysis_provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.analysis_provider = Some(provider);
        self
    }

    pub fn analysis_provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.analysis_provider_name = Some(name.into());
        self
    }

    pub fn analysis_model(mut self, model: impl Into<String>) -> Self {
        self.config.analysis_model = Some(model.into());
        self
    }

    pub fn analysis_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.analysis_prompt = Some(prompt.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn synthesis_model(mut self, model: impl Into<String>) -> Self {
        self.config.synthesis_model = model.into();
        self
    }

    pub fn gemini_api_base(mut self, base: impl Into<String>) -> Self {
        self.config.gemini_api_base = Some(base.into());
        self
    }

    pub fn gemini_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.gemini_api_key = Some(key.into());
        self
    }

    pub fn image_size(mut self, size: impl Into<String>) -> Self {
        self.config.image_size = size.into().trim().to_ascii_uppercase();
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn render_scale(mut self, scale: f32) -> Self {
        self.config.render_scale = scale;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.clamp(100, i32::MAX as u32);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.jpeg_quality = quality;
        self
    }

    pub fn default_template(mut self, id: impl Into<String>) -> Self {
        self.config.default_template = id.into();
        self
    }

    pub fn default_ratio(mut self, ratio: AspectRatio) -> Self {
        self.config.default_ratio = ratio;
        self
    }

    pub fn observer(mut self, observer: SharedObserver) -> Self {
        self.config.observer = Some(observer);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<RecomposeConfig, RecomposeError> {
        let c = &self.config;
        if !(0.5..=4.0).contains(&c.render_scale) {
            return Err(RecomposeError::InvalidConfig(format!(
                "Render scale must be 0.5–4.0, got {}",
                c.render_scale
            )));
        }
        if c.jpeg_quality == 0 || c.jpeg_quality > 100 {
            return Err(RecomposeError::InvalidConfig(format!(
                "JPEG quality must be 1–100, got {}",
                c.jpeg_quality
            )));
        }
        if !matches!(c.image_size.as_str(), "1K" | "2K" | "4K") {
            return Err(RecomposeError::InvalidConfig(format!(
                "Image size must be 1K, 2K, or 4K, got '{}'",
                c.image_size
            )));
        }
        if c.api_timeout_secs == 0 {
            return Err(RecomposeError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        if c.synthesis_model.trim().is_empty() {
            return Err(RecomposeError::InvalidConfig(
                "Synthesis model must not be empty".into(),
            ));
        }
        catalog::find_template(&c.default_template)
            .map_err(|e| RecomposeError::InvalidConfig(e.to_string()))?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_build() {
        let config = RecomposeConfig::builder().build().unwrap();
        assert_eq!(config.image_size, "1K");
        assert_eq!(config.render_scale, 2.0);
        assert_eq!(config.default_template, "pub_warm");
        assert_eq!(config.default_ratio, AspectRatio::Landscape16x9);
    }

    #[test]
    fn rejects_bad_scale() {
        let err = RecomposeConfig::builder().render_scale(9.0).build().unwrap_err();
        assert!(matches!(err, RecomposeError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_unknown_default_template() {
        let err = RecomposeConfig::builder()
            .default_template("nope")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn image_size_is_normalised() {
        let config = RecomposeConfig::builder().image_size(" 2k ").build().unwrap();
        assert_eq!(config.image_size, "2K");
        assert!(RecomposeConfig::builder().image_size("8k").build().is_err());
    }

    #[test]
    fn max_rendered_pixels_is_clamped() {
        let huge = RecomposeConfig::builder()
            .max_rendered_pixels(u32::MAX)
            .build()
            .unwrap();
        assert_eq!(huge.max_rendered_pixels, i32::MAX as u32);
        let tiny = RecomposeConfig::builder().max_rendered_pixels(3).build().unwrap();
        assert_eq!(tiny.max_rendered_pixels, 100);
    }

    #[test]
    fn debug_redacts_secrets() {
        let config = RecomposeConfig::builder()
            .gemini_api_key("sk-secret")
            .password("hunter2")
            .build()
            .unwrap();
        let dbg = format!("{config:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(!dbg.contains("hunter2"));
    }

    #[test]
    fn explicit_api_base_is_trimmed() {
        let config = RecomposeConfig::builder()
            .gemini_api_base("http://localhost:8080/v1beta/")
            .build()
            .unwrap();
        assert_eq!(config.resolved_gemini_api_base(), "http://localhost:8080/v1beta");
    }
}
