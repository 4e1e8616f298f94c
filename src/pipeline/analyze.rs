//! Element analysis: ask a vision LLM which separable elements an image holds.
//!
//! All prompt text lives in [`crate::prompts`]; this module builds the
//! message, resolves the provider, and turns the reply into
//! [`AnalyzedElement`]s. Every failure (no provider, HTTP error, unparsable
//! reply) surfaces as [`RecomposeError::Analysis`] so the controller can apply
//! its fallback uniformly. No retries.

use crate::config::{RecomposeConfig, DEFAULT_ANALYSIS_MODEL};
use crate::error::RecomposeError;
use crate::pipeline::{encode, postprocess, ElementAnalyzer};
use crate::prompts::{ANALYSIS_SYSTEM_PROMPT, ANALYSIS_USER_PROMPT};
use crate::session::{AnalyzedElement, ImagePayload};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

const OPENAI_DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// [`ElementAnalyzer`] backed by any `edgequake-llm` vision provider.
#[derive(Debug, Clone)]
pub struct VisionElementAnalyzer {
    config: RecomposeConfig,
}

impl VisionElementAnalyzer {
    pub fn new(config: RecomposeConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ElementAnalyzer for VisionElementAnalyzer {
    async fn analyze(&self, image: &ImagePayload) -> Result<Vec<AnalyzedElement>, RecomposeError> {
        let start = Instant::now();
        let provider = resolve_provider(&self.config).map_err(|e| RecomposeError::Analysis {
            detail: e.to_string(),
        })?;

        let system_prompt = self
            .config
            .analysis_prompt
            .as_deref()
            .unwrap_or(ANALYSIS_SYSTEM_PROMPT);

        let messages = vec![
            ChatMessage::system(system_prompt),
            ChatMessage::user_with_images(ANALYSIS_USER_PROMPT, vec![encode::to_image_data(image)]),
        ];
        let options = build_options(&self.config);

        let call = provider.chat(&messages, Some(&options));
        let response = tokio::time::timeout(Duration::from_secs(self.config.api_timeout_secs), call)
            .await
            .map_err(|_| RecomposeError::Analysis {
                detail: format!("timed out after {}s", self.config.api_timeout_secs),
            })?
            .map_err(|e| RecomposeError::Analysis {
                detail: e.to_string(),
            })?;

        debug!(
            "Analysis: {} input tokens, {} output tokens, {:?}",
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        let elements = parse_elements(&response.content)?;
        info!("Analysis found {} elements", elements.len());
        Ok(elements)
    }
}

/// Build `CompletionOptions` from the config.
fn build_options(config: &RecomposeConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

// ── Reply parsing ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(untagged)]
enum AnalysisReply {
    Wrapped { elements: Vec<AnalyzedElement> },
    Bare(Vec<AnalyzedElement>),
}

/// Parse a model reply into elements.
///
/// Accepts `{"elements": [...]}` or a bare array, with or without fences and
/// surrounding prose. Elements with a blank label are dropped. An empty
/// result is an error.
pub fn parse_elements(raw: &str) -> Result<Vec<AnalyzedElement>, RecomposeError> {
    let cleaned = postprocess::clean_json_reply(raw);
    let reply: AnalysisReply =
        serde_json::from_str(&cleaned).map_err(|e| RecomposeError::Analysis {
            detail: format!("malformed reply: {e}"),
        })?;

    let elements = match reply {
        AnalysisReply::Wrapped { elements } | AnalysisReply::Bare(elements) => elements,
    };

    let elements: Vec<AnalyzedElement> = elements
        .into_iter()
        .filter_map(|mut el| {
            el.label = el.label.trim().to_string();
            (!el.label.is_empty()).then_some(el)
        })
        .collect();

    if elements.is_empty() {
        return Err(RecomposeError::Analysis {
            detail: "reply contained no elements".into(),
        });
    }
    Ok(elements)
}

// ── Provider resolution ──────────────────────────────────────────────────────

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, RecomposeError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        RecomposeError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

fn default_model_for(provider_name: &str) -> &'static str {
    if provider_name.eq_ignore_ascii_case("gemini") {
        DEFAULT_ANALYSIS_MODEL
    } else {
        OPENAI_DEFAULT_MODEL
    }
}

fn env_set(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Resolve the analysis provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.analysis_provider`), used as-is.
/// 2. **Named provider + model** (`config.analysis_provider_name`).
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 4. **Gemini key** (`GEMINI_API_KEY`/`GOOGLE_API_KEY`).
/// 5. **OpenAI key** (`OPENAI_API_KEY`).
/// 6. **Auto-detect** via [`ProviderFactory::from_env`].
///
/// Resolved on every call.
pub fn resolve_provider(config: &RecomposeConfig) -> Result<Arc<dyn LLMProvider>, RecomposeError> {
    if let Some(ref provider) = config.analysis_provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.analysis_provider_name {
        let model = config
            .analysis_model
            .as_deref()
            .unwrap_or_else(|| default_model_for(name));
        return create_vision_provider(name, model);
    }

    let env_pair = (env_set("EDGEQUAKE_LLM_PROVIDER"), env_set("EDGEQUAKE_MODEL"));
    if let (Some(prov), Some(model)) = env_pair {
        return create_vision_provider(&prov, &model);
    }

    if env_set("GEMINI_API_KEY").is_some() || env_set("GOOGLE_API_KEY").is_some() {
        let model = config.analysis_model.as_deref().unwrap_or(DEFAULT_ANALYSIS_MODEL);
        return create_vision_provider("gemini", model);
    }

    if env_set("OPENAI_API_KEY").is_some() {
        let model = config.analysis_model.as_deref().unwrap_or(OPENAI_DEFAULT_MODEL);
        return create_vision_provider("openai", model);
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| RecomposeError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No vision provider could be auto-detected from environment.\n\
                Set GEMINI_API_KEY, OPENAI_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ElementCategory;

    #[test]
    fn build_options_defaults() {
        let opts = build_options(&RecomposeConfig::default());
        assert_eq!(opts.temperature, Some(0.1));
        assert_eq!(opts.max_tokens, Some(2048));
    }

    #[test]
    fn parses_wrapped_reply() {
        let raw = r#"{"elements":[
            {"label":"Chef","type":"person","description":"man in white"},
            {"label":"Kitchen","type":"background","description":"steel"},
            {"label":"Pan","type":"object","description":"copper"}
        ]}"#;
        let els = parse_elements(raw).unwrap();
        let cats: Vec<ElementCategory> = els.iter().map(|e| e.category).collect();
        assert_eq!(
            cats,
            [ElementCategory::Person, ElementCategory::Background, ElementCategory::Object]
        );
        assert_eq!(els[0].description, "man in white");
    }

    #[test]
    fn parses_fenced_bare_array() {
        let raw = "```json\n[{\"label\":\"Menu\",\"type\":\"text\"}]\n```";
        let els = parse_elements(raw).unwrap();
        assert_eq!(els.len(), 1);
        assert_eq!(els[0].category, ElementCategory::Text);
        assert!(els[0].description.is_empty());
    }

    #[test]
    fn counted_prose_before_reply() {
        let raw = "I found [3] elements:\n{\"elements\":[{\"label\":\"Chef\",\"type\":\"person\"}]}";
        let els = parse_elements(raw).unwrap();
        assert_eq!(els.len(), 1);
        assert_eq!(els[0].label, "Chef");
        assert_eq!(els[0].category, ElementCategory::Person);
    }

    #[test]
    fn blank_labels_are_dropped() {
        let raw = r#"{"elements":[{"label":"  ","type":"object"},{"label":"Lamp","type":"object"}]}"#;
        let els = parse_elements(raw).unwrap();
        assert_eq!(els.len(), 1);
        assert_eq!(els[0].label, "Lamp");
    }

    #[test]
    fn empty_or_malformed_is_analysis_error() {
        assert!(matches!(
            parse_elements(r#"{"elements":[]}"#),
            Err(RecomposeError::Analysis { .. })
        ));
        assert!(matches!(
            parse_elements("I see a chef."),
            Err(RecomposeError::Analysis { .. })
        ));
    }

    #[test]
    fn gemini_default_model() {
        assert_eq!(default_model_for("Gemini"), DEFAULT_ANALYSIS_MODEL);
        assert_eq!(default_model_for("openai"), OPENAI_DEFAULT_MODEL);
    }
}
