//! Image synthesis via the Gemini `generateContent` REST endpoint.
//!
//! `edgequake-llm` covers text and vision chat but not image *output*, so this
//! module speaks the wire format directly with `reqwest`:
//!
//! ```text
//! POST {base}/models/{model}:generateContent?key=…
//! { contents: [{ role: "user", parts: [ {inlineData}?, {text} ] }],
//!   generationConfig: { responseModalities: ["IMAGE"],
//!                       imageConfig: { aspectRatio, imageSize } } }
//! ```
//!
//! The first `inlineData` part of any candidate is the result. Request
//! building and response extraction are pure functions so both can be tested
//! without a network.

use crate::config::RecomposeConfig;
use crate::error::RecomposeError;
use crate::pipeline::ImageSynthesizer;
use crate::session::{AspectRatio, ImagePayload};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// [`ImageSynthesizer`] backed by a Gemini image model.
#[derive(Debug, Clone)]
pub struct GeminiImageSynthesizer {
    config: RecomposeConfig,
    http: reqwest::Client,
}

impl GeminiImageSynthesizer {
    pub fn new(config: RecomposeConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        let model = self.config.synthesis_model.trim();
        let model_path = if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{model}")
        };
        format!(
            "{}/{}:generateContent",
            self.config.resolved_gemini_api_base(),
            model_path
        )
    }
}

#[async_trait]
impl ImageSynthesizer for GeminiImageSynthesizer {
    async fn synthesize(
        &self,
        instructions: &str,
        ratio: AspectRatio,
        reference: Option<&ImagePayload>,
    ) -> Result<ImagePayload, RecomposeError> {
        let api_key = self
            .config
            .resolved_gemini_api_key()
            .ok_or_else(|| RecomposeError::Synthesis {
                detail: "no Gemini API key; set GEMINI_API_KEY or GOOGLE_API_KEY".into(),
            })?;

        let body = build_request(instructions, ratio, reference, &self.config.image_size);
        info!(
            "Synthesizing {} image with {} (reference: {})",
            ratio,
            self.config.synthesis_model,
            reference.is_some()
        );

        let response = self
            .http
            .post(self.endpoint())
            .query(&[("key", api_key.as_str())])
            .timeout(Duration::from_secs(self.config.api_timeout_secs))
            .json(&body)
            .send()
            .await
            .map_err(|e| RecomposeError::Synthesis {
                detail: if e.is_timeout() {
                    format!("timed out after {}s", self.config.api_timeout_secs)
                } else {
                    format!("request failed: {}", e.without_url())
                },
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read Gemini error body".to_string());
            return Err(map_http_error(status, &body_text));
        }

        let parsed: GenerateContentResponse =
            response.json().await.map_err(|e| RecomposeError::Synthesis {
                detail: format!("unreadable response: {e}"),
            })?;

        let image = extract_image(parsed)?;
        debug!("Synthesized {} ({} bytes)", image.mime_type, image.len());
        Ok(image)
    }
}

// ── Wire types ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Part {
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    Text {
        text: String,
    },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    #[serde(default, alias = "mime_type")]
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    pub image_config: ImageConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageConfig {
    pub aspect_ratio: String,
    pub image_size: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default, alias = "prompt_feedback")]
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<CandidateContent>,
    #[serde(default, alias = "finish_reason")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
pub struct ResponsePart {
    #[serde(default, rename = "inlineData", alias = "inline_data")]
    pub inline_data: Option<InlineData>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    #[serde(default, alias = "block_reason")]
    pub block_reason: Option<String>,
}

#[derive(Deserialize)]
struct ErrorWrapper {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    status: Option<String>,
}

// ── Request / response handling ──────────────────────────────────────────────

/// Build the request body. The reference image, when present, precedes the
/// text part.
pub fn build_request(
    instructions: &str,
    ratio: AspectRatio,
    reference: Option<&ImagePayload>,
    image_size: &str,
) -> GenerateContentRequest {
    let mut parts = Vec::with_capacity(2);
    if let Some(image) = reference {
        parts.push(Part::InlineData {
            inline_data: InlineData {
                mime_type: image.mime_type.clone(),
                data: STANDARD.encode(&image.bytes),
            },
        });
    }
    parts.push(Part::Text {
        text: instructions.to_string(),
    });

    GenerateContentRequest {
        contents: vec![Content {
            role: "user".to_string(),
            parts,
        }],
        generation_config: GenerationConfig {
            response_modalities: vec!["IMAGE".to_string()],
            image_config: ImageConfig {
                aspect_ratio: ratio.as_str().to_string(),
                image_size: image_size.to_string(),
            },
        },
    }
}

/// Take the first inline image from any candidate.
///
/// When there is none, the error carries whatever explanation the model gave
/// (block reason, finish reason, or a text refusal).
pub fn extract_image(response: GenerateContentResponse) -> Result<ImagePayload, RecomposeError> {
    let mut refusal: Option<String> = None;
    let mut finish: Option<String> = None;

    for candidate in response.candidates {
        if finish.is_none() {
            finish = candidate.finish_reason.clone();
        }
        let Some(content) = candidate.content else {
            continue;
        };
        for part in content.parts {
            if let Some(inline) = part.inline_data {
                let bytes = STANDARD
                    .decode(inline.data.trim())
                    .map_err(|e| RecomposeError::Synthesis {
                        detail: format!("image payload is not valid base64: {e}"),
                    })?;
                if bytes.is_empty() {
                    continue;
                }
                let mime_type = if inline.mime_type.is_empty() {
                    "image/png".to_string()
                } else {
                    inline.mime_type
                };
                return Ok(ImagePayload::new(bytes, mime_type));
            }
            if let Some(text) = part.text.filter(|t| !t.trim().is_empty()) {
                refusal.get_or_insert(text);
            }
        }
    }

    let detail = if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        format!("request blocked ({reason})")
    } else if let Some(text) = refusal {
        format!("model returned no image: {}", text.trim())
    } else if let Some(reason) = finish {
        format!("model returned no image (finish reason {reason})")
    } else {
        "model returned no image".to_string()
    };
    warn!("Synthesis produced no image: {}", detail);
    Err(RecomposeError::Synthesis { detail })
}

fn map_http_error(status: reqwest::StatusCode, body: &str) -> RecomposeError {
    let message = serde_json::from_str::<ErrorWrapper>(body)
        .map(|wrapper| {
            let status_text = wrapper.error.status.unwrap_or_default();
            let msg = wrapper.error.message.unwrap_or_else(|| body.to_string());
            if status_text.is_empty() {
                msg
            } else {
                format!("{status_text}: {msg}")
            }
        })
        .unwrap_or_else(|_| body.to_string());

    RecomposeError::Synthesis {
        detail: format!("HTTP {}: {}", status.as_u16(), message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn request_with_reference_puts_image_first() {
        let reference = ImagePayload::new(vec![1, 2, 3], "image/jpeg");
        let body = build_request("compose it", AspectRatio::Portrait9x16, Some(&reference), "1K");
        let v: Value = serde_json::to_value(&body).unwrap();

        let parts = &v["contents"][0]["parts"];
        assert_eq!(v["contents"][0]["role"], json!("user"));
        assert_eq!(parts[0]["inlineData"]["mimeType"], json!("image/jpeg"));
        assert_eq!(parts[0]["inlineData"]["data"], json!("AQID"));
        assert_eq!(parts[1]["text"], json!("compose it"));
        assert_eq!(v["generationConfig"]["responseModalities"], json!(["IMAGE"]));
        assert_eq!(v["generationConfig"]["imageConfig"]["aspectRatio"], json!("9:16"));
        assert_eq!(v["generationConfig"]["imageConfig"]["imageSize"], json!("1K"));
    }

    #[test]
    fn request_without_reference_is_text_only() {
        let body = build_request("a lighthouse", AspectRatio::Square, None, "2K");
        let v: Value = serde_json::to_value(&body).unwrap();
        let parts = v["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0]["text"], json!("a lighthouse"));
    }

    #[test]
    fn extracts_camel_case_inline_data() {
        let raw = json!({
            "candidates": [{
                "content": { "parts": [
                    { "text": "here you go" },
                    { "inlineData": { "mimeType": "image/png", "data": "iVBORw==" } }
                ]}
            }]
        });
        let resp: GenerateContentResponse = serde_json::from_value(raw).unwrap();
        let img = extract_image(resp).unwrap();
        assert_eq!(img.mime_type, "image/png");
        assert_eq!(img.bytes, STANDARD.decode("iVBORw==").unwrap());
    }

    #[test]
    fn extracts_snake_case_inline_data() {
        let raw = json!({
            "candidates": [{
                "content": { "parts": [
                    { "inline_data": { "mime_type": "image/jpeg", "data": "/9j/" } }
                ]}
            }]
        });
        let resp: GenerateContentResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(extract_image(resp).unwrap().mime_type, "image/jpeg");
    }

    #[test]
    fn text_only_reply_is_synthesis_error_with_reason() {
        let raw = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "I can't draw that." }] },
                "finishReason": "STOP"
            }]
        });
        let resp: GenerateContentResponse = serde_json::from_value(raw).unwrap();
        let err = extract_image(resp).unwrap_err();
        assert!(err.to_string().contains("I can't draw that."));
    }

    #[test]
    fn blocked_prompt_reports_block_reason() {
        let raw = json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        let resp: GenerateContentResponse = serde_json::from_value(raw).unwrap();
        let err = extract_image(resp).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn http_error_body_is_unwrapped() {
        let body = r#"{"error":{"code":400,"message":"API key not valid","status":"INVALID_ARGUMENT"}}"#;
        let err = map_http_error(reqwest::StatusCode::BAD_REQUEST, body);
        let msg = err.to_string();
        assert!(msg.contains("HTTP 400"));
        assert!(msg.contains("INVALID_ARGUMENT: API key not valid"));
    }

    #[tokio::test]
    async fn blank_key_fails_before_network() {
        let config = RecomposeConfig::builder()
            .gemini_api_key("   ")
            .gemini_api_base("http://127.0.0.1:9")
            .build()
            .unwrap();
        let synth = GeminiImageSynthesizer::new(config);
        let err = synth
            .synthesize("x", AspectRatio::Square, None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }
}
