//! Vision gateway boundary and the OpenRouter-backed implementation.
//!
//! One gateway serves every model in the chain; the model id travels in the
//! request body, so fallback never needs a second client.

use crate::config::AnalysisConfig;
use crate::error::ApiError;
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Base64-encoded image ready to send to a vision API.
#[derive(Debug, Clone)]
pub struct ImageInput {
    /// Base64-encoded image bytes
    pub data: String,
    /// MIME type (e.g., "image/jpeg", "image/png")
    pub media_type: String,
}

impl ImageInput {
    /// Create an `ImageInput` from raw bytes and a format name.
    pub fn from_bytes(bytes: &[u8], format: &str) -> Self {
        let media_type = match format {
            "jpeg" | "jpg" => "image/jpeg",
            "png" => "image/png",
            "webp" => "image/webp",
            "gif" => "image/gif",
            "bmp" => "image/bmp",
            "tiff" => "image/tiff",
            other => {
                tracing::warn!("Unknown image format '{other}', defaulting to image/jpeg");
                "image/jpeg"
            }
        };

        Self {
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
            media_type: media_type.to_string(),
        }
    }

    /// Data URL form used by chat-completions style APIs.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.data)
    }
}

/// One model call: image plus analysis prompt.
#[derive(Debug, Clone)]
pub struct VisionRequest {
    pub model_id: String,
    pub image: ImageInput,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Raw text response from a vision model.
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    pub text: String,
    pub model: String,
    pub total_tokens: Option<u32>,
}

/// The outbound boundary to a multi-model vision API.
#[async_trait]
pub trait VisionGateway: Send + Sync {
    async fn analyze(&self, request: &VisionRequest) -> Result<GatewayResponse, ApiError>;
}

/// OpenRouter gateway using the chat completions API.
///
/// Sends the image as a data URL in the user message content array.
pub struct OpenRouterGateway {
    api_key: String,
    endpoint: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl OpenRouterGateway {
    pub fn new(config: &AnalysisConfig, api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            endpoint: config.endpoint.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
            client: reqwest::Client::new(),
        }
    }
}

// --- Request types ---

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: Vec<ChatContent>,
}

#[derive(Serialize)]
#[serde(tag = "type")]
enum ChatContent {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

// --- Response types ---

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    model: String,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    total_tokens: u32,
}

#[async_trait]
impl VisionGateway for OpenRouterGateway {
    async fn analyze(&self, request: &VisionRequest) -> Result<GatewayResponse, ApiError> {
        let body = ChatRequest {
            model: request.model_id.clone(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: vec![
                    ChatContent::ImageUrl {
                        image_url: ImageUrl {
                            url: request.image.data_url(),
                        },
                    },
                    ChatContent::Text {
                        text: request.prompt.clone(),
                    },
                ],
            }],
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ApiError::Timeout {
                        provider: "vision".to_string(),
                        timeout_ms: self.timeout.as_millis() as u64,
                    }
                } else {
                    ApiError::Network {
                        provider: "vision".to_string(),
                        message: e.to_string(),
                    }
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ApiError::Http {
                provider: "vision".to_string(),
                status: status.as_u16(),
                message: text,
            });
        }

        let chat_resp: ChatResponse = resp.json().await.map_err(|e| ApiError::InvalidResponse {
            provider: "vision".to_string(),
            message: format!("failed to parse response: {e}"),
        })?;

        let text = chat_resp
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| ApiError::InvalidResponse {
                provider: "vision".to_string(),
                message: "empty choices array".to_string(),
            })?;

        Ok(GatewayResponse {
            text: text.trim().to_string(),
            model: chat_resp.model,
            total_tokens: chat_resp.usage.map(|u| u.total_tokens),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_input_media_types() {
        let input = ImageInput::from_bytes(b"fake", "png");
        assert_eq!(input.media_type, "image/png");
        assert!(input.data_url().starts_with("data:image/png;base64,"));

        let unknown = ImageInput::from_bytes(b"fake", "xbm");
        assert_eq!(unknown.media_type, "image/jpeg");
    }

    #[test]
    fn test_chat_content_serialization() {
        let content = ChatContent::ImageUrl {
            image_url: ImageUrl {
                url: "data:image/png;base64,AAAA".to_string(),
            },
        };
        let json = serde_json::to_value(&content).unwrap();
        assert_eq!(json["type"], "image_url");
        assert_eq!(json["image_url"]["url"], "data:image/png;base64,AAAA");
    }
}
