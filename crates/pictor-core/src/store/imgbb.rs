//! ImgBB image host.
//!
//! Uploads are form-encoded: the API key travels as a form field and the
//! image as base64. Success is signaled in the JSON body, not only via the
//! HTTP status.

use super::{HostedImage, ImageHost};
use crate::config::HostingConfig;
use crate::error::ApiError;
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use std::time::Duration;

pub struct ImgbbHost {
    api_key: String,
    endpoint: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl ImgbbHost {
    pub fn new(config: &HostingConfig, api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            endpoint: config.endpoint.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Deserialize)]
struct UploadResponse {
    success: bool,
    data: Option<UploadData>,
}

#[derive(Deserialize)]
struct UploadData {
    url: String,
    #[serde(default)]
    delete_url: Option<String>,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    thumb: Option<ThumbData>,
}

#[derive(Deserialize)]
struct ThumbData {
    url: String,
}

#[async_trait]
impl ImageHost for ImgbbHost {
    async fn upload(
        &self,
        candidate_id: &str,
        bytes: &[u8],
        name: &str,
    ) -> Result<HostedImage, ApiError> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        let form = [
            ("key", self.api_key.as_str()),
            ("image", encoded.as_str()),
            ("name", name),
        ];

        let resp = self
            .client
            .post(&self.endpoint)
            .form(&form)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ApiError::Timeout {
                        provider: "hosting".to_string(),
                        timeout_ms: self.timeout.as_millis() as u64,
                    }
                } else {
                    ApiError::Network {
                        provider: "hosting".to_string(),
                        message: e.to_string(),
                    }
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ApiError::Http {
                provider: "hosting".to_string(),
                status: status.as_u16(),
                message: text,
            });
        }

        let upload: UploadResponse = resp.json().await.map_err(|e| ApiError::InvalidResponse {
            provider: "hosting".to_string(),
            message: format!("failed to parse upload response: {e}"),
        })?;

        let data = match (upload.success, upload.data) {
            (true, Some(data)) => data,
            _ => {
                return Err(ApiError::InvalidResponse {
                    provider: "hosting".to_string(),
                    message: "upload response reported failure".to_string(),
                })
            }
        };

        Ok(HostedImage {
            candidate_id: candidate_id.to_string(),
            public_url: data.url,
            thumbnail_url: data.thumb.map(|t| t.url),
            delete_handle: data.delete_url,
            size_bytes: data.size.unwrap_or(bytes.len() as u64),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_response_parsing() {
        let raw = r#"{
            "success": true,
            "data": {
                "url": "https://i.ibb.co/abc/img.jpg",
                "delete_url": "https://ibb.co/abc/del",
                "size": 12345,
                "thumb": {"url": "https://i.ibb.co/abc/thumb.jpg"}
            }
        }"#;
        let parsed: UploadResponse = serde_json::from_str(raw).unwrap();
        assert!(parsed.success);
        let data = parsed.data.unwrap();
        assert_eq!(data.url, "https://i.ibb.co/abc/img.jpg");
        assert_eq!(data.thumb.unwrap().url, "https://i.ibb.co/abc/thumb.jpg");
    }

    #[test]
    fn test_failure_body_parses() {
        let raw = r#"{"success": false}"#;
        let parsed: UploadResponse = serde_json::from_str(raw).unwrap();
        assert!(!parsed.success);
        assert!(parsed.data.is_none());
    }
}
