//! Image store adapter
//!
//! Uploads raw image bytes to the media host as a base64 data URI and returns
//! the permanent HTTPS URL. No retry and no local fallback: any failure is
//! returned to the caller.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use d2d_common::config::MediaHostConfig;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = concat!("door2door/", env!("CARGO_PKG_VERSION"));
const FALLBACK_MIME: &str = "application/octet-stream";

/// Media host errors
#[derive(Debug, Error)]
pub enum MediaStoreError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Destination for uploaded images
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Store an image and return its durable URL
    async fn store(&self, bytes: &[u8], content_type: &str) -> Result<String, MediaStoreError>;
}

/// Encode bytes as `data:<mime>;base64,<payload>`
pub fn to_data_uri(bytes: &[u8], content_type: &str) -> String {
    let mime = if content_type.trim().is_empty() {
        FALLBACK_MIME
    } else {
        content_type.trim()
    };
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

/// Upload signature: hex SHA-256 of sorted `key=value` pairs joined by `&`,
/// followed by the API secret
pub fn sign_params(params: &[(&str, &str)], api_secret: &str) -> String {
    let mut sorted: Vec<&(&str, &str)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let to_sign = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(to_sign.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: Option<String>,
}

/// Cloudinary-compatible signed upload client
pub struct CloudinaryStore {
    http_client: reqwest::Client,
    config: MediaHostConfig,
}

impl CloudinaryStore {
    pub fn new(config: MediaHostConfig, timeout: Duration) -> Result<Self, MediaStoreError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| MediaStoreError::NetworkError(e.to_string()))?;

        Ok(Self { http_client, config })
    }

    /// Upload endpoint with automatic resource-type detection
    pub fn upload_url(&self) -> String {
        format!(
            "{}/{}/auto/upload",
            self.config.upload_base_url.trim_end_matches('/'),
            self.config.cloud_name
        )
    }
}

#[async_trait]
impl MediaStore for CloudinaryStore {
    async fn store(&self, bytes: &[u8], content_type: &str) -> Result<String, MediaStoreError> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = sign_params(
            &[("folder", self.config.folder.as_str()), ("timestamp", timestamp.as_str())],
            &self.config.api_secret,
        );
        let file = to_data_uri(bytes, content_type);

        let form = [
            ("file", file.as_str()),
            ("folder", self.config.folder.as_str()),
            ("api_key", self.config.api_key.as_str()),
            ("timestamp", timestamp.as_str()),
            ("signature", signature.as_str()),
            ("signature_algorithm", "sha256"),
        ];

        tracing::debug!(
            size_bytes = bytes.len(),
            content_type = content_type,
            folder = %self.config.folder,
            "Uploading image to media host"
        );

        let response = self
            .http_client
            .post(self.upload_url())
            .form(&form)
            .send()
            .await
            .map_err(|e| MediaStoreError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(MediaStoreError::ApiError(status.as_u16(), error_text));
        }

        let upload: UploadResponse = response
            .json()
            .await
            .map_err(|e| MediaStoreError::ParseError(e.to_string()))?;

        let url = upload
            .secure_url
            .filter(|url| !url.is_empty())
            .ok_or_else(|| MediaStoreError::ParseError("Response has no secure_url".to_string()))?;

        tracing::info!(url = %url, "Image stored");
        Ok(url)
    }
}
