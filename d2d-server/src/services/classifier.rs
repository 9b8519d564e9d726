//! Hosted image classifiers
//!
//! A classifier is given the public URL of an already-stored image and
//! fetches it itself; the image bytes are never re-sent. Raw responses are
//! normalized into [`Prediction`] values here so nothing downstream handles
//! untyped JSON.

use async_trait::async_trait;
use d2d_common::config::ClassifierModel;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = concat!("door2door/", env!("CARGO_PKG_VERSION"));

/// Classifier errors
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// One detected class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    pub confidence: Option<f64>,
}

/// A model that labels the image behind a URL
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Name used in logs and per-model outcomes
    fn name(&self) -> &str;

    async fn classify(&self, image_url: &str) -> Result<Vec<Prediction>, ClassifierError>;
}

/// Extract predictions from a raw response body
///
/// Only a top-level `predictions` array is read. Entries without a non-empty
/// string `class` are skipped; a non-numeric `confidence` becomes `None`.
pub fn normalize_predictions(body: &Value) -> Vec<Prediction> {
    let Some(entries) = body.get("predictions").and_then(Value::as_array) else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| {
            let label = entry.get("class")?.as_str()?;
            if label.is_empty() {
                return None;
            }
            Some(Prediction {
                label: label.to_string(),
                confidence: entry.get("confidence").and_then(Value::as_f64),
            })
        })
        .collect()
}

/// Roboflow-style hosted inference endpoint for a single model
pub struct RoboflowClassifier {
    http_client: reqwest::Client,
    base_url: String,
    model: ClassifierModel,
}

impl RoboflowClassifier {
    pub fn new(base_url: &str, model: ClassifierModel, timeout: Duration) -> Result<Self, ClassifierError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| ClassifierError::NetworkError(e.to_string()))?;

        Ok(Self::with_client(http_client, base_url, model))
    }

    /// Build around an existing client so several models share one pool
    pub fn with_client(http_client: reqwest::Client, base_url: &str, model: ClassifierModel) -> Self {
        Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        }
    }

    /// `<base_url>/<model_id>/<version>`
    pub fn endpoint(&self) -> String {
        format!("{}/{}/{}", self.base_url, self.model.id, self.model.version)
    }
}

#[async_trait]
impl Classifier for RoboflowClassifier {
    fn name(&self) -> &str {
        &self.model.id
    }

    async fn classify(&self, image_url: &str) -> Result<Vec<Prediction>, ClassifierError> {
        let params = [("api_key", self.model.api_key.as_str()), ("image", image_url)];

        tracing::debug!(model = %self.model.id, "Querying classifier");

        let response = self
            .http_client
            .post(self.endpoint())
            .query(&params)
            .send()
            .await
            .map_err(|e| ClassifierError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ClassifierError::ApiError(status.as_u16(), error_text));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ClassifierError::ParseError(e.to_string()))?;

        Ok(normalize_predictions(&body))
    }
}
