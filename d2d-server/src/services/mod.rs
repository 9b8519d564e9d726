//! Upstream clients and the submission pipeline

pub mod aggregator;
pub mod classifier;
pub mod ingest;
pub mod media_store;

pub use aggregator::{ClassifierOutcome, LabelAggregator};
pub use classifier::{Classifier, Prediction, RoboflowClassifier};
pub use ingest::{Ingestor, Submission};
pub use media_store::{CloudinaryStore, MediaStore};

use d2d_common::config::ClassifierConfig;
use std::sync::Arc;
use std::time::Duration;

use classifier::ClassifierError;

/// One classifier per configured model, sharing a single HTTP client
pub fn build_classifiers(config: &ClassifierConfig) -> Result<Vec<Arc<dyn Classifier>>, ClassifierError> {
    let http_client = reqwest::Client::builder()
        .user_agent(concat!("door2door/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| ClassifierError::NetworkError(e.to_string()))?;

    Ok(config
        .models
        .iter()
        .map(|model| {
            Arc::new(RoboflowClassifier::with_client(
                http_client.clone(),
                &config.base_url,
                model.clone(),
            )) as Arc<dyn Classifier>
        })
        .collect())
}
