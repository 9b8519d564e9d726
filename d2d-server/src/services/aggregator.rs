//! Classifier fan-out and label aggregation
//!
//! All configured classifiers run concurrently against the same image URL.
//! Each branch settles on its own: a failed model is logged and dropped, it
//! never cancels or fails the others.
//!
//! `aggregate` keeps only the distinct class names (first-seen order: model
//! order, then prediction order). Confidence and per-model provenance are
//! available from `classify_all` but are not part of the stored label list.

use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use super::classifier::{Classifier, Prediction};

/// Aggregation errors
#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("No image URL provided")]
    MissingImageUrl,
}

/// Settled result of one classifier branch
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifierOutcome {
    Succeeded {
        model: String,
        predictions: Vec<Prediction>,
    },
    Failed {
        model: String,
        error: String,
    },
}

impl ClassifierOutcome {
    pub fn model(&self) -> &str {
        match self {
            ClassifierOutcome::Succeeded { model, .. } | ClassifierOutcome::Failed { model, .. } => model,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ClassifierOutcome::Succeeded { .. })
    }
}

/// Runs every classifier and merges their labels
pub struct LabelAggregator {
    classifiers: Vec<Arc<dyn Classifier>>,
}

impl LabelAggregator {
    pub fn new(classifiers: Vec<Arc<dyn Classifier>>) -> Self {
        Self { classifiers }
    }

    /// Number of configured classifiers
    pub fn count(&self) -> usize {
        self.classifiers.len()
    }

    /// Run all classifiers concurrently and wait for every one to settle
    ///
    /// Outcomes are returned in classifier order.
    pub async fn classify_all(&self, image_url: &str) -> Result<Vec<ClassifierOutcome>, AggregateError> {
        if image_url.trim().is_empty() {
            return Err(AggregateError::MissingImageUrl);
        }

        let branches = self.classifiers.iter().map(|classifier| {
            let classifier = Arc::clone(classifier);
            async move {
                let model = classifier.name().to_string();
                match classifier.classify(image_url).await {
                    Ok(predictions) => {
                        debug!(model = %model, predictions = predictions.len(), "Classifier succeeded");
                        ClassifierOutcome::Succeeded { model, predictions }
                    }
                    Err(e) => {
                        warn!(model = %model, error = %e, "Classifier failed; excluded from labels");
                        ClassifierOutcome::Failed {
                            model,
                            error: e.to_string(),
                        }
                    }
                }
            }
        });

        Ok(join_all(branches).await)
    }

    /// Distinct class labels across all successful classifiers
    ///
    /// Empty when no classifier succeeded or none found anything.
    pub async fn aggregate(&self, image_url: &str) -> Result<Vec<String>, AggregateError> {
        let outcomes = self.classify_all(image_url).await?;
        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        let labels = merge_labels(&outcomes);

        debug!(
            classifiers = outcomes.len(),
            succeeded,
            labels = labels.len(),
            "Classification aggregated"
        );

        Ok(labels)
    }
}

/// Union of labels from successful outcomes, deduplicated, first-seen order
pub fn merge_labels(outcomes: &[ClassifierOutcome]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut labels = Vec::new();

    for outcome in outcomes {
        if let ClassifierOutcome::Succeeded { predictions, .. } = outcome {
            for prediction in predictions {
                if seen.insert(prediction.label.as_str()) {
                    labels.push(prediction.label.clone());
                }
            }
        }
    }

    labels
}

// ============================================================================
// Test classifiers
// ============================================================================
