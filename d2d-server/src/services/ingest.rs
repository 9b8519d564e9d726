//! Submission ingestion
//!
//! Steps run strictly in sequence: store image 1, classify image 1, store
//! image 2, classify image 2, insert the record. The first failure aborts the
//! rest. Images already uploaded at that point stay on the media host; they
//! are logged but not removed, and no record refers to them.

use axum::body::Bytes;
use d2d_common::db::{records, CollectionRecord, NewCollectionRecord};
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use super::aggregator::{AggregateError, LabelAggregator};
use super::media_store::{MediaStore, MediaStoreError};

/// Ingestion errors, one per step that can fail
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Image upload failed: {0}")]
    Upload(#[from] MediaStoreError),

    #[error("Classification failed: {0}")]
    Classification(#[from] AggregateError),

    #[error("Saving record failed: {0}")]
    Persist(#[from] d2d_common::Error),
}

/// An uploaded image file as received from the form
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub bytes: Bytes,
    pub content_type: String,
    pub file_name: Option<String>,
}

/// A validated form submission
#[derive(Debug, Clone)]
pub struct Submission {
    pub house_id: String,
    pub image1: ImageUpload,
    pub image2: Option<ImageUpload>,
}

/// Hosted URL of a stored image and its aggregated labels
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedImage {
    pub url: String,
    pub labels: Vec<String>,
}

/// Runs submissions through the media host, the classifiers and the database
pub struct Ingestor {
    media_store: Arc<dyn MediaStore>,
    aggregator: Arc<LabelAggregator>,
}

impl Ingestor {
    pub fn new(media_store: Arc<dyn MediaStore>, aggregator: Arc<LabelAggregator>) -> Self {
        Self {
            media_store,
            aggregator,
        }
    }

    pub fn classifier_count(&self) -> usize {
        self.aggregator.count()
    }

    /// Store one image, then classify it by URL
    ///
    /// On classification failure the stored URL is returned in the log only.
    pub async fn process_image(&self, image: &ImageUpload) -> Result<ProcessedImage, IngestError> {
        info!(
            file_name = image.file_name.as_deref().unwrap_or(""),
            content_type = %image.content_type,
            size_bytes = image.bytes.len(),
            "Image received"
        );

        let url = self.media_store.store(&image.bytes, &image.content_type).await?;

        let labels = match self.aggregator.aggregate(&url).await {
            Ok(labels) => labels,
            Err(e) => {
                warn!(orphaned_url = %url, "Classification aborted after upload; image left on media host");
                return Err(e.into());
            }
        };

        Ok(ProcessedImage { url, labels })
    }

    /// Process both images and persist one record
    pub async fn ingest(&self, db: &SqlitePool, submission: &Submission) -> Result<CollectionRecord, IngestError> {
        let first = self.process_image(&submission.image1).await?;

        let second = match &submission.image2 {
            Some(image) => match self.process_image(image).await {
                Ok(processed) => Some(processed),
                Err(e) => {
                    warn!(orphaned_url = %first.url, "Second image failed; first image left on media host");
                    return Err(e);
                }
            },
            None => None,
        };

        let new_record = NewCollectionRecord {
            house_id: submission.house_id.clone(),
            image1: first.url,
            image1_prediction: first.labels,
            image2: second.map(|p| (p.url, p.labels)),
        };

        match records::insert_record(db, &new_record).await {
            Ok(record) => {
                info!(
                    id = record.id,
                    house_id = %record.house_id,
                    images = if record.image2.is_some() { 2 } else { 1 },
                    "Submission saved"
                );
                Ok(record)
            }
            Err(e) => {
                let mut orphaned = vec![new_record.image1.as_str()];
                if let Some((url, _)) = &new_record.image2 {
                    orphaned.push(url.as_str());
                }
                warn!(
                    orphaned_urls = ?orphaned,
                    "Record insert failed after upload; images left on media host"
                );
                Err(e.into())
            }
        }
    }
}
