//! Submission API
//!
//! POST /api/submitCleaningData (multipart: house_id, image1, image2)

use axum::{
    extract::{multipart::Field, Multipart, State},
    Json,
};
use d2d_common::db::CollectionRecord;
use serde::Serialize;

use crate::error::{ApiError, ApiResult};
use crate::services::ingest::{ImageUpload, Submission};
use crate::AppState;

/// Success response
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub message: String,
    pub data: CollectionRecord,
}

/// POST /api/submitCleaningData
///
/// Uploads and classifies each image in turn, then stores one record.
pub async fn submit_cleaning_data(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<SubmitResponse>> {
    let submission = read_submission(multipart).await?;

    tracing::info!(
        house_id = %submission.house_id,
        images = if submission.image2.is_some() { 2 } else { 1 },
        "Submission received"
    );

    let record = state.ingestor.ingest(&state.db, &submission).await?;

    Ok(Json(SubmitResponse {
        message: "Data saved successfully".to_string(),
        data: record,
    }))
}

/// Collect the known form fields; unknown fields are skipped
///
/// `house_id` is kept verbatim. An `image2` part without bytes (an empty
/// file input) counts as absent.
pub async fn read_submission(mut multipart: Multipart) -> ApiResult<Submission> {
    let mut house_id = None;
    let mut image1 = None;
    let mut image2 = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "house_id" => house_id = Some(field.text().await?),
            "image1" => image1 = Some(read_image(field).await?),
            "image2" => image2 = Some(read_image(field).await?),
            other => tracing::debug!(field = other, "Ignoring unknown form field"),
        }
    }

    let house_id = house_id.ok_or_else(|| ApiError::BadRequest("house_id is required".to_string()))?;
    let image1 = image1
        .filter(|image| !image.bytes.is_empty())
        .ok_or_else(|| ApiError::BadRequest("image1 is required".to_string()))?;
    let image2 = image2.filter(|image| !image.bytes.is_empty());

    Ok(Submission {
        house_id,
        image1,
        image2,
    })
}

async fn read_image(field: Field<'_>) -> ApiResult<ImageUpload> {
    let content_type = field.content_type().unwrap_or_default().to_string();
    let file_name = field.file_name().map(str::to_string);
    let bytes = field.bytes().await?;

    Ok(ImageUpload {
        bytes,
        content_type,
        file_name,
    })
}
