//! Collection record persistence
//!
//! Records are insert-only: there is no update or delete path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::time;
use crate::Result;

/// One submission: a house id, one or two hosted images and their labels
///
/// Serialized with the field names the dashboard and API clients expect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionRecord {
    pub id: i64,
    pub house_id: String,
    #[serde(rename = "Image1")]
    pub image1: String,
    #[serde(rename = "Image2")]
    pub image2: Option<String>,
    #[serde(rename = "Image1_prediction")]
    pub image1_prediction: Vec<String>,
    #[serde(rename = "Image2_prediction")]
    pub image2_prediction: Option<Vec<String>>,
    #[serde(rename = "createdAt", serialize_with = "serialize_iso_millis")]
    pub created_at: DateTime<Utc>,
}

fn serialize_iso_millis<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&time::to_iso_millis(ts))
}

/// Fields supplied by the ingestion path
#[derive(Debug, Clone, PartialEq)]
pub struct NewCollectionRecord {
    pub house_id: String,
    pub image1: String,
    pub image1_prediction: Vec<String>,
    /// Second image URL and its labels, present together or not at all
    pub image2: Option<(String, Vec<String>)>,
}

/// Query filter; `None` fields don't constrain
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFilter {
    /// Half-open `[start, end)` range on `created_at`
    pub created_between: Option<(DateTime<Utc>, DateTime<Utc>)>,
    /// Exact match on `house_id`
    pub house_id: Option<String>,
}

const FILTER_CLAUSE: &str = r#"
    WHERE (?1 IS NULL OR created_at >= ?1)
      AND (?2 IS NULL OR created_at < ?2)
      AND (?3 IS NULL OR house_id = ?3)
"#;

impl RecordFilter {
    fn bounds_millis(&self) -> (Option<i64>, Option<i64>) {
        match self.created_between {
            Some((start, end)) => (Some(time::to_millis(start)), Some(time::to_millis(end))),
            None => (None, None),
        }
    }
}

/// Insert a record stamped with the current time
pub async fn insert_record(pool: &SqlitePool, record: &NewCollectionRecord) -> Result<CollectionRecord> {
    insert_record_at(pool, record, time::now()).await
}

/// Insert a record with an explicit creation time
pub async fn insert_record_at(
    pool: &SqlitePool,
    record: &NewCollectionRecord,
    created_at: DateTime<Utc>,
) -> Result<CollectionRecord> {
    let image1_prediction = serde_json::to_string(&record.image1_prediction)?;
    let (image2, image2_prediction) = match &record.image2 {
        Some((url, labels)) => (Some(url.clone()), Some(serde_json::to_string(labels)?)),
        None => (None, None),
    };

    let result = sqlx::query(
        r#"
        INSERT INTO collection_data (
            house_id, image1, image2, image1_prediction, image2_prediction, created_at
        ) VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&record.house_id)
    .bind(&record.image1)
    .bind(&image2)
    .bind(&image1_prediction)
    .bind(&image2_prediction)
    .bind(time::to_millis(created_at))
    .execute(pool)
    .await?;

    // Stored precision is milliseconds; return what a later read would see.
    let created_at = time::from_millis(time::to_millis(created_at))?;

    Ok(CollectionRecord {
        id: result.last_insert_rowid(),
        house_id: record.house_id.clone(),
        image1: record.image1.clone(),
        image2: record.image2.as_ref().map(|(url, _)| url.clone()),
        image1_prediction: record.image1_prediction.clone(),
        image2_prediction: record.image2.as_ref().map(|(_, labels)| labels.clone()),
        created_at,
    })
}

/// Load a record by id
pub async fn get_record(pool: &SqlitePool, id: i64) -> Result<Option<CollectionRecord>> {
    let row = sqlx::query(
        r#"
        SELECT id, house_id, image1, image2, image1_prediction, image2_prediction, created_at
        FROM collection_data
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(|row| record_from_row(&row)).transpose()
}

/// Count records matching a filter
pub async fn count_records(pool: &SqlitePool, filter: &RecordFilter) -> Result<i64> {
    let (start, end) = filter.bounds_millis();
    let sql = format!("SELECT COUNT(*) FROM collection_data {}", FILTER_CLAUSE);

    let count: i64 = sqlx::query_scalar(&sql)
        .bind(start)
        .bind(end)
        .bind(&filter.house_id)
        .fetch_one(pool)
        .await?;

    Ok(count)
}

/// Fetch one page of matching records, newest first
pub async fn list_records(
    pool: &SqlitePool,
    filter: &RecordFilter,
    limit: i64,
    offset: i64,
) -> Result<Vec<CollectionRecord>> {
    let (start, end) = filter.bounds_millis();
    let sql = format!(
        r#"
        SELECT id, house_id, image1, image2, image1_prediction, image2_prediction, created_at
        FROM collection_data
        {}
        ORDER BY created_at DESC, id DESC
        LIMIT ?4 OFFSET ?5
        "#,
        FILTER_CLAUSE
    );

    let rows = sqlx::query(&sql)
        .bind(start)
        .bind(end)
        .bind(&filter.house_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

    rows.iter().map(record_from_row).collect()
}

fn record_from_row(row: &SqliteRow) -> Result<CollectionRecord> {
    let image1_prediction: String = row.try_get("image1_prediction")?;
    let image2_prediction: Option<String> = row.try_get("image2_prediction")?;
    let created_at: i64 = row.try_get("created_at")?;

    Ok(CollectionRecord {
        id: row.try_get("id")?,
        house_id: row.try_get("house_id")?,
        image1: row.try_get("image1")?,
        image2: row.try_get("image2")?,
        image1_prediction: serde_json::from_str(&image1_prediction)?,
        image2_prediction: image2_prediction
            .map(|json| serde_json::from_str(&json))
            .transpose()?,
        created_at: time::from_millis(created_at)?,
    })
}
