//! Collection browsing API with filters and pagination
//!
//! GET /api/collection-data?page&limit&date&house_id

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{Local, TimeZone};
use d2d_common::db::{records, CollectionRecord, RecordFilter};
use d2d_common::time;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::pagination::{calculate_pagination, offset, Pagination, DEFAULT_LIMIT};
use crate::AppState;

/// Raw query parameters; parsed by the handler so that bad values take the
/// same error path as every other failure
#[derive(Debug, Default, Deserialize)]
pub struct CollectionQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    /// Calendar day `YYYY-MM-DD` in server-local time
    pub date: Option<String>,
    pub house_id: Option<String>,
}

/// One page of records
#[derive(Debug, Serialize)]
pub struct CollectionPage {
    pub data: Vec<CollectionRecord>,
    pub pagination: Pagination,
}

/// GET /api/collection-data
///
/// Newest records first. No upper bound is applied to `limit`.
pub async fn get_collection_data(
    State(state): State<AppState>,
    Query(query): Query<CollectionQuery>,
) -> ApiResult<Json<CollectionPage>> {
    let page = parse_positive("page", query.page.as_deref(), 1)?;
    let limit = parse_positive("limit", query.limit.as_deref(), DEFAULT_LIMIT)?;
    let filter = build_filter(&query, &Local)?;

    let total_count = records::count_records(&state.db, &filter).await?;
    let data = records::list_records(&state.db, &filter, limit, offset(page, limit)).await?;

    tracing::debug!(
        page,
        limit,
        total_count,
        returned = data.len(),
        "Collection page served"
    );

    Ok(Json(CollectionPage {
        data,
        pagination: calculate_pagination(total_count, page, limit),
    }))
}

/// Parse a 1-based integer parameter; absent or blank means `default`
///
/// Only the leading integer is read (`"20.5"` is 20, `"2x"` is 2), as a
/// browser's `parseInt` would.
pub fn parse_positive(name: &str, value: Option<&str>, default: i64) -> ApiResult<i64> {
    let Some(raw) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(default);
    };

    let parsed = leading_integer(raw)
        .ok_or_else(|| ApiError::BadRequest(format!("{} is not an integer: {}", name, raw)))?;

    if parsed < 1 {
        return Err(ApiError::BadRequest(format!("{} must be at least 1, got {}", name, parsed)));
    }

    Ok(parsed)
}

/// Optional sign followed by at least one digit; the rest is ignored
fn leading_integer(raw: &str) -> Option<i64> {
    let unsigned = raw.strip_prefix(['+', '-']).unwrap_or(raw);
    let sign_len = raw.len() - unsigned.len();
    let digits = unsigned.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    raw[..sign_len + digits].parse().ok()
}

/// Translate query parameters into a record filter for time zone `tz`
///
/// Blank `date` and `house_id` are treated as absent.
pub fn build_filter<Tz: TimeZone>(query: &CollectionQuery, tz: &Tz) -> ApiResult<RecordFilter> {
    let created_between = match query.date.as_deref().filter(|d| !d.trim().is_empty()) {
        Some(date) => {
            let day = time::parse_day(date)?;
            Some(time::day_bounds(day, tz)?)
        }
        None => None,
    };

    let house_id = query
        .house_id
        .as_ref()
        .filter(|h| !h.is_empty())
        .cloned();

    Ok(RecordFilter {
        created_between,
        house_id,
    })
}
