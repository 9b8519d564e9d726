//! Pagination utilities
//!
//! Pages are 1-indexed and not clamped: asking past the last page returns an
//! empty page with `hasPrevPage = true`.

use serde::Serialize;

/// Default page size when `limit` is not given
pub const DEFAULT_LIMIT: i64 = 20;

/// Pagination metadata returned alongside a page of records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    /// Current page number (1-indexed)
    pub page: i64,
    /// Page size
    pub limit: i64,
    /// Rows matching the filter across all pages
    pub total_count: i64,
    /// Total number of pages
    pub total_pages: i64,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}

/// Row offset for SQL LIMIT/OFFSET
///
/// Callers guarantee `page >= 1` and `limit >= 1`.
pub fn offset(page: i64, limit: i64) -> i64 {
    (page - 1).saturating_mul(limit)
}

/// Calculate pagination metadata from the total count and the requested page
///
/// # Examples
/// ```
/// use d2d_server::pagination::calculate_pagination;
///
/// // 45 rows at 20 per page = 3 pages (20 + 20 + 5)
/// let p = calculate_pagination(45, 3, 20);
/// assert_eq!(p.total_pages, 3);
/// assert!(!p.has_next_page);
/// assert!(p.has_prev_page);
/// ```
pub fn calculate_pagination(total_count: i64, page: i64, limit: i64) -> Pagination {
    let total_pages = if limit > 0 {
        total_count / limit + i64::from(total_count % limit != 0)
    } else {
        0
    };

    Pagination {
        page,
        limit,
        total_count,
        total_pages,
        has_next_page: page < total_pages,
        has_prev_page: page > 1,
    }
}
