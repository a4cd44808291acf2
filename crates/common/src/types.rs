//! Common data types shared across the channel manager workspace.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Pagination query parameters, used by list endpoints such as sync-log and
/// calendar-cell browsing.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaginationQuery {
    /// Page number (1-indexed)
    #[serde(default = "default_page")]
    pub page: i32,

    /// Items per page
    #[serde(default = "default_limit")]
    pub limit: i32,

    /// Sort field
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<String>,

    /// Sort direction
    #[serde(default)]
    pub sort_order: SortOrder,
}

fn default_page() -> i32 {
    1
}

fn default_limit() -> i32 {
    20
}

impl Default for PaginationQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 20,
            sort_by: None,
            sort_order: SortOrder::Asc,
        }
    }
}

impl PaginationQuery {
    pub fn offset(&self) -> i64 {
        ((self.page.max(1) - 1) * self.limit.clamp(1, 100)) as i64
    }

    pub fn limit(&self) -> i64 {
        self.limit.clamp(1, 100) as i64
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Pagination metadata.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaginationMeta {
    /// Current page number
    pub page: i32,

    /// Items per page
    pub limit: i32,

    /// Total number of items
    pub total_items: i64,

    /// Total number of pages
    pub total_pages: i32,

    /// Has next page
    pub has_next: bool,

    /// Has previous page
    pub has_previous: bool,
}

impl PaginationMeta {
    pub fn new(page: i32, limit: i32, total_items: i64) -> Self {
        let total_pages = ((total_items as f64) / (limit as f64)).ceil() as i32;
        Self {
            page,
            limit,
            total_items,
            total_pages,
            has_next: page < total_pages,
            has_previous: page > 1,
        }
    }
}

/// Paginated response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaginatedResponse<T> {
    /// Array of items
    pub data: Vec<T>,

    /// Pagination metadata
    pub pagination: PaginationMeta,
}

impl<T> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, page: i32, limit: i32, total_items: i64) -> Self {
        Self {
            data,
            pagination: PaginationMeta::new(page, limit, total_items),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_offset_clamps_limit() {
        let q = PaginationQuery {
            page: 3,
            limit: 500,
            sort_by: None,
            sort_order: SortOrder::Asc,
        };
        assert_eq!(q.limit(), 100);
        assert_eq!(q.offset(), 200);
    }

    #[test]
    fn pagination_meta_has_next() {
        let meta = PaginationMeta::new(1, 20, 45);
        assert_eq!(meta.total_pages, 3);
        assert!(meta.has_next);
        assert!(!meta.has_previous);
    }
}
