//! Pagination support for catalog list queries.

use serde::{Deserialize, Serialize};

/// Default page size for list queries
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Maximum allowed page size to prevent OOM and slow queries
pub const MAX_PAGE_SIZE: u32 = 100;

/// Minimum page number (1-indexed)
pub const MIN_PAGE: u32 = 1;

/// Pagination parameters for list queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageParams {
    /// Page number (1-indexed)
    pub page: u32,
    /// Number of items per page
    pub items_per_page: u32,
}

impl PageParams {
    /// Create pagination parameters, defaulting and clamping out-of-range
    /// values instead of rejecting them.
    #[must_use]
    pub fn new(page: Option<u32>, items_per_page: Option<u32>) -> Self {
        let page = page.unwrap_or(MIN_PAGE).max(MIN_PAGE);
        let items_per_page = items_per_page
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);

        Self {
            page,
            items_per_page,
        }
    }

    /// OFFSET for the SQL query
    #[must_use]
    pub const fn offset(&self) -> i64 {
        ((self.page - 1) * self.items_per_page) as i64
    }

    /// LIMIT for the SQL query
    #[must_use]
    pub const fn limit(&self) -> i64 {
        self.items_per_page as i64
    }
}

impl Default for PageParams {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// Pagination metadata returned alongside a page of items
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMeta {
    pub page: u32,
    pub total_pages: u32,
    pub total_items: u64,
    pub items_per_page: u32,
    pub has_next: bool,
    pub has_prev: bool,
}

/// One page of items with its metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: PageMeta,
}

impl<T> Page<T> {
    #[must_use]
    pub fn new(items: Vec<T>, total: u64, params: PageParams) -> Self {
        let total_pages = if params.items_per_page == 0 {
            0
        } else {
            total.div_ceil(u64::from(params.items_per_page)) as u32
        };

        Self {
            items,
            pagination: PageMeta {
                page: params.page,
                total_pages,
                total_items: total,
                items_per_page: params.items_per_page,
                has_next: params.page < total_pages,
                has_prev: params.page > 1,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_default_and_clamp() {
        let params = PageParams::new(None, None);
        assert_eq!(params.page, 1);
        assert_eq!(params.items_per_page, DEFAULT_PAGE_SIZE);

        let params = PageParams::new(Some(0), Some(500));
        assert_eq!(params.page, 1);
        assert_eq!(params.items_per_page, MAX_PAGE_SIZE);

        let params = PageParams::new(Some(3), Some(0));
        assert_eq!(params.page, 3);
        assert_eq!(params.items_per_page, 1);
    }

    #[test]
    fn offset_calculation() {
        assert_eq!(PageParams::new(Some(1), Some(20)).offset(), 0);
        assert_eq!(PageParams::new(Some(2), Some(20)).offset(), 20);
        assert_eq!(PageParams::new(Some(5), Some(50)).offset(), 200);
    }

    #[test]
    fn page_metadata() {
        let params = PageParams::new(Some(1), Some(20));
        let page = Page::new(vec![1, 2, 3], 101, params);
        assert_eq!(page.pagination.total_pages, 6);
        assert!(page.pagination.has_next);
        assert!(!page.pagination.has_prev);

        let params = PageParams::new(Some(6), Some(20));
        let page = Page::new(vec![1], 101, params);
        assert!(!page.pagination.has_next);
        assert!(page.pagination.has_prev);
    }

    #[test]
    fn empty_result_has_zero_pages() {
        let page: Page<i32> = Page::new(vec![], 0, PageParams::default());
        assert_eq!(page.pagination.total_pages, 0);
        assert!(!page.pagination.has_next);
    }
}
