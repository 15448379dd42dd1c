//! Offset pagination.

use serde::Serialize;

/// A resolved page request.
///
/// `page` is 1-based. Construct through [`PageRequest::resolve`] so that
/// missing or out-of-range values are normalized the same way everywhere,
/// which also keeps cache keys stable across equivalent query strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl PageRequest {
    pub const DEFAULT_PAGE: u32 = 1;
    pub const DEFAULT_PER_PAGE: u32 = 10;

    /// Normalizes raw query values.
    ///
    /// - missing or `< 1` page becomes page 1
    /// - missing or `< 1` per_page becomes `default_per_page`
    /// - per_page is capped at `max_per_page`
    #[must_use]
    pub fn resolve(
        page: Option<i64>,
        per_page: Option<i64>,
        default_per_page: u32,
        max_per_page: u32,
    ) -> Self {
        let page = page
            .filter(|p| *p >= 1)
            .map(|p| u32::try_from(p).unwrap_or(u32::MAX))
            .unwrap_or(Self::DEFAULT_PAGE);
        let per_page = per_page
            .filter(|p| *p >= 1)
            .map(|p| u32::try_from(p).unwrap_or(u32::MAX))
            .unwrap_or(default_per_page)
            .min(max_per_page)
            .max(1);
        Self { page, per_page }
    }

    /// Number of rows to skip.
    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.per_page)
    }

    #[must_use]
    pub fn limit(&self) -> u64 {
        u64::from(self.per_page)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: Self::DEFAULT_PAGE,
            per_page: Self::DEFAULT_PER_PAGE,
        }
    }
}

/// One page of results plus the totals needed to navigate the rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}

impl<T> Page<T> {
    #[must_use]
    pub fn new(items: Vec<T>, total: u64, request: PageRequest) -> Self {
        Self {
            items,
            total,
            page: request.page,
            per_page: request.per_page,
        }
    }

    /// Total number of pages; zero when there are no items at all.
    #[must_use]
    pub fn pages(&self) -> u64 {
        if self.per_page == 0 {
            return 0;
        }
        self.total.div_ceil(u64::from(self.per_page))
    }
}
