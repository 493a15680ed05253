//! Page/limit pagination shared by list endpoints.

use serde::{Deserialize, Serialize};

/// Default page size when none is requested.
pub const DEFAULT_LIMIT: u32 = 12;

/// Largest page size a client may request.
pub const MAX_LIMIT: u32 = 100;

/// A 1-based page request, clamped to sane bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PageRequest {
    page: u32,
    limit: u32,
}

impl PageRequest {
    /// Build a request from optional query values.
    ///
    /// Missing or zero pages become page 1; limits are clamped to
    /// `1..=MAX_LIMIT` with `DEFAULT_LIMIT` when absent.
    #[must_use]
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            page: page.filter(|p| *p > 0).unwrap_or(1),
            limit: limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
        }
    }

    #[must_use]
    pub const fn page(&self) -> u32 {
        self.page
    }

    #[must_use]
    pub const fn limit(&self) -> u32 {
        self.limit
    }

    /// Row offset for SQL `OFFSET`.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.limit as u64
    }

    /// Number of pages needed for `total` items (at least 1).
    #[must_use]
    pub const fn pages(&self, total: u64) -> u64 {
        let pages = total.div_ceil(self.limit as u64);
        if pages == 0 { 1 } else { pages }
    }

    /// Slice an already-sorted, fully loaded collection to this page.
    #[must_use]
    pub fn slice<T>(&self, items: Vec<T>) -> Paged<T> {
        let total = items.len() as u64;
        let offset = usize::try_from(self.offset()).unwrap_or(usize::MAX);
        let limit = self.limit as usize;
        let items = items.into_iter().skip(offset).take(limit).collect();
        self.wrap(items, total)
    }

    /// Wrap one page of items fetched with `LIMIT`/`OFFSET`.
    #[must_use]
    pub fn wrap<T>(&self, items: Vec<T>, total: u64) -> Paged<T> {
        Paged {
            items,
            page: self.page,
            pages: self.pages(total),
            total,
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub pages: u64,
    pub total: u64,
}
