//! Pagination helpers shared by every list query.
//!
//! Pages are zero-based to keep the `paging.currentPage` wire field compatible
//! with existing clients.

use serde::Serialize;

/// Pagination parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 0,
            per_page: 10,
        }
    }
}

impl Pagination {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page,
            per_page: per_page.clamp(1, 100),
        }
    }

    pub fn offset(&self) -> usize {
        self.page as usize * self.per_page as usize
    }

    pub fn limit(&self) -> usize {
        self.per_page as usize
    }

    /// Cut one page out of an already ordered result set
    pub fn apply<T>(&self, rows: Vec<T>) -> PagedResult<T> {
        let total = rows.len() as u64;
        let items = rows
            .into_iter()
            .skip(self.offset())
            .take(self.limit())
            .collect();
        PagedResult::new(items, total, self)
    }
}

/// Paged result containing items and metadata
#[derive(Debug, Clone, Serialize)]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}

impl<T> PagedResult<T> {
    pub fn new(items: Vec<T>, total: u64, pagination: &Pagination) -> Self {
        Self {
            items,
            total,
            page: pagination.page,
            per_page: pagination.per_page,
        }
    }

    pub fn has_next_page(&self) -> bool {
        (self.page as u64 + 1) * (self.per_page as u64) < self.total
    }

    pub fn map<U, F>(self, f: F) -> PagedResult<U>
    where
        F: FnMut(T) -> U,
    {
        PagedResult {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
        }
    }
}
