//! Offset pagination.
//!
//! `paginate(page, per_page)` issues one count query and one limited query
//! and returns a [`Page`]. Both `page` and `per_page` are floored at 1.
//!
//! ```rust
//! use quarry_query::pagination::{Page, PageRequest};
//!
//! let request = PageRequest::new(3, 10);
//! assert_eq!(request.offset(), 20);
//!
//! let page = Page::new(vec!["a", "b"], 22, request);
//! assert_eq!(page.last_page, 3);
//! assert!(!page.has_more());
//! ```

use serde::Serialize;

/// A normalised page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// 1-based page number.
    pub page: u64,
    /// Rows per page.
    pub per_page: u64,
}

impl PageRequest {
    /// Create a request, flooring both values at 1.
    pub fn new(page: u64, per_page: u64) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.max(1),
        }
    }

    /// Rows to skip.
    pub fn offset(&self) -> u64 {
        (self.page - 1).saturating_mul(self.per_page)
    }
}

/// One page of results with its metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    /// The rows on this page.
    pub data: Vec<T>,
    /// Total matching rows.
    pub total: u64,
    /// 1-based page number.
    pub page: u64,
    /// Rows per page.
    pub per_page: u64,
    /// `ceil(total / per_page)`; zero when there are no rows.
    pub last_page: u64,
}

impl<T> Page<T> {
    /// Assemble a page.
    pub fn new(data: Vec<T>, total: u64, request: PageRequest) -> Self {
        Self {
            data,
            total,
            page: request.page,
            per_page: request.per_page,
            last_page: total.div_ceil(request.per_page),
        }
    }

    /// Whether pages follow this one.
    pub fn has_more(&self) -> bool {
        self.page < self.last_page
    }

    /// Get the number of records on this page.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the page is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Convert every row, keeping the metadata.
    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> Page<U> {
        Page {
            data: self.data.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
            last_page: self.last_page,
        }
    }
}

impl<T> IntoIterator for Page<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.data.into_iter()
    }
}
