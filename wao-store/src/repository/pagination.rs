//! Pagination, ordering and read options
//!
//! # Example
//!
//! ```rust
//! use wao_store::repository::{FindOptions, Page, Pagination};
//!
//! let options = FindOptions::new()
//!     .fields(["id", "name"])
//!     .sort("-created_at,name")
//!     .paginate(Pagination::page(2, 20));
//! assert_eq!(options.offset, Some(20));
//!
//! let page: Page<u32> = Page::new(vec![1, 2], 45, 20, 20);
//! assert_eq!(page.page, 2);
//! assert_eq!(page.total_pages, 3);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Direction for ordering results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDirection {
    #[default]
    Ascending,
    Descending,
}

impl OrderDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ascending => write!(f, "asc"),
            Self::Descending => write!(f, "desc"),
        }
    }
}

/// One `attribute direction` pair of a sort directive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub attribute: String,
    pub direction: OrderDirection,
}

/// Parse `"-created_at, name"` into sort keys.
///
/// A leading `-` means descending. Blank segments are skipped; whether an
/// attribute exists is decided later against the metadata cache.
pub fn parse_sort(sort: &str) -> Vec<SortKey> {
    sort.split(',')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(|segment| match segment.strip_prefix('-') {
            Some(attribute) => SortKey {
                attribute: attribute.trim().to_string(),
                direction: OrderDirection::Descending,
            },
            None => SortKey {
                attribute: segment.to_string(),
                direction: OrderDirection::Ascending,
            },
        })
        .collect()
}

/// Offset/limit window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// Number of results to skip
    pub offset: u64,
    /// Maximum number of results to return
    pub limit: u64,
}

impl Pagination {
    #[must_use]
    pub const fn new(offset: u64, limit: u64) -> Self {
        Self { offset, limit }
    }

    #[must_use]
    pub const fn first_page(limit: u64) -> Self {
        Self { offset: 0, limit }
    }

    /// Window for a 1-indexed page number
    #[must_use]
    pub const fn page(page_number: u64, page_size: u64) -> Self {
        let offset = page_number.saturating_sub(1).saturating_mul(page_size);
        Self {
            offset,
            limit: page_size,
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 20,
        }
    }
}

/// Projection, window and ordering for list reads
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindOptions {
    /// Attributes to select; empty selects every attribute
    pub fields: Vec<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    /// Comma-separated attributes, `-` prefix for descending
    pub sort: Option<String>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn fields<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    #[must_use]
    pub fn sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    #[must_use]
    pub fn paginate(mut self, pagination: Pagination) -> Self {
        self.limit = Some(pagination.limit);
        self.offset = Some(pagination.offset);
        self
    }

    /// The window as `(limit, offset)` with zero meaning "unset"
    pub fn window(&self) -> (u64, u64) {
        (self.limit.unwrap_or(0), self.offset.unwrap_or(0))
    }
}

impl From<Pagination> for FindOptions {
    fn from(pagination: Pagination) -> Self {
        FindOptions::new().paginate(pagination)
    }
}

/// One page of results plus the totals needed to render pagers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub total: u64,
    pub items: Vec<T>,
    pub limit: u64,
    /// 1-based page number
    pub page: u64,
    #[serde(rename = "total_page")]
    pub total_pages: u64,
}

impl<T> Page<T> {
    /// Derive page numbers from the window.
    ///
    /// With a positive limit, `page = offset / limit + 1` and
    /// `total_pages = ceil(total / limit)`; without one everything is a
    /// single page.
    pub fn new(items: Vec<T>, total: u64, limit: u64, offset: u64) -> Self {
        let (page, total_pages) = if limit > 0 {
            (offset / limit + 1, total.div_ceil(limit))
        } else {
            (1, 1)
        };
        Self {
            total,
            items,
            limit,
            page,
            total_pages,
        }
    }

    /// Transform items, keeping the totals
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            total: self.total,
            items: self.items.into_iter().map(f).collect(),
            limit: self.limit,
            page: self.page,
            total_pages: self.total_pages,
        }
    }
}
