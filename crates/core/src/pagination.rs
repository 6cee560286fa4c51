//! Limit/offset pagination and sort direction shared by every listing.

use serde::{Deserialize, Serialize};

/// Pagination parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Maximum number of items to return.
    pub limit: u32,
    /// Offset for pagination (0-based).
    pub offset: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

impl Pagination {
    pub const MAX_LIMIT: u32 = 1000;

    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self {
            limit: limit.unwrap_or(50).clamp(1, Self::MAX_LIMIT),
            offset: offset.unwrap_or(0),
        }
    }

    /// 1-based page number of `size` items, as listing screens count pages.
    pub fn page(number: u32, size: u32) -> Self {
        let size = size.clamp(1, Self::MAX_LIMIT);
        Self {
            limit: size,
            offset: number.saturating_sub(1).saturating_mul(size),
        }
    }

    /// A single page holding all `len` items.
    pub fn whole(len: usize) -> Self {
        Self {
            limit: u32::try_from(len).unwrap_or(u32::MAX),
            offset: 0,
        }
    }

    /// Slice an already filtered and ordered result set.
    pub fn apply<T>(self, items: Vec<T>) -> Page<T> {
        let total = items.len() as u64;
        let items: Vec<T> = items
            .into_iter()
            .skip(self.offset as usize)
            .take(self.limit as usize)
            .collect();
        Page::new(items, total, self)
    }
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Number of items matching the query across all pages.
    pub total: u64,
    pub pagination: Pagination,
    pub has_more: bool,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64, pagination: Pagination) -> Self {
        let has_more = u64::from(pagination.offset) + (items.len() as u64) < total;
        Self {
            items,
            total,
            pagination,
            has_more,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            pagination: self.pagination,
            has_more: self.has_more,
        }
    }
}

/// Sort direction for listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    /// Orient an ascending comparison result.
    pub fn orient(self, ordering: core::cmp::Ordering) -> core::cmp::Ordering {
        match self {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

impl core::str::FromStr for SortDirection {
    type Err = crate::DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            other => Err(crate::DomainError::validation(format!(
                "sort direction must be asc or desc, got '{other}'"
            ))),
        }
    }
}
