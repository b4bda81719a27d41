#![allow(dead_code)]

use serde::Serialize;
use thiserror::Error;

/// Upper bound on a single page, bounding memory per request.
pub const DEFAULT_MAX_PAGE_SIZE: u64 = 1000;

pub const DEFAULT_PAGE_SIZE: u64 = 100;

/// Largest offset a window carries. Anything past it is past the end of every
/// collection, and it still fits a signed 64-bit SQL `OFFSET`.
pub const MAX_SKIP: u64 = i64::MAX as u64;

#[derive(Debug, Error, PartialEq)]
pub enum PaginationError {
    #[error("limit must be positive")]
    ZeroLimit,
    #[error("limit {limit} exceeds the maximum page size of {max}")]
    LimitTooLarge { limit: u64, max: u64 },
    #[error("page numbers start at 1")]
    ZeroPage,
}

/// A validated `skip`/`limit` window: `1 <= limit <= max`, `skip <= MAX_SKIP`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    skip: u64,
    limit: u64,
}

impl Pagination {
    pub fn new(skip: u64, limit: u64, max_page_size: u64) -> Result<Self, PaginationError> {
        if limit == 0 {
            return Err(PaginationError::ZeroLimit);
        }
        if limit > max_page_size {
            return Err(PaginationError::LimitTooLarge {
                limit,
                max: max_page_size,
            });
        }
        Ok(Self {
            skip: skip.min(MAX_SKIP),
            limit,
        })
    }

    /// 1-based page of `size` records, the shape list endpoints accept.
    pub fn from_page(page: u64, size: u64, max_page_size: u64) -> Result<Self, PaginationError> {
        if page == 0 {
            return Err(PaginationError::ZeroPage);
        }
        let skip = (page - 1).saturating_mul(size);
        Self::new(skip, size, max_page_size)
    }

    pub fn skip(&self) -> u64 {
        self.skip
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_zero_limit() {
        assert_eq!(Pagination::new(0, 0, 10), Err(PaginationError::ZeroLimit));
    }

    #[test]
    fn test_rejects_oversized_limit() {
        assert_eq!(
            Pagination::new(0, 1001, DEFAULT_MAX_PAGE_SIZE),
            Err(PaginationError::LimitTooLarge {
                limit: 1001,
                max: 1000
            })
        );
        assert!(Pagination::new(0, 1000, DEFAULT_MAX_PAGE_SIZE).is_ok());
    }

    #[test]
    fn test_from_page() {
        let p = Pagination::from_page(3, 20, DEFAULT_MAX_PAGE_SIZE).unwrap();
        assert_eq!((p.skip(), p.limit()), (40, 20));
        assert_eq!(
            Pagination::from_page(0, 20, DEFAULT_MAX_PAGE_SIZE),
            Err(PaginationError::ZeroPage)
        );
    }

    #[test]
    fn test_huge_page_is_clamped() {
        let p = Pagination::from_page(100_000_000_000_000_000, 100, DEFAULT_MAX_PAGE_SIZE).unwrap();
        assert_eq!(p.skip(), MAX_SKIP);
        assert!(i64::try_from(p.skip()).is_ok());
        assert_eq!(Pagination::new(u64::MAX, 10, 10).unwrap().skip(), MAX_SKIP);
    }
}
