#![allow(dead_code)]

use tracing::debug;

use super::{FacetQuery, Page, SoftDeleteCollection, StoreResult};
use crate::models::Document;
use crate::query::pagination::DEFAULT_MAX_PAGE_SIZE;
use crate::query::{Filter, Pagination, PaginationError, Sort};

/// Runs the count + page facet query against a soft-delete scoped collection.
///
/// Owns the page-size ceiling: every [`Pagination`] a service hands to [`find`](Self::find)
/// is built through [`page`](Self::page) or [`window`](Self::window).
#[derive(Debug, Clone, Copy)]
pub struct PaginatedAggregator {
    max_page_size: u64,
}

impl Default for PaginatedAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAGE_SIZE)
    }
}

impl PaginatedAggregator {
    pub fn new(max_page_size: u64) -> Self {
        Self {
            max_page_size: max_page_size.max(1),
        }
    }

    pub fn max_page_size(&self) -> u64 {
        self.max_page_size
    }

    pub fn window(&self, skip: u64, limit: u64) -> Result<Pagination, PaginationError> {
        Pagination::new(skip, limit, self.max_page_size)
    }

    pub fn page(&self, page: u64, size: u64) -> Result<Pagination, PaginationError> {
        Pagination::from_page(page, size, self.max_page_size)
    }

    /// `docs.len() <= limit`; a skip past the end yields no docs and the real total.
    pub async fn find(
        &self,
        source: &SoftDeleteCollection,
        filter: &Filter,
        pagination: Pagination,
        sort: &Sort,
    ) -> StoreResult<Page<Document>> {
        if filter.is_nothing() {
            debug!(collection = source.collection(), "match-nothing filter, skipping store");
            return Ok(Page::empty());
        }
        let query = FacetQuery {
            filter: filter.clone(),
            sort: sort.clone(),
            pagination,
        };
        let mut page = source.aggregate(&query).await?;
        page.docs.truncate(pagination.limit() as usize);
        Ok(page)
    }
}
