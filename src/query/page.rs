//! Pagination over a query source

use serde::Serialize;

use crate::core::error::{StoreError, StoreResult};
use crate::query::source::Query;

/// A subset of data returned from a query, with information about the
/// entire set.
///
/// Invariants: `last_page == ceil(total / per_page)` (0 when the set is
/// empty), `has_previous_page()` iff the current page is past the first,
/// `has_next_page()` iff the current page is before the last.
#[derive(Debug, Clone, Serialize)]
pub struct PaginatedSet<T> {
    /// Total number of items in the data source
    pub total: usize,

    /// Number of items per page
    pub per_page: usize,

    /// Current page number (starts at 1)
    pub current_page: usize,

    /// Last page number
    pub last_page: usize,

    /// The subset of items for the current page
    pub items: Vec<T>,
}

impl<T> PaginatedSet<T> {
    /// An empty set for the given page shape.
    pub fn empty(per_page: usize, current_page: usize) -> Self {
        Self {
            total: 0,
            per_page,
            current_page,
            last_page: 0,
            items: Vec::new(),
        }
    }

    /// Whether there are pages before the current page.
    pub fn has_previous_page(&self) -> bool {
        self.current_page > 1
    }

    /// Whether there are pages after the current page.
    pub fn has_next_page(&self) -> bool {
        self.current_page < self.last_page
    }
}

impl<T> Query<T> {
    /// Slice the query into a page descriptor.
    ///
    /// Counts first and short-circuits to an empty descriptor when nothing
    /// matches; otherwise skips `(current_page - 1) * per_page` rows and takes
    /// `per_page`. Fails with an out-of-range error if either argument is
    /// less than 1.
    pub fn into_paginated_set(
        self,
        current_page: usize,
        per_page: usize,
    ) -> StoreResult<PaginatedSet<T>> {
        if current_page < 1 {
            return Err(StoreError::out_of_range("current_page", "must be at least 1"));
        }

        if per_page < 1 {
            return Err(StoreError::out_of_range("per_page", "must be at least 1"));
        }

        let total = self.count();

        if total == 0 {
            return Ok(PaginatedSet::empty(per_page, current_page));
        }

        let items = self
            .skip_take((current_page - 1) * per_page, per_page)
            .into_vec();

        Ok(PaginatedSet {
            total,
            per_page,
            current_page,
            last_page: total.div_ceil(per_page),
            items,
        })
    }
}
