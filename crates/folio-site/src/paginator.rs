//! Pagination of list pages.
//!
//! A [`Paginator`] splits an ordered element list into pages of bounded size.
//! Page 1 lives at the list page's own path; page N ≥ 2 appends
//! `/<segment>/N/` (`/blog/page/2/`). Out-of-range page numbers are errors,
//! never clamped.

use std::sync::Arc;

use crate::error::PaginationError;
use crate::format::{OutputFormat, TargetPaths};

/// Where the pages of a paginator are published.
#[derive(Clone, Debug)]
pub struct PagerPaths {
    /// Format of the paginated variant.
    pub format: Arc<OutputFormat>,
    /// Paths of page 1 (the list page itself).
    pub first: TargetPaths,
    /// Path segment before the page number.
    pub segment: String,
    /// Site base URL for absolute links.
    pub base_url: String,
}

impl PagerPaths {
    fn for_page(&self, number: usize) -> TargetPaths {
        if number == 1 {
            self.first.clone()
        } else {
            self.first
                .paged(&self.format, &self.segment, number, &self.base_url)
        }
    }
}

/// Ordered elements split into fixed-size pages.
#[derive(Clone, Debug)]
pub struct Paginator<T> {
    elements: Vec<T>,
    page_size: usize,
    total_pages: usize,
    paths: PagerPaths,
}

/// One page of a [`Paginator`].
#[derive(Clone, Debug)]
pub struct Pager<T> {
    /// 1-based page number.
    pub number: usize,
    /// Total number of pages.
    pub total_pages: usize,
    /// Elements on this page.
    pub elements: Vec<T>,
    /// Where this page is published.
    pub paths: TargetPaths,
}

impl<T> Pager<T> {
    /// Whether a previous page exists.
    #[must_use]
    pub fn has_prev(&self) -> bool {
        self.number > 1
    }

    /// Whether a next page exists.
    #[must_use]
    pub fn has_next(&self) -> bool {
        self.number < self.total_pages
    }
}

impl<T: Clone> Paginator<T> {
    /// Split `elements` into pages of `page_size`.
    ///
    /// An empty list still has one (empty) page so the list page itself is
    /// addressable.
    ///
    /// # Errors
    ///
    /// Returns [`PaginationError::InvalidPageSize`] if `page_size` is 0.
    pub fn new(elements: Vec<T>, page_size: usize, paths: PagerPaths) -> Result<Self, PaginationError> {
        if page_size == 0 {
            return Err(PaginationError::InvalidPageSize);
        }
        let total_pages = elements.len().div_ceil(page_size).max(1);
        Ok(Self {
            elements,
            page_size,
            total_pages,
            paths,
        })
    }

    /// Number of pages.
    #[must_use]
    pub fn total_pages(&self) -> usize {
        self.total_pages
    }

    /// Configured page size.
    #[must_use]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Every paginated element, in order.
    #[must_use]
    pub fn elements(&self) -> &[T] {
        &self.elements
    }

    /// Page `number` (1-based).
    ///
    /// # Errors
    ///
    /// Returns [`PaginationError::OutOfRange`] unless `1 <= number <= total_pages`.
    pub fn page(&self, number: usize) -> Result<Pager<T>, PaginationError> {
        if number == 0 || number > self.total_pages {
            return Err(PaginationError::OutOfRange {
                page: number,
                total: self.total_pages,
            });
        }
        let start = ((number - 1) * self.page_size).min(self.elements.len());
        let end = (number * self.page_size).min(self.elements.len());
        Ok(Pager {
            number,
            total_pages: self.total_pages,
            elements: self.elements[start..end].to_vec(),
            paths: self.paths.for_page(number),
        })
    }

    /// Every page in order.
    pub fn pages(&self) -> impl Iterator<Item = Pager<T>> + '_ {
        (1..=self.total_pages).filter_map(|n| self.page(n).ok())
    }

    /// Same pagination over mapped elements.
    pub fn map<U, F: FnMut(&T) -> U>(&self, f: F) -> Paginator<U> {
        Paginator {
            elements: self.elements.iter().map(f).collect(),
            page_size: self.page_size,
            total_pages: self.total_pages,
            paths: self.paths.clone(),
        }
    }
}
