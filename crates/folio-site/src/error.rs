//! Error types for the page model.
//!
//! Structural problems ([`TreeError`], plan construction) abort a build.
//! Everything a page accessor can return is a [`PageError`], which always
//! names the item it concerns so a failure can be attributed without
//! stopping the rest of the site.

use folio_config::ConfigError;
use folio_lazy::{ConstructionError, LazyError};
use folio_storage::StorageError;

use crate::format::TargetPaths;

/// Malformed content tree.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    /// The tree path is not well formed.
    #[error("Malformed tree path {path:?}: {reason}")]
    MalformedPath {
        /// Offending path.
        path: String,
        /// What is wrong with it.
        reason: &'static str,
    },
    /// Two records claim the same tree path.
    #[error("Duplicate tree path {0:?}")]
    DuplicatePath(String),
    /// The record cannot sit where its path puts it.
    #[error("Invalid tree shape at {path:?}: {reason}")]
    InvalidShape {
        /// Offending path.
        path: String,
        /// What is wrong with the placement.
        reason: &'static str,
    },
}

/// Pagination failure.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PaginationError {
    /// Requested page is outside `1..=total`.
    #[error("Page {page} out of range (1..={total})")]
    OutOfRange {
        /// Requested page number.
        page: usize,
        /// Total page count.
        total: usize,
    },
    /// Page size must be at least 1.
    #[error("Page size must be at least 1")]
    InvalidPageSize,
    /// Pagination was already initialised with different options.
    #[error("Pagination for {path} already initialised with different options")]
    OptionsConflict {
        /// Page whose pagination was requested twice.
        path: String,
    },
    /// Only branch nodes paginate.
    #[error("{path} is not a list page and cannot be paginated")]
    NotANode {
        /// Leaf page.
        path: String,
    },
    /// The variant is not rendered, so it has no pages to publish.
    #[error("{format} output of {path} is not rendered")]
    NotRendered {
        /// List page.
        path: String,
        /// Format of the variant.
        format: String,
    },
}

/// Requested output format is not registered.
///
/// Carries the item's fallback path and link data so callers can still
/// build links.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("Output format {requested:?} is not registered (page {path})")]
pub struct FormatMismatchError {
    /// Page the variant was requested for.
    pub path: String,
    /// Requested format name.
    pub requested: String,
    /// Path and link data of the page's first enabled format.
    pub fallback: TargetPaths,
}

/// Scratch store operation on incompatible values.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ScratchError {
    /// `add` on values that can't be combined.
    #[error("Cannot add {added} to {existing} at key {key:?}")]
    IncompatibleTypes {
        /// Scratch key.
        key: String,
        /// Type already stored.
        existing: &'static str,
        /// Type being added.
        added: &'static str,
    },
    /// `set_in_map` on a key holding something other than a map.
    #[error("Scratch key {0:?} does not hold a map")]
    NotAMap(String),
}

/// Error returned by page and variant accessors.
#[derive(Clone, Debug, thiserror::Error)]
pub enum PageError {
    /// A lazy field failed to resolve.
    #[error("{path} [{cell}]: {source}")]
    Resolution {
        /// Item path.
        path: String,
        /// Cell name.
        cell: String,
        /// Cached failure.
        #[source]
        source: LazyError,
    },
    /// Pagination failure.
    #[error(transparent)]
    Pagination(#[from] PaginationError),
    /// Unknown output format.
    #[error(transparent)]
    Format(#[from] FormatMismatchError),
    /// The site state the page belongs to has been dropped.
    #[error("{0}: site state is no longer available")]
    SiteDropped(String),
}

impl PageError {
    pub(crate) fn resolution(path: &str, cell: &str, source: LazyError) -> Self {
        Self::Resolution {
            path: path.to_owned(),
            cell: cell.to_owned(),
            source,
        }
    }

    /// Name of the failing cell, for resolution failures.
    #[must_use]
    pub fn cell(&self) -> Option<&str> {
        match self {
            Self::Resolution { cell, .. } => Some(cell),
            _ => None,
        }
    }

    /// Whether the error was caused by an aborted build.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        match self {
            Self::Resolution { source, .. } => source.is_aborted(),
            _ => false,
        }
    }
}

/// Fatal build error.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// Configuration problem.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Storage backend failure.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// Malformed content tree.
    #[error(transparent)]
    Tree(#[from] TreeError),
    /// Invalid lazy graph declaration.
    #[error(transparent)]
    Construction(#[from] ConstructionError),
    /// The build was aborted.
    #[error("Build aborted")]
    Aborted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_error_attributes_cell() {
        let err = PageError::resolution(
            "blog/a",
            "dates",
            LazyError::Aborted {
                cell: "dates".to_owned(),
            },
        );

        assert_eq!(err.cell(), Some("dates"));
        assert!(err.is_aborted());
        assert_eq!(
            err.to_string(),
            "blog/a [dates]: Build aborted before dates was resolved"
        );
    }

    #[test]
    fn test_pagination_error_display() {
        let err = PaginationError::OutOfRange { page: 0, total: 3 };

        assert_eq!(err.to_string(), "Page 0 out of range (1..=3)");
    }

    #[test]
    fn test_tree_error_display() {
        let err = TreeError::MalformedPath {
            path: "a//b".to_owned(),
            reason: "empty segment",
        };

        assert_eq!(
            err.to_string(),
            "Malformed tree path \"a//b\": empty segment"
        );
    }

    #[test]
    fn test_build_error_is_send_sync() {
        static_assertions::assert_impl_all!(BuildError: Send, Sync);
        static_assertions::assert_impl_all!(PageError: Send, Sync, Clone);
    }
}
