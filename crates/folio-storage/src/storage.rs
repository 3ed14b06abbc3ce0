//! Storage trait and error types.
//!
//! Provides the [`Storage`] trait that hands content records to the page
//! model, and [`StorageError`] for records that are missing or can't be
//! decoded.

use crate::front_matter::FrontMatterError;
use crate::record::{ContentBatch, ContentRecord};

/// Failure to hand content records to the page model.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No record exists at the tree path.
    #[error("No content record at {path:?}")]
    NotFound {
        /// Requested tree path.
        path: String,
    },
    /// The record's front matter could not be decoded.
    #[error("Invalid front matter in {path:?}: {source}")]
    FrontMatter {
        /// Tree path of the record.
        path: String,
        /// Decoding failure.
        #[source]
        source: FrontMatterError,
    },
    /// The backend itself failed (I/O, connection, archive).
    #[error("{backend} storage failed: {source}")]
    Backend {
        /// Backend identifier (e.g., "Mock").
        backend: &'static str,
        /// Backend error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl StorageError {
    /// Tree path the error concerns, if it concerns a single record.
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::NotFound { path } | Self::FrontMatter { path, .. } => Some(path),
            Self::Backend { .. } => None,
        }
    }
}

/// Content loading collaborator.
///
/// Backends decode their native format (files with front matter, database
/// rows, archives) into [`ContentRecord`]s. All paths are tree paths:
/// `""` for the root, `"blog"`, `"blog/a"`.
pub trait Storage: Send + Sync {
    /// Scan and return every record, in ordered batches.
    ///
    /// Records within a batch keep their order, and batches are applied in
    /// sequence. Tree insertion order (the navigation tie-break) follows it.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if scanning fails.
    fn scan(&self) -> Result<Vec<ContentBatch>, StorageError>;

    /// Load the current record for a single tree path.
    ///
    /// Used by incremental rebuilds after a change notification.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the record doesn't exist or can't be decoded.
    fn load(&self, path: &str) -> Result<ContentRecord, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_front_matter_error_names_record() {
        let err = StorageError::FrontMatter {
            path: "blog/a".to_owned(),
            source: FrontMatterError::Unterminated,
        };

        assert_eq!(err.path(), Some("blog/a"));
        assert_eq!(
            err.to_string(),
            "Invalid front matter in \"blog/a\": Unterminated front matter"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_backend_error_has_no_path() {
        let err = StorageError::Backend {
            backend: "Archive",
            source: "connection reset".into(),
        };

        assert_eq!(err.path(), None);
        assert_eq!(err.to_string(), "Archive storage failed: connection reset");
    }

    #[test]
    fn test_storage_error_is_send_sync() {
        static_assertions::assert_impl_all!(StorageError: Send, Sync);
    }
}
