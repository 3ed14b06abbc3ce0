//! Content loading boundary for the folio page model.
//!
//! This crate provides a [`Storage`] trait that hands the page model ordered
//! batches of [`ContentRecord`]s: tree path, raw front matter, raw body, the
//! output formats enabled for the item and any per-format target path
//! overrides. Decoding files, watching directories and fetching git history
//! belong to storage backends; the page model only sees records.
//!
//! # Architecture
//!
//! The crate provides:
//! - [`Storage`] trait with `scan()` and `load()` methods
//! - [`ContentRecord`] / [`ContentBatch`] data types
//! - [`split_front_matter`] / [`parse_front_matter`] helpers for backends
//! - [`MockStorage`] for testing (behind `mock` feature flag)
//!
//! # Example
//!
//! ```ignore
//! use folio_storage::{MockStorage, Storage};
//!
//! let storage = MockStorage::new()
//!     .with_section("blog", "---\ntitle: Blog\n---\n")
//!     .with_page("blog/a", "---\ntitle: A\ndate: 2024-01-01\n---\nBody.");
//!
//! for batch in storage.scan()? {
//!     for record in batch.records {
//!         println!("{}: {:?}", record.path, record.kind);
//!     }
//! }
//! ```

mod front_matter;
#[cfg(feature = "mock")]
mod mock;
mod record;
mod storage;

pub use front_matter::{FrontMatterError, parse_front_matter, split_front_matter};
#[cfg(feature = "mock")]
pub use mock::MockStorage;
pub use record::{ContentBatch, ContentKind, ContentRecord, GitInfo, Metadata};
pub use storage::{Storage, StorageError};
