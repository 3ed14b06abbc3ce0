//! Mock storage implementation for testing.
//!
//! Provides [`MockStorage`] for unit testing without a real backend.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::front_matter::{FrontMatterError, parse_front_matter, split_front_matter};
use crate::record::{ContentBatch, ContentKind, ContentRecord};
use crate::storage::{Storage, StorageError};

/// Mock storage for testing.
///
/// Stores records in memory, grouped into batches. Use the builder methods
/// to configure the mock with test data; [`MockStorage::put`] replaces a
/// record in place to simulate an edit between builds.
///
/// Sources passed to the `with_page`/`with_section` builders may start with
/// YAML front matter. Malformed front matter is kept as-is and reported by
/// `scan()` and `load()`.
///
/// # Example
///
/// ```ignore
/// use folio_storage::{MockStorage, Storage};
///
/// let storage = MockStorage::new()
///     .with_section("blog", "---\ntitle: Blog\n---\n")
///     .with_page("blog/a", "---\ndate: 2024-01-01\n---\nHello.");
///
/// let batches = storage.scan().unwrap();
/// ```
#[derive(Debug, Default)]
pub struct MockStorage {
    batches: RwLock<Vec<Vec<Entry>>>,
}

#[derive(Clone, Debug)]
enum Entry {
    Record(ContentRecord),
    /// Source whose front matter doesn't decode; decoded again on every read.
    Invalid {
        path: String,
        kind: ContentKind,
        source: String,
    },
}

impl Entry {
    fn path(&self) -> &str {
        match self {
            Self::Record(record) => &record.path,
            Self::Invalid { path, .. } => path,
        }
    }

    fn resolve(&self) -> Result<ContentRecord, StorageError> {
        match self {
            Self::Record(record) => Ok(record.clone()),
            Self::Invalid { path, kind, source } => {
                decode(path.clone(), kind.clone(), source).map_err(|source| {
                    StorageError::FrontMatter {
                        path: path.clone(),
                        source,
                    }
                })
            }
        }
    }
}

fn decode(path: String, kind: ContentKind, source: &str) -> Result<ContentRecord, FrontMatterError> {
    let (yaml, body) = split_front_matter(source)?;
    let metadata = yaml.map(parse_front_matter).transpose()?.unwrap_or_default();
    Ok(ContentRecord::new(path, kind)
        .with_metadata(metadata)
        .with_body(body))
}

impl MockStorage {
    /// Create a new empty mock storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Vec<Entry>>> {
        self.batches.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Vec<Entry>>> {
        self.batches.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(self, entry: Entry) -> Self {
        {
            let mut batches = self.write();
            if batches.is_empty() {
                batches.push(Vec::new());
            }
            if let Some(batch) = batches.last_mut() {
                batch.push(entry);
            }
        }
        self
    }

    fn entry(path: String, kind: ContentKind, source: &str) -> Entry {
        match decode(path.clone(), kind.clone(), source) {
            Ok(record) => Entry::Record(record),
            Err(_) => Entry::Invalid {
                path,
                kind,
                source: source.to_owned(),
            },
        }
    }

    /// Add a leaf page from source text with optional front matter.
    #[must_use]
    pub fn with_page(self, path: impl Into<String>, source: &str) -> Self {
        let entry = Self::entry(path.into(), ContentKind::Leaf, source);
        self.push(entry)
    }

    /// Add a section (branch) page from source text with optional front matter.
    #[must_use]
    pub fn with_section(self, path: impl Into<String>, source: &str) -> Self {
        let entry = Self::entry(path.into(), ContentKind::Branch, source);
        self.push(entry)
    }

    /// Add a bundled resource.
    #[must_use]
    pub fn with_resource(self, path: impl Into<String>, media_type: impl Into<String>) -> Self {
        let kind = ContentKind::Resource {
            media_type: media_type.into(),
        };
        self.push(Entry::Record(ContentRecord::new(path, kind)))
    }

    /// Add a fully built record.
    #[must_use]
    pub fn with_record(self, record: ContentRecord) -> Self {
        self.push(Entry::Record(record))
    }

    /// Start a new batch; later records are scanned after earlier batches.
    #[must_use]
    pub fn with_batch(self) -> Self {
        self.write().push(Vec::new());
        self
    }

    /// Replace the record at `record.path`, or append it to the last batch.
    pub fn put(&self, record: ContentRecord) {
        let mut batches = self.write();
        for batch in batches.iter_mut() {
            if let Some(entry) = batch.iter_mut().find(|e| e.path() == record.path) {
                *entry = Entry::Record(record);
                return;
            }
        }
        if batches.is_empty() {
            batches.push(Vec::new());
        }
        if let Some(batch) = batches.last_mut() {
            batch.push(Entry::Record(record));
        }
    }

    /// Remove the record at `path`.
    pub fn remove(&self, path: &str) {
        for batch in self.write().iter_mut() {
            batch.retain(|e| e.path() != path);
        }
    }
}

impl Storage for MockStorage {
    fn scan(&self) -> Result<Vec<ContentBatch>, StorageError> {
        self.read()
            .iter()
            .map(|batch| {
                batch
                    .iter()
                    .map(Entry::resolve)
                    .collect::<Result<Vec<_>, _>>()
                    .map(ContentBatch::new)
            })
            .collect()
    }

    fn load(&self, path: &str) -> Result<ContentRecord, StorageError> {
        self.read()
            .iter()
            .flatten()
            .find(|e| e.path() == path)
            .ok_or_else(|| StorageError::NotFound {
                path: path.to_owned(),
            })?
            .resolve()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_mock_storage_new() {
        let storage = MockStorage::new();

        assert!(storage.scan().unwrap().is_empty());
    }

    #[test]
    fn test_with_page_decodes_front_matter() {
        let storage = MockStorage::new().with_page("blog/a", "---\ntitle: A\n---\nHello");

        let record = storage.load("blog/a").unwrap();

        assert_eq!(record.kind, ContentKind::Leaf);
        assert_eq!(record.metadata["title"], json!("A"));
        assert_eq!(record.body, "Hello");
    }

    #[test]
    fn test_batches_keep_order() {
        let storage = MockStorage::new()
            .with_section("", "")
            .with_section("blog", "")
            .with_batch()
            .with_page("blog/a", "")
            .with_resource("blog/a/cover.png", "image/png");

        let batches = storage.scan().unwrap();

        let paths: Vec<Vec<&str>> = batches
            .iter()
            .map(|b| b.records.iter().map(|r| r.path.as_str()).collect())
            .collect();
        assert_eq!(
            paths,
            vec![vec!["", "blog"], vec!["blog/a", "blog/a/cover.png"]]
        );
    }

    #[test]
    fn test_put_replaces_in_place() {
        let storage = MockStorage::new()
            .with_page("a", "one")
            .with_page("b", "two");

        storage.put(ContentRecord::new("a", ContentKind::Leaf).with_body("changed"));

        let batches = storage.scan().unwrap();
        assert_eq!(batches[0].records[0].body, "changed");
        assert_eq!(batches[0].records[1].path, "b");
    }

    #[test]
    fn test_put_appends_new_record() {
        let storage = MockStorage::new().with_page("a", "");

        storage.put(ContentRecord::new("c", ContentKind::Leaf));

        assert_eq!(storage.scan().unwrap()[0].records.len(), 2);
    }

    #[test]
    fn test_remove() {
        let storage = MockStorage::new().with_page("a", "").with_page("b", "");

        storage.remove("a");

        let err = storage.load("a").unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
        assert_eq!(err.to_string(), "No content record at \"a\"");
    }

    #[test]
    fn test_invalid_front_matter_reported_on_scan() {
        let storage = MockStorage::new().with_page("a", "---\ntitle: A\n");

        let err = storage.scan().unwrap_err();

        assert!(matches!(
            err,
            StorageError::FrontMatter {
                source: FrontMatterError::Unterminated,
                ..
            }
        ));
        assert_eq!(err.path(), Some("a"));
    }
}
