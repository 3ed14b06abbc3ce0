//! Content records handed to the page model.
//!
//! # Path Convention
//!
//! The `path` field contains tree paths, not file paths:
//! - `""` - root (home page)
//! - `"blog"` - section
//! - `"blog/a"` - page inside a section
//! - `"blog/a/cover.png"` - resource bundled with `blog/a`

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Raw front matter, decoded into JSON values.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// What a record represents in the content tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ContentKind {
    /// Section node that may own child pages (`_index` files).
    Branch,
    /// Terminal content item (a regular page, possibly a bundle).
    Leaf,
    /// Non-page file bundled with the nearest page above it.
    Resource {
        /// Media type of the file (e.g., "image/png").
        media_type: String,
    },
}

impl ContentKind {
    /// Whether the record becomes a page (branch or leaf).
    #[must_use]
    pub fn is_page(&self) -> bool {
        !matches!(self, Self::Resource { .. })
    }
}

/// Version control attribution for a content file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitInfo {
    /// Abbreviated commit hash.
    pub hash: String,
    /// Author name.
    pub author: String,
    /// Commit date as written by the backend (RFC 3339).
    pub date: String,
    /// First line of the commit message.
    pub subject: String,
}

/// One content item as produced by a storage backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
    /// Tree path (e.g., "", "blog", "blog/a").
    pub path: String,
    /// Branch, leaf or resource.
    #[serde(flatten)]
    pub kind: ContentKind,
    /// Decoded front matter.
    #[serde(default)]
    pub metadata: Metadata,
    /// Raw body (markup source, without front matter).
    #[serde(default)]
    pub body: String,
    /// Output formats enabled for this item (`None` = site defaults for its kind).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Vec<String>>,
    /// Target path overrides keyed by format name (e.g., `"html" -> "about.html"`).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub target_paths: BTreeMap<String, String>,
    /// Content language (`None` = site default language).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    /// Last commit touching the file, if the backend tracks history.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git: Option<GitInfo>,
    /// Owners from a CODEOWNERS file, if any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub codeowners: Vec<String>,
}

impl ContentRecord {
    /// Create a record with empty metadata and body.
    #[must_use]
    pub fn new(path: impl Into<String>, kind: ContentKind) -> Self {
        Self {
            path: path.into(),
            kind,
            metadata: Metadata::new(),
            body: String::new(),
            outputs: None,
            target_paths: BTreeMap::new(),
            lang: None,
            git: None,
            codeowners: Vec::new(),
        }
    }

    /// Set the decoded front matter.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Set the raw body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Restrict the item to the given output formats.
    #[must_use]
    pub fn with_outputs<I, S>(mut self, outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.outputs = Some(outputs.into_iter().map(Into::into).collect());
        self
    }

    /// Override the target path for one format.
    #[must_use]
    pub fn with_target_path(mut self, format: impl Into<String>, path: impl Into<String>) -> Self {
        self.target_paths.insert(format.into(), path.into());
        self
    }

    /// Set the content language.
    #[must_use]
    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = Some(lang.into());
        self
    }

    /// Attach git attribution.
    #[must_use]
    pub fn with_git(mut self, git: GitInfo) -> Self {
        self.git = Some(git);
        self
    }

    /// Attach code owners.
    #[must_use]
    pub fn with_codeowners<I, S>(mut self, owners: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.codeowners = owners.into_iter().map(Into::into).collect();
        self
    }

    /// Front matter string field, if present.
    #[must_use]
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(serde_json::Value::as_str)
    }

    /// Last path segment (`""` for the root).
    #[must_use]
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or_default()
    }
}

/// Ordered group of records loaded together.
///
/// Batches are applied in order and records within a batch keep their order;
/// tree insertion order follows this sequence.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContentBatch {
    /// Records in load order.
    pub records: Vec<ContentRecord>,
}

impl ContentBatch {
    /// Create a batch from records.
    #[must_use]
    pub fn new(records: Vec<ContentRecord>) -> Self {
        Self { records }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_record_builder() {
        let record = ContentRecord::new("blog/a", ContentKind::Leaf)
            .with_body("Hello")
            .with_outputs(["html", "amp"])
            .with_target_path("html", "blog/a.html")
            .with_lang("fr")
            .with_codeowners(["@docs"]);

        assert_eq!(record.name(), "a");
        assert_eq!(record.body, "Hello");
        assert_eq!(
            record.outputs,
            Some(vec!["html".to_owned(), "amp".to_owned()])
        );
        assert_eq!(record.target_paths["html"], "blog/a.html");
        assert_eq!(record.lang.as_deref(), Some("fr"));
        assert_eq!(record.codeowners, vec!["@docs".to_owned()]);
    }

    #[test]
    fn test_root_name_is_empty() {
        let record = ContentRecord::new("", ContentKind::Branch);

        assert_eq!(record.name(), "");
    }

    #[test]
    fn test_meta_str() {
        let mut metadata = Metadata::new();
        metadata.insert("title".to_owned(), "Hello".into());
        metadata.insert("weight".to_owned(), 3.into());
        let record = ContentRecord::new("a", ContentKind::Leaf).with_metadata(metadata);

        assert_eq!(record.meta_str("title"), Some("Hello"));
        assert_eq!(record.meta_str("weight"), None);
        assert_eq!(record.meta_str("missing"), None);
    }

    #[test]
    fn test_resource_is_not_page() {
        assert!(ContentKind::Branch.is_page());
        assert!(ContentKind::Leaf.is_page());
        assert!(
            !ContentKind::Resource {
                media_type: "image/png".to_owned()
            }
            .is_page()
        );
    }

    #[test]
    fn test_record_deserializes_from_json() {
        let record: ContentRecord = serde_json::from_str(
            r#"{
                "path": "blog/a/cover.png",
                "kind": "resource",
                "media_type": "image/png"
            }"#,
        )
        .unwrap();

        assert_eq!(
            record.kind,
            ContentKind::Resource {
                media_type: "image/png".to_owned()
            }
        );
        assert!(record.metadata.is_empty());
        assert!(record.outputs.is_none());
    }
}
