//! Output format registry and target path resolution.
//!
//! Every registered format renders an item into its own file. The
//! [`TargetPaths`] of an (item, format) pair say where that file goes and
//! how to link to it:
//!
//! | format | tree path | target path              | relative link      |
//! |--------|-----------|--------------------------|--------------------|
//! | html   | `blog/a`  | `/blog/a/index.html`     | `/blog/a/`         |
//! | amp    | `blog/a`  | `/amp/blog/a/index.html` | `/amp/blog/a/`     |
//! | rss    | `""`      | `/index.xml`             | `/index.xml`       |

use std::sync::Arc;

use folio_config::{Config, OutputFormatConfig};
use serde::Serialize;

/// Registered output format.
pub type OutputFormat = OutputFormatConfig;

/// Formats in registration order.
#[derive(Clone, Debug, Default)]
pub struct OutputFormats {
    formats: Vec<Arc<OutputFormat>>,
}

impl OutputFormats {
    /// Registry from resolved configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.formats_resolved.clone())
    }

    /// Registry from a list of formats, keeping their order.
    #[must_use]
    pub fn new(formats: Vec<OutputFormat>) -> Self {
        Self {
            formats: formats.into_iter().map(Arc::new).collect(),
        }
    }

    /// Look up a format by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<OutputFormat>> {
        self.formats.iter().find(|f| f.name == name)
    }

    /// Iterate formats in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<OutputFormat>> {
        self.formats.iter()
    }

    /// Number of registered formats.
    #[must_use]
    pub fn len(&self) -> usize {
        self.formats.len()
    }

    /// Whether no format is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }
}

/// Where one output variant is written and how it is linked.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub struct TargetPaths {
    /// Output file path, rooted at the publish directory (`/blog/a/index.html`).
    pub target_path: String,
    /// Directory bundled resources are published under (`/blog/a`).
    pub sub_resource_base: String,
    /// Site-relative link (`/blog/a/`).
    pub rel_permalink: String,
    /// Absolute link (`https://example.org/blog/a/`).
    pub permalink: String,
}

fn join_dir(parts: &[&str]) -> String {
    let mut dir = String::new();
    for segment in parts.iter().flat_map(|p| p.split('/')) {
        if !segment.is_empty() {
            dir.push('/');
            dir.push_str(segment);
        }
    }
    dir
}

fn absolute(base_url: &str, rel: &str) -> String {
    format!("{}{rel}", base_url.trim_end_matches('/'))
}

impl TargetPaths {
    /// Default paths of the item at `tree_path` for `format`.
    #[must_use]
    pub fn for_item(format: &OutputFormat, tree_path: &str, base_url: &str) -> Self {
        Self::in_dir(format, &join_dir(&[&format.path, tree_path]), base_url)
    }

    /// Paths of `format`'s file in directory `dir` (`""` or `/a/b`).
    #[must_use]
    pub fn in_dir(format: &OutputFormat, dir: &str, base_url: &str) -> Self {
        let target_path = format!("{dir}/{}.{}", format.base_name, format.suffix);
        let rel_permalink = if format.permalinkable {
            format!("{dir}/")
        } else {
            target_path.clone()
        };
        Self {
            permalink: absolute(base_url, &rel_permalink),
            target_path,
            sub_resource_base: dir.to_owned(),
            rel_permalink,
        }
    }

    /// Paths for an explicit target file (e.g., `about.html`).
    #[must_use]
    pub fn from_target(format: &OutputFormat, target: &str, base_url: &str) -> Self {
        let target_path = join_dir(&[target]);
        let (dir, file) = target_path.rsplit_once('/').unwrap_or(("", target_path.as_str()));
        let index_file = format!("{}.{}", format.base_name, format.suffix);
        let rel_permalink = if format.permalinkable && file == index_file {
            format!("{dir}/")
        } else {
            target_path.clone()
        };
        Self {
            permalink: absolute(base_url, &rel_permalink),
            sub_resource_base: dir.to_owned(),
            rel_permalink,
            target_path: target_path.clone(),
        }
    }

    /// Paths of page `number` (≥ 2) of a paginated list rooted here.
    #[must_use]
    pub fn paged(&self, format: &OutputFormat, segment: &str, number: usize, base_url: &str) -> Self {
        let dir = join_dir(&[&self.sub_resource_base, segment, &number.to_string()]);
        Self::in_dir(format, &dir, base_url)
    }
}
