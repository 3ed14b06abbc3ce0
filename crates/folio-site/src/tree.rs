//! Content tree.
//!
//! Nodes are stored in a flat `Vec` with parent/children relationships
//! tracked by indices, so items never hold pointers to each other. A
//! [`TreeRef`] is an item's read-only handle into the tree; every structural
//! query goes through the tree by index.
//!
//! # Synthetic nodes
//!
//! A path like `docs/guide/intro` implies branch nodes `docs` and
//! `docs/guide` even without content records for them. Those nodes exist in
//! the tree with `has_content == false`, so consumers must not assume every
//! node corresponds to a page.
//!
//! # Buckets
//!
//! A branch node's bucket groups its direct regular (leaf) pages. Resources
//! are attached to the nearest content-bearing page above them.

use std::collections::HashMap;

use folio_storage::{ContentKind, ContentRecord};

use crate::error::TreeError;

/// Structural kind of a tree node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Section node that may own children.
    Branch,
    /// Terminal content item.
    Leaf,
}

/// Non-page file bundled with a page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resource {
    /// Tree path of the file (e.g., `blog/a/cover.png`).
    pub path: String,
    /// Path relative to the owning page (e.g., `cover.png`).
    pub name: String,
    /// Media type.
    pub media_type: String,
}

#[derive(Debug)]
struct TreeNode {
    path: String,
    kind: NodeKind,
    has_content: bool,
    parent: Option<usize>,
    children: Vec<usize>,
    ordinal: usize,
    resources: Vec<Resource>,
}

/// Hierarchical content tree with O(1) path lookups.
#[derive(Debug)]
pub struct ContentTree {
    nodes: Vec<TreeNode>,
    path_index: HashMap<String, usize>,
}

/// An item's position in the tree.
///
/// Cheap to copy. Only meaningful for the tree that produced it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TreeRef {
    index: usize,
}

impl TreeRef {
    /// Insertion position of the node (tree order).
    #[must_use]
    pub fn index(self) -> usize {
        self.index
    }
}

/// Validate a tree path.
fn validate_path(path: &str) -> Result<(), TreeError> {
    let malformed = |reason| TreeError::MalformedPath {
        path: path.to_owned(),
        reason,
    };
    if path.is_empty() {
        return Ok(());
    }
    if path.starts_with('/') || path.ends_with('/') {
        return Err(malformed("leading or trailing slash"));
    }
    if path.contains('\\') {
        return Err(malformed("backslash"));
    }
    for segment in path.split('/') {
        match segment {
            "" => return Err(malformed("empty segment")),
            "." | ".." => return Err(malformed("relative segment")),
            _ => {}
        }
    }
    Ok(())
}

fn parent_path(path: &str) -> Option<&str> {
    if path.is_empty() {
        return None;
    }
    Some(path.rsplit_once('/').map_or("", |(parent, _)| parent))
}

/// Builder for [`ContentTree`].
#[derive(Debug)]
pub struct TreeBuilder {
    nodes: Vec<TreeNode>,
    path_index: HashMap<String, usize>,
    resources: Vec<(String, String)>,
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeBuilder {
    /// Create a builder holding only the (synthetic) root.
    #[must_use]
    pub fn new() -> Self {
        let mut builder = Self {
            nodes: Vec::new(),
            path_index: HashMap::new(),
            resources: Vec::new(),
        };
        builder.push_node(String::new(), NodeKind::Branch, false, None);
        builder
    }

    fn push_node(
        &mut self,
        path: String,
        kind: NodeKind,
        has_content: bool,
        parent: Option<usize>,
    ) -> usize {
        let index = self.nodes.len();
        let ordinal = parent.map_or(0, |p| {
            let siblings = &mut self.nodes[p].children;
            siblings.push(index);
            siblings.len() - 1
        });
        self.path_index.insert(path.clone(), index);
        self.nodes.push(TreeNode {
            path,
            kind,
            has_content,
            parent,
            children: Vec::new(),
            ordinal,
            resources: Vec::new(),
        });
        index
    }

    /// Index of the branch node at `path`, creating synthetic ancestors.
    fn ensure_branch(&mut self, path: &str, origin: &str) -> Result<usize, TreeError> {
        if let Some(&index) = self.path_index.get(path) {
            if self.nodes[index].kind == NodeKind::Leaf {
                return Err(TreeError::InvalidShape {
                    path: origin.to_owned(),
                    reason: "nested under a leaf page",
                });
            }
            return Ok(index);
        }
        let parent = match parent_path(path) {
            Some(parent) => Some(self.ensure_branch(parent, origin)?),
            None => None,
        };
        Ok(self.push_node(path.to_owned(), NodeKind::Branch, false, parent))
    }

    /// Add a record.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError`] for malformed paths, duplicate paths, and pages
    /// placed under leaf pages.
    pub fn add(&mut self, record: &ContentRecord) -> Result<(), TreeError> {
        let path = record.path.as_str();
        validate_path(path)?;

        let kind = match &record.kind {
            ContentKind::Resource { media_type } => {
                if path.is_empty() {
                    return Err(TreeError::InvalidShape {
                        path: String::new(),
                        reason: "resource at the root path",
                    });
                }
                self.resources.push((path.to_owned(), media_type.clone()));
                return Ok(());
            }
            ContentKind::Branch => NodeKind::Branch,
            ContentKind::Leaf => NodeKind::Leaf,
        };

        if let Some(&index) = self.path_index.get(path) {
            let node = &mut self.nodes[index];
            if node.has_content {
                return Err(TreeError::DuplicatePath(path.to_owned()));
            }
            if kind == NodeKind::Leaf {
                return Err(TreeError::InvalidShape {
                    path: path.to_owned(),
                    reason: if index == 0 {
                        "the root must be a branch"
                    } else {
                        "leaf page at a path that has children"
                    },
                });
            }
            node.has_content = true;
            return Ok(());
        }

        let parent = match parent_path(path) {
            Some(parent) => Some(self.ensure_branch(parent, path)?),
            None => None,
        };
        self.push_node(path.to_owned(), kind, true, parent);
        Ok(())
    }

    /// Finish the tree, attaching resources to their owning pages.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::DuplicatePath`] if a resource shares a page's path.
    pub fn build(mut self) -> Result<ContentTree, TreeError> {
        for (path, media_type) in std::mem::take(&mut self.resources) {
            if self.path_index.contains_key(&path) {
                return Err(TreeError::DuplicatePath(path));
            }
            let mut owner = parent_path(&path);
            let index = loop {
                match owner {
                    Some(candidate) => match self.path_index.get(candidate) {
                        Some(&i) if self.nodes[i].has_content => break i,
                        _ => owner = parent_path(candidate),
                    },
                    None => break 0,
                }
            };
            let owner_path = &self.nodes[index].path;
            let name = if owner_path.is_empty() {
                path.clone()
            } else {
                path[owner_path.len() + 1..].to_owned()
            };
            self.nodes[index].resources.push(Resource {
                path,
                name,
                media_type,
            });
        }

        Ok(ContentTree {
            nodes: self.nodes,
            path_index: self.path_index,
        })
    }
}

impl ContentTree {
    /// Build a tree from records in load order.
    ///
    /// # Errors
    ///
    /// Returns the first [`TreeError`] encountered.
    pub fn from_records<'a>(
        records: impl IntoIterator<Item = &'a ContentRecord>,
    ) -> Result<Self, TreeError> {
        let mut builder = TreeBuilder::new();
        for record in records {
            builder.add(record)?;
        }
        builder.build()
    }

    /// Number of nodes, synthetic ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree holds only the root.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Reference to the node at `path`.
    #[must_use]
    pub fn lookup(&self, path: &str) -> Option<TreeRef> {
        self.path_index.get(path).map(|&index| TreeRef { index })
    }

    /// The root node.
    #[must_use]
    pub fn root(&self) -> TreeRef {
        TreeRef { index: 0 }
    }

    /// Every node in tree order.
    pub fn iter(&self) -> impl Iterator<Item = TreeRef> + '_ {
        (0..self.nodes.len()).map(|index| TreeRef { index })
    }

    /// Tree path of a node.
    #[must_use]
    pub fn path(&self, node: TreeRef) -> &str {
        &self.nodes[node.index].path
    }

    /// Structural kind of a node.
    #[must_use]
    pub fn kind(&self, node: TreeRef) -> NodeKind {
        self.nodes[node.index].kind
    }

    /// Whether a content record backs the node.
    #[must_use]
    pub fn has_content(&self, node: TreeRef) -> bool {
        self.nodes[node.index].has_content
    }

    /// Position among the parent's children.
    #[must_use]
    pub fn ordinal(&self, node: TreeRef) -> usize {
        self.nodes[node.index].ordinal
    }

    /// Resources bundled with the node.
    #[must_use]
    pub fn resources(&self, node: TreeRef) -> &[Resource] {
        &self.nodes[node.index].resources
    }

    /// Parent node (`None` for the root).
    #[must_use]
    pub fn parent(&self, node: TreeRef) -> Option<TreeRef> {
        self.nodes[node.index].parent.map(|index| TreeRef { index })
    }

    /// Ancestors, nearest first.
    #[must_use]
    pub fn ancestors(&self, node: TreeRef) -> Vec<TreeRef> {
        std::iter::successors(self.parent(node), |&n| self.parent(n)).collect()
    }

    /// Direct children in insertion order.
    #[must_use]
    pub fn children(&self, node: TreeRef) -> Vec<TreeRef> {
        self.nodes[node.index]
            .children
            .iter()
            .map(|&index| TreeRef { index })
            .collect()
    }

    /// Other children of the node's parent.
    #[must_use]
    pub fn siblings(&self, node: TreeRef) -> Vec<TreeRef> {
        self.parent(node).map_or_else(Vec::new, |parent| {
            self.children(parent)
                .into_iter()
                .filter(|&n| n != node)
                .collect()
        })
    }

    /// Whether `ancestor` is a strict ancestor of `node`.
    #[must_use]
    pub fn is_ancestor(&self, ancestor: TreeRef, node: TreeRef) -> bool {
        std::iter::successors(self.parent(node), |&n| self.parent(n)).any(|n| n == ancestor)
    }

    /// The section a node belongs to: itself for branches, the parent for leaves.
    #[must_use]
    pub fn section(&self, node: TreeRef) -> TreeRef {
        match self.kind(node) {
            NodeKind::Branch => node,
            NodeKind::Leaf => self.parent(node).unwrap_or_else(|| self.root()),
        }
    }

    /// Top-level section containing the node (the root for the root).
    #[must_use]
    pub fn first_section(&self, node: TreeRef) -> TreeRef {
        let mut current = self.section(node);
        while let Some(parent) = self.parent(current) {
            if parent == self.root() {
                return current;
            }
            current = parent;
        }
        current
    }

    /// The bucket of a branch: its direct leaf children.
    #[must_use]
    pub fn bucket(&self, node: TreeRef) -> Vec<TreeRef> {
        self.children(node)
            .into_iter()
            .filter(|&n| self.kind(n) == NodeKind::Leaf)
            .collect()
    }

    /// Every leaf below the node, in tree order.
    #[must_use]
    pub fn leaf_descendants(&self, node: TreeRef) -> Vec<TreeRef> {
        let mut leaves = Vec::new();
        let mut stack = self.children(node);
        stack.reverse();
        while let Some(current) = stack.pop() {
            match self.kind(current) {
                NodeKind::Leaf => leaves.push(current),
                NodeKind::Branch => {
                    let mut children = self.children(current);
                    children.reverse();
                    stack.extend(children);
                }
            }
        }
        leaves
    }
}
