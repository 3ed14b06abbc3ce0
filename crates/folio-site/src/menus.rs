//! Site menus.
//!
//! Menus come from two places: `[[menus.<name>]]` tables in `folio.toml` and
//! a `menus` (or `menu`) front matter key on pages. The front matter value may
//! be a menu name, a list of names, or a map from menu name to entry options:
//!
//! ```yaml
//! menus:
//!   main:
//!     weight: 10
//!     parent: docs
//! ```
//!
//! Entries form a hierarchy through `parent` identifiers and are sorted by
//! weight (unweighted last), then by name.

use std::collections::{BTreeMap, HashMap};

use folio_config::MenuEntryConfig;
use folio_storage::Metadata;
use serde_json::Value;

use crate::meta::MetaError;

/// One menu entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MenuEntry {
    /// Unique identifier within the menu (defaults to the name).
    pub identifier: String,
    /// Display name.
    pub name: String,
    /// Link target.
    pub url: String,
    /// Sort weight (0 = unweighted).
    pub weight: i64,
    /// Parent identifier.
    pub parent: Option<String>,
    /// Tree path of the page that declared the entry.
    pub page: Option<String>,
    /// Child entries, sorted.
    pub children: Vec<MenuEntry>,
}

impl MenuEntry {
    fn from_config(config: &MenuEntryConfig) -> Self {
        Self {
            identifier: config
                .identifier
                .clone()
                .unwrap_or_else(|| config.name.clone()),
            name: config.name.clone(),
            url: config.url.clone(),
            weight: config.weight,
            parent: config.parent.clone(),
            page: None,
            children: Vec::new(),
        }
    }

    /// Whether the entry points at the page at `path` linked as `rel_permalink`.
    #[must_use]
    pub fn is_current(&self, path: &str, rel_permalink: &str) -> bool {
        match &self.page {
            Some(page) => page == path,
            None => self.url == rel_permalink,
        }
    }

    /// Whether any descendant entry is current for the page.
    #[must_use]
    pub fn has_current(&self, path: &str, rel_permalink: &str) -> bool {
        self.children
            .iter()
            .any(|c| c.is_current(path, rel_permalink) || c.has_current(path, rel_permalink))
    }

    fn walk<'a>(&'a self, out: &mut Vec<&'a MenuEntry>) {
        out.push(self);
        for child in &self.children {
            child.walk(out);
        }
    }
}

/// Page facts a front matter menu entry defaults to.
#[derive(Clone, Debug)]
pub(crate) struct PageMenuSource<'a> {
    pub path: &'a str,
    pub title: &'a str,
    pub weight: i64,
    pub url: &'a str,
}

fn invalid(field: &str, value: &Value, reason: &'static str) -> MetaError {
    MetaError {
        field: field.to_owned(),
        value: value.to_string(),
        reason,
    }
}

/// Entries a page declares in front matter, as `(menu, entry)` pairs.
pub(crate) fn page_entries(
    metadata: &Metadata,
    page: &PageMenuSource<'_>,
) -> Result<Vec<(String, MenuEntry)>, MetaError> {
    let Some((field, value)) = ["menus", "menu"]
        .iter()
        .find_map(|&key| metadata.get(key).map(|v| (key, v)))
    else {
        return Ok(Vec::new());
    };

    let default_entry = || MenuEntry {
        identifier: page.title.to_owned(),
        name: page.title.to_owned(),
        url: page.url.to_owned(),
        weight: page.weight,
        parent: None,
        page: Some(page.path.to_owned()),
        children: Vec::new(),
    };

    match value {
        Value::Null => Ok(Vec::new()),
        Value::String(menu) => Ok(vec![(menu.clone(), default_entry())]),
        Value::Array(menus) => menus
            .iter()
            .map(|m| {
                m.as_str()
                    .map(|menu| (menu.to_owned(), default_entry()))
                    .ok_or_else(|| invalid(field, m, "expected a menu name"))
            })
            .collect(),
        Value::Object(menus) => {
            let mut entries = Vec::with_capacity(menus.len());
            for (menu, options) in menus {
                let mut entry = default_entry();
                match options {
                    Value::Null => {}
                    Value::Object(options) => {
                        apply_options(&mut entry, field, options)?;
                    }
                    other => return Err(invalid(field, other, "expected menu entry options")),
                }
                entries.push((menu.clone(), entry));
            }
            Ok(entries)
        }
        other => Err(invalid(field, other, "expected a menu name, list or map")),
    }
}

fn apply_options(
    entry: &mut MenuEntry,
    field: &str,
    options: &serde_json::Map<String, Value>,
) -> Result<(), MetaError> {
    for (key, value) in options {
        match key.as_str() {
            "weight" => {
                entry.weight = value
                    .as_i64()
                    .ok_or_else(|| invalid(field, value, "weight must be an integer"))?;
            }
            "name" | "identifier" | "parent" | "url" => {
                let text = value
                    .as_str()
                    .ok_or_else(|| invalid(field, value, "expected a string"))?
                    .to_owned();
                match key.as_str() {
                    "name" => {
                        if entry.identifier == entry.name {
                            entry.identifier.clone_from(&text);
                        }
                        entry.name = text;
                    }
                    "identifier" => entry.identifier = text,
                    "parent" => entry.parent = Some(text),
                    _ => entry.url = text,
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn sort_entries(entries: &mut [MenuEntry]) {
    entries.sort_by(|a, b| {
        let weight = match (a.weight, b.weight) {
            (0, 0) => std::cmp::Ordering::Equal,
            (0, _) => std::cmp::Ordering::Greater,
            (_, 0) => std::cmp::Ordering::Less,
            (x, y) => x.cmp(&y),
        };
        weight.then_with(|| a.name.cmp(&b.name))
    });
    for entry in entries {
        sort_entries(&mut entry.children);
    }
}

/// Remove `id` from `by_id` together with its descendants, as a subtree.
fn take(
    id: &str,
    by_id: &mut HashMap<String, MenuEntry>,
    children: &HashMap<String, Vec<String>>,
) -> Option<MenuEntry> {
    let mut entry = by_id.remove(id)?;
    entry.children = children
        .get(id)
        .into_iter()
        .flatten()
        .filter_map(|child| take(child, by_id, children))
        .collect();
    Some(entry)
}

/// Turn a flat entry list into a sorted hierarchy.
fn assemble(menu: &str, flat: Vec<MenuEntry>) -> Vec<MenuEntry> {
    let mut by_id: HashMap<String, MenuEntry> = HashMap::with_capacity(flat.len());
    let mut order = Vec::with_capacity(flat.len());
    for entry in flat {
        if by_id.contains_key(&entry.identifier) {
            tracing::warn!(menu, identifier = %entry.identifier, "duplicate menu entry ignored");
            continue;
        }
        order.push(entry.identifier.clone());
        by_id.insert(entry.identifier.clone(), entry);
    }

    let mut children: HashMap<String, Vec<String>> = HashMap::new();
    let mut roots = Vec::new();
    for id in &order {
        match by_id[id].parent.as_deref() {
            Some(parent) if by_id.contains_key(parent) => {
                children.entry(parent.to_owned()).or_default().push(id.clone());
            }
            Some(parent) => {
                tracing::warn!(menu, identifier = %id, parent, "menu parent not found");
                roots.push(id.clone());
            }
            None => roots.push(id.clone()),
        }
    }

    let mut tree: Vec<MenuEntry> = roots
        .iter()
        .filter_map(|id| take(id, &mut by_id, &children))
        .collect();
    // Entries left over sit on a parent cycle.
    for id in &order {
        if by_id.contains_key(id) {
            tracing::warn!(menu, identifier = %id, "menu parent cycle");
            if let Some(mut entry) = take(id, &mut by_id, &children) {
                entry.parent = None;
                tree.push(entry);
            }
        }
    }
    sort_entries(&mut tree);
    tree
}

/// Every menu of a site.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Menus {
    menus: BTreeMap<String, Vec<MenuEntry>>,
}

impl Menus {
    /// Build menus from configuration and front matter `(menu, entry)` pairs.
    #[must_use]
    pub fn build(
        config: &BTreeMap<String, Vec<MenuEntryConfig>>,
        page_entries: Vec<(String, MenuEntry)>,
    ) -> Self {
        let mut flat: BTreeMap<String, Vec<MenuEntry>> = config
            .iter()
            .map(|(menu, entries)| {
                (menu.clone(), entries.iter().map(MenuEntry::from_config).collect())
            })
            .collect();
        for (menu, entry) in page_entries {
            flat.entry(menu).or_default().push(entry);
        }
        let menus = flat
            .into_iter()
            .map(|(menu, entries)| {
                let tree = assemble(&menu, entries);
                (menu, tree)
            })
            .collect();
        Self { menus }
    }

    /// Top-level entries of a menu.
    #[must_use]
    pub fn get(&self, menu: &str) -> &[MenuEntry] {
        self.menus.get(menu).map(Vec::as_slice).unwrap_or_default()
    }

    /// Menu names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.menus.keys().map(String::as_str)
    }

    /// Entries declared by the page at `path`, as `(menu, entry)` pairs.
    #[must_use]
    pub fn entries_for_page(&self, path: &str) -> Vec<(String, MenuEntry)> {
        let mut found = Vec::new();
        for (menu, entries) in &self.menus {
            let mut all = Vec::new();
            for entry in entries {
                entry.walk(&mut all);
            }
            found.extend(
                all.into_iter()
                    .filter(|e| e.page.as_deref() == Some(path))
                    .map(|e| (menu.clone(), e.clone())),
            );
        }
        found
    }
}
