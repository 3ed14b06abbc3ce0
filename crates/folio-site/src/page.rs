//! Page identities.
//!
//! A [`PageIdentity`] is the format-independent state of one content item:
//! its front matter and body, its position in the tree, and every derived
//! property (navigation neighbours, listings, menus, translations,
//! resources, shortcodes, layout). Derived properties are cells of a
//! per-item [`LazyGraph`] instantiated from a plan shared by every page.
//!
//! Relations to other pages are stored as page ids and resolved through the
//! owning [`SiteState`] on access, so pages never own each other.
//!
//! A [`Page`] is the cheap, cloneable handle handed to renderers: the
//! identity plus its output variants.

use std::collections::BTreeMap;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use folio_lazy::{AbortFlag, ConstructionError, GraphPlan, LazyGraph, Resolver};
use folio_storage::{ContentKind, ContentRecord, GitInfo, Metadata};

use crate::error::{FormatMismatchError, PageError};
use crate::format::TargetPaths;
use crate::menus::MenuEntry;
use crate::meta::{self, Dates};
use crate::navigation::{NextPrev, SortKey};
use crate::output::OutputVariant;
use crate::scratch::Scratch;
use crate::shortcodes::{self, Shortcode};
use crate::state::SiteState;
use crate::translations;
use crate::tree::{Resource, TreeRef};

/// Cells that read site-wide indexes and must be recomputed when any
/// other item changes.
pub(crate) const SITE_DEPENDENT_CELLS: [&str; 7] = [
    "pages",
    "regular_pages",
    "regular_pages_recursive",
    "next_prev",
    "next_prev_in_section",
    "menus",
    "all_translations",
];

/// Kind of page.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PageKind {
    /// The site root.
    Home,
    /// A branch page other than the root.
    Section,
    /// A regular (leaf) page.
    Page,
}

impl PageKind {
    /// Lowercase name (`home`, `section`, `page`).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Home => "home",
            Self::Section => "section",
            Self::Page => "page",
        }
    }

    /// Whether pages of this kind list other pages.
    #[must_use]
    pub fn is_node(self) -> bool {
        !matches!(self, Self::Page)
    }
}

/// Replaceable inputs of a page.
#[derive(Clone, Debug, PartialEq)]
pub struct PageSource {
    /// Decoded front matter.
    pub metadata: Metadata,
    /// Raw body.
    pub body: String,
    /// Content language.
    pub lang: String,
    /// Last commit touching the source.
    pub git: Option<GitInfo>,
    /// Code owners.
    pub codeowners: Vec<String>,
}

impl PageSource {
    pub(crate) fn from_record(record: &ContentRecord, default_language: &str) -> Self {
        Self {
            metadata: record.metadata.clone(),
            body: record.body.clone(),
            lang: record
                .lang
                .clone()
                .unwrap_or_else(|| default_language.to_owned()),
            git: record.git.clone(),
            codeowners: record.codeowners.clone(),
        }
    }
}

/// Record fields that decide a page's placement and variants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct RecordShape {
    kind: ContentKind,
    outputs: Option<Vec<String>>,
    target_paths: BTreeMap<String, String>,
    lang: Option<String>,
}

impl RecordShape {
    pub(crate) fn of(record: &ContentRecord) -> Self {
        Self {
            kind: record.kind.clone(),
            outputs: record.outputs.clone(),
            target_paths: record.target_paths.clone(),
            lang: record.lang.clone(),
        }
    }
}

/// Template lookup facts of a page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayoutDescriptor {
    /// Page kind.
    pub kind: PageKind,
    /// Content type: front matter `type`, else the first section, else `page`.
    pub content_type: String,
    /// First path segment (`""` for the home page).
    pub section: String,
    /// Front matter `layout` override.
    pub layout: Option<String>,
    /// Content language.
    pub lang: String,
}

/// Everything [`PageIdentity::new`] needs.
pub(crate) struct IdentitySeed {
    pub id: usize,
    pub path: String,
    pub kind: PageKind,
    pub tree_ref: TreeRef,
    pub source: PageSource,
    pub enabled_formats: Vec<String>,
    pub main_paths: TargetPaths,
    pub scratch: Arc<Scratch>,
    pub shape: RecordShape,
}

/// Format-independent state of one content item.
pub struct PageIdentity {
    site: Weak<SiteState>,
    id: usize,
    path: String,
    kind: PageKind,
    tree_ref: TreeRef,
    source: RwLock<Arc<PageSource>>,
    enabled_formats: Vec<String>,
    main_paths: TargetPaths,
    shape: RecordShape,
    graph: LazyGraph<PageIdentity>,
    scratch: Arc<Scratch>,
    force_render: AtomicBool,
}

impl std::fmt::Debug for PageIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageIdentity")
            .field("path", &self.path)
            .field("kind", &self.kind)
            .field("enabled_formats", &self.enabled_formats)
            .finish_non_exhaustive()
    }
}

impl PageIdentity {
    pub(crate) fn new(
        site: Weak<SiteState>,
        seed: IdentitySeed,
        plan: Arc<GraphPlan<Self>>,
        abort: AbortFlag,
    ) -> Self {
        Self {
            site,
            id: seed.id,
            path: seed.path,
            kind: seed.kind,
            tree_ref: seed.tree_ref,
            source: RwLock::new(Arc::new(seed.source)),
            enabled_formats: seed.enabled_formats,
            main_paths: seed.main_paths,
            shape: seed.shape,
            graph: LazyGraph::with_abort(plan, abort),
            scratch: seed.scratch,
            force_render: AtomicBool::new(false),
        }
    }

    /// The owning site state.
    ///
    /// # Errors
    ///
    /// Returns [`PageError::SiteDropped`] if the state was dropped.
    pub fn site(&self) -> Result<Arc<SiteState>, PageError> {
        self.site
            .upgrade()
            .ok_or_else(|| PageError::SiteDropped(self.path.clone()))
    }

    pub(crate) fn id(&self) -> usize {
        self.id
    }

    pub(crate) fn graph(&self) -> &LazyGraph<Self> {
        &self.graph
    }

    fn cell<T: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>, PageError> {
        self.graph
            .get(self, name)
            .map_err(|e| PageError::resolution(&self.path, name, e))
    }

    /// Tree path (`""` for the home page).
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Page kind.
    #[must_use]
    pub fn kind(&self) -> PageKind {
        self.kind
    }

    /// Whether the page lists other pages (home or section).
    #[must_use]
    pub fn is_node(&self) -> bool {
        self.kind.is_node()
    }

    /// Position in the content tree.
    #[must_use]
    pub fn tree_ref(&self) -> TreeRef {
        self.tree_ref
    }

    /// Current inputs (front matter, body, language, attribution).
    #[must_use]
    pub fn source(&self) -> Arc<PageSource> {
        Arc::clone(&self.source.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Whether `record` can replace this page's source in place.
    pub(crate) fn accepts(&self, record: &ContentRecord) -> bool {
        self.shape == RecordShape::of(record)
    }

    pub(crate) fn replace_source(&self, source: PageSource) {
        *self.source.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(source);
    }

    /// Display title: front matter `title`, else the last path segment.
    #[must_use]
    pub fn title(&self) -> String {
        meta::title(&self.source().metadata, &self.path)
    }

    /// Front matter weight (0 when unset).
    #[must_use]
    pub fn weight(&self) -> i64 {
        meta::weight(&self.source().metadata)
    }

    /// Content language.
    #[must_use]
    pub fn lang(&self) -> String {
        self.source().lang.clone()
    }

    /// Raw body.
    #[must_use]
    pub fn raw_content(&self) -> String {
        self.source().body.clone()
    }

    /// Last commit touching the source, if known.
    #[must_use]
    pub fn git_info(&self) -> Option<GitInfo> {
        self.source().git.clone()
    }

    /// Code owners of the source.
    #[must_use]
    pub fn codeowners(&self) -> Vec<String> {
        self.source().codeowners.clone()
    }

    /// Names of the formats this page renders, in registration order.
    #[must_use]
    pub fn enabled_formats(&self) -> &[String] {
        &self.enabled_formats
    }

    /// Path and link data of the first enabled format.
    #[must_use]
    pub fn main_paths(&self) -> &TargetPaths {
        &self.main_paths
    }

    /// Site-relative link of the first enabled format.
    #[must_use]
    pub fn rel_permalink(&self) -> &str {
        &self.main_paths.rel_permalink
    }

    /// Absolute link of the first enabled format.
    #[must_use]
    pub fn permalink(&self) -> &str {
        &self.main_paths.permalink
    }

    /// Scratch store; survives rebuilds.
    #[must_use]
    pub fn scratch(&self) -> &Scratch {
        &self.scratch
    }

    /// Whether the page must be rendered in a fast (changed-only) render pass.
    #[must_use]
    pub fn force_render(&self) -> bool {
        self.force_render.load(Ordering::Acquire)
    }

    /// Mark or unmark the page for the next fast render pass.
    pub fn set_force_render(&self, force: bool) {
        self.force_render.store(force, Ordering::Release);
    }

    /// Publishing dates.
    pub fn dates(&self) -> Result<Dates, PageError> {
        self.cell::<Dates>("dates").map(|d| *d)
    }

    /// Whether the page passes the draft, future and expiry rules.
    pub fn is_published(&self) -> Result<bool, PageError> {
        self.cell::<bool>("published").map(|p| *p)
    }

    /// Ordering key used by listings and navigation.
    pub fn sort_key(&self) -> Result<SortKey, PageError> {
        self.cell::<SortKey>("sort_key").map(|k| *k)
    }

    /// Sort key if the page is published, `None` otherwise.
    pub(crate) fn listing_key(&self) -> Result<Option<SortKey>, PageError> {
        if self.is_published()? {
            self.sort_key().map(Some)
        } else {
            Ok(None)
        }
    }

    fn resolve_ids(&self, ids: &[usize]) -> Result<Vec<Page>, PageError> {
        let site = self.site()?;
        Ok(ids.iter().map(|&id| site.page_by_id(id).clone()).collect())
    }

    fn resolve_id(&self, id: Option<usize>) -> Result<Option<Page>, PageError> {
        let site = self.site()?;
        Ok(id.map(|id| site.page_by_id(id).clone()))
    }

    /// Published direct children (sections and regular pages), in order.
    pub fn pages(&self) -> Result<Vec<Page>, PageError> {
        self.resolve_ids(&self.cell::<Vec<usize>>("pages")?)
    }

    /// Published regular pages directly in this section.
    pub fn regular_pages(&self) -> Result<Vec<Page>, PageError> {
        self.resolve_ids(&self.cell::<Vec<usize>>("regular_pages")?)
    }

    /// Published regular pages anywhere below this section.
    pub fn regular_pages_recursive(&self) -> Result<Vec<Page>, PageError> {
        self.resolve_ids(&self.cell::<Vec<usize>>("regular_pages_recursive")?)
    }

    pub(crate) fn regular_page_ids_recursive(&self) -> Result<Arc<Vec<usize>>, PageError> {
        self.cell("regular_pages_recursive")
    }

    /// Newer neighbour in site-wide order.
    pub fn next(&self) -> Result<Option<Page>, PageError> {
        self.resolve_id(self.cell::<NextPrev<usize>>("next_prev")?.next)
    }

    /// Older neighbour in site-wide order.
    pub fn prev(&self) -> Result<Option<Page>, PageError> {
        self.resolve_id(self.cell::<NextPrev<usize>>("next_prev")?.prev)
    }

    /// Newer neighbour within the section.
    pub fn next_in_section(&self) -> Result<Option<Page>, PageError> {
        self.resolve_id(self.cell::<NextPrev<usize>>("next_prev_in_section")?.next)
    }

    /// Older neighbour within the section.
    pub fn prev_in_section(&self) -> Result<Option<Page>, PageError> {
        self.resolve_id(self.cell::<NextPrev<usize>>("next_prev_in_section")?.prev)
    }

    /// Menu entries declared by this page, as `(menu, entry)` pairs.
    pub fn menus(&self) -> Result<Vec<(String, MenuEntry)>, PageError> {
        self.cell::<Vec<(String, MenuEntry)>>("menus")
            .map(|m| m.as_ref().clone())
    }

    /// Whether `entry` of `menu` points at this page.
    #[must_use]
    pub fn is_menu_current(&self, menu: &str, entry: &MenuEntry) -> bool {
        if entry.is_current(&self.path, self.rel_permalink()) {
            return true;
        }
        self.cell::<Vec<(String, MenuEntry)>>("menus")
            .is_ok_and(|own| {
                own.iter()
                    .any(|(m, e)| m == menu && e.identifier == entry.identifier)
            })
    }

    /// Whether a descendant of `entry` points at this page.
    #[must_use]
    pub fn has_menu_current(&self, _menu: &str, entry: &MenuEntry) -> bool {
        entry.has_current(&self.path, self.rel_permalink())
    }

    /// Bundled resources.
    pub fn resources(&self) -> Result<Vec<Resource>, PageError> {
        self.cell::<Vec<Resource>>("resources")
            .map(|r| r.as_ref().clone())
    }

    /// Key grouping this page with its translations.
    pub fn translation_key(&self) -> Result<String, PageError> {
        self.cell::<String>("translation_key")
            .map(|k| k.as_ref().clone())
    }

    /// Translations of this page, excluding itself, in language order.
    pub fn translations(&self) -> Result<Vec<Page>, PageError> {
        self.resolve_ids(&self.cell::<Vec<usize>>("translations")?)
    }

    /// Translations of this page including itself, in language order.
    pub fn all_translations(&self) -> Result<Vec<Page>, PageError> {
        self.resolve_ids(&self.cell::<Vec<usize>>("all_translations")?)
    }

    /// Shortcode calls in the body.
    pub fn shortcodes(&self) -> Result<Vec<Shortcode>, PageError> {
        self.cell::<Vec<Shortcode>>("shortcodes")
            .map(|s| s.as_ref().clone())
    }

    /// Template lookup facts.
    pub fn layout(&self) -> Result<LayoutDescriptor, PageError> {
        self.cell::<LayoutDescriptor>("layout")
            .map(|l| l.as_ref().clone())
    }

    fn content_page(site: &SiteState, node: Option<TreeRef>) -> Option<Page> {
        node.and_then(|n| site.page_for_node(n)).cloned()
    }

    /// Nearest content-bearing ancestor.
    pub fn parent(&self) -> Result<Option<Page>, PageError> {
        Ok(self.ancestors()?.into_iter().next())
    }

    /// Content-bearing ancestors, nearest first.
    pub fn ancestors(&self) -> Result<Vec<Page>, PageError> {
        let site = self.site()?;
        Ok(site
            .tree()
            .ancestors(self.tree_ref)
            .into_iter()
            .filter_map(|n| site.page_for_node(n).cloned())
            .collect())
    }

    /// Page of the section this page belongs to (itself for sections).
    pub fn current_section(&self) -> Result<Option<Page>, PageError> {
        let site = self.site()?;
        let section = site.tree().section(self.tree_ref);
        Ok(Self::content_page(&site, Some(section)))
    }

    /// Page of the top-level section containing this page.
    pub fn first_section(&self) -> Result<Option<Page>, PageError> {
        let site = self.site()?;
        let section = site.tree().first_section(self.tree_ref);
        Ok(Self::content_page(&site, Some(section)))
    }

    /// Content-bearing child sections.
    pub fn sections(&self) -> Result<Vec<Page>, PageError> {
        let site = self.site()?;
        Ok(site
            .tree()
            .children(self.tree_ref)
            .into_iter()
            .filter_map(|n| site.page_for_node(n))
            .filter(|p| p.is_node())
            .cloned()
            .collect())
    }

    /// Content-bearing pages sharing this page's parent node.
    pub fn siblings(&self) -> Result<Vec<Page>, PageError> {
        let site = self.site()?;
        Ok(site
            .tree()
            .siblings(self.tree_ref)
            .into_iter()
            .filter_map(|n| site.page_for_node(n).cloned())
            .collect())
    }

    /// Whether both pages belong to the same section.
    pub fn in_section(&self, other: &PageIdentity) -> Result<bool, PageError> {
        let site = self.site()?;
        let tree = site.tree();
        Ok(tree.section(self.tree_ref) == tree.section(other.tree_ref))
    }

    /// Whether this page is an ancestor of `other`.
    pub fn is_ancestor(&self, other: &PageIdentity) -> Result<bool, PageError> {
        Ok(self.site()?.tree().is_ancestor(self.tree_ref, other.tree_ref))
    }

    /// Whether this page is a descendant of `other`.
    pub fn is_descendant(&self, other: &PageIdentity) -> Result<bool, PageError> {
        other.is_ancestor(self)
    }
}

/// Cheap handle to one page: its identity and its output variants.
#[derive(Clone)]
pub struct Page {
    identity: Arc<PageIdentity>,
    outputs: Arc<[Arc<OutputVariant>]>,
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("path", &self.identity.path)
            .field("kind", &self.identity.kind)
            .field(
                "outputs",
                &self.outputs.iter().map(|v| v.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Deref for Page {
    type Target = PageIdentity;

    fn deref(&self) -> &PageIdentity {
        &self.identity
    }
}

impl Page {
    pub(crate) fn new(identity: Arc<PageIdentity>, outputs: Vec<Arc<OutputVariant>>) -> Self {
        Self {
            identity,
            outputs: outputs.into(),
        }
    }

    /// Shared identity.
    #[must_use]
    pub fn identity(&self) -> &Arc<PageIdentity> {
        &self.identity
    }

    /// One variant per registered format, in registration order.
    #[must_use]
    pub fn outputs(&self) -> &[Arc<OutputVariant>] {
        &self.outputs
    }

    /// Variants this page actually renders.
    pub fn rendered_outputs(&self) -> impl Iterator<Item = &Arc<OutputVariant>> {
        self.outputs.iter().filter(|v| v.is_render_enabled())
    }

    /// Variant for the format `name`.
    ///
    /// Formats registered but not enabled for this page still return a
    /// variant (not rendered, linking like the first enabled format).
    ///
    /// # Errors
    ///
    /// Returns [`FormatMismatchError`] if no format `name` is registered.
    pub fn output(&self, name: &str) -> Result<&Arc<OutputVariant>, FormatMismatchError> {
        self.outputs
            .iter()
            .find(|v| v.name() == name)
            .ok_or_else(|| FormatMismatchError {
                path: self.identity.path.clone(),
                requested: name.to_owned(),
                fallback: self.identity.main_paths.clone(),
            })
    }

    /// Reset every derived property of this page and its variants.
    pub(crate) fn reset(&self) {
        self.identity.graph.reset();
        for variant in self.outputs.iter() {
            variant.reset();
        }
    }

    /// Recompute cells that depend on other pages.
    pub(crate) fn invalidate_site_dependent(&self) {
        for cell in SITE_DEPENDENT_CELLS {
            if let Err(e) = self.identity.graph.invalidate(cell) {
                tracing::debug!(path = %self.identity.path, cell, error = %e, "invalidate failed");
            }
        }
        for variant in self.outputs.iter() {
            variant.invalidate_listing();
        }
    }
}

fn published_children(site: &SiteState, nodes: Vec<TreeRef>) -> Result<Vec<usize>, PageError> {
    site.listed(nodes.into_iter().filter_map(|n| site.page_id_for_node(n)))
}

/// Cell plan shared by every page identity.
pub(crate) fn plan() -> Result<Arc<GraphPlan<PageIdentity>>, ConstructionError> {
    GraphPlan::builder()
        .cell("dates", &[], |r: &Resolver<'_, PageIdentity>| {
            let source = r.context().source();
            let git_date = source.git.as_ref().map(|g| g.date.as_str());
            Ok(Dates::from_metadata(&source.metadata, git_date)?)
        })
        .cell("published", &["dates"], |r: &Resolver<'_, PageIdentity>| {
            let page = r.context();
            let dates = r.dep::<Dates>("dates")?;
            let site = page.site()?;
            let build = &site.config().build;
            let now = site.now();
            Ok((build.drafts || !meta::is_draft(&page.source().metadata))
                && (build.future || !dates.is_future(now))
                && (build.expired || !dates.is_expired(now)))
        })
        .cell("sort_key", &["dates"], |r: &Resolver<'_, PageIdentity>| {
            let page = r.context();
            Ok(SortKey {
                weight: page.weight(),
                date: r.dep::<Dates>("dates")?.date,
                ordinal: page.tree_ref.index(),
            })
        })
        .cell("pages", &[], |r: &Resolver<'_, PageIdentity>| {
            let page = r.context();
            let site = page.site()?;
            Ok(published_children(&site, site.tree().children(page.tree_ref))?)
        })
        .cell("regular_pages", &[], |r: &Resolver<'_, PageIdentity>| {
            let page = r.context();
            let site = page.site()?;
            Ok(published_children(&site, site.tree().bucket(page.tree_ref))?)
        })
        .cell(
            "regular_pages_recursive",
            &[],
            |r: &Resolver<'_, PageIdentity>| {
                let page = r.context();
                let site = page.site()?;
                Ok(published_children(
                    &site,
                    site.tree().leaf_descendants(page.tree_ref),
                )?)
            },
        )
        .cell("next_prev", &[], |r: &Resolver<'_, PageIdentity>| {
            let page = r.context();
            Ok(page.site()?.navigation()?.next_prev(page.id))
        })
        .cell("next_prev_in_section", &[], |r: &Resolver<'_, PageIdentity>| {
            let page = r.context();
            Ok(page.site()?.navigation()?.next_prev_in_section(page.id))
        })
        .cell("menus", &[], |r: &Resolver<'_, PageIdentity>| {
            let page = r.context();
            Ok(page.site()?.menus()?.entries_for_page(&page.path))
        })
        .cell("resources", &[], |r: &Resolver<'_, PageIdentity>| {
            let page = r.context();
            Ok(page.site()?.tree().resources(page.tree_ref).to_vec())
        })
        .cell("translation_key", &[], |r: &Resolver<'_, PageIdentity>| {
            let page = r.context();
            let source = page.source();
            Ok(meta::str_field(&source.metadata, "translation_key").map_or_else(
                || translations::default_key(page.kind.as_str(), &page.path, &source.lang),
                str::to_owned,
            ))
        })
        .cell(
            "all_translations",
            &["translation_key"],
            |r: &Resolver<'_, PageIdentity>| {
                let page = r.context();
                let key = r.dep::<String>("translation_key")?;
                let group = page.site()?.translations()?.group(&key).to_vec();
                Ok(if group.is_empty() { vec![page.id] } else { group })
            },
        )
        .cell(
            "translations",
            &["all_translations"],
            |r: &Resolver<'_, PageIdentity>| {
                let id = r.context().id;
                let all = r.dep::<Vec<usize>>("all_translations")?;
                Ok(all.iter().copied().filter(|&other| other != id).collect::<Vec<_>>())
            },
        )
        .cell("shortcodes", &[], |r: &Resolver<'_, PageIdentity>| {
            Ok(shortcodes::scan(&r.context().source().body))
        })
        .cell("layout", &[], |r: &Resolver<'_, PageIdentity>| {
            let page = r.context();
            let source = page.source();
            let section = page.path.split('/').next().unwrap_or_default().to_owned();
            let content_type = meta::str_field(&source.metadata, "type").map_or_else(
                || {
                    if section.is_empty() {
                        "page".to_owned()
                    } else {
                        section.clone()
                    }
                },
                str::to_owned,
            );
            Ok(LayoutDescriptor {
                kind: page.kind,
                content_type,
                section,
                layout: meta::str_field(&source.metadata, "layout").map(str::to_owned),
                lang: source.lang.clone(),
            })
        })
        .build()
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;
    use std::thread;

    use chrono::{DateTime, TimeZone, Utc};
    use folio_config::Config;
    use folio_storage::{ContentRecord, MockStorage};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::site::{Site, SiteOptions};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
    }

    fn build_with(config: Config, storage: MockStorage) -> Arc<SiteState> {
        let options = SiteOptions {
            now: Some(now()),
            ..SiteOptions::default()
        };
        let site = Site::new(config, Arc::new(storage), options).unwrap();
        site.rebuild().unwrap()
    }

    fn build(storage: MockStorage) -> Arc<SiteState> {
        build_with(Config::default(), storage)
    }

    fn paths(pages: &[Page]) -> Vec<&str> {
        pages.iter().map(|p| p.path()).collect()
    }

    fn blog() -> MockStorage {
        MockStorage::new()
            .with_section("", "---\ntitle: Home\n---\n")
            .with_section("blog", "---\ntitle: Blog\n---\n")
            .with_page("blog/a", "---\ntitle: A\ndate: 2024-01-01\n---\nFirst")
            .with_page("blog/b", "---\ntitle: B\ndate: 2024-02-01\n---\nSecond")
    }

    #[test]
    fn test_page_kinds() {
        let state = build(blog());

        assert_eq!(state.page("").unwrap().kind(), PageKind::Home);
        assert_eq!(state.page("blog").unwrap().kind(), PageKind::Section);
        assert_eq!(state.page("blog/a").unwrap().kind(), PageKind::Page);
        assert!(state.page("blog").unwrap().is_node());
        assert!(!state.page("blog/a").unwrap().is_node());
    }

    #[test]
    fn test_next_prev_by_date() {
        let state = build(blog());
        let a = state.page("blog/a").unwrap();
        let b = state.page("blog/b").unwrap();

        assert!(b.next().unwrap().is_none());
        assert_eq!(b.prev().unwrap().unwrap().path(), "blog/a");
        assert_eq!(a.next().unwrap().unwrap().path(), "blog/b");
        assert!(a.prev().unwrap().is_none());

        assert!(b.next_in_section().unwrap().is_none());
        assert_eq!(b.prev_in_section().unwrap().unwrap().path(), "blog/a");
        assert_eq!(a.next_in_section().unwrap().unwrap().path(), "blog/b");
    }

    #[test]
    fn test_next_prev_in_section_is_scoped() {
        let state = build(
            blog()
                .with_section("news", "")
                .with_page("news/x", "---\ndate: 2024-01-15\n---\n"),
        );
        let x = state.page("news/x").unwrap();

        assert_eq!(x.next().unwrap().unwrap().path(), "blog/b");
        assert_eq!(x.prev().unwrap().unwrap().path(), "blog/a");
        assert!(x.next_in_section().unwrap().is_none());
        assert!(x.prev_in_section().unwrap().is_none());
    }

    #[test]
    fn test_equal_dates_keep_tree_order() {
        let state = build(
            MockStorage::new()
                .with_page("c", "---\ndate: 2024-01-01\n---\n")
                .with_page("d", "---\ndate: 2024-01-01\n---\n"),
        );

        assert_eq!(paths(&state.regular_pages().unwrap()), vec!["c", "d"]);
        assert_eq!(state.page("c").unwrap().prev().unwrap().unwrap().path(), "d");
    }

    #[test]
    fn test_weight_sorts_before_date() {
        let state = build(
            blog().with_page("blog/pinned", "---\nweight: 1\ndate: 2020-01-01\n---\n"),
        );

        let blog = state.page("blog").unwrap();

        assert_eq!(
            paths(&blog.regular_pages().unwrap()),
            vec!["blog/pinned", "blog/b", "blog/a"]
        );
    }

    #[test]
    fn test_malformed_date_is_attributed() {
        let state = build(blog().with_page("blog/bad", "---\ndate: someday\n---\n"));
        let bad = state.page("blog/bad").unwrap();

        let err = bad.dates().unwrap_err();

        assert_eq!(err.cell(), Some("dates"));
        assert!(err.to_string().starts_with("blog/bad [dates]"));
        assert!(bad.next().unwrap().is_none());

        let b = state.page("blog/b").unwrap();
        assert_eq!(b.prev().unwrap().unwrap().path(), "blog/a");
        assert_eq!(
            paths(&state.page("blog").unwrap().regular_pages().unwrap()),
            vec!["blog/b", "blog/a"]
        );
    }

    #[test]
    fn test_drafts_future_and_expired_are_hidden() {
        let storage = || {
            blog()
                .with_page("blog/draft", "---\ndraft: true\ndate: 2024-03-01\n---\n")
                .with_page("blog/later", "---\ndate: 2030-01-01\n---\n")
                .with_page("blog/old", "---\ndate: 2023-01-01\nexpiry_date: 2024-01-01\n---\n")
        };

        let state = build(storage());
        assert_eq!(
            paths(&state.page("blog").unwrap().regular_pages().unwrap()),
            vec!["blog/b", "blog/a"]
        );
        assert!(!state.page("blog/draft").unwrap().is_published().unwrap());

        let mut config = Config::default();
        config.build.drafts = true;
        config.build.future = true;
        config.build.expired = true;
        let state = build_with(config, storage());
        assert_eq!(
            paths(&state.page("blog").unwrap().regular_pages().unwrap()),
            vec!["blog/later", "blog/draft", "blog/b", "blog/a", "blog/old"]
        );
    }

    #[test]
    fn test_listings_direct_and_recursive() {
        let state = build(
            blog()
                .with_page("about", "")
                .with_page("docs/guide/intro", "---\ndate: 2024-05-01\n---\n"),
        );
        let home = state.page("").unwrap();

        assert_eq!(paths(&home.pages().unwrap()), vec!["blog", "about"]);
        assert_eq!(paths(&home.regular_pages().unwrap()), vec!["about"]);
        assert_eq!(
            paths(&home.regular_pages_recursive().unwrap()),
            vec!["docs/guide/intro", "blog/b", "blog/a", "about"]
        );
        assert!(state.page("blog/a").unwrap().pages().unwrap().is_empty());
    }

    #[test]
    fn test_tree_queries() {
        let state = build(
            blog()
                .with_section("blog/2024", "")
                .with_page("blog/2024/c", "---\ndate: 2024-03-01\n---\n"),
        );
        let a = state.page("blog/a").unwrap();
        let c = state.page("blog/2024/c").unwrap();
        let blog = state.page("blog").unwrap();

        assert_eq!(c.parent().unwrap().unwrap().path(), "blog/2024");
        assert_eq!(paths(&c.ancestors().unwrap()), vec!["blog/2024", "blog", ""]);
        assert_eq!(c.current_section().unwrap().unwrap().path(), "blog/2024");
        assert_eq!(c.first_section().unwrap().unwrap().path(), "blog");
        assert_eq!(paths(&blog.sections().unwrap()), vec!["blog/2024"]);
        assert_eq!(paths(&a.siblings().unwrap()), vec!["blog/b", "blog/2024"]);
        assert!(a.in_section(state.page("blog/b").unwrap()).unwrap());
        assert!(!a.in_section(c).unwrap());
        assert!(blog.is_ancestor(c).unwrap());
        assert!(c.is_descendant(blog).unwrap());
        assert!(!c.is_ancestor(blog).unwrap());
    }

    #[test]
    fn test_synthetic_sections_have_no_page() {
        let state = build(MockStorage::new().with_page("docs/guide/intro", ""));
        let intro = state.page("docs/guide/intro").unwrap();

        assert!(state.page("docs").is_none());
        assert!(state.home().is_none());
        assert!(intro.parent().unwrap().is_none());
        assert!(intro.current_section().unwrap().is_none());
    }

    #[test]
    fn test_translations() {
        let config = Config::from_toml("languages = [\"en\", \"fr\"]\n").unwrap();
        let storage = blog()
            .with_record(ContentRecord::new("fr", ContentKind::Branch).with_lang("fr"))
            .with_record(ContentRecord::new("fr/blog/a", ContentKind::Leaf).with_lang("fr"))
            .with_record(
                ContentRecord::new("fr/blog/b-fr", ContentKind::Leaf)
                    .with_lang("fr")
                    .with_metadata(
                        serde_json::json!({"translation_key": "page/blog/b"})
                            .as_object()
                            .unwrap()
                            .clone(),
                    ),
            );
        let state = build_with(config, storage);
        let a = state.page("blog/a").unwrap();
        let b_fr = state.page("fr/blog/b-fr").unwrap();

        assert_eq!(a.translation_key().unwrap(), "page/blog/a");
        assert_eq!(paths(&a.translations().unwrap()), vec!["fr/blog/a"]);
        assert_eq!(
            paths(&a.all_translations().unwrap()),
            vec!["blog/a", "fr/blog/a"]
        );
        assert_eq!(paths(&b_fr.translations().unwrap()), vec!["blog/b"]);
        assert_eq!(b_fr.lang(), "fr");

        let home = state.home().unwrap();
        assert_eq!(state.page("fr").unwrap().translation_key().unwrap(), "home/");
        assert_eq!(paths(&home.translations().unwrap()), vec!["fr"]);
    }

    #[test]
    fn test_menus_from_front_matter() {
        let config = Config::from_toml(
            "[[menus.main]]\nidentifier = \"home\"\nname = \"Home\"\nurl = \"/\"\nweight = 1\n",
        )
        .unwrap();
        let state = build_with(
            config,
            blog().with_page("about", "---\ntitle: About\nmenu: main\n---\n"),
        );
        let about = state.page("about").unwrap();
        let menus = state.menus().unwrap();
        let main = menus.get("main");

        assert_eq!(
            main.iter().map(|e| e.name.as_str()).collect::<Vec<_>>(),
            vec!["Home", "About"]
        );
        assert_eq!(about.menus().unwrap().len(), 1);
        assert!(about.is_menu_current("main", &main[1]));
        assert!(!about.is_menu_current("main", &main[0]));
        assert!(!state.page("blog/a").unwrap().is_menu_current("main", &main[1]));
    }

    #[test]
    fn test_resources_shortcodes_and_layout() {
        let state = build(
            blog()
                .with_page("blog/c", "---\ntype: post\nlayout: wide\n---\n{{< figure src=\"x\" >}}")
                .with_resource("blog/c/cover.png", "image/png"),
        );
        let c = state.page("blog/c").unwrap();

        let resources = c.resources().unwrap();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].name, "cover.png");
        assert_eq!(c.shortcodes().unwrap()[0].name, "figure");
        assert_eq!(
            c.layout().unwrap(),
            LayoutDescriptor {
                kind: PageKind::Page,
                content_type: "post".to_owned(),
                section: "blog".to_owned(),
                layout: Some("wide".to_owned()),
                lang: "en".to_owned(),
            }
        );
        assert_eq!(state.page("").unwrap().layout().unwrap().content_type, "page");
        assert_eq!(state.page("blog/a").unwrap().layout().unwrap().content_type, "blog");
    }

    #[test]
    fn test_git_and_codeowners() {
        let git = GitInfo {
            hash: "abc1234".to_owned(),
            author: "Dana".to_owned(),
            date: "2024-04-01T10:00:00Z".to_owned(),
            subject: "Update".to_owned(),
        };
        let state = build(
            MockStorage::new().with_record(
                ContentRecord::new("a", ContentKind::Leaf)
                    .with_git(git.clone())
                    .with_codeowners(vec!["@docs".to_owned()]),
            ),
        );
        let a = state.page("a").unwrap();

        assert_eq!(a.git_info(), Some(git));
        assert_eq!(a.codeowners(), vec!["@docs".to_owned()]);
        assert_eq!(
            a.dates().unwrap().lastmod,
            Some(Utc.with_ymd_and_hms(2024, 4, 1, 10, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_unknown_output_is_format_mismatch() {
        let state = build(blog());
        let a = state.page("blog/a").unwrap();

        let err = a.output("pdf").unwrap_err();

        assert_eq!(err.requested, "pdf");
        assert_eq!(err.fallback.rel_permalink, "/blog/a/");
        assert_eq!(&err.fallback, a.main_paths());
    }

    #[test]
    fn test_scratch_is_shared_per_page() {
        let state = build(blog());

        state.page("blog/a").unwrap().scratch().set("k", 1);

        assert_eq!(
            state.page("blog/a").unwrap().scratch().get("k"),
            Some(serde_json::json!(1))
        );
        assert_eq!(state.page("blog/b").unwrap().scratch().get("k"), None);
    }

    #[test]
    fn test_concurrent_navigation_resolves_once() {
        let state = build(blog());
        let b = state.page("blog/b").unwrap();
        let barrier = Barrier::new(8);

        let results: Vec<Option<String>> = thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        b.prev().unwrap().map(|p| p.path().to_owned())
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(results.iter().all(|r| r.as_deref() == Some("blog/a")));
        assert!(b.graph().is_resolved("next_prev"));
    }
}
