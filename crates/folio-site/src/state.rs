//! Assembled site state.
//!
//! [`SiteState`] is an immutable snapshot built by one coordinating pass:
//! the content tree, one [`Page`] per content-bearing node and one
//! [`OutputVariant`] per page and registered format. Pages live in a flat
//! `Vec` addressed by id; everything that refers to another page stores its
//! id and resolves it here.
//!
//! Site-wide indexes (navigation order, menus, translation groups) are lazy
//! cells of the state's own graph, computed on first use by any page.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use folio_config::Config;
use folio_lazy::{AbortFlag, ConstructionError, GraphPlan, LazyGraph, Resolver};
use folio_storage::{ContentBatch, ContentRecord};

use crate::content::ContentAdapterFactory;
use crate::error::{BuildError, PageError};
use crate::format::{OutputFormat, OutputFormats, TargetPaths};
use crate::menus::{self, Menus, PageMenuSource};
use crate::meta;
use crate::navigation::{self, NavigationIndex};
use crate::output::{self, OutputVariant};
use crate::page::{self, IdentitySeed, Page, PageIdentity, PageKind, PageSource, RecordShape};
use crate::scratch::ScratchRegistry;
use crate::translations::TranslationIndex;
use crate::tree::{ContentTree, NodeKind, TreeRef};

/// Path reported for failures of site-wide cells.
pub(crate) const SITE_SCOPE: &str = "<site>";

/// Cell plans shared by every state a site builds.
pub(crate) struct Plans {
    pub site: Arc<GraphPlan<SiteState>>,
    pub page: Arc<GraphPlan<PageIdentity>>,
    pub variant: Arc<GraphPlan<OutputVariant>>,
}

impl Plans {
    pub(crate) fn new() -> Result<Self, ConstructionError> {
        Ok(Self {
            site: plan()?,
            page: page::plan()?,
            variant: output::plan()?,
        })
    }
}

/// Inputs of [`SiteState::assemble`] other than the content itself.
pub(crate) struct StateInputs<'a> {
    pub config: Arc<Config>,
    pub plans: &'a Plans,
    pub content: Arc<dyn ContentAdapterFactory>,
    pub now: DateTime<Utc>,
    pub scratches: &'a ScratchRegistry,
    pub abort: AbortFlag,
}

struct PageSeed {
    identity: IdentitySeed,
    variants: Vec<(Arc<OutputFormat>, bool, TargetPaths)>,
}

impl PageSeed {
    fn new(
        id: usize,
        tree_ref: TreeRef,
        kind: PageKind,
        record: &ContentRecord,
        inputs: &StateInputs<'_>,
        formats: &OutputFormats,
    ) -> Self {
        let config = &inputs.config;
        let names = record.outputs.as_ref().unwrap_or_else(|| match kind {
            PageKind::Home => &config.outputs.home,
            PageKind::Section => &config.outputs.section,
            PageKind::Page => &config.outputs.page,
        });
        for name in names {
            if formats.get(name).is_none() {
                tracing::warn!(path = %record.path, format = %name, "Unknown output format ignored");
            }
        }

        let enabled: Vec<&Arc<OutputFormat>> = formats
            .iter()
            .filter(|f| names.contains(&f.name))
            .collect();
        let paths_for = |format: &OutputFormat| {
            record.target_paths.get(&format.name).map_or_else(
                || TargetPaths::for_item(format, &record.path, &config.base_url),
                |target| TargetPaths::from_target(format, target, &config.base_url),
            )
        };
        let main_paths = enabled
            .first()
            .copied()
            .or_else(|| formats.iter().next())
            .map(|f| paths_for(f))
            .unwrap_or_default();

        let variants = formats
            .iter()
            .map(|format| {
                let render_enabled = enabled.iter().any(|e| Arc::ptr_eq(e, format));
                let paths = if render_enabled {
                    paths_for(format)
                } else {
                    main_paths.clone()
                };
                (Arc::clone(format), render_enabled, paths)
            })
            .collect();

        Self {
            identity: IdentitySeed {
                id,
                path: record.path.clone(),
                kind,
                tree_ref,
                source: PageSource::from_record(record, &config.default_language),
                enabled_formats: enabled.iter().map(|f| f.name.clone()).collect(),
                main_paths,
                scratch: inputs.scratches.for_path(&record.path),
                shape: RecordShape::of(record),
            },
            variants,
        }
    }

    fn into_page(self, site: &Weak<SiteState>, plans: &Plans, abort: &AbortFlag) -> Page {
        let identity = Arc::new(PageIdentity::new(
            Weak::clone(site),
            self.identity,
            Arc::clone(&plans.page),
            abort.clone(),
        ));
        let outputs = self
            .variants
            .into_iter()
            .map(|(format, render_enabled, paths)| {
                Arc::new(OutputVariant::new(
                    Arc::clone(&identity),
                    format,
                    render_enabled,
                    paths,
                    Arc::clone(&plans.variant),
                    abort.clone(),
                ))
            })
            .collect();
        Page::new(identity, outputs)
    }
}

/// Immutable snapshot of a loaded site.
pub struct SiteState {
    config: Arc<Config>,
    formats: OutputFormats,
    tree: ContentTree,
    pages: Vec<Page>,
    page_index: HashMap<String, usize>,
    node_pages: Vec<Option<usize>>,
    languages: Vec<String>,
    graph: LazyGraph<SiteState>,
    content: Arc<dyn ContentAdapterFactory>,
    now: DateTime<Utc>,
}

impl std::fmt::Debug for SiteState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiteState")
            .field("pages", &self.pages.len())
            .field("nodes", &self.tree.len())
            .field("formats", &self.formats.len())
            .field("now", &self.now)
            .finish_non_exhaustive()
    }
}

impl SiteState {
    /// Build a state from loaded batches.
    ///
    /// Tree and page construction are single-threaded; nothing is resolved
    /// lazily here.
    pub(crate) fn assemble(
        inputs: StateInputs<'_>,
        batches: Vec<ContentBatch>,
    ) -> Result<Arc<Self>, BuildError> {
        let records: Vec<ContentRecord> = batches.into_iter().flat_map(|b| b.records).collect();
        let tree = ContentTree::from_records(&records)?;
        let formats = OutputFormats::from_config(&inputs.config);
        let by_path: HashMap<&str, &ContentRecord> = records
            .iter()
            .filter(|r| r.kind.is_page())
            .map(|r| (r.path.as_str(), r))
            .collect();

        let mut seeds = Vec::with_capacity(by_path.len());
        let mut node_pages = vec![None; tree.len()];
        for node in tree.iter() {
            if !tree.has_content(node) {
                continue;
            }
            let Some(record) = by_path.get(tree.path(node)) else {
                continue;
            };
            let kind = match tree.kind(node) {
                NodeKind::Branch if node == tree.root() => PageKind::Home,
                NodeKind::Branch => PageKind::Section,
                NodeKind::Leaf => PageKind::Page,
            };
            node_pages[node.index()] = Some(seeds.len());
            seeds.push(PageSeed::new(seeds.len(), node, kind, record, &inputs, &formats));
        }

        let StateInputs {
            config,
            plans,
            content,
            now,
            abort,
            ..
        } = inputs;
        let languages = config.language_order();
        Ok(Arc::new_cyclic(|site: &Weak<Self>| {
            let pages: Vec<Page> = seeds
                .into_iter()
                .map(|seed| seed.into_page(site, plans, &abort))
                .collect();
            let page_index = pages
                .iter()
                .map(|p| (p.path().to_owned(), p.id()))
                .collect();
            Self {
                config,
                formats,
                tree,
                pages,
                page_index,
                node_pages,
                languages,
                graph: LazyGraph::with_abort(Arc::clone(&plans.site), abort),
                content,
                now,
            }
        }))
    }

    /// Site configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Registered output formats.
    #[must_use]
    pub fn formats(&self) -> &OutputFormats {
        &self.formats
    }

    /// Content tree.
    #[must_use]
    pub fn tree(&self) -> &ContentTree {
        &self.tree
    }

    /// Every page, in tree order.
    #[must_use]
    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    /// Page at tree path `path`.
    #[must_use]
    pub fn page(&self, path: &str) -> Option<&Page> {
        self.page_index.get(path).map(|&id| &self.pages[id])
    }

    /// The home page, if the root has content.
    #[must_use]
    pub fn home(&self) -> Option<&Page> {
        self.page_for_node(self.tree.root())
    }

    /// Number of output variants across all pages.
    #[must_use]
    pub fn variant_count(&self) -> usize {
        self.pages.iter().map(|p| p.outputs().len()).sum()
    }

    /// Clock used for future and expiry checks.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Configured languages, in weight order.
    #[must_use]
    pub fn languages(&self) -> &[String] {
        &self.languages
    }

    /// Every navigable regular page, newest first.
    pub fn regular_pages(&self) -> Result<Vec<Page>, PageError> {
        Ok(self
            .navigation()?
            .global()
            .iter()
            .map(|&id| self.pages[id].clone())
            .collect())
    }

    /// Site menus.
    pub fn menus(&self) -> Result<Arc<Menus>, PageError> {
        self.cell("menus")
    }

    pub(crate) fn page_id(&self, path: &str) -> Option<usize> {
        self.page_index.get(path).copied()
    }

    pub(crate) fn page_by_id(&self, id: usize) -> &Page {
        &self.pages[id]
    }

    pub(crate) fn page_id_for_node(&self, node: TreeRef) -> Option<usize> {
        self.node_pages.get(node.index()).copied().flatten()
    }

    pub(crate) fn page_for_node(&self, node: TreeRef) -> Option<&Page> {
        self.page_id_for_node(node).map(|id| &self.pages[id])
    }

    pub(crate) fn content_factory(&self) -> &dyn ContentAdapterFactory {
        self.content.as_ref()
    }

    pub(crate) fn graph(&self) -> &LazyGraph<Self> {
        &self.graph
    }

    pub(crate) fn navigation(&self) -> Result<Arc<NavigationIndex<usize>>, PageError> {
        self.cell("navigation")
    }

    pub(crate) fn translations(&self) -> Result<Arc<TranslationIndex<usize>>, PageError> {
        self.cell("translations")
    }

    fn cell<T: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>, PageError> {
        self.graph
            .get(self, name)
            .map_err(|e| PageError::resolution(SITE_SCOPE, name, e))
    }

    /// Published pages among `ids`, in listing order.
    ///
    /// Pages whose publishing state can't be resolved are left out with a
    /// warning. An aborted build fails the whole listing.
    pub(crate) fn listed(
        &self,
        ids: impl IntoIterator<Item = usize>,
    ) -> Result<Vec<usize>, PageError> {
        let mut entries = Vec::new();
        for id in ids {
            let page = &self.pages[id];
            match page.listing_key() {
                Ok(Some(key)) => entries.push((key, id)),
                Ok(None) => {}
                Err(e) if e.is_aborted() => return Err(e),
                Err(e) => {
                    tracing::warn!(path = %page.path(), error = %e, "Page excluded from listing");
                }
            }
        }
        Ok(navigation::sorted(entries))
    }

    fn is_visible(page: &Page) -> Result<bool, PageError> {
        match page.is_published() {
            Err(e) if !e.is_aborted() => {
                tracing::warn!(path = %page.path(), error = %e, "Unpublishable page skipped");
                Ok(false)
            }
            result => result,
        }
    }

    fn build_navigation(&self) -> Result<NavigationIndex<usize>, PageError> {
        let mut entries = Vec::new();
        for page in &self.pages {
            if page.kind() != PageKind::Page || page.rendered_outputs().next().is_none() {
                continue;
            }
            match page.listing_key() {
                Ok(Some(key)) => {
                    let section = self.tree.section(page.tree_ref()).index();
                    entries.push((page.id(), section, key));
                }
                Ok(None) => {}
                Err(e) if e.is_aborted() => return Err(e),
                Err(e) => {
                    tracing::warn!(path = %page.path(), error = %e, "Page excluded from navigation");
                }
            }
        }
        Ok(NavigationIndex::new(entries))
    }

    fn build_menus(&self) -> Result<Menus, PageError> {
        let mut entries = Vec::new();
        for page in &self.pages {
            if !Self::is_visible(page)? {
                continue;
            }
            let source = page.source();
            let title = page.title();
            let menu_page = PageMenuSource {
                path: page.path(),
                title: &title,
                weight: meta::weight(&source.metadata),
                url: page.rel_permalink(),
            };
            match menus::page_entries(&source.metadata, &menu_page) {
                Ok(found) => entries.extend(found),
                Err(e) => {
                    tracing::warn!(path = %page.path(), error = %e, "Invalid menu entry ignored");
                }
            }
        }
        Ok(Menus::build(&self.config.menus, entries))
    }

    fn build_translations(&self) -> Result<TranslationIndex<usize>, PageError> {
        let mut entries = Vec::new();
        for page in &self.pages {
            if !Self::is_visible(page)? {
                continue;
            }
            match page.translation_key() {
                Ok(key) => entries.push((key, page.lang(), page.id())),
                Err(e) if e.is_aborted() => return Err(e),
                Err(e) => {
                    tracing::warn!(path = %page.path(), error = %e, "Page excluded from translations");
                }
            }
        }
        Ok(TranslationIndex::new(entries, &self.languages))
    }
}

fn plan() -> Result<Arc<GraphPlan<SiteState>>, ConstructionError> {
    GraphPlan::builder()
        .cell("navigation", &[], |r: &Resolver<'_, SiteState>| {
            Ok(r.context().build_navigation()?)
        })
        .cell("menus", &[], |r: &Resolver<'_, SiteState>| {
            Ok(r.context().build_menus()?)
        })
        .cell("translations", &[], |r: &Resolver<'_, SiteState>| {
            Ok(r.context().build_translations()?)
        })
        .build()
}
