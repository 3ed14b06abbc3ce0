//! Output variants.
//!
//! An [`OutputVariant`] is one page rendered into one output format. Every
//! page gets a variant for every registered format; formats the page does
//! not enable are still addressable (for cross-format links) but not
//! rendered, and link like the page's first enabled format.
//!
//! Expensive state lives in a per-variant [`LazyGraph`]: the content adapter
//! (created on first content access) and the paginator (branch pages only).

use std::sync::{Arc, Mutex, PoisonError};

use folio_lazy::{AbortFlag, ConstructionError, GraphPlan, LazyGraph, Resolver};

use crate::content::{ContentAdapter, TocEntry};
use crate::error::{PageError, PaginationError};
use crate::format::{OutputFormat, TargetPaths};
use crate::page::{Page, PageIdentity};
use crate::paginator::{PagerPaths, Paginator};

/// Options pagination was initialised with.
#[derive(Clone, Debug, PartialEq, Eq)]
enum PaginateRequest {
    /// Regular pages below the node, configured page size.
    Default,
    /// Explicit elements and page size.
    Custom {
        elements: Vec<usize>,
        page_size: usize,
    },
}

/// One page rendered into one output format.
pub struct OutputVariant {
    identity: Arc<PageIdentity>,
    format: Arc<OutputFormat>,
    render_enabled: bool,
    paths: TargetPaths,
    graph: LazyGraph<OutputVariant>,
    pagination: Mutex<Option<(u64, PaginateRequest)>>,
}

impl std::fmt::Debug for OutputVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputVariant")
            .field("path", &self.identity.path())
            .field("format", &self.format.name)
            .field("render_enabled", &self.render_enabled)
            .field("paths", &self.paths)
            .finish_non_exhaustive()
    }
}

impl OutputVariant {
    /// Variant of `identity` for `format`.
    ///
    /// `paths` must already be the fallback paths when the format is not
    /// enabled for the page.
    pub(crate) fn new(
        identity: Arc<PageIdentity>,
        format: Arc<OutputFormat>,
        render_enabled: bool,
        paths: TargetPaths,
        plan: Arc<GraphPlan<Self>>,
        abort: AbortFlag,
    ) -> Self {
        Self {
            identity,
            format,
            render_enabled,
            paths,
            graph: LazyGraph::with_abort(plan, abort),
            pagination: Mutex::new(None),
        }
    }

    /// Page this variant renders.
    #[must_use]
    pub fn identity(&self) -> &Arc<PageIdentity> {
        &self.identity
    }

    /// Output format.
    #[must_use]
    pub fn format(&self) -> &Arc<OutputFormat> {
        &self.format
    }

    /// Output format name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.format.name
    }

    /// Whether this variant is written during a render pass.
    #[must_use]
    pub fn is_render_enabled(&self) -> bool {
        self.render_enabled
    }

    /// Path and link data.
    #[must_use]
    pub fn target_paths(&self) -> &TargetPaths {
        &self.paths
    }

    /// Output file path (`/blog/a/index.html`).
    #[must_use]
    pub fn target_path(&self) -> &str {
        &self.paths.target_path
    }

    /// Site-relative link.
    #[must_use]
    pub fn rel_permalink(&self) -> &str {
        &self.paths.rel_permalink
    }

    /// Absolute link.
    #[must_use]
    pub fn permalink(&self) -> &str {
        &self.paths.permalink
    }

    fn cell<T: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>, PageError> {
        self.graph
            .get(self, name)
            .map_err(|e| PageError::resolution(self.identity.path(), name, e))
    }

    /// Rendered body.
    pub fn content(&self) -> Result<String, PageError> {
        self.cell::<String>("content").map(|c| c.as_ref().clone())
    }

    /// Table of contents.
    pub fn table_of_contents(&self) -> Result<Vec<TocEntry>, PageError> {
        self.cell::<Vec<TocEntry>>("table_of_contents")
            .map(|t| t.as_ref().clone())
    }

    /// Body with shortcodes rendered.
    pub fn render_shortcodes(&self) -> Result<String, PageError> {
        self.cell::<String>("rendered_shortcodes")
            .map(|c| c.as_ref().clone())
    }

    /// Rendered body without markup.
    pub fn plain(&self) -> Result<String, PageError> {
        self.cell::<String>("plain").map(|c| c.as_ref().clone())
    }

    /// Switch the content adapter to placeholder output.
    ///
    /// Does nothing until content has been requested once.
    pub fn enable_placeholders(&self) {
        if !self.graph.is_resolved("content_provider") {
            return;
        }
        if let Ok(provider) = self
            .graph
            .get::<Arc<dyn ContentAdapter>>(self, "content_provider")
        {
            provider.enable_placeholders();
        }
    }

    /// Paginator over the regular pages below this list page.
    ///
    /// `None` for leaf pages and variants that are not rendered. If
    /// [`paginate`](Self::paginate) ran first, its pagination is returned.
    pub fn paginator(&self) -> Result<Option<Paginator<Page>>, PageError> {
        if !self.render_enabled || !self.identity.is_node() {
            return Ok(None);
        }
        self.claim(PaginateRequest::Default)?;
        self.resolve_paginator().map(Some)
    }

    /// Paginate `elements` with `page_size` (configured size if `None`).
    ///
    /// Pagination is initialised once per rebuild generation.
    ///
    /// # Errors
    ///
    /// Returns [`PaginationError::OptionsConflict`] if pagination was already
    /// initialised with other options, [`PaginationError::NotANode`] for
    /// leaf pages and [`PaginationError::InvalidPageSize`] for a size of 0.
    pub fn paginate(
        &self,
        elements: &[Page],
        page_size: Option<usize>,
    ) -> Result<Paginator<Page>, PageError> {
        if !self.identity.is_node() {
            return Err(PaginationError::NotANode {
                path: self.identity.path().to_owned(),
            }
            .into());
        }
        if !self.render_enabled {
            return Err(PaginationError::NotRendered {
                path: self.identity.path().to_owned(),
                format: self.format.name.clone(),
            }
            .into());
        }
        let site = self.identity.site()?;
        let page_size = page_size.unwrap_or(site.config().pagination.page_size);
        if page_size == 0 {
            return Err(PaginationError::InvalidPageSize.into());
        }
        let elements = elements
            .iter()
            .filter_map(|page| site.page_id(page.path()))
            .collect();
        self.claim(PaginateRequest::Custom {
            elements,
            page_size,
        })?;
        self.resolve_paginator()
    }

    fn claim(&self, request: PaginateRequest) -> Result<(), PaginationError> {
        let generation = self.graph.generation();
        let mut slot = self
            .pagination
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match slot.as_ref() {
            Some((claimed, existing)) if *claimed == generation => {
                if request == PaginateRequest::Default || *existing == request {
                    Ok(())
                } else {
                    Err(PaginationError::OptionsConflict {
                        path: self.identity.path().to_owned(),
                    })
                }
            }
            _ => {
                *slot = Some((generation, request));
                Ok(())
            }
        }
    }

    fn request(&self) -> PaginateRequest {
        let generation = self.graph.generation();
        match self
            .pagination
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            Some((claimed, request)) if *claimed == generation => request.clone(),
            _ => PaginateRequest::Default,
        }
    }

    fn resolve_paginator(&self) -> Result<Paginator<Page>, PageError> {
        let ids = self.cell::<Paginator<usize>>("paginator")?;
        let site = self.identity.site()?;
        Ok(ids.map(|&id| site.page_by_id(id).clone()))
    }

    pub(crate) fn reset(&self) {
        self.graph.reset();
    }

    /// Recompute the paginator; listings it was built from may have changed.
    pub(crate) fn invalidate_listing(&self) {
        if let Err(e) = self.graph.invalidate("paginator") {
            tracing::debug!(path = %self.identity.path(), error = %e, "invalidate failed");
        }
    }
}

/// Cell plan shared by every output variant.
pub(crate) fn plan() -> Result<Arc<GraphPlan<OutputVariant>>, ConstructionError> {
    GraphPlan::builder()
        .cell("content_provider", &[], |r: &Resolver<'_, OutputVariant>| {
            let variant = r.context();
            variant.identity.site()?.content_factory().create(variant)
        })
        .cell(
            "content",
            &["content_provider"],
            |r: &Resolver<'_, OutputVariant>| {
                r.dep::<Arc<dyn ContentAdapter>>("content_provider")?
                    .content()
            },
        )
        .cell(
            "table_of_contents",
            &["content_provider"],
            |r: &Resolver<'_, OutputVariant>| {
                r.dep::<Arc<dyn ContentAdapter>>("content_provider")?
                    .table_of_contents()
            },
        )
        .cell(
            "rendered_shortcodes",
            &["content_provider"],
            |r: &Resolver<'_, OutputVariant>| {
                r.dep::<Arc<dyn ContentAdapter>>("content_provider")?
                    .render_shortcodes()
            },
        )
        .cell(
            "plain",
            &["content_provider"],
            |r: &Resolver<'_, OutputVariant>| {
                r.dep::<Arc<dyn ContentAdapter>>("content_provider")?
                    .plain()
            },
        )
        .cell("paginator", &[], |r: &Resolver<'_, OutputVariant>| {
            let variant = r.context();
            let site = variant.identity.site()?;
            let config = site.config();
            let (elements, page_size) = match variant.request() {
                PaginateRequest::Default => (
                    variant.identity.regular_page_ids_recursive()?.as_ref().clone(),
                    config.pagination.page_size,
                ),
                PaginateRequest::Custom {
                    elements,
                    page_size,
                } => (elements, page_size),
            };
            let paths = PagerPaths {
                format: Arc::clone(&variant.format),
                first: variant.paths.clone(),
                segment: config.pagination.path.clone(),
                base_url: config.base_url.clone(),
            };
            Ok(Paginator::new(elements, page_size, paths)?)
        })
        .build()
}
