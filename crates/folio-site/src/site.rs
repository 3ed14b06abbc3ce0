//! Site build driver.
//!
//! Provides [`Site`], which loads content from a [`Storage`] backend into an
//! immutable [`SiteState`], renders it in parallel and applies incremental
//! changes.
//!
//! # Thread Safety
//!
//! `Site` is designed for concurrent access:
//! - `state()` returns `Arc<SiteState>` with minimal locking (just Arc clone)
//! - `reload_if_needed()` uses double-checked locking, so concurrent callers
//!   trigger one build
//! - rebuilds swap the state atomically; readers keep the `Arc` they hold
//!
//! Scratch stores are keyed by tree path and owned by the site, so they
//! survive every rebuild.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use folio_config::Config;
//! use folio_site::{Site, SiteOptions};
//! use folio_storage::MockStorage;
//!
//! let storage = Arc::new(MockStorage::new().with_section("", "").with_page("a", ""));
//! let site = Site::new(Config::default(), storage, SiteOptions::default())?;
//! let state = site.rebuild()?;
//! let report = site.render(&my_renderer);
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;

use chrono::{DateTime, Utc};
use folio_config::Config;
use folio_lazy::{AbortFlag, BoxError};
use folio_storage::{ContentRecord, Storage};
use rayon::prelude::*;

use crate::content::{ContentAdapterFactory, NoopContent};
use crate::error::{BuildError, PageError};
use crate::output::OutputVariant;
use crate::page::{Page, PageSource};
use crate::scratch::ScratchRegistry;
use crate::state::{Plans, SiteState, StateInputs};

/// Site construction options.
#[derive(Clone)]
pub struct SiteOptions {
    /// Clock for draft/future/expiry checks (current time if `None`).
    pub now: Option<DateTime<Utc>>,
    /// Creates content adapters for variants.
    pub content: Arc<dyn ContentAdapterFactory>,
}

impl Default for SiteOptions {
    fn default() -> Self {
        Self {
            now: None,
            content: Arc::new(NoopContent),
        }
    }
}

impl std::fmt::Debug for SiteOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiteOptions")
            .field("now", &self.now)
            .finish_non_exhaustive()
    }
}

/// Writes one output variant.
pub trait VariantRenderer: Send + Sync {
    /// Render `variant`.
    ///
    /// # Errors
    ///
    /// Any error is reported for this variant only.
    fn render(&self, variant: &OutputVariant) -> Result<(), BoxError>;
}

/// A variant that failed to render.
#[derive(Debug)]
pub struct RenderFailure {
    /// Page path.
    pub path: String,
    /// Format name.
    pub format: String,
    /// Renderer error.
    pub error: BoxError,
}

impl RenderFailure {
    /// Failing cell, if the renderer returned a page resolution error.
    #[must_use]
    pub fn cell(&self) -> Option<&str> {
        self.error
            .downcast_ref::<PageError>()
            .and_then(PageError::cell)
    }
}

/// Outcome of a render pass.
#[derive(Debug, Default)]
pub struct BuildReport {
    /// Variants rendered successfully.
    pub rendered: usize,
    /// Variants not rendered because the build was aborted.
    pub skipped: usize,
    /// Variants that failed, each attributed to its page and format.
    pub failures: Vec<RenderFailure>,
}

impl BuildReport {
    /// Whether every scheduled variant rendered.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.skipped == 0
    }
}

enum Outcome {
    Rendered,
    Skipped,
    Failed(RenderFailure),
}

/// Content site: loading, rendering and incremental updates.
pub struct Site {
    config: Arc<Config>,
    storage: Arc<dyn Storage>,
    options: SiteOptions,
    plans: Plans,
    current_state: RwLock<Arc<SiteState>>,
    state_valid: AtomicBool,
    reload_lock: Mutex<()>,
    scratches: ScratchRegistry,
    abort: AbortFlag,
}

impl std::fmt::Debug for Site {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Site")
            .field("state", &self.state())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Site {
    /// Create a site. Content is not loaded until the first build.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Construction`] if a cell plan is invalid.
    pub fn new(
        config: Config,
        storage: Arc<dyn Storage>,
        options: SiteOptions,
    ) -> Result<Self, BuildError> {
        let config = Arc::new(config);
        let plans = Plans::new()?;
        let scratches = ScratchRegistry::default();
        let abort = AbortFlag::new();
        let empty = SiteState::assemble(
            StateInputs {
                config: Arc::clone(&config),
                plans: &plans,
                content: Arc::clone(&options.content),
                now: options.now.unwrap_or_else(Utc::now),
                scratches: &scratches,
                abort: abort.clone(),
            },
            Vec::new(),
        )?;
        Ok(Self {
            config,
            storage,
            options,
            plans,
            current_state: RwLock::new(empty),
            state_valid: AtomicBool::new(false),
            reload_lock: Mutex::new(()),
            scratches,
            abort,
        })
    }

    /// Site configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Current state (empty until the first build).
    #[must_use]
    pub fn state(&self) -> Arc<SiteState> {
        Arc::clone(&self.current_state.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Page at `path` in the current state.
    #[must_use]
    pub fn page(&self, path: &str) -> Option<Page> {
        self.state().page(path).cloned()
    }

    /// Build the site unless the current state is up to date.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError`] if loading or assembly fails; the previous state
    /// stays current.
    pub fn reload_if_needed(&self) -> Result<Arc<SiteState>, BuildError> {
        // Fast path: state valid
        if self.state_valid.load(Ordering::Acquire) {
            return Ok(self.state());
        }

        let _guard = self.reload_lock.lock().unwrap_or_else(PoisonError::into_inner);

        // Double-check after acquiring lock
        if self.state_valid.load(Ordering::Acquire) {
            return Ok(self.state());
        }
        self.load()
    }

    /// Rebuild the whole site from storage.
    ///
    /// Every page and variant is created anew; scratch stores are kept.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError`] if loading or assembly fails; the previous state
    /// stays current.
    pub fn rebuild(&self) -> Result<Arc<SiteState>, BuildError> {
        let _guard = self.reload_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.load()
    }

    /// Mark the current state outdated; the next `reload_if_needed()` rebuilds.
    pub fn mark_stale(&self) {
        self.state_valid.store(false, Ordering::Release);
    }

    fn load(&self) -> Result<Arc<SiteState>, BuildError> {
        let _span = tracing::info_span!("build").entered();
        let start = Instant::now();
        self.abort.clear();

        let batches = self.storage.scan()?;
        if self.abort.is_raised() {
            return Err(BuildError::Aborted);
        }
        let state = SiteState::assemble(
            StateInputs {
                config: Arc::clone(&self.config),
                plans: &self.plans,
                content: Arc::clone(&self.options.content),
                now: self.options.now.unwrap_or_else(Utc::now),
                scratches: &self.scratches,
                abort: self.abort.clone(),
            },
            batches,
        )?;
        if self.abort.is_raised() {
            return Err(BuildError::Aborted);
        }

        *self
            .current_state
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::clone(&state);
        self.state_valid.store(true, Ordering::Release);

        tracing::info!(
            pages = state.pages().len(),
            variants = state.variant_count(),
            elapsed_ms = start.elapsed().as_millis(),
            "Site built"
        );
        Ok(state)
    }

    /// Reset every derived property of the page at `path`.
    ///
    /// Returns `false` if no such page exists.
    pub fn invalidate(&self, path: &str) -> bool {
        let state = self.state();
        let Some(page) = state.page(path) else {
            return false;
        };
        page.reset();
        tracing::debug!(path, "Page invalidated");
        true
    }

    /// Apply a changed record.
    ///
    /// When only front matter or body changed, the page's source is swapped
    /// in place: its derived state is reset, listing and navigation cells of
    /// every other page are invalidated and the site indexes are recomputed
    /// on next use. The page is marked for the next fast render. New pages
    /// and records whose kind, outputs, target paths or language changed
    /// trigger a full rebuild. Like a rebuild, it lowers a raised abort flag.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError`] if a required rebuild fails.
    pub fn content_changed(&self, record: &ContentRecord) -> Result<(), BuildError> {
        let _guard = self.reload_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.abort.clear();
        let state = self.state();

        let Some(page) = state.page(&record.path).filter(|p| p.accepts(record)) else {
            tracing::info!(path = %record.path, "Content shape changed, rebuilding");
            return self.load().map(drop);
        };

        page.replace_source(PageSource::from_record(record, &self.config.default_language));
        page.reset();
        page.set_force_render(true);
        for other in state.pages().iter().filter(|p| p.path() != record.path) {
            other.invalidate_site_dependent();
        }
        state.graph().reset();

        tracing::debug!(path = %record.path, "Content updated in place");
        Ok(())
    }

    /// Abort the running build.
    ///
    /// Cells already resolved keep answering; no further cells are computed
    /// and pending variants of a render pass are skipped. Cells whose
    /// computation was cut short stay unresolved. The next build or content
    /// update clears the flag.
    pub fn abort(&self) {
        self.abort.raise();
        tracing::info!("Build abort requested");
    }

    /// Render every render-enabled variant in parallel.
    ///
    /// Failures are collected per variant and never stop other variants.
    pub fn render(&self, renderer: &dyn VariantRenderer) -> BuildReport {
        self.render_pages(renderer, |_| true)
    }

    /// Render only pages marked for forced rendering, then clear the marks.
    pub fn render_forced(&self, renderer: &dyn VariantRenderer) -> BuildReport {
        let report = self.render_pages(renderer, |page| page.force_render());
        for page in self.state().pages() {
            page.set_force_render(false);
        }
        report
    }

    fn render_pages(
        &self,
        renderer: &dyn VariantRenderer,
        selected: impl Fn(&Page) -> bool,
    ) -> BuildReport {
        let state = self.state();
        let _span = tracing::info_span!("render").entered();
        let start = Instant::now();

        let jobs: Vec<&Arc<OutputVariant>> = state
            .pages()
            .iter()
            .filter(|page| selected(page))
            .flat_map(|page| page.rendered_outputs())
            .collect();

        let outcomes: Vec<Outcome> = jobs
            .par_iter()
            .map(|variant| {
                if self.abort.is_raised() {
                    return Outcome::Skipped;
                }
                match renderer.render(variant) {
                    Ok(()) => Outcome::Rendered,
                    Err(e) if folio_lazy::is_aborted(e.as_ref()) => Outcome::Skipped,
                    Err(error) => Outcome::Failed(RenderFailure {
                        path: variant.identity().path().to_owned(),
                        format: variant.name().to_owned(),
                        error,
                    }),
                }
            })
            .collect();

        let mut report = BuildReport::default();
        for outcome in outcomes {
            match outcome {
                Outcome::Rendered => report.rendered += 1,
                Outcome::Skipped => report.skipped += 1,
                Outcome::Failed(failure) => {
                    tracing::warn!(
                        path = %failure.path,
                        format = %failure.format,
                        error = %failure.error,
                        "Variant failed to render"
                    );
                    report.failures.push(failure);
                }
            }
        }

        tracing::info!(
            rendered = report.rendered,
            skipped = report.skipped,
            failed = report.failures.len(),
            elapsed_ms = start.elapsed().as_millis(),
            "Render finished"
        );
        report
    }
}
