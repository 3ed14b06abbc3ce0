//! Content rendering seam.
//!
//! Markup conversion lives outside the page model. A [`ContentAdapterFactory`]
//! creates one [`ContentAdapter`] per output variant, the first time that
//! variant's content is requested. The adapter provides all four rendering
//! facets together (body, table of contents, shortcode rendering, plain
//! text); a variant either has a complete adapter or none.

use std::sync::Arc;

use folio_lazy::BoxError;
use serde::Serialize;

use crate::output::OutputVariant;

/// Table of contents entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TocEntry {
    /// Heading level (1-6).
    pub level: u8,
    /// Heading text.
    pub title: String,
    /// Anchor ID for linking.
    pub id: String,
}

/// Renders one variant's content.
pub trait ContentAdapter: Send + Sync {
    /// Rendered body.
    fn content(&self) -> Result<String, BoxError>;

    /// Table of contents of the rendered body.
    fn table_of_contents(&self) -> Result<Vec<TocEntry>, BoxError>;

    /// Body with shortcodes rendered but markup left as-is.
    fn render_shortcodes(&self) -> Result<String, BoxError>;

    /// Rendered body stripped of markup.
    fn plain(&self) -> Result<String, BoxError>;

    /// Switch to placeholder output for content embedded before it is final.
    fn enable_placeholders(&self) {}
}

/// Creates content adapters for variants.
pub trait ContentAdapterFactory: Send + Sync {
    /// Adapter for `variant`.
    ///
    /// # Errors
    ///
    /// Returns an error if the variant's source can't be prepared.
    fn create(&self, variant: &OutputVariant) -> Result<Arc<dyn ContentAdapter>, BoxError>;
}

/// Stand-in adapter producing empty output.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopContent;

impl ContentAdapter for NoopContent {
    fn content(&self) -> Result<String, BoxError> {
        Ok(String::new())
    }

    fn table_of_contents(&self) -> Result<Vec<TocEntry>, BoxError> {
        Ok(Vec::new())
    }

    fn render_shortcodes(&self) -> Result<String, BoxError> {
        Ok(String::new())
    }

    fn plain(&self) -> Result<String, BoxError> {
        Ok(String::new())
    }
}

impl ContentAdapterFactory for NoopContent {
    fn create(&self, _variant: &OutputVariant) -> Result<Arc<dyn ContentAdapter>, BoxError> {
        Ok(Arc::new(Self))
    }
}
