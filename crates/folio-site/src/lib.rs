//! Page model for folio.
//!
//! This crate provides:
//! - [`ContentTree`]: content items arranged by tree path, synthetic
//!   sections included
//! - [`Page`] / [`PageIdentity`]: one per content item, with lazily derived
//!   navigation, listings, menus, translations and resources
//! - [`OutputVariant`]: one per page and registered output format, with
//!   target paths, content adapter and paginator
//! - [`Site`]: loads a [`SiteState`] from storage, renders it in parallel
//!   and applies incremental changes
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use folio_config::Config;
//! use folio_site::{Site, SiteOptions};
//! use folio_storage::MockStorage;
//!
//! let storage = MockStorage::new()
//!     .with_section("", "")
//!     .with_section("blog", "")
//!     .with_page("blog/a", "---\ndate: 2024-01-01\n---\n")
//!     .with_page("blog/b", "---\ndate: 2024-02-01\n---\n");
//! let site = Site::new(Config::default(), Arc::new(storage), SiteOptions::default())?;
//! let state = site.rebuild()?;
//!
//! let b = state.page("blog/b").expect("page exists");
//! assert!(b.next()?.is_none());
//! assert_eq!(b.prev()?.expect("older page").path(), "blog/a");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod content;
mod error;
mod format;
mod menus;
mod meta;
mod navigation;
mod output;
mod page;
mod paginator;
mod scratch;
mod shortcodes;
mod site;
mod state;
mod translations;
mod tree;

pub use content::{ContentAdapter, ContentAdapterFactory, NoopContent, TocEntry};
pub use error::{
    BuildError, FormatMismatchError, PageError, PaginationError, ScratchError, TreeError,
};
pub use format::{OutputFormat, OutputFormats, TargetPaths};
pub use menus::{MenuEntry, Menus};
pub use meta::{Dates, MetaError};
pub use navigation::{NavigationIndex, NextPrev, SortKey};
pub use output::OutputVariant;
pub use page::{LayoutDescriptor, Page, PageIdentity, PageKind, PageSource};
pub use paginator::{Pager, PagerPaths, Paginator};
pub use scratch::Scratch;
pub use shortcodes::Shortcode;
pub use site::{BuildReport, RenderFailure, Site, SiteOptions, VariantRenderer};
pub use state::SiteState;
pub use translations::TranslationIndex;
pub use tree::{ContentTree, NodeKind, Resource, TreeBuilder, TreeRef};

