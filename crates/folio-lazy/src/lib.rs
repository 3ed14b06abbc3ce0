//! Lazy, exactly-once evaluation for folio.
//!
//! This crate provides:
//! - [`LazyCell`]: a single memoized value, computed by exactly one caller per
//!   generation while concurrent callers wait for the result
//! - [`GraphPlan`] / [`LazyGraph`]: named cells with declared dependencies,
//!   validated once and instantiated per owner
//! - [`AbortFlag`]: stops scheduling new cells when a build is aborted
//!
//! # Quick Start
//!
//! ```
//! use folio_lazy::{GraphPlan, LazyGraph, Resolver};
//!
//! struct Post {
//!     words: usize,
//! }
//!
//! let plan = GraphPlan::builder()
//!     .cell("words", &[], |r: &Resolver<'_, Post>| Ok(r.context().words))
//!     .cell("minutes", &["words"], |r: &Resolver<'_, Post>| {
//!         Ok(r.dep::<usize>("words")?.div_ceil(200))
//!     })
//!     .build()?;
//!
//! let post = Post { words: 450 };
//! let graph = LazyGraph::new(plan);
//! assert_eq!(*graph.get::<usize>(&post, "minutes")?, 3);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod cell;
mod error;
mod graph;

pub use cell::{CellResult, LazyCell};
pub use error::{BoxError, ConstructionError, LazyError, ResolutionError, is_aborted};
pub use graph::{AbortFlag, GraphPlan, LazyGraph, PlanBuilder, Resolver};
