//! Error types for lazy graphs.
//!
//! Errors fall into two groups:
//! - [`ConstructionError`]: programming errors detected while declaring cells
//!   (cycles, unknown dependencies). These are fatal for a build.
//! - [`ResolutionError`]: a compute function failed. The error is cached on the
//!   cell and handed to every caller until the graph is reset.
//!
//! A compute function that fails because the build was aborted while it ran
//! is not a resolution failure: [`is_aborted`] recognises such errors and the
//! cell stays unresolved.

use std::sync::Arc;

/// Boxed error returned by compute functions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error raised while declaring cells.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConstructionError {
    /// Declared dependencies form a cycle.
    #[error("Dependency cycle: {}", .path.join(" -> "))]
    Cycle {
        /// Cell names along the cycle, first name repeated at the end.
        path: Vec<String>,
    },
    /// A dependency names a cell that was never declared.
    #[error("Cell {cell} depends on undeclared cell {dependency}")]
    UnknownDependency {
        /// Declaring cell.
        cell: String,
        /// Missing dependency.
        dependency: String,
    },
    /// The same cell name was declared twice.
    #[error("Cell {0} declared twice")]
    DuplicateCell(String),
    /// A cell was requested that is not part of the graph.
    #[error("Unknown cell: {0}")]
    UnknownCell(String),
}

/// Error cached on a cell whose computation failed.
///
/// Cloning is cheap: the underlying source is reference counted, so every
/// caller of a failed cell observes the same error instance.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ResolutionError {
    /// The compute function returned an error.
    #[error("{cell}: {source}")]
    Failed {
        /// Failing cell.
        cell: String,
        /// Error returned by the compute function.
        #[source]
        source: Arc<dyn std::error::Error + Send + Sync>,
    },
    /// A declared dependency failed, so the compute function never ran.
    #[error("{cell}: dependency {dependency} failed")]
    Dependency {
        /// Dependent cell.
        cell: String,
        /// Failed dependency.
        dependency: String,
        /// The dependency's own error.
        #[source]
        source: Box<ResolutionError>,
    },
}

impl ResolutionError {
    /// Wrap a compute-function error for `cell`.
    #[must_use]
    pub fn failed(cell: impl Into<String>, source: BoxError) -> Self {
        Self::Failed {
            cell: cell.into(),
            source: Arc::from(source),
        }
    }

    /// Name of the cell this error is cached on.
    #[must_use]
    pub fn cell(&self) -> &str {
        match self {
            Self::Failed { cell, .. } | Self::Dependency { cell, .. } => cell,
        }
    }

    /// The innermost failure: the cell whose compute function actually failed.
    #[must_use]
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::Failed { .. } => self,
            Self::Dependency { source, .. } => source.root_cause(),
        }
    }

    /// Whether the failure stems from an aborted build.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        match self {
            Self::Failed { source, .. } => is_aborted(&**source),
            Self::Dependency { source, .. } => source.is_aborted(),
        }
    }
}

/// Error returned when reading a cell from a [`LazyGraph`](crate::LazyGraph).
#[derive(Clone, Debug, thiserror::Error)]
pub enum LazyError {
    /// Structural problem with the graph.
    #[error(transparent)]
    Construction(#[from] ConstructionError),
    /// The cell (or one of its dependencies) failed to compute.
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    /// The cell holds a value of a different type than requested.
    #[error("Cell {cell} does not hold a value of type {expected}")]
    TypeMismatch {
        /// Requested cell.
        cell: String,
        /// Requested type name.
        expected: &'static str,
    },
    /// The build was aborted before the cell could be scheduled.
    #[error("Build aborted before {cell} was resolved")]
    Aborted {
        /// Requested cell.
        cell: String,
    },
}

impl LazyError {
    /// Whether the read failed because the build was aborted, directly or
    /// inside a compute function.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        match self {
            Self::Aborted { .. } => true,
            Self::Resolution(e) => e.is_aborted(),
            Self::Construction(_) | Self::TypeMismatch { .. } => false,
        }
    }

    /// Name of the cell involved, if the error concerns a single cell.
    #[must_use]
    pub fn cell(&self) -> Option<&str> {
        match self {
            Self::Resolution(e) => Some(e.cell()),
            Self::TypeMismatch { cell, .. } | Self::Aborted { cell } => Some(cell),
            Self::Construction(ConstructionError::UnknownCell(cell)) => Some(cell),
            Self::Construction(_) => None,
        }
    }
}

/// Whether `error` or any error in its source chain is an aborted read.
///
/// Works through wrappers of other crates as long as they expose the
/// [`LazyError`] via `source()`.
#[must_use]
pub fn is_aborted(error: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(error);
    while let Some(err) = current {
        if let Some(lazy) = err.downcast_ref::<LazyError>() {
            return lazy.is_aborted();
        }
        if let Some(resolution) = err.downcast_ref::<ResolutionError>() {
            return resolution.is_aborted();
        }
        current = err.source();
    }
    false
}
