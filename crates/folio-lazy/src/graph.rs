//! Named lazy cells with declared dependencies.
//!
//! A [`GraphPlan`] describes the cells (name, dependencies, compute function)
//! and is validated once: unknown dependencies and cycles are rejected by
//! [`PlanBuilder::build`]. Every owner then instantiates its own
//! [`LazyGraph`] from the shared plan, which only allocates one empty
//! [`LazyCell`] per declared cell.
//!
//! # Resolution
//!
//! Reading a cell resolves its declared dependencies first, in declaration
//! order. If a dependency fails, the dependent is marked failed with a
//! [`ResolutionError::Dependency`] and its compute function is never called.
//! Compute functions receive a [`Resolver`] giving access to the owner (the
//! graph context) and to the values of their declared dependencies.
//!
//! # Rebuilds
//!
//! [`LazyGraph::reset`] bumps the graph generation, invalidating every cell at
//! once without waiting for computations in flight. [`LazyGraph::invalidate`]
//! resets a single cell and everything that transitively depends on it.

use std::any::{Any, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::cell::LazyCell;
use crate::error::{BoxError, ConstructionError, LazyError, ResolutionError};

/// Type-erased cell value.
type Value = Arc<dyn Any + Send + Sync>;

type ComputeFn<C> = Arc<dyn Fn(&Resolver<'_, C>) -> Result<Value, BoxError> + Send + Sync>;

struct CellDef<C> {
    name: String,
    deps: Vec<String>,
    compute: ComputeFn<C>,
}

impl<C> CellDef<C> {
    fn new<T, F>(name: &str, deps: &[&str], compute: F) -> Self
    where
        C: 'static,
        T: Send + Sync + 'static,
        F: Fn(&Resolver<'_, C>) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        Self {
            name: name.to_owned(),
            deps: deps.iter().map(|&d| d.to_owned()).collect(),
            compute: Arc::new(move |resolver: &Resolver<'_, C>| {
                compute(resolver).map(|v| Arc::new(v) as Value)
            }),
        }
    }
}

/// Shared raise-once flag used to stop scheduling new cells.
///
/// Cells that already hold a value keep answering after the flag is raised.
#[derive(Clone, Debug, Default)]
pub struct AbortFlag(Arc<AtomicBool>);

impl AbortFlag {
    /// Create a lowered flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag.
    pub fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Lower the flag again (start of a new build).
    pub fn clear(&self) {
        self.0.store(false, Ordering::Release);
    }

    /// Whether the flag is raised.
    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Validated set of cell definitions shared by many graphs.
pub struct GraphPlan<C> {
    cells: Vec<CellDef<C>>,
    index: HashMap<String, usize>,
}

impl<C> GraphPlan<C> {
    /// Start declaring cells.
    #[must_use]
    pub fn builder() -> PlanBuilder<C> {
        PlanBuilder {
            cells: Vec::new(),
            duplicate: None,
        }
    }

    /// Names of the declared cells, in declaration order.
    pub fn cell_names(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|c| c.name.as_str())
    }

    /// Whether `name` is declared.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }
}

impl<C> fmt::Debug for GraphPlan<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphPlan")
            .field("cells", &self.cells.iter().map(|c| &c.name).collect::<Vec<_>>())
            .finish()
    }
}

/// Builder for [`GraphPlan`].
pub struct PlanBuilder<C> {
    cells: Vec<CellDef<C>>,
    duplicate: Option<String>,
}

impl<C> PlanBuilder<C> {
    /// Declare a cell.
    ///
    /// `deps` name cells that must resolve before `compute` runs. They may be
    /// declared later in the chain; everything is checked by [`build`](Self::build).
    #[must_use]
    pub fn cell<T, F>(mut self, name: &str, deps: &[&str], compute: F) -> Self
    where
        C: 'static,
        T: Send + Sync + 'static,
        F: Fn(&Resolver<'_, C>) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        if self.cells.iter().any(|c| c.name == name) && self.duplicate.is_none() {
            self.duplicate = Some(name.to_owned());
        }
        self.cells.push(CellDef::new(name, deps, compute));
        self
    }

    /// Validate the declarations.
    ///
    /// # Errors
    ///
    /// Returns [`ConstructionError`] for duplicate names, undeclared
    /// dependencies, or dependency cycles.
    pub fn build(self) -> Result<Arc<GraphPlan<C>>, ConstructionError> {
        if let Some(name) = self.duplicate {
            return Err(ConstructionError::DuplicateCell(name));
        }

        let index: HashMap<String, usize> = self
            .cells
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.clone(), i))
            .collect();

        for cell in &self.cells {
            for dep in &cell.deps {
                if !index.contains_key(dep) {
                    return Err(ConstructionError::UnknownDependency {
                        cell: cell.name.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        detect_cycle(&self.cells, &index)?;

        Ok(Arc::new(GraphPlan {
            cells: self.cells,
            index,
        }))
    }
}

/// Depth-first search with three colors. Reports the first cycle found.
fn detect_cycle<C>(
    cells: &[CellDef<C>],
    index: &HashMap<String, usize>,
) -> Result<(), ConstructionError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        New,
        Active,
        Done,
    }

    fn visit<C>(
        i: usize,
        cells: &[CellDef<C>],
        index: &HashMap<String, usize>,
        marks: &mut [Mark],
        stack: &mut Vec<usize>,
    ) -> Result<(), ConstructionError> {
        marks[i] = Mark::Active;
        stack.push(i);
        for dep in &cells[i].deps {
            let j = index[dep];
            match marks[j] {
                Mark::Done => {}
                Mark::New => visit(j, cells, index, marks, stack)?,
                Mark::Active => {
                    let start = stack.iter().position(|&k| k == j).unwrap_or(0);
                    let mut path: Vec<String> =
                        stack[start..].iter().map(|&k| cells[k].name.clone()).collect();
                    path.push(cells[j].name.clone());
                    return Err(ConstructionError::Cycle { path });
                }
            }
        }
        stack.pop();
        marks[i] = Mark::Done;
        Ok(())
    }

    let mut marks = vec![Mark::New; cells.len()];
    let mut stack = Vec::new();
    for i in 0..cells.len() {
        if marks[i] == Mark::New {
            visit(i, cells, index, &mut marks, &mut stack)?;
        }
    }
    Ok(())
}

/// Handle passed to compute functions.
pub struct Resolver<'a, C> {
    graph: &'a LazyGraph<C>,
    ctx: &'a C,
    cell: &'a str,
    deps: &'a [String],
}

impl<C> Resolver<'_, C> {
    /// The graph owner.
    pub fn context(&self) -> &C {
        self.ctx
    }

    /// Name of the cell being computed.
    pub fn cell(&self) -> &str {
        self.cell
    }

    /// Value of a declared dependency.
    ///
    /// Only dependencies listed when the cell was declared can be read; this
    /// keeps ordering explicit and rules out undeclared cycles.
    ///
    /// # Errors
    ///
    /// Returns [`LazyError::Construction`] if `name` is not a declared
    /// dependency, or the dependency's own error.
    pub fn dep<T: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>, LazyError> {
        if !self.deps.iter().any(|d| d == name) {
            return Err(ConstructionError::UnknownDependency {
                cell: self.cell.to_owned(),
                dependency: name.to_owned(),
            }
            .into());
        }
        let value = self.graph.resolve(self.ctx, name, false)?;
        downcast(name, value)
    }
}

struct AdhocCell<C> {
    def: CellDef<C>,
    cell: LazyCell<Value>,
}

enum Node<'a, C> {
    Planned(&'a CellDef<C>, &'a LazyCell<Value>),
    Adhoc(Arc<AdhocCell<C>>),
}

impl<C> Node<'_, C> {
    fn def(&self) -> &CellDef<C> {
        match self {
            Self::Planned(def, _) => def,
            Self::Adhoc(adhoc) => &adhoc.def,
        }
    }

    fn cell(&self) -> &LazyCell<Value> {
        match self {
            Self::Planned(_, cell) => cell,
            Self::Adhoc(adhoc) => &adhoc.cell,
        }
    }
}

/// Per-owner instance of a [`GraphPlan`].
///
/// `C` is the owner type handed to compute functions; it is passed in on
/// every read so the graph can live inside the owner without a
/// self-reference.
pub struct LazyGraph<C> {
    plan: Arc<GraphPlan<C>>,
    slots: Vec<LazyCell<Value>>,
    adhoc: RwLock<HashMap<String, Arc<AdhocCell<C>>>>,
    generation: AtomicU64,
    abort: AbortFlag,
}

impl<C> fmt::Debug for LazyGraph<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyGraph")
            .field("plan", &self.plan)
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

fn downcast<T: Send + Sync + 'static>(name: &str, value: Value) -> Result<Arc<T>, LazyError> {
    value.downcast::<T>().map_err(|_| LazyError::TypeMismatch {
        cell: name.to_owned(),
        expected: type_name::<T>(),
    })
}

impl<C> LazyGraph<C> {
    /// Instantiate a graph from a validated plan.
    #[must_use]
    pub fn new(plan: Arc<GraphPlan<C>>) -> Self {
        Self::with_abort(plan, AbortFlag::new())
    }

    /// Instantiate a graph that stops scheduling cells once `abort` is raised.
    #[must_use]
    pub fn with_abort(plan: Arc<GraphPlan<C>>, abort: AbortFlag) -> Self {
        let slots = plan.cells.iter().map(|_| LazyCell::new()).collect();
        Self {
            plan,
            slots,
            adhoc: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
            abort,
        }
    }

    /// Current rebuild generation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Invalidate every cell by starting a new generation.
    ///
    /// Does not wait for computations in flight; their results are discarded.
    pub fn reset(&self) {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::debug!(generation, "lazy graph reset");
    }

    /// Whether `name` holds a result in the current generation.
    pub fn is_resolved(&self, name: &str) -> bool {
        self.node(name)
            .is_ok_and(|node| node.cell().is_resolved(self.generation()))
    }

    /// Invalidate `name` and every cell that transitively depends on it.
    ///
    /// Unrelated cells keep their values. Returns the invalidated names.
    ///
    /// # Errors
    ///
    /// Returns [`ConstructionError::UnknownCell`] if `name` is not declared.
    pub fn invalidate(&self, name: &str) -> Result<Vec<String>, ConstructionError> {
        self.node(name)?;

        let mut invalidated = vec![name.to_owned()];
        {
            let adhoc = self.adhoc.read().unwrap_or_else(PoisonError::into_inner);
            let all_defs: Vec<&CellDef<C>> = self
                .plan
                .cells
                .iter()
                .chain(adhoc.values().map(|a| &a.def))
                .collect();

            let mut cursor = 0;
            while cursor < invalidated.len() {
                let current = invalidated[cursor].clone();
                for def in &all_defs {
                    if def.deps.contains(&current) && !invalidated.contains(&def.name) {
                        invalidated.push(def.name.clone());
                    }
                }
                cursor += 1;
            }
        }

        for cell_name in &invalidated {
            if let Ok(node) = self.node(cell_name) {
                node.cell().invalidate();
            }
        }
        tracing::debug!(cell = %name, count = invalidated.len(), "cells invalidated");
        Ok(invalidated)
    }

    fn node(&self, name: &str) -> Result<Node<'_, C>, ConstructionError> {
        if let Some(&i) = self.plan.index.get(name) {
            return Ok(Node::Planned(&self.plan.cells[i], &self.slots[i]));
        }
        self.adhoc
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|a| Node::Adhoc(Arc::clone(a)))
            .ok_or_else(|| ConstructionError::UnknownCell(name.to_owned()))
    }

    /// Read a declared cell, computing it on first access.
    ///
    /// # Errors
    ///
    /// Returns the cached [`ResolutionError`] if the cell failed,
    /// [`LazyError::Aborted`] if the build was aborted before the cell was
    /// scheduled or while it was computing (the cell then stays unresolved),
    /// or a construction/type error for programming mistakes.
    pub fn get<T: Send + Sync + 'static>(&self, ctx: &C, name: &str) -> Result<Arc<T>, LazyError> {
        let value = self.resolve(ctx, name, true)?;
        downcast(name, value)
    }

    /// Read `name`, declaring it on the fly if this graph doesn't know it yet.
    ///
    /// Cells declared in the plan (or by an earlier call) keep their original
    /// compute function; `deps` and `compute` are then ignored. Dependencies
    /// of a new cell must already exist, so ad-hoc cells cannot form cycles.
    ///
    /// # Errors
    ///
    /// Same as [`get`](Self::get), plus [`ConstructionError::UnknownDependency`]
    /// for undeclared dependencies.
    pub fn get_or_init<T, F>(
        &self,
        ctx: &C,
        name: &str,
        deps: &[&str],
        compute: F,
    ) -> Result<Arc<T>, LazyError>
    where
        C: 'static,
        T: Send + Sync + 'static,
        F: Fn(&Resolver<'_, C>) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        if self.node(name).is_err() {
            for dep in deps {
                if *dep == name {
                    return Err(ConstructionError::Cycle {
                        path: vec![name.to_owned(), name.to_owned()],
                    }
                    .into());
                }
                if self.node(dep).is_err() {
                    return Err(ConstructionError::UnknownDependency {
                        cell: name.to_owned(),
                        dependency: (*dep).to_owned(),
                    }
                    .into());
                }
            }
            self.adhoc
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(name.to_owned())
                .or_insert_with(|| {
                    Arc::new(AdhocCell {
                        def: CellDef::new(name, deps, compute),
                        cell: LazyCell::new(),
                    })
                });
        }
        self.get(ctx, name)
    }

    fn resolve(&self, ctx: &C, name: &str, check_abort: bool) -> Result<Value, LazyError> {
        let generation = self.generation();
        let node = self.node(name)?;

        if let Some(result) = node.cell().peek(generation) {
            return result.map_err(LazyError::from);
        }
        if check_abort && self.abort.is_raised() {
            return Err(LazyError::Aborted {
                cell: name.to_owned(),
            });
        }

        node.cell()
            .get_or_init(generation, || self.compute(ctx, node.def(), generation))
            .map_err(|e| {
                if e.is_aborted() {
                    LazyError::Aborted {
                        cell: name.to_owned(),
                    }
                } else {
                    LazyError::from(e)
                }
            })
    }

    fn compute(
        &self,
        ctx: &C,
        def: &CellDef<C>,
        generation: u64,
    ) -> Result<Value, ResolutionError> {
        for dep in &def.deps {
            match self.resolve(ctx, dep, false) {
                Ok(_) => {}
                Err(LazyError::Resolution(source)) => {
                    return Err(ResolutionError::Dependency {
                        cell: def.name.clone(),
                        dependency: dep.clone(),
                        source: Box::new(source),
                    });
                }
                Err(other) => return Err(ResolutionError::failed(&def.name, Box::new(other))),
            }
        }

        tracing::debug!(cell = %def.name, generation, "resolving cell");
        let resolver = Resolver {
            graph: self,
            ctx,
            cell: &def.name,
            deps: &def.deps,
        };
        (def.compute)(&resolver).map_err(|e| {
            let err = ResolutionError::failed(&def.name, e);
            if err.is_aborted() {
                tracing::debug!(cell = %def.name, "cell aborted");
            } else {
                tracing::debug!(cell = %def.name, error = %err, "cell failed");
            }
            err
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::sync::{Barrier, Mutex};
    use std::thread;

    use pretty_assertions::assert_eq;

    use super::*;

    static_assertions::assert_impl_all!(LazyGraph<()>: Send, Sync);
    static_assertions::assert_impl_all!(GraphPlan<()>: Send, Sync);

    #[derive(Default)]
    struct Counters {
        base: AtomicUsize,
        double: AtomicUsize,
        log: Mutex<Vec<String>>,
    }

    fn arithmetic_plan() -> Arc<GraphPlan<Counters>> {
        GraphPlan::builder()
            .cell("double", &["base"], |r: &Resolver<'_, Counters>| {
                r.context().double.fetch_add(1, Ordering::SeqCst);
                r.context().log.lock().unwrap().push("double".to_owned());
                Ok(*r.dep::<i64>("base")? * 2)
            })
            .cell("base", &[], |r: &Resolver<'_, Counters>| {
                r.context().base.fetch_add(1, Ordering::SeqCst);
                r.context().log.lock().unwrap().push("base".to_owned());
                Ok(21_i64)
            })
            .cell("broken", &[], |_: &Resolver<'_, Counters>| -> Result<i64, BoxError> {
                Err("malformed date".into())
            })
            .cell(
                "after_broken",
                &["broken"],
                |_: &Resolver<'_, Counters>| -> Result<i64, BoxError> {
                    panic!("must not run when dependency failed")
                },
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_dependencies_resolve_first() {
        let ctx = Counters::default();
        let graph = LazyGraph::new(arithmetic_plan());

        assert_eq!(*graph.get::<i64>(&ctx, "double").unwrap(), 42);
        assert_eq!(*ctx.log.lock().unwrap(), vec!["base", "double"]);
        assert!(graph.is_resolved("base"));
    }

    #[test]
    fn test_dependency_error_short_circuits() {
        let ctx = Counters::default();
        let graph = LazyGraph::new(arithmetic_plan());

        let err = graph.get::<i64>(&ctx, "after_broken").unwrap_err();

        let LazyError::Resolution(ResolutionError::Dependency {
            cell, dependency, ..
        }) = &err
        else {
            panic!("expected dependency error, got {err:?}");
        };
        assert_eq!(cell, "after_broken");
        assert_eq!(dependency, "broken");
        assert_eq!(err.to_string(), "after_broken: dependency broken failed");
    }

    #[test]
    fn test_errors_are_cached() {
        let ctx = Counters::default();
        let graph = LazyGraph::new(arithmetic_plan());

        let first = graph.get::<i64>(&ctx, "broken").unwrap_err();
        let second = graph.get::<i64>(&ctx, "broken").unwrap_err();

        assert_eq!(first.to_string(), "broken: malformed date");
        assert_eq!(first.to_string(), second.to_string());
    }

    #[test]
    fn test_cycle_rejected_at_build() {
        let result = GraphPlan::<()>::builder()
            .cell("a", &["b"], |_| Ok(1))
            .cell("b", &["c"], |_| Ok(1))
            .cell("c", &["a"], |_| Ok(1))
            .build();

        assert_eq!(
            result.unwrap_err(),
            ConstructionError::Cycle {
                path: vec![
                    "a".to_owned(),
                    "b".to_owned(),
                    "c".to_owned(),
                    "a".to_owned()
                ]
            }
        );
    }

    #[test]
    fn test_unknown_dependency_rejected_at_build() {
        let result = GraphPlan::<()>::builder()
            .cell("a", &["missing"], |_| Ok(1))
            .build();

        assert_eq!(
            result.unwrap_err(),
            ConstructionError::UnknownDependency {
                cell: "a".to_owned(),
                dependency: "missing".to_owned(),
            }
        );
    }

    #[test]
    fn test_duplicate_cell_rejected_at_build() {
        let result = GraphPlan::<()>::builder()
            .cell("a", &[], |_| Ok(1))
            .cell("a", &[], |_| Ok(2))
            .build();

        assert_eq!(
            result.unwrap_err(),
            ConstructionError::DuplicateCell("a".to_owned())
        );
    }

    #[test]
    fn test_type_mismatch() {
        let ctx = Counters::default();
        let graph = LazyGraph::new(arithmetic_plan());

        let err = graph.get::<String>(&ctx, "base").unwrap_err();

        assert!(matches!(err, LazyError::TypeMismatch { .. }));
    }

    #[test]
    fn test_reset_recomputes() {
        let ctx = Counters::default();
        let graph = LazyGraph::new(arithmetic_plan());

        graph.get::<i64>(&ctx, "double").unwrap();
        graph.reset();
        assert!(!graph.is_resolved("double"));
        graph.get::<i64>(&ctx, "double").unwrap();

        assert_eq!(ctx.base.load(Ordering::SeqCst), 2);
        assert_eq!(ctx.double.load(Ordering::SeqCst), 2);
        assert_eq!(graph.generation(), 1);
    }

    #[test]
    fn test_invalidate_resets_dependents_only() {
        let ctx = Counters::default();
        let plan = GraphPlan::builder()
            .cell("base", &[], |r: &Resolver<'_, Counters>| {
                r.context().base.fetch_add(1, Ordering::SeqCst);
                Ok(1_i64)
            })
            .cell("double", &["base"], |r: &Resolver<'_, Counters>| {
                r.context().double.fetch_add(1, Ordering::SeqCst);
                Ok(*r.dep::<i64>("base")? * 2)
            })
            .cell("unrelated", &[], |_: &Resolver<'_, Counters>| Ok(0_i64))
            .build()
            .unwrap();
        let graph = LazyGraph::new(plan);
        graph.get::<i64>(&ctx, "double").unwrap();
        graph.get::<i64>(&ctx, "unrelated").unwrap();

        let invalidated = graph.invalidate("base").unwrap();

        assert_eq!(invalidated, vec!["base", "double"]);
        assert!(graph.is_resolved("unrelated"));
        assert!(!graph.is_resolved("double"));
        graph.get::<i64>(&ctx, "double").unwrap();
        assert_eq!(ctx.base.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_invalidate_unknown_cell() {
        let graph = LazyGraph::new(arithmetic_plan());

        assert_eq!(
            graph.invalidate("nope").unwrap_err(),
            ConstructionError::UnknownCell("nope".to_owned())
        );
    }

    #[test]
    fn test_undeclared_dependency_read_fails() {
        let plan = GraphPlan::<()>::builder()
            .cell("a", &[], |_| Ok(1_i64))
            .cell("b", &[], |r: &Resolver<'_, ()>| Ok(*r.dep::<i64>("a")?))
            .build()
            .unwrap();
        let graph = LazyGraph::new(plan);

        let err = graph.get::<i64>(&(), "b").unwrap_err();

        assert_eq!(
            err.to_string(),
            "b: Cell b depends on undeclared cell a"
        );
    }

    #[test]
    fn test_get_or_init_adhoc_cell() {
        let ctx = Counters::default();
        let graph = LazyGraph::new(arithmetic_plan());

        let tripled = graph
            .get_or_init(&ctx, "triple", &["base"], |r: &Resolver<'_, Counters>| {
                Ok(*r.dep::<i64>("base")? * 3)
            })
            .unwrap();
        assert_eq!(*tripled, 63);

        // Second declaration is ignored; the first compute function wins.
        let again = graph
            .get_or_init(&ctx, "triple", &[], |_: &Resolver<'_, Counters>| Ok(0_i64))
            .unwrap();
        assert_eq!(*again, 63);

        assert_eq!(graph.invalidate("base").unwrap(), vec!["base", "triple"]);
    }

    #[test]
    fn test_get_or_init_rejects_unknown_dependency() {
        let graph = LazyGraph::new(GraphPlan::<()>::builder().build().unwrap());

        let err = graph
            .get_or_init(&(), "x", &["missing"], |_| Ok(1_i64))
            .unwrap_err();

        assert!(matches!(
            err,
            LazyError::Construction(ConstructionError::UnknownDependency { .. })
        ));
    }

    #[test]
    fn test_abort_stops_unresolved_cells() {
        let ctx = Counters::default();
        let abort = AbortFlag::new();
        let graph = LazyGraph::with_abort(arithmetic_plan(), abort.clone());
        graph.get::<i64>(&ctx, "base").unwrap();

        abort.raise();

        assert_eq!(*graph.get::<i64>(&ctx, "base").unwrap(), 21);
        assert!(matches!(
            graph.get::<i64>(&ctx, "double"),
            Err(LazyError::Aborted { .. })
        ));

        // Aborts are not cached.
        abort.clear();
        assert_eq!(*graph.get::<i64>(&ctx, "double").unwrap(), 42);
    }

    struct Listing {
        items: LazyGraph<()>,
        abort: AbortFlag,
        raise_during_compute: AtomicBool,
    }

    fn listing_plans(abort: &AbortFlag) -> Listing {
        let items = GraphPlan::builder()
            .cell("x", &[], |_: &Resolver<'_, ()>| Ok(5_i64))
            .build()
            .unwrap();
        Listing {
            items: LazyGraph::with_abort(items, abort.clone()),
            abort: abort.clone(),
            raise_during_compute: AtomicBool::new(true),
        }
    }

    fn listing_graph(abort: &AbortFlag) -> LazyGraph<Listing> {
        let plan = GraphPlan::builder()
            .cell("listing", &[], |r: &Resolver<'_, Listing>| {
                let ctx = r.context();
                if ctx.raise_during_compute.swap(false, Ordering::SeqCst) {
                    ctx.abort.raise();
                }
                Ok(*ctx.items.get::<i64>(&(), "x")?)
            })
            .cell("count", &["listing"], |r: &Resolver<'_, Listing>| {
                Ok(*r.dep::<i64>("listing")? + 1)
            })
            .build()
            .unwrap();
        LazyGraph::with_abort(plan, abort.clone())
    }

    #[test]
    fn test_abort_during_compute_is_not_cached() {
        let abort = AbortFlag::new();
        let ctx = listing_plans(&abort);
        let graph = listing_graph(&abort);

        let err = graph.get::<i64>(&ctx, "listing").unwrap_err();

        assert!(matches!(&err, LazyError::Aborted { cell } if cell == "listing"));
        assert!(!graph.is_resolved("listing"));

        abort.clear();
        assert_eq!(*graph.get::<i64>(&ctx, "listing").unwrap(), 5);
        assert!(graph.is_resolved("listing"));
    }

    #[test]
    fn test_abort_in_dependency_leaves_dependent_unresolved() {
        let abort = AbortFlag::new();
        let ctx = listing_plans(&abort);
        let graph = listing_graph(&abort);

        let err = graph.get::<i64>(&ctx, "count").unwrap_err();

        assert!(err.is_aborted());
        assert!(!graph.is_resolved("count"));
        assert!(!graph.is_resolved("listing"));

        abort.clear();
        assert_eq!(*graph.get::<i64>(&ctx, "count").unwrap(), 6);
    }

    #[test]
    fn test_concurrent_first_access_runs_once() {
        const THREADS: usize = 12;
        let ctx = Counters::default();
        let graph = LazyGraph::new(arithmetic_plan());
        let barrier = Barrier::new(THREADS);

        let results: Vec<i64> = thread::scope(|s| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        *graph.get::<i64>(&ctx, "double").unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(results.iter().all(|&v| v == 42));
        assert_eq!(ctx.base.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.double.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_failure_observed_by_all() {
        const THREADS: usize = 8;
        let ctx = Counters::default();
        let graph = LazyGraph::new(arithmetic_plan());
        let barrier = Barrier::new(THREADS);

        let errors: Vec<String> = thread::scope(|s| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        graph
                            .get::<i64>(&ctx, "after_broken")
                            .unwrap_err()
                            .to_string()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(errors.iter().all(|e| e == "after_broken: dependency broken failed"));
    }
}
