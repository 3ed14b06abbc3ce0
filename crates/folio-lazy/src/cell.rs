//! Generation-tagged, exactly-once cell.
//!
//! A [`LazyCell`] runs its initializer on exactly one caller per generation.
//! Concurrent callers block on a condition variable until the running
//! initializer finishes and then observe the same value or error.
//!
//! # Generations
//!
//! Every call names the generation it belongs to. A cell resolved for an
//! older generation is treated as empty, so bumping a counter is enough to
//! invalidate many cells at once without touching them. An initializer that
//! is still running when its generation is superseded is allowed to finish,
//! but its result is only returned to its own caller and never stored.
//!
//! # Aborts
//!
//! An initializer that fails because the build was aborted while it ran
//! (see [`ResolutionError::is_aborted`]) leaves the cell empty. Its caller
//! gets the error; the next caller runs the initializer again.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use crate::error::ResolutionError;

/// Outcome of a resolved cell.
pub type CellResult<T> = Result<T, ResolutionError>;

#[derive(Debug)]
enum State<T> {
    Empty,
    Running,
    Done(CellResult<T>),
}

#[derive(Debug)]
struct Slot<T> {
    generation: u64,
    /// Incremented every time a run starts or the cell is invalidated.
    /// A finishing run only stores its result if the ticket is unchanged.
    ticket: u64,
    state: State<T>,
}

/// Memoized value with exactly-once initialization per generation.
#[derive(Debug)]
pub struct LazyCell<T> {
    slot: Mutex<Slot<T>>,
    ready: Condvar,
}

impl<T> Default for LazyCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Resets a running slot if the initializer unwinds, so waiters don't block forever.
struct RunGuard<'a, T> {
    cell: &'a LazyCell<T>,
    generation: u64,
    ticket: u64,
    armed: bool,
}

impl<T> Drop for RunGuard<'_, T> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut slot = self.cell.lock();
        if slot.generation == self.generation && slot.ticket == self.ticket {
            slot.state = State::Empty;
        }
        drop(slot);
        self.cell.ready.notify_all();
    }
}

impl<T> LazyCell<T> {
    /// Create an empty cell.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                generation: 0,
                ticket: 0,
                state: State::Empty,
            }),
            ready: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Forget the stored value, whatever generation it belongs to.
    ///
    /// A run in flight keeps going but its result is discarded.
    pub fn invalidate(&self) {
        let mut slot = self.lock();
        slot.ticket += 1;
        slot.state = State::Empty;
        drop(slot);
        self.ready.notify_all();
    }

    /// Whether the cell holds a result for `generation`.
    pub fn is_resolved(&self, generation: u64) -> bool {
        let slot = self.lock();
        slot.generation == generation && matches!(slot.state, State::Done(_))
    }
}

impl<T: Clone> LazyCell<T> {
    /// Return the stored result for `generation` without computing anything.
    pub fn peek(&self, generation: u64) -> Option<CellResult<T>> {
        let slot = self.lock();
        match &slot.state {
            State::Done(result) if slot.generation == generation => Some(result.clone()),
            _ => None,
        }
    }

    /// Return the value for `generation`, running `init` if nobody has yet.
    ///
    /// Exactly one caller runs `init` per generation (and per invalidation).
    /// Other callers block until it finishes. Errors are cached like values,
    /// except aborted runs, which release the cell.
    pub fn get_or_init<F>(&self, generation: u64, init: F) -> CellResult<T>
    where
        F: FnOnce() -> CellResult<T>,
    {
        let mut slot = self.lock();
        loop {
            if slot.generation < generation {
                slot.generation = generation;
                slot.ticket += 1;
                slot.state = State::Empty;
            }
            if slot.generation > generation {
                // The cell already moved on to a newer generation than the
                // caller asked for: run detached without touching the slot.
                drop(slot);
                return init();
            }
            match &slot.state {
                State::Done(result) => return result.clone(),
                State::Empty => break,
                State::Running => {}
            }
            slot = self.ready.wait(slot).unwrap_or_else(PoisonError::into_inner);
        }

        slot.ticket += 1;
        slot.state = State::Running;
        let ticket = slot.ticket;
        drop(slot);

        let mut guard = RunGuard {
            cell: self,
            generation,
            ticket,
            armed: true,
        };
        let result = init();
        guard.armed = false;

        let mut slot = self.lock();
        if slot.generation == generation && slot.ticket == ticket {
            slot.state = match &result {
                Err(e) if e.is_aborted() => State::Empty,
                _ => State::Done(result.clone()),
            };
        }
        drop(slot);
        self.ready.notify_all();

        result
    }
}
