//! Workflow scheduling and execution.
//!
//! This module is responsible for:
//! * owning the units of one dataflow graph in declaration order,
//! * bringing units up by re-polling `NotReady` initializes,
//! * running one pass over all units on a selected backend.
//!
//! ## Scheduling model
//!
//! The walk is single-threaded and cooperative. Units are stored in
//! declaration order, which the graph author arranges producer-before-
//! consumer; a run pass simply visits them in that order.
//!
//! Bring-up does not depend on declaration order. Each **round** polls every
//! unit that is not yet `Ready`; a unit whose upstream buffers are still
//! unallocated answers `NotReady` and is retried next round, after its
//! producer had a chance to allocate. Rounds repeat until every unit is
//! ready. A full round in which no unit makes progress while some still
//! wait surfaces as [`WorkflowError::Stalled`] instead of polling forever,
//! so a dependency cycle or a missing producer is an error, not a hang.
//!
//! ## Failure policy
//!
//! Fatal unit errors abort bring-up or the run pass at the failing unit;
//! the unit itself is left parked in `Failed`.

use tracing::debug;

use crate::graph::error::{WorkflowError, WorkflowResult};
use crate::graph::types::{InitStatus, UnitState};
use crate::graph::unit::{Backend, Unit};

/// Owner and driver of one dataflow graph.
///
/// ## Invariants
/// * Units are visited in declaration order during a run pass.
/// * A unit is run at most once per pass.
///
/// ## Thread safety
/// The workflow participates in the single-threaded cooperative walk; it is
/// not `Send`.
pub struct Workflow {
    units: Vec<Box<dyn Unit>>,
}

impl Workflow {
    /// Creates an empty workflow.
    pub fn new() -> Self {
        Self { units: Vec::new() }
    }

    /// Appends a unit. Declaration order is execution order for run passes.
    pub fn add_unit<U: Unit + 'static>(&mut self, unit: U) {
        self.units.push(Box::new(unit));
    }

    /// Returns the number of owned units.
    #[inline]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Returns `true` if the workflow owns no units.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Returns the unit at `index` in declaration order.
    pub fn unit(&self, index: usize) -> Option<&dyn Unit> {
        self.units.get(index).map(|u| u.as_ref())
    }

    /// Initializes every unit, re-polling `NotReady` answers until the whole
    /// graph is ready.
    ///
    /// ## Semantics
    /// * Rounds poll only units that are not yet `Ready`.
    /// * Progress is a unit becoming ready within a round.
    /// * A round without progress while units still wait returns
    ///   [`WorkflowError::Stalled`] naming them.
    ///
    /// ## Errors
    /// [`WorkflowError::Unit`] on the first fatal unit error;
    /// [`WorkflowError::Stalled`] when bring-up cannot make progress.
    pub fn bring_up(&mut self, backend: &Backend) -> WorkflowResult<()> {
        let mut round = 0usize;

        loop {
            let mut progressed = false;
            let mut pending = Vec::new();

            for unit in &mut self.units {
                if unit.state() == UnitState::Ready {
                    continue;
                }

                match unit.initialize(backend) {
                    Ok(InitStatus::Ready) => progressed = true,
                    Ok(InitStatus::NotReady) => pending.push(unit.name()),
                    Err(source) => {
                        return Err(WorkflowError::Unit {
                            unit: unit.name(),
                            source,
                        })
                    }
                }
            }

            debug!(round, pending = pending.len(), "bring-up round complete");

            if pending.is_empty() {
                return Ok(());
            }
            if !progressed {
                return Err(WorkflowError::Stalled { pending });
            }
            round += 1;
        }
    }

    /// Runs every unit once, in declaration order, on the selected backend.
    ///
    /// ## Errors
    /// [`WorkflowError::Unit`] on the first failing unit; later units are
    /// not visited.
    pub fn run_pass(&mut self, backend: &Backend) -> WorkflowResult<()> {
        for unit in &mut self.units {
            unit.run(backend).map_err(|source| WorkflowError::Unit {
                unit: unit.name(),
                source,
            })?;
        }
        Ok(())
    }
}

impl Default for Workflow {
    fn default() -> Self {
        Self::new()
    }
}
