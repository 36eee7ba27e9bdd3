//! Unit Abstractions and Backend Dispatch
//!
//! This module defines the core *unit execution model* of the engine.
//!
//! A **unit** is a node in a dataflow graph that:
//! - declares which buffers it consumes and which it produces,
//! - follows a two-phase lifecycle (initialize, then run),
//! - dispatches each run to exactly one of two execution paths selected by
//!   the caller's [`Backend`].
//!
//! ## Readiness protocol
//!
//! Graphs are wired lazily: a consumer may be constructed before its
//! producer has allocated the buffer it consumes. `initialize` therefore
//! returns a three-way outcome:
//!
//! - `Ok(InitStatus::NotReady)` - a declared input is still unallocated;
//!   the owning workflow polls again later. Not an error, nothing unwinds.
//! - `Ok(InitStatus::Ready)` - all inputs allocated, outputs sized.
//! - `Err(_)` - a fatal configuration or invariant failure.
//!
//! Re-invoking `initialize` on a `Ready` unit is idempotent: shape checks
//! pass and no buffer is reallocated.
//!
//! ## Backend dispatch
//!
//! [`Backend`] is a closed variant over the two execution domains. The
//! blanket [`Unit`] implementation for [`AcceleratedUnit`] types selects the
//! host or accelerator handler once per `run` call; there is no open-ended
//! dynamic dispatch and no silent fallback from one domain to the other.
//!
//! ## State machine
//!
//! [`Lifecycle`] enforces the legal transitions:
//!
//! ```text
//! Constructed → Initializing → Ready → Running → (Ready | Failed)
//! ```
//!
//! `run` on a unit that is not `Ready` is a [`StateError`]; any fatal error
//! parks the unit in `Failed`, where it stays.

use crate::graph::buffer::BufferRef;
use crate::graph::error::{StateError, UnitResult};
use crate::graph::types::{BackendKind, InitStatus, UnitID, UnitState};

#[cfg(feature = "gpu")]
use std::rc::Rc;

#[cfg(feature = "gpu")]
use crate::gpu::GpuContext;

/// Execution backend selected for an initialize or run call.
///
/// The accelerator arm carries the shared device context used for program
/// builds, argument binding, and dispatch.
pub enum Backend {
    /// General-purpose processor path.
    Host,

    /// Accelerator path with its device context.
    #[cfg(feature = "gpu")]
    Accelerator(Rc<GpuContext>),
}

impl Backend {
    /// Returns the discriminant of this backend for diagnostics.
    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::Host => BackendKind::Host,
            #[cfg(feature = "gpu")]
            Backend::Accelerator(_) => BackendKind::Accelerator,
        }
    }

    /// Acquires an accelerator backend on the default device.
    ///
    /// ## Errors
    /// [`BackendError::Unavailable`](crate::graph::error::BackendError) if
    /// no compatible adapter or device can be acquired.
    #[cfg(feature = "gpu")]
    pub fn accelerator() -> UnitResult<Self> {
        let context = GpuContext::new()?;
        Ok(Backend::Accelerator(Rc::new(context)))
    }
}

/// Lifecycle state tracker embedded in every unit.
///
/// Centralizes the transition rules so each concrete unit carries one field
/// instead of re-implementing the state machine.
#[derive(Debug)]
pub struct Lifecycle {
    state: UnitState,
}

impl Lifecycle {
    /// Creates a tracker in the `Constructed` state.
    pub fn new() -> Self {
        Self {
            state: UnitState::Constructed,
        }
    }

    /// Returns the current lifecycle state.
    #[inline]
    pub fn state(&self) -> UnitState {
        self.state
    }

    /// Enters `Initializing`.
    ///
    /// Legal from `Constructed`, `Initializing` (a readiness re-poll), and
    /// `Ready` (an idempotent re-initialize).
    pub fn begin_initialize(&mut self) -> Result<(), StateError> {
        match self.state {
            UnitState::Constructed | UnitState::Initializing | UnitState::Ready => {
                self.state = UnitState::Initializing;
                Ok(())
            }
            state => Err(StateError {
                operation: "initialize",
                state,
            }),
        }
    }

    /// Enters `Ready` after a successful initialize.
    pub fn mark_ready(&mut self) {
        self.state = UnitState::Ready;
    }

    /// Enters `Running`. Legal only from `Ready`.
    pub fn begin_run(&mut self) -> Result<(), StateError> {
        match self.state {
            UnitState::Ready => {
                self.state = UnitState::Running;
                Ok(())
            }
            state => Err(StateError {
                operation: "run",
                state,
            }),
        }
    }

    /// Returns to `Ready` after a successful run.
    pub fn finish_run(&mut self) {
        self.state = UnitState::Ready;
    }

    /// Parks the unit in `Failed`. Terminal.
    pub fn fail(&mut self) {
        self.state = UnitState::Failed;
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// A node in the dataflow graph with declared buffers and a two-phase
/// lifecycle.
///
/// This is the interface the workflow driver schedules against. Concrete
/// units normally implement [`AcceleratedUnit`] instead and receive this
/// trait through the blanket implementation, which enforces the state
/// machine and the backend dispatch in one place.
pub trait Unit {
    /// Returns the unique identifier of this unit.
    fn id(&self) -> UnitID;

    /// Returns the unit's kind name, used in diagnostics and specialization
    /// signatures.
    fn name(&self) -> &'static str;

    /// Returns the current lifecycle state for the workflow's scheduler to
    /// poll.
    fn state(&self) -> UnitState;

    /// Returns handles to the declared input buffers.
    fn inputs(&self) -> Vec<BufferRef>;

    /// Returns handles to the produced output buffers, for downstream units
    /// to declare as their inputs.
    fn outputs(&self) -> Vec<BufferRef>;

    /// Checks readiness and sizes the unit's outputs.
    ///
    /// See the module documentation for the three-way outcome contract.
    fn initialize(&mut self, backend: &Backend) -> UnitResult<InitStatus>;

    /// Executes one pass over the unit's buffers on the selected backend.
    ///
    /// Precondition: the unit is `Ready`. Postcondition: the output buffers'
    /// coherence flags reflect which side was written.
    fn run(&mut self, backend: &Backend) -> UnitResult<()>;
}

/// Concrete per-unit hooks for dual-backend execution.
///
/// Implementors provide the shape/readiness logic and one handler per
/// execution domain; the blanket [`Unit`] implementation supplies the
/// lifecycle bookkeeping around them.
///
/// The accelerator hooks are only compiled with the `gpu` feature; a unit
/// built without it is host-only.
pub trait AcceleratedUnit {
    /// Returns the unique identifier of this unit.
    fn id(&self) -> UnitID;

    /// Returns the unit's kind name.
    fn name(&self) -> &'static str;

    /// Returns the embedded lifecycle tracker.
    fn lifecycle(&self) -> &Lifecycle;

    /// Returns the embedded lifecycle tracker mutably.
    fn lifecycle_mut(&mut self) -> &mut Lifecycle;

    /// Returns handles to the declared input buffers.
    fn inputs(&self) -> Vec<BufferRef>;

    /// Returns handles to the produced output buffers.
    fn outputs(&self) -> Vec<BufferRef>;

    /// Checks input readiness and allocates the unit's outputs.
    ///
    /// Must return `Ok(InitStatus::NotReady)` without allocating anything
    /// when a declared input is unallocated, and must be idempotent once it
    /// has returned `Ok(InitStatus::Ready)`.
    fn setup(&mut self) -> UnitResult<InitStatus>;

    /// Executes one pass on the host path.
    fn host_run(&mut self) -> UnitResult<()>;

    /// Builds or fetches the specialized program for the current output
    /// shape and binds its arguments.
    ///
    /// Called after a successful [`AcceleratedUnit::setup`] when the
    /// selected backend is the accelerator. Must be idempotent for an
    /// unchanged specialization signature.
    #[cfg(feature = "gpu")]
    fn accel_init(&mut self, context: &Rc<GpuContext>) -> UnitResult<()>;

    /// Executes one pass on the accelerator path.
    #[cfg(feature = "gpu")]
    fn accel_run(&mut self, context: &Rc<GpuContext>) -> UnitResult<()>;
}

impl<T: AcceleratedUnit> Unit for T {
    fn id(&self) -> UnitID {
        AcceleratedUnit::id(self)
    }

    fn name(&self) -> &'static str {
        AcceleratedUnit::name(self)
    }

    fn state(&self) -> UnitState {
        self.lifecycle().state()
    }

    fn inputs(&self) -> Vec<BufferRef> {
        AcceleratedUnit::inputs(self)
    }

    fn outputs(&self) -> Vec<BufferRef> {
        AcceleratedUnit::outputs(self)
    }

    fn initialize(&mut self, backend: &Backend) -> UnitResult<InitStatus> {
        self.lifecycle_mut().begin_initialize()?;

        match self.setup() {
            Ok(InitStatus::NotReady) => Ok(InitStatus::NotReady),
            Ok(InitStatus::Ready) => {
                match backend {
                    Backend::Host => {}
                    #[cfg(feature = "gpu")]
                    Backend::Accelerator(context) => {
                        if let Err(e) = self.accel_init(context) {
                            self.lifecycle_mut().fail();
                            return Err(e);
                        }
                    }
                }
                self.lifecycle_mut().mark_ready();
                Ok(InitStatus::Ready)
            }
            Err(e) => {
                self.lifecycle_mut().fail();
                Err(e)
            }
        }
    }

    fn run(&mut self, backend: &Backend) -> UnitResult<()> {
        self.lifecycle_mut().begin_run()?;

        let result = match backend {
            Backend::Host => self.host_run(),
            #[cfg(feature = "gpu")]
            Backend::Accelerator(context) => self.accel_run(context),
        };

        match result {
            Ok(()) => {
                self.lifecycle_mut().finish_run();
                Ok(())
            }
            Err(e) => {
                self.lifecycle_mut().fail();
                Err(e)
            }
        }
    }
}
