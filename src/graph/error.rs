//! Error types for buffer allocation, unit lifecycle, and backend execution.
//!
//! This module declares focused, composable error types used across the
//! buffer, unit, and dispatch layers. Each error carries enough context to
//! make failures actionable while remaining small and cheap to pass around
//! or convert into the aggregate [`UnitError`].
//!
//! ## Goals
//! * **Specificity:** Each error type models a single failure mode (e.g.
//!   incompatible reallocation, lifecycle misuse, program build failure).
//! * **Ergonomics:** All errors implement [`std::error::Error`] and
//!   [`fmt::Display`], and provide `From<T>` conversions into [`UnitError`].
//! * **Actionability:** Structured fields (existing vs. requested shape,
//!   offending lifecycle state, specialization signature) make logs useful
//!   without reproducing the issue.
//!
//! ## Failure policy
//! The error taxonomy encodes the engine's failure policy directly:
//!
//! * Configuration errors are fatal at construction and never retried.
//! * Shape and element mismatches discovered at initialize are fatal
//!   invariant violations.
//! * Backend failures are fatal for that run; there is no silent fallback
//!   to the other backend, since that would mask an accelerator programming
//!   error.
//! * Differing input minibatch sizes are **not** represented here at all:
//!   they are recoverable, resolved by truncation, and surfaced only as a
//!   logged warning.
//! * "Not ready yet" is **not** an error; it is the
//!   [`InitStatus::NotReady`](crate::graph::types::InitStatus) value.

use std::fmt;

use crate::graph::types::{ElementType, Shape, UnitState};

/// Returned when a buffer reallocation requests a shape incompatible with
/// the shape it was already allocated with.
///
/// ## Context
/// Buffer shapes are fixed at the owning unit's initialize step. A second
/// allocation with the same shape is an idempotent no-op; any other shape
/// indicates a violated internal invariant, not a user error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeError {
    /// Shape the buffer is currently allocated with.
    pub existing: Shape,

    /// Shape the failed reallocation requested.
    pub requested: Shape,
}

impl fmt::Display for ShapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "buffer already allocated with shape {}; requested {}",
            self.existing, self.requested
        )
    }
}

impl std::error::Error for ShapeError {}

/// Returned when buffers that must share one element type disagree.
///
/// ## Context
/// Raised when a reallocation changes a buffer's element type, or when the
/// inputs of a joining unit carry differing element tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementMismatchError {
    /// Element type the operation expected.
    pub expected: ElementType,

    /// Element type actually encountered.
    pub actual: ElementType,
}

impl fmt::Display for ElementMismatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "element type mismatch: expected {}, got {}",
            self.expected, self.actual
        )
    }
}

impl std::error::Error for ElementMismatchError {}

/// Returned when a lifecycle operation is invoked in a state that does not
/// permit it.
///
/// ## Context
/// The unit state machine admits a fixed set of transitions; running a unit
/// that is not `Ready`, or re-initializing a `Failed` unit, is a logic error
/// in the driving code rather than a recoverable runtime condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateError {
    /// Operation that was attempted (e.g. `"run"`).
    pub operation: &'static str,

    /// Lifecycle state the unit was in at the time.
    pub state: UnitState,
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cannot {} a unit in state {}",
            self.operation, self.state
        )
    }
}

impl std::error::Error for StateError {}

/// Fatal construction-time configuration errors.
///
/// These abort the owning workflow's bring-up of the unit immediately; they
/// are never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigurationError {
    /// A unit requiring at least one input was constructed with none.
    EmptyInputs,
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigurationError::EmptyInputs => f.write_str("inputs may not be empty"),
        }
    }
}

impl std::error::Error for ConfigurationError {}

/// Accelerator backend failures.
///
/// All variants are fatal for the run in which they occur; the unit
/// transitions to `Failed` and is not retried. Backend failures are surfaced
/// verbatim and never trigger a fallback to the host path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// No compatible accelerator adapter or device could be acquired.
    Unavailable {
        /// Underlying initialization failure description.
        message: String,
    },

    /// Compiling a specialized program failed.
    ProgramBuild {
        /// Specialization signature of the failed build.
        signature: String,

        /// Compiler or validation failure description.
        message: String,
    },

    /// A program expected in the cache was absent at dispatch time.
    ///
    /// This indicates a violated internal invariant: signatures are compiled
    /// during initialize, before any dispatch referencing them.
    MissingProgram {
        /// Specialization signature that was looked up.
        signature: String,
    },

    /// Submitting or synchronizing a dispatch failed.
    Dispatch {
        /// Device failure description.
        message: String,
    },

    /// Copying device results back to host storage failed.
    Readback {
        /// Device or mapping failure description.
        message: String,
    },

    /// A device-side operation was requested on a buffer that has never been
    /// bound to a device context.
    NoDeviceBound,
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Unavailable { message } => {
                write!(f, "accelerator unavailable: {message}")
            }
            BackendError::ProgramBuild { signature, message } => {
                write!(f, "failed to build program {signature}: {message}")
            }
            BackendError::MissingProgram { signature } => {
                write!(f, "no compiled program for signature {signature}")
            }
            BackendError::Dispatch { message } => {
                write!(f, "dispatch failed: {message}")
            }
            BackendError::Readback { message } => {
                write!(f, "device readback failed: {message}")
            }
            BackendError::NoDeviceBound => {
                f.write_str("buffer is not bound to a device context")
            }
        }
    }
}

impl std::error::Error for BackendError {}

/// Aggregate error for unit operations.
///
/// Low-level buffer, lifecycle, and backend operations return their focused
/// error types; unit code uses `?` to bubble them into this single,
/// expressive type.
///
/// ### Display
/// `Display` messages are concise and suitable for logs. For deep
/// inspection, prefer `Debug`, which includes full structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitError {
    /// Fatal constructor-argument error.
    Configuration(ConfigurationError),

    /// Incompatible buffer reallocation.
    Shape(ShapeError),

    /// Element types that must agree did not.
    Element(ElementMismatchError),

    /// Lifecycle operation invoked in an illegal state.
    State(StateError),

    /// Accelerator backend failure.
    Backend(BackendError),
}

impl fmt::Display for UnitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitError::Configuration(e) => write!(f, "{e}"),
            UnitError::Shape(e) => write!(f, "{e}"),
            UnitError::Element(e) => write!(f, "{e}"),
            UnitError::State(e) => write!(f, "{e}"),
            UnitError::Backend(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for UnitError {}

impl From<ConfigurationError> for UnitError {
    fn from(e: ConfigurationError) -> Self {
        UnitError::Configuration(e)
    }
}

impl From<ShapeError> for UnitError {
    fn from(e: ShapeError) -> Self {
        UnitError::Shape(e)
    }
}

impl From<ElementMismatchError> for UnitError {
    fn from(e: ElementMismatchError) -> Self {
        UnitError::Element(e)
    }
}

impl From<StateError> for UnitError {
    fn from(e: StateError) -> Self {
        UnitError::State(e)
    }
}

impl From<BackendError> for UnitError {
    fn from(e: BackendError) -> Self {
        UnitError::Backend(e)
    }
}

/// Convenience alias for unit-level results.
pub type UnitResult<T> = Result<T, UnitError>;

/// Errors surfaced by the workflow driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    /// A full bring-up round completed with no unit making progress while
    /// some units were still waiting on unallocated inputs.
    ///
    /// This surfaces a dependency cycle or a missing producer as an error
    /// instead of polling forever.
    Stalled {
        /// Names of the units still waiting when bring-up stalled.
        pending: Vec<&'static str>,
    },

    /// A unit reported a fatal error during bring-up or a run pass.
    Unit {
        /// Name of the failing unit.
        unit: &'static str,

        /// The unit's error.
        source: UnitError,
    },
}

impl fmt::Display for WorkflowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowError::Stalled { pending } => {
                write!(f, "workflow bring-up stalled; units still waiting: {}", pending.join(", "))
            }
            WorkflowError::Unit { unit, source } => {
                write!(f, "unit {unit} failed: {source}")
            }
        }
    }
}

impl std::error::Error for WorkflowError {}

/// Convenience alias for workflow-level results.
pub type WorkflowResult<T> = Result<T, WorkflowError>;
