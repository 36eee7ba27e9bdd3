//! # numflow
//!
//! Dataflow execution framework for numeric processing graphs whose units
//! can run on either the host CPU or a GPU-class accelerator.
//!
//! ## Design Goals
//! - One logical buffer, coherent across both execution domains
//! - Non-blocking readiness protocol for lazily wired graphs
//! - Per-shape program specialization with caching
//! - Safe, explicit data movement
//!
//! Units dispatch each run to exactly one backend and produce identical
//! results on both; the accelerator backend is optional
//! (`feature = "gpu"`).

#![forbid(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![allow(clippy::module_inception)]

pub mod graph;

#[cfg(feature = "gpu")]
pub mod gpu;

// ─────────────────────────────────────────────────────────────────────────────
// Re-exports (Public API)
// ─────────────────────────────────────────────────────────────────────────────

// Core dataflow types

pub use graph::buffer::{BufferRef, MemoryBuffer};

pub use graph::joiner::InputJoiner;

pub use graph::types::{
    BackendKind,
    ElementType,
    InitStatus,
    Scalar,
    Shape,
    UnitID,
    UnitState,
};

pub use graph::unit::{AcceleratedUnit, Backend, Lifecycle, Unit};

pub use graph::workflow::Workflow;

pub use graph::error::{
    BackendError,
    ConfigurationError,
    ElementMismatchError,
    ShapeError,
    StateError,
    UnitError,
    UnitResult,
    WorkflowError,
    WorkflowResult,
};

// ─────────────────────────────────────────────────────────────────────────────
// Prelude (Optional but recommended)
// ─────────────────────────────────────────────────────────────────────────────

/// Commonly used dataflow types.
///
/// Import with:
/// ```rust
/// use numflow::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        Backend,
        BufferRef,
        ElementType,
        InitStatus,
        InputJoiner,
        Shape,
        Unit,
        UnitState,
        Workflow,
    };
}
