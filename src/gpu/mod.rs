//! # Accelerator Execution Backend
//!
//! This module implements the **accelerator execution backend** of the
//! engine, enabling units to run their compute step as **compute shaders**
//! via `wgpu`.
//!
//! The backend is an **optional, feature-gated extension** (`feature =
//! "gpu"`) that integrates with the unit lifecycle while preserving the
//! coherence invariants enforced by the buffer layer.
//!
//! ## Design goals
//!
//! * Execute data-parallel unit passes on the GPU
//! * Specialize and cache one program per (unit kind, output shape,
//!   element type)
//! * Keep all host/device data movement explicit and mark-driven
//! * Provide explicit, deterministic error propagation
//!
//! ---
//!
//! ## High-level execution model
//!
//! Accelerator execution of a unit proceeds in **four explicit stages**:
//!
//! 1. **Specialize**
//!    * During initialize, the unit renders its kernel source template with
//!      the element-type tag and shape-derived constants, and compiles it
//!      through the [`program::ProgramCache`]. A given specialization
//!      signature is compiled at most once per unit instance.
//!
//! 2. **Bind**
//!    * Device-resident buffers are associated with kernel parameter slots
//!      in a fixed order: the output buffer first, then the inputs in
//!      declaration order, then the uniform parameter block.
//!
//! 3. **Dispatch**
//!    * The launch is sized from the output's minibatch dimension and
//!      submitted; the device is polled to completion before the call
//!      returns.
//!
//! 4. **Synchronize**
//!    * The buffer layer's host-read mark performs the readback, so host
//!      code never observes a partially written output.
//!
//! ---
//!
//! ## Module structure
//!
//! * [`context`] — device and queue initialization
//! * [`program`] — template rendering, program compilation and caching
//! * [`dispatch`] — argument binding and workload submission
//!
//! ## Failure policy
//!
//! Backend errors are surfaced verbatim as
//! [`BackendError`](crate::graph::error::BackendError); there is no silent
//! fallback to the host path.

#![cfg(feature = "gpu")]

pub mod context;
pub mod dispatch;
pub mod program;

pub use context::GpuContext;
pub use program::ProgramCache;
