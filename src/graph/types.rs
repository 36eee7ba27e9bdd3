//! Core Types, Identifiers, and Element Layouts
//!
//! This module defines the **fundamental types and identifiers** used
//! throughout the dataflow engine. These definitions form the *semantic
//! backbone* of the system and are shared across buffers, units, program
//! caches, and the workflow driver.
//!
//! ## Design Philosophy
//!
//! The engine is designed around:
//!
//! - **Dense, contiguous host storage** addressed by logical shapes
//! - **Closed enums** for element types and execution backends
//! - **Stable numeric identifiers** for units
//! - **Explicit readiness signalling** instead of blocking calls
//!
//! ## Shapes
//!
//! A [`Shape`] is an ordered sequence of dimension sizes. The leading
//! dimension is the **minibatch axis**; the product of the remaining
//! dimensions is the **per-sample width**. A rank-2 shape `(8, 5)` therefore
//! describes 8 samples of 5 elements each.
//!
//! ## Element Types
//!
//! Buffers are type-erased byte containers tagged with an [`ElementType`].
//! The tag carries the element's byte size and its kernel-language type name,
//! which is the minimum substitution every kernel source template accepts.
//! Typed views are recovered through the [`Scalar`] binding.
//!
//! ## Lifecycle Vocabulary
//!
//! [`UnitState`] enumerates the lifecycle states a unit moves through, and
//! [`InitStatus`] is the non-error readiness outcome of an initialize call.
//! `NotReady` is deliberately a *value*, not an error, so that a workflow can
//! re-poll a unit whose upstream buffers are still unallocated without
//! unwinding.

use std::fmt;

/// Unique identifier for a unit within a workflow.
pub type UnitID = u16;

/// Logical shape of a buffer: an ordered sequence of dimension sizes.
///
/// The leading dimension is the minibatch axis. The product of the trailing
/// dimensions is the per-sample width used by feature-axis operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    /// Creates a shape from an ordered list of dimension sizes.
    pub fn new(dims: impl Into<Vec<usize>>) -> Self {
        Self { dims: dims.into() }
    }

    /// Returns the dimension sizes in order.
    #[inline]
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Returns the number of dimensions.
    #[inline]
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Returns the leading (minibatch) dimension, or 0 for a rank-0 shape.
    #[inline]
    pub fn batch(&self) -> usize {
        self.dims.first().copied().unwrap_or(0)
    }

    /// Returns the per-sample width: the product of all trailing dimensions.
    ///
    /// A rank-1 shape has a per-sample width of 1; a rank-0 shape has a
    /// per-sample width of 0.
    #[inline]
    pub fn sample_width(&self) -> usize {
        if self.dims.is_empty() {
            return 0;
        }
        self.dims[1..].iter().product()
    }

    /// Returns the total number of elements described by this shape.
    #[inline]
    pub fn len(&self) -> usize {
        if self.dims.is_empty() {
            return 0;
        }
        self.dims.iter().product()
    }

    /// Returns `true` if this shape describes zero elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dims.is_empty() {
            return f.write_str("scalar");
        }
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                f.write_str("x")?;
            }
            write!(f, "{d}")?;
        }
        Ok(())
    }
}

impl From<(usize, usize)> for Shape {
    fn from((rows, columns): (usize, usize)) -> Self {
        Shape::new([rows, columns])
    }
}

/// Element type stored in a buffer.
///
/// The set is closed: every variant has a fixed byte size and a kernel-side
/// type name usable as the element-type substitution in source templates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ElementType {
    /// 32-bit IEEE-754 float.
    F32,
    /// 32-bit signed integer.
    I32,
    /// 32-bit unsigned integer.
    U32,
}

impl ElementType {
    /// Returns the size of one element in bytes.
    #[inline]
    pub fn size_of(self) -> usize {
        match self {
            ElementType::F32 | ElementType::I32 | ElementType::U32 => 4,
        }
    }

    /// Returns the kernel-language (WGSL) name of this element type.
    ///
    /// This is the element-type tag substituted into kernel source templates
    /// and encoded into specialization signatures.
    #[inline]
    pub fn kernel_name(self) -> &'static str {
        match self {
            ElementType::F32 => "f32",
            ElementType::I32 => "i32",
            ElementType::U32 => "u32",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kernel_name())
    }
}

/// Binds a plain-old-data Rust type to its buffer [`ElementType`] tag.
///
/// Implemented for exactly the types the closed [`ElementType`] enum covers.
/// Typed host views over byte storage are only handed out when the view type's
/// tag matches the buffer's tag.
pub trait Scalar: bytemuck::Pod {
    /// Element-type tag corresponding to `Self`.
    const ELEMENT: ElementType;
}

impl Scalar for f32 {
    const ELEMENT: ElementType = ElementType::F32;
}

impl Scalar for i32 {
    const ELEMENT: ElementType = ElementType::I32;
}

impl Scalar for u32 {
    const ELEMENT: ElementType = ElementType::U32;
}

/// Lifecycle state of a unit.
///
/// Units move `Constructed → Initializing → Ready → Running → (Ready |
/// Failed)`. `Initializing` is re-entered on every readiness poll until all
/// upstream buffers are allocated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnitState {
    /// Created; initialize has not been attempted.
    Constructed,
    /// Initialize was attempted; the unit may still be waiting on inputs.
    Initializing,
    /// All inputs allocated and outputs sized; the unit may run.
    Ready,
    /// A run is in progress.
    Running,
    /// A fatal error occurred; the unit will not be retried.
    Failed,
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UnitState::Constructed => "constructed",
            UnitState::Initializing => "initializing",
            UnitState::Ready => "ready",
            UnitState::Running => "running",
            UnitState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Non-error outcome of a unit's initialize call.
///
/// `NotReady` is a normal control-flow value: it signals that a declared
/// input buffer is still unallocated and the owning workflow should poll
/// again after upstream producers have initialized. It is never an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InitStatus {
    /// At least one declared input buffer is unallocated; retry later.
    NotReady,
    /// All inputs allocated and outputs sized.
    Ready,
}

/// Execution domain a unit's run step dispatches to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    /// General-purpose processor path.
    Host,
    /// Accelerator (GPU) path.
    Accelerator,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::Host => "host",
            BackendKind::Accelerator => "accelerator",
        };
        f.write_str(name)
    }
}
