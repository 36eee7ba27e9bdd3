//! Minibatch Input Joining
//!
//! [`InputJoiner`] concatenates several minibatch inputs into one continuous
//! minibatch output along the feature axis.
//!
//! ## Shape semantics
//!
//! * The output minibatch size is the **minimum** of the inputs' leading
//!   dimensions; larger inputs are truncated to it, with a logged warning.
//! * The output per-sample width is the sum of the inputs' per-sample
//!   widths, unless an explicit override is configured.
//!
//! ## Join order
//!
//! Inputs occupy output columns in declaration order, each spanning its own
//! per-sample width. A zero-width input ends the join at its position:
//! later inputs are not copied, even when they are non-empty. The output
//! keeps its full allocated width; the columns past the stop point stay
//! zero. This behavior is preserved deliberately and pinned by tests; see
//! the notes in the test suite before changing it.
//!
//! ## Backends
//!
//! The host path copies row slices directly. The accelerator path builds a
//! concatenation program specialized on the output shape and element type,
//! caching it per specialization signature, and dispatches a 2-D launch
//! derived from the minibatch dimension. Both paths produce byte-identical
//! output for the same inputs.

use tracing::warn;

use crate::graph::buffer::BufferRef;
use crate::graph::error::{ConfigurationError, ElementMismatchError, UnitResult};
use crate::graph::types::{InitStatus, Shape, UnitID};
use crate::graph::unit::{AcceleratedUnit, Lifecycle};

#[cfg(feature = "gpu")]
use std::rc::Rc;

#[cfg(feature = "gpu")]
use crate::graph::error::BackendError;
#[cfg(feature = "gpu")]
use crate::graph::types::ElementType;
#[cfg(feature = "gpu")]
use crate::gpu::{
    dispatch::{self, LaunchParams, WORKGROUP_DIM},
    program::ProgramCache,
    GpuContext,
};

/// Accelerator-side state for one built specialization: the bound argument
/// set and the launch geometry, keyed back into the program cache by
/// signature.
#[cfg(feature = "gpu")]
struct JoinKernel {
    signature: String,
    bind_group: wgpu::BindGroup,
    // Kept alive for the lifetime of the bind group that references it.
    _params: wgpu::Buffer,
    workgroups: (u32, u32),
    bound_inputs: usize,
}

/// Joins several minibatch inputs into one continuous minibatch output.
///
/// ## Buffers
/// * inputs: ordered, non-empty sequence fixed at construction,
/// * output: allocated during initialize to
///   `(min batch, sum of per-sample widths)`.
///
/// ## Configuration
/// * [`InputJoiner::with_output_sample_width`] overrides the computed
///   per-sample output width.
pub struct InputJoiner {
    id: UnitID,
    lifecycle: Lifecycle,
    inputs: Vec<BufferRef>,
    output: BufferRef,
    output_sample_width: Option<usize>,
    #[cfg(feature = "gpu")]
    programs: ProgramCache,
    #[cfg(feature = "gpu")]
    kernel: Option<JoinKernel>,
}

impl InputJoiner {
    /// Creates a joiner over the given inputs.
    ///
    /// ## Errors
    /// [`ConfigurationError::EmptyInputs`] if `inputs` is empty. This is a
    /// configuration error and is never retried.
    pub fn new(id: UnitID, inputs: Vec<BufferRef>) -> Result<Self, ConfigurationError> {
        if inputs.is_empty() {
            return Err(ConfigurationError::EmptyInputs);
        }

        Ok(Self {
            id,
            lifecycle: Lifecycle::new(),
            inputs,
            output: BufferRef::new(),
            output_sample_width: None,
            #[cfg(feature = "gpu")]
            programs: ProgramCache::new(),
            #[cfg(feature = "gpu")]
            kernel: None,
        })
    }

    /// Overrides the computed per-sample output width.
    pub fn with_output_sample_width(mut self, width: usize) -> Self {
        self.output_sample_width = Some(width);
        self
    }

    /// Returns a handle to the output buffer for downstream wiring.
    pub fn output(&self) -> BufferRef {
        self.output.clone()
    }

    /// Returns the number of programs compiled for this unit so far.
    #[cfg(feature = "gpu")]
    pub fn compiled_programs(&self) -> usize {
        self.programs.len()
    }

    /// Per-sample widths of the inputs that participate in the join: the
    /// prefix of the declaration order up to the first zero-width input.
    #[cfg(feature = "gpu")]
    fn participating_widths(&self) -> Vec<usize> {
        let mut widths = Vec::with_capacity(self.inputs.len());
        for input in &self.inputs {
            let width = input
                .borrow()
                .shape()
                .map(|s| s.sample_width())
                .unwrap_or(0);
            if width == 0 {
                break;
            }
            widths.push(width);
        }
        widths
    }
}

impl AcceleratedUnit for InputJoiner {
    fn id(&self) -> UnitID {
        self.id
    }

    fn name(&self) -> &'static str {
        "InputJoiner"
    }

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn lifecycle_mut(&mut self) -> &mut Lifecycle {
        &mut self.lifecycle
    }

    fn inputs(&self) -> Vec<BufferRef> {
        self.inputs.clone()
    }

    fn outputs(&self) -> Vec<BufferRef> {
        vec![self.output.clone()]
    }

    fn setup(&mut self) -> UnitResult<InitStatus> {
        let mut samples = Vec::with_capacity(self.inputs.len());
        for input in &self.inputs {
            let guard = input.borrow();
            match (guard.shape(), guard.element()) {
                (Some(shape), Some(element)) => {
                    samples.push((shape.batch(), shape.sample_width(), element));
                }
                _ => return Ok(InitStatus::NotReady),
            }
        }

        let batch = samples.iter().map(|s| s.0).min().unwrap_or(0);
        if samples.iter().any(|s| s.0 > batch) {
            warn!(
                minibatch = batch,
                "inputs of different sizes; sizes will be cut to the lowest value"
            );
        }

        let element = samples[0].2;
        for &(_, _, actual) in &samples {
            if actual != element {
                return Err(ElementMismatchError {
                    expected: element,
                    actual,
                }
                .into());
            }
        }

        let width = self
            .output_sample_width
            .unwrap_or_else(|| samples.iter().map(|s| s.1).sum());

        self.output
            .borrow_mut()
            .allocate(Shape::new([batch, width]), element)?;
        Ok(InitStatus::Ready)
    }

    fn host_run(&mut self) -> UnitResult<()> {
        let mut out = self.output.borrow_mut();
        out.map_invalidate();

        let batch = out.shape().map(|s| s.batch()).unwrap_or(0);
        let total = out.shape().map(|s| s.sample_width()).unwrap_or(0);
        let elem = out.element().map(|e| e.size_of()).unwrap_or(0);

        let mut low = 0usize;
        for input in &self.inputs {
            let mut src = input.borrow_mut();
            src.map_read()?;

            let width = src.shape().map(|s| s.sample_width()).unwrap_or(0);
            let high = low + width;
            if low >= high {
                // A zero-width input ends the join; later inputs are not
                // copied.
                break;
            }

            let src_bytes = src.host();
            let dst_bytes = out.host_mut();
            for row in 0..batch {
                let src_off = row * width * elem;
                let dst_off = (row * total + low) * elem;
                dst_bytes[dst_off..dst_off + width * elem]
                    .copy_from_slice(&src_bytes[src_off..src_off + width * elem]);
            }
            low = high;
        }
        Ok(())
    }

    #[cfg(feature = "gpu")]
    fn accel_init(&mut self, context: &Rc<GpuContext>) -> UnitResult<()> {
        let (shape, element) = {
            let out = self.output.borrow();
            match (out.shape().cloned(), out.element()) {
                (Some(shape), Some(element)) => (shape, element),
                _ => return Err(BackendError::NoDeviceBound.into()),
            }
        };

        let signature = format!("{}_{}_{}", AcceleratedUnit::name(self), shape, element);
        if self
            .kernel
            .as_ref()
            .is_some_and(|k| k.signature == signature)
        {
            return Ok(());
        }

        let batch = shape.batch();
        let widths = self.participating_widths();
        if batch == 0 || shape.sample_width() == 0 || widths.is_empty() {
            // Nothing to copy; the run step is a no-op and the zero-filled
            // host storage stays authoritative.
            self.kernel = None;
            return Ok(());
        }

        self.output.borrow_mut().bind_device(context)?;
        for input in &self.inputs[..widths.len()] {
            input.borrow_mut().bind_device(context)?;
        }

        let defines = join_defines(element, &widths);
        let program = self.programs.get_or_build(
            context,
            &signature,
            JOIN_TEMPLATE,
            &defines,
            "join",
            widths.len(),
        )?;

        let params = dispatch::create_params_buffer(
            context,
            LaunchParams::new(batch as u32, shape.sample_width() as u32),
        );

        let out_guard = self.output.borrow();
        let input_guards: Vec<_> = self.inputs[..widths.len()]
            .iter()
            .map(|b| b.borrow())
            .collect();

        let mut buffers = Vec::with_capacity(1 + widths.len());
        buffers.push(out_guard.device_buffer()?);
        for guard in &input_guards {
            buffers.push(guard.device_buffer()?);
        }

        let bind_group = dispatch::build_bind_group(context, &program.layout, &buffers, &params);

        let groups = (batch as u32 + WORKGROUP_DIM - 1) / WORKGROUP_DIM;
        drop(input_guards);
        drop(out_guard);

        self.kernel = Some(JoinKernel {
            signature,
            bind_group,
            _params: params,
            workgroups: (groups, groups),
            bound_inputs: widths.len(),
        });
        Ok(())
    }

    #[cfg(feature = "gpu")]
    fn accel_run(&mut self, context: &Rc<GpuContext>) -> UnitResult<()> {
        let Some(kernel) = self.kernel.as_ref() else {
            return Ok(());
        };

        for input in &self.inputs[..kernel.bound_inputs] {
            input.borrow_mut().device_map_read()?;
        }
        self.output.borrow_mut().device_map_write()?;

        let program =
            self.programs
                .get(&kernel.signature)
                .ok_or_else(|| BackendError::MissingProgram {
                    signature: kernel.signature.clone(),
                })?;

        dispatch::dispatch_2d(context, &program.pipeline, &kernel.bind_group, kernel.workgroups)?;
        Ok(())
    }
}

/// Concatenation kernel source template.
///
/// Substitutions: `${ETYPE}` element-type tag, `${INPUT_BINDINGS}` one
/// read-only storage binding per participating input, `${PARAMS_BINDING}`
/// the uniform slot index, `${BODY}` the per-input copy loops with widths
/// and column offsets baked in.
///
/// The launch is two-dimensional over `(minibatch, minibatch)`; only the
/// first row of the second dimension performs work.
#[cfg(feature = "gpu")]
const JOIN_TEMPLATE: &str = "\
struct Params {
    batch: u32,
    width: u32,
    _pad0: u32,
    _pad1: u32,
}

@group(0) @binding(0) var<storage, read_write> output: array<${ETYPE}>;
${INPUT_BINDINGS}
@group(0) @binding(${PARAMS_BINDING}) var<uniform> params: Params;

@compute @workgroup_size(16, 16)
fn join(@builtin(global_invocation_id) gid: vec3<u32>) {
    let row = gid.x;
    if (row >= params.batch || gid.y != 0u) {
        return;
    }
${BODY}
}
";

/// Builds the substitution set for [`JOIN_TEMPLATE`]: the element-type tag
/// plus the binding declarations and copy loops for the participating
/// inputs, with widths and column offsets baked in.
#[cfg(feature = "gpu")]
fn join_defines(element: ElementType, widths: &[usize]) -> Vec<(&'static str, String)> {
    let mut bindings = String::new();
    for i in 0..widths.len() {
        bindings.push_str(&format!(
            "@group(0) @binding({}) var<storage, read> input{}: array<{}>;\n",
            i + 1,
            i,
            element.kernel_name()
        ));
    }

    let mut body = String::new();
    let mut low = 0usize;
    for (i, &width) in widths.iter().enumerate() {
        body.push_str(&format!(
            "    for (var c: u32 = 0u; c < {width}u; c = c + 1u) {{\n"
        ));
        body.push_str(&format!(
            "        output[row * params.width + {low}u + c] = input{i}[row * {width}u + c];\n"
        ));
        body.push_str("    }\n");
        low += width;
    }

    vec![
        ("ETYPE", element.kernel_name().to_string()),
        ("INPUT_BINDINGS", bindings),
        ("PARAMS_BINDING", (widths.len() + 1).to_string()),
        ("BODY", body),
    ]
}
