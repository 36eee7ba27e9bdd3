//! # Specialized Program Cache
//!
//! This module provides the **compiled-program cache** of the accelerator
//! backend. It is responsible for rendering kernel source templates,
//! compiling them into `wgpu::ComputePipeline` objects, and reusing the
//! result across runs.
//!
//! ## Purpose
//!
//! * each specialization signature is compiled **at most once per unit
//!   instance**,
//! * compiled programs are reused across run passes,
//! * bind group layouts remain stable and compatible with the argument
//!   order contract of the dispatch layer.
//!
//! The cache is indexed by the **specialization signature**: a string
//! encoding the unit kind, the full output shape, and the element-type tag
//! (`InputJoiner_8x8_f32`). The signature must include every value that
//! affects the compiled output; on a hit the cached program is returned
//! unchanged even if a caller would have rendered different source.
//!
//! ---
//!
//! ## Binding model
//!
//! Programs compiled by this module follow a strict binding convention:
//!
//! * Binding `0` - read-write storage buffer for the unit's output
//! * Bindings `1..=N` - read-only storage buffers for the inputs in
//!   declaration order
//! * Binding `N+1` - uniform buffer containing per-dispatch parameters
//!
//! ---
//!
//! ## Safety and invariants
//!
//! * All programs are created for **compute-only** execution.
//! * Rendered source is validated at compile time; validation failures are
//!   captured through a device error scope and surfaced as
//!   [`BackendError::ProgramBuild`].
//! * Entries are immutable once created.

#![cfg(feature = "gpu")]

use std::collections::HashMap;

use crate::graph::error::BackendError;
use crate::gpu::context::GpuContext;

/// Renders a kernel source template by substituting `${KEY}` tokens.
///
/// `defines` maps symbolic names to their concrete values; the minimum
/// define every template accepts is the element-type tag. Unknown tokens
/// are left in place and will fail program validation, which is the
/// intended failure mode for an incomplete define set.
pub fn render_source(template: &str, defines: &[(&str, String)]) -> String {
    let mut source = template.to_string();
    for (key, value) in defines {
        source = source.replace(&format!("${{{key}}}"), value);
    }
    source
}

/// A compiled program together with its bound entry point and layout.
pub struct CompiledProgram {
    /// The compiled compute pipeline.
    pub pipeline: wgpu::ComputePipeline,

    /// Bind group layout matching the binding model of this program.
    pub layout: wgpu::BindGroupLayout,

    /// Entry point ("kernel") the pipeline was bound to.
    pub entry_point: &'static str,
}

/// Cache of compiled programs keyed by specialization signature.
///
/// ## Role
/// Stores [`CompiledProgram`] entries for one unit instance, allowing the
/// unit to reuse its specialized program across run passes.
///
/// ## Design
/// * One program per specialization signature
/// * Programs are created lazily on first use
/// * Layouts are stored alongside pipelines to guarantee compatibility
///
/// ## Thread safety
/// This type is not thread-safe by itself; it is owned by a single unit in
/// the single-threaded graph walk.
pub struct ProgramCache {
    map: HashMap<String, CompiledProgram>,
}

impl ProgramCache {
    /// Creates an empty program cache.
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// Returns the number of compiled programs in the cache.
    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` if no program has been compiled yet.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns the cached program for `signature`, if any.
    pub fn get(&self, signature: &str) -> Option<&CompiledProgram> {
        self.map.get(signature)
    }

    /// Retrieves an existing program or renders and compiles a new one.
    ///
    /// ## Parameters
    /// * `context` - GPU device context
    /// * `signature` - specialization signature (unit kind, output shape,
    ///   element-type tag)
    /// * `template` - kernel source template with `${KEY}` tokens
    /// * `defines` - symbolic substitutions; the element-type tag at minimum
    /// * `entry_point` - kernel entry point function
    /// * `input_bindings` - number of read-only input bindings
    ///
    /// ## Semantics
    /// * If a program for `signature` exists, it is returned unchanged even
    ///   if `defines` differ. Callers must therefore encode every value
    ///   that affects the rendered source into the signature.
    /// * Otherwise the template is rendered with `defines`, compiled, and
    ///   cached under `signature`.
    ///
    /// ## Errors
    /// [`BackendError::ProgramBuild`] if validation or pipeline creation
    /// fails.
    pub fn get_or_build(
        &mut self,
        context: &GpuContext,
        signature: &str,
        template: &str,
        defines: &[(&str, String)],
        entry_point: &'static str,
        input_bindings: usize,
    ) -> Result<&CompiledProgram, BackendError> {
        if !self.map.contains_key(signature) {
            let source = render_source(template, defines);
            let program = build_program(context, signature, &source, entry_point, input_bindings)?;
            self.map.insert(signature.to_string(), program);
        }

        Ok(self.map.get(signature).unwrap())
    }
}

impl Default for ProgramCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Compiles a compute pipeline and its bind group layout.
///
/// ## Binding layout
/// * Binding `0`: read-write storage (output)
/// * Bindings `1..=input_bindings`: read-only storage (inputs)
/// * Binding `input_bindings + 1`: uniform parameters
///
/// ## Errors
/// Returns [`BackendError::ProgramBuild`] carrying the validation message
/// if shader or pipeline creation fails.
fn build_program(
    context: &GpuContext,
    signature: &str,
    source: &str,
    entry_point: &'static str,
    input_bindings: usize,
) -> Result<CompiledProgram, BackendError> {
    let device = &context.device;

    device.push_error_scope(wgpu::ErrorFilter::Validation);

    let mut entries = Vec::with_capacity(input_bindings + 2);

    // output: read-write storage
    entries.push(wgpu::BindGroupLayoutEntry {
        binding: 0,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: false },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    });

    // inputs: read-only storage, declaration order
    for i in 0..input_bindings {
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: (i + 1) as u32,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: true },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        });
    }

    // uniform parameters
    entries.push(wgpu::BindGroupLayoutEntry {
        binding: (input_bindings + 1) as u32,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    });

    let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("numflow_bgl"),
        entries: &entries,
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("numflow_pipeline_layout"),
        bind_group_layouts: &[&layout],
        push_constant_ranges: &[],
    });

    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("numflow_shader"),
        source: wgpu::ShaderSource::Wgsl(source.to_string().into()),
    });

    let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some("numflow_compute_pipeline"),
        layout: Some(&pipeline_layout),
        module: &module,
        entry_point: Some(entry_point),
        compilation_options: wgpu::PipelineCompilationOptions::default(),
        cache: None,
    });

    if let Some(error) = pollster::block_on(device.pop_error_scope()) {
        return Err(BackendError::ProgramBuild {
            signature: signature.to_string(),
            message: error.to_string(),
        });
    }

    Ok(CompiledProgram {
        pipeline,
        layout,
        entry_point,
    })
}
