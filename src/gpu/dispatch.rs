//! # Dispatch Runtime
//!
//! This module defines the **execution bridge** between a unit's accelerator
//! path and the GPU backend: argument binding and workload submission.
//!
//! ## Binding order
//!
//! Bind group entries are assigned in the fixed order the program cache's
//! layouts expect:
//!
//! 1. The unit's output buffer (read-write storage)
//! 2. Input buffers in declaration order (read-only storage)
//! 3. Uniform parameter buffer ([`LaunchParams`])
//!
//! ## Launch geometry
//!
//! Dispatch is two-dimensional, with both grid axes derived from the
//! output's minibatch dimension and a fixed 16×16 workgroup. Kernels that
//! only need one row of the second axis guard it out.
//!
//! ## Synchronization
//!
//! Every submission is followed by a blocking device poll, so execution is
//! complete relative to the caller's next use of the output buffer. The
//! buffer layer's host-read mark then only has to perform the readback.

#![cfg(feature = "gpu")]

use wgpu::util::DeviceExt;

use crate::graph::error::BackendError;
use crate::gpu::context::GpuContext;

/// Workgroup extent used on both launch axes.
pub const WORKGROUP_DIM: u32 = 16;

/// Per-dispatch uniform parameters.
///
/// Padded to a 16-byte uniform block.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct LaunchParams {
    /// Minibatch size (valid output rows).
    pub batch: u32,

    /// Per-sample output width in elements.
    pub width: u32,

    _pad0: u32,
    _pad1: u32,
}

unsafe impl bytemuck::Pod for LaunchParams {}
unsafe impl bytemuck::Zeroable for LaunchParams {}

impl LaunchParams {
    /// Creates launch parameters for the given output geometry.
    pub fn new(batch: u32, width: u32) -> Self {
        Self {
            batch,
            width,
            _pad0: 0,
            _pad1: 0,
        }
    }
}

/// Creates the uniform buffer holding `params`.
pub fn create_params_buffer(context: &GpuContext, params: LaunchParams) -> wgpu::Buffer {
    context
        .device
        .create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("numflow_params"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        })
}

/// Builds a bind group in the documented argument order.
///
/// `buffers[0]` is the output, `buffers[1..]` the inputs in declaration
/// order; `params` takes the final slot.
pub fn build_bind_group(
    context: &GpuContext,
    layout: &wgpu::BindGroupLayout,
    buffers: &[&wgpu::Buffer],
    params: &wgpu::Buffer,
) -> wgpu::BindGroup {
    let mut entries = Vec::with_capacity(buffers.len() + 1);

    for (i, buffer) in buffers.iter().enumerate() {
        entries.push(wgpu::BindGroupEntry {
            binding: i as u32,
            resource: buffer.as_entire_binding(),
        });
    }

    entries.push(wgpu::BindGroupEntry {
        binding: buffers.len() as u32,
        resource: params.as_entire_binding(),
    });

    context
        .device
        .create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("numflow_bind_group"),
            layout,
            entries: &entries,
        })
}

/// Enqueues a two-dimensional compute dispatch and waits for completion.
///
/// ## Parameters
/// * `pipeline` - compiled program to execute
/// * `bind_group` - arguments bound via [`build_bind_group`]
/// * `workgroups` - grid extents on the x and y axes
///
/// ## Errors
/// [`BackendError::Dispatch`] if the device poll fails.
pub fn dispatch_2d(
    context: &GpuContext,
    pipeline: &wgpu::ComputePipeline,
    bind_group: &wgpu::BindGroup,
    workgroups: (u32, u32),
) -> Result<(), BackendError> {
    let mut encoder = context
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("numflow_compute_encoder"),
        });

    {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("numflow_compute_pass"),
            timestamp_writes: None,
        });

        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.dispatch_workgroups(workgroups.0, workgroups.1, 1);
    }

    let submission = context.queue.submit(Some(encoder.finish()));
    context
        .device
        .poll(wgpu::PollType::WaitForSubmissionIndex(submission))
        .map_err(|e| BackendError::Dispatch {
            message: format!("wgpu device poll failed: {e:?}"),
        })?;

    Ok(())
}
