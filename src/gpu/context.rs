//! GPU device and queue initialization.
//!
//! [`GpuContext`] bundles the long-lived device state every accelerator
//! operation needs: the `wgpu` device and its submission queue. One context
//! is created per selected accelerator backend and shared by reference
//! through the [`Backend`](crate::graph::unit::Backend) value; buffers bind
//! themselves to it on first device use.
//!
//! ## Initialization
//!
//! Adapter and device acquisition are asynchronous in `wgpu`; the engine's
//! graph walk is synchronous, so both requests are resolved with a blocking
//! wait at construction time. Initialization failures surface as
//! [`BackendError::Unavailable`] and abort backend selection; there is no
//! degraded mode.

#![cfg(feature = "gpu")]

use crate::graph::error::BackendError;

/// Long-lived GPU backend state: the device and its submission queue.
///
/// ## Role
/// Owns the `wgpu` handles used for buffer creation, program compilation,
/// and dispatch. Shared by all units and buffers running on the same
/// selected accelerator backend.
pub struct GpuContext {
    /// Logical GPU device.
    pub device: wgpu::Device,

    /// Submission queue of the device.
    pub queue: wgpu::Queue,
}

impl GpuContext {
    /// Acquires the default high-performance adapter and creates a device.
    ///
    /// ## Errors
    /// [`BackendError::Unavailable`] if no compatible adapter exists or the
    /// device request is denied.
    pub fn new() -> Result<Self, BackendError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            ..Default::default()
        }))
        .map_err(|e| BackendError::Unavailable {
            message: format!("no compatible adapter: {e}"),
        })?;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("numflow_device"),
            ..Default::default()
        }))
        .map_err(|e| BackendError::Unavailable {
            message: format!("device request failed: {e}"),
        })?;

        Ok(Self { device, queue })
    }
}
