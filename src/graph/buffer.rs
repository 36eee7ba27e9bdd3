//! # Dual-State Memory Buffers
//!
//! This module implements the **coherent host/device buffer** that every
//! unit reads its inputs from and writes its outputs into.
//!
//! ## Purpose
//!
//! A [`MemoryBuffer`] holds one logical array with up to two physical
//! copies:
//!
//! * contiguous host storage, always present once allocated,
//! * a device allocation, created lazily on first accelerator use.
//!
//! Two dirty flags track which side last wrote:
//!
//! * `host_dirty` - host storage is newer than the device copy,
//! * `device_dirty` - the device copy is newer than host storage.
//!
//! At most one flag is set at any time. All crossings of the host/device
//! boundary go through the four **mark operations**; direct access without
//! the corresponding mark is a usage error that debug builds detect.
//!
//! ## Mark operations
//!
//! | Operation | Meaning | Effect |
//! |---|---|---|
//! | [`MemoryBuffer::map_invalidate`] | host code will mutate | device copy discarded, `host_dirty` set |
//! | [`MemoryBuffer::map_read`] | host code will read | device→host copy if `device_dirty`, blocking until device work completes |
//! | [`MemoryBuffer::device_map_read`] | a kernel will read | host→device upload if `host_dirty` |
//! | [`MemoryBuffer::device_map_write`] | a kernel will write | pending upload flushed, `device_dirty` set |
//!
//! The host-read mark is the synchronization point of the whole engine:
//! accelerator dispatch may complete asynchronously, but a subsequent
//! `map_read` always observes finished results.
//!
//! ## Lifecycle
//!
//! Buffers are created empty by their owning unit. An unallocated buffer
//! (`shape() == None`) is the "unready" sentinel that keeps downstream
//! units in the `NotReady` initialize loop. Allocation fixes the shape;
//! re-allocating with the identical shape and element type is an idempotent
//! no-op, anything else is a [`ShapeError`] /
//! [`ElementMismatchError`](crate::graph::error::ElementMismatchError).
//!
//! ## Ownership
//!
//! A buffer is exclusively owned by the unit that declares it as an output.
//! Consumers hold [`BufferRef`] handles and must never mutate through them
//! outside a host-write mark; the shared handle enforces exclusive borrows
//! at runtime.

use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

use crate::graph::error::{BackendError, ElementMismatchError, ShapeError, UnitResult};
use crate::graph::types::{ElementType, Scalar, Shape};

#[cfg(feature = "gpu")]
use crate::gpu::GpuContext;

/// Device-side half of a buffer: the allocation plus the context it was
/// created on.
#[cfg(feature = "gpu")]
struct DeviceMirror {
    context: Rc<GpuContext>,
    buffer: wgpu::Buffer,
}

/// Dual-state (host + device) data container with explicit synchronization.
///
/// ## Role
/// Owns the host storage, the lazily created device allocation, and the two
/// coherence flags. See the module documentation for the mark-operation
/// contract.
///
/// ## Thread safety
/// Buffers participate in a single-threaded cooperative graph walk and are
/// shared via [`BufferRef`]; they are not `Send`.
pub struct MemoryBuffer {
    shape: Option<Shape>,
    element: ElementType,
    host: Vec<u8>,
    host_dirty: bool,
    device_dirty: bool,
    #[cfg(feature = "gpu")]
    device: Option<DeviceMirror>,
}

impl MemoryBuffer {
    /// Creates an empty, unallocated buffer (the "unready" sentinel).
    pub fn new() -> Self {
        Self {
            shape: None,
            element: ElementType::F32,
            host: Vec::new(),
            host_dirty: false,
            device_dirty: false,
            #[cfg(feature = "gpu")]
            device: None,
        }
    }

    /// Returns `true` once the buffer has been allocated to a fixed shape.
    #[inline]
    pub fn is_allocated(&self) -> bool {
        self.shape.is_some()
    }

    /// Returns the allocated shape, or `None` for an unallocated buffer.
    #[inline]
    pub fn shape(&self) -> Option<&Shape> {
        self.shape.as_ref()
    }

    /// Returns the element type, or `None` for an unallocated buffer.
    #[inline]
    pub fn element(&self) -> Option<ElementType> {
        self.shape.as_ref().map(|_| self.element)
    }

    /// Returns the size of the host storage in bytes.
    #[inline]
    pub fn len_bytes(&self) -> usize {
        self.host.len()
    }

    /// Allocates host storage for `shape` with the given element type.
    ///
    /// ## Semantics
    /// * First allocation zero-fills host storage and clears both dirty
    ///   flags.
    /// * Re-allocating with the identical shape and element type is an
    ///   idempotent no-op; existing contents and flags are untouched.
    ///
    /// ## Errors
    /// * [`ShapeError`] if the buffer is already allocated with a different
    ///   shape.
    /// * [`ElementMismatchError`](crate::graph::error::ElementMismatchError)
    ///   if the element type differs from the existing allocation.
    pub fn allocate(&mut self, shape: Shape, element: ElementType) -> UnitResult<()> {
        if let Some(existing) = &self.shape {
            if *existing != shape {
                return Err(ShapeError {
                    existing: existing.clone(),
                    requested: shape,
                }
                .into());
            }
            if self.element != element {
                return Err(ElementMismatchError {
                    expected: self.element,
                    actual: element,
                }
                .into());
            }
            return Ok(());
        }

        self.host = vec![0u8; shape.len() * element.size_of()];
        self.shape = Some(shape);
        self.element = element;
        self.host_dirty = false;
        self.device_dirty = false;
        Ok(())
    }

    /// Declares that host code is about to mutate this buffer.
    ///
    /// Host storage becomes the authoritative copy; any device copy is
    /// treated as discarded without a readback.
    pub fn map_invalidate(&mut self) {
        self.device_dirty = false;
        self.host_dirty = true;
    }

    /// Declares that host code wants to read this buffer.
    ///
    /// If the device copy is authoritative, performs the device→host copy
    /// first, blocking until all device work writing the buffer has
    /// completed.
    ///
    /// ## Errors
    /// [`BackendError::Readback`] if the copy fails, or
    /// [`BackendError::NoDeviceBound`] if the device copy was marked
    /// authoritative without a bound device (an internal invariant
    /// violation).
    pub fn map_read(&mut self) -> Result<(), BackendError> {
        if self.device_dirty {
            #[cfg(feature = "gpu")]
            {
                self.download()?;
                self.device_dirty = false;
            }
            #[cfg(not(feature = "gpu"))]
            {
                return Err(BackendError::NoDeviceBound);
            }
        }
        Ok(())
    }

    /// Returns the host storage as raw bytes.
    ///
    /// Debug builds assert that a host-read mark preceded this call while
    /// the device copy was authoritative.
    #[inline]
    pub fn host(&self) -> &[u8] {
        debug_assert!(
            !self.device_dirty,
            "host read without map_read while the device copy is authoritative"
        );
        &self.host
    }

    /// Returns the host storage as mutable raw bytes.
    ///
    /// Debug builds assert that [`MemoryBuffer::map_invalidate`] was called
    /// first, so the staleness of the device copy is recorded before the
    /// mutation happens.
    #[inline]
    pub fn host_mut(&mut self) -> &mut [u8] {
        debug_assert!(
            self.host_dirty,
            "host mutation without a preceding map_invalidate"
        );
        debug_assert!(
            !self.device_dirty,
            "host mutation while the device copy is authoritative"
        );
        &mut self.host
    }

    /// Returns a typed view of the host storage.
    ///
    /// Debug builds assert that `T` matches the buffer's element type and
    /// that the read discipline of [`MemoryBuffer::host`] holds.
    #[inline]
    pub fn host_as<T: Scalar>(&self) -> &[T] {
        debug_assert_eq!(
            Some(T::ELEMENT),
            self.element(),
            "typed view does not match the buffer element type"
        );
        bytemuck::cast_slice(self.host())
    }

    /// Returns a mutable typed view of the host storage.
    ///
    /// Debug builds assert that `T` matches the buffer's element type and
    /// that the write discipline of [`MemoryBuffer::host_mut`] holds.
    #[inline]
    pub fn host_mut_as<T: Scalar>(&mut self) -> &mut [T] {
        debug_assert_eq!(
            Some(T::ELEMENT),
            self.element(),
            "typed view does not match the buffer element type"
        );
        bytemuck::cast_slice_mut(self.host_mut())
    }
}

#[cfg(feature = "gpu")]
impl MemoryBuffer {
    /// Binds the buffer to a device context, creating the device allocation
    /// on first use.
    ///
    /// The allocation is sized to the host storage and is usable as a
    /// storage binding and as a copy source/destination. Binding an already
    /// bound buffer is a no-op.
    ///
    /// ## Errors
    /// [`BackendError::NoDeviceBound`] if the buffer is unallocated or
    /// empty; empty buffers never cross the device boundary.
    pub fn bind_device(&mut self, context: &Rc<GpuContext>) -> Result<(), BackendError> {
        if !self.is_allocated() || self.host.is_empty() {
            return Err(BackendError::NoDeviceBound);
        }
        if self.device.is_some() {
            return Ok(());
        }

        let buffer = context.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("numflow_buffer"),
            size: self.host.len() as u64,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        self.device = Some(DeviceMirror {
            context: Rc::clone(context),
            buffer,
        });
        Ok(())
    }

    /// Returns the device allocation for argument binding.
    pub fn device_buffer(&self) -> Result<&wgpu::Buffer, BackendError> {
        self.device
            .as_ref()
            .map(|mirror| &mirror.buffer)
            .ok_or(BackendError::NoDeviceBound)
    }

    /// Declares that a kernel is about to read this buffer.
    ///
    /// Flushes pending host writes to the device copy.
    pub fn device_map_read(&mut self) -> Result<(), BackendError> {
        debug_assert!(
            !(self.host_dirty && self.device_dirty),
            "both coherence flags set"
        );
        if self.host_dirty {
            self.upload()?;
            self.host_dirty = false;
        }
        Ok(())
    }

    /// Declares that a kernel is about to write this buffer.
    ///
    /// Flushes pending host writes first, then records the device copy as
    /// authoritative so a later host-read mark performs the readback.
    pub fn device_map_write(&mut self) -> Result<(), BackendError> {
        if self.host_dirty {
            self.upload()?;
            self.host_dirty = false;
        }
        self.device_dirty = true;
        Ok(())
    }

    fn upload(&mut self) -> Result<(), BackendError> {
        let mirror = self.device.as_ref().ok_or(BackendError::NoDeviceBound)?;
        mirror
            .context
            .queue
            .write_buffer(&mirror.buffer, 0, &self.host);
        Ok(())
    }

    fn download(&mut self) -> Result<(), BackendError> {
        let mirror = self.device.as_ref().ok_or(BackendError::NoDeviceBound)?;
        let size = self.host.len() as u64;

        let staging = mirror.context.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("numflow_readback"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = mirror
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("numflow_readback_encoder"),
            });
        encoder.copy_buffer_to_buffer(&mirror.buffer, 0, &staging, 0, size);
        mirror.context.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });

        mirror
            .context
            .device
            .poll(wgpu::PollType::Wait)
            .map_err(|e| BackendError::Readback {
                message: format!("wgpu device poll failed: {e:?}"),
            })?;

        match receiver.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(BackendError::Readback {
                    message: e.to_string(),
                })
            }
            Err(_) => {
                return Err(BackendError::Readback {
                    message: "map_async callback dropped".into(),
                })
            }
        }

        self.host.copy_from_slice(&slice.get_mapped_range());
        staging.unmap();
        Ok(())
    }
}

impl Default for MemoryBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared handle to a [`MemoryBuffer`].
///
/// The producing unit holds the handle it allocates through; consuming
/// units hold clones. Exclusive access for mutation is enforced at runtime
/// by the interior `RefCell`, matching the single-threaded cooperative
/// execution model.
#[derive(Clone)]
pub struct BufferRef {
    inner: Rc<RefCell<MemoryBuffer>>,
}

impl BufferRef {
    /// Creates a handle to a fresh, unallocated buffer.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(MemoryBuffer::new())),
        }
    }

    /// Borrows the buffer immutably.
    #[inline]
    pub fn borrow(&self) -> Ref<'_, MemoryBuffer> {
        self.inner.borrow()
    }

    /// Borrows the buffer mutably.
    #[inline]
    pub fn borrow_mut(&self) -> RefMut<'_, MemoryBuffer> {
        self.inner.borrow_mut()
    }

    /// Returns `true` once the underlying buffer has been allocated.
    #[inline]
    pub fn is_allocated(&self) -> bool {
        self.inner.borrow().is_allocated()
    }
}

impl Default for BufferRef {
    fn default() -> Self {
        Self::new()
    }
}
