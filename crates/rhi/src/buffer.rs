//! Buffers backed by gpu-allocator.
//!
//! Mesh data ([`BufferUsage::Vertex`], [`BufferUsage::Index`]) lives in
//! device-local memory and is filled through [`crate::upload::Uploader`].
//! Everything else is host-visible and stays mapped for its whole life, so
//! [`Buffer::write_data`] and [`Buffer::read_data`] are plain memory copies.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    Vertex,
    Index,
    /// Per-frame uniform block, rewritten by the CPU each frame.
    Uniform,
    /// Upload source.
    Staging,
    /// Copy destination the CPU reads back.
    Readback,
}

impl BufferUsage {
    pub fn to_vk_usage(self) -> vk::BufferUsageFlags {
        use vk::BufferUsageFlags as F;
        // Mesh buffers can also be copied out for read-back checks.
        let mesh_copy = F::TRANSFER_DST | F::TRANSFER_SRC;
        match self {
            BufferUsage::Vertex => F::VERTEX_BUFFER | mesh_copy,
            BufferUsage::Index => F::INDEX_BUFFER | mesh_copy,
            BufferUsage::Uniform => F::UNIFORM_BUFFER,
            BufferUsage::Staging => F::TRANSFER_SRC,
            BufferUsage::Readback => F::TRANSFER_DST,
        }
    }

    pub fn memory_location(self) -> MemoryLocation {
        match self {
            BufferUsage::Vertex | BufferUsage::Index => MemoryLocation::GpuOnly,
            BufferUsage::Uniform | BufferUsage::Staging => MemoryLocation::CpuToGpu,
            BufferUsage::Readback => MemoryLocation::GpuToCpu,
        }
    }

    #[inline]
    pub fn is_host_visible(self) -> bool {
        self.memory_location() != MemoryLocation::GpuOnly
    }

    /// Allocation label, also used in log lines.
    pub fn label(self) -> &'static str {
        match self {
            BufferUsage::Vertex => "vertex",
            BufferUsage::Index => "index",
            BufferUsage::Uniform => "uniform",
            BufferUsage::Staging => "staging",
            BufferUsage::Readback => "readback",
        }
    }
}

/// A VkBuffer and the allocation bound to it.
pub struct Buffer {
    device: Arc<Device>,
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    size: vk::DeviceSize,
    usage: BufferUsage,
}

impl Buffer {
    /// Creates an uninitialised buffer of `size` bytes.
    ///
    /// # Errors
    ///
    /// Zero-sized buffers are rejected; allocation or binding failures are
    /// returned after releasing whatever was already created.
    pub fn new(device: Arc<Device>, usage: BufferUsage, size: vk::DeviceSize) -> RhiResult<Self> {
        if size == 0 {
            return Err(RhiError::InvalidHandle(format!(
                "{} buffer of zero bytes",
                usage.label()
            )));
        }

        let info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage.to_vk_usage())
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe { device.handle().create_buffer(&info, None)? };

        let allocation = match allocate_and_bind(&device, buffer, usage) {
            Ok(allocation) => allocation,
            Err(err) => {
                unsafe { device.handle().destroy_buffer(buffer, None) };
                return Err(err);
            }
        };

        debug!("{} buffer, {} bytes", usage.label(), size);
        Ok(Self {
            device,
            buffer,
            allocation: Some(allocation),
            size,
            usage,
        })
    }

    /// Host-visible buffer initialised with `data`.
    pub fn new_with_data(device: Arc<Device>, usage: BufferUsage, data: &[u8]) -> RhiResult<Self> {
        let buffer = Self::new(device, usage, data.len() as vk::DeviceSize)?;
        buffer.write_data(0, data)?;
        Ok(buffer)
    }

    /// Copies `data` into the mapping at `offset`.
    pub fn write_data(&self, offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        let dst = self.mapped_range(offset, data.len())?;
        // SAFETY: the range was bounds-checked against the live mapping.
        unsafe { std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len()) };
        Ok(())
    }

    /// Copies `len` bytes at `offset` out of the mapping.
    pub fn read_data(&self, offset: vk::DeviceSize, len: usize) -> RhiResult<Vec<u8>> {
        if len == 0 {
            return Ok(Vec::new());
        }
        let src = self.mapped_range(offset, len)?;
        // SAFETY: as in `write_data`.
        Ok(unsafe { std::slice::from_raw_parts(src.cast_const(), len) }.to_vec())
    }

    /// Start of `offset..offset + len` inside the persistent mapping.
    fn mapped_range(&self, offset: vk::DeviceSize, len: usize) -> RhiResult<*mut u8> {
        let in_bounds = offset
            .checked_add(len as vk::DeviceSize)
            .is_some_and(|end| end <= self.size);
        if !in_bounds {
            return Err(RhiError::InvalidHandle(format!(
                "{}..+{} outside {}-byte {} buffer",
                offset,
                len,
                self.size,
                self.usage.label()
            )));
        }

        let base = self
            .allocation
            .as_ref()
            .and_then(Allocation::mapped_ptr)
            .ok_or_else(|| {
                RhiError::InvalidHandle(format!("{} buffer is not mapped", self.usage.label()))
            })?;
        Ok(unsafe { base.as_ptr().cast::<u8>().add(offset as usize) })
    }

    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take()
            && let Err(err) = self.device.allocator().free(allocation)
        {
            error!("Leaking {} buffer memory: {}", self.usage.label(), err);
        }
        unsafe { self.device.handle().destroy_buffer(self.buffer, None) };
    }
}

fn allocate_and_bind(
    device: &Device,
    buffer: vk::Buffer,
    usage: BufferUsage,
) -> RhiResult<Allocation> {
    let requirements = unsafe { device.handle().get_buffer_memory_requirements(buffer) };
    let allocation = device.allocator().allocate(&AllocationCreateDesc {
        name: usage.label(),
        requirements,
        location: usage.memory_location(),
        linear: true,
        allocation_scheme: AllocationScheme::GpuAllocatorManaged,
    })?;

    let bound = unsafe {
        device
            .handle()
            .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
    };
    if let Err(err) = bound {
        let _ = device.allocator().free(allocation);
        return Err(err.into());
    }
    Ok(allocation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mesh_buffers_are_device_local_copy_targets() {
        for usage in [BufferUsage::Vertex, BufferUsage::Index] {
            assert_eq!(usage.memory_location(), MemoryLocation::GpuOnly);
            assert!(!usage.is_host_visible());
            assert!(usage.to_vk_usage().contains(vk::BufferUsageFlags::TRANSFER_DST));
        }
        assert!(
            BufferUsage::Vertex
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::VERTEX_BUFFER)
        );
        assert!(
            BufferUsage::Index
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::INDEX_BUFFER)
        );
    }

    #[test]
    fn test_host_buffers_are_mapped() {
        assert_eq!(BufferUsage::Uniform.memory_location(), MemoryLocation::CpuToGpu);
        assert_eq!(BufferUsage::Staging.memory_location(), MemoryLocation::CpuToGpu);
        assert_eq!(BufferUsage::Readback.memory_location(), MemoryLocation::GpuToCpu);
        assert!(BufferUsage::Uniform.is_host_visible());
        assert!(BufferUsage::Readback.is_host_visible());
    }

    #[test]
    fn test_transfer_roles() {
        assert_eq!(
            BufferUsage::Staging.to_vk_usage(),
            vk::BufferUsageFlags::TRANSFER_SRC
        );
        assert_eq!(
            BufferUsage::Readback.to_vk_usage(),
            vk::BufferUsageFlags::TRANSFER_DST
        );
        assert_eq!(
            BufferUsage::Uniform.to_vk_usage(),
            vk::BufferUsageFlags::UNIFORM_BUFFER
        );
    }
}
