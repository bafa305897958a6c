//! Command pools and the recording surface used by frames and uploads.
//!
//! Frame slots record from a [`PoolUsage::Frames`] pool, re-recording the same
//! buffer every time the slot comes round. The uploader allocates throwaway
//! buffers from a [`PoolUsage::Transient`] pool and frees them after the wait.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoolUsage {
    /// Long-lived buffers reset individually before each recording.
    Frames,
    /// Short-lived buffers recorded once.
    Transient,
}

impl PoolUsage {
    fn flags(self) -> vk::CommandPoolCreateFlags {
        match self {
            PoolUsage::Frames => vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            PoolUsage::Transient => vk::CommandPoolCreateFlags::TRANSIENT,
        }
    }
}

/// Owns a VkCommandPool; every buffer allocated from it dies with it.
///
/// Pools are externally synchronised, so one thread records per pool.
pub struct CommandPool {
    device: Arc<Device>,
    pool: vk::CommandPool,
    usage: PoolUsage,
}

impl CommandPool {
    pub fn new(device: Arc<Device>, queue_family: u32, usage: PoolUsage) -> RhiResult<Self> {
        let info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(usage.flags());
        let pool = unsafe { device.handle().create_command_pool(&info, None)? };

        debug!("{:?} command pool on family {}", usage, queue_family);
        Ok(Self {
            device,
            pool,
            usage,
        })
    }

    /// Allocates `count` primary buffers.
    pub fn allocate(&self, count: u32) -> RhiResult<Vec<vk::CommandBuffer>> {
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);
        Ok(unsafe { self.device.handle().allocate_command_buffers(&info)? })
    }

    /// Returns buffers that are no longer pending on the GPU.
    pub fn free(&self, buffers: &[vk::CommandBuffer]) {
        if !buffers.is_empty() {
            unsafe { self.device.handle().free_command_buffers(self.pool, buffers) };
        }
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe { self.device.handle().destroy_command_pool(self.pool, None) };
        debug!("{:?} command pool released", self.usage);
    }
}

/// Recording calls on a pool-owned command buffer.
pub struct CommandBuffer {
    device: Arc<Device>,
    buffer: vk::CommandBuffer,
}

impl CommandBuffer {
    #[inline]
    pub fn from_handle(device: Arc<Device>, buffer: vk::CommandBuffer) -> Self {
        Self { device, buffer }
    }

    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.buffer
    }

    #[inline]
    fn raw(&self) -> &ash::Device {
        self.device.handle()
    }

    /// Starts a recording that will be submitted exactly once.
    pub fn begin(&self) -> RhiResult<()> {
        let info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { self.raw().begin_command_buffer(self.buffer, &info)? };
        Ok(())
    }

    pub fn end(&self) -> RhiResult<()> {
        unsafe { self.raw().end_command_buffer(self.buffer)? };
        Ok(())
    }

    /// Only valid for buffers from a [`PoolUsage::Frames`] pool.
    pub fn reset(&self) -> RhiResult<()> {
        unsafe {
            self.raw()
                .reset_command_buffer(self.buffer, vk::CommandBufferResetFlags::empty())?
        };
        Ok(())
    }

    /// Begins `render_pass` over the whole of `framebuffer`.
    pub fn begin_render_pass(
        &self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear_values: &[vk::ClearValue],
    ) {
        let info = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(full_rect(extent))
            .clear_values(clear_values);
        unsafe {
            self.raw()
                .cmd_begin_render_pass(self.buffer, &info, vk::SubpassContents::INLINE)
        };
    }

    pub fn end_render_pass(&self) {
        unsafe { self.raw().cmd_end_render_pass(self.buffer) };
    }

    /// Viewport and scissor covering `extent`. Y is not flipped here; the
    /// projection matrix handles that.
    pub fn set_full_viewport(&self, extent: vk::Extent2D) {
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        unsafe {
            self.raw().cmd_set_viewport(self.buffer, 0, &[viewport]);
            self.raw().cmd_set_scissor(self.buffer, 0, &[full_rect(extent)]);
        }
    }

    pub fn bind_graphics_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe {
            self.raw()
                .cmd_bind_pipeline(self.buffer, vk::PipelineBindPoint::GRAPHICS, pipeline)
        };
    }

    /// Binds `sets` to consecutive set numbers from `first_set`.
    pub fn bind_sets(&self, layout: vk::PipelineLayout, first_set: u32, sets: &[vk::DescriptorSet]) {
        unsafe {
            self.raw().cmd_bind_descriptor_sets(
                self.buffer,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                first_set,
                sets,
                &[],
            )
        };
    }

    /// Vertex buffer on binding 0 and a 32-bit index buffer, both from offset 0.
    pub fn bind_mesh(&self, vertices: vk::Buffer, indices: vk::Buffer) {
        unsafe {
            self.raw()
                .cmd_bind_vertex_buffers(self.buffer, 0, &[vertices], &[0]);
            self.raw()
                .cmd_bind_index_buffer(self.buffer, indices, 0, vk::IndexType::UINT32);
        }
    }

    pub fn push_constants<T: bytemuck::Pod>(
        &self,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        value: &T,
    ) {
        unsafe {
            self.raw()
                .cmd_push_constants(self.buffer, layout, stages, 0, bytemuck::bytes_of(value))
        };
    }

    /// One instance of `index_count` indices starting at `first_index`.
    pub fn draw_indexed(&self, index_count: u32, first_index: u32) {
        unsafe {
            self.raw()
                .cmd_draw_indexed(self.buffer, index_count, 1, first_index, 0, 0)
        };
    }

    pub fn pipeline_barrier(
        &self,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        buffer_barriers: &[vk::BufferMemoryBarrier],
        image_barriers: &[vk::ImageMemoryBarrier],
    ) {
        unsafe {
            self.raw().cmd_pipeline_barrier(
                self.buffer,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                buffer_barriers,
                image_barriers,
            )
        };
    }

    pub fn copy_buffer(&self, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]) {
        unsafe { self.raw().cmd_copy_buffer(self.buffer, src, dst, regions) };
    }

    /// `dst` must be in TRANSFER_DST_OPTIMAL.
    pub fn copy_buffer_to_image(&self, src: vk::Buffer, dst: vk::Image, regions: &[vk::BufferImageCopy]) {
        unsafe {
            self.raw().cmd_copy_buffer_to_image(
                self.buffer,
                src,
                dst,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                regions,
            )
        };
    }

    /// Linear blit within one image, from a TRANSFER_SRC level to a
    /// TRANSFER_DST level.
    pub fn blit_within(&self, image: vk::Image, region: vk::ImageBlit) {
        unsafe {
            self.raw().cmd_blit_image(
                self.buffer,
                image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
                vk::Filter::LINEAR,
            )
        };
    }
}

fn full_rect(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D::default(),
        extent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_pools_allow_buffer_reset() {
        assert!(
            PoolUsage::Frames
                .flags()
                .contains(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
        );
        assert_eq!(PoolUsage::Transient.flags(), vk::CommandPoolCreateFlags::TRANSIENT);
    }

    #[test]
    fn test_full_rect_starts_at_origin() {
        let rect = full_rect(vk::Extent2D {
            width: 640,
            height: 480,
        });
        assert_eq!(rect.offset, vk::Offset2D { x: 0, y: 0 });
        assert_eq!(rect.extent.width, 640);
    }
}
