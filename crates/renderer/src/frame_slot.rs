//! Per-slot GPU resources.
//!
//! Each frame in flight owns everything the CPU writes while recording:
//!
//! ```text
//! 1. Wait on in_flight (previous use of this slot retired)
//! 2. Acquire image (signals image_available)
//! 3. Write uniforms, record command_buffer
//! 4. Reset in_flight, then submit: wait image_available, signal
//!    render_finished + in_flight
//! 5. Present: wait render_finished
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use toybox_resources::FrameUniforms;
use toybox_rhi::RhiResult;
use toybox_rhi::buffer::{Buffer, BufferUsage};
use toybox_rhi::command::CommandBuffer;
use toybox_rhi::descriptor::write_uniform_buffer;
use toybox_rhi::device::Device;
use toybox_rhi::sync::FrameSync;

/// Resources of one frame slot.
pub struct FrameSlot {
    command_buffer: CommandBuffer,
    sync: FrameSync,
    uniforms: Buffer,
    frame_set: vk::DescriptorSet,
}

impl FrameSlot {
    /// Wraps `command_buffer`, creates the sync objects and a uniform buffer,
    /// and points `frame_set` at that buffer.
    ///
    /// The command buffer and descriptor set stay owned by their pools.
    pub fn new(
        device: Arc<Device>,
        command_buffer: vk::CommandBuffer,
        frame_set: vk::DescriptorSet,
    ) -> RhiResult<Self> {
        let sync = FrameSync::new(device.clone())?;
        let uniforms = Buffer::new(
            device.clone(),
            BufferUsage::Uniform,
            FrameUniforms::SIZE as vk::DeviceSize,
        )?;
        write_uniform_buffer(&device, frame_set, uniforms.handle());

        Ok(Self {
            command_buffer: CommandBuffer::from_handle(device, command_buffer),
            sync,
            uniforms,
            frame_set,
        })
    }

    /// Blocks until this slot's last submission has retired.
    pub fn wait(&self) -> RhiResult<()> {
        self.sync.in_flight().wait(u64::MAX)
    }

    /// Copies `uniforms` into this slot's buffer.
    ///
    /// Only valid once [`FrameSlot::wait`] has returned for the current use.
    pub fn write_uniforms(&self, uniforms: &FrameUniforms) -> RhiResult<()> {
        self.uniforms.write_data(0, bytemuck::bytes_of(uniforms))
    }

    /// Unsignals the fence and submits the recorded command buffer on the
    /// graphics queue.
    ///
    /// Waits on `image_available` at colour output and signals
    /// `render_finished` and the fence. A failed recording never reaches
    /// here, so the fence stays signalled for the next wait.
    pub fn submit(&self, device: &Device) -> RhiResult<()> {
        let wait_semaphores = [self.sync.image_available().handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [self.command_buffer.handle()];
        let signal_semaphores = [self.sync.render_finished().handle()];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        let fence = self.sync.in_flight();
        fence.reset()?;
        unsafe { device.submit_graphics(&[submit_info], fence.handle()) }
    }

    #[inline]
    pub fn command_buffer(&self) -> &CommandBuffer {
        &self.command_buffer
    }

    #[inline]
    pub fn image_available(&self) -> vk::Semaphore {
        self.sync.image_available().handle()
    }

    #[inline]
    pub fn render_finished(&self) -> vk::Semaphore {
        self.sync.render_finished().handle()
    }

    #[inline]
    pub fn frame_set(&self) -> vk::DescriptorSet {
        self.frame_set
    }
}

/// Builds `count` slots from pre-allocated command buffers and sets.
pub fn create_slots(
    device: &Arc<Device>,
    command_buffers: &[vk::CommandBuffer],
    frame_sets: &[vk::DescriptorSet],
) -> RhiResult<Vec<FrameSlot>> {
    let slots = command_buffers
        .iter()
        .zip(frame_sets)
        .map(|(&command_buffer, &set)| FrameSlot::new(device.clone(), command_buffer, set))
        .collect::<RhiResult<Vec<_>>>()?;

    debug!("Created {} frame slot(s)", slots.len());
    Ok(slots)
}
