//! Renderer lifecycle: startup, per-tick update/render/present, shutdown.
//!
//! [`Renderer`] pairs the [`FrameScheduler`] state machine with the Vulkan
//! backend that implements [`FrameBackend`]. Startup builds, in order, the
//! device context, the swapchain manager, the scene pipeline, and the
//! uploaded scene; everything is released in the reverse order.

use std::sync::Arc;

use ash::vk;
use glam::Quat;
use tracing::{debug, error, info};

use toybox_core::RendererConfig;
use toybox_platform::Window;
use toybox_resources::{FrameUniforms, MaterialData, ModelPushConstants};
use toybox_rhi::command::{CommandPool, PoolUsage};
use toybox_rhi::descriptor::{DescriptorPool, DescriptorPoolSizes};
use toybox_rhi::device::Device;
use toybox_rhi::swapchain::{AcquireOutcome, PresentOutcome};
use toybox_rhi::upload::Uploader;
use toybox_rhi::{RhiError, RhiResult};
use toybox_scene::{NodeKind, Scene};

use crate::context::DeviceContext;
use crate::frame_scheduler::{FrameBackend, FrameScheduler, FrameStatus};
use crate::frame_slot::{FrameSlot, create_slots};
use crate::gpu_scene::GpuScene;
use crate::scene_pipeline::ScenePipeline;
use crate::swapchain_manager::{RecreateOutcome, SwapchainManager};

/// Application name reported to the Vulkan driver.
pub const APPLICATION_NAME: &str = "ToyBox";

/// Real-time scene renderer.
///
/// Owns the scene once started. Every method runs on the thread that owns
/// the window.
pub struct Renderer {
    scheduler: FrameScheduler,
    backend: VulkanBackend,
}

impl Renderer {
    /// Builds every GPU object for `window` and uploads `scene`.
    ///
    /// # Errors
    ///
    /// Scene contract violations, no suitable GPU, no depth format, missing
    /// shaders and a required-but-absent validation layer are fatal.
    pub fn startup(window: &Window, scene: Scene, config: &RendererConfig) -> RhiResult<Self> {
        scene.validate()?;

        let (width, height) = window.framebuffer_size();
        info!("Starting renderer ({}x{})", width, height);

        let context = DeviceContext::new(window, config, APPLICATION_NAME)?;
        let device = context.device().clone();
        let desired_extent = vk::Extent2D { width, height };

        let mut swapchain = SwapchainManager::new(&context, desired_extent, config.present_mode)?;
        let pipeline = ScenePipeline::new(
            device.clone(),
            &config.shader_dir,
            swapchain.format(),
            swapchain.depth_format(),
        )?;
        swapchain.rebuild_framebuffers(pipeline.render_pass())?;

        let frames = config.frames_in_flight.max(1) as u32;
        let uploader = Uploader::new(device.clone())?;
        let descriptor_pool = DescriptorPool::new(
            device.clone(),
            &DescriptorPoolSizes::new(frames, scene.materials.len() as u32),
        )?;
        let gpu_scene = GpuScene::upload(
            &device,
            &uploader,
            &scene,
            &descriptor_pool,
            pipeline.material_layout().handle(),
        )?;

        let command_pool = CommandPool::new(device.clone(), device.graphics_family(), PoolUsage::Frames)?;
        let command_buffers = command_pool.allocate(frames)?;
        let frame_sets =
            descriptor_pool.allocate(&vec![pipeline.frame_layout().handle(); frames as usize])?;
        let slots = create_slots(&device, &command_buffers, &frame_sets)?;

        info!(
            "Renderer ready: {} swapchain images, {} frames in flight, {} model node(s)",
            swapchain.image_count(),
            slots.len(),
            scene.model_nodes().count()
        );

        let backend = VulkanBackend {
            slots,
            command_pool,
            gpu_scene,
            descriptor_pool,
            swapchain,
            pipeline,
            uploader,
            context,
            scene,
            uniforms: FrameUniforms::default(),
            clear_color: config.clear_color,
            desired_extent,
            spin_speed: config.spin_speed,
        };

        Ok(Self {
            scheduler: FrameScheduler::new(backend.slot_count()),
            backend,
        })
    }

    /// Advances the scene by `delta_time` seconds and refreshes the CPU copy
    /// of the frame uniforms.
    pub fn frame_update(&mut self, delta_time: f32) {
        let backend = &mut self.backend;

        if backend.spin_speed != 0.0 {
            let spin = Quat::from_rotation_y(backend.spin_speed * delta_time);
            for node in &mut backend.scene.nodes {
                if matches!(node.kind, NodeKind::Model { .. }) {
                    node.transform.rotation = (spin * node.transform.rotation).normalize();
                }
            }
        }

        let extent = backend.swapchain.extent();
        backend.uniforms = frame_uniforms(&backend.scene, aspect_ratio(extent));
    }

    /// Records and submits the current frame, or rebuilds the swapchain and
    /// skips drawing when it is stale.
    ///
    /// # Errors
    ///
    /// Any error is fatal; a failed swapchain recreation arrives as
    /// [`RhiError::Fatal`].
    pub fn frame_render(&mut self) -> RhiResult<FrameStatus> {
        self.scheduler.frame_render(&mut self.backend)
    }

    /// Presents the frame submitted by the last `frame_render`.
    pub fn frame_present(&mut self) -> RhiResult<()> {
        self.scheduler.frame_present(&mut self.backend)
    }

    /// Window resize notification. Recreation happens on a later tick.
    pub fn notify_resize(&mut self, width: u32, height: u32) {
        self.backend.desired_extent = vk::Extent2D { width, height };
        self.scheduler.notify_resize(width, height);
    }

    /// Waits for the GPU and releases everything in reverse creation order.
    pub fn shutdown(self) -> RhiResult<()> {
        info!("Shutting down renderer");
        self.backend.device().wait_idle()?;
        drop(self);
        Ok(())
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.backend.swapchain.extent()
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        self.backend.device()
    }
}

/// The Vulkan side of a frame tick.
///
/// Field order is drop order. Slots and the pools they draw from go first;
/// the scene's buffers and images next; framebuffers before the render pass
/// they were built for; the device context last.
struct VulkanBackend {
    slots: Vec<FrameSlot>,
    command_pool: CommandPool,
    gpu_scene: GpuScene,
    descriptor_pool: DescriptorPool,
    swapchain: SwapchainManager,
    pipeline: ScenePipeline,
    uploader: Uploader,
    context: DeviceContext,

    scene: Scene,
    uniforms: FrameUniforms,
    clear_color: [f32; 4],
    desired_extent: vk::Extent2D,
    spin_speed: f32,
}

impl VulkanBackend {
    fn device(&self) -> &Arc<Device> {
        self.context.device()
    }

    fn slot(&self, slot: usize) -> RhiResult<&FrameSlot> {
        self.slots
            .get(slot)
            .ok_or_else(|| RhiError::InvalidHandle(format!("no frame slot {}", slot)))
    }
}

impl FrameBackend for VulkanBackend {
    fn slot_count(&self) -> usize {
        self.slots.len()
    }

    fn wait_for_slot(&mut self, slot: usize) -> RhiResult<()> {
        self.slot(slot)?.wait()
    }

    fn acquire_image(&mut self, slot: usize) -> RhiResult<AcquireOutcome> {
        let semaphore = self.slot(slot)?.image_available();
        self.swapchain.acquire_next_image(semaphore)
    }

    fn record_commands(&mut self, slot: usize, image_index: u32) -> RhiResult<()> {
        let frame = self.slot(slot)?;
        let framebuffer = self.swapchain.framebuffer(image_index).ok_or_else(|| {
            RhiError::InvalidHandle(format!("no framebuffer for swapchain image {}", image_index))
        })?;

        frame.write_uniforms(&self.uniforms)?;

        let cmd = frame.command_buffer();
        cmd.reset()?;
        cmd.begin()?;

        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.clear_color,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        ];
        let extent = framebuffer.extent();
        cmd.begin_render_pass(
            self.pipeline.render_pass().handle(),
            framebuffer.handle(),
            extent,
            &clear_values,
        );
        cmd.set_full_viewport(extent);
        cmd.bind_graphics_pipeline(self.pipeline.pipeline().handle());

        let layout = self.pipeline.layout().handle();
        cmd.bind_sets(layout, 0, &[frame.frame_set()]);

        let mut draws = 0u32;
        for (transform, model_index) in self.scene.model_nodes() {
            let Some(model) = self.gpu_scene.model(model_index) else {
                continue;
            };

            cmd.bind_mesh(model.vertex_buffer.handle(), model.index_buffer.handle());
            cmd.push_constants(
                layout,
                vk::ShaderStageFlags::VERTEX,
                &ModelPushConstants::new(transform.matrix()),
            );

            for mesh in &model.meshes {
                if let Some(set) = self.gpu_scene.material_set(mesh.material_index) {
                    cmd.bind_sets(layout, 1, &[set]);
                }
                cmd.draw_indexed(mesh.index_count, mesh.index_offset);
                draws += 1;
            }
        }

        cmd.end_render_pass();
        cmd.end()?;

        debug!(
            "Recorded slot {} for image {} ({} draw call(s))",
            slot, image_index, draws
        );
        Ok(())
    }

    fn submit(&mut self, slot: usize) -> RhiResult<()> {
        self.slot(slot)?.submit(self.context.device())
    }

    fn present(&mut self, slot: usize, image_index: u32) -> RhiResult<PresentOutcome> {
        let semaphore = self.slot(slot)?.render_finished();
        self.swapchain.present(image_index, semaphore)
    }

    fn recreate_swapchain(&mut self) -> RhiResult<bool> {
        let outcome = self
            .swapchain
            .recreate(
                self.context.surface_support(),
                self.desired_extent,
                &mut self.pipeline,
            )
            .map_err(|e| RhiError::Fatal(e.into_fatal("swapchain recreated")))?;

        match outcome {
            RecreateOutcome::Deferred => Ok(false),
            RecreateOutcome::Recreated { format_changed } => {
                let extent = self.swapchain.extent();
                info!(
                    "Swapchain rebuilt at {}x{}{}",
                    extent.width,
                    extent.height,
                    if format_changed { " with a new render pass" } else { "" }
                );
                Ok(true)
            }
        }
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        if let Err(e) = self.device().wait_idle() {
            error!("Failed to wait for device idle during renderer drop: {:?}", e);
        }
        debug!(
            "Releasing {} frame slot(s), {} texture(s)",
            self.slots.len(),
            self.gpu_scene.texture_count()
        );
    }
}

/// Width over height, or 1.0 for a degenerate extent.
pub fn aspect_ratio(extent: vk::Extent2D) -> f32 {
    if extent.width == 0 || extent.height == 0 {
        1.0
    } else {
        extent.width as f32 / extent.height as f32
    }
}

/// CPU-side uniforms for the current state of `scene`.
///
/// Without a camera node the view stays at identity. The material block
/// comes from the scene's first material.
pub fn frame_uniforms(scene: &Scene, aspect: f32) -> FrameUniforms {
    let mut uniforms = FrameUniforms::default();

    if let Some((transform, camera)) = scene.active_camera() {
        uniforms.set_camera(
            transform.view_matrix(),
            camera.projection_matrix(aspect),
            transform.position,
        );
    }

    uniforms.ambient_color = scene.ambient_color;
    uniforms.ambient_intensity = scene.ambient_intensity;
    uniforms.set_directional(scene.sun.direction, scene.sun.color, scene.sun.intensity);

    let material = scene.materials.first().cloned().unwrap_or_default();
    let MaterialData {
        color,
        specular,
        roughness,
        ..
    } = material;
    uniforms.set_material(color, specular, roughness);
    uniforms.set_lights(&scene.light_uniforms());

    uniforms
}
