//! Pipeline layouts and graphics pipelines.
//!
//! A [`GraphicsPipelineBuilder`] gathers shaders, vertex input, a
//! [`RasterState`] and a [`DepthState`], and bakes them against one subpass
//! of a [`RenderPass`]. Viewport and scissor are always dynamic; a resize that
//! keeps the swapchain format reuses the pipeline as is.
//!
//! ```no_run
//! use std::sync::Arc;
//! use toybox_rhi::device::Device;
//! use toybox_rhi::pipeline::{DepthState, GraphicsPipelineBuilder, PipelineLayout, RasterState};
//! use toybox_rhi::render_pass::RenderPass;
//! use toybox_rhi::shader::Shader;
//! use toybox_rhi::vertex::Vertex;
//!
//! # fn example(
//! #     device: Arc<Device>,
//! #     vs: &Shader,
//! #     fs: &Shader,
//! #     render_pass: &RenderPass,
//! #     layout: &PipelineLayout,
//! # ) -> Result<(), toybox_rhi::RhiError> {
//! let pipeline = GraphicsPipelineBuilder::new(render_pass)
//!     .stages(vs, fs)
//!     .vertex_input(Vertex::binding_description(), &Vertex::attribute_descriptions())
//!     .raster(RasterState::SOLID)
//!     .depth(DepthState::OPAQUE)
//!     .build(device, layout)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::render_pass::RenderPass;
use crate::shader::Shader;

/// Set layouts plus push constant ranges, shared by every pipeline that
/// binds the same resources.
pub struct PipelineLayout {
    device: Arc<Device>,
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    /// `set_layouts` are given in set-number order.
    pub fn new(
        device: Arc<Device>,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constants: &[vk::PushConstantRange],
    ) -> RhiResult<Self> {
        let info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(set_layouts)
            .push_constant_ranges(push_constants);
        let layout = unsafe { device.handle().create_pipeline_layout(&info, None)? };

        debug!(
            "Pipeline layout: {} set(s), {} push constant range(s)",
            set_layouts.len(),
            push_constants.len()
        );
        Ok(Self { device, layout })
    }

    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe { self.device.handle().destroy_pipeline_layout(self.layout, None) };
    }
}

pub struct Pipeline {
    device: Arc<Device>,
    pipeline: vk::Pipeline,
}

impl Pipeline {
    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe { self.device.handle().destroy_pipeline(self.pipeline, None) };
        debug!("Graphics pipeline released");
    }
}

/// Culling and winding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RasterState {
    pub cull: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
}

impl RasterState {
    /// Closed meshes with counter-clockwise front faces.
    pub const SOLID: Self = Self {
        cull: vk::CullModeFlags::BACK,
        front_face: vk::FrontFace::COUNTER_CLOCKWISE,
    };

    /// Both sides visible.
    pub const TWO_SIDED: Self = Self {
        cull: vk::CullModeFlags::NONE,
        front_face: vk::FrontFace::COUNTER_CLOCKWISE,
    };
}

impl Default for RasterState {
    fn default() -> Self {
        Self::SOLID
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DepthState {
    pub test: bool,
    pub write: bool,
    pub compare: vk::CompareOp,
}

impl DepthState {
    /// Nearest surface wins and is recorded.
    pub const OPAQUE: Self = Self {
        test: true,
        write: true,
        compare: vk::CompareOp::LESS,
    };

    /// Depth buffer ignored entirely.
    pub const DISABLED: Self = Self {
        test: false,
        write: false,
        compare: vk::CompareOp::ALWAYS,
    };

    fn create_info(&self) -> vk::PipelineDepthStencilStateCreateInfo<'static> {
        vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(self.test)
            .depth_write_enable(self.write)
            .depth_compare_op(self.compare)
    }
}

impl Default for DepthState {
    fn default() -> Self {
        Self::OPAQUE
    }
}

/// Collects state for a single-subpass triangle-list pipeline with one
/// opaque colour attachment.
pub struct GraphicsPipelineBuilder<'a> {
    render_pass: vk::RenderPass,
    stages: Option<(&'a Shader, &'a Shader)>,
    bindings: Vec<vk::VertexInputBindingDescription>,
    attributes: Vec<vk::VertexInputAttributeDescription>,
    raster: RasterState,
    depth: DepthState,
}

impl<'a> GraphicsPipelineBuilder<'a> {
    /// Targets the single subpass of `render_pass` with [`RasterState::SOLID`] and
    /// [`DepthState::OPAQUE`].
    pub fn new(render_pass: &RenderPass) -> Self {
        Self {
            render_pass: render_pass.handle(),
            stages: None,
            bindings: Vec::new(),
            attributes: Vec::new(),
            raster: RasterState::SOLID,
            depth: DepthState::OPAQUE,
        }
    }

    pub fn stages(mut self, vertex: &'a Shader, fragment: &'a Shader) -> Self {
        self.stages = Some((vertex, fragment));
        self
    }

    /// Adds one vertex buffer binding and the attributes it feeds.
    pub fn vertex_input(
        mut self,
        binding: vk::VertexInputBindingDescription,
        attributes: &[vk::VertexInputAttributeDescription],
    ) -> Self {
        self.bindings.push(binding);
        self.attributes.extend_from_slice(attributes);
        self
    }

    pub fn raster(mut self, raster: RasterState) -> Self {
        self.raster = raster;
        self
    }

    pub fn depth(mut self, depth: DepthState) -> Self {
        self.depth = depth;
        self
    }

    /// # Errors
    ///
    /// Fails without shader stages, or when the driver rejects the state.
    pub fn build(self, device: Arc<Device>, layout: &PipelineLayout) -> RhiResult<Pipeline> {
        let (vertex, fragment) = self.stages.ok_or_else(|| {
            RhiError::PipelineError("vertex and fragment stages must be set".to_string())
        })?;
        let stages = [vertex.stage_create_info(), fragment.stage_create_info()];

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&self.bindings)
            .vertex_attribute_descriptions(&self.attributes);
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST);
        let viewport = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);
        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(self.raster.cull)
            .front_face(self.raster.front_face)
            .line_width(1.0);
        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);
        let depth_stencil = self.depth.create_info();

        let blend = [vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA)];
        let color_blend = vk::PipelineColorBlendStateCreateInfo::default().attachments(&blend);

        let dynamic = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic);

        let info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic_state)
            .layout(layout.handle())
            .render_pass(self.render_pass)
            .subpass(0);

        let pipeline = unsafe {
            device
                .handle()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[info], None)
                .map_err(|(_, err)| err)?
        }
        .pop()
        .ok_or_else(|| RhiError::PipelineError("driver returned no pipeline".to_string()))?;

        info!(
            "Graphics pipeline built (cull {:?}, depth test {})",
            self.raster.cull, self.depth.test
        );
        Ok(Pipeline { device, pipeline })
    }
}
