//! The fixed render pass, descriptor layouts and graphics pipeline used to
//! draw scene meshes.
//!
//! Set 0 holds the per-frame uniform block, set 1 the material texture, and
//! the model matrix travels as a push constant. Viewport and scissor are
//! dynamic, so only a change of surface or depth format forces a rebuild.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ash::vk;
use tracing::info;

use toybox_resources::ubo::ModelPushConstants;
use toybox_rhi::RhiResult;
use toybox_rhi::descriptor::{DescriptorSetLayout, bindings};
use toybox_rhi::device::Device;
use toybox_rhi::pipeline::{
    DepthState, GraphicsPipelineBuilder, Pipeline, PipelineLayout, RasterState,
};
use toybox_rhi::render_pass::RenderPass;
use toybox_rhi::shader::{Shader, ShaderStage};
use toybox_rhi::vertex::Vertex;

pub const VERTEX_SHADER_FILE: &str = "mesh.vert.spv";
pub const FRAGMENT_SHADER_FILE: &str = "mesh.frag.spv";

/// Set 0: the frame uniform block, read by both stages.
pub fn frame_set_bindings() -> [vk::DescriptorSetLayoutBinding<'static>; 1] {
    [bindings::uniform_buffer(
        0,
        vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
    )]
}

/// Set 1: the material's diffuse texture.
pub fn material_set_bindings() -> [vk::DescriptorSetLayoutBinding<'static>; 1] {
    [bindings::combined_image_sampler(
        0,
        vk::ShaderStageFlags::FRAGMENT,
    )]
}

/// The model matrix, vertex stage only.
pub fn push_constant_ranges() -> [vk::PushConstantRange; 1] {
    [vk::PushConstantRange {
        stage_flags: vk::ShaderStageFlags::VERTEX,
        offset: 0,
        size: ModelPushConstants::SIZE,
    }]
}

/// Render pass, layouts and pipeline for mesh drawing.
///
/// Field order is drop order: the pipeline goes before the pass and layouts
/// it was built against.
pub struct ScenePipeline {
    pipeline: Pipeline,
    render_pass: RenderPass,
    layout: PipelineLayout,
    material_layout: DescriptorSetLayout,
    frame_layout: DescriptorSetLayout,
    device: Arc<Device>,
    shader_dir: PathBuf,
}

impl ScenePipeline {
    /// Builds everything for the given attachment formats.
    ///
    /// # Errors
    ///
    /// A missing or invalid shader module is fatal.
    pub fn new(
        device: Arc<Device>,
        shader_dir: &Path,
        color_format: vk::Format,
        depth_format: vk::Format,
    ) -> RhiResult<Self> {
        let frame_layout = DescriptorSetLayout::new(device.clone(), &frame_set_bindings())?;
        let material_layout = DescriptorSetLayout::new(device.clone(), &material_set_bindings())?;
        let layout = PipelineLayout::new(
            device.clone(),
            &[frame_layout.handle(), material_layout.handle()],
            &push_constant_ranges(),
        )?;

        let render_pass = RenderPass::new(device.clone(), color_format, depth_format)?;
        let pipeline = build_pipeline(&device, shader_dir, &layout, &render_pass)?;

        info!(
            "Scene pipeline created for {:?} + {:?}",
            color_format, depth_format
        );

        Ok(Self {
            pipeline,
            render_pass,
            layout,
            material_layout,
            frame_layout,
            device,
            shader_dir: shader_dir.to_path_buf(),
        })
    }

    /// True when the current render pass cannot be used with these formats.
    pub fn needs_rebuild(&self, color_format: vk::Format, depth_format: vk::Format) -> bool {
        self.render_pass.color_format() != color_format
            || self.render_pass.depth_format() != depth_format
    }

    /// Rebuilds the render pass and pipeline for new attachment formats.
    ///
    /// Layouts are kept, so descriptor sets stay valid. The caller must have
    /// waited for the device to go idle.
    pub fn rebuild(&mut self, color_format: vk::Format, depth_format: vk::Format) -> RhiResult<()> {
        let render_pass = RenderPass::new(self.device.clone(), color_format, depth_format)?;
        let pipeline = build_pipeline(&self.device, &self.shader_dir, &self.layout, &render_pass)?;

        self.pipeline = pipeline;
        self.render_pass = render_pass;

        info!(
            "Scene pipeline rebuilt for {:?} + {:?}",
            color_format, depth_format
        );
        Ok(())
    }

    #[inline]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    #[inline]
    pub fn render_pass(&self) -> &RenderPass {
        &self.render_pass
    }

    #[inline]
    pub fn layout(&self) -> &PipelineLayout {
        &self.layout
    }

    #[inline]
    pub fn frame_layout(&self) -> &DescriptorSetLayout {
        &self.frame_layout
    }

    #[inline]
    pub fn material_layout(&self) -> &DescriptorSetLayout {
        &self.material_layout
    }
}

fn build_pipeline(
    device: &Arc<Device>,
    shader_dir: &Path,
    layout: &PipelineLayout,
    render_pass: &RenderPass,
) -> RhiResult<Pipeline> {
    // Modules are only needed until the pipeline exists.
    let vertex_shader = Shader::from_spirv_file(
        device.clone(),
        &shader_dir.join(VERTEX_SHADER_FILE),
        ShaderStage::Vertex,
    )?;
    let fragment_shader = Shader::from_spirv_file(
        device.clone(),
        &shader_dir.join(FRAGMENT_SHADER_FILE),
        ShaderStage::Fragment,
    )?;

    GraphicsPipelineBuilder::new(render_pass)
        .stages(&vertex_shader, &fragment_shader)
        .vertex_input(Vertex::binding_description(), &Vertex::attribute_descriptions())
        .raster(RasterState::SOLID)
        .depth(DepthState::OPAQUE)
        .build(device.clone(), layout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_set_is_uniform_for_both_stages() {
        let [binding] = frame_set_bindings();
        assert_eq!(binding.binding, 0);
        assert_eq!(binding.descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(
            binding.stage_flags,
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT
        );
    }

    #[test]
    fn test_material_set_is_fragment_sampler() {
        let [binding] = material_set_bindings();
        assert_eq!(
            binding.descriptor_type,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER
        );
        assert_eq!(binding.stage_flags, vk::ShaderStageFlags::FRAGMENT);
    }

    #[test]
    fn test_push_constant_range_holds_model_matrix() {
        let [range] = push_constant_ranges();
        assert_eq!(range.offset, 0);
        assert_eq!(range.size, 64);
        assert_eq!(range.stage_flags, vk::ShaderStageFlags::VERTEX);
    }
}
