//! GPU-resident copy of a [`Scene`].
//!
//! Uploaded once at startup and read-only afterwards. Every model gets a
//! device-local vertex and index buffer, every texture a mipmapped sRGB image
//! and sampler, every material a descriptor set (set 1) pointing at its
//! diffuse texture. Materials without a texture sample a 1x1 white image.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use toybox_resources::{MeshData, ModelData, TextureData};
use toybox_rhi::RhiResult;
use toybox_rhi::buffer::{Buffer, BufferUsage};
use toybox_rhi::descriptor::{DescriptorPool, write_combined_image_sampler};
use toybox_rhi::device::Device;
use toybox_rhi::image::Image;
use toybox_rhi::sampler::Sampler;
use toybox_rhi::upload::{TextureUpload, Uploader};
use toybox_scene::Scene;

/// Colour textures are authored in sRGB.
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

const WHITE: [u8; 4] = [255, 255, 255, 255];

/// One uploaded model.
pub struct GpuModel {
    pub vertex_buffer: Buffer,
    pub index_buffer: Buffer,
    pub meshes: Vec<MeshData>,
}

/// Sampled image plus its sampler.
pub struct GpuTexture {
    pub image: Image,
    pub sampler: Sampler,
}

pub struct GpuScene {
    models: Vec<GpuModel>,
    /// Scene textures in scene order, then the white fallback.
    textures: Vec<GpuTexture>,
    material_sets: Vec<vk::DescriptorSet>,
}

impl GpuScene {
    /// Uploads every model and texture of `scene` and writes one material
    /// set per material from `pool`.
    ///
    /// Blocks on each transfer; call before the first frame.
    pub fn upload(
        device: &Arc<Device>,
        uploader: &Uploader,
        scene: &Scene,
        pool: &DescriptorPool,
        material_layout: vk::DescriptorSetLayout,
    ) -> RhiResult<Self> {
        let models = scene
            .models
            .iter()
            .map(|model| upload_model(uploader, model))
            .collect::<RhiResult<Vec<_>>>()?;

        let fallback = TextureData::solid(WHITE);
        let textures = scene
            .textures
            .iter()
            .chain(std::iter::once(&fallback))
            .map(|texture| upload_texture(device, uploader, texture))
            .collect::<RhiResult<Vec<_>>>()?;

        let layouts = vec![material_layout; scene.materials.len()];
        let material_sets = pool.allocate(&layouts)?;

        for (material, &set) in scene.materials.iter().zip(&material_sets) {
            let index = texture_slot(material.diffuse_texture, scene.textures.len());
            let texture = &textures[index];
            write_combined_image_sampler(
                device,
                set,
                texture.sampler.handle(),
                texture.image.view(),
            );
        }

        info!(
            "Scene uploaded: {} model(s), {} texture(s), {} material(s)",
            models.len(),
            scene.textures.len(),
            material_sets.len()
        );

        Ok(Self {
            models,
            textures,
            material_sets,
        })
    }

    pub fn model(&self, index: usize) -> Option<&GpuModel> {
        self.models.get(index)
    }

    pub fn material_set(&self, index: usize) -> Option<vk::DescriptorSet> {
        self.material_sets.get(index).copied()
    }

    /// Scene textures plus the fallback.
    #[inline]
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }
}

/// Index into the uploaded texture list for a material's diffuse reference.
///
/// The fallback sits right after the scene textures. Out-of-range references
/// are rejected by `Scene::validate` before upload.
pub fn texture_slot(diffuse_texture: Option<usize>, scene_texture_count: usize) -> usize {
    diffuse_texture
        .filter(|&index| index < scene_texture_count)
        .unwrap_or(scene_texture_count)
}

fn upload_model(uploader: &Uploader, model: &ModelData) -> RhiResult<GpuModel> {
    let vertex_buffer =
        uploader.upload_buffer(bytemuck::cast_slice(&model.vertices), BufferUsage::Vertex)?;
    let index_buffer =
        uploader.upload_buffer(bytemuck::cast_slice(&model.indices), BufferUsage::Index)?;

    debug!(
        "Uploaded model '{}': {} vertices, {} triangles",
        model.name,
        model.vertices.len(),
        model.triangle_count()
    );

    Ok(GpuModel {
        vertex_buffer,
        index_buffer,
        meshes: model.meshes.clone(),
    })
}

fn upload_texture(
    device: &Arc<Device>,
    uploader: &Uploader,
    texture: &TextureData,
) -> RhiResult<GpuTexture> {
    let image = uploader.upload_image(&TextureUpload {
        pixels: &texture.pixels,
        width: texture.width,
        height: texture.height,
        format: TEXTURE_FORMAT,
        mip_levels: texture.mip_levels(),
    })?;
    let sampler = Sampler::new(device.clone(), image.mip_levels())?;

    Ok(GpuTexture { image, sampler })
}
