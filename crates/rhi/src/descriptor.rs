//! Descriptor layouts, the renderer's pool, and set writes.
//!
//! Two kinds of set exist: one uniform-buffer set per frame slot and one
//! sampled-texture set per material. [`DescriptorPoolSizes`] sizes a pool for
//! exactly those. Sets are never freed one by one; they go with the pool.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

pub struct DescriptorSetLayout {
    device: Arc<Device>,
    layout: vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    pub fn new(device: Arc<Device>, bindings: &[vk::DescriptorSetLayoutBinding]) -> RhiResult<Self> {
        let info = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings);
        let layout = unsafe { device.handle().create_descriptor_set_layout(&info, None)? };
        Ok(Self { device, layout })
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.layout, None)
        };
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DescriptorPoolSizes {
    /// One per frame slot.
    pub frame_sets: u32,
    /// One per material.
    pub material_sets: u32,
}

impl DescriptorPoolSizes {
    pub fn new(frame_sets: u32, material_sets: u32) -> Self {
        Self {
            frame_sets,
            material_sets,
        }
    }

    pub fn max_sets(&self) -> u32 {
        self.frame_sets + self.material_sets
    }

    /// Entries with a zero count are dropped; Vulkan rejects them.
    pub fn pool_sizes(&self) -> Vec<vk::DescriptorPoolSize> {
        let demand = [
            (vk::DescriptorType::UNIFORM_BUFFER, self.frame_sets),
            (vk::DescriptorType::COMBINED_IMAGE_SAMPLER, self.material_sets),
        ];
        demand
            .into_iter()
            .filter(|&(_, count)| count > 0)
            .map(|(ty, descriptor_count)| vk::DescriptorPoolSize {
                ty,
                descriptor_count,
            })
            .collect()
    }
}

pub struct DescriptorPool {
    device: Arc<Device>,
    pool: vk::DescriptorPool,
}

impl DescriptorPool {
    pub fn new(device: Arc<Device>, sizes: &DescriptorPoolSizes) -> RhiResult<Self> {
        let pool_sizes = sizes.pool_sizes();
        let info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(sizes.max_sets().max(1))
            .pool_sizes(&pool_sizes);
        let pool = unsafe { device.handle().create_descriptor_pool(&info, None)? };

        debug!(
            "Descriptor pool for {} frame and {} material set(s)",
            sizes.frame_sets, sizes.material_sets
        );
        Ok(Self { device, pool })
    }

    /// One set per layout, in order. Fails once the pool is exhausted.
    pub fn allocate(&self, layouts: &[vk::DescriptorSetLayout]) -> RhiResult<Vec<vk::DescriptorSet>> {
        if layouts.is_empty() {
            return Ok(Vec::new());
        }
        let info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);
        Ok(unsafe { self.device.handle().allocate_descriptor_sets(&info)? })
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe { self.device.handle().destroy_descriptor_pool(self.pool, None) };
    }
}

/// Binding 0 of `set` reads all of `buffer` as a uniform block.
pub fn write_uniform_buffer(device: &Device, set: vk::DescriptorSet, buffer: vk::Buffer) {
    let info = [vk::DescriptorBufferInfo {
        buffer,
        offset: 0,
        range: vk::WHOLE_SIZE,
    }];
    let write = binding_zero(set, vk::DescriptorType::UNIFORM_BUFFER).buffer_info(&info);
    unsafe { device.handle().update_descriptor_sets(&[write], &[]) };
}

/// Binding 0 of `set` samples `view` through `sampler`.
pub fn write_combined_image_sampler(
    device: &Device,
    set: vk::DescriptorSet,
    sampler: vk::Sampler,
    view: vk::ImageView,
) {
    let info = [vk::DescriptorImageInfo {
        sampler,
        image_view: view,
        image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    }];
    let write = binding_zero(set, vk::DescriptorType::COMBINED_IMAGE_SAMPLER).image_info(&info);
    unsafe { device.handle().update_descriptor_sets(&[write], &[]) };
}

fn binding_zero<'a>(set: vk::DescriptorSet, ty: vk::DescriptorType) -> vk::WriteDescriptorSet<'a> {
    vk::WriteDescriptorSet::default()
        .dst_set(set)
        .dst_binding(0)
        .descriptor_type(ty)
}

/// Layout bindings holding a single descriptor.
pub mod bindings {
    use ash::vk;

    fn single(
        binding: u32,
        ty: vk::DescriptorType,
        stages: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        vk::DescriptorSetLayoutBinding::default()
            .binding(binding)
            .descriptor_type(ty)
            .descriptor_count(1)
            .stage_flags(stages)
    }

    pub fn uniform_buffer(binding: u32, stages: vk::ShaderStageFlags) -> vk::DescriptorSetLayoutBinding<'static> {
        single(binding, vk::DescriptorType::UNIFORM_BUFFER, stages)
    }

    pub fn combined_image_sampler(
        binding: u32,
        stages: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        single(binding, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, stages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bindings_hold_one_descriptor() {
        let ubo = bindings::uniform_buffer(0, vk::ShaderStageFlags::VERTEX);
        assert_eq!(ubo.descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(ubo.descriptor_count, 1);

        let texture = bindings::combined_image_sampler(3, vk::ShaderStageFlags::FRAGMENT);
        assert_eq!(texture.binding, 3);
        assert_eq!(
            texture.descriptor_type,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER
        );
    }

    #[test]
    fn test_pool_covers_frames_and_materials() {
        let sizes = DescriptorPoolSizes::new(3, 5);
        assert_eq!(sizes.max_sets(), 8);

        let counts: Vec<(vk::DescriptorType, u32)> = sizes
            .pool_sizes()
            .iter()
            .map(|size| (size.ty, size.descriptor_count))
            .collect();
        assert_eq!(
            counts,
            vec![
                (vk::DescriptorType::UNIFORM_BUFFER, 3),
                (vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 5),
            ]
        );
    }

    #[test]
    fn test_pool_without_materials_skips_samplers() {
        let entries = DescriptorPoolSizes::new(2, 0).pool_sizes();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].ty, vk::DescriptorType::UNIFORM_BUFFER);
    }

    #[test]
    fn test_write_targets_binding_zero() {
        let write = binding_zero(vk::DescriptorSet::null(), vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(write.dst_binding, 0);
        assert_eq!(write.dst_array_element, 0);
        assert_eq!(write.descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
    }
}
