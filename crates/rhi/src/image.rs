//! GPU images and image views.
//!
//! [`Image`] is a 2D optimal-tiling image in device-local memory with a view
//! covering all of its mip levels. [`ImageView`] is also used on its own for
//! swapchain images, which the swapchain owns.
//!
//! The free functions here are the format and mip-chain math shared by the
//! uploader and the depth attachment.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use toybox_core::fatal_error;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Depth formats tried in order when picking the depth attachment format.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Owned VkImageView.
pub struct ImageView {
    device: Arc<Device>,
    view: vk::ImageView,
}

impl ImageView {
    /// Creates a 2D view over `mip_levels` levels of `image`.
    pub fn new(
        device: Arc<Device>,
        image: vk::Image,
        format: vk::Format,
        aspect: vk::ImageAspectFlags,
        mip_levels: u32,
    ) -> RhiResult<Self> {
        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(aspect)
                    .base_mip_level(0)
                    .level_count(mip_levels)
                    .base_array_layer(0)
                    .layer_count(1),
            );

        let view = unsafe { device.handle().create_image_view(&view_info, None)? };

        Ok(Self { device, view })
    }

    #[inline]
    pub fn handle(&self) -> vk::ImageView {
        self.view
    }
}

impl Drop for ImageView {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_image_view(self.view, None);
        }
    }
}

/// Parameters for [`Image::new`].
#[derive(Clone, Copy, Debug)]
pub struct ImageDesc {
    pub width: u32,
    pub height: u32,
    pub format: vk::Format,
    pub mip_levels: u32,
    pub usage: vk::ImageUsageFlags,
    pub aspect: vk::ImageAspectFlags,
}

impl ImageDesc {
    /// A depth attachment of the given size.
    pub fn depth(width: u32, height: u32, format: vk::Format) -> Self {
        Self {
            width,
            height,
            format,
            mip_levels: 1,
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            aspect: vk::ImageAspectFlags::DEPTH,
        }
    }

    /// A sampled RGBA texture with a full mip chain.
    ///
    /// Transfer source is included so the chain can be generated by blits.
    pub fn texture(width: u32, height: u32, format: vk::Format) -> Self {
        Self {
            width,
            height,
            format,
            mip_levels: mip_levels(width, height),
            usage: vk::ImageUsageFlags::SAMPLED
                | vk::ImageUsageFlags::TRANSFER_DST
                | vk::ImageUsageFlags::TRANSFER_SRC,
            aspect: vk::ImageAspectFlags::COLOR,
        }
    }
}

/// Device-local 2D image with its view and allocation.
///
/// Destruction order is view, image, then memory.
pub struct Image {
    device: Arc<Device>,
    image: vk::Image,
    view: Option<ImageView>,
    allocation: Option<Allocation>,
    format: vk::Format,
    extent: vk::Extent2D,
    mip_levels: u32,
}

impl Image {
    /// Creates the image, binds device-local memory and creates a full view.
    ///
    /// # Errors
    ///
    /// Returns an error if the size is zero or any Vulkan or allocator call fails.
    pub fn new(device: Arc<Device>, desc: &ImageDesc, name: &str) -> RhiResult<Self> {
        if desc.width == 0 || desc.height == 0 {
            return Err(RhiError::InvalidHandle(format!(
                "Image '{}' dimensions must be greater than 0",
                name
            )));
        }

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(desc.format)
            .extent(vk::Extent3D {
                width: desc.width,
                height: desc.height,
                depth: 1,
            })
            .mip_levels(desc.mip_levels.max(1))
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { device.handle().create_image(&image_info, None)? };
        let requirements = unsafe { device.handle().get_image_memory_requirements(image) };

        let allocation = device.allocator().allocate(&AllocationCreateDesc {
            name,
            requirements,
            location: MemoryLocation::GpuOnly,
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.handle().destroy_image(image, None) };
                return Err(e.into());
            }
        };

        // From here on `Drop` cleans up partial state.
        let mut this = Self {
            device: device.clone(),
            image,
            view: None,
            allocation: Some(allocation),
            format: desc.format,
            extent: vk::Extent2D {
                width: desc.width,
                height: desc.height,
            },
            mip_levels: desc.mip_levels.max(1),
        };

        if let Some(allocation) = this.allocation.as_ref() {
            unsafe {
                device
                    .handle()
                    .bind_image_memory(image, allocation.memory(), allocation.offset())?;
            }
        }

        this.view = Some(ImageView::new(
            device,
            image,
            desc.format,
            desc.aspect,
            this.mip_levels,
        )?);

        debug!(
            "Created image '{}': {}x{} {:?}, {} mip levels",
            name, desc.width, desc.height, desc.format, this.mip_levels
        );

        Ok(this)
    }

    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    /// The view over every mip level.
    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
            .as_ref()
            .map_or(vk::ImageView::null(), ImageView::handle)
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        self.view = None;

        unsafe {
            self.device.handle().destroy_image(self.image, None);
        }

        if let Some(allocation) = self.allocation.take()
            && let Err(e) = self.device.allocator().free(allocation)
        {
            tracing::error!("Failed to free image allocation: {:?}", e);
        }
    }
}

/// Number of levels in a full mip chain: `floor(log2(max(w, h))) + 1`.
///
/// A zero dimension counts as one pixel.
pub fn mip_levels(width: u32, height: u32) -> u32 {
    let largest = width.max(height).max(1);
    u32::BITS - largest.leading_zeros()
}

/// Extent of every level in the chain, base level first.
///
/// Each dimension halves per level and never drops below 1.
pub fn mip_extents(width: u32, height: u32) -> Vec<vk::Extent2D> {
    let levels = mip_levels(width, height);
    let mut extent = vk::Extent2D {
        width: width.max(1),
        height: height.max(1),
    };

    let mut out = Vec::with_capacity(levels as usize);
    for _ in 0..levels {
        out.push(extent);
        extent = vk::Extent2D {
            width: (extent.width / 2).max(1),
            height: (extent.height / 2).max(1),
        };
    }
    out
}

/// Returns the first candidate whose `tiling` features include `features`.
///
/// `properties` reports the device's format properties; production code
/// passes [`Device::format_properties`].
pub fn find_supported_format(
    candidates: &[vk::Format],
    tiling: vk::ImageTiling,
    features: vk::FormatFeatureFlags,
    properties: impl Fn(vk::Format) -> vk::FormatProperties,
) -> Option<vk::Format> {
    candidates.iter().copied().find(|&format| {
        let props = properties(format);
        match tiling {
            vk::ImageTiling::LINEAR => props.linear_tiling_features.contains(features),
            vk::ImageTiling::OPTIMAL => props.optimal_tiling_features.contains(features),
            _ => false,
        }
    })
}

/// Picks the depth attachment format, or fails fatally if none is supported.
pub fn find_depth_format(device: &Device) -> RhiResult<vk::Format> {
    find_supported_format(
        &DEPTH_FORMAT_CANDIDATES,
        vk::ImageTiling::OPTIMAL,
        vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
        |format| device.format_properties(format),
    )
    .ok_or_else(|| {
        fatal_error!(
            "depth format supported",
            "none of {:?} usable as an optimal-tiling depth attachment",
            DEPTH_FORMAT_CANDIDATES
        )
        .into()
    })
}

/// Returns true for depth formats that carry a stencil aspect.
pub fn has_stencil_component(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mip_levels() {
        assert_eq!(mip_levels(1, 1), 1);
        assert_eq!(mip_levels(2, 1), 2);
        assert_eq!(mip_levels(256, 256), 9);
        assert_eq!(mip_levels(512, 128), 10);
        assert_eq!(mip_levels(1000, 10), 10);
        assert_eq!(mip_levels(1024, 1), 11);
        assert_eq!(mip_levels(0, 0), 1);
    }

    #[test]
    fn test_mip_extents_halve_and_clamp() {
        let extents = mip_extents(8, 2);
        let pairs: Vec<(u32, u32)> = extents.iter().map(|e| (e.width, e.height)).collect();
        assert_eq!(pairs, vec![(8, 2), (4, 1), (2, 1), (1, 1)]);
    }

    #[test]
    fn test_mip_extents_match_level_count() {
        for (w, h) in [(1, 1), (3, 5), (256, 256), (640, 480), (4096, 1)] {
            let extents = mip_extents(w, h);
            assert_eq!(extents.len() as u32, mip_levels(w, h));
            let last = extents[extents.len() - 1];
            assert_eq!((last.width, last.height), (1, 1));
        }
    }

    fn optimal_only(format: vk::Format) -> vk::FormatProperties {
        if format == vk::Format::D32_SFLOAT_S8_UINT {
            vk::FormatProperties {
                optimal_tiling_features: vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
                ..Default::default()
            }
        } else {
            vk::FormatProperties::default()
        }
    }

    #[test]
    fn test_find_supported_format_picks_first_match() {
        let found = find_supported_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            optimal_only,
        );
        assert_eq!(found, Some(vk::Format::D32_SFLOAT_S8_UINT));
    }

    #[test]
    fn test_find_supported_format_respects_tiling() {
        let found = find_supported_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::LINEAR,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            optimal_only,
        );
        assert_eq!(found, None);
    }

    #[test]
    fn test_find_supported_format_none_supported() {
        let found = find_supported_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            |_| vk::FormatProperties::default(),
        );
        assert!(found.is_none());
    }

    #[test]
    fn test_has_stencil_component() {
        assert!(!has_stencil_component(vk::Format::D32_SFLOAT));
        assert!(has_stencil_component(vk::Format::D32_SFLOAT_S8_UINT));
        assert!(has_stencil_component(vk::Format::D24_UNORM_S8_UINT));
    }

    #[test]
    fn test_texture_desc_has_full_chain() {
        let desc = ImageDesc::texture(64, 16, vk::Format::R8G8B8A8_SRGB);
        assert_eq!(desc.mip_levels, 7);
        assert!(desc.usage.contains(vk::ImageUsageFlags::TRANSFER_SRC));
    }
}
