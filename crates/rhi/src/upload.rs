//! Staging uploads into device-local memory.
//!
//! Every transfer goes through [`Uploader::single_time_commands`]: a one-shot
//! command buffer from a transient pool, submitted to the graphics queue and
//! waited on with a fence before returning. Uploads happen at load time, so
//! blocking here is fine; the frame loop never calls into this module.
//!
//! ```no_run
//! use std::sync::Arc;
//! use toybox_rhi::buffer::BufferUsage;
//! use toybox_rhi::device::Device;
//! use toybox_rhi::upload::Uploader;
//!
//! # fn example(device: Arc<Device>) -> Result<(), toybox_rhi::RhiError> {
//! let uploader = Uploader::new(device)?;
//! let indices: [u32; 3] = [0, 1, 2];
//! let buffer = uploader.upload_buffer(bytemuck::cast_slice(&indices), BufferUsage::Index)?;
//! assert_eq!(uploader.read_back_buffer(&buffer)?, bytemuck::cast_slice::<u32, u8>(&indices));
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use toybox_core::{FatalError, ensure_fatal};
use tracing::debug;

use crate::buffer::{Buffer, BufferUsage};
use crate::command::{CommandBuffer, CommandPool, PoolUsage};
use crate::device::Device;
use crate::error::RhiResult;
use crate::image::{Image, ImageDesc, find_supported_format, mip_extents, mip_levels};
use crate::sync::Fence;

/// Bytes per texel of every texture the uploader accepts (RGBA8).
pub const TEXEL_SIZE: usize = 4;

/// CPU pixels bound for a sampled texture.
#[derive(Clone, Copy, Debug)]
pub struct TextureUpload<'a> {
    /// Tightly packed RGBA8 rows, `width * height * 4` bytes.
    pub pixels: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub format: vk::Format,
    /// 1 uploads the base level only; more generates the chain by blitting.
    /// Clamped to the full chain for `width` x `height`.
    pub mip_levels: u32,
}

/// Synchronous transfer helper bound to the graphics queue.
pub struct Uploader {
    device: Arc<Device>,
    pool: CommandPool,
}

impl Uploader {
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let pool = CommandPool::new(device.clone(), device.graphics_family(), PoolUsage::Transient)?;
        Ok(Self { device, pool })
    }

    /// Records `record` into a fresh command buffer, submits it and blocks
    /// until the GPU has finished executing it.
    ///
    /// The command buffer is freed on every path, including errors.
    pub fn single_time_commands<F>(&self, record: F) -> RhiResult<()>
    where
        F: FnOnce(&CommandBuffer),
    {
        let handles = self.pool.allocate(1)?;
        let result = self.submit_and_wait(&handles, record);
        self.pool.free(&handles);
        result
    }

    fn submit_and_wait<F>(&self, handles: &[vk::CommandBuffer], record: F) -> RhiResult<()>
    where
        F: FnOnce(&CommandBuffer),
    {
        let cmd = CommandBuffer::from_handle(self.device.clone(), handles[0]);
        cmd.begin()?;
        record(&cmd);
        cmd.end()?;

        let fence = Fence::unsignaled(self.device.clone())?;
        let submit = vk::SubmitInfo::default().command_buffers(handles);
        unsafe {
            self.device.submit_graphics(&[submit], fence.handle())?;
        }
        fence.wait(u64::MAX)
    }

    /// Copies `data` into a new buffer for `usage`.
    ///
    /// Device-local usages go through a staging buffer that is released once
    /// the copy has completed; host-visible usages are written directly.
    pub fn upload_buffer(&self, data: &[u8], usage: BufferUsage) -> RhiResult<Buffer> {
        if usage.is_host_visible() {
            return Buffer::new_with_data(self.device.clone(), usage, data);
        }

        let size = data.len() as vk::DeviceSize;
        let staging = Buffer::new_with_data(self.device.clone(), BufferUsage::Staging, data)?;
        let destination = Buffer::new(self.device.clone(), usage, size)?;

        self.single_time_commands(|cmd| {
            cmd.copy_buffer(
                staging.handle(),
                destination.handle(),
                &[vk::BufferCopy {
                    src_offset: 0,
                    dst_offset: 0,
                    size,
                }],
            );
        })?;

        debug!("Uploaded {} bytes into {} buffer", size, usage.label());
        Ok(destination)
    }

    /// Copies the whole of `buffer` back to host memory.
    ///
    /// Debug path; the source must have been created with transfer-source usage.
    pub fn read_back_buffer(&self, buffer: &Buffer) -> RhiResult<Vec<u8>> {
        let size = buffer.size();
        let readback = Buffer::new(self.device.clone(), BufferUsage::Readback, size)?;

        self.single_time_commands(|cmd| {
            cmd.copy_buffer(
                buffer.handle(),
                readback.handle(),
                &[vk::BufferCopy {
                    src_offset: 0,
                    dst_offset: 0,
                    size,
                }],
            );
            let visible = vk::BufferMemoryBarrier::default()
                .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                .dst_access_mask(vk::AccessFlags::HOST_READ)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .buffer(readback.handle())
                .offset(0)
                .size(vk::WHOLE_SIZE);
            cmd.pipeline_barrier(
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::HOST,
                &[visible],
                &[],
            );
        })?;

        readback.read_data(0, size as usize)
    }

    /// Creates a sampled image from `upload` and leaves every level in
    /// `SHADER_READ_ONLY_OPTIMAL`.
    ///
    /// # Errors
    ///
    /// Fatal contract violations:
    /// - a pixel buffer that is not exactly `width * height * 4` bytes
    /// - a format that cannot be sampled and copied into with optimal tiling
    /// - a mip chain on a format without linear blit filtering
    pub fn upload_image(&self, upload: &TextureUpload<'_>) -> RhiResult<Image> {
        let expected = upload.width as usize * upload.height as usize * TEXEL_SIZE;
        ensure_fatal!(
            upload.pixels.len() == expected,
            "{}x{} texture needs {} bytes of RGBA8, got {}",
            upload.width,
            upload.height,
            expected,
            upload.pixels.len()
        );

        let properties = |format| self.device.format_properties(format);
        check_texture_format(upload.format, properties)?;
        let levels = texture_levels(upload.width, upload.height, upload.mip_levels);
        if levels > 1 {
            check_mip_filtering(upload.format, properties)?;
        }

        let desc = ImageDesc {
            mip_levels: levels,
            ..ImageDesc::texture(upload.width, upload.height, upload.format)
        };
        let image = Image::new(self.device.clone(), &desc, "texture")?;
        let staging =
            Buffer::new_with_data(self.device.clone(), BufferUsage::Staging, upload.pixels)?;

        self.single_time_commands(|cmd| {
            cmd.pipeline_barrier(
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::TRANSFER,
                &[],
                &[layout_barrier(
                    image.handle(),
                    0,
                    levels,
                    vk::ImageLayout::UNDEFINED,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    vk::AccessFlags::empty(),
                    vk::AccessFlags::TRANSFER_WRITE,
                )],
            );

            let region = vk::BufferImageCopy {
                buffer_offset: 0,
                buffer_row_length: 0,
                buffer_image_height: 0,
                image_subresource: color_layers(0),
                image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
                image_extent: vk::Extent3D {
                    width: upload.width,
                    height: upload.height,
                    depth: 1,
                },
            };
            cmd.copy_buffer_to_image(staging.handle(), image.handle(), &[region]);

            if levels == 1 {
                cmd.pipeline_barrier(
                    vk::PipelineStageFlags::TRANSFER,
                    vk::PipelineStageFlags::FRAGMENT_SHADER,
                    &[],
                    &[layout_barrier(
                        image.handle(),
                        0,
                        1,
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                        vk::AccessFlags::TRANSFER_WRITE,
                        vk::AccessFlags::SHADER_READ,
                    )],
                );
            }
        })?;
        drop(staging);

        if levels > 1 {
            self.generate_mipmaps(&image)?;
        }

        debug!(
            "Uploaded {}x{} texture with {} mip levels",
            upload.width, upload.height, levels
        );
        Ok(image)
    }

    /// Fills levels `1..` of `image` by successive linear blits.
    ///
    /// Every level must be in `TRANSFER_DST_OPTIMAL` with level 0 written;
    /// on return every level is `SHADER_READ_ONLY_OPTIMAL`.
    pub fn generate_mipmaps(&self, image: &Image) -> RhiResult<()> {
        check_mip_filtering(image.format(), |format| self.device.format_properties(format))?;

        let extent = image.extent();
        let levels = image.mip_levels();
        ensure_fatal!(
            levels >= 1 && levels <= mip_levels(extent.width, extent.height),
            "{}x{} image cannot hold {} mip levels",
            extent.width,
            extent.height,
            levels
        );

        let blits = mip_blits(extent.width, extent.height, levels);
        let handle = image.handle();
        let last = levels - 1;

        self.single_time_commands(|cmd| {
            for (index, blit) in blits.iter().enumerate() {
                let src_level = index as u32;

                cmd.pipeline_barrier(
                    vk::PipelineStageFlags::TRANSFER,
                    vk::PipelineStageFlags::TRANSFER,
                    &[],
                    &[layout_barrier(
                        handle,
                        src_level,
                        1,
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                        vk::AccessFlags::TRANSFER_WRITE,
                        vk::AccessFlags::TRANSFER_READ,
                    )],
                );

                cmd.blit_within(handle, *blit);

                cmd.pipeline_barrier(
                    vk::PipelineStageFlags::TRANSFER,
                    vk::PipelineStageFlags::FRAGMENT_SHADER,
                    &[],
                    &[layout_barrier(
                        handle,
                        src_level,
                        1,
                        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                        vk::AccessFlags::TRANSFER_READ,
                        vk::AccessFlags::SHADER_READ,
                    )],
                );
            }

            // The last level was only ever a blit destination.
            cmd.pipeline_barrier(
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
                &[],
                &[layout_barrier(
                    handle,
                    last,
                    1,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    vk::AccessFlags::TRANSFER_WRITE,
                    vk::AccessFlags::SHADER_READ,
                )],
            );
        })
    }
}

fn color_layers(mip_level: u32) -> vk::ImageSubresourceLayers {
    vk::ImageSubresourceLayers {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        mip_level,
        base_array_layer: 0,
        layer_count: 1,
    }
}

fn layout_barrier(
    image: vk::Image,
    base_mip_level: u32,
    level_count: u32,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    src_access: vk::AccessFlags,
    dst_access: vk::AccessFlags,
) -> vk::ImageMemoryBarrier<'static> {
    vk::ImageMemoryBarrier::default()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_access_mask(src_access)
        .dst_access_mask(dst_access)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(vk::ImageAspectFlags::COLOR)
                .base_mip_level(base_mip_level)
                .level_count(level_count)
                .base_array_layer(0)
                .layer_count(1),
        )
}

/// Levels a texture gets for a request of `requested`: at least the base
/// level, at most the full chain.
pub fn texture_levels(width: u32, height: u32, requested: u32) -> u32 {
    requested.clamp(1, mip_levels(width, height))
}

/// The format must be sampleable and a copy destination with optimal tiling.
pub fn check_texture_format(
    format: vk::Format,
    properties: impl Fn(vk::Format) -> vk::FormatProperties,
) -> Result<(), FatalError> {
    let required = vk::FormatFeatureFlags::SAMPLED_IMAGE | vk::FormatFeatureFlags::TRANSFER_DST;
    let supported =
        find_supported_format(&[format], vk::ImageTiling::OPTIMAL, required, properties);
    ensure_fatal!(
        supported.is_some(),
        "{:?} lacks {:?} with optimal tiling",
        format,
        required
    );
    Ok(())
}

/// Blitting a mip chain needs linear filtering on the format.
pub fn check_mip_filtering(
    format: vk::Format,
    properties: impl Fn(vk::Format) -> vk::FormatProperties,
) -> Result<(), FatalError> {
    let supported = find_supported_format(
        &[format],
        vk::ImageTiling::OPTIMAL,
        vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR,
        properties,
    );
    ensure_fatal!(
        supported.is_some(),
        "cannot generate mipmaps for {:?} without linear filtering",
        format
    );
    Ok(())
}

/// One blit per level transition, level `i` into level `i + 1`, stopping at
/// level `levels - 1`.
pub fn mip_blits(width: u32, height: u32, levels: u32) -> Vec<vk::ImageBlit> {
    let extents = mip_extents(width, height);
    extents
        .windows(2)
        .take(levels.saturating_sub(1) as usize)
        .enumerate()
        .map(|(level, pair)| {
            let (src, dst) = (pair[0], pair[1]);
            vk::ImageBlit {
                src_subresource: color_layers(level as u32),
                src_offsets: [vk::Offset3D { x: 0, y: 0, z: 0 }, corner(src)],
                dst_subresource: color_layers(level as u32 + 1),
                dst_offsets: [vk::Offset3D { x: 0, y: 0, z: 0 }, corner(dst)],
            }
        })
        .collect()
}

fn corner(extent: vk::Extent2D) -> vk::Offset3D {
    vk::Offset3D {
        x: extent.width as i32,
        y: extent.height as i32,
        z: 1,
    }
}
