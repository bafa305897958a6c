//! Depth buffer management.
//!
//! One depth attachment is shared by every framebuffer of the swapchain. It
//! follows the swapchain extent and is rebuilt with it.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use toybox_rhi::device::Device;
//! use toybox_rhi::vk;
//! use toybox_renderer::depth_buffer::DepthBuffer;
//!
//! # fn example(device: Arc<Device>) -> Result<(), toybox_rhi::RhiError> {
//! let depth_buffer = DepthBuffer::with_best_format(
//!     device,
//!     vk::Extent2D { width: 1920, height: 1080 },
//! )?;
//! let view = depth_buffer.view();
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use toybox_rhi::device::Device;
use toybox_rhi::image::{Image, ImageDesc, find_depth_format, has_stencil_component};
use toybox_rhi::{RhiError, RhiResult};

/// Depth attachment with GPU-only memory.
///
/// The wrapped [`Image`] releases view, image and memory in that order.
pub struct DepthBuffer {
    image: Image,
}

impl DepthBuffer {
    /// Creates a depth buffer of `extent` in `format`.
    ///
    /// # Errors
    ///
    /// Returns an error if either dimension is zero or creation fails.
    pub fn new(device: Arc<Device>, extent: vk::Extent2D, format: vk::Format) -> RhiResult<Self> {
        if extent.width == 0 || extent.height == 0 {
            return Err(RhiError::InvalidHandle(
                "Depth buffer dimensions must be greater than 0".to_string(),
            ));
        }

        let desc = ImageDesc::depth(extent.width, extent.height, format);
        let image = Image::new(device, &desc, "depth buffer")?;

        debug!(
            "Created depth buffer: {}x{} {:?}{}",
            extent.width,
            extent.height,
            format,
            if has_stencil_component(format) {
                " (with stencil)"
            } else {
                ""
            }
        );

        Ok(Self { image })
    }

    /// Creates a depth buffer in the most precise format the device supports.
    ///
    /// # Errors
    ///
    /// Fails fatally when no candidate depth format is supported.
    pub fn with_best_format(device: Arc<Device>, extent: vk::Extent2D) -> RhiResult<Self> {
        let format = find_depth_format(&device)?;
        Self::new(device, extent, format)
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.image.view()
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.image.format()
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.image.extent()
    }
}
