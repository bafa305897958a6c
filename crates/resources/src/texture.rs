//! CPU-side texture payloads.
//!
//! Every texture is tightly packed RGBA8, which is what the uploader expects.

use std::path::Path;

use toybox_core::ensure_fatal;
use toybox_rhi::image::mip_levels;
use tracing::info;

use crate::error::{ResourceError, ResourceResult};

/// Bytes per RGBA8 texel.
pub const BYTES_PER_PIXEL: usize = 4;

/// Decoded RGBA8 pixels waiting for upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl TextureData {
    /// Wraps raw RGBA8 pixels.
    ///
    /// # Errors
    ///
    /// A zero dimension or a pixel buffer that is not exactly
    /// `width * height * 4` bytes is a fatal contract violation.
    pub fn from_rgba8(width: u32, height: u32, pixels: Vec<u8>) -> ResourceResult<Self> {
        ensure_fatal!(
            width > 0 && height > 0,
            "texture must have a non-zero size, got {}x{}",
            width,
            height
        );
        let expected = width as usize * height as usize * BYTES_PER_PIXEL;
        ensure_fatal!(
            pixels.len() == expected,
            "{}x{} RGBA8 texture needs {} bytes, got {}",
            width,
            height,
            expected,
            pixels.len()
        );

        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Decodes an image file and converts it to RGBA8.
    pub fn load(path: &Path) -> ResourceResult<Self> {
        if !path.exists() {
            return Err(ResourceError::FileNotFound(path.to_path_buf()));
        }

        let image = image::open(path)?.into_rgba8();
        let (width, height) = image.dimensions();

        info!("Loaded texture {:?} ({}x{})", path, width, height);

        Self::from_rgba8(width, height, image.into_raw())
    }

    /// A 1x1 texture of a single colour.
    pub fn solid(rgba: [u8; 4]) -> Self {
        Self {
            width: 1,
            height: 1,
            pixels: rgba.to_vec(),
        }
    }

    /// A `size`x`size` checkerboard with `cells` squares per side.
    pub fn checkerboard(size: u32, cells: u32, a: [u8; 4], b: [u8; 4]) -> Self {
        let size = size.max(1);
        let cell = (size / cells.max(1)).max(1);

        let pixels = (0..size)
            .flat_map(|y| (0..size).map(move |x| (x, y)))
            .flat_map(|(x, y)| if (x / cell + y / cell) % 2 == 0 { a } else { b })
            .collect();

        Self {
            width: size,
            height: size,
            pixels,
        }
    }

    /// Length of the full mip chain for this texture.
    pub fn mip_levels(&self) -> u32 {
        mip_levels(self.width, self.height)
    }
}
