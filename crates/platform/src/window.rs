//! The winit window and the Vulkan surface created on it.

use std::ffi::{CStr, c_char};
use std::sync::Arc;

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle};
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window as WinitWindow, WindowAttributes};

use toybox_core::config::WindowConfig;
use toybox_core::{Error, Result};

/// A `VkSurfaceKHR` and the loader that destroys it.
///
/// Must be dropped before the instance it was created from.
pub struct Surface {
    handle: vk::SurfaceKHR,
    loader: ash::khr::surface::Instance,
}

impl Surface {
    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    /// Capability, format and present-mode queries go through this.
    #[inline]
    pub fn loader(&self) -> &ash::khr::surface::Instance {
        &self.loader
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe { self.loader.destroy_surface(self.handle, None) };
        tracing::debug!("Surface released");
    }
}

/// The application window plus its last known framebuffer size in physical
/// pixels. Swapchain extents are derived from that size.
pub struct Window {
    window: Arc<WinitWindow>,
    size: (u32, u32),
}

impl Window {
    pub fn new(event_loop: &ActiveEventLoop, config: &WindowConfig) -> Result<Self> {
        let attrs = WindowAttributes::default()
            .with_title(config.title.as_str())
            .with_inner_size(PhysicalSize::new(config.width, config.height))
            .with_resizable(true);
        let window = event_loop
            .create_window(attrs)
            .map_err(|e| Error::Window(e.to_string()))?;

        // Tiling window managers and HiDPI scaling may override the request.
        let actual = window.inner_size();
        tracing::info!(
            "Opened '{}' at {}x{}",
            config.title,
            actual.width,
            actual.height
        );

        Ok(Self {
            window: Arc::new(window),
            size: (actual.width, actual.height),
        })
    }

    pub fn framebuffer_size(&self) -> (u32, u32) {
        self.size
    }

    /// Called from `WindowEvent::Resized`. A zero dimension means minimised.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.size = (width, height);
    }

    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }

    /// Instance extensions the surface for this window needs.
    pub fn required_extensions(&self) -> Result<Vec<*const c_char>> {
        let names = ash_window::enumerate_required_extensions(self.raw_display()?)
            .map_err(|e| Error::Surface(e.to_string()))?;

        for &name in names {
            // SAFETY: ash-window hands out static NUL-terminated names.
            tracing::debug!("Surface needs {:?}", unsafe { CStr::from_ptr(name) });
        }
        Ok(names.to_vec())
    }

    /// `instance` must have enabled [`Window::required_extensions`] and must
    /// outlive the returned [`Surface`].
    pub fn create_surface(&self, entry: &ash::Entry, instance: &ash::Instance) -> Result<Surface> {
        let raw_window = self
            .window
            .window_handle()
            .map_err(|e| Error::Window(e.to_string()))?
            .as_raw();

        // SAFETY: the handles belong to a live winit window and the
        // instance enables the extensions those handles require.
        let handle = unsafe {
            ash_window::create_surface(entry, instance, self.raw_display()?, raw_window, None)
        }
        .map_err(|e| Error::Surface(e.to_string()))?;

        Ok(Surface {
            handle,
            loader: ash::khr::surface::Instance::new(entry, instance),
        })
    }

    fn raw_display(&self) -> Result<RawDisplayHandle> {
        self.window
            .display_handle()
            .map(|handle| handle.as_raw())
            .map_err(|e| Error::Window(e.to_string()))
    }
}
