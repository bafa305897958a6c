//! Device context: instance, surface, GPU and logical device.
//!
//! Everything else in the renderer borrows from or holds an `Arc` into this
//! context, and it is the last thing the renderer releases.

use std::sync::Arc;

use tracing::info;

use toybox_core::RendererConfig;
use toybox_platform::{Surface, Window};
use toybox_rhi::RhiError;
use toybox_rhi::RhiResult;
use toybox_rhi::device::Device;
use toybox_rhi::instance::{Instance, InstanceDesc};
use toybox_rhi::physical_device::{SurfaceSupport, select_physical_device};

/// Owns the objects every other GPU resource depends on.
///
/// Fields drop in declaration order, which is the reverse of creation order:
/// device, then surface, then instance.
pub struct DeviceContext {
    device: Arc<Device>,
    surface: Surface,
    instance: Instance,
}

impl DeviceContext {
    /// Creates the instance for `window`, its surface, and a logical device
    /// on the best GPU that can present to that surface.
    ///
    /// # Errors
    ///
    /// No suitable GPU and a required-but-missing validation layer are fatal.
    /// Window-system failures are returned as surface errors.
    pub fn new(window: &Window, config: &RendererConfig, application_name: &str) -> RhiResult<Self> {
        let extensions = window
            .required_extensions()
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;

        let desc = InstanceDesc {
            application_name: application_name.to_string(),
            validation: config.validation,
        };
        let instance = Instance::new(&desc, &extensions)?;

        let surface = window
            .create_surface(instance.entry(), instance.handle())
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;

        let physical_device_info = select_physical_device(
            &instance,
            Some(SurfaceSupport {
                surface: surface.handle(),
                loader: surface.loader(),
            }),
        )?;

        let device = Device::new(&instance, &physical_device_info)?;

        info!(
            "Device context ready on '{}' ({})",
            physical_device_info.name(),
            physical_device_info.kind()
        );

        Ok(Self {
            device,
            surface,
            instance,
        })
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    #[inline]
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// The surface together with its loader, as swapchain calls expect it.
    #[inline]
    pub fn surface_support(&self) -> SurfaceSupport<'_> {
        SurfaceSupport {
            surface: self.surface.handle(),
            loader: self.surface.loader(),
        }
    }
}
