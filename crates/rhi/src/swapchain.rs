//! The presentation chain and the choices that shape it.
//!
//! [`Swapchain`] owns the VkSwapchainKHR and one colour view per image. It is
//! rebuilt in place through [`Swapchain::recreate`], handing the old handle to
//! the driver as `old_swapchain`.
//!
//! Acquire and present never report out-of-date or suboptimal surfaces as
//! errors. They return [`AcquireOutcome::OutOfDate`] and
//! [`PresentOutcome::Stale`] instead, leaving the caller to schedule a rebuild.

use std::sync::Arc;

use ash::vk;
use toybox_core::PresentModePreference;
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::image::ImageView;
use crate::instance::Instance;
use crate::physical_device::SurfaceSupport;

/// What a surface offers a given physical device at one point in time.
#[derive(Debug, Clone)]
pub struct SurfaceSnapshot {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSnapshot {
    pub fn query(
        loader: &ash::khr::surface::Instance,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> RhiResult<Self> {
        unsafe {
            Ok(Self {
                capabilities: loader
                    .get_physical_device_surface_capabilities(physical_device, surface)?,
                formats: loader.get_physical_device_surface_formats(physical_device, surface)?,
                present_modes: loader
                    .get_physical_device_surface_present_modes(physical_device, surface)?,
            })
        }
    }

    /// A chain needs at least one format and one present mode.
    #[inline]
    pub fn can_present(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// `suboptimal` still allows drawing; rebuild after presenting.
    Acquired { image_index: u32, suboptimal: bool },
    /// Nothing may be drawn until the chain is rebuilt.
    OutOfDate,
}

impl AcquireOutcome {
    pub fn from_raw(result: Result<(u32, bool), vk::Result>) -> RhiResult<Self> {
        match result {
            Ok((image_index, suboptimal)) => Ok(Self::Acquired {
                image_index,
                suboptimal,
            }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Self::OutOfDate),
            Err(err) => Err(err.into()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    /// Out of date or suboptimal.
    Stale,
}

impl PresentOutcome {
    pub fn from_raw(result: Result<bool, vk::Result>) -> RhiResult<Self> {
        match result {
            Ok(false) => Ok(Self::Presented),
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Self::Stale),
            Err(err) => Err(err.into()),
        }
    }
}

/// The parts of a chain that change on every rebuild.
struct Chain {
    handle: vk::SwapchainKHR,
    image_count: usize,
    views: Vec<ImageView>,
    surface_format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
}

pub struct Swapchain {
    device: Arc<Device>,
    loader: ash::khr::swapchain::Device,
    chain: Chain,
    preference: PresentModePreference,
}

impl Swapchain {
    /// Builds the first chain for `surface`.
    ///
    /// `desired_extent` is the window's framebuffer size and only matters when
    /// the surface lets the application pick. `preference` is kept for every
    /// later rebuild.
    ///
    /// # Errors
    ///
    /// Fails when the surface offers nothing usable, when its extent is zero,
    /// or when the driver rejects the chain.
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface: SurfaceSupport<'_>,
        desired_extent: vk::Extent2D,
        preference: PresentModePreference,
    ) -> RhiResult<Self> {
        let loader = ash::khr::swapchain::Device::new(instance.handle(), device.handle());
        let chain = build_chain(
            &device,
            &loader,
            surface,
            desired_extent,
            preference,
            vk::SwapchainKHR::null(),
        )?;

        Ok(Self {
            device,
            loader,
            chain,
            preference,
        })
    }

    /// Replaces the chain with one matching the surface's current state.
    ///
    /// Framebuffers over the old views must already be gone. If this fails
    /// the driver has retired the old chain too, so the error is fatal to the
    /// caller.
    pub fn recreate(
        &mut self,
        surface: SurfaceSupport<'_>,
        desired_extent: vk::Extent2D,
    ) -> RhiResult<()> {
        self.device.wait_idle()?;

        let fresh = build_chain(
            &self.device,
            &self.loader,
            surface,
            desired_extent,
            self.preference,
            self.chain.handle,
        )?;
        let mut retired = std::mem::replace(&mut self.chain, fresh);
        destroy_chain(&self.loader, &mut retired);

        info!(
            "Swapchain rebuilt at {}x{} with {} images",
            self.chain.extent.width, self.chain.extent.height, self.chain.image_count
        );
        Ok(())
    }

    /// The extent a rebuild would get right now. Zero area means minimised.
    pub fn query_extent(
        &self,
        surface: SurfaceSupport<'_>,
        desired_extent: vk::Extent2D,
    ) -> RhiResult<vk::Extent2D> {
        let capabilities = unsafe {
            surface.loader.get_physical_device_surface_capabilities(
                self.device.physical_device(),
                surface.surface,
            )?
        };
        Ok(resolve_extent(&capabilities, desired_extent))
    }

    /// Blocks until an image is free; `signal` fires when it can be written.
    pub fn acquire_next_image(&self, signal: vk::Semaphore) -> RhiResult<AcquireOutcome> {
        AcquireOutcome::from_raw(unsafe {
            self.loader
                .acquire_next_image(self.chain.handle, u64::MAX, signal, vk::Fence::null())
        })
    }

    /// Queues `image_index` for display after `wait` is signalled.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> RhiResult<PresentOutcome> {
        let waits = [wait];
        let chains = [self.chain.handle];
        let indices = [image_index];
        let info = vk::PresentInfoKHR::default()
            .wait_semaphores(&waits)
            .swapchains(&chains)
            .image_indices(&indices);

        PresentOutcome::from_raw(unsafe { self.loader.queue_present(queue, &info) })
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.chain.surface_format.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.chain.extent
    }

    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.chain.present_mode
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.chain.image_count
    }

    /// One view per swapchain image, in image-index order.
    #[inline]
    pub fn image_views(&self) -> &[ImageView] {
        &self.chain.views
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        destroy_chain(&self.loader, &mut self.chain);
        debug!(
            "Swapchain released ({}x{})",
            self.chain.extent.width, self.chain.extent.height
        );
    }
}

fn build_chain(
    device: &Arc<Device>,
    loader: &ash::khr::swapchain::Device,
    surface: SurfaceSupport<'_>,
    desired_extent: vk::Extent2D,
    preference: PresentModePreference,
    old: vk::SwapchainKHR,
) -> RhiResult<Chain> {
    let snapshot = SurfaceSnapshot::query(surface.loader, device.physical_device(), surface.surface)?;
    if !snapshot.can_present() {
        return Err(RhiError::SurfaceError(
            "surface reports no formats or present modes".to_string(),
        ));
    }

    let surface_format = pick_surface_format(&snapshot.formats);
    let present_mode = pick_present_mode(&snapshot.present_modes, preference);
    let extent = resolve_extent(&snapshot.capabilities, desired_extent);
    let min_images = image_count_for(&snapshot.capabilities);

    if extent.width == 0 || extent.height == 0 {
        return Err(RhiError::SurfaceError(format!(
            "cannot build a {}x{} swapchain",
            extent.width, extent.height
        )));
    }

    let families = device.queue_families();
    let family_indices = families.queue_create_plan();
    let sharing = if families.is_split() {
        vk::SharingMode::CONCURRENT
    } else {
        vk::SharingMode::EXCLUSIVE
    };
    let shared: &[u32] = if families.is_split() { &family_indices } else { &[] };

    let info = vk::SwapchainCreateInfoKHR::default()
        .surface(surface.surface)
        .min_image_count(min_images)
        .image_format(surface_format.format)
        .image_color_space(surface_format.color_space)
        .image_extent(extent)
        .image_array_layers(1)
        .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
        .image_sharing_mode(sharing)
        .queue_family_indices(shared)
        .pre_transform(snapshot.capabilities.current_transform)
        .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
        .present_mode(present_mode)
        .clipped(true)
        .old_swapchain(old);

    let handle = unsafe { loader.create_swapchain(&info, None)? };

    let views = unsafe { loader.get_swapchain_images(handle) }
        .map_err(RhiError::from)
        .and_then(|images| {
            images
                .into_iter()
                .map(|image| {
                    ImageView::new(
                        device.clone(),
                        image,
                        surface_format.format,
                        vk::ImageAspectFlags::COLOR,
                        1,
                    )
                })
                .collect::<RhiResult<Vec<_>>>()
        });
    let views = match views {
        Ok(views) => views,
        Err(err) => {
            unsafe { loader.destroy_swapchain(handle, None) };
            return Err(err);
        }
    };

    info!(
        "Swapchain {}x{} {:?}/{:?}, {:?}, {} images{}",
        extent.width,
        extent.height,
        surface_format.format,
        surface_format.color_space,
        present_mode,
        views.len(),
        if families.is_split() { ", concurrent sharing" } else { "" }
    );

    Ok(Chain {
        handle,
        image_count: views.len(),
        views,
        surface_format,
        extent,
        present_mode,
    })
}

/// Views go before the chain that owns their images.
fn destroy_chain(loader: &ash::khr::swapchain::Device, chain: &mut Chain) {
    chain.views.clear();
    if chain.handle != vk::SwapchainKHR::null() {
        unsafe { loader.destroy_swapchain(chain.handle, None) };
        chain.handle = vk::SwapchainKHR::null();
    }
}

/// B8G8R8A8_SRGB in the sRGB non-linear space when offered, otherwise
/// whatever the surface lists first.
pub fn pick_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    const PREFERRED: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
        format: vk::Format::B8G8R8A8_SRGB,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    };

    if formats.contains(&PREFERRED) {
        return PREFERRED;
    }
    match formats.first() {
        Some(&first) => {
            warn!("Preferred surface format missing, using {:?}", first.format);
            first
        }
        None => PREFERRED,
    }
}

/// The configured mode when the surface offers it; FIFO otherwise.
pub fn pick_present_mode(
    offered: &[vk::PresentModeKHR],
    preference: PresentModePreference,
) -> vk::PresentModeKHR {
    let wanted = match preference {
        PresentModePreference::Mailbox => vk::PresentModeKHR::MAILBOX,
        PresentModePreference::Fifo => vk::PresentModeKHR::FIFO,
        PresentModePreference::Immediate => vk::PresentModeKHR::IMMEDIATE,
    };
    if offered.contains(&wanted) {
        return wanted;
    }
    debug!("{:?} not offered, presenting with FIFO", wanted);
    vk::PresentModeKHR::FIFO
}

/// The surface's current extent, unless it is the `u32::MAX` "you choose"
/// marker, in which case `desired` is clamped into the allowed range.
pub fn resolve_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    desired: vk::Extent2D,
) -> vk::Extent2D {
    let current = capabilities.current_extent;
    if current.width != u32::MAX {
        return current;
    }

    let (min, max) = (capabilities.min_image_extent, capabilities.max_image_extent);
    vk::Extent2D {
        width: desired.width.clamp(min.width, max.width),
        height: desired.height.clamp(min.height, max.height),
    }
}

/// Minimum plus one, within the maximum when the surface sets one.
pub fn image_count_for(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let wanted = capabilities.min_image_count + 1;
    match capabilities.max_image_count {
        0 => wanted,
        max => wanted.min(max),
    }
}
