//! The logical device, its queues and the memory allocator.
//!
//! A presentable device enables `VK_KHR_swapchain` and fetches a present
//! queue; a headless one uses the graphics queue for everything. Every GPU
//! object in the renderer holds an `Arc<Device>`, so the device is destroyed
//! only after the last of them.

use std::ffi::{CStr, c_char};
use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use toybox_core::fatal_error;
use tracing::{debug, error, info};

use crate::error::RhiResult;
use crate::instance::Instance;
use crate::physical_device::{PhysicalDeviceInfo, QueueFamilyIndices};

/// Extensions a device needs to own a swapchain.
pub const SWAPCHAIN_EXTENSIONS: &[&CStr] = &[ash::khr::swapchain::NAME];

static PRIORITY: [f32; 1] = [1.0];

/// One queue per distinct family.
pub fn queue_create_infos(indices: &QueueFamilyIndices) -> Vec<vk::DeviceQueueCreateInfo<'static>> {
    indices
        .queue_create_plan()
        .into_iter()
        .map(|family| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(family)
                .queue_priorities(&PRIORITY)
        })
        .collect()
}

#[derive(Clone, Copy, Debug)]
struct Queues {
    graphics_family: u32,
    graphics: vk::Queue,
    /// Same handle as `graphics` when the families coincide or headless.
    present: vk::Queue,
}

pub struct Device {
    device: ash::Device,
    instance: ash::Instance,
    physical: PhysicalDeviceInfo,
    /// Torn down by hand before `device`.
    allocator: ManuallyDrop<Mutex<Allocator>>,
    queues: Queues,
    presentable: bool,
}

impl Device {
    /// Device that can drive a swapchain on the surface `physical` was
    /// selected for.
    pub fn new(instance: &Instance, physical: &PhysicalDeviceInfo) -> RhiResult<Arc<Self>> {
        Self::create(instance, physical, true)
    }

    /// Device for off-screen work such as upload tests.
    pub fn new_headless(instance: &Instance, physical: &PhysicalDeviceInfo) -> RhiResult<Arc<Self>> {
        Self::create(instance, physical, false)
    }

    fn create(
        instance: &Instance,
        physical: &PhysicalDeviceInfo,
        presentable: bool,
    ) -> RhiResult<Arc<Self>> {
        let families = physical.queue_families;
        let graphics_family = families.graphics_family.ok_or_else(|| {
            fatal_error!("GPU has a graphics queue", "{} has no graphics queue", physical.name())
        })?;
        let present_family = if presentable {
            families.present_family.ok_or_else(|| {
                fatal_error!(
                    "GPU can present",
                    "{} cannot present to the window surface",
                    physical.name()
                )
            })?
        } else {
            graphics_family
        };

        let queue_infos = queue_create_infos(&families);
        let extensions: Vec<*const c_char> = if presentable {
            SWAPCHAIN_EXTENSIONS.iter().map(|name| name.as_ptr()).collect()
        } else {
            Vec::new()
        };
        let features = vk::PhysicalDeviceFeatures::default().sampler_anisotropy(true);

        let info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&features);
        let device = unsafe {
            instance
                .handle()
                .create_device(physical.device, &info, None)?
        };

        let queues = unsafe {
            Queues {
                graphics_family,
                graphics: device.get_device_queue(graphics_family, 0),
                present: device.get_device_queue(present_family, 0),
            }
        };

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.handle().clone(),
            device: device.clone(),
            physical_device: physical.device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        });
        let allocator = match allocator {
            Ok(allocator) => allocator,
            Err(err) => {
                unsafe { device.destroy_device(None) };
                return Err(err.into());
            }
        };

        info!(
            "Device ready on {}: graphics family {}, present family {}{}",
            physical.name(),
            graphics_family,
            present_family,
            if presentable { "" } else { " (headless)" }
        );

        Ok(Arc::new(Self {
            device,
            instance: instance.handle().clone(),
            physical: physical.clone(),
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            queues,
            presentable,
        }))
    }

    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    #[inline]
    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical.device
    }

    #[inline]
    pub fn physical_info(&self) -> &PhysicalDeviceInfo {
        &self.physical
    }

    #[inline]
    pub fn graphics_queue(&self) -> vk::Queue {
        self.queues.graphics
    }

    #[inline]
    pub fn present_queue(&self) -> vk::Queue {
        self.queues.present
    }

    #[inline]
    pub fn queue_families(&self) -> &QueueFamilyIndices {
        &self.physical.queue_families
    }

    #[inline]
    pub fn graphics_family(&self) -> u32 {
        self.queues.graphics_family
    }

    #[inline]
    pub fn is_presentable(&self) -> bool {
        self.presentable
    }

    /// Exclusive access to the allocator. A poisoned lock is taken over; the
    /// allocator's own bookkeeping is updated atomically per call.
    pub fn allocator(&self) -> MutexGuard<'_, Allocator> {
        self.allocator.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
        unsafe {
            self.instance
                .get_physical_device_format_properties(self.physical.device, format)
        }
    }

    /// Blocks until every queue has drained.
    pub fn wait_idle(&self) -> RhiResult<()> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }

    /// # Safety
    ///
    /// Command buffers must be fully recorded, and `fence`, when not null,
    /// unsignalled and not pending elsewhere.
    pub unsafe fn submit_graphics(
        &self,
        submits: &[vk::SubmitInfo<'_>],
        fence: vk::Fence,
    ) -> RhiResult<()> {
        unsafe { self.device.queue_submit(self.queues.graphics, submits, fence)? };
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            if let Err(err) = self.device.device_wait_idle() {
                error!("Device did not go idle before teardown: {}", err);
            }
            // Memory blocks are returned through the device.
            ManuallyDrop::drop(&mut self.allocator);
            self.device.destroy_device(None);
        }
        debug!("Device released");
    }
}

// SAFETY: the ash tables are plain function pointers, queues are handles
// submitted to from the render thread only, and the allocator is locked.
unsafe impl Send for Device {}
unsafe impl Sync for Device {}

#[cfg(test)]
mod tests {
    use super::*;

    fn families(graphics: u32, present: u32) -> QueueFamilyIndices {
        QueueFamilyIndices {
            graphics_family: Some(graphics),
            present_family: Some(present),
        }
    }

    #[test]
    fn test_shared_family_gets_one_queue() {
        let infos = queue_create_infos(&families(0, 0));
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].queue_family_index, 0);
        assert_eq!(infos[0].queue_count, 1);
    }

    #[test]
    fn test_split_families_get_a_queue_each() {
        let infos = queue_create_infos(&families(0, 2));
        let indices: Vec<u32> = infos.iter().map(|info| info.queue_family_index).collect();
        assert_eq!(indices, vec![0, 2]);
    }

    #[test]
    fn test_device_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Device>();
    }
}
