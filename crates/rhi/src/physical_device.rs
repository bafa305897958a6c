//! GPU selection.
//!
//! Each enumerated GPU is either rejected with a [`Rejection`] reason or
//! scored; the best score wins, discrete GPUs first. When a surface is given
//! the GPU must also present to it through `VK_KHR_swapchain`. No candidate
//! at all is a fatal setup error.

use std::ffi::CStr;
use std::fmt;

use ash::vk;
use toybox_core::fatal_error;
use tracing::{debug, info};

use crate::error::RhiResult;
use crate::instance::{Instance, TARGET_API_VERSION};
use crate::swapchain::SurfaceSnapshot;

/// Graphics and present family of one GPU; they may coincide.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics_family: Option<u32>,
    pub present_family: Option<u32>,
}

impl QueueFamilyIndices {
    /// Headless devices pass `needs_present = false`.
    #[inline]
    pub fn is_complete(&self, needs_present: bool) -> bool {
        self.graphics_family.is_some() && (!needs_present || self.present_family.is_some())
    }

    /// Families to create queues on: graphics first, present only if it is
    /// a different family.
    pub fn queue_create_plan(&self) -> Vec<u32> {
        let mut plan: Vec<u32> = self.graphics_family.into_iter().collect();
        if let Some(present) = self.present_family
            && !plan.contains(&present)
        {
            plan.push(present);
        }
        plan
    }

    /// Swapchain images must then be shared concurrently.
    pub fn is_split(&self) -> bool {
        matches!(
            (self.graphics_family, self.present_family),
            (Some(g), Some(p)) if g != p
        )
    }
}

/// A surface together with the loader that can query it.
#[derive(Clone, Copy)]
pub struct SurfaceSupport<'a> {
    pub surface: vk::SurfaceKHR,
    pub loader: &'a ash::khr::surface::Instance,
}

/// Why a GPU was passed over.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rejection {
    NoGraphicsQueue,
    NoPresentQueue,
    NoSwapchainExtension,
    SurfaceUnusable,
    NoAnisotropy,
    ApiTooOld { major: u32, minor: u32 },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::NoGraphicsQueue => f.write_str("no graphics queue"),
            Rejection::NoPresentQueue => f.write_str("cannot present to the surface"),
            Rejection::NoSwapchainExtension => f.write_str("VK_KHR_swapchain missing"),
            Rejection::SurfaceUnusable => f.write_str("surface offers no format or present mode"),
            Rejection::NoAnisotropy => f.write_str("sampler anisotropy unsupported"),
            Rejection::ApiTooOld { major, minor } => {
                write!(f, "Vulkan {}.{} is older than the instance target", major, minor)
            }
        }
    }
}

/// Checks that need no surface: queues, features and API level.
pub fn check_core_requirements(
    families: &QueueFamilyIndices,
    needs_present: bool,
    features: &vk::PhysicalDeviceFeatures,
    api_version: u32,
) -> Result<(), Rejection> {
    if families.graphics_family.is_none() {
        return Err(Rejection::NoGraphicsQueue);
    }
    if needs_present && families.present_family.is_none() {
        return Err(Rejection::NoPresentQueue);
    }
    if features.sampler_anisotropy == vk::FALSE {
        return Err(Rejection::NoAnisotropy);
    }
    if api_version < TARGET_API_VERSION {
        return Err(Rejection::ApiTooOld {
            major: vk::api_version_major(api_version),
            minor: vk::api_version_minor(api_version),
        });
    }
    Ok(())
}

/// Everything kept about the chosen GPU.
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    pub device: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub features: vk::PhysicalDeviceFeatures,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub queue_families: QueueFamilyIndices,
}

impl PhysicalDeviceInfo {
    pub fn name(&self) -> &str {
        self.properties
            .device_name_as_c_str()
            .ok()
            .and_then(|name| name.to_str().ok())
            .unwrap_or("<unnamed GPU>")
    }

    pub fn kind(&self) -> &'static str {
        match self.properties.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => "discrete",
            vk::PhysicalDeviceType::INTEGRATED_GPU => "integrated",
            vk::PhysicalDeviceType::VIRTUAL_GPU => "virtual",
            vk::PhysicalDeviceType::CPU => "software",
            _ => "other",
        }
    }

    /// Sum of device-local heaps.
    pub fn vram_bytes(&self) -> u64 {
        let heaps = &self.memory_properties.memory_heaps
            [..self.memory_properties.memory_heap_count as usize];
        heaps
            .iter()
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size)
            .sum()
    }

    pub fn max_sampler_anisotropy(&self) -> f32 {
        self.properties.limits.max_sampler_anisotropy
    }

    pub fn score(&self) -> u64 {
        score(
            self.properties.device_type,
            self.properties.limits.max_image_dimension2_d,
            self.vram_bytes(),
        )
    }
}

impl fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let version = self.properties.api_version;
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.name())
            .field("kind", &self.kind())
            .field(
                "api",
                &format_args!(
                    "{}.{}",
                    vk::api_version_major(version),
                    vk::api_version_minor(version)
                ),
            )
            .field("queue_families", &self.queue_families)
            .finish()
    }
}

/// Device type dominates; texture limit and VRAM (in MiB, capped at 16000)
/// break ties.
pub fn score(kind: vk::PhysicalDeviceType, max_image_dimension: u32, vram_bytes: u64) -> u64 {
    let base = match kind {
        vk::PhysicalDeviceType::DISCRETE_GPU => 100_000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 10_000,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 1_000,
        vk::PhysicalDeviceType::CPU => 100,
        _ => 0,
    };
    base + u64::from(max_image_dimension) + (vram_bytes >> 20).min(16_000)
}

/// Picks the highest-scoring GPU that meets every requirement.
pub fn select_physical_device(
    instance: &Instance,
    surface: Option<SurfaceSupport<'_>>,
) -> RhiResult<PhysicalDeviceInfo> {
    let handles = unsafe { instance.handle().enumerate_physical_devices()? };
    let seen = handles.len();

    let best = handles
        .into_iter()
        .filter_map(|handle| match inspect(instance.handle(), handle, surface) {
            Ok(info) => {
                debug!("{} ({}) scores {}", info.name(), info.kind(), info.score());
                Some(info)
            }
            Err((name, reason)) => {
                debug!("{} rejected: {}", name, reason);
                None
            }
        })
        // max_by_key keeps the last maximum; reverse so ties go to the first GPU.
        .rev()
        .max_by_key(PhysicalDeviceInfo::score);

    let Some(info) = best else {
        return Err(fatal_error!(
            "suitable physical device",
            "none of {} GPU(s) offers graphics{} and sampler anisotropy",
            seen,
            if surface.is_some() { ", presentation" } else { "" }
        )
        .into());
    };

    info!("Using {} ({} GPU)", info.name(), info.kind());
    Ok(info)
}

fn inspect(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: Option<SurfaceSupport<'_>>,
) -> Result<PhysicalDeviceInfo, (String, Rejection)> {
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let features = unsafe { instance.get_physical_device_features(device) };
    let name = properties
        .device_name_as_c_str()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let reject = |reason| (name.clone(), reason);

    let queue_families = find_queue_families(instance, device, surface);
    check_core_requirements(
        &queue_families,
        surface.is_some(),
        &features,
        properties.api_version,
    )
    .map_err(reject)?;

    if let Some(support) = surface {
        if !supports_extensions(instance, device, crate::device::SWAPCHAIN_EXTENSIONS) {
            return Err(reject(Rejection::NoSwapchainExtension));
        }
        let usable = SurfaceSnapshot::query(support.loader, device, support.surface)
            .is_ok_and(|snapshot| snapshot.can_present());
        if !usable {
            return Err(reject(Rejection::SurfaceUnusable));
        }
    }

    Ok(PhysicalDeviceInfo {
        device,
        properties,
        features,
        memory_properties: unsafe { instance.get_physical_device_memory_properties(device) },
        queue_families,
    })
}

fn supports_extensions(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    required: &[&CStr],
) -> bool {
    let Ok(offered) = (unsafe { instance.enumerate_device_extension_properties(device) }) else {
        return false;
    };
    required.iter().all(|&wanted| {
        offered
            .iter()
            .any(|ext| ext.extension_name_as_c_str().is_ok_and(|name| name == wanted))
    })
}

fn find_queue_families(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: Option<SurfaceSupport<'_>>,
) -> QueueFamilyIndices {
    let properties = unsafe { instance.get_physical_device_queue_family_properties(device) };
    let can_present = |index: u32| {
        surface.is_some_and(|support| unsafe {
            support
                .loader
                .get_physical_device_surface_support(device, index, support.surface)
                .unwrap_or(false)
        })
    };

    let capabilities: Vec<(vk::QueueFlags, bool)> = properties
        .iter()
        .zip(0u32..)
        .map(|(family, index)| match family.queue_count {
            0 => (vk::QueueFlags::empty(), false),
            _ => (family.queue_flags, can_present(index)),
        })
        .collect();

    pick_queue_families(&capabilities)
}

/// A family doing both graphics and present wins; otherwise the first of
/// each kind.
pub fn pick_queue_families(families: &[(vk::QueueFlags, bool)]) -> QueueFamilyIndices {
    let draws = |flags: &vk::QueueFlags| flags.contains(vk::QueueFlags::GRAPHICS);
    let index = |position: Option<usize>| position.map(|i| i as u32);

    if let Some(both) = families
        .iter()
        .position(|(flags, present)| draws(flags) && *present)
    {
        return QueueFamilyIndices {
            graphics_family: Some(both as u32),
            present_family: Some(both as u32),
        };
    }

    QueueFamilyIndices {
        graphics_family: index(families.iter().position(|(flags, _)| draws(flags))),
        present_family: index(families.iter().position(|(_, present)| *present)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anisotropic() -> vk::PhysicalDeviceFeatures {
        vk::PhysicalDeviceFeatures::default().sampler_anisotropy(true)
    }

    fn families(graphics: Option<u32>, present: Option<u32>) -> QueueFamilyIndices {
        QueueFamilyIndices {
            graphics_family: graphics,
            present_family: present,
        }
    }

    #[test]
    fn test_headless_needs_only_graphics() {
        let indices = families(Some(1), None);
        assert!(indices.is_complete(false));
        assert!(!indices.is_complete(true));
        assert_eq!(indices.queue_create_plan(), vec![1]);
        assert!(QueueFamilyIndices::default().queue_create_plan().is_empty());
    }

    #[test]
    fn test_plan_deduplicates_shared_family() {
        let shared = families(Some(0), Some(0));
        assert_eq!(shared.queue_create_plan(), vec![0]);
        assert!(!shared.is_split());

        let split = families(Some(0), Some(2));
        assert_eq!(split.queue_create_plan(), vec![0, 2]);
        assert!(split.is_split());
    }

    #[test]
    fn test_pick_prefers_shared_family() {
        let offered = [
            (vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, false),
            (vk::QueueFlags::TRANSFER, true),
            (vk::QueueFlags::GRAPHICS, true),
        ];
        assert_eq!(pick_queue_families(&offered), families(Some(2), Some(2)));
    }

    #[test]
    fn test_pick_falls_back_to_split_families() {
        let offered = [
            (vk::QueueFlags::GRAPHICS, false),
            (vk::QueueFlags::COMPUTE, false),
            (vk::QueueFlags::TRANSFER, true),
        ];
        assert_eq!(pick_queue_families(&offered), families(Some(0), Some(2)));
    }

    #[test]
    fn test_core_requirements_accept_capable_gpu() {
        let result = check_core_requirements(
            &families(Some(0), Some(0)),
            true,
            &anisotropic(),
            vk::API_VERSION_1_3,
        );
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn test_core_requirements_accept_pre_1_3_gpu() {
        for version in [vk::API_VERSION_1_0, vk::API_VERSION_1_1, vk::API_VERSION_1_2] {
            let result =
                check_core_requirements(&families(Some(0), Some(0)), true, &anisotropic(), version);
            assert_eq!(result, Ok(()));
        }
    }

    #[test]
    fn test_core_requirements_report_first_failure() {
        let features = anisotropic();
        let v13 = vk::API_VERSION_1_3;
        assert_eq!(
            check_core_requirements(&families(None, Some(0)), true, &features, v13),
            Err(Rejection::NoGraphicsQueue)
        );
        assert_eq!(
            check_core_requirements(&families(Some(0), None), true, &features, v13),
            Err(Rejection::NoPresentQueue)
        );
        assert_eq!(
            check_core_requirements(
                &families(Some(0), None),
                false,
                &vk::PhysicalDeviceFeatures::default(),
                v13
            ),
            Err(Rejection::NoAnisotropy)
        );
        assert_eq!(
            check_core_requirements(
                &families(Some(0), None),
                false,
                &features,
                vk::make_api_version(0, 0, 9, 0)
            ),
            Err(Rejection::ApiTooOld { major: 0, minor: 9 })
        );
    }

    #[test]
    fn test_score_prefers_discrete() {
        let discrete = score(vk::PhysicalDeviceType::DISCRETE_GPU, 8192, 1 << 30);
        let integrated = score(vk::PhysicalDeviceType::INTEGRATED_GPU, 16384, 16 << 30);
        assert!(discrete > integrated);
        assert_eq!(
            score(vk::PhysicalDeviceType::CPU, 0, 64 << 30),
            100 + 16_000
        );
    }
}
