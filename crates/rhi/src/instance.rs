//! VkInstance ownership and validation-layer wiring.
//!
//! The window layer supplies the surface extensions it needs; with none the
//! instance is headless and can still create devices and upload resources.
//! Validation follows [`ValidationMode`]: `Required` without the Khronos
//! layer installed is a fatal setup error, `Preferred` degrades with a warning.

use std::borrow::Cow;
use std::ffi::{CStr, CString, c_char, c_void};

use ash::{Entry, vk};
use toybox_core::{FatalError, ValidationMode, fatal_error};
use tracing::{debug, error, info, warn};

use crate::error::{RhiError, RhiResult};

const KHRONOS_VALIDATION: &CStr = c"VK_LAYER_KHRONOS_validation";
const ENGINE_NAME: &CStr = c"ToyBox";

/// Core 1.0 plus `VK_KHR_swapchain` covers everything the renderer records.
pub const TARGET_API_VERSION: u32 = vk::API_VERSION_1_0;

#[derive(Clone, Debug)]
pub struct InstanceDesc {
    pub application_name: String,
    pub validation: ValidationMode,
}

impl Default for InstanceDesc {
    fn default() -> Self {
        Self {
            application_name: "ToyBox".to_string(),
            validation: ValidationMode::default(),
        }
    }
}

/// Decides whether to enable validation given the policy and whether the
/// layer is installed.
pub fn resolve_validation(mode: ValidationMode, layer_installed: bool) -> Result<bool, FatalError> {
    match (mode, layer_installed) {
        (ValidationMode::Disabled, _) => Ok(false),
        (_, true) => Ok(true),
        (ValidationMode::Required, false) => Err(fatal_error!(
            "validation layer available",
            "{} was required but is not installed",
            KHRONOS_VALIDATION.to_string_lossy()
        )),
        (ValidationMode::Preferred, false) => {
            warn!("Validation layer not installed, running without it");
            Ok(false)
        }
    }
}

/// Debug-utils loader and the messenger registered through it.
struct DebugMessenger {
    loader: ash::ext::debug_utils::Instance,
    handle: vk::DebugUtilsMessengerEXT,
}

impl DebugMessenger {
    fn new(entry: &Entry, instance: &ash::Instance) -> RhiResult<Self> {
        let loader = ash::ext::debug_utils::Instance::new(entry, instance);
        let info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(forward_to_tracing));
        let handle = unsafe { loader.create_debug_utils_messenger(&info, None)? };
        Ok(Self { loader, handle })
    }

    /// # Safety
    ///
    /// Must run before the owning instance is destroyed.
    unsafe fn destroy(&self) {
        unsafe { self.loader.destroy_debug_utils_messenger(self.handle, None) };
    }
}

pub struct Instance {
    entry: Entry,
    instance: ash::Instance,
    messenger: Option<DebugMessenger>,
    presentable: bool,
}

impl Instance {
    /// Loads the Vulkan library and creates an instance at [`TARGET_API_VERSION`].
    ///
    /// `surface_extensions` comes from the window; pass `&[]` for a headless
    /// instance.
    ///
    /// # Errors
    ///
    /// - [`RhiError::LoadingError`] when no Vulkan loader is installed
    /// - a fatal error when validation is required but missing
    /// - the driver's error when instance or messenger creation fails
    pub fn new(desc: &InstanceDesc, surface_extensions: &[*const c_char]) -> RhiResult<Self> {
        let entry = unsafe { Entry::load()? };

        let layer_installed = desc.validation != ValidationMode::Disabled
            && validation_layer_installed(&entry)?;
        let validate = resolve_validation(desc.validation, layer_installed)?;

        let app_name = CString::new(desc.application_name.as_str())
            .map_err(|_| RhiError::InvalidHandle("application name contains NUL".to_string()))?;
        let version = vk::make_api_version(0, 1, 0, 0);
        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .application_version(version)
            .engine_name(ENGINE_NAME)
            .engine_version(version)
            .api_version(TARGET_API_VERSION);

        let mut extensions = surface_extensions.to_vec();
        let mut layers = Vec::new();
        if validate {
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
            layers.push(KHRONOS_VALIDATION.as_ptr());
        }

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);
        let instance = unsafe { entry.create_instance(&create_info, None)? };

        let messenger = if validate {
            match DebugMessenger::new(&entry, &instance) {
                Ok(messenger) => Some(messenger),
                Err(err) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(err);
                }
            }
        } else {
            None
        };

        let presentable = !surface_extensions.is_empty();
        info!(
            "Instance for '{}' ready: {} extension(s), validation {}, {}",
            desc.application_name,
            extensions.len(),
            if validate { "on" } else { "off" },
            if presentable { "windowed" } else { "headless" }
        );

        Ok(Self {
            entry,
            instance,
            messenger,
            presentable,
        })
    }

    #[inline]
    pub fn handle(&self) -> &ash::Instance {
        &self.instance
    }

    #[inline]
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    #[inline]
    pub fn has_validation(&self) -> bool {
        self.messenger.is_some()
    }

    /// False for headless instances, which cannot own a surface.
    #[inline]
    pub fn is_presentable(&self) -> bool {
        self.presentable
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            if let Some(messenger) = &self.messenger {
                messenger.destroy();
            }
            self.instance.destroy_instance(None);
        }
        debug!("Instance released");
    }
}

fn validation_layer_installed(entry: &Entry) -> RhiResult<bool> {
    let layers = unsafe { entry.enumerate_instance_layer_properties()? };
    Ok(layers
        .iter()
        .any(|layer| layer.layer_name_as_c_str().is_ok_and(|name| name == KHRONOS_VALIDATION)))
}

/// Logs layer messages under the `vulkan` target at the matching level.
unsafe extern "system" fn forward_to_tracing(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    kind: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user: *mut c_void,
) -> vk::Bool32 {
    let Some(data) = (unsafe { data.as_ref() }) else {
        return vk::FALSE;
    };
    let text = unsafe { data.message_as_c_str() }
        .map(CStr::to_string_lossy)
        .unwrap_or(Cow::Borrowed("<empty>"));
    let id = unsafe { data.message_id_name_as_c_str() }
        .map(CStr::to_string_lossy)
        .unwrap_or(Cow::Borrowed("-"));

    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!(target: "vulkan", "[{:?}] {}: {}", kind, id, text);
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!(target: "vulkan", "[{:?}] {}: {}", kind, id, text);
    } else {
        info!(target: "vulkan", "[{:?}] {}: {}", kind, id, text);
    }
    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_never_validates() {
        assert!(!resolve_validation(ValidationMode::Disabled, true).unwrap());
        assert!(!resolve_validation(ValidationMode::Disabled, false).unwrap());
    }

    #[test]
    fn test_installed_layer_is_used() {
        assert!(resolve_validation(ValidationMode::Preferred, true).unwrap());
        assert!(resolve_validation(ValidationMode::Required, true).unwrap());
    }

    #[test]
    fn test_preferred_degrades_when_missing() {
        assert!(!resolve_validation(ValidationMode::Preferred, false).unwrap());
    }

    #[test]
    fn test_required_but_missing_is_fatal() {
        let err = resolve_validation(ValidationMode::Required, false).unwrap_err();
        assert!(err.message().contains("VK_LAYER_KHRONOS_validation"));
    }

    #[test]
    fn test_headless_instance() {
        let desc = InstanceDesc {
            application_name: "toybox-tests".to_string(),
            validation: ValidationMode::Disabled,
        };
        match Instance::new(&desc, &[]) {
            Ok(instance) => {
                assert!(!instance.has_validation());
                assert!(!instance.is_presentable());
            }
            Err(RhiError::LoadingError(_)) => eprintln!("Skipping test: Vulkan not available"),
            Err(e) => panic!("Unexpected error: {:?}", e),
        }
    }
}
