//! Instance creation, debug messenger, presentation surface and adapter selection.

use std::ffi::{c_char, CStr, CString};
use std::rc::Rc;
use ash::{vk, Entry, Instance};
use crate::adapter::{rank_adapters, AdapterInfo, AdapterKind, ApiVersion};
use crate::backend::{DeviceCapabilities, DeviceDesc, InstanceDesc, RhiInstance};
use crate::error::{RhiError, RhiResult, ResultExt};
use crate::types::WindowInfo;
use super::device::{QueueFamilies, VulkanDevice};
use super::Vulkan;

#[cfg(feature = "validation")]
const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Api version bonuses on top of the adapter kind score.
const VERSION_SCORES: [(ApiVersion, u32); 3] = [
    (ApiVersion::new(1, 2), 200),
    (ApiVersion::new(1, 3), 400),
    (ApiVersion::new(1, 4), 600),
];

/// Dynamic rendering and synchronization2 are core from here on.
const MIN_API_VERSION: ApiVersion = ApiVersion::new(1, 3);

const RAYTRACING_EXTENSIONS: [&CStr; 3] = [
    ash::khr::acceleration_structure::NAME,
    ash::khr::ray_tracing_pipeline::NAME,
    ash::khr::deferred_host_operations::NAME,
];

/// Instance level state shared with the device, which may outlive the [`VulkanInstance`].
pub(crate) struct InstanceShared {
    pub(crate) entry: Entry,
    pub(crate) instance: Instance,
    pub(crate) surface_loader: ash::khr::surface::Instance,
    pub(crate) surface: Option<vk::SurfaceKHR>,
    pub(crate) window: Option<WindowInfo>,
    pub(crate) debug_utils_enabled: bool,
    #[cfg(feature = "validation")]
    debug_messenger: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
}

impl Drop for InstanceShared {
    fn drop(&mut self) {
        unsafe {
            if let Some(surface) = self.surface {
                self.surface_loader.destroy_surface(surface, None);
            }

            #[cfg(feature = "validation")]
            if let Some((debug_utils, messenger)) = &self.debug_messenger {
                debug_utils.destroy_debug_utils_messenger(*messenger, None);
            }

            self.instance.destroy_instance(None);
        }
    }
}

/// One physical device with everything the device creation needs.
#[derive(Clone)]
pub(crate) struct PhysicalAdapter {
    pub(crate) handle: vk::PhysicalDevice,
    pub(crate) info: AdapterInfo,
    pub(crate) properties: vk::PhysicalDeviceProperties,
    pub(crate) memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub(crate) features: vk::PhysicalDeviceFeatures,
    pub(crate) queue_families: Option<QueueFamilies>,
    pub(crate) extensions: Vec<CString>,
}

impl PhysicalAdapter {
    pub(crate) fn supports_extension(&self, name: &CStr) -> bool {
        self.extensions.iter().any(|ext| ext.as_c_str() == name)
    }
}

pub struct VulkanInstance {
    shared: Rc<InstanceShared>,
    adapters: Vec<PhysicalAdapter>,
}

impl VulkanInstance {
    #[inline]
    pub fn handle(&self) -> &Instance {
        &self.shared.instance
    }
}

impl RhiInstance<Vulkan> for VulkanInstance {
    #[profiling::function]
    fn new(desc: &InstanceDesc) -> RhiResult<Self> {
        let entry = unsafe { Entry::load() }.map_err(|e| RhiError::backend("loading the vulkan library", e))?;

        let enable_validation = desc.enable_validation && cfg!(feature = "validation") && has_validation_layer(&entry);
        let instance = create_instance(&entry, desc, enable_validation)?;

        #[cfg(feature = "validation")]
        let debug_messenger = if enable_validation {
            Some(setup_debug_messenger(&entry, &instance)?)
        } else {
            None
        };

        let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);
        let surface = match &desc.window {
            Some(window) => Some(
                unsafe {
                    ash_window::create_surface(&entry, &instance, window.display_handle, window.window_handle, None)
                }
                .context("vkCreateSurfaceKHR")?,
            ),
            None => None,
        };

        let shared = Rc::new(InstanceShared {
            entry,
            instance,
            surface_loader,
            surface,
            window: desc.window,
            debug_utils_enabled: enable_validation,
            #[cfg(feature = "validation")]
            debug_messenger,
        });

        let adapters = collect_adapters(&shared)?;
        for adapter in &adapters {
            log::info!(
                "Found GPU: {} (score: {}, type: {:?}, vulkan {}.{})",
                adapter.info.name,
                adapter.info.score(&VERSION_SCORES),
                adapter.info.kind,
                adapter.info.api_version.major,
                adapter.info.api_version.minor
            );
        }

        Ok(Self { shared, adapters })
    }

    fn enumerate_adapters(&self) -> RhiResult<Vec<AdapterInfo>> {
        Ok(self.adapters.iter().map(|adapter| adapter.info.clone()).collect())
    }

    #[profiling::function]
    fn create_device(&self, desc: &DeviceDesc) -> RhiResult<VulkanDevice> {
        let adapter = self
            .adapters
            .iter()
            .find(|adapter| adapter.info.usable)
            .ok_or(RhiError::NoSuitableAdapter)?;

        let capabilities = capabilities(&self.shared, adapter);
        if desc.use_raytracing {
            capabilities.require_raytracing()?;
        }
        if desc.use_hdr && !capabilities.is_supported_hdr() {
            log::warn!("HDR output requested but {} has no HDR surface format, falling back to SDR", adapter.info.name);
        }

        log::info!("Selected GPU: {}", adapter.info.name);
        VulkanDevice::new(self.shared.clone(), adapter, capabilities, desc)
    }
}

fn has_validation_layer(entry: &Entry) -> bool {
    #[cfg(feature = "validation")]
    {
        let layers = unsafe { entry.enumerate_instance_layer_properties() }.unwrap_or_default();
        let found = layers
            .iter()
            .any(|layer| layer.layer_name_as_c_str().is_ok_and(|name| name == VALIDATION_LAYER));
        if !found {
            log::warn!("Vulkan validation requested but {VALIDATION_LAYER:?} is not installed");
        }
        found
    }

    #[cfg(not(feature = "validation"))]
    {
        let _ = entry;
        false
    }
}

fn create_instance(entry: &Entry, desc: &InstanceDesc, enable_validation: bool) -> RhiResult<Instance> {
    let app_name = CString::new(desc.application_name.as_str()).unwrap_or_default();

    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, 1, 0, 0))
        .engine_name(c"Prism")
        .engine_version(vk::make_api_version(0, 1, 0, 0))
        .api_version(vk::API_VERSION_1_3);

    let mut extensions: Vec<*const c_char> = vec![ash::khr::surface::NAME.as_ptr()];
    if let Some(window) = &desc.window {
        let platform = ash_window::enumerate_required_extensions(window.display_handle)
            .context("enumerating surface extensions")?;
        for &ext in platform {
            if !extensions.contains(&ext) {
                extensions.push(ext);
            }
        }
    }

    let available = unsafe { entry.enumerate_instance_extension_properties(None) }.unwrap_or_default();
    // needed for the HDR color spaces
    if available
        .iter()
        .any(|ext| ext.extension_name_as_c_str().is_ok_and(|name| name == ash::ext::swapchain_colorspace::NAME))
    {
        extensions.push(ash::ext::swapchain_colorspace::NAME.as_ptr());
    }

    let mut layers: Vec<*const c_char> = Vec::new();
    if enable_validation {
        extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        #[cfg(feature = "validation")]
        layers.push(VALIDATION_LAYER.as_ptr());
    }

    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(&extensions)
        .enabled_layer_names(&layers);

    unsafe { entry.create_instance(&create_info, None) }.context("vkCreateInstance")
}

#[cfg(feature = "validation")]
fn setup_debug_messenger(
    entry: &Entry,
    instance: &Instance,
) -> RhiResult<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)> {
    let debug_utils = ash::ext::debug_utils::Instance::new(entry, instance);

    let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(vulkan_debug_callback));

    let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
        .context("vkCreateDebugUtilsMessengerEXT")?;
    Ok((debug_utils, messenger))
}

#[cfg(feature = "validation")]
unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let callback_data = unsafe { *p_callback_data };
    let message = unsafe { CStr::from_ptr(callback_data.p_message) }.to_string_lossy();

    let type_str = match message_type {
        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL => "[General]",
        vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION => "[Validation]",
        vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE => "[Performance]",
        _ => "[Unknown]",
    };

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => log::error!("Vulkan {}: {}", type_str, message),
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => log::warn!("Vulkan {}: {}", type_str, message),
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => log::info!("Vulkan {}: {}", type_str, message),
        _ => log::debug!("Vulkan {}: {}", type_str, message),
    }

    vk::FALSE
}

/// Graphics family that can present, dedicated async compute and transfer families when the
/// adapter has them.
fn find_queue_families(shared: &InstanceShared, physical_device: vk::PhysicalDevice) -> Option<QueueFamilies> {
    let families = unsafe { shared.instance.get_physical_device_queue_family_properties(physical_device) };

    let can_present = |index: u32| match shared.surface {
        Some(surface) => unsafe {
            shared
                .surface_loader
                .get_physical_device_surface_support(physical_device, index, surface)
                .unwrap_or(false)
        },
        None => true,
    };

    let graphics = families
        .iter()
        .enumerate()
        .position(|(index, family)| family.queue_flags.contains(vk::QueueFlags::GRAPHICS) && can_present(index as u32))?
        as u32;

    let compute = families
        .iter()
        .position(|family| {
            family.queue_flags.contains(vk::QueueFlags::COMPUTE) && !family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
        })
        .map_or(graphics, |index| index as u32);

    let copy = families
        .iter()
        .position(|family| {
            family.queue_flags.contains(vk::QueueFlags::TRANSFER)
                && !family.queue_flags.intersects(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)
        })
        .map_or(compute, |index| index as u32);

    Some(QueueFamilies { graphics, compute, copy })
}

fn adapter_kind(device_type: vk::PhysicalDeviceType) -> AdapterKind {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => AdapterKind::Discrete,
        vk::PhysicalDeviceType::INTEGRATED_GPU => AdapterKind::Integrated,
        vk::PhysicalDeviceType::VIRTUAL_GPU => AdapterKind::Virtual,
        vk::PhysicalDeviceType::CPU => AdapterKind::Cpu,
        _ => AdapterKind::Other,
    }
}

fn collect_adapters(shared: &InstanceShared) -> RhiResult<Vec<PhysicalAdapter>> {
    let physical_devices = unsafe { shared.instance.enumerate_physical_devices() }.context("vkEnumeratePhysicalDevices")?;
    if physical_devices.is_empty() {
        return Err(RhiError::NoSuitableAdapter);
    }

    let mut adapters: Vec<PhysicalAdapter> = physical_devices
        .into_iter()
        .map(|handle| {
            let properties = unsafe { shared.instance.get_physical_device_properties(handle) };
            let memory_properties = unsafe { shared.instance.get_physical_device_memory_properties(handle) };
            let features = unsafe { shared.instance.get_physical_device_features(handle) };
            let extensions: Vec<CString> = unsafe { shared.instance.enumerate_device_extension_properties(handle) }
                .unwrap_or_default()
                .iter()
                .filter_map(|ext| ext.extension_name_as_c_str().ok().map(CStr::to_owned))
                .collect();
            let queue_families = find_queue_families(shared, handle);

            let api_version = ApiVersion::new(
                vk::api_version_major(properties.api_version),
                vk::api_version_minor(properties.api_version),
            );
            let has_swapchain = shared.surface.is_none()
                || extensions.iter().any(|ext| ext.as_c_str() == ash::khr::swapchain::NAME);

            let dedicated_video_memory = memory_properties.memory_heaps[..memory_properties.memory_heap_count as usize]
                .iter()
                .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
                .map(|heap| heap.size)
                .sum();

            let name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
                .to_string_lossy()
                .into_owned();

            PhysicalAdapter {
                handle,
                info: AdapterInfo {
                    name,
                    vendor_id: properties.vendor_id,
                    device_id: properties.device_id,
                    kind: adapter_kind(properties.device_type),
                    dedicated_video_memory,
                    api_version,
                    usable: queue_families.is_some() && has_swapchain && api_version >= MIN_API_VERSION,
                },
                properties,
                memory_properties,
                features,
                queue_families,
                extensions,
            }
        })
        .collect();

    // rank the infos, then reorder the adapters the same way
    let mut infos: Vec<AdapterInfo> = adapters.iter().map(|adapter| adapter.info.clone()).collect();
    rank_adapters(&mut infos, &VERSION_SCORES);
    let mut ranked = Vec::with_capacity(adapters.len());
    for info in infos {
        if let Some(index) = adapters.iter().position(|adapter| adapter.info == info) {
            ranked.push(adapters.swap_remove(index));
        }
    }
    Ok(ranked)
}

fn capabilities(shared: &InstanceShared, adapter: &PhysicalAdapter) -> DeviceCapabilities {
    let hdr = match shared.surface {
        Some(surface) => unsafe {
            shared
                .surface_loader
                .get_physical_device_surface_formats(adapter.handle, surface)
                .unwrap_or_default()
        }
        .iter()
        .any(|format| format.color_space != vk::ColorSpaceKHR::SRGB_NONLINEAR),
        None => false,
    };

    DeviceCapabilities {
        hdr,
        raytracing: RAYTRACING_EXTENSIONS.iter().all(|ext| adapter.supports_extension(ext)),
        mesh_shading: adapter.supports_extension(ash::ext::mesh_shader::NAME),
        variable_rate_shading: adapter.supports_extension(ash::khr::fragment_shading_rate::NAME),
        geometry_shader: adapter.features.geometry_shader == vk::TRUE,
        tessellation: adapter.features.tessellation_shader == vk::TRUE,
    }
}

pub(crate) fn raytracing_extensions() -> &'static [&'static CStr] {
    &RAYTRACING_EXTENSIONS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_types_map_to_adapter_kinds() {
        assert_eq!(adapter_kind(vk::PhysicalDeviceType::DISCRETE_GPU), AdapterKind::Discrete);
        assert_eq!(adapter_kind(vk::PhysicalDeviceType::CPU), AdapterKind::Cpu);
        assert_eq!(adapter_kind(vk::PhysicalDeviceType::OTHER), AdapterKind::Other);
    }

    #[test]
    fn vulkan_1_3_is_required() {
        assert!(ApiVersion::new(1, 2) < MIN_API_VERSION);
        assert!(ApiVersion::new(1, 4) >= MIN_API_VERSION);
    }
}
