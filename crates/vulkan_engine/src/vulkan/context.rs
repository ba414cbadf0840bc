//! Vulkan context: instance, physical device, logical device and queues
//!
//! The context is constructed once by the application driver and handed to
//! every other component by reference (or `Arc`) — there is no global lookup.
//! A context built without a surface ([`VulkanContext::new_headless`]) is
//! fully functional for resource creation and transfer work; only
//! presentation is unavailable, and the swapchain built on top of it holds
//! zero images.

use ash::extensions::ext::DebugUtils;
use ash::extensions::khr::Surface;
use ash::{vk, Device, Entry, Instance};
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use std::ffi::{c_char, c_void, CStr, CString};

use crate::config::RendererConfig;
use crate::vulkan::{VulkanError, VulkanResult};

const VALIDATION_LAYER: &str = "VK_LAYER_KHRONOS_validation";

/// Queue family indices selected at device creation
#[derive(Debug, Clone, Copy)]
pub struct QueueFamilyIndices {
    /// Family used for graphics and transfer submissions
    pub graphics: u32,
    /// Family used for presentation (equals `graphics` when headless)
    pub present: u32,
}

struct SurfaceBundle {
    loader: Surface,
    handle: vk::SurfaceKHR,
}

/// Owner of the instance, device, queues and (optionally) the surface
pub struct VulkanContext {
    entry: Entry,
    instance: Instance,
    debug_messenger: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
    surface: Option<SurfaceBundle>,
    physical_device: vk::PhysicalDevice,
    queue_families: QueueFamilyIndices,
    device: Device,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    transfer_pool: vk::CommandPool,
    limits: vk::PhysicalDeviceLimits,
}

impl VulkanContext {
    /// Create a context presenting to the given window
    pub fn new<W>(window: &W, config: &RendererConfig) -> VulkanResult<Self>
    where
        W: HasRawDisplayHandle + HasRawWindowHandle,
    {
        let entry = load_entry()?;

        let mut extensions: Vec<*const c_char> =
            ash_window::enumerate_required_extensions(window.raw_display_handle())
                .map_err(VulkanError::Api)?
                .to_vec();

        let validation = validation_enabled(&entry, config);
        if validation {
            extensions.push(DebugUtils::name().as_ptr());
        }

        let instance = create_instance(&entry, &config.application_name, &extensions, validation)?;
        let debug_messenger = if validation {
            Some(create_debug_messenger(&entry, &instance)?)
        } else {
            None
        };

        let surface_loader = Surface::new(&entry, &instance);
        let surface_handle = unsafe {
            ash_window::create_surface(
                &entry,
                &instance,
                window.raw_display_handle(),
                window.raw_window_handle(),
                None,
            )
            .map_err(VulkanError::Api)?
        };
        let surface = Some(SurfaceBundle {
            loader: surface_loader,
            handle: surface_handle,
        });

        Self::finish_init(entry, instance, debug_messenger, surface)
    }

    /// Create a context without a surface
    ///
    /// Intended for transfer-only and test use on machines without a display.
    pub fn new_headless(config: &RendererConfig) -> VulkanResult<Self> {
        let entry = load_entry()?;

        let validation = validation_enabled(&entry, config);
        let mut extensions: Vec<*const c_char> = Vec::new();
        if validation {
            extensions.push(DebugUtils::name().as_ptr());
        }

        let instance = create_instance(&entry, &config.application_name, &extensions, validation)?;
        let debug_messenger = if validation {
            Some(create_debug_messenger(&entry, &instance)?)
        } else {
            None
        };

        Self::finish_init(entry, instance, debug_messenger, None)
    }

    fn finish_init(
        entry: Entry,
        instance: Instance,
        debug_messenger: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
        surface: Option<SurfaceBundle>,
    ) -> VulkanResult<Self> {
        let (physical_device, queue_families) = pick_physical_device(&instance, surface.as_ref())?;

        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let device_name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) };
        log::info!(
            "Selected physical device: {} (type {:?})",
            device_name.to_string_lossy(),
            properties.device_type
        );

        let device = create_logical_device(
            &instance,
            physical_device,
            queue_families,
            surface.is_some(),
        )?;

        let graphics_queue = unsafe { device.get_device_queue(queue_families.graphics, 0) };
        let present_queue = unsafe { device.get_device_queue(queue_families.present, 0) };

        // Transient pool dedicated to one-shot setup/transfer submissions.
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::TRANSIENT)
            .queue_family_index(queue_families.graphics);
        let transfer_pool = unsafe {
            device
                .create_command_pool(&pool_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self {
            entry,
            instance,
            debug_messenger,
            surface,
            physical_device,
            queue_families,
            device,
            graphics_queue,
            present_queue,
            transfer_pool,
            limits: properties.limits,
        })
    }

    /// Logical device handle
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Instance handle
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// Vulkan entry point
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Selected physical device
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Queue used for graphics and transfer submissions
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Queue used for presentation
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    /// Queue family indices selected at device creation
    pub fn queue_families(&self) -> QueueFamilyIndices {
        self.queue_families
    }

    /// Pool for one-shot transfer command buffers
    pub fn transfer_pool(&self) -> vk::CommandPool {
        self.transfer_pool
    }

    /// Whether this context can present to a surface
    pub fn has_surface(&self) -> bool {
        self.surface.is_some()
    }

    /// Surface handle, `None` for headless contexts
    pub fn surface_handle(&self) -> Option<vk::SurfaceKHR> {
        self.surface.as_ref().map(|s| s.handle)
    }

    /// Physical device limits
    pub fn limits(&self) -> &vk::PhysicalDeviceLimits {
        &self.limits
    }

    /// Capabilities of the surface, for swapchain sizing
    pub fn surface_capabilities(&self) -> VulkanResult<vk::SurfaceCapabilitiesKHR> {
        let surface = self.require_surface()?;
        unsafe {
            surface
                .loader
                .get_physical_device_surface_capabilities(self.physical_device, surface.handle)
                .map_err(VulkanError::Api)
        }
    }

    /// Formats the surface can present
    pub fn surface_formats(&self) -> VulkanResult<Vec<vk::SurfaceFormatKHR>> {
        let surface = self.require_surface()?;
        unsafe {
            surface
                .loader
                .get_physical_device_surface_formats(self.physical_device, surface.handle)
                .map_err(VulkanError::Api)
        }
    }

    /// Present modes the surface supports
    pub fn surface_present_modes(&self) -> VulkanResult<Vec<vk::PresentModeKHR>> {
        let surface = self.require_surface()?;
        unsafe {
            surface
                .loader
                .get_physical_device_surface_present_modes(self.physical_device, surface.handle)
                .map_err(VulkanError::Api)
        }
    }

    fn require_surface(&self) -> VulkanResult<&SurfaceBundle> {
        self.surface.as_ref().ok_or(VulkanError::InvalidOperation {
            reason: "surface query on a headless context".to_string(),
        })
    }

    /// Block until the device has finished all submitted work
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.device.device_wait_idle().map_err(VulkanError::Api) }
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_command_pool(self.transfer_pool, None);
            self.device.destroy_device(None);
            if let Some(surface) = self.surface.take() {
                surface.loader.destroy_surface(surface.handle, None);
            }
            if let Some((utils, messenger)) = self.debug_messenger.take() {
                utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
        log::debug!("VulkanContext destroyed");
    }
}

fn load_entry() -> VulkanResult<Entry> {
    unsafe { Entry::load() }
        .map_err(|e| VulkanError::InitializationFailed(format!("failed to load Vulkan: {e:?}")))
}

fn validation_enabled(entry: &Entry, config: &RendererConfig) -> bool {
    if !config.enable_validation || !cfg!(debug_assertions) {
        return false;
    }
    let available = entry
        .enumerate_instance_layer_properties()
        .unwrap_or_default()
        .iter()
        .any(|layer| {
            let name = unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) };
            name.to_string_lossy() == VALIDATION_LAYER
        });
    if !available {
        log::warn!("{VALIDATION_LAYER} requested but not installed, continuing without it");
    }
    available
}

fn create_instance(
    entry: &Entry,
    application_name: &str,
    extensions: &[*const c_char],
    validation: bool,
) -> VulkanResult<Instance> {
    let app_name = CString::new(application_name)
        .map_err(|_| VulkanError::InitializationFailed("application name contains NUL".into()))?;
    let engine_name = CString::new("vulkan_engine").unwrap();

    let app_info = vk::ApplicationInfo::builder()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, 1, 0, 0))
        .engine_name(&engine_name)
        .engine_version(vk::make_api_version(0, 1, 0, 0))
        .api_version(vk::API_VERSION_1_0);

    let layer_name = CString::new(VALIDATION_LAYER).unwrap();
    let layers: Vec<*const c_char> = if validation {
        vec![layer_name.as_ptr()]
    } else {
        Vec::new()
    };

    let create_info = vk::InstanceCreateInfo::builder()
        .application_info(&app_info)
        .enabled_extension_names(extensions)
        .enabled_layer_names(&layers);

    unsafe { entry.create_instance(&create_info, None) }.map_err(|e| {
        VulkanError::InitializationFailed(format!("instance creation failed: {e:?}"))
    })
}

fn create_debug_messenger(
    entry: &Entry,
    instance: &Instance,
) -> VulkanResult<(DebugUtils, vk::DebugUtilsMessengerEXT)> {
    let utils = DebugUtils::new(entry, instance);
    let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback));

    let messenger = unsafe {
        utils
            .create_debug_utils_messenger(&create_info, None)
            .map_err(VulkanError::Api)?
    };
    Ok((utils, messenger))
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    let message = if data.is_null() || (*data).p_message.is_null() {
        std::borrow::Cow::Borrowed("(no message)")
    } else {
        CStr::from_ptr((*data).p_message).to_string_lossy()
    };

    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        log::error!("[validation] {message}");
    } else {
        log::warn!("[validation] {message}");
    }
    vk::FALSE
}

fn pick_physical_device(
    instance: &Instance,
    surface: Option<&SurfaceBundle>,
) -> VulkanResult<(vk::PhysicalDevice, QueueFamilyIndices)> {
    let devices = unsafe {
        instance
            .enumerate_physical_devices()
            .map_err(VulkanError::Api)?
    };
    if devices.is_empty() {
        return Err(VulkanError::InitializationFailed(
            "no Vulkan-capable physical device found".to_string(),
        ));
    }

    let mut fallback = None;
    for &device in &devices {
        let Some(families) = find_queue_families(instance, device, surface)? else {
            continue;
        };

        let properties = unsafe { instance.get_physical_device_properties(device) };
        if properties.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
            return Ok((device, families));
        }
        if fallback.is_none() {
            fallback = Some((device, families));
        }
    }

    fallback.ok_or_else(|| {
        VulkanError::InitializationFailed(
            "no physical device with the required queue families".to_string(),
        )
    })
}

fn find_queue_families(
    instance: &Instance,
    device: vk::PhysicalDevice,
    surface: Option<&SurfaceBundle>,
) -> VulkanResult<Option<QueueFamilyIndices>> {
    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };

    let mut graphics = None;
    let mut present = None;
    for (index, family) in families.iter().enumerate() {
        let index = index as u32;
        if graphics.is_none() && family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            graphics = Some(index);
        }
        if present.is_none() {
            if let Some(bundle) = surface {
                let supported = unsafe {
                    bundle
                        .loader
                        .get_physical_device_surface_support(device, index, bundle.handle)
                        .map_err(VulkanError::Api)?
                };
                if supported {
                    present = Some(index);
                }
            }
        }
    }

    Ok(match (graphics, present, surface) {
        (Some(graphics), _, None) => Some(QueueFamilyIndices {
            graphics,
            present: graphics,
        }),
        (Some(graphics), Some(present), Some(_)) => {
            Some(QueueFamilyIndices { graphics, present })
        }
        _ => None,
    })
}

fn create_logical_device(
    instance: &Instance,
    physical_device: vk::PhysicalDevice,
    families: QueueFamilyIndices,
    with_swapchain: bool,
) -> VulkanResult<Device> {
    let mut unique_families = vec![families.graphics];
    if families.present != families.graphics {
        unique_families.push(families.present);
    }

    let priorities = [1.0_f32];
    let queue_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
        .iter()
        .map(|&family| {
            vk::DeviceQueueCreateInfo::builder()
                .queue_family_index(family)
                .queue_priorities(&priorities)
                .build()
        })
        .collect();

    let supported = unsafe { instance.get_physical_device_features(physical_device) };
    let features = vk::PhysicalDeviceFeatures::builder()
        .sampler_anisotropy(supported.sampler_anisotropy == vk::TRUE);

    let mut extensions: Vec<*const c_char> = Vec::new();
    if with_swapchain {
        extensions.push(ash::extensions::khr::Swapchain::name().as_ptr());
    }

    let create_info = vk::DeviceCreateInfo::builder()
        .queue_create_infos(&queue_infos)
        .enabled_extension_names(&extensions)
        .enabled_features(&features);

    unsafe { instance.create_device(physical_device, &create_info, None) }
        .map_err(|e| VulkanError::InitializationFailed(format!("device creation failed: {e:?}")))
}
