//! Presentable image set management
//!
//! The swapchain owns the platform's presentable images and one view per
//! image. It is rebuilt wholesale on resize; the renderer is responsible for
//! waiting device-idle and releasing framebuffers before calling
//! [`Swapchain::recreate`].

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::{vk, Device};

use crate::vulkan::context::VulkanContext;
use crate::vulkan::transfer;
use crate::vulkan::{VulkanError, VulkanResult};

/// Prefer B8G8R8A8_SRGB with sRGB non-linear color space, else the first listed
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    formats
        .iter()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .copied()
        .unwrap_or(formats[0])
}

/// Prefer MAILBOX, else FIFO (the one mode every driver provides)
pub fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    modes
        .iter()
        .copied()
        .find(|&mode| mode == vk::PresentModeKHR::MAILBOX)
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// Surface-dictated extent when fixed, else the request clamped to the limits
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    width: u32,
    height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

/// One more than the minimum, capped when the surface bounds the maximum
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let mut count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 && count > capabilities.max_image_count {
        count = capabilities.max_image_count;
    }
    count.max(capabilities.min_image_count)
}

struct SwapchainParts {
    handle: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::Format,
    extent: vk::Extent2D,
}

/// Swapchain images, views and the chosen format/extent
pub struct Swapchain {
    device: Device,
    loader: SwapchainLoader,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::Format,
    extent: vk::Extent2D,
}

impl Swapchain {
    /// Create a swapchain for the context's surface
    ///
    /// A headless context yields a swapchain with zero images and no error,
    /// so the rest of the renderer can be constructed and driven on machines
    /// without a display.
    pub fn new(context: &VulkanContext, width: u32, height: u32) -> VulkanResult<Self> {
        let device = context.device().clone();
        let loader = SwapchainLoader::new(context.instance(), &device);
        let parts = Self::init(context, &loader, width, height, vk::SwapchainKHR::null())?;

        log::info!(
            "Swapchain created: {} images, format {:?}, extent {}x{}",
            parts.images.len(),
            parts.format,
            parts.extent.width,
            parts.extent.height
        );

        Ok(Self {
            device,
            loader,
            swapchain: parts.handle,
            images: parts.images,
            image_views: parts.image_views,
            format: parts.format,
            extent: parts.extent,
        })
    }

    fn init(
        context: &VulkanContext,
        loader: &SwapchainLoader,
        width: u32,
        height: u32,
        old_swapchain: vk::SwapchainKHR,
    ) -> VulkanResult<SwapchainParts> {
        let Some(surface) = context.surface_handle() else {
            log::warn!("No surface: creating headless swapchain with zero images");
            return Ok(SwapchainParts {
                handle: vk::SwapchainKHR::null(),
                images: Vec::new(),
                image_views: Vec::new(),
                format: vk::Format::UNDEFINED,
                extent: vk::Extent2D { width, height },
            });
        };

        let formats = context.surface_formats()?;
        let present_modes = context.surface_present_modes()?;
        if formats.is_empty() || present_modes.is_empty() {
            return Err(VulkanError::InitializationFailed(
                "surface reports no formats or present modes".to_string(),
            ));
        }
        let capabilities = context.surface_capabilities()?;

        let surface_format = choose_surface_format(&formats);
        let present_mode = choose_present_mode(&present_modes);
        let extent = choose_extent(&capabilities, width, height);
        let image_count = choose_image_count(&capabilities);

        let families = context.queue_families();
        let family_indices = [families.graphics, families.present];
        let concurrent = families.graphics != families.present;

        let mut create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        create_info = if concurrent {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&family_indices)
        } else {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        };

        let device = context.device();
        let handle = unsafe {
            loader
                .create_swapchain(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        let images = unsafe {
            loader
                .get_swapchain_images(handle)
                .map_err(VulkanError::Api)?
        };

        let mut image_views = Vec::with_capacity(images.len());
        for &image in &images {
            let view = match transfer::create_image_view(
                device,
                image,
                surface_format.format,
                vk::ImageAspectFlags::COLOR,
                1,
            ) {
                Ok(view) => view,
                Err(e) => {
                    for view in image_views.drain(..) {
                        unsafe { device.destroy_image_view(view, None) };
                    }
                    unsafe { loader.destroy_swapchain(handle, None) };
                    return Err(e);
                }
            };
            image_views.push(view);
        }

        Ok(SwapchainParts {
            handle,
            images,
            image_views,
            format: surface_format.format,
            extent,
        })
    }

    /// Rebuild the image set at a new size
    ///
    /// The caller must already have waited device-idle and destroyed every
    /// framebuffer referencing the old views. The old handle is passed to the
    /// driver as a reuse hint and destroyed once the new chain exists.
    pub fn recreate(&mut self, context: &VulkanContext, width: u32, height: u32) -> VulkanResult<()> {
        for view in self.image_views.drain(..) {
            unsafe { self.device.destroy_image_view(view, None) };
        }
        self.images.clear();

        let old = std::mem::replace(&mut self.swapchain, vk::SwapchainKHR::null());
        let parts = Self::init(context, &self.loader, width, height, old);

        if old != vk::SwapchainKHR::null() {
            unsafe { self.loader.destroy_swapchain(old, None) };
        }

        let parts = parts?;
        self.swapchain = parts.handle;
        self.images = parts.images;
        self.image_views = parts.image_views;
        self.format = parts.format;
        self.extent = parts.extent;

        log::info!(
            "Swapchain recreated: {} images, extent {}x{}",
            self.images.len(),
            self.extent.width,
            self.extent.height
        );
        Ok(())
    }

    /// Swapchain handle (null for headless)
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Extension loader, needed for acquire and present calls
    pub fn loader(&self) -> &SwapchainLoader {
        &self.loader
    }

    /// Number of presentable images (0 when headless)
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Views over the presentable images, one per image
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    /// Chosen image format
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Fixed extent until the next recreation
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.image_views {
                self.device.destroy_image_view(view, None);
            }
            if self.swapchain != vk::SwapchainKHR::null() {
                self.loader.destroy_swapchain(self.swapchain, None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capabilities(current: (u32, u32), min: (u32, u32), max: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D {
                width: min.0,
                height: min.1,
            },
            max_image_extent: vk::Extent2D {
                width: max.0,
                height: max.1,
            },
            ..Default::default()
        }
    }

    #[test]
    fn fixed_extent_wins_over_request() {
        let caps = capabilities((1280, 720), (1, 1), (4096, 4096));
        let extent = choose_extent(&caps, 5000, 5000);
        assert_eq!(extent.width, 1280);
        assert_eq!(extent.height, 720);
    }

    #[test]
    fn unconstrained_extent_clamps_request() {
        let caps = capabilities((u32::MAX, u32::MAX), (200, 100), (2000, 1000));
        let within = choose_extent(&caps, 800, 600);
        assert_eq!((within.width, within.height), (800, 600));

        let below = choose_extent(&caps, 10, 10);
        assert_eq!((below.width, below.height), (200, 100));

        let above = choose_extent(&caps, 9000, 9000);
        assert_eq!((above.width, above.height), (2000, 1000));
    }

    #[test]
    fn srgb_format_preferred() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];
        assert_eq!(choose_surface_format(&formats).format, vk::Format::B8G8R8A8_SRGB);
    }

    #[test]
    fn first_format_when_preferred_absent() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];
        assert_eq!(choose_surface_format(&formats).format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn mailbox_preferred_with_fifo_fallback() {
        let with_mailbox = [
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::IMMEDIATE,
        ];
        assert_eq!(choose_present_mode(&with_mailbox), vk::PresentModeKHR::MAILBOX);

        let without = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(choose_present_mode(&without), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn image_count_is_min_plus_one_capped_at_max() {
        let mut caps = capabilities((800, 600), (1, 1), (4096, 4096));
        caps.min_image_count = 2;
        caps.max_image_count = 8;
        assert_eq!(choose_image_count(&caps), 3);

        caps.max_image_count = 3;
        assert_eq!(choose_image_count(&caps), 3);

        caps.min_image_count = 3;
        caps.max_image_count = 3;
        assert_eq!(choose_image_count(&caps), 3);

        // Zero max means "no upper bound".
        caps.min_image_count = 2;
        caps.max_image_count = 0;
        assert_eq!(choose_image_count(&caps), 3);
    }
}
