//! Framebuffers and the depth attachment

use ash::{vk, Device};

use crate::vulkan::context::VulkanContext;
use crate::vulkan::transfer::{self, GpuImage};
use crate::vulkan::{VulkanError, VulkanResult};

/// Framebuffer tying one swapchain view and the depth view to a render pass
pub struct Framebuffer {
    device: Device,
    framebuffer: vk::Framebuffer,
}

impl Framebuffer {
    /// Create a framebuffer over the given attachments at `extent`
    pub fn new(
        device: Device,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> VulkanResult<Self> {
        let create_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass)
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer = unsafe {
            device
                .create_framebuffer(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self {
            device,
            framebuffer,
        })
    }

    /// Raw framebuffer handle
    pub fn handle(&self) -> vk::Framebuffer {
        self.framebuffer
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe { self.device.destroy_framebuffer(self.framebuffer, None) };
    }
}

/// Depth attachment shared by every framebuffer of one swapchain generation
pub struct DepthBuffer {
    image: GpuImage,
}

impl DepthBuffer {
    /// Pick a supported depth format and allocate the attachment at `extent`
    pub fn new(context: &VulkanContext, extent: vk::Extent2D) -> VulkanResult<Self> {
        let format = transfer::find_supported_format(
            context.instance(),
            context.physical_device(),
            &[
                vk::Format::D32_SFLOAT,
                vk::Format::D32_SFLOAT_S8_UINT,
                vk::Format::D24_UNORM_S8_UINT,
            ],
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
        )?;

        let image = GpuImage::new(
            context.device(),
            context.instance(),
            context.physical_device(),
            extent.width,
            extent.height,
            1,
            format,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            vk::ImageAspectFlags::DEPTH,
        )?;

        log::debug!("Depth buffer created ({:?}, {}x{})", format, extent.width, extent.height);
        Ok(Self { image })
    }

    /// Depth view for framebuffer attachment
    pub fn view(&self) -> vk::ImageView {
        self.image.view()
    }

    /// Chosen depth format
    pub fn format(&self) -> vk::Format {
        self.image.format()
    }
}
