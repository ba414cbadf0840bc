//! Vulkan rendering core
//!
//! Low-level Vulkan implementation: every GPU resource is wrapped in a
//! move-only owning type whose release runs deterministically on drop, and
//! all CPU/GPU coordination goes through explicit fences and semaphores.

/// GPU buffer with owned memory allocation
pub mod buffer;
/// Command pool and per-frame command buffers
pub mod commands;
/// Instance, device, queues and surface ownership
pub mod context;
/// Descriptor set layouts and the shared descriptor pool
pub mod descriptor;
/// Per-frame data exchanged with collaborators
pub mod frame_data;
/// Framebuffers and the depth attachment
pub mod framebuffer;
/// Graphics pipeline and shader modules
pub mod pipeline;
/// Forward render pass
pub mod render_pass;
/// The frame-rendering state machine
pub mod renderer;
/// Texture sampler deduplication
pub mod sampler_cache;
/// Presentable image set management
pub mod swapchain;
/// Fences and semaphores
pub mod sync;
/// Stateless transfer and layout-transition helpers
pub mod transfer;

pub use buffer::Buffer;
pub use commands::CommandManager;
pub use context::VulkanContext;
pub use descriptor::{DescriptorPool, DescriptorSetLayout, DescriptorSetLayoutBuilder};
pub use frame_data::{CameraMatrices, MeshBinding, OverlayRenderer, Renderable, Vertex};
pub use framebuffer::{DepthBuffer, Framebuffer};
pub use pipeline::{GraphicsPipeline, ShaderModule};
pub use render_pass::RenderPass;
pub use renderer::{DirectionalLight, Renderer};
pub use sampler_cache::{SamplerCache, SamplerOptions};
pub use swapchain::Swapchain;
pub use sync::{Fence, FrameSync, Semaphore};
pub use transfer::GpuImage;

use ash::vk;
use thiserror::Error;

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// Raw Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// Construction-time resource creation failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// No memory type satisfies both the requirement mask and the property flags
    #[error("No suitable memory type found")]
    NoSuitableMemoryType,

    /// No candidate format supports the requested tiling and features
    #[error("No supported format among candidates")]
    NoSupportedFormat,

    /// Layout transition pair outside the closed transition table
    #[error("Unsupported image layout transition: {old:?} -> {new:?}")]
    UnsupportedLayoutTransition {
        /// Layout the image currently holds
        old: vk::ImageLayout,
        /// Layout that was requested
        new: vk::ImageLayout,
    },

    /// Format lacks a feature the requested operation depends on
    #[error("Format {format:?} does not support {feature}")]
    UnsupportedFormatFeature {
        /// Format under inspection
        format: vk::Format,
        /// Human-readable feature name
        feature: &'static str,
    },

    /// Operation invalid in the current state
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Why the operation is invalid
        reason: String,
    },
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;
