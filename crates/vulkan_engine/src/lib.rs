//! # Vulkan Engine
//!
//! A real-time frame-rendering engine built directly on Vulkan through the
//! [`ash`] crate: manual GPU memory management, explicit command buffers, and
//! explicit CPU/GPU synchronization.
//!
//! The engine pipelines N frames of GPU work, survives surface resize and
//! invalidation, moves CPU data into GPU memory through staging transfers with
//! correct image layout transitions, and manages two independent tiers of
//! descriptor sets (per-frame camera/light data, per-material textures)
//! without data races between overlapping frames.
//!
//! ## Per-frame contract
//!
//! The application driver makes exactly three ordered calls per displayed
//! frame:
//!
//! ```rust,no_run
//! # use vulkan_engine::vulkan::{Renderer, Renderable};
//! # fn drive(renderer: &mut Renderer) -> vulkan_engine::vulkan::VulkanResult<()> {
//! # let renderables: Vec<Renderable> = Vec::new();
//! if renderer.begin_frame()? {
//!     renderer.record_commands(&renderables, None, None)?;
//!     renderer.end_frame_and_present()?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! `begin_frame` returning `false` means the frame is skipped (swapchain was
//! stale or the surface has no presentable images); the driver simply tries
//! again on the next iteration.
//!
//! Out of scope here and provided by collaborators: model/texture file
//! decoding, the scene graph, physics, UI widget construction, and window
//! event plumbing.

#![warn(missing_docs)]

pub mod config;
pub mod vulkan;

pub use config::{Config, ConfigError, RendererConfig};
