//! Command pool and per-frame command buffers
//!
//! One pool plus one reusable primary command buffer per frame slot, all
//! allocated at construction. Buffers are reset and re-recorded each time
//! their slot comes around; they are never reallocated per frame.

use ash::{vk, Device};

use crate::vulkan::context::VulkanContext;
use crate::vulkan::{VulkanError, VulkanResult};

/// Owner of the frame command pool and its `frame_count` primary buffers
pub struct CommandManager {
    device: Device,
    pool: vk::CommandPool,
    buffers: Vec<vk::CommandBuffer>,
}

impl CommandManager {
    /// Create the pool and allocate `frame_count` primary buffers
    pub fn new(context: &VulkanContext, frame_count: usize) -> VulkanResult<Self> {
        if frame_count == 0 {
            return Err(VulkanError::InvalidOperation {
                reason: "frame count must be greater than zero".to_string(),
            });
        }

        let device = context.device().clone();
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(context.queue_families().graphics);

        let pool = unsafe {
            device
                .create_command_pool(&pool_info, None)
                .map_err(VulkanError::Api)?
        };

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(frame_count as u32);

        let buffers = match unsafe { device.allocate_command_buffers(&alloc_info) } {
            Ok(buffers) => buffers,
            Err(e) => {
                unsafe { device.destroy_command_pool(pool, None) };
                return Err(VulkanError::Api(e));
            }
        };

        log::debug!("Allocated {frame_count} primary command buffers");
        Ok(Self {
            device,
            pool,
            buffers,
        })
    }

    /// Reset slot `slot`'s buffer and open it in one-time-submit mode
    ///
    /// Panics on an out-of-range slot: slot indices come from the renderer's
    /// own counter, so a bad one is a bug, not an environment condition.
    pub fn begin_frame_recording(&self, slot: usize) -> VulkanResult<vk::CommandBuffer> {
        let buffer = self.command_buffer(slot);
        unsafe {
            self.device
                .reset_command_buffer(buffer, vk::CommandBufferResetFlags::empty())
                .map_err(VulkanError::Api)?;

            let begin_info = vk::CommandBufferBeginInfo::builder()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            self.device
                .begin_command_buffer(buffer, &begin_info)
                .map_err(VulkanError::Api)?;
        }
        Ok(buffer)
    }

    /// Close recording on slot `slot`'s buffer
    pub fn end_frame_recording(&self, slot: usize) -> VulkanResult<()> {
        let buffer = self.command_buffer(slot);
        unsafe {
            self.device
                .end_command_buffer(buffer)
                .map_err(VulkanError::Api)
        }
    }

    /// Slot `slot`'s command buffer; panics on an out-of-range slot
    pub fn command_buffer(&self, slot: usize) -> vk::CommandBuffer {
        assert!(
            slot < self.buffers.len(),
            "frame slot {slot} out of range (frame count {})",
            self.buffers.len()
        );
        self.buffers[slot]
    }

    /// Number of frame slots
    pub fn frame_count(&self) -> usize {
        self.buffers.len()
    }
}

impl Drop for CommandManager {
    fn drop(&mut self) {
        unsafe {
            // Buffers may still be pending execution; destroying the pool
            // frees them, so the device must be quiet first.
            let _ = self.device.device_wait_idle();
            self.device.destroy_command_pool(self.pool, None);
        }
    }
}
