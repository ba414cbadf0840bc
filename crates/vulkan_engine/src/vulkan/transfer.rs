//! Stateless transfer and layout-transition helpers
//!
//! Every function here operates on an externally-owned device, command pool
//! and queue. The one-shot submission helpers block until the GPU finishes,
//! so they belong in load/setup paths only, never in the per-frame loop.

use ash::{vk, Device, Instance};

use crate::vulkan::{VulkanError, VulkanResult};

/// First memory type index matching both the requirement mask and the properties
///
/// First-match scan, no scoring. Errors when no compatible type exists.
pub fn find_memory_type(
    instance: &Instance,
    physical_device: vk::PhysicalDevice,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> VulkanResult<u32> {
    let memory_properties =
        unsafe { instance.get_physical_device_memory_properties(physical_device) };

    for i in 0..memory_properties.memory_type_count {
        if (type_filter & (1 << i)) != 0
            && memory_properties.memory_types[i as usize]
                .property_flags
                .contains(properties)
        {
            return Ok(i);
        }
    }
    Err(VulkanError::NoSuitableMemoryType)
}

/// First candidate format supporting `features` under the given tiling
pub fn find_supported_format(
    instance: &Instance,
    physical_device: vk::PhysicalDevice,
    candidates: &[vk::Format],
    tiling: vk::ImageTiling,
    features: vk::FormatFeatureFlags,
) -> VulkanResult<vk::Format> {
    for &format in candidates {
        let props =
            unsafe { instance.get_physical_device_format_properties(physical_device, format) };
        let supported = match tiling {
            vk::ImageTiling::LINEAR => props.linear_tiling_features.contains(features),
            _ => props.optimal_tiling_features.contains(features),
        };
        if supported {
            return Ok(format);
        }
    }
    Err(VulkanError::NoSupportedFormat)
}

/// Whether a depth format carries a stencil aspect
pub fn has_stencil_component(format: vk::Format) -> bool {
    format == vk::Format::D32_SFLOAT_S8_UINT || format == vk::Format::D24_UNORM_S8_UINT
}

/// Extent of mip level `level` for a base image of `width` x `height`
pub fn mip_extent(width: u32, height: u32, level: u32) -> (u32, u32) {
    ((width >> level).max(1), (height >> level).max(1))
}

/// Number of mip levels in a full chain down to 1x1
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

/// Create and bind a 2D image
///
/// Returns the raw handle pair; use [`GpuImage`] when single ownership with
/// automatic release is wanted.
pub fn create_image(
    device: &Device,
    instance: &Instance,
    physical_device: vk::PhysicalDevice,
    width: u32,
    height: u32,
    mip_levels: u32,
    samples: vk::SampleCountFlags,
    format: vk::Format,
    tiling: vk::ImageTiling,
    usage: vk::ImageUsageFlags,
    properties: vk::MemoryPropertyFlags,
) -> VulkanResult<(vk::Image, vk::DeviceMemory)> {
    let image_info = vk::ImageCreateInfo::builder()
        .image_type(vk::ImageType::TYPE_2D)
        .extent(vk::Extent3D {
            width,
            height,
            depth: 1,
        })
        .mip_levels(mip_levels)
        .array_layers(1)
        .format(format)
        .tiling(tiling)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .usage(usage)
        .samples(samples)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);

    let image = unsafe {
        device
            .create_image(&image_info, None)
            .map_err(VulkanError::Api)?
    };

    let requirements = unsafe { device.get_image_memory_requirements(image) };
    let memory_type_index = match find_memory_type(
        instance,
        physical_device,
        requirements.memory_type_bits,
        properties,
    ) {
        Ok(index) => index,
        Err(e) => {
            unsafe { device.destroy_image(image, None) };
            return Err(e);
        }
    };

    let alloc_info = vk::MemoryAllocateInfo::builder()
        .allocation_size(requirements.size)
        .memory_type_index(memory_type_index);

    let memory = match unsafe { device.allocate_memory(&alloc_info, None) } {
        Ok(memory) => memory,
        Err(e) => {
            unsafe { device.destroy_image(image, None) };
            return Err(VulkanError::Api(e));
        }
    };

    unsafe {
        if let Err(e) = device.bind_image_memory(image, memory, 0) {
            device.destroy_image(image, None);
            device.free_memory(memory, None);
            return Err(VulkanError::Api(e));
        }
    }

    Ok((image, memory))
}

/// Create a 2D view over `mip_levels` levels of the given aspect
pub fn create_image_view(
    device: &Device,
    image: vk::Image,
    format: vk::Format,
    aspect: vk::ImageAspectFlags,
    mip_levels: u32,
) -> VulkanResult<vk::ImageView> {
    let view_info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: aspect,
            base_mip_level: 0,
            level_count: mip_levels,
            base_array_layer: 0,
            layer_count: 1,
        });

    unsafe {
        device
            .create_image_view(&view_info, None)
            .map_err(VulkanError::Api)
    }
}

/// Allocate one primary command buffer from `pool` and begin recording it
pub fn begin_single_time_commands(
    device: &Device,
    pool: vk::CommandPool,
) -> VulkanResult<vk::CommandBuffer> {
    let alloc_info = vk::CommandBufferAllocateInfo::builder()
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_pool(pool)
        .command_buffer_count(1);

    let command_buffer = unsafe {
        device
            .allocate_command_buffers(&alloc_info)
            .map_err(VulkanError::Api)?[0]
    };

    let begin_info = vk::CommandBufferBeginInfo::builder()
        .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
    unsafe {
        if let Err(e) = device.begin_command_buffer(command_buffer, &begin_info) {
            device.free_command_buffers(pool, &[command_buffer]);
            return Err(VulkanError::Api(e));
        }
    }
    Ok(command_buffer)
}

/// End, submit and free a command buffer from [`begin_single_time_commands`]
///
/// The submission is guarded by a disposable fence and this call blocks until
/// it signals.
pub fn end_single_time_commands(
    device: &Device,
    pool: vk::CommandPool,
    queue: vk::Queue,
    command_buffer: vk::CommandBuffer,
) -> VulkanResult<()> {
    let result = (|| {
        unsafe {
            device
                .end_command_buffer(command_buffer)
                .map_err(VulkanError::Api)?;
        }

        let fence_info = vk::FenceCreateInfo::builder();
        let fence = unsafe {
            device
                .create_fence(&fence_info, None)
                .map_err(VulkanError::Api)?
        };

        let buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::builder().command_buffers(&buffers);
        let submitted = unsafe { device.queue_submit(queue, &[submit_info.build()], fence) };
        let waited = match submitted {
            Ok(()) => unsafe { device.wait_for_fences(&[fence], true, u64::MAX) },
            Err(e) => Err(e),
        };
        unsafe { device.destroy_fence(fence, None) };
        waited.map_err(VulkanError::Api)
    })();

    unsafe { device.free_command_buffers(pool, &[command_buffer]) };
    result
}

/// Access masks and pipeline stages for one known layout transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionMasks {
    /// Accesses that must complete before the transition
    pub src_access: vk::AccessFlags,
    /// Accesses gated on the transition
    pub dst_access: vk::AccessFlags,
    /// Pipeline stage producing the old contents
    pub src_stage: vk::PipelineStageFlags,
    /// Pipeline stage consuming the new layout
    pub dst_stage: vk::PipelineStageFlags,
}

struct LayoutTransition {
    old: vk::ImageLayout,
    new: vk::ImageLayout,
    masks: TransitionMasks,
}

// The table is deliberately closed: each supported pair has distinct correct
// access/stage semantics, and an unlisted pair means the caller is confused
// about image state.
fn transition_table() -> [LayoutTransition; 5] {
    [
        LayoutTransition {
            old: vk::ImageLayout::UNDEFINED,
            new: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            masks: TransitionMasks {
                src_access: vk::AccessFlags::empty(),
                dst_access: vk::AccessFlags::TRANSFER_WRITE,
                src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
                dst_stage: vk::PipelineStageFlags::TRANSFER,
            },
        },
        LayoutTransition {
            old: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            new: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            masks: TransitionMasks {
                src_access: vk::AccessFlags::TRANSFER_WRITE,
                dst_access: vk::AccessFlags::SHADER_READ,
                src_stage: vk::PipelineStageFlags::TRANSFER,
                dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
            },
        },
        LayoutTransition {
            old: vk::ImageLayout::UNDEFINED,
            new: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            masks: TransitionMasks {
                src_access: vk::AccessFlags::empty(),
                dst_access: vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
                dst_stage: vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            },
        },
        LayoutTransition {
            old: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            new: vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            masks: TransitionMasks {
                src_access: vk::AccessFlags::TRANSFER_WRITE,
                dst_access: vk::AccessFlags::TRANSFER_READ,
                src_stage: vk::PipelineStageFlags::TRANSFER,
                dst_stage: vk::PipelineStageFlags::TRANSFER,
            },
        },
        LayoutTransition {
            old: vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            new: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            masks: TransitionMasks {
                src_access: vk::AccessFlags::TRANSFER_READ,
                dst_access: vk::AccessFlags::SHADER_READ,
                src_stage: vk::PipelineStageFlags::TRANSFER,
                dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
            },
        },
    ]
}

/// Look up the barrier masks for a layout transition pair
///
/// Only the five transitions this engine performs are accepted; anything
/// else returns [`VulkanError::UnsupportedLayoutTransition`].
pub fn transition_masks(
    old: vk::ImageLayout,
    new: vk::ImageLayout,
) -> VulkanResult<TransitionMasks> {
    transition_table()
        .iter()
        .find(|t| t.old == old && t.new == new)
        .map(|t| t.masks)
        .ok_or(VulkanError::UnsupportedLayoutTransition { old, new })
}

fn image_barrier(
    image: vk::Image,
    format: vk::Format,
    old: vk::ImageLayout,
    new: vk::ImageLayout,
    base_mip_level: u32,
    level_count: u32,
) -> VulkanResult<(vk::ImageMemoryBarrier, TransitionMasks)> {
    let masks = transition_masks(old, new)?;

    let aspect = if old == vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        || new == vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
    {
        if has_stencil_component(format) {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        } else {
            vk::ImageAspectFlags::DEPTH
        }
    } else {
        vk::ImageAspectFlags::COLOR
    };

    let barrier = vk::ImageMemoryBarrier::builder()
        .old_layout(old)
        .new_layout(new)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: aspect,
            base_mip_level,
            level_count,
            base_array_layer: 0,
            layer_count: 1,
        })
        .src_access_mask(masks.src_access)
        .dst_access_mask(masks.dst_access)
        .build();

    Ok((barrier, masks))
}

/// Transition `level_count` mip levels from `old` to `new` layout
///
/// One-shot synchronous submission. The transition pair must be one of the
/// five listed in the module table.
pub fn transition_image_layout(
    device: &Device,
    pool: vk::CommandPool,
    queue: vk::Queue,
    image: vk::Image,
    format: vk::Format,
    old: vk::ImageLayout,
    new: vk::ImageLayout,
    base_mip_level: u32,
    level_count: u32,
) -> VulkanResult<()> {
    // Validate the pair before touching the GPU.
    let (barrier, masks) = image_barrier(image, format, old, new, base_mip_level, level_count)?;

    let command_buffer = begin_single_time_commands(device, pool)?;
    unsafe {
        device.cmd_pipeline_barrier(
            command_buffer,
            masks.src_stage,
            masks.dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
    }
    end_single_time_commands(device, pool, queue, command_buffer)
}

/// Copy `size` bytes between buffers in a one-shot submission
pub fn copy_buffer(
    device: &Device,
    pool: vk::CommandPool,
    queue: vk::Queue,
    src: vk::Buffer,
    dst: vk::Buffer,
    size: vk::DeviceSize,
) -> VulkanResult<()> {
    let command_buffer = begin_single_time_commands(device, pool)?;
    let region = vk::BufferCopy {
        src_offset: 0,
        dst_offset: 0,
        size,
    };
    unsafe {
        device.cmd_copy_buffer(command_buffer, src, dst, &[region]);
    }
    end_single_time_commands(device, pool, queue, command_buffer)
}

/// Copy tightly-packed pixels into mip level 0 of an image
///
/// The image must already be in TRANSFER_DST_OPTIMAL layout.
pub fn copy_buffer_to_image(
    device: &Device,
    pool: vk::CommandPool,
    queue: vk::Queue,
    buffer: vk::Buffer,
    image: vk::Image,
    width: u32,
    height: u32,
) -> VulkanResult<()> {
    let command_buffer = begin_single_time_commands(device, pool)?;
    let region = vk::BufferImageCopy {
        buffer_offset: 0,
        buffer_row_length: 0,
        buffer_image_height: 0,
        image_subresource: vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        },
        image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
        image_extent: vk::Extent3D {
            width,
            height,
            depth: 1,
        },
    };
    unsafe {
        device.cmd_copy_buffer_to_image(
            command_buffer,
            buffer,
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[region],
        );
    }
    end_single_time_commands(device, pool, queue, command_buffer)
}

/// Generate a full mipmap chain by successive half-resolution blits
///
/// Expects mip level 0 in TRANSFER_DST_OPTIMAL (the post-upload state) and
/// all other levels UNDEFINED. On return every level is
/// SHADER_READ_ONLY_OPTIMAL. Refuses without submitting anything when the
/// format lacks linear-filtered blit support; the caller falls back to a
/// single mip level.
pub fn generate_mipmaps(
    device: &Device,
    instance: &Instance,
    physical_device: vk::PhysicalDevice,
    pool: vk::CommandPool,
    queue: vk::Queue,
    image: vk::Image,
    format: vk::Format,
    width: u32,
    height: u32,
    mip_levels: u32,
) -> VulkanResult<()> {
    if mip_levels <= 1 {
        return Ok(());
    }

    let props = unsafe { instance.get_physical_device_format_properties(physical_device, format) };
    let required = vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR
        | vk::FormatFeatureFlags::BLIT_SRC
        | vk::FormatFeatureFlags::BLIT_DST;
    if !props.optimal_tiling_features.contains(required) {
        return Err(VulkanError::UnsupportedFormatFeature {
            format,
            feature: "linear-filtered blit",
        });
    }

    let command_buffer = begin_single_time_commands(device, pool)?;

    let mut mip_width = width;
    let mut mip_height = height;
    for level in 1..mip_levels {
        // Previous level becomes the blit source.
        let (src_barrier, src_masks) = image_barrier(
            image,
            format,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            level - 1,
            1,
        )?;
        // Current level receives the blit.
        let (dst_barrier, dst_masks) = image_barrier(
            image,
            format,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            level,
            1,
        )?;
        unsafe {
            device.cmd_pipeline_barrier(
                command_buffer,
                src_masks.src_stage,
                src_masks.dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[src_barrier],
            );
            device.cmd_pipeline_barrier(
                command_buffer,
                dst_masks.src_stage,
                dst_masks.dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[dst_barrier],
            );
        }

        let (dst_width, dst_height) = mip_extent(width, height, level);
        let blit = vk::ImageBlit {
            src_subresource: vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: level - 1,
                base_array_layer: 0,
                layer_count: 1,
            },
            src_offsets: [
                vk::Offset3D { x: 0, y: 0, z: 0 },
                vk::Offset3D {
                    x: mip_width as i32,
                    y: mip_height as i32,
                    z: 1,
                },
            ],
            dst_subresource: vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: level,
                base_array_layer: 0,
                layer_count: 1,
            },
            dst_offsets: [
                vk::Offset3D { x: 0, y: 0, z: 0 },
                vk::Offset3D {
                    x: dst_width as i32,
                    y: dst_height as i32,
                    z: 1,
                },
            ],
        };
        unsafe {
            device.cmd_blit_image(
                command_buffer,
                image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[blit],
                vk::Filter::LINEAR,
            );
        }

        mip_width = dst_width;
        mip_height = dst_height;
    }

    // Levels [0, n-2] were left as blit sources, level n-1 as a blit target.
    let (src_barrier, src_masks) = image_barrier(
        image,
        format,
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        0,
        mip_levels - 1,
    )?;
    let (last_barrier, last_masks) = image_barrier(
        image,
        format,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        mip_levels - 1,
        1,
    )?;
    unsafe {
        device.cmd_pipeline_barrier(
            command_buffer,
            src_masks.src_stage,
            src_masks.dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[src_barrier],
        );
        device.cmd_pipeline_barrier(
            command_buffer,
            last_masks.src_stage,
            last_masks.dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[last_barrier],
        );
    }

    end_single_time_commands(device, pool, queue, command_buffer)?;
    log::debug!("Generated {mip_levels} mip levels for {width}x{height} image");
    Ok(())
}

/// Image, memory and view under single ownership
///
/// Created through the transfer helpers; releases everything on drop.
pub struct GpuImage {
    device: Device,
    image: vk::Image,
    memory: vk::DeviceMemory,
    view: vk::ImageView,
    mip_levels: u32,
    format: vk::Format,
    extent: vk::Extent2D,
}

impl GpuImage {
    /// Allocate a 2D image plus a view over all its mip levels
    pub fn new(
        device: &Device,
        instance: &Instance,
        physical_device: vk::PhysicalDevice,
        width: u32,
        height: u32,
        mip_levels: u32,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        aspect: vk::ImageAspectFlags,
    ) -> VulkanResult<Self> {
        let (image, memory) = create_image(
            device,
            instance,
            physical_device,
            width,
            height,
            mip_levels,
            vk::SampleCountFlags::TYPE_1,
            format,
            vk::ImageTiling::OPTIMAL,
            usage,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        let view = match create_image_view(device, image, format, aspect, mip_levels) {
            Ok(view) => view,
            Err(e) => {
                unsafe {
                    device.destroy_image(image, None);
                    device.free_memory(memory, None);
                }
                return Err(e);
            }
        };

        Ok(Self {
            device: device.clone(),
            image,
            memory,
            view,
            mip_levels,
            format,
            extent: vk::Extent2D { width, height },
        })
    }

    /// Raw image handle
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    /// View over all mip levels
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    /// Number of mip levels
    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    /// Image format
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Base level extent
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for GpuImage {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image_view(self.view, None);
            self.device.destroy_image(self.image, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KNOWN_PAIRS: [(vk::ImageLayout, vk::ImageLayout); 5] = [
        (
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        ),
        (
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        ),
        (
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        ),
        (
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        ),
        (
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        ),
    ];

    #[test]
    fn table_accepts_exactly_the_known_pairs() {
        for (old, new) in KNOWN_PAIRS {
            assert!(transition_masks(old, new).is_ok(), "{old:?} -> {new:?}");
        }

        // Every other combination over the involved layouts must be rejected.
        let layouts = [
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        ];
        for old in layouts {
            for new in layouts {
                if KNOWN_PAIRS.contains(&(old, new)) {
                    continue;
                }
                let result = transition_masks(old, new);
                assert!(
                    matches!(
                        result,
                        Err(VulkanError::UnsupportedLayoutTransition { .. })
                    ),
                    "{old:?} -> {new:?} unexpectedly accepted"
                );
            }
        }
    }

    #[test]
    fn upload_transition_uses_transfer_stage() {
        let masks = transition_masks(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
        .unwrap();
        assert_eq!(masks.src_access, vk::AccessFlags::empty());
        assert_eq!(masks.dst_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(masks.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(masks.dst_stage, vk::PipelineStageFlags::TRANSFER);
    }

    #[test]
    fn sample_transition_targets_fragment_shader() {
        for old in [
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        ] {
            let masks =
                transition_masks(old, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL).unwrap();
            assert_eq!(masks.dst_access, vk::AccessFlags::SHADER_READ);
            assert_eq!(masks.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
        }
    }

    #[test]
    fn mip_extents_halve_with_floor_and_clamp() {
        assert_eq!(mip_extent(256, 256, 0), (256, 256));
        assert_eq!(mip_extent(256, 256, 1), (128, 128));
        assert_eq!(mip_extent(256, 256, 8), (1, 1));
        assert_eq!(mip_extent(256, 256, 12), (1, 1));
        assert_eq!(mip_extent(100, 40, 1), (50, 20));
        assert_eq!(mip_extent(100, 40, 3), (12, 5));
        assert_eq!(mip_extent(5, 3, 1), (2, 1));
        assert_eq!(mip_extent(1, 1, 1), (1, 1));
    }

    #[test]
    fn full_chain_length() {
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(2, 2), 2);
        assert_eq!(mip_level_count(256, 256), 9);
        assert_eq!(mip_level_count(512, 64), 10);
        assert_eq!(mip_level_count(100, 40), 7);
    }
}
