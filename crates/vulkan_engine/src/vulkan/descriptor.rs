//! Descriptor set layouts and the shared descriptor pool
//!
//! Two layouts exist in this engine: the frame layout (set 0, camera + light
//! uniform buffers) and the material layout (set 1, one combined image
//! sampler). Both are served by a single pool sized at construction; frame
//! sets are allocated once at startup, material sets lazily by the asset
//! collaborator through the handles the renderer exposes.

use ash::{vk, Device};

use crate::vulkan::{VulkanError, VulkanResult};

/// Builder assembling descriptor set layout bindings
pub struct DescriptorSetLayoutBuilder {
    bindings: Vec<vk::DescriptorSetLayoutBinding>,
}

impl DescriptorSetLayoutBuilder {
    /// Start an empty layout
    pub fn new() -> Self {
        Self {
            bindings: Vec::new(),
        }
    }

    /// Add a uniform buffer binding visible to `stage_flags`
    pub fn add_uniform_buffer(mut self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::builder()
                .binding(binding)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .descriptor_count(1)
                .stage_flags(stage_flags)
                .build(),
        );
        self
    }

    /// Add a combined image sampler binding visible to `stage_flags`
    pub fn add_combined_image_sampler(
        mut self,
        binding: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::builder()
                .binding(binding)
                .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .descriptor_count(1)
                .stage_flags(stage_flags)
                .build(),
        );
        self
    }

    /// Create the layout object
    pub fn build(self, device: &Device) -> VulkanResult<DescriptorSetLayout> {
        let create_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&self.bindings);
        let layout = unsafe {
            device
                .create_descriptor_set_layout(&create_info, None)
                .map_err(VulkanError::Api)?
        };
        Ok(DescriptorSetLayout {
            device: device.clone(),
            layout,
        })
    }
}

impl Default for DescriptorSetLayoutBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Descriptor set layout wrapper
pub struct DescriptorSetLayout {
    device: Device,
    layout: vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    /// Raw layout handle
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe { self.device.destroy_descriptor_set_layout(self.layout, None) };
    }
}

/// Shared pool serving frame sets and material sets
pub struct DescriptorPool {
    device: Device,
    pool: vk::DescriptorPool,
}

impl DescriptorPool {
    /// Size the pool for `frame_sets` frame slots and up to `material_sets` materials
    ///
    /// Each frame set consumes two uniform-buffer descriptors (camera +
    /// light); each material set one combined image sampler.
    pub fn new(device: Device, frame_sets: u32, material_sets: u32) -> VulkanResult<Self> {
        let pool_sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: frame_sets * 2,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: material_sets,
            },
        ];

        let create_info = vk::DescriptorPoolCreateInfo::builder()
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .pool_sizes(&pool_sizes)
            .max_sets(frame_sets + material_sets);

        let pool = unsafe {
            device
                .create_descriptor_pool(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { device, pool })
    }

    /// Allocate one set per layout in `layouts`
    pub fn allocate(
        &self,
        layouts: &[vk::DescriptorSetLayout],
    ) -> VulkanResult<Vec<vk::DescriptorSet>> {
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);
        unsafe {
            self.device
                .allocate_descriptor_sets(&alloc_info)
                .map_err(VulkanError::Api)
        }
    }

    /// Raw pool handle, exposed to the asset collaborator
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        // Destroying the pool frees every set allocated from it, material
        // sets included.
        unsafe { self.device.destroy_descriptor_pool(self.pool, None) };
    }
}
