//! GPU buffer with owned memory allocation
//!
//! A [`Buffer`] bundles one `vk::Buffer` with one `vk::DeviceMemory`
//! allocation and the bookkeeping needed for mapped host writes. The type is
//! move-only; dropping it releases buffer and memory deterministically.

use ash::{vk, Device};
use std::ffi::c_void;

use crate::vulkan::context::VulkanContext;
use crate::vulkan::transfer;
use crate::vulkan::{VulkanError, VulkanResult};

/// Round `instance_size` up to a multiple of `min_offset_alignment`
///
/// With an alignment of 0 or 1 the size is returned unchanged. The aligned
/// value is the per-element stride inside the buffer, so
/// `total = aligned_stride(size, align) * count` always holds.
pub fn aligned_stride(instance_size: vk::DeviceSize, min_offset_alignment: vk::DeviceSize) -> vk::DeviceSize {
    if min_offset_alignment > 1 {
        ((instance_size + min_offset_alignment - 1) / min_offset_alignment) * min_offset_alignment
    } else {
        instance_size
    }
}

/// Buffer handle, memory allocation and mapping state
pub struct Buffer {
    device: Device,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    mapped: *mut c_void,
    buffer_size: vk::DeviceSize,
    instance_count: u32,
    instance_size: vk::DeviceSize,
    alignment_size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    memory_properties: vk::MemoryPropertyFlags,
}

impl Buffer {
    /// Create a buffer of `instance_count` elements of `instance_size` bytes
    pub fn new(
        context: &VulkanContext,
        instance_size: vk::DeviceSize,
        instance_count: u32,
        usage: vk::BufferUsageFlags,
        memory_properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<Self> {
        Self::new_aligned(context, instance_size, instance_count, usage, memory_properties, 1)
    }

    /// Create a buffer whose per-element stride is rounded up to `min_offset_alignment`
    ///
    /// Used for dynamic uniform buffers where each element must start at a
    /// device-mandated offset boundary.
    pub fn new_aligned(
        context: &VulkanContext,
        instance_size: vk::DeviceSize,
        instance_count: u32,
        usage: vk::BufferUsageFlags,
        memory_properties: vk::MemoryPropertyFlags,
        min_offset_alignment: vk::DeviceSize,
    ) -> VulkanResult<Self> {
        if instance_size == 0 || instance_count == 0 {
            return Err(VulkanError::InvalidOperation {
                reason: "buffer instance size and count must be nonzero".to_string(),
            });
        }

        let device = context.device().clone();
        let alignment_size = aligned_stride(instance_size, min_offset_alignment);
        let buffer_size = alignment_size * vk::DeviceSize::from(instance_count);

        let buffer_info = vk::BufferCreateInfo::builder()
            .size(buffer_size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe {
            device
                .create_buffer(&buffer_info, None)
                .map_err(VulkanError::Api)?
        };

        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

        let memory_type_index = match transfer::find_memory_type(
            context.instance(),
            context.physical_device(),
            requirements.memory_type_bits,
            memory_properties,
        ) {
            Ok(index) => index,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);

        let memory = match unsafe { device.allocate_memory(&alloc_info, None) } {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(VulkanError::Api(e));
            }
        };

        unsafe {
            if let Err(e) = device.bind_buffer_memory(buffer, memory, 0) {
                device.destroy_buffer(buffer, None);
                device.free_memory(memory, None);
                return Err(VulkanError::Api(e));
            }
        }

        Ok(Self {
            device,
            buffer,
            memory,
            mapped: std::ptr::null_mut(),
            buffer_size,
            instance_count,
            instance_size,
            alignment_size,
            usage,
            memory_properties,
        })
    }

    /// Map the whole allocation for host access
    ///
    /// Mapping an already-mapped buffer warns and succeeds. Mapping
    /// non-host-visible memory is an error.
    pub fn map(&mut self) -> VulkanResult<()> {
        if !self.is_host_visible() {
            return Err(VulkanError::InvalidOperation {
                reason: "cannot map non-host-visible buffer memory".to_string(),
            });
        }
        if !self.mapped.is_null() {
            log::warn!("Buffer::map: memory is already mapped");
            return Ok(());
        }

        self.mapped = unsafe {
            self.device
                .map_memory(self.memory, 0, self.buffer_size, vk::MemoryMapFlags::empty())
                .map_err(VulkanError::Api)?
        };
        Ok(())
    }

    /// Unmap previously mapped memory; no-op when not mapped
    pub fn unmap(&mut self) {
        if !self.mapped.is_null() {
            unsafe { self.device.unmap_memory(self.memory) };
            self.mapped = std::ptr::null_mut();
        }
    }

    /// Copy `data` into the buffer starting at `offset`
    ///
    /// Maps temporarily if the buffer is not already mapped, clamps the copy
    /// to the bytes remaining past `offset`, flushes only when the memory is
    /// non-coherent, and unmaps again if the mapping was temporary.
    pub fn write_to_buffer(&mut self, data: &[u8], offset: vk::DeviceSize) -> VulkanResult<()> {
        if !self.is_host_visible() {
            return Err(VulkanError::InvalidOperation {
                reason: "cannot write directly to non-host-visible buffer, use a staging copy"
                    .to_string(),
            });
        }
        if offset >= self.buffer_size {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "write offset {offset} past end of {}-byte buffer",
                    self.buffer_size
                ),
            });
        }

        let needs_temporary_map = self.mapped.is_null();
        if needs_temporary_map {
            self.map()?;
        }

        let remaining = (self.buffer_size - offset) as usize;
        let copy_len = data.len().min(remaining);
        unsafe {
            let dst = (self.mapped as *mut u8).add(offset as usize);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, copy_len);
        }

        if !self.is_host_coherent() {
            self.flush(copy_len as vk::DeviceSize, offset)?;
        }

        if needs_temporary_map {
            self.unmap();
        }
        Ok(())
    }

    /// Write one plain-old-data value at the start of the buffer
    pub fn write_value<T: bytemuck::Pod>(&mut self, value: &T) -> VulkanResult<()> {
        self.write_to_buffer(bytemuck::bytes_of(value), 0)
    }

    /// Write a slice of plain-old-data values at the start of the buffer
    pub fn write_slice<T: bytemuck::Pod>(&mut self, values: &[T]) -> VulkanResult<()> {
        self.write_to_buffer(bytemuck::cast_slice(values), 0)
    }

    /// Make host writes in `[offset, offset+size)` visible to the device
    ///
    /// No-op for coherent or non-host-visible memory. `vk::WHOLE_SIZE` covers
    /// everything past `offset`.
    pub fn flush(&self, size: vk::DeviceSize, offset: vk::DeviceSize) -> VulkanResult<()> {
        if !self.needs_cache_management() {
            return Ok(());
        }
        let range = self.mapped_range(size, offset);
        unsafe {
            self.device
                .flush_mapped_memory_ranges(&[range])
                .map_err(VulkanError::Api)
        }
    }

    /// Make device writes in `[offset, offset+size)` visible to the host
    ///
    /// No-op for coherent or non-host-visible memory.
    pub fn invalidate(&self, size: vk::DeviceSize, offset: vk::DeviceSize) -> VulkanResult<()> {
        if !self.needs_cache_management() {
            return Ok(());
        }
        let range = self.mapped_range(size, offset);
        unsafe {
            self.device
                .invalidate_mapped_memory_ranges(&[range])
                .map_err(VulkanError::Api)
        }
    }

    fn mapped_range(&self, size: vk::DeviceSize, offset: vk::DeviceSize) -> vk::MappedMemoryRange {
        let size = if size == vk::WHOLE_SIZE {
            self.buffer_size - offset
        } else {
            size
        };
        vk::MappedMemoryRange::builder()
            .memory(self.memory)
            .offset(offset)
            .size(size)
            .build()
    }

    fn needs_cache_management(&self) -> bool {
        self.is_host_visible() && !self.is_host_coherent()
    }

    fn is_host_visible(&self) -> bool {
        self.memory_properties
            .contains(vk::MemoryPropertyFlags::HOST_VISIBLE)
    }

    fn is_host_coherent(&self) -> bool {
        self.memory_properties
            .contains(vk::MemoryPropertyFlags::HOST_COHERENT)
    }

    /// `(handle, offset, size)` triple for descriptor binding, whole buffer
    pub fn descriptor_info(&self) -> vk::DescriptorBufferInfo {
        self.descriptor_info_range(vk::WHOLE_SIZE, 0)
    }

    /// `(handle, offset, size)` triple for a sub-range of the buffer
    pub fn descriptor_info_range(
        &self,
        size: vk::DeviceSize,
        offset: vk::DeviceSize,
    ) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo {
            buffer: self.buffer,
            offset,
            range: if size == vk::WHOLE_SIZE {
                self.buffer_size - offset
            } else {
                size
            },
        }
    }

    /// Raw buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Total allocation size in bytes
    pub fn size(&self) -> vk::DeviceSize {
        self.buffer_size
    }

    /// Number of elements
    pub fn instance_count(&self) -> u32 {
        self.instance_count
    }

    /// Unaligned per-element size in bytes
    pub fn instance_size(&self) -> vk::DeviceSize {
        self.instance_size
    }

    /// Aligned per-element stride in bytes
    pub fn alignment_size(&self) -> vk::DeviceSize {
        self.alignment_size
    }

    /// Usage flags the buffer was created with
    pub fn usage(&self) -> vk::BufferUsageFlags {
        self.usage
    }

    /// Whether the buffer is currently mapped
    pub fn is_mapped(&self) -> bool {
        !self.mapped.is_null()
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        self.unmap();
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stride_unchanged_without_alignment() {
        assert_eq!(aligned_stride(48, 1), 48);
        assert_eq!(aligned_stride(48, 0), 48);
        assert_eq!(aligned_stride(1, 1), 1);
    }

    #[test]
    fn stride_rounds_up_to_alignment() {
        assert_eq!(aligned_stride(48, 64), 64);
        assert_eq!(aligned_stride(64, 64), 64);
        assert_eq!(aligned_stride(65, 64), 128);
        assert_eq!(aligned_stride(5, 4), 8);
        // Non-power-of-two alignments round the same way
        assert_eq!(aligned_stride(10, 3), 12);
    }

    #[test]
    fn total_size_is_stride_times_count() {
        for &(size, count, alignment) in &[
            (48u64, 3u64, 64u64),
            (16, 100, 256),
            (1, 1, 1),
            (7, 13, 4),
            (256, 4, 16),
        ] {
            let stride = aligned_stride(size, alignment);
            let expected = (size + alignment - 1) / alignment * alignment * count;
            assert_eq!(stride * count, expected, "S={size} C={count} A={alignment}");
            assert!(stride >= size);
        }
    }
}
