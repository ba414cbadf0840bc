//! Texture sampler deduplication
//!
//! Sampler objects are tiny but plentiful; most materials want one of a
//! handful of configurations. The cache hands out one `vk::Sampler` per
//! distinct property set and owns every sampler it created.

use ash::{vk, Device, Instance};
use std::collections::HashMap;

use crate::vulkan::{VulkanError, VulkanResult};

/// Properties that distinguish one sampler from another
#[derive(Debug, Clone, Copy)]
pub struct SamplerOptions {
    /// Magnification filter
    pub mag_filter: vk::Filter,
    /// Minification filter
    pub min_filter: vk::Filter,
    /// Mipmap interpolation mode
    pub mipmap_mode: vk::SamplerMipmapMode,
    /// Addressing in U
    pub address_mode_u: vk::SamplerAddressMode,
    /// Addressing in V
    pub address_mode_v: vk::SamplerAddressMode,
    /// Addressing in W
    pub address_mode_w: vk::SamplerAddressMode,
    /// LOD bias added to the computed level
    pub mip_lod_bias: f32,
    /// Enable anisotropic filtering
    pub anisotropy_enable: bool,
    /// Requested anisotropy, clamped to the device maximum
    pub max_anisotropy: f32,
    /// Enable depth-compare sampling
    pub compare_enable: bool,
    /// Compare operation when enabled
    pub compare_op: vk::CompareOp,
    /// Minimum LOD
    pub min_lod: f32,
    /// Maximum LOD (`vk::LOD_CLAMP_NONE` for the whole chain)
    pub max_lod: f32,
    /// Border color for clamp-to-border addressing
    pub border_color: vk::BorderColor,
    /// Use unnormalized texel coordinates
    pub unnormalized_coordinates: bool,
}

impl Default for SamplerOptions {
    fn default() -> Self {
        Self {
            mag_filter: vk::Filter::LINEAR,
            min_filter: vk::Filter::LINEAR,
            mipmap_mode: vk::SamplerMipmapMode::LINEAR,
            address_mode_u: vk::SamplerAddressMode::REPEAT,
            address_mode_v: vk::SamplerAddressMode::REPEAT,
            address_mode_w: vk::SamplerAddressMode::REPEAT,
            mip_lod_bias: 0.0,
            anisotropy_enable: false,
            max_anisotropy: 1.0,
            compare_enable: false,
            compare_op: vk::CompareOp::ALWAYS,
            min_lod: 0.0,
            max_lod: vk::LOD_CLAMP_NONE,
            border_color: vk::BorderColor::INT_OPAQUE_BLACK,
            unnormalized_coordinates: false,
        }
    }
}

// Floats are keyed by bit pattern so the key can be Eq + Hash; two options
// structs map to the same sampler exactly when every field matches bitwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct SamplerKey {
    mag_filter: i32,
    min_filter: i32,
    mipmap_mode: i32,
    address_mode_u: i32,
    address_mode_v: i32,
    address_mode_w: i32,
    mip_lod_bias: u32,
    anisotropy_enable: bool,
    max_anisotropy: u32,
    compare_enable: bool,
    compare_op: i32,
    min_lod: u32,
    max_lod: u32,
    border_color: i32,
    unnormalized_coordinates: bool,
}

impl From<&SamplerOptions> for SamplerKey {
    fn from(options: &SamplerOptions) -> Self {
        Self {
            mag_filter: options.mag_filter.as_raw(),
            min_filter: options.min_filter.as_raw(),
            mipmap_mode: options.mipmap_mode.as_raw(),
            address_mode_u: options.address_mode_u.as_raw(),
            address_mode_v: options.address_mode_v.as_raw(),
            address_mode_w: options.address_mode_w.as_raw(),
            mip_lod_bias: options.mip_lod_bias.to_bits(),
            anisotropy_enable: options.anisotropy_enable,
            max_anisotropy: options.max_anisotropy.to_bits(),
            compare_enable: options.compare_enable,
            compare_op: options.compare_op.as_raw(),
            min_lod: options.min_lod.to_bits(),
            max_lod: options.max_lod.to_bits(),
            border_color: options.border_color.as_raw(),
            unnormalized_coordinates: options.unnormalized_coordinates,
        }
    }
}

/// Cache of samplers keyed by their creation properties
pub struct SamplerCache {
    device: Device,
    max_device_anisotropy: f32,
    samplers: HashMap<SamplerKey, vk::Sampler>,
    default_sampler: vk::Sampler,
}

impl SamplerCache {
    /// Create the cache and its default sampler
    ///
    /// The default is linear-filtered, repeat-addressed, spans the full mip
    /// chain, and uses the device's maximum anisotropy.
    pub fn new(
        device: Device,
        instance: &Instance,
        physical_device: vk::PhysicalDevice,
    ) -> VulkanResult<Self> {
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let max_device_anisotropy = properties.limits.max_sampler_anisotropy;

        let mut cache = Self {
            device,
            max_device_anisotropy,
            samplers: HashMap::new(),
            default_sampler: vk::Sampler::null(),
        };

        let default_options = SamplerOptions {
            anisotropy_enable: true,
            max_anisotropy: max_device_anisotropy,
            ..SamplerOptions::default()
        };
        cache.default_sampler = cache.get_or_create(&default_options)?;

        log::debug!("SamplerCache initialized (device max anisotropy {max_device_anisotropy})");
        Ok(cache)
    }

    /// Sampler matching `options`, created on first request
    pub fn get_or_create(&mut self, options: &SamplerOptions) -> VulkanResult<vk::Sampler> {
        let key = SamplerKey::from(options);
        if let Some(&sampler) = self.samplers.get(&key) {
            return Ok(sampler);
        }

        let sampler = self.create_sampler(options)?;
        self.samplers.insert(key, sampler);
        Ok(sampler)
    }

    /// The default sampler created at construction
    pub fn default_sampler(&self) -> vk::Sampler {
        self.default_sampler
    }

    /// Number of distinct samplers currently cached
    pub fn len(&self) -> usize {
        self.samplers.len()
    }

    /// Whether the cache holds no samplers
    pub fn is_empty(&self) -> bool {
        self.samplers.is_empty()
    }

    fn create_sampler(&self, options: &SamplerOptions) -> VulkanResult<vk::Sampler> {
        let max_anisotropy = if options.anisotropy_enable {
            options.max_anisotropy.min(self.max_device_anisotropy)
        } else {
            // Must be 1.0 when anisotropy is disabled.
            1.0
        };

        let create_info = vk::SamplerCreateInfo::builder()
            .mag_filter(options.mag_filter)
            .min_filter(options.min_filter)
            .mipmap_mode(options.mipmap_mode)
            .address_mode_u(options.address_mode_u)
            .address_mode_v(options.address_mode_v)
            .address_mode_w(options.address_mode_w)
            .mip_lod_bias(options.mip_lod_bias)
            .anisotropy_enable(options.anisotropy_enable)
            .max_anisotropy(max_anisotropy)
            .compare_enable(options.compare_enable)
            .compare_op(options.compare_op)
            .min_lod(options.min_lod)
            .max_lod(options.max_lod)
            .border_color(options.border_color)
            .unnormalized_coordinates(options.unnormalized_coordinates);

        unsafe {
            self.device
                .create_sampler(&create_info, None)
                .map_err(VulkanError::Api)
        }
    }
}

impl Drop for SamplerCache {
    fn drop(&mut self) {
        log::debug!("Destroying {} cached samplers", self.samplers.len());
        for (_, sampler) in self.samplers.drain() {
            unsafe { self.device.destroy_sampler(sampler, None) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_options_share_a_key() {
        let a = SamplerOptions::default();
        let b = SamplerOptions::default();
        assert_eq!(SamplerKey::from(&a), SamplerKey::from(&b));
    }

    #[test]
    fn differing_options_differ() {
        let base = SamplerOptions::default();

        let nearest = SamplerOptions {
            mag_filter: vk::Filter::NEAREST,
            ..base
        };
        assert_ne!(SamplerKey::from(&base), SamplerKey::from(&nearest));

        let biased = SamplerOptions {
            mip_lod_bias: 0.5,
            ..base
        };
        assert_ne!(SamplerKey::from(&base), SamplerKey::from(&biased));

        let clamped = SamplerOptions {
            address_mode_u: vk::SamplerAddressMode::CLAMP_TO_EDGE,
            ..base
        };
        assert_ne!(SamplerKey::from(&base), SamplerKey::from(&clamped));
    }

    #[test]
    fn float_fields_key_by_bit_pattern() {
        let a = SamplerOptions {
            max_lod: 8.0,
            ..SamplerOptions::default()
        };
        let b = SamplerOptions {
            max_lod: 8.0,
            ..SamplerOptions::default()
        };
        assert_eq!(SamplerKey::from(&a), SamplerKey::from(&b));
    }
}
