//! Renderer configuration
//!
//! File-backed configuration loading in TOML or RON form.

pub use serde::{Deserialize, Serialize};

/// Trait for file-backed configuration types
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from a `.toml` or `.ron` file
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;

        if path.ends_with(".toml") {
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else if path.ends_with(".ron") {
            ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            Err(ConfigError::UnsupportedFormat(path.to_string()))
        }
    }

    /// Save configuration to a `.toml` or `.ron` file
    fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let contents = if path.ends_with(".toml") {
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else if path.ends_with(".ron") {
            ron::ser::to_string_pretty(self, Default::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else {
            return Err(ConfigError::UnsupportedFormat(path.to_string()));
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported file extension
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Renderer construction parameters
///
/// Every field has a sensible default, so partial config files work:
/// `frames_in_flight = 3` alone is a valid TOML config.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct RendererConfig {
    /// Application name reported to the Vulkan instance
    pub application_name: String,

    /// Number of frame slots cycled round-robin (bound on in-flight GPU work)
    pub frames_in_flight: usize,

    /// Render pass clear color (linear RGBA)
    pub clear_color: [f32; 4],

    /// Path to the compiled SPIR-V vertex shader
    pub vertex_shader_path: String,

    /// Path to the compiled SPIR-V fragment shader
    pub fragment_shader_path: String,

    /// Enable the Khronos validation layer (debug builds only)
    pub enable_validation: bool,

    /// Upper bound on concurrently live material descriptor sets
    pub max_material_sets: u32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            application_name: "vulkan_engine application".to_string(),
            frames_in_flight: 2,
            clear_color: [0.01, 0.01, 0.01, 1.0],
            vertex_shader_path: "shaders/simple.vert.spv".to_string(),
            fragment_shader_path: "shaders/simple.frag.spv".to_string(),
            enable_validation: cfg!(debug_assertions),
            max_material_sets: 1000,
        }
    }
}

impl Config for RendererConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = RendererConfig::default();
        assert_eq!(config.frames_in_flight, 2);
        assert!(config.max_material_sets > 0);
        assert!(config.vertex_shader_path.ends_with(".spv"));
        assert!(config.fragment_shader_path.ends_with(".spv"));
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: RendererConfig = toml::from_str("frames_in_flight = 3").unwrap();
        assert_eq!(config.frames_in_flight, 3);
        assert_eq!(config.max_material_sets, RendererConfig::default().max_material_sets);
    }

    #[test]
    fn toml_round_trip() {
        let mut config = RendererConfig::default();
        config.application_name = "round trip".to_string();
        config.frames_in_flight = 4;

        let serialized = toml::to_string_pretty(&config).unwrap();
        let parsed: RendererConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.application_name, "round trip");
        assert_eq!(parsed.frames_in_flight, 4);
        assert_eq!(parsed.clear_color, config.clear_color);
    }
}
