//! Startup configuration of the engine.
//!
//! Every value here is fixed for the lifetime of a device. The configuration is read once
//! from an optional TOML file, patched by command-line overrides and validated before the
//! RHI is created.

use std::path::{Path, PathBuf};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

pub const DEFAULT_FRAME_BUFFER_COUNT: u32 = 3;
pub const MIN_FRAME_BUFFER_COUNT: u32 = 2;
pub const MAX_FRAME_BUFFER_COUNT: u32 = 4;
/// DXGI refuses sync intervals above 4, Vulkan follows the same limit.
pub const MAX_VSYNC_INTERVAL: u32 = 4;
pub const DEFAULT_TILE_SIZE: u32 = 16;
/// Hard limit of shader visible samplers on DirectX12.
pub const MAX_SAMPLER_CAPACITY: u32 = 2048;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config value `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}

/// Native graphics api used by the render hardware interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum GraphicsApi {
    #[serde(rename = "dx12")]
    #[value(name = "dx12")]
    DirectX12,
    Vulkan,
    /// CPU-only backend that records and simulates GPU work. Never presents to a screen.
    Headless,
}

impl Default for GraphicsApi {
    fn default() -> Self {
        if cfg!(windows) {
            GraphicsApi::DirectX12
        } else {
            GraphicsApi::Vulkan
        }
    }
}

impl std::fmt::Display for GraphicsApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GraphicsApi::DirectX12 => write!(f, "DirectX12"),
            GraphicsApi::Vulkan => write!(f, "Vulkan"),
            GraphicsApi::Headless => write!(f, "Headless"),
        }
    }
}

/// Maximum number of descriptors per descriptor type, allocated up-front at device creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HeapCapacities {
    pub rtv: u32,
    pub dsv: u32,
    pub cbv: u32,
    pub srv: u32,
    pub uav: u32,
    pub samplers: u32,
}

impl Default for HeapCapacities {
    fn default() -> Self {
        Self {
            rtv: 1000,
            dsv: 100,
            cbv: 10240,
            srv: 10240,
            uav: 10240,
            samplers: 16,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Prism".to_owned(),
            width: 1920,
            height: 1080,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub graphics_api: GraphicsApi,
    /// Back buffer depth, also the number of frames in flight.
    pub frame_buffer_count: u32,
    /// 0 disables vsync, N waits for N vertical blanks.
    pub vsync_interval: u32,
    pub heap_capacities: HeapCapacities,
    /// Light culling tile edge in pixels.
    pub tile_size: u32,
    pub use_hdr: bool,
    pub use_raytracing: bool,
    pub enable_validation: bool,
    pub profiler_port: Option<u16>,
    pub window: WindowConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            graphics_api: GraphicsApi::default(),
            frame_buffer_count: DEFAULT_FRAME_BUFFER_COUNT,
            vsync_interval: 0,
            heap_capacities: HeapCapacities::default(),
            tile_size: DEFAULT_TILE_SIZE,
            use_hdr: false,
            use_raytracing: false,
            enable_validation: cfg!(debug_assertions),
            profiler_port: None,
            window: WindowConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        log::info!("Loading engine config from {}", path.display());
        Self::from_toml_str(&text)
    }

    #[inline]
    pub fn vsync_enabled(&self) -> bool {
        self.vsync_interval > 0
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_FRAME_BUFFER_COUNT..=MAX_FRAME_BUFFER_COUNT).contains(&self.frame_buffer_count) {
            return Err(invalid(
                "frame_buffer_count",
                format!(
                    "{} is outside of [{}, {}]",
                    self.frame_buffer_count, MIN_FRAME_BUFFER_COUNT, MAX_FRAME_BUFFER_COUNT
                ),
            ));
        }

        if self.vsync_interval > MAX_VSYNC_INTERVAL {
            return Err(invalid(
                "vsync_interval",
                format!("{} exceeds the maximum of {}", self.vsync_interval, MAX_VSYNC_INTERVAL),
            ));
        }

        if !self.tile_size.is_power_of_two() || !(8..=32).contains(&self.tile_size) {
            return Err(invalid(
                "tile_size",
                format!("{} must be a power of two in [8, 32]", self.tile_size),
            ));
        }

        let heaps = &self.heap_capacities;
        for (field, value) in [
            ("heap_capacities.rtv", heaps.rtv),
            ("heap_capacities.dsv", heaps.dsv),
            ("heap_capacities.cbv", heaps.cbv),
            ("heap_capacities.srv", heaps.srv),
            ("heap_capacities.uav", heaps.uav),
            ("heap_capacities.samplers", heaps.samplers),
        ] {
            if value == 0 {
                return Err(invalid(field, "capacity must be greater than zero".to_owned()));
            }
        }
        if heaps.samplers > MAX_SAMPLER_CAPACITY {
            return Err(invalid(
                "heap_capacities.samplers",
                format!("{} exceeds the maximum of {}", heaps.samplers, MAX_SAMPLER_CAPACITY),
            ));
        }

        if self.window.width == 0 || self.window.height == 0 {
            return Err(invalid(
                "window",
                format!("{}x{} is not a valid window size", self.window.width, self.window.height),
            ));
        }

        Ok(())
    }
}

fn invalid(field: &'static str, reason: String) -> ConfigError {
    ConfigError::Invalid { field, reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_matches_engine_constants() {
        let config = EngineConfig::default();
        assert_eq!(config.frame_buffer_count, 3);
        assert_eq!(config.vsync_interval, 0);
        assert_eq!(config.tile_size, 16);
        assert_eq!(config.heap_capacities.rtv, 1000);
        assert_eq!(config.heap_capacities.dsv, 100);
        assert_eq!(config.heap_capacities.cbv, 10240);
        assert_eq!(config.heap_capacities.srv, 10240);
        assert_eq!(config.heap_capacities.uav, 10240);
        assert_eq!(config.heap_capacities.samplers, 16);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            graphics_api = "headless"
            vsync_interval = 1

            [heap_capacities]
            rtv = 8
            "#,
        )
        .unwrap();

        assert_eq!(config.graphics_api, GraphicsApi::Headless);
        assert!(config.vsync_enabled());
        assert_eq!(config.heap_capacities.rtv, 8);
        assert_eq!(config.heap_capacities.dsv, 100);
        assert_eq!(config.frame_buffer_count, 3);
    }

    #[test]
    fn dx12_is_spelled_short() {
        let config = EngineConfig::from_toml_str("graphics_api = \"dx12\"").unwrap();
        assert_eq!(config.graphics_api, GraphicsApi::DirectX12);
    }

    #[test]
    fn rejects_out_of_range_values() {
        let err = EngineConfig::from_toml_str("frame_buffer_count = 9").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "frame_buffer_count", .. }));

        let err = EngineConfig::from_toml_str("tile_size = 12").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "tile_size", .. }));

        let err = EngineConfig::from_toml_str("[heap_capacities]\ndsv = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "heap_capacities.dsv", .. }));

        let err = EngineConfig::from_toml_str("vsync_interval = 5").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "vsync_interval", .. }));
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = EngineConfig::from_toml_str("frame_count = 3").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "tile_size = 32").unwrap();
        writeln!(file, "[window]").unwrap();
        writeln!(file, "width = 640").unwrap();
        writeln!(file, "height = 480").unwrap();

        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.tile_size, 32);
        assert_eq!(config.window.width, 640);
        assert_eq!(config.window.height, 480);
        assert_eq!(config.window.title, "Prism");
    }

    #[test]
    fn missing_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let err = EngineConfig::load(&path).unwrap_err();
        match err {
            ConfigError::Io { path: reported, .. } => assert_eq!(reported, path),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
