use std::path::PathBuf;
use clap::{Parser, ValueEnum};
use log::LevelFilter;
use crate::config::{ConfigError, EngineConfig, GraphicsApi};

/// Log level options for command-line argument.
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Off,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::Trace,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Off => LevelFilter::Off,
        }
    }
}

/// Common command-line arguments for Prism applications.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct EngineArgs {
    /// Set the log verbosity level
    #[arg(short = 'l', long = "log-level", value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Engine configuration file (TOML)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Override the graphics api from the configuration
    #[arg(long = "api", value_enum)]
    pub api: Option<GraphicsApi>,

    /// Override the vsync interval (0 disables vsync)
    #[arg(long = "vsync")]
    pub vsync: Option<u32>,

    /// Override the number of frames in flight
    #[arg(long = "frames")]
    pub frames: Option<u32>,

    /// Force graphics api validation on
    #[arg(long = "validation")]
    pub validation: bool,

    /// Additional positional arguments passed to the application
    #[arg(trailing_var_arg = true)]
    pub args: Vec<String>,
}

impl EngineArgs {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Load the configuration file (if any) and apply command-line overrides on top of it.
    pub fn resolve_config(&self) -> Result<EngineConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::load(path)?,
            None => EngineConfig::default(),
        };

        if let Some(api) = self.api {
            config.graphics_api = api;
        }
        if let Some(vsync) = self.vsync {
            config.vsync_interval = vsync;
        }
        if let Some(frames) = self.frames {
            config.frame_buffer_count = frames;
        }
        if self.validation {
            config.enable_validation = true;
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn overrides_take_priority_over_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "graphics_api = \"vulkan\"").unwrap();
        writeln!(file, "vsync_interval = 2").unwrap();

        let path = file.path().to_string_lossy().into_owned();
        let args = EngineArgs::try_parse_from([
            "prism", "--config", path.as_str(), "--api", "headless", "--frames", "2",
        ])
        .unwrap();

        let config = args.resolve_config().unwrap();
        assert_eq!(config.graphics_api, GraphicsApi::Headless);
        assert_eq!(config.vsync_interval, 2);
        assert_eq!(config.frame_buffer_count, 2);
    }

    #[test]
    fn invalid_override_is_rejected() {
        let args = EngineArgs::try_parse_from(["prism", "--frames", "16"]).unwrap();
        assert!(args.resolve_config().is_err());
    }

    #[test]
    fn api_names() {
        let args = EngineArgs::try_parse_from(["prism", "--api", "dx12"]).unwrap();
        assert_eq!(args.api, Some(GraphicsApi::DirectX12));
        let level: LevelFilter = args.log_level.into();
        assert_eq!(level, LevelFilter::Info);
    }
}
