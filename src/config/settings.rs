//! Pipeline configuration file support

use crate::render::{RenderManagerConfig, RenderVideoSettings};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Name of the configuration file looked up next to the executable
pub const CONFIG_FILE_NAME: &str = "framepool.toml";

/// Pipeline configuration loaded from TOML file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Wait for a free backend buffer in milliseconds
    pub header_timeout_ms: u64,

    /// Ticks a renderer counts as visible after drawing
    pub visibility_window: u64,

    /// Backend used by `run`
    pub backend: String,

    /// Buffers the backend may hand out at once (0 = unlimited)
    pub max_buffers: usize,

    /// Output surface size
    pub surface_width: u32,
    pub surface_height: u32,

    /// Default video settings
    pub video: RenderVideoSettings,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Log file path (empty = no file logging)
    pub log_file: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            header_timeout_ms: 500,
            visibility_window: 1,
            backend: "software".to_string(),
            max_buffers: 0,
            surface_width: 640,
            surface_height: 480,
            video: RenderVideoSettings::default(),
            log_level: "info".to_string(),
            log_file: String::new(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            source: e,
        })?;
        config.validate()?;

        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load configuration from default locations
    ///
    /// Searches in order:
    /// 1. Same directory as executable: framepool.toml
    /// 2. User configuration directory: framepool/config.toml
    pub fn load_default() -> Result<Self, ConfigError> {
        if let Ok(exe_path) = std::env::current_exe() {
            if let Some(exe_dir) = exe_path.parent() {
                let config_path = exe_dir.join(CONFIG_FILE_NAME);
                if config_path.exists() {
                    return Self::load(&config_path);
                }
            }
        }

        if let Some(config_path) = Self::user_config_path() {
            if config_path.exists() {
                return Self::load(&config_path);
            }
        }

        Ok(Self::default())
    }

    /// Per-user configuration file path
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("framepool").join("config.toml"))
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.display().to_string(),
                source: e,
            })?;
        }

        std::fs::write(path, content).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// Check values serde cannot
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.surface_width == 0 || self.surface_height == 0 {
            return Err(ConfigError::Invalid(format!(
                "surface size {}x{} is empty",
                self.surface_width, self.surface_height
            )));
        }
        // One buffer is held by the renderer and the current set at once
        if self.max_buffers == 1 {
            return Err(ConfigError::Invalid(
                "max_buffers must be 0 (unlimited) or at least 2".to_string(),
            ));
        }
        if self.header_timeout_ms > 60_000 {
            return Err(ConfigError::Invalid(format!(
                "header timeout of {} ms exceeds one minute",
                self.header_timeout_ms
            )));
        }
        Ok(())
    }

    pub fn max_buffers(&self) -> Option<usize> {
        if self.max_buffers == 0 {
            None
        } else {
            Some(self.max_buffers)
        }
    }

    /// Convert to RenderManagerConfig
    pub fn to_manager_config(&self) -> RenderManagerConfig {
        RenderManagerConfig {
            header_timeout: Duration::from_millis(self.header_timeout_ms),
            visibility_window: self.visibility_window,
            video_settings: self.video,
        }
    }

    /// Generate a sample configuration file content
    pub fn sample_config() -> String {
        r#"# framepool configuration

# Wait for a free backend buffer in milliseconds (default: 500)
header_timeout_ms = 500

# Ticks a renderer stays visible after its last draw (default: 1)
visibility_window = 1

# Backend used by `framepool run`
backend = "software"

# Buffers the backend may hand out at once (0 = unlimited, otherwise at least 2)
max_buffers = 0

# Output surface size
surface_width = 640
surface_height = 480

# Log level: trace, debug, info, warn, error (default: info)
log_level = "info"

# Log file path (empty = no file logging)
log_file = ""

[video]
# Scaling method: nearest, linear
scaling_method = "nearest"

# Stretch mode: normal, 4:3, fullscreen, original
stretch_mode = "normal"

# Counter-clockwise rotation in degrees: 0, 90, 180, 270
rotation_degrees = 0
"#
        .to_string()
    }
}

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{ScalingMethod, StretchMode};

    #[test]
    fn test_sample_config_parses_to_defaults() {
        let config: PipelineConfig = toml::from_str(&PipelineConfig::sample_config()).unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: PipelineConfig = toml::from_str(
            r#"
            max_buffers = 3
            [video]
            scaling_method = "linear"
            stretch_mode = "4:3"
            "#,
        )
        .unwrap();

        assert_eq!(config.max_buffers(), Some(3));
        assert_eq!(config.header_timeout_ms, 500);
        assert_eq!(config.video.scaling_method, ScalingMethod::Linear);
        assert_eq!(config.video.stretch_mode, StretchMode::Stretch4x3);

        let manager = config.to_manager_config();
        assert_eq!(manager.header_timeout, Duration::from_millis(500));
        assert_eq!(manager.video_settings.scaling_method, ScalingMethod::Linear);
    }

    #[test]
    fn test_save_and_load() {
        let dir = std::env::temp_dir().join(format!("framepool-config-{}", std::process::id()));
        let path = dir.join("nested").join("config.toml");

        let config = PipelineConfig {
            visibility_window: 3,
            log_file: "framepool.log".to_string(),
            ..Default::default()
        };
        config.save(&path).unwrap();
        assert_eq!(PipelineConfig::load(&path).unwrap(), config);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = std::env::temp_dir().join(format!("framepool-invalid-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "surface_width = 0\n").unwrap();

        assert!(matches!(
            PipelineConfig::load(&path),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            PipelineConfig::load(dir.join("missing.toml")),
            Err(ConfigError::Io { .. })
        ));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_single_buffer_limit_rejected() {
        let mut config = PipelineConfig {
            max_buffers: 1,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.max_buffers = 2;
        assert!(config.validate().is_ok());
        assert_eq!(config.max_buffers(), Some(2));
    }

    #[test]
    fn test_huge_visibility_window_accepted() {
        let config: PipelineConfig =
            toml::from_str(&format!("visibility_window = {}\n", i64::MAX)).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.to_manager_config().visibility_window, i64::MAX as u64);
    }
}
