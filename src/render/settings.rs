//! Render settings shared between the GUI layer and renderers

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Filter applied when a frame is scaled to the screen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalingMethod {
    #[default]
    Nearest,
    Linear,
}

impl ScalingMethod {
    /// All scaling methods, in preference order
    pub const ALL: [ScalingMethod; 2] = [ScalingMethod::Nearest, ScalingMethod::Linear];

    pub fn name(&self) -> &'static str {
        match self {
            ScalingMethod::Nearest => "nearest",
            ScalingMethod::Linear => "linear",
        }
    }
}

impl std::fmt::Display for ScalingMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ScalingMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nearest" => Ok(ScalingMethod::Nearest),
            "linear" | "bilinear" => Ok(ScalingMethod::Linear),
            _ => Err(format!("unknown scaling method '{}'", s)),
        }
    }
}

/// How the frame is fitted into the view
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StretchMode {
    /// Keep the display aspect ratio of the stream
    #[default]
    Normal,
    /// Force a 4:3 display aspect ratio
    #[serde(rename = "4:3")]
    Stretch4x3,
    /// Fill the whole view
    Fullscreen,
    /// One stream pixel per screen pixel
    Original,
}

impl StretchMode {
    pub fn name(&self) -> &'static str {
        match self {
            StretchMode::Normal => "normal",
            StretchMode::Stretch4x3 => "4:3",
            StretchMode::Fullscreen => "fullscreen",
            StretchMode::Original => "original",
        }
    }
}

impl std::fmt::Display for StretchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StretchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "normal" => Ok(StretchMode::Normal),
            "4:3" | "4x3" => Ok(StretchMode::Stretch4x3),
            "fullscreen" => Ok(StretchMode::Fullscreen),
            "original" => Ok(StretchMode::Original),
            _ => Err(format!("unknown stretch mode '{}'", s)),
        }
    }
}

/// Optional renderer capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderFeature {
    Stretch,
    Zoom,
    PixelRatio,
    Rotation,
}

/// Video settings applied when presenting a frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderVideoSettings {
    pub scaling_method: ScalingMethod,
    pub stretch_mode: StretchMode,
    /// Counter-clockwise rotation requested by the user
    pub rotation_degrees: u32,
}

impl RenderVideoSettings {
    /// Settings carrying only a scaling method, used for capability queries
    pub fn with_scaling_method(method: ScalingMethod) -> Self {
        Self {
            scaling_method: method,
            ..Self::default()
        }
    }
}

/// Per-control overrides from the GUI layer
///
/// Fields left as `None` fall back to the global settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GuiRenderSettings {
    pub video_filter: Option<ScalingMethod>,
    pub stretch_mode: Option<StretchMode>,
    pub rotation_degrees: Option<u32>,
}

impl GuiRenderSettings {
    pub fn has_video_filter(&self) -> bool {
        self.video_filter.is_some()
    }

    pub fn has_stretch_mode(&self) -> bool {
        self.stretch_mode.is_some()
    }

    pub fn has_rotation(&self) -> bool {
        self.rotation_degrees.is_some()
    }

    /// Apply these overrides on top of `global`
    pub fn merge(&self, global: &RenderVideoSettings) -> RenderVideoSettings {
        RenderVideoSettings {
            scaling_method: self.video_filter.unwrap_or(global.scaling_method),
            stretch_mode: self.stretch_mode.unwrap_or(global.stretch_mode),
            rotation_degrees: self.rotation_degrees.unwrap_or(global.rotation_degrees),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_overrides() {
        let global = RenderVideoSettings {
            scaling_method: ScalingMethod::Linear,
            stretch_mode: StretchMode::Fullscreen,
            rotation_degrees: 90,
        };
        let gui = GuiRenderSettings {
            video_filter: Some(ScalingMethod::Nearest),
            ..Default::default()
        };

        let merged = gui.merge(&global);
        assert_eq!(merged.scaling_method, ScalingMethod::Nearest);
        assert_eq!(merged.stretch_mode, StretchMode::Fullscreen);
        assert_eq!(merged.rotation_degrees, 90);
        assert!(gui.has_video_filter());
        assert!(!gui.has_rotation());
    }

    #[test]
    fn test_stretch_mode_names() {
        assert_eq!("4x3".parse::<StretchMode>(), Ok(StretchMode::Stretch4x3));
        assert_eq!(StretchMode::Stretch4x3.to_string(), "4:3");
        assert!("zoom".parse::<StretchMode>().is_err());
    }

    #[test]
    fn test_settings_toml() {
        let settings: RenderVideoSettings =
            toml::from_str("scaling_method = \"linear\"\nstretch_mode = \"4:3\"").unwrap();
        assert_eq!(settings.scaling_method, ScalingMethod::Linear);
        assert_eq!(settings.stretch_mode, StretchMode::Stretch4x3);
        assert_eq!(settings.rotation_degrees, 0);
    }
}
