//! Pixel formats, row conversion and scaling

mod convert;
mod scaler;

pub use convert::{row_from_rgba, row_to_rgba};
pub use scaler::{filter_for, FrameView, FrameViewMut, Scaler, ScalerCache};
pub(crate) use scaler::check_frame;

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Pixel layout of a frame as stored in memory
///
/// Multi-byte formats are little-endian, matching what emulator cores hand out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// 32-bit 0RGB, unused top byte (bytes B, G, R, X)
    #[default]
    Xrgb8888,
    /// 16-bit RGB 5:6:5
    Rgb565,
    /// 16-bit 0RGB 1:5:5:5
    Rgb555,
    /// 32-bit bytes R, G, B, A
    Rgba8888,
    /// 32-bit bytes B, G, R, A
    Bgra8888,
}

impl PixelFormat {
    /// All known formats
    pub const ALL: [PixelFormat; 5] = [
        PixelFormat::Xrgb8888,
        PixelFormat::Rgb565,
        PixelFormat::Rgb555,
        PixelFormat::Rgba8888,
        PixelFormat::Bgra8888,
    ];

    /// Bytes occupied by one pixel
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgb565 | PixelFormat::Rgb555 => 2,
            PixelFormat::Xrgb8888 | PixelFormat::Rgba8888 | PixelFormat::Bgra8888 => 4,
        }
    }

    /// Bytes in one tightly packed row
    pub fn row_size(&self, width: u32) -> usize {
        (width as usize).saturating_mul(self.bytes_per_pixel())
    }

    /// Bytes in a tightly packed frame, or 0 if the size overflows
    pub fn frame_size(&self, width: u32, height: u32) -> usize {
        self.row_size(width)
            .checked_mul(height as usize)
            .unwrap_or(0)
    }

    /// Lowercase name used in configuration files and on the command line
    pub fn name(&self) -> &'static str {
        match self {
            PixelFormat::Xrgb8888 => "xrgb8888",
            PixelFormat::Rgb565 => "rgb565",
            PixelFormat::Rgb555 => "rgb555",
            PixelFormat::Rgba8888 => "rgba8888",
            PixelFormat::Bgra8888 => "bgra8888",
        }
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PixelFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        PixelFormat::ALL
            .iter()
            .copied()
            .find(|format| format.name() == lower)
            .ok_or_else(|| format!("unknown pixel format '{}'", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_size() {
        assert_eq!(PixelFormat::Xrgb8888.frame_size(256, 240), 256 * 240 * 4);
        assert_eq!(PixelFormat::Rgb565.frame_size(320, 224), 320 * 224 * 2);
        assert_eq!(PixelFormat::Rgb555.frame_size(0, 240), 0);
    }

    #[test]
    fn test_parse_names() {
        for format in PixelFormat::ALL {
            assert_eq!(format.name().parse::<PixelFormat>(), Ok(format));
        }
        assert_eq!("RGB565".parse::<PixelFormat>(), Ok(PixelFormat::Rgb565));
        assert!("yuv420".parse::<PixelFormat>().is_err());
    }
}
