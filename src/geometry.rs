//! Rotation and on-screen placement of frames

use crate::render::StretchMode;
use image::{imageops, RgbaImage};

/// Quarter-turn rotation, counter-clockwise
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Normalise any angle to the nearest quarter turn
    pub fn from_degrees(degrees: u32) -> Self {
        match ((degrees % 360 + 45) / 90) % 4 {
            0 => Rotation::Deg0,
            1 => Rotation::Deg90,
            2 => Rotation::Deg180,
            _ => Rotation::Deg270,
        }
    }

    pub fn degrees(&self) -> u32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// Rotation equivalent to applying `self` then `other`
    pub fn compose(self, other: Rotation) -> Rotation {
        Rotation::from_degrees(self.degrees() + other.degrees())
    }

    /// Check if width and height swap on screen
    pub fn is_quarter_turn(&self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }

    /// Rotate an image counter-clockwise by this amount
    pub fn apply(&self, image: &RgbaImage) -> RgbaImage {
        match self {
            Rotation::Deg0 => image.clone(),
            Rotation::Deg90 => imageops::rotate270(image),
            Rotation::Deg180 => imageops::rotate180(image),
            Rotation::Deg270 => imageops::rotate90(image),
        }
    }
}

/// Axis-aligned rectangle in screen coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle at the origin covering a full target
    pub fn from_size(width: u32, height: u32) -> Self {
        Self::new(0.0, 0.0, width as f32, height as f32)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Rectangle of the given size centred on this one
    pub fn centered(&self, width: f32, height: f32) -> Rect {
        Rect::new(
            self.x + (self.width - width) / 2.0,
            self.y + (self.height - height) / 2.0,
            width,
            height,
        )
    }
}

/// Compute where a `source_width` x `source_height` frame is drawn inside `view`
///
/// `pixel_aspect` is the width/height ratio of one source pixel. With
/// `StretchMode::Original` the result may exceed the view; the caller clips.
pub fn dest_rect(
    source_width: u32,
    source_height: u32,
    pixel_aspect: f32,
    stretch: StretchMode,
    rotation: Rotation,
    view: Rect,
) -> Rect {
    if source_width == 0 || source_height == 0 || view.is_empty() {
        return Rect::default();
    }

    let pixel_aspect = if pixel_aspect > 0.0 { pixel_aspect } else { 1.0 };
    let mut width = source_width as f32 * pixel_aspect;
    let mut height = source_height as f32;

    if stretch == StretchMode::Original {
        if rotation.is_quarter_turn() {
            std::mem::swap(&mut width, &mut height);
        }
        return view.centered(width, height);
    }

    let mut aspect = match stretch {
        StretchMode::Stretch4x3 => 4.0 / 3.0,
        StretchMode::Fullscreen => return view,
        _ => width / height,
    };
    if rotation.is_quarter_turn() {
        aspect = 1.0 / aspect;
    }

    let view_aspect = view.width / view.height;
    let (width, height) = if view_aspect > aspect {
        (view.height * aspect, view.height)
    } else {
        (view.width, view.width / aspect)
    };

    view.centered(width, height)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_normalise() {
        assert_eq!(Rotation::from_degrees(0), Rotation::Deg0);
        assert_eq!(Rotation::from_degrees(90), Rotation::Deg90);
        assert_eq!(Rotation::from_degrees(269), Rotation::Deg270);
        assert_eq!(Rotation::from_degrees(450), Rotation::Deg90);
        assert_eq!(Rotation::Deg270.compose(Rotation::Deg180), Rotation::Deg90);
    }

    #[test]
    fn test_normal_keeps_aspect() {
        let view = Rect::from_size(1920, 1080);
        let rect = dest_rect(256, 240, 1.0, StretchMode::Normal, Rotation::Deg0, view);
        assert_eq!(rect.height, 1080.0);
        assert!((rect.width - 1152.0).abs() < 0.01);
        assert!((rect.x - 384.0).abs() < 0.01);
        assert_eq!(rect.y, 0.0);
    }

    #[test]
    fn test_quarter_turn_swaps_aspect() {
        let view = Rect::from_size(1000, 1000);
        let rect = dest_rect(400, 200, 1.0, StretchMode::Normal, Rotation::Deg90, view);
        assert_eq!(rect.width, 500.0);
        assert_eq!(rect.height, 1000.0);
    }

    #[test]
    fn test_fullscreen_and_original() {
        let view = Rect::new(10.0, 20.0, 800.0, 600.0);
        assert_eq!(
            dest_rect(256, 224, 1.0, StretchMode::Fullscreen, Rotation::Deg0, view),
            view
        );

        let rect = dest_rect(256, 224, 1.0, StretchMode::Original, Rotation::Deg0, view);
        assert_eq!(rect, Rect::new(282.0, 208.0, 256.0, 224.0));
    }

    #[test]
    fn test_degenerate_source() {
        let view = Rect::from_size(640, 480);
        assert!(dest_rect(0, 240, 1.0, StretchMode::Normal, Rotation::Deg0, view).is_empty());
    }

    #[test]
    fn test_apply_rotates_counter_clockwise() {
        let red = image::Rgba([255, 0, 0, 255]);
        let blue = image::Rgba([0, 0, 255, 255]);
        let mut image = RgbaImage::new(2, 1);
        image.put_pixel(0, 0, red);
        image.put_pixel(1, 0, blue);

        let rotated = Rotation::Deg90.apply(&image);
        assert_eq!(rotated.dimensions(), (1, 2));
        assert_eq!(*rotated.get_pixel(0, 0), blue);
        assert_eq!(*rotated.get_pixel(0, 1), red);

        assert_eq!(Rotation::Deg0.apply(&image), image);
    }
}
