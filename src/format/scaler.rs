//! Format-converting scaler
//!
//! Frames are expanded to RGBA8, resized with `image` and packed into the
//! destination format. One scaler is kept per destination format so the
//! scratch image survives between frames.

use super::{row_from_rgba, row_to_rgba, PixelFormat};
use crate::error::{FramePoolError, Result};
use crate::render::ScalingMethod;
use image::imageops::{self, FilterType};
use image::RgbaImage;
use std::collections::HashMap;
use tracing::debug;

/// Read-only view of a frame in memory
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    pub data: &'a [u8],
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    /// Bytes between the starts of consecutive rows
    pub stride: usize,
}

impl<'a> FrameView<'a> {
    /// Create a view whose stride is derived from the total size
    pub fn new(data: &'a [u8], format: PixelFormat, width: u32, height: u32) -> Self {
        Self {
            data,
            format,
            width,
            height,
            stride: stride_of(data.len(), height),
        }
    }
}

/// Writable view of a frame in memory
#[derive(Debug)]
pub struct FrameViewMut<'a> {
    pub data: &'a mut [u8],
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub stride: usize,
}

impl<'a> FrameViewMut<'a> {
    /// Create a view whose stride is derived from the total size
    pub fn new(data: &'a mut [u8], format: PixelFormat, width: u32, height: u32) -> Self {
        let stride = stride_of(data.len(), height);
        Self {
            data,
            format,
            width,
            height,
            stride,
        }
    }
}

fn stride_of(size: usize, height: u32) -> usize {
    if height == 0 {
        0
    } else {
        size / height as usize
    }
}

/// Check that a frame of `height` rows fits in `len` bytes
pub(crate) fn check_frame(
    len: usize,
    format: PixelFormat,
    width: u32,
    height: u32,
    stride: usize,
) -> Result<()> {
    let row = format.row_size(width);
    if row == 0 || height == 0 {
        return Err(FramePoolError::ZeroSize { width, height });
    }
    let required = stride.max(row) * (height as usize - 1) + row;
    if stride < row || len < required {
        return Err(FramePoolError::BufferTooSmall {
            required,
            actual: len,
        });
    }
    Ok(())
}

/// `image` filter implementing a scaling method
pub fn filter_for(method: ScalingMethod) -> FilterType {
    match method {
        ScalingMethod::Nearest => FilterType::Nearest,
        ScalingMethod::Linear => FilterType::Triangle,
    }
}

/// Scaler producing frames in a fixed destination format
pub struct Scaler {
    dst_format: PixelFormat,
    source: RgbaImage,
}

impl Scaler {
    /// Create a scaler targeting `dst_format`
    pub fn new(dst_format: PixelFormat) -> Self {
        Self {
            dst_format,
            source: RgbaImage::new(0, 0),
        }
    }

    /// Destination format this scaler writes
    pub fn dst_format(&self) -> PixelFormat {
        self.dst_format
    }

    /// Expand a frame into an RGBA image
    pub fn to_rgba(src: &FrameView<'_>) -> Result<RgbaImage> {
        check_frame(src.data.len(), src.format, src.width, src.height, src.stride)?;
        let mut image = RgbaImage::new(src.width, src.height);
        expand_into(src, &mut image);
        Ok(image)
    }

    /// Convert and resize `src` into `dst`
    ///
    /// The output always covers exactly `dst.width` x `dst.height` pixels,
    /// whatever the source dimensions are.
    pub fn scale(
        &mut self,
        src: &FrameView<'_>,
        dst: &mut FrameViewMut<'_>,
        method: ScalingMethod,
    ) -> Result<()> {
        check_frame(src.data.len(), src.format, src.width, src.height, src.stride)?;
        check_frame(dst.data.len(), dst.format, dst.width, dst.height, dst.stride)?;

        if self.source.dimensions() != (src.width, src.height) {
            debug!(
                "Scaler {}: resizing scratch image to {}x{}",
                self.dst_format, src.width, src.height
            );
            self.source = RgbaImage::new(src.width, src.height);
        }
        expand_into(src, &mut self.source);

        let resized;
        let image = if (src.width, src.height) == (dst.width, dst.height) {
            &self.source
        } else {
            resized = imageops::resize(&self.source, dst.width, dst.height, filter_for(method));
            &resized
        };

        let rgba_row = dst.width as usize * 4;
        let raw = image.as_raw();
        for y in 0..dst.height as usize {
            let src_row = &raw[y * rgba_row..(y + 1) * rgba_row];
            let dst_row = &mut dst.data[y * dst.stride..];
            row_from_rgba(dst.format, src_row, dst_row, dst.width as usize);
        }

        Ok(())
    }
}

fn expand_into(src: &FrameView<'_>, image: &mut RgbaImage) {
    let width = src.width as usize;
    let rgba_row = width * 4;
    let raw: &mut [u8] = image;
    for y in 0..src.height as usize {
        let src_row = &src.data[y * src.stride..];
        row_to_rgba(src.format, src_row, &mut raw[y * rgba_row..], width);
    }
}

/// One scaler per destination format
#[derive(Default)]
pub struct ScalerCache {
    scalers: HashMap<PixelFormat, Scaler>,
}

impl ScalerCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the scaler for `dst_format`, creating it on first use
    pub fn get(&mut self, dst_format: PixelFormat) -> &mut Scaler {
        self.scalers
            .entry(dst_format)
            .or_insert_with(|| Scaler::new(dst_format))
    }

    /// Number of cached scalers
    pub fn len(&self) -> usize {
        self.scalers.len()
    }

    /// Check if no scaler has been created yet
    pub fn is_empty(&self) -> bool {
        self.scalers.is_empty()
    }

    /// Drop all cached scalers
    pub fn clear(&mut self) {
        self.scalers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xrgb_frame(width: u32, height: u32, value: [u8; 4]) -> Vec<u8> {
        value
            .iter()
            .copied()
            .cycle()
            .take(PixelFormat::Xrgb8888.frame_size(width, height))
            .collect()
    }

    #[test]
    fn test_scale_output_matches_destination_size() {
        let src_data = xrgb_frame(8, 4, [0x00, 0x00, 0xff, 0x00]);
        let src = FrameView::new(&src_data, PixelFormat::Xrgb8888, 8, 4);

        let mut dst_data = vec![0u8; PixelFormat::Rgb565.frame_size(16, 8)];
        let mut dst = FrameViewMut::new(&mut dst_data, PixelFormat::Rgb565, 16, 8);

        let mut scaler = Scaler::new(PixelFormat::Rgb565);
        scaler.scale(&src, &mut dst, ScalingMethod::Nearest).unwrap();

        for px in dst_data.chunks_exact(2) {
            assert_eq!(u16::from_le_bytes([px[0], px[1]]), 0xf800);
        }
    }

    #[test]
    fn test_scale_respects_destination_stride() {
        let src_data = xrgb_frame(2, 2, [0xff, 0xff, 0xff, 0x00]);
        let src = FrameView::new(&src_data, PixelFormat::Xrgb8888, 2, 2);

        // 2 pixels of rgb565 = 4 bytes, padded to 8
        let mut dst_data = vec![0xaau8; 16];
        let mut dst = FrameViewMut::new(&mut dst_data, PixelFormat::Rgb565, 2, 2);
        assert_eq!(dst.stride, 8);

        Scaler::new(PixelFormat::Rgb565)
            .scale(&src, &mut dst, ScalingMethod::Linear)
            .unwrap();

        assert_eq!(&dst_data[..4], &[0xff; 4]);
        assert_eq!(&dst_data[4..8], &[0xaa; 4]);
        assert_eq!(&dst_data[8..12], &[0xff; 4]);
    }

    #[test]
    fn test_scale_rejects_short_source() {
        let src_data = vec![0u8; 10];
        let src = FrameView {
            data: &src_data,
            format: PixelFormat::Xrgb8888,
            width: 4,
            height: 4,
            stride: 16,
        };
        let mut dst_data = vec![0u8; 64];
        let mut dst = FrameViewMut::new(&mut dst_data, PixelFormat::Xrgb8888, 4, 4);

        let result =
            Scaler::new(PixelFormat::Xrgb8888).scale(&src, &mut dst, ScalingMethod::Nearest);
        assert!(matches!(result, Err(FramePoolError::BufferTooSmall { .. })));
    }

    #[test]
    fn test_cache_keeps_one_scaler_per_format() {
        let mut cache = ScalerCache::new();
        cache.get(PixelFormat::Rgb565);
        cache.get(PixelFormat::Rgb565);
        cache.get(PixelFormat::Rgba8888);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(PixelFormat::Rgba8888).dst_format(), PixelFormat::Rgba8888);
    }
}
