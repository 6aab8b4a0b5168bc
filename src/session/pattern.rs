//! Moving test pattern standing in for emulator output

use crate::format::{row_from_rgba, PixelFormat};

/// Draw frame number `frame` of the test pattern
///
/// Vertical color bars scroll one pixel per frame over a horizontal
/// brightness ramp. `stride` is the distance between rows in `data`.
pub fn fill_pattern(
    data: &mut [u8],
    format: PixelFormat,
    width: u32,
    height: u32,
    stride: usize,
    frame: u64,
) {
    const BARS: [[u8; 3]; 8] = [
        [0xff, 0xff, 0xff],
        [0xff, 0xff, 0x00],
        [0x00, 0xff, 0xff],
        [0x00, 0xff, 0x00],
        [0xff, 0x00, 0xff],
        [0xff, 0x00, 0x00],
        [0x00, 0x00, 0xff],
        [0x00, 0x00, 0x00],
    ];

    let width = width as usize;
    let row = format.row_size(width as u32);
    if width == 0 || stride < row {
        return;
    }

    let bar_width = (width / BARS.len()).max(1);
    let mut rgba = vec![0u8; width * 4];

    for y in 0..height as usize {
        let start = y * stride;
        if start + row > data.len() {
            break;
        }

        let level = 0x40 + (y * 0xbf / (height as usize).max(1)) as u16;
        for (x, px) in rgba.chunks_exact_mut(4).enumerate() {
            let bar = ((x + frame as usize) / bar_width) % BARS.len();
            let color = BARS[bar];
            px[0] = (color[0] as u16 * level / 0xff) as u8;
            px[1] = (color[1] as u16 * level / 0xff) as u8;
            px[2] = (color[2] as u16 * level / 0xff) as u8;
            px[3] = 0xff;
        }

        row_from_rgba(format, &rgba, &mut data[start..], width);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_scrolls() {
        let size = PixelFormat::Xrgb8888.frame_size(16, 4);
        let mut first = vec![0u8; size];
        let mut second = vec![0u8; size];
        fill_pattern(&mut first, PixelFormat::Xrgb8888, 16, 4, 64, 0);
        fill_pattern(&mut second, PixelFormat::Xrgb8888, 16, 4, 64, 1);
        assert_ne!(first, second);
        assert!(first.iter().any(|&b| b != 0));
    }

    #[test]
    fn test_pattern_respects_padding() {
        // 3 pixels of RGB565 use 6 of 8 bytes per row
        let mut data = vec![0xaau8; 16];
        fill_pattern(&mut data, PixelFormat::Rgb565, 3, 2, 8, 0);
        assert_eq!(&data[6..8], &[0xaa, 0xaa]);
        assert_eq!(&data[14..16], &[0xaa, 0xaa]);
    }
}
