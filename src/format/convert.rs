//! Row conversion between pixel formats and RGBA8

use super::PixelFormat;

#[inline]
fn expand5(v: u16) -> u8 {
    let v = (v & 0x1f) as u8;
    (v << 3) | (v >> 2)
}

#[inline]
fn expand6(v: u16) -> u8 {
    let v = (v & 0x3f) as u8;
    (v << 2) | (v >> 4)
}

/// Convert `width` pixels of `format` from `src` into RGBA8 in `dst`
///
/// Both slices must hold at least one row of their respective layout.
pub fn row_to_rgba(format: PixelFormat, src: &[u8], dst: &mut [u8], width: usize) {
    let bpp = format.bytes_per_pixel();
    let src = &src[..width * bpp];
    let dst = &mut dst[..width * 4];

    match format {
        PixelFormat::Rgba8888 => dst.copy_from_slice(src),
        PixelFormat::Bgra8888 | PixelFormat::Xrgb8888 => {
            let opaque = format == PixelFormat::Xrgb8888;
            for (s, d) in src.chunks_exact(4).zip(dst.chunks_exact_mut(4)) {
                d[0] = s[2];
                d[1] = s[1];
                d[2] = s[0];
                d[3] = if opaque { 0xff } else { s[3] };
            }
        }
        PixelFormat::Rgb565 => {
            for (s, d) in src.chunks_exact(2).zip(dst.chunks_exact_mut(4)) {
                let px = u16::from_le_bytes([s[0], s[1]]);
                d[0] = expand5(px >> 11);
                d[1] = expand6(px >> 5);
                d[2] = expand5(px);
                d[3] = 0xff;
            }
        }
        PixelFormat::Rgb555 => {
            for (s, d) in src.chunks_exact(2).zip(dst.chunks_exact_mut(4)) {
                let px = u16::from_le_bytes([s[0], s[1]]);
                d[0] = expand5(px >> 10);
                d[1] = expand5(px >> 5);
                d[2] = expand5(px);
                d[3] = 0xff;
            }
        }
    }
}

/// Convert `width` RGBA8 pixels from `src` into `format` in `dst`
pub fn row_from_rgba(format: PixelFormat, src: &[u8], dst: &mut [u8], width: usize) {
    let bpp = format.bytes_per_pixel();
    let src = &src[..width * 4];
    let dst = &mut dst[..width * bpp];

    match format {
        PixelFormat::Rgba8888 => dst.copy_from_slice(src),
        PixelFormat::Bgra8888 | PixelFormat::Xrgb8888 => {
            let opaque = format == PixelFormat::Xrgb8888;
            for (s, d) in src.chunks_exact(4).zip(dst.chunks_exact_mut(4)) {
                d[0] = s[2];
                d[1] = s[1];
                d[2] = s[0];
                d[3] = if opaque { 0 } else { s[3] };
            }
        }
        PixelFormat::Rgb565 => {
            for (s, d) in src.chunks_exact(4).zip(dst.chunks_exact_mut(2)) {
                let px = ((u16::from(s[0]) >> 3) << 11)
                    | ((u16::from(s[1]) >> 2) << 5)
                    | (u16::from(s[2]) >> 3);
                d.copy_from_slice(&px.to_le_bytes());
            }
        }
        PixelFormat::Rgb555 => {
            for (s, d) in src.chunks_exact(4).zip(dst.chunks_exact_mut(2)) {
                let px = ((u16::from(s[0]) >> 3) << 10)
                    | ((u16::from(s[1]) >> 3) << 5)
                    | (u16::from(s[2]) >> 3);
                d.copy_from_slice(&px.to_le_bytes());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xrgb_to_rgba() {
        // 0x00112233 little-endian
        let src = [0x33, 0x22, 0x11, 0x00];
        let mut dst = [0u8; 4];
        row_to_rgba(PixelFormat::Xrgb8888, &src, &mut dst, 1);
        assert_eq!(dst, [0x11, 0x22, 0x33, 0xff]);
    }

    #[test]
    fn test_rgb565_extremes() {
        let white = 0xffffu16.to_le_bytes();
        let red = 0xf800u16.to_le_bytes();
        let src = [white[0], white[1], red[0], red[1]];
        let mut dst = [0u8; 8];
        row_to_rgba(PixelFormat::Rgb565, &src, &mut dst, 2);
        assert_eq!(&dst[..4], &[0xff, 0xff, 0xff, 0xff]);
        assert_eq!(&dst[4..], &[0xff, 0x00, 0x00, 0xff]);
    }

    #[test]
    fn test_rgb555_from_rgba() {
        let src = [0x00, 0xff, 0x00, 0xff];
        let mut dst = [0u8; 2];
        row_from_rgba(PixelFormat::Rgb555, &src, &mut dst, 1);
        assert_eq!(u16::from_le_bytes(dst), 0x03e0);
    }

    #[test]
    fn test_xrgb_drops_alpha() {
        let src = [0x10, 0x20, 0x30, 0x80];
        let mut dst = [0xaau8; 4];
        row_from_rgba(PixelFormat::Xrgb8888, &src, &mut dst, 1);
        assert_eq!(dst, [0x30, 0x20, 0x10, 0x00]);
    }
}
