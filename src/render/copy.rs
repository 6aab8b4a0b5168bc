//! Frame copy into render buffers

use crate::error::Result;
use crate::format::{check_frame, FrameView, FrameViewMut, ScalerCache};
use crate::render::ScalingMethod;
use tracing::trace;

/// How a frame reached its destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyKind {
    /// One copy of the whole frame
    Direct,
    /// Row by row, strides differ
    Rows,
    /// Converted and/or resized through a scaler
    Scaled,
}

/// Copy `src` into `dst`, converting or resizing when needed
///
/// Matching format and dimensions copy bytes; anything else goes through the
/// scaler cached for the destination format.
pub fn copy_frame(
    src: &FrameView<'_>,
    dst: &mut FrameViewMut<'_>,
    scalers: &mut ScalerCache,
    method: ScalingMethod,
) -> Result<CopyKind> {
    if src.format != dst.format || src.width != dst.width || src.height != dst.height {
        scalers.get(dst.format).scale(src, dst, method)?;
        trace!(
            "Scaled {}x{} {} frame to {}x{} {}",
            src.width,
            src.height,
            src.format,
            dst.width,
            dst.height,
            dst.format
        );
        return Ok(CopyKind::Scaled);
    }

    check_frame(src.data.len(), src.format, src.width, src.height, src.stride)?;
    check_frame(dst.data.len(), dst.format, dst.width, dst.height, dst.stride)?;

    if src.stride == dst.stride {
        let size = src.stride * src.height as usize;
        let size = size.min(src.data.len()).min(dst.data.len());
        dst.data[..size].copy_from_slice(&src.data[..size]);
        return Ok(CopyKind::Direct);
    }

    let row = src.format.row_size(src.width);
    for y in 0..src.height as usize {
        let from = &src.data[y * src.stride..y * src.stride + row];
        dst.data[y * dst.stride..y * dst.stride + row].copy_from_slice(from);
    }
    Ok(CopyKind::Rows)
}
