//! CPU backend: memory buffers, RGBA textures and an RGBA surface

use crate::buffer::{BufferRef, BufferStorage};
use crate::error::{FramePoolError, Result};
use crate::format::{filter_for, FrameView, PixelFormat, Scaler};
use crate::geometry::{dest_rect, Rotation};
use crate::pool::{BufferPool, HeaderSlots, PoolBackend};
use crate::render::{
    BackendContext, RenderFeature, RenderPass, RenderVideoSettings, Renderer, RendererFactory,
    ScalingMethod,
};
use image::{imageops, Rgba, RgbaImage};
use parking_lot::Mutex;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Render system name of the software backend
pub const SOFTWARE_RENDER_SYSTEM: &str = "software";

/// Rows are padded to this many bytes
const ROW_ALIGNMENT: usize = 4;

fn supports_feature(feature: RenderFeature) -> bool {
    matches!(
        feature,
        RenderFeature::Stretch | RenderFeature::PixelRatio | RenderFeature::Rotation
    )
}

/// Frame memory in a plain byte vector
pub struct MemoryStorage {
    data: Vec<u8>,
    format: PixelFormat,
    width: u32,
    height: u32,
    stride: usize,
    texture: Option<Arc<RgbaImage>>,
    uploads: u64,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            format: PixelFormat::default(),
            width: 0,
            height: 0,
            stride: 0,
            texture: None,
            uploads: 0,
        }
    }

    /// Bytes between the starts of consecutive rows
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Last uploaded texture
    pub fn texture(&self) -> Option<Arc<RgbaImage>> {
        self.texture.clone()
    }

    /// Number of successful uploads
    pub fn upload_count(&self) -> u64 {
        self.uploads
    }

    fn reset(&mut self) {
        *self = Self {
            uploads: self.uploads,
            ..Self::new()
        };
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferStorage for MemoryStorage {
    fn allocate(&mut self, format: PixelFormat, width: u32, height: u32) -> Result<()> {
        let row = format.row_size(width);
        if row == 0 || height == 0 {
            self.reset();
            return Err(FramePoolError::ZeroSize { width, height });
        }

        let stride = row.div_ceil(ROW_ALIGNMENT) * ROW_ALIGNMENT;
        let Some(size) = stride.checked_mul(height as usize) else {
            self.reset();
            return Err(FramePoolError::AllocationFailed(format!(
                "{}x{} {} frame is too large",
                width, height, format
            )));
        };

        self.data.clear();
        self.data.resize(size, 0);
        self.format = format;
        self.width = width;
        self.height = height;
        self.stride = stride;
        self.texture = None;
        Ok(())
    }

    fn memory(&self) -> &[u8] {
        &self.data
    }

    fn memory_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    fn upload_texture(&mut self) -> bool {
        let view = FrameView {
            data: &self.data,
            format: self.format,
            width: self.width,
            height: self.height,
            stride: self.stride,
        };

        match Scaler::to_rgba(&view) {
            Ok(texture) => {
                self.texture = Some(Arc::new(texture));
                self.uploads += 1;
                true
            }
            Err(e) => {
                warn!("Texture upload failed: {}", e);
                false
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Pool hooks of the software backend
pub struct SoftwarePoolBackend {
    headers: Option<HeaderSlots>,
}

impl SoftwarePoolBackend {
    /// Create the pool backend, optionally limited to `max_buffers` outstanding buffers
    pub fn new(max_buffers: Option<usize>) -> Self {
        Self {
            headers: max_buffers.map(HeaderSlots::new),
        }
    }
}

impl PoolBackend for SoftwarePoolBackend {
    fn name(&self) -> &str {
        SOFTWARE_RENDER_SYSTEM
    }

    fn configure(&self, format: PixelFormat) -> Result<()> {
        debug!("Software pool accepts {}", format);
        Ok(())
    }

    fn is_compatible(&self, _settings: &RenderVideoSettings) -> bool {
        true
    }

    fn create_storage(&self) -> Box<dyn BufferStorage> {
        Box::new(MemoryStorage::new())
    }

    fn wait_for_header(&self, timeout: Duration) -> bool {
        self.headers
            .as_ref()
            .map_or(true, |headers| headers.acquire(timeout))
    }

    fn release_header(&self) {
        if let Some(headers) = &self.headers {
            headers.release();
        }
    }
}

/// Factory for the software backend
pub struct SoftwareFactory {
    max_buffers: Option<usize>,
    surface: Arc<Mutex<RgbaImage>>,
}

impl SoftwareFactory {
    /// Create a factory drawing into a `width` x `height` surface
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            max_buffers: None,
            surface: Arc::new(Mutex::new(RgbaImage::new(width, height))),
        }
    }

    /// Limit the number of buffers checked out of the pool at once
    pub fn with_max_buffers(mut self, max_buffers: usize) -> Self {
        self.max_buffers = Some(max_buffers);
        self
    }

    pub fn max_buffers(&self) -> Option<usize> {
        self.max_buffers
    }

    /// Surface shared by every renderer of this factory
    pub fn surface(&self) -> Arc<Mutex<RgbaImage>> {
        self.surface.clone()
    }

    /// Copy of the surface contents
    pub fn snapshot(&self) -> RgbaImage {
        self.surface.lock().clone()
    }
}

impl RendererFactory for SoftwareFactory {
    fn render_system_name(&self) -> &str {
        SOFTWARE_RENDER_SYSTEM
    }

    fn create_renderer(
        &self,
        _settings: &RenderVideoSettings,
        _pool: &Arc<BufferPool>,
    ) -> Option<Box<dyn Renderer>> {
        Some(Box::new(SoftwareRenderer::new(self.surface.clone())))
    }

    fn create_buffer_pools(&self, context: &BackendContext) -> Vec<Arc<BufferPool>> {
        vec![BufferPool::new(
            Box::new(SoftwarePoolBackend::new(self.max_buffers)),
            context.header_timeout,
        )]
    }

    fn supports_render_feature(&self, feature: RenderFeature) -> bool {
        supports_feature(feature)
    }
}

/// Renderer drawing uploaded textures into the shared surface
pub struct SoftwareRenderer {
    surface: Arc<Mutex<RgbaImage>>,
    buffer: Option<BufferRef>,
    format: Option<PixelFormat>,
}

impl SoftwareRenderer {
    pub fn new(surface: Arc<Mutex<RgbaImage>>) -> Self {
        Self {
            surface,
            buffer: None,
            format: None,
        }
    }

    pub fn format(&self) -> Option<PixelFormat> {
        self.format
    }

    fn draw(
        &self,
        surface: &mut RgbaImage,
        texture: &RgbaImage,
        rotation: Rotation,
        pass: &RenderPass,
    ) {
        let rect = dest_rect(
            texture.width(),
            texture.height(),
            pass.pixel_aspect,
            pass.settings.stretch_mode,
            rotation,
            pass.view,
        );
        if rect.is_empty() {
            return;
        }

        let width = rect.width.round().max(1.0) as u32;
        let height = rect.height.round().max(1.0) as u32;
        let rotated = rotation.apply(texture);
        let filter = filter_for(pass.settings.scaling_method);
        let scaled = imageops::resize(&rotated, width, height, filter);

        // Clip to the view
        let x = rect.x.round() as i64;
        let y = rect.y.round() as i64;
        let left = x.max(pass.view.x.round() as i64);
        let top = y.max(pass.view.y.round() as i64);
        let right = (x + width as i64).min((pass.view.x + pass.view.width).round() as i64);
        let bottom = (y + height as i64).min((pass.view.y + pass.view.height).round() as i64);
        if right <= left || bottom <= top {
            return;
        }

        let visible = imageops::crop_imm(
            &scaled,
            (left - x) as u32,
            (top - y) as u32,
            (right - left) as u32,
            (bottom - top) as u32,
        )
        .to_image();

        if pass.use_alpha {
            imageops::overlay(surface, &visible, left, top);
        } else {
            imageops::replace(surface, &visible, left, top);
        }
    }
}

impl Renderer for SoftwareRenderer {
    fn configure(&mut self, format: PixelFormat) -> Result<()> {
        let (width, height) = self.surface.lock().dimensions();
        if width == 0 || height == 0 {
            return Err(FramePoolError::backend_configure(
                SOFTWARE_RENDER_SYSTEM,
                format!("surface is {}x{}", width, height),
            ));
        }
        self.format = Some(format);
        Ok(())
    }

    fn supports_scaling_method(&self, method: ScalingMethod) -> bool {
        ScalingMethod::ALL.contains(&method)
    }

    fn supports(&self, feature: RenderFeature) -> bool {
        supports_feature(feature)
    }

    fn set_buffer(&mut self, buffer: BufferRef) {
        self.buffer = Some(buffer);
    }

    fn render_frame(&mut self, pass: &RenderPass) {
        let mut surface = self.surface.lock();
        if pass.clear {
            for pixel in surface.pixels_mut() {
                *pixel = Rgba([0, 0, 0, 0xff]);
            }
        }

        let Some(buffer) = &self.buffer else {
            return;
        };

        let texture = buffer.with_storage(|storage| {
            storage
                .as_any()
                .downcast_ref::<MemoryStorage>()
                .and_then(MemoryStorage::texture)
        });
        let Some(texture) = texture else {
            trace!("Buffer {} has no texture to draw", buffer.id());
            return;
        };

        let rotation = buffer
            .rotation()
            .compose(Rotation::from_degrees(pass.settings.rotation_degrees));
        self.draw(&mut surface, &texture, rotation, pass);
        buffer.set_rendered(true);
    }

    fn flush(&mut self) {
        self.buffer = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;
    use crate::render::StretchMode;

    fn pass(view: Rect, stretch_mode: StretchMode) -> RenderPass {
        RenderPass {
            clear: true,
            use_alpha: false,
            view,
            settings: RenderVideoSettings {
                stretch_mode,
                ..Default::default()
            },
            pixel_aspect: 1.0,
        }
    }

    #[test]
    fn test_renderer_rejects_empty_surface() {
        let mut renderer = SoftwareRenderer::new(Arc::new(Mutex::new(RgbaImage::new(0, 0))));
        let err = renderer.configure(PixelFormat::Xrgb8888).unwrap_err();
        assert!(matches!(err, FramePoolError::BackendConfigure { .. }));
        assert!(renderer.format().is_none());

        let mut renderer = SoftwareRenderer::new(Arc::new(Mutex::new(RgbaImage::new(4, 4))));
        renderer.configure(PixelFormat::Rgb565).unwrap();
        assert_eq!(renderer.format(), Some(PixelFormat::Rgb565));
    }

    #[test]
    fn test_storage_pads_rows() {
        let mut storage = MemoryStorage::new();
        storage.allocate(PixelFormat::Rgb565, 3, 2).unwrap();
        assert_eq!(storage.stride(), 8);
        assert_eq!(storage.frame_size(), 16);
        assert!(storage.texture().is_none());
    }

    #[test]
    fn test_storage_zero_size_resets() {
        let mut storage = MemoryStorage::new();
        storage.allocate(PixelFormat::Xrgb8888, 4, 4).unwrap();
        assert!(storage.allocate(PixelFormat::Xrgb8888, 0, 4).is_err());
        assert_eq!(storage.frame_size(), 0);
        assert_eq!(storage.stride(), 0);
    }

    #[test]
    fn test_upload_converts_to_rgba() {
        let mut storage = MemoryStorage::new();
        storage.allocate(PixelFormat::Xrgb8888, 2, 2).unwrap();
        for px in storage.memory_mut().chunks_exact_mut(4) {
            px.copy_from_slice(&[0x10, 0x20, 0x30, 0x00]);
        }

        assert!(storage.upload_texture());
        let texture = storage.texture().unwrap();
        assert_eq!(texture.dimensions(), (2, 2));
        assert_eq!(texture.get_pixel(1, 1).0, [0x30, 0x20, 0x10, 0xff]);
        assert_eq!(storage.upload_count(), 1);
    }

    #[test]
    fn test_upload_of_empty_storage_fails() {
        let mut storage = MemoryStorage::new();
        assert!(!storage.upload_texture());
    }

    #[test]
    fn test_max_buffers_limits_pool() {
        let factory = SoftwareFactory::new(16, 16).with_max_buffers(1);
        let pool = factory
            .create_buffer_pools(&BackendContext {
                header_timeout: Duration::from_millis(5),
            })
            .remove(0);
        pool.configure(PixelFormat::Xrgb8888).unwrap();

        let held = pool.get_buffer(4, 4).unwrap();
        assert!(pool.get_buffer(4, 4).is_none());
        drop(held);
        assert!(pool.get_buffer(4, 4).is_some());
    }

    #[test]
    fn test_renderer_fills_view() {
        let factory = SoftwareFactory::new(8, 8);
        let pool = factory
            .create_buffer_pools(&BackendContext::default())
            .remove(0);
        pool.configure(PixelFormat::Xrgb8888).unwrap();

        let buffer = pool.get_buffer(2, 2).unwrap();
        buffer.with_memory_mut(|memory, _| {
            for px in memory.chunks_exact_mut(4) {
                px.copy_from_slice(&[0xff, 0x00, 0x00, 0x00]);
            }
        });
        assert!(buffer.upload_texture());

        let mut renderer = factory
            .create_renderer(&RenderVideoSettings::default(), &pool)
            .unwrap();
        renderer.configure(PixelFormat::Xrgb8888).unwrap();
        renderer.set_buffer(buffer.clone());
        assert!(!buffer.is_rendered());

        renderer.render_frame(&pass(Rect::from_size(8, 8), StretchMode::Fullscreen));
        assert!(buffer.is_rendered());

        let surface = factory.snapshot();
        assert!(surface.pixels().all(|p| p.0 == [0x00, 0x00, 0xff, 0xff]));
    }

    #[test]
    fn test_renderer_letterboxes_and_clears() {
        let factory = SoftwareFactory::new(8, 4);
        let pool = factory
            .create_buffer_pools(&BackendContext::default())
            .remove(0);
        pool.configure(PixelFormat::Rgba8888).unwrap();

        let buffer = pool.get_buffer(1, 1).unwrap();
        buffer.with_memory_mut(|memory, _| memory[..4].copy_from_slice(&[0xff, 0xff, 0xff, 0xff]));
        buffer.upload_texture();

        let mut renderer = SoftwareRenderer::new(factory.surface());
        renderer.set_buffer(buffer);
        renderer.render_frame(&pass(Rect::from_size(8, 4), StretchMode::Normal));

        // A square frame in an 8x4 view covers the middle 4x4
        let surface = factory.snapshot();
        assert_eq!(surface.get_pixel(0, 0).0, [0, 0, 0, 0xff]);
        assert_eq!(surface.get_pixel(2, 0).0, [0xff, 0xff, 0xff, 0xff]);
        assert_eq!(surface.get_pixel(5, 3).0, [0xff, 0xff, 0xff, 0xff]);
        assert_eq!(surface.get_pixel(7, 3).0, [0, 0, 0, 0xff]);

        renderer.flush();
        renderer.render_frame(&pass(Rect::from_size(8, 4), StretchMode::Normal));
        assert!(factory.snapshot().pixels().all(|p| p.0 == [0, 0, 0, 0xff]));
    }
}
