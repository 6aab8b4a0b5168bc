//! Renderer backends and the bookkeeping around them

use super::{RenderFeature, RenderVideoSettings, ScalingMethod};
use crate::buffer::BufferRef;
use crate::error::Result;
use crate::format::PixelFormat;
use crate::geometry::Rect;
use crate::pool::{BufferPool, RendererVisibility};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::debug;

/// Default wait for a hardware buffer header
pub const DEFAULT_HEADER_TIMEOUT: Duration = Duration::from_millis(500);

static NEXT_RENDERER_ID: AtomicU64 = AtomicU64::new(1);

/// Parameters of one draw call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderPass {
    /// Clear the target before drawing
    pub clear: bool,
    /// Blend with the target using the frame's alpha
    pub use_alpha: bool,
    /// Region of the target to draw into
    pub view: Rect,
    /// Effective video settings for this target
    pub settings: RenderVideoSettings,
    /// Width/height ratio of one stream pixel
    pub pixel_aspect: f32,
}

/// Backend renderer drawing frames from one buffer pool
pub trait Renderer: Send {
    /// Prepare for frames of `format`
    fn configure(&mut self, format: PixelFormat) -> Result<()>;

    fn supports_scaling_method(&self, method: ScalingMethod) -> bool;

    fn supports(&self, _feature: RenderFeature) -> bool {
        false
    }

    /// Take a reference to the buffer to draw next
    fn set_buffer(&mut self, buffer: BufferRef);

    /// Draw the current buffer
    fn render_frame(&mut self, pass: &RenderPass);

    /// Drop the current buffer
    fn flush(&mut self);
}

/// Resources shared with backend factories when pools are created
#[derive(Debug, Clone, Copy)]
pub struct BackendContext {
    pub header_timeout: Duration,
}

impl Default for BackendContext {
    fn default() -> Self {
        Self {
            header_timeout: DEFAULT_HEADER_TIMEOUT,
        }
    }
}

/// Factory registered by a graphics backend
pub trait RendererFactory: Send + Sync {
    /// Name of the render system, unique per backend
    fn render_system_name(&self) -> &str;

    /// Create a renderer drawing buffers of `pool`
    fn create_renderer(
        &self,
        settings: &RenderVideoSettings,
        pool: &Arc<BufferPool>,
    ) -> Option<Box<dyn Renderer>>;

    /// Create the buffer pools this backend provides
    fn create_buffer_pools(&self, context: &BackendContext) -> Vec<Arc<BufferPool>>;

    /// Check if renderers of this backend support a feature
    fn supports_render_feature(&self, _feature: RenderFeature) -> bool {
        false
    }
}

/// Backend factories available to a render manager
#[derive(Default, Clone)]
pub struct RendererRegistry {
    factories: Vec<Arc<dyn RendererFactory>>,
}

impl RendererRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a backend; earlier registrations are preferred
    pub fn register(&mut self, factory: Arc<dyn RendererFactory>) -> &mut Self {
        debug!("Registered render system: {}", factory.render_system_name());
        self.factories.push(factory);
        self
    }

    pub fn factories(&self) -> &[Arc<dyn RendererFactory>] {
        &self.factories
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

/// A live renderer plus its visibility bookkeeping
pub struct RendererInstance {
    id: u64,
    pool: Arc<BufferPool>,
    renderer: Mutex<Box<dyn Renderer>>,
    settings: Mutex<RenderVideoSettings>,
    /// Render manager ticks seen by this renderer
    frame_count: AtomicU64,
    /// Tick of the last draw
    last_render: AtomicU64,
    visibility_window: u64,
}

impl RendererInstance {
    /// Wrap a backend renderer and register it with its pool
    pub fn new(
        pool: Arc<BufferPool>,
        renderer: Box<dyn Renderer>,
        settings: RenderVideoSettings,
        visibility_window: u64,
    ) -> Arc<Self> {
        let instance = Arc::new(Self {
            id: NEXT_RENDERER_ID.fetch_add(1, Ordering::Relaxed),
            pool,
            renderer: Mutex::new(renderer),
            settings: Mutex::new(settings),
            frame_count: AtomicU64::new(0),
            last_render: AtomicU64::new(0),
            visibility_window,
        });

        let weak: Weak<RendererInstance> = Arc::downgrade(&instance);
        instance.pool.register_renderer(weak);
        instance
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    /// Reconfigure the backend renderer for a new stream format
    pub fn configure(&self, format: PixelFormat) -> Result<()> {
        self.renderer.lock().configure(format)
    }

    /// Check if this renderer can draw with `settings`
    pub fn is_compatible(&self, settings: &RenderVideoSettings) -> bool {
        self.pool.is_compatible(settings)
            && self
                .renderer
                .lock()
                .supports_scaling_method(settings.scaling_method)
    }

    pub fn supports(&self, feature: RenderFeature) -> bool {
        self.renderer.lock().supports(feature)
    }

    pub fn settings(&self) -> RenderVideoSettings {
        *self.settings.lock()
    }

    pub fn set_settings(&self, settings: RenderVideoSettings) {
        *self.settings.lock() = settings;
    }

    /// Advance the tick counter
    pub fn frame_move(&self) {
        self.frame_count.fetch_add(1, Ordering::AcqRel);
    }

    pub fn set_buffer(&self, buffer: BufferRef) {
        self.renderer.lock().set_buffer(buffer);
    }

    /// Draw and mark the renderer visible for this tick
    pub fn render(&self, pass: &RenderPass) {
        self.last_render
            .store(self.frame_count.load(Ordering::Acquire), Ordering::Release);
        self.renderer.lock().render_frame(pass);
    }

    pub fn flush(&self) {
        self.renderer.lock().flush();
    }
}

impl RendererVisibility for RendererInstance {
    fn renderer_id(&self) -> u64 {
        self.id
    }

    fn is_visible(&self) -> bool {
        let frame_count = self.frame_count.load(Ordering::Acquire);
        let last_render = self.last_render.load(Ordering::Acquire);
        frame_count <= last_render.saturating_add(self.visibility_window)
    }
}

impl Drop for RendererInstance {
    fn drop(&mut self) {
        self.pool.unregister_renderer(self.id);
    }
}
