//! Render manager: frames in from the game thread, draws out on the GUI thread
//!
//! The game thread calls [`RenderManager::add_frame`] (or fills a buffer from
//! [`RenderManager::get_video_buffer`] first). Every pool with a visible
//! renderer receives its own copy of the frame, and the resulting set of
//! buffers replaces the current set in one step. The GUI thread calls
//! [`RenderManager::frame_move`] once per tick and then
//! [`RenderManager::render_window`] or [`RenderManager::render_control`].

use super::copy::copy_frame;
use super::{
    BackendContext, GuiRenderSettings, PlaybackSpeed, RenderFeature, RenderPass,
    RenderVideoSettings, RendererInstance, RendererRegistry, ScalingMethod, DEFAULT_HEADER_TIMEOUT,
};
use crate::buffer::{BufferId, BufferRef, RenderBuffer};
use crate::error::{FramePoolError, Result};
use crate::format::{FrameView, FrameViewMut, PixelFormat, Scaler, ScalerCache};
use crate::geometry::Rect;
use crate::pool::{BufferManager, BufferPool};
use image::RgbaImage;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Render manager configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderManagerConfig {
    /// Bounded wait for a backend buffer header
    pub header_timeout: Duration,
    /// Ticks a renderer stays visible after its last draw
    pub visibility_window: u64,
    /// Initial global video settings
    pub video_settings: RenderVideoSettings,
}

impl Default for RenderManagerConfig {
    fn default() -> Self {
        Self {
            header_timeout: DEFAULT_HEADER_TIMEOUT,
            visibility_window: 1,
            video_settings: RenderVideoSettings::default(),
        }
    }
}

/// Configuration state of the render manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    Unconfigured,
    /// Stream parameters recorded, applied at the next tick
    Configuring,
    Configured,
}

/// Parameters of the video stream produced by the game
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamConfig {
    pub format: PixelFormat,
    pub nominal_width: u32,
    pub nominal_height: u32,
    pub max_width: u32,
    pub max_height: u32,
    /// Width/height ratio of one pixel, 0 for square pixels
    pub pixel_aspect_ratio: f32,
}

impl StreamConfig {
    /// Stream of fixed size with square pixels
    pub fn new(format: PixelFormat, width: u32, height: u32) -> Self {
        Self {
            format,
            nominal_width: width,
            nominal_height: height,
            max_width: width,
            max_height: height,
            pixel_aspect_ratio: 0.0,
        }
    }

    pub fn pixel_aspect(&self) -> f32 {
        if self.pixel_aspect_ratio > 0.0 {
            self.pixel_aspect_ratio
        } else {
            1.0
        }
    }

    fn validate(&self) -> Result<()> {
        if self.format.frame_size(self.nominal_width, self.nominal_height) == 0 {
            return Err(FramePoolError::ZeroSize {
                width: self.nominal_width,
                height: self.nominal_height,
            });
        }
        if self.max_width < self.nominal_width || self.max_height < self.nominal_height {
            return Err(FramePoolError::InvalidConfig(format!(
                "maximum size {}x{} is smaller than nominal size {}x{}",
                self.max_width, self.max_height, self.nominal_width, self.nominal_height
            )));
        }
        if !self.pixel_aspect_ratio.is_finite() || self.pixel_aspect_ratio < 0.0 {
            return Err(FramePoolError::InvalidConfig(format!(
                "invalid pixel aspect ratio {}",
                self.pixel_aspect_ratio
            )));
        }
        Ok(())
    }
}

/// Where `add_frame` reads the frame from
#[derive(Debug, Clone, Copy)]
pub enum FrameSource<'a> {
    /// Frame in caller memory, laid out in the stream format
    Memory(&'a [u8]),
    /// Buffer previously handed out by `get_video_buffer`
    VideoBuffer(&'a VideoBuffer),
}

/// Buffer the game writes a frame into directly
pub struct VideoBuffer {
    buffer: BufferRef,
}

impl VideoBuffer {
    pub fn id(&self) -> BufferId {
        self.buffer.id()
    }

    pub fn format(&self) -> PixelFormat {
        self.buffer.format()
    }

    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    /// Size of the frame memory in bytes
    pub fn frame_size(&self) -> usize {
        self.buffer.frame_size()
    }

    /// Bytes between the starts of consecutive rows
    pub fn stride(&self) -> usize {
        match self.height() {
            0 => 0,
            height => self.frame_size() / height as usize,
        }
    }

    /// Write into the frame memory
    pub fn write<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        self.buffer.with_memory_mut(|memory, _| f(memory))
    }
}

impl std::fmt::Debug for VideoBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoBuffer")
            .field("id", &self.id())
            .field("format", &self.format())
            .finish()
    }
}

/// Frame kept while paused, tightly packed
struct CachedFrame {
    data: Vec<u8>,
    format: PixelFormat,
    width: u32,
    height: u32,
}

impl CachedFrame {
    fn copy_from(src: &FrameView<'_>) -> Option<Self> {
        let row = src.format.row_size(src.width);
        let height = src.height as usize;
        if row == 0 || height == 0 || src.stride < row {
            return None;
        }
        if src.data.len() < src.stride * (height - 1) + row {
            return None;
        }

        let mut data = Vec::with_capacity(row * height);
        for y in 0..height {
            data.extend_from_slice(&src.data[y * src.stride..y * src.stride + row]);
        }

        Some(Self {
            data,
            format: src.format,
            width: src.width,
            height: src.height,
        })
    }

    fn view(&self) -> FrameView<'_> {
        FrameView::new(&self.data, self.format, self.width, self.height)
    }
}

/// Frame counters of a render manager
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Frames installed as the current set
    pub frames_added: u64,
    /// Frames delivered through a video buffer without a copy
    pub zero_copy_frames: u64,
    /// Frames discarded before reaching any pool
    pub frames_dropped: u64,
    /// Draw calls issued
    pub frames_rendered: u64,
    pub uploads: u64,
    pub upload_failures: u64,
    /// Times the pause cache was filled
    pub cache_fills: u64,
}

#[derive(Default)]
struct Counters {
    frames_added: AtomicU64,
    zero_copy_frames: AtomicU64,
    frames_dropped: AtomicU64,
    frames_rendered: AtomicU64,
    uploads: AtomicU64,
    upload_failures: AtomicU64,
    cache_fills: AtomicU64,
}

struct ManagerState {
    render_state: RenderState,
    stream: Option<StreamConfig>,
    /// Format the renderers were last configured for
    active_format: Option<PixelFormat>,
}

/// Frame pipeline between the game thread and the GUI thread
pub struct RenderManager {
    buffers: BufferManager,
    visibility_window: u64,
    state: Mutex<ManagerState>,
    video_settings: Mutex<RenderVideoSettings>,
    speed: PlaybackSpeed,
    flush_requested: AtomicBool,
    /// Bumped by every flush so late cache fills can be discarded
    flush_generation: AtomicU64,
    /// Buffers handed out by `get_video_buffer` for the current tick
    pending: Mutex<Vec<BufferRef>>,
    /// At most one buffer per pool
    current: Mutex<Vec<BufferRef>>,
    cache: Mutex<Option<Arc<CachedFrame>>>,
    renderers: Mutex<Vec<Arc<RendererInstance>>>,
    scalers: Mutex<ScalerCache>,
    counters: Counters,
}

impl RenderManager {
    /// Create a render manager and the buffer pools of every registered backend
    pub fn new(registry: &RendererRegistry, config: RenderManagerConfig) -> Self {
        let buffers = BufferManager::new();
        let context = BackendContext {
            header_timeout: config.header_timeout,
        };
        for factory in registry.factories() {
            let pools = factory.create_buffer_pools(&context);
            buffers.register_pools(factory.clone(), pools);
        }

        info!(
            "Render manager created with {} backends, {} buffer pools",
            registry.factories().len(),
            buffers.buffer_pools().len()
        );

        Self {
            buffers,
            visibility_window: config.visibility_window,
            state: Mutex::new(ManagerState {
                render_state: RenderState::Unconfigured,
                stream: None,
                active_format: None,
            }),
            video_settings: Mutex::new(config.video_settings),
            speed: PlaybackSpeed::new(),
            flush_requested: AtomicBool::new(false),
            flush_generation: AtomicU64::new(0),
            pending: Mutex::new(Vec::new()),
            current: Mutex::new(Vec::new()),
            cache: Mutex::new(None),
            renderers: Mutex::new(Vec::new()),
            scalers: Mutex::new(ScalerCache::new()),
            counters: Counters::default(),
        }
    }

    /// Record new stream parameters
    ///
    /// Takes effect at the next `frame_move`.
    pub fn configure(&self, stream: StreamConfig) -> Result<()> {
        stream.validate()?;

        let mut state = self.state.lock();
        state.stream = Some(stream);
        state.render_state = RenderState::Configuring;

        info!(
            "Configuring render manager: {} {}x{} (max {}x{}), pixel aspect {}",
            stream.format,
            stream.nominal_width,
            stream.nominal_height,
            stream.max_width,
            stream.max_height,
            stream.pixel_aspect()
        );
        Ok(())
    }

    /// Tear everything down back to the unconfigured state
    pub fn deinitialize(&self) {
        let pending = std::mem::take(&mut *self.pending.lock());
        let current = std::mem::take(&mut *self.current.lock());
        let cache = self.cache.lock().take();
        let renderers = std::mem::take(&mut *self.renderers.lock());

        for renderer in &renderers {
            renderer.flush();
        }
        drop(renderers);
        drop(pending);
        drop(current);
        drop(cache);

        self.buffers.flush_pools();
        self.scalers.lock().clear();
        self.flush_requested.store(false, Ordering::Release);

        let mut state = self.state.lock();
        state.render_state = RenderState::Unconfigured;
        state.stream = None;
        state.active_format = None;
        debug!("Render manager deinitialized");
    }

    pub fn set_speed(&self, speed: f64) {
        self.speed.set(speed);
    }

    pub fn speed(&self) -> f64 {
        self.speed.get()
    }

    pub fn render_state(&self) -> RenderState {
        self.state.lock().render_state
    }

    pub fn stream_config(&self) -> Option<StreamConfig> {
        self.state.lock().stream
    }

    /// Stream parameters, if frames are currently accepted
    fn configured_stream(&self) -> Option<StreamConfig> {
        if self.flush_requested.load(Ordering::Acquire) {
            return None;
        }
        let state = self.state.lock();
        match state.render_state {
            RenderState::Configured => state.stream,
            _ => None,
        }
    }

    /// Pools whose renderers drew recently
    fn visible_pools(&self) -> Vec<Arc<BufferPool>> {
        self.buffers
            .buffer_pools()
            .into_iter()
            .filter(|pool| pool.has_visible_renderer())
            .collect()
    }

    /// Add a frame from the game thread
    ///
    /// Frames arriving while flushing or unconfigured are dropped silently.
    pub fn add_frame(
        &self,
        source: FrameSource<'_>,
        width: u32,
        height: u32,
        orientation_ccw: u32,
    ) {
        let Some(stream) = self.configured_stream() else {
            trace!("Dropping frame, render manager not ready");
            self.counters.frames_dropped.fetch_add(1, Ordering::Relaxed);
            return;
        };
        if width == 0 || height == 0 {
            return;
        }

        match source {
            FrameSource::Memory(data) => {
                if data.is_empty() {
                    return;
                }
                let src = FrameView::new(data, stream.format, width, height);
                self.add_memory_frame(&src, orientation_ccw);
            }
            FrameSource::VideoBuffer(video) => self.add_video_buffer(video, orientation_ccw),
        }
    }

    fn add_memory_frame(&self, src: &FrameView<'_>, orientation_ccw: u32) {
        let mut frames = Vec::new();
        for pool in self.visible_pools() {
            let Some(buffer) = pool.get_buffer(src.width, src.height) else {
                continue;
            };
            if self.copy_into(src, &buffer) {
                frames.push(buffer);
            }
        }

        self.present(frames, orientation_ccw);
        self.update_cache(|| CachedFrame::copy_from(src));
    }

    fn add_video_buffer(&self, video: &VideoBuffer, orientation_ccw: u32) {
        let pending = std::mem::take(&mut *self.pending.lock());
        let Some(written) = pending.iter().find(|buffer| buffer.id() == video.id()).cloned() else {
            trace!("Video buffer {} is not pending, dropping frame", video.id());
            self.counters.frames_dropped.fetch_add(1, Ordering::Relaxed);
            return;
        };

        // Other pools still need their own copy
        let mut frames = Vec::with_capacity(pending.len());
        for buffer in pending {
            if buffer.ptr_eq(&written) {
                frames.push(buffer);
                continue;
            }
            let copied = written.with_memory(|data, geometry| {
                let src = FrameView::new(data, geometry.format, geometry.width, geometry.height);
                self.copy_into(&src, &buffer)
            });
            if copied {
                frames.push(buffer);
            }
        }

        self.counters.zero_copy_frames.fetch_add(1, Ordering::Relaxed);
        self.present(frames, orientation_ccw);
        self.update_cache(|| {
            written.with_memory(|data, geometry| {
                CachedFrame::copy_from(&FrameView::new(
                    data,
                    geometry.format,
                    geometry.width,
                    geometry.height,
                ))
            })
        });
    }

    /// Install a new current set, releasing the old one outside the lock
    fn present(&self, frames: Vec<BufferRef>, orientation_ccw: u32) {
        if frames.is_empty() {
            self.counters.frames_dropped.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.frames_added.fetch_add(1, Ordering::Relaxed);
        }
        for buffer in &frames {
            buffer.set_rotation(orientation_ccw);
        }

        let previous = std::mem::replace(&mut *self.current.lock(), frames);
        drop(previous);
    }

    /// Keep the paused frame, or drop it once playback resumes
    fn update_cache(&self, fill: impl FnOnce() -> Option<CachedFrame>) {
        if !self.speed.is_paused() {
            let cached = self.cache.lock().take();
            if cached.is_some() {
                debug!("Playback resumed, dropping cached frame");
            }
            return;
        }
        if self.cache.lock().is_some() {
            return;
        }

        let generation = self.flush_generation.load(Ordering::Acquire);
        let Some(frame) = fill() else {
            return;
        };

        let mut cache = self.cache.lock();
        let flushed = self.flush_requested.load(Ordering::Acquire)
            || self.flush_generation.load(Ordering::Acquire) != generation;
        if cache.is_none() && !flushed {
            debug!(
                "Cached paused frame {}x{} {}",
                frame.width, frame.height, frame.format
            );
            *cache = Some(Arc::new(frame));
            self.counters.cache_fills.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn has_cached_frame(&self) -> bool {
        self.cache.lock().is_some()
    }

    /// Get buffers the game can write its next frame into
    ///
    /// One buffer is taken from every pool with a visible renderer; the first
    /// is returned. Pass it back through [`FrameSource::VideoBuffer`].
    pub fn get_video_buffer(&self, width: u32, height: u32) -> Option<VideoBuffer> {
        let previous = std::mem::take(&mut *self.pending.lock());
        drop(previous);

        self.configured_stream()?;
        if width == 0 || height == 0 {
            return None;
        }

        let pending: Vec<BufferRef> = self
            .visible_pools()
            .iter()
            .filter_map(|pool| pool.get_buffer(width, height))
            .collect();

        let Some(first) = pending.first().cloned() else {
            trace!("No pool supplied a {}x{} video buffer", width, height);
            return None;
        };

        let stale = std::mem::replace(&mut *self.pending.lock(), pending);
        drop(stale);
        Some(VideoBuffer { buffer: first })
    }

    /// Advance one GUI tick
    ///
    /// Applies a pending flush and a pending configuration, then updates the
    /// visibility bookkeeping of every renderer.
    pub fn frame_move(&self) {
        self.check_flush();

        let configured = {
            let mut state = self.state.lock();
            match (state.render_state, state.stream) {
                (RenderState::Configuring, Some(stream)) => {
                    state.render_state = RenderState::Configured;
                    let previous = state.active_format.replace(stream.format);
                    Some((stream, previous))
                }
                _ => None,
            }
        };

        if let Some((stream, previous)) = configured {
            info!(
                "Render manager configured for {} {}x{}",
                stream.format, stream.nominal_width, stream.nominal_height
            );
            if previous.is_some_and(|format| format != stream.format) {
                self.reconfigure(stream.format);
            }
        }

        let renderers = self.renderers.lock().clone();
        for renderer in &renderers {
            renderer.frame_move();
        }
    }

    /// Move existing renderers and pools to a new stream format
    fn reconfigure(&self, format: PixelFormat) {
        let current = std::mem::take(&mut *self.current.lock());
        let cache = self.cache.lock().take();
        drop(current);
        drop(cache);

        let renderers = std::mem::take(&mut *self.renderers.lock());
        let mut kept = Vec::with_capacity(renderers.len());
        for renderer in renderers {
            let pool = renderer.pool();
            let result = match pool.format() {
                Some(current) if current == format => Ok(()),
                _ => pool.configure(format),
            }
            .and_then(|()| renderer.configure(format));

            match result {
                Ok(()) => kept.push(renderer),
                Err(e) => warn!("Dropping renderer {} after format change: {}", renderer.id(), e),
            }
        }

        self.renderers.lock().extend(kept);
    }

    /// Request a flush, applied at the next `frame_move`
    pub fn flush(&self) {
        debug!("Render manager flush requested");
        self.flush_requested.store(true, Ordering::Release);
    }

    /// Apply a pending flush
    ///
    /// Releases the current buffers and the cached frame, drops every
    /// renderer and flushes every pool.
    pub fn check_flush(&self) {
        if !self.flush_requested.load(Ordering::Acquire) {
            return;
        }
        self.flush_generation.fetch_add(1, Ordering::AcqRel);

        let pending = std::mem::take(&mut *self.pending.lock());
        let current = std::mem::take(&mut *self.current.lock());
        let cache = self.cache.lock().take();
        let renderers = std::mem::take(&mut *self.renderers.lock());

        for renderer in &renderers {
            renderer.flush();
        }
        drop(renderers);
        drop(pending);
        drop(current);
        drop(cache);

        self.buffers.flush_pools();

        {
            let mut state = self.state.lock();
            if state.render_state != RenderState::Configuring {
                state.render_state = RenderState::Unconfigured;
            }
            state.active_format = None;
        }

        self.flush_requested.store(false, Ordering::Release);
        info!("Render manager flushed");
    }

    /// Draw the current frame into the whole window
    pub fn render_window(&self, clear: bool, width: u32, height: u32) -> bool {
        let settings = self.effective_settings(&GuiRenderSettings::default());
        self.render(clear, false, Rect::from_size(width, height), settings)
    }

    /// Draw the current frame into a GUI control
    pub fn render_control(
        &self,
        clear: bool,
        use_alpha: bool,
        region: Rect,
        gui_settings: &GuiRenderSettings,
    ) -> bool {
        let settings = self.effective_settings(gui_settings);
        self.render(clear, use_alpha, region, settings)
    }

    fn render(
        &self,
        clear: bool,
        use_alpha: bool,
        view: Rect,
        settings: RenderVideoSettings,
    ) -> bool {
        let Some(stream) = self.configured_stream() else {
            return false;
        };
        let Some(renderer) = self.get_renderer_for_settings(&settings) else {
            return false;
        };

        let buffer = self.get_render_buffer(renderer.pool());
        let pass = RenderPass {
            clear,
            use_alpha,
            view,
            settings,
            pixel_aspect: stream.pixel_aspect(),
        };
        self.render_internal(&renderer, buffer, &pass);
        true
    }

    /// Upload the buffer once, hand it to the renderer and draw
    pub fn render_internal(
        &self,
        renderer: &RendererInstance,
        buffer: Option<BufferRef>,
        pass: &RenderPass,
    ) {
        if let Some(buffer) = buffer {
            if !buffer.is_loaded() {
                if buffer.upload_texture() {
                    self.counters.uploads.fetch_add(1, Ordering::Relaxed);
                } else {
                    warn!("Failed to upload buffer {}", buffer.id());
                    self.counters.upload_failures.fetch_add(1, Ordering::Relaxed);
                }
                buffer.set_loaded(true);
            }
            renderer.set_buffer(buffer);
        }

        renderer.render(pass);
        self.counters.frames_rendered.fetch_add(1, Ordering::Relaxed);
    }

    /// Current buffer for `pool`, or one rebuilt from the paused frame
    pub fn get_render_buffer(&self, pool: &Arc<BufferPool>) -> Option<BufferRef> {
        let current = self
            .current
            .lock()
            .iter()
            .find(|buffer| buffer.pool_id() == pool.id())
            .cloned();

        current.or_else(|| self.create_from_cache(pool))
    }

    /// Fill a buffer of `pool` from the paused frame and make it current
    pub fn create_from_cache(&self, pool: &Arc<BufferPool>) -> Option<BufferRef> {
        let cached = self.cache.lock().clone()?;

        let buffer = pool.get_buffer(cached.width, cached.height)?;
        if !self.copy_into(&cached.view(), &buffer) {
            return None;
        }
        debug!("Restored paused frame into buffer pool {}", pool.id());

        let mut current = self.current.lock();
        if !current.iter().any(|b| b.pool_id() == pool.id()) {
            current.push(buffer.clone());
        }
        drop(current);

        Some(buffer)
    }

    /// Copy a frame into a render buffer, converting if its format differs
    pub fn copy_frame(&self, src: &FrameView<'_>, target: &RenderBuffer) -> Result<()> {
        let method = self.video_settings.lock().scaling_method;
        target.with_memory_mut(|memory, geometry| {
            let mut dst =
                FrameViewMut::new(memory, geometry.format, geometry.width, geometry.height);
            copy_frame(src, &mut dst, &mut self.scalers.lock(), method)
        })?;
        Ok(())
    }

    fn copy_into(&self, src: &FrameView<'_>, target: &RenderBuffer) -> bool {
        match self.copy_frame(src, target) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to copy frame into buffer {}: {}", target.id(), e);
                false
            }
        }
    }

    /// Global settings with per-control overrides applied
    ///
    /// A scaling method no pool supports falls back to the default one.
    pub fn effective_settings(&self, gui_settings: &GuiRenderSettings) -> RenderVideoSettings {
        let mut settings = gui_settings.merge(&self.video_settings.lock());
        if !self.buffers.has_scaling_method(settings.scaling_method) {
            settings.scaling_method = ScalingMethod::default();
        }
        settings
    }

    /// Find a live renderer for `settings`, creating one if needed
    pub fn get_renderer_for_settings(
        &self,
        settings: &RenderVideoSettings,
    ) -> Option<Arc<RendererInstance>> {
        let existing = self
            .renderers
            .lock()
            .iter()
            .find(|renderer| renderer.is_compatible(settings))
            .cloned();

        match existing {
            Some(renderer) => {
                renderer.set_settings(*settings);
                Some(renderer)
            }
            None => self.create_renderer(settings),
        }
    }

    /// Create a renderer on the first compatible pool
    fn create_renderer(&self, settings: &RenderVideoSettings) -> Option<Arc<RendererInstance>> {
        let stream = self.configured_stream()?;

        for pool in self.buffers.buffer_pools() {
            if !pool.is_compatible(settings) {
                continue;
            }
            let Some(factory) = self.buffers.factory_for(&pool) else {
                continue;
            };

            if pool.format() != Some(stream.format) {
                if pool.configure(stream.format).is_err() {
                    continue;
                }
                pool.prime(stream.nominal_width, stream.nominal_height);
            }

            let Some(mut renderer) = factory.create_renderer(settings, &pool) else {
                debug!(
                    "{} could not create a renderer for pool {}",
                    factory.render_system_name(),
                    pool.id()
                );
                continue;
            };
            if let Err(e) = renderer.configure(stream.format) {
                warn!(
                    "Failed to configure {} renderer: {}",
                    factory.render_system_name(),
                    e
                );
                continue;
            }

            let instance = RendererInstance::new(pool, renderer, *settings, self.visibility_window);
            info!(
                "Created {} renderer {} (scaling: {})",
                factory.render_system_name(),
                instance.id(),
                settings.scaling_method
            );
            self.renderers.lock().push(instance.clone());
            return Some(instance);
        }

        warn!(
            "No renderer available for scaling method {}",
            settings.scaling_method
        );
        None
    }

    /// Check if a render feature is available
    ///
    /// Live renderers answer for themselves. Before any renderer exists the
    /// registered backends are asked instead.
    pub fn supports_render_feature(&self, feature: RenderFeature) -> bool {
        let renderers = self.renderers.lock().clone();
        if !renderers.is_empty() {
            return renderers.iter().any(|renderer| renderer.supports(feature));
        }

        self.buffers
            .factories()
            .iter()
            .any(|factory| factory.supports_render_feature(feature))
    }

    /// Check if any pool supports a scaling method
    pub fn supports_scaling_method(&self, method: ScalingMethod) -> bool {
        self.buffers.has_scaling_method(method)
    }

    /// Copy of the current frame as RGBA, rotated for display
    pub fn capture_frame(&self) -> Option<RgbaImage> {
        let current = self.current.lock().first().cloned();
        if let Some(buffer) = current {
            let rotation = buffer.rotation();
            let image = buffer.with_memory(|data, geometry| {
                Scaler::to_rgba(&FrameView::new(
                    data,
                    geometry.format,
                    geometry.width,
                    geometry.height,
                ))
            });
            return match image {
                Ok(image) => Some(rotation.apply(&image)),
                Err(e) => {
                    warn!("Failed to capture frame: {}", e);
                    None
                }
            };
        }

        let cached = self.cache.lock().clone()?;
        Scaler::to_rgba(&cached.view()).ok()
    }

    pub fn set_video_settings(&self, settings: RenderVideoSettings) {
        debug!(
            "Video settings: scaling {}, stretch {}, rotation {}",
            settings.scaling_method, settings.stretch_mode, settings.rotation_degrees
        );
        *self.video_settings.lock() = settings;
    }

    pub fn video_settings(&self) -> RenderVideoSettings {
        *self.video_settings.lock()
    }

    pub fn buffer_manager(&self) -> &BufferManager {
        &self.buffers
    }

    /// Number of buffers in the current set
    pub fn current_buffer_count(&self) -> usize {
        self.current.lock().len()
    }

    /// Snapshot of the current set, for inspection
    pub fn current_buffers(&self) -> Vec<BufferRef> {
        self.current.lock().clone()
    }

    pub fn renderer_count(&self) -> usize {
        self.renderers.lock().len()
    }

    pub fn stats(&self) -> RenderStats {
        let c = &self.counters;
        RenderStats {
            frames_added: c.frames_added.load(Ordering::Relaxed),
            zero_copy_frames: c.zero_copy_frames.load(Ordering::Relaxed),
            frames_dropped: c.frames_dropped.load(Ordering::Relaxed),
            frames_rendered: c.frames_rendered.load(Ordering::Relaxed),
            uploads: c.uploads.load(Ordering::Relaxed),
            upload_failures: c.upload_failures.load(Ordering::Relaxed),
            cache_fills: c.cache_fills.load(Ordering::Relaxed),
        }
    }
}

impl Drop for RenderManager {
    fn drop(&mut self) {
        self.deinitialize();
    }
}
