//! Pool of render buffers for one graphics backend

use crate::buffer::{BufferRef, BufferStorage, RenderBuffer};
use crate::error::Result;
use crate::format::PixelFormat;
use crate::render::{RenderVideoSettings, ScalingMethod};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Unique identifier of a buffer pool
pub type PoolId = u64;

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// Backend hooks a pool delegates to
pub trait PoolBackend: Send + Sync {
    /// Backend name used in logs
    fn name(&self) -> &str;

    /// Prepare the backend for frames of `format`
    fn configure(&self, format: PixelFormat) -> Result<()>;

    /// Check if buffers of this backend can be drawn with `settings`
    fn is_compatible(&self, settings: &RenderVideoSettings) -> bool;

    /// Create empty storage for a new buffer
    fn create_storage(&self) -> Box<dyn BufferStorage>;

    /// Wait for a free hardware header
    ///
    /// Software backends have no headers and return immediately.
    fn wait_for_header(&self, _timeout: Duration) -> bool {
        true
    }

    /// Give back the header held by a buffer
    fn release_header(&self) {}

    /// Hand a buffer to the zero-copy submission path
    ///
    /// The backend keeps its own reference if it accepts the buffer.
    fn submit_zero_copy(&self, _buffer: &BufferRef) -> bool {
        false
    }
}

/// Renderer registered with a pool, queried for visibility
pub trait RendererVisibility: Send + Sync {
    fn renderer_id(&self) -> u64;

    /// Check if the renderer drew recently
    fn is_visible(&self) -> bool;
}

/// Allocation counters for a pool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Buffers created
    pub allocations: u64,
    /// Requests served from the free list
    pub reuses: u64,
    /// Requests that produced no buffer
    pub failures: u64,
    /// Buffers currently in the free list
    pub free: usize,
}

struct RegisteredRenderer {
    id: u64,
    renderer: Weak<dyn RendererVisibility>,
}

struct PoolState {
    format: Option<PixelFormat>,
    configured: bool,
    free: Vec<RenderBuffer>,
}

/// Pool of buffers of one backend type
pub struct BufferPool {
    id: PoolId,
    backend: Box<dyn PoolBackend>,
    header_timeout: Duration,
    state: Mutex<PoolState>,
    renderers: Mutex<Vec<RegisteredRenderer>>,
    self_ref: Weak<BufferPool>,
    allocations: AtomicU64,
    reuses: AtomicU64,
    failures: AtomicU64,
}

impl BufferPool {
    /// Create a pool around a backend
    pub fn new(backend: Box<dyn PoolBackend>, header_timeout: Duration) -> Arc<Self> {
        let id = NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed);
        debug!("Creating {} buffer pool {}", backend.name(), id);

        Arc::new_cyclic(|self_ref| Self {
            id,
            backend,
            header_timeout,
            state: Mutex::new(PoolState {
                format: None,
                configured: false,
                free: Vec::new(),
            }),
            renderers: Mutex::new(Vec::new()),
            self_ref: self_ref.clone(),
            allocations: AtomicU64::new(0),
            reuses: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        })
    }

    pub fn id(&self) -> PoolId {
        self.id
    }

    /// Backend name
    pub fn name(&self) -> &str {
        self.backend.name()
    }

    /// Configure the pool for frames of `format`
    ///
    /// Buffers of a previous format are discarded. On failure the pool stays
    /// unusable until configured again.
    pub fn configure(&self, format: PixelFormat) -> Result<()> {
        let result = self.backend.configure(format);

        let mut state = self.state.lock();
        match &result {
            Ok(()) => {
                if state.format != Some(format) {
                    state.free.clear();
                }
                state.format = Some(format);
                state.configured = true;
                info!("Buffer pool {} ({}) configured for {}", self.id, self.name(), format);
            }
            Err(e) => {
                state.configured = false;
                error!(
                    "Failed to configure buffer pool {} ({}) for {}: {}",
                    self.id,
                    self.name(),
                    format,
                    e
                );
            }
        }

        result
    }

    pub fn is_configured(&self) -> bool {
        self.state.lock().configured
    }

    /// Configured pixel format
    pub fn format(&self) -> Option<PixelFormat> {
        let state = self.state.lock();
        if state.configured {
            state.format
        } else {
            None
        }
    }

    /// Check if this pool can serve frames drawn with `settings`
    pub fn is_compatible(&self, settings: &RenderVideoSettings) -> bool {
        self.backend.is_compatible(settings)
    }

    /// Check if this pool supports a scaling method
    pub fn supports_scaling_method(&self, method: ScalingMethod) -> bool {
        self.is_compatible(&RenderVideoSettings::with_scaling_method(method))
    }

    /// Get a buffer of exactly `width` x `height`
    ///
    /// Returns `None` if the pool is not configured, no header became free
    /// within the timeout, or allocation failed. A returned buffer holds
    /// exactly one reference, owned by the caller.
    pub fn get_buffer(&self, width: u32, height: u32) -> Option<BufferRef> {
        let format = {
            let state = self.state.lock();
            match (state.configured, state.format) {
                (true, Some(format)) => format,
                _ => {
                    trace!("Buffer pool {} not configured", self.id);
                    return None;
                }
            }
        };

        if !self.backend.wait_for_header(self.header_timeout) {
            debug!(
                "Buffer pool {} ({}): timed out waiting for a free buffer",
                self.id,
                self.name()
            );
            self.failures.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let reused = {
            let mut state = self.state.lock();
            state
                .free
                .iter()
                .position(|buffer| {
                    let geometry = buffer.geometry();
                    geometry.format == format
                        && geometry.width == width
                        && geometry.height == height
                })
                .map(|pos| state.free.swap_remove(pos))
        };

        let buffer = match reused {
            Some(buffer) => {
                self.reuses.fetch_add(1, Ordering::Relaxed);
                trace!("Buffer pool {}: reused buffer {}", self.id, buffer.id());
                buffer
            }
            None => {
                let buffer = RenderBuffer::new(self.id, self.backend.create_storage());
                if let Err(e) = buffer.allocate(format, width, height) {
                    if e.is_recoverable() {
                        debug!(
                            "Buffer pool {} ({}): no {}x{} buffer this frame: {}",
                            self.id,
                            self.name(),
                            width,
                            height,
                            e
                        );
                    } else {
                        warn!(
                            "Buffer pool {} ({}): failed to allocate {}x{} {} buffer: {}",
                            self.id,
                            self.name(),
                            width,
                            height,
                            format,
                            e
                        );
                    }
                    self.backend.release_header();
                    self.failures.fetch_add(1, Ordering::Relaxed);
                    return None;
                }

                let allocations = self.allocations.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(
                    "Buffer pool {}: allocated {}x{} {} buffer {} (allocations: {})",
                    self.id,
                    width,
                    height,
                    format,
                    buffer.id(),
                    allocations
                );
                buffer
            }
        };

        buffer.acquire_for(self.self_ref.clone());
        Some(BufferRef::adopt(buffer))
    }

    /// Take back a buffer whose last reference was released
    pub(crate) fn return_buffer(&self, buffer: RenderBuffer) {
        buffer.set_loaded(false);
        buffer.set_rendered(false);
        self.backend.release_header();

        trace!("Buffer pool {}: buffer {} returned", self.id, buffer.id());
        self.state.lock().free.push(buffer);
    }

    /// Allocate two buffers and offer them to the zero-copy path
    ///
    /// Returns the number of buffers the backend accepted. The rest go
    /// straight back to the free list.
    pub fn prime(&self, width: u32, height: u32) -> usize {
        let buffers: Vec<BufferRef> = (0..2)
            .filter_map(|_| self.get_buffer(width, height))
            .collect();

        let accepted = buffers
            .iter()
            .filter(|buffer| self.backend.submit_zero_copy(buffer))
            .count();

        debug!(
            "Buffer pool {}: primed {} of {} buffers",
            self.id,
            accepted,
            buffers.len()
        );
        accepted
    }

    /// Drop all free buffers and reset the configuration
    ///
    /// Buffers still checked out return to the now empty pool later.
    pub fn flush(&self) {
        let freed = {
            let mut state = self.state.lock();
            state.configured = false;
            state.format = None;
            std::mem::take(&mut state.free)
        };
        debug!(
            "Buffer pool {} ({}) flushed, {} buffers dropped",
            self.id,
            self.name(),
            freed.len()
        );
    }

    /// Register a renderer interested in this pool
    pub fn register_renderer(&self, renderer: Weak<dyn RendererVisibility>) {
        let Some(renderer_id) = renderer.upgrade().map(|r| r.renderer_id()) else {
            return;
        };
        self.renderers.lock().push(RegisteredRenderer {
            id: renderer_id,
            renderer,
        });
    }

    /// Forget a renderer, and any entry whose renderer is gone
    ///
    /// Runs from renderer drop, so entries are never upgraded here.
    pub fn unregister_renderer(&self, renderer_id: u64) {
        self.renderers
            .lock()
            .retain(|entry| entry.id != renderer_id && entry.renderer.strong_count() > 0);
    }

    /// Check if any registered renderer drew recently
    pub fn has_visible_renderer(&self) -> bool {
        let renderers: Vec<Arc<dyn RendererVisibility>> = self
            .renderers
            .lock()
            .iter()
            .filter_map(|entry| entry.renderer.upgrade())
            .collect();

        // Dropped after the lock so a renderer destructor can unregister
        renderers.iter().any(|renderer| renderer.is_visible())
    }

    /// Number of registered renderers still alive
    pub fn renderer_count(&self) -> usize {
        self.renderers
            .lock()
            .iter()
            .filter(|entry| entry.renderer.strong_count() > 0)
            .count()
    }

    /// Number of buffers in the free list
    pub fn free_count(&self) -> usize {
        self.state.lock().free.len()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            allocations: self.allocations.load(Ordering::Relaxed),
            reuses: self.reuses.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            free: self.free_count(),
        }
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("id", &self.id)
            .field("backend", &self.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryStorage;
    use crate::error::FramePoolError;
    use crate::pool::HeaderSlots;
    use std::sync::atomic::AtomicBool;

    #[derive(Default)]
    struct TestBackend {
        reject_format: Option<PixelFormat>,
        headers: Option<HeaderSlots>,
    }

    impl PoolBackend for TestBackend {
        fn name(&self) -> &str {
            "test"
        }

        fn configure(&self, format: PixelFormat) -> Result<()> {
            if Some(format) == self.reject_format {
                return Err(FramePoolError::UnsupportedFormat(format));
            }
            Ok(())
        }

        fn is_compatible(&self, settings: &RenderVideoSettings) -> bool {
            settings.scaling_method == ScalingMethod::Nearest
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

    fn pool(backend: TestBackend) -> Arc<BufferPool> {
        BufferPool::new(Box::new(backend), Duration::from_millis(10))
    }

    struct Visibility {
        id: u64,
        visible: AtomicBool,
    }

    impl RendererVisibility for Visibility {
        fn renderer_id(&self) -> u64 {
            self.id
        }

        fn is_visible(&self) -> bool {
            self.visible.load(Ordering::Relaxed)
        }
    }

    #[test]
    fn test_unconfigured_pool_has_no_buffers() {
        let pool = pool(TestBackend::default());
        assert!(pool.get_buffer(16, 16).is_none());
    }

    #[test]
    fn test_release_returns_to_free_list() {
        let pool = pool(TestBackend::default());
        pool.configure(PixelFormat::Rgb565).unwrap();

        let buffer = pool.get_buffer(16, 16).unwrap();
        assert_eq!(buffer.ref_count(), 1);
        assert_eq!(pool.free_count(), 0);

        let handle = buffer.buffer().clone();
        drop(buffer);
        assert_eq!(handle.ref_count(), 0);
        assert_eq!(pool.free_count(), 1);
    }

    #[test]
    fn test_reuse_requires_exact_dimensions() {
        let pool = pool(TestBackend::default());
        pool.configure(PixelFormat::Xrgb8888).unwrap();

        let first = pool.get_buffer(32, 16).unwrap();
        let first_id = first.id();
        drop(first);

        let other = pool.get_buffer(32, 17).unwrap();
        assert_ne!(other.id(), first_id);

        let again = pool.get_buffer(32, 16).unwrap();
        assert_eq!(again.id(), first_id);
        assert_eq!(pool.stats().reuses, 1);
        assert_eq!(pool.stats().allocations, 2);
    }

    #[test]
    fn test_returned_buffer_flags_cleared() {
        let pool = pool(TestBackend::default());
        pool.configure(PixelFormat::Xrgb8888).unwrap();

        let buffer = pool.get_buffer(8, 8).unwrap();
        buffer.set_loaded(true);
        buffer.set_rendered(true);
        let handle = buffer.buffer().clone();
        drop(buffer);

        assert!(!handle.is_loaded());
        assert!(!handle.is_rendered());
    }

    #[test]
    fn test_configure_failure_makes_pool_unusable() {
        let pool = pool(TestBackend {
            reject_format: Some(PixelFormat::Rgb555),
            ..Default::default()
        });
        pool.configure(PixelFormat::Xrgb8888).unwrap();
        assert!(pool.configure(PixelFormat::Rgb555).is_err());
        assert!(!pool.is_configured());
        assert!(pool.get_buffer(8, 8).is_none());
    }

    #[test]
    fn test_header_exhaustion_is_soft_failure() {
        let pool = pool(TestBackend {
            headers: Some(HeaderSlots::new(1)),
            ..Default::default()
        });
        pool.configure(PixelFormat::Xrgb8888).unwrap();

        let held = pool.get_buffer(8, 8).unwrap();
        assert!(pool.get_buffer(8, 8).is_none());
        assert_eq!(pool.stats().failures, 1);

        drop(held);
        assert!(pool.get_buffer(8, 8).is_some());
    }

    #[test]
    fn test_flush_tolerates_late_return() {
        let pool = pool(TestBackend::default());
        pool.configure(PixelFormat::Xrgb8888).unwrap();

        let kept = pool.get_buffer(8, 8).unwrap();
        drop(pool.get_buffer(8, 8).unwrap());
        assert_eq!(pool.free_count(), 1);

        pool.flush();
        assert_eq!(pool.free_count(), 0);
        assert!(!pool.is_configured());

        drop(kept);
        assert_eq!(pool.free_count(), 1);
    }

    #[test]
    fn test_prime_releases_rejected_buffers() {
        let pool = pool(TestBackend::default());
        pool.configure(PixelFormat::Xrgb8888).unwrap();

        assert_eq!(pool.prime(64, 64), 0);
        assert_eq!(pool.free_count(), 2);
    }

    #[test]
    fn test_visibility_tracking() {
        let pool = pool(TestBackend::default());
        let renderer = Arc::new(Visibility {
            id: 7,
            visible: AtomicBool::new(false),
        });
        let weak = Arc::downgrade(&renderer) as Weak<dyn RendererVisibility>;
        pool.register_renderer(weak);

        assert!(!pool.has_visible_renderer());
        renderer.visible.store(true, Ordering::Relaxed);
        assert!(pool.has_visible_renderer());

        pool.unregister_renderer(7);
        assert!(!pool.has_visible_renderer());
        assert_eq!(pool.renderer_count(), 0);
    }

    struct Unregistering {
        id: u64,
        pool: Arc<BufferPool>,
    }

    impl RendererVisibility for Unregistering {
        fn renderer_id(&self) -> u64 {
            self.id
        }

        fn is_visible(&self) -> bool {
            true
        }
    }

    impl Drop for Unregistering {
        fn drop(&mut self) {
            self.pool.unregister_renderer(self.id);
        }
    }

    #[test]
    fn test_renderer_drop_during_visibility_queries() {
        let pool = pool(TestBackend::default());
        let stop = Arc::new(AtomicBool::new(false));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let pool = pool.clone();
                let stop = stop.clone();
                std::thread::spawn(move || {
                    while !stop.load(Ordering::Relaxed) {
                        pool.has_visible_renderer();
                    }
                })
            })
            .collect();

        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        let churn_pool = pool.clone();
        std::thread::spawn(move || {
            for id in 0..2000 {
                let renderer = Arc::new(Unregistering {
                    id,
                    pool: churn_pool.clone(),
                });
                let weak = Arc::downgrade(&renderer) as Weak<dyn RendererVisibility>;
                churn_pool.register_renderer(weak);
                drop(renderer);
            }
            let _ = done_tx.send(());
        });

        let finished = done_rx.recv_timeout(Duration::from_secs(10)).is_ok();
        stop.store(true, Ordering::Relaxed);
        assert!(finished, "renderer churn stalled");
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(pool.renderer_count(), 0);
    }

    #[test]
    fn test_unregister_keeps_other_renderers() {
        let pool = pool(TestBackend::default());
        let first = Arc::new(Visibility {
            id: 1,
            visible: AtomicBool::new(true),
        });
        let second = Arc::new(Visibility {
            id: 2,
            visible: AtomicBool::new(false),
        });
        pool.register_renderer(Arc::downgrade(&first) as Weak<dyn RendererVisibility>);
        pool.register_renderer(Arc::downgrade(&second) as Weak<dyn RendererVisibility>);

        pool.unregister_renderer(2);
        assert_eq!(pool.renderer_count(), 1);
        assert!(pool.has_visible_renderer());
    }

    #[test]
    fn test_scaling_compatibility() {
        let pool = pool(TestBackend::default());
        assert!(pool.supports_scaling_method(ScalingMethod::Nearest));
        assert!(!pool.supports_scaling_method(ScalingMethod::Linear));
    }
}
