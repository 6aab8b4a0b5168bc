//! Reference-counted render buffers
//!
//! A [`RenderBuffer`] is a cheap handle to shared pixel storage. Ownership by
//! the pool protocol is tracked separately from the handle: every holder
//! calls [`RenderBuffer::acquire`] and [`RenderBuffer::release`], and the
//! release that brings the count to zero hands the buffer back to the pool
//! that issued it. [`BufferRef`] wraps one counted reference and releases it
//! on drop.

use crate::error::{FramePoolError, Result};
use crate::format::PixelFormat;
use crate::geometry::Rotation;
use crate::pool::{BufferPool, PoolId};
use parking_lot::Mutex;
use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tracing::{trace, warn};

/// Unique identifier of a render buffer
pub type BufferId = u64;

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// Backend storage behind a render buffer
///
/// Implemented by each graphics backend. A failed `allocate` must leave the
/// storage empty, as if newly constructed.
pub trait BufferStorage: Send {
    /// (Re)allocate storage for a frame of the given geometry
    fn allocate(&mut self, format: PixelFormat, width: u32, height: u32) -> Result<()>;

    /// Frame memory
    fn memory(&self) -> &[u8];

    /// Writable frame memory
    fn memory_mut(&mut self) -> &mut [u8];

    /// Size of the frame memory in bytes, including any row padding
    fn frame_size(&self) -> usize {
        self.memory().len()
    }

    /// Make the frame available to the renderer
    fn upload_texture(&mut self) -> bool {
        true
    }

    /// Access to the concrete type, for renderers of the same backend
    fn as_any(&self) -> &dyn Any;
}

/// Format and dimensions of an allocated buffer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferGeometry {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
}

struct Slot {
    storage: Box<dyn BufferStorage>,
    geometry: BufferGeometry,
}

struct Inner {
    id: BufferId,
    pool_id: PoolId,
    refs: AtomicUsize,
    /// Owning pool, set while references are outstanding
    owner: Mutex<Option<Weak<BufferPool>>>,
    slot: Mutex<Slot>,
    loaded: AtomicBool,
    rendered: AtomicBool,
    rotation: AtomicU32,
}

/// Handle to a pooled frame buffer
#[derive(Clone)]
pub struct RenderBuffer(Arc<Inner>);

impl RenderBuffer {
    /// Create an unallocated buffer belonging to `pool_id`
    pub fn new(pool_id: PoolId, storage: Box<dyn BufferStorage>) -> Self {
        Self(Arc::new(Inner {
            id: NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed),
            pool_id,
            refs: AtomicUsize::new(0),
            owner: Mutex::new(None),
            slot: Mutex::new(Slot {
                storage,
                geometry: BufferGeometry::default(),
            }),
            loaded: AtomicBool::new(false),
            rendered: AtomicBool::new(false),
            rotation: AtomicU32::new(0),
        }))
    }

    pub fn id(&self) -> BufferId {
        self.0.id
    }

    /// Pool that created this buffer
    pub fn pool_id(&self) -> PoolId {
        self.0.pool_id
    }

    /// Check if two handles refer to the same buffer
    pub fn ptr_eq(&self, other: &RenderBuffer) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Current reference count
    pub fn ref_count(&self) -> usize {
        self.0.refs.load(Ordering::Acquire)
    }

    /// Add a reference
    pub fn acquire(&self) {
        self.0.refs.fetch_add(1, Ordering::AcqRel);
    }

    /// Add a reference and record the pool to return to
    pub fn acquire_for(&self, pool: Weak<BufferPool>) {
        *self.0.owner.lock() = Some(pool);
        self.acquire();
    }

    /// Drop a reference, returning the buffer to its pool on the last one
    pub fn release(&self) {
        let previous = self
            .0
            .refs
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |refs| refs.checked_sub(1));

        match previous {
            Ok(1) => {
                let owner = self.0.owner.lock().take();
                match owner.and_then(|pool| pool.upgrade()) {
                    Some(pool) => pool.return_buffer(self.clone()),
                    None => trace!("Buffer {} released with no owning pool", self.0.id),
                }
            }
            Ok(_) => {}
            Err(_) => warn!("Buffer {} released more often than acquired", self.0.id),
        }
    }

    /// (Re)allocate storage
    ///
    /// On failure the buffer reports an empty geometry and must not be used.
    pub fn allocate(&self, format: PixelFormat, width: u32, height: u32) -> Result<()> {
        let mut slot = self.0.slot.lock();
        if format.frame_size(width, height) == 0 {
            slot.geometry = BufferGeometry::default();
            return Err(FramePoolError::ZeroSize { width, height });
        }

        match slot.storage.allocate(format, width, height) {
            Ok(()) => {
                slot.geometry = BufferGeometry {
                    format,
                    width,
                    height,
                };
                Ok(())
            }
            Err(e) => {
                slot.geometry = BufferGeometry::default();
                Err(e)
            }
        }
    }

    pub fn geometry(&self) -> BufferGeometry {
        self.0.slot.lock().geometry
    }

    pub fn format(&self) -> PixelFormat {
        self.geometry().format
    }

    pub fn width(&self) -> u32 {
        self.geometry().width
    }

    pub fn height(&self) -> u32 {
        self.geometry().height
    }

    /// Size of the frame memory in bytes
    pub fn frame_size(&self) -> usize {
        self.0.slot.lock().storage.frame_size()
    }

    /// Read the frame memory
    pub fn with_memory<R>(&self, f: impl FnOnce(&[u8], BufferGeometry) -> R) -> R {
        let slot = self.0.slot.lock();
        f(slot.storage.memory(), slot.geometry)
    }

    /// Write the frame memory
    pub fn with_memory_mut<R>(&self, f: impl FnOnce(&mut [u8], BufferGeometry) -> R) -> R {
        let mut slot = self.0.slot.lock();
        let geometry = slot.geometry;
        f(slot.storage.memory_mut(), geometry)
    }

    /// Inspect the backend storage
    pub fn with_storage<R>(&self, f: impl FnOnce(&dyn BufferStorage) -> R) -> R {
        let slot = self.0.slot.lock();
        f(slot.storage.as_ref())
    }

    /// Upload the frame for drawing
    pub fn upload_texture(&self) -> bool {
        self.0.slot.lock().storage.upload_texture()
    }

    /// Counter-clockwise rotation of the frame content
    pub fn rotation(&self) -> Rotation {
        Rotation::from_degrees(self.0.rotation.load(Ordering::Relaxed))
    }

    pub fn set_rotation(&self, degrees: u32) {
        self.0
            .rotation
            .store(Rotation::from_degrees(degrees).degrees(), Ordering::Relaxed);
    }

    /// Check if the frame has been uploaded
    pub fn is_loaded(&self) -> bool {
        self.0.loaded.load(Ordering::Acquire)
    }

    pub fn set_loaded(&self, loaded: bool) {
        self.0.loaded.store(loaded, Ordering::Release);
    }

    /// Check if the frame has been submitted by a renderer
    pub fn is_rendered(&self) -> bool {
        self.0.rendered.load(Ordering::Acquire)
    }

    pub fn set_rendered(&self, rendered: bool) {
        self.0.rendered.store(rendered, Ordering::Release);
    }
}

impl std::fmt::Debug for RenderBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderBuffer")
            .field("id", &self.0.id)
            .field("pool_id", &self.0.pool_id)
            .field("refs", &self.ref_count())
            .finish()
    }
}

/// One counted reference to a render buffer
///
/// Cloning acquires a new reference; dropping releases it.
pub struct BufferRef {
    buffer: RenderBuffer,
}

impl BufferRef {
    /// Acquire a new reference to `buffer`
    pub fn new(buffer: &RenderBuffer) -> Self {
        buffer.acquire();
        Self {
            buffer: buffer.clone(),
        }
    }

    /// Take over a reference the caller already holds
    pub(crate) fn adopt(buffer: RenderBuffer) -> Self {
        Self { buffer }
    }

    pub fn buffer(&self) -> &RenderBuffer {
        &self.buffer
    }
}

impl std::ops::Deref for BufferRef {
    type Target = RenderBuffer;

    fn deref(&self) -> &RenderBuffer {
        &self.buffer
    }
}

impl Clone for BufferRef {
    fn clone(&self) -> Self {
        Self::new(&self.buffer)
    }
}

impl Drop for BufferRef {
    fn drop(&mut self) {
        self.buffer.release();
    }
}

impl std::fmt::Debug for BufferRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.buffer.fmt(f)
    }
}
