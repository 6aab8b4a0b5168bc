//! Buffer pools and the process-wide pool directory

mod buffer_pool;
mod header;
mod manager;

pub use buffer_pool::{BufferPool, PoolBackend, PoolId, PoolStats, RendererVisibility};
pub use header::HeaderSlots;
pub use manager::BufferManager;
