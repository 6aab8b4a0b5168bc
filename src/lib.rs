//! framepool - render buffer pool and frame pipeline
//!
//! Reference-counted render buffers handed out by per-backend pools, and a
//! render manager moving frames from an emulator thread to a GUI thread.

pub mod backend;
pub mod buffer;
pub mod config;
pub mod error;
pub mod format;
pub mod geometry;
pub mod pool;
pub mod render;
pub mod session;

pub use error::{FramePoolError, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
