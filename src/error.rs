//! Unified error types for framepool

use crate::format::PixelFormat;
use thiserror::Error;

/// Main error type for framepool operations
#[derive(Error, Debug)]
pub enum FramePoolError {
    /// Pixel format not supported by a backend
    #[error("Unsupported pixel format: {0}")]
    UnsupportedFormat(PixelFormat),

    /// Frame size computation yielded zero bytes
    #[error("Invalid frame size: {width}x{height}")]
    ZeroSize { width: u32, height: u32 },

    /// Backend-specific configuration failure
    #[error("Backend '{backend}' configuration failed: {message}")]
    BackendConfigure { backend: String, message: String },

    /// Frame memory shorter than its declared geometry
    #[error("Frame buffer too small: {required} bytes required, {actual} available")]
    BufferTooSmall { required: usize, actual: usize },

    /// Backend could not provide storage for a buffer
    #[error("Buffer allocation failed: {0}")]
    AllocationFailed(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Session started twice
    #[error("Session is already running")]
    AlreadyRunning,

    /// Thread communication error
    #[error("Thread communication error: {0}")]
    ChannelError(String),
}

/// Result type alias for framepool operations
pub type Result<T> = std::result::Result<T, FramePoolError>;

impl FramePoolError {
    /// Create a backend configuration error with context
    pub fn backend_configure(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BackendConfigure {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Check if this error is recoverable (can retry next frame)
    pub fn is_recoverable(&self) -> bool {
        matches!(self, FramePoolError::AllocationFailed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_errors() {
        assert!(FramePoolError::AllocationFailed("out of memory".into()).is_recoverable());
        assert!(!FramePoolError::UnsupportedFormat(PixelFormat::Rgb565).is_recoverable());
        assert!(!FramePoolError::backend_configure("software", "nope").is_recoverable());
    }

    #[test]
    fn test_error_messages() {
        let err = FramePoolError::ZeroSize {
            width: 0,
            height: 240,
        };
        assert_eq!(err.to_string(), "Invalid frame size: 0x240");

        let err = FramePoolError::backend_configure("gbm", "no device");
        assert_eq!(
            err.to_string(),
            "Backend 'gbm' configuration failed: no device"
        );
    }
}
