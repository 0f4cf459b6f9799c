//! Rendering error types.

use thiserror::Error;

/// Errors that can occur while rendering or reading back pick targets.
#[derive(Error, Debug)]
pub enum RenderError {
    /// Failed to create wgpu adapter.
    #[error("failed to create graphics adapter")]
    AdapterCreationFailed,

    /// Failed to create wgpu device.
    #[error("failed to create graphics device: {0}")]
    DeviceCreationFailed(#[from] wgpu::RequestDeviceError),

    /// Mapping the readback buffer failed.
    #[error("failed to map readback buffer: {0}")]
    BufferMapFailed(#[from] wgpu::BufferAsyncError),

    /// Waiting on the device failed.
    #[error("device poll failed: {0}")]
    PollFailed(#[from] wgpu::PollError),

    /// The readback completion signal was dropped before it fired.
    #[error("pixel readback was cancelled")]
    ReadbackCancelled,

    /// A pick target cannot have a zero dimension.
    #[error("render target size {width}x{height} is empty")]
    EmptyTarget { width: u32, height: u32 },

    /// A read rectangle does not fit in the target.
    #[error(
        "read rectangle {width}x{height} at ({x}, {y}) is outside the {target_width}x{target_height} target"
    )]
    RectOutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        target_width: u32,
        target_height: u32,
    },

    /// Data size mismatch.
    #[error("data size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// A backend rejected a draw.
    #[error("render failed: {0}")]
    RenderFailed(String),
}

/// A specialized Result type for rendering operations.
pub type RenderResult<T> = std::result::Result<T, RenderError>;
