//! Error types for cadpick.

use cadpick_core::CoreError;
use cadpick_render::RenderError;
use thiserror::Error;

/// The main error type for pick operations.
///
/// Hitting nothing is not an error; it is an empty result.
#[derive(Error, Debug)]
pub enum PickError {
    /// The surface the coordinates refer to has no pixels.
    #[error("pick surface {width}x{height} is empty")]
    EmptySurface { width: u32, height: u32 },

    /// Rendering or readback failed.
    #[error("render error: {0}")]
    Render(#[from] RenderError),

    /// Scene data or options were invalid.
    #[error("core error: {0}")]
    Core(#[from] CoreError),
}

/// A specialized Result type for pick operations.
pub type PickResult<T> = std::result::Result<T, PickError>;
