//! Error types for cadpick-core.

use thiserror::Error;

/// Errors raised while building scene data or loading options.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A triangle references a vertex that does not exist.
    #[error("triangle {triangle} references vertex {index}, but the mesh has {vertex_count} vertices")]
    IndexOutOfBounds {
        triangle: usize,
        index: u32,
        vertex_count: usize,
    },

    /// Data size mismatch.
    #[error("data size mismatch: expected {expected}, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// A tree index cannot be represented as a pick color.
    #[error("tree index {0} does not fit in a base-255 RGB pick color")]
    TreeIndexOutOfRange(u32),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// A specialized Result type for cadpick-core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
