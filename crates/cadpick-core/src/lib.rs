//! Core types for cadpick.
//!
//! This crate has no GPU dependency. It provides:
//! - the pixel [`codec`] shared with the pick shaders
//! - [`RenderMode`] and the scoped mode switch on [`ModelNode`]
//! - camera, ray and bounding box math
//! - the scene nodes picking operates on
//! - [`PickOptions`]

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
// Options structs legitimately have many boolean flags
#![allow(clippy::struct_excessive_bools)]
// Builder patterns return Self which doesn't need must_use
#![allow(clippy::must_use_candidate)]
// Pixel sizes are converted to f32 for projection math
#![allow(clippy::cast_precision_loss)]

pub mod aabb;
pub mod camera;
pub mod codec;
pub mod error;
pub mod node;
pub mod options;
pub mod ray;
pub mod render_mode;

pub use aabb::Aabb;
pub use camera::{ndc_to_pixel, PickCamera, SurfaceSize, ViewOffset};
pub use error::{CoreError, Result};
pub use node::{IsolatedScene, ModelNode, NodeId, RenderModeScope, SceneGroup, TriangleMesh};
pub use options::{PickOptions, ReadbackMode};
pub use ray::Ray;
pub use render_mode::RenderMode;

// Re-export glam types for convenience
pub use glam::{DVec3, Mat4, Vec2, Vec3, Vec4};
