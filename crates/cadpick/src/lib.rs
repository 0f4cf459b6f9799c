//! cadpick: GPU object picking for large CAD scenes.
//!
//! Given a screen position and a camera, cadpick finds which scene nodes lie
//! under the cursor, which sub-element (tree index) of each was hit, and the
//! world-space point of every hit, nearest first. It works by rendering the
//! candidate nodes into a 1x1 off-screen target with special fragment
//! outputs and reading that one pixel back.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use cadpick::*;
//!
//! fn main() -> PickResult<()> {
//!     let mesh = TriangleMesh::cuboid(Vec3::new(0.0, 0.0, -5.0), Vec3::ONE, 42)?;
//!     let node = Arc::new(ModelNode::new("part", mesh));
//!
//!     let surface = SurfaceSize::new(640, 480);
//!     let camera = PickCamera {
//!         aspect_ratio: surface.aspect_ratio(),
//!         ..PickCamera::default()
//!     };
//!     let input = PickInput::from_pixel(320.0, 240.0, camera, surface);
//!
//!     let handler = PickingHandler::new(RaycastRenderer::new());
//!     for hit in handler.intersect_nodes_blocking(&[node], &input)? {
//!         println!("{} #{} at {:?}", hit.node.name(), hit.tree_index, hit.point);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - [`codec`] packs tree indices and depth into RGBA8 pixels
//! - [`RenderModePipeline`] draws the nodes currently in one [`RenderMode`]
//! - [`PixelStorage`] pools a render target and reads it back, blocking or deferred
//! - [`intersect_node`] picks a single node
//! - [`PickingHandler`] serializes multi-node picks behind one async mutex
//!
//! Rendering goes through the [`PickRenderer`] trait. [`WgpuPickRenderer`]
//! renders on the GPU; [`RaycastRenderer`] produces the same pixels on the CPU.

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
// Builder patterns return Self which doesn't need must_use
#![allow(clippy::must_use_candidate)]

mod error;
mod handler;
mod picker;

pub use error::{PickError, PickResult};
pub use handler::PickingHandler;
pub use picker::{intersect_node, IntersectionResult, PickInput};

// Re-export core types
pub use cadpick_core::{
    codec, Aabb, IsolatedScene, ModelNode, NodeId, PickCamera, PickOptions, Ray, ReadbackMode,
    RenderMode, RenderModeScope, SceneGroup, SurfaceSize, TriangleMesh, ViewOffset,
};
pub use cadpick_core::{DVec3, Mat4, Vec2, Vec3, Vec4};

// Re-export render types
pub use cadpick_render::{
    PixelBuffer, PixelRect, PixelStorage, PickRenderer, RaycastRenderer, RenderError,
    RenderModePipeline, WgpuPickRenderer,
};
