//! Rendering backends for cadpick.
//!
//! This crate provides:
//! - pick render targets and pooled pixel storage
//! - blocking and deferred pixel readback
//! - the render-mode pipeline provider and the [`PickRenderer`] seam
//! - a CPU raycast backend and a wgpu backend

pub mod error;
pub mod gpu;
pub mod pipeline;
pub mod raycast;
pub mod readback;
pub mod renderer;
pub mod target;

pub use error::{RenderError, RenderResult};
pub use gpu::{DrawUniforms, PickVertex, WgpuPickRenderer, WgpuPickTarget};
pub use pipeline::{encode_fragment, DrawItem, RenderModePipeline};
pub use raycast::{RaycastRenderer, RaycastTarget};
pub use readback::{PendingReadback, ReadbackMode, ReadbackSignal};
pub use renderer::PickRenderer;
pub use target::{PixelBuffer, PixelRect, PixelStorage};
