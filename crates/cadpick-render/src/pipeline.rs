//! Render-mode pipeline provider.
//!
//! A [`RenderModePipeline`] renders the nodes of a scene that are currently
//! in its mode. Setting `node.set_render_mode(mode)` and rendering through the
//! matching pipeline guarantees the target encodes that mode's payload:
//!
//! | mode        | RGBA written                                  |
//! |-------------|-----------------------------------------------|
//! | `Normal`    | base color, alpha 255                         |
//! | `TreeIndex` | base-255 tree index in RGB, alpha 255         |
//! | `Depth`     | packed clip depth, most significant in alpha  |
//!
//! [`encode_fragment`] is the reference for those bytes; the WGSL shader
//! writes exactly the same values.

use std::sync::Arc;

use cadpick_core::codec::{pack_depth_to_rgba, pack_tree_index_to_color, CLEAR_PIXEL};
use cadpick_core::{Mat4, ModelNode, NodeId, PickCamera, RenderMode, SceneGroup, TriangleMesh, Vec3};

use crate::error::RenderResult;
use crate::renderer::PickRenderer;

/// One node to draw.
#[derive(Debug, Clone)]
pub struct DrawItem {
    pub node_id: NodeId,
    pub mesh: Arc<TriangleMesh>,
    pub model: Mat4,
    pub base_color: Vec3,
    pub mode: RenderMode,
}

impl DrawItem {
    /// Snapshot of a node for drawing in `mode`.
    #[must_use]
    pub fn from_node(node: &ModelNode, mode: RenderMode) -> Self {
        Self {
            node_id: node.id(),
            mesh: Arc::clone(node.mesh()),
            model: node.model_matrix(),
            base_color: node.color(),
            mode,
        }
    }
}

/// Renders the nodes of a scene that are in one render mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderModePipeline {
    mode: RenderMode,
}

impl RenderModePipeline {
    /// Creates a pipeline for `mode`.
    #[must_use]
    pub fn new(mode: RenderMode) -> Self {
        Self { mode }
    }

    /// The mode this pipeline renders.
    #[must_use]
    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    /// Visible children of `scene` currently in this pipeline's mode.
    #[must_use]
    pub fn draw_list(&self, scene: &SceneGroup) -> Vec<DrawItem> {
        scene
            .children()
            .iter()
            .filter(|node| node.is_visible() && node.render_mode() == self.mode)
            .filter(|node| !node.mesh().is_empty())
            .map(|node| DrawItem::from_node(node, self.mode))
            .collect()
    }

    /// Clears `target` to [`CLEAR_PIXEL`] and renders `scene` through `camera`.
    ///
    /// Returns the number of nodes drawn.
    pub fn render<R: PickRenderer>(
        &self,
        renderer: &mut R,
        scene: &SceneGroup,
        camera: &PickCamera,
        target: &mut R::Target,
    ) -> RenderResult<usize> {
        let draws = self.draw_list(scene);
        log::trace!("{} pass: drawing {} node(s)", self.mode, draws.len());
        renderer.render(&draws, camera, target, CLEAR_PIXEL)?;
        Ok(draws.len())
    }
}

/// Bytes a fragment writes in `mode`.
///
/// `clip_depth` is the fragment's depth in `[0, 1]`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn encode_fragment(mode: RenderMode, base_color: Vec3, tree_index: u32, clip_depth: f64) -> [u8; 4] {
    match mode {
        RenderMode::Normal => {
            let [r, g, b] = base_color
                .clamp(Vec3::ZERO, Vec3::ONE)
                .to_array()
                .map(|c| (c * 255.0).round() as u8);
            [r, g, b, 255]
        }
        RenderMode::TreeIndex => {
            let [r, g, b] = pack_tree_index_to_color(tree_index);
            [r, g, b, 255]
        }
        RenderMode::Depth => pack_depth_to_rgba(clip_depth),
    }
}
