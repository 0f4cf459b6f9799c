//! Single-node picker.
//!
//! Renders one node into a 1x1 target twice, first in tree-index mode and
//! then in depth mode, and turns the two pixels into a world-space hit.

use std::sync::Arc;

use cadpick_core::codec::{decode_tree_index, perspective_depth_to_view_z, unpack_rgba_to_depth, CLEAR_PIXEL};
use cadpick_core::{DVec3, IsolatedScene, ModelNode, PickCamera, Ray, RenderMode, SceneGroup, SurfaceSize, Vec2};
use cadpick_render::{PickRenderer, PixelStorage, ReadbackMode, RenderModePipeline};

use crate::error::{PickError, PickResult};

/// Where and how to pick.
#[derive(Debug, Clone, PartialEq)]
pub struct PickInput {
    /// Normalized device coordinates, both axes in `[-1, 1]`, +Y up.
    pub ndc: Vec2,
    /// The viewer's camera.
    pub camera: PickCamera,
    /// Size of the surface `ndc` refers to.
    pub surface: SurfaceSize,
}

impl PickInput {
    /// Creates a new pick input.
    #[must_use]
    pub fn new(ndc: Vec2, camera: PickCamera, surface: SurfaceSize) -> Self {
        Self {
            ndc,
            camera,
            surface,
        }
    }

    /// Pick input for a pixel position (top-left origin).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_pixel(x: f32, y: f32, camera: PickCamera, surface: SurfaceSize) -> Self {
        let ndc = Vec2::new(
            x / surface.width.max(1) as f32 * 2.0 - 1.0,
            1.0 - y / surface.height.max(1) as f32 * 2.0,
        );
        Self::new(ndc, camera, surface)
    }

    /// World-space ray from the camera through `ndc`.
    #[must_use]
    pub fn ray(&self) -> Ray {
        self.camera.ray_through_ndc(self.ndc)
    }

    /// Whether `ndc` lies on the surface.
    #[must_use]
    pub fn is_on_surface(&self) -> bool {
        self.ndc.abs().cmple(Vec2::ONE).all()
    }

    pub(crate) fn check_surface(&self) -> PickResult<()> {
        if self.surface.is_empty() {
            return Err(PickError::EmptySurface {
                width: self.surface.width,
                height: self.surface.height,
            });
        }
        Ok(())
    }

    /// World-space point on the pick ray at a given clip depth.
    pub(crate) fn point_at_clip_depth(&self, clip_depth: f64) -> DVec3 {
        let view_z = perspective_depth_to_view_z(
            clip_depth,
            f64::from(self.camera.near),
            f64::from(self.camera.far),
        );
        self.camera.unproject_view_z(self.ndc, view_z)
    }
}

/// One picked node.
#[derive(Debug, Clone)]
pub struct IntersectionResult {
    /// Distance from the camera to `point`.
    pub distance: f64,
    /// World-space hit position.
    pub point: DVec3,
    /// Decoded tree index of the hit sub-element.
    pub tree_index: u32,
    /// The node that was hit.
    pub node: Arc<ModelNode>,
}

/// Renders `scene` in `mode` and reads back the first pixel.
pub(crate) async fn render_pixel<R: PickRenderer>(
    renderer: &mut R,
    storage: &mut PixelStorage<R::Target>,
    scene: &SceneGroup,
    camera: &PickCamera,
    mode: RenderMode,
    readback: ReadbackMode,
) -> PickResult<[u8; 4]> {
    RenderModePipeline::new(mode).render(renderer, scene, camera, storage.target_mut())?;
    let pixels = storage.read(renderer, readback).await?;
    Ok(pixels.pixel(0, 0).unwrap_or(CLEAR_PIXEL))
}

/// Picks a single node at `input`.
///
/// The node is moved into a private scene for the duration of the pick and
/// its render mode is switched; both are restored on every exit path,
/// including errors and a dropped future. Returns `Ok(None)` when the node
/// does not cover the pixel.
pub async fn intersect_node<R: PickRenderer>(
    renderer: &mut R,
    storage: &mut PixelStorage<R::Target>,
    node: &Arc<ModelNode>,
    input: &PickInput,
    readback: ReadbackMode,
) -> PickResult<Option<IntersectionResult>> {
    input.check_surface()?;
    if !input.is_on_surface() {
        return Ok(None);
    }
    storage.ensure_size(renderer, 1, 1)?;

    let camera = input.camera.pixel_camera(input.ndc, input.surface);
    let isolated = IsolatedScene::new("picking scene", [node]);
    let mode = node.render_mode_scope(RenderMode::TreeIndex);

    let pixel = render_pixel(renderer, storage, isolated.scene(), &camera, RenderMode::TreeIndex, readback).await?;
    let Some(tree_index) = decode_tree_index(pixel) else {
        log::trace!("'{}' does not cover the pick pixel", node.name());
        return Ok(None);
    };

    node.set_render_mode(RenderMode::Depth);
    let pixel = render_pixel(renderer, storage, isolated.scene(), &camera, RenderMode::Depth, readback).await?;
    drop(mode);

    let point = input.point_at_clip_depth(unpack_rgba_to_depth(pixel));
    let distance = point.distance(input.camera.position().as_dvec3());
    log::trace!("'{}' hit: tree index {tree_index} at distance {distance:.4}", node.name());

    Ok(Some(IntersectionResult {
        distance,
        point,
        tree_index,
        node: Arc::clone(node),
    }))
}
