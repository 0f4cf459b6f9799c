//! Multi-node intersection coordinator.
//!
//! [`PickingHandler`] owns the renderer and the pooled pick targets behind a
//! single async mutex. Every pick request runs its whole
//! filter / pick-each-candidate / restore sequence while holding the lock, so
//! concurrent requests queue up instead of overwriting each other's targets
//! or node render modes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cadpick_core::codec::{unpack_rgba_to_depth, CLEAR_PIXEL};
use cadpick_core::{
    DVec3, IsolatedScene, ModelNode, NodeId, PickCamera, PickOptions, RenderMode, RenderModeScope,
    SurfaceSize, Vec2,
};
use cadpick_render::{PickRenderer, PixelStorage, ReadbackMode, RenderModePipeline, RenderResult};
use futures::lock::Mutex;

use crate::error::PickResult;
use crate::picker::{intersect_node, IntersectionResult, PickInput};

/// What a full-surface depth capture was rendered for.
#[derive(Debug, Clone, PartialEq)]
struct DepthCaptureKey {
    frame: u64,
    surface: SurfaceSize,
    camera: PickCamera,
    nodes: Vec<NodeId>,
}

struct PickState<R: PickRenderer> {
    renderer: R,
    /// 1x1 target for single-pixel picks.
    pixel: Option<PixelStorage<R::Target>>,
    /// Surface-sized target for stored-pixel queries.
    frame: Option<PixelStorage<R::Target>>,
    depth_capture: Option<DepthCaptureKey>,
}

/// Returns the storage in `slot`, creating or resizing it as needed.
fn pooled<'a, R: PickRenderer>(
    slot: &'a mut Option<PixelStorage<R::Target>>,
    renderer: &mut R,
    width: u32,
    height: u32,
) -> RenderResult<&'a mut PixelStorage<R::Target>> {
    let storage = match slot.take() {
        Some(mut storage) => {
            storage.ensure_size(renderer, width, height)?;
            storage
        }
        None => PixelStorage::new(renderer, width, height)?,
    };
    Ok(slot.insert(storage))
}

/// Restores the visibility flags of a set of nodes on drop.
struct VisibilityRestore {
    saved: Vec<(Arc<ModelNode>, bool)>,
}

impl VisibilityRestore {
    fn new(nodes: &[Arc<ModelNode>]) -> Self {
        Self {
            saved: nodes
                .iter()
                .map(|node| (Arc::clone(node), node.is_visible()))
                .collect(),
        }
    }
}

impl Drop for VisibilityRestore {
    fn drop(&mut self) {
        for (node, visible) in &self.saved {
            node.set_visible(*visible);
        }
    }
}

/// Pixel position of a stored-pixel query, top-left origin.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn stored_pixel_position(ndc: Vec2, surface: SurfaceSize) -> (u32, u32) {
    let position = cadpick_core::ndc_to_pixel(ndc, surface).round();
    (
        (position.x.max(0.0) as u32).min(surface.width - 1),
        (position.y.max(0.0) as u32).min(surface.height - 1),
    )
}

/// Coordinates pick requests against one renderer.
pub struct PickingHandler<R: PickRenderer> {
    state: Mutex<PickState<R>>,
    options: PickOptions,
    frame: AtomicU64,
}

impl<R: PickRenderer> PickingHandler<R> {
    /// Creates a handler with default options.
    pub fn new(renderer: R) -> Self {
        Self::with_options(renderer, PickOptions::default())
    }

    /// Creates a handler with the given options.
    pub fn with_options(renderer: R, options: PickOptions) -> Self {
        Self {
            state: Mutex::new(PickState {
                renderer,
                pixel: None,
                frame: None,
                depth_capture: None,
            }),
            options,
            frame: AtomicU64::new(0),
        }
    }

    /// The handler's options.
    pub fn options(&self) -> &PickOptions {
        &self.options
    }

    /// Marks the start of a new animation frame. Returns the new frame token.
    ///
    /// Depth captures from earlier frames are not reused after this.
    pub fn begin_frame(&self) -> u64 {
        self.frame.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Current frame token.
    pub fn frame_token(&self) -> u64 {
        self.frame.load(Ordering::SeqCst)
    }

    /// Forgets the stored depth capture, waiting for any running pick.
    pub async fn invalidate_depth_cache(&self) {
        self.state.lock().await.depth_capture = None;
    }

    /// Consumes the handler and returns its renderer.
    pub fn into_renderer(self) -> R {
        self.state.into_inner().renderer
    }

    /// Visible nodes whose world bounds the pick ray hits, nearest bounds first.
    fn broad_phase(&self, visible: &[Arc<ModelNode>], input: &PickInput) -> Vec<Arc<ModelNode>> {
        let ray = input.ray();
        let origin = input.camera.position();

        let mut candidates: Vec<(f32, &Arc<ModelNode>)> = visible
            .iter()
            .filter_map(|node| {
                let entry = node.world_bounding_box()?.intersect_ray(&ray)?;
                Some((entry.distance_squared(origin), node))
            })
            .collect();

        if self.options.sort_candidates_by_bounds {
            candidates.sort_by(|a, b| a.0.total_cmp(&b.0));
        }
        candidates.into_iter().map(|(_, node)| Arc::clone(node)).collect()
    }

    /// Picks every node under `input`, nearest hit first.
    ///
    /// Uses the configured readback mode. Returns an empty list when nothing
    /// is hit; an empty `nodes` slice returns immediately without touching
    /// the renderer.
    pub async fn intersect_nodes(
        &self,
        nodes: &[Arc<ModelNode>],
        input: &PickInput,
    ) -> PickResult<Vec<IntersectionResult>> {
        self.intersect_nodes_with(nodes, input, self.options.readback)
            .await
    }

    /// Blocking variant of [`intersect_nodes`](Self::intersect_nodes) that
    /// also reads pixels back synchronously.
    pub fn intersect_nodes_blocking(
        &self,
        nodes: &[Arc<ModelNode>],
        input: &PickInput,
    ) -> PickResult<Vec<IntersectionResult>> {
        pollster::block_on(self.intersect_nodes_with(nodes, input, ReadbackMode::Blocking))
    }

    async fn intersect_nodes_with(
        &self,
        nodes: &[Arc<ModelNode>],
        input: &PickInput,
        readback: ReadbackMode,
    ) -> PickResult<Vec<IntersectionResult>> {
        if nodes.is_empty() {
            return Ok(Vec::new());
        }
        input.check_surface()?;

        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let visible: Vec<Arc<ModelNode>> = nodes.iter().filter(|n| n.is_visible()).cloned().collect();
        let candidates = self.broad_phase(&visible, input);
        log::debug!(
            "picking {} candidate(s) of {} node(s) at {:?}",
            candidates.len(),
            nodes.len(),
            input.ndc
        );

        let _restore = VisibilityRestore::new(&visible);
        let mut results = Vec::with_capacity(candidates.len());
        for node in &candidates {
            // Only the node being picked is visible, here and in the host scene.
            for other in &visible {
                other.set_visible(Arc::ptr_eq(other, node));
            }

            let storage = pooled(&mut state.pixel, &mut state.renderer, 1, 1)?;
            if let Some(hit) = intersect_node(&mut state.renderer, storage, node, input, readback).await? {
                results.push(hit);
            }
        }

        results.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        Ok(results)
    }

    /// World-space point under `input` from a full-surface depth capture.
    ///
    /// The visible `nodes` are rendered together in depth mode into a
    /// surface-sized target once per frame token; later queries in the same
    /// frame (same surface, camera and nodes) read from the stored pixels.
    /// Call [`begin_frame`](Self::begin_frame) when a new frame starts.
    pub async fn intersect_point_from_stored_pixel(
        &self,
        nodes: &[Arc<ModelNode>],
        input: &PickInput,
    ) -> PickResult<Option<DVec3>> {
        if nodes.is_empty() {
            return Ok(None);
        }
        input.check_surface()?;
        if !input.is_on_surface() {
            return Ok(None);
        }

        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let visible: Vec<Arc<ModelNode>> = nodes.iter().filter(|n| n.is_visible()).cloned().collect();
        let key = DepthCaptureKey {
            frame: self.frame_token(),
            surface: input.surface,
            camera: input.camera.clone(),
            nodes: visible.iter().map(|node| node.id()).collect(),
        };

        let SurfaceSize { width, height } = input.surface;
        let storage = pooled(&mut state.frame, &mut state.renderer, width, height)?;
        let reuse = self.options.cache_depth_per_frame && state.depth_capture.as_ref() == Some(&key);

        if reuse {
            log::trace!("reusing depth capture of frame {}", key.frame);
        } else {
            state.depth_capture = None;
            log::debug!("capturing {width}x{height} depth for frame {}", key.frame);

            let isolated = IsolatedScene::new("depth capture scene", &visible);
            let modes: Vec<RenderModeScope<'_>> = visible
                .iter()
                .map(|node| node.render_mode_scope(RenderMode::Depth))
                .collect();
            RenderModePipeline::new(RenderMode::Depth).render(
                &mut state.renderer,
                isolated.scene(),
                &input.camera,
                storage.target_mut(),
            )?;
            storage.read(&mut state.renderer, self.options.readback).await?;
            drop(modes);
            drop(isolated);

            state.depth_capture = Some(key);
        }

        let (x, y) = stored_pixel_position(input.ndc, input.surface);
        let pixel = storage.buffer().pixel(x, y).unwrap_or(CLEAR_PIXEL);
        if pixel == CLEAR_PIXEL {
            return Ok(None);
        }
        Ok(Some(input.point_at_clip_depth(unpack_rgba_to_depth(pixel))))
    }
}

impl<R: PickRenderer> std::fmt::Debug for PickingHandler<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PickingHandler")
            .field("options", &self.options)
            .field("frame", &self.frame_token())
            .finish_non_exhaustive()
    }
}
