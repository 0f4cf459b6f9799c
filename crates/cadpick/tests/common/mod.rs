//! Shared helpers for the cadpick integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use cadpick::*;
use cadpick_render::{DrawItem, PendingReadback, RaycastTarget};

/// Something a [`RecordingRenderer`] was asked to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    CreateTarget(u32, u32),
    Render(Vec<(NodeId, RenderMode)>),
    /// Visibility of the watched nodes at the time of a render.
    Visibility(Vec<bool>),
}

pub type EventLog = Arc<Mutex<Vec<Event>>>;

/// Wraps the CPU renderer, logs every call and makes deferred readbacks
/// yield once before completing.
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    inner: RaycastRenderer,
    events: EventLog,
    fail_on: Option<RenderMode>,
    watched: Vec<Arc<ModelNode>>,
}

impl RecordingRenderer {
    pub fn new() -> (Self, EventLog) {
        let renderer = Self::default();
        let events = Arc::clone(&renderer.events);
        (renderer, events)
    }

    /// Fails every render pass that draws a node in `mode`.
    pub fn failing_on(mode: RenderMode) -> (Self, EventLog) {
        let (mut renderer, events) = Self::new();
        renderer.fail_on = Some(mode);
        (renderer, events)
    }

    /// Records the visibility of `nodes` before every render.
    pub fn watching(nodes: &[Arc<ModelNode>]) -> (Self, EventLog) {
        let (mut renderer, events) = Self::new();
        renderer.watched = nodes.to_vec();
        (renderer, events)
    }

    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

impl PickRenderer for RecordingRenderer {
    type Target = RaycastTarget;

    fn create_target(&mut self, width: u32, height: u32) -> Result<Self::Target, RenderError> {
        self.push(Event::CreateTarget(width, height));
        self.inner.create_target(width, height)
    }

    fn resize_target(&mut self, target: &mut Self::Target, width: u32, height: u32) -> Result<(), RenderError> {
        self.inner.resize_target(target, width, height)
    }

    fn render(
        &mut self,
        draws: &[DrawItem],
        camera: &PickCamera,
        target: &mut Self::Target,
        clear: [u8; 4],
    ) -> Result<(), RenderError> {
        if !self.watched.is_empty() {
            self.push(Event::Visibility(self.watched.iter().map(|n| n.is_visible()).collect()));
        }
        self.push(Event::Render(draws.iter().map(|d| (d.node_id, d.mode)).collect()));
        if let Some(mode) = self.fail_on {
            if draws.iter().any(|d| d.mode == mode) {
                return Err(RenderError::RenderFailed(format!("{mode} pass rejected")));
            }
        }
        self.inner.render(draws, camera, target, clear)
    }

    fn read_pixels(&mut self, target: &Self::Target, rect: PixelRect, out: &mut [u8]) -> Result<(), RenderError> {
        self.inner.read_pixels(target, rect, out)
    }

    fn read_pixels_deferred(&mut self, target: &Self::Target, rect: PixelRect) -> Result<PendingReadback, RenderError> {
        let mut bytes = vec![0; rect.byte_len()];
        self.inner.read_pixels(target, rect, &mut bytes)?;

        let (pending, signal) = PendingReadback::new(move || Ok(bytes));
        let mut signal = Some(signal);
        let mut pumps = 0;
        Ok(pending.with_pump(move || {
            pumps += 1;
            if pumps >= 2 {
                if let Some(signal) = signal.take() {
                    let _ = signal.send(Ok(()));
                }
            }
        }))
    }
}

pub fn surface() -> SurfaceSize {
    SurfaceSize::new(64, 48)
}

/// Camera at the origin looking down -Z.
pub fn camera() -> PickCamera {
    PickCamera {
        aspect_ratio: surface().aspect_ratio(),
        near: 0.1,
        far: 100.0,
        ..PickCamera::default()
    }
}

pub fn center_input() -> PickInput {
    PickInput::new(Vec2::ZERO, camera(), surface())
}

/// A cube of edge 1 whose front face is `distance` in front of the camera.
pub fn cube_at(name: &str, distance: f32, tree_index: u32) -> Arc<ModelNode> {
    let center = Vec3::new(0.0, 0.0, -(distance + 0.5));
    let mesh = TriangleMesh::cuboid(center, Vec3::splat(0.5), tree_index).unwrap();
    Arc::new(ModelNode::new(name, mesh))
}

/// Node ids of every render pass, in order.
pub fn rendered_nodes(events: &EventLog) -> Vec<Vec<NodeId>> {
    events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|event| match event {
            Event::Render(draws) => Some(draws.iter().map(|(id, _)| *id).collect()),
            Event::CreateTarget(..) | Event::Visibility(_) => None,
        })
        .collect()
}

pub fn render_count(events: &EventLog) -> usize {
    rendered_nodes(events).len()
}

/// Visibility snapshots taken before each render.
pub fn visibility_snapshots(events: &EventLog) -> Vec<Vec<bool>> {
    events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|event| match event {
            Event::Visibility(visible) => Some(visible.clone()),
            _ => None,
        })
        .collect()
}
