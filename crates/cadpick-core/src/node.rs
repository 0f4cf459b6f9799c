//! Renderable model nodes and the minimal scene graph they live in.
//!
//! Nodes are owned by the host viewer and shared through `Arc`. Picking only
//! flips a node's visibility, render mode and parent for the duration of a
//! pick, always through the scoped guards in this module so the node is back
//! in its original state on every exit path.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use glam::{Mat4, Vec3};

use crate::aabb::Aabb;
use crate::codec::TREE_INDEX_LIMIT;
use crate::error::{CoreError, Result};
use crate::render_mode::RenderMode;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a [`ModelNode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl NodeId {
    fn next() -> Self {
        Self(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Triangle geometry with one tree index per vertex.
///
/// Pick passes use flat interpolation, so a triangle reports the tree index
/// of its first vertex.
#[derive(Debug, Clone)]
pub struct TriangleMesh {
    positions: Vec<Vec3>,
    triangles: Vec<[u32; 3]>,
    tree_indices: Vec<u32>,
    bounds: Option<Aabb>,
}

impl TriangleMesh {
    /// Creates a mesh, validating indices and tree indices.
    pub fn new(positions: Vec<Vec3>, triangles: Vec<[u32; 3]>, tree_indices: Vec<u32>) -> Result<Self> {
        if tree_indices.len() != positions.len() {
            return Err(CoreError::SizeMismatch {
                expected: positions.len(),
                actual: tree_indices.len(),
            });
        }
        for (triangle, indices) in triangles.iter().enumerate() {
            if let Some(&index) = indices.iter().find(|&&i| i as usize >= positions.len()) {
                return Err(CoreError::IndexOutOfBounds {
                    triangle,
                    index,
                    vertex_count: positions.len(),
                });
            }
        }
        if let Some(&bad) = tree_indices.iter().find(|&&t| t >= TREE_INDEX_LIMIT) {
            return Err(CoreError::TreeIndexOutOfRange(bad));
        }

        let bounds = if triangles.is_empty() {
            None
        } else {
            Aabb::from_points(&positions)
        };

        Ok(Self {
            positions,
            triangles,
            tree_indices,
            bounds,
        })
    }

    /// Creates a mesh where every vertex carries the same tree index.
    pub fn with_uniform_tree_index(
        positions: Vec<Vec3>,
        triangles: Vec<[u32; 3]>,
        tree_index: u32,
    ) -> Result<Self> {
        let tree_indices = vec![tree_index; positions.len()];
        Self::new(positions, triangles, tree_indices)
    }

    /// Creates an axis-aligned box painted with a single tree index.
    pub fn cuboid(center: Vec3, half_extents: Vec3, tree_index: u32) -> Result<Self> {
        let corners = Aabb::from_center_half_extents(center, half_extents).corners();
        let triangles = vec![
            [0, 4, 6],
            [0, 6, 2],
            [1, 3, 7],
            [1, 7, 5],
            [0, 1, 5],
            [0, 5, 4],
            [2, 6, 7],
            [2, 7, 3],
            [0, 2, 3],
            [0, 3, 1],
            [4, 5, 7],
            [4, 7, 6],
        ];
        Self::with_uniform_tree_index(corners.to_vec(), triangles, tree_index)
    }

    /// Creates a mesh with no triangles.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            positions: Vec::new(),
            triangles: Vec::new(),
            tree_indices: Vec::new(),
            bounds: None,
        }
    }

    /// Number of triangles.
    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// Whether the mesh has no triangles.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Model-space bounds, `None` for an empty mesh.
    #[must_use]
    pub fn bounding_box(&self) -> Option<Aabb> {
        self.bounds
    }

    /// Corner positions and tree index of triangle `i`.
    #[must_use]
    pub fn triangle(&self, i: usize) -> ([Vec3; 3], u32) {
        let [a, b, c] = self.triangles[i];
        (
            [
                self.positions[a as usize],
                self.positions[b as usize],
                self.positions[c as usize],
            ],
            self.tree_indices[a as usize],
        )
    }
}

#[derive(Debug)]
struct NodeState {
    visible: bool,
    render_mode: RenderMode,
    parent: Option<Weak<SceneGroup>>,
}

/// One loaded model: geometry, transform and transient picking state.
#[derive(Debug)]
pub struct ModelNode {
    id: NodeId,
    name: String,
    mesh: Arc<TriangleMesh>,
    model_matrix: Mat4,
    color: Vec3,
    state: Mutex<NodeState>,
}

impl ModelNode {
    /// Creates a visible, parentless node in [`RenderMode::Normal`].
    pub fn new(name: impl Into<String>, mesh: impl Into<Arc<TriangleMesh>>) -> Self {
        Self {
            id: NodeId::next(),
            name: name.into(),
            mesh: mesh.into(),
            model_matrix: Mat4::IDENTITY,
            color: Vec3::splat(0.8),
            state: Mutex::new(NodeState {
                visible: true,
                render_mode: RenderMode::Normal,
                parent: None,
            }),
        }
    }

    /// Sets the model-to-world transform.
    #[must_use]
    pub fn with_model_matrix(mut self, model_matrix: Mat4) -> Self {
        self.model_matrix = model_matrix;
        self
    }

    /// Sets the color used in [`RenderMode::Normal`].
    #[must_use]
    pub fn with_color(mut self, color: Vec3) -> Self {
        self.color = color;
        self
    }

    fn state(&self) -> MutexGuard<'_, NodeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Node identity.
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Node name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Geometry.
    #[must_use]
    pub fn mesh(&self) -> &Arc<TriangleMesh> {
        &self.mesh
    }

    /// Model-to-world transform.
    #[must_use]
    pub fn model_matrix(&self) -> Mat4 {
        self.model_matrix
    }

    /// Normal-mode color.
    #[must_use]
    pub fn color(&self) -> Vec3 {
        self.color
    }

    /// Whether the node is drawn.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.state().visible
    }

    /// Shows or hides the node.
    pub fn set_visible(&self, visible: bool) {
        self.state().visible = visible;
    }

    /// Current render mode.
    #[must_use]
    pub fn render_mode(&self) -> RenderMode {
        self.state().render_mode
    }

    /// Sets the render mode.
    pub fn set_render_mode(&self, mode: RenderMode) {
        self.state().render_mode = mode;
    }

    /// Switches to `mode` until the returned guard is dropped.
    #[must_use = "the previous render mode is restored when the scope is dropped"]
    pub fn render_mode_scope(&self, mode: RenderMode) -> RenderModeScope<'_> {
        let previous = std::mem::replace(&mut self.state().render_mode, mode);
        RenderModeScope {
            node: self,
            previous,
        }
    }

    /// Current parent, if it is still alive.
    #[must_use]
    pub fn parent(&self) -> Option<Arc<SceneGroup>> {
        self.state().parent.as_ref().and_then(Weak::upgrade)
    }

    fn set_parent(&self, parent: Option<&Arc<SceneGroup>>) {
        self.state().parent = parent.map(Arc::downgrade);
    }

    /// World-space bounds, `None` when the node has no geometry.
    #[must_use]
    pub fn world_bounding_box(&self) -> Option<Aabb> {
        self.mesh
            .bounding_box()
            .map(|bounds| bounds.transform(&self.model_matrix))
    }
}

/// Restores a node's previous render mode on drop.
#[derive(Debug)]
pub struct RenderModeScope<'a> {
    node: &'a ModelNode,
    previous: RenderMode,
}

impl RenderModeScope<'_> {
    /// The mode that will be restored.
    #[must_use]
    pub fn previous(&self) -> RenderMode {
        self.previous
    }
}

impl Drop for RenderModeScope<'_> {
    fn drop(&mut self) {
        self.node.set_render_mode(self.previous);
    }
}

/// A flat container of model nodes; the parent side of the scene graph.
#[derive(Debug)]
pub struct SceneGroup {
    name: String,
    children: Mutex<Vec<Arc<ModelNode>>>,
}

impl SceneGroup {
    /// Creates an empty group.
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            children: Mutex::new(Vec::new()),
        })
    }

    fn children_mut(&self) -> MutexGuard<'_, Vec<Arc<ModelNode>>> {
        self.children.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Group name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds `node`, detaching it from its current parent first.
    pub fn add(self: &Arc<Self>, node: &Arc<ModelNode>) {
        if let Some(previous) = node.parent() {
            if Arc::ptr_eq(&previous, self) {
                return;
            }
            previous.detach(node);
        }
        self.children_mut().push(Arc::clone(node));
        node.set_parent(Some(self));
    }

    /// Removes `node` from this group. Returns whether it was a child.
    pub fn remove(&self, node: &Arc<ModelNode>) -> bool {
        let removed = self.detach(node);
        if removed {
            node.set_parent(None);
        }
        removed
    }

    fn detach(&self, node: &Arc<ModelNode>) -> bool {
        let mut children = self.children_mut();
        let before = children.len();
        children.retain(|child| !Arc::ptr_eq(child, node));
        children.len() != before
    }

    /// Snapshot of the current children.
    #[must_use]
    pub fn children(&self) -> Vec<Arc<ModelNode>> {
        self.children_mut().clone()
    }

    /// Whether `node` is a direct child.
    #[must_use]
    pub fn contains(&self, node: &ModelNode) -> bool {
        self.children_mut().iter().any(|child| child.id() == node.id())
    }

    /// Number of children.
    #[must_use]
    pub fn len(&self) -> usize {
        self.children_mut().len()
    }

    /// Whether the group has no children.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.children_mut().is_empty()
    }
}

/// Moves nodes into a private scene and puts them back on drop.
///
/// Each node is re-attached to the parent it had when isolated. Nodes that
/// had no parent are removed from the private scene and stay parentless.
#[derive(Debug)]
pub struct IsolatedScene {
    scene: Arc<SceneGroup>,
    entries: Vec<(Arc<ModelNode>, Option<Arc<SceneGroup>>)>,
}

impl IsolatedScene {
    /// Isolates `nodes` into a new scene called `name`.
    pub fn new<'a>(name: &str, nodes: impl IntoIterator<Item = &'a Arc<ModelNode>>) -> Self {
        let scene = SceneGroup::new(name);
        let entries = nodes
            .into_iter()
            .map(|node| {
                let previous = node.parent();
                scene.add(node);
                (Arc::clone(node), previous)
            })
            .collect();
        Self { scene, entries }
    }

    /// The private scene holding the isolated nodes.
    #[must_use]
    pub fn scene(&self) -> &Arc<SceneGroup> {
        &self.scene
    }
}

impl Drop for IsolatedScene {
    fn drop(&mut self) {
        for (node, previous) in self.entries.drain(..).rev() {
            match previous {
                Some(parent) => parent.add(&node),
                None => {
                    self.scene.remove(&node);
                }
            }
        }
    }
}
