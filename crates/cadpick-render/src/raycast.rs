//! CPU reference renderer.
//!
//! Casts one ray through the centre of every target pixel and shades the
//! nearest triangle with [`encode_fragment`], so targets hold the same bytes
//! a GPU pick pass would produce. Useful for tests and machines without a GPU;
//! cost is linear in pixels times triangles.

use cadpick_core::codec::view_z_to_perspective_depth;
use cadpick_core::{DVec3, PickCamera, Ray, Vec3};

use crate::error::{RenderError, RenderResult};
use crate::pipeline::{encode_fragment, DrawItem};
use crate::readback::PendingReadback;
use crate::renderer::PickRenderer;
use crate::target::{PixelBuffer, PixelRect};

/// Target of a [`RaycastRenderer`].
#[derive(Debug, Clone)]
pub struct RaycastTarget {
    pixels: PixelBuffer,
}

impl RaycastTarget {
    /// The rendered pixels.
    #[must_use]
    pub fn pixels(&self) -> &PixelBuffer {
        &self.pixels
    }
}

/// A world-space triangle tagged with the draw it came from.
struct WorldTriangle {
    corners: [Vec3; 3],
    tree_index: u32,
    draw: usize,
}

/// CPU raycasting backend.
#[derive(Debug, Default)]
pub struct RaycastRenderer {
    renders: u64,
}

impl RaycastRenderer {
    /// Creates a new renderer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of render calls so far.
    #[must_use]
    pub fn render_count(&self) -> u64 {
        self.renders
    }
}

fn world_triangles(draws: &[DrawItem]) -> Vec<WorldTriangle> {
    let mut triangles = Vec::new();
    for (draw, item) in draws.iter().enumerate() {
        for i in 0..item.mesh.triangle_count() {
            let (corners, tree_index) = item.mesh.triangle(i);
            triangles.push(WorldTriangle {
                corners: corners.map(|c| item.model.transform_point3(c)),
                tree_index,
                draw,
            });
        }
    }
    triangles
}

impl PickRenderer for RaycastRenderer {
    type Target = RaycastTarget;

    fn create_target(&mut self, width: u32, height: u32) -> RenderResult<Self::Target> {
        if width == 0 || height == 0 {
            return Err(RenderError::EmptyTarget { width, height });
        }
        Ok(RaycastTarget {
            pixels: PixelBuffer::new(width, height),
        })
    }

    fn resize_target(&mut self, target: &mut Self::Target, width: u32, height: u32) -> RenderResult<()> {
        if width == 0 || height == 0 {
            return Err(RenderError::EmptyTarget { width, height });
        }
        target.pixels.resize(width, height);
        Ok(())
    }

    fn render(
        &mut self,
        draws: &[DrawItem],
        camera: &PickCamera,
        target: &mut Self::Target,
        clear: [u8; 4],
    ) -> RenderResult<()> {
        self.renders += 1;
        target.pixels.fill(clear);

        let triangles = world_triangles(draws);
        if triangles.is_empty() {
            return Ok(());
        }

        let (width, height) = (target.pixels.width(), target.pixels.height());
        let inverse_projection = camera.projection_matrix_inverse();
        let camera_world = camera.world_matrix().as_dmat4();
        let view = camera.view_matrix();
        let origin = camera.position();
        let (near, far) = (f64::from(camera.near), f64::from(camera.far));

        for y in 0..height {
            for x in 0..width {
                let ndc = DVec3::new(
                    (f64::from(x) + 0.5) / f64::from(width) * 2.0 - 1.0,
                    1.0 - (f64::from(y) + 0.5) / f64::from(height) * 2.0,
                    0.5,
                );
                let through = camera_world
                    .transform_point3(inverse_projection.project_point3(ndc))
                    .as_vec3();
                let ray = Ray::new(origin, through - origin);

                let nearest = triangles
                    .iter()
                    .filter_map(|tri| {
                        let [a, b, c] = tri.corners;
                        ray.intersect_triangle(a, b, c).map(|t| (t, tri))
                    })
                    .min_by(|(t1, _), (t2, _)| t1.total_cmp(t2));
                let Some((t, tri)) = nearest else {
                    continue;
                };

                let view_z = f64::from(view.transform_point3(ray.at(t)).z);
                let clip_depth = view_z_to_perspective_depth(view_z, near, far);
                if !(0.0..=1.0).contains(&clip_depth) {
                    continue;
                }

                let item = &draws[tri.draw];
                let pixel = encode_fragment(item.mode, item.base_color, tri.tree_index, clip_depth);
                target.pixels.set_pixel(x, y, pixel);
            }
        }
        Ok(())
    }

    fn read_pixels(&mut self, target: &Self::Target, rect: PixelRect, out: &mut [u8]) -> RenderResult<()> {
        target.pixels.copy_rect(rect, out)
    }

    fn read_pixels_deferred(&mut self, target: &Self::Target, rect: PixelRect) -> RenderResult<PendingReadback> {
        let mut bytes = vec![0; rect.byte_len()];
        target.pixels.copy_rect(rect, &mut bytes)?;

        // Complete on the first poll rather than immediately, like a GPU fence.
        let (pending, signal) = PendingReadback::new(move || Ok(bytes));
        let mut signal = Some(signal);
        Ok(pending.with_pump(move || {
            if let Some(signal) = signal.take() {
                let _ = signal.send(Ok(()));
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadpick_core::codec::{decode_tree_index, perspective_depth_to_view_z, unpack_rgba_to_depth, CLEAR_PIXEL};
    use cadpick_core::{ModelNode, RenderMode, SurfaceSize, TriangleMesh, Vec2};
    use std::sync::Arc;

    fn box_draw(mode: RenderMode, center: Vec3, tree_index: u32) -> DrawItem {
        let mesh = TriangleMesh::cuboid(center, Vec3::ONE, tree_index).unwrap();
        DrawItem::from_node(&ModelNode::new("box", Arc::new(mesh)), mode)
    }

    fn camera() -> PickCamera {
        PickCamera {
            near: 0.1,
            far: 100.0,
            ..PickCamera::default()
        }
    }

    #[test]
    fn test_tree_index_pass() {
        let mut renderer = RaycastRenderer::new();
        let mut target = renderer.create_target(8, 8).unwrap();
        let draws = [box_draw(RenderMode::TreeIndex, Vec3::new(0.0, 0.0, -5.0), 42)];
        renderer.render(&draws, &camera(), &mut target, CLEAR_PIXEL).unwrap();

        assert_eq!(decode_tree_index(target.pixels().pixel(4, 4).unwrap()), Some(42));
        // Corners of a 45 degree view miss a 2 unit box at distance 4.
        assert_eq!(target.pixels().pixel(0, 0), Some(CLEAR_PIXEL));
        assert_eq!(renderer.render_count(), 1);
    }

    #[test]
    fn test_nearest_draw_wins() {
        let mut renderer = RaycastRenderer::new();
        let mut target = renderer.create_target(1, 1).unwrap();
        let draws = [
            box_draw(RenderMode::TreeIndex, Vec3::new(0.0, 0.0, -10.0), 7),
            box_draw(RenderMode::TreeIndex, Vec3::new(0.0, 0.0, -5.0), 3),
        ];
        renderer.render(&draws, &camera(), &mut target, CLEAR_PIXEL).unwrap();
        assert_eq!(decode_tree_index(target.pixels().pixel(0, 0).unwrap()), Some(3));
    }

    #[test]
    fn test_depth_pass_recovers_view_z() {
        let mut renderer = RaycastRenderer::new();
        let mut target = renderer.create_target(1, 1).unwrap();
        let cam = camera();
        let draws = [box_draw(RenderMode::Depth, Vec3::new(0.0, 0.0, -5.0), 0)];
        renderer.render(&draws, &cam, &mut target, CLEAR_PIXEL).unwrap();

        let depth = unpack_rgba_to_depth(target.pixels().pixel(0, 0).unwrap());
        let view_z = perspective_depth_to_view_z(depth, 0.1, 100.0);
        assert!((view_z + 4.0).abs() < 1e-3, "view_z = {view_z}");
    }

    #[test]
    fn test_pixel_camera_samples_one_pixel() {
        let mut renderer = RaycastRenderer::new();
        let mut target = renderer.create_target(1, 1).unwrap();
        let cam = camera().pixel_camera(Vec2::new(0.9, 0.0), SurfaceSize::new(200, 200));
        // Off to the side: the narrowed frustum only sees the right edge.
        let draws = [box_draw(RenderMode::TreeIndex, Vec3::new(0.0, 0.0, -5.0), 9)];
        renderer.render(&draws, &cam, &mut target, CLEAR_PIXEL).unwrap();
        assert_eq!(target.pixels().pixel(0, 0), Some(CLEAR_PIXEL));
    }

    #[test]
    fn test_deferred_readback_snapshots() {
        let mut renderer = RaycastRenderer::new();
        let mut target = renderer.create_target(1, 1).unwrap();
        let draws = [box_draw(RenderMode::TreeIndex, Vec3::new(0.0, 0.0, -5.0), 5)];
        renderer.render(&draws, &camera(), &mut target, CLEAR_PIXEL).unwrap();
        let pending = renderer.read_pixels_deferred(&target, PixelRect::full(1, 1)).unwrap();

        renderer.render(&[], &camera(), &mut target, CLEAR_PIXEL).unwrap();
        let bytes = pending.wait().unwrap();
        assert_eq!(decode_tree_index([bytes[0], bytes[1], bytes[2], bytes[3]]), Some(5));
    }
}
