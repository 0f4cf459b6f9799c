//! Perspective camera used for pick renders and un-projection.

use glam::{DMat4, DVec3, DVec4, Mat4, Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::ray::Ray;

/// Size of the surface the user is pointing at, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SurfaceSize {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl SurfaceSize {
    /// Creates a new surface size.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Whether either dimension is zero.
    #[must_use]
    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Width / height.
    #[must_use]
    pub fn aspect_ratio(self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }
}

/// Sub-window of a larger view, as in a multi-monitor or single-pixel setup.
///
/// The projection only covers the `width` x `height` window starting at
/// (`x`, `y`) (top-left origin) of a `full_width` x `full_height` view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewOffset {
    /// Full view width.
    pub full_width: f32,
    /// Full view height.
    pub full_height: f32,
    /// Window left edge.
    pub x: f32,
    /// Window top edge.
    pub y: f32,
    /// Window width.
    pub width: f32,
    /// Window height.
    pub height: f32,
}

/// A perspective camera.
#[derive(Debug, Clone, PartialEq)]
pub struct PickCamera {
    /// Camera-to-world transform.
    pub world: Mat4,
    /// Vertical field of view in radians.
    pub fov_y: f32,
    /// Aspect ratio (width / height).
    pub aspect_ratio: f32,
    /// Near clipping plane.
    pub near: f32,
    /// Far clipping plane.
    pub far: f32,
    /// Optional view offset narrowing the projection to a sub-window.
    pub view_offset: Option<ViewOffset>,
}

impl PickCamera {
    /// Creates a camera at `eye` looking at `target`.
    #[must_use]
    pub fn look_at(
        eye: Vec3,
        target: Vec3,
        up: Vec3,
        fov_y: f32,
        aspect_ratio: f32,
        near: f32,
        far: f32,
    ) -> Self {
        Self {
            world: Mat4::look_at_rh(eye, target, up).inverse(),
            fov_y,
            aspect_ratio,
            near,
            far,
            view_offset: None,
        }
    }

    /// Camera position in world space.
    #[must_use]
    pub fn position(&self) -> Vec3 {
        self.world.w_axis.truncate()
    }

    /// Camera-to-world transform.
    #[must_use]
    pub fn world_matrix(&self) -> Mat4 {
        self.world
    }

    /// Returns the world-to-camera (view) matrix.
    #[must_use]
    pub fn view_matrix(&self) -> Mat4 {
        self.world.inverse()
    }

    /// Projection matrix in double precision (right handed, depth `[0, 1]`).
    #[must_use]
    pub fn projection_matrix_f64(&self) -> DMat4 {
        let near = f64::from(self.near);
        let far = f64::from(self.far);
        let mut top = near * (0.5 * f64::from(self.fov_y)).tan();
        let mut height = 2.0 * top;
        let mut width = f64::from(self.aspect_ratio) * height;
        let mut left = -0.5 * width;

        if let Some(view) = self.view_offset {
            let full_width = f64::from(view.full_width);
            let full_height = f64::from(view.full_height);
            left += f64::from(view.x) * width / full_width;
            top -= f64::from(view.y) * height / full_height;
            width *= f64::from(view.width) / full_width;
            height *= f64::from(view.height) / full_height;
        }

        frustum_rh(left, left + width, top - height, top, near, far)
    }

    /// Projection matrix.
    #[must_use]
    pub fn projection_matrix(&self) -> Mat4 {
        self.projection_matrix_f64().as_mat4()
    }

    /// Inverse projection matrix in double precision.
    #[must_use]
    pub fn projection_matrix_inverse(&self) -> DMat4 {
        self.projection_matrix_f64().inverse()
    }

    /// Combined view-projection matrix.
    #[must_use]
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Returns a copy of this camera narrowed to a sub-window.
    #[must_use]
    pub fn with_view_offset(&self, view_offset: ViewOffset) -> Self {
        Self {
            view_offset: Some(view_offset),
            ..self.clone()
        }
    }

    /// Returns a copy that only rasterizes the one pixel under `ndc`.
    ///
    /// The window is clamped to the surface, so `ndc` on the right or bottom
    /// edge selects the last pixel column or row.
    #[must_use]
    pub fn pixel_camera(&self, ndc: Vec2, surface: SurfaceSize) -> Self {
        let pixel = ndc_to_pixel(ndc, surface);
        self.with_view_offset(ViewOffset {
            full_width: surface.width as f32,
            full_height: surface.height as f32,
            x: pixel.x.clamp(0.0, surface.width.saturating_sub(1) as f32),
            y: pixel.y.clamp(0.0, surface.height.saturating_sub(1) as f32),
            width: 1.0,
            height: 1.0,
        })
    }

    /// Ray from the camera position through a normalized device coordinate.
    #[must_use]
    pub fn ray_through_ndc(&self, ndc: Vec2) -> Ray {
        let origin = self.position();
        let view_point = self
            .projection_matrix_inverse()
            .project_point3(DVec3::new(f64::from(ndc.x), f64::from(ndc.y), 0.5));
        let world_point = self.world.as_dmat4().transform_point3(view_point).as_vec3();
        Ray::new(origin, world_point - origin)
    }

    /// World-space point on the ray through `ndc` with the given view-space Z.
    #[must_use]
    pub fn unproject_view_z(&self, ndc: Vec2, view_z: f64) -> DVec3 {
        let on_ray = self
            .projection_matrix_inverse()
            .project_point3(DVec3::new(f64::from(ndc.x), f64::from(ndc.y), 0.5));
        let view_point = on_ray * (view_z / on_ray.z);
        self.world.as_dmat4().transform_point3(view_point)
    }
}

impl Default for PickCamera {
    fn default() -> Self {
        Self {
            world: Mat4::IDENTITY,
            fov_y: std::f32::consts::FRAC_PI_4,
            aspect_ratio: 1.0,
            near: 0.1,
            far: 1000.0,
            view_offset: None,
        }
    }
}

/// Converts a normalized device coordinate to a pixel position (top-left origin).
#[must_use]
pub fn ndc_to_pixel(ndc: Vec2, surface: SurfaceSize) -> Vec2 {
    Vec2::new(
        (ndc.x + 1.0) / 2.0 * surface.width as f32,
        (1.0 - ndc.y) / 2.0 * surface.height as f32,
    )
}

/// Off-center perspective frustum, right handed, depth mapped to `[0, 1]`.
fn frustum_rh(left: f64, right: f64, bottom: f64, top: f64, near: f64, far: f64) -> DMat4 {
    let inv_width = 1.0 / (right - left);
    let inv_height = 1.0 / (top - bottom);
    let r = far / (near - far);
    DMat4::from_cols(
        DVec4::new(2.0 * near * inv_width, 0.0, 0.0, 0.0),
        DVec4::new(0.0, 2.0 * near * inv_height, 0.0, 0.0),
        DVec4::new(
            (right + left) * inv_width,
            (top + bottom) * inv_height,
            r,
            -1.0,
        ),
        DVec4::new(0.0, 0.0, r * near, 0.0),
    )
}
