//! # Camera
//!
//! Perspective camera feeding the per-pass constants. Right-handed, Y-up,
//! depth mapped to [0, 1].

use super::Ray;
use crate::foundation::math::{utils, Mat4, Mat4Ext, Vec3, Vec4};

/// Perspective camera
#[derive(Debug, Clone)]
pub struct Camera {
    /// Position in world space
    pub position: Vec3,

    /// Point the camera looks at
    pub target: Vec3,

    /// Up vector
    pub up: Vec3,

    /// Vertical field of view in radians
    pub fov: f32,

    /// Width / height
    pub aspect: f32,

    /// Near plane distance
    pub near: f32,

    /// Far plane distance
    pub far: f32,
}

impl Camera {
    /// Perspective camera at `position` looking at the origin
    pub fn perspective(position: Vec3, fov_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            position,
            target: Vec3::zeros(),
            up: Vec3::new(0.0, 1.0, 0.0),
            fov: utils::deg_to_rad(fov_degrees),
            aspect,
            near,
            far,
        }
    }

    /// Move the camera, keeping its target
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        log::trace!("Camera position updated to: {:?}", position);
    }

    /// Look at `target` with the given up vector
    pub fn look_at(&mut self, target: Vec3, up: Vec3) {
        self.target = target;
        self.up = up;
    }

    /// Update the aspect ratio after a resize
    pub fn set_aspect_ratio(&mut self, aspect: f32) {
        self.aspect = aspect;
    }

    /// World-to-view matrix
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at(self.position, self.target, self.up)
    }

    /// View-to-clip matrix
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective(self.fov, self.aspect, self.near, self.far)
    }

    /// Projection * view
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Picking ray through normalized device coordinates
    ///
    /// Returns `None` if the view-projection matrix is singular.
    pub fn screen_to_world_ray(&self, ndc_x: f32, ndc_y: f32) -> Option<Ray> {
        let inverse = self.view_projection_matrix().try_inverse()?;

        let unproject = |depth: f32| {
            let point = inverse * Vec4::new(ndc_x, ndc_y, depth, 1.0);
            point.xyz() / point.w
        };
        let near = unproject(0.0);
        let far = unproject(1.0);

        Some(Ray::new(self.position, far - near))
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::perspective(Vec3::new(0.0, 3.0, 3.0), 45.0, 16.0 / 9.0, 0.1, 1000.0)
    }
}
