//! Cameras: projection parameters, viewport and clear options.

use glam::{Mat4, Vec3, Vec4};

use crate::device::{ClearOptions, Rect, RenderTarget};

use super::frustum::Frustum;

/// Projection type of a [`Camera`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Projection {
    #[default]
    Perspective,
    Orthographic,
}

/// A viewpoint the renderer draws from.
///
/// Cameras look down their local -Z axis. The view matrix is the inverse of
/// the world transform; the projection is OpenGL style (clip depth -1..1).
#[derive(Debug, Clone)]
pub struct Camera {
    pub projection: Projection,
    /// Vertical field of view in degrees.
    pub fov: f32,
    /// Half of the vertical extent for orthographic projection.
    pub ortho_height: f32,
    /// Width over height. `None` follows the render target.
    pub aspect_ratio: Option<f32>,
    pub near_clip: f32,
    pub far_clip: f32,
    /// Normalized viewport `(x, y, width, height)` within the target.
    pub rect: Vec4,
    /// Normalized scissor rectangle.
    pub scissor_rect: Vec4,
    pub clear: ClearOptions,
    /// Offscreen target, or the backbuffer when `None`.
    pub render_target: Option<RenderTarget>,
    transform: Mat4,
    frustum: Frustum,
}

impl Camera {
    pub fn new() -> Self {
        Self {
            projection: Projection::Perspective,
            fov: 45.0,
            ortho_height: 10.0,
            aspect_ratio: None,
            near_clip: 0.1,
            far_clip: 1000.0,
            rect: Vec4::new(0.0, 0.0, 1.0, 1.0),
            scissor_rect: Vec4::new(0.0, 0.0, 1.0, 1.0),
            clear: ClearOptions::default(),
            render_target: None,
            transform: Mat4::IDENTITY,
            frustum: Frustum::default(),
        }
    }

    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    pub fn with_fov(mut self, fov: f32) -> Self {
        self.fov = fov;
        self
    }

    pub fn with_ortho_height(mut self, ortho_height: f32) -> Self {
        self.ortho_height = ortho_height;
        self
    }

    pub fn with_aspect_ratio(mut self, aspect_ratio: f32) -> Self {
        self.aspect_ratio = Some(aspect_ratio);
        self
    }

    pub fn with_clip(mut self, near: f32, far: f32) -> Self {
        self.near_clip = near;
        self.far_clip = far;
        self
    }

    pub fn with_clear(mut self, clear: ClearOptions) -> Self {
        self.clear = clear;
        self
    }

    pub fn with_render_target(mut self, target: RenderTarget) -> Self {
        self.render_target = Some(target);
        self
    }

    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }

    /// Place the camera at `eye` looking at `target`.
    pub fn looking_at(self, eye: Vec3, target: Vec3, up: Vec3) -> Self {
        self.with_transform(Mat4::look_at_rh(eye, target, up).inverse())
    }

    pub fn transform(&self) -> Mat4 {
        self.transform
    }

    pub fn set_transform(&mut self, transform: Mat4) {
        self.transform = transform;
    }

    pub fn position(&self) -> Vec3 {
        self.transform.w_axis.truncate()
    }

    /// Unit vector the camera looks along.
    pub fn forward(&self) -> Vec3 {
        (-self.transform.z_axis.truncate()).normalize_or_zero()
    }

    /// Aspect ratio used for a target of `width` x `height` pixels.
    pub fn aspect_for(&self, width: u32, height: u32) -> f32 {
        self.aspect_ratio.unwrap_or_else(|| {
            let width = width as f32 * self.rect.z;
            let height = height as f32 * self.rect.w;
            if height > 0.0 { width / height } else { 1.0 }
        })
    }

    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        match self.projection {
            Projection::Perspective => Mat4::perspective_rh_gl(
                self.fov.to_radians(),
                aspect,
                self.near_clip,
                self.far_clip,
            ),
            Projection::Orthographic => {
                let y = self.ortho_height;
                let x = y * aspect;
                Mat4::orthographic_rh_gl(-x, x, -y, y, self.near_clip, self.far_clip)
            }
        }
    }

    pub fn view_matrix(&self) -> Mat4 {
        self.transform.inverse()
    }

    /// Recompute the frustum from `view_projection`. Called by the renderer
    /// during camera setup.
    pub fn update_frustum(&mut self, view_projection: &Mat4) {
        self.frustum = Frustum::from_matrix(view_projection);
    }

    /// Frustum as of the last camera setup.
    pub fn frustum(&self) -> &Frustum {
        &self.frustum
    }

    /// The four world-space corners of the view volume cross-section at
    /// distance `depth` along the view direction.
    pub fn slice_corners(&self, depth: f32, aspect: f32) -> [Vec3; 4] {
        let half_height = match self.projection {
            Projection::Perspective => depth * (self.fov.to_radians() * 0.5).tan(),
            Projection::Orthographic => self.ortho_height,
        };
        let half_width = half_height * aspect;
        [
            Vec3::new(-half_width, -half_height, -depth),
            Vec3::new(half_width, -half_height, -depth),
            Vec3::new(half_width, half_height, -depth),
            Vec3::new(-half_width, half_height, -depth),
        ]
        .map(|p| self.transform.transform_point3(p))
    }

    /// The eight world-space corners of the view volume between the near
    /// plane and `far` (clamped to the far clip).
    pub fn frustum_corners(&self, far: f32, aspect: f32) -> [Vec3; 8] {
        let near = self.slice_corners(self.near_clip, aspect);
        let far = self.slice_corners(far.min(self.far_clip), aspect);
        [
            near[0], near[1], near[2], near[3], far[0], far[1], far[2], far[3],
        ]
    }

    /// Pixel viewport for a target of `width` x `height`.
    pub fn viewport(&self, width: u32, height: u32) -> Rect {
        scale_rect(self.rect, width, height)
    }

    pub fn scissor(&self, width: u32, height: u32) -> Rect {
        scale_rect(self.scissor_rect, width, height)
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new()
    }
}

fn scale_rect(rect: Vec4, width: u32, height: u32) -> Rect {
    let (w, h) = (width as f32, height as f32);
    Rect::new(
        (rect.x * w).floor() as i32,
        (rect.y * h).floor() as i32,
        (rect.z * w).floor() as u32,
        (rect.w * h).floor() as u32,
    )
}

static_assertions::assert_impl_all!(Camera: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_looking_at() {
        let camera = Camera::new().looking_at(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, Vec3::Y);
        assert!((camera.position() - Vec3::new(0.0, 0.0, 10.0)).length() < 1e-5);
        assert!((camera.forward() - Vec3::NEG_Z).length() < 1e-5);
    }

    #[test]
    fn test_frustum_corners_inside_frustum() {
        let mut camera = Camera::new()
            .with_clip(0.5, 50.0)
            .looking_at(Vec3::new(3.0, 2.0, 10.0), Vec3::ZERO, Vec3::Y);
        let aspect = camera.aspect_for(1280, 720);
        let vp = camera.projection_matrix(aspect) * camera.view_matrix();
        camera.update_frustum(&vp);
        for corner in camera.frustum_corners(20.0, aspect) {
            let center = corner + (camera.position() - corner).normalize() * 0.01;
            assert!(camera.frustum().contains_sphere(center, 0.05), "{corner}");
        }
    }

    #[test]
    fn test_viewport_scaling() {
        let mut camera = Camera::new();
        camera.rect = Vec4::new(0.5, 0.0, 0.5, 1.0);
        assert_eq!(camera.viewport(800, 600), Rect::new(400, 0, 400, 600));
        assert!((camera.aspect_for(800, 600) - 400.0 / 600.0).abs() < 1e-6);
    }
}
