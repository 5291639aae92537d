//! View frustum planes for visibility tests.

use glam::{Mat4, Vec3, Vec4};

/// Six inward-facing planes `(normal, d)` extracted from a view-projection
/// matrix, in the order left, right, bottom, top, near, far.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    planes: [Vec4; 6],
}

impl Frustum {
    /// Extract planes from an OpenGL-style view-projection matrix.
    pub fn from_matrix(view_projection: &Mat4) -> Self {
        let m = view_projection.transpose();
        let (r0, r1, r2, r3) = (m.x_axis, m.y_axis, m.z_axis, m.w_axis);
        let planes = [r3 + r0, r3 - r0, r3 + r1, r3 - r1, r3 + r2, r3 - r2].map(|p| {
            let length = p.truncate().length();
            if length > 0.0 { p / length } else { p }
        });
        Self { planes }
    }

    pub fn planes(&self) -> &[Vec4; 6] {
        &self.planes
    }

    /// Signed distance of `point` to plane `index`, positive inside.
    fn distance(&self, index: usize, point: Vec3) -> f32 {
        self.planes[index].truncate().dot(point) + self.planes[index].w
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        (0..6).all(|i| self.distance(i, point) >= 0.0)
    }

    /// Whether a sphere is at least partially inside.
    pub fn contains_sphere(&self, center: Vec3, radius: f32) -> bool {
        (0..6).all(|i| self.distance(i, center) >= -radius)
    }
}

impl Default for Frustum {
    fn default() -> Self {
        Self::from_matrix(&Mat4::IDENTITY)
    }
}
