//! Geometry, mesh instances and the draw call list.

use std::sync::Arc;

use glam::{Mat3, Mat4, Vec3};

use crate::device::{GraphicsDevice, IndexBuffer, Primitive, VertexBuffer};

use super::material::StandardMaterial;

/// Draw layers, highest drawn first.
pub const LAYER_HUD: u32 = 0;
pub const LAYER_GIZMO: u32 = 1;
pub const LAYER_FX: u32 = 2;
pub const LAYER_WORLD: u32 = 3;

/// Sphere enclosing a mesh in its local space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

impl BoundingSphere {
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Smallest sphere around the centroid containing every point.
    pub fn from_points(points: &[Vec3]) -> Self {
        if points.is_empty() {
            return Self::new(Vec3::ZERO, 0.0);
        }
        let center = points.iter().copied().sum::<Vec3>() / points.len() as f32;
        let radius = points
            .iter()
            .map(|p| p.distance(center))
            .fold(0.0, f32::max);
        Self { center, radius }
    }

    /// The sphere after `transform`, grown by its largest axis scale.
    pub fn transformed(&self, transform: &Mat4) -> Self {
        let scale = Mat3::from_mat4(*transform);
        let max_scale = scale
            .x_axis
            .length()
            .max(scale.y_axis.length())
            .max(scale.z_axis.length());
        Self {
            center: transform.transform_point3(self.center),
            radius: self.radius * max_scale,
        }
    }
}

/// Vertex and index data plus the range drawn from them.
#[derive(Debug, Clone)]
pub struct Mesh {
    pub vertex_buffer: VertexBuffer,
    pub index_buffer: Option<IndexBuffer>,
    pub primitive: Primitive,
    pub bounds: BoundingSphere,
    /// Vertices carry bone weights and indices.
    pub skinned: bool,
}

impl Mesh {
    pub fn new(vertex_buffer: VertexBuffer, primitive: Primitive) -> Self {
        Self {
            vertex_buffer,
            index_buffer: None,
            primitive,
            bounds: BoundingSphere::new(Vec3::ZERO, 1.0),
            skinned: false,
        }
    }

    pub fn with_index_buffer(mut self, index_buffer: IndexBuffer) -> Self {
        self.index_buffer = Some(index_buffer);
        self
    }

    pub fn with_bounds(mut self, bounds: BoundingSphere) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn with_skinning(mut self, skinned: bool) -> Self {
        self.skinned = skinned;
        self
    }
}

/// Per-instance model matrices drawn with one call.
#[derive(Debug, Clone)]
pub struct InstanceData {
    /// Buffer in [`VertexFormat::instance_matrices`](crate::device::VertexFormat::instance_matrices) layout.
    pub buffer: VertexBuffer,
    pub count: u32,
}

/// A mesh placed in the world with a material.
#[derive(Debug, Clone)]
pub struct MeshInstance {
    pub mesh: Arc<Mesh>,
    pub material: StandardMaterial,
    pub transform: Mat4,
    pub layer: u32,
    pub visible: bool,
    /// Test the bounding sphere against the camera frustum.
    pub cull: bool,
    pub cast_shadow: bool,
    pub receive_shadow: bool,
    /// Bone matrices of a skinned mesh.
    pub pose: Option<Vec<Mat4>>,
    pub instances: Option<InstanceData>,
}

impl MeshInstance {
    pub fn new(mesh: Arc<Mesh>, material: StandardMaterial) -> Self {
        Self {
            mesh,
            material,
            transform: Mat4::IDENTITY,
            layer: LAYER_WORLD,
            visible: true,
            cull: true,
            cast_shadow: false,
            receive_shadow: true,
            pose: None,
            instances: None,
        }
    }

    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_layer(mut self, layer: u32) -> Self {
        self.layer = layer;
        self
    }

    pub fn with_cull(mut self, cull: bool) -> Self {
        self.cull = cull;
        self
    }

    pub fn with_cast_shadow(mut self, cast_shadow: bool) -> Self {
        self.cast_shadow = cast_shadow;
        self
    }

    pub fn with_receive_shadow(mut self, receive_shadow: bool) -> Self {
        self.receive_shadow = receive_shadow;
        self
    }

    pub fn with_pose(mut self, pose: Vec<Mat4>) -> Self {
        self.pose = Some(pose);
        self
    }

    pub fn with_instances(mut self, buffer: VertexBuffer, count: u32) -> Self {
        self.instances = Some(InstanceData { buffer, count });
        self
    }

    pub fn is_skinned(&self) -> bool {
        self.mesh.skinned && self.pose.is_some()
    }

    pub fn is_instanced(&self) -> bool {
        self.instances.as_ref().is_some_and(|i| i.count > 0)
    }

    /// World-space bounding sphere.
    pub fn world_bounds(&self) -> BoundingSphere {
        self.mesh.bounds.transformed(&self.transform)
    }
}

/// Callback run inline with the sorted draw list.
pub type DrawCallback = Box<dyn FnMut(&mut GraphicsDevice) + Send + Sync>;

/// Custom rendering drawn after the opaque meshes of its layer and before
/// the blended ones.
pub struct DrawCommand {
    pub layer: u32,
    pub callback: DrawCallback,
}

impl DrawCommand {
    pub fn new(layer: u32, callback: impl FnMut(&mut GraphicsDevice) + Send + Sync + 'static) -> Self {
        Self {
            layer,
            callback: Box::new(callback),
        }
    }
}

impl std::fmt::Debug for DrawCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrawCommand")
            .field("layer", &self.layer)
            .finish_non_exhaustive()
    }
}

/// One entry of the scene's draw list.
#[derive(Debug)]
pub enum DrawCall {
    Mesh(MeshInstance),
    Command(DrawCommand),
}

impl DrawCall {
    pub fn layer(&self) -> u32 {
        match self {
            Self::Mesh(instance) => instance.layer,
            Self::Command(command) => command.layer,
        }
    }
}

impl From<MeshInstance> for DrawCall {
    fn from(instance: MeshInstance) -> Self {
        Self::Mesh(instance)
    }
}

impl From<DrawCommand> for DrawCall {
    fn from(command: DrawCommand) -> Self {
        Self::Command(command)
    }
}

static_assertions::assert_impl_all!(MeshInstance: Send, Sync);
static_assertions::assert_impl_all!(DrawCall: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_from_points() {
        let bounds = BoundingSphere::from_points(&[Vec3::new(-1.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0)]);
        assert_eq!(bounds.center, Vec3::ZERO);
        assert!((bounds.radius - 1.0).abs() < 1e-6);
        assert_eq!(BoundingSphere::from_points(&[]).radius, 0.0);
    }

    #[test]
    fn test_bounds_transformed() {
        let bounds = BoundingSphere::new(Vec3::X, 1.0);
        let transform = Mat4::from_translation(Vec3::new(0.0, 5.0, 0.0))
            * Mat4::from_scale(Vec3::new(1.0, 3.0, 2.0));
        let world = bounds.transformed(&transform);
        assert!((world.center - Vec3::new(1.0, 5.0, 0.0)).length() < 1e-6);
        assert!((world.radius - 3.0).abs() < 1e-6);
    }
}
