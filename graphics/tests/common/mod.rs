//! Common utilities for renderer integration tests.
//!
//! Every test runs against the headless [`DummyContext`], observed through
//! its [`ContextMonitor`].

#![allow(dead_code)]

use std::sync::Arc;

use candela_graphics::scene::BoundingSphere;
use candela_graphics::{
    BlendMode, BufferUsage, Camera, ContextMonitor, DeviceCapabilities, DeviceConfig,
    DummyContext, ForwardRenderer, GraphicsDevice, IndexFormat, Mesh, MeshInstance, Primitive,
    RendererConfig, StandardMaterial, VertexFormat,
};
use glam::{Mat4, Vec3};

/// Route `log` output to the test harness once per process.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ============================================================================
// Test Context
// ============================================================================

/// A device on a dummy context plus a renderer bound to it.
pub struct TestContext {
    pub device: GraphicsDevice,
    pub monitor: Arc<ContextMonitor>,
    pub renderer: ForwardRenderer,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_capabilities(DeviceCapabilities::full())
    }

    pub fn with_capabilities(capabilities: DeviceCapabilities) -> Self {
        init_logging();
        let context = DummyContext::with_capabilities(capabilities);
        let monitor = context.monitor();
        let device = GraphicsDevice::new(Box::new(context), DeviceConfig::default())
            .expect("dummy device");
        let renderer = ForwardRenderer::new(&device, RendererConfig::default());
        Self {
            device,
            monitor,
            renderer,
        }
    }

    /// Indexed unit quad in the XY plane, facing +Z.
    pub fn quad(&mut self) -> Arc<Mesh> {
        let format = Arc::new(VertexFormat::position_normal_uv());
        let vertices = self
            .device
            .create_vertex_buffer(format, 4, BufferUsage::Static);
        #[rustfmt::skip]
        let data: [f32; 32] = [
            -1.0, -1.0, 0.0,  0.0, 0.0, 1.0,  0.0, 0.0,
             1.0, -1.0, 0.0,  0.0, 0.0, 1.0,  1.0, 0.0,
             1.0,  1.0, 0.0,  0.0, 0.0, 1.0,  1.0, 1.0,
            -1.0,  1.0, 0.0,  0.0, 0.0, 1.0,  0.0, 1.0,
        ];
        vertices.write(&data);

        let indices = self
            .device
            .create_index_buffer(IndexFormat::Uint16, 6, BufferUsage::Static);
        indices.write(&[0u16, 1, 2, 0, 2, 3]);

        Arc::new(
            Mesh::new(vertices, Primitive::indexed_triangles(6))
                .with_index_buffer(indices)
                .with_bounds(BoundingSphere::new(Vec3::ZERO, 2.0f32.sqrt())),
        )
    }
}

/// Camera at `(0, 0, distance)` looking at the origin.
pub fn camera_at(distance: f32) -> Camera {
    Camera::new()
        .with_clip(0.1, 200.0)
        .looking_at(Vec3::new(0.0, 0.0, distance), Vec3::ZERO, Vec3::Y)
}

pub fn opaque_material(name: &str) -> StandardMaterial {
    StandardMaterial::new(name)
}

pub fn blended_material(name: &str) -> StandardMaterial {
    material_with_blend(name, BlendMode::Normal)
}

pub fn material_with_blend(name: &str, blend: BlendMode) -> StandardMaterial {
    let material = StandardMaterial::new(name);
    material.update(|p| {
        p.blend = blend;
        p.opacity = 0.5;
    });
    material
}

pub fn instance_at(mesh: &Arc<Mesh>, material: &StandardMaterial, position: Vec3) -> MeshInstance {
    MeshInstance::new(mesh.clone(), material.clone())
        .with_transform(Mat4::from_translation(position))
}
