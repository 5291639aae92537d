use std::sync::Arc;

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use candela_graphics::renderer::sort_key;
use candela_graphics::shader::LightKey;
use candela_graphics::{
    BlendMode, BufferUsage, Camera, DeviceConfig, DummyContext, ForwardRenderer, GraphicsDevice,
    IndexFormat, Light, LightType, Mesh, MeshInstance, Primitive, ProgramOptions, RendererConfig,
    Scene, ScopeSpace, StandardMaterial, StandardOptions, VertexFormat,
};
use glam::{Mat4, Vec3};

fn dummy_device() -> GraphicsDevice {
    GraphicsDevice::new(Box::new(DummyContext::new()), DeviceConfig::default()).unwrap()
}

fn quad(device: &mut GraphicsDevice) -> Arc<Mesh> {
    let vertices = device.create_vertex_buffer(
        Arc::new(VertexFormat::position_normal_uv()),
        4,
        BufferUsage::Static,
    );
    let indices = device.create_index_buffer(IndexFormat::Uint16, 6, BufferUsage::Static);
    indices.write(&[0u16, 1, 2, 0, 2, 3]);
    Arc::new(Mesh::new(vertices, Primitive::indexed_triangles(6)).with_index_buffer(indices))
}

// ---------------------------------------------------------------------------
// Scope space
// ---------------------------------------------------------------------------

fn bench_scope_set(c: &mut Criterion) {
    let scope = ScopeSpace::new("bench");
    let id = scope.resolve("matrix_model");
    c.bench_function("scope_set_mat4", |b| {
        b.iter(|| {
            id.set(black_box(Mat4::IDENTITY));
            black_box(id.version());
        });
    });
}

// ---------------------------------------------------------------------------
// Program cache
// ---------------------------------------------------------------------------

fn bench_program_cache_hit(c: &mut Criterion) {
    let mut device = dummy_device();
    let mut options = StandardOptions::default();
    options.lights = vec![LightKey::new(LightType::Directional), LightKey::new(LightType::Spot)];
    let options = ProgramOptions::from(options);
    device.get_program("standard", &options).unwrap();

    c.bench_function("program_cache_hit_2_lights", |b| {
        b.iter(|| black_box(device.get_program("standard", &options)));
    });
}

// ---------------------------------------------------------------------------
// Sorting
// ---------------------------------------------------------------------------

fn bench_sort_keys(c: &mut Criterion) {
    c.bench_function("sort_1000_keys", |b| {
        b.iter(|| {
            let mut keys: Vec<u32> = (0..1000u32)
                .map(|i| {
                    let blend = if i % 7 == 0 { BlendMode::Normal } else { BlendMode::None };
                    sort_key(3, blend, false, i.wrapping_mul(2_654_435_761) >> 8)
                })
                .collect();
            keys.sort_unstable_by(|a, b| b.cmp(a));
            black_box(keys);
        });
    });
}

// ---------------------------------------------------------------------------
// Frames
// ---------------------------------------------------------------------------

fn bench_frame(c: &mut Criterion, name: &str, shadows: bool) {
    let mut device = dummy_device();
    let mesh = quad(&mut device);
    let materials: Vec<_> = (0..8)
        .map(|i| StandardMaterial::new(format!("material_{i}")))
        .collect();

    let mut scene = Scene::new();
    scene.add_light(Light::directional().with_cast_shadows(shadows));
    scene.add_light(
        Light::spot()
            .with_cast_shadows(shadows)
            .with_transform(Mat4::from_translation(Vec3::new(0.0, 8.0, 0.0))),
    );
    for i in 0..500 {
        let position = Vec3::new((i % 25) as f32 - 12.0, (i / 25) as f32 - 10.0, 0.0);
        scene.add(
            MeshInstance::new(mesh.clone(), materials[i % materials.len()].clone())
                .with_transform(Mat4::from_translation(position))
                .with_cast_shadow(true),
        );
    }
    let mut camera = Camera::new().looking_at(Vec3::new(0.0, 0.0, 40.0), Vec3::ZERO, Vec3::Y);
    let mut renderer = ForwardRenderer::new(&device, RendererConfig::default());

    c.bench_function(name, |b| {
        b.iter(|| {
            black_box(renderer.render(&mut device, &mut scene, &mut camera).unwrap());
        });
    });
}

fn bench_frame_unshadowed(c: &mut Criterion) {
    bench_frame(c, "frame_500_instances", false);
}

fn bench_frame_shadowed(c: &mut Criterion) {
    bench_frame(c, "frame_500_instances_2_shadows", true);
}

criterion_group!(
    benches,
    bench_scope_set,
    bench_program_cache_hit,
    bench_sort_keys,
    bench_frame_unshadowed,
    bench_frame_shadowed,
);
criterion_main!(benches);
