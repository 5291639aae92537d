//! Scene description consumed by the renderer.
//!
//! The scene owns lights and a flat list of draw calls. Node hierarchies,
//! animation and asset loading live outside this crate; whatever drives them
//! writes world transforms into [`MeshInstance`], [`Light`] and [`Camera`].

mod camera;
mod environment;
mod frustum;
mod light;
mod material;
mod mesh;
mod world;

pub use camera::{Camera, Projection};
pub use environment::{Environment, PREFILTERED_SIZES};
pub use frustum::Frustum;
pub use light::{
    Falloff, Light, LightType, ShadowFilter, ShadowMap, ShadowStorage, ShadowUpdateMode,
};
pub use material::{
    MaterialMap, MaterialProperties, MaterialRenderState, ShaderPass, StandardMaterial,
    VariantKey,
};
pub use mesh::{
    BoundingSphere, DrawCall, DrawCallback, DrawCommand, InstanceData, LAYER_FX, LAYER_GIZMO,
    LAYER_HUD, LAYER_WORLD, Mesh, MeshInstance,
};
pub use world::{Fog, Scene, SceneShaderSettings};
