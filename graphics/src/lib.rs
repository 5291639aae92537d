//! # Candela Graphics
//!
//! Forward rendering core built around a state-caching graphics device.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`ScopeSpace`] - Named, versioned uniform bindings shared by the renderer and shaders
//! - [`GraphicsDevice`] - State-caching facade over a low-level [`GraphicsContext`]
//! - [`ProgramLibrary`] - Per-device cache of compiled shader variants
//! - [`StandardGenerator`] - Shader variant generator for the physically-lit material
//! - [`ForwardRenderer`] - Per-frame orchestration: camera setup, shadow maps, sorting, dispatch
//! - [`DummyContext`] - Headless context for tests and benchmarks
//!
//! ## Example
//!
//! ```ignore
//! use candela_graphics::{DeviceConfig, DummyContext, ForwardRenderer, GraphicsDevice, RendererConfig};
//!
//! let mut device = GraphicsDevice::new(Box::new(DummyContext::new()), DeviceConfig::default())?;
//! let mut renderer = ForwardRenderer::new(&device, RendererConfig::default());
//! renderer.render(&mut device, &mut scene, &mut camera)?;
//! ```

pub mod device;
pub mod error;
pub mod profiling;
pub mod renderer;
pub mod scene;
pub mod scope;
pub mod shader;

// Re-export main types for convenience
pub use device::{
    BlendEquation, BlendFactor, BlendMode, BufferUsage, ClearFlags, ClearOptions, ColorWrites, CompareFunc,
    ContextMonitor, CullMode, DeviceCapabilities, DeviceConfig, DeviceStats, DrawRecord,
    DummyContext, FilterMode, GraphicsContext, GraphicsDevice, IndexBuffer, IndexFormat,
    PixelFormat, Precision, Primitive, PrimitiveType, Rect, RenderTarget, ResourceState,
    Texture, TextureDescriptor, VertexBuffer, VertexDataType, VertexElement, VertexFormat,
    VertexSemantic, WrapMode,
};
pub use error::GraphicsError;
pub use renderer::{ForwardRenderer, RendererConfig, RendererState, RendererStats};
pub use scene::{
    BoundingSphere, Camera, DrawCall, DrawCommand, Environment, Fog, Frustum, Light, LightType,
    MaterialMap, MaterialProperties, Mesh, MeshInstance, Projection, Scene, ShadowFilter,
    ShadowStorage, ShadowUpdateMode, StandardMaterial,
};
pub use scope::{ScopeId, ScopeSpace, UniformValue, Version, VersionedObject};
pub use shader::{
    BasicGenerator, DepthGenerator, ProgramLibrary, ProgramOptions, Shader, ShaderGenerator,
    ShaderKey, StandardGenerator, StandardOptions,
};

/// Graphics library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the graphics subsystem.
///
/// This should be called before using any graphics functionality.
pub fn init() {
    log::info!("Candela Graphics v{} initialized", VERSION);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_dummy_device_creation() {
        let device = GraphicsDevice::new(Box::new(DummyContext::new()), DeviceConfig::default());
        assert!(device.is_ok());
    }
}
