//! Low-level graphics context abstraction.
//!
//! A [`GraphicsContext`] is the stateful external API the device drives
//! (a GL-style context, or the [`DummyContext`](super::DummyContext) in
//! tests). It performs no caching of its own; every call is assumed to cost
//! a round trip, which is why [`GraphicsDevice`](super::GraphicsDevice)
//! elides redundant ones.

use crate::error::GraphicsError;
use crate::scope::UniformValue;
use crate::shader::ShaderStage;

use super::buffer::{BufferUsage, IndexFormat, VertexElement};
use super::state::{
    BlendEquation, BlendFactor, ClearFlags, ColorWrites, CompareFunc, CullMode, Primitive, Rect,
};
use super::texture::{SamplerParam, TextureData, TextureDescriptor};

// =============================================================================
// Handles
// =============================================================================

macro_rules! define_handle {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
            pub struct $name(pub u32);
        )*
    };
}

define_handle! {
    /// A compiled shader stage.
    StageHandle,
    /// A linked program.
    ProgramHandle,
    /// A texture object.
    TextureHandle,
    /// A vertex or index buffer object.
    BufferHandle,
    /// A framebuffer object.
    FramebufferHandle,
    /// Location of a uniform inside a linked program.
    UniformLocation,
    /// Location of a vertex attribute inside a linked program.
    AttributeLocation,
}

/// Which buffer binding point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    Vertex,
    Index,
}

/// Kind of an active uniform, as reported by introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformKind {
    Value,
    Sampler2D,
    SamplerCube,
}

impl UniformKind {
    pub fn is_sampler(self) -> bool {
        !matches!(self, Self::Value)
    }
}

/// An active uniform of a linked program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveUniform {
    pub name: String,
    pub location: UniformLocation,
    pub kind: UniformKind,
    pub array_size: u32,
}

/// An active attribute of a linked program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveAttribute {
    pub name: String,
    pub location: AttributeLocation,
}

/// Colour attachment of a framebuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramebufferColor {
    pub texture: TextureHandle,
    /// Cubemap face, `None` for 2D textures.
    pub face: Option<u32>,
}

// =============================================================================
// Capabilities
// =============================================================================

/// Float precision available in the fragment stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Precision {
    Low,
    Medium,
    #[default]
    High,
}

impl Precision {
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Low => "lowp",
            Self::Medium => "mediump",
            Self::High => "highp",
        }
    }
}

/// Optional features of a context.
///
/// Missing optional features are not errors. They are inputs to shader
/// variant selection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceCapabilities {
    pub float_textures: bool,
    pub half_float_textures: bool,
    pub depth_textures: bool,
    pub standard_derivatives: bool,
    pub texture_lod: bool,
    pub instancing: bool,
    pub vertex_stage: bool,
    pub max_texture_units: u32,
    pub max_vertex_texture_units: u32,
    pub max_anisotropy: f32,
    pub precision: Precision,
}

impl DeviceCapabilities {
    /// Everything available.
    pub fn full() -> Self {
        Self {
            float_textures: true,
            half_float_textures: true,
            depth_textures: true,
            standard_derivatives: true,
            texture_lod: true,
            instancing: true,
            vertex_stage: true,
            max_texture_units: 16,
            max_vertex_texture_units: 4,
            max_anisotropy: 16.0,
            precision: Precision::High,
        }
    }

    /// The bare minimum a device accepts.
    pub fn minimal() -> Self {
        Self {
            float_textures: false,
            half_float_textures: false,
            depth_textures: false,
            standard_derivatives: false,
            texture_lod: false,
            instancing: false,
            vertex_stage: true,
            max_texture_units: 8,
            max_vertex_texture_units: 0,
            max_anisotropy: 1.0,
            precision: Precision::Medium,
        }
    }
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self::full()
    }
}

// =============================================================================
// Context trait
// =============================================================================

/// The low-level graphics API driven by a device.
pub trait GraphicsContext: Send + Sync {
    /// Human-readable name.
    fn name(&self) -> &'static str;

    /// Features available on this context.
    fn capabilities(&self) -> DeviceCapabilities;

    /// Whether the context became invalid.
    fn is_context_lost(&self) -> bool;

    // --- Fixed-function state ---

    fn set_depth_test(&mut self, enabled: bool);
    fn set_depth_write(&mut self, enabled: bool);
    fn set_depth_func(&mut self, func: CompareFunc);
    fn set_cull_mode(&mut self, mode: CullMode);
    fn set_blending(&mut self, enabled: bool);
    fn set_blend_func(&mut self, src: BlendFactor, dst: BlendFactor);
    fn set_blend_equation(&mut self, equation: BlendEquation);
    fn set_color_write(&mut self, mask: ColorWrites);
    fn set_clear_color(&mut self, color: [f32; 4]);
    fn set_clear_depth(&mut self, depth: f32);
    fn clear(&mut self, flags: ClearFlags);
    fn set_viewport(&mut self, rect: Rect);
    fn set_scissor(&mut self, rect: Rect);

    // --- Render targets ---

    fn create_framebuffer(
        &mut self,
        color: Option<FramebufferColor>,
        depth: bool,
    ) -> Result<FramebufferHandle, GraphicsError>;
    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>);
    fn delete_framebuffer(&mut self, framebuffer: FramebufferHandle);

    // --- Programs ---

    /// Compile one stage. The error string is the compiler's log.
    fn compile_stage(&mut self, stage: ShaderStage, source: &str) -> Result<StageHandle, String>;
    /// Link two compiled stages. The error string is the linker's log.
    fn link_program(
        &mut self,
        vertex: StageHandle,
        fragment: StageHandle,
    ) -> Result<ProgramHandle, String>;
    /// Release a compiled stage. Programs already linked from it stay valid.
    fn delete_stage(&mut self, stage: StageHandle);
    fn delete_program(&mut self, program: ProgramHandle);
    fn active_attributes(&self, program: ProgramHandle) -> Vec<ActiveAttribute>;
    fn active_uniforms(&self, program: ProgramHandle) -> Vec<ActiveUniform>;
    fn use_program(&mut self, program: Option<ProgramHandle>);
    fn set_uniform(&mut self, location: UniformLocation, value: &UniformValue);
    fn set_sampler_units(&mut self, location: UniformLocation, units: &[u32]);

    // --- Textures ---

    fn create_texture(
        &mut self,
        descriptor: &TextureDescriptor,
    ) -> Result<TextureHandle, GraphicsError>;
    fn upload_texture(
        &mut self,
        texture: TextureHandle,
        descriptor: &TextureDescriptor,
        data: &TextureData,
    ) -> Result<(), GraphicsError>;
    fn set_sampler_param(&mut self, texture: TextureHandle, param: SamplerParam);
    fn bind_texture(&mut self, unit: u32, texture: Option<TextureHandle>, cubemap: bool);
    fn delete_texture(&mut self, texture: TextureHandle);

    // --- Buffers ---

    fn create_buffer(&mut self, target: BufferTarget) -> Result<BufferHandle, GraphicsError>;
    fn upload_buffer(
        &mut self,
        buffer: BufferHandle,
        target: BufferTarget,
        data: &[u8],
        usage: BufferUsage,
    ) -> Result<(), GraphicsError>;
    fn bind_buffer(&mut self, target: BufferTarget, buffer: Option<BufferHandle>);
    fn delete_buffer(&mut self, buffer: BufferHandle);

    // --- Vertex attributes ---

    fn enable_attribute(&mut self, location: AttributeLocation, element: &VertexElement);
    fn disable_attribute(&mut self, location: AttributeLocation);
    fn set_attribute_divisor(&mut self, location: AttributeLocation, divisor: u32);

    // --- Draw ---

    fn draw(&mut self, primitive: &Primitive, index_format: Option<IndexFormat>, instances: u32);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_presets() {
        let full = DeviceCapabilities::full();
        let minimal = DeviceCapabilities::minimal();
        assert!(full.float_textures && !minimal.float_textures);
        assert!(minimal.vertex_stage);
        assert_eq!(minimal.max_texture_units, 8);
        assert_eq!(DeviceCapabilities::default(), full);
    }

    #[test]
    fn test_uniform_kind() {
        assert!(UniformKind::Sampler2D.is_sampler());
        assert!(UniformKind::SamplerCube.is_sampler());
        assert!(!UniformKind::Value.is_sampler());
        assert_eq!(Precision::Medium.keyword(), "mediump");
    }
}
