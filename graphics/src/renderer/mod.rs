//! Forward renderer.
//!
//! One call to [`ForwardRenderer::render`] walks the frame state machine:
//!
//! ```text
//! Idle -> CameraSetup -> ShadowPass(light)* -> MainPass -> Idle
//! ```
//!
//! Shadow passes run for every enabled shadow-casting light whose update
//! mode is not `Never`. The main pass culls, sorts and submits the draw
//! list, re-sending material and light uniforms only when the material
//! changes between consecutive draws.

mod forward;
pub mod shadow;
pub mod sort;

pub use forward::ForwardRenderer;
pub use sort::{draw_call_key, sort_key};

/// Renderer settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RendererConfig {
    /// Colour shadow maps are cleared to before casters are drawn.
    pub shadow_clear_color: [f32; 4],
    /// Skip instances whose bounding sphere is outside the view.
    pub frustum_culling: bool,
    /// Upper bound of the depth bias sent to the lit shader.
    pub max_shadow_bias: f32,
}

impl RendererConfig {
    pub fn with_shadow_clear_color(mut self, color: [f32; 4]) -> Self {
        self.shadow_clear_color = color;
        self
    }

    pub fn with_frustum_culling(mut self, enabled: bool) -> Self {
        self.frustum_culling = enabled;
        self
    }

    pub fn with_max_shadow_bias(mut self, bias: f32) -> Self {
        self.max_shadow_bias = bias;
        self
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            shadow_clear_color: [1.0, 1.0, 1.0, 1.0],
            frustum_culling: true,
            max_shadow_bias: 1.0,
        }
    }
}

/// Where the renderer is in the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RendererState {
    #[default]
    Idle,
    CameraSetup,
    /// Rendering the shadow map of the light at this scene index.
    ShadowPass(usize),
    MainPass,
}

/// Work done by the last frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RendererStats {
    pub shadow_passes: u32,
    pub shadow_draw_calls: u32,
    pub draw_calls: u32,
    pub commands: u32,
    pub culled: u32,
    /// Draws dropped for a missing program or mismatched buffers.
    pub skipped: u32,
    pub material_changes: u32,
    pub shader_compiles: u64,
}
