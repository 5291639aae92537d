//! Shader generation and the per-device program cache.
//!
//! Programs are produced by named [`ShaderGenerator`]s from a typed options
//! value. The [`ProgramLibrary`] hashes the generator name together with the
//! canonical options into a [`ShaderKey`] and compiles each key at most once.
//!
//! Three generators are built in:
//! - `"standard"`: the physically lit material, see [`StandardGenerator`]
//! - `"depth"`: shadow map and depth-only rendering, see [`DepthGenerator`]
//! - `"basic"`: unlit colour, see [`BasicGenerator`]

mod basic;
mod chunks;
mod depth;
mod library;
mod program;
mod standard;
pub mod variant;

pub use basic::{BasicGenerator, BasicOptions};
pub use chunks::{Chunk, ChunkTable};
pub use depth::{DepthGenerator, DepthOptions};
pub use library::{ProgramLibrary, ProgramOptions, ShaderGenerator, ShaderKey};
pub use program::{Shader, ShaderDefinition, ShaderInput};
pub use standard::{LightKey, MapOptions, StandardGenerator, StandardOptions, main_shadow_light};
pub use variant::{
    AlphaOutput, AmbientSource, FogMode, FresnelModel, GammaMode, MapKind, MapSource,
    ReflectionSource, SpecularModel, TextureChannel, ToneMapping,
};

/// A programmable pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Vertex => f.write_str("vertex"),
            Self::Fragment => f.write_str("fragment"),
        }
    }
}
