//! GLSL chunk library.
//!
//! Every chunk is one small piece of shader source (a declaration block or
//! a function) stored as a `.glsl` file under `shaders/chunks/` and embedded
//! at compile time. Material authors can replace any chunk by name through
//! the override map carried in the program options.
//!
//! Chunk sources follow two conventions the rest of the crate relies on:
//! declarations are one per line (`uniform <type> <name>;`), and templated
//! chunks use `$NAME`, `$UV`, `$CH` and `$EXPONENT` placeholders filled in by
//! the generator.

use std::collections::{BTreeMap, HashSet};

macro_rules! define_chunks {
    ($($variant:ident => $name:literal),* $(,)?) => {
        /// Identifier of one built-in chunk.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Chunk {
            $($variant,)*
        }

        impl Chunk {
            /// Every chunk, in declaration order.
            pub const ALL: &'static [Chunk] = &[$(Chunk::$variant,)*];

            /// Name used as the override key and file stem.
            pub fn name(self) -> &'static str {
                match self {
                    $(Chunk::$variant => $name,)*
                }
            }

            /// Built-in source text.
            pub fn default_source(self) -> &'static str {
                match self {
                    $(Chunk::$variant => include_str!(concat!("../../shaders/chunks/", $name, ".glsl")),)*
                }
            }
        }
    };
}

define_chunks! {
    // Vertex stage
    BaseVs => "base_vs",
    ModelVs => "model_vs",
    InstancingVs => "instancing_vs",
    SkinVs => "skin_vs",
    TransformVs => "transform_vs",
    NormalVs => "normal_vs",
    NormalInstancedVs => "normal_instanced_vs",
    TangentBinormalVs => "tangent_binormal_vs",
    Uv0Vs => "uv0_vs",
    Uv1Vs => "uv1_vs",
    ColorVs => "color_vs",
    ShadowCoordVs => "shadow_coord_vs",
    ShadowCoordNormalOffsetVs => "shadow_coord_normal_offset_vs",

    // Surface
    BasePs => "base_ps",
    DiffuseConstPs => "diffuse_const_ps",
    SpecularConstPs => "specular_const_ps",
    GlossConstPs => "gloss_const_ps",
    EmissiveConstPs => "emissive_const_ps",
    OpacityConstPs => "opacity_const_ps",
    MapTexColorPs => "map_tex_color_ps",
    MapTexFloatPs => "map_tex_float_ps",
    MapVertColorPs => "map_vert_color_ps",
    MapVertFloatPs => "map_vert_float_ps",
    NormalVertexPs => "normal_vertex_ps",
    NormalMapPs => "normal_map_ps",
    ParallaxPs => "parallax_ps",
    TwoSidedPs => "two_sided_ps",
    AlphaTestPs => "alpha_test_ps",

    // Environment
    AmbientConstantPs => "ambient_constant_ps",
    AmbientPrefilteredPs => "ambient_prefiltered_ps",
    PrefilteredCubePs => "prefiltered_cube_ps",
    ReflectionCubePs => "reflection_cube_ps",
    ReflectionSpherePs => "reflection_sphere_ps",
    ReflectionPrefilteredPs => "reflection_prefiltered_ps",
    RefractionPs => "refraction_ps",

    // Lights
    LightDirPointPs => "light_dir_point_ps",
    FalloffLinearPs => "falloff_linear_ps",
    FalloffInvSquaredPs => "falloff_inv_squared_ps",
    SpotPs => "spot_ps",
    LightDiffuseLambertPs => "light_diffuse_lambert_ps",
    LightSpecularBlinnPs => "light_specular_blinn_ps",
    LightSpecularPhongPs => "light_specular_phong_ps",
    FresnelSchlickPs => "fresnel_schlick_ps",
    CombineDiffusePs => "combine_diffuse_ps",
    CombineDiffuseSpecularPs => "combine_diffuse_specular_ps",
    CombineDiffuseSpecularConservePs => "combine_diffuse_specular_conserve_ps",

    // Shadows
    PackDepthPs => "pack_depth_ps",
    ShadowCoordOrthoPs => "shadow_coord_ortho_ps",
    ShadowCoordPerspPs => "shadow_coord_persp_ps",
    ShadowCoordOrthoNormalOffsetPs => "shadow_coord_ortho_normal_offset_ps",
    ShadowCoordPerspNormalOffsetPs => "shadow_coord_persp_normal_offset_ps",
    ShadowCoordVaryingPs => "shadow_coord_varying_ps",
    NormalOffsetPointPs => "normal_offset_point_ps",
    ShadowHardPs => "shadow_hard_ps",
    ShadowHardFloatPs => "shadow_hard_float_ps",
    ShadowPcf3Ps => "shadow_pcf3_ps",
    ShadowPcf3FloatPs => "shadow_pcf3_float_ps",
    ShadowVsmCommonPs => "shadow_vsm_common_ps",
    ShadowVsmPackedPs => "shadow_vsm_packed_ps",
    ShadowVsmFloatPs => "shadow_vsm_float_ps",
    ShadowCubeHardPs => "shadow_cube_hard_ps",
    ShadowCubeHardFloatPs => "shadow_cube_hard_float_ps",
    ShadowCubePcfPs => "shadow_cube_pcf_ps",
    ShadowCubePcfFloatPs => "shadow_cube_pcf_float_ps",

    // Output
    FogNonePs => "fog_none_ps",
    FogLinearPs => "fog_linear_ps",
    FogExpPs => "fog_exp_ps",
    FogExp2Ps => "fog_exp2_ps",
    GammaNonePs => "gamma_none_ps",
    GammaSrgbPs => "gamma_srgb_ps",
    GammaSrgbFastPs => "gamma_srgb_fast_ps",
    TonemapLinearPs => "tonemap_linear_ps",
    TonemapFilmicPs => "tonemap_filmic_ps",
    OutputAlphaPs => "output_alpha_ps",
    OutputAlphaPremulPs => "output_alpha_premul_ps",
    OutputAlphaOpaquePs => "output_alpha_opaque_ps",

    // Depth and basic programs
    DepthPackedPs => "depth_packed_ps",
    DepthFloatPs => "depth_float_ps",
    DepthVsmPackedPs => "depth_vsm_packed_ps",
    DepthVsmFloatPs => "depth_vsm_float_ps",
    DepthPointPackedPs => "depth_point_packed_ps",
    DepthPointFloatPs => "depth_point_float_ps",
    BasicPs => "basic_ps",
}

impl Chunk {
    /// Look a chunk up by its override name.
    pub fn from_name(name: &str) -> Option<Chunk> {
        Self::ALL.iter().copied().find(|c| c.name() == name)
    }
}

impl std::fmt::Display for Chunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// ChunkTable
// =============================================================================

/// Built-in chunks with per-material overrides applied.
#[derive(Debug, Clone, Copy)]
pub struct ChunkTable<'a> {
    overrides: &'a BTreeMap<String, String>,
}

impl<'a> ChunkTable<'a> {
    pub fn new(overrides: &'a BTreeMap<String, String>) -> Self {
        for name in overrides.keys() {
            if Chunk::from_name(name).is_none() {
                log::warn!("Chunk override '{name}' does not name a known chunk");
            }
        }
        Self { overrides }
    }

    /// Source for `chunk`, the override if one is set.
    pub fn source(&self, chunk: Chunk) -> &'a str {
        match self.overrides.get(chunk.name()) {
            Some(source) => source.as_str(),
            None => chunk.default_source(),
        }
    }
}

// =============================================================================
// SourceBuilder
// =============================================================================

/// Accumulates one stage's source.
///
/// Plain chunks are included at most once. Templated chunks are included
/// once per distinct substitution.
pub(crate) struct SourceBuilder<'a> {
    table: ChunkTable<'a>,
    code: String,
    included: HashSet<(Chunk, String)>,
}

impl<'a> SourceBuilder<'a> {
    pub fn new(table: ChunkTable<'a>) -> Self {
        Self {
            table,
            code: String::with_capacity(4096),
            included: HashSet::new(),
        }
    }

    /// Append a raw line.
    pub fn line(&mut self, line: impl AsRef<str>) -> &mut Self {
        self.code.push_str(line.as_ref());
        self.code.push('\n');
        self
    }

    /// Append `chunk` unless it is already present.
    pub fn chunk(&mut self, chunk: Chunk) -> &mut Self {
        self.chunk_with(chunk, &[])
    }

    /// Append `chunk` with each `(placeholder, value)` replaced, unless the
    /// same chunk with the same substitutions is already present.
    pub fn chunk_with(&mut self, chunk: Chunk, substitutions: &[(&str, &str)]) -> &mut Self {
        let signature = substitutions
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",");
        if !self.included.insert((chunk, signature)) {
            return self;
        }
        let mut source = self.table.source(chunk).to_owned();
        for (placeholder, value) in substitutions {
            source = source.replace(placeholder, value);
        }
        self.code.push_str(&source);
        if !source.ends_with('\n') {
            self.code.push('\n');
        }
        self.code.push('\n');
        self
    }

    pub fn finish(self) -> String {
        self.code
    }
}
