//! Shader generator for the physically lit material.
//!
//! Source is assembled from chunks in a fixed order: surface inputs, then
//! ambient and reflections, then one block per light, then output
//! conversion. Every choice is made from [`StandardOptions::canonical`], so
//! the generated text is a pure function of the cache key.

use std::collections::BTreeMap;

use crate::device::{BlendMode, DeviceCapabilities};
use crate::error::GraphicsError;
use crate::scene::{Falloff, LightType, ShadowFilter, ShadowStorage};

use super::chunks::{Chunk, ChunkTable, SourceBuilder};
use super::library::{ProgramOptions, ShaderGenerator};
use super::program::ShaderDefinition;
use super::variant::{
    self, AlphaOutput, AmbientSource, FogMode, FresnelModel, GammaMode, MapKind, MapSource,
    ReflectionSource, ShadowReadArgument, SpecularModel, TextureChannel, ToneMapping,
};

// =============================================================================
// Options
// =============================================================================

/// How one material map is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MapOptions {
    pub source: MapSource,
    pub channel: TextureChannel,
    /// UV set, 0 or 1.
    pub uv: u8,
    /// Whether a `texture_<name>MapTransform` tiling/offset uniform is applied.
    pub transform: bool,
}

impl MapOptions {
    /// Read the map from a texture on UV set 0.
    pub fn texture() -> Self {
        Self {
            source: MapSource::Texture,
            channel: TextureChannel::Rgb,
            uv: 0,
            transform: false,
        }
    }

    /// Read the map from the vertex colour.
    pub fn vertex_color() -> Self {
        Self {
            source: MapSource::VertexColor,
            ..Self::texture()
        }
    }

    pub fn with_channel(mut self, channel: TextureChannel) -> Self {
        self.channel = channel;
        self
    }

    pub fn with_uv(mut self, uv: u8) -> Self {
        self.uv = uv;
        self
    }

    pub fn with_transform(mut self, transform: bool) -> Self {
        self.transform = transform;
        self
    }

    /// Drop fields the generated code for `kind` never reads.
    pub(crate) fn canonical(mut self, kind: MapKind) -> Option<Self> {
        if self.source == MapSource::VertexColor {
            if !kind.supports_vertex_color() {
                return None;
            }
            self.uv = 0;
            self.transform = false;
        }
        self.uv = self.uv.min(1);
        self.channel = match kind {
            MapKind::Normal => TextureChannel::Rgb,
            kind if kind.is_color() => TextureChannel::Rgb,
            kind if !self.channel.is_single() => kind.default_channel(),
            _ => self.channel,
        };
        Some(self)
    }
}

/// Per-light part of the variant key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LightKey {
    pub light_type: LightType,
    pub casts_shadow: bool,
    pub shadow_storage: ShadowStorage,
    pub shadow_filter: ShadowFilter,
    pub falloff: Falloff,
    pub normal_offset: bool,
}

impl LightKey {
    pub fn new(light_type: LightType) -> Self {
        Self {
            light_type,
            casts_shadow: false,
            shadow_storage: ShadowStorage::PackedRgba8,
            shadow_filter: ShadowFilter::Hard,
            falloff: Falloff::Linear,
            normal_offset: false,
        }
    }

    /// Fields that do not change the light's code are reset.
    pub fn canonical(mut self) -> Self {
        if !self.casts_shadow {
            self.shadow_storage = ShadowStorage::PackedRgba8;
            self.shadow_filter = ShadowFilter::Hard;
            self.normal_offset = false;
        } else if self.light_type == LightType::Point && self.shadow_filter.is_vsm() {
            self.shadow_filter = ShadowFilter::Hard;
        }
        if self.light_type == LightType::Directional {
            self.falloff = Falloff::Linear;
        }
        self
    }

    /// Bit-packed form, stable across runs.
    pub fn pack(&self) -> u32 {
        let light_type = match self.light_type {
            LightType::Directional => 0,
            LightType::Point => 1,
            LightType::Spot => 2,
        };
        let storage = match self.shadow_storage {
            ShadowStorage::PackedRgba8 => 0,
            ShadowStorage::Float16 => 1,
            ShadowStorage::Float32 => 2,
        };
        let filter = match self.shadow_filter {
            ShadowFilter::Hard => 0,
            ShadowFilter::Pcf3x3 => 1,
            ShadowFilter::Vsm8 => 2,
            ShadowFilter::Vsm16 => 3,
            ShadowFilter::Vsm32 => 4,
        };
        light_type
            | (u32::from(self.casts_shadow) << 2)
            | (storage << 3)
            | (filter << 5)
            | ((self.falloff as u32) << 8)
            | (u32::from(self.normal_offset) << 9)
    }
}

/// Index of the light whose shadow coordinate is computed per vertex: the
/// first shadow-casting light that is not a point light.
pub fn main_shadow_light(lights: &[LightKey]) -> Option<usize> {
    lights
        .iter()
        .position(|l| l.casts_shadow && l.light_type != LightType::Point)
}

/// Feature record of the physically lit material.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardOptions {
    pub fog: FogMode,
    pub gamma: GammaMode,
    pub tone_map: ToneMapping,
    pub skin: bool,
    pub instancing: bool,
    /// Multiply the albedo by the vertex colour.
    pub vertex_colors: bool,

    pub diffuse_map: Option<MapOptions>,
    pub specular_map: Option<MapOptions>,
    pub gloss_map: Option<MapOptions>,
    pub emissive_map: Option<MapOptions>,
    pub opacity_map: Option<MapOptions>,
    pub normal_map: Option<MapOptions>,
    pub height_map: Option<MapOptions>,
    pub ao_map: Option<MapOptions>,
    pub light_map: Option<MapOptions>,

    pub use_specular: bool,
    pub specular_model: SpecularModel,
    pub fresnel_model: FresnelModel,
    pub conserve_energy: bool,
    pub alpha_test: bool,
    pub blend: BlendMode,
    pub two_sided_lighting: bool,
    pub ambient: AmbientSource,
    pub reflection: ReflectionSource,
    pub refraction: bool,
    pub lights: Vec<LightKey>,
    /// Chunk source overrides keyed by chunk name.
    pub chunks: BTreeMap<String, String>,
}

impl Default for StandardOptions {
    fn default() -> Self {
        Self {
            fog: FogMode::None,
            gamma: GammaMode::None,
            tone_map: ToneMapping::Linear,
            skin: false,
            instancing: false,
            vertex_colors: false,
            diffuse_map: None,
            specular_map: None,
            gloss_map: None,
            emissive_map: None,
            opacity_map: None,
            normal_map: None,
            height_map: None,
            ao_map: None,
            light_map: None,
            use_specular: true,
            specular_model: SpecularModel::Blinn,
            fresnel_model: FresnelModel::None,
            conserve_energy: false,
            alpha_test: false,
            blend: BlendMode::None,
            two_sided_lighting: false,
            ambient: AmbientSource::Constant,
            reflection: ReflectionSource::None,
            refraction: false,
            lights: Vec::new(),
            chunks: BTreeMap::new(),
        }
    }
}

impl StandardOptions {
    pub fn map(&self, kind: MapKind) -> Option<&MapOptions> {
        match kind {
            MapKind::Diffuse => self.diffuse_map.as_ref(),
            MapKind::Specular => self.specular_map.as_ref(),
            MapKind::Gloss => self.gloss_map.as_ref(),
            MapKind::Emissive => self.emissive_map.as_ref(),
            MapKind::Opacity => self.opacity_map.as_ref(),
            MapKind::Normal => self.normal_map.as_ref(),
            MapKind::Height => self.height_map.as_ref(),
            MapKind::Ao => self.ao_map.as_ref(),
            MapKind::Light => self.light_map.as_ref(),
        }
    }

    pub fn map_mut(&mut self, kind: MapKind) -> &mut Option<MapOptions> {
        match kind {
            MapKind::Diffuse => &mut self.diffuse_map,
            MapKind::Specular => &mut self.specular_map,
            MapKind::Gloss => &mut self.gloss_map,
            MapKind::Emissive => &mut self.emissive_map,
            MapKind::Opacity => &mut self.opacity_map,
            MapKind::Normal => &mut self.normal_map,
            MapKind::Height => &mut self.height_map,
            MapKind::Ao => &mut self.ao_map,
            MapKind::Light => &mut self.light_map,
        }
    }

    /// Whether the material's output alpha is used.
    pub fn uses_alpha(&self) -> bool {
        AlphaOutput::for_blend(self.blend).writes_alpha() || self.alpha_test
    }

    /// Copy with every field that does not affect the generated source
    /// reset, so equivalent configurations share one key.
    pub fn canonical(&self) -> Self {
        let mut options = self.clone();

        if options.skin {
            options.instancing = false;
        }
        options.blend = AlphaOutput::for_blend(options.blend).representative();
        for kind in MapKind::ALL {
            let slot = options.map_mut(kind);
            *slot = slot.and_then(|m| m.canonical(kind));
        }
        if !options.uses_alpha() {
            options.opacity_map = None;
        }
        if !options.use_specular {
            options.specular_model = SpecularModel::Blinn;
            options.fresnel_model = FresnelModel::None;
            options.specular_map = None;
            options.gloss_map = None;
            options.conserve_energy = false;
        }
        if options.reflection == ReflectionSource::None {
            options.refraction = false;
        }
        if options.lights.is_empty() {
            options.specular_model = SpecularModel::Blinn;
        }

        options.lights = options.lights.iter().map(|l| l.canonical()).collect();
        options.lights.sort_by_key(|l| l.light_type);
        options
    }

    fn needs_tangents(&self) -> bool {
        self.normal_map.is_some() || self.height_map.is_some()
    }

    fn uses_vertex_color(&self) -> bool {
        self.vertex_colors
            || MapKind::ALL
                .iter()
                .any(|k| self.map(*k).is_some_and(|m| m.source == MapSource::VertexColor))
    }

    fn uses_uv(&self, set: u8) -> bool {
        MapKind::ALL.iter().any(|k| {
            self.map(*k)
                .is_some_and(|m| m.source == MapSource::Texture && m.uv == set)
        })
    }

    fn uses_prefiltered(&self) -> bool {
        self.ambient == AmbientSource::Prefiltered
            || self.reflection == ReflectionSource::Prefiltered
    }

    /// Whether specular light or reflections reach the output.
    fn has_specular_output(&self) -> bool {
        self.use_specular || self.reflection != ReflectionSource::None
    }
}

// =============================================================================
// Shared emission helpers
// =============================================================================

/// Declare `varying`s. Each entry is `(type, name)`.
pub(super) fn declare_varyings(builder: &mut SourceBuilder<'_>, varyings: &[(&str, &str)]) {
    for (ty, name) in varyings {
        builder.line(format!("varying {ty} {name};"));
    }
    builder.line("");
}

/// Vertex chunks producing `getModelMatrix()` and `getPosition()`.
pub(super) fn emit_vertex_transform(builder: &mut SourceBuilder<'_>, skin: bool, instancing: bool) {
    builder.chunk(Chunk::BaseVs);
    builder.chunk(if skin {
        Chunk::SkinVs
    } else if instancing {
        Chunk::InstancingVs
    } else {
        Chunk::ModelVs
    });
    builder.chunk(Chunk::TransformVs);
}

/// Texture coordinate expression for a map.
fn uv_expression(kind: MapKind, map: &MapOptions, parallax: bool) -> String {
    let mut uv = format!("vUv{}", map.uv);
    if map.transform {
        let name = kind.name();
        uv = format!("({uv} * texture_{name}MapTransform.xy + texture_{name}MapTransform.zw)");
    }
    if parallax && kind != MapKind::Height {
        uv = format!("({uv} + dUvOffset)");
    }
    uv
}

/// Emit the chunk producing `get_<name>()` (or `getNormal()`, `getParallax()`)
/// for one map slot.
pub(super) fn emit_map(
    builder: &mut SourceBuilder<'_>,
    kind: MapKind,
    map: Option<&MapOptions>,
    parallax: bool,
) {
    let Some(chunk) = variant::map_chunk(kind, map.map(|m| m.source)) else {
        return;
    };
    let Some(map) = map else {
        builder.chunk(chunk);
        return;
    };
    if map.transform && map.source == MapSource::Texture {
        builder.line(format!("uniform vec4 texture_{}MapTransform;", kind.name()));
    }
    let uv = uv_expression(kind, map, parallax);
    builder.chunk_with(
        chunk,
        &[
            ("$NAME", kind.name()),
            ("$UV", &uv),
            ("$CH", map.channel.swizzle()),
        ],
    );
}

// =============================================================================
// StandardGenerator
// =============================================================================

/// Generator registered as `"standard"`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardGenerator;

impl ShaderGenerator for StandardGenerator {
    fn name(&self) -> &'static str {
        "standard"
    }

    fn create_definition(
        &self,
        capabilities: &DeviceCapabilities,
        options: &ProgramOptions,
    ) -> Result<ShaderDefinition, GraphicsError> {
        let ProgramOptions::Standard(options) = options else {
            return Err(GraphicsError::InvalidParameter(
                "standard generator needs standard options".into(),
            ));
        };
        let options = options.canonical();
        let table = ChunkTable::new(&options.chunks);
        let main_light = main_shadow_light(&options.lights);
        let varyings = varyings(&options, main_light.is_some());

        Ok(ShaderDefinition {
            generator: self.name().to_owned(),
            vshader: vertex_source(&options, table, &varyings, main_light),
            fshader: fragment_source(capabilities, &options, table, &varyings, main_light),
            light_count: options.lights.len(),
        })
    }
}

fn varyings(options: &StandardOptions, main_light: bool) -> Vec<(&'static str, &'static str)> {
    let mut varyings = vec![("vec3", "vPositionW"), ("vec3", "vNormalW")];
    if options.needs_tangents() {
        varyings.push(("vec3", "vTangentW"));
        varyings.push(("vec3", "vBinormalW"));
    }
    if options.uses_uv(0) {
        varyings.push(("vec2", "vUv0"));
    }
    if options.uses_uv(1) {
        varyings.push(("vec2", "vUv1"));
    }
    if options.uses_vertex_color() {
        varyings.push(("vec4", "vVertexColor"));
    }
    if main_light {
        varyings.push(("vec4", "vMainShadowUv"));
    }
    varyings
}

fn vertex_source(
    options: &StandardOptions,
    table: ChunkTable<'_>,
    varyings: &[(&str, &str)],
    main_light: Option<usize>,
) -> String {
    let mut vs = SourceBuilder::new(table);
    declare_varyings(&mut vs, varyings);
    emit_vertex_transform(&mut vs, options.skin, options.instancing);
    vs.chunk(if options.skin || options.instancing {
        Chunk::NormalInstancedVs
    } else {
        Chunk::NormalVs
    });
    if options.needs_tangents() {
        vs.chunk(Chunk::TangentBinormalVs);
    }
    if options.uses_uv(0) {
        vs.chunk(Chunk::Uv0Vs);
    }
    if options.uses_uv(1) {
        vs.chunk(Chunk::Uv1Vs);
    }
    if options.uses_vertex_color() {
        vs.chunk(Chunk::ColorVs);
    }

    let main = main_light.map(|i| (i, options.lights[i]));
    if let Some((i, light)) = main {
        let params_type = match light.light_type {
            LightType::Spot => "vec4",
            _ => "vec3",
        };
        vs.line(format!("uniform mat4 light{i}_shadowMatrixVS;"));
        vs.line(format!("uniform {params_type} light{i}_shadowParamsVS;"));
        match light.light_type {
            LightType::Spot => vs.line(format!("uniform vec3 light{i}_positionVS;")),
            _ => vs.line(format!("uniform vec3 light{i}_directionVS;")),
        };
        vs.line("");
        vs.chunk(if light.normal_offset {
            Chunk::ShadowCoordNormalOffsetVs
        } else {
            Chunk::ShadowCoordVs
        });
    }

    vs.line("void main() {");
    vs.line("    mat4 model = getModelMatrix();");
    vs.line("    gl_Position = getPosition(model);");
    vs.line("    vNormalW = getNormal(model);");
    if options.needs_tangents() {
        vs.line("    getTangentBinormal(model, vNormalW);");
    }
    if options.uses_uv(0) {
        vs.line("    vUv0 = getUv0();");
    }
    if options.uses_uv(1) {
        vs.line("    vUv1 = getUv1();");
    }
    if options.uses_vertex_color() {
        vs.line("    vVertexColor = getVertexColor();");
    }
    if let Some((i, light)) = main {
        if light.normal_offset {
            let light_dir = match light.light_type {
                LightType::Spot => format!("normalize(vPositionW - light{i}_positionVS)"),
                _ => format!("light{i}_directionVS"),
            };
            vs.line(format!(
                "    vMainShadowUv = getShadowCoordVS(light{i}_shadowMatrixVS, light{i}_shadowParamsVS.xyz, vPositionW, vNormalW, {light_dir});"
            ));
        } else {
            vs.line(format!(
                "    vMainShadowUv = getShadowCoordVS(light{i}_shadowMatrixVS, vPositionW);"
            ));
        }
    }
    vs.line("}");
    vs.finish()
}

fn declare_light(fs: &mut SourceBuilder<'_>, i: usize, light: &LightKey, main: bool) {
    fs.line(format!("uniform vec3 light{i}_color;"));
    match light.light_type {
        LightType::Directional => {
            fs.line(format!("uniform vec3 light{i}_direction;"));
        }
        LightType::Point | LightType::Spot => {
            fs.line(format!("uniform vec3 light{i}_position;"));
            fs.line(format!("uniform float light{i}_radius;"));
        }
    }
    if light.light_type == LightType::Spot {
        fs.line(format!("uniform vec3 light{i}_direction;"));
        fs.line(format!("uniform float light{i}_spotInnerCone;"));
        fs.line(format!("uniform float light{i}_spotOuterCone;"));
    }
    if light.casts_shadow {
        let (sampler, params) = match light.light_type {
            LightType::Directional => ("sampler2D", "vec3"),
            LightType::Spot => ("sampler2D", "vec4"),
            LightType::Point => ("samplerCube", "vec4"),
        };
        fs.line(format!("uniform {sampler} light{i}_shadowMap;"));
        fs.line(format!("uniform {params} light{i}_shadowParams;"));
        if light.light_type != LightType::Point && !main {
            fs.line(format!("uniform mat4 light{i}_shadowMatrix;"));
        }
    }
}

fn emit_light_block(fs: &mut SourceBuilder<'_>, i: usize, light: &LightKey, main: bool, specular: bool) {
    fs.line("    {");
    match light.light_type {
        LightType::Directional => {
            fs.line(format!("        dLightDirNormW = light{i}_direction;"));
            fs.line("        dAtten = 1.0;");
        }
        LightType::Point | LightType::Spot => {
            let (_, falloff) = variant::falloff_chunk(light.falloff);
            fs.line(format!("        getLightDirPoint(light{i}_position);"));
            fs.line(format!("        dAtten = {falloff}(light{i}_radius);"));
        }
    }
    if light.light_type == LightType::Spot {
        fs.line(format!(
            "        dAtten *= getSpotEffect(light{i}_direction, light{i}_spotInnerCone, light{i}_spotOuterCone);"
        ));
    }
    fs.line(format!(
        "        vec3 diffuse = dAtten * getLightDiffuse() * light{i}_color;"
    ));
    if specular {
        fs.line(format!(
            "        vec3 specular = dAtten * getLightSpecular() * light{i}_color;"
        ));
    }

    if light.casts_shadow {
        if main {
            fs.line(format!(
                "        getShadowCoordVarying(vMainShadowUv, light{i}_shadowParams.z);"
            ));
        } else if let Some((_, coord)) =
            variant::shadow_coord_chunk(light.light_type, light.normal_offset)
        {
            let call = match light.light_type {
                LightType::Point => format!("{coord}(light{i}_shadowParams, light{i}_position)"),
                _ => format!("{coord}(light{i}_shadowMatrix, light{i}_shadowParams)"),
            };
            fs.line(format!("        {call};"));
        }
        let read = variant::shadow_read(light.shadow_storage, light.shadow_filter, light.light_type);
        let argument = match read.argument {
            ShadowReadArgument::Resolution => format!("light{i}_shadowParams.x"),
            ShadowReadArgument::Exponent => {
                format!("{:.4}", variant::evsm_exponent(light.shadow_storage))
            }
            ShadowReadArgument::Params => format!("light{i}_shadowParams"),
        };
        fs.line(format!(
            "        float shadow = {}(light{i}_shadowMap, {argument});",
            read.function
        ));
        fs.line("        diffuse *= shadow;");
        if specular {
            fs.line("        specular *= shadow;");
        }
    }

    fs.line("        dDiffuseLight += diffuse;");
    if specular {
        fs.line("        dSpecularLight += specular;");
    }
    fs.line("    }");
}

fn fragment_source(
    capabilities: &DeviceCapabilities,
    options: &StandardOptions,
    table: ChunkTable<'_>,
    varyings: &[(&str, &str)],
    main_light: Option<usize>,
) -> String {
    let mut fs = SourceBuilder::new(table);
    fs.line(format!("precision {} float;", capabilities.precision.keyword()));
    fs.line("");
    declare_varyings(&mut fs, varyings);
    fs.chunk(Chunk::BasePs);
    fs.chunk(variant::gamma_chunk(options.gamma));

    // Surface
    let parallax = options.height_map.is_some();
    emit_map(&mut fs, MapKind::Height, options.height_map.as_ref(), false);
    emit_map(&mut fs, MapKind::Normal, options.normal_map.as_ref(), parallax);
    emit_map(&mut fs, MapKind::Diffuse, options.diffuse_map.as_ref(), parallax);
    if options.uses_alpha() {
        emit_map(&mut fs, MapKind::Opacity, options.opacity_map.as_ref(), parallax);
    }
    if options.use_specular {
        emit_map(&mut fs, MapKind::Specular, options.specular_map.as_ref(), parallax);
        emit_map(&mut fs, MapKind::Gloss, options.gloss_map.as_ref(), parallax);
    }
    emit_map(&mut fs, MapKind::Emissive, options.emissive_map.as_ref(), parallax);
    emit_map(&mut fs, MapKind::Ao, options.ao_map.as_ref(), parallax);
    emit_map(&mut fs, MapKind::Light, options.light_map.as_ref(), parallax);
    if options.two_sided_lighting {
        fs.chunk(Chunk::TwoSidedPs);
    }
    if options.alpha_test {
        fs.chunk(Chunk::AlphaTestPs);
    }

    // Environment
    if options.uses_prefiltered() {
        fs.chunk(Chunk::PrefilteredCubePs);
    }
    fs.chunk(variant::ambient_chunk(options.ambient));
    if let Some(chunk) = variant::reflection_chunk(options.reflection) {
        fs.chunk(chunk);
        if options.refraction {
            fs.chunk(Chunk::RefractionPs);
        }
    }

    // Lights
    let lights = &options.lights;
    if !lights.is_empty() {
        fs.chunk(Chunk::LightDiffuseLambertPs);
        if options.use_specular {
            fs.chunk(variant::specular_chunk(options.specular_model));
        }
    }
    if options.use_specular {
        if let Some(chunk) = variant::fresnel_chunk(options.fresnel_model) {
            fs.chunk(chunk);
        }
    }
    if lights.iter().any(|l| l.light_type != LightType::Directional) {
        fs.chunk(Chunk::LightDirPointPs);
    }
    for light in lights.iter().filter(|l| l.light_type != LightType::Directional) {
        fs.chunk(variant::falloff_chunk(light.falloff).0);
    }
    if lights.iter().any(|l| l.light_type == LightType::Spot) {
        fs.chunk(Chunk::SpotPs);
    }
    for (i, light) in lights.iter().enumerate().filter(|(_, l)| l.casts_shadow) {
        if light.shadow_storage == ShadowStorage::PackedRgba8 {
            fs.chunk(Chunk::PackDepthPs);
        }
        if main_light == Some(i) {
            fs.chunk(Chunk::ShadowCoordVaryingPs);
        } else if let Some((chunk, _)) =
            variant::shadow_coord_chunk(light.light_type, light.normal_offset)
        {
            fs.chunk(chunk);
        }
        let read = variant::shadow_read(light.shadow_storage, light.shadow_filter, light.light_type);
        if read.argument == ShadowReadArgument::Exponent {
            fs.chunk(Chunk::ShadowVsmCommonPs);
        }
        fs.chunk(read.chunk);
    }
    for (i, light) in lights.iter().enumerate() {
        declare_light(&mut fs, i, light, main_light == Some(i));
    }
    fs.line("");

    // Output
    fs.chunk(variant::combine_chunk(
        options.has_specular_output(),
        options.conserve_energy,
    ));
    fs.chunk(variant::tonemap_chunk(options.tone_map));
    fs.chunk(variant::fog_chunk(options.fog));
    fs.chunk(variant::alpha_output_chunk(options.blend));

    fs.line("void main() {");
    fs.line("    dDiffuseLight = vec3(0.0);");
    fs.line("    dSpecularLight = vec3(0.0);");
    fs.line("    dReflection = vec4(0.0);");
    fs.line("    dUvOffset = vec2(0.0);");
    fs.line("    getViewDir();");
    if parallax {
        fs.line("    getParallax();");
    }
    fs.line("    getNormal();");
    if options.two_sided_lighting {
        fs.line("    flipBackfaceNormal();");
    }
    fs.line("    getReflDir();");

    let gamma_input = |kind: MapKind| {
        options
            .map(kind)
            .is_some_and(|m| m.source == MapSource::Texture)
    };
    if gamma_input(MapKind::Diffuse) {
        fs.line("    dAlbedo = gammaCorrectInput(get_diffuse());");
    } else {
        fs.line("    dAlbedo = get_diffuse();");
    }
    if options.vertex_colors {
        fs.line("    dAlbedo *= vVertexColor.rgb;");
    }
    if options.uses_alpha() {
        fs.line("    dAlpha = get_opacity();");
    } else {
        fs.line("    dAlpha = 1.0;");
    }
    if options.alpha_test {
        fs.line("    alphaTest(dAlpha);");
    }
    if options.use_specular {
        fs.line("    dSpecularity = get_specular();");
        fs.line("    dGlossiness = get_gloss();");
    } else {
        fs.line("    dSpecularity = vec3(1.0);");
        fs.line("    dGlossiness = 0.0;");
    }
    if gamma_input(MapKind::Emissive) {
        fs.line("    dEmission = gammaCorrectInput(get_emissive());");
    } else {
        fs.line("    dEmission = get_emissive();");
    }
    if options.use_specular && options.fresnel_model != FresnelModel::None {
        fs.line("    getFresnel();");
    }

    fs.line("    addAmbient();");
    if options.ao_map.is_some() {
        fs.line("    dAo = get_ao();");
        fs.line("    dDiffuseLight *= dAo;");
    }
    if options.light_map.is_some() {
        if gamma_input(MapKind::Light) {
            fs.line("    dDiffuseLight += gammaCorrectInput(get_light());");
        } else {
            fs.line("    dDiffuseLight += get_light();");
        }
    }

    for (i, light) in lights.iter().enumerate() {
        emit_light_block(&mut fs, i, light, main_light == Some(i), options.use_specular);
    }

    if options.reflection != ReflectionSource::None {
        fs.line("    addReflection();");
        if options.refraction {
            fs.line("    addRefraction();");
        }
    }
    fs.line("    vec3 color = combineColor() + dEmission;");
    fs.line("    color = toneMap(color);");
    fs.line("    color = addFog(color);");
    fs.line("    color = gammaCorrectOutput(color);");
    fs.line("    gl_FragColor = outputColor(color);");
    fs.line("}");
    fs.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::ShaderKey;

    fn generate(options: StandardOptions) -> ShaderDefinition {
        StandardGenerator
            .create_definition(&DeviceCapabilities::full(), &options.into())
            .unwrap()
    }

    fn key(options: StandardOptions) -> ShaderKey {
        StandardGenerator.key(&options.into())
    }

    fn shadow_light(light_type: LightType) -> LightKey {
        LightKey {
            casts_shadow: true,
            shadow_filter: ShadowFilter::Pcf3x3,
            shadow_storage: ShadowStorage::Float32,
            ..LightKey::new(light_type)
        }
    }

    #[test]
    fn test_default_generates_both_stages() {
        let def = generate(StandardOptions::default());
        assert!(def.vshader.contains("void main()"));
        assert!(def.fshader.contains("gl_FragColor = outputColor(color);"));
        assert!(def.fshader.contains("return vec4(color, 1.0);"));
        assert!(def.fshader.starts_with("precision highp float;"));
        assert!(def.fshader.contains("addAmbient"));
        assert_eq!(def.light_count, 0);
    }

    #[test]
    fn test_normal_map_changes_key() {
        let without = StandardOptions::default();
        let with = StandardOptions {
            normal_map: Some(MapOptions::texture()),
            ..Default::default()
        };
        assert_ne!(key(without), key(with.clone()));
        let def = generate(with);
        assert!(def.fshader.contains("uniform sampler2D texture_normalMap;"));
        assert!(def.vshader.contains("attribute vec4 vertex_tangent;"));
    }

    #[test]
    fn test_irrelevant_fields_do_not_change_key() {
        let base = StandardOptions {
            lights: vec![LightKey::new(LightType::Point), LightKey::new(LightType::Directional)],
            ..Default::default()
        };

        let mut reordered = base.clone();
        reordered.lights.reverse();
        assert_eq!(key(base.clone()), key(reordered));

        let mut no_shadow_filter = base.clone();
        no_shadow_filter.lights[1].shadow_filter = ShadowFilter::Vsm32;
        assert_eq!(key(base.clone()), key(no_shadow_filter));

        let mut directional_falloff = base.clone();
        directional_falloff.lights[1].falloff = Falloff::InverseSquared;
        assert_eq!(key(base.clone()), key(directional_falloff));

        let mut no_blend_opacity = base.clone();
        no_blend_opacity.opacity_map = Some(MapOptions::texture());
        assert_eq!(key(base), key(no_blend_opacity));
    }

    #[test]
    fn test_blend_modes_key_by_alpha_output() {
        let with_blend = |blend| StandardOptions {
            blend,
            ..Default::default()
        };

        assert_eq!(key(with_blend(BlendMode::Normal)), key(with_blend(BlendMode::AdditiveAlpha)));
        assert_eq!(key(with_blend(BlendMode::None)), key(with_blend(BlendMode::Additive)));
        assert_eq!(key(with_blend(BlendMode::None)), key(with_blend(BlendMode::Multiplicative)));
        assert_ne!(key(with_blend(BlendMode::Normal)), key(with_blend(BlendMode::Premultiplied)));

        let straight = generate(with_blend(BlendMode::Normal));
        let premultiplied = generate(with_blend(BlendMode::Premultiplied));
        assert_ne!(straight.fshader, premultiplied.fshader);
        assert!(straight.fshader.contains("return vec4(color, dAlpha);"));
        assert!(premultiplied.fshader.contains("return vec4(color * dAlpha, dAlpha);"));
        assert!(premultiplied.fshader.contains("dAlpha = get_opacity();"));
    }

    #[test]
    fn test_specular_model_ignored_without_lights() {
        let phong = StandardOptions {
            specular_model: SpecularModel::Phong,
            ..Default::default()
        };
        assert_eq!(key(phong.clone()), key(StandardOptions::default()));

        let lit = |specular_model| StandardOptions {
            specular_model,
            lights: vec![LightKey::new(LightType::Directional)],
            ..Default::default()
        };
        assert_ne!(key(lit(SpecularModel::Phong)), key(lit(SpecularModel::Blinn)));
    }

    #[test]
    fn test_light_fields_change_key() {
        let base = StandardOptions {
            lights: vec![LightKey::new(LightType::Point)],
            ..Default::default()
        };
        let mut falloff = base.clone();
        falloff.lights[0].falloff = Falloff::InverseSquared;
        assert_ne!(key(base.clone()), key(falloff));

        let mut shadow = base.clone();
        shadow.lights[0].casts_shadow = true;
        assert_ne!(key(base.clone()), key(shadow));

        let mut two = base.clone();
        two.lights.push(LightKey::new(LightType::Point));
        assert_ne!(key(base), key(two));
    }

    #[test]
    fn test_light_uniforms_declared() {
        let def = generate(StandardOptions {
            lights: vec![LightKey::new(LightType::Directional), LightKey::new(LightType::Spot)],
            ..Default::default()
        });
        assert_eq!(def.light_count, 2);
        assert!(def.fshader.contains("uniform vec3 light0_direction;"));
        assert!(def.fshader.contains("uniform vec3 light1_position;"));
        assert!(def.fshader.contains("uniform float light1_spotOuterCone;"));
        assert!(def.fshader.contains("getSpotEffect(light1_direction"));
    }

    #[test]
    fn test_main_shadow_light_computed_per_vertex() {
        let def = generate(StandardOptions {
            lights: vec![
                shadow_light(LightType::Point),
                shadow_light(LightType::Spot),
                shadow_light(LightType::Directional),
            ],
            ..Default::default()
        });
        // Sorted: directional (0), point (1), spot (2). Directional is main.
        assert!(def.vshader.contains("uniform mat4 light0_shadowMatrixVS;"));
        assert!(def.vshader.contains("varying vec4 vMainShadowUv;"));
        assert!(def.fshader.contains("getShadowCoordVarying(vMainShadowUv, light0_shadowParams.z);"));
        assert!(!def.vshader.contains("light2_shadowMatrixVS"));
        assert!(def.fshader.contains("getShadowCoordPersp(light2_shadowMatrix, light2_shadowParams);"));
        assert!(def.fshader.contains("getShadowCubePcfFloat(light1_shadowMap, light1_shadowParams)"));
    }

    #[test]
    fn test_point_light_never_main() {
        let lights = [shadow_light(LightType::Point)];
        assert_eq!(main_shadow_light(&lights), None);
        let def = generate(StandardOptions {
            lights: lights.to_vec(),
            ..Default::default()
        });
        assert!(!def.vshader.contains("vMainShadowUv"));
        assert!(def.fshader.contains("uniform samplerCube light0_shadowMap;"));
    }

    #[test]
    fn test_vsm_uses_exponent() {
        let def = generate(StandardOptions {
            lights: vec![LightKey {
                shadow_filter: ShadowFilter::Vsm16,
                shadow_storage: ShadowStorage::Float16,
                ..shadow_light(LightType::Spot)
            }],
            ..Default::default()
        });
        assert!(def.fshader.contains("float chebyshevUpperBound"));
        assert!(def.fshader.contains("getShadowVsmFloat(light0_shadowMap, 5.5400)"));
    }

    #[test]
    fn test_prefiltered_ambient_and_reflection() {
        let def = generate(StandardOptions {
            ambient: AmbientSource::Prefiltered,
            reflection: ReflectionSource::Prefiltered,
            refraction: true,
            ..Default::default()
        });
        assert_eq!(def.fshader.matches("vec3 samplePrefiltered").count(), 1);
        assert!(def.fshader.contains("addReflection();"));
        assert!(def.fshader.contains("addRefraction();"));
    }

    #[test]
    fn test_chunk_override() {
        let mut options = StandardOptions::default();
        options.chunks.insert(
            "fog_none_ps".into(),
            "vec3 addFog(vec3 color) { return color * 0.5; }\n".into(),
        );
        let overridden = key(options.clone());
        assert_ne!(overridden, key(StandardOptions::default()));
        assert!(generate(options).fshader.contains("return color * 0.5;"));
    }

    #[test]
    fn test_map_transform_and_parallax() {
        let def = generate(StandardOptions {
            diffuse_map: Some(MapOptions::texture().with_uv(1).with_transform(true)),
            height_map: Some(MapOptions::texture()),
            ..Default::default()
        });
        assert!(def.fshader.contains("uniform vec4 texture_diffuseMapTransform;"));
        assert!(def.fshader.contains(
            "texture2D(texture_diffuseMap, ((vUv1 * texture_diffuseMapTransform.xy + texture_diffuseMapTransform.zw) + dUvOffset)).rgb"
        ));
        assert!(def.fshader.contains("getParallax();"));
        assert!(def.vshader.contains("vUv1 = getUv1();"));
    }

    #[test]
    fn test_vertex_color_map() {
        let options = StandardOptions {
            blend: BlendMode::Normal,
            opacity_map: Some(MapOptions::vertex_color().with_channel(TextureChannel::A)),
            ..Default::default()
        };
        let def = generate(options);
        assert!(def.vshader.contains("vVertexColor = getVertexColor();"));
        assert!(def.fshader.contains("return vVertexColor.a;"));
    }

    #[test]
    fn test_light_key_pack_distinct() {
        let a = LightKey::new(LightType::Spot);
        let b = LightKey {
            normal_offset: true,
            ..a
        };
        assert_ne!(a.pack(), b.pack());
        assert_ne!(a.pack(), LightKey::new(LightType::Point).pack());
    }
}
