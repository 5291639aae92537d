//! Pure chunk selection.
//!
//! Each feature axis is a closed enum and each choice of chunk is a small
//! function of those enums, so the combinations can be tested exhaustively
//! without generating source.

use crate::device::{BlendMode, DeviceCapabilities};
use crate::scene::{Falloff, LightType, ShadowFilter, ShadowStorage};

use super::chunks::Chunk;

// =============================================================================
// Feature axes
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FogMode {
    #[default]
    None,
    Linear,
    Exp,
    Exp2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GammaMode {
    #[default]
    None,
    Srgb,
    SrgbFast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ToneMapping {
    #[default]
    Linear,
    Filmic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SpecularModel {
    #[default]
    Blinn,
    Phong,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FresnelModel {
    #[default]
    None,
    Schlick,
}

/// Where indirect diffuse light comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AmbientSource {
    #[default]
    Constant,
    /// The six-level prefiltered cubemap chain.
    Prefiltered,
}

/// Where reflections are sampled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReflectionSource {
    #[default]
    None,
    Cubemap,
    SphereMap,
    Prefiltered,
}

/// How the fragment alpha is written for a blend mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AlphaOutput {
    /// Alpha forced to one.
    #[default]
    Opaque,
    /// Color and alpha written as computed.
    Straight,
    /// Color multiplied by alpha before output.
    Premultiplied,
}

impl AlphaOutput {
    pub fn for_blend(blend: BlendMode) -> Self {
        match blend {
            BlendMode::Normal | BlendMode::AdditiveAlpha => Self::Straight,
            BlendMode::Premultiplied => Self::Premultiplied,
            BlendMode::None | BlendMode::Additive | BlendMode::Multiplicative => Self::Opaque,
        }
    }

    /// One blend mode per output class, used when canonicalizing options.
    pub fn representative(self) -> BlendMode {
        match self {
            Self::Opaque => BlendMode::None,
            Self::Straight => BlendMode::Normal,
            Self::Premultiplied => BlendMode::Premultiplied,
        }
    }

    pub fn writes_alpha(self) -> bool {
        self != Self::Opaque
    }
}

/// Where a material map reads its value from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MapSource {
    #[default]
    Texture,
    VertexColor,
}

/// Which texture channels a map reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureChannel {
    R,
    G,
    B,
    A,
    #[default]
    Rgb,
}

impl TextureChannel {
    pub fn swizzle(self) -> &'static str {
        match self {
            Self::R => "r",
            Self::G => "g",
            Self::B => "b",
            Self::A => "a",
            Self::Rgb => "rgb",
        }
    }

    pub fn is_single(self) -> bool {
        !matches!(self, Self::Rgb)
    }
}

/// One material map slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapKind {
    Diffuse,
    Specular,
    Gloss,
    Emissive,
    Opacity,
    Normal,
    Height,
    Ao,
    Light,
}

impl MapKind {
    pub const ALL: [MapKind; 9] = [
        Self::Diffuse,
        Self::Specular,
        Self::Gloss,
        Self::Emissive,
        Self::Opacity,
        Self::Normal,
        Self::Height,
        Self::Ao,
        Self::Light,
    ];

    /// Name used in uniform and function names (`texture_<name>Map`).
    pub fn name(self) -> &'static str {
        match self {
            Self::Diffuse => "diffuse",
            Self::Specular => "specular",
            Self::Gloss => "gloss",
            Self::Emissive => "emissive",
            Self::Opacity => "opacity",
            Self::Normal => "normal",
            Self::Height => "height",
            Self::Ao => "ao",
            Self::Light => "light",
        }
    }

    /// Whether the map produces a colour rather than a scalar.
    pub fn is_color(self) -> bool {
        matches!(
            self,
            Self::Diffuse | Self::Specular | Self::Emissive | Self::Light
        )
    }

    /// Channels read when the material does not say otherwise.
    pub fn default_channel(self) -> TextureChannel {
        match self {
            Self::Opacity => TextureChannel::A,
            Self::Gloss | Self::Height | Self::Ao => TextureChannel::G,
            _ => TextureChannel::Rgb,
        }
    }

    /// Whether a vertex colour can stand in for the texture.
    pub fn supports_vertex_color(self) -> bool {
        !matches!(self, Self::Normal | Self::Height)
    }
}

// =============================================================================
// Selection functions
// =============================================================================

pub fn ambient_chunk(source: AmbientSource) -> Chunk {
    match source {
        AmbientSource::Constant => Chunk::AmbientConstantPs,
        AmbientSource::Prefiltered => Chunk::AmbientPrefilteredPs,
    }
}

pub fn reflection_chunk(source: ReflectionSource) -> Option<Chunk> {
    match source {
        ReflectionSource::None => None,
        ReflectionSource::Cubemap => Some(Chunk::ReflectionCubePs),
        ReflectionSource::SphereMap => Some(Chunk::ReflectionSpherePs),
        ReflectionSource::Prefiltered => Some(Chunk::ReflectionPrefilteredPs),
    }
}

pub fn falloff_chunk(falloff: Falloff) -> (Chunk, &'static str) {
    match falloff {
        Falloff::Linear => (Chunk::FalloffLinearPs, "getFalloffLinear"),
        Falloff::InverseSquared => (Chunk::FalloffInvSquaredPs, "getFalloffInvSquared"),
    }
}

pub fn specular_chunk(model: SpecularModel) -> Chunk {
    match model {
        SpecularModel::Blinn => Chunk::LightSpecularBlinnPs,
        SpecularModel::Phong => Chunk::LightSpecularPhongPs,
    }
}

pub fn fresnel_chunk(model: FresnelModel) -> Option<Chunk> {
    match model {
        FresnelModel::None => None,
        FresnelModel::Schlick => Some(Chunk::FresnelSchlickPs),
    }
}

pub fn combine_chunk(specular: bool, conserve_energy: bool) -> Chunk {
    match (specular, conserve_energy) {
        (false, _) => Chunk::CombineDiffusePs,
        (true, false) => Chunk::CombineDiffuseSpecularPs,
        (true, true) => Chunk::CombineDiffuseSpecularConservePs,
    }
}

pub fn fog_chunk(fog: FogMode) -> Chunk {
    match fog {
        FogMode::None => Chunk::FogNonePs,
        FogMode::Linear => Chunk::FogLinearPs,
        FogMode::Exp => Chunk::FogExpPs,
        FogMode::Exp2 => Chunk::FogExp2Ps,
    }
}

pub fn gamma_chunk(gamma: GammaMode) -> Chunk {
    match gamma {
        GammaMode::None => Chunk::GammaNonePs,
        GammaMode::Srgb => Chunk::GammaSrgbPs,
        GammaMode::SrgbFast => Chunk::GammaSrgbFastPs,
    }
}

pub fn alpha_output_chunk(blend: BlendMode) -> Chunk {
    match AlphaOutput::for_blend(blend) {
        AlphaOutput::Opaque => Chunk::OutputAlphaOpaquePs,
        AlphaOutput::Straight => Chunk::OutputAlphaPs,
        AlphaOutput::Premultiplied => Chunk::OutputAlphaPremulPs,
    }
}

pub fn tonemap_chunk(tone_mapping: ToneMapping) -> Chunk {
    match tone_mapping {
        ToneMapping::Linear => Chunk::TonemapLinearPs,
        ToneMapping::Filmic => Chunk::TonemapFilmicPs,
    }
}

/// Chunk producing one map's value. `None` means the map contributes
/// nothing and no code is emitted for it.
pub fn map_chunk(kind: MapKind, source: Option<MapSource>) -> Option<Chunk> {
    match (kind, source) {
        (MapKind::Normal, Some(MapSource::Texture)) => Some(Chunk::NormalMapPs),
        (MapKind::Normal, _) => Some(Chunk::NormalVertexPs),
        (MapKind::Height, Some(MapSource::Texture)) => Some(Chunk::ParallaxPs),
        (MapKind::Height, _) => None,
        (kind, Some(MapSource::Texture)) if kind.is_color() => Some(Chunk::MapTexColorPs),
        (_, Some(MapSource::Texture)) => Some(Chunk::MapTexFloatPs),
        (kind, Some(MapSource::VertexColor)) if kind.is_color() => Some(Chunk::MapVertColorPs),
        (_, Some(MapSource::VertexColor)) => Some(Chunk::MapVertFloatPs),
        (MapKind::Diffuse, None) => Some(Chunk::DiffuseConstPs),
        (MapKind::Specular, None) => Some(Chunk::SpecularConstPs),
        (MapKind::Gloss, None) => Some(Chunk::GlossConstPs),
        (MapKind::Emissive, None) => Some(Chunk::EmissiveConstPs),
        (MapKind::Opacity, None) => Some(Chunk::OpacityConstPs),
        (MapKind::Ao | MapKind::Light, None) => None,
    }
}

/// Chunk that positions `dShadowCoord` (or, for point lights, offsets the
/// light vector) before the shadow read.
pub fn shadow_coord_chunk(light_type: LightType, normal_offset: bool) -> Option<(Chunk, &'static str)> {
    match (light_type, normal_offset) {
        (LightType::Directional, false) => Some((Chunk::ShadowCoordOrthoPs, "getShadowCoordOrtho")),
        (LightType::Directional, true) => Some((
            Chunk::ShadowCoordOrthoNormalOffsetPs,
            "getShadowCoordOrthoNormalOffset",
        )),
        (LightType::Spot, false) => Some((Chunk::ShadowCoordPerspPs, "getShadowCoordPersp")),
        (LightType::Spot, true) => Some((
            Chunk::ShadowCoordPerspNormalOffsetPs,
            "getShadowCoordPerspNormalOffset",
        )),
        (LightType::Point, true) => Some((Chunk::NormalOffsetPointPs, "normalOffsetPointShadow")),
        (LightType::Point, false) => None,
    }
}

/// How a shadow read function is called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowReadArgument {
    /// Shadow map resolution, `shadowParams.x`.
    Resolution,
    /// The EVSM warp exponent.
    Exponent,
    /// The whole `vec4` shadow params (point lights).
    Params,
}

/// The shadow-test chunk for `(storage, filter, light type)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShadowRead {
    pub chunk: Chunk,
    pub function: &'static str,
    pub argument: ShadowReadArgument,
}

/// Select the shadow-test chunk.
///
/// Point lights sample a cubemap and support hard and 3x3 PCF filtering
/// only; VSM on a point light reads as hard.
pub fn shadow_read(storage: ShadowStorage, filter: ShadowFilter, light_type: LightType) -> ShadowRead {
    use ShadowReadArgument::*;
    let packed = storage == ShadowStorage::PackedRgba8;
    let (chunk, function, argument) = match light_type {
        LightType::Point => match (filter, packed) {
            (ShadowFilter::Pcf3x3, true) => (Chunk::ShadowCubePcfPs, "getShadowCubePcfPacked", Params),
            (ShadowFilter::Pcf3x3, false) => {
                (Chunk::ShadowCubePcfFloatPs, "getShadowCubePcfFloat", Params)
            }
            (_, true) => (Chunk::ShadowCubeHardPs, "getShadowCubeHardPacked", Params),
            (_, false) => (Chunk::ShadowCubeHardFloatPs, "getShadowCubeHardFloat", Params),
        },
        LightType::Directional | LightType::Spot => match (filter, packed) {
            (ShadowFilter::Hard, true) => (Chunk::ShadowHardPs, "getShadowHardPacked", Resolution),
            (ShadowFilter::Hard, false) => {
                (Chunk::ShadowHardFloatPs, "getShadowHardFloat", Resolution)
            }
            (ShadowFilter::Pcf3x3, true) => (Chunk::ShadowPcf3Ps, "getShadowPcf3Packed", Resolution),
            (ShadowFilter::Pcf3x3, false) => {
                (Chunk::ShadowPcf3FloatPs, "getShadowPcf3Float", Resolution)
            }
            (_, true) => (Chunk::ShadowVsmPackedPs, "getShadowVsmPacked", Exponent),
            (_, false) => (Chunk::ShadowVsmFloatPs, "getShadowVsmFloat", Exponent),
        },
    };
    ShadowRead {
        chunk,
        function,
        argument,
    }
}

/// Fragment chunk writing depth in the depth generator.
pub fn depth_chunk(storage: ShadowStorage, filter: ShadowFilter, point: bool) -> Chunk {
    let packed = storage == ShadowStorage::PackedRgba8;
    match (point, filter.is_vsm(), packed) {
        (true, _, true) => Chunk::DepthPointPackedPs,
        (true, _, false) => Chunk::DepthPointFloatPs,
        (false, true, true) => Chunk::DepthVsmPackedPs,
        (false, true, false) => Chunk::DepthVsmFloatPs,
        (false, false, true) => Chunk::DepthPackedPs,
        (false, false, false) => Chunk::DepthFloatPs,
    }
}

/// EVSM warp exponent for float VSM storage. Zero for packed storage,
/// which stores plain moments.
pub fn evsm_exponent(storage: ShadowStorage) -> f32 {
    match storage {
        ShadowStorage::PackedRgba8 => 0.0,
        ShadowStorage::Float16 => 5.54,
        ShadowStorage::Float32 => 15.0,
    }
}

/// Pick the storage a shadow map can actually use on this device.
///
/// VSM filters are demoted `Vsm32 -> Vsm16 -> Vsm8` until the device can
/// render to the texel format they need. Hard and PCF shadows use float
/// depth when available and packed RGBA8 otherwise.
pub fn resolve_shadow_format(
    filter: ShadowFilter,
    capabilities: &DeviceCapabilities,
) -> (ShadowFilter, ShadowStorage) {
    match filter {
        ShadowFilter::Hard | ShadowFilter::Pcf3x3 => {
            if capabilities.float_textures {
                (filter, ShadowStorage::Float32)
            } else {
                (filter, ShadowStorage::PackedRgba8)
            }
        }
        ShadowFilter::Vsm32 if capabilities.float_textures => {
            (ShadowFilter::Vsm32, ShadowStorage::Float32)
        }
        ShadowFilter::Vsm32 | ShadowFilter::Vsm16 if capabilities.half_float_textures => {
            (ShadowFilter::Vsm16, ShadowStorage::Float16)
        }
        ShadowFilter::Vsm32 | ShadowFilter::Vsm16 | ShadowFilter::Vsm8 => {
            (ShadowFilter::Vsm8, ShadowStorage::PackedRgba8)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STORAGES: [ShadowStorage; 3] = [
        ShadowStorage::PackedRgba8,
        ShadowStorage::Float16,
        ShadowStorage::Float32,
    ];
    const FILTERS: [ShadowFilter; 5] = [
        ShadowFilter::Hard,
        ShadowFilter::Pcf3x3,
        ShadowFilter::Vsm8,
        ShadowFilter::Vsm16,
        ShadowFilter::Vsm32,
    ];

    #[test]
    fn test_point_lights_always_read_cubemaps() {
        for storage in STORAGES {
            for filter in FILTERS {
                let read = shadow_read(storage, filter, LightType::Point);
                assert!(read.function.starts_with("getShadowCube"), "{read:?}");
                assert_eq!(read.argument, ShadowReadArgument::Params);
            }
        }
    }

    #[test]
    fn test_vsm_on_point_falls_back_to_hard() {
        let read = shadow_read(ShadowStorage::Float16, ShadowFilter::Vsm16, LightType::Point);
        assert_eq!(read.chunk, Chunk::ShadowCubeHardFloatPs);
    }

    #[test]
    fn test_directional_and_spot_share_2d_reads() {
        for storage in STORAGES {
            for filter in FILTERS {
                let dir = shadow_read(storage, filter, LightType::Directional);
                let spot = shadow_read(storage, filter, LightType::Spot);
                assert_eq!(dir, spot);
                assert!(!dir.function.starts_with("getShadowCube"));
            }
        }
    }

    #[test]
    fn test_shadow_coord_selection() {
        assert_eq!(
            shadow_coord_chunk(LightType::Directional, false).map(|c| c.0),
            Some(Chunk::ShadowCoordOrthoPs)
        );
        assert_eq!(
            shadow_coord_chunk(LightType::Spot, true).map(|c| c.0),
            Some(Chunk::ShadowCoordPerspNormalOffsetPs)
        );
        assert!(shadow_coord_chunk(LightType::Point, false).is_none());
    }

    #[test]
    fn test_vsm_demotion() {
        let mut caps = DeviceCapabilities::full();
        assert_eq!(
            resolve_shadow_format(ShadowFilter::Vsm32, &caps),
            (ShadowFilter::Vsm32, ShadowStorage::Float32)
        );
        caps.float_textures = false;
        assert_eq!(
            resolve_shadow_format(ShadowFilter::Vsm32, &caps),
            (ShadowFilter::Vsm16, ShadowStorage::Float16)
        );
        caps.half_float_textures = false;
        assert_eq!(
            resolve_shadow_format(ShadowFilter::Vsm32, &caps),
            (ShadowFilter::Vsm8, ShadowStorage::PackedRgba8)
        );
        assert_eq!(
            resolve_shadow_format(ShadowFilter::Pcf3x3, &caps),
            (ShadowFilter::Pcf3x3, ShadowStorage::PackedRgba8)
        );
    }

    #[test]
    fn test_alpha_output_chunks() {
        assert_eq!(alpha_output_chunk(BlendMode::None), Chunk::OutputAlphaOpaquePs);
        assert_eq!(alpha_output_chunk(BlendMode::Additive), Chunk::OutputAlphaOpaquePs);
        assert_eq!(alpha_output_chunk(BlendMode::Multiplicative), Chunk::OutputAlphaOpaquePs);
        assert_eq!(alpha_output_chunk(BlendMode::Normal), Chunk::OutputAlphaPs);
        assert_eq!(alpha_output_chunk(BlendMode::AdditiveAlpha), Chunk::OutputAlphaPs);
        assert_eq!(alpha_output_chunk(BlendMode::Premultiplied), Chunk::OutputAlphaPremulPs);

        for blend in [
            BlendMode::None,
            BlendMode::Normal,
            BlendMode::Additive,
            BlendMode::Premultiplied,
            BlendMode::Multiplicative,
            BlendMode::AdditiveAlpha,
        ] {
            let class = AlphaOutput::for_blend(blend);
            assert_eq!(AlphaOutput::for_blend(class.representative()), class);
        }
    }

    #[test]
    fn test_map_chunks() {
        assert_eq!(map_chunk(MapKind::Diffuse, None), Some(Chunk::DiffuseConstPs));
        assert_eq!(
            map_chunk(MapKind::Diffuse, Some(MapSource::Texture)),
            Some(Chunk::MapTexColorPs)
        );
        assert_eq!(
            map_chunk(MapKind::Opacity, Some(MapSource::VertexColor)),
            Some(Chunk::MapVertFloatPs)
        );
        assert_eq!(map_chunk(MapKind::Normal, None), Some(Chunk::NormalVertexPs));
        assert_eq!(map_chunk(MapKind::Ao, None), None);
        assert_eq!(map_chunk(MapKind::Height, None), None);
    }

    #[test]
    fn test_depth_chunk() {
        assert_eq!(
            depth_chunk(ShadowStorage::PackedRgba8, ShadowFilter::Hard, false),
            Chunk::DepthPackedPs
        );
        assert_eq!(
            depth_chunk(ShadowStorage::Float16, ShadowFilter::Vsm16, false),
            Chunk::DepthVsmFloatPs
        );
        assert_eq!(
            depth_chunk(ShadowStorage::Float32, ShadowFilter::Vsm32, true),
            Chunk::DepthPointFloatPs
        );
    }
}
