//! Depth-only programs used to render shadow maps.

use crate::device::DeviceCapabilities;
use crate::error::GraphicsError;
use crate::scene::{ShadowFilter, ShadowStorage};

use super::chunks::{Chunk, ChunkTable, SourceBuilder};
use super::library::{ProgramOptions, ShaderGenerator};
use super::program::ShaderDefinition;
use super::standard::{MapOptions, declare_varyings, emit_map, emit_vertex_transform};
use super::variant::{self, MapKind, MapSource};

/// Options of the `"depth"` generator.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthOptions {
    pub storage: ShadowStorage,
    pub filter: ShadowFilter,
    /// Write distance to the light instead of window depth (point lights).
    pub point: bool,
    pub skin: bool,
    pub instancing: bool,
    pub opacity_map: Option<MapOptions>,
    pub alpha_test: bool,
}

impl Default for DepthOptions {
    fn default() -> Self {
        Self {
            storage: ShadowStorage::PackedRgba8,
            filter: ShadowFilter::Hard,
            point: false,
            skin: false,
            instancing: false,
            opacity_map: None,
            alpha_test: false,
        }
    }
}

impl DepthOptions {
    /// Copy with fields that do not change the source reset.
    pub fn canonical(&self) -> Self {
        let mut options = self.clone();
        if options.skin {
            options.instancing = false;
        }
        if options.point || !options.filter.is_vsm() {
            options.filter = ShadowFilter::Hard;
        }
        if options.storage == ShadowStorage::PackedRgba8 && options.filter.is_vsm() {
            // Packed moments carry no exponent.
            options.filter = ShadowFilter::Vsm8;
        }
        if !options.alpha_test {
            options.opacity_map = None;
        }
        options.opacity_map = options
            .opacity_map
            .and_then(|m| m.canonical(MapKind::Opacity));
        options
    }
}

/// Generator registered as `"depth"`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DepthGenerator;

impl ShaderGenerator for DepthGenerator {
    fn name(&self) -> &'static str {
        "depth"
    }

    fn create_definition(
        &self,
        capabilities: &DeviceCapabilities,
        options: &ProgramOptions,
    ) -> Result<ShaderDefinition, GraphicsError> {
        let ProgramOptions::Depth(options) = options else {
            return Err(GraphicsError::InvalidParameter(
                "depth generator needs depth options".into(),
            ));
        };
        let options = options.canonical();
        let overrides = Default::default();
        let table = ChunkTable::new(&overrides);

        let opacity = options.opacity_map.as_ref();
        let mut varyings = vec![("vec3", "vPositionW")];
        match opacity.map(|m| (m.source, m.uv)) {
            Some((MapSource::Texture, 0)) => varyings.push(("vec2", "vUv0")),
            Some((MapSource::Texture, _)) => varyings.push(("vec2", "vUv1")),
            Some((MapSource::VertexColor, _)) => varyings.push(("vec4", "vVertexColor")),
            None => {}
        }

        let mut vs = SourceBuilder::new(table);
        declare_varyings(&mut vs, &varyings);
        emit_vertex_transform(&mut vs, options.skin, options.instancing);
        let uv_chunk = match opacity.map(|m| (m.source, m.uv)) {
            Some((MapSource::Texture, 0)) => Some((Chunk::Uv0Vs, "    vUv0 = getUv0();")),
            Some((MapSource::Texture, _)) => Some((Chunk::Uv1Vs, "    vUv1 = getUv1();")),
            Some((MapSource::VertexColor, _)) => {
                Some((Chunk::ColorVs, "    vVertexColor = getVertexColor();"))
            }
            None => None,
        };
        if let Some((chunk, _)) = uv_chunk {
            vs.chunk(chunk);
        }
        vs.line("void main() {");
        vs.line("    gl_Position = getPosition(getModelMatrix());");
        if let Some((_, assign)) = uv_chunk {
            vs.line(assign);
        }
        vs.line("}");

        let mut fs = SourceBuilder::new(table);
        fs.line(format!("precision {} float;", capabilities.precision.keyword()));
        fs.line("");
        declare_varyings(&mut fs, &varyings);
        if options.storage == ShadowStorage::PackedRgba8 {
            fs.chunk(Chunk::PackDepthPs);
        }
        if options.alpha_test {
            emit_map(&mut fs, MapKind::Opacity, opacity, false);
            fs.chunk(Chunk::AlphaTestPs);
        }
        let exponent = format!("{:.4}", variant::evsm_exponent(options.storage));
        fs.chunk_with(
            variant::depth_chunk(options.storage, options.filter, options.point),
            &[("$EXPONENT", &exponent)],
        );
        fs.line("void main() {");
        if options.alpha_test {
            fs.line("    alphaTest(get_opacity());");
        }
        fs.line("    gl_FragColor = encodeDepth();");
        fs.line("}");

        Ok(ShaderDefinition {
            generator: self.name().to_owned(),
            vshader: vs.finish(),
            fshader: fs.finish(),
            light_count: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generate(options: DepthOptions) -> ShaderDefinition {
        DepthGenerator
            .create_definition(&DeviceCapabilities::full(), &options.into())
            .unwrap()
    }

    #[test]
    fn test_packed_depth() {
        let def = generate(DepthOptions::default());
        assert!(def.fshader.contains("vec4 packFloat"));
        assert!(def.fshader.contains("return packFloat(gl_FragCoord.z);"));
        assert!(def.vshader.contains("uniform mat4 matrix_model;"));
    }

    #[test]
    fn test_point_distance() {
        let def = generate(DepthOptions {
            storage: ShadowStorage::Float32,
            point: true,
            ..Default::default()
        });
        assert!(def.fshader.contains("uniform float light_radius;"));
        assert!(!def.fshader.contains("packFloat"));
    }

    #[test]
    fn test_vsm_exponent_substituted() {
        let def = generate(DepthOptions {
            storage: ShadowStorage::Float32,
            filter: ShadowFilter::Vsm32,
            ..Default::default()
        });
        assert!(def.fshader.contains("exp(15.0000 * gl_FragCoord.z)"));
    }

    #[test]
    fn test_hard_and_pcf_share_key() {
        let hard = DepthOptions::default();
        let pcf = DepthOptions {
            filter: ShadowFilter::Pcf3x3,
            ..Default::default()
        };
        assert_eq!(DepthGenerator.key(&hard.into()), DepthGenerator.key(&pcf.into()));
    }

    #[test]
    fn test_alpha_tested_shadow_caster() {
        let def = generate(DepthOptions {
            alpha_test: true,
            opacity_map: Some(MapOptions::texture()),
            skin: true,
            instancing: true,
            ..Default::default()
        });
        assert!(def.fshader.contains("texture2D(texture_opacityMap, vUv0).a"));
        assert!(def.fshader.contains("alphaTest(get_opacity());"));
        assert!(def.vshader.contains("uniform mat4 matrix_pose[64];"));
        assert!(!def.vshader.contains("instance_line1"));
    }
}
