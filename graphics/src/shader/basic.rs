//! Unlit programs for draw commands and debug geometry.

use crate::device::DeviceCapabilities;
use crate::error::GraphicsError;

use super::chunks::{Chunk, ChunkTable, SourceBuilder};
use super::library::{ProgramOptions, ShaderGenerator};
use super::program::ShaderDefinition;
use super::standard::{MapOptions, declare_varyings, emit_map, emit_vertex_transform};
use super::variant::{self, FogMode, MapKind, MapSource};

/// Options of the `"basic"` generator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BasicOptions {
    pub vertex_colors: bool,
    pub diffuse_map: Option<MapOptions>,
    pub alpha_test: bool,
    pub skin: bool,
    pub instancing: bool,
    pub fog: FogMode,
}

impl BasicOptions {
    /// Copy with fields that do not change the source reset. A vertex
    /// colour diffuse map is the same program as plain vertex colours.
    pub fn canonical(&self) -> Self {
        let mut options = self.clone();
        if options.skin {
            options.instancing = false;
        }
        let diffuse = options
            .diffuse_map
            .and_then(|m| m.canonical(MapKind::Diffuse));
        options.diffuse_map = match diffuse {
            Some(map) if map.source == MapSource::VertexColor => {
                options.vertex_colors = true;
                None
            }
            Some(map) => Some(MapOptions { uv: 0, ..map }),
            None => None,
        };
        options
    }
}

/// Generator registered as `"basic"`.
#[derive(Debug, Default, Clone, Copy)]
pub struct BasicGenerator;

impl ShaderGenerator for BasicGenerator {
    fn name(&self) -> &'static str {
        "basic"
    }

    fn create_definition(
        &self,
        capabilities: &DeviceCapabilities,
        options: &ProgramOptions,
    ) -> Result<ShaderDefinition, GraphicsError> {
        let ProgramOptions::Basic(options) = options else {
            return Err(GraphicsError::InvalidParameter(
                "basic generator needs basic options".into(),
            ));
        };
        let options = options.canonical();
        let overrides = Default::default();
        let table = ChunkTable::new(&overrides);
        let diffuse = options.diffuse_map;

        let mut varyings = vec![("vec3", "vPositionW")];
        if diffuse.is_some() {
            varyings.push(("vec2", "vUv0"));
        }
        if options.vertex_colors {
            varyings.push(("vec4", "vVertexColor"));
        }

        let mut vs = SourceBuilder::new(table);
        declare_varyings(&mut vs, &varyings);
        emit_vertex_transform(&mut vs, options.skin, options.instancing);
        if diffuse.is_some() {
            vs.chunk(Chunk::Uv0Vs);
        }
        if options.vertex_colors {
            vs.chunk(Chunk::ColorVs);
        }
        vs.line("void main() {");
        vs.line("    gl_Position = getPosition(getModelMatrix());");
        if diffuse.is_some() {
            vs.line("    vUv0 = getUv0();");
        }
        if options.vertex_colors {
            vs.line("    vVertexColor = getVertexColor();");
        }
        vs.line("}");

        let mut fs = SourceBuilder::new(table);
        fs.line(format!("precision {} float;", capabilities.precision.keyword()));
        fs.line("");
        declare_varyings(&mut fs, &varyings);
        fs.chunk(Chunk::BasicPs);
        if diffuse.is_some() {
            emit_map(&mut fs, MapKind::Diffuse, diffuse.as_ref(), false);
        }
        if options.alpha_test {
            fs.chunk(Chunk::AlphaTestPs);
        }
        fs.chunk(variant::fog_chunk(options.fog));
        fs.line("void main() {");
        fs.line("    vec4 color = getBasicColor();");
        if diffuse.is_some() {
            fs.line("    color.rgb *= get_diffuse();");
        }
        if options.vertex_colors {
            fs.line("    color *= vVertexColor;");
        }
        if options.alpha_test {
            fs.line("    alphaTest(color.a);");
        }
        fs.line("    color.rgb = addFog(color.rgb);");
        fs.line("    gl_FragColor = color;");
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

    #[test]
    fn test_basic_color() {
        let def = BasicGenerator
            .create_definition(&DeviceCapabilities::full(), &BasicOptions::default().into())
            .unwrap();
        assert!(def.fshader.contains("uniform vec4 uColor;"));
        assert!(!def.vshader.contains("gl_FragColor"));
        assert!(!def.fshader.contains("texture2D"));
    }

    #[test]
    fn test_textured_vertex_colored() {
        let options = BasicOptions {
            vertex_colors: true,
            diffuse_map: Some(MapOptions::texture().with_uv(1)),
            fog: FogMode::Linear,
            ..Default::default()
        };
        let def = BasicGenerator
            .create_definition(&DeviceCapabilities::minimal(), &options.into())
            .unwrap();
        assert!(def.fshader.starts_with("precision mediump float;"));
        assert!(def.fshader.contains("texture2D(texture_diffuseMap, vUv0).rgb"));
        assert!(def.fshader.contains("color *= vVertexColor;"));
        assert!(def.fshader.contains("uniform float fog_end;"));
        assert!(def.vshader.contains("attribute vec4 vertex_color;"));
    }

    #[test]
    fn test_vertex_color_map_is_vertex_colors() {
        let map = BasicOptions {
            diffuse_map: Some(MapOptions::vertex_color()),
            ..Default::default()
        };
        let colors = BasicOptions {
            vertex_colors: true,
            ..Default::default()
        };
        assert_eq!(map.canonical(), colors);
    }
}
