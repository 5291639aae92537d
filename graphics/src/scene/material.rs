//! The physically lit material and its per-device variant cache.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use glam::{Vec2, Vec3, Vec4};
use parking_lot::RwLock;

use crate::device::{BlendMode, CullMode, GraphicsDevice, Texture};
use crate::scope::ScopeSpace;
use crate::shader::{
    AmbientSource, DepthOptions, FresnelModel, LightKey, MapKind, MapOptions, MapSource,
    ProgramOptions, ReflectionSource, Shader, ShaderKey, SpecularModel, StandardOptions,
    TextureChannel,
};

use super::light::{ShadowFilter, ShadowStorage};
use super::world::SceneShaderSettings;

static NEXT_MATERIAL_ID: AtomicU32 = AtomicU32::new(1);

// =============================================================================
// Properties
// =============================================================================

/// One map slot of a material.
#[derive(Debug, Clone)]
pub struct MaterialMap {
    /// Sampled texture. Ignored for vertex colour maps.
    pub texture: Option<Texture>,
    pub options: MapOptions,
    pub tiling: Vec2,
    pub offset: Vec2,
}

impl MaterialMap {
    pub fn texture(texture: Texture) -> Self {
        Self {
            texture: Some(texture),
            options: MapOptions::texture(),
            tiling: Vec2::ONE,
            offset: Vec2::ZERO,
        }
    }

    pub fn vertex_color() -> Self {
        Self {
            texture: None,
            options: MapOptions::vertex_color(),
            tiling: Vec2::ONE,
            offset: Vec2::ZERO,
        }
    }

    pub fn with_channel(mut self, channel: TextureChannel) -> Self {
        self.options.channel = channel;
        self
    }

    pub fn with_uv(mut self, uv: u8) -> Self {
        self.options.uv = uv;
        self
    }

    /// Scale and offset the UVs. Enables the transform uniform.
    pub fn with_transform(mut self, tiling: Vec2, offset: Vec2) -> Self {
        self.tiling = tiling;
        self.offset = offset;
        self.options.transform = true;
        self
    }

    /// The map as the shader sees it, or `None` if it has nothing to read.
    fn shader_options(&self) -> Option<MapOptions> {
        match self.options.source {
            MapSource::Texture if self.texture.is_none() => None,
            _ => Some(self.options),
        }
    }
}

/// Authorable state of a [`StandardMaterial`].
#[derive(Debug, Clone)]
pub struct MaterialProperties {
    pub diffuse: Vec3,
    pub specular: Vec3,
    /// Glossiness from 0 to 100.
    pub shininess: f32,
    pub emissive: Vec3,
    pub opacity: f32,
    /// Fragments with alpha below this are discarded. Zero disables the test.
    pub alpha_test: f32,
    pub bumpiness: f32,
    pub height_map_factor: f32,
    pub reflectivity: f32,
    pub refraction: f32,
    pub refraction_index: f32,

    pub maps: HashMap<MapKind, MaterialMap>,
    pub vertex_colors: bool,
    pub cube_map: Option<Texture>,
    pub sphere_map: Option<Texture>,
    /// Reflect the scene's prefiltered environment when no map is set.
    pub use_environment_reflection: bool,

    pub use_specular: bool,
    pub specular_model: SpecularModel,
    pub fresnel_model: FresnelModel,
    pub conserve_energy: bool,
    pub two_sided_lighting: bool,

    pub blend: BlendMode,
    pub cull: CullMode,
    pub depth_test: bool,
    pub depth_write: bool,

    /// Chunk source overrides keyed by chunk name.
    pub chunks: BTreeMap<String, String>,
}

impl Default for MaterialProperties {
    fn default() -> Self {
        Self {
            diffuse: Vec3::splat(0.7),
            specular: Vec3::ZERO,
            shininess: 25.0,
            emissive: Vec3::ZERO,
            opacity: 1.0,
            alpha_test: 0.0,
            bumpiness: 1.0,
            height_map_factor: 1.0,
            reflectivity: 1.0,
            refraction: 0.0,
            refraction_index: 1.0 / 1.5,
            maps: HashMap::new(),
            vertex_colors: false,
            cube_map: None,
            sphere_map: None,
            use_environment_reflection: false,
            use_specular: true,
            specular_model: SpecularModel::Blinn,
            fresnel_model: FresnelModel::None,
            conserve_energy: false,
            two_sided_lighting: false,
            blend: BlendMode::None,
            cull: CullMode::Back,
            depth_test: true,
            depth_write: true,
            chunks: BTreeMap::new(),
        }
    }
}

impl MaterialProperties {
    pub fn with_diffuse(mut self, diffuse: Vec3) -> Self {
        self.diffuse = diffuse;
        self
    }

    pub fn with_map(mut self, kind: MapKind, map: MaterialMap) -> Self {
        self.maps.insert(kind, map);
        self
    }

    pub fn with_blend(mut self, blend: BlendMode) -> Self {
        self.blend = blend;
        self
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }

    fn reflection_source(&self, settings: &SceneShaderSettings) -> ReflectionSource {
        if self.cube_map.is_some() {
            ReflectionSource::Cubemap
        } else if self.sphere_map.is_some() {
            ReflectionSource::SphereMap
        } else if self.use_environment_reflection && settings.prefiltered {
            ReflectionSource::Prefiltered
        } else {
            ReflectionSource::None
        }
    }
}

/// Pipeline state a material applies when it becomes current.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaterialRenderState {
    pub blend: BlendMode,
    pub cull: CullMode,
    pub depth_test: bool,
    pub depth_write: bool,
}

// =============================================================================
// Variant cache
// =============================================================================

/// Which program a material is drawn with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderPass {
    Forward,
    Shadow {
        storage: ShadowStorage,
        filter: ShadowFilter,
        point: bool,
    },
}

/// Everything outside the material that selects one of its programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VariantKey {
    pub pass: ShaderPass,
    /// Hash of the scene settings and light keys of the frame.
    pub environment: ShaderKey,
    pub skin: bool,
    pub instancing: bool,
}

struct MaterialState {
    properties: MaterialProperties,
    variants: HashMap<VariantKey, Option<Arc<Shader>>>,
    /// `(device id, device generation)` the variants were resolved on.
    stamp: Option<(u32, u32)>,
}

struct MaterialInner {
    id: u32,
    name: String,
    state: RwLock<MaterialState>,
}

/// Shared handle to a physically lit material.
///
/// Clones refer to the same material. Programs are resolved lazily on first
/// draw and kept until [`StandardMaterial::update`] is called or the device
/// loses its context.
#[derive(Clone)]
pub struct StandardMaterial {
    inner: Arc<MaterialInner>,
}

impl StandardMaterial {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_properties(name, MaterialProperties::default())
    }

    pub fn with_properties(name: impl Into<String>, properties: MaterialProperties) -> Self {
        Self {
            inner: Arc::new(MaterialInner {
                id: NEXT_MATERIAL_ID.fetch_add(1, Ordering::Relaxed),
                name: name.into(),
                state: RwLock::new(MaterialState {
                    properties,
                    variants: HashMap::new(),
                    stamp: None,
                }),
            }),
        }
    }

    /// Process-unique material id.
    pub fn id(&self) -> u32 {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn ptr_eq(&self, other: &StandardMaterial) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Read the current properties.
    pub fn read<R>(&self, f: impl FnOnce(&MaterialProperties) -> R) -> R {
        f(&self.inner.state.read().properties)
    }

    pub fn properties(&self) -> MaterialProperties {
        self.read(Clone::clone)
    }

    /// Modify the properties. Every resolved program is dropped and picked
    /// again on the next draw.
    pub fn update(&self, f: impl FnOnce(&mut MaterialProperties)) {
        let mut state = self.inner.state.write();
        f(&mut state.properties);
        state.variants.clear();
        log::trace!("Material '{}' updated", self.inner.name);
    }

    pub fn render_state(&self) -> MaterialRenderState {
        self.read(|p| MaterialRenderState {
            blend: p.blend,
            cull: p.cull,
            depth_test: p.depth_test,
            depth_write: p.depth_write,
        })
    }

    pub fn blend(&self) -> BlendMode {
        self.read(|p| p.blend)
    }

    /// Number of programs currently resolved, including failed ones.
    pub fn variant_count(&self) -> usize {
        self.inner.state.read().variants.len()
    }

    /// Options of the lit program for a frame.
    pub fn forward_options(
        &self,
        settings: &SceneShaderSettings,
        lights: &[LightKey],
        skin: bool,
        instancing: bool,
    ) -> StandardOptions {
        self.read(|p| {
            let mut options = StandardOptions {
                fog: settings.fog,
                gamma: settings.gamma,
                tone_map: settings.tone_map,
                skin,
                instancing,
                vertex_colors: p.vertex_colors,
                use_specular: p.use_specular,
                specular_model: p.specular_model,
                fresnel_model: p.fresnel_model,
                conserve_energy: p.conserve_energy,
                alpha_test: p.alpha_test > 0.0,
                blend: p.blend,
                two_sided_lighting: p.two_sided_lighting,
                ambient: if settings.prefiltered {
                    AmbientSource::Prefiltered
                } else {
                    AmbientSource::Constant
                },
                reflection: p.reflection_source(settings),
                refraction: p.refraction > 0.0,
                lights: lights.to_vec(),
                chunks: p.chunks.clone(),
                ..Default::default()
            };
            for (kind, map) in &p.maps {
                *options.map_mut(*kind) = map.shader_options();
            }
            options
        })
    }

    /// Options of the shadow caster program.
    pub fn depth_options(
        &self,
        storage: ShadowStorage,
        filter: ShadowFilter,
        point: bool,
        skin: bool,
        instancing: bool,
    ) -> DepthOptions {
        self.read(|p| DepthOptions {
            storage,
            filter,
            point,
            skin,
            instancing,
            opacity_map: p
                .maps
                .get(&MapKind::Opacity)
                .and_then(MaterialMap::shader_options),
            alpha_test: p.alpha_test > 0.0,
        })
    }

    /// Program for `key`, generated with `options` the first time the key
    /// is seen on this device.
    pub fn resolve_shader(
        &self,
        device: &mut GraphicsDevice,
        key: VariantKey,
        options: impl FnOnce(&Self) -> (&'static str, ProgramOptions),
    ) -> Option<Arc<Shader>> {
        let stamp = (device.id(), device.generation());
        {
            let mut state = self.inner.state.write();
            if state.stamp != Some(stamp) {
                state.variants.clear();
                state.stamp = Some(stamp);
            }
            if let Some(shader) = state.variants.get(&key) {
                return shader.clone();
            }
        }
        let (generator, options) = options(self);
        let shader = device.get_program(generator, &options);
        if shader.is_none() {
            log::warn!("Material '{}' has no program for {:?}", self.inner.name, key.pass);
        }
        self.inner
            .state
            .write()
            .variants
            .insert(key, shader.clone());
        shader
    }

    /// Publish the material's uniforms and textures into `scope`.
    pub fn bind_parameters(&self, scope: &ScopeSpace, gamma: bool) {
        let linear = |c: Vec3| if gamma { c.powf(2.2) } else { c };
        self.read(|p| {
            scope.resolve("material_diffuse").set(linear(p.diffuse));
            scope.resolve("material_specular").set(linear(p.specular));
            scope.resolve("material_shininess").set(p.shininess * 0.01);
            scope.resolve("material_emissive").set(linear(p.emissive));
            scope.resolve("material_opacity").set(p.opacity);
            scope.resolve("material_bumpiness").set(p.bumpiness);
            scope
                .resolve("material_heightMapFactor")
                .set(p.height_map_factor * 0.025);
            scope.resolve("material_reflectivity").set(p.reflectivity);
            scope.resolve("material_refraction").set(p.refraction);
            scope
                .resolve("material_refractionIndex")
                .set(p.refraction_index);
            scope.resolve("alpha_ref").set(p.alpha_test);

            for (kind, map) in &p.maps {
                let name = kind.name();
                if let Some(texture) = &map.texture {
                    scope
                        .resolve(&format!("texture_{name}Map"))
                        .set(texture.clone());
                }
                if map.options.transform {
                    scope
                        .resolve(&format!("texture_{name}MapTransform"))
                        .set(Vec4::new(map.tiling.x, map.tiling.y, map.offset.x, map.offset.y));
                }
            }
            if let Some(cube_map) = &p.cube_map {
                scope.resolve("texture_cubeMap").set(cube_map.clone());
            }
            if let Some(sphere_map) = &p.sphere_map {
                scope.resolve("texture_sphereMap").set(sphere_map.clone());
            }
        });
    }
}

impl std::fmt::Debug for StandardMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StandardMaterial")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("variants", &self.variant_count())
            .finish()
    }
}

static_assertions::assert_impl_all!(StandardMaterial: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceConfig, DummyContext, PixelFormat, TextureDescriptor};
    use crate::scene::LightType;

    fn device() -> GraphicsDevice {
        GraphicsDevice::new(Box::new(DummyContext::new()), DeviceConfig::default()).unwrap()
    }

    fn forward_key() -> VariantKey {
        VariantKey {
            pass: ShaderPass::Forward,
            environment: ShaderKey(7),
            skin: false,
            instancing: false,
        }
    }

    fn resolve(material: &StandardMaterial, device: &mut GraphicsDevice) -> Option<Arc<Shader>> {
        let settings = SceneShaderSettings::default();
        let lights = [LightKey::new(LightType::Directional)];
        material.resolve_shader(device, forward_key(), |m| {
            ("standard", m.forward_options(&settings, &lights, false, false).into())
        })
    }

    #[test]
    fn test_ids_are_unique() {
        let a = StandardMaterial::new("a");
        let b = StandardMaterial::new("b");
        assert_ne!(a.id(), b.id());
        assert!(a.ptr_eq(&a.clone()));
    }

    #[test]
    fn test_variant_resolved_once() {
        let mut device = device();
        let material = StandardMaterial::new("floor");
        let first = resolve(&material, &mut device).unwrap();
        let second = resolve(&material, &mut device).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(material.variant_count(), 1);
    }

    #[test]
    fn test_update_drops_variants() {
        let mut device = device();
        let material = StandardMaterial::new("floor");
        resolve(&material, &mut device);
        let texture = device.create_texture(TextureDescriptor::new_2d(4, 4, PixelFormat::Rgba8));
        material.update(|p| {
            p.maps.insert(MapKind::Normal, MaterialMap::texture(texture));
        });
        assert_eq!(material.variant_count(), 0);
        resolve(&material, &mut device);
        assert_eq!(device.programs().program_count(), 2);
    }

    #[test]
    fn test_texture_map_without_texture_is_ignored() {
        let material = StandardMaterial::with_properties(
            "untextured",
            MaterialProperties::default().with_map(MapKind::Diffuse, MaterialMap::vertex_color()),
        );
        let options = material.forward_options(&SceneShaderSettings::default(), &[], false, false);
        assert_eq!(options.diffuse_map.map(|m| m.source), Some(MapSource::VertexColor));
        material.update(|p| {
            if let Some(map) = p.maps.get_mut(&MapKind::Diffuse) {
                map.options.source = MapSource::Texture;
            }
        });
        let options = material.forward_options(&SceneShaderSettings::default(), &[], false, false);
        assert!(options.diffuse_map.is_none());
    }

    #[test]
    fn test_bind_parameters() {
        let scope = ScopeSpace::new("test");
        let material = StandardMaterial::with_properties(
            "red",
            MaterialProperties::default().with_diffuse(Vec3::new(1.0, 0.0, 0.0)),
        );
        material.bind_parameters(&scope, false);
        let diffuse = scope.find("material_diffuse").and_then(|id| id.value());
        assert!(matches!(diffuse, Some(crate::scope::UniformValue::Vec3(v)) if v == Vec3::X));
        assert!(scope.find("texture_diffuseMap").is_none());
    }
}
