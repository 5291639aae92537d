//! The scene: lights, draw calls and frame-wide shading settings.

use glam::Vec3;

use crate::device::GraphicsDevice;
use crate::scope::ScopeSpace;
use crate::shader::{FogMode, GammaMode, ToneMapping};

use super::environment::Environment;
use super::light::Light;
use super::mesh::{DrawCall, MeshInstance};

/// Scene settings that select program variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SceneShaderSettings {
    pub fog: FogMode,
    pub gamma: GammaMode,
    pub tone_map: ToneMapping,
    /// A complete prefiltered environment is available.
    pub prefiltered: bool,
}

/// Fog parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fog {
    pub mode: FogMode,
    pub color: Vec3,
    pub start: f32,
    pub end: f32,
    pub density: f32,
}

impl Default for Fog {
    fn default() -> Self {
        Self {
            mode: FogMode::None,
            color: Vec3::ZERO,
            start: 1.0,
            end: 1000.0,
            density: 0.0,
        }
    }
}

/// Everything the renderer draws in one frame.
#[derive(Debug, Default)]
pub struct Scene {
    pub ambient: Vec3,
    pub fog: Fog,
    pub gamma: GammaMode,
    pub tone_mapping: ToneMapping,
    pub exposure: f32,
    pub environment: Environment,
    lights: Vec<Light>,
    draw_calls: Vec<DrawCall>,
}

impl Scene {
    pub fn new() -> Self {
        Self {
            ambient: Vec3::ZERO,
            exposure: 1.0,
            ..Default::default()
        }
    }

    pub fn with_ambient(mut self, ambient: Vec3) -> Self {
        self.ambient = ambient;
        self
    }

    pub fn with_fog(mut self, fog: Fog) -> Self {
        self.fog = fog;
        self
    }

    pub fn with_gamma(mut self, gamma: GammaMode) -> Self {
        self.gamma = gamma;
        self
    }

    pub fn with_tone_mapping(mut self, tone_mapping: ToneMapping, exposure: f32) -> Self {
        self.tone_mapping = tone_mapping;
        self.exposure = exposure;
        self
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Add a light and return its index.
    pub fn add_light(&mut self, light: Light) -> usize {
        self.lights.push(light);
        self.lights.len() - 1
    }

    /// Remove a light, releasing its shadow map.
    pub fn remove_light(&mut self, index: usize, device: &mut GraphicsDevice) -> Option<Light> {
        if index >= self.lights.len() {
            return None;
        }
        let mut light = self.lights.remove(index);
        light.release_shadow_map(device);
        Some(light)
    }

    pub fn lights(&self) -> &[Light] {
        &self.lights
    }

    pub fn light_mut(&mut self, index: usize) -> Option<&mut Light> {
        self.lights.get_mut(index)
    }

    pub fn add(&mut self, draw_call: impl Into<DrawCall>) {
        self.draw_calls.push(draw_call.into());
    }

    pub fn draw_calls(&self) -> &[DrawCall] {
        &self.draw_calls
    }

    pub fn draw_calls_mut(&mut self) -> &mut Vec<DrawCall> {
        &mut self.draw_calls
    }

    /// Mesh instances in the draw list.
    pub fn mesh_instances(&self) -> impl Iterator<Item = &MeshInstance> {
        self.draw_calls.iter().filter_map(|call| match call {
            DrawCall::Mesh(instance) => Some(instance),
            DrawCall::Command(_) => None,
        })
    }

    pub(crate) fn parts_mut(&mut self) -> (&mut [Light], &mut [DrawCall], &mut Environment) {
        (&mut self.lights, &mut self.draw_calls, &mut self.environment)
    }

    /// Variant-selecting settings for this frame. Reports an incomplete
    /// prefiltered chain.
    pub fn shader_settings(&mut self) -> SceneShaderSettings {
        SceneShaderSettings {
            fog: self.fog.mode,
            gamma: self.gamma,
            tone_map: self.tone_mapping,
            prefiltered: self.environment.resolve().is_some(),
        }
    }

    /// Publish fog, ambient, exposure and environment uniforms.
    pub fn bind_parameters(&self, scope: &ScopeSpace) {
        let linear = |c: Vec3| {
            if self.gamma == GammaMode::None {
                c
            } else {
                c.powf(2.2)
            }
        };
        scope.resolve("light_globalAmbient").set(linear(self.ambient));
        scope.resolve("exposure").set(self.exposure);
        if self.fog.mode != FogMode::None {
            scope.resolve("fog_color").set(linear(self.fog.color));
            scope.resolve("fog_start").set(self.fog.start);
            scope.resolve("fog_end").set(self.fog.end);
            scope.resolve("fog_density").set(self.fog.density);
        }
        self.environment.bind(scope);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::UniformValue;

    #[test]
    fn test_shader_settings() {
        let mut scene = Scene::new()
            .with_fog(Fog {
                mode: FogMode::Exp2,
                ..Default::default()
            })
            .with_gamma(GammaMode::Srgb);
        let settings = scene.shader_settings();
        assert_eq!(settings.fog, FogMode::Exp2);
        assert_eq!(settings.gamma, GammaMode::Srgb);
        assert!(!settings.prefiltered);
    }

    #[test]
    fn test_bind_parameters() {
        let scope = ScopeSpace::new("test");
        let scene = Scene::new().with_ambient(Vec3::splat(0.5));
        scene.bind_parameters(&scope);
        let ambient = scope.find("light_globalAmbient").and_then(|id| id.value());
        assert!(matches!(ambient, Some(UniformValue::Vec3(v)) if v == Vec3::splat(0.5)));
        assert!(scope.find("fog_color").is_none());
    }

    #[test]
    fn test_add_light_returns_index() {
        let mut scene = Scene::new();
        assert_eq!(scene.add_light(Light::directional()), 0);
        assert_eq!(scene.add_light(Light::point()), 1);
        assert_eq!(scene.lights().len(), 2);
    }
}
