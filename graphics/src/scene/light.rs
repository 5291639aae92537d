//! Lights and their shadow-casting state.

use glam::{Mat4, Vec3, Vec4};

use crate::device::{DeviceCapabilities, GraphicsDevice, PixelFormat, RenderTarget, Texture};
use crate::shader::LightKey;
use crate::shader::variant::resolve_shadow_format;

use super::camera::Camera;

/// Kind of light. The declaration order is the dispatch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum LightType {
    #[default]
    Directional,
    Point,
    Spot,
}

/// Distance attenuation of point and spot lights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Falloff {
    #[default]
    Linear,
    InverseSquared,
}

/// How shadow map samples are filtered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ShadowFilter {
    Hard,
    #[default]
    Pcf3x3,
    /// Variance shadow map in packed 8-bit moments.
    Vsm8,
    /// Exponential variance shadow map in half floats.
    Vsm16,
    /// Exponential variance shadow map in full floats.
    Vsm32,
}

impl ShadowFilter {
    pub fn is_vsm(self) -> bool {
        matches!(self, Self::Vsm8 | Self::Vsm16 | Self::Vsm32)
    }
}

/// Texel format a shadow map stores depth in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ShadowStorage {
    /// Depth split across the four 8-bit channels.
    #[default]
    PackedRgba8,
    Float16,
    Float32,
}

impl ShadowStorage {
    pub fn pixel_format(self) -> PixelFormat {
        match self {
            Self::PackedRgba8 => PixelFormat::Rgba8,
            Self::Float16 => PixelFormat::Rgba16F,
            Self::Float32 => PixelFormat::Rgba32F,
        }
    }
}

/// When a light's shadow map is re-rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ShadowUpdateMode {
    /// Keep whatever the map holds.
    Never,
    /// Render on the next frame, then switch to `Never`.
    Once,
    #[default]
    EveryFrame,
}

/// GPU storage of one light's shadow map: a 2D texture, or a cubemap with
/// one render target per face for point lights.
#[derive(Debug, Clone)]
pub struct ShadowMap {
    pub(crate) texture: Texture,
    pub(crate) targets: Vec<RenderTarget>,
    pub(crate) resolution: u32,
    pub(crate) filter: ShadowFilter,
    pub(crate) storage: ShadowStorage,
    pub(crate) device_id: u32,
}

impl ShadowMap {
    pub fn texture(&self) -> &Texture {
        &self.texture
    }

    pub fn targets(&self) -> &[RenderTarget] {
        &self.targets
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn filter(&self) -> ShadowFilter {
        self.filter
    }

    pub fn storage(&self) -> ShadowStorage {
        self.storage
    }

    pub(crate) fn destroy(&self, device: &mut GraphicsDevice) {
        for target in &self.targets {
            device.destroy_render_target(target);
        }
        device.destroy_texture(&self.texture);
        log::debug!("Destroyed {}px shadow map", self.resolution);
    }
}

/// A light in the scene.
///
/// Directional and spot lights shine down their local -Y axis. Cone angles
/// are half-angles in degrees.
#[derive(Debug, Clone)]
pub struct Light {
    pub light_type: LightType,
    pub enabled: bool,
    pub color: Vec3,
    pub intensity: f32,
    /// Distance at which point and spot lights fade out.
    pub range: f32,
    pub falloff: Falloff,
    pub inner_cone_angle: f32,
    pub outer_cone_angle: f32,

    pub cast_shadows: bool,
    pub shadow_resolution: u32,
    pub shadow_bias: f32,
    pub normal_offset_bias: f32,
    /// Bias applied to variance shadow maps instead of the normal offset.
    pub vsm_bias: f32,
    /// How far from the camera directional shadows reach.
    pub shadow_distance: f32,
    pub shadow_update_mode: ShadowUpdateMode,
    pub shadow_filter: ShadowFilter,

    transform: Mat4,
    shadow_camera: Camera,
    shadow_map: Option<ShadowMap>,
    shadow_matrix: Mat4,
    shadow_params: Vec4,
}

impl Light {
    pub fn new(light_type: LightType) -> Self {
        Self {
            light_type,
            enabled: true,
            color: Vec3::ONE,
            intensity: 1.0,
            range: 10.0,
            falloff: Falloff::Linear,
            inner_cone_angle: 40.0,
            outer_cone_angle: 45.0,
            cast_shadows: false,
            shadow_resolution: 1024,
            shadow_bias: 0.05,
            normal_offset_bias: 0.0,
            vsm_bias: 0.01,
            shadow_distance: 40.0,
            shadow_update_mode: ShadowUpdateMode::EveryFrame,
            shadow_filter: ShadowFilter::Pcf3x3,
            transform: Mat4::IDENTITY,
            shadow_camera: Camera::new(),
            shadow_map: None,
            shadow_matrix: Mat4::IDENTITY,
            shadow_params: Vec4::ZERO,
        }
    }

    pub fn directional() -> Self {
        Self::new(LightType::Directional)
    }

    pub fn point() -> Self {
        Self::new(LightType::Point)
    }

    pub fn spot() -> Self {
        Self::new(LightType::Spot)
    }

    pub fn with_color(mut self, color: Vec3) -> Self {
        self.color = color;
        self
    }

    pub fn with_intensity(mut self, intensity: f32) -> Self {
        self.intensity = intensity;
        self
    }

    pub fn with_range(mut self, range: f32) -> Self {
        self.range = range;
        self
    }

    pub fn with_falloff(mut self, falloff: Falloff) -> Self {
        self.falloff = falloff;
        self
    }

    pub fn with_cone_angles(mut self, inner: f32, outer: f32) -> Self {
        self.inner_cone_angle = inner;
        self.outer_cone_angle = outer;
        self
    }

    pub fn with_cast_shadows(mut self, cast_shadows: bool) -> Self {
        self.cast_shadows = cast_shadows;
        self
    }

    pub fn with_shadow_resolution(mut self, resolution: u32) -> Self {
        self.shadow_resolution = resolution;
        self
    }

    pub fn with_shadow_bias(mut self, bias: f32) -> Self {
        self.shadow_bias = bias;
        self
    }

    pub fn with_normal_offset_bias(mut self, bias: f32) -> Self {
        self.normal_offset_bias = bias;
        self
    }

    pub fn with_shadow_distance(mut self, distance: f32) -> Self {
        self.shadow_distance = distance;
        self
    }

    pub fn with_shadow_update_mode(mut self, mode: ShadowUpdateMode) -> Self {
        self.shadow_update_mode = mode;
        self
    }

    pub fn with_shadow_filter(mut self, filter: ShadowFilter) -> Self {
        self.shadow_filter = filter;
        self
    }

    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }

    pub fn transform(&self) -> Mat4 {
        self.transform
    }

    pub fn set_transform(&mut self, transform: Mat4) {
        self.transform = transform;
    }

    pub fn position(&self) -> Vec3 {
        self.transform.w_axis.truncate()
    }

    /// Unit direction the light shines in.
    pub fn direction(&self) -> Vec3 {
        (-self.transform.y_axis.truncate()).normalize_or_zero()
    }

    /// Colour scaled by intensity, linearized first when `gamma` is on.
    pub fn final_color(&self, gamma: bool) -> Vec3 {
        let color = if gamma {
            self.color.powf(2.2)
        } else {
            self.color
        };
        color * self.intensity
    }

    /// Whether this light renders a shadow map at all.
    pub fn casts_shadows(&self) -> bool {
        self.enabled && self.cast_shadows
    }

    /// Whether the shadow map is re-rendered this frame.
    pub fn needs_shadow_update(&self) -> bool {
        self.casts_shadows() && self.shadow_update_mode != ShadowUpdateMode::Never
    }

    /// Shadow filter and storage this light gets on a device.
    pub fn shadow_format(&self, capabilities: &DeviceCapabilities) -> (ShadowFilter, ShadowStorage) {
        resolve_shadow_format(self.shadow_filter, capabilities)
    }

    /// Variant key of this light for a device.
    pub fn key(&self, capabilities: &DeviceCapabilities) -> LightKey {
        let (shadow_filter, shadow_storage) = self.shadow_format(capabilities);
        LightKey {
            light_type: self.light_type,
            casts_shadow: self.casts_shadows(),
            shadow_storage,
            shadow_filter,
            falloff: self.falloff,
            normal_offset: self.normal_offset_bias > 0.0 || shadow_filter.is_vsm(),
        }
        .canonical()
    }

    pub fn shadow_camera(&self) -> &Camera {
        &self.shadow_camera
    }

    pub(crate) fn shadow_camera_mut(&mut self) -> &mut Camera {
        &mut self.shadow_camera
    }

    pub fn shadow_map(&self) -> Option<&ShadowMap> {
        self.shadow_map.as_ref()
    }

    pub(crate) fn replace_shadow_map(&mut self, map: Option<ShadowMap>) -> Option<ShadowMap> {
        std::mem::replace(&mut self.shadow_map, map)
    }

    /// Destroy the shadow map, if any. It is recreated when needed.
    pub fn release_shadow_map(&mut self, device: &mut GraphicsDevice) {
        if let Some(map) = self.shadow_map.take() {
            map.destroy(device);
        }
    }

    /// World to shadow map texture space, including the [0, 1] remap.
    pub fn shadow_matrix(&self) -> Mat4 {
        self.shadow_matrix
    }

    /// `(resolution, normal bias, depth bias, 1 / range)`. Directional lights
    /// use the first three components.
    pub fn shadow_params(&self) -> Vec4 {
        self.shadow_params
    }

    pub(crate) fn set_shadow_projection(&mut self, matrix: Mat4, params: Vec4) {
        self.shadow_matrix = matrix;
        self.shadow_params = params;
    }
}

static_assertions::assert_impl_all!(Light: Send, Sync);
