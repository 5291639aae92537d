//! Texture resources with per-object sampler state tracking.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::context::TextureHandle;
use super::resource::{GpuResource, GpuSlot, ResourceState, next_resource_id};

/// Texel format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PixelFormat {
    L8,
    Rgb8,
    #[default]
    Rgba8,
    Rgba16F,
    Rgba32F,
    Depth,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            Self::L8 => 1,
            Self::Rgb8 => 3,
            Self::Rgba8 | Self::Depth => 4,
            Self::Rgba16F => 8,
            Self::Rgba32F => 16,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, Self::Rgba16F | Self::Rgba32F)
    }
}

/// Texture filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilterMode {
    Nearest,
    #[default]
    Linear,
    NearestMipmapNearest,
    LinearMipmapLinear,
}

/// Texture addressing outside [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WrapMode {
    #[default]
    Repeat,
    Clamp,
    MirroredRepeat,
}

/// One sampler parameter change sent to the context.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SamplerParam {
    MinFilter(FilterMode),
    MagFilter(FilterMode),
    WrapU(WrapMode),
    WrapV(WrapMode),
    Anisotropy(f32),
}

/// Immutable texture properties.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureDescriptor {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub cubemap: bool,
    pub mipmaps: bool,
    pub label: Option<String>,
}

impl TextureDescriptor {
    pub fn new_2d(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            format,
            cubemap: false,
            mipmaps: false,
            label: None,
        }
    }

    pub fn new_cube(size: u32, format: PixelFormat) -> Self {
        Self {
            cubemap: true,
            ..Self::new_2d(size, size, format)
        }
    }

    pub fn with_mipmaps(mut self, mipmaps: bool) -> Self {
        self.mipmaps = mipmaps;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn face_count(&self) -> usize {
        if self.cubemap { 6 } else { 1 }
    }
}

/// Mutable sampler parameters of a texture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerParams {
    pub min_filter: FilterMode,
    pub mag_filter: FilterMode,
    pub wrap_u: WrapMode,
    pub wrap_v: WrapMode,
    pub anisotropy: f32,
}

impl Default for SamplerParams {
    fn default() -> Self {
        Self {
            min_filter: FilterMode::LinearMipmapLinear,
            mag_filter: FilterMode::Linear,
            wrap_u: WrapMode::Repeat,
            wrap_v: WrapMode::Repeat,
            anisotropy: 1.0,
        }
    }
}

/// CPU-side pixels, indexed by face then mip level. Empty levels allocate
/// storage without data (render targets).
#[derive(Debug, Clone, Default)]
pub struct TextureData {
    pub faces: Vec<Vec<Vec<u8>>>,
}

impl TextureData {
    pub fn level(&self, face: usize, level: usize) -> Option<&[u8]> {
        self.faces.get(face)?.get(level).map(Vec::as_slice)
    }
}

/// Last sampler values applied to the GPU object, each tracked on its own.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct AppliedSampler {
    pub min_filter: Option<FilterMode>,
    pub mag_filter: Option<FilterMode>,
    pub wrap_u: Option<WrapMode>,
    pub wrap_v: Option<WrapMode>,
    pub anisotropy: Option<f32>,
}

impl AppliedSampler {
    /// Parameters in `wanted` that differ from what was last applied.
    /// Records them as applied.
    pub fn diff(&mut self, wanted: &SamplerParams) -> Vec<SamplerParam> {
        let mut changes = Vec::new();
        if self.min_filter != Some(wanted.min_filter) {
            self.min_filter = Some(wanted.min_filter);
            changes.push(SamplerParam::MinFilter(wanted.min_filter));
        }
        if self.mag_filter != Some(wanted.mag_filter) {
            self.mag_filter = Some(wanted.mag_filter);
            changes.push(SamplerParam::MagFilter(wanted.mag_filter));
        }
        if self.wrap_u != Some(wanted.wrap_u) {
            self.wrap_u = Some(wanted.wrap_u);
            changes.push(SamplerParam::WrapU(wanted.wrap_u));
        }
        if self.wrap_v != Some(wanted.wrap_v) {
            self.wrap_v = Some(wanted.wrap_v);
            changes.push(SamplerParam::WrapV(wanted.wrap_v));
        }
        if self.anisotropy != Some(wanted.anisotropy) {
            self.anisotropy = Some(wanted.anisotropy);
            changes.push(SamplerParam::Anisotropy(wanted.anisotropy));
        }
        changes
    }
}

#[derive(Debug)]
pub(crate) struct TextureGpu {
    pub slot: GpuSlot<TextureHandle>,
    pub applied: AppliedSampler,
}

pub(crate) struct TextureInner {
    pub id: u64,
    pub descriptor: TextureDescriptor,
    pub params: Mutex<SamplerParams>,
    pub data: RwLock<TextureData>,
    pub gpu: Mutex<TextureGpu>,
}

impl GpuResource for TextureInner {
    fn invalidate(&self) {
        let mut gpu = self.gpu.lock();
        gpu.slot.invalidate();
        gpu.applied = AppliedSampler::default();
    }
}

/// A texture, uploaded lazily the first time it is bound.
///
/// Textures are created by [`GraphicsDevice::create_texture`](super::GraphicsDevice::create_texture)
/// and are reference-counted.
#[derive(Clone)]
pub struct Texture {
    inner: Arc<TextureInner>,
}

impl Texture {
    pub(crate) fn new(descriptor: TextureDescriptor) -> Self {
        let faces = vec![Vec::new(); descriptor.face_count()];
        Self {
            inner: Arc::new(TextureInner {
                id: next_resource_id(),
                descriptor,
                params: Mutex::new(SamplerParams::default()),
                data: RwLock::new(TextureData { faces }),
                gpu: Mutex::new(TextureGpu {
                    slot: GpuSlot::new(),
                    applied: AppliedSampler::default(),
                }),
            }),
        }
    }

    pub(crate) fn inner(&self) -> &Arc<TextureInner> {
        &self.inner
    }

    /// Process-unique identity.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn descriptor(&self) -> &TextureDescriptor {
        &self.inner.descriptor
    }

    pub fn width(&self) -> u32 {
        self.inner.descriptor.width
    }

    pub fn height(&self) -> u32 {
        self.inner.descriptor.height
    }

    pub fn format(&self) -> PixelFormat {
        self.inner.descriptor.format
    }

    pub fn is_cubemap(&self) -> bool {
        self.inner.descriptor.cubemap
    }

    /// Store pixels for one face and mip level, marking the texture dirty.
    pub fn set_level(&self, face: usize, level: usize, pixels: Vec<u8>) {
        {
            let mut data = self.inner.data.write();
            if let Some(levels) = data.faces.get_mut(face) {
                if levels.len() <= level {
                    levels.resize(level + 1, Vec::new());
                }
                levels[level] = pixels;
            }
        }
        self.upload();
    }

    /// Request a re-upload on next bind.
    pub fn upload(&self) {
        self.inner.gpu.lock().slot.mark_dirty();
    }

    /// Current upload state.
    pub fn state(&self) -> ResourceState {
        self.inner.gpu.lock().slot.state
    }

    pub fn sampler_params(&self) -> SamplerParams {
        *self.inner.params.lock()
    }

    pub fn set_min_filter(&self, filter: FilterMode) {
        self.inner.params.lock().min_filter = filter;
    }

    pub fn set_mag_filter(&self, filter: FilterMode) {
        self.inner.params.lock().mag_filter = filter;
    }

    pub fn set_wrap(&self, u: WrapMode, v: WrapMode) {
        let mut params = self.inner.params.lock();
        params.wrap_u = u;
        params.wrap_v = v;
    }

    pub fn set_anisotropy(&self, anisotropy: f32) {
        self.inner.params.lock().anisotropy = anisotropy;
    }

    pub fn ptr_eq(&self, other: &Texture) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.inner.id)
            .field("width", &self.inner.descriptor.width)
            .field("height", &self.inner.descriptor.height)
            .field("format", &self.inner.descriptor.format)
            .field("cubemap", &self.inner.descriptor.cubemap)
            .field("label", &self.inner.descriptor.label)
            .finish()
    }
}

static_assertions::assert_impl_all!(Texture: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_texture_debug() {
        let texture = Texture::new(
            TextureDescriptor::new_2d(1920, 1080, PixelFormat::Rgba8).with_label("albedo"),
        );
        let debug = format!("{:?}", texture);
        assert!(debug.contains("Texture"));
        assert!(debug.contains("1920"));
        assert!(debug.contains("albedo"));
    }

    #[test]
    fn test_cubemap_has_six_faces() {
        let texture = Texture::new(TextureDescriptor::new_cube(128, PixelFormat::Rgba8));
        assert!(texture.is_cubemap());
        assert_eq!(texture.inner().data.read().faces.len(), 6);
    }

    #[test]
    fn test_sampler_diff_tracks_each_field() {
        let mut applied = AppliedSampler::default();
        let mut params = SamplerParams::default();
        assert_eq!(applied.diff(&params).len(), 5);
        assert!(applied.diff(&params).is_empty());

        params.wrap_u = WrapMode::Clamp;
        let changes = applied.diff(&params);
        assert_eq!(changes, vec![SamplerParam::WrapU(WrapMode::Clamp)]);
    }

    #[test]
    fn test_set_level_marks_dirty() {
        let texture = Texture::new(TextureDescriptor::new_2d(2, 2, PixelFormat::Rgba8));
        {
            let mut gpu = texture.inner().gpu.lock();
            assert!(gpu.slot.begin_upload());
            gpu.slot.finish_upload(true);
        }
        assert_eq!(texture.state(), ResourceState::Clean);
        texture.set_level(0, 0, vec![255; 16]);
        assert_eq!(texture.state(), ResourceState::Dirty);
        assert_eq!(texture.inner().data.read().level(0, 0).map(<[u8]>::len), Some(16));
    }
}
