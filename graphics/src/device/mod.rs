//! Graphics device: a state-caching facade over one [`GraphicsContext`].
//!
//! Every setter compares the requested value with the last value applied
//! and skips the context call when nothing changed. The renderer relies on
//! this and calls setters unconditionally for every draw.
//!
//! The device also owns the root [`ScopeSpace`] and the per-device
//! [`ProgramLibrary`], so two devices never share compiled programs.

mod buffer;
mod context;
mod dummy;
mod render_target;
mod resource;
mod state;
mod texture;

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

pub use buffer::{
    BufferUsage, IndexBuffer, IndexFormat, VertexBuffer, VertexDataType, VertexElement,
    VertexElementDesc, VertexFormat, VertexSemantic,
};
pub use context::{
    ActiveAttribute, ActiveUniform, AttributeLocation, BufferHandle, BufferTarget,
    DeviceCapabilities, FramebufferColor, FramebufferHandle, GraphicsContext, Precision,
    ProgramHandle, StageHandle, TextureHandle, UniformKind, UniformLocation,
};
pub use dummy::{ContextMonitor, DrawRecord, DummyContext};
pub use render_target::RenderTarget;
pub use resource::ResourceState;
pub use state::{
    BlendEquation, BlendFactor, BlendMode, ClearFlags, ClearOptions, ColorWrites, CompareFunc,
    CullMode, Primitive, PrimitiveType, Rect,
};
pub use texture::{
    FilterMode, PixelFormat, SamplerParam, SamplerParams, Texture, TextureData,
    TextureDescriptor, WrapMode,
};

use crate::error::GraphicsError;
use crate::profile_scope;
use crate::scope::{ScopeId, ScopeSpace, UniformValue, VertexBinding};
use crate::shader::{ProgramLibrary, ProgramOptions, Shader};

use buffer::BufferInner;
use resource::ResourceRegistry;

/// Number of vertex streams that can be bound at once.
pub const MAX_VERTEX_STREAMS: usize = 2;

static NEXT_DEVICE_ID: AtomicU32 = AtomicU32::new(1);

// =============================================================================
// Configuration
// =============================================================================

/// Device creation parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceConfig {
    /// Fewer fragment texture units than this is fatal.
    pub min_texture_units: u32,
    /// Upper bound applied to every texture's anisotropy.
    pub max_anisotropy: f32,
    /// Attach the line-numbered source to shader compile diagnostics.
    pub log_shader_source: bool,
    pub backbuffer_width: u32,
    pub backbuffer_height: u32,
}

impl DeviceConfig {
    pub fn with_min_texture_units(mut self, units: u32) -> Self {
        self.min_texture_units = units;
        self
    }

    pub fn with_max_anisotropy(mut self, anisotropy: f32) -> Self {
        self.max_anisotropy = anisotropy;
        self
    }

    pub fn with_log_shader_source(mut self, enabled: bool) -> Self {
        self.log_shader_source = enabled;
        self
    }

    pub fn with_backbuffer_size(mut self, width: u32, height: u32) -> Self {
        self.backbuffer_width = width;
        self.backbuffer_height = height;
        self
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            min_texture_units: 8,
            max_anisotropy: 16.0,
            log_shader_source: true,
            backbuffer_width: 1280,
            backbuffer_height: 720,
        }
    }
}

/// Counters of work that reached the context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStats {
    pub draw_calls: u64,
    pub shader_switches: u64,
    pub uniform_uploads: u64,
    pub texture_uploads: u64,
    pub buffer_uploads: u64,
}

// =============================================================================
// Cached state
// =============================================================================

/// Last values applied to the context. `None` means unknown, so the next
/// setter always reaches the context.
#[derive(Debug, Default)]
struct CachedState {
    depth_test: Option<bool>,
    depth_write: Option<bool>,
    depth_func: Option<CompareFunc>,
    cull_mode: Option<CullMode>,
    blending: Option<bool>,
    blend_func: Option<(BlendFactor, BlendFactor)>,
    blend_equation: Option<BlendEquation>,
    color_write: Option<ColorWrites>,
    clear_color: Option<[f32; 4]>,
    clear_depth: Option<f32>,
    viewport: Option<Rect>,
    scissor: Option<Rect>,
    render_target: Option<Option<u64>>,
    vertex_binding: Option<Option<BufferHandle>>,
    index_binding: Option<Option<BufferHandle>>,
    texture_units: Vec<Option<u64>>,
    enabled_attributes: HashSet<AttributeLocation>,
    attribute_divisors: Vec<(AttributeLocation, u32)>,
}

macro_rules! cached_setter {
    ($(#[$meta:meta])* $fn_name:ident, $field:ident, $ty:ty) => {
        $(#[$meta])*
        pub fn $fn_name(&mut self, value: $ty) {
            if self.state.$field != Some(value) {
                self.state.$field = Some(value);
                self.context.$fn_name(value);
            }
        }
    };
}

// =============================================================================
// GraphicsDevice
// =============================================================================

/// Owns one graphics context and its cached pipeline state.
pub struct GraphicsDevice {
    id: u32,
    context: Box<dyn GraphicsContext>,
    capabilities: DeviceCapabilities,
    config: DeviceConfig,
    scope: ScopeSpace,
    semantic_ids: Vec<ScopeId>,
    programs: ProgramLibrary,
    state: CachedState,
    shader: Option<Arc<Shader>>,
    vertex_buffers: [Option<VertexBuffer>; MAX_VERTEX_STREAMS],
    index_buffer: Option<IndexBuffer>,
    attributes_invalidated: bool,
    instancing: bool,
    resources: ResourceRegistry,
    generation: u32,
    context_lost: bool,
    stats: DeviceStats,
}

impl GraphicsDevice {
    /// Create a device over `context`.
    ///
    /// Fails with [`GraphicsError::Unsupported`] if a required capability is
    /// missing. Optional capabilities only influence shader variants.
    pub fn new(
        context: Box<dyn GraphicsContext>,
        config: DeviceConfig,
    ) -> Result<Self, GraphicsError> {
        let capabilities = context.capabilities();
        if !capabilities.vertex_stage {
            return Err(GraphicsError::Unsupported(
                "programmable vertex stage is required".into(),
            ));
        }
        if capabilities.max_texture_units < config.min_texture_units {
            return Err(GraphicsError::Unsupported(format!(
                "{} texture units available, {} required",
                capabilities.max_texture_units, config.min_texture_units
            )));
        }

        let scope = ScopeSpace::new("device");
        let semantic_ids = VertexSemantic::ALL
            .iter()
            .map(|s| scope.resolve(s.attribute_name()))
            .collect();

        let id = NEXT_DEVICE_ID.fetch_add(1, Ordering::Relaxed);
        log::debug!(
            "Created graphics device {} on {} ({:?})",
            id,
            context.name(),
            capabilities
        );

        let mut state = CachedState::default();
        state.texture_units = vec![None; capabilities.max_texture_units as usize];

        Ok(Self {
            id,
            context,
            capabilities,
            programs: ProgramLibrary::with_builtin_generators(config.log_shader_source),
            config,
            scope,
            semantic_ids,
            state,
            shader: None,
            vertex_buffers: Default::default(),
            index_buffer: None,
            attributes_invalidated: true,
            instancing: false,
            resources: ResourceRegistry::default(),
            generation: 0,
            context_lost: false,
            stats: DeviceStats::default(),
        })
    }

    /// Process-unique device identity.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Incremented on every context loss.
    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Root uniform namespace.
    pub fn scope(&self) -> &ScopeSpace {
        &self.scope
    }

    pub fn programs(&self) -> &ProgramLibrary {
        &self.programs
    }

    pub fn programs_mut(&mut self) -> &mut ProgramLibrary {
        &mut self.programs
    }

    pub fn stats(&self) -> DeviceStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = DeviceStats::default();
    }

    pub fn backbuffer_size(&self) -> (u32, u32) {
        (self.config.backbuffer_width, self.config.backbuffer_height)
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.config.backbuffer_width = width;
        self.config.backbuffer_height = height;
    }

    // -------------------------------------------------------------------------
    // Frame lifecycle / context loss
    // -------------------------------------------------------------------------

    /// Check the context at the start of a frame.
    ///
    /// Returns [`GraphicsError::ContextLost`] while the context is lost. The
    /// first time a loss is observed, every cache is reset.
    pub fn update_begin(&mut self) -> Result<(), GraphicsError> {
        if self.context.is_context_lost() {
            if !self.context_lost {
                self.context_lost = true;
                self.handle_context_lost();
            }
            return Err(GraphicsError::ContextLost);
        }
        if self.context_lost {
            log::debug!("Graphics device {} context restored", self.id);
            self.context_lost = false;
        }
        Ok(())
    }

    /// Drop every cached GPU handle and state value.
    ///
    /// Programs are forgotten without being deleted since their handles died
    /// with the context. Textures, buffers and render targets go back to
    /// [`ResourceState::Dirty`] and are recreated on next use.
    pub fn handle_context_lost(&mut self) {
        let programs = self.programs.len();
        self.programs.forget_all();
        let resources = self.resources.invalidate_all();
        let units = self.capabilities.max_texture_units as usize;
        self.state = CachedState::default();
        self.state.texture_units = vec![None; units];
        self.shader = None;
        self.vertex_buffers = Default::default();
        self.index_buffer = None;
        self.attributes_invalidated = true;
        self.instancing = false;
        self.generation += 1;
        log::debug!(
            "Graphics device {} context lost: dropped {} programs, invalidated {} resources",
            self.id,
            programs,
            resources
        );
    }

    // -------------------------------------------------------------------------
    // Programs
    // -------------------------------------------------------------------------

    /// Get the compiled program for `options` from the named generator,
    /// compiling it on first use. `None` if generation or compilation failed.
    pub fn get_program(&mut self, name: &str, options: &ProgramOptions) -> Option<Arc<Shader>> {
        self.programs.get_program(
            self.context.as_mut(),
            &self.capabilities,
            &self.scope,
            name,
            options,
        )
    }

    /// Delete every compiled program.
    pub fn clear_programs(&mut self) {
        self.set_shader(None);
        self.programs.clear(self.context.as_mut());
    }

    // -------------------------------------------------------------------------
    // Resource creation
    // -------------------------------------------------------------------------

    pub fn create_texture(&mut self, descriptor: TextureDescriptor) -> Texture {
        let texture = Texture::new(descriptor);
        self.resources.register(texture.inner());
        texture
    }

    pub fn create_vertex_buffer(
        &mut self,
        format: Arc<VertexFormat>,
        num_vertices: u32,
        usage: BufferUsage,
    ) -> VertexBuffer {
        let buffer = VertexBuffer::new(format, num_vertices, usage);
        self.resources.register(buffer.inner());
        buffer
    }

    pub fn create_index_buffer(
        &mut self,
        format: IndexFormat,
        num_indices: u32,
        usage: BufferUsage,
    ) -> IndexBuffer {
        let buffer = IndexBuffer::new(format, num_indices, usage);
        self.resources.register(buffer.inner());
        buffer
    }

    /// Create a render target drawing into `color` (or one face of it).
    pub fn create_render_target(
        &mut self,
        color: Option<Texture>,
        face: Option<u32>,
        depth: bool,
    ) -> Result<RenderTarget, GraphicsError> {
        if let (Some(texture), Some(face)) = (&color, face) {
            if !texture.is_cubemap() || face >= 6 {
                return Err(GraphicsError::InvalidParameter(format!(
                    "face {face} of a non-cubemap or out of range"
                )));
            }
        }
        let target = RenderTarget::new(color, face, depth);
        self.resources.register(target.inner());
        Ok(target)
    }

    pub fn destroy_texture(&mut self, texture: &Texture) {
        let handle = texture.inner().gpu.lock().slot.handle;
        if let Some(handle) = handle {
            self.context.delete_texture(handle);
        }
        let id = texture.id();
        for unit in self.state.texture_units.iter_mut() {
            if *unit == Some(id) {
                *unit = None;
            }
        }
        resource::GpuResource::invalidate(texture.inner().as_ref());
    }

    pub fn destroy_vertex_buffer(&mut self, buffer: &VertexBuffer) {
        for stream in 0..MAX_VERTEX_STREAMS {
            if self.vertex_buffers[stream]
                .as_ref()
                .is_some_and(|b| b.ptr_eq(buffer))
            {
                self.vertex_buffers[stream] = None;
                self.attributes_invalidated = true;
            }
        }
        self.destroy_buffer(buffer.inner());
    }

    pub fn destroy_index_buffer(&mut self, buffer: &IndexBuffer) {
        if self.index_buffer.as_ref().is_some_and(|b| b.ptr_eq(buffer)) {
            self.index_buffer = None;
        }
        self.destroy_buffer(buffer.inner());
    }

    fn destroy_buffer<M>(&mut self, inner: &BufferInner<M>) {
        let mut gpu = inner.gpu.lock();
        if let Some(handle) = gpu.handle {
            self.context.delete_buffer(handle);
            if self.state.vertex_binding == Some(Some(handle)) {
                self.state.vertex_binding = None;
            }
            if self.state.index_binding == Some(Some(handle)) {
                self.state.index_binding = None;
            }
        }
        gpu.invalidate();
    }

    pub fn destroy_render_target(&mut self, target: &RenderTarget) {
        let mut gpu = target.inner().gpu.lock();
        if let Some(handle) = gpu.handle {
            self.context.delete_framebuffer(handle);
        }
        gpu.invalidate();
        if self.state.render_target == Some(Some(target.id())) {
            self.state.render_target = None;
        }
    }

    // -------------------------------------------------------------------------
    // Fixed-function state
    // -------------------------------------------------------------------------

    cached_setter!(set_depth_test, depth_test, bool);
    cached_setter!(set_depth_write, depth_write, bool);
    cached_setter!(set_depth_func, depth_func, CompareFunc);
    cached_setter!(set_cull_mode, cull_mode, CullMode);
    cached_setter!(
        /// Enable or disable blending.
        set_blending,
        blending,
        bool
    );
    cached_setter!(set_blend_equation, blend_equation, BlendEquation);
    cached_setter!(set_color_write, color_write, ColorWrites);
    cached_setter!(set_viewport, viewport, Rect);
    cached_setter!(set_scissor, scissor, Rect);

    pub fn set_blend_function(&mut self, src: BlendFactor, dst: BlendFactor) {
        if self.state.blend_func != Some((src, dst)) {
            self.state.blend_func = Some((src, dst));
            self.context.set_blend_func(src, dst);
        }
    }

    /// Apply a material blend type.
    pub fn set_blend_mode(&mut self, mode: BlendMode) {
        self.set_blending(mode.is_blended());
        if let Some((src, dst)) = mode.factors() {
            self.set_blend_function(src, dst);
            self.set_blend_equation(BlendEquation::Add);
        }
    }

    /// Clear the bound target.
    ///
    /// Depth and colour writes are enabled first for the buffers being
    /// cleared, since masked channels would otherwise survive the clear.
    pub fn clear(&mut self, options: &ClearOptions) {
        if options.flags.is_empty() {
            return;
        }
        if options.flags.contains(ClearFlags::COLOR) {
            if self.state.clear_color != Some(options.color) {
                self.state.clear_color = Some(options.color);
                self.context.set_clear_color(options.color);
            }
            self.set_color_write(ColorWrites::ALL);
        }
        if options.flags.contains(ClearFlags::DEPTH) {
            if self.state.clear_depth != Some(options.depth) {
                self.state.clear_depth = Some(options.depth);
                self.context.set_clear_depth(options.depth);
            }
            self.set_depth_write(true);
        }
        self.context.clear(options.flags);
    }

    /// Bind `target`, or the backbuffer for `None`.
    pub fn set_render_target(&mut self, target: Option<&RenderTarget>) -> Result<(), GraphicsError> {
        let id = target.map(RenderTarget::id);
        if self.state.render_target == Some(id) {
            return Ok(());
        }
        let framebuffer = match target {
            Some(target) => Some(self.ensure_framebuffer(target)?),
            None => None,
        };
        self.context.bind_framebuffer(framebuffer);
        self.state.render_target = Some(id);
        Ok(())
    }

    fn ensure_framebuffer(&mut self, target: &RenderTarget) -> Result<FramebufferHandle, GraphicsError> {
        let inner = target.inner();
        let color = match &inner.color {
            Some(texture) => Some(FramebufferColor {
                texture: self.ensure_texture(texture)?,
                face: inner.face,
            }),
            None => None,
        };
        let mut gpu = inner.gpu.lock();
        if !gpu.begin_upload() {
            if let Some(handle) = gpu.handle {
                return Ok(handle);
            }
            gpu.mark_dirty();
            gpu.begin_upload();
        }
        let result = self.context.create_framebuffer(color, inner.depth);
        gpu.finish_upload(result.is_ok());
        let handle = result?;
        gpu.handle = Some(handle);
        log::trace!(
            "Created framebuffer for target {} ({}x{})",
            inner.id,
            inner.width,
            inner.height
        );
        Ok(handle)
    }

    // -------------------------------------------------------------------------
    // Textures
    // -------------------------------------------------------------------------

    fn ensure_texture(&mut self, texture: &Texture) -> Result<TextureHandle, GraphicsError> {
        let inner = texture.inner();
        let mut gpu = inner.gpu.lock();
        let handle = match gpu.slot.handle {
            Some(handle) => handle,
            None => {
                let handle = self.context.create_texture(&inner.descriptor)?;
                gpu.slot.handle = Some(handle);
                gpu.applied = Default::default();
                handle
            }
        };
        if gpu.slot.begin_upload() {
            let data = inner.data.read();
            let result = self.context.upload_texture(handle, &inner.descriptor, &data);
            gpu.slot.finish_upload(result.is_ok());
            result?;
            self.stats.texture_uploads += 1;
        }
        Ok(handle)
    }

    /// Bind `texture` to `unit`.
    ///
    /// Pixels are uploaded only while the texture is dirty. Sampler
    /// parameters are sent only for the fields that changed since they were
    /// last applied to this texture object.
    pub fn set_texture(&mut self, texture: &Texture, unit: u32) -> Result<(), GraphicsError> {
        let slot = unit as usize;
        if slot >= self.state.texture_units.len() {
            return Err(GraphicsError::InvalidParameter(format!(
                "texture unit {unit} exceeds {} available",
                self.state.texture_units.len()
            )));
        }
        let handle = self.ensure_texture(texture)?;
        if self.state.texture_units[slot] != Some(texture.id()) {
            self.state.texture_units[slot] = Some(texture.id());
            self.context
                .bind_texture(unit, Some(handle), texture.is_cubemap());
        }

        let mut params = texture.sampler_params();
        params.anisotropy = params
            .anisotropy
            .min(self.capabilities.max_anisotropy)
            .min(self.config.max_anisotropy)
            .max(1.0);
        let changes = texture.inner().gpu.lock().applied.diff(&params);
        for change in changes {
            self.context.set_sampler_param(handle, change);
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Buffers
    // -------------------------------------------------------------------------

    fn bind_buffer(&mut self, target: BufferTarget, handle: Option<BufferHandle>) {
        let cached = match target {
            BufferTarget::Vertex => &mut self.state.vertex_binding,
            BufferTarget::Index => &mut self.state.index_binding,
        };
        if *cached != Some(handle) {
            *cached = Some(handle);
            self.context.bind_buffer(target, handle);
        }
    }

    fn ensure_buffer<M>(
        &mut self,
        inner: &BufferInner<M>,
        target: BufferTarget,
    ) -> Result<BufferHandle, GraphicsError> {
        let mut gpu = inner.gpu.lock();
        let handle = match gpu.handle {
            Some(handle) => handle,
            None => {
                let handle = self.context.create_buffer(target)?;
                gpu.handle = Some(handle);
                handle
            }
        };
        if gpu.begin_upload() {
            self.bind_buffer(target, Some(handle));
            let data = inner.data.read();
            let result = self.context.upload_buffer(handle, target, &data, inner.usage);
            gpu.finish_upload(result.is_ok());
            result?;
            self.stats.buffer_uploads += 1;
        }
        Ok(handle)
    }

    /// Bind a vertex buffer to `stream` and publish its elements to the scope.
    ///
    /// Semantics provided by the previous buffer but not by the new one are
    /// cleared, so shaders reading them see an unbound attribute.
    pub fn set_vertex_buffer(
        &mut self,
        buffer: Option<&VertexBuffer>,
        stream: usize,
    ) -> Result<(), GraphicsError> {
        if stream >= MAX_VERTEX_STREAMS {
            return Err(GraphicsError::InvalidParameter(format!(
                "vertex stream {stream} out of range"
            )));
        }
        let unchanged = match (&self.vertex_buffers[stream], buffer) {
            (Some(current), Some(next)) => current.ptr_eq(next),
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return Ok(());
        }

        if let Some(previous) = self.vertex_buffers[stream].take() {
            for element in previous.format().elements() {
                let still_present = buffer.is_some_and(|b| b.format().has(element.semantic));
                if !still_present {
                    self.semantic_ids[element.semantic as usize].clear();
                }
            }
        }
        if let Some(buffer) = buffer {
            self.ensure_buffer(buffer.inner(), BufferTarget::Vertex)?;
            for element in buffer.format().elements() {
                self.semantic_ids[element.semantic as usize].set(VertexBinding {
                    buffer: buffer.clone(),
                    element: *element,
                });
            }
        }
        self.vertex_buffers[stream] = buffer.cloned();
        self.attributes_invalidated = true;
        Ok(())
    }

    pub fn set_index_buffer(&mut self, buffer: Option<&IndexBuffer>) -> Result<(), GraphicsError> {
        let unchanged = match (&self.index_buffer, buffer) {
            (Some(current), Some(next)) => current.ptr_eq(next),
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return Ok(());
        }
        let handle = match buffer {
            Some(buffer) => Some(self.ensure_buffer(buffer.inner(), BufferTarget::Index)?),
            None => None,
        };
        self.bind_buffer(BufferTarget::Index, handle);
        self.index_buffer = buffer.cloned();
        Ok(())
    }

    /// Re-upload bound buffers whose data changed while they stayed bound.
    fn refresh_bound_buffers(&mut self) -> Result<(), GraphicsError> {
        for stream in 0..MAX_VERTEX_STREAMS {
            let Some(buffer) = self.vertex_buffers[stream].clone() else {
                continue;
            };
            if buffer.state() != ResourceState::Clean {
                self.ensure_buffer(buffer.inner(), BufferTarget::Vertex)?;
            }
        }
        if let Some(buffer) = self.index_buffer.clone() {
            if buffer.state() != ResourceState::Clean {
                let handle = self.ensure_buffer(buffer.inner(), BufferTarget::Index)?;
                self.bind_buffer(BufferTarget::Index, Some(handle));
            }
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Shaders and draws
    // -------------------------------------------------------------------------

    /// Make `shader` current. Returns true if the program changed.
    pub fn set_shader(&mut self, shader: Option<&Arc<Shader>>) -> bool {
        let unchanged = match (&self.shader, shader) {
            (Some(current), Some(next)) => Arc::ptr_eq(current, next),
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return false;
        }
        self.context.use_program(shader.map(|s| s.program()));
        self.shader = shader.cloned();
        self.attributes_invalidated = true;
        self.stats.shader_switches += 1;
        true
    }

    pub fn shader(&self) -> Option<&Arc<Shader>> {
        self.shader.as_ref()
    }

    pub fn index_buffer(&self) -> Option<&IndexBuffer> {
        self.index_buffer.as_ref()
    }

    /// Issue a draw with the current shader, buffers and scope values.
    ///
    /// `instances == 0` draws without instancing. Attributes are rebound
    /// only if the shader, a vertex buffer or the instancing mode changed
    /// since the previous draw.
    pub fn draw(&mut self, primitive: &Primitive, instances: u32) -> Result<(), GraphicsError> {
        profile_scope!("device_draw");

        let Some(shader) = self.shader.clone() else {
            return Err(GraphicsError::ResourceMismatch("no shader bound".into()));
        };
        let index_format = match (primitive.indexed, &self.index_buffer) {
            (true, Some(buffer)) => Some(buffer.format()),
            (true, None) => {
                return Err(GraphicsError::ResourceMismatch(
                    "indexed draw without an index buffer".into(),
                ));
            }
            (false, _) => None,
        };

        self.refresh_bound_buffers()?;

        let instancing = instances > 0;
        if instancing != self.instancing {
            self.instancing = instancing;
            self.attributes_invalidated = true;
        }
        if self.attributes_invalidated {
            self.bind_attributes(&shader);
            self.attributes_invalidated = false;
        }

        self.commit_samplers(&shader);
        self.commit_uniforms(&shader);

        self.context.draw(primitive, index_format, instances);
        self.stats.draw_calls += 1;
        Ok(())
    }

    fn bind_attributes(&mut self, shader: &Shader) {
        let mut used = HashSet::with_capacity(shader.attributes().len());
        for attribute in shader.attributes() {
            let location = attribute.location();
            let binding = attribute.scope_id().with_value(|value| match value {
                Some(UniformValue::Vertex(binding)) => Some(binding.clone()),
                _ => None,
            });
            let Some(binding) = binding else {
                log::trace!(
                    "Attribute {} has no vertex data, left unbound",
                    attribute.scope_id().name()
                );
                continue;
            };
            let handle = match self.ensure_buffer(binding.buffer.inner(), BufferTarget::Vertex) {
                Ok(handle) => handle,
                Err(err) => {
                    log::warn!("Vertex buffer upload failed: {err}");
                    continue;
                }
            };
            self.bind_buffer(BufferTarget::Vertex, Some(handle));
            self.context.enable_attribute(location, &binding.element);
            self.state.enabled_attributes.insert(location);
            used.insert(location);

            if self.capabilities.instancing {
                let divisor = u32::from(self.instancing && binding.buffer.format().is_instanced());
                self.set_attribute_divisor(location, divisor);
            }
        }

        let stale: Vec<_> = self
            .state
            .enabled_attributes
            .iter()
            .filter(|location| !used.contains(*location))
            .copied()
            .collect();
        for location in stale {
            self.context.disable_attribute(location);
            self.state.enabled_attributes.remove(&location);
        }
    }

    fn set_attribute_divisor(&mut self, location: AttributeLocation, divisor: u32) {
        let divisors = &mut self.state.attribute_divisors;
        match divisors.iter_mut().find(|(loc, _)| *loc == location) {
            Some((_, current)) if *current == divisor => return,
            Some((_, current)) => *current = divisor,
            None if divisor == 0 => {
                divisors.push((location, 0));
                return;
            }
            None => divisors.push((location, divisor)),
        }
        self.context.set_attribute_divisor(location, divisor);
    }

    fn commit_samplers(&mut self, shader: &Shader) {
        let mut next_unit = 0u32;
        for sampler in shader.samplers() {
            let textures = sampler.scope_id().with_value(|value| match value {
                Some(UniformValue::Texture(texture)) => vec![texture.clone()],
                Some(UniformValue::TextureArray(textures)) => textures.clone(),
                _ => Vec::new(),
            });
            if textures.is_empty() {
                log::trace!("Sampler {} has no texture", sampler.scope_id().name());
                continue;
            }

            let mut units = Vec::with_capacity(textures.len());
            for texture in &textures {
                if let Err(err) = self.set_texture(texture, next_unit) {
                    log::warn!("Sampler {}: {err}", sampler.scope_id().name());
                    break;
                }
                units.push(next_unit);
                next_unit += 1;
            }
            if sampler.swap_units(&units) {
                self.context.set_sampler_units(sampler.location(), &units);
                self.stats.uniform_uploads += 1;
            }
        }
    }

    fn commit_uniforms(&mut self, shader: &Shader) {
        for uniform in shader.uniforms() {
            let version = uniform.scope_id().version();
            if uniform.committed() == version {
                continue;
            }
            let context = &mut self.context;
            let uploaded = uniform.scope_id().with_value(|value| match value {
                Some(value) => {
                    context.set_uniform(uniform.location(), value);
                    true
                }
                None => false,
            });
            if uploaded {
                uniform.commit(version);
                self.stats.uniform_uploads += 1;
            }
        }
    }
}

impl std::fmt::Debug for GraphicsDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphicsDevice")
            .field("id", &self.id)
            .field("context", &self.context.name())
            .field("generation", &self.generation)
            .field("programs", &self.programs.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_device() -> (GraphicsDevice, Arc<ContextMonitor>) {
        let context = DummyContext::new();
        let monitor = context.monitor();
        let device = GraphicsDevice::new(Box::new(context), DeviceConfig::default()).unwrap();
        (device, monitor)
    }

    #[test]
    fn test_unsupported_environment() {
        let mut caps = DeviceCapabilities::minimal();
        caps.max_texture_units = 4;
        let result = GraphicsDevice::new(
            Box::new(DummyContext::with_capabilities(caps)),
            DeviceConfig::default(),
        );
        assert!(matches!(result, Err(GraphicsError::Unsupported(_))));
    }

    #[test]
    fn test_missing_optional_features_are_not_errors() {
        let result = GraphicsDevice::new(
            Box::new(DummyContext::with_capabilities(DeviceCapabilities::minimal())),
            DeviceConfig::default(),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_depth_test_elided() {
        let (mut device, monitor) = create_test_device();
        device.set_depth_test(true);
        device.set_depth_test(true);
        assert_eq!(monitor.calls("set_depth_test"), 1);
        device.set_depth_test(false);
        assert_eq!(monitor.calls("set_depth_test"), 2);
    }

    #[test]
    fn test_blend_mode_elided() {
        let (mut device, monitor) = create_test_device();
        device.set_blend_mode(BlendMode::Normal);
        device.set_blend_mode(BlendMode::Normal);
        assert_eq!(monitor.calls("set_blending"), 1);
        assert_eq!(monitor.calls("set_blend_func"), 1);
        assert_eq!(monitor.calls("set_blend_equation"), 1);

        device.set_blend_mode(BlendMode::None);
        assert_eq!(monitor.calls("set_blending"), 2);
        assert_eq!(monitor.calls("set_blend_func"), 1);
    }

    #[test]
    fn test_viewport_and_scissor_elided() {
        let (mut device, monitor) = create_test_device();
        let rect = Rect::new(0, 0, 640, 480);
        device.set_viewport(rect);
        device.set_viewport(rect);
        device.set_scissor(rect);
        device.set_scissor(rect);
        assert_eq!(monitor.calls("set_viewport"), 1);
        assert_eq!(monitor.calls("set_scissor"), 1);
    }

    #[test]
    fn test_clear_enables_writes() {
        let (mut device, monitor) = create_test_device();
        device.set_depth_write(false);
        device.clear(&ClearOptions::default());
        device.clear(&ClearOptions::default());
        assert_eq!(monitor.calls("clear"), 2);
        assert_eq!(monitor.calls("set_clear_color"), 1);
        assert_eq!(monitor.calls("set_depth_write"), 2);
    }

    #[test]
    fn test_texture_uploaded_once() {
        let (mut device, monitor) = create_test_device();
        let texture = device.create_texture(TextureDescriptor::new_2d(4, 4, PixelFormat::Rgba8));
        texture.set_level(0, 0, vec![0; 64]);
        assert_eq!(texture.state(), ResourceState::Dirty);

        device.set_texture(&texture, 0).unwrap();
        device.set_texture(&texture, 0).unwrap();
        assert_eq!(texture.state(), ResourceState::Clean);
        assert_eq!(monitor.calls("upload_texture"), 1);
        assert_eq!(monitor.calls("bind_texture"), 1);
        assert_eq!(monitor.calls("set_sampler_param"), 5);
    }

    #[test]
    fn test_switching_resident_textures_is_cheap() {
        let (mut device, monitor) = create_test_device();
        let a = device.create_texture(TextureDescriptor::new_2d(4, 4, PixelFormat::Rgba8));
        let b = device.create_texture(TextureDescriptor::new_2d(4, 4, PixelFormat::Rgba8));
        device.set_texture(&a, 0).unwrap();
        device.set_texture(&b, 0).unwrap();
        monitor.reset();

        device.set_texture(&a, 0).unwrap();
        device.set_texture(&b, 0).unwrap();
        assert_eq!(monitor.calls("upload_texture"), 0);
        assert_eq!(monitor.calls("set_sampler_param"), 0);
        assert_eq!(monitor.calls("bind_texture"), 2);
    }

    #[test]
    fn test_sampler_params_tracked_per_field() {
        let (mut device, monitor) = create_test_device();
        let texture = device.create_texture(TextureDescriptor::new_2d(4, 4, PixelFormat::Rgba8));
        device.set_texture(&texture, 0).unwrap();
        monitor.reset();

        texture.set_min_filter(FilterMode::Nearest);
        device.set_texture(&texture, 0).unwrap();
        assert_eq!(monitor.calls("set_sampler_param"), 1);
        assert_eq!(monitor.calls("upload_texture"), 0);
    }

    #[test]
    fn test_anisotropy_clamped() {
        let context = DummyContext::new();
        let monitor = context.monitor();
        let mut device = GraphicsDevice::new(
            Box::new(context),
            DeviceConfig::default().with_max_anisotropy(4.0),
        )
        .unwrap();
        let texture = device.create_texture(TextureDescriptor::new_2d(4, 4, PixelFormat::Rgba8));
        texture.set_anisotropy(4.0);
        device.set_texture(&texture, 0).unwrap();
        monitor.reset();
        texture.set_anisotropy(64.0);
        device.set_texture(&texture, 0).unwrap();
        assert_eq!(monitor.calls("set_sampler_param"), 0);
    }

    #[test]
    fn test_render_target_elided() {
        let (mut device, monitor) = create_test_device();
        let color = device.create_texture(TextureDescriptor::new_2d(64, 64, PixelFormat::Rgba8));
        let target = device.create_render_target(Some(color), None, true).unwrap();
        device.set_render_target(Some(&target)).unwrap();
        device.set_render_target(Some(&target)).unwrap();
        assert_eq!(monitor.calls("bind_framebuffer"), 1);
        assert_eq!(monitor.calls("create_framebuffer"), 1);
        device.set_render_target(None).unwrap();
        assert_eq!(monitor.calls("bind_framebuffer"), 2);
    }

    #[test]
    fn test_cubemap_face_validation() {
        let (mut device, _) = create_test_device();
        let color = device.create_texture(TextureDescriptor::new_2d(64, 64, PixelFormat::Rgba8));
        assert!(device.create_render_target(Some(color), Some(0), true).is_err());
    }

    #[test]
    fn test_vertex_buffer_publishes_semantics() {
        let (mut device, _) = create_test_device();
        let format = Arc::new(VertexFormat::position_normal_uv());
        let buffer = device.create_vertex_buffer(format, 3, BufferUsage::Static);
        device.set_vertex_buffer(Some(&buffer), 0).unwrap();

        let position = device.scope().resolve("vertex_position");
        assert!(matches!(position.value(), Some(UniformValue::Vertex(_))));
        assert_eq!(buffer.state(), ResourceState::Clean);

        device.set_vertex_buffer(None, 0).unwrap();
        assert!(position.value().is_none());
    }

    #[test]
    fn test_draw_without_shader_is_rejected() {
        let (mut device, monitor) = create_test_device();
        let result = device.draw(&Primitive::triangles(3), 0);
        assert!(matches!(result, Err(GraphicsError::ResourceMismatch(_))));
        assert_eq!(monitor.calls("draw"), 0);
    }

    #[test]
    fn test_context_loss_resets_state() {
        let (mut device, monitor) = create_test_device();
        let texture = device.create_texture(TextureDescriptor::new_2d(4, 4, PixelFormat::Rgba8));
        device.set_texture(&texture, 0).unwrap();
        device.set_depth_test(true);

        monitor.lose_context();
        assert_eq!(device.update_begin(), Err(GraphicsError::ContextLost));
        assert_eq!(device.update_begin(), Err(GraphicsError::ContextLost));
        assert_eq!(device.generation(), 1);
        assert_eq!(texture.state(), ResourceState::Dirty);

        monitor.restore_context();
        assert!(device.update_begin().is_ok());
        monitor.reset();
        device.set_depth_test(true);
        device.set_texture(&texture, 0).unwrap();
        assert_eq!(monitor.calls("set_depth_test"), 1);
        assert_eq!(monitor.calls("create_texture"), 1);
        assert_eq!(monitor.calls("upload_texture"), 1);
    }
}
