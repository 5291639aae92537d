//! Headless graphics context for testing and benchmarks.
//!
//! This context doesn't perform any GPU work but keeps enough bookkeeping
//! to behave like a real one: it hands out handles, introspects the
//! `attribute` and `uniform` declarations of compiled sources, and records
//! every call in a shared [`ContextMonitor`] so tests can verify exactly
//! which calls reached the context.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use glam::Mat4;
use parking_lot::Mutex;

use crate::error::GraphicsError;
use crate::scope::UniformValue;
use crate::shader::ShaderStage;

use super::buffer::{BufferUsage, IndexFormat, VertexElement};
use super::context::{
    ActiveAttribute, ActiveUniform, AttributeLocation, BufferHandle, BufferTarget,
    DeviceCapabilities, FramebufferColor, FramebufferHandle, GraphicsContext, ProgramHandle,
    StageHandle, TextureHandle, UniformKind, UniformLocation,
};
use super::state::{
    BlendEquation, BlendFactor, ClearFlags, ColorWrites, CompareFunc, CullMode, Primitive, Rect,
};
use super::texture::{SamplerParam, TextureData, TextureDescriptor};

/// One recorded draw.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecord {
    pub program: Option<ProgramHandle>,
    pub primitive: Primitive,
    pub instances: u32,
    /// Value of `matrix_model` at the time of the draw, if the program has one.
    pub model: Option<Mat4>,
}

/// Shared view into a [`DummyContext`], usable after the context moved into a device.
#[derive(Debug, Default)]
pub struct ContextMonitor {
    calls: Mutex<HashMap<&'static str, u64>>,
    uniform_uploads: Mutex<HashMap<String, u64>>,
    draws: Mutex<Vec<DrawRecord>>,
    lost: AtomicBool,
    fail_marker: Mutex<Option<String>>,
}

impl ContextMonitor {
    fn record(&self, call: &'static str) {
        *self.calls.lock().entry(call).or_insert(0) += 1;
    }

    /// How many times the named context method was called.
    pub fn calls(&self, call: &str) -> u64 {
        self.calls.lock().get(call).copied().unwrap_or(0)
    }

    /// Total number of context calls of any kind.
    pub fn total_calls(&self) -> u64 {
        self.calls.lock().values().sum()
    }

    /// How many times a value was uploaded to uniforms with this name.
    pub fn uniform_uploads(&self, name: &str) -> u64 {
        self.uniform_uploads.lock().get(name).copied().unwrap_or(0)
    }

    /// Every draw issued so far.
    pub fn draws(&self) -> Vec<DrawRecord> {
        self.draws.lock().clone()
    }

    /// Forget all recorded calls, uploads and draws.
    pub fn reset(&self) {
        self.calls.lock().clear();
        self.uniform_uploads.lock().clear();
        self.draws.lock().clear();
    }

    /// Make the context report itself as lost.
    pub fn lose_context(&self) {
        self.lost.store(true, Ordering::Release);
    }

    /// Make the context usable again after [`ContextMonitor::lose_context`].
    pub fn restore_context(&self) {
        self.lost.store(false, Ordering::Release);
    }

    /// Reject every shader stage whose source contains `marker`.
    pub fn fail_compiles_containing(&self, marker: impl Into<String>) {
        *self.fail_marker.lock() = Some(marker.into());
    }
}

#[derive(Debug, Default, Clone)]
struct Declarations {
    attributes: Vec<String>,
    uniforms: Vec<(String, UniformKind, u32)>,
}

impl Declarations {
    fn parse(source: &str) -> Self {
        let mut declarations = Self::default();
        for line in source.lines() {
            let line = line.trim();
            let Some(body) = line.strip_suffix(';') else {
                continue;
            };
            let tokens: Vec<&str> = body
                .split_whitespace()
                .filter(|t| !matches!(*t, "lowp" | "mediump" | "highp"))
                .collect();
            match tokens.as_slice() {
                ["attribute", _, name] => declarations.attributes.push((*name).to_owned()),
                ["uniform", ty, name] => {
                    let kind = match *ty {
                        "sampler2D" => UniformKind::Sampler2D,
                        "samplerCube" => UniformKind::SamplerCube,
                        _ => UniformKind::Value,
                    };
                    let (name, size) = match name.split_once('[') {
                        Some((base, rest)) => {
                            (base, rest.trim_end_matches(']').parse().unwrap_or(1))
                        }
                        None => (*name, 1),
                    };
                    declarations.uniforms.push((name.to_owned(), kind, size));
                }
                _ => {}
            }
        }
        declarations
    }
}

#[derive(Debug)]
struct ProgramInfo {
    attributes: Vec<ActiveAttribute>,
    uniforms: Vec<ActiveUniform>,
}

/// Headless [`GraphicsContext`].
pub struct DummyContext {
    capabilities: DeviceCapabilities,
    monitor: Arc<ContextMonitor>,
    next_handle: u32,
    stages: HashMap<u32, Declarations>,
    programs: HashMap<u32, ProgramInfo>,
    uniform_names: HashMap<u32, String>,
    uniform_values: HashMap<u32, UniformValue>,
    current_program: Option<ProgramHandle>,
}

impl DummyContext {
    /// Create a dummy context with every optional feature available.
    pub fn new() -> Self {
        Self::with_capabilities(DeviceCapabilities::full())
    }

    /// Create a dummy context reporting the given capabilities.
    pub fn with_capabilities(capabilities: DeviceCapabilities) -> Self {
        Self {
            capabilities,
            monitor: Arc::new(ContextMonitor::default()),
            next_handle: 1,
            stages: HashMap::new(),
            programs: HashMap::new(),
            uniform_names: HashMap::new(),
            uniform_values: HashMap::new(),
            current_program: None,
        }
    }

    /// Shared monitor recording this context's calls.
    pub fn monitor(&self) -> Arc<ContextMonitor> {
        self.monitor.clone()
    }

    /// Compiled stages not yet deleted.
    pub fn live_stages(&self) -> usize {
        self.stages.len()
    }

    fn allocate(&mut self) -> u32 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    fn current_model(&self) -> Option<Mat4> {
        let program = self.programs.get(&self.current_program?.0)?;
        let uniform = program.uniforms.iter().find(|u| u.name == "matrix_model")?;
        self.uniform_values.get(&uniform.location.0)?.as_mat4()
    }
}

impl Default for DummyContext {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphicsContext for DummyContext {
    fn name(&self) -> &'static str {
        "Dummy Context"
    }

    fn capabilities(&self) -> DeviceCapabilities {
        self.capabilities
    }

    fn is_context_lost(&self) -> bool {
        self.monitor.lost.load(Ordering::Acquire)
    }

    fn set_depth_test(&mut self, _enabled: bool) {
        self.monitor.record("set_depth_test");
    }

    fn set_depth_write(&mut self, _enabled: bool) {
        self.monitor.record("set_depth_write");
    }

    fn set_depth_func(&mut self, _func: CompareFunc) {
        self.monitor.record("set_depth_func");
    }

    fn set_cull_mode(&mut self, _mode: CullMode) {
        self.monitor.record("set_cull_mode");
    }

    fn set_blending(&mut self, _enabled: bool) {
        self.monitor.record("set_blending");
    }

    fn set_blend_func(&mut self, _src: BlendFactor, _dst: BlendFactor) {
        self.monitor.record("set_blend_func");
    }

    fn set_blend_equation(&mut self, _equation: BlendEquation) {
        self.monitor.record("set_blend_equation");
    }

    fn set_color_write(&mut self, _mask: ColorWrites) {
        self.monitor.record("set_color_write");
    }

    fn set_clear_color(&mut self, _color: [f32; 4]) {
        self.monitor.record("set_clear_color");
    }

    fn set_clear_depth(&mut self, _depth: f32) {
        self.monitor.record("set_clear_depth");
    }

    fn clear(&mut self, _flags: ClearFlags) {
        self.monitor.record("clear");
    }

    fn set_viewport(&mut self, _rect: Rect) {
        self.monitor.record("set_viewport");
    }

    fn set_scissor(&mut self, _rect: Rect) {
        self.monitor.record("set_scissor");
    }

    fn create_framebuffer(
        &mut self,
        _color: Option<FramebufferColor>,
        _depth: bool,
    ) -> Result<FramebufferHandle, GraphicsError> {
        self.monitor.record("create_framebuffer");
        Ok(FramebufferHandle(self.allocate()))
    }

    fn bind_framebuffer(&mut self, _framebuffer: Option<FramebufferHandle>) {
        self.monitor.record("bind_framebuffer");
    }

    fn delete_framebuffer(&mut self, _framebuffer: FramebufferHandle) {
        self.monitor.record("delete_framebuffer");
    }

    fn compile_stage(&mut self, stage: ShaderStage, source: &str) -> Result<StageHandle, String> {
        self.monitor.record("compile_stage");
        if let Some(marker) = self.monitor.fail_marker.lock().as_deref() {
            if source.contains(marker) {
                return Err(format!("ERROR: 0:1: '{marker}' : syntax error in {stage} stage"));
            }
        }
        let handle = self.allocate();
        self.stages.insert(handle, Declarations::parse(source));
        Ok(StageHandle(handle))
    }

    fn link_program(
        &mut self,
        vertex: StageHandle,
        fragment: StageHandle,
    ) -> Result<ProgramHandle, String> {
        self.monitor.record("link_program");
        let (Some(vs), Some(fs)) = (
            self.stages.get(&vertex.0).cloned(),
            self.stages.get(&fragment.0).cloned(),
        ) else {
            return Err("missing stage".into());
        };

        let mut attributes = Vec::new();
        for name in vs.attributes {
            let location = AttributeLocation(attributes.len() as u32);
            attributes.push(ActiveAttribute { name, location });
        }

        let mut uniforms: Vec<ActiveUniform> = Vec::new();
        for (name, kind, array_size) in vs.uniforms.into_iter().chain(fs.uniforms) {
            if uniforms.iter().any(|u| u.name == name) {
                continue;
            }
            let location = UniformLocation(self.allocate());
            self.uniform_names.insert(location.0, name.clone());
            uniforms.push(ActiveUniform {
                name,
                location,
                kind,
                array_size,
            });
        }

        let handle = self.allocate();
        self.programs
            .insert(handle, ProgramInfo { attributes, uniforms });
        Ok(ProgramHandle(handle))
    }

    fn delete_stage(&mut self, stage: StageHandle) {
        self.monitor.record("delete_stage");
        self.stages.remove(&stage.0);
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        self.monitor.record("delete_program");
        if let Some(info) = self.programs.remove(&program.0) {
            for uniform in info.uniforms {
                self.uniform_names.remove(&uniform.location.0);
                self.uniform_values.remove(&uniform.location.0);
            }
        }
    }

    fn active_attributes(&self, program: ProgramHandle) -> Vec<ActiveAttribute> {
        self.programs
            .get(&program.0)
            .map(|p| p.attributes.clone())
            .unwrap_or_default()
    }

    fn active_uniforms(&self, program: ProgramHandle) -> Vec<ActiveUniform> {
        self.programs
            .get(&program.0)
            .map(|p| p.uniforms.clone())
            .unwrap_or_default()
    }

    fn use_program(&mut self, program: Option<ProgramHandle>) {
        self.monitor.record("use_program");
        self.current_program = program;
    }

    fn set_uniform(&mut self, location: UniformLocation, value: &UniformValue) {
        self.monitor.record("set_uniform");
        if let Some(name) = self.uniform_names.get(&location.0) {
            *self
                .monitor
                .uniform_uploads
                .lock()
                .entry(name.clone())
                .or_insert(0) += 1;
        }
        self.uniform_values.insert(location.0, value.clone());
    }

    fn set_sampler_units(&mut self, location: UniformLocation, _units: &[u32]) {
        self.monitor.record("set_sampler_units");
        if let Some(name) = self.uniform_names.get(&location.0) {
            *self
                .monitor
                .uniform_uploads
                .lock()
                .entry(name.clone())
                .or_insert(0) += 1;
        }
    }

    fn create_texture(
        &mut self,
        descriptor: &TextureDescriptor,
    ) -> Result<TextureHandle, GraphicsError> {
        self.monitor.record("create_texture");
        log::trace!(
            "DummyContext: creating texture {:?} ({}x{})",
            descriptor.label,
            descriptor.width,
            descriptor.height
        );
        Ok(TextureHandle(self.allocate()))
    }

    fn upload_texture(
        &mut self,
        _texture: TextureHandle,
        _descriptor: &TextureDescriptor,
        _data: &TextureData,
    ) -> Result<(), GraphicsError> {
        self.monitor.record("upload_texture");
        Ok(())
    }

    fn set_sampler_param(&mut self, _texture: TextureHandle, _param: SamplerParam) {
        self.monitor.record("set_sampler_param");
    }

    fn bind_texture(&mut self, _unit: u32, _texture: Option<TextureHandle>, _cubemap: bool) {
        self.monitor.record("bind_texture");
    }

    fn delete_texture(&mut self, _texture: TextureHandle) {
        self.monitor.record("delete_texture");
    }

    fn create_buffer(&mut self, _target: BufferTarget) -> Result<BufferHandle, GraphicsError> {
        self.monitor.record("create_buffer");
        Ok(BufferHandle(self.allocate()))
    }

    fn upload_buffer(
        &mut self,
        _buffer: BufferHandle,
        _target: BufferTarget,
        _data: &[u8],
        _usage: BufferUsage,
    ) -> Result<(), GraphicsError> {
        self.monitor.record("upload_buffer");
        Ok(())
    }

    fn bind_buffer(&mut self, _target: BufferTarget, _buffer: Option<BufferHandle>) {
        self.monitor.record("bind_buffer");
    }

    fn delete_buffer(&mut self, _buffer: BufferHandle) {
        self.monitor.record("delete_buffer");
    }

    fn enable_attribute(&mut self, _location: AttributeLocation, _element: &VertexElement) {
        self.monitor.record("enable_attribute");
    }

    fn disable_attribute(&mut self, _location: AttributeLocation) {
        self.monitor.record("disable_attribute");
    }

    fn set_attribute_divisor(&mut self, _location: AttributeLocation, _divisor: u32) {
        self.monitor.record("set_attribute_divisor");
    }

    fn draw(&mut self, primitive: &Primitive, _index_format: Option<IndexFormat>, instances: u32) {
        self.monitor.record("draw");
        let record = DrawRecord {
            program: self.current_program,
            primitive: *primitive,
            instances,
            model: self.current_model(),
        };
        self.monitor.draws.lock().push(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VS: &str = "attribute vec3 vertex_position;\n\
                      uniform mat4 matrix_model;\n\
                      uniform mat4 matrix_pose[4];\n\
                      void main() { gl_Position = vec4(0.0); }\n";
    const FS: &str = "precision highp float;\n\
                      uniform highp sampler2D texture_diffuseMap;\n\
                      uniform samplerCube light0_shadowMap;\n\
                      uniform mat4 matrix_model;\n\
                      void main() {}\n";

    #[test]
    fn test_declarations_parse() {
        let decl = Declarations::parse(FS);
        assert!(decl.attributes.is_empty());
        assert_eq!(
            decl.uniforms,
            vec![
                ("texture_diffuseMap".into(), UniformKind::Sampler2D, 1),
                ("light0_shadowMap".into(), UniformKind::SamplerCube, 1),
                ("matrix_model".into(), UniformKind::Value, 1),
            ]
        );
        let decl = Declarations::parse(VS);
        assert_eq!(decl.attributes, vec!["vertex_position".to_string()]);
        assert_eq!(decl.uniforms[1], ("matrix_pose".into(), UniformKind::Value, 4));
    }

    #[test]
    fn test_link_merges_uniforms() {
        let mut ctx = DummyContext::new();
        let vs = ctx.compile_stage(ShaderStage::Vertex, VS).unwrap();
        let fs = ctx.compile_stage(ShaderStage::Fragment, FS).unwrap();
        let program = ctx.link_program(vs, fs).unwrap();
        let uniforms = ctx.active_uniforms(program);
        assert_eq!(uniforms.len(), 4);
        assert_eq!(ctx.active_attributes(program).len(), 1);
        assert_eq!(ctx.monitor().calls("compile_stage"), 2);
    }

    #[test]
    fn test_compile_failure_marker() {
        let mut ctx = DummyContext::new();
        ctx.monitor().fail_compiles_containing("BROKEN");
        assert!(ctx.compile_stage(ShaderStage::Fragment, "BROKEN").is_err());
        assert!(ctx.compile_stage(ShaderStage::Fragment, FS).is_ok());
    }

    #[test]
    fn test_uniform_uploads_counted_by_name() {
        let mut ctx = DummyContext::new();
        let vs = ctx.compile_stage(ShaderStage::Vertex, VS).unwrap();
        let fs = ctx.compile_stage(ShaderStage::Fragment, FS).unwrap();
        let program = ctx.link_program(vs, fs).unwrap();
        let model = ctx
            .active_uniforms(program)
            .into_iter()
            .find(|u| u.name == "matrix_model")
            .unwrap();
        ctx.use_program(Some(program));
        ctx.set_uniform(model.location, &UniformValue::Mat4(Mat4::IDENTITY));
        ctx.draw(&Primitive::triangles(3), None, 0);

        let monitor = ctx.monitor();
        assert_eq!(monitor.uniform_uploads("matrix_model"), 1);
        assert_eq!(monitor.draws()[0].model, Some(Mat4::IDENTITY));
    }

    #[test]
    fn test_context_loss_flag() {
        let ctx = DummyContext::new();
        let monitor = ctx.monitor();
        assert!(!ctx.is_context_lost());
        monitor.lose_context();
        assert!(ctx.is_context_lost());
        monitor.restore_context();
        assert!(!ctx.is_context_lost());
    }
}
