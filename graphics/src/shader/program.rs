//! Linked programs and their scope-bound inputs.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::device::{AttributeLocation, GraphicsContext, ProgramHandle, UniformLocation};
use crate::error::{GraphicsError, number_lines};
use crate::scope::{ScopeId, ScopeSpace, Version};

use super::ShaderStage;

/// Generated source for one program plus the metadata the renderer needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderDefinition {
    /// Name of the generator that produced the source.
    pub generator: String,
    pub vshader: String,
    pub fshader: String,
    /// Number of light uniform slots the source declares.
    pub light_count: usize,
}

/// One binding slot of a linked program, reading from a [`ScopeId`].
///
/// Remembers what was last committed for this program so unchanged scope
/// values are not uploaded again.
#[derive(Debug)]
pub struct ShaderInput<L> {
    scope_id: ScopeId,
    location: L,
    committed: AtomicU64,
    units: Mutex<Vec<u32>>,
}

impl<L: Copy> ShaderInput<L> {
    fn new(scope_id: ScopeId, location: L) -> Self {
        Self {
            scope_id,
            location,
            committed: AtomicU64::new(Version::NONE.pack()),
            units: Mutex::new(Vec::new()),
        }
    }

    pub fn scope_id(&self) -> &ScopeId {
        &self.scope_id
    }

    pub fn location(&self) -> L {
        self.location
    }

    /// Version of the scope value last uploaded through this input.
    pub fn committed(&self) -> Version {
        Version::unpack(self.committed.load(Ordering::Acquire))
    }

    pub fn commit(&self, version: Version) {
        self.committed.store(version.pack(), Ordering::Release);
    }

    /// Record the texture units of a sampler input. Returns true if they
    /// differ from the ones last sent to the program.
    pub fn swap_units(&self, units: &[u32]) -> bool {
        let mut current = self.units.lock();
        if current.as_slice() == units {
            return false;
        }
        current.clear();
        current.extend_from_slice(units);
        true
    }
}

/// A linked program.
///
/// Immutable after creation. Deleted by the [`ProgramLibrary`](super::ProgramLibrary)
/// that created it.
#[derive(Debug)]
pub struct Shader {
    program: ProgramHandle,
    generator: String,
    light_count: usize,
    attributes: Vec<ShaderInput<AttributeLocation>>,
    uniforms: Vec<ShaderInput<UniformLocation>>,
    samplers: Vec<ShaderInput<UniformLocation>>,
}

impl Shader {
    /// Compile and link `definition`, then bind every active input to the
    /// scope id of the same name.
    pub fn compile(
        context: &mut dyn GraphicsContext,
        scope: &ScopeSpace,
        definition: &ShaderDefinition,
        log_source: bool,
    ) -> Result<Self, GraphicsError> {
        let vertex = compile_stage(context, ShaderStage::Vertex, &definition.vshader, log_source)?;
        let fragment =
            match compile_stage(context, ShaderStage::Fragment, &definition.fshader, log_source) {
                Ok(fragment) => fragment,
                Err(err) => {
                    context.delete_stage(vertex);
                    return Err(err);
                }
            };
        let linked = context.link_program(vertex, fragment);
        context.delete_stage(vertex);
        context.delete_stage(fragment);
        let program = linked.map_err(|message| {
            log::error!(
                "Failed to link {} program: {}",
                definition.generator,
                message
            );
            GraphicsError::ProgramLink(message)
        })?;

        let attributes = context
            .active_attributes(program)
            .into_iter()
            .map(|attribute| ShaderInput::new(scope.resolve(&attribute.name), attribute.location))
            .collect();

        let mut uniforms = Vec::new();
        let mut samplers = Vec::new();
        for uniform in context.active_uniforms(program) {
            let input = ShaderInput::new(scope.resolve(&uniform.name), uniform.location);
            if uniform.kind.is_sampler() {
                samplers.push(input);
            } else {
                uniforms.push(input);
            }
        }

        Ok(Self {
            program,
            generator: definition.generator.clone(),
            light_count: definition.light_count,
            attributes,
            uniforms,
            samplers,
        })
    }

    pub fn program(&self) -> ProgramHandle {
        self.program
    }

    pub fn generator(&self) -> &str {
        &self.generator
    }

    pub fn light_count(&self) -> usize {
        self.light_count
    }

    pub fn attributes(&self) -> &[ShaderInput<AttributeLocation>] {
        &self.attributes
    }

    pub fn uniforms(&self) -> &[ShaderInput<UniformLocation>] {
        &self.uniforms
    }

    pub fn samplers(&self) -> &[ShaderInput<UniformLocation>] {
        &self.samplers
    }

    /// Whether the program reads the named input.
    pub fn has_input(&self, name: &str) -> bool {
        self.uniforms
            .iter()
            .chain(&self.samplers)
            .any(|input| input.scope_id.name() == name)
            || self
                .attributes
                .iter()
                .any(|input| input.scope_id.name() == name)
    }
}

fn compile_stage(
    context: &mut dyn GraphicsContext,
    stage: ShaderStage,
    source: &str,
    log_source: bool,
) -> Result<crate::device::StageHandle, GraphicsError> {
    context.compile_stage(stage, source).map_err(|message| {
        let listing = number_lines(source);
        if log_source {
            log::error!("Failed to compile {stage} shader:\n{message}\n{listing}");
        } else {
            log::error!("Failed to compile {stage} shader: {message}");
        }
        GraphicsError::ShaderCompilation {
            stage,
            message,
            listing,
        }
    })
}

static_assertions::assert_impl_all!(Shader: Send, Sync);
