//! Per-device cache of compiled programs.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use xxhash_rust::xxh3::Xxh3;

use crate::device::{DeviceCapabilities, GraphicsContext};
use crate::error::GraphicsError;
use crate::profile_scope;
use crate::scope::ScopeSpace;

use super::basic::{BasicGenerator, BasicOptions};
use super::depth::{DepthGenerator, DepthOptions};
use super::program::{Shader, ShaderDefinition};
use super::standard::{StandardGenerator, StandardOptions};

// =============================================================================
// ShaderKey
// =============================================================================

/// Content-derived cache index of one program variant.
///
/// Computed from the generator name and the canonical options, never from
/// object identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderKey(pub u64);

impl ShaderKey {
    /// Hash a generator name together with the `Debug` form of its options.
    ///
    /// Derived `Debug` output lists every field, so any source-affecting
    /// field changes the key.
    pub fn compute(generator: &str, options: &impl Debug) -> Self {
        let mut hasher = Xxh3::new();
        hasher.update(generator.as_bytes());
        hasher.update(&[0]);
        hasher.update(format!("{options:?}").as_bytes());
        Self(hasher.digest())
    }
}

impl std::fmt::Display for ShaderKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

// =============================================================================
// Options / generators
// =============================================================================

/// Options for any built-in generator.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgramOptions {
    Standard(StandardOptions),
    Depth(DepthOptions),
    Basic(BasicOptions),
}

impl ProgramOptions {
    /// Options with every field that does not affect the source reset.
    pub fn canonical(&self) -> Self {
        match self {
            Self::Standard(options) => Self::Standard(options.canonical()),
            Self::Depth(options) => Self::Depth(options.canonical()),
            Self::Basic(options) => Self::Basic(options.canonical()),
        }
    }
}

impl From<StandardOptions> for ProgramOptions {
    fn from(options: StandardOptions) -> Self {
        Self::Standard(options)
    }
}

impl From<DepthOptions> for ProgramOptions {
    fn from(options: DepthOptions) -> Self {
        Self::Depth(options)
    }
}

impl From<BasicOptions> for ProgramOptions {
    fn from(options: BasicOptions) -> Self {
        Self::Basic(options)
    }
}

/// Produces shader source for one family of programs.
pub trait ShaderGenerator: Send + Sync {
    /// Name the generator is registered under.
    fn name(&self) -> &'static str;

    /// Cache key for `options`.
    fn key(&self, options: &ProgramOptions) -> ShaderKey {
        ShaderKey::compute(self.name(), &options.canonical())
    }

    /// Emit vertex and fragment source for `options`.
    fn create_definition(
        &self,
        capabilities: &DeviceCapabilities,
        options: &ProgramOptions,
    ) -> Result<ShaderDefinition, GraphicsError>;
}

// =============================================================================
// ProgramLibrary
// =============================================================================

/// Compiled programs of one device, keyed by [`ShaderKey`].
///
/// Failed variants are cached as `None` so a broken configuration is
/// reported once instead of recompiled every frame.
pub struct ProgramLibrary {
    generators: HashMap<&'static str, Arc<dyn ShaderGenerator>>,
    cache: HashMap<ShaderKey, Option<Arc<Shader>>>,
    log_source: bool,
    compiled: u64,
}

impl ProgramLibrary {
    /// Create a library with no generators.
    pub fn new(log_source: bool) -> Self {
        Self {
            generators: HashMap::new(),
            cache: HashMap::new(),
            log_source,
            compiled: 0,
        }
    }

    /// Create a library with the standard, depth and basic generators.
    pub fn with_builtin_generators(log_source: bool) -> Self {
        let mut library = Self::new(log_source);
        library.register(Arc::new(StandardGenerator));
        library.register(Arc::new(DepthGenerator));
        library.register(Arc::new(BasicGenerator));
        library
    }

    /// Register `generator` under its name, replacing any previous one.
    pub fn register(&mut self, generator: Arc<dyn ShaderGenerator>) {
        self.generators.insert(generator.name(), generator);
    }

    pub fn generator(&self, name: &str) -> Option<&Arc<dyn ShaderGenerator>> {
        self.generators.get(name)
    }

    /// Key the named generator assigns to `options`.
    pub fn key(&self, name: &str, options: &ProgramOptions) -> Option<ShaderKey> {
        self.generators.get(name).map(|g| g.key(options))
    }

    /// Return the cached program for `options`, compiling it on first use.
    ///
    /// Returns `None` if the generator is unknown or the variant failed to
    /// compile; callers skip the draw.
    pub fn get_program(
        &mut self,
        context: &mut dyn GraphicsContext,
        capabilities: &DeviceCapabilities,
        scope: &ScopeSpace,
        name: &str,
        options: &ProgramOptions,
    ) -> Option<Arc<Shader>> {
        let Some(generator) = self.generators.get(name).cloned() else {
            log::warn!("No shader generator registered as '{name}'");
            return None;
        };
        let key = generator.key(options);
        if let Some(cached) = self.cache.get(&key) {
            return cached.clone();
        }

        profile_scope!("compile_program");
        let result = generator
            .create_definition(capabilities, options)
            .and_then(|definition| Shader::compile(context, scope, &definition, self.log_source));
        let shader = match result {
            Ok(shader) => {
                self.compiled += 1;
                log::debug!(
                    "Compiled {} program {} ({} uniforms, {} samplers)",
                    name,
                    key,
                    shader.uniforms().len(),
                    shader.samplers().len()
                );
                Some(Arc::new(shader))
            }
            Err(err) => {
                log::error!("Program {name} {key} unavailable: {err}");
                None
            }
        };
        self.cache.insert(key, shader.clone());
        shader
    }

    /// Compile every listed variant ahead of use. Returns how many are
    /// available afterwards.
    pub fn precompile(
        &mut self,
        context: &mut dyn GraphicsContext,
        capabilities: &DeviceCapabilities,
        scope: &ScopeSpace,
        requests: &[(&str, ProgramOptions)],
    ) -> usize {
        let mut available = 0;
        for (name, options) in requests {
            if self
                .get_program(context, capabilities, scope, name, options)
                .is_some()
            {
                available += 1;
            }
        }
        available
    }

    /// Whether a result, successful or not, is cached for `key`.
    pub fn contains(&self, key: ShaderKey) -> bool {
        self.cache.contains_key(&key)
    }

    /// Number of cached variants, including failed ones.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Number of successfully compiled programs currently cached.
    pub fn program_count(&self) -> usize {
        self.cache.values().filter(|s| s.is_some()).count()
    }

    /// Number of cached programs produced by the named generator.
    pub fn program_count_for(&self, name: &str) -> usize {
        self.cache
            .values()
            .flatten()
            .filter(|s| s.generator() == name)
            .count()
    }

    /// Total compilations since creation.
    pub fn compiled_total(&self) -> u64 {
        self.compiled
    }

    /// Delete every program and empty the cache.
    pub fn clear(&mut self, context: &mut dyn GraphicsContext) {
        for shader in self.cache.drain().filter_map(|(_, s)| s) {
            context.delete_program(shader.program());
        }
    }

    /// Empty the cache without deleting anything. Used after context loss,
    /// when the handles are already gone.
    pub(crate) fn forget_all(&mut self) {
        self.cache.clear();
    }
}

impl std::fmt::Debug for ProgramLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut generators: Vec<_> = self.generators.keys().collect();
        generators.sort();
        f.debug_struct("ProgramLibrary")
            .field("generators", &generators)
            .field("cached", &self.cache.len())
            .field("compiled", &self.compiled)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DummyContext;

    fn setup() -> (DummyContext, DeviceCapabilities, ScopeSpace, ProgramLibrary) {
        let context = DummyContext::new();
        let caps = DeviceCapabilities::full();
        (
            context,
            caps,
            ScopeSpace::new("test"),
            ProgramLibrary::with_builtin_generators(true),
        )
    }

    #[test]
    fn test_key_is_content_derived() {
        let a = ShaderKey::compute("standard", &StandardOptions::default());
        let b = ShaderKey::compute("standard", &StandardOptions::default());
        let c = ShaderKey::compute("depth", &StandardOptions::default());
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_program_cached() {
        let (mut context, caps, scope, mut library) = setup();
        let monitor = context.monitor();
        let options = ProgramOptions::Basic(BasicOptions::default());

        let a = library
            .get_program(&mut context, &caps, &scope, "basic", &options)
            .unwrap();
        let b = library
            .get_program(&mut context, &caps, &scope, "basic", &options.clone())
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(monitor.calls("link_program"), 1);
        assert_eq!(library.program_count(), 1);
        assert_eq!(library.program_count_for("basic"), 1);
    }

    #[test]
    fn test_failed_compile_cached_as_none() {
        let (mut context, caps, scope, mut library) = setup();
        let monitor = context.monitor();
        monitor.fail_compiles_containing("gl_FragColor");
        let options = ProgramOptions::Basic(BasicOptions::default());

        assert!(
            library
                .get_program(&mut context, &caps, &scope, "basic", &options)
                .is_none()
        );
        assert!(
            library
                .get_program(&mut context, &caps, &scope, "basic", &options)
                .is_none()
        );
        assert_eq!(monitor.calls("compile_stage"), 2);
        assert_eq!(library.len(), 1);
        assert_eq!(library.program_count(), 0);
    }

    #[test]
    fn test_unknown_generator() {
        let (mut context, caps, scope, mut library) = setup();
        let options = ProgramOptions::Basic(BasicOptions::default());
        assert!(
            library
                .get_program(&mut context, &caps, &scope, "missing", &options)
                .is_none()
        );
        assert!(library.is_empty());
    }

    #[test]
    fn test_clear_deletes_programs() {
        let (mut context, caps, scope, mut library) = setup();
        let monitor = context.monitor();
        let requests = [
            ("basic", ProgramOptions::Basic(BasicOptions::default())),
            ("depth", ProgramOptions::Depth(DepthOptions::default())),
            ("standard", ProgramOptions::Standard(StandardOptions::default())),
        ];
        assert_eq!(library.precompile(&mut context, &caps, &scope, &requests), 3);
        library.clear(&mut context);
        assert_eq!(monitor.calls("delete_program"), 3);
        assert!(library.is_empty());
        assert_eq!(library.compiled_total(), 3);
    }
}
