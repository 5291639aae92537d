//! Hierarchical name to binding mapping.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::value::UniformValue;
use super::version::{Version, VersionedObject};

struct ScopeIdState {
    value: Option<UniformValue>,
    versioned: VersionedObject,
}

struct ScopeIdInner {
    name: String,
    state: RwLock<ScopeIdState>,
}

/// Handle to one named binding inside a [`ScopeSpace`].
///
/// Clones share the same binding. Setting a value always bumps the revision,
/// even if the new value equals the old one.
#[derive(Clone)]
pub struct ScopeId {
    inner: Arc<ScopeIdInner>,
}

impl ScopeId {
    fn new(name: &str) -> Self {
        Self {
            inner: Arc::new(ScopeIdInner {
                name: name.to_owned(),
                state: RwLock::new(ScopeIdState {
                    value: None,
                    versioned: VersionedObject::new(),
                }),
            }),
        }
    }

    /// Binding name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Store a new value and increment the revision.
    pub fn set(&self, value: impl Into<UniformValue>) {
        let mut state = self.inner.state.write();
        state.value = Some(value.into());
        state.versioned.increment();
    }

    /// Remove the current value. Counts as a mutation.
    pub fn clear(&self) {
        let mut state = self.inner.state.write();
        state.value = None;
        state.versioned.increment();
    }

    /// Clone of the current value.
    pub fn value(&self) -> Option<UniformValue> {
        self.inner.state.read().value.clone()
    }

    /// Run `f` against the current value without cloning it.
    pub fn with_value<R>(&self, f: impl FnOnce(Option<&UniformValue>) -> R) -> R {
        f(self.inner.state.read().value.as_ref())
    }

    /// Current version of this binding.
    pub fn version(&self) -> Version {
        self.inner.state.read().versioned.version()
    }

    /// Whether two handles refer to the same binding.
    pub fn ptr_eq(&self, other: &ScopeId) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for ScopeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("ScopeId")
            .field("name", &self.inner.name)
            .field("version", &state.versioned.version())
            .field("value", &state.value.as_ref().map(UniformValue::kind))
            .finish()
    }
}

/// Namespace of bindings plus nested child namespaces.
///
/// Written only by the render thread; reads from other threads between frames
/// are safe.
pub struct ScopeSpace {
    name: String,
    variables: RwLock<HashMap<String, ScopeId>>,
    namespaces: RwLock<HashMap<String, Arc<ScopeSpace>>>,
}

impl ScopeSpace {
    /// Create an empty space.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variables: RwLock::new(HashMap::new()),
            namespaces: RwLock::new(HashMap::new()),
        }
    }

    /// Space name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the binding for `name`, creating it on first use.
    pub fn resolve(&self, name: &str) -> ScopeId {
        if let Some(id) = self.variables.read().get(name) {
            return id.clone();
        }
        self.variables
            .write()
            .entry(name.to_owned())
            .or_insert_with(|| ScopeId::new(name))
            .clone()
    }

    /// Get the binding for `name` only if it was resolved before.
    pub fn find(&self, name: &str) -> Option<ScopeId> {
        self.variables.read().get(name).cloned()
    }

    /// Get the child space for `name`, creating it on first use.
    pub fn sub_space(&self, name: &str) -> Arc<ScopeSpace> {
        if let Some(space) = self.namespaces.read().get(name) {
            return space.clone();
        }
        self.namespaces
            .write()
            .entry(name.to_owned())
            .or_insert_with(|| Arc::new(ScopeSpace::new(name)))
            .clone()
    }

    /// Number of bindings in this space, not counting children.
    pub fn len(&self) -> usize {
        self.variables.read().len()
    }

    /// Whether this space holds no bindings.
    pub fn is_empty(&self) -> bool {
        self.variables.read().is_empty()
    }
}

impl std::fmt::Debug for ScopeSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeSpace")
            .field("name", &self.name)
            .field("variables", &self.variables.read().len())
            .field("namespaces", &self.namespaces.read().len())
            .finish()
    }
}

static_assertions::assert_impl_all!(ScopeId: Send, Sync);
static_assertions::assert_impl_all!(ScopeSpace: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_is_idempotent() {
        let space = ScopeSpace::new("root");
        let a = space.resolve("matrix_model");
        let b = space.resolve("matrix_model");
        assert!(a.ptr_eq(&b));
        assert_eq!(a.version(), b.version());
        assert_eq!(space.len(), 1);
    }

    #[test]
    fn test_distinct_names_are_distinct_bindings() {
        let space = ScopeSpace::new("root");
        let a = space.resolve("a");
        let b = space.resolve("b");
        assert!(!a.ptr_eq(&b));
        assert_ne!(a.version().global_id, b.version().global_id);
    }

    #[test]
    fn test_set_increments_revision_every_time() {
        let space = ScopeSpace::new("root");
        let id = space.resolve("alpha_ref");
        let start = id.version().revision;
        for _ in 0..5 {
            id.set(0.5f32);
        }
        assert_eq!(id.version().revision, start + 5);
    }

    #[test]
    fn test_set_visible_through_other_handle() {
        let space = ScopeSpace::new("root");
        space.resolve("exposure").set(2.0f32);
        let value = space.resolve("exposure").value();
        assert_eq!(value.and_then(|v| v.as_float()), Some(2.0));
    }

    #[test]
    fn test_clear_bumps_revision() {
        let space = ScopeSpace::new("root");
        let id = space.resolve("x");
        id.set(1.0f32);
        let before = id.version();
        id.clear();
        assert!(id.value().is_none());
        assert_eq!(id.version().revision, before.revision + 1);
    }

    #[test]
    fn test_sub_space_is_idempotent() {
        let space = ScopeSpace::new("root");
        let a = space.sub_space("material");
        let b = space.sub_space("material");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(a.resolve("x").ptr_eq(&b.resolve("x")));
        assert!(space.find("x").is_none());
    }
}
