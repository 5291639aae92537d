//! Uniform change tracking.
//!
//! A [`ScopeSpace`] maps names to [`ScopeId`] bindings. The renderer writes
//! values into bindings, compiled shaders read them back at draw time and
//! compare each binding's [`Version`] against the version they last
//! uploaded, so unchanged values never reach the graphics context twice.

mod space;
mod value;
mod version;

pub use space::{ScopeId, ScopeSpace};
pub use value::{UniformValue, VertexBinding};
pub use version::{Version, VersionedObject};
