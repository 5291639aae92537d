//! Vertex and index buffers.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::context::BufferHandle;
use super::resource::{GpuResource, GpuSlot, ResourceState, next_resource_id};

// =============================================================================
// Vertex format
// =============================================================================

/// Meaning of a vertex element. Each maps to one shader attribute name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VertexSemantic {
    Position,
    Normal,
    Tangent,
    BlendWeight,
    BlendIndices,
    Color,
    TexCoord0,
    TexCoord1,
    InstanceLine1,
    InstanceLine2,
    InstanceLine3,
    InstanceLine4,
}

impl VertexSemantic {
    /// Attribute name used by generated shaders and the scope.
    pub fn attribute_name(self) -> &'static str {
        match self {
            Self::Position => "vertex_position",
            Self::Normal => "vertex_normal",
            Self::Tangent => "vertex_tangent",
            Self::BlendWeight => "vertex_boneWeights",
            Self::BlendIndices => "vertex_boneIndices",
            Self::Color => "vertex_color",
            Self::TexCoord0 => "vertex_texCoord0",
            Self::TexCoord1 => "vertex_texCoord1",
            Self::InstanceLine1 => "instance_line1",
            Self::InstanceLine2 => "instance_line2",
            Self::InstanceLine3 => "instance_line3",
            Self::InstanceLine4 => "instance_line4",
        }
    }

    /// All semantics, in declaration order.
    pub const ALL: [Self; 12] = [
        Self::Position,
        Self::Normal,
        Self::Tangent,
        Self::BlendWeight,
        Self::BlendIndices,
        Self::Color,
        Self::TexCoord0,
        Self::TexCoord1,
        Self::InstanceLine1,
        Self::InstanceLine2,
        Self::InstanceLine3,
        Self::InstanceLine4,
    ];
}

/// Component type of a vertex element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexDataType {
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Float32,
}

impl VertexDataType {
    pub fn size(self) -> u32 {
        match self {
            Self::Int8 | Self::Uint8 => 1,
            Self::Int16 | Self::Uint16 => 2,
            Self::Int32 | Self::Uint32 | Self::Float32 => 4,
        }
    }
}

/// Description of one element, before offsets are assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexElementDesc {
    pub semantic: VertexSemantic,
    pub components: u8,
    pub data_type: VertexDataType,
    pub normalize: bool,
}

impl VertexElementDesc {
    pub fn new(semantic: VertexSemantic, components: u8, data_type: VertexDataType) -> Self {
        Self {
            semantic,
            components,
            data_type,
            normalize: false,
        }
    }

    pub fn normalized(mut self) -> Self {
        self.normalize = true;
        self
    }
}

/// One element of an interleaved vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexElement {
    pub semantic: VertexSemantic,
    pub components: u8,
    pub data_type: VertexDataType,
    pub normalize: bool,
    pub offset: u32,
    pub stride: u32,
}

/// Layout of an interleaved vertex buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexFormat {
    elements: Vec<VertexElement>,
    size: u32,
    instanced: bool,
}

impl VertexFormat {
    /// Interleave `descs` in order, each element 4-byte aligned.
    pub fn interleaved(descs: &[VertexElementDesc]) -> Self {
        let mut offset = 0;
        let mut elements = Vec::with_capacity(descs.len());
        for desc in descs {
            elements.push(VertexElement {
                semantic: desc.semantic,
                components: desc.components,
                data_type: desc.data_type,
                normalize: desc.normalize,
                offset,
                stride: 0,
            });
            let bytes = desc.components as u32 * desc.data_type.size();
            offset += (bytes + 3) & !3;
        }
        for element in &mut elements {
            element.stride = offset;
        }
        Self {
            elements,
            size: offset,
            instanced: false,
        }
    }

    /// Standard position/normal/uv layout.
    pub fn position_normal_uv() -> Self {
        Self::interleaved(&[
            VertexElementDesc::new(VertexSemantic::Position, 3, VertexDataType::Float32),
            VertexElementDesc::new(VertexSemantic::Normal, 3, VertexDataType::Float32),
            VertexElementDesc::new(VertexSemantic::TexCoord0, 2, VertexDataType::Float32),
        ])
    }

    /// Per-instance world matrix, one row per element.
    pub fn instance_matrices() -> Self {
        Self::interleaved(&[
            VertexElementDesc::new(VertexSemantic::InstanceLine1, 4, VertexDataType::Float32),
            VertexElementDesc::new(VertexSemantic::InstanceLine2, 4, VertexDataType::Float32),
            VertexElementDesc::new(VertexSemantic::InstanceLine3, 4, VertexDataType::Float32),
            VertexElementDesc::new(VertexSemantic::InstanceLine4, 4, VertexDataType::Float32),
        ])
        .with_instancing(true)
    }

    /// Mark this format as advancing once per instance.
    pub fn with_instancing(mut self, instanced: bool) -> Self {
        self.instanced = instanced;
        self
    }

    pub fn elements(&self) -> &[VertexElement] {
        &self.elements
    }

    /// Vertex size in bytes.
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn is_instanced(&self) -> bool {
        self.instanced
    }

    pub fn has(&self, semantic: VertexSemantic) -> bool {
        self.elements.iter().any(|e| e.semantic == semantic)
    }
}

// =============================================================================
// Buffers
// =============================================================================

/// Expected update frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BufferUsage {
    #[default]
    Static,
    Dynamic,
    Stream,
}

pub(crate) struct BufferInner<M> {
    id: u64,
    meta: M,
    count: u32,
    pub(crate) usage: BufferUsage,
    pub(crate) data: RwLock<Vec<u8>>,
    pub(crate) gpu: Mutex<GpuSlot<BufferHandle>>,
}

impl<M: Send + Sync> GpuResource for BufferInner<M> {
    fn invalidate(&self) {
        self.gpu.lock().invalidate();
    }
}

impl<M> BufferInner<M> {
    fn new(meta: M, count: u32, usage: BufferUsage, byte_len: usize) -> Self {
        Self {
            id: next_resource_id(),
            meta,
            count,
            usage,
            data: RwLock::new(vec![0; byte_len]),
            gpu: Mutex::new(GpuSlot::new()),
        }
    }

    fn write(&self, bytes: &[u8]) {
        let mut data = self.data.write();
        let len = bytes.len().min(data.len());
        data[..len].copy_from_slice(&bytes[..len]);
        self.gpu.lock().mark_dirty();
    }
}

macro_rules! buffer_common {
    ($name:ident) => {
        impl $name {
            /// Process-unique identity.
            pub fn id(&self) -> u64 {
                self.inner.id
            }

            pub fn usage(&self) -> BufferUsage {
                self.inner.usage
            }

            /// Copy `bytes` into the CPU-side storage and mark the buffer dirty.
            pub fn set_data(&self, bytes: &[u8]) {
                self.inner.write(bytes);
            }

            /// Typed variant of [`Self::set_data`].
            pub fn write<T: bytemuck::Pod>(&self, items: &[T]) {
                self.inner.write(bytemuck::cast_slice(items));
            }

            /// Run `f` against the CPU-side bytes.
            pub fn with_data<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
                f(&self.inner.data.read())
            }

            /// Current upload state.
            pub fn state(&self) -> ResourceState {
                self.inner.gpu.lock().state
            }

            pub(crate) fn inner(&self) -> &Arc<BufferInner<<Self as BufferMeta>::Meta>> {
                &self.inner
            }

            pub fn ptr_eq(&self, other: &Self) -> bool {
                Arc::ptr_eq(&self.inner, &other.inner)
            }
        }
    };
}

pub(crate) trait BufferMeta {
    type Meta;
}

/// Vertex data in one interleaved [`VertexFormat`].
#[derive(Clone)]
pub struct VertexBuffer {
    inner: Arc<BufferInner<Arc<VertexFormat>>>,
}

impl BufferMeta for VertexBuffer {
    type Meta = Arc<VertexFormat>;
}

buffer_common!(VertexBuffer);

impl VertexBuffer {
    pub(crate) fn new(format: Arc<VertexFormat>, num_vertices: u32, usage: BufferUsage) -> Self {
        let byte_len = format.size() as usize * num_vertices as usize;
        Self {
            inner: Arc::new(BufferInner::new(format, num_vertices, usage, byte_len)),
        }
    }

    pub fn format(&self) -> &Arc<VertexFormat> {
        &self.inner.meta
    }

    pub fn num_vertices(&self) -> u32 {
        self.inner.count
    }
}

impl std::fmt::Debug for VertexBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VertexBuffer")
            .field("id", &self.inner.id)
            .field("num_vertices", &self.inner.count)
            .field("vertex_size", &self.inner.meta.size())
            .finish()
    }
}

/// Width of one index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IndexFormat {
    Uint8,
    #[default]
    Uint16,
    Uint32,
}

impl IndexFormat {
    pub fn size(self) -> u32 {
        match self {
            Self::Uint8 => 1,
            Self::Uint16 => 2,
            Self::Uint32 => 4,
        }
    }
}

/// Index data.
#[derive(Clone)]
pub struct IndexBuffer {
    inner: Arc<BufferInner<IndexFormat>>,
}

impl BufferMeta for IndexBuffer {
    type Meta = IndexFormat;
}

buffer_common!(IndexBuffer);

impl IndexBuffer {
    pub(crate) fn new(format: IndexFormat, num_indices: u32, usage: BufferUsage) -> Self {
        let byte_len = format.size() as usize * num_indices as usize;
        Self {
            inner: Arc::new(BufferInner::new(format, num_indices, usage, byte_len)),
        }
    }

    pub fn format(&self) -> IndexFormat {
        self.inner.meta
    }

    pub fn num_indices(&self) -> u32 {
        self.inner.count
    }
}

impl std::fmt::Debug for IndexBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexBuffer")
            .field("id", &self.inner.id)
            .field("format", &self.inner.meta)
            .field("num_indices", &self.inner.count)
            .finish()
    }
}

static_assertions::assert_impl_all!(VertexBuffer: Send, Sync);
static_assertions::assert_impl_all!(IndexBuffer: Send, Sync);
