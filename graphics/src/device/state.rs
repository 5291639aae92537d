//! Fixed-function pipeline state values.

use bitflags::bitflags;

// =============================================================================
// Blending
// =============================================================================

/// Source/destination blend factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
}

/// How source and destination are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendEquation {
    #[default]
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

/// Material-level blend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    /// Opaque.
    #[default]
    None,
    /// Classic alpha blending.
    Normal,
    Additive,
    /// Color already multiplied by alpha.
    Premultiplied,
    Multiplicative,
    AdditiveAlpha,
}

impl BlendMode {
    /// Blend factors for this mode, `None` if blending is disabled.
    pub fn factors(self) -> Option<(BlendFactor, BlendFactor)> {
        match self {
            Self::None => None,
            Self::Normal => Some((BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha)),
            Self::Additive => Some((BlendFactor::One, BlendFactor::One)),
            Self::Premultiplied => Some((BlendFactor::One, BlendFactor::OneMinusSrcAlpha)),
            Self::Multiplicative => Some((BlendFactor::DstColor, BlendFactor::Zero)),
            Self::AdditiveAlpha => Some((BlendFactor::SrcAlpha, BlendFactor::One)),
        }
    }

    /// Whether blending is enabled at all.
    pub fn is_blended(self) -> bool {
        self != Self::None
    }
}

// =============================================================================
// Depth / Cull
// =============================================================================

/// Depth comparison function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompareFunc {
    Never,
    Less,
    Equal,
    #[default]
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

/// Which faces are discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    None,
    #[default]
    Back,
    Front,
    FrontAndBack,
}

impl CullMode {
    /// Swap front and back, used when a camera mirrors its image.
    pub fn flipped(self) -> Self {
        match self {
            Self::Back => Self::Front,
            Self::Front => Self::Back,
            other => other,
        }
    }
}

bitflags! {
    /// Color channels written by draws.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ColorWrites: u8 {
        const RED = 1 << 0;
        const GREEN = 1 << 1;
        const BLUE = 1 << 2;
        const ALPHA = 1 << 3;
        const COLOR = Self::RED.bits() | Self::GREEN.bits() | Self::BLUE.bits();
        const ALL = Self::COLOR.bits() | Self::ALPHA.bits();
    }
}

impl Default for ColorWrites {
    fn default() -> Self {
        Self::ALL
    }
}

// =============================================================================
// Clear / Viewport
// =============================================================================

bitflags! {
    /// Buffers cleared by [`ClearOptions`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearFlags: u8 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

/// What to clear and to which values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearOptions {
    pub color: [f32; 4],
    pub depth: f32,
    pub flags: ClearFlags,
}

impl ClearOptions {
    pub fn new(color: [f32; 4]) -> Self {
        Self {
            color,
            ..Default::default()
        }
    }

    pub fn with_flags(mut self, flags: ClearFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_depth(mut self, depth: f32) -> Self {
        self.depth = depth;
        self
    }
}

impl Default for ClearOptions {
    fn default() -> Self {
        Self {
            color: [0.0, 0.0, 0.0, 1.0],
            depth: 1.0,
            flags: ClearFlags::COLOR | ClearFlags::DEPTH,
        }
    }
}

/// Pixel rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

// =============================================================================
// Primitives
// =============================================================================

/// Topology of a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveType {
    Points,
    Lines,
    LineStrip,
    #[default]
    Triangles,
    TriangleStrip,
    TriangleFan,
}

/// A range of vertices or indices to draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Primitive {
    pub kind: PrimitiveType,
    pub base: u32,
    pub count: u32,
    pub indexed: bool,
}

impl Primitive {
    /// Non-indexed triangle list.
    pub fn triangles(count: u32) -> Self {
        Self {
            kind: PrimitiveType::Triangles,
            base: 0,
            count,
            indexed: false,
        }
    }

    /// Indexed triangle list.
    pub fn indexed_triangles(count: u32) -> Self {
        Self {
            indexed: true,
            ..Self::triangles(count)
        }
    }

    /// One past the last element this primitive reads.
    pub fn end(&self) -> u32 {
        self.base.saturating_add(self.count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blend_factors() {
        assert_eq!(BlendMode::None.factors(), None);
        assert_eq!(
            BlendMode::Additive.factors(),
            Some((BlendFactor::One, BlendFactor::One))
        );
        assert!(BlendMode::AdditiveAlpha.is_blended());
        assert!(!BlendMode::None.is_blended());
    }

    #[test]
    fn test_cull_flip() {
        assert_eq!(CullMode::Back.flipped(), CullMode::Front);
        assert_eq!(CullMode::None.flipped(), CullMode::None);
    }

    #[test]
    fn test_clear_defaults() {
        let clear = ClearOptions::default();
        assert!(clear.flags.contains(ClearFlags::COLOR | ClearFlags::DEPTH));
        assert!(!clear.flags.contains(ClearFlags::STENCIL));
        assert_eq!(ColorWrites::default(), ColorWrites::ALL);
    }

    #[test]
    fn test_primitive_end() {
        let prim = Primitive {
            base: 6,
            ..Primitive::indexed_triangles(36)
        };
        assert_eq!(prim.end(), 42);
    }
}
