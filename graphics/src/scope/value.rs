//! Payloads that can be stored in a scope binding.

use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};

use crate::device::{Texture, VertexBuffer, VertexElement};

/// One vertex stream element published for attribute binding.
#[derive(Debug, Clone)]
pub struct VertexBinding {
    pub buffer: VertexBuffer,
    pub element: VertexElement,
}

/// Value held by a [`ScopeId`](super::ScopeId).
#[derive(Debug, Clone)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat3(Mat3),
    Mat4(Mat4),
    FloatArray(Vec<f32>),
    Texture(Texture),
    TextureArray(Vec<Texture>),
    Vertex(VertexBinding),
}

impl UniformValue {
    /// Short type name for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Float(_) => "float",
            Self::Int(_) => "int",
            Self::Vec2(_) => "vec2",
            Self::Vec3(_) => "vec3",
            Self::Vec4(_) => "vec4",
            Self::Mat3(_) => "mat3",
            Self::Mat4(_) => "mat4",
            Self::FloatArray(_) => "float[]",
            Self::Texture(_) => "texture",
            Self::TextureArray(_) => "texture[]",
            Self::Vertex(_) => "vertex",
        }
    }

    /// Get the value as a 4x4 matrix, if it is one.
    pub fn as_mat4(&self) -> Option<Mat4> {
        match self {
            Self::Mat4(m) => Some(*m),
            _ => None,
        }
    }

    /// Get the value as a float, if it is one.
    pub fn as_float(&self) -> Option<f32> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }
}

macro_rules! impl_from_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for UniformValue {
                fn from(value: $ty) -> Self {
                    Self::$variant(value)
                }
            }
        )*
    };
}

impl_from_value! {
    f32 => Float,
    i32 => Int,
    Vec2 => Vec2,
    Vec3 => Vec3,
    Vec4 => Vec4,
    Mat3 => Mat3,
    Mat4 => Mat4,
    Vec<f32> => FloatArray,
    Texture => Texture,
    Vec<Texture> => TextureArray,
    VertexBinding => Vertex,
}

impl From<bool> for UniformValue {
    fn from(value: bool) -> Self {
        Self::Int(value as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_conversions() {
        assert_eq!(UniformValue::from(1.5f32).as_float(), Some(1.5));
        assert_eq!(UniformValue::from(Mat4::IDENTITY).as_mat4(), Some(Mat4::IDENTITY));
        assert!(matches!(UniformValue::from(true), UniformValue::Int(1)));
        assert_eq!(UniformValue::from(Vec3::ONE).kind(), "vec3");
    }
}
