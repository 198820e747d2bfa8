//! Data values carried by data slots
//!
//! A data slot holds one typed value. Providers expose theirs to other
//! scenes through data links; consumers fall back to their own value when
//! no link is bound.

use crate::resource::ResourceContentHash;
use serde::{Deserialize, Serialize};

/// A value stored in a data slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataValue {
    /// Scalar float
    Float(f32),
    /// Scalar integer
    Int(i32),
    /// 2D vector
    Vec2([f32; 2]),
    /// 3D vector
    Vec3([f32; 3]),
    /// 4D vector / color
    Vec4([f32; 4]),
    /// 4x4 matrix (column-major), used by transformation slots
    Mat4([f32; 16]),
    /// Reference to a texture resource, used by texture slots
    Texture(ResourceContentHash),
}

/// The type of a [`DataValue`], used for link compatibility checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataValueType {
    Float,
    Int,
    Vec2,
    Vec3,
    Vec4,
    Mat4,
    Texture,
}

impl DataValue {
    /// Identity transformation
    pub const IDENTITY: DataValue = DataValue::Mat4([
        1.0, 0.0, 0.0, 0.0,
        0.0, 1.0, 0.0, 0.0,
        0.0, 0.0, 1.0, 0.0,
        0.0, 0.0, 0.0, 1.0,
    ]);

    /// Get the type of this value
    pub fn value_type(&self) -> DataValueType {
        match self {
            Self::Float(_) => DataValueType::Float,
            Self::Int(_) => DataValueType::Int,
            Self::Vec2(_) => DataValueType::Vec2,
            Self::Vec3(_) => DataValueType::Vec3,
            Self::Vec4(_) => DataValueType::Vec4,
            Self::Mat4(_) => DataValueType::Mat4,
            Self::Texture(_) => DataValueType::Texture,
        }
    }

    /// Try to get as f32
    pub fn as_float(&self) -> Option<f32> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f32),
            _ => None,
        }
    }

    /// Try to get as a texture reference
    pub fn as_texture(&self) -> Option<ResourceContentHash> {
        match self {
            Self::Texture(hash) => Some(*hash),
            _ => None,
        }
    }

    /// Translation part of a transformation value
    pub fn translation(&self) -> Option<[f32; 3]> {
        match self {
            Self::Mat4(m) => Some([m[12], m[13], m[14]]),
            _ => None,
        }
    }

    /// Build a pure translation transformation
    pub fn translation_matrix(x: f32, y: f32, z: f32) -> Self {
        let mut m = [0.0; 16];
        m[0] = 1.0;
        m[5] = 1.0;
        m[10] = 1.0;
        m[15] = 1.0;
        m[12] = x;
        m[13] = y;
        m[14] = z;
        Self::Mat4(m)
    }
}

impl From<f32> for DataValue {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<i32> for DataValue {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<[f32; 2]> for DataValue {
    fn from(v: [f32; 2]) -> Self {
        Self::Vec2(v)
    }
}

impl From<[f32; 3]> for DataValue {
    fn from(v: [f32; 3]) -> Self {
        Self::Vec3(v)
    }
}

impl From<[f32; 4]> for DataValue {
    fn from(v: [f32; 4]) -> Self {
        Self::Vec4(v)
    }
}

impl std::fmt::Display for DataValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Float => "float",
            Self::Int => "int",
            Self::Vec2 => "vec2",
            Self::Vec3 => "vec3",
            Self::Vec4 => "vec4",
            Self::Mat4 => "mat4",
            Self::Texture => "texture",
        };
        f.write_str(name)
    }
}
