//! Uniform values

use core::hash::{Hash, Hasher};
use serde::{Deserialize, Serialize};
use void_math::{Mat4, Vec3, Vec4};

/// A shader uniform value. Equality and hashing compare float payloads
/// bitwise.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub enum UniformValue {
    Int(i32),
    UInt(u32),
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Mat3([f32; 9]),
    Mat4([f32; 16]),
}

impl UniformValue {
    /// Raw bytes in native layout
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            UniformValue::Int(v) => bytemuck::bytes_of(v),
            UniformValue::UInt(v) => bytemuck::bytes_of(v),
            UniformValue::Float(v) => bytemuck::bytes_of(v),
            UniformValue::Vec2(v) => bytemuck::cast_slice(v),
            UniformValue::Vec3(v) => bytemuck::cast_slice(v),
            UniformValue::Vec4(v) => bytemuck::cast_slice(v),
            UniformValue::Mat3(v) => bytemuck::cast_slice(v),
            UniformValue::Mat4(v) => bytemuck::cast_slice(v),
        }
    }

    /// Size in bytes
    pub fn size(&self) -> usize {
        self.as_bytes().len()
    }

    fn tag(&self) -> u8 {
        match self {
            UniformValue::Int(_) => 0,
            UniformValue::UInt(_) => 1,
            UniformValue::Float(_) => 2,
            UniformValue::Vec2(_) => 3,
            UniformValue::Vec3(_) => 4,
            UniformValue::Vec4(_) => 5,
            UniformValue::Mat3(_) => 6,
            UniformValue::Mat4(_) => 7,
        }
    }
}

impl PartialEq for UniformValue {
    fn eq(&self, other: &Self) -> bool {
        self.tag() == other.tag() && self.as_bytes() == other.as_bytes()
    }
}

impl Eq for UniformValue {}

impl Hash for UniformValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.tag().hash(state);
        self.as_bytes().hash(state);
    }
}

impl From<f32> for UniformValue {
    fn from(v: f32) -> Self {
        UniformValue::Float(v)
    }
}

impl From<i32> for UniformValue {
    fn from(v: i32) -> Self {
        UniformValue::Int(v)
    }
}

impl From<[f32; 4]> for UniformValue {
    fn from(v: [f32; 4]) -> Self {
        UniformValue::Vec4(v)
    }
}

impl From<[f32; 16]> for UniformValue {
    fn from(v: [f32; 16]) -> Self {
        UniformValue::Mat4(v)
    }
}

impl From<Vec3> for UniformValue {
    fn from(v: Vec3) -> Self {
        UniformValue::Vec3(v.to_array())
    }
}

impl From<Vec4> for UniformValue {
    fn from(v: Vec4) -> Self {
        UniformValue::Vec4(v.to_array())
    }
}

impl From<Mat4> for UniformValue {
    fn from(m: Mat4) -> Self {
        UniformValue::Mat4(m.to_array())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitwise_equality() {
        assert_eq!(UniformValue::Float(f32::NAN), UniformValue::Float(f32::NAN));
        assert_ne!(UniformValue::Float(0.0), UniformValue::Float(-0.0));
    }

    #[test]
    fn test_variant_distinguishes_same_bytes() {
        assert_ne!(UniformValue::Int(1), UniformValue::UInt(1));
    }

    #[test]
    fn test_sizes() {
        assert_eq!(UniformValue::Vec3([0.0; 3]).size(), 12);
        assert_eq!(UniformValue::Mat4([0.0; 16]).size(), 64);
    }

    #[test]
    fn test_from_math_types() {
        let camera: UniformValue = Vec3::new(1.0, 2.0, 3.0).into();
        assert_eq!(camera, UniformValue::Vec3([1.0, 2.0, 3.0]));

        let model: UniformValue = Mat4::from_translation(Vec3::new(4.0, 5.0, 6.0)).into();
        let UniformValue::Mat4(columns) = model else {
            panic!("expected a matrix, got {model:?}");
        };
        assert_eq!(&columns[12..15], &[4.0, 5.0, 6.0]);
        assert_eq!(model.size(), 64);
    }
}
