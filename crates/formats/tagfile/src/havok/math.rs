use serde::Serialize;

use crate::decode::{Decode, FieldReader};
use crate::error::Result;

/// `hkVector4f`: four little-endian floats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Vector4 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Vector4 {
    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    /// Read the 8-byte packed form: three big-endian floats sharing their low
    /// half, `w` fixed at 1.0. The half layout is provisional.
    pub fn read_packed3(r: &mut FieldReader<'_>) -> Result<Self> {
        let a = r.read_bytes(2)?;
        let low = r.read_bytes(2)?;
        let b = r.read_bytes(2)?;
        let c = r.read_bytes(2)?;
        let widen = |hi: &[u8]| f32::from_be_bytes([hi[0], hi[1], low[0], low[1]]);
        Ok(Self::new(widen(a), widen(b), widen(c), 1.0))
    }
}

impl Decode for Vector4 {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self::new(r.read_f32()?, r.read_f32()?, r.read_f32()?, r.read_f32()?))
    }
}

/// `hkQuaternionf`, stored like a vector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Quaternion {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Decode for Quaternion {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        let v = Vector4::decode(r)?;
        Ok(Self {
            x: v.x,
            y: v.y,
            z: v.z,
            w: v.w,
        })
    }
}

/// `hkQsTransform`: translation, rotation, scale (48 bytes).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct QsTransform {
    pub translation: Vector4,
    pub rotation: Quaternion,
    pub scale: Vector4,
}

impl Decode for QsTransform {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            translation: Vector4::decode(r)?,
            rotation: Quaternion::decode(r)?,
            scale: Vector4::decode(r)?,
        })
    }
}

/// `hkAabb`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Aabb {
    pub min: Vector4,
    pub max: Vector4,
}

impl Decode for Aabb {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            min: Vector4::decode(r)?,
            max: Vector4::decode(r)?,
        })
    }
}

/// `hkTransformf`: 3x4 rotation rows then translation (64 bytes).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Transform {
    pub rotation: [Vector4; 3],
    pub translation: Vector4,
}

impl Decode for Transform {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            rotation: [Vector4::decode(r)?, Vector4::decode(r)?, Vector4::decode(r)?],
            translation: Vector4::decode(r)?,
        })
    }
}

/// `hkcdFourAabb`: four boxes in structure-of-arrays form.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FourAabb {
    pub lx: Vector4,
    pub hx: Vector4,
    pub ly: Vector4,
    pub hy: Vector4,
    pub lz: Vector4,
    pub hz: Vector4,
}

impl Decode for FourAabb {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            lx: Vector4::decode(r)?,
            hx: Vector4::decode(r)?,
            ly: Vector4::decode(r)?,
            hy: Vector4::decode(r)?,
            lz: Vector4::decode(r)?,
            hz: Vector4::decode(r)?,
        })
    }
}
