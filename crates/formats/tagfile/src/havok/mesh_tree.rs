//! Compressed triangle meshes.
//!
//! A mesh tree splits its geometry into sections. Each section stores up to
//! 256 vertex references: the first `num_packed_vertices` are 32-bit words
//! quantized over the section's codec parameters, the rest index 64-bit
//! shared vertices quantized over the whole mesh domain. Primitives are four
//! vertex indices into that per-section space; a repeated last index marks a
//! triangle.

use serde::Serialize;

use super::base::ReferencedObject;
use super::math::{Aabb, Vector4};
use super::shape::{CompositeShape, ShapeInstance, SimdTree};
use crate::decode::{BitField, Decode, FieldReader};
use crate::entity::ObjectIndex;
use crate::error::{Error, Result};

const SHARED_XY_MAX: u64 = (1 << 21) - 1;
const SHARED_Z_MAX: u64 = (1 << 22) - 1;
const PACKED_XY_MASK: u32 = 0x7ff;

/// `hknpCompressedMeshShape`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompressedMeshShape {
    pub composite: CompositeShape,
    pub data: Option<ObjectIndex>,
    pub triangles_interior: BitField,
    pub num_triangles: i32,
    pub num_convex_shapes: i32,
    pub extern_shapes: Vec<ShapeInstance>,
}

impl Decode for CompressedMeshShape {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            composite: CompositeShape::decode(r)?,
            data: r.read_pointer()?,
            triangles_interior: r.read_bit_field()?,
            num_triangles: r.read_i32()?,
            num_convex_shapes: r.read_i32()?,
            extern_shapes: r.read_array()?,
        })
    }
}

/// `fsnpCustomParamCompressedMeshShape`: a compressed mesh with per-triangle
/// parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CustomParamCompressedMeshShape {
    pub mesh: CompressedMeshShape,
    pub param: Option<ObjectIndex>,
    pub triangle_index_to_shape_key: Vec<u32>,
}

impl Decode for CustomParamCompressedMeshShape {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            mesh: CompressedMeshShape::decode(r)?,
            param: r.read_pointer()?,
            triangle_index_to_shape_key: r.read_array()?,
        })
    }
}

/// `fsnpCustomMeshParameter`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CustomMeshParameter {
    pub base: ReferencedObject,
    pub triangle_data: Vec<TriangleData>,
    pub primitive_data: Vec<PrimitiveData>,
    pub vertex_data_stride: i32,
    pub triangle_data_stride: i32,
    pub version: u32,
}

impl Decode for CustomMeshParameter {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        let param = Self {
            base: ReferencedObject::decode(r)?,
            triangle_data: r.read_array()?,
            primitive_data: r.read_array()?,
            vertex_data_stride: r.read_i32()?,
            triangle_data_stride: r.read_i32()?,
            version: r.read_u32()?,
        };
        r.skip(4)?;
        Ok(param)
    }
}

/// `fsnpCustomMeshParameter::TriangleData`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TriangleData {
    pub primitive_data_index: u32,
    pub triangle_data_index: u32,
    pub vertex_index_a: u32,
    pub vertex_index_b: u32,
    pub vertex_index_c: u32,
}

impl Decode for TriangleData {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            primitive_data_index: r.read_u32()?,
            triangle_data_index: r.read_u32()?,
            vertex_index_a: r.read_u32()?,
            vertex_index_b: r.read_u32()?,
            vertex_index_c: r.read_u32()?,
        })
    }
}

/// `fsnpCustomMeshParameter::PrimitiveData`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PrimitiveData {
    pub vertex_data: Vec<u8>,
    pub triangle_data: Vec<u8>,
    pub primitive_data: Vec<u8>,
    pub material_name_data: u32,
}

impl Decode for PrimitiveData {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        let data = Self {
            vertex_data: r.read_array()?,
            triangle_data: r.read_array()?,
            primitive_data: r.read_array()?,
            material_name_data: r.read_u32()?,
        };
        r.skip(4)?;
        Ok(data)
    }
}

/// `hknpCompressedMeshShapeData`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompressedMeshShapeData {
    pub base: ReferencedObject,
    pub mesh_tree: StaticMeshTree,
    pub simd_tree: SimdTree,
    /// Edge connectivity, kept raw.
    pub connectivity: Vec<u8>,
    pub has_simd_tree: bool,
}

impl CompressedMeshShapeData {
    const MESH_TREE_SIZE: usize = 160;
    const CONNECTIVITY_SIZE: usize = 48;
}

impl Decode for CompressedMeshShapeData {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        let base = ReferencedObject::decode(r)?;
        r.skip(8)?;
        let mesh_tree = r.read_embedded(Self::MESH_TREE_SIZE)?;
        let simd_tree = SimdTree::decode(r)?;
        let connectivity = r.read_bytes(Self::CONNECTIVITY_SIZE)?.to_vec();
        let has_simd_tree = r.read_bool()?;
        r.skip(7)?;
        Ok(Self {
            base,
            mesh_tree,
            simd_tree,
            connectivity,
            has_simd_tree,
        })
    }
}

/// `hknpCompressedMeshShapeTree` (`hkcdDefaultStaticMeshTree`).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StaticMeshTree {
    pub nodes: Vec<Aabb5BytesCodec>,
    pub domain: Aabb,
    pub num_primitive_keys: i32,
    pub bits_per_key: i32,
    pub max_key_value: u32,
    pub primitive_store_is_flat_convex: u8,
    pub sections: Vec<Section>,
    pub primitives: Vec<Primitive>,
    pub shared_vertices_index: Vec<u16>,
    pub packed_vertices: Vec<u32>,
    pub shared_vertices: Vec<u64>,
    pub primitive_data_runs: Vec<PrimitiveDataRun>,
}

impl Decode for StaticMeshTree {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        let nodes = r.read_array()?;
        let domain = Aabb::decode(r)?;
        let num_primitive_keys = r.read_i32()?;
        let bits_per_key = r.read_i32()?;
        let max_key_value = r.read_u32()?;
        let primitive_store_is_flat_convex = r.read_u8()?;
        r.skip(3)?;
        Ok(Self {
            nodes,
            domain,
            num_primitive_keys,
            bits_per_key,
            max_key_value,
            primitive_store_is_flat_convex,
            sections: r.read_array()?,
            primitives: r.read_array()?,
            shared_vertices_index: r.read_array()?,
            packed_vertices: r.read_array()?,
            shared_vertices: r.read_array()?,
            primitive_data_runs: r.read_array()?,
        })
    }
}

impl StaticMeshTree {
    /// Dequantize a shared-vertex word over the mesh domain.
    pub fn shared_vertex(&self, word: u64) -> Vector4 {
        dequantize_shared_vertex(&self.domain, word)
    }

    /// Every primitive of every section.
    pub fn unpack(&self) -> Result<Vec<MeshPrimitive>> {
        let mut out = Vec::new();
        for section in &self.sections {
            out.extend(section.unpack_primitives(self)?);
        }
        Ok(out)
    }
}

/// Dequantize a 21/21/22-bit shared vertex over `domain`.
pub fn dequantize_shared_vertex(domain: &Aabb, word: u64) -> Vector4 {
    let axis = |q: u64, max: u64, lo: f32, hi: f32| {
        (q as f64 * ((hi as f64 - lo as f64) / max as f64) + lo as f64) as f32
    };
    Vector4::new(
        axis(word & SHARED_XY_MAX, SHARED_XY_MAX, domain.min.x, domain.max.x),
        axis((word >> 21) & SHARED_XY_MAX, SHARED_XY_MAX, domain.min.y, domain.max.y),
        axis((word >> 42) & SHARED_Z_MAX, SHARED_Z_MAX, domain.min.z, domain.max.z),
        domain.min.w,
    )
}

/// Quantize `v` into a shared-vertex word over `domain`. Coordinates outside
/// the domain are clamped.
pub fn quantize_shared_vertex(domain: &Aabb, v: Vector4) -> u64 {
    let axis = |c: f32, max: u64, lo: f32, hi: f32| {
        let extent = hi as f64 - lo as f64;
        if extent <= 0.0 {
            return 0;
        }
        let t = ((c as f64 - lo as f64) / extent).clamp(0.0, 1.0);
        (t * max as f64).round() as u64
    };
    axis(v.x, SHARED_XY_MAX, domain.min.x, domain.max.x)
        | axis(v.y, SHARED_XY_MAX, domain.min.y, domain.max.y) << 21
        | axis(v.z, SHARED_Z_MAX, domain.min.z, domain.max.z) << 42
}

/// One decoded mesh primitive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum MeshPrimitive {
    Triangle([Vector4; 3]),
    Quad([Vector4; 4]),
}

/// `hkcdStaticMeshTree::Section`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Section {
    pub nodes: Vec<Aabb4BytesCodec>,
    pub domain: Aabb,
    /// Packed-vertex offset (`[0..3]`) and scale (`[3..6]`).
    pub codec_params: [f32; 6],
    pub first_packed_vertex_index: u32,
    pub first_shared_vertex_index: u32,
    pub first_primitive_index: u32,
    pub first_data_run_index: u32,
    pub num_packed_vertices: u8,
    pub num_primitives: u8,
    pub num_data_runs: u8,
    pub page: u8,
    pub leaf_index: u16,
    pub layer_data: u8,
    pub flags: u8,
}

impl Decode for Section {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        let nodes = r.read_array()?;
        let domain = Aabb::decode(r)?;
        let mut codec_params = [0.0; 6];
        for p in &mut codec_params {
            *p = r.read_f32()?;
        }
        Ok(Self {
            nodes,
            domain,
            codec_params,
            first_packed_vertex_index: r.read_u32()?,
            first_shared_vertex_index: r.read_u32()?,
            first_primitive_index: r.read_u32()?,
            first_data_run_index: r.read_u32()?,
            num_packed_vertices: r.read_u8()?,
            num_primitives: r.read_u8()?,
            num_data_runs: r.read_u8()?,
            page: r.read_u8()?,
            leaf_index: r.read_u16()?,
            layer_data: r.read_u8()?,
            flags: r.read_u8()?,
        })
    }
}

impl Section {
    /// Dequantize an 11/11/10-bit packed vertex with this section's codec.
    ///
    /// The axis-to-parameter mapping is provisional.
    pub fn packed_vertex(&self, word: u32) -> Vector4 {
        let p = &self.codec_params;
        Vector4::new(
            (word & PACKED_XY_MASK) as f32 * p[3] + p[0],
            ((word >> 11) & PACKED_XY_MASK) as f32 * p[4] + p[1],
            (word >> 22) as f32 * p[5] + p[2],
            p[3],
        )
    }

    /// Vertex `index` of this section.
    pub fn vertex(&self, mesh: &StaticMeshTree, index: u8) -> Result<Vector4> {
        let index = index as usize;
        let packed = self.num_packed_vertices as usize;
        if index < packed {
            let slot = self.first_packed_vertex_index as usize + index;
            let word = mesh
                .packed_vertices
                .get(slot)
                .ok_or_else(|| out_of_range("packed vertex", slot, mesh.packed_vertices.len()))?;
            return Ok(self.packed_vertex(*word));
        }
        let slot = (self.first_shared_vertex_index as usize + index)
            .checked_sub(packed)
            .ok_or_else(|| out_of_range("shared vertex index", index, packed))?;
        let shared = *mesh
            .shared_vertices_index
            .get(slot)
            .ok_or_else(|| out_of_range("shared vertex index", slot, mesh.shared_vertices_index.len()))?;
        let slot = self.page as usize * 0x10000 + shared as usize;
        let word = mesh
            .shared_vertices
            .get(slot)
            .ok_or_else(|| out_of_range("shared vertex", slot, mesh.shared_vertices.len()))?;
        Ok(mesh.shared_vertex(*word))
    }

    /// Decode this section's primitives into triangles and quads.
    pub fn unpack_primitives(&self, mesh: &StaticMeshTree) -> Result<Vec<MeshPrimitive>> {
        let first = self.first_primitive_index as usize;
        let count = self.num_primitives as usize;
        let primitives = mesh
            .primitives
            .get(first..first + count)
            .ok_or_else(|| out_of_range("primitive", first + count, mesh.primitives.len()))?;
        primitives
            .iter()
            .map(|prim| -> Result<MeshPrimitive> {
                let [a, b, c, d] = prim.indices;
                let v = |i| self.vertex(mesh, i);
                Ok(if c == d {
                    MeshPrimitive::Triangle([v(a)?, v(b)?, v(c)?])
                } else {
                    MeshPrimitive::Quad([v(a)?, v(b)?, v(c)?, v(d)?])
                })
            })
            .collect()
    }
}

fn out_of_range(what: &str, index: usize, len: usize) -> Error {
    Error::unsupported(
        "hkcdStaticMeshTree::Section",
        format!("{what} {index} out of range (len {len})"),
    )
}

/// `hkcdStaticMeshTree::Primitive`: four vertex indices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Primitive {
    pub indices: [u8; 4],
}

impl Decode for Primitive {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            indices: [r.read_u8()?, r.read_u8()?, r.read_u8()?, r.read_u8()?],
        })
    }
}

/// `hkcdDefaultStaticMeshTree::PrimitiveDataRun`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PrimitiveDataRun {
    pub value: u16,
    pub index: u8,
    pub count: u8,
}

impl Decode for PrimitiveDataRun {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            value: r.read_u16()?,
            index: r.read_u8()?,
            count: r.read_u8()?,
        })
    }
}

/// `hkcdCompressedAabbCodecs::Aabb4BytesCodec`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Aabb4BytesCodec {
    pub xyz: [u8; 3],
    pub data: u8,
}

impl Decode for Aabb4BytesCodec {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            xyz: [r.read_u8()?, r.read_u8()?, r.read_u8()?],
            data: r.read_u8()?,
        })
    }
}

/// `hkcdCompressedAabbCodecs::Aabb5BytesCodec`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Aabb5BytesCodec {
    pub xyz: [u8; 3],
    pub hi_data: u8,
    pub lo_data: u8,
}

impl Decode for Aabb5BytesCodec {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            xyz: [r.read_u8()?, r.read_u8()?, r.read_u8()?],
            hi_data: r.read_u8()?,
            lo_data: r.read_u8()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube(size: f32) -> Aabb {
        Aabb {
            min: Vector4::new(0.0, 0.0, 0.0, 0.0),
            max: Vector4::new(size, size, size, 0.0),
        }
    }

    #[test]
    fn shared_vertex_round_trip_within_one_step() {
        let domain = cube(100.0);
        let tolerance = 100.0 / (1u64 << 21) as f32;
        for &(x, y, z) in &[
            (0.0, 0.0, 0.0),
            (100.0, 100.0, 100.0),
            (12.345, 67.891, 0.001),
            (99.999, 50.0, 33.333),
        ] {
            let word = quantize_shared_vertex(&domain, Vector4::new(x, y, z, 1.0));
            let v = dequantize_shared_vertex(&domain, word);
            assert!((v.x - x).abs() < tolerance, "x {x} -> {}", v.x);
            assert!((v.y - y).abs() < tolerance, "y {y} -> {}", v.y);
            assert!((v.z - z).abs() < tolerance, "z {z} -> {}", v.z);
        }
    }

    #[test]
    fn shared_vertex_bit_layout() {
        let domain = cube(1.0);
        let v = dequantize_shared_vertex(&domain, SHARED_XY_MAX << 21);
        assert_eq!((v.x, v.y, v.z), (0.0, 1.0, 0.0));
        let v = dequantize_shared_vertex(&domain, SHARED_Z_MAX << 42);
        assert_eq!((v.x, v.y, v.z), (0.0, 0.0, 1.0));
    }

    #[test]
    fn dequantized_w_comes_from_codec() {
        let mut domain = cube(1.0);
        domain.min.w = 1.0;
        assert_eq!(dequantize_shared_vertex(&domain, SHARED_XY_MAX).w, 1.0);
        let section = Section {
            codec_params: [0.0, 0.0, 0.0, 0.5, 1.0, 1.0],
            ..Section::default()
        };
        assert_eq!(section.packed_vertex(7).w, 0.5);
    }

    #[test]
    fn packed_vertex_uses_section_codec() {
        let section = Section {
            codec_params: [1.0, 2.0, 3.0, 0.5, 0.25, 2.0],
            ..Section::default()
        };
        let word = 4 | (8 << 11) | (3 << 22);
        let v = section.packed_vertex(word);
        assert_eq!((v.x, v.y, v.z), (3.0, 4.0, 9.0));
    }

    fn mesh() -> StaticMeshTree {
        let domain = cube(100.0);
        let shared = [
            Vector4::new(10.0, 0.0, 0.0, 1.0),
            Vector4::new(0.0, 10.0, 0.0, 1.0),
        ];
        StaticMeshTree {
            domain,
            sections: vec![Section {
                codec_params: [0.0, 0.0, 0.0, 1.0, 1.0, 1.0],
                first_shared_vertex_index: 0,
                num_packed_vertices: 2,
                num_primitives: 2,
                ..Section::default()
            }],
            primitives: vec![
                Primitive {
                    indices: [0, 1, 2, 2],
                },
                Primitive {
                    indices: [0, 1, 2, 3],
                },
            ],
            packed_vertices: vec![1, 1 << 11],
            shared_vertices_index: vec![0, 1],
            shared_vertices: shared
                .iter()
                .map(|v| quantize_shared_vertex(&domain, *v))
                .collect(),
            ..StaticMeshTree::default()
        }
    }

    #[test]
    fn unpacks_triangles_and_quads() {
        let mesh = mesh();
        let prims = mesh.unpack().unwrap();
        assert_eq!(prims.len(), 2);
        let MeshPrimitive::Triangle(tri) = prims[0] else {
            panic!("expected triangle, got {:?}", prims[0]);
        };
        assert_eq!((tri[0].x, tri[0].y), (1.0, 0.0));
        assert_eq!((tri[1].x, tri[1].y), (0.0, 1.0));
        assert!((tri[2].x - 10.0).abs() < 1e-3);
        assert!(matches!(prims[1], MeshPrimitive::Quad(q) if (q[3].y - 10.0).abs() < 1e-3));
    }

    #[test]
    fn out_of_range_index_is_an_error() {
        let mut mesh = mesh();
        mesh.primitives[0].indices = [0, 1, 9, 9];
        assert!(matches!(
            mesh.unpack(),
            Err(Error::UnsupportedField { .. })
        ));
    }
}
