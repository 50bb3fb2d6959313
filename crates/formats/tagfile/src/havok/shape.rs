//! Collision shapes.
//!
//! Shape records extend each other by appending fields, so each type embeds
//! its parent's fields first and decodes them with the parent's decoder.

use serde::Serialize;

use super::base::ReferencedObject;
use super::math::{Aabb, FourAabb, Transform, Vector4};
use crate::decode::{Decode, FieldReader, FreeListArray};
use crate::entity::ObjectIndex;
use crate::error::Result;

/// `hknpShape` fields common to every shape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Shape {
    pub base: ReferencedObject,
    pub flags: u16,
    pub shape_type: u8,
    pub num_shape_key_bits: u8,
    pub dispatch_type: u8,
    pub convex_radius: f32,
    pub user_data: u64,
    pub properties: Option<ObjectIndex>,
}

impl Decode for Shape {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        let base = ReferencedObject::decode(r)?;
        let flags = r.read_u16()?;
        let shape_type = r.read_u8()?;
        let num_shape_key_bits = r.read_u8()?;
        let dispatch_type = r.read_u8()?;
        r.skip(3)?;
        let convex_radius = r.read_f32()?;
        r.skip(4)?;
        Ok(Self {
            base,
            flags,
            shape_type,
            num_shape_key_bits,
            dispatch_type,
            convex_radius,
            user_data: r.read_u64()?,
            properties: r.read_pointer()?,
        })
    }
}

/// `hknpConvexShape`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConvexShape {
    pub shape: Shape,
    pub max_allowed_penetration: f32,
    pub vertices: Vec<Vector4>,
}

impl Decode for ConvexShape {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            shape: Shape::decode(r)?,
            max_allowed_penetration: r.read_f16()?,
            vertices: r.read_rel_array()?,
        })
    }
}

/// `hknpConvexPolytopeShape`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConvexPolytopeShape {
    pub convex: ConvexShape,
    pub planes: Vec<Vector4>,
    pub faces: Vec<Face>,
    pub indices: Vec<u8>,
    pub connectivity: Option<ObjectIndex>,
}

impl Decode for ConvexPolytopeShape {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        let convex = ConvexShape::decode(r)?;
        r.skip(2)?;
        let planes = r.read_rel_array()?;
        let faces = r.read_rel_array()?;
        let indices = r.read_rel_array()?;
        r.skip(4)?;
        Ok(Self {
            convex,
            planes,
            faces,
            indices,
            connectivity: r.read_pointer()?,
        })
    }
}

/// `hknpConvexPolytopeShape::Face`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Face {
    pub first_index: u16,
    pub num_indices: u8,
    pub min_half_angle: u8,
}

impl Decode for Face {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            first_index: r.read_u16()?,
            num_indices: r.read_u8()?,
            min_half_angle: r.read_u8()?,
        })
    }
}

/// `hknpConvexPolytopeShape::Connectivity`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Connectivity {
    pub base: ReferencedObject,
    pub vertex_edges: Vec<Edge>,
    pub face_links: Vec<Edge>,
}

impl Decode for Connectivity {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            base: ReferencedObject::decode(r)?,
            vertex_edges: r.read_array()?,
            face_links: r.read_array()?,
        })
    }
}

/// `hknpConvexPolytopeShape::Connectivity::Edge`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Edge {
    pub face_index: u16,
    pub edge_index: u8,
}

impl Decode for Edge {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        let face_index = r.read_u16()?;
        let edge_index = r.read_u8()?;
        r.skip(1)?;
        Ok(Self {
            face_index,
            edge_index,
        })
    }
}

/// `hknpCapsuleShape`: a polytope plus the segment end points.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CapsuleShape {
    pub polytope: ConvexPolytopeShape,
    pub a: Vector4,
    pub b: Vector4,
}

impl Decode for CapsuleShape {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        let polytope = ConvexPolytopeShape::decode(r)?;
        r.skip(8)?;
        Ok(Self {
            polytope,
            a: Vector4::decode(r)?,
            b: Vector4::decode(r)?,
        })
    }
}

/// `hknpCompositeShape`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CompositeShape {
    pub shape: Shape,
    pub shape_tag_codec_info: u32,
    pub material_table: Option<ObjectIndex>,
}

impl Decode for CompositeShape {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        let shape = Shape::decode(r)?;
        let shape_tag_codec_info = r.read_u32()?;
        r.skip(4)?;
        Ok(Self {
            shape,
            shape_tag_codec_info,
            material_table: r.read_pointer()?,
        })
    }
}

/// `hknpCompoundShape`: child shape instances under one bounding volume.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompoundShape {
    pub composite: CompositeShape,
    pub instances: FreeListArray<ShapeInstance>,
    pub instance_velocities: Vec<VelocityInfo>,
    pub aabb: Aabb,
    pub bounding_radius: f32,
    pub is_mutable: bool,
    pub estimated_num_shape_keys: i32,
    pub shape_mutated: Option<ObjectIndex>,
    pub shape_destroyed: Option<ObjectIndex>,
    pub bounding_volume: CompoundShapeData,
}

impl CompoundShape {
    const BOUNDING_VOLUME_SIZE: usize = 112;
}

impl Decode for CompoundShape {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        let composite = CompositeShape::decode(r)?;
        let instances = r.read_free_list_array()?;
        let instance_velocities = r.read_array()?;
        let aabb = Aabb::decode(r)?;
        let bounding_radius = r.read_f32()?;
        let is_mutable = r.read_bool()?;
        r.skip(3)?;
        Ok(Self {
            composite,
            instances,
            instance_velocities,
            aabb,
            bounding_radius,
            is_mutable,
            estimated_num_shape_keys: r.read_i32()?,
            shape_mutated: r.read_pointer()?,
            shape_destroyed: r.read_pointer()?,
            bounding_volume: r.read_embedded(Self::BOUNDING_VOLUME_SIZE)?,
        })
    }
}

/// `hknpShapeInstance`: one placed child of a compound.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ShapeInstance {
    pub transform: Transform,
    pub scale: Vector4,
    pub shape: Option<ObjectIndex>,
    pub shape_tag: u16,
    pub destruction_tag: u16,
    pub is_empty: bool,
    pub next_empty_element: u32,
    pub instance_id: i16,
    pub parent_shape: Option<ObjectIndex>,
}

impl Decode for ShapeInstance {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        let transform = Transform::decode(r)?;
        let scale = Vector4::decode(r)?;
        let shape = r.read_pointer()?;
        let shape_tag = r.read_u16()?;
        let destruction_tag = r.read_u16()?;
        let is_empty = r.read_bool()?;
        r.skip(3)?;
        let next_empty_element = r.read_u32()?;
        let instance_id = r.read_i16()?;
        r.skip(2)?;
        Ok(Self {
            transform,
            scale,
            shape,
            shape_tag,
            destruction_tag,
            is_empty,
            next_empty_element,
            instance_id,
            parent_shape: r.read_pointer()?,
        })
    }
}

/// `hknpCompoundShape::VelocityInfo`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct VelocityInfo {
    pub linear_velocity: Vector4,
    pub angular_velocity: Vector4,
}

impl Decode for VelocityInfo {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            linear_velocity: Vector4::decode(r)?,
            angular_velocity: Vector4::decode(r)?,
        })
    }
}

/// `hknpCompoundShapeData`: the compound's bounding volume hierarchy.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompoundShapeData {
    pub base: ReferencedObject,
    pub aabb_tree: DynamicTree,
    pub simd_tree: SimdTree,
    pub points: Vec<Vector4>,
    pub tree_type: u8,
}

impl Decode for CompoundShapeData {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        let base = ReferencedObject::decode(r)?;
        let aabb_tree = DynamicTree::decode(r)?;
        let simd_tree = SimdTree::decode(r)?;
        let points = r.read_array()?;
        let tree_type = r.read_u8()?;
        r.skip(7)?;
        Ok(Self {
            base,
            aabb_tree,
            simd_tree,
            points,
            tree_type,
        })
    }
}

/// `hkcdDynamicTree::DefaultTree32`: AABB nodes in free-list storage.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DynamicTree {
    pub nodes: Vec<Aabb>,
    pub first_free: u16,
    pub num_leaves: u32,
    pub path: u32,
    pub root: u16,
}

impl Decode for DynamicTree {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        let nodes = r.read_array()?;
        let first_free = r.read_u16()?;
        r.skip(6)?;
        let num_leaves = r.read_u32()?;
        let path = r.read_u32()?;
        let root = r.read_u16()?;
        r.skip(6)?;
        Ok(Self {
            nodes,
            first_free,
            num_leaves,
            path,
            root,
        })
    }
}

/// `hkcdSimdTree`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SimdTree {
    pub nodes: Vec<SimdTreeNode>,
    pub is_compact: bool,
}

impl Decode for SimdTree {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        let nodes = r.read_array()?;
        let is_compact = r.read_bool()?;
        r.skip(7)?;
        Ok(Self { nodes, is_compact })
    }
}

/// `hkcdSimdTree::Node`: four child boxes and their payloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SimdTreeNode {
    pub bounds: FourAabb,
    pub data: [u32; 4],
    pub is_leaf: bool,
    pub is_active: bool,
}

impl Decode for SimdTreeNode {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        let bounds = FourAabb::decode(r)?;
        let data = [r.read_u32()?, r.read_u32()?, r.read_u32()?, r.read_u32()?];
        let is_leaf = r.read_bool()?;
        let is_active = r.read_bool()?;
        r.skip(14)?;
        Ok(Self {
            bounds,
            data,
            is_leaf,
            is_active,
        })
    }
}

/// `hknpShapeMassProperties`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ShapeMassProperties {
    pub base: ReferencedObject,
    pub center_of_mass: Vector4,
    pub inertia: Vector4,
    /// Quantized quaternion components.
    pub major_axis_space: [i16; 4],
    pub mass: f32,
    pub volume: f32,
}

impl Decode for ShapeMassProperties {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            base: ReferencedObject::decode(r)?,
            center_of_mass: Vector4::read_packed3(r)?,
            inertia: Vector4::read_packed3(r)?,
            major_axis_space: [r.read_i16()?, r.read_i16()?, r.read_i16()?, r.read_i16()?],
            mass: r.read_f32()?,
            volume: r.read_f32()?,
        })
    }
}
