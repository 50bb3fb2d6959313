use serde::Serialize;

use super::base::ReferencedObject;
use super::math::QsTransform;
use crate::decode::{Decode, FieldReader, Value};
use crate::entity::ObjectIndex;
use crate::error::Result;

/// `hkaAnimationContainer`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnimationContainer {
    pub base: ReferencedObject,
    pub skeletons: Vec<Option<ObjectIndex>>,
    pub animations: Vec<Option<ObjectIndex>>,
    pub bindings: Vec<Option<ObjectIndex>>,
    pub attachments: Vec<Option<ObjectIndex>>,
    pub skins: Vec<Option<ObjectIndex>>,
}

impl Decode for AnimationContainer {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            base: ReferencedObject::decode(r)?,
            skeletons: r.read_ptr_array()?,
            animations: r.read_ptr_array()?,
            bindings: r.read_ptr_array()?,
            attachments: r.read_ptr_array()?,
            skins: r.read_ptr_array()?,
        })
    }
}

/// `hkaSkeleton`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Skeleton {
    pub base: ReferencedObject,
    pub name: Option<String>,
    /// Parent bone per bone; -1 for roots.
    pub parent_indices: Vec<i16>,
    pub bones: Vec<Bone>,
    pub reference_pose: Vec<QsTransform>,
    pub reference_floats: Vec<Value>,
    pub float_slots: Vec<Value>,
    pub local_frames: Vec<Value>,
    pub partitions: Vec<Value>,
}

impl Decode for Skeleton {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            base: ReferencedObject::decode(r)?,
            name: r.read_string()?,
            parent_indices: r.read_array()?,
            bones: r.read_array()?,
            reference_pose: r.read_array()?,
            reference_floats: r.read_value_array()?,
            float_slots: r.read_value_array()?,
            local_frames: r.read_value_array()?,
            partitions: r.read_value_array()?,
        })
    }
}

impl Skeleton {
    /// Parent of bone `index`, `None` for roots and out-of-range indices.
    pub fn parent(&self, index: usize) -> Option<usize> {
        self.parent_indices
            .get(index)
            .and_then(|&p| usize::try_from(p).ok())
    }
}

/// `hkaBone`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Bone {
    pub name: Option<String>,
    pub lock_translation: bool,
}

impl Decode for Bone {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        let name = r.read_string()?;
        let lock_translation = r.read_bool()?;
        r.skip(7)?;
        Ok(Self {
            name,
            lock_translation,
        })
    }
}

/// `hkaSkeletonMapper` with its inline mapping data.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SkeletonMapper {
    pub base: ReferencedObject,
    pub skeleton_a: Option<ObjectIndex>,
    pub skeleton_b: Option<ObjectIndex>,
    pub partition_map: Vec<Value>,
    pub simple_mapping_partition_ranges: Vec<Value>,
    pub chain_mapping_partition_ranges: Vec<Value>,
    pub simple_mappings: Vec<SimpleMapping>,
    pub chain_mappings: Vec<Value>,
    pub unmapped_bones: Vec<i16>,
    pub extracted_motion_mapping: QsTransform,
    pub keep_unmapped_local: bool,
    pub mapping_type: u32,
}

impl Decode for SkeletonMapper {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        let base = ReferencedObject::decode(r)?;
        r.skip(8)?;
        let skeleton_a = r.read_pointer()?;
        let skeleton_b = r.read_pointer()?;
        let partition_map = r.read_value_array()?;
        let simple_mapping_partition_ranges = r.read_value_array()?;
        let chain_mapping_partition_ranges = r.read_value_array()?;
        let simple_mappings = r.read_array()?;
        let chain_mappings = r.read_value_array()?;
        let unmapped_bones = r.read_array()?;
        r.align(16)?;
        let extracted_motion_mapping = QsTransform::decode(r)?;
        let keep_unmapped_local = r.read_bool()?;
        r.skip(3)?;
        let mapping_type = r.read_u32()?;
        Ok(Self {
            base,
            skeleton_a,
            skeleton_b,
            partition_map,
            simple_mapping_partition_ranges,
            chain_mapping_partition_ranges,
            simple_mappings,
            chain_mappings,
            unmapped_bones,
            extracted_motion_mapping,
            keep_unmapped_local,
            mapping_type,
        })
    }
}

/// `hkaSkeletonMapperData::SimpleMapping`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SimpleMapping {
    pub bone_a: i16,
    pub bone_b: i16,
    pub a_from_b_transform: QsTransform,
}

impl Decode for SimpleMapping {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        let bone_a = r.read_i16()?;
        let bone_b = r.read_i16()?;
        r.align(16)?;
        Ok(Self {
            bone_a,
            bone_b,
            a_from_b_transform: QsTransform::decode(r)?,
        })
    }
}
