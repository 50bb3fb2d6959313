//! Rigid-body physics scene types.

use serde::Serialize;

use super::base::ReferencedObject;
use super::math::{Quaternion, Vector4};
use crate::decode::{Decode, FieldReader};
use crate::entity::ObjectIndex;
use crate::error::Result;

/// `hknpPhysicsSceneData`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PhysicsSceneData {
    pub base: ReferencedObject,
    pub system_datas: Vec<Option<ObjectIndex>>,
}

impl Decode for PhysicsSceneData {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        let base = ReferencedObject::decode(r)?;
        let system_datas = r.read_ptr_array()?;
        if let Some(world) = r.read_pointer()? {
            return Err(r.unsupported(format!("world construction info is set ({world})")));
        }
        Ok(Self { base, system_datas })
    }
}

/// `hknpPhysicsSystemData`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PhysicsSystemData {
    pub base: ReferencedObject,
    pub materials: Vec<Material>,
    pub motion_properties: Vec<MotionProperties>,
    pub body_cinfos: Vec<BodyCinfoWithAttachment>,
    pub name: Option<String>,
    pub micro_step_multiplier: u8,
}

impl Decode for PhysicsSystemData {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        let base = ReferencedObject::decode(r)?;
        let materials = r.read_array()?;
        let motion_properties = r.read_array()?;
        let body_cinfos = r.read_array()?;
        let name = r.read_string()?;
        let micro_step_multiplier = r.read_u8()?;
        r.skip(7)?;
        Ok(Self {
            base,
            materials,
            motion_properties,
            body_cinfos,
            name,
            micro_step_multiplier,
        })
    }
}

/// `hknpRagdollData`: a physics system plus constraints and a skeleton link.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RagdollData {
    pub base: ReferencedObject,
    pub materials: Vec<Material>,
    pub motion_properties: Vec<MotionProperties>,
    pub body_cinfos: Vec<BodyCinfoWithAttachment>,
    pub constraint_cinfos: Vec<ConstraintCinfo>,
    pub name: Option<String>,
    pub micro_step_multiplier: u8,
    pub skeleton: Option<ObjectIndex>,
    pub bone_to_body_map: Vec<i32>,
    pub body_tags: Vec<u32>,
}

impl Decode for RagdollData {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        let base = ReferencedObject::decode(r)?;
        let materials = r.read_array()?;
        let motion_properties = r.read_array()?;
        let body_cinfos = r.read_array()?;
        let constraint_cinfos = r.read_array()?;
        let name = r.read_string()?;
        let micro_step_multiplier = r.read_u8()?;
        r.skip(7)?;
        Ok(Self {
            base,
            materials,
            motion_properties,
            body_cinfos,
            constraint_cinfos,
            name,
            micro_step_multiplier,
            skeleton: r.read_pointer()?,
            bone_to_body_map: r.read_array()?,
            body_tags: r.read_array()?,
        })
    }
}

/// `hknpMaterial`. Friction and soft-contact factors are stored as halves.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Material {
    pub base: ReferencedObject,
    pub name: Option<String>,
    pub is_exclusive: u32,
    pub flags: i32,
    pub trigger_type: u8,
    pub trigger_manifold_tolerance: u8,
    pub dynamic_friction: f32,
    pub static_friction: f32,
    pub restitution: f32,
    pub friction_combine_policy: u8,
    pub restitution_combine_policy: u8,
    pub welding_tolerance: f32,
    pub max_contact_impulse: f32,
    pub fraction_of_clipped_impulse_to_apply: f32,
    pub mass_changer_category: u8,
    pub mass_changer_heavy_object_factor: f32,
    pub soft_contact_force_factor: f32,
    pub soft_contact_damp_factor: f32,
    pub soft_contact_separation_velocity: u8,
    pub surface_velocity: Option<ObjectIndex>,
    pub disabling_collisions_between_cvx_cvx_dynamic_objects_distance: f32,
    pub user_data: u64,
}

impl Decode for Material {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        let base = ReferencedObject::decode(r)?;
        let name = r.read_string()?;
        let is_exclusive = r.read_u32()?;
        let flags = r.read_i32()?;
        let trigger_type = r.read_u8()?;
        let trigger_manifold_tolerance = r.read_u8()?;
        let dynamic_friction = r.read_f16()?;
        let static_friction = r.read_f16()?;
        let restitution = r.read_f16()?;
        let friction_combine_policy = r.read_u8()?;
        let restitution_combine_policy = r.read_u8()?;
        r.skip(2)?;
        let welding_tolerance = r.read_f32()?;
        let max_contact_impulse = r.read_f32()?;
        let fraction_of_clipped_impulse_to_apply = r.read_f32()?;
        let mass_changer_category = r.read_u8()?;
        r.skip(1)?;
        let mass_changer_heavy_object_factor = r.read_f16()?;
        let soft_contact_force_factor = r.read_f16()?;
        let soft_contact_damp_factor = r.read_f16()?;
        let soft_contact_separation_velocity = r.read_u8()?;
        r.skip(7)?;
        let surface_velocity = r.read_pointer()?;
        let disabling_collisions_between_cvx_cvx_dynamic_objects_distance = r.read_f16()?;
        r.skip(6)?;
        let user_data = r.read_u64()?;
        Ok(Self {
            base,
            name,
            is_exclusive,
            flags,
            trigger_type,
            trigger_manifold_tolerance,
            dynamic_friction,
            static_friction,
            restitution,
            friction_combine_policy,
            restitution_combine_policy,
            welding_tolerance,
            max_contact_impulse,
            fraction_of_clipped_impulse_to_apply,
            mass_changer_category,
            mass_changer_heavy_object_factor,
            soft_contact_force_factor,
            soft_contact_damp_factor,
            soft_contact_separation_velocity,
            surface_velocity,
            disabling_collisions_between_cvx_cvx_dynamic_objects_distance,
            user_data,
        })
    }
}

/// `hknpMotionProperties`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MotionProperties {
    pub is_exclusive: u32,
    pub flags: u32,
    pub gravity_factor: f32,
    pub time_factor: f32,
    pub max_linear_speed: f32,
    pub max_angular_speed: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub solver_stabilization_speed_threshold: f32,
    pub solver_stabilization_speed_reduction: f32,
    pub deactivation: DeactivationSettings,
    pub full_cast: FullCastSettings,
}

impl Decode for MotionProperties {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            is_exclusive: r.read_u32()?,
            flags: r.read_u32()?,
            gravity_factor: r.read_f32()?,
            time_factor: r.read_f32()?,
            max_linear_speed: r.read_f32()?,
            max_angular_speed: r.read_f32()?,
            linear_damping: r.read_f32()?,
            angular_damping: r.read_f32()?,
            solver_stabilization_speed_threshold: r.read_f32()?,
            solver_stabilization_speed_reduction: r.read_f32()?,
            deactivation: DeactivationSettings::decode(r)?,
            full_cast: FullCastSettings::decode(r)?,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DeactivationSettings {
    pub max_dist_sqrd: f32,
    pub max_rot_sqrd: f32,
    pub inv_block_size: f32,
    pub pathing_upper_threshold: i16,
    pub pathing_lower_threshold: i16,
    pub num_deactivation_frequency_passes: u8,
    pub deactivation_velocity_scale_square: u8,
    pub minimum_pathing_velocity_scale_square: u8,
    pub spiking_velocity_scale_threshold_squared: u8,
    pub minimum_spiking_velocity_scale_squared: u8,
}

impl Decode for DeactivationSettings {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        let settings = Self {
            max_dist_sqrd: r.read_f32()?,
            max_rot_sqrd: r.read_f32()?,
            inv_block_size: r.read_f32()?,
            pathing_upper_threshold: r.read_i16()?,
            pathing_lower_threshold: r.read_i16()?,
            num_deactivation_frequency_passes: r.read_u8()?,
            deactivation_velocity_scale_square: r.read_u8()?,
            minimum_pathing_velocity_scale_square: r.read_u8()?,
            spiking_velocity_scale_threshold_squared: r.read_u8()?,
            minimum_spiking_velocity_scale_squared: r.read_u8()?,
        };
        r.skip(3)?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FullCastSettings {
    pub min_separation: f32,
    pub min_extra_separation: f32,
    pub toi_separation: f32,
    pub toi_extra_separation: f32,
    pub toi_accuracy: f32,
    pub relative_safe_delta_time: f32,
    pub absolute_safe_delta_time: f32,
    pub keep_time: f32,
    pub keep_distance: f32,
    pub max_iterations: i32,
}

impl Decode for FullCastSettings {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            min_separation: r.read_f32()?,
            min_extra_separation: r.read_f32()?,
            toi_separation: r.read_f32()?,
            toi_extra_separation: r.read_f32()?,
            toi_accuracy: r.read_f32()?,
            relative_safe_delta_time: r.read_f32()?,
            absolute_safe_delta_time: r.read_f32()?,
            keep_time: r.read_f32()?,
            keep_distance: r.read_f32()?,
            max_iterations: r.read_i32()?,
        })
    }
}

/// `hknpBodyCinfo`: construction info for one rigid body.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BodyCinfo {
    pub shape: Option<ObjectIndex>,
    pub flags: i32,
    pub collision_cntrl: i16,
    pub collision_filter_info: u32,
    pub material_id: u16,
    pub quality_id: u8,
    pub name: Option<String>,
    pub user_data: u64,
    pub motion_type: u8,
    pub position: Vector4,
    pub orientation: Quaternion,
    pub linear_velocity: Vector4,
    pub angular_velocity: Vector4,
    pub mass: f32,
    pub mass_distribution: Option<ObjectIndex>,
    pub drag_properties: Option<ObjectIndex>,
    pub motion_properties_id: u16,
    pub desired_body_id: u32,
    pub motion_id: u32,
    pub collision_look_ahead_distance: f32,
    pub local_frame: Option<ObjectIndex>,
    pub activation_priority: i8,
}

impl Decode for BodyCinfo {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        let shape = r.read_pointer()?;
        let flags = r.read_i32()?;
        let collision_cntrl = r.read_i16()?;
        r.skip(2)?;
        let collision_filter_info = r.read_u32()?;
        let material_id = r.read_u16()?;
        let quality_id = r.read_u8()?;
        r.skip(1)?;
        let name = r.read_string()?;
        let user_data = r.read_u64()?;
        let motion_type = r.read_u8()?;
        r.skip(7)?;
        let position = Vector4::decode(r)?;
        let orientation = Quaternion::decode(r)?;
        let linear_velocity = Vector4::decode(r)?;
        let angular_velocity = Vector4::decode(r)?;
        let mass = r.read_f32()?;
        r.skip(4)?;
        let mass_distribution = r.read_pointer()?;
        let drag_properties = r.read_pointer()?;
        let motion_properties_id = r.read_u16()?;
        r.skip(2)?;
        let desired_body_id = r.read_u32()?;
        let motion_id = r.read_u32()?;
        let collision_look_ahead_distance = r.read_f32()?;
        let local_frame = r.read_pointer()?;
        let activation_priority = r.read_i8()?;
        r.skip(15)?;
        Ok(Self {
            shape,
            flags,
            collision_cntrl,
            collision_filter_info,
            material_id,
            quality_id,
            name,
            user_data,
            motion_type,
            position,
            orientation,
            linear_velocity,
            angular_velocity,
            mass,
            mass_distribution,
            drag_properties,
            motion_properties_id,
            desired_body_id,
            motion_id,
            collision_look_ahead_distance,
            local_frame,
            activation_priority,
        })
    }
}

/// `hknpPhysicsSystemData::bodyCinfoWithAttachment`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BodyCinfoWithAttachment {
    pub body: BodyCinfo,
    /// Index of the body this one is attached to, -1 for none.
    pub attached_body: i32,
}

impl Decode for BodyCinfoWithAttachment {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            body: BodyCinfo::decode(r)?,
            attached_body: r.read_i32()?,
        })
    }
}

/// `hknpConstraintCinfo`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConstraintCinfo {
    pub constraint_data: Option<ObjectIndex>,
    pub body_a: u32,
    pub body_b: u32,
    pub flags: u16,
    pub name: Option<String>,
    pub desired_constraint_id: u32,
    pub constraint_group_id: u32,
}

impl Decode for ConstraintCinfo {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        let constraint_data = r.read_pointer()?;
        let body_a = r.read_u32()?;
        let body_b = r.read_u32()?;
        let flags = r.read_u16()?;
        r.skip(6)?;
        Ok(Self {
            constraint_data,
            body_a,
            body_b,
            flags,
            name: r.read_string()?,
            desired_constraint_id: r.read_u32()?,
            constraint_group_id: r.read_u32()?,
        })
    }
}

/// `hkpConstraintData` and its atom-carrying subclasses.
///
/// The atoms are kept as raw bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConstraintData {
    pub base: ReferencedObject,
    pub user_data: u64,
    pub atoms: Vec<u8>,
}

impl ConstraintData {
    pub const RAGDOLL_ATOMS: usize = 384;
    pub const LIMITED_HINGE_ATOMS: usize = 272;

    /// Read the common header followed by `atoms` bytes of atom data.
    pub fn read_with_atoms(r: &mut FieldReader<'_>, atoms: usize) -> Result<Self> {
        Ok(Self {
            base: ReferencedObject::decode(r)?,
            user_data: r.read_u64()?,
            atoms: r.read_bytes(atoms)?.to_vec(),
        })
    }
}

impl Decode for ConstraintData {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        Self::read_with_atoms(r, 0)
    }
}

/// `hkpRagdollConstraintData`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RagdollConstraintData(pub ConstraintData);

impl Decode for RagdollConstraintData {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        ConstraintData::read_with_atoms(r, ConstraintData::RAGDOLL_ATOMS).map(Self)
    }
}

/// `hkpLimitedHingeConstraintData`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LimitedHingeConstraintData(pub ConstraintData);

impl Decode for LimitedHingeConstraintData {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        ConstraintData::read_with_atoms(r, ConstraintData::LIMITED_HINGE_ATOMS).map(Self)
    }
}

/// `hknpRefMassDistribution`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RefMassDistribution {
    pub base: ReferencedObject,
    pub center_of_mass_and_volume: Vector4,
    pub major_axis_space: Quaternion,
    pub inertia_tensor: Vector4,
}

impl Decode for RefMassDistribution {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            base: ReferencedObject::decode(r)?,
            center_of_mass_and_volume: Vector4::decode(r)?,
            major_axis_space: Quaternion::decode(r)?,
            inertia_tensor: Vector4::decode(r)?,
        })
    }
}

/// `hknpRefDragProperties`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RefDragProperties {
    pub base: ReferencedObject,
    pub center_and_offset: [Vector4; 3],
    pub angular_effects_and_area: [Vector4; 6],
    pub arm_uvs: [f32; 12],
}

impl Decode for RefDragProperties {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        let base = ReferencedObject::decode(r)?;
        let mut center_and_offset = [Vector4::default(); 3];
        for v in &mut center_and_offset {
            *v = Vector4::decode(r)?;
        }
        let mut angular_effects_and_area = [Vector4::default(); 6];
        for v in &mut angular_effects_and_area {
            *v = Vector4::decode(r)?;
        }
        let mut arm_uvs = [0.0; 12];
        for v in &mut arm_uvs {
            *v = r.read_f32()?;
        }
        Ok(Self {
            base,
            center_and_offset,
            angular_effects_and_area,
            arm_uvs,
        })
    }
}
