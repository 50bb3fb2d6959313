//! Type-name dispatch to typed decoders.

use std::collections::HashMap;
use std::sync::OnceLock;

use serde::Serialize;

use super::{Decode, FieldReader, Value};
use crate::error::Result;
use crate::havok::*;

macro_rules! havok_objects {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        /// A decoded object: a typed record, a bare scalar, or a value decoded
        /// from metadata.
        #[derive(Debug, Clone, PartialEq, Serialize)]
        pub enum HavokObject {
            $($variant($ty),)*
            /// Decoded from type metadata.
            Generic(Value),
        }

        $(
            impl From<$ty> for HavokObject {
                fn from(v: $ty) -> Self {
                    Self::$variant(v)
                }
            }
        )*
    };
}

havok_objects! {
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    U64(u64),
    Vector4(Vector4),
    Quaternion(Quaternion),
    QsTransform(QsTransform),
    Aabb(Aabb),
    Transform(Transform),
    FourAabb(FourAabb),
    NamedVariant(NamedVariant),
    RefPtr(RefPtr),
    RefCountedProperties(RefCountedProperties),
    PropertyEntry(PropertyEntry),
    AnimationContainer(AnimationContainer),
    Skeleton(Skeleton),
    Bone(Bone),
    SkeletonMapper(SkeletonMapper),
    SimpleMapping(SimpleMapping),
    PhysicsSceneData(PhysicsSceneData),
    PhysicsSystemData(PhysicsSystemData),
    RagdollData(RagdollData),
    Material(Material),
    MotionProperties(MotionProperties),
    RefMassDistribution(RefMassDistribution),
    RefDragProperties(RefDragProperties),
    BodyCinfo(BodyCinfo),
    BodyCinfoWithAttachment(BodyCinfoWithAttachment),
    ShapeMassProperties(ShapeMassProperties),
    ConstraintCinfo(ConstraintCinfo),
    ConstraintData(ConstraintData),
    RagdollConstraintData(RagdollConstraintData),
    LimitedHingeConstraintData(LimitedHingeConstraintData),
    Shape(Shape),
    ConvexShape(ConvexShape),
    ConvexPolytopeShape(ConvexPolytopeShape),
    Face(Face),
    Connectivity(Connectivity),
    Edge(Edge),
    CapsuleShape(CapsuleShape),
    CompositeShape(CompositeShape),
    CompoundShape(CompoundShape),
    VelocityInfo(VelocityInfo),
    SimdTreeNode(SimdTreeNode),
    CompressedMeshShape(CompressedMeshShape),
    CustomParamCompressedMeshShape(CustomParamCompressedMeshShape),
    CustomMeshParameter(CustomMeshParameter),
    TriangleData(TriangleData),
    PrimitiveData(PrimitiveData),
    CompressedMeshShapeData(CompressedMeshShapeData),
    StaticMeshTree(StaticMeshTree),
    Section(Section),
    Primitive(Primitive),
    PrimitiveDataRun(PrimitiveDataRun),
    Aabb4BytesCodec(Aabb4BytesCodec),
    Aabb5BytesCodec(Aabb5BytesCodec),
}

/// Decoder for one registered type.
pub type DecodeFn = fn(&mut FieldReader<'_>) -> Result<HavokObject>;

fn typed<T: Decode + Into<HavokObject>>(r: &mut FieldReader<'_>) -> Result<HavokObject> {
    T::decode(r).map(Into::into)
}

const ENTRIES: &[(&str, DecodeFn)] = &[
    ("hkUint8", typed::<u8>),
    ("hkInt16", typed::<i16>),
    ("hkUint16", typed::<u16>),
    ("int", typed::<i32>),
    ("hkUint32", typed::<u32>),
    ("unsigned int", typed::<u32>),
    ("hkUint64", typed::<u64>),
    ("unsigned long long", typed::<u64>),
    ("hkVector4f", typed::<Vector4>),
    ("hkVector4", typed::<Vector4>),
    ("hkQuaternionf", typed::<Quaternion>),
    ("hkQuaternion", typed::<Quaternion>),
    ("hkQsTransform", typed::<QsTransform>),
    ("hkAabb", typed::<Aabb>),
    ("hkTransformf", typed::<Transform>),
    ("hkcdFourAabb", typed::<FourAabb>),
    ("hkRootLevelContainer::NamedVariant", typed::<NamedVariant>),
    ("hkRefPtr", typed::<RefPtr>),
    ("hkRefCountedProperties", typed::<RefCountedProperties>),
    ("hkRefCountedProperties::Entry", typed::<PropertyEntry>),
    ("hkaAnimationContainer", typed::<AnimationContainer>),
    ("hkaSkeleton", typed::<Skeleton>),
    ("hkaBone", typed::<Bone>),
    ("hkaSkeletonMapper", typed::<SkeletonMapper>),
    ("hkaSkeletonMapperData::SimpleMapping", typed::<SimpleMapping>),
    ("hknpPhysicsSceneData", typed::<PhysicsSceneData>),
    ("hknpPhysicsSystemData", typed::<PhysicsSystemData>),
    ("hknpRagdollData", typed::<RagdollData>),
    ("hknpMaterial", typed::<Material>),
    ("hknpMotionProperties", typed::<MotionProperties>),
    ("hknpRefMassDistribution", typed::<RefMassDistribution>),
    ("hknpRefDragProperties", typed::<RefDragProperties>),
    ("hknpBodyCinfo", typed::<BodyCinfo>),
    (
        "hknpPhysicsSystemData::bodyCinfoWithAttachment",
        typed::<BodyCinfoWithAttachment>,
    ),
    ("hknpShapeMassProperties", typed::<ShapeMassProperties>),
    ("hknpConstraintCinfo", typed::<ConstraintCinfo>),
    ("hkpConstraintData", typed::<ConstraintData>),
    ("hkpRagdollConstraintData", typed::<RagdollConstraintData>),
    ("hkpLimitedHingeConstraintData", typed::<LimitedHingeConstraintData>),
    ("hknpShape", typed::<Shape>),
    ("hknpConvexShape", typed::<ConvexShape>),
    ("hknpConvexPolytopeShape", typed::<ConvexPolytopeShape>),
    ("hknpConvexPolytopeShape::Face", typed::<Face>),
    ("hknpConvexPolytopeShape::Connectivity", typed::<Connectivity>),
    ("hknpConvexPolytopeShape::Connectivity::Edge", typed::<Edge>),
    ("hknpCapsuleShape", typed::<CapsuleShape>),
    ("hknpCompositeShape", typed::<CompositeShape>),
    ("hknpCompoundShape", typed::<CompoundShape>),
    ("hknpCompoundShape::VelocityInfo", typed::<VelocityInfo>),
    ("hkcdSimdTree::Node", typed::<SimdTreeNode>),
    ("hknpCompressedMeshShape", typed::<CompressedMeshShape>),
    (
        "fsnpCustomParamCompressedMeshShape",
        typed::<CustomParamCompressedMeshShape>,
    ),
    ("fsnpCustomMeshParameter", typed::<CustomMeshParameter>),
    ("fsnpCustomMeshParameter::TriangleData", typed::<TriangleData>),
    ("fsnpCustomMeshParameter::PrimitiveData", typed::<PrimitiveData>),
    ("hknpCompressedMeshShapeData", typed::<CompressedMeshShapeData>),
    ("hknpCompressedMeshShapeTree", typed::<StaticMeshTree>),
    ("hkcdStaticMeshTree::Section", typed::<Section>),
    ("hkcdStaticMeshTree::Primitive", typed::<Primitive>),
    ("hkcdDefaultStaticMeshTree::PrimitiveDataRun", typed::<PrimitiveDataRun>),
    ("hkcdCompressedAabbCodecs::Aabb4BytesCodec", typed::<Aabb4BytesCodec>),
    ("hkcdCompressedAabbCodecs::Aabb5BytesCodec", typed::<Aabb5BytesCodec>),
];

/// The typed decoder registered for `name`.
pub fn lookup(name: &str) -> Option<DecodeFn> {
    static TABLE: OnceLock<HashMap<&'static str, DecodeFn>> = OnceLock::new();
    TABLE
        .get_or_init(|| ENTRIES.iter().copied().collect())
        .get(name)
        .copied()
}

/// Every registered type name.
pub fn names() -> impl Iterator<Item = &'static str> {
    ENTRIES.iter().map(|(name, _)| *name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn names_are_unique() {
        let mut seen = HashSet::new();
        for name in names() {
            assert!(seen.insert(name), "duplicate registry entry {name}");
        }
    }

    #[test]
    fn lookup_by_exact_name() {
        assert!(lookup("hkaSkeleton").is_some());
        assert!(lookup("hkcdStaticMeshTree::Section").is_some());
        assert!(lookup("hkaskeleton").is_none());
        assert!(lookup("Leaf").is_none());
    }
}
