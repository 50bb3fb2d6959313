//! Typed records for the engine's object types.
//!
//! Each record reads its fields in declaration order with a
//! [`FieldReader`](crate::decode::FieldReader); padding is skipped
//! explicitly. Derived records embed their parent record as the first field.

pub mod animation;
pub mod base;
pub mod math;
pub mod mesh_tree;
pub mod physics;
pub mod shape;

pub use animation::{AnimationContainer, Bone, SimpleMapping, Skeleton, SkeletonMapper};
pub use base::{NamedVariant, PropertyEntry, RefCountedProperties, RefPtr, ReferencedObject};
pub use math::{Aabb, FourAabb, QsTransform, Quaternion, Transform, Vector4};
pub use mesh_tree::{
    dequantize_shared_vertex, quantize_shared_vertex, Aabb4BytesCodec, Aabb5BytesCodec,
    CompressedMeshShape, CompressedMeshShapeData, CustomMeshParameter,
    CustomParamCompressedMeshShape, MeshPrimitive, Primitive, PrimitiveData, PrimitiveDataRun,
    Section, StaticMeshTree, TriangleData,
};
pub use physics::{
    BodyCinfo, BodyCinfoWithAttachment, ConstraintCinfo, ConstraintData,
    LimitedHingeConstraintData, Material, MotionProperties, PhysicsSceneData, PhysicsSystemData,
    RagdollConstraintData, RagdollData, RefDragProperties, RefMassDistribution,
};
pub use shape::{
    CapsuleShape, CompositeShape, CompoundShape, Connectivity, ConvexPolytopeShape, ConvexShape,
    Edge, Face, Shape, ShapeInstance, ShapeMassProperties, SimdTree, SimdTreeNode, VelocityInfo,
};
