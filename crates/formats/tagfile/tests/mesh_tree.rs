mod common;

use common::*;
use tagfile::cursor::Writer;
use tagfile::havok::{quantize_shared_vertex, Aabb, MeshPrimitive, Vector4};
use tagfile::types::TypeFormat;
use tagfile::{Decoder, Error, HavokObject, TagFile, TagFileBuilder, TypeTable};

fn write_aabb(w: &mut Writer, min: f32, max: f32) {
    for v in [min, min, min, 0.0, max, max, max, 0.0] {
        w.write_f32(v);
    }
}

fn opaque_record(types: &mut TypeTable, name: &str, size: u32) -> tagfile::TypeIndex {
    types.push(scalar(name, TypeFormat::Record, size))
}

/// One section with two packed and two shared vertices, a triangle and a quad.
fn mesh_file() -> Vec<u8> {
    let mut types = TypeTable::new();
    let tree = opaque_record(&mut types, "hknpCompressedMeshShapeTree", 160);
    let section = opaque_record(&mut types, "hkcdStaticMeshTree::Section", 96);
    let primitive = opaque_record(&mut types, "hkcdStaticMeshTree::Primitive", 4);
    let u16_ty = types.push(scalar(
        "hkUint16",
        TypeFormat::Int {
            signed: false,
            bits: 16,
        },
        2,
    ));
    let u32_ty = types.push(scalar(
        "hkUint32",
        TypeFormat::Int {
            signed: false,
            bits: 32,
        },
        4,
    ));
    let u64_ty = types.push(scalar(
        "hkUint64",
        TypeFormat::Int {
            signed: false,
            bits: 64,
        },
        8,
    ));

    let mut t = Writer::new();
    array_field(&mut t, 0, 0);
    write_aabb(&mut t, 0.0, 100.0);
    t.write_i32(2);
    t.write_i32(8);
    t.write_u32(255);
    t.write_u8(0);
    t.pad_to(64);
    for (literal, size) in [(2, 1), (3, 2), (4, 2), (5, 2), (6, 2), (0, 0)] {
        array_field(&mut t, literal, size);
    }
    assert_eq!(t.position(), 160);

    let mut s = Writer::new();
    array_field(&mut s, 0, 0);
    write_aabb(&mut s, 0.0, 0.0);
    for p in [0.0, 0.0, 0.0, 1.0, 1.0, 1.0] {
        s.write_f32(p);
    }
    for first in [0u32; 4] {
        s.write_u32(first);
    }
    s.write_bytes(&[2, 2, 0, 0]);
    s.write_u16(0);
    s.write_bytes(&[0, 0]);
    assert_eq!(s.position(), 96);

    let domain = Aabb {
        min: Vector4::new(0.0, 0.0, 0.0, 0.0),
        max: Vector4::new(100.0, 100.0, 100.0, 0.0),
    };
    let mut shared = Writer::new();
    for v in [
        Vector4::new(10.0, 0.0, 0.0, 1.0),
        Vector4::new(0.0, 10.0, 0.0, 1.0),
    ] {
        shared.write_u64(quantize_shared_vertex(&domain, v));
    }
    let mut packed = Writer::new();
    packed.write_u32(1);
    packed.write_u32(1 << 11);

    let mut b = TagFileBuilder::new(types);
    b.add_object(tree, t.as_slice());
    b.add_array(section, 1, s.as_slice());
    b.add_array(primitive, 2, &[0, 1, 2, 2, 0, 1, 2, 3]);
    b.add_array(u16_ty, 2, &[0, 0, 1, 0]);
    b.add_array(u32_ty, 2, packed.as_slice());
    b.add_array(u64_ty, 2, shared.as_slice());
    b.build().unwrap()
}

#[test]
fn mesh_tree_unpacks_from_file() {
    let bytes = mesh_file();
    let file = TagFile::parse(&bytes).unwrap();
    let graph = Decoder::new(&file).decode_all();
    assert!(graph.failures.is_empty(), "{:?}", graph.failures);

    let HavokObject::StaticMeshTree(tree) = &**graph.get(graph.roots[0]).unwrap() else {
        panic!("expected a mesh tree");
    };
    assert_eq!(tree.num_primitive_keys, 2);
    assert_eq!(tree.domain.max.x, 100.0);
    assert_eq!(tree.sections.len(), 1);
    assert_eq!(tree.sections[0].num_packed_vertices, 2);
    assert_eq!(tree.shared_vertices_index, [0, 1]);

    let prims = tree.unpack().unwrap();
    assert_eq!(prims.len(), 2);
    let MeshPrimitive::Triangle([a, b, c]) = prims[0] else {
        panic!("expected a triangle, got {:?}", prims[0]);
    };
    assert_eq!((a.x, a.y, a.z), (1.0, 0.0, 0.0));
    assert_eq!((b.x, b.y, b.z), (0.0, 1.0, 0.0));
    assert!((c.x - 10.0).abs() < 1e-3 && c.y.abs() < 1e-3);
    let MeshPrimitive::Quad(quad) = prims[1] else {
        panic!("expected a quad, got {:?}", prims[1]);
    };
    assert!((quad[3].y - 10.0).abs() < 1e-3 && quad[3].x.abs() < 1e-3);
}

#[test]
fn shared_vertices_stay_within_one_step() {
    let domain = Aabb {
        min: Vector4::new(0.0, 0.0, 0.0, 0.0),
        max: Vector4::new(100.0, 100.0, 100.0, 0.0),
    };
    let step = 100.0 / (1u32 << 21) as f32;
    for i in 0..=100u32 {
        let t = i as f32 * 0.9973;
        let v = Vector4::new(t, 100.0 - t, (t * 7.0) % 100.0, 1.0);
        let word = quantize_shared_vertex(&domain, v);
        let back = tagfile::havok::dequantize_shared_vertex(&domain, word);
        assert!((back.x - v.x).abs() < step, "{v:?} -> {back:?}");
        assert!((back.y - v.y).abs() < step, "{v:?} -> {back:?}");
        assert!((back.z - v.z).abs() < step, "{v:?} -> {back:?}");
    }
}

#[test]
fn property_bag_is_unsupported() {
    let mut types = TypeTable::new();
    let props = opaque_record(&mut types, "hkRefCountedProperties", 32);
    let mut payload = Writer::new();
    payload.write_u64(5);
    payload.pad_to(32);
    let mut b = TagFileBuilder::new(types);
    b.add_object(props, payload.as_slice());
    let bytes = b.build().unwrap();

    let file = TagFile::parse(&bytes).unwrap();
    let graph = Decoder::new(&file).decode_all();
    let failure = graph.failure(graph.roots[0]).unwrap();
    assert_eq!(failure.type_name, "hkRefCountedProperties");
    assert!(matches!(failure.error, Error::UnsupportedField { .. }));
}
