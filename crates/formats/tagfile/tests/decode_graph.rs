mod common;

use std::sync::Arc;

use common::*;
use tagfile::cursor::Writer;
use tagfile::entity::EntityRef;
use tagfile::havok::Bone;
use tagfile::types::TypeFormat;
use tagfile::{
    DecodeOptions, Decoder, Error, HavokObject, TagFile, TagFileBuilder, TypeIndex, TypeTable,
    Value,
};

fn leaf_value(v: i64) -> HavokObject {
    HavokObject::Generic(Value::Record {
        type_name: "Leaf".into(),
        fields: vec![("v".into(), Value::Int(v))],
    })
}

fn leaf_file(payload: &[u8]) -> Vec<u8> {
    let (types, leaf) = leaf_table();
    let mut b = TagFileBuilder::new(types);
    b.add_object(leaf, payload);
    b.build().unwrap()
}

#[test]
fn leaf_decodes_from_metadata() {
    let bytes = leaf_file(&[7, 0, 0, 0]);
    let file = TagFile::parse(&bytes).unwrap();

    let graph = Decoder::new(&file).decode_all();
    assert_eq!(graph.roots.len(), 1);
    assert!(graph.failures.is_empty());
    assert_eq!(**graph.get(graph.roots[0]).unwrap(), leaf_value(7));
    assert!(graph.unknown_types.contains("Leaf"));
    assert_eq!(graph.by_type("Leaf").count(), 1);
}

#[test]
fn negative_ints_are_sign_extended() {
    let bytes = leaf_file(&(-5i32).to_le_bytes());
    let file = TagFile::parse(&bytes).unwrap();
    let graph = Decoder::new(&file).decode_all();
    assert_eq!(**graph.get(graph.roots[0]).unwrap(), leaf_value(-5));
}

#[test]
fn reflected_records_can_be_left_out_of_unknown_types() {
    let bytes = leaf_file(&[1, 0, 0, 0]);
    let file = TagFile::parse(&bytes).unwrap();
    let options = DecodeOptions {
        report_reflected_records: false,
        ..DecodeOptions::default()
    };
    let graph = Decoder::with_options(&file, options).decode_all();
    assert!(graph.failures.is_empty());
    assert!(graph.unknown_types.is_empty());
}

#[test]
fn depth_limit_fails_only_that_object() {
    let bytes = leaf_file(&[7, 0, 0, 0]);
    let file = TagFile::parse(&bytes).unwrap();
    let options = DecodeOptions {
        max_depth: 0,
        ..DecodeOptions::default()
    };
    let mut decoder = Decoder::with_options(&file, options);
    let root = file.objects().roots().next().unwrap();
    assert!(matches!(
        decoder.decode(root),
        Err(Error::DepthExceeded { limit: 0 })
    ));

    let graph = decoder.decode_all();
    assert_eq!(graph.failures.len(), 1);
    assert_eq!(graph.failures[0].type_name, "Leaf");
    assert!(graph.objects.is_empty());
}

/// Two `Node { next: Node* }` objects; `next` holds the given literals.
fn node_file(a_next: u64, b_next: u64) -> Vec<u8> {
    let mut types = TypeTable::new();
    // The pointer type refers forward to Node, pushed right after it.
    let node_ptr = types.push(pointer_to(TypeIndex::new(2)));
    let node = types.push(record("Node", 8, vec![member("next", 0, node_ptr)]));
    let mut b = TagFileBuilder::new(types);
    b.add_object(node, &a_next.to_le_bytes());
    b.add_object(node, &b_next.to_le_bytes());
    b.build().unwrap()
}

#[test]
fn pointer_cycle_decodes_once() {
    let bytes = node_file(2, 1);
    let file = TagFile::parse(&bytes).unwrap();
    let roots: Vec<_> = file.objects().roots().collect();
    let (a, b) = (roots[0], roots[1]);

    let mut decoder = Decoder::new(&file);
    let first = decoder.decode(a).unwrap();
    let again = decoder.decode(a).unwrap();
    assert!(Arc::ptr_eq(&first, &again));

    let HavokObject::Generic(value) = &*first else {
        panic!("expected a generic record, got {first:?}");
    };
    assert_eq!(value.field("next").and_then(Value::as_pointer), Some(b));

    let graph = decoder.decode_all();
    assert_eq!(graph.objects.len(), 2);
    let HavokObject::Generic(value) = &**graph.get(b).unwrap() else {
        panic!("expected a generic record");
    };
    assert_eq!(value.field("next").and_then(Value::as_pointer), Some(a));
}

#[test]
fn unresolved_pointer_is_isolated() {
    let bytes = node_file(2, 99);
    let file = TagFile::parse(&bytes).unwrap();
    let roots: Vec<_> = file.objects().roots().collect();

    let graph = Decoder::new(&file).decode_all();
    assert!(graph.get(roots[0]).is_some());
    let failure = graph.failure(roots[1]).unwrap();
    assert!(matches!(
        failure.error,
        Error::UnresolvedPointer { literal: 99 }
    ));
}

#[test]
fn null_pointer_is_none() {
    let bytes = node_file(0, 0);
    let file = TagFile::parse(&bytes).unwrap();
    let graph = Decoder::new(&file).decode_all();
    let HavokObject::Generic(value) = &**graph.get(graph.roots[0]).unwrap() else {
        panic!("expected a generic record");
    };
    assert_eq!(value.field("next"), Some(&Value::Pointer(None)));
}

/// `Holder { items: hkArray<int> }` pointing at a run of three ints.
fn holder_file(declared_size: i32) -> Vec<u8> {
    let mut types = TypeTable::new();
    let int = types.push(int32());
    let array = types.push(array_of(int));
    let holder = types.push(record("Holder", 16, vec![member("items", 0, array)]));

    let mut b = TagFileBuilder::new(types);
    let mut payload = Writer::new();
    array_field(&mut payload, b.next_literal().raw() + 1, declared_size);
    b.add_object(holder, payload.as_slice());
    b.add_array(int, 3, &[1, 0, 0, 0, 2, 0, 0, 0, 3, 0, 0, 0]);
    b.build().unwrap()
}

fn holder_items(bytes: &[u8]) -> Value {
    let file = TagFile::parse(bytes).unwrap();
    let graph = Decoder::new(&file).decode_all();
    assert!(graph.failures.is_empty(), "{:?}", graph.failures);
    let HavokObject::Generic(value) = &**graph.get(graph.roots[0]).unwrap() else {
        panic!("expected a generic record");
    };
    value.field("items").cloned().unwrap()
}

#[test]
fn zero_array_size_uses_count_hint() {
    assert_eq!(
        holder_items(&holder_file(0)),
        Value::Array(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
    );
}

#[test]
fn declared_array_size_wins() {
    assert_eq!(
        holder_items(&holder_file(2)),
        Value::Array(vec![Value::Int(1), Value::Int(2)])
    );
}

#[test]
fn declared_array_size_stays_within_its_item() {
    let mut types = TypeTable::new();
    let int = types.push(int32());
    let array = types.push(array_of(int));
    let holder = types.push(record("Holder", 16, vec![member("items", 0, array)]));

    let mut b = TagFileBuilder::new(types);
    let mut payload = Writer::new();
    array_field(&mut payload, b.next_literal().raw() + 1, 3);
    b.add_object(holder, payload.as_slice());
    b.add_array(int, 1, &[1, 0, 0, 0]);
    b.add_object(int, &[42, 0, 0, 0]);
    b.add_object(int, &[43, 0, 0, 0]);
    let bytes = b.build().unwrap();

    let file = TagFile::parse(&bytes).unwrap();
    let holder_index = file.objects().roots().next().unwrap();
    let graph = Decoder::new(&file).decode_all();
    assert!(graph.get(holder_index).is_none());
    let failure = graph.failure(holder_index).unwrap();
    assert_eq!(failure.type_name, "Holder");
    assert!(matches!(failure.error, Error::UnsupportedField { .. }));
}

#[test]
fn opaque_member_past_record_end_is_eof() {
    let mut types = TypeTable::new();
    let blob = types.push(scalar("Blob", TypeFormat::Opaque, 8));
    let wrapper = types.push(record("Wrapper", 4, vec![member("blob", 0, blob)]));
    let mut b = TagFileBuilder::new(types);
    b.add_object(wrapper, &[1, 2, 3, 4]);
    let bytes = b.build().unwrap();

    let file = TagFile::parse(&bytes).unwrap();
    let graph = Decoder::new(&file).decode_all();
    let failure = graph.failure(graph.roots[0]).unwrap();
    assert!(matches!(failure.error, Error::UnexpectedEof { .. }));
}

#[test]
fn registered_type_uses_typed_decoder() {
    let mut types = TypeTable::new();
    let ch = types.push(char8());
    let bone = types.push(record("hkaBone", 16, Vec::new()));

    let mut b = TagFileBuilder::new(types);
    let mut payload = Writer::new();
    payload.write_u64(b.next_literal().raw() + 1);
    payload.write_u8(1);
    payload.pad_to(16);
    b.add_object(bone, payload.as_slice());
    b.add_string(ch, "Root");
    let bytes = b.build().unwrap();

    let file = TagFile::parse(&bytes).unwrap();
    let graph = Decoder::new(&file).decode_all();
    assert_eq!(
        **graph.get(graph.roots[0]).unwrap(),
        HavokObject::Bone(Bone {
            name: Some("Root".into()),
            lock_translation: true,
        })
    );
    assert!(graph.unknown_types.is_empty());
}

#[test]
fn graph_serializes_to_json() {
    let bytes = node_file(2, 99);
    let file = TagFile::parse(&bytes).unwrap();
    let graph = Decoder::new(&file).decode_all();

    let json = serde_json::to_value(&graph).unwrap();
    assert_eq!(json["roots"].as_array().unwrap().len(), 2);
    assert_eq!(json["objects"].as_object().unwrap().len(), 1);
    let failure = &json["failures"][0];
    assert_eq!(failure["type_name"], "Node");
    assert!(failure["error"].as_str().unwrap().contains("0x63"));
}
