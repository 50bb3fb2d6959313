#![allow(dead_code)]

use tagfile::cursor::Writer;
use tagfile::entity::EntityRef;
use tagfile::types::{MemberDescriptor, TemplateParam, TypeDescriptor, TypeFormat};
use tagfile::{TypeIndex, TypeTable};

pub fn scalar(name: &str, format: TypeFormat, size: u32) -> TypeDescriptor {
    TypeDescriptor {
        sub_type_flags: format.to_sub_type(),
        byte_size: size,
        alignment: size.min(8),
        ..TypeDescriptor::new(name)
    }
    .with_inferred_flags()
}

pub fn int32() -> TypeDescriptor {
    scalar("int", TypeFormat::Int { signed: true, bits: 32 }, 4)
}

pub fn char8() -> TypeDescriptor {
    scalar("char", TypeFormat::Int { signed: true, bits: 8 }, 1)
}

pub fn pointer_to(target: TypeIndex) -> TypeDescriptor {
    TypeDescriptor {
        pointer: Some(target),
        ..scalar("T*", TypeFormat::Pointer, 8)
    }
    .with_inferred_flags()
}

pub fn array_of(element: TypeIndex) -> TypeDescriptor {
    TypeDescriptor {
        templates: vec![TemplateParam::Type {
            name: "tT".into(),
            ty: element,
        }],
        ..scalar("hkArray", TypeFormat::Array, 16)
    }
}

pub fn member(name: &str, byte_offset: u32, ty: TypeIndex) -> MemberDescriptor {
    MemberDescriptor {
        name: name.into(),
        flags: 0,
        byte_offset,
        ty,
    }
}

pub fn record(name: &str, size: u32, members: Vec<MemberDescriptor>) -> TypeDescriptor {
    TypeDescriptor {
        members,
        ..scalar(name, TypeFormat::Record, size)
    }
    .with_inferred_flags()
}

/// Index the next pushed type will get.
pub fn next_index(types: &TypeTable) -> TypeIndex {
    TypeIndex::new(types.len() as u32)
}

/// `Leaf { v: int }` and its member type.
pub fn leaf_table() -> (TypeTable, TypeIndex) {
    let mut types = TypeTable::new();
    let int = types.push(int32());
    let leaf = types.push(record("Leaf", 4, vec![member("v", 0, int)]));
    (types, leaf)
}

/// Array field payload: literal, size, capacity-and-flags.
pub fn array_field(w: &mut Writer, literal: u64, size: i32) {
    w.write_u64(literal);
    w.write_i32(size);
    w.write_i32(size);
}
