//! Metadata-driven decoding for types without a typed decoder.

use serde::Serialize;

use super::FieldReader;
use crate::cursor::Writer;
use crate::entity::{ObjectIndex, TypeIndex};
use crate::error::{Error, Result};
use crate::types::{TypeFormat, TypeTable};

/// A value decoded from type metadata alone.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Value {
    Void,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(Option<String>),
    Pointer(Option<ObjectIndex>),
    /// Dynamic array elements.
    Array(Vec<Value>),
    /// Inline fixed-size array.
    Tuple(Vec<Value>),
    Record {
        type_name: String,
        fields: Vec<(String, Value)>,
    },
    /// Raw bytes of a type with no usable layout.
    Opaque(Vec<u8>),
}

impl Value {
    /// Field `name` of a record.
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Self::Record { fields, .. } => fields.iter().find(|(n, _)| n == name).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::Int(v) => Some(v),
            Self::UInt(v) => i64::try_from(v).ok(),
            _ => None,
        }
    }

    pub fn as_pointer(&self) -> Option<ObjectIndex> {
        match *self {
            Self::Pointer(p) => p,
            _ => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Void => "void",
            Self::Bool(_) => "bool",
            Self::Int(_) | Self::UInt(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Pointer(_) => "pointer",
            Self::Array(_) => "array",
            Self::Tuple(_) => "tuple",
            Self::Record { .. } => "record",
            Self::Opaque(_) => "opaque",
        }
    }
}

fn element_type(types: &TypeTable, ty: TypeIndex) -> Result<TypeIndex> {
    types
        .target_type(ty)
        .filter(|t| !t.is_null())
        .ok_or_else(|| Error::unsupported(types.name(ty), "array without element type"))
}

/// Decode a value of type `ty` at the reader's position.
///
/// The reader ends `byte_size(ty)` bytes past where it started, whatever the
/// members consumed.
pub fn decode_value(r: &mut FieldReader<'_>, ty: TypeIndex) -> Result<Value> {
    let types = r.types();
    let start = r.position();
    let size = types.byte_size(ty) as usize;
    let value = match types.format(ty)? {
        TypeFormat::Void => Value::Void,
        TypeFormat::Opaque => {
            r.note_unknown(ty);
            Value::Opaque(r.read_bytes(size)?.to_vec())
        }
        TypeFormat::Bool => Value::Bool(read_uint(r, size)? != 0),
        TypeFormat::Int { signed, bits } => {
            let raw = read_uint(r, bits as usize / 8)?;
            if signed {
                let shift = 64 - bits as u32;
                Value::Int(((raw << shift) as i64) >> shift)
            } else {
                Value::UInt(raw)
            }
        }
        TypeFormat::Float => Value::Float(match size {
            2 => r.read_f16()? as f64,
            8 => r.read_f64()?,
            _ => r.read_f32()? as f64,
        }),
        TypeFormat::String => Value::String(r.read_string()?),
        TypeFormat::Pointer => Value::Pointer(r.read_pointer()?),
        TypeFormat::Array => {
            let elem = element_type(types, ty)?;
            Value::Array(r.read_array_with(|e| decode_value(e, elem))?)
        }
        TypeFormat::FixedArray { count } => {
            let elem = element_type(types, ty)?;
            let stride = types.byte_size(elem) as usize;
            let items = r.nested(|r| {
                (0..count as usize)
                    .map(|i| {
                        r.seek(start + i * stride);
                        decode_value(r, elem)
                    })
                    .collect::<Result<Vec<_>>>()
            })?;
            Value::Tuple(items)
        }
        TypeFormat::Record => {
            if r.options().report_reflected_records {
                r.note_unknown(ty);
            }
            let members = types.flattened_members(ty);
            let fields = r.nested(|r| {
                members
                    .iter()
                    .map(|m| {
                        r.seek(start + m.byte_offset as usize);
                        Ok((m.name.clone(), decode_value(r, m.ty)?))
                    })
                    .collect::<Result<Vec<_>>>()
            })?;
            Value::Record {
                type_name: types.name(ty).to_owned(),
                fields,
            }
        }
    };
    if size > 0 {
        r.seek(start + size);
    }
    Ok(value)
}

fn read_uint(r: &mut FieldReader<'_>, width: usize) -> Result<u64> {
    Ok(match width {
        1 => r.read_u8()? as u64,
        2 => r.read_u16()? as u64,
        8 => r.read_u64()?,
        _ => r.read_u32()? as u64,
    })
}

fn write_uint(w: &mut Writer, width: usize, v: u64) {
    let width = match width {
        1 | 2 | 8 => width,
        _ => 4,
    };
    w.write_bytes(&v.to_le_bytes()[..width]);
}

/// Encode `value` as type `ty`, writing exactly `byte_size(ty)` bytes.
///
/// Inverse of [`decode_value`] for scalars, tuples, records, opaque bytes and
/// null pointers. Values that live in other items (strings, arrays, non-null
/// pointers) cannot be written inline and are rejected.
pub fn encode_value(types: &TypeTable, ty: TypeIndex, value: &Value, w: &mut Writer) -> Result<()> {
    let start = w.position();
    let size = types.byte_size(ty) as usize;
    let format = types.format(ty)?;
    match (format, value) {
        (TypeFormat::Void, Value::Void) => {}
        (TypeFormat::Opaque, Value::Opaque(bytes)) => w.write_bytes(bytes),
        (TypeFormat::Bool, Value::Bool(b)) => write_uint(w, size, *b as u64),
        (TypeFormat::Int { bits, .. }, Value::Int(v)) => write_uint(w, bits as usize / 8, *v as u64),
        (TypeFormat::Int { bits, .. }, Value::UInt(v)) => write_uint(w, bits as usize / 8, *v),
        (TypeFormat::Float, Value::Float(v)) => match size {
            2 => w.write_f16(*v as f32),
            8 => w.write_f64(*v),
            _ => w.write_f32(*v as f32),
        },
        (TypeFormat::Pointer, Value::Pointer(None)) | (TypeFormat::String, Value::String(None)) => {
            w.write_u64(0)
        }
        (TypeFormat::FixedArray { count }, Value::Tuple(items)) if items.len() == count as usize => {
            let elem = element_type(types, ty)?;
            let stride = types.byte_size(elem) as usize;
            for (i, item) in items.iter().enumerate() {
                w.pad_to(start + i * stride);
                encode_value(types, elem, item, w)?;
            }
        }
        (TypeFormat::Record, Value::Record { .. }) => {
            for m in types.flattened_members(ty) {
                let field = value.field(&m.name).ok_or_else(|| {
                    Error::unsupported(types.name(ty), format!("missing field {}", m.name))
                })?;
                w.pad_to(start + m.byte_offset as usize);
                encode_value(types, m.ty, field, w)?;
            }
        }
        (format, value) => {
            return Err(Error::unsupported(
                types.name(ty),
                format!("cannot encode {} value as {format:?}", value.kind()),
            ))
        }
    }
    w.pad_to(start + size);
    Ok(())
}
