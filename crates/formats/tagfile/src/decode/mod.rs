//! Typed decoding of the object table.
//!
//! [`Decoder`] walks the pointer graph from a root with a worklist and
//! memoizes every object by index, so shared and cyclic references are
//! decoded once. Each object is read by a [`FieldReader`] over its own slice:
//! names found in the [`registry`] go to their typed decoder, everything else
//! is decoded from its type metadata into a [`Value`].
//!
//! Pointer fields never recurse. They resolve to an [`ObjectIndex`] and are
//! queued as graph edges; only inline data (array elements, embedded structs,
//! reflected records) nests, bounded by [`DecodeOptions::max_depth`].

mod primitives;
pub mod registry;
mod value;

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Serialize, Serializer};
use tracing::{debug, warn};

use crate::cursor::Cursor;
use crate::entity::{EntityRef, ObjectIndex, PointerLiteral, SecondaryMap, TypeIndex};
use crate::error::{Error, Result};
use crate::object::{ObjectTable, TagObject};
use crate::tagfile::TagFile;
use crate::types::TypeTable;

pub use primitives::{BitField, FreeListArray};
pub use registry::HavokObject;
pub use value::{decode_value, encode_value, Value};

/// A value read sequentially from a [`FieldReader`].
pub trait Decode: Sized {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self>;
}

/// Options for the typed decoding stage.
#[derive(Debug, Clone)]
pub struct DecodeOptions {
    /// Maximum nesting of inline values below one object.
    pub max_depth: usize,
    /// Whether records decoded from their metadata are reported in the
    /// unknown-type set. Opaque types are always reported.
    pub report_reflected_records: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            max_depth: 64,
            report_reflected_records: true,
        }
    }
}

/// State shared by every reader of one decoding pass.
struct DecodeContext<'a> {
    objects: &'a ObjectTable<'a>,
    types: &'a TypeTable,
    options: DecodeOptions,
    /// Pointer targets seen since the last drain.
    edges: RefCell<Vec<ObjectIndex>>,
    unknown: RefCell<BTreeSet<String>>,
}

macro_rules! delegate_reads {
    ($($name:ident -> $ty:ty),* $(,)?) => {
        $(
            pub fn $name(&mut self) -> Result<$ty> {
                self.cursor.$name()
            }
        )*
    };
}

/// Sequential reader over one TagObject, with pointer and array resolution.
pub struct FieldReader<'a> {
    ctx: &'a DecodeContext<'a>,
    object: TagObject<'a>,
    cursor: Cursor<'a>,
    depth: usize,
}

impl<'a> FieldReader<'a> {
    fn new(ctx: &'a DecodeContext<'a>, object: TagObject<'a>, depth: usize) -> Self {
        Self {
            ctx,
            object,
            cursor: Cursor::new(object.bytes),
            depth,
        }
    }

    /// The object being read.
    pub fn object(&self) -> &TagObject<'a> {
        &self.object
    }

    pub fn types(&self) -> &'a TypeTable {
        self.ctx.types
    }

    pub fn options(&self) -> &'a DecodeOptions {
        &self.ctx.options
    }

    /// Name of the object's type, for error messages.
    pub fn type_name(&self) -> &'a str {
        self.ctx.types.name(self.object.ty)
    }

    pub fn position(&self) -> usize {
        self.cursor.position()
    }

    pub fn remaining(&self) -> usize {
        self.cursor.remaining()
    }

    pub fn seek(&mut self, pos: usize) {
        self.cursor.seek(pos);
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.cursor.skip(n)
    }

    /// Skip to the next multiple of `align` within the object.
    pub fn align(&mut self, align: usize) -> Result<()> {
        let pad = (align - self.position() % align) % align;
        self.skip(pad)
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.cursor.read_bytes(n)
    }

    delegate_reads! {
        read_u8 -> u8,
        read_i8 -> i8,
        read_bool -> bool,
        read_u16 -> u16,
        read_i16 -> i16,
        read_u32 -> u32,
        read_u32_be -> u32,
        read_i32 -> i32,
        read_u64 -> u64,
        read_i64 -> i64,
        read_f16 -> f32,
        read_f32 -> f32,
        read_f64 -> f64,
    }

    /// Fail with [`Error::UnsupportedField`] attributed to this object's type.
    pub fn unsupported(&self, detail: impl Into<String>) -> Error {
        Error::unsupported(self.type_name(), detail)
    }

    /// Resolve a literal. The null literal and the null object are `None`.
    fn resolve(&self, literal: PointerLiteral) -> Result<Option<ObjectIndex>> {
        if literal.is_null() {
            return Ok(None);
        }
        let index = self.ctx.objects.resolve(literal)?;
        Ok((!index.is_null()).then_some(index))
    }

    /// Read an 8-byte pointer field and queue its target for decoding.
    pub fn read_pointer(&mut self) -> Result<Option<ObjectIndex>> {
        let literal = PointerLiteral::new(self.cursor.read_u64()?);
        let index = self.resolve(literal)?;
        if let Some(index) = index {
            self.ctx.edges.borrow_mut().push(index);
        }
        Ok(index)
    }

    /// Read an 8-byte pointer to a character array.
    pub fn read_string(&mut self) -> Result<Option<String>> {
        let offset = self.cursor.absolute_position();
        let literal = PointerLiteral::new(self.cursor.read_u64()?);
        let Some(start) = self.resolve(literal)? else {
            return Ok(None);
        };
        let mut bytes: Vec<u8> = self
            .elements(start, 0)?
            .iter()
            .filter_map(|o| o.bytes.first().copied())
            .collect();
        if let Some(end) = bytes.iter().position(|&b| b == 0) {
            bytes.truncate(end);
        }
        String::from_utf8(bytes)
            .map(Some)
            .map_err(|source| Error::InvalidString { offset, source })
    }

    /// Read a 16-byte dynamic array of `T`.
    pub fn read_array<T: Decode>(&mut self) -> Result<Vec<T>> {
        self.read_array_with(T::decode)
    }

    /// Read a dynamic array, decoding each element with `f`.
    pub fn read_array_with<T>(
        &mut self,
        mut f: impl FnMut(&mut FieldReader<'a>) -> Result<T>,
    ) -> Result<Vec<T>> {
        let literal = PointerLiteral::new(self.cursor.read_u64()?);
        let size = self.cursor.read_i32()?;
        let _capacity_and_flags = self.cursor.read_i32()?;
        let Some(start) = self.resolve(literal)? else {
            return Ok(Vec::new());
        };
        let size = usize::try_from(size)
            .map_err(|_| self.unsupported(format!("negative array size {size}")))?;
        self.decode_elements(start, size, &mut f)
    }

    /// Read a dynamic array whose elements are decoded from their metadata.
    pub fn read_value_array(&mut self) -> Result<Vec<Value>> {
        self.read_array_with(|e| {
            let ty = e.object().ty;
            decode_value(e, ty)
        })
    }

    /// Read an array of reference-counted pointers.
    pub fn read_ptr_array(&mut self) -> Result<Vec<Option<ObjectIndex>>> {
        self.read_array::<Option<ObjectIndex>>()
    }

    /// Read a 4-byte relative array: `u16` offset literal, then `u16` size.
    pub fn read_rel_array<T: Decode>(&mut self) -> Result<Vec<T>> {
        let literal = PointerLiteral::new(self.cursor.read_u16()? as u64);
        let size = self.cursor.read_u16()? as usize;
        match self.resolve(literal)? {
            Some(start) => self.decode_elements(start, size, &mut T::decode),
            None => Ok(Vec::new()),
        }
    }

    pub fn read_free_list_array<T: Decode>(&mut self) -> Result<FreeListArray<T>> {
        FreeListArray::decode(self)
    }

    pub fn read_bit_field(&mut self) -> Result<BitField> {
        BitField::decode(self)
    }

    /// Decode `T` from the next `len` bytes; the reader always advances by
    /// exactly `len`.
    pub fn read_embedded<T: Decode>(&mut self, len: usize) -> Result<T> {
        let bytes = self.cursor.read_bytes(len)?;
        let mut child = self.child(TagObject {
            bytes,
            ..self.object
        })?;
        T::decode(&mut child)
    }

    /// Decode a value of type `ty` at the current position from metadata.
    pub fn read_value(&mut self, ty: TypeIndex) -> Result<Value> {
        decode_value(self, ty)
    }

    /// Run `f` one inline level deeper.
    pub fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.depth = self.enter()?;
        let out = f(self);
        self.depth -= 1;
        out
    }

    fn enter(&self) -> Result<usize> {
        let limit = self.ctx.options.max_depth;
        if self.depth >= limit {
            return Err(Error::DepthExceeded { limit });
        }
        Ok(self.depth + 1)
    }

    fn child(&self, object: TagObject<'a>) -> Result<FieldReader<'a>> {
        Ok(FieldReader::new(self.ctx, object, self.enter()?))
    }

    /// The element objects of an array starting at `start`.
    ///
    /// A size of 0 falls back to the start object's count hint. Elements come
    /// from consecutive table entries, or are cut from one variable-length
    /// object when that object holds all of them.
    fn elements(&self, start: ObjectIndex, size: usize) -> Result<Vec<TagObject<'a>>> {
        let first = *self.ctx.objects.get(start)?;
        let count = if size > 0 { size } else { first.hint as usize };
        if count == 0 {
            return Ok(Vec::new());
        }
        let stride = self.ctx.types.byte_size(first.ty) as usize;
        if count > 1 && stride > 0 && first.bytes.len() >= stride.saturating_mul(count) {
            return Ok(first
                .bytes
                .chunks_exact(stride)
                .take(count)
                .map(|bytes| TagObject { bytes, ..first })
                .collect());
        }
        let run = self.ctx.objects.run(start, count)?;
        if run.iter().any(|o| o.item != first.item) {
            return Err(self.unsupported(format!(
                "array of {count} runs past the item at object {}",
                start.index()
            )));
        }
        Ok(run.to_vec())
    }

    fn decode_elements<T>(
        &self,
        start: ObjectIndex,
        size: usize,
        f: &mut impl FnMut(&mut FieldReader<'a>) -> Result<T>,
    ) -> Result<Vec<T>> {
        self.elements(start, size)?
            .into_iter()
            .map(|object| f(&mut self.child(object)?))
            .collect()
    }

    /// Record `ty` as lacking a typed decoder. Warns once per name.
    pub(crate) fn note_unknown(&self, ty: TypeIndex) {
        let name = self.ctx.types.name(ty);
        if name.is_empty() || name == "T*" || registry::lookup(name).is_some() {
            return;
        }
        if self.ctx.unknown.borrow_mut().insert(name.to_owned()) {
            warn!(type_name = name, "no typed decoder, decoding from metadata");
        }
    }
}

/// An object that could not be decoded.
#[derive(Debug, Clone, Serialize)]
pub struct DecodeFailure {
    pub object: ObjectIndex,
    pub type_name: String,
    #[serde(serialize_with = "serialize_display")]
    pub error: Error,
}

fn serialize_display<S: Serializer>(error: &Error, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.collect_str(error)
}

/// A decoded object and the name of its type.
#[derive(Debug, Clone, Serialize)]
pub struct DecodedObject {
    pub type_name: String,
    pub value: Arc<HavokObject>,
}

/// Every object decoded from a file.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ObjectGraph {
    pub roots: Vec<ObjectIndex>,
    pub objects: BTreeMap<ObjectIndex, DecodedObject>,
    pub failures: Vec<DecodeFailure>,
    /// Type names that had no typed decoder.
    pub unknown_types: BTreeSet<String>,
}

impl ObjectGraph {
    pub fn get(&self, index: ObjectIndex) -> Option<&Arc<HavokObject>> {
        self.objects.get(&index).map(|o| &o.value)
    }

    /// Decoded objects whose type is named `name`, in index order.
    pub fn by_type<'g>(
        &'g self,
        name: &'g str,
    ) -> impl Iterator<Item = (ObjectIndex, &'g Arc<HavokObject>)> + 'g {
        self.objects
            .iter()
            .filter(move |(_, o)| o.type_name == name)
            .map(|(i, o)| (*i, &o.value))
    }

    pub fn failure(&self, index: ObjectIndex) -> Option<&DecodeFailure> {
        self.failures.iter().find(|f| f.object == index)
    }
}

/// Memoizing decoder over one file's object table.
pub struct Decoder<'a> {
    ctx: DecodeContext<'a>,
    memo: SecondaryMap<ObjectIndex, Arc<HavokObject>>,
    failures: BTreeMap<ObjectIndex, Error>,
}

impl<'a> Decoder<'a> {
    pub fn new(file: &'a TagFile<'a>) -> Self {
        Self::with_options(file, DecodeOptions::default())
    }

    pub fn with_options(file: &'a TagFile<'a>, options: DecodeOptions) -> Self {
        Self::from_parts(file.objects(), file.types(), options)
    }

    pub fn from_parts(
        objects: &'a ObjectTable<'a>,
        types: &'a TypeTable,
        options: DecodeOptions,
    ) -> Self {
        Self {
            ctx: DecodeContext {
                objects,
                types,
                options,
                edges: RefCell::new(Vec::new()),
                unknown: RefCell::new(BTreeSet::new()),
            },
            memo: SecondaryMap::new(),
            failures: BTreeMap::new(),
        }
    }

    /// Decode `index` and every object reachable from it.
    ///
    /// Each index is decoded at most once; asking again returns the same
    /// `Arc`. Failures of reachable objects are recorded without affecting
    /// the result for `index`.
    pub fn decode(&mut self, index: ObjectIndex) -> Result<Arc<HavokObject>> {
        let mut worklist = vec![index];
        while let Some(next) = worklist.pop() {
            if self.memo.contains_key(next) || self.failures.contains_key(&next) {
                continue;
            }
            let result = self.decode_one(next);
            let edges = self.ctx.edges.take();
            match result {
                Ok(object) => {
                    self.memo.insert(next, Arc::new(object));
                    worklist.extend(edges.into_iter().rev());
                }
                Err(error) => {
                    debug!(object = %next, %error, "object decode failed");
                    self.failures.insert(next, error);
                }
            }
        }
        match self.memo.get(index) {
            Some(object) => Ok(Arc::clone(object)),
            None => Err(self
                .failures
                .get(&index)
                .cloned()
                .unwrap_or(Error::InvalidObjectIndex {
                    index: index.as_usize() as u32,
                    len: self.ctx.objects.len(),
                })),
        }
    }

    fn decode_one(&self, index: ObjectIndex) -> Result<HavokObject> {
        let object = *self.ctx.objects.get(index)?;
        let mut reader = FieldReader::new(&self.ctx, object, 0);
        match registry::lookup(self.ctx.types.name(object.ty)) {
            Some(decode) => decode(&mut reader),
            None => decode_value(&mut reader, object.ty).map(HavokObject::Generic),
        }
    }

    /// Decode every top-level object and collect the results.
    pub fn decode_all(mut self) -> ObjectGraph {
        let roots: Vec<ObjectIndex> = self.ctx.objects.roots().collect();
        for root in &roots {
            // Failures stay in the failure map.
            let _ = self.decode(*root);
        }
        debug!(
            roots = roots.len(),
            decoded = self.memo.len(),
            failed = self.failures.len(),
            "object graph decoded"
        );
        self.into_graph(roots)
    }

    /// Type names seen so far without a typed decoder.
    pub fn unknown_types(&self) -> BTreeSet<String> {
        self.ctx.unknown.borrow().clone()
    }

    fn type_name_of(&self, index: ObjectIndex) -> String {
        self.ctx
            .objects
            .get(index)
            .map(|o| self.ctx.types.name(o.ty).to_owned())
            .unwrap_or_default()
    }

    fn into_graph(self, roots: Vec<ObjectIndex>) -> ObjectGraph {
        let objects = self
            .memo
            .iter()
            .map(|(index, value)| {
                let object = DecodedObject {
                    type_name: self.type_name_of(index),
                    value: Arc::clone(value),
                };
                (index, object)
            })
            .collect();
        let failures = self
            .failures
            .iter()
            .map(|(&object, error)| DecodeFailure {
                object,
                type_name: self.type_name_of(object),
                error: error.clone(),
            })
            .collect();
        ObjectGraph {
            roots,
            objects,
            failures,
            unknown_types: self.ctx.unknown.into_inner(),
        }
    }
}
