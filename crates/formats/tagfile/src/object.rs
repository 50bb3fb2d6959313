//! Object table: ITEM entries expanded into TagObjects over the DATA blob,
//! plus the pointer table that maps pointer literals to object indices.

use serde::Serialize;
use tracing::debug;

use crate::cursor::{Cursor, Writer};
use crate::entity::{EntityRef, ObjectIndex, PointerLiteral, PrimaryMap, TypeIndex};
use crate::error::{Error, Result};
use crate::types::TypeTable;

/// Size of one ITEM entry on disk.
pub const ITEM_SIZE: usize = 12;

/// Flags word of the ITEM entries that hold a variable-length byte run
/// (observed on character arrays). Overridable through `ReadOptions`.
pub const DEFAULT_VARIABLE_LENGTH_PATTERN: u32 = 0x2000_002c;

const TYPE_MASK: u32 = 0x00ff_ffff;
const KIND_MASK: u32 = 0xff00_0000;

/// What an ITEM entry describes, from the high bits of its flags word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ItemKind {
    /// The null entry.
    None,
    /// A single object addressed by pointer fields.
    Pointer,
    /// A run of elements addressed by array fields.
    Array,
    /// Kind bits this reader does not interpret.
    Other(u32),
}

impl ItemKind {
    pub const POINTER_BIT: u32 = 0x1000_0000;
    pub const ARRAY_BIT: u32 = 0x2000_0000;

    pub fn bits(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Pointer => Self::POINTER_BIT,
            Self::Array => Self::ARRAY_BIT,
            Self::Other(bits) => bits,
        }
    }
}

/// One 12-byte ITEM entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ItemEntry {
    pub flags: u32,
    pub offset: i32,
    pub count: i32,
}

impl ItemEntry {
    pub fn new(kind: ItemKind, ty: TypeIndex, offset: i32, count: i32) -> Self {
        Self {
            flags: kind.bits() | (ty.index() & TYPE_MASK),
            offset,
            count,
        }
    }

    pub fn read(c: &mut Cursor<'_>) -> Result<Self> {
        Ok(Self {
            flags: c.read_u32()?,
            offset: c.read_i32()?,
            count: c.read_i32()?,
        })
    }

    pub fn write(&self, w: &mut Writer) {
        w.write_u32(self.flags);
        w.write_i32(self.offset);
        w.write_i32(self.count);
    }

    pub fn type_index(&self) -> TypeIndex {
        TypeIndex::new(self.flags & TYPE_MASK)
    }

    pub fn kind(&self) -> ItemKind {
        match self.flags & KIND_MASK {
            0 => ItemKind::None,
            ItemKind::POINTER_BIT => ItemKind::Pointer,
            ItemKind::ARRAY_BIT => ItemKind::Array,
            other => ItemKind::Other(other),
        }
    }
}

/// Read the ITEM payload.
pub fn read_items(mut c: Cursor<'_>) -> Result<Vec<ItemEntry>> {
    let mut items = Vec::with_capacity(c.remaining() / ITEM_SIZE);
    while c.remaining() >= ITEM_SIZE {
        items.push(ItemEntry::read(&mut c)?);
    }
    Ok(items)
}

/// One entry of the object table: a typed view into DATA.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagObject<'a> {
    pub ty: TypeIndex,
    pub bytes: &'a [u8],
    /// Flags word of the ITEM entry this object came from.
    pub flags: u32,
    /// Element count of the enclosing item, used when an array or string
    /// field does not state its own length.
    pub hint: u32,
    /// Position of the source ITEM entry.
    pub item: usize,
}

/// Maps pointer literals (ITEM positions) to the first object of each item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PointerTable {
    starts: Vec<ObjectIndex>,
}

impl PointerTable {
    /// Object designated by a pointer field. Literal 0 yields the null object.
    pub fn resolve(&self, literal: PointerLiteral) -> Result<ObjectIndex> {
        usize::try_from(literal.raw())
            .ok()
            .and_then(|i| self.starts.get(i))
            .copied()
            .ok_or(Error::UnresolvedPointer {
                literal: literal.raw(),
            })
    }

    pub fn len(&self) -> usize {
        self.starts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.starts.is_empty()
    }

    /// Literal that designates `index`, if it starts an item.
    pub fn literal_of(&self, index: ObjectIndex) -> Option<PointerLiteral> {
        self.starts
            .iter()
            .position(|&s| s == index)
            .map(|i| PointerLiteral::new(i as u64))
    }
}

/// The TagObject sequence of a file plus its pointer table.
#[derive(Debug, Clone, Default)]
pub struct ObjectTable<'a> {
    objects: PrimaryMap<ObjectIndex, TagObject<'a>>,
    pointers: PointerTable,
    /// Kind of each item, by ITEM position.
    kinds: Vec<ItemKind>,
}

impl<'a> ObjectTable<'a> {
    /// Expand `items` over `data`. Every slice is bounds-checked up front, so
    /// later lookups never fail for positions inside the table.
    pub fn build(
        items: &[ItemEntry],
        data: &'a [u8],
        types: &TypeTable,
        variable_length_pattern: u32,
    ) -> Result<Self> {
        let mut objects = PrimaryMap::with_capacity(items.len());
        let mut starts = Vec::with_capacity(items.len());
        let mut kinds = Vec::with_capacity(items.len());

        for (item, entry) in items.iter().enumerate() {
            let ty = entry.type_index();
            if ty.as_usize() >= types.len() {
                return Err(Error::CorruptTypeTable {
                    context: "item type",
                    index: ty.index() as u64,
                    len: types.len(),
                });
            }
            let out_of_bounds = |len: usize| Error::ObjectOutOfBounds {
                item,
                offset: entry.offset.max(0) as usize,
                len,
                data_len: data.len(),
            };
            let offset = usize::try_from(entry.offset).map_err(|_| out_of_bounds(0))?;
            let count = usize::try_from(entry.count).map_err(|_| out_of_bounds(0))?;
            let slice = |len: usize| -> Result<&'a [u8]> {
                offset
                    .checked_add(len)
                    .filter(|end| *end <= data.len())
                    .map(|end| &data[offset..end])
                    .ok_or_else(|| out_of_bounds(len))
            };

            starts.push(ObjectIndex::new(objects.len() as u32));
            kinds.push(entry.kind());

            if entry.flags == variable_length_pattern {
                objects.push(TagObject {
                    ty,
                    bytes: slice(count)?,
                    flags: entry.flags,
                    hint: count as u32,
                    item,
                });
                continue;
            }

            let size = types.byte_size(ty) as usize;
            let elements = match entry.kind() {
                ItemKind::Array => count,
                _ => count.max(1),
            };
            // Zero-sized elements cannot be bounded by DATA.
            if size == 0 && elements > 1 {
                return Err(out_of_bounds(0));
            }
            if elements == 0 {
                // Placeholder so the literal still designates a valid index.
                objects.push(TagObject {
                    ty,
                    bytes: slice(0)?,
                    flags: entry.flags,
                    hint: 0,
                    item,
                });
                continue;
            }
            let total = size
                .checked_mul(elements)
                .ok_or_else(|| out_of_bounds(usize::MAX))?;
            let run = slice(total)?;
            for i in 0..elements {
                objects.push(TagObject {
                    ty,
                    bytes: &run[i * size..(i + 1) * size],
                    flags: entry.flags,
                    hint: count as u32,
                    item,
                });
            }
        }

        debug!(
            items = items.len(),
            objects = objects.len(),
            "object table built"
        );
        Ok(Self {
            objects,
            pointers: PointerTable { starts },
            kinds,
        })
    }

    pub fn get(&self, index: ObjectIndex) -> Result<&TagObject<'a>> {
        self.objects.get(index).ok_or(Error::InvalidObjectIndex {
            index: index.index(),
            len: self.objects.len(),
        })
    }

    /// `count` consecutive objects starting at `start`.
    pub fn run(&self, start: ObjectIndex, count: usize) -> Result<&[TagObject<'a>]> {
        let begin = start.as_usize();
        self.objects
            .as_slice()
            .get(begin..begin.saturating_add(count))
            .ok_or(Error::InvalidObjectIndex {
                index: start.index().saturating_add(count as u32),
                len: self.objects.len(),
            })
    }

    pub fn pointers(&self) -> &PointerTable {
        &self.pointers
    }

    pub fn resolve(&self, literal: PointerLiteral) -> Result<ObjectIndex> {
        self.pointers.resolve(literal)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectIndex, &TagObject<'a>)> {
        self.objects.iter()
    }

    /// First object of every pointer item: the top-level objects of a file.
    pub fn roots(&self) -> impl Iterator<Item = ObjectIndex> + '_ {
        self.kinds
            .iter()
            .zip(&self.pointers.starts)
            .filter(|(kind, _)| **kind == ItemKind::Pointer)
            .map(|(_, start)| *start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TypeDescriptor, TypeFormat};

    fn table() -> (TypeTable, TypeIndex, TypeIndex) {
        let mut types = TypeTable::new();
        let int = types.push(
            TypeDescriptor {
                sub_type_flags: TypeFormat::Int { signed: true, bits: 32 }.to_sub_type(),
                byte_size: 4,
                alignment: 4,
                ..TypeDescriptor::new("int")
            }
            .with_inferred_flags(),
        );
        let ch = types.push(
            TypeDescriptor {
                sub_type_flags: TypeFormat::Int { signed: true, bits: 8 }.to_sub_type(),
                byte_size: 1,
                alignment: 1,
                ..TypeDescriptor::new("char")
            }
            .with_inferred_flags(),
        );
        (types, int, ch)
    }

    #[test]
    fn items_expand_into_objects() {
        let (types, int, _) = table();
        let data = [1u8, 0, 0, 0, 2, 0, 0, 0, 3, 0, 0, 0];
        let items = [
            ItemEntry::new(ItemKind::None, TypeIndex::NULL, 0, 0),
            ItemEntry::new(ItemKind::Pointer, int, 0, 1),
            ItemEntry::new(ItemKind::Array, int, 4, 2),
            ItemEntry::new(ItemKind::Array, int, 12, 0),
        ];
        let objects = ObjectTable::build(&items, &data, &types, DEFAULT_VARIABLE_LENGTH_PATTERN)
            .unwrap();
        // null + 1 + 2 + placeholder
        assert_eq!(objects.len(), 5);
        assert_eq!(objects.resolve(PointerLiteral::new(0)).unwrap(), ObjectIndex::NULL);
        let arr = objects.resolve(PointerLiteral::new(2)).unwrap();
        assert_eq!(arr, ObjectIndex::new(2));
        let run = objects.run(arr, 2).unwrap();
        assert_eq!(run[1].bytes, &[3, 0, 0, 0]);
        assert_eq!(run[1].hint, 2);
        let empty = objects.get(objects.resolve(PointerLiteral::new(3)).unwrap()).unwrap();
        assert!(empty.bytes.is_empty());
        assert_eq!(empty.hint, 0);
        assert_eq!(objects.roots().collect::<Vec<_>>(), [ObjectIndex::new(1)]);
    }

    #[test]
    fn variable_length_item_is_one_object() {
        let (types, _, ch) = table();
        let data = b"hello\0";
        let entry = ItemEntry::new(ItemKind::Array, ch, 0, 6);
        let items = [ItemEntry::new(ItemKind::None, TypeIndex::NULL, 0, 0), entry];
        let objects = ObjectTable::build(&items, data, &types, entry.flags).unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects.get(ObjectIndex::new(1)).unwrap().bytes, b"hello\0");
    }

    #[test]
    fn slice_past_data_is_out_of_bounds() {
        let (types, int, _) = table();
        let items = [ItemEntry::new(ItemKind::Array, int, 4, 2)];
        let err = ObjectTable::build(&items, &[0; 8], &types, DEFAULT_VARIABLE_LENGTH_PATTERN)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::ObjectOutOfBounds { item: 0, offset: 4, len: 8, data_len: 8 }
        ));
    }

    #[test]
    fn unknown_item_type_is_corrupt() {
        let (types, _, _) = table();
        let items = [ItemEntry::new(ItemKind::Pointer, TypeIndex::new(40), 0, 1)];
        assert!(matches!(
            ObjectTable::build(&items, &[], &types, DEFAULT_VARIABLE_LENGTH_PATTERN),
            Err(Error::CorruptTypeTable { context: "item type", .. })
        ));
    }

    #[test]
    fn unknown_literal_is_unresolved() {
        let pointers = PointerTable::default();
        assert!(matches!(
            pointers.resolve(PointerLiteral::new(9)),
            Err(Error::UnresolvedPointer { literal: 9 })
        ));
    }

    #[test]
    fn item_entry_wire_layout() {
        let entry = ItemEntry::new(ItemKind::Pointer, TypeIndex::new(7), 0x20, 1);
        let mut w = Writer::new();
        entry.write(&mut w);
        let bytes = w.into_bytes();
        assert_eq!(&bytes[..4], &[7, 0, 0, 0x10]);
        let items = read_items(Cursor::new(&bytes)).unwrap();
        assert_eq!(items, [entry]);
        assert_eq!(items[0].kind(), ItemKind::Pointer);
    }
}
