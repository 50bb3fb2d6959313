//! Assembling new object files.

use tracing::debug;

use crate::cursor::Writer;
use crate::entity::{PointerLiteral, TypeIndex};
use crate::error::Result;
use crate::object::{ItemEntry, ItemKind};
use crate::section::{HeaderLayout, SectionFlags};
use crate::tagfile::{encode, FileParts};
use crate::types::TypeTable;

const DATA_ALIGN: usize = 16;

/// Builds a `TAG0` file from a type table and object payloads.
///
/// Each `add_*` call appends one ITEM entry and returns the literal that
/// pointer and array fields use to refer to it. Literal 0 is the null entry.
#[derive(Debug, Clone)]
pub struct TagFileBuilder {
    types: TypeTable,
    sdk_version: Vec<u8>,
    data: Writer,
    items: Vec<ItemEntry>,
    compendium_id: Option<u64>,
    layout: HeaderLayout,
}

impl TagFileBuilder {
    pub fn new(types: TypeTable) -> Self {
        Self {
            types,
            sdk_version: b"20180100".to_vec(),
            data: Writer::new(),
            items: vec![ItemEntry::new(ItemKind::None, TypeIndex::NULL, 0, 0)],
            compendium_id: None,
            layout: HeaderLayout::Packed32,
        }
    }

    pub fn with_sdk_version(mut self, version: &str) -> Self {
        self.sdk_version = version.as_bytes().to_vec();
        self
    }

    /// Reference compendium `id` instead of embedding the type table. The
    /// table is still used to size items and must match the compendium's.
    pub fn with_compendium(mut self, id: u64) -> Self {
        self.compendium_id = Some(id);
        self
    }

    pub fn types(&self) -> &TypeTable {
        &self.types
    }

    /// Literal the next added item will get.
    pub fn next_literal(&self) -> PointerLiteral {
        PointerLiteral::new(self.items.len() as u64)
    }

    /// Append a single top-level object of type `ty`.
    pub fn add_object(&mut self, ty: TypeIndex, payload: &[u8]) -> PointerLiteral {
        self.add_item(ItemKind::Pointer.bits(), ty, 1, payload)
    }

    /// Append `count` consecutive elements of type `ty`.
    pub fn add_array(&mut self, ty: TypeIndex, count: usize, payload: &[u8]) -> PointerLiteral {
        self.add_item(ItemKind::Array.bits(), ty, count, payload)
    }

    /// Append a NUL-terminated character array of element type `ty`.
    pub fn add_string(&mut self, ty: TypeIndex, s: &str) -> PointerLiteral {
        let mut bytes = s.as_bytes().to_vec();
        bytes.push(0);
        self.add_array(ty, bytes.len(), &bytes)
    }

    /// Append an item with explicit kind bits. The payload is placed at the
    /// next 16-byte boundary of DATA.
    pub fn add_item(
        &mut self,
        kind_bits: u32,
        ty: TypeIndex,
        count: usize,
        payload: &[u8],
    ) -> PointerLiteral {
        let literal = self.next_literal();
        self.data.align_to(DATA_ALIGN);
        let offset = self.data.position();
        self.data.write_bytes(payload);
        self.items.push(ItemEntry::new(
            ItemKind::Other(kind_bits),
            ty,
            offset as i32,
            count as i32,
        ));
        literal
    }

    /// Encode the file.
    pub fn build(&self) -> Result<Vec<u8>> {
        let flags = SectionFlags::default();
        let bytes = encode(&FileParts {
            layout: self.layout,
            flags: &flags,
            sdk_version: &self.sdk_version,
            data: self.data.as_slice(),
            types: &self.types,
            compendium_id: self.compendium_id,
            items: &self.items,
            patches: None,
        })?;
        debug!(
            items = self.items.len(),
            data = self.data.position(),
            len = bytes.len(),
            "tagfile built"
        );
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tagfile::TagFile;
    use crate::types::{TypeDescriptor, TypeFormat};

    #[test]
    fn literals_follow_item_positions() {
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
        let mut b = TagFileBuilder::new(types);
        assert_eq!(b.next_literal().raw(), 1);
        let first = b.add_object(int, &7i32.to_le_bytes());
        let second = b.add_array(int, 2, &[1, 0, 0, 0, 2, 0, 0, 0]);
        assert_eq!((first.raw(), second.raw()), (1, 2));

        let bytes = b.build().unwrap();
        let file = TagFile::parse(&bytes).unwrap();
        assert_eq!(file.items().len(), 3);
        assert_eq!(file.items()[2].offset, 16);
        let objects = file.objects();
        assert_eq!(objects.len(), 4);
        assert_eq!(objects.roots().count(), 1);
    }
}
