use std::sync::Arc;

use tracing::debug;

use crate::compendium::{Compendium, CompendiumResolver};
use crate::cursor::{Cursor, Writer};
use crate::error::{Error, Result};
use crate::object::{
    read_items, ItemEntry, ObjectTable, DEFAULT_VARIABLE_LENGTH_PATTERN, ITEM_SIZE,
};
use crate::section::{
    begin_section, detect_root, end_section, peek_tag, read_section, write_raw_section,
    HeaderLayout, SectionFlags, Tag, HEADER_SIZE,
};
use crate::types::TypeTable;

/// Options for the container and object-table stages.
#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Header layout to use instead of the one implied by the top-level tag.
    pub header_layout: Option<HeaderLayout>,
    /// ITEM flags word whose entries are sliced by their count in bytes
    /// rather than by the type's byte size.
    pub variable_length_pattern: u32,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            header_layout: None,
            variable_length_pattern: DEFAULT_VARIABLE_LENGTH_PATTERN,
        }
    }
}

/// A parsed `TAG0` object file.
///
/// Borrows the input buffer: DATA and every TagObject slice point into it.
#[derive(Debug, Clone)]
pub struct TagFile<'a> {
    layout: HeaderLayout,
    flags: SectionFlags,
    sdk_version: &'a [u8],
    data: &'a [u8],
    types: Arc<TypeTable>,
    compendium_id: Option<u64>,
    items: Vec<ItemEntry>,
    objects: ObjectTable<'a>,
    patches: Option<&'a [u8]>,
}

impl<'a> TagFile<'a> {
    /// Parse a file that embeds its own types.
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        Self::parse_with(data, None, &ReadOptions::default())
    }

    /// Parse a file, resolving `TCRF` references through `resolver`.
    pub fn parse_with(
        data: &'a [u8],
        resolver: Option<&dyn CompendiumResolver>,
        options: &ReadOptions,
    ) -> Result<Self> {
        let (root, default_layout) = detect_root(data)?;
        if root != Tag::TAG0 {
            return Err(Error::FormatMismatch {
                offset: 0,
                expected: Tag::TAG0,
                found: root,
            });
        }
        let layout = options.header_layout.unwrap_or(default_layout);
        let mut flags = SectionFlags::default();

        let mut c = Cursor::new(data);
        let (h, mut body) = read_section(&mut c, layout, Tag::TAG0)?;
        flags.record(&h);

        let (h, sdkv) = read_section(&mut body, layout, Tag::SDKV)?;
        flags.record(&h);
        let (h, blob) = read_section(&mut body, layout, Tag::DATA)?;
        flags.record(&h);

        let (types, compendium_id) = if peek_tag(&body)? == Tag::TYPE {
            (Arc::new(TypeTable::read(&mut body, layout)?), None)
        } else {
            let (h, mut tcrf) = read_section(&mut body, layout, Tag::TCRF)?;
            flags.record(&h);
            let id = tcrf.read_u64()?;
            let types = resolver
                .and_then(|r| r.resolve(id))
                .ok_or(Error::MissingCompendium { id })?;
            (types, Some(id))
        };

        let (h, mut indx) = read_section(&mut body, layout, Tag::INDX)?;
        flags.record(&h);
        let (h, item) = read_section(&mut indx, layout, Tag::ITEM)?;
        flags.record(&h);
        let items = read_items(item)?;

        let patches = if body.remaining() >= HEADER_SIZE {
            let (h, ptch) = read_section(&mut body, layout, Tag::PTCH)?;
            flags.record(&h);
            Some(ptch.data())
        } else {
            None
        };

        let objects = ObjectTable::build(&items, blob.data(), &types, options.variable_length_pattern)?;
        debug!(
            data = blob.len(),
            items = items.len(),
            objects = objects.len(),
            compendium = ?compendium_id,
            "tagfile parsed"
        );

        Ok(Self {
            layout,
            flags,
            sdk_version: sdkv.data(),
            data: blob.data(),
            types,
            compendium_id,
            items,
            objects,
            patches,
        })
    }

    pub fn layout(&self) -> HeaderLayout {
        self.layout
    }

    /// Raw SDKV payload (an ASCII version string in practice).
    pub fn sdk_version(&self) -> &'a [u8] {
        self.sdk_version
    }

    /// The DATA blob.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn types(&self) -> &Arc<TypeTable> {
        &self.types
    }

    /// Id of the referenced compendium, when the file has no embedded types.
    pub fn compendium_id(&self) -> Option<u64> {
        self.compendium_id
    }

    pub fn items(&self) -> &[ItemEntry] {
        &self.items
    }

    pub fn objects(&self) -> &ObjectTable<'a> {
        &self.objects
    }

    /// Raw PTCH payload, kept uninterpreted.
    pub fn patches(&self) -> Option<&'a [u8]> {
        self.patches
    }

    /// Re-encode the file. A file that referenced a compendium writes the
    /// reference again rather than embedding the types.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        encode(&FileParts {
            layout: self.layout,
            flags: &self.flags,
            sdk_version: self.sdk_version,
            data: self.data,
            types: &self.types,
            compendium_id: self.compendium_id,
            items: &self.items,
            patches: self.patches,
        })
    }
}

/// The sections of an object file, ready to encode.
pub(crate) struct FileParts<'p> {
    pub layout: HeaderLayout,
    pub flags: &'p SectionFlags,
    pub sdk_version: &'p [u8],
    pub data: &'p [u8],
    pub types: &'p TypeTable,
    pub compendium_id: Option<u64>,
    pub items: &'p [ItemEntry],
    pub patches: Option<&'p [u8]>,
}

pub(crate) fn encode(parts: &FileParts<'_>) -> Result<Vec<u8>> {
    let layout = parts.layout;
    let flags = parts.flags;
    let mut w = Writer::with_capacity(parts.data.len() + parts.items.len() * ITEM_SIZE + 256);

    let root = begin_section(&mut w, Tag::TAG0);
    write_raw_section(&mut w, Tag::SDKV, layout, flags.get(Tag::SDKV), parts.sdk_version)?;
    write_raw_section(&mut w, Tag::DATA, layout, flags.get(Tag::DATA), parts.data)?;
    match parts.compendium_id {
        Some(id) => {
            write_raw_section(&mut w, Tag::TCRF, layout, flags.get(Tag::TCRF), &id.to_le_bytes())?
        }
        None => parts.types.write_type_section(&mut w, layout)?,
    }

    let indx = begin_section(&mut w, Tag::INDX);
    let item = begin_section(&mut w, Tag::ITEM);
    for entry in parts.items {
        entry.write(&mut w);
    }
    end_section(&mut w, item, layout, flags.get(Tag::ITEM))?;
    end_section(&mut w, indx, layout, flags.get(Tag::INDX))?;

    if let Some(patches) = parts.patches {
        write_raw_section(&mut w, Tag::PTCH, layout, flags.get(Tag::PTCH), patches)?;
    }
    end_section(&mut w, root, layout, flags.get(Tag::TAG0))?;
    Ok(w.into_bytes())
}

impl PartialEq for TagFile<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.layout == other.layout
            && self.sdk_version == other.sdk_version
            && self.data == other.data
            && self.types == other.types
            && self.compendium_id == other.compendium_id
            && self.items == other.items
            && self.patches == other.patches
    }
}

/// Either kind of tagfile.
#[derive(Debug, Clone)]
pub enum Tagfile<'a> {
    Objects(TagFile<'a>),
    Compendium(Compendium),
}

/// Parse a tagfile of either kind, chosen by its top-level tag.
pub fn read_any<'a>(
    data: &'a [u8],
    resolver: Option<&dyn CompendiumResolver>,
    options: &ReadOptions,
) -> Result<Tagfile<'a>> {
    match detect_root(data)?.0 {
        Tag::TCM0 => Ok(Tagfile::Compendium(Compendium::parse_with(data, options)?)),
        _ => Ok(Tagfile::Objects(TagFile::parse_with(data, resolver, options)?)),
    }
}
