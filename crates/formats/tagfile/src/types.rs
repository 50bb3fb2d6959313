//! Embedded type system.
//!
//! A tagfile describes every type it serializes. [`TypeTable::read`] builds
//! the table from a `TYPE` section in two passes: TNA1 allocates every slot
//! with its name and template parameters, then TBDY fills in parents, layout
//! and members. Records may refer to slots that appear later, which is why
//! all slots exist before any body is read.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cursor::{Cursor, Writer};
use crate::entity::{EntityRef, PrimaryMap, TypeIndex};
use crate::error::{Error, Result};
use crate::section::{
    begin_section, end_section, peek_tag, read_section, write_raw_section, HeaderLayout,
    SectionFlags, Tag,
};
use crate::strings::StringTable;

/// Optional-field bits of a TBDY record.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeFlags(u32);

impl TypeFlags {
    pub const SUB_TYPE: Self = Self(0x01);
    pub const POINTER: Self = Self(0x02);
    pub const VERSION: Self = Self(0x04);
    pub const BYTE_SIZE: Self = Self(0x08);
    pub const ABSTRACT_VALUE: Self = Self(0x10);
    pub const MEMBERS: Self = Self(0x20);
    pub const INTERFACES: Self = Self(0x40);
    pub const ATTRIBUTE: Self = Self(0x80);

    const KNOWN: u32 = 0xff;

    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Bits with no known meaning.
    pub fn unknown_bits(self) -> u32 {
        self.0 & !Self::KNOWN
    }
}

impl std::ops::BitOr for TypeFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::fmt::Debug for TypeFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TypeFlags({:#x})", self.0)
    }
}

/// Generic argument of a type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemplateParam {
    /// Integer-valued parameter (names starting with `v` by convention).
    Int { name: String, value: u64 },
    /// Type-valued parameter (names starting with `t`).
    Type { name: String, ty: TypeIndex },
}

impl TemplateParam {
    pub fn name(&self) -> &str {
        match self {
            Self::Int { name, .. } | Self::Type { name, .. } => name,
        }
    }

    fn wire_value(&self) -> u64 {
        match self {
            Self::Int { value, .. } => *value,
            Self::Type { ty, .. } => ty.index() as u64,
        }
    }
}

/// A field declared directly on a type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberDescriptor {
    pub name: String,
    pub flags: u32,
    /// Offset within the owning type's layout.
    pub byte_offset: u32,
    pub ty: TypeIndex,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    pub ty: TypeIndex,
    pub value: u32,
}

/// One slot of the type table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    pub name: String,
    pub templates: Vec<TemplateParam>,
    pub parent: Option<TypeIndex>,
    /// Which optional fields were present in the body record.
    pub flags: TypeFlags,
    pub sub_type_flags: u32,
    pub pointer: Option<TypeIndex>,
    pub version: u32,
    pub byte_size: u32,
    pub alignment: u32,
    pub abstract_value: u32,
    pub members: Vec<MemberDescriptor>,
    pub interfaces: Vec<Interface>,
    pub attribute: Option<String>,
}

impl TypeDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn template(&self, name: &str) -> Option<&TemplateParam> {
        self.templates.iter().find(|t| t.name() == name)
    }

    /// Element or pointee type: the pointer field, else the `tT` template.
    pub fn target_type(&self) -> Option<TypeIndex> {
        self.pointer.or_else(|| match self.template("tT") {
            Some(TemplateParam::Type { ty, .. }) if !ty.is_null() => Some(*ty),
            _ => None,
        })
    }

    /// Set `flags` from the populated fields. Used when building tables by hand.
    pub fn with_inferred_flags(mut self) -> Self {
        let mut flags = self.flags;
        if self.sub_type_flags != 0 {
            flags.insert(TypeFlags::SUB_TYPE);
        }
        if self.pointer.is_some() {
            flags.insert(TypeFlags::POINTER);
        }
        if self.version != 0 {
            flags.insert(TypeFlags::VERSION);
        }
        if self.byte_size != 0 || self.alignment != 0 {
            flags.insert(TypeFlags::BYTE_SIZE);
        }
        if self.abstract_value != 0 {
            flags.insert(TypeFlags::ABSTRACT_VALUE);
        }
        if !self.members.is_empty() {
            flags.insert(TypeFlags::MEMBERS);
        }
        if !self.interfaces.is_empty() {
            flags.insert(TypeFlags::INTERFACES);
        }
        if self.attribute.is_some() {
            flags.insert(TypeFlags::ATTRIBUTE);
        }
        self.flags = flags;
        self
    }
}

/// Sub-type format kinds (low 5 bits of the sub-type flags).
pub mod format {
    pub const KIND_MASK: u32 = 0x1f;
    pub const VOID: u32 = 0;
    pub const OPAQUE: u32 = 1;
    pub const BOOL: u32 = 2;
    pub const STRING: u32 = 3;
    pub const INT: u32 = 4;
    pub const FLOAT: u32 = 5;
    pub const POINTER: u32 = 6;
    pub const RECORD: u32 = 7;
    pub const ARRAY: u32 = 8;

    pub const INT_SIGNED: u32 = 0x200;
    pub const INT_8: u32 = 0x4000;
    pub const INT_16: u32 = 0x8000;
    pub const INT_32: u32 = 0x1_0000;
    pub const INT_64: u32 = 0x2_0000;
    /// Array kind: inline fixed-size tuple, count in bits 8 and up.
    pub const ARRAY_FIXED: u32 = 0x20;
}

/// How values of a type are laid out in DATA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeFormat {
    Void,
    Opaque,
    Bool,
    /// Pointer to a character array.
    String,
    Int { signed: bool, bits: u8 },
    Float,
    Pointer,
    Record,
    /// Dynamic array (pointer, size, capacity).
    Array,
    /// Inline tuple of `count` elements.
    FixedArray { count: u32 },
}

impl TypeFormat {
    /// Decode explicit sub-type flags.
    pub fn from_sub_type(sub: u32, byte_size: u32) -> Option<Self> {
        use format::*;
        Some(match sub & KIND_MASK {
            VOID => Self::Void,
            OPAQUE => Self::Opaque,
            BOOL => Self::Bool,
            STRING => Self::String,
            INT => {
                let bits = if sub & INT_64 != 0 {
                    64
                } else if sub & INT_32 != 0 {
                    32
                } else if sub & INT_16 != 0 {
                    16
                } else if sub & INT_8 != 0 {
                    8
                } else {
                    match byte_size {
                        1 => 8,
                        2 => 16,
                        8 => 64,
                        _ => 32,
                    }
                };
                Self::Int {
                    signed: sub & INT_SIGNED != 0,
                    bits,
                }
            }
            FLOAT => Self::Float,
            POINTER => Self::Pointer,
            RECORD => Self::Record,
            ARRAY if sub & ARRAY_FIXED != 0 => Self::FixedArray { count: sub >> 8 },
            ARRAY => Self::Array,
            _ => return None,
        })
    }

    /// Sub-type flags that select this format.
    pub fn to_sub_type(self) -> u32 {
        use format::*;
        match self {
            Self::Void => VOID,
            Self::Opaque => OPAQUE,
            Self::Bool => BOOL,
            Self::String => STRING,
            Self::Int { signed, bits } => {
                let width = match bits {
                    8 => INT_8,
                    16 => INT_16,
                    64 => INT_64,
                    _ => INT_32,
                };
                INT | width | if signed { INT_SIGNED } else { 0 }
            }
            Self::Float => FLOAT,
            Self::Pointer => POINTER,
            Self::Record => RECORD,
            Self::Array => ARRAY,
            Self::FixedArray { count } => ARRAY | ARRAY_FIXED | (count << 8),
        }
    }
}

/// Ordered type descriptors of one file or compendium. Slot 0 is the null type.
#[derive(Debug, Clone, Serialize)]
pub struct TypeTable {
    types: PrimaryMap<TypeIndex, TypeDescriptor>,
    type_strings: StringTable,
    field_strings: StringTable,
    tptr: Vec<u8>,
    thsh: Option<Vec<u8>>,
    tpad: Vec<u8>,
    section_flags: SectionFlags,
    /// Flattened member lists, filled on first request per slot.
    #[serde(skip)]
    flattened: Vec<OnceLock<Vec<MemberDescriptor>>>,
}

impl PartialEq for TypeTable {
    fn eq(&self, other: &Self) -> bool {
        self.types == other.types
            && self.tptr == other.tptr
            && self.thsh == other.thsh
            && self.tpad == other.tpad
    }
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeTable {
    /// An empty table holding only the null slot.
    pub fn new() -> Self {
        let mut types = PrimaryMap::new();
        types.push(TypeDescriptor::default());
        Self {
            types,
            type_strings: StringTable::default(),
            field_strings: StringTable::default(),
            tptr: Vec::new(),
            thsh: None,
            tpad: Vec::new(),
            section_flags: SectionFlags::default(),
            flattened: vec![OnceLock::new()],
        }
    }

    /// Append a type. Call [`TypeTable::validate`] once the table is complete.
    pub fn push(&mut self, desc: TypeDescriptor) -> TypeIndex {
        self.flattened.push(OnceLock::new());
        self.types.push(desc)
    }

    /// Read a `TYPE` section and build the table from its children.
    pub fn read(parent: &mut Cursor<'_>, layout: HeaderLayout) -> Result<Self> {
        let mut section_flags = SectionFlags::default();
        let (h, mut c) = read_section(parent, layout, Tag::TYPE)?;
        section_flags.record(&h);

        let (h, tptr) = read_section(&mut c, layout, Tag::TPTR)?;
        section_flags.record(&h);
        let (h, tstr) = read_section(&mut c, layout, Tag::TSTR)?;
        section_flags.record(&h);
        let type_strings = StringTable::parse(tstr)?;
        let (h, tna1) = read_section(&mut c, layout, Tag::TNA1)?;
        section_flags.record(&h);
        let mut types = read_names(tna1, &type_strings)?;
        let (h, fstr) = read_section(&mut c, layout, Tag::FSTR)?;
        section_flags.record(&h);
        let field_strings = StringTable::parse(fstr)?;
        let (h, tbdy) = read_section(&mut c, layout, Tag::TBDY)?;
        section_flags.record(&h);
        read_bodies(tbdy, &mut types, &field_strings)?;

        let thsh = if peek_tag(&c)? == Tag::THSH {
            let (h, payload) = read_section(&mut c, layout, Tag::THSH)?;
            section_flags.record(&h);
            Some(payload.data().to_vec())
        } else {
            None
        };
        let (h, tpad) = read_section(&mut c, layout, Tag::TPAD)?;
        section_flags.record(&h);

        let table = Self {
            flattened: (0..types.len()).map(|_| OnceLock::new()).collect(),
            types,
            type_strings,
            field_strings,
            tptr: tptr.data().to_vec(),
            thsh,
            tpad: tpad.data().to_vec(),
            section_flags,
        };
        table.validate()?;
        debug!(
            types = table.len() - 1,
            type_strings = table.type_strings.len(),
            field_strings = table.field_strings.len(),
            "type table built"
        );
        Ok(table)
    }

    /// Check referential integrity: member and pointer types resolve, members
    /// never use the null type, and no parent chain loops.
    pub fn validate(&self) -> Result<()> {
        let len = self.types.len();
        let check = |context: &'static str, ty: TypeIndex| -> Result<()> {
            if self.types.contains(ty) {
                Ok(())
            } else {
                Err(Error::CorruptTypeTable {
                    context,
                    index: ty.index() as u64,
                    len,
                })
            }
        };
        for (idx, desc) in self.types.iter() {
            if let Some(parent) = desc.parent {
                check("parent", parent)?;
            }
            if let Some(pointer) = desc.pointer {
                check("pointer type", pointer)?;
            }
            for t in &desc.templates {
                if let TemplateParam::Type { ty, .. } = t {
                    check("template type", *ty)?;
                }
            }
            for i in &desc.interfaces {
                check("interface type", i.ty)?;
            }
            for m in &desc.members {
                if m.ty.is_null() {
                    return Err(Error::CorruptTypeTable {
                        context: "member type",
                        index: 0,
                        len,
                    });
                }
                check("member type", m.ty)?;
            }
            // A chain longer than the table must revisit a slot.
            let mut steps = 0;
            let mut cur = desc.parent;
            while let Some(p) = cur {
                steps += 1;
                if steps > len {
                    return Err(Error::CorruptTypeTable {
                        context: "cyclic parent chain at",
                        index: idx.index() as u64,
                        len,
                    });
                }
                cur = self.types.get(p).and_then(|d| d.parent);
            }
        }
        Ok(())
    }

    /// Number of slots, including the null slot.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether the table holds no types besides the null slot.
    pub fn is_empty(&self) -> bool {
        self.types.len() <= 1
    }

    pub fn get(&self, ty: TypeIndex) -> Option<&TypeDescriptor> {
        self.types.get(ty)
    }

    /// Descriptor lookup that reports a bad index as a corrupt table.
    pub fn descriptor(&self, ty: TypeIndex) -> Result<&TypeDescriptor> {
        self.types.get(ty).ok_or(Error::CorruptTypeTable {
            context: "type",
            index: ty.index() as u64,
            len: self.types.len(),
        })
    }

    pub fn name(&self, ty: TypeIndex) -> &str {
        self.types.get(ty).map_or("", |d| d.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (TypeIndex, &TypeDescriptor)> {
        self.types.iter().skip(1)
    }

    /// First type named `name`.
    pub fn find(&self, name: &str) -> Option<TypeIndex> {
        self.iter().find(|(_, d)| d.name == name).map(|(i, _)| i)
    }

    pub fn type_strings(&self) -> &StringTable {
        &self.type_strings
    }

    pub fn field_strings(&self) -> &StringTable {
        &self.field_strings
    }

    /// `ty` followed by its ancestors, nearest first.
    pub fn ancestry(&self, ty: TypeIndex) -> impl Iterator<Item = (TypeIndex, &TypeDescriptor)> {
        let limit = self.types.len();
        let mut cur = Some(ty).filter(|t| !t.is_null());
        std::iter::from_fn(move || {
            let idx = cur?;
            let desc = self.types.get(idx)?;
            cur = desc.parent.filter(|p| !p.is_null());
            Some((idx, desc))
        })
        .take(limit)
    }

    /// Own members plus every ancestor's, ancestor first.
    ///
    /// Computed once per slot and cached; repeated calls return the same slice.
    pub fn flattened_members(&self, ty: TypeIndex) -> &[MemberDescriptor] {
        match self.flattened.get(ty.index() as usize) {
            Some(slot) => slot.get_or_init(|| self.flatten(ty)),
            None => &[],
        }
    }

    fn flatten(&self, ty: TypeIndex) -> Vec<MemberDescriptor> {
        let chain: Vec<_> = self.ancestry(ty).collect();
        chain
            .iter()
            .rev()
            .flat_map(|(_, d)| d.members.iter().cloned())
            .collect()
    }

    /// Byte size, taken from the nearest type in the chain that declares one.
    pub fn byte_size(&self, ty: TypeIndex) -> u32 {
        self.ancestry(ty)
            .find(|(_, d)| d.flags.contains(TypeFlags::BYTE_SIZE))
            .map_or(0, |(_, d)| d.byte_size)
    }

    /// Alignment, resolved like [`TypeTable::byte_size`].
    pub fn alignment(&self, ty: TypeIndex) -> u32 {
        self.ancestry(ty)
            .find(|(_, d)| d.flags.contains(TypeFlags::BYTE_SIZE))
            .map_or(0, |(_, d)| d.alignment)
    }

    /// Value layout of `ty`.
    ///
    /// Explicit sub-type flags win; otherwise the nearest ancestor's apply;
    /// with none in the chain the type is a record if it has members.
    pub fn format(&self, ty: TypeIndex) -> Result<TypeFormat> {
        if ty.is_null() {
            return Ok(TypeFormat::Void);
        }
        if let Some((idx, d)) = self
            .ancestry(ty)
            .find(|(_, d)| d.flags.contains(TypeFlags::SUB_TYPE))
        {
            return TypeFormat::from_sub_type(d.sub_type_flags, self.byte_size(idx)).ok_or_else(
                || {
                    Error::unsupported(
                        self.name(ty),
                        format!("sub-type flags {:#x}", d.sub_type_flags),
                    )
                },
            );
        }
        if self.flattened_members(ty).is_empty() {
            Ok(TypeFormat::Opaque)
        } else {
            Ok(TypeFormat::Record)
        }
    }

    /// Element or pointee type, looked up through the ancestry.
    pub fn target_type(&self, ty: TypeIndex) -> Option<TypeIndex> {
        self.ancestry(ty).find_map(|(_, d)| d.target_type())
    }

    /// Display form `Name<T1, T2>{size}`.
    pub fn describe(&self, ty: TypeIndex) -> String {
        let Some(desc) = self.types.get(ty) else {
            return format!("<bad type {}>", ty.index());
        };
        let mut out = desc.name.clone();
        if !desc.templates.is_empty() {
            let params: Vec<String> = desc
                .templates
                .iter()
                .map(|t| match t {
                    TemplateParam::Int { value, .. } => value.to_string(),
                    TemplateParam::Type { ty, .. } => self.name(*ty).to_owned(),
                })
                .collect();
            out.push('<');
            out.push_str(&params.join(", "));
            out.push('>');
        }
        out.push_str(&format!("{{{}}}", self.byte_size(ty)));
        out
    }

    /// Encode a complete `TYPE` section.
    ///
    /// Strings already present in the parsed string tables keep their
    /// positions; new names are appended.
    pub fn write_type_section(&self, w: &mut Writer, layout: HeaderLayout) -> Result<()> {
        let mut type_strings = self.type_strings.clone();
        let mut field_strings = self.field_strings.clone();

        let mut tna1 = Writer::new();
        tna1.write_varint((self.types.len() - 1) as u64);
        for (_, d) in self.iter() {
            tna1.write_varint(type_strings.intern(&d.name));
            tna1.write_varint(d.templates.len() as u64);
            for t in &d.templates {
                tna1.write_varint(type_strings.intern(t.name()));
                tna1.write_varint(t.wire_value());
            }
        }

        let mut tbdy = Writer::new();
        for (idx, d) in self.iter() {
            write_body(&mut tbdy, idx, d, &mut field_strings);
        }

        let flags = &self.section_flags;
        let mut tstr = Writer::new();
        type_strings.write(&mut tstr);
        let mut fstr = Writer::new();
        field_strings.write(&mut fstr);

        let start = begin_section(w, Tag::TYPE);
        write_raw_section(w, Tag::TPTR, layout, flags.get(Tag::TPTR), &self.tptr)?;
        write_raw_section(w, Tag::TSTR, layout, flags.get(Tag::TSTR), tstr.as_slice())?;
        write_raw_section(w, Tag::TNA1, layout, flags.get(Tag::TNA1), tna1.as_slice())?;
        write_raw_section(w, Tag::FSTR, layout, flags.get(Tag::FSTR), fstr.as_slice())?;
        write_raw_section(w, Tag::TBDY, layout, flags.get(Tag::TBDY), tbdy.as_slice())?;
        if let Some(thsh) = &self.thsh {
            write_raw_section(w, Tag::THSH, layout, flags.get(Tag::THSH), thsh)?;
        }
        write_raw_section(w, Tag::TPAD, layout, flags.get(Tag::TPAD), &self.tpad)?;
        end_section(w, start, layout, flags.get(Tag::TYPE))
    }
}

fn type_index(raw: u64, len: usize, context: &'static str) -> Result<TypeIndex> {
    match u32::try_from(raw) {
        Ok(i) if (i as usize) < len => Ok(TypeIndex::new(i)),
        _ => Err(Error::CorruptTypeTable {
            context,
            index: raw,
            len,
        }),
    }
}

fn optional_type(raw: u64, len: usize, context: &'static str) -> Result<Option<TypeIndex>> {
    let ty = type_index(raw, len, context)?;
    Ok(Some(ty).filter(|t| !t.is_null()))
}

/// TNA1: allocate every slot with its name and template parameters.
fn read_names(
    mut c: Cursor<'_>,
    strings: &StringTable,
) -> Result<PrimaryMap<TypeIndex, TypeDescriptor>> {
    let count = c.read_varint()?;
    // Every slot takes at least two bytes.
    let len = usize::try_from(count)
        .ok()
        .filter(|n| n.saturating_mul(2) <= c.remaining())
        .ok_or(Error::CorruptTypeTable {
            context: "type count",
            index: count,
            len: 0,
        })?
        + 1;
    let mut types = PrimaryMap::with_capacity(len);
    types.push(TypeDescriptor::default());
    for _ in 1..len {
        let name = strings.get(c.read_varint()?, "type name")?.to_owned();
        let template_count = c.read_varint()?;
        let mut templates = Vec::new();
        for _ in 0..template_count {
            let tname = strings.get(c.read_varint()?, "template name")?.to_owned();
            let value = c.read_varint()?;
            templates.push(if tname.starts_with('t') {
                TemplateParam::Type {
                    name: tname,
                    ty: type_index(value, len, "template type")?,
                }
            } else {
                TemplateParam::Int { name: tname, value }
            });
        }
        types.push(TypeDescriptor {
            name,
            templates,
            ..TypeDescriptor::default()
        });
    }
    Ok(types)
}

/// TBDY: fill in bodies until the payload is exhausted.
fn read_bodies(
    mut c: Cursor<'_>,
    types: &mut PrimaryMap<TypeIndex, TypeDescriptor>,
    fields: &StringTable,
) -> Result<()> {
    let len = types.len();
    while !c.is_empty() {
        let raw = c.read_varint()?;
        if raw == 0 {
            continue;
        }
        let idx = type_index(raw, len, "body type")?;
        let parent = optional_type(c.read_varint()?, len, "parent")?;
        let flags = TypeFlags::from_bits(c.read_varint_u32()?);
        if flags.unknown_bits() != 0 {
            return Err(Error::unsupported(
                types[idx].name.clone(),
                format!("body flags {:#x}", flags.bits()),
            ));
        }

        let mut body = TypeDescriptor {
            name: std::mem::take(&mut types[idx].name),
            templates: std::mem::take(&mut types[idx].templates),
            parent,
            flags,
            ..TypeDescriptor::default()
        };
        if flags.contains(TypeFlags::SUB_TYPE) {
            body.sub_type_flags = c.read_varint_u32()?;
        }
        if flags.contains(TypeFlags::POINTER) {
            body.pointer = optional_type(c.read_varint()?, len, "pointer type")?;
        }
        if flags.contains(TypeFlags::VERSION) {
            body.version = c.read_varint_u32()?;
        }
        if flags.contains(TypeFlags::BYTE_SIZE) {
            body.byte_size = c.read_varint_u32()?;
            body.alignment = c.read_varint_u32()?;
        }
        if flags.contains(TypeFlags::ABSTRACT_VALUE) {
            body.abstract_value = c.read_varint_u32()?;
        }
        if flags.contains(TypeFlags::MEMBERS) {
            let count = c.read_varint()? & 0xffff;
            body.members.reserve(count as usize);
            for _ in 0..count {
                let name = fields.get(c.read_varint()?, "member name")?.to_owned();
                let flags = c.read_varint_u32()?;
                let byte_offset = c.read_varint_u32()?;
                let ty = type_index(c.read_varint()?, len, "member type")?;
                body.members.push(MemberDescriptor {
                    name,
                    flags,
                    byte_offset,
                    ty,
                });
            }
        }
        if flags.contains(TypeFlags::INTERFACES) {
            let count = c.read_varint()?;
            for _ in 0..count {
                let ty = type_index(c.read_varint()?, len, "interface type")?;
                let value = c.read_varint_u32()?;
                body.interfaces.push(Interface { ty, value });
            }
        }
        if flags.contains(TypeFlags::ATTRIBUTE) {
            body.attribute = Some(fields.get(c.read_varint()?, "attribute")?.to_owned());
        }
        types[idx] = body;
    }
    Ok(())
}

fn write_body(w: &mut Writer, idx: TypeIndex, d: &TypeDescriptor, fields: &mut StringTable) {
    let flags = d.flags;
    w.write_varint(idx.index() as u64);
    w.write_varint(d.parent.map_or(0, |p| p.index() as u64));
    w.write_varint(flags.bits() as u64);
    if flags.contains(TypeFlags::SUB_TYPE) {
        w.write_varint(d.sub_type_flags as u64);
    }
    if flags.contains(TypeFlags::POINTER) {
        w.write_varint(d.pointer.map_or(0, |p| p.index() as u64));
    }
    if flags.contains(TypeFlags::VERSION) {
        w.write_varint(d.version as u64);
    }
    if flags.contains(TypeFlags::BYTE_SIZE) {
        w.write_varint(d.byte_size as u64);
        w.write_varint(d.alignment as u64);
    }
    if flags.contains(TypeFlags::ABSTRACT_VALUE) {
        w.write_varint(d.abstract_value as u64);
    }
    if flags.contains(TypeFlags::MEMBERS) {
        w.write_varint(d.members.len() as u64);
        for m in &d.members {
            w.write_varint(fields.intern(&m.name));
            w.write_varint(m.flags as u64);
            w.write_varint(m.byte_offset as u64);
            w.write_varint(m.ty.index() as u64);
        }
    }
    if flags.contains(TypeFlags::INTERFACES) {
        w.write_varint(d.interfaces.len() as u64);
        for i in &d.interfaces {
            w.write_varint(i.ty.index() as u64);
            w.write_varint(i.value as u64);
        }
    }
    if flags.contains(TypeFlags::ATTRIBUTE) {
        w.write_varint(fields.intern(d.attribute.as_deref().unwrap_or("")));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int32() -> TypeDescriptor {
        TypeDescriptor {
            sub_type_flags: TypeFormat::Int { signed: true, bits: 32 }.to_sub_type(),
            byte_size: 4,
            alignment: 4,
            ..TypeDescriptor::new("int")
        }
        .with_inferred_flags()
    }

    fn member(name: &str, byte_offset: u32, ty: TypeIndex) -> MemberDescriptor {
        MemberDescriptor {
            name: name.into(),
            flags: 0,
            byte_offset,
            ty,
        }
    }

    /// Base { a: int } <- Derived { b: int }
    fn inheritance_table() -> (TypeTable, TypeIndex, TypeIndex) {
        let mut table = TypeTable::new();
        let int = table.push(int32());
        let base = table.push(
            TypeDescriptor {
                byte_size: 4,
                alignment: 4,
                members: vec![member("a", 0, int)],
                ..TypeDescriptor::new("Base")
            }
            .with_inferred_flags(),
        );
        let derived = table.push(
            TypeDescriptor {
                parent: Some(base),
                byte_size: 8,
                alignment: 4,
                members: vec![member("b", 4, int)],
                ..TypeDescriptor::new("Derived")
            }
            .with_inferred_flags(),
        );
        table.validate().unwrap();
        (table, base, derived)
    }

    fn reparse(table: &TypeTable) -> TypeTable {
        let mut w = Writer::new();
        table
            .write_type_section(&mut w, HeaderLayout::Packed32)
            .unwrap();
        let bytes = w.into_bytes();
        TypeTable::read(&mut Cursor::new(&bytes), HeaderLayout::Packed32).unwrap()
    }

    #[test]
    fn flattening_is_ancestor_first_and_stable() {
        let (table, _, derived) = inheritance_table();
        let first: Vec<_> = table
            .flattened_members(derived)
            .iter()
            .map(|m| m.name.clone())
            .collect();
        assert_eq!(first, ["a", "b"]);
        let again = table.flattened_members(derived);
        assert_eq!(again.len(), 2);
        assert!(std::ptr::eq(again, table.flattened_members(derived)));
    }

    #[test]
    fn format_inherits_and_falls_back() {
        let (mut table, base, derived) = inheritance_table();
        assert_eq!(table.format(base).unwrap(), TypeFormat::Record);
        assert_eq!(table.format(derived).unwrap(), TypeFormat::Record);
        let blob = table.push(TypeDescriptor::new("Blob"));
        assert_eq!(table.format(blob).unwrap(), TypeFormat::Opaque);
        let alias = table.push(TypeDescriptor {
            parent: table.find("int"),
            ..TypeDescriptor::new("hkInt32")
        });
        assert_eq!(
            table.format(alias).unwrap(),
            TypeFormat::Int { signed: true, bits: 32 }
        );
        assert_eq!(table.byte_size(alias), 4);
    }

    #[test]
    fn unknown_kind_is_unsupported() {
        let mut table = TypeTable::new();
        let weird = table.push(
            TypeDescriptor {
                sub_type_flags: 0x1f,
                ..TypeDescriptor::new("Weird")
            }
            .with_inferred_flags(),
        );
        assert!(matches!(
            table.format(weird),
            Err(Error::UnsupportedField { .. })
        ));
    }

    #[test]
    fn fixed_array_count_from_sub_type() {
        assert_eq!(
            TypeFormat::from_sub_type(0x0428, 0),
            Some(TypeFormat::FixedArray { count: 4 })
        );
        assert_eq!(TypeFormat::from_sub_type(0x08, 16), Some(TypeFormat::Array));
    }

    #[test]
    fn type_section_round_trips() {
        let (mut table, base, _) = inheritance_table();
        let int = table.find("int").unwrap();
        table.push(
            TypeDescriptor {
                templates: vec![
                    TemplateParam::Type {
                        name: "tT".into(),
                        ty: int,
                    },
                    TemplateParam::Int {
                        name: "vN".into(),
                        value: 300,
                    },
                ],
                interfaces: vec![Interface { ty: base, value: 2 }],
                attribute: Some("hk.Ui".into()),
                version: 3,
                ..TypeDescriptor::new("Tuple")
            }
            .with_inferred_flags(),
        );
        let parsed = reparse(&table);
        assert_eq!(parsed, table);
        assert_eq!(parsed.describe(parsed.find("Tuple").unwrap()), "Tuple<int, 300>{0}");
        assert_eq!(parsed.describe(base), "Base{4}");
    }

    #[test]
    fn null_member_type_is_corrupt() {
        let mut table = TypeTable::new();
        table.push(
            TypeDescriptor {
                members: vec![member("x", 0, TypeIndex::NULL)],
                ..TypeDescriptor::new("Broken")
            }
            .with_inferred_flags(),
        );
        assert!(matches!(
            table.validate(),
            Err(Error::CorruptTypeTable { context: "member type", .. })
        ));
    }

    #[test]
    fn cyclic_parents_are_corrupt() {
        let mut table = TypeTable::new();
        let a = table.push(TypeDescriptor::new("A"));
        let b = table.push(TypeDescriptor {
            parent: Some(a),
            ..TypeDescriptor::new("B")
        });
        table.types[a].parent = Some(b);
        assert!(matches!(
            table.validate(),
            Err(Error::CorruptTypeTable { .. })
        ));
    }

    #[test]
    fn body_with_out_of_range_type_is_corrupt() {
        let names = StringTable::from_strings(["A"]);
        let mut tna1 = Writer::new();
        tna1.write_varint(1);
        tna1.write_varint(0);
        tna1.write_varint(0);
        let mut types = read_names(Cursor::new(tna1.as_slice()), &names).unwrap();

        let mut tbdy = Writer::new();
        tbdy.write_varint(5);
        let err = read_bodies(Cursor::new(tbdy.as_slice()), &mut types, &names).unwrap_err();
        assert!(matches!(
            err,
            Error::CorruptTypeTable { context: "body type", index: 5, len: 2 }
        ));
    }

    #[test]
    fn unknown_body_flag_is_unsupported() {
        let names = StringTable::from_strings(["A"]);
        let mut tna1 = Writer::new();
        tna1.write_varint(1);
        tna1.write_varint(0);
        tna1.write_varint(0);
        let mut types = read_names(Cursor::new(tna1.as_slice()), &names).unwrap();

        let mut tbdy = Writer::new();
        tbdy.write_varint(1);
        tbdy.write_varint(0);
        tbdy.write_varint(0x100);
        let err = read_bodies(Cursor::new(tbdy.as_slice()), &mut types, &names).unwrap_err();
        assert!(matches!(err, Error::UnsupportedField { .. }));
    }

    #[test]
    fn padding_records_are_skipped() {
        let names = StringTable::from_strings(["A"]);
        let mut tna1 = Writer::new();
        tna1.write_varint(1);
        tna1.write_varint(0);
        tna1.write_varint(0);
        let mut types = read_names(Cursor::new(tna1.as_slice()), &names).unwrap();

        let mut tbdy = Writer::new();
        tbdy.write_bytes(&[0, 0]);
        tbdy.write_varint(1);
        tbdy.write_varint(0);
        tbdy.write_varint(TypeFlags::BYTE_SIZE.bits() as u64);
        tbdy.write_varint(16);
        tbdy.write_varint(8);
        tbdy.write_bytes(&[0]);
        read_bodies(Cursor::new(tbdy.as_slice()), &mut types, &names).unwrap();
        assert_eq!(types[TypeIndex::new(1)].byte_size, 16);
        assert_eq!(types[TypeIndex::new(1)].name, "A");
    }
}
