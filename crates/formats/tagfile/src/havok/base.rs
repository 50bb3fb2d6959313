use serde::Serialize;

use crate::decode::{Decode, FieldReader};
use crate::entity::ObjectIndex;
use crate::error::Result;

/// `hkReferencedObject` header shared by most engine objects (16 bytes).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReferencedObject {
    pub mem_size_and_flags: u16,
    pub ref_count: u16,
}

impl Decode for ReferencedObject {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        let property_bag = r.read_u64()?;
        if property_bag != 0 {
            return Err(r.unsupported(format!("non-null property bag {property_bag:#x}")));
        }
        let mem_size_and_flags = r.read_u16()?;
        let ref_count = r.read_u16()?;
        r.skip(4)?;
        Ok(Self {
            mem_size_and_flags,
            ref_count,
        })
    }
}

/// `hkRefPtr`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RefPtr {
    pub target: Option<ObjectIndex>,
}

impl Decode for RefPtr {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            target: r.read_pointer()?,
        })
    }
}

/// `hkRootLevelContainer::NamedVariant`: one named top-level object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NamedVariant {
    pub name: Option<String>,
    pub class_name: Option<String>,
    pub variant: Option<ObjectIndex>,
}

impl Decode for NamedVariant {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            name: r.read_string()?,
            class_name: r.read_string()?,
            variant: r.read_pointer()?,
        })
    }
}

/// `hkRefCountedProperties`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefCountedProperties {
    pub base: ReferencedObject,
    pub entries: Vec<PropertyEntry>,
}

impl Decode for RefCountedProperties {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            base: ReferencedObject::decode(r)?,
            entries: r.read_array()?,
        })
    }
}

/// `hkRefCountedProperties::Entry`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PropertyEntry {
    pub object: Option<ObjectIndex>,
    pub key: u16,
    pub flags: u16,
}

impl Decode for PropertyEntry {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        let object = r.read_pointer()?;
        let key = r.read_u16()?;
        let flags = r.read_u16()?;
        r.skip(4)?;
        Ok(Self { object, key, flags })
    }
}
