//! Shared type tables.
//!
//! A compendium (`TCM0`) carries only a `TYPE` section and the ids that object
//! files use to reference it through `TCRF`.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::cursor::{Cursor, Writer};
use crate::error::{Error, Result};
use crate::section::{
    begin_section, detect_root, end_section, read_section, write_raw_section, HeaderLayout,
    SectionFlags, Tag,
};
use crate::tagfile::ReadOptions;
use crate::types::TypeTable;

/// Supplies type tables for files that reference a compendium by id.
pub trait CompendiumResolver {
    fn resolve(&self, id: u64) -> Option<Arc<TypeTable>>;
}

/// A parsed compendium file.
#[derive(Debug, Clone, PartialEq)]
pub struct Compendium {
    pub ids: Vec<u64>,
    pub types: Arc<TypeTable>,
    layout: HeaderLayout,
    flags: SectionFlags,
}

impl Compendium {
    pub fn new(ids: Vec<u64>, types: TypeTable) -> Self {
        Self {
            ids,
            types: Arc::new(types),
            layout: HeaderLayout::Split16,
            flags: SectionFlags::default(),
        }
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        Self::parse_with(data, &ReadOptions::default())
    }

    pub fn parse_with(data: &[u8], options: &ReadOptions) -> Result<Self> {
        let (root, default_layout) = detect_root(data)?;
        if root != Tag::TCM0 {
            return Err(Error::FormatMismatch {
                offset: 0,
                expected: Tag::TCM0,
                found: root,
            });
        }
        let layout = options.header_layout.unwrap_or(default_layout);
        let mut flags = SectionFlags::default();

        let mut c = Cursor::new(data);
        let (h, mut body) = read_section(&mut c, layout, Tag::TCM0)?;
        flags.record(&h);
        let (h, mut tcid) = read_section(&mut body, layout, Tag::TCID)?;
        flags.record(&h);
        let mut ids = Vec::with_capacity(tcid.remaining() / 8);
        while tcid.remaining() >= 8 {
            ids.push(tcid.read_u64()?);
        }
        let types = TypeTable::read(&mut body, layout)?;

        debug!(ids = ids.len(), types = types.len() - 1, "compendium parsed");
        Ok(Self {
            ids,
            types: Arc::new(types),
            layout,
            flags,
        })
    }

    pub fn layout(&self) -> HeaderLayout {
        self.layout
    }

    /// Re-encode the compendium.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut w = Writer::new();
        let root = begin_section(&mut w, Tag::TCM0);
        let mut tcid = Writer::with_capacity(self.ids.len() * 8);
        for id in &self.ids {
            tcid.write_u64(*id);
        }
        write_raw_section(
            &mut w,
            Tag::TCID,
            self.layout,
            self.flags.get(Tag::TCID),
            tcid.as_slice(),
        )?;
        self.types.write_type_section(&mut w, self.layout)?;
        end_section(&mut w, root, self.layout, self.flags.get(Tag::TCM0))?;
        Ok(w.into_bytes())
    }
}

impl CompendiumResolver for Compendium {
    fn resolve(&self, id: u64) -> Option<Arc<TypeTable>> {
        self.ids.contains(&id).then(|| Arc::clone(&self.types))
    }
}

/// Several compendiums, looked up by id.
#[derive(Debug, Clone, Default)]
pub struct CompendiumSet {
    by_id: HashMap<u64, Arc<TypeTable>>,
}

impl CompendiumSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every id of `compendium`. Later insertions win on collisions.
    pub fn insert(&mut self, compendium: &Compendium) {
        for id in &compendium.ids {
            self.by_id.insert(*id, Arc::clone(&compendium.types));
        }
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

impl CompendiumResolver for CompendiumSet {
    fn resolve(&self, id: u64) -> Option<Arc<TypeTable>> {
        self.by_id.get(&id).cloned()
    }
}

impl<R: CompendiumResolver + ?Sized> CompendiumResolver for &R {
    fn resolve(&self, id: u64) -> Option<Arc<TypeTable>> {
        (**self).resolve(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeDescriptor;

    fn sample() -> Compendium {
        let mut types = TypeTable::new();
        types.push(
            TypeDescriptor {
                byte_size: 4,
                alignment: 4,
                ..TypeDescriptor::new("Leaf")
            }
            .with_inferred_flags(),
        );
        Compendium::new(vec![0x1234_5678_9abc_def0, 7], types)
    }

    #[test]
    fn round_trips_through_bytes() {
        let compendium = sample();
        let bytes = compendium.to_bytes().unwrap();
        assert_eq!(&bytes[4..8], b"TCM0");
        let parsed = Compendium::parse(&bytes).unwrap();
        assert_eq!(parsed, compendium);
        assert!(parsed.types.find("Leaf").is_some());
    }

    #[test]
    fn resolves_only_known_ids() {
        let compendium = sample();
        assert!(compendium.resolve(7).is_some());
        assert!(compendium.resolve(8).is_none());

        let mut set = CompendiumSet::new();
        set.insert(&compendium);
        assert_eq!(set.len(), 2);
        assert!(Arc::ptr_eq(
            &set.resolve(0x1234_5678_9abc_def0).unwrap(),
            &compendium.types
        ));
    }

    #[test]
    fn object_file_is_not_a_compendium() {
        let mut w = Writer::new();
        let start = begin_section(&mut w, Tag::TAG0);
        end_section(&mut w, start, HeaderLayout::Packed32, 0).unwrap();
        assert!(matches!(
            Compendium::parse(&w.into_bytes()),
            Err(Error::FormatMismatch { expected: Tag::TCM0, found: Tag::TAG0, .. })
        ));
    }
}
