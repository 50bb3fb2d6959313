use serde::{Deserialize, Serialize};

use crate::cursor::{Cursor, Writer};
use crate::error::{Error, Result};

/// A TSTR or FSTR string table: null-terminated strings filling the payload.
///
/// Entries are addressed by position. Empty entries are kept so indices and
/// re-encoded bytes stay stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringTable {
    strings: Vec<String>,
}

impl StringTable {
    /// Parse a string table payload.
    pub fn parse(mut c: Cursor<'_>) -> Result<Self> {
        let mut strings = Vec::new();
        while !c.is_empty() {
            strings.push(c.read_cstring()?);
        }
        Ok(Self { strings })
    }

    pub fn from_strings<I, S>(strings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            strings: strings.into_iter().map(Into::into).collect(),
        }
    }

    /// Look up an entry; `context` names the referencing field for errors.
    pub fn get(&self, index: u64, context: &'static str) -> Result<&str> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.strings.get(i))
            .map(String::as_str)
            .ok_or(Error::CorruptTypeTable {
                context,
                index,
                len: self.strings.len(),
            })
    }

    /// Position of `s`, appending it when absent.
    pub fn intern(&mut self, s: &str) -> u64 {
        if let Some(i) = self.strings.iter().position(|x| x == s) {
            return i as u64;
        }
        self.strings.push(s.to_owned());
        (self.strings.len() - 1) as u64
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.strings.iter().map(String::as_str)
    }

    pub fn write(&self, w: &mut Writer) {
        for s in &self.strings {
            w.write_cstring(s);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_keeps_empty_entries() {
        let table = StringTable::parse(Cursor::new(b"Leaf\0\0int\0")).unwrap();
        assert_eq!(table.iter().collect::<Vec<_>>(), ["Leaf", "", "int"]);
        assert_eq!(table.get(2, "type name").unwrap(), "int");
    }

    #[test]
    fn out_of_range_index_is_corrupt() {
        let table = StringTable::from_strings(["a"]);
        assert!(matches!(
            table.get(4, "member name"),
            Err(Error::CorruptTypeTable { context: "member name", index: 4, len: 1 })
        ));
    }

    #[test]
    fn unterminated_entry_fails() {
        assert!(StringTable::parse(Cursor::new(b"abc")).is_err());
    }

    #[test]
    fn write_reproduces_payload() {
        let bytes = b"T\0tT\0\0".to_vec();
        let table = StringTable::parse(Cursor::new(&bytes)).unwrap();
        let mut w = Writer::new();
        table.write(&mut w);
        assert_eq!(w.into_bytes(), bytes);
    }
}
