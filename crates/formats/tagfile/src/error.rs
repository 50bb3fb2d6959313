use thiserror::Error;

use crate::section::Tag;

#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("unexpected end of data at offset {offset:#x} (need {need} bytes, have {have})")]
    UnexpectedEof {
        offset: usize,
        need: usize,
        have: usize,
    },

    #[error("section at offset {offset:#x}: expected {expected}, found {found}")]
    FormatMismatch {
        offset: usize,
        expected: Tag,
        found: Tag,
    },

    #[error("unknown tagfile variant {found} (expected TAG0 or TCM0)")]
    UnknownFormat { found: Tag },

    #[error("section {tag} at offset {offset:#x} declares {length} bytes, only {available} available")]
    SectionOverrun {
        tag: Tag,
        offset: usize,
        length: usize,
        available: usize,
    },

    #[error("corrupt type table: {context} index {index} out of range (len {len})")]
    CorruptTypeTable {
        context: &'static str,
        index: u64,
        len: usize,
    },

    #[error("invalid varint prefix {prefix:#04x} at offset {offset:#x}")]
    InvalidVarint { offset: usize, prefix: u8 },

    #[error("string at offset {offset:#x} is not valid UTF-8: {source}")]
    InvalidString {
        offset: usize,
        source: std::string::FromUtf8Error,
    },

    #[error("compendium {id:#018x} is not available")]
    MissingCompendium { id: u64 },

    #[error("item {item} slice {offset:#x}+{len} is outside DATA ({data_len} bytes)")]
    ObjectOutOfBounds {
        item: usize,
        offset: usize,
        len: usize,
        data_len: usize,
    },

    #[error("unresolved pointer literal {literal:#x}")]
    UnresolvedPointer { literal: u64 },

    #[error("object index {index} out of range (len {len})")]
    InvalidObjectIndex { index: u32, len: usize },

    #[error("{type_name}: unsupported field: {detail}")]
    UnsupportedField { type_name: String, detail: String },

    #[error("inline decode depth exceeded limit of {limit}")]
    DepthExceeded { limit: usize },
}

impl Error {
    pub(crate) fn unsupported(type_name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::UnsupportedField {
            type_name: type_name.into(),
            detail: detail.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
