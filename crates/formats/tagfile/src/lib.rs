//! Reader/writer for the engine's chunked, self-describing tagfile format.
//!
//! Four-layer architecture:
//! - **Layer 1** (`cursor`/`section`): Raw byte and varint I/O, section headers
//! - **Layer 2** (`types`/`compendium`): Embedded and shared type tables
//! - **Layer 3** (`object`/`tagfile`): ITEM index expanded into TagObjects
//!   over DATA, pointer resolution
//! - **Layer 4** (`decode`/`havok`): Typed decoders and the memoized object
//!   graph

pub mod compendium;
pub mod cursor;
pub mod decode;
pub mod entity;
pub mod error;
pub mod havok;
pub mod object;
pub mod section;
pub mod strings;
pub mod tagfile;
pub mod types;
pub mod writer;

pub use compendium::{Compendium, CompendiumResolver, CompendiumSet};
pub use decode::{DecodeOptions, Decoder, HavokObject, ObjectGraph, Value};
pub use entity::{ObjectIndex, PointerLiteral, TypeIndex};
pub use error::{Error, Result};
pub use section::HeaderLayout;
pub use tagfile::{read_any, ReadOptions, TagFile, Tagfile};
pub use types::TypeTable;
pub use writer::TagFileBuilder;
