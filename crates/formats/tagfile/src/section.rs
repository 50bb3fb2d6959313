//! Section framing shared by both tagfile variants.
//!
//! A section is an 8-byte header (a big-endian length/flags word followed by
//! a four-character tag) and a payload of `length - 8` bytes. The length
//! counts the header itself.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::cursor::{Cursor, Writer};
use crate::error::{Error, Result};

/// Size of a section header.
pub const HEADER_SIZE: usize = 8;

/// Four-character section tag.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag(pub [u8; 4]);

impl Tag {
    pub const TAG0: Tag = Tag(*b"TAG0");
    pub const TCM0: Tag = Tag(*b"TCM0");
    pub const SDKV: Tag = Tag(*b"SDKV");
    pub const DATA: Tag = Tag(*b"DATA");
    pub const TYPE: Tag = Tag(*b"TYPE");
    pub const TCRF: Tag = Tag(*b"TCRF");
    pub const TCID: Tag = Tag(*b"TCID");
    pub const INDX: Tag = Tag(*b"INDX");
    pub const ITEM: Tag = Tag(*b"ITEM");
    pub const PTCH: Tag = Tag(*b"PTCH");
    pub const TPTR: Tag = Tag(*b"TPTR");
    pub const TSTR: Tag = Tag(*b"TSTR");
    pub const TNA1: Tag = Tag(*b"TNA1");
    pub const FSTR: Tag = Tag(*b"FSTR");
    pub const TBDY: Tag = Tag(*b"TBDY");
    pub const THSH: Tag = Tag(*b"THSH");
    pub const TPAD: Tag = Tag(*b"TPAD");

    /// Tag as a string (for display).
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("????")
    }

    /// Tags whose payload is a list of child sections.
    pub fn is_container(self) -> bool {
        matches!(self, Tag::TAG0 | Tag::TCM0 | Tag::TYPE | Tag::INDX)
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.iter().all(|b| b.is_ascii_graphic()) {
            f.write_str(self.as_str())
        } else {
            write!(f, "{:02x?}", self.0)
        }
    }
}

impl std::fmt::Debug for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Tag({self})")
    }
}

/// How the four bytes before a tag split into length and flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeaderLayout {
    /// One 32-bit word: flags in the high nibble, length in the low 28 bits.
    /// Used by `TAG0` object files.
    Packed32,
    /// A 16-bit length followed by 16-bit flags. Used by `TCM0` compendiums.
    Split16,
}

impl HeaderLayout {
    /// Default layout for a top-level tag.
    pub fn for_root(tag: Tag) -> Option<Self> {
        match tag {
            Tag::TAG0 => Some(Self::Packed32),
            Tag::TCM0 => Some(Self::Split16),
            _ => None,
        }
    }

    /// Split a raw header word into `(length, flags)`.
    pub fn decode(self, word: u32) -> (usize, u32) {
        match self {
            Self::Packed32 => ((word & 0x0fff_ffff) as usize, word & 0xf000_0000),
            Self::Split16 => ((word >> 16) as usize, word & 0xffff),
        }
    }

    /// Largest length this layout can express.
    pub fn max_length(self) -> usize {
        match self {
            Self::Packed32 => 0x0fff_ffff,
            Self::Split16 => 0xffff,
        }
    }

    fn encode(self, length: usize, flags: u32) -> u32 {
        match self {
            Self::Packed32 => (flags & 0xf000_0000) | length as u32,
            Self::Split16 => ((length as u32) << 16) | (flags & 0xffff),
        }
    }
}

/// A parsed section header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionHeader {
    pub tag: Tag,
    /// Declared length, header included.
    pub length: usize,
    /// Header bits outside the length field, kept uninterpreted.
    pub flags: u32,
    /// Absolute offset of the header in the file.
    pub offset: usize,
}

impl SectionHeader {
    pub fn payload_len(&self) -> usize {
        self.length - HEADER_SIZE
    }

    /// Absolute offset one past the section.
    pub fn end(&self) -> usize {
        self.offset + self.length
    }
}

/// Header flag bits observed per tag, replayed when re-encoding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionFlags(Vec<(Tag, u32)>);

impl SectionFlags {
    /// Remember the flags of `header`. Zero flags are the default and are not stored.
    pub fn record(&mut self, header: &SectionHeader) {
        self.0.retain(|(t, _)| *t != header.tag);
        if header.flags != 0 {
            self.0.push((header.tag, header.flags));
        }
    }

    /// Flags for `tag`, zero when never recorded.
    pub fn get(&self, tag: Tag) -> u32 {
        self.0
            .iter()
            .find(|(t, _)| *t == tag)
            .map_or(0, |(_, flags)| *flags)
    }
}

/// Read the tag of the section at the cursor without consuming anything.
pub fn peek_tag(c: &Cursor<'_>) -> Result<Tag> {
    let bytes = c.peek_bytes(HEADER_SIZE)?;
    let mut tag = [0u8; 4];
    tag.copy_from_slice(&bytes[4..8]);
    Ok(Tag(tag))
}

/// Read a section header and validate its length against the enclosing region.
pub fn read_header(c: &mut Cursor<'_>, layout: HeaderLayout) -> Result<SectionHeader> {
    let offset = c.absolute_position();
    let available = c.remaining();
    let word = c.read_u32_be()?;
    let tag = Tag(c.read_magic()?);
    let (length, flags) = layout.decode(word);
    if length < HEADER_SIZE {
        return Err(Error::UnexpectedEof {
            offset,
            need: HEADER_SIZE,
            have: length,
        });
    }
    if length > available {
        return Err(Error::SectionOverrun {
            tag,
            offset,
            length,
            available,
        });
    }
    Ok(SectionHeader {
        tag,
        length,
        flags,
        offset,
    })
}

/// Read the next section, which must carry the `expected` tag.
///
/// Returns the header and a cursor over exactly its payload. The parent cursor
/// is left at the section end whatever the caller does with the payload.
pub fn read_section<'a>(
    c: &mut Cursor<'a>,
    layout: HeaderLayout,
    expected: Tag,
) -> Result<(SectionHeader, Cursor<'a>)> {
    let found = peek_tag(c)?;
    if found != expected {
        return Err(Error::FormatMismatch {
            offset: c.absolute_position(),
            expected,
            found,
        });
    }
    let header = read_header(c, layout)?;
    let payload = c.step_in(header.payload_len())?;
    trace!(tag = %header.tag, offset = header.offset, length = header.length, "section");
    Ok((header, payload))
}

/// Detect the top-level tag and its default header layout.
pub fn detect_root(data: &[u8]) -> Result<(Tag, HeaderLayout)> {
    let tag = peek_tag(&Cursor::new(data))?;
    HeaderLayout::for_root(tag)
        .map(|layout| (tag, layout))
        .ok_or(Error::UnknownFormat { found: tag })
}

/// Payload of a node in a section outline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionBody<'a> {
    Raw(&'a [u8]),
    Children(Vec<SectionNode<'a>>),
}

/// One section in a parsed outline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionNode<'a> {
    pub header: SectionHeader,
    pub body: SectionBody<'a>,
}

impl<'a> SectionNode<'a> {
    pub fn children(&self) -> &[SectionNode<'a>] {
        match &self.body {
            SectionBody::Children(children) => children,
            SectionBody::Raw(_) => &[],
        }
    }

    /// Depth-first search for the first section with `tag`.
    pub fn find(&self, tag: Tag) -> Option<&SectionNode<'a>> {
        if self.header.tag == tag {
            return Some(self);
        }
        self.children().iter().find_map(|child| child.find(tag))
    }

    /// Tags of this node's direct children, in file order.
    pub fn child_tags(&self) -> Vec<Tag> {
        self.children().iter().map(|c| c.header.tag).collect()
    }
}

/// Walk a whole tagfile and return its section tree.
///
/// Recurses into the known container tags and keeps every other payload raw.
/// `layout` overrides the layout chosen from the top-level tag.
pub fn outline(data: &[u8], layout: Option<HeaderLayout>) -> Result<SectionNode<'_>> {
    let (_, default_layout) = detect_root(data)?;
    let layout = layout.unwrap_or(default_layout);
    let mut c = Cursor::new(data);
    outline_node(&mut c, layout)
}

fn outline_node<'a>(c: &mut Cursor<'a>, layout: HeaderLayout) -> Result<SectionNode<'a>> {
    let header = read_header(c, layout)?;
    let mut payload = c.step_in(header.payload_len())?;
    let body = if header.tag.is_container() {
        let mut children = Vec::new();
        while payload.remaining() >= HEADER_SIZE {
            children.push(outline_node(&mut payload, layout)?);
        }
        SectionBody::Children(children)
    } else {
        SectionBody::Raw(payload.data())
    };
    Ok(SectionNode { header, body })
}

/// Open a section in `w`: reserve its header and write the tag.
///
/// Returns the header position to pass to [`end_section`].
pub fn begin_section(w: &mut Writer, tag: Tag) -> usize {
    let start = w.position();
    w.write_u32_be(0);
    w.write_magic(&tag.0);
    start
}

/// Close a section opened at `start`, patching its length.
pub fn end_section(w: &mut Writer, start: usize, layout: HeaderLayout, flags: u32) -> Result<()> {
    let length = w.position() - start;
    if length > layout.max_length() {
        let mut tag = [0u8; 4];
        tag.copy_from_slice(&w.as_slice()[start + 4..start + 8]);
        return Err(Error::SectionOverrun {
            tag: Tag(tag),
            offset: start,
            length,
            available: layout.max_length(),
        });
    }
    w.patch_u32_be(start, layout.encode(length, flags));
    Ok(())
}

/// Write a leaf section holding `payload`.
pub fn write_raw_section(
    w: &mut Writer,
    tag: Tag,
    layout: HeaderLayout,
    flags: u32,
    payload: &[u8],
) -> Result<()> {
    let start = begin_section(w, tag);
    w.write_bytes(payload);
    end_section(w, start, layout, flags)
}
