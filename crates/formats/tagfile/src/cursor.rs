use crate::error::{Error, Result};

/// Read cursor over a byte slice.
///
/// Plain reads are little-endian (object data, ITEM entries, ids); the `_be`
/// variants serve section headers.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
    /// Absolute offset of `data[0]` in the enclosing file, for error reporting.
    base: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            base: 0,
        }
    }

    /// Current byte position (relative to this cursor's region).
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Position in the enclosing file.
    pub fn absolute_position(&self) -> usize {
        self.base + self.pos
    }

    /// Total length of underlying data.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether we've reached the end.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Remaining bytes from current position.
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Seek to a position within this region.
    pub fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    /// Skip `n` bytes forward.
    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.ensure(n)?;
        self.pos += n;
        Ok(())
    }

    /// Read a slice of `n` bytes without copying.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.ensure(n)?;
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Look at the next `n` bytes without consuming them.
    pub fn peek_bytes(&self, n: usize) -> Result<&'a [u8]> {
        self.ensure(n)?;
        Ok(&self.data[self.pos..self.pos + n])
    }

    /// Step into the next `n` bytes: returns a cursor over exactly that region
    /// and moves this cursor past it.
    pub fn step_in(&mut self, n: usize) -> Result<Cursor<'a>> {
        let start = self.absolute_position();
        let bytes = self.read_bytes(n)?;
        Ok(Cursor {
            data: bytes,
            pos: 0,
            base: start,
        })
    }

    /// Read a 4-byte tag.
    pub fn read_magic(&mut self) -> Result<[u8; 4]> {
        let bytes = self.read_bytes(4)?;
        let mut magic = [0u8; 4];
        magic.copy_from_slice(bytes);
        Ok(magic)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        let v = self.data[self.pos];
        self.pos += 1;
        Ok(v)
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    /// One-byte boolean (any non-zero value is true).
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(i16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32_be(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.read_array()?))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.read_array()?))
    }

    /// Read an IEEE half-precision float, widened to `f32`.
    pub fn read_f16(&mut self) -> Result<f32> {
        Ok(f16_to_f32(self.read_u16()?))
    }

    /// Read a null-terminated string. The terminator is consumed.
    pub fn read_cstring(&mut self) -> Result<String> {
        let offset = self.absolute_position();
        let rest = &self.data[self.pos.min(self.data.len())..];
        let len = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(Error::UnexpectedEof {
                offset,
                need: rest.len() + 1,
                have: rest.len(),
            })?;
        let bytes = self.read_bytes(len)?;
        self.skip(1)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| Error::InvalidString { offset, source: e })
    }

    /// Read an engine varint.
    ///
    /// The high bits of the first byte select the encoded length; the first
    /// byte's remaining bits are the most significant, followed by each extra
    /// byte in order.
    pub fn read_varint(&mut self) -> Result<u64> {
        let offset = self.absolute_position();
        let b0 = self.read_u8()?;
        if b0 & 0x80 == 0 {
            return Ok(b0 as u64);
        }
        let (extra, head) = match b0 >> 3 {
            0x10..=0x17 => (1, b0 & 0x3f),
            0x18..=0x1b => (2, b0 & 0x1f),
            0x1c | 0x1d => (if b0 & 0x08 == 0 { 3 } else { 4 }, b0 & 0x07),
            0x1e => (7, b0 & 0x07),
            _ => match b0 {
                0xf8 => (5, 0),
                0xf9 => (8, 0),
                _ => return Err(Error::InvalidVarint { offset, prefix: b0 }),
            },
        };
        let mut value = head as u64;
        for &b in self.read_bytes(extra)? {
            value = (value << 8) | b as u64;
        }
        Ok(value)
    }

    /// Read a varint that must fit in `u32`.
    pub fn read_varint_u32(&mut self) -> Result<u32> {
        let offset = self.absolute_position();
        let v = self.read_varint()?;
        u32::try_from(v).map_err(|_| Error::InvalidVarint {
            offset,
            prefix: self.data[offset - self.base],
        })
    }

    /// Access the full underlying data.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let bytes = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    fn ensure(&self, n: usize) -> Result<()> {
        if self.pos + n > self.data.len() {
            return Err(Error::UnexpectedEof {
                offset: self.absolute_position(),
                need: n,
                have: self.remaining(),
            });
        }
        Ok(())
    }
}

/// Writer that builds a byte buffer. Plain writes are little-endian.
#[derive(Debug, Clone)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            buf: Vec::with_capacity(cap),
        }
    }

    pub fn position(&self) -> usize {
        self.buf.len()
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_magic(&mut self, magic: &[u8; 4]) {
        self.buf.extend_from_slice(magic);
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_i16(&mut self, v: i16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u32_be(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_f16(&mut self, v: f32) {
        self.write_u16(f32_to_f16(v));
    }

    pub fn write_f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Zero-fill up to absolute position `pos`. Never truncates.
    pub fn pad_to(&mut self, pos: usize) {
        if self.buf.len() < pos {
            self.buf.resize(pos, 0);
        }
    }

    /// Write a string followed by a null terminator.
    pub fn write_cstring(&mut self, s: &str) {
        self.buf.extend_from_slice(s.as_bytes());
        self.buf.push(0);
    }

    /// Write an engine varint in its shortest form.
    pub fn write_varint(&mut self, v: u64) {
        let (prefix, extra): (u8, usize) = match v {
            0..=0x7f => {
                self.buf.push(v as u8);
                return;
            }
            0x80..=0x3fff => (0x80, 1),
            0x4000..=0x1f_ffff => (0xc0, 2),
            0x20_0000..=0x7ff_ffff => (0xe0, 3),
            0x800_0000..=0x7_ffff_ffff => (0xe8, 4),
            0x8_0000_0000..=0xff_ffff_ffff => {
                self.buf.push(0xf8);
                self.buf.extend_from_slice(&v.to_be_bytes()[3..]);
                return;
            }
            0x100_0000_0000..=0x7ff_ffff_ffff_ffff => (0xf0, 7),
            _ => {
                self.buf.push(0xf9);
                self.buf.extend_from_slice(&v.to_be_bytes());
                return;
            }
        };
        self.buf.push(prefix | (v >> (extra * 8)) as u8);
        for i in (0..extra).rev() {
            self.buf.push((v >> (i * 8)) as u8);
        }
    }

    /// Patch a big-endian u32 at a specific position (section headers).
    pub fn patch_u32_be(&mut self, pos: usize, v: u32) {
        self.buf[pos..pos + 4].copy_from_slice(&v.to_be_bytes());
    }

    /// Pad with zeros to a multiple of `align`.
    pub fn align_to(&mut self, align: usize) {
        while self.buf.len() % align != 0 {
            self.buf.push(0);
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

impl Default for Writer {
    fn default() -> Self {
        Self::new()
    }
}

/// Widen an IEEE 754 binary16 value.
pub fn f16_to_f32(bits: u16) -> f32 {
    let sign = ((bits >> 15) as u32) << 31;
    let exp = ((bits >> 10) & 0x1f) as u32;
    let mant = (bits & 0x3ff) as u32;
    let out = match (exp, mant) {
        (0, 0) => sign,
        (0, _) => {
            // Subnormal: renormalize into the f32 exponent range.
            let shift = mant.leading_zeros() - 21;
            let mant = (mant << shift) & 0x3ff;
            sign | ((113 - shift) << 23) | (mant << 13)
        }
        (0x1f, _) => sign | 0x7f80_0000 | (mant << 13),
        _ => sign | ((exp + 112) << 23) | (mant << 13),
    };
    f32::from_bits(out)
}

/// Narrow to IEEE 754 binary16, truncating extra mantissa bits.
pub fn f32_to_f16(v: f32) -> u16 {
    let bits = v.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exp = ((bits >> 23) & 0xff) as i32;
    let mant = bits & 0x7f_ffff;
    if exp == 0xff {
        let nan = if mant != 0 { 0x200 | (mant >> 13) as u16 } else { 0 };
        return sign | 0x7c00 | nan;
    }
    let e = exp - 112;
    if e >= 0x1f {
        return sign | 0x7c00;
    }
    if e <= 0 {
        if e < -10 {
            return sign;
        }
        return sign | ((mant | 0x80_0000) >> (14 - e)) as u16;
    }
    sign | ((e as u16) << 10) | (mant >> 13) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(v: u64) -> (u64, usize) {
        let mut w = Writer::new();
        w.write_varint(v);
        let bytes = w.into_bytes();
        let mut c = Cursor::new(&bytes);
        let decoded = c.read_varint().unwrap();
        assert!(c.is_empty());
        (decoded, bytes.len())
    }

    #[test]
    fn varint_length_classes() {
        assert_eq!(round_trip(0), (0, 1));
        assert_eq!(round_trip(0x7f), (0x7f, 1));
        assert_eq!(round_trip(0x80), (0x80, 2));
        assert_eq!(round_trip(0x3fff), (0x3fff, 2));
        assert_eq!(round_trip(0x4000), (0x4000, 3));
        assert_eq!(round_trip(0x1f_ffff), (0x1f_ffff, 3));
        assert_eq!(round_trip(0x20_0000), (0x20_0000, 4));
        assert_eq!(round_trip(0x7ff_ffff), (0x7ff_ffff, 4));
        assert_eq!(round_trip(0x800_0000), (0x800_0000, 5));
        assert_eq!(round_trip(0x7_ffff_ffff), (0x7_ffff_ffff, 5));
        assert_eq!(round_trip(0x8_0000_0000), (0x8_0000_0000, 6));
        assert_eq!(round_trip(0xff_ffff_ffff), (0xff_ffff_ffff, 6));
        assert_eq!(round_trip(0x100_0000_0000), (0x100_0000_0000, 8));
        assert_eq!(round_trip(u64::MAX), (u64::MAX, 9));
    }

    #[test]
    fn varint_known_bytes() {
        // Two-byte form: 0x81 0x02 -> 0x0102
        let mut c = Cursor::new(&[0x81, 0x02]);
        assert_eq!(c.read_varint().unwrap(), 0x102);
        // 0xF8 prefix carries a 40-bit value in the next five bytes.
        let mut c = Cursor::new(&[0xf8, 0x01, 0x00, 0x00, 0x00, 0x00]);
        assert_eq!(c.read_varint().unwrap(), 0x01_0000_0000);
    }

    #[test]
    fn varint_rejects_unknown_prefix() {
        let mut c = Cursor::new(&[0xfa, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert!(matches!(
            c.read_varint(),
            Err(Error::InvalidVarint { prefix: 0xfa, .. })
        ));
    }

    #[test]
    fn step_in_limits_region() {
        let data = [1u8, 2, 3, 4, 5];
        let mut c = Cursor::new(&data);
        c.skip(1).unwrap();
        let mut inner = c.step_in(2).unwrap();
        assert_eq!(c.position(), 3);
        assert_eq!(inner.absolute_position(), 1);
        assert_eq!(inner.read_u16().unwrap(), u16::from_le_bytes([2, 3]));
        assert!(matches!(
            inner.read_u8(),
            Err(Error::UnexpectedEof { offset: 3, .. })
        ));
    }

    #[test]
    fn cstring_requires_terminator() {
        let mut c = Cursor::new(b"abc\0de");
        assert_eq!(c.read_cstring().unwrap(), "abc");
        assert!(c.read_cstring().is_err());
    }

    #[test]
    fn half_floats() {
        assert_eq!(f16_to_f32(0x3c00), 1.0);
        assert_eq!(f16_to_f32(0xc000), -2.0);
        assert_eq!(f16_to_f32(0x3555), 0.333_251_95);
        assert_eq!(f16_to_f32(0x0001), 5.960_464_5e-8);
        assert!(f16_to_f32(0x7c00).is_infinite());
        for bits in [0x3c00u16, 0xc000, 0x3555, 0x0001, 0x03ff, 0x7bff, 0x8000] {
            assert_eq!(f32_to_f16(f16_to_f32(bits)), bits);
        }
    }
}
