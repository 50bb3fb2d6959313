use serde::Serialize;

use super::{Decode, FieldReader};
use crate::entity::ObjectIndex;
use crate::error::Result;

macro_rules! decode_scalar {
    ($($ty:ty => $read:ident),* $(,)?) => {
        $(
            impl Decode for $ty {
                fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
                    r.$read()
                }
            }
        )*
    };
}

decode_scalar! {
    u8 => read_u8,
    i8 => read_i8,
    bool => read_bool,
    u16 => read_u16,
    i16 => read_i16,
    u32 => read_u32,
    i32 => read_i32,
    u64 => read_u64,
    i64 => read_i64,
    f32 => read_f32,
}

/// A pointer field, also the layout of `hkRefPtr` array elements.
impl Decode for Option<ObjectIndex> {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        r.read_pointer()
    }
}

/// Dynamic array followed by a free-list head (24 bytes).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FreeListArray<T> {
    pub elements: Vec<T>,
    /// Head of the free-slot chain; kept as stored.
    pub first_free: u16,
}

impl<T: Decode> Decode for FreeListArray<T> {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        let elements = r.read_array()?;
        let first_free = r.read_u16()?;
        r.skip(6)?;
        Ok(Self {
            elements,
            first_free,
        })
    }
}

/// Array of `u32` words plus a bit count (24 bytes).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BitField {
    pub words: Vec<u32>,
    pub num_bits: i32,
}

impl BitField {
    /// Whether bit `index` is set. Bits past `num_bits` read as clear.
    pub fn get(&self, index: usize) -> bool {
        if index >= self.num_bits.max(0) as usize {
            return false;
        }
        self.words
            .get(index / 32)
            .is_some_and(|w| w & (1 << (index % 32)) != 0)
    }
}

impl Decode for BitField {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        let words = r.read_array()?;
        let num_bits = r.read_i32()?;
        r.skip(4)?;
        Ok(Self { words, num_bits })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_field_lookup() {
        let bits = BitField {
            words: vec![0b101, 1],
            num_bits: 33,
        };
        assert!(bits.get(0));
        assert!(!bits.get(1));
        assert!(bits.get(2));
        assert!(bits.get(32));
        assert!(!bits.get(33));
        assert!(!bits.get(1000));
    }
}
