use std::ops::Range;

use crate::error::{MappingError, Result};

/// Little-endian storage type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
}

impl FieldKind {
    pub fn width(self) -> usize {
        match self {
            Self::U8 | Self::I8 => 1,
            Self::U16 | Self::I16 => 2,
            Self::U32 | Self::I32 => 4,
        }
    }

    fn bits(self) -> u32 {
        self.width() as u32 * 8
    }

    pub fn min(self) -> i64 {
        match self {
            Self::U8 | Self::U16 | Self::U32 => 0,
            Self::I8 => i64::from(i8::MIN),
            Self::I16 => i64::from(i16::MIN),
            Self::I32 => i64::from(i32::MIN),
        }
    }

    pub fn max(self) -> i64 {
        match self {
            Self::U8 => i64::from(u8::MAX),
            Self::I8 => i64::from(i8::MAX),
            Self::U16 => i64::from(u16::MAX),
            Self::I16 => i64::from(i16::MAX),
            Self::U32 => i64::from(u32::MAX),
            Self::I32 => i64::from(i32::MAX),
        }
    }
}

/// A named region of a report: whole bytes, or the bits selected by `mask`.
#[derive(Debug, Clone, PartialEq)]
pub struct HidField {
    name: String,
    offset: usize,
    kind: FieldKind,
    mask: Option<u32>,
    value: i64,
}

impl HidField {
    pub fn new(
        name: impl Into<String>,
        offset: usize,
        kind: FieldKind,
        mask: Option<u32>,
    ) -> Result<Self> {
        let name = name.into();
        if let Some(mask) = mask {
            let too_wide = kind.bits() < 32 && mask >> kind.bits() != 0;
            if mask == 0 || too_wide {
                return Err(MappingError::InvalidMask { field: name, mask });
            }
        }
        Ok(Self {
            name,
            offset,
            kind,
            mask,
            value: 0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn value(&self) -> i64 {
        self.value
    }

    pub(crate) fn set_value(&mut self, value: i64) {
        self.value = value;
    }

    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset.saturating_add(self.kind.width())
    }

    /// Largest value the field can carry.
    pub fn max(&self) -> i64 {
        match self.mask {
            Some(mask) => i64::from(mask >> mask.trailing_zeros()),
            None => self.kind.max(),
        }
    }

    pub fn min(&self) -> i64 {
        match self.mask {
            Some(_) => 0,
            None => self.kind.min(),
        }
    }

    /// Shared bytes are allowed only between masked fields of the same slot with disjoint masks.
    pub fn conflicts_with(&self, other: &HidField) -> bool {
        let a = self.range();
        let b = other.range();
        if a.start >= b.end || b.start >= a.end {
            return false;
        }
        match (self.mask, other.mask) {
            (Some(mine), Some(theirs)) => {
                self.offset != other.offset || self.kind != other.kind || mine & theirs != 0
            }
            _ => true,
        }
    }

    fn read_raw(&self, buf: &[u8]) -> u32 {
        let mut bytes = [0u8; 4];
        bytes[..self.kind.width()].copy_from_slice(&buf[self.range()]);
        u32::from_le_bytes(bytes)
    }

    fn write_raw(&self, raw: u32, buf: &mut [u8]) {
        let range = self.range();
        let width = self.kind.width();
        buf[range].copy_from_slice(&raw.to_le_bytes()[..width]);
    }

    /// Decode this field from a full report. `buf` must cover `range()`.
    pub fn extract(&self, buf: &[u8]) -> i64 {
        let raw = self.read_raw(buf);
        if let Some(mask) = self.mask {
            return i64::from((raw & mask) >> mask.trailing_zeros());
        }
        match self.kind {
            FieldKind::U8 | FieldKind::U16 | FieldKind::U32 => i64::from(raw),
            FieldKind::I8 => i64::from(raw as u8 as i8),
            FieldKind::I16 => i64::from(raw as u16 as i16),
            FieldKind::I32 => i64::from(raw as i32),
        }
    }

    /// Encode `value` into a full report, leaving bits outside the mask untouched.
    pub fn insert(&self, value: i64, buf: &mut [u8]) {
        let value = value.clamp(self.min(), self.max());
        match self.mask {
            Some(mask) => {
                let shifted = ((value as u32) << mask.trailing_zeros()) & mask;
                let raw = (self.read_raw(buf) & !mask) | shifted;
                self.write_raw(raw, buf);
            }
            None => self.write_raw(value as u32, buf),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masked_bits_read_as_small_integers() {
        let field = HidField::new("mode", 1, FieldKind::U8, Some(0x02)).unwrap();
        assert_eq!(field.extract(&[0x01, 0x02]), 1);
        assert_eq!(field.extract(&[0x01, 0xFD]), 0);

        let nibble = HidField::new("enc", 1, FieldKind::U8, Some(0xF0)).unwrap();
        assert_eq!(nibble.extract(&[0x00, 0xA5]), 0x0A);
    }

    #[test]
    fn insert_keeps_neighbouring_bits() {
        let a = HidField::new("a", 1, FieldKind::U8, Some(0x01)).unwrap();
        let b = HidField::new("b", 1, FieldKind::U8, Some(0x10)).unwrap();
        let mut buf = [0x80, 0x00];
        a.insert(1, &mut buf);
        b.insert(1, &mut buf);
        assert_eq!(buf, [0x80, 0x11]);
        a.insert(0, &mut buf);
        assert_eq!(buf, [0x80, 0x10]);
    }

    #[test]
    fn little_endian_words() {
        let field = HidField::new("gain", 1, FieldKind::U16, None).unwrap();
        let mut buf = [0u8; 3];
        field.insert(0x0ABC, &mut buf);
        assert_eq!(buf, [0x00, 0xBC, 0x0A]);
        assert_eq!(field.extract(&buf), 0x0ABC);

        let signed = HidField::new("delta", 1, FieldKind::I16, None).unwrap();
        signed.insert(-2, &mut buf);
        assert_eq!(buf, [0x00, 0xFE, 0xFF]);
        assert_eq!(signed.extract(&buf), -2);
    }

    #[test]
    fn out_of_range_values_saturate() {
        let field = HidField::new("led", 1, FieldKind::U8, None).unwrap();
        let mut buf = [0u8; 2];
        field.insert(300, &mut buf);
        assert_eq!(buf[1], 0xFF);
        field.insert(-4, &mut buf);
        assert_eq!(buf[1], 0x00);
    }

    #[test]
    fn overlap_rules() {
        let word = HidField::new("word", 1, FieldKind::U16, None).unwrap();
        let byte = HidField::new("byte", 2, FieldKind::U8, None).unwrap();
        let after = HidField::new("after", 3, FieldKind::U8, None).unwrap();
        assert!(word.conflicts_with(&byte));
        assert!(!word.conflicts_with(&after));

        let bit0 = HidField::new("bit0", 5, FieldKind::U8, Some(0x01)).unwrap();
        let bit1 = HidField::new("bit1", 5, FieldKind::U8, Some(0x02)).unwrap();
        let also0 = HidField::new("also0", 5, FieldKind::U8, Some(0x01)).unwrap();
        let plain = HidField::new("plain", 5, FieldKind::U8, None).unwrap();
        assert!(!bit0.conflicts_with(&bit1));
        assert!(bit0.conflicts_with(&also0));
        assert!(bit0.conflicts_with(&plain));
    }

    #[test]
    fn rejects_bad_masks() {
        assert!(HidField::new("x", 1, FieldKind::U8, Some(0)).is_err());
        assert!(HidField::new("x", 1, FieldKind::U8, Some(0x100)).is_err());
        assert!(HidField::new("x", 1, FieldKind::U16, Some(0x100)).is_ok());
    }
}
