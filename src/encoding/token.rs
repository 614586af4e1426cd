//! Bit-field tokens.
//!
//! A [`TokenLayout`] describes one machine word: its width, its byte order and a
//! set of named, non-overlapping [`BitField`]s. A [`Token`] is a value of such a
//! word. Every write is range checked against the field it targets; values are
//! never silently truncated.

use crate::core::error::{CodegenError, CodegenResult};
use std::sync::Arc;

/// Byte order used when a token is serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Little,
    Big,
}

/// A named bit range within a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitField {
    pub name: &'static str,
    pub offset: u32,
    pub width: u32,
    /// Signed fields accept negative values and store them in two's complement.
    pub signed: bool,
}

impl BitField {
    fn mask(&self) -> u64 {
        low_mask(self.width) << self.offset
    }

    /// Inclusive range of values this field accepts.
    pub fn value_range(&self) -> (i64, i64) {
        if self.signed && self.width >= 64 {
            (i64::MIN, i64::MAX)
        } else if self.signed {
            let half = 1i64 << (self.width - 1);
            (-half, half - 1)
        } else if self.width >= 63 {
            (0, i64::MAX)
        } else {
            (0, (1i64 << self.width) - 1)
        }
    }

    /// Two's complement representation of `value`, validated against the field.
    pub fn pack(&self, value: i64) -> CodegenResult<u64> {
        let (min, max) = self.value_range();
        if value < min || value > max {
            return Err(CodegenError::EncodingRange {
                field: self.name.to_string(),
                value,
                constraint: format!("{}-bit {}", self.width, if self.signed { "signed" } else { "unsigned" }),
            });
        }
        Ok((value as u64) & low_mask(self.width))
    }

    fn overlaps(&self, other: &BitField) -> bool {
        self.mask() & other.mask() != 0
    }
}

fn low_mask(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// Shape of one machine word, shared between all tokens of that kind.
#[derive(Debug, PartialEq, Eq)]
pub struct TokenLayout {
    name: &'static str,
    width: u32,
    endianness: Endianness,
    fields: Vec<BitField>,
}

impl TokenLayout {
    pub fn builder(name: &'static str, width: u32, endianness: Endianness) -> TokenLayoutBuilder {
        TokenLayoutBuilder {
            layout: TokenLayout {
                name,
                width,
                endianness,
                fields: Vec::new(),
            },
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Width in bits.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Width in bytes.
    pub fn size(&self) -> usize {
        (self.width / 8) as usize
    }

    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    pub fn fields(&self) -> &[BitField] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&BitField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Builder validating a layout before it can be used.
pub struct TokenLayoutBuilder {
    layout: TokenLayout,
}

impl TokenLayoutBuilder {
    /// Add an unsigned field covering bits `offset..offset + width`.
    pub fn field(mut self, name: &'static str, offset: u32, width: u32) -> Self {
        self.layout.fields.push(BitField { name, offset, width, signed: false });
        self
    }

    /// Add a two's complement field covering bits `offset..offset + width`.
    pub fn signed_field(mut self, name: &'static str, offset: u32, width: u32) -> Self {
        self.layout.fields.push(BitField { name, offset, width, signed: true });
        self
    }

    /// Check widths, bounds, name uniqueness and overlap.
    pub fn build(self) -> CodegenResult<Arc<TokenLayout>> {
        let layout = self.layout;
        if layout.width == 0 || layout.width > 64 || layout.width % 8 != 0 {
            return Err(CodegenError::malformed(format!(
                "token `{}` has unsupported width {}",
                layout.name, layout.width
            )));
        }

        for (i, field) in layout.fields.iter().enumerate() {
            if field.width == 0 || field.offset + field.width > layout.width {
                return Err(CodegenError::malformed(format!(
                    "field `{}` of token `{}` does not fit in {} bits",
                    field.name, layout.name, layout.width
                )));
            }
            for other in &layout.fields[..i] {
                if other.name == field.name {
                    return Err(CodegenError::malformed(format!(
                        "token `{}` declares field `{}` twice",
                        layout.name, field.name
                    )));
                }
                if other.overlaps(field) {
                    return Err(CodegenError::malformed(format!(
                        "fields `{}` and `{}` of token `{}` overlap",
                        other.name, field.name, layout.name
                    )));
                }
            }
        }

        Ok(Arc::new(layout))
    }
}

/// One machine word being encoded.
#[derive(Debug, Clone)]
pub struct Token {
    layout: Arc<TokenLayout>,
    bits: u64,
}

impl Token {
    pub fn new(layout: Arc<TokenLayout>) -> Self {
        Self { layout, bits: 0 }
    }

    pub fn layout(&self) -> &TokenLayout {
        &self.layout
    }

    pub fn bits(&self) -> u64 {
        self.bits
    }

    /// Write a named field.
    pub fn set_field(&mut self, name: &str, value: i64) -> CodegenResult<()> {
        let field = self.layout.field(name).ok_or_else(|| {
            CodegenError::malformed(format!("token `{}` has no field `{}`", self.layout.name, name))
        })?;
        let packed = field.pack(value)?;
        self.bits = (self.bits & !field.mask()) | (packed << field.offset);
        Ok(())
    }

    /// Read a named field, sign-extending signed fields.
    pub fn get_field(&self, name: &str) -> CodegenResult<i64> {
        let field = self.layout.field(name).ok_or_else(|| {
            CodegenError::malformed(format!("token `{}` has no field `{}`", self.layout.name, name))
        })?;
        let raw = self.get_bits(field.offset, field.width);
        if field.signed && field.width < 64 && (raw >> (field.width - 1)) & 1 == 1 {
            Ok((raw | !low_mask(field.width)) as i64)
        } else {
            Ok(raw as i64)
        }
    }

    /// Write an unnamed bit range; used by explicit encoders.
    pub fn set_bits(&mut self, offset: u32, width: u32, value: u64) -> CodegenResult<()> {
        if width == 0 || offset + width > self.layout.width {
            return Err(CodegenError::malformed(format!(
                "bits {}..{} outside token `{}`",
                offset,
                offset + width,
                self.layout.name
            )));
        }
        if value & !low_mask(width) != 0 {
            return Err(CodegenError::EncodingRange {
                field: format!("{}[{}..{}]", self.layout.name, offset, offset + width),
                value: value as i64,
                constraint: format!("{}-bit unsigned", width),
            });
        }
        let mask = low_mask(width) << offset;
        self.bits = (self.bits & !mask) | (value << offset);
        Ok(())
    }

    pub fn get_bits(&self, offset: u32, width: u32) -> u64 {
        (self.bits >> offset) & low_mask(width)
    }

    /// Serialize in the layout's byte order.
    pub fn encode(&self) -> Vec<u8> {
        let size = self.layout.size();
        match self.layout.endianness {
            Endianness::Little => self.bits.to_le_bytes()[..size].to_vec(),
            Endianness::Big => self.bits.to_be_bytes()[8 - size..].to_vec(),
        }
    }
}

/// Concatenate tokens in declaration order.
pub fn encode_all(tokens: &[Token]) -> Vec<u8> {
    tokens.iter().flat_map(Token::encode).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word() -> Arc<TokenLayout> {
        TokenLayout::builder("word", 32, Endianness::Little)
            .field("cond", 28, 4)
            .field("rd", 12, 4)
            .signed_field("disp", 0, 12)
            .build()
            .unwrap()
    }

    #[test]
    fn test_set_and_encode_fields() {
        let mut token = Token::new(word());
        token.set_field("cond", 0xE).unwrap();
        token.set_field("rd", 3).unwrap();
        assert_eq!(token.bits(), 0xE000_3000);
        assert_eq!(token.encode(), vec![0x00, 0x30, 0x00, 0xE0]);
    }

    #[test]
    fn test_signed_field_round_trips() {
        let mut token = Token::new(word());
        token.set_field("disp", -4).unwrap();
        assert_eq!(token.get_bits(0, 12), 0xFFC);
        assert_eq!(token.get_field("disp").unwrap(), -4);
        assert!(token.set_field("disp", 2048).is_err());
        assert!(token.set_field("disp", -2048).is_ok());
    }

    #[test]
    fn test_unsigned_field_rejects_out_of_range() {
        let mut token = Token::new(word());
        let err = token.set_field("rd", 16).unwrap_err();
        assert!(matches!(err, CodegenError::EncodingRange { value: 16, .. }));
        assert!(token.set_field("rd", -1).is_err());
        assert_eq!(token.bits(), 0);
    }

    #[test]
    fn test_overlapping_fields_rejected() {
        let result = TokenLayout::builder("bad", 32, Endianness::Little)
            .field("a", 0, 8)
            .field("b", 4, 8)
            .build();
        assert!(matches!(result, Err(CodegenError::MalformedRegistration { .. })));

        let result = TokenLayout::builder("bad", 16, Endianness::Little)
            .field("a", 10, 8)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_big_endian_and_raw_bits() {
        let layout = TokenLayout::builder("half", 16, Endianness::Big).build().unwrap();
        let mut token = Token::new(layout);
        token.set_bits(8, 8, 0xAB).unwrap();
        token.set_bits(0, 4, 0x5).unwrap();
        assert_eq!(token.encode(), vec![0xAB, 0x05]);
        assert!(token.set_bits(0, 4, 0x10).is_err());
        assert!(token.set_bits(12, 8, 0).is_err());
    }
}
