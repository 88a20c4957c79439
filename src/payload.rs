//! C3: the (length, max-length, offset) triplet addressing a variable-length field in
//! the trailing payload region of a message, per MS-NLMP's `_FIELD` structures.

use nom::bytes::complete::take;
use nom::number::complete::{le_u16, le_u32};
use nom::IResult;
use serde::{Deserialize, Serialize};

use crate::byte_helper::{u16_to_bytes, u32_to_bytes};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct PayloadField {
    pub length: u16,
    pub max_length: u16,
    pub offset: u32,
}

impl PayloadField {
    pub(crate) fn empty() -> Self {
        Self {
            length: 0,
            max_length: 0,
            offset: 0,
        }
    }

    pub(crate) fn parse(bytes: &[u8]) -> IResult<&[u8], Self> {
        let (rest, length) = le_u16(bytes)?;
        let (rest, max_length) = le_u16(rest)?;
        let (rest, offset) = le_u32(rest)?;
        Ok((
            rest,
            Self {
                length,
                max_length,
                offset,
            },
        ))
    }

    pub(crate) fn as_bytes(&self) -> [u8; 8] {
        let mut out = [0u8; 8];
        out[0..2].copy_from_slice(&u16_to_bytes(self.length));
        out[2..4].copy_from_slice(&u16_to_bytes(self.max_length));
        out[4..8].copy_from_slice(&u32_to_bytes(self.offset));
        out
    }

    /// Resolve this field against the full message buffer it was read from, reporting
    /// `None` if the offset/length run past the end (caller turns that into `MalformedMessage`).
    pub(crate) fn resolve<'a>(&self, message: &'a [u8]) -> Option<&'a [u8]> {
        let start = self.offset as usize;
        let end = start.checked_add(self.length as usize)?;
        if end > message.len() {
            return None;
        }
        Some(&message[start..end])
    }
}

/// Appends `value` to the payload tail and returns the triplet addressing it, given the
/// offset the payload region starts at in the final message.
pub(crate) fn append_field(payload: &mut Vec<u8>, payload_base: u32, value: &[u8]) -> PayloadField {
    let offset = payload_base + payload.len() as u32;
    payload.extend_from_slice(value);
    PayloadField {
        length: value.len() as u16,
        max_length: value.len() as u16,
        offset,
    }
}

pub(crate) fn parse_payload_field(bytes: &[u8]) -> IResult<&[u8], PayloadField> {
    PayloadField::parse(bytes)
}

#[allow(dead_code)]
pub(crate) fn skip(bytes: &[u8], len: usize) -> IResult<&[u8], &[u8]> {
    take(len)(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_in_bounds() {
        let field = PayloadField {
            length: 4,
            max_length: 4,
            offset: 2,
        };
        let msg = b"ABCDEFGH";
        assert_eq!(field.resolve(msg), Some(&b"CDEF"[..]));
    }

    #[test]
    fn resolve_out_of_bounds_is_none() {
        let field = PayloadField {
            length: 10,
            max_length: 10,
            offset: 4,
        };
        let msg = b"ABCDEFGH";
        assert_eq!(field.resolve(msg), None);
    }

    #[test]
    fn append_field_tracks_offset() {
        let mut payload = Vec::new();
        let f1 = append_field(&mut payload, 32, b"abc");
        let f2 = append_field(&mut payload, 32, b"de");
        assert_eq!(f1.offset, 32);
        assert_eq!(f2.offset, 35);
        assert_eq!(f2.length, 2);
    }
}
