use crate::byte_helper::{u32_to_bytes, utf16le_to_string, utf16le_from_str};
use crate::error::{NtlmError, NtlmResult};
use crate::flags::NegotiateFlags;
use crate::payload::{append_field, parse_payload_field, PayloadField};
use crate::version::{Version, VERSION_SIZE};

use super::{check_signature_and_type, MESSAGE_TYPE_NEGOTIATE, SIGNATURE};

const FIXED_HEADER_LEN: usize = 32;

/// The first handshake message. Optional in this library — sessions may be driven
/// straight from a [`super::ChallengeMessage`] received out of band.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiateMessage {
    pub flags: NegotiateFlags,
    pub domain_name: String,
    pub workstation: String,
    pub version: Option<Version>,
}

impl NegotiateMessage {
    pub fn new(flags: NegotiateFlags, domain_name: impl Into<String>, workstation: impl Into<String>, version: Option<Version>) -> Self {
        Self {
            flags,
            domain_name: domain_name.into(),
            workstation: workstation.into(),
            version,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut header = vec![0u8; FIXED_HEADER_LEN];
        header[0..8].copy_from_slice(SIGNATURE);
        header[8..12].copy_from_slice(&u32_to_bytes(MESSAGE_TYPE_NEGOTIATE));
        header[12..16].copy_from_slice(&u32_to_bytes(self.flags.bits()));

        let mut payload_base = FIXED_HEADER_LEN as u32;
        if self.version.is_some() {
            payload_base += VERSION_SIZE as u32;
        }

        let mut payload = Vec::new();
        let domain_field = append_field(&mut payload, payload_base, &utf16le_from_str(&self.domain_name));
        let workstation_field = append_field(&mut payload, payload_base, &utf16le_from_str(&self.workstation));

        header[16..24].copy_from_slice(&domain_field.as_bytes());
        header[24..32].copy_from_slice(&workstation_field.as_bytes());

        let mut out = header;
        if let Some(version) = &self.version {
            out.extend_from_slice(&version.as_bytes());
        }
        out.extend_from_slice(&payload);
        out
    }

    pub fn decode(bytes: &[u8]) -> NtlmResult<Self> {
        check_signature_and_type(bytes, MESSAGE_TYPE_NEGOTIATE)?;
        if bytes.len() < FIXED_HEADER_LEN {
            return Err(NtlmError::malformed("negotiate message shorter than fixed header"));
        }

        let flags = NegotiateFlags::from_bits_truncate(crate::byte_helper::bytes_to_u32(&bytes[12..16]));
        let (_, domain_field) = parse_payload_field(&bytes[16..24]).map_err(NtlmError::from)?;
        let (_, workstation_field) = parse_payload_field(&bytes[24..32]).map_err(NtlmError::from)?;

        let min_offset = [domain_field.offset, workstation_field.offset]
            .into_iter()
            .filter(|o| *o > 0)
            .min();

        let version = if flags.is_set(NegotiateFlags::NEGOTIATE_VERSION)
            && min_offset.map(|o| o as usize >= FIXED_HEADER_LEN + VERSION_SIZE).unwrap_or(true)
            && bytes.len() >= FIXED_HEADER_LEN + VERSION_SIZE
        {
            Some(Version::parse(&bytes[FIXED_HEADER_LEN..FIXED_HEADER_LEN + VERSION_SIZE])?)
        } else {
            None
        };

        let domain_name = utf16le_to_string(domain_field.resolve(bytes).unwrap_or(&[]));
        let workstation = utf16le_to_string(workstation_field.resolve(bytes).unwrap_or(&[]));

        Ok(Self {
            flags,
            domain_name,
            workstation,
            version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trip() {
        let msg = NegotiateMessage::new(
            NegotiateFlags::NEGOTIATE_UNICODE | NegotiateFlags::NEGOTIATE_VERSION,
            "DOMAIN",
            "WORKSTATION",
            Some(Version::new(10, 0, 19041, 15)),
        );
        let bytes = msg.encode();
        let decoded = NegotiateMessage::decode(&bytes).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn decode_rejects_bad_signature() {
        let mut bytes = vec![0u8; 32];
        bytes[8..12].copy_from_slice(&u32_to_bytes(MESSAGE_TYPE_NEGOTIATE));
        assert!(NegotiateMessage::decode(&bytes).is_err());
    }
}
