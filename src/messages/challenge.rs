use crate::av_pair::AvPairs;
use crate::byte_helper::{bytes_to_u32, u32_to_bytes, utf16le_from_str, utf16le_to_string};
use crate::error::{NtlmError, NtlmResult};
use crate::flags::NegotiateFlags;
use crate::payload::{append_field, parse_payload_field};
use crate::version::{Version, VERSION_SIZE};

use super::{check_signature_and_type, MESSAGE_TYPE_CHALLENGE, SIGNATURE};

const FIXED_HEADER_LEN: usize = 48;

/// The second handshake message, sent server → client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeMessage {
    pub target_name: String,
    pub flags: NegotiateFlags,
    pub server_challenge: [u8; 8],
    pub target_info: AvPairs,
    pub version: Option<Version>,
}

impl ChallengeMessage {
    pub fn new(
        target_name: impl Into<String>,
        flags: NegotiateFlags,
        server_challenge: [u8; 8],
        target_info: AvPairs,
        version: Option<Version>,
    ) -> Self {
        Self {
            target_name: target_name.into(),
            flags,
            server_challenge,
            target_info,
            version,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut header = vec![0u8; FIXED_HEADER_LEN];
        header[0..8].copy_from_slice(SIGNATURE);
        header[8..12].copy_from_slice(&u32_to_bytes(MESSAGE_TYPE_CHALLENGE));
        // TargetName triplet at 12..20, filled in after the payload is built.
        header[20..24].copy_from_slice(&u32_to_bytes(self.flags.bits()));
        header[24..32].copy_from_slice(&self.server_challenge);
        // Reserved 32..40 left zero.
        // TargetInfo triplet at 40..48, filled in after the payload is built.

        let mut payload_base = FIXED_HEADER_LEN as u32;
        if self.version.is_some() {
            payload_base += VERSION_SIZE as u32;
        }

        let mut payload = Vec::new();
        let target_name_field = append_field(&mut payload, payload_base, &utf16le_from_str(&self.target_name));
        let target_info_field = append_field(&mut payload, payload_base, &self.target_info.as_bytes());

        header[12..20].copy_from_slice(&target_name_field.as_bytes());
        header[40..48].copy_from_slice(&target_info_field.as_bytes());

        let mut out = header;
        if let Some(version) = &self.version {
            out.extend_from_slice(&version.as_bytes());
        }
        out.extend_from_slice(&payload);
        out
    }

    pub fn decode(bytes: &[u8]) -> NtlmResult<Self> {
        check_signature_and_type(bytes, MESSAGE_TYPE_CHALLENGE)?;
        if bytes.len() < FIXED_HEADER_LEN {
            return Err(NtlmError::malformed("challenge message shorter than fixed header"));
        }

        let (_, target_name_field) = parse_payload_field(&bytes[12..20]).map_err(NtlmError::from)?;
        let flags = NegotiateFlags::from_bits_truncate(bytes_to_u32(&bytes[20..24]));
        let mut server_challenge = [0u8; 8];
        server_challenge.copy_from_slice(&bytes[24..32]);
        let (_, target_info_field) = parse_payload_field(&bytes[40..48]).map_err(NtlmError::from)?;

        let min_offset = [target_name_field.offset, target_info_field.offset]
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

        let target_name = utf16le_to_string(target_name_field.resolve(bytes).unwrap_or(&[]));
        let target_info_bytes = target_info_field
            .resolve(bytes)
            .ok_or_else(|| NtlmError::malformed("TargetInfo offset/length out of range"))?;
        let (_, target_info) = AvPairs::parse(target_info_bytes).map_err(NtlmError::from)?;

        Ok(Self {
            target_name,
            flags,
            server_challenge,
            target_info,
            version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::av_pair::{AvPair, MSV_AV_NB_DOMAIN_NAME};

    #[test]
    fn encode_decode_round_trip() {
        let mut target_info = AvPairs::new();
        target_info.push(AvPair::string(MSV_AV_NB_DOMAIN_NAME, "DOMAIN"));
        target_info.push(AvPair::eol());

        let msg = ChallengeMessage::new(
            "DOMAIN",
            NegotiateFlags::NEGOTIATE_UNICODE | NegotiateFlags::NEGOTIATE_TARGET_INFO,
            [0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef],
            target_info,
            None,
        );
        let bytes = msg.encode();
        let decoded = ChallengeMessage::decode(&bytes).unwrap();
        assert_eq!(decoded, msg);
    }
}
