use crate::byte_helper::{bytes_to_u32, u32_to_bytes, utf16le_from_str, utf16le_to_string};
use crate::error::{NtlmError, NtlmResult};
use crate::flags::NegotiateFlags;
use crate::payload::{append_field, parse_payload_field};
use crate::version::{Version, VERSION_SIZE};

use super::{check_signature_and_type, MESSAGE_TYPE_AUTHENTICATE, SIGNATURE};

const FIXED_HEADER_LEN: usize = 64;
const MIC_SIZE: usize = 16;

/// The third handshake message, sent client → server. Carries both responses,
/// the identity fields, and (when key exchange was negotiated) the wrapped
/// session key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticateMessage {
    pub lm_challenge_response: Vec<u8>,
    pub nt_challenge_response: Vec<u8>,
    pub domain_name: String,
    pub user_name: String,
    pub workstation: String,
    pub encrypted_random_session_key: Vec<u8>,
    pub flags: NegotiateFlags,
    pub version: Option<Version>,
    pub mic: Option<[u8; 16]>,
}

impl AuthenticateMessage {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        lm_challenge_response: Vec<u8>,
        nt_challenge_response: Vec<u8>,
        domain_name: impl Into<String>,
        user_name: impl Into<String>,
        workstation: impl Into<String>,
        encrypted_random_session_key: Vec<u8>,
        flags: NegotiateFlags,
        version: Option<Version>,
        mic: Option<[u8; 16]>,
    ) -> Self {
        Self {
            lm_challenge_response,
            nt_challenge_response,
            domain_name: domain_name.into(),
            user_name: user_name.into(),
            workstation: workstation.into(),
            encrypted_random_session_key,
            flags,
            version,
            mic,
        }
    }

    /// The client challenge embedded in this message, per MS-NLMP: for NTLMv2 it is
    /// bytes [32..40] of `NtChallengeResponse` (the `ChallengeFromClient` field inside
    /// `NTLMv2_CLIENT_CHALLENGE`, after the 16-byte `NTProofStr`); for NTLMv1 with
    /// extended session security it is the first 8 bytes of `LmChallengeResponse`;
    /// otherwise there is none.
    pub fn client_challenge(&self) -> Option<[u8; 8]> {
        if self.nt_challenge_response.len() > 24 {
            if self.nt_challenge_response.len() < 40 {
                return None;
            }
            let mut out = [0u8; 8];
            out.copy_from_slice(&self.nt_challenge_response[32..40]);
            Some(out)
        } else if self.flags.is_set(NegotiateFlags::NEGOTIATE_EXTENDED_SESSIONSECURITY) {
            if self.lm_challenge_response.len() < 8 {
                return None;
            }
            let mut out = [0u8; 8];
            out.copy_from_slice(&self.lm_challenge_response[0..8]);
            Some(out)
        } else {
            None
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut header = vec![0u8; FIXED_HEADER_LEN];
        header[0..8].copy_from_slice(SIGNATURE);
        header[8..12].copy_from_slice(&u32_to_bytes(MESSAGE_TYPE_AUTHENTICATE));
        header[60..64].copy_from_slice(&u32_to_bytes(self.flags.bits()));

        let mut payload_base = FIXED_HEADER_LEN as u32;
        if self.version.is_some() {
            payload_base += VERSION_SIZE as u32;
        }
        if self.mic.is_some() {
            payload_base += MIC_SIZE as u32;
        }

        let mut payload = Vec::new();
        let lm_field = append_field(&mut payload, payload_base, &self.lm_challenge_response);
        let nt_field = append_field(&mut payload, payload_base, &self.nt_challenge_response);
        let domain_field = append_field(&mut payload, payload_base, &utf16le_from_str(&self.domain_name));
        let user_field = append_field(&mut payload, payload_base, &utf16le_from_str(&self.user_name));
        let workstation_field = append_field(&mut payload, payload_base, &utf16le_from_str(&self.workstation));
        let session_key_field = append_field(&mut payload, payload_base, &self.encrypted_random_session_key);

        header[12..20].copy_from_slice(&lm_field.as_bytes());
        header[20..28].copy_from_slice(&nt_field.as_bytes());
        header[28..36].copy_from_slice(&domain_field.as_bytes());
        header[36..44].copy_from_slice(&user_field.as_bytes());
        header[44..52].copy_from_slice(&workstation_field.as_bytes());
        header[52..60].copy_from_slice(&session_key_field.as_bytes());

        let mut out = header;
        if let Some(version) = &self.version {
            out.extend_from_slice(&version.as_bytes());
        }
        if let Some(mic) = &self.mic {
            out.extend_from_slice(mic);
        }
        out.extend_from_slice(&payload);
        out
    }

    pub fn decode(bytes: &[u8]) -> NtlmResult<Self> {
        check_signature_and_type(bytes, MESSAGE_TYPE_AUTHENTICATE)?;
        if bytes.len() < FIXED_HEADER_LEN {
            return Err(NtlmError::malformed("authenticate message shorter than fixed header"));
        }

        let (_, lm_field) = parse_payload_field(&bytes[12..20]).map_err(NtlmError::from)?;
        let (_, nt_field) = parse_payload_field(&bytes[20..28]).map_err(NtlmError::from)?;
        let (_, domain_field) = parse_payload_field(&bytes[28..36]).map_err(NtlmError::from)?;
        let (_, user_field) = parse_payload_field(&bytes[36..44]).map_err(NtlmError::from)?;
        let (_, workstation_field) = parse_payload_field(&bytes[44..52]).map_err(NtlmError::from)?;
        let (_, session_key_field) = parse_payload_field(&bytes[52..60]).map_err(NtlmError::from)?;
        let flags = NegotiateFlags::from_bits_truncate(bytes_to_u32(&bytes[60..64]));

        let min_offset = [
            lm_field.offset,
            nt_field.offset,
            domain_field.offset,
            user_field.offset,
            workstation_field.offset,
            session_key_field.offset,
        ]
        .into_iter()
        .filter(|o| *o > 0)
        .min();

        let has_version = flags.is_set(NegotiateFlags::NEGOTIATE_VERSION)
            && min_offset.map(|o| o as usize >= FIXED_HEADER_LEN + VERSION_SIZE).unwrap_or(true)
            && bytes.len() >= FIXED_HEADER_LEN + VERSION_SIZE;
        let after_version = FIXED_HEADER_LEN + if has_version { VERSION_SIZE } else { 0 };
        let has_mic = min_offset
            .map(|o| o as usize >= after_version + MIC_SIZE)
            .unwrap_or(false);
        let after_mic = after_version + if has_mic { MIC_SIZE } else { 0 };

        let version = if has_version {
            Some(Version::parse(&bytes[FIXED_HEADER_LEN..FIXED_HEADER_LEN + VERSION_SIZE])?)
        } else {
            None
        };

        let mic = if has_mic && bytes.len() >= after_mic {
            let mut out = [0u8; 16];
            out.copy_from_slice(&bytes[after_version..after_version + MIC_SIZE]);
            Some(out)
        } else {
            None
        };

        let lm_challenge_response = lm_field
            .resolve(bytes)
            .ok_or_else(|| {
                crate::logging::warn!(offset = lm_field.offset, length = lm_field.length, "LmChallengeResponse offset/length out of range");
                NtlmError::malformed("LmChallengeResponse offset/length out of range")
            })?
            .to_vec();
        let nt_challenge_response = nt_field
            .resolve(bytes)
            .ok_or_else(|| {
                crate::logging::warn!(offset = nt_field.offset, length = nt_field.length, "NtChallengeResponse offset/length out of range");
                NtlmError::malformed("NtChallengeResponse offset/length out of range")
            })?
            .to_vec();
        let domain_name = utf16le_to_string(domain_field.resolve(bytes).unwrap_or(&[]));
        let user_name = utf16le_to_string(user_field.resolve(bytes).unwrap_or(&[]));
        let workstation = utf16le_to_string(workstation_field.resolve(bytes).unwrap_or(&[]));
        let encrypted_random_session_key = session_key_field.resolve(bytes).unwrap_or(&[]).to_vec();

        Ok(Self {
            lm_challenge_response,
            nt_challenge_response,
            domain_name,
            user_name,
            workstation,
            encrypted_random_session_key,
            flags,
            version,
            mic,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trip_with_version_and_mic() {
        let msg = AuthenticateMessage::new(
            vec![0u8; 24],
            vec![1u8; 24],
            "DOMAIN",
            "User",
            "WORKSTATION",
            vec![2u8; 16],
            NegotiateFlags::NEGOTIATE_UNICODE | NegotiateFlags::NEGOTIATE_VERSION,
            Some(Version::new(10, 0, 19041, 15)),
            Some([0u8; 16]),
        );
        let bytes = msg.encode();
        let decoded = AuthenticateMessage::decode(&bytes).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn encode_decode_round_trip_without_version_or_mic() {
        let msg = AuthenticateMessage::new(
            vec![0u8; 24],
            vec![1u8; 24],
            "DOMAIN",
            "User",
            "WORKSTATION",
            Vec::new(),
            NegotiateFlags::NEGOTIATE_UNICODE,
            None,
            None,
        );
        let bytes = msg.encode();
        let decoded = AuthenticateMessage::decode(&bytes).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn malformed_offset_past_end_is_rejected() {
        let msg = AuthenticateMessage::new(
            vec![0u8; 24],
            vec![1u8; 24],
            "DOMAIN",
            "User",
            "WORKSTATION",
            Vec::new(),
            NegotiateFlags::NEGOTIATE_UNICODE,
            None,
            None,
        );
        let mut bytes = msg.encode();
        // Corrupt NtChallengeResponse's offset to point past the end of the message.
        let len = bytes.len() as u32;
        bytes[24..28].copy_from_slice(&(len + 100).to_le_bytes());
        assert!(matches!(
            AuthenticateMessage::decode(&bytes),
            Err(NtlmError::MalformedMessage(_))
        ));
    }

    #[test]
    fn version_flag_without_bytes_is_ignored() {
        // A peer can set NEGOTIATE_VERSION without actually appending a Version
        // block (legacy interop); the min_offset headroom check is what tells
        // real trailing Version bytes apart from the payload starting right
        // after the fixed header.
        let msg = AuthenticateMessage::new(
            vec![0u8; 24],
            vec![1u8; 24],
            "DOMAIN",
            "User",
            "WORKSTATION",
            Vec::new(),
            NegotiateFlags::NEGOTIATE_UNICODE | NegotiateFlags::NEGOTIATE_VERSION,
            None,
            None,
        );
        let bytes = msg.encode();
        let decoded = AuthenticateMessage::decode(&bytes).unwrap();
        assert_eq!(decoded.version, None);
        assert_eq!(decoded.domain_name, "DOMAIN");
    }

    #[test]
    fn client_challenge_v2() {
        let mut nt_response = vec![0xAAu8; 16]; // NTProofStr
        nt_response.push(0x01); // RespType
        nt_response.push(0x01); // HiRespType
        nt_response.extend_from_slice(&[0u8; 6]); // reserved1 + reserved2
        nt_response.extend_from_slice(&[0u8; 8]); // timestamp
        nt_response.extend_from_slice(&[0xBBu8; 8]); // client challenge
        nt_response.extend_from_slice(&[0u8; 4]); // reserved3

        let msg = AuthenticateMessage::new(
            vec![0u8; 24],
            nt_response,
            "DOMAIN",
            "User",
            "WORKSTATION",
            Vec::new(),
            NegotiateFlags::NEGOTIATE_UNICODE,
            None,
            None,
        );
        assert_eq!(msg.client_challenge(), Some([0xBBu8; 8]));
    }
}
