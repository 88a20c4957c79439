//! C8: the key-derivation kernel. Every function here is a pure function of its
//! inputs — no session state, no I/O — so the state machines in [`crate::session`]
//! can sequence them as a pipeline of total functions (see MS-NLMP 3.3/3.4).

use crate::byte_helper::{ascii_upper, utf16le_from_str, zero_padded_bytes};
use crate::crypto::{des, des_long, hmac_md5, md4, md5, rc4_k};
use crate::error::NtlmResult;
use crate::flags::NegotiateFlags;

/// `NTOWFv1(Passwd) = MD4(UNICODE(Passwd))`
pub(crate) fn ntowfv1(password: &str) -> [u8; 16] {
    md4(&utf16le_from_str(password))
}

/// `LMOWFv1(Passwd) = DES(UpperCase(Passwd)[0..6], "KGS!@#$%") || DES(UpperCase(Passwd)[7..13], "KGS!@#$%")`
pub(crate) fn lmowfv1(password: &str) -> NtlmResult<[u8; 16]> {
    const MAGIC: &[u8; 8] = b"KGS!@#$%";
    let upper = ascii_upper(password);
    let padded = zero_padded_bytes(upper.as_bytes(), 0, 14);

    let k1: [u8; 7] = padded[0..7].try_into().unwrap();
    let k2: [u8; 7] = padded[7..14].try_into().unwrap();

    let first = des(&k1, MAGIC)?;
    let second = des(&k2, MAGIC)?;

    let mut out = [0u8; 16];
    out[0..8].copy_from_slice(&first);
    out[8..16].copy_from_slice(&second);
    Ok(out)
}

/// `NTOWFv2(Passwd, User, UserDom) = HMAC_MD5(MD4(UNICODE(Passwd)), UNICODE(UPPER(User) || UserDom))`
///
/// Note `UserDom` is NOT uppercased — only the user name is.
pub(crate) fn ntowfv2(user: &str, password: &str, domain: &str) -> NtlmResult<[u8; 16]> {
    let password_hash = md4(&utf16le_from_str(password));
    let text = format!("{}{}", user.to_uppercase(), domain);
    hmac_md5(&password_hash, &utf16le_from_str(&text))
}

/// `LMOWFv2 = NTOWFv2` (MS-NLMP 3.3.2).
pub(crate) fn lmowfv2(user: &str, password: &str, domain: &str) -> NtlmResult<[u8; 16]> {
    ntowfv2(user, password, domain)
}

pub(crate) struct V1Responses {
    pub nt_challenge_response: Vec<u8>,
    pub lm_challenge_response: Vec<u8>,
}

/// NTLMv1 response computation, with or without extended session security
/// (MS-NLMP 3.3.1).
pub(crate) fn compute_v1_responses(
    flags: NegotiateFlags,
    response_key_nt: &[u8; 16],
    response_key_lm: &[u8; 16],
    server_challenge: &[u8; 8],
    client_challenge: &[u8; 8],
) -> NtlmResult<V1Responses> {
    if flags.is_set(NegotiateFlags::NEGOTIATE_EXTENDED_SESSIONSECURITY) {
        let mut hashed = [0u8; 8];
        let digest = md5(&[&server_challenge[..], &client_challenge[..]].concat());
        hashed.copy_from_slice(&digest[0..8]);

        let nt_challenge_response = des_long(response_key_nt, &hashed)?.to_vec();
        let lm_challenge_response = [client_challenge.as_slice(), &[0u8; 16]].concat();

        Ok(V1Responses {
            nt_challenge_response,
            lm_challenge_response,
        })
    } else {
        let nt_challenge_response = des_long(response_key_nt, server_challenge)?.to_vec();
        let lm_challenge_response = des_long(response_key_lm, server_challenge)?.to_vec();

        Ok(V1Responses {
            nt_challenge_response,
            lm_challenge_response,
        })
    }
}

pub(crate) struct V2Responses {
    pub nt_challenge_response: Vec<u8>,
    pub lm_challenge_response: Vec<u8>,
    pub nt_proof_str: [u8; 16],
}

/// NTLMv2 response computation (MS-NLMP 3.3.2): builds the `temp` client-challenge
/// structure, then NTProofStr / NtChallengeResponse / LmChallengeResponse from it.
pub(crate) fn compute_v2_responses(
    response_key_nt: &[u8; 16],
    response_key_lm: &[u8; 16],
    server_challenge: &[u8; 8],
    client_challenge: &[u8; 8],
    timestamp: &[u8; 8],
    av_pairs_bytes: &[u8],
) -> NtlmResult<V2Responses> {
    let temp = build_temp(client_challenge, timestamp, av_pairs_bytes);

    let mut proof_input = Vec::with_capacity(8 + temp.len());
    proof_input.extend_from_slice(server_challenge);
    proof_input.extend_from_slice(&temp);
    let nt_proof_str = hmac_md5(response_key_nt, &proof_input)?;

    let mut nt_challenge_response = nt_proof_str.to_vec();
    nt_challenge_response.extend_from_slice(&temp);

    let mut lm_input = Vec::with_capacity(16);
    lm_input.extend_from_slice(server_challenge);
    lm_input.extend_from_slice(client_challenge);
    let lm_hmac = hmac_md5(response_key_lm, &lm_input)?;
    let lm_challenge_response = [lm_hmac.as_slice(), client_challenge.as_slice()].concat();

    Ok(V2Responses {
        nt_challenge_response,
        lm_challenge_response,
        nt_proof_str,
    })
}

/// `temp = RespType(1) || HiRespType(1) || 0x00000000 || Time(8) || ClientChallenge(8) || 0x00000000 || AvPairs || 0x00000000`
fn build_temp(client_challenge: &[u8; 8], timestamp: &[u8; 8], av_pairs_bytes: &[u8]) -> Vec<u8> {
    let mut temp = Vec::with_capacity(28 + av_pairs_bytes.len());
    temp.push(0x01); // RespType
    temp.push(0x01); // HiRespType
    temp.extend_from_slice(&[0u8; 6]); // Reserved1 (u16) + Reserved2 (u32)
    temp.extend_from_slice(timestamp);
    temp.extend_from_slice(client_challenge);
    temp.extend_from_slice(&[0u8; 4]); // Reserved3
    temp.extend_from_slice(av_pairs_bytes);
    temp.extend_from_slice(&[0u8; 4]); // Reserved4
    temp
}

/// `SessionBaseKey` for NTLMv1: `MD4(ResponseKeyNT)`.
pub(crate) fn session_base_key_v1(response_key_nt: &[u8; 16]) -> [u8; 16] {
    md4(response_key_nt)
}

/// `SessionBaseKey` for NTLMv2: `HMAC_MD5(ResponseKeyNT, NTProofStr)`.
pub(crate) fn session_base_key_v2(response_key_nt: &[u8; 16], nt_proof_str: &[u8; 16]) -> NtlmResult<[u8; 16]> {
    hmac_md5(response_key_nt, nt_proof_str)
}

/// `KXKEY` (MS-NLMP 3.4.5.2), used only for NTLMv1 without extended session security.
/// With extended session security or for v2, the caller derives the key-exchange-key
/// directly and never reaches this function.
pub(crate) fn kxkey_v1(
    flags: NegotiateFlags,
    session_base_key: &[u8; 16],
    lm_challenge_response: &[u8],
    response_key_lm: &[u8; 16],
) -> NtlmResult<[u8; 16]> {
    if flags.is_set(NegotiateFlags::NEGOTIATE_LM_KEY) {
        let mut block = [0u8; 8];
        block.copy_from_slice(&lm_challenge_response[0..8]);

        let k1: [u8; 7] = response_key_lm[0..7].try_into().unwrap();
        let mut k2 = [0xBDu8; 7];
        k2[0] = response_key_lm[7];

        let first = des(&k1, &block)?;
        let second = des(&k2, &block)?;
        let mut out = [0u8; 16];
        out[0..8].copy_from_slice(&first);
        out[8..16].copy_from_slice(&second);
        Ok(out)
    } else if flags.is_set(NegotiateFlags::REQUEST_NON_NT_SESSION_KEY) {
        let mut out = [0u8; 16];
        out[0..8].copy_from_slice(&response_key_lm[0..8]);
        Ok(out)
    } else {
        let _ = lm_challenge_response;
        Ok(*session_base_key)
    }
}

/// `KXKEY` for NTLMv1 with extended session security:
/// `HMAC_MD5(SessionBaseKey, ServerChallenge || LmChallengeResponse[0..8])`.
pub(crate) fn kxkey_v1_extended(
    session_base_key: &[u8; 16],
    server_challenge: &[u8; 8],
    lm_challenge_response: &[u8],
) -> NtlmResult<[u8; 16]> {
    let mut input = Vec::with_capacity(16);
    input.extend_from_slice(server_challenge);
    input.extend_from_slice(&lm_challenge_response[0..8]);
    hmac_md5(session_base_key, &input)
}

/// Server side of `exportedSessionKey`: decrypt the client's encrypted random session key.
pub(crate) fn exported_session_key_server(
    flags: NegotiateFlags,
    key_exchange_key: &[u8; 16],
    encrypted_random_session_key: &[u8],
) -> [u8; 16] {
    if flags.is_set(NegotiateFlags::NEGOTIATE_KEY_EXCH) {
        let decrypted = rc4_k(key_exchange_key, encrypted_random_session_key);
        let mut out = [0u8; 16];
        out.copy_from_slice(&decrypted[0..16]);
        out
    } else {
        *key_exchange_key
    }
}

/// Client side: either encrypt a freshly drawn random session key under the
/// key-exchange-key, or (no key exchange) use the key-exchange-key directly as
/// both the exported session key and its own "encrypted" form.
pub(crate) fn exported_session_key_client(
    flags: NegotiateFlags,
    key_exchange_key: &[u8; 16],
    random_session_key: &[u8; 16],
) -> (Vec<u8>, [u8; 16]) {
    if flags.is_set(NegotiateFlags::NEGOTIATE_KEY_EXCH) {
        let encrypted = rc4_k(key_exchange_key, random_session_key);
        (encrypted, *random_session_key)
    } else {
        (key_exchange_key.to_vec(), *key_exchange_key)
    }
}

const SIGN_MAGIC_CLIENT: &[u8] = b"session key to client-to-server signing key magic constant\0";
const SIGN_MAGIC_SERVER: &[u8] = b"session key to server-to-client signing key magic constant\0";
const SEAL_MAGIC_CLIENT: &[u8] = b"session key to client-to-server sealing key magic constant\0";
const SEAL_MAGIC_SERVER: &[u8] = b"session key to server-to-client sealing key magic constant\0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Party {
    Client,
    Server,
}

/// `SIGNKEY(NegFlg, RandomSessionKey, "Client"/"Server")`, defined only when extended
/// session security is negotiated.
pub(crate) fn sign_key(flags: NegotiateFlags, key: &[u8; 16], party: Party) -> Option<[u8; 16]> {
    if !flags.is_set(NegotiateFlags::NEGOTIATE_EXTENDED_SESSIONSECURITY) {
        return None;
    }
    let magic = match party {
        Party::Client => SIGN_MAGIC_CLIENT,
        Party::Server => SIGN_MAGIC_SERVER,
    };
    let mut input = key.to_vec();
    input.extend_from_slice(magic);
    Some(md5(&input))
}

/// `SEALKEY(NegFlg, RandomSessionKey, "Client"/"Server")`. With extended session
/// security the key is truncated to 16/7/5 bytes depending on `NEGOTIATE_128`/`NEGOTIATE_56`
/// before being folded into the magic constant; without it, a legacy LM-style truncation
/// is used directly as the sealing key (MS-NLMP 3.4.5.3).
pub(crate) fn seal_key(flags: NegotiateFlags, key: &[u8; 16], party: Party) -> Option<[u8; 16]> {
    if flags.is_set(NegotiateFlags::NEGOTIATE_EXTENDED_SESSIONSECURITY) {
        let trunc_len = if flags.is_set(NegotiateFlags::NEGOTIATE_128) {
            16
        } else if flags.is_set(NegotiateFlags::NEGOTIATE_56) {
            7
        } else {
            5
        };
        let magic = match party {
            Party::Client => SEAL_MAGIC_CLIENT,
            Party::Server => SEAL_MAGIC_SERVER,
        };
        let mut input = key[0..trunc_len].to_vec();
        input.extend_from_slice(magic);
        Some(md5(&input))
    } else if flags.is_set(NegotiateFlags::NEGOTIATE_LM_KEY) {
        // MS-NLMP 3.4.5.3: an 8-byte (56- or 40-bit) RC4 key, not the usual 16.
        // `calculate_keys` rejects this combination with `UnsupportedFeature` rather
        // than silently truncating the RC4 keystream width everywhere else assumes.
        let mut out = [0u8; 16];
        if flags.is_set(NegotiateFlags::NEGOTIATE_56) {
            out[0..7].copy_from_slice(&key[0..7]);
            out[7] = 0xA0;
        } else {
            out[0..5].copy_from_slice(&key[0..5]);
            out[5] = 0xE5;
            out[6] = 0x38;
            out[7] = 0xB0;
        }
        Some(out)
    } else {
        Some(*key)
    }
}

const CRC32_POLY: u32 = 0xEDB8_8320;

/// Minimal CRC-32 (ISO-HDLC) implementation for the legacy (non-extended-session-security)
/// MAC signature, which has no other consumer in this crate.
fn crc32(data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (CRC32_POLY & mask);
        }
    }
    !crc
}

/// `MAC(Handle, SigningKey, SeqNum, Message)` (MS-NLMP 3.4.4). With extended session
/// security, the 8-byte checksum is `HMAC_MD5(SigningKey, SeqNum || Message)[0..8]`,
/// sealed through `seal_handle` only when key exchange was negotiated. Without it,
/// the legacy form carries a random pad and a sealed CRC32 of the message.
pub(crate) fn mac(
    flags: NegotiateFlags,
    seal_handle: &mut crate::crypto::Rc4Handle,
    signing_key: &[u8; 16],
    seq_num: u32,
    message: &[u8],
) -> NtlmResult<[u8; 16]> {
    use crate::byte_helper::u32_to_bytes;
    use crate::crypto::rc4;

    let mut sig = [0u8; 16];
    sig[0..4].copy_from_slice(&1u32.to_le_bytes());

    if flags.is_set(NegotiateFlags::NEGOTIATE_EXTENDED_SESSIONSECURITY) {
        let mut input = Vec::with_capacity(4 + message.len());
        input.extend_from_slice(&u32_to_bytes(seq_num));
        input.extend_from_slice(message);
        let digest = hmac_md5(signing_key, &input)?;
        let checksum = if flags.is_set(NegotiateFlags::NEGOTIATE_KEY_EXCH) {
            rc4(seal_handle, &digest[0..8])
        } else {
            digest[0..8].to_vec()
        };
        sig[4..12].copy_from_slice(&checksum);
        sig[12..16].copy_from_slice(&u32_to_bytes(seq_num));
    } else {
        let pad = crate::byte_helper::random_array8();
        let checksum = crc32(message).to_le_bytes();
        let sealed = if flags.is_set(NegotiateFlags::NEGOTIATE_KEY_EXCH) {
            rc4(seal_handle, &[&pad[0..4], &checksum[..]].concat())
        } else {
            [&pad[0..4], &checksum[..]].concat()
        };
        sig[4..8].copy_from_slice(&sealed[0..4]);
        sig[8..12].copy_from_slice(&sealed[4..8]);
        sig[12..16].copy_from_slice(&u32_to_bytes(seq_num));
    }

    Ok(sig)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ntowfv1_vector() {
        assert_eq!(
            ntowfv1("Password"),
            [
                0xa4, 0xf4, 0x9c, 0x40, 0x65, 0x10, 0xbd, 0xca, 0xb6, 0x82, 0x4e, 0xe7, 0xc3, 0x0f,
                0xd8, 0x52
            ]
        );
    }

    #[test]
    fn lmowfv1_vector() {
        assert_eq!(
            lmowfv1("Password").unwrap(),
            [
                0xe5, 0x2c, 0xac, 0x67, 0x41, 0x9a, 0x9a, 0x22, 0x4a, 0x3b, 0x10, 0x8f, 0x3f, 0xa6,
                0xcb, 0x6d
            ]
        );
    }

    #[test]
    fn ntowfv2_vector() {
        assert_eq!(
            ntowfv2("User", "Password", "Domain").unwrap(),
            [
                0x0c, 0x86, 0x8a, 0x40, 0x3b, 0xfd, 0x7a, 0x93, 0xa3, 0x00, 0x1e, 0xf2, 0x2e, 0xf0,
                0x2e, 0x3f
            ]
        );
    }

    #[test]
    fn v2_ntproof_str_vector() {
        // MS-NLMP 4.2.4: TargetInfo = MsvAvNbDomainName("Domain") + MsvAvNbComputerName("Server") + EOL,
        // Time = all-zero FILETIME, ClientChallenge = aa*8.
        let mut av_pairs = crate::av_pair::AvPairs::new();
        av_pairs.push(crate::av_pair::AvPair::string(crate::av_pair::MSV_AV_NB_DOMAIN_NAME, "Domain"));
        av_pairs.push(crate::av_pair::AvPair::string(crate::av_pair::MSV_AV_NB_COMPUTER_NAME, "Server"));
        av_pairs.push(crate::av_pair::AvPair::eol());

        let response_key_nt = ntowfv2("User", "Password", "Domain").unwrap();
        let server_challenge: [u8; 8] = [0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef];
        let client_challenge = [0xaau8; 8];
        let timestamp = [0u8; 8];

        let responses = compute_v2_responses(
            &response_key_nt,
            &response_key_nt,
            &server_challenge,
            &client_challenge,
            &timestamp,
            &av_pairs.as_bytes(),
        )
        .unwrap();

        assert_eq!(
            responses.nt_proof_str,
            [
                0x68, 0xcd, 0x0a, 0xb8, 0x51, 0xe5, 0x1c, 0x96, 0xaa, 0xbc, 0x92, 0x7b, 0xeb, 0xef,
                0x6a, 0x1c
            ]
        );
    }

    #[test]
    fn v1_response_without_ess_vector() {
        let response_key_nt = ntowfv1("Password");
        let response_key_lm = lmowfv1("Password").unwrap();
        let server_challenge: [u8; 8] = [0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef];
        let client_challenge = [0u8; 8];

        let responses = compute_v1_responses(
            NegotiateFlags::empty(),
            &response_key_nt,
            &response_key_lm,
            &server_challenge,
            &client_challenge,
        )
        .unwrap();

        assert_eq!(
            responses.nt_challenge_response,
            vec![
                0x67, 0xc4, 0x30, 0x11, 0xf3, 0x02, 0x98, 0xa2, 0xad, 0x35, 0xec, 0xe6, 0x4f, 0x16,
                0x33, 0x1c, 0x44, 0xbd, 0xbe, 0xd9, 0x27, 0x84, 0x1f, 0x94
            ]
        );
    }
}
