//! DES framing for the legacy LM hash and the NTLMv1 response.
//!
//! MS-NLMP never hands DES a real 8-byte key: it always starts from 7 bytes and
//! expands them by inserting a parity bit every 7 bits (the inserted bit is left
//! at zero; actual odd-parity is not computed, matching the reference behavior).

use des::cipher::{BlockEncrypt, KeyInit};
use des::Des;

use crate::error::{NtlmError, NtlmResult};

/// Expand a 7-byte key into the 8-byte (56 significant bits + 1 spacer per byte) key DES expects.
fn expand_des_key(key7: &[u8; 7]) -> [u8; 8] {
    let mut out = [0u8; 8];
    out[0] = key7[0] >> 1;
    out[1] = ((key7[0] & 0x01) << 6) | (key7[1] >> 2);
    out[2] = ((key7[1] & 0x03) << 5) | (key7[2] >> 3);
    out[3] = ((key7[2] & 0x07) << 4) | (key7[3] >> 4);
    out[4] = ((key7[3] & 0x0F) << 3) | (key7[4] >> 5);
    out[5] = ((key7[4] & 0x1F) << 2) | (key7[5] >> 6);
    out[6] = ((key7[5] & 0x3F) << 1) | (key7[6] >> 7);
    out[7] = key7[6] & 0x7F;
    for b in out.iter_mut() {
        *b <<= 1;
    }
    out
}

/// Single DES-ECB block encryption, keyed from a 7-byte (56-bit) key.
pub(crate) fn des(key7: &[u8; 7], block: &[u8; 8]) -> NtlmResult<[u8; 8]> {
    let expanded = expand_des_key(key7);
    let cipher =
        Des::new_from_slice(&expanded).map_err(|_| NtlmError::crypto("invalid DES key length"))?;
    let mut out = *block;
    cipher.encrypt_block((&mut out).into());
    Ok(out)
}

/// `DESL(K, D)`: zero-pad `key16` to 21 bytes, split into three 7-byte keys, DES-encrypt
/// `data` with each, and concatenate the three 8-byte blocks into a 24-byte response.
pub(crate) fn des_long(key16: &[u8; 16], data: &[u8; 8]) -> NtlmResult<[u8; 24]> {
    let mut padded = [0u8; 21];
    padded[..16].copy_from_slice(key16);

    let k1: [u8; 7] = padded[0..7].try_into().unwrap();
    let k2: [u8; 7] = padded[7..14].try_into().unwrap();
    let k3: [u8; 7] = padded[14..21].try_into().unwrap();

    let r1 = des(&k1, data)?;
    let r2 = des(&k2, data)?;
    let r3 = des(&k3, data)?;

    let mut out = [0u8; 24];
    out[0..8].copy_from_slice(&r1);
    out[8..16].copy_from_slice(&r2);
    out[16..24].copy_from_slice(&r3);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lmowfv1_vector() {
        // MS-NLMP 4.2.2.1.2: DES("KGS!@#$%") halves of zero-padded upper("Password")
        let key7: [u8; 7] = *b"PASSWOR";
        let block: [u8; 8] = *b"KGS!@#$%";
        let out = des(&key7, &block).unwrap();
        assert_eq!(out, [0xe5, 0x2c, 0xac, 0x67, 0x41, 0x9a, 0x9a, 0x22]);
    }
}
