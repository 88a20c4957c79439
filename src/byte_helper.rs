//! Little-endian integer pack/unpack, zero-padding and UTF-16LE <-> text helpers.
//!
//! Everything here is a pure function of its input; none of it can fail, matching
//! the rest of the codec layer (boundary errors are caught one layer up, where the
//! slice comes from an offset the caller does not control).

use rand::rngs::OsRng;
use rand::RngCore;

pub(crate) fn u16_to_bytes(num: u16) -> [u8; 2] {
    num.to_le_bytes()
}

pub(crate) fn bytes_to_u16(bytes: &[u8]) -> u16 {
    u16::from_le_bytes([bytes[0], bytes[1]])
}

pub(crate) fn u32_to_bytes(num: u32) -> [u8; 4] {
    num.to_le_bytes()
}

pub(crate) fn bytes_to_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

pub(crate) fn u64_to_bytes(num: u64) -> [u8; 8] {
    num.to_le_bytes()
}

pub(crate) fn bytes_to_u64(bytes: &[u8]) -> u64 {
    u64::from_le_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ])
}

/// Zero-initialized buffer of the given length.
pub(crate) fn zero_bytes(length: usize) -> Vec<u8> {
    vec![0; length]
}

/// Zero pad (or truncate) `bytes` starting at `offset` into a buffer of exactly `size`.
pub(crate) fn zero_padded_bytes(bytes: &[u8], offset: usize, size: usize) -> Vec<u8> {
    let mut out = zero_bytes(size);
    for i in 0..size {
        if offset + i >= bytes.len() {
            break;
        }
        out[i] = bytes[offset + i];
    }
    out
}

/// Encode `s` as UTF-16LE, preserving surrogate pairs.
pub(crate) fn utf16le_from_str(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(|unit| u16_to_bytes(unit)).collect()
}

/// Decode a UTF-16LE buffer. Malformed/odd-length input is handled best-effort:
/// a trailing single byte is dropped and unpaired/invalid surrogates become U+FFFD.
pub(crate) fn utf16le_to_string(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|chunk| bytes_to_u16(chunk))
        .collect();
    String::from_utf16_lossy(&units)
}

/// ASCII upper-case, matching MS-NLMP's `UpperCase` used for the NTLMv1 LM hash.
pub(crate) fn ascii_upper(s: &str) -> String {
    s.to_ascii_uppercase()
}

pub(crate) fn random_bytes(length: usize) -> Vec<u8> {
    let mut buf = vec![0u8; length];
    OsRng.fill_bytes(&mut buf);
    buf
}

pub(crate) fn random_array8() -> [u8; 8] {
    let mut buf = [0u8; 8];
    OsRng.fill_bytes(&mut buf);
    buf
}

pub(crate) fn random_array16() -> [u8; 16] {
    let mut buf = [0u8; 16];
    OsRng.fill_bytes(&mut buf);
    buf
}

/// Current time as a Windows FILETIME: 100-ns ticks since 1601-01-01 UTC, little-endian.
pub(crate) fn windows_filetime_now() -> [u8; 8] {
    const EPOCH_DIFF_SECONDS: u64 = 11_644_473_600;
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    let ticks = (now.as_secs() + EPOCH_DIFF_SECONDS) * 10_000_000 + u64::from(now.subsec_nanos()) / 100;
    u64_to_bytes(ticks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_u16_u32() {
        assert_eq!(bytes_to_u16(&u16_to_bytes(0xBEEF)), 0xBEEF);
        assert_eq!(bytes_to_u32(&u32_to_bytes(0xDEAD_BEEF)), 0xDEAD_BEEF);
    }

    #[test]
    fn utf16_round_trip() {
        let s = "Password";
        assert_eq!(utf16le_to_string(&utf16le_from_str(s)), s);
    }

    #[test]
    fn utf16_tolerates_odd_length() {
        let mut bytes = utf16le_from_str("hi");
        bytes.push(0x41); // dangling byte
        assert_eq!(utf16le_to_string(&bytes), "hi");
    }

    #[test]
    fn zero_padded_truncates_and_pads() {
        assert_eq!(zero_padded_bytes(b"ABCDEFGH", 0, 4), b"ABCD");
        assert_eq!(zero_padded_bytes(b"AB", 0, 4), vec![b'A', b'B', 0, 0]);
    }
}
