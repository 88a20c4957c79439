//! Thin wrappers over the hash/stream-cipher crates, framed the way MS-NLMP calls them.

use digest::Digest;
use hmac::{Hmac, Mac};
use md4::Md4;
use md5::Md5;
use rc4::consts::U16;
use rc4::{Key, Rc4, StreamCipher};

use crate::byte_helper::u32_to_bytes;
use crate::error::{NtlmError, NtlmResult};

pub(crate) fn md4(data: &[u8]) -> [u8; 16] {
    Md4::digest(data).into()
}

pub(crate) fn md5(data: &[u8]) -> [u8; 16] {
    Md5::digest(data).into()
}

pub(crate) fn hmac_md5(key: &[u8], data: &[u8]) -> NtlmResult<[u8; 16]> {
    let mut mac = <Hmac<Md5>>::new_from_slice(key)
        .map_err(|_| NtlmError::crypto("invalid HMAC-MD5 key length"))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().into())
}

/// A live RC4 keystream, advanced in place by successive [`rc4`] calls.
pub(crate) struct Rc4Handle(Rc4);

/// `RC4INIT(Handle, K)`: build a keystream state from a 16-byte key.
pub(crate) fn rc4_init(key16: &[u8; 16]) -> Rc4Handle {
    Rc4Handle(Rc4::new(Key::<U16>::from_slice(key16)))
}

/// `RC4(Handle, D)`: advance the handle's keystream over `data`, in place.
pub(crate) fn rc4(handle: &mut Rc4Handle, data: &[u8]) -> Vec<u8> {
    let mut out = data.to_vec();
    handle.0.apply_keystream(&mut out);
    out
}

/// `RC4K(K, D)`: stateless convenience — fresh keystream, xor, discard.
pub(crate) fn rc4_k(key16: &[u8; 16], data: &[u8]) -> Vec<u8> {
    let mut handle = rc4_init(key16);
    rc4(&mut handle, data)
}

/// Re-key the sealing handle for datagram-mode sequence number rollover:
/// `MD5(SealingKey || SeqNum)`. Datagram mode itself is not modeled by
/// [`crate::session`] (connection-oriented only); kept for callers driving the
/// handshake over a datagram transport themselves.
#[allow(dead_code)]
pub(crate) fn reinit_sealing_key(sealing_key: &[u8; 16], seq_num: u32) -> Rc4Handle {
    let mut buf = sealing_key.to_vec();
    buf.extend_from_slice(&u32_to_bytes(seq_num));
    rc4_init(&md5(&buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ntowfv1_vector() {
        use crate::byte_helper::utf16le_from_str;
        let digest = md4(&utf16le_from_str("Password"));
        assert_eq!(
            digest,
            [
                0xa4, 0xf4, 0x9c, 0x40, 0x65, 0x10, 0xbd, 0xca, 0xb6, 0x82, 0x4e, 0xe7, 0xc3, 0x0f,
                0xd8, 0x52
            ]
        );
    }

    #[test]
    fn rc4_round_trips() {
        let key = [0x11u8; 16];
        let mut enc = rc4_init(&key);
        let cipher = rc4(&mut enc, b"hello world");
        let mut dec = rc4_init(&key);
        let plain = rc4(&mut dec, &cipher);
        assert_eq!(plain, b"hello world");
    }
}
