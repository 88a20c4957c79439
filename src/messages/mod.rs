//! C6: encode/decode for the three NTLM handshake messages (MS-NLMP 2.2.1).
//!
//! All three share a signature, a 4-byte message type, a fixed header of
//! [`crate::payload::PayloadField`] triplets and plain fields, an optional trailing
//! [`crate::version::Version`], and a payload region addressed by those triplets.

mod authenticate;
mod challenge;
mod negotiate;

pub use authenticate::AuthenticateMessage;
pub use challenge::ChallengeMessage;
pub use negotiate::NegotiateMessage;

pub(crate) const SIGNATURE: &[u8; 8] = b"NTLMSSP\0";

pub(crate) const MESSAGE_TYPE_NEGOTIATE: u32 = 1;
pub(crate) const MESSAGE_TYPE_CHALLENGE: u32 = 2;
pub(crate) const MESSAGE_TYPE_AUTHENTICATE: u32 = 3;

pub(crate) fn check_signature_and_type(bytes: &[u8], expected_type: u32) -> crate::error::NtlmResult<u32> {
    use crate::byte_helper::bytes_to_u32;
    use crate::error::NtlmError;
    use crate::logging::{trace, warn};

    if bytes.len() < 12 {
        warn!(len = bytes.len(), "message shorter than fixed header");
        return Err(NtlmError::malformed("message shorter than fixed header"));
    }
    if &bytes[0..8] != SIGNATURE {
        warn!("bad NTLMSSP signature");
        return Err(NtlmError::malformed("bad NTLMSSP signature"));
    }
    let message_type = bytes_to_u32(&bytes[8..12]);
    if message_type != expected_type {
        warn!(expected_type, message_type, "unexpected NTLM message type");
        return Err(NtlmError::malformed(format!(
            "expected message type {}, found {}",
            expected_type, message_type
        )));
    }
    trace!(message_type, len = bytes.len(), "parsed NTLM message header");
    Ok(message_type)
}
