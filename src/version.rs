//! C5: the 8-byte VERSION structure (MS-NLMP 2.2.2.10). Cosmetic, but part of the
//! signed byte stream whenever `NEGOTIATE_VERSION` is set.

use serde::{Deserialize, Serialize};

use crate::byte_helper::{bytes_to_u16, u16_to_bytes};
use crate::error::{NtlmError, NtlmResult};

pub const VERSION_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct Version {
    pub major_version: u8,
    pub minor_version: u8,
    pub build: u16,
    pub ntlm_revision_current: u8,
}

impl Version {
    pub fn new(major_version: u8, minor_version: u8, build: u16, ntlm_revision_current: u8) -> Self {
        Self {
            major_version,
            minor_version,
            build,
            ntlm_revision_current,
        }
    }

    pub fn parse(bytes: &[u8]) -> NtlmResult<Self> {
        if bytes.len() < VERSION_SIZE {
            return Err(NtlmError::malformed("version structure truncated"));
        }
        Ok(Self {
            major_version: bytes[0],
            minor_version: bytes[1],
            build: bytes_to_u16(&bytes[2..4]),
            ntlm_revision_current: bytes[7],
        })
    }

    pub fn as_bytes(&self) -> [u8; VERSION_SIZE] {
        let mut out = [0u8; VERSION_SIZE];
        out[0] = self.major_version;
        out[1] = self.minor_version;
        out[2..4].copy_from_slice(&u16_to_bytes(self.build));
        // out[4..7] reserved, left zero
        out[7] = self.ntlm_revision_current;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let v = Version::new(5, 1, 2600, 15);
        let bytes = v.as_bytes();
        assert_eq!(Version::parse(&bytes).unwrap(), v);
    }
}
