//! C7: the 32-bit NEGOTIATE_FLAGS word, with named bit constants per MS-NLMP 2.2.2.5.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
    pub struct NegotiateFlags: u32 {
        const NEGOTIATE_UNICODE                      = 0x0000_0001;
        const NEGOTIATE_OEM                          = 0x0000_0002;
        const REQUEST_TARGET                         = 0x0000_0004;
        const NEGOTIATE_SIGN                         = 0x0000_0010;
        const NEGOTIATE_SEAL                         = 0x0000_0020;
        const NEGOTIATE_DATAGRAM                     = 0x0000_0040;
        const NEGOTIATE_LM_KEY                       = 0x0000_0080;
        const NEGOTIATE_NTLM                         = 0x0000_0200;
        const NEGOTIATE_ANONYMOUS                    = 0x0000_0800;
        const NEGOTIATE_OEM_DOMAIN_SUPPLIED          = 0x0000_1000;
        const NEGOTIATE_OEM_WORKSTATION_SUPPLIED     = 0x0000_2000;
        const NEGOTIATE_ALWAYS_SIGN                  = 0x0000_8000;
        const TARGET_TYPE_DOMAIN                     = 0x0001_0000;
        const TARGET_TYPE_SERVER                     = 0x0002_0000;
        const NEGOTIATE_EXTENDED_SESSIONSECURITY     = 0x0008_0000;
        const NEGOTIATE_IDENTIFY                     = 0x0010_0000;
        const REQUEST_NON_NT_SESSION_KEY             = 0x0040_0000;
        const NEGOTIATE_TARGET_INFO                  = 0x0080_0000;
        const NEGOTIATE_VERSION                      = 0x0200_0000;
        const NEGOTIATE_128                          = 0x2000_0000;
        const NEGOTIATE_KEY_EXCH                     = 0x4000_0000;
        const NEGOTIATE_56                           = 0x8000_0000;
    }
}

impl NegotiateFlags {
    /// Flag algebra: set a bit and return the updated word.
    pub fn set(self, flag: NegotiateFlags) -> Self {
        self | flag
    }

    /// Flag algebra: clear a bit and return the updated word.
    pub fn clear(self, flag: NegotiateFlags) -> Self {
        self & !flag
    }

    /// Flag algebra: test whether a bit is set.
    pub fn is_set(self, flag: NegotiateFlags) -> bool {
        self.contains(flag)
    }

    /// The flag set a client offers on `GenerateAuthenticateMessage` / `ProcessChallengeMessage`,
    /// shared by the v1 and v2 client sessions (see original `ProcessChallengeMessage`).
    pub(crate) fn client_default() -> Self {
        NegotiateFlags::NEGOTIATE_KEY_EXCH
            | NegotiateFlags::NEGOTIATE_VERSION
            | NegotiateFlags::NEGOTIATE_EXTENDED_SESSIONSECURITY
            | NegotiateFlags::NEGOTIATE_TARGET_INFO
            | NegotiateFlags::NEGOTIATE_IDENTIFY
            | NegotiateFlags::NEGOTIATE_ALWAYS_SIGN
            | NegotiateFlags::NEGOTIATE_NTLM
            | NegotiateFlags::NEGOTIATE_DATAGRAM
            | NegotiateFlags::NEGOTIATE_SIGN
            | NegotiateFlags::REQUEST_TARGET
            | NegotiateFlags::NEGOTIATE_UNICODE
    }

    /// The flag set a server offers in `GenerateChallengeMessage`; same as the client
    /// default plus `NEGOTIATE_128` (per the v2 reference session).
    pub(crate) fn server_default() -> Self {
        Self::client_default() | NegotiateFlags::NEGOTIATE_128
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_clear_is_set_round_trip() {
        let flags = NegotiateFlags::empty().set(NegotiateFlags::NEGOTIATE_SIGN);
        assert!(flags.is_set(NegotiateFlags::NEGOTIATE_SIGN));
        let cleared = flags.clear(NegotiateFlags::NEGOTIATE_SIGN);
        assert!(!cleared.is_set(NegotiateFlags::NEGOTIATE_SIGN));
    }
}
