//! MS-NLMP NTLMv1/NTLMv2 authentication core.
//!
//! This crate implements the message codecs, key-derivation kernel, and client/server
//! session state machines needed to carry out the three-message NTLM handshake
//! (Negotiate → Challenge → Authenticate) and derive the keys used to sign, seal,
//! and MAC subsequent traffic. Transport, credential storage, and GSS-API wrapping
//! are left to callers.

mod av_pair;
mod byte_helper;
mod crypto;
mod derive;
mod error;
mod flags;
pub mod logging;
pub mod messages;
pub mod payload;
pub mod session;
mod version;

pub use av_pair::{AvPair, AvPairs};
pub use error::{NtlmError, NtlmResult, SMBCryptoError, SMBParseError};
pub use flags::NegotiateFlags;
pub use messages::{AuthenticateMessage, ChallengeMessage, NegotiateMessage};
pub use payload::PayloadField;
pub use session::{NtlmMode, Role, Session, SessionState};
pub use version::Version;
