use std::error::Error;
use std::fmt::{Display, Formatter};

/// Failure modes surfaced across the codec, key-derivation and session layers.
///
/// The library performs no retries; a session that produces [`NtlmError::AuthenticationFailed`]
/// is terminal (see [`crate::session::SessionState::Failed`]).
#[derive(Debug)]
pub enum NtlmError {
    /// Bad signature, wrong message type, truncated buffer, or an offset/length pair
    /// that runs past the end of the message.
    MalformedMessage(SMBParseError),
    /// The computed NtChallengeResponse/LmChallengeResponse did not match what the peer sent.
    AuthenticationFailed(String),
    /// A crypto primitive failed to initialize (bad key length, etc).
    CryptoFailed(SMBCryptoError),
    /// A negotiated flag combination this implementation does not carry out.
    UnsupportedFeature(String),
}

impl NtlmError {
    pub fn malformed<T: Into<SMBParseError>>(error: T) -> Self {
        Self::MalformedMessage(error.into())
    }

    pub fn crypto<T: Into<SMBCryptoError>>(error: T) -> Self {
        Self::CryptoFailed(error.into())
    }

    pub fn authentication_failed<T: Into<String>>(reason: T) -> Self {
        Self::AuthenticationFailed(reason.into())
    }

    pub fn unsupported<T: Into<String>>(reason: T) -> Self {
        Self::UnsupportedFeature(reason.into())
    }
}

#[derive(Debug)]
pub struct SMBParseError {
    message: String,
}

impl<T: Into<String>> From<T> for SMBParseError {
    fn from(value: T) -> Self {
        Self { message: value.into() }
    }
}

impl Display for SMBParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[derive(Debug)]
pub struct SMBCryptoError {
    message: String,
}

impl<T: Into<String>> From<T> for SMBCryptoError {
    fn from(value: T) -> Self {
        Self { message: value.into() }
    }
}

impl Display for SMBCryptoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "crypto primitive failed: {}", self.message)
    }
}

impl Display for NtlmError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedMessage(x) => write!(f, "malformed NTLM message: {}", x),
            Self::AuthenticationFailed(x) => write!(f, "NTLM authentication failed: {}", x),
            Self::CryptoFailed(x) => write!(f, "{}", x),
            Self::UnsupportedFeature(x) => write!(f, "unsupported NTLM feature: {}", x),
        }
    }
}

impl Error for NtlmError {}

pub type NtlmResult<T> = Result<T, NtlmError>;

impl<I> From<nom::Err<nom::error::Error<I>>> for NtlmError {
    fn from(err: nom::Err<nom::error::Error<I>>) -> Self {
        match err {
            nom::Err::Incomplete(_) => NtlmError::malformed("truncated message"),
            nom::Err::Error(e) | nom::Err::Failure(e) => {
                NtlmError::malformed(format!("parse failure: {:?}", e.code))
            }
        }
    }
}
