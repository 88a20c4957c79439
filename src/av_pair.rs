//! C4: the ordered AV_PAIR list carried in `TargetInfo` / `NTLMv2_CLIENT_CHALLENGE`
//! (MS-NLMP 2.2.2.1). Modeled as a raw `(avId, value)` sequence, addressable by id.

use nom::bytes::complete::take;
use nom::number::complete::le_u16;
use nom::IResult;
use serde::{Deserialize, Serialize};

use crate::byte_helper::{u16_to_bytes, u32_to_bytes, utf16le_from_str};

pub const MSV_AV_EOL: u16 = 0;
pub const MSV_AV_NB_COMPUTER_NAME: u16 = 1;
pub const MSV_AV_NB_DOMAIN_NAME: u16 = 2;
pub const MSV_AV_DNS_COMPUTER_NAME: u16 = 3;
pub const MSV_AV_DNS_DOMAIN_NAME: u16 = 4;
pub const MSV_AV_DNS_TREE_NAME: u16 = 5;
pub const MSV_AV_FLAGS: u16 = 6;
pub const MSV_AV_TIMESTAMP: u16 = 7;
pub const MSV_AV_SINGLE_HOST: u16 = 8;
pub const MSV_AV_TARGET_NAME: u16 = 9;
pub const MSV_AV_CHANNEL_BINDINGS: u16 = 10;

/// `MsvAvFlags` carried inside an `MsvAvFlags` AV-pair's 4-byte value.
pub const MSV_AV_FLAGS_MIC: u32 = 0x0000_0002;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AvPair {
    pub av_id: u16,
    pub value: Vec<u8>,
}

impl AvPair {
    pub fn new(av_id: u16, value: Vec<u8>) -> Self {
        Self { av_id, value }
    }

    pub fn eol() -> Self {
        Self {
            av_id: MSV_AV_EOL,
            value: Vec::new(),
        }
    }

    pub fn string(av_id: u16, value: &str) -> Self {
        Self {
            av_id,
            value: utf16le_from_str(value),
        }
    }

    pub fn flags(value: u32) -> Self {
        Self {
            av_id: MSV_AV_FLAGS,
            value: u32_to_bytes(value).to_vec(),
        }
    }

    pub fn timestamp(filetime: &[u8; 8]) -> Self {
        Self {
            av_id: MSV_AV_TIMESTAMP,
            value: filetime.to_vec(),
        }
    }

    fn parse_one(bytes: &[u8]) -> IResult<&[u8], Self> {
        let (rest, av_id) = le_u16(bytes)?;
        let (rest, av_len) = le_u16(rest)?;
        let (rest, value) = take(av_len as usize)(rest)?;
        Ok((
            rest,
            Self {
                av_id,
                value: value.to_vec(),
            },
        ))
    }

    fn as_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.value.len());
        out.extend_from_slice(&u16_to_bytes(self.av_id));
        out.extend_from_slice(&u16_to_bytes(self.value.len() as u16));
        out.extend_from_slice(&self.value);
        out
    }
}

/// An ordered AvPair sequence. Invariant: at most one `MsvAvEOL`, and it is last.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct AvPairs(pub Vec<AvPair>);

impl AvPairs {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, pair: AvPair) {
        self.0.push(pair);
    }

    /// First value matching `av_id`, if present.
    pub fn get(&self, av_id: u16) -> Option<&[u8]> {
        self.0.iter().find(|p| p.av_id == av_id).map(|p| p.value.as_slice())
    }

    /// Decode repeatedly until the EOL pair (avId=0, avLen=0), which is retained
    /// as the final element.
    pub fn parse(bytes: &[u8]) -> IResult<&[u8], Self> {
        let mut remaining = bytes;
        let mut pairs = Vec::new();
        loop {
            let (rest, pair) = AvPair::parse_one(remaining)?;
            let is_eol = pair.av_id == MSV_AV_EOL && pair.value.is_empty();
            pairs.push(pair);
            remaining = rest;
            if is_eol {
                break;
            }
        }
        Ok((remaining, Self(pairs)))
    }

    /// Serialize in insertion order, appending an EOL pair if one is not already present.
    pub fn as_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        let mut saw_eol = false;
        for pair in &self.0 {
            out.extend_from_slice(&pair.as_bytes());
            if pair.av_id == MSV_AV_EOL {
                saw_eol = true;
            }
        }
        if !saw_eol {
            out.extend_from_slice(&AvPair::eol().as_bytes());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trip() {
        let mut pairs = AvPairs::new();
        pairs.push(AvPair::string(MSV_AV_NB_DOMAIN_NAME, "DOMAIN"));
        pairs.push(AvPair::string(MSV_AV_NB_COMPUTER_NAME, "HOST"));
        pairs.push(AvPair::eol());

        let bytes = pairs.as_bytes();
        let (rest, decoded) = AvPairs::parse(&bytes).unwrap();
        assert!(rest.is_empty());
        assert_eq!(decoded, pairs);
    }

    #[test]
    fn encode_appends_missing_eol() {
        let mut pairs = AvPairs::new();
        pairs.push(AvPair::string(MSV_AV_NB_DOMAIN_NAME, "DOMAIN"));
        let bytes = pairs.as_bytes();
        let (_, decoded) = AvPairs::parse(&bytes).unwrap();
        assert_eq!(decoded.0.last().unwrap().av_id, MSV_AV_EOL);
    }

    #[test]
    fn lookup_returns_first_match() {
        let mut pairs = AvPairs::new();
        pairs.push(AvPair::string(MSV_AV_TARGET_NAME, "first"));
        pairs.push(AvPair::eol());
        assert!(pairs.get(MSV_AV_TARGET_NAME).is_some());
        assert!(pairs.get(MSV_AV_SINGLE_HOST).is_none());
    }
}
