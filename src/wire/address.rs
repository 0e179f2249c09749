//! `Address` — a 20-byte identifier normalized to lowercase hex on
//! construction, with EIP-55 checksum and event-topic conversions
//! (`spec.md §3`, §9 "Open ambiguities" resolution #4).

use std::fmt;
use std::str::FromStr;

use alloy_primitives::{keccak256, Address as AlloyAddress};
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CodecError;

/// A 20-byte Ethereum-family address.
///
/// Construction always lowercase-normalizes; checksum validity is only
/// meaningful when producing the EIP-55 form via [`Address::to_checksum`],
/// not as a precondition on construction (any 20 bytes is a valid address).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(AlloyAddress);

impl Address {
    /// Builds an address from raw bytes.
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(AlloyAddress::from(bytes))
    }

    /// Returns the raw 20 bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        self.0.as_ref()
    }

    /// Parses a `0x`-prefixed (or bare) hex address, lowercase-normalizing
    /// it. Rejects anything that isn't exactly 20 bytes of hex.
    pub fn parse(s: &str) -> Result<Self, CodecError> {
        let trimmed = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(trimmed)
            .map_err(|e| CodecError::InvalidAddress(s.to_string(), e.to_string()))?;
        let arr: [u8; 20] = bytes
            .try_into()
            .map_err(|_| CodecError::InvalidAddress(s.to_string(), "expected 20 bytes".into()))?;
        Ok(Self::from_bytes(arr))
    }

    /// Lowercase `0x`-prefixed hex form. This is the canonical wire form.
    pub fn to_lower_hex(&self) -> String {
        format!("0x{}", hex::encode(self.as_bytes()))
    }

    /// EIP-55 checksummed form.
    pub fn to_checksum(&self) -> String {
        let lower = hex::encode(self.as_bytes());
        let hash = keccak256(lower.as_bytes());
        let mut out = String::with_capacity(42);
        out.push_str("0x");
        for (i, c) in lower.chars().enumerate() {
            if c.is_ascii_digit() {
                out.push(c);
                continue;
            }
            // Each hash byte covers two hex nibbles of the address string.
            let nibble = if i % 2 == 0 {
                hash[i / 2] >> 4
            } else {
                hash[i / 2] & 0x0f
            };
            if nibble >= 8 {
                out.push(c.to_ascii_uppercase());
            } else {
                out.push(c);
            }
        }
        out
    }

    /// 32-byte event-topic form: left-pad with 12 zero bytes.
    pub fn to_event_topic(&self) -> String {
        format!("0x{}{}", "0".repeat(24), hex::encode(self.as_bytes()))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_lower_hex())
    }
}

impl FromStr for Address {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<AlloyAddress> for Address {
    fn from(value: AlloyAddress) -> Self {
        Self(value)
    }
}

impl From<Address> for AlloyAddress {
    fn from(value: Address) -> Self {
        value.0
    }
}

impl Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_lower_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Address::parse(&s).map_err(D::Error::custom)
    }
}
