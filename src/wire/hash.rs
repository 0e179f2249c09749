//! `Hash32` — a 32-byte hex value (block hash, tx hash, topic, storage key).

use std::fmt;
use std::str::FromStr;

use alloy_primitives::B256;
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CodecError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hash32(pub B256);

impl Hash32 {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(B256::from(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_ref()
    }

    pub fn parse(s: &str) -> Result<Self, CodecError> {
        let trimmed = s.strip_prefix("0x").unwrap_or(s);
        let bytes =
            hex::decode(trimmed).map_err(|e| CodecError::InvalidQuantity(format!("{s}: {e}")))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CodecError::InvalidQuantity(s.to_string()))?;
        Ok(Self::from_bytes(arr))
    }
}

impl fmt::Display for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.as_bytes()))
    }
}

impl FromStr for Hash32 {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<B256> for Hash32 {
    fn from(value: B256) -> Self {
        Self(value)
    }
}

impl From<Hash32> for B256 {
    fn from(value: Hash32) -> Self {
        value.0
    }
}

impl Serialize for Hash32 {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Hash32 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Hash32::parse(&s).map_err(D::Error::custom)
    }
}
