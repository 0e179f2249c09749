//! Hex-quantity <-> integer coercion (`spec.md §3`, §6 "Wire encoding").
//!
//! Integers are hex quantities with a `0x` prefix, leading zeroes
//! suppressed. `Wei` is the arbitrary-precision non-negative integer used
//! for balances/values; `U64Quantity` covers the many `u64`-range fields
//! (gas, nonce, block number, ...).

use std::fmt;
use std::str::FromStr;

use alloy_primitives::U256;
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CodecError;

fn parse_hex_quantity(s: &str) -> Result<U256, CodecError> {
    let trimmed = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .ok_or_else(|| CodecError::InvalidQuantity(s.to_string()))?;
    let digits = if trimmed.is_empty() { "0" } else { trimmed };
    U256::from_str_radix(digits, 16).map_err(|_| CodecError::InvalidQuantity(s.to_string()))
}

fn format_hex_quantity(value: &U256) -> String {
    if value.is_zero() {
        return "0x0".to_string();
    }
    format!("{value:#x}")
}

/// A non-negative, arbitrary-precision wire integer (balances, values,
/// gas prices, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct Wei(pub U256);

impl Wei {
    pub fn from_u64(v: u64) -> Self {
        Self(U256::from(v))
    }

    pub fn as_u256(&self) -> U256 {
        self.0
    }

    pub fn to_u64_saturating(&self) -> u64 {
        self.0.try_into().unwrap_or(u64::MAX)
    }
}

impl fmt::Display for Wei {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Wei {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(parse_hex_quantity(s)?))
    }
}

impl From<u64> for Wei {
    fn from(v: u64) -> Self {
        Self::from_u64(v)
    }
}

impl Serialize for Wei {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_hex_quantity(&self.0))
    }
}

impl<'de> Deserialize<'de> for Wei {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Wei::from_str(&s).map_err(D::Error::custom)
    }
}

/// A wire integer known to fit in a `u64` (gas, nonce, block number, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct U64Quantity(pub u64);

impl U64Quantity {
    pub fn new(v: u64) -> Self {
        Self(v)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for U64Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for U64Quantity {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = parse_hex_quantity(s)?;
        let as_u64: u64 = value
            .try_into()
            .map_err(|_| CodecError::InvalidQuantity(s.to_string()))?;
        Ok(Self(as_u64))
    }
}

impl From<u64> for U64Quantity {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

impl Serialize for U64Quantity {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_hex_quantity(&U256::from(self.0)))
    }
}

impl<'de> Deserialize<'de> for U64Quantity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        U64Quantity::from_str(&s).map_err(D::Error::custom)
    }
}

/// Serializes a `u64` as a hex quantity string (for use in request params
/// that aren't wrapped in [`U64Quantity`], e.g. ad-hoc filter fields).
pub fn to_hex_quantity(value: u64) -> String {
    format_hex_quantity(&U256::from(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gas_round_trips() {
        let q: U64Quantity = "0xc350".parse().unwrap();
        assert_eq!(q.get(), 50_000);
    }

    #[test]
    fn nonce_round_trips() {
        let q: U64Quantity = "0x15".parse().unwrap();
        assert_eq!(q.get(), 21);
    }

    #[test]
    fn value_round_trips() {
        let w: Wei = "0xf3dbb76162000".parse().unwrap();
        assert_eq!(w.to_string(), "4290000000000000");
    }

    #[test]
    fn zero_round_trips() {
        let w = Wei::from_u64(0);
        let s = serde_json::to_string(&w).unwrap();
        assert_eq!(s, "\"0x0\"");
        let back: Wei = serde_json::from_str(&s).unwrap();
        assert_eq!(back, w);
    }

    #[test]
    fn max_256_bit_round_trips() {
        let w = Wei(U256::MAX);
        let s = serde_json::to_string(&w).unwrap();
        let back: Wei = serde_json::from_str(&s).unwrap();
        assert_eq!(back, w);
    }

    #[test]
    fn rejects_missing_prefix() {
        assert!(U64Quantity::from_str("15").is_err());
    }
}
