//! Selector and event-signature-hash derivation (`spec.md §4.5`).
//!
//! `selector(name, input_types) = keccak("name(t1,t2,...)")[0..4]`; the full
//! 32-byte hash of the same canonical signature is a log's `topics[0]`.

use ethabi::param_type::{ParamType, Reader};

use crate::error::CodecError;

/// Parses an ABI type string (`"uint256"`, `"address[]"`, `"(uint256,bool)"`, ...).
pub fn parse_abi_type(type_str: &str) -> Result<ParamType, CodecError> {
    Reader::read(type_str).map_err(|e| CodecError::InvalidType(type_str.to_string(), e.to_string()))
}

/// Parses an ordered list of ABI type strings.
pub fn parse_abi_types(type_strs: &[impl AsRef<str>]) -> Result<Vec<ParamType>, CodecError> {
    type_strs.iter().map(|s| parse_abi_type(s.as_ref())).collect()
}

/// Canonical `"name(t1,t2,...)"` signature for a function or event.
pub fn canonical_signature(name: &str, params: &[ParamType]) -> String {
    let joined = params
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(",");
    format!("{name}({joined})")
}

/// 4-byte function selector: `keccak(signature)[0..4]`.
pub fn selector(name: &str, input_types: &[ParamType]) -> [u8; 4] {
    ethabi::short_signature(name, input_types)
}

/// Full 32-byte event signature hash: `keccak(signature)`.
pub fn event_signature_hash(name: &str, field_types: &[ParamType]) -> ethereum_types::H256 {
    ethabi::long_signature(name, field_types)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balance_of_selector() {
        let types = parse_abi_types(&["address"]).unwrap();
        let sel = selector("balanceOf", &types);
        assert_eq!(hex::encode(sel), "70a08231");
    }

    #[test]
    fn canonical_signature_has_no_spaces() {
        let types = parse_abi_types(&["uint256", "address"]).unwrap();
        assert_eq!(canonical_signature("Transfer", &types), "Transfer(uint256,address)");
    }
}
