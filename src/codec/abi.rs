//! `MethodCall`, `EventSpec`, `parse_log`, `EventParser` (`spec.md §3`, §4.5).

use std::collections::HashMap;

use ethereum_types::H256;
use ethabi::param_type::ParamType;
use ethabi::Token;
use once_cell::sync::OnceCell;

use super::selector::{canonical_signature, event_signature_hash, parse_abi_types, selector};
use crate::error::CodecError;
use crate::wire::{Address, Hash32, LogData};

/// Method name, ordered input/output ABI types, and an optional bound `to`.
///
/// Bindings are immutable: [`MethodCall::bind`] returns a new value rather
/// than mutating in place.
#[derive(Debug, Clone)]
pub struct MethodCall {
    name: String,
    input_types: Vec<ParamType>,
    output_types: Vec<ParamType>,
    to: Option<Address>,
    selector_cache: OnceCell<[u8; 4]>,
}

impl MethodCall {
    pub fn new(
        name: impl Into<String>,
        input_types: &[impl AsRef<str>],
        output_types: &[impl AsRef<str>],
    ) -> Result<Self, CodecError> {
        Ok(Self {
            name: name.into(),
            input_types: parse_abi_types(input_types)?,
            output_types: parse_abi_types(output_types)?,
            to: None,
            selector_cache: OnceCell::new(),
        })
    }

    /// Returns a new `MethodCall` bound to `addr`, leaving `self` untouched.
    pub fn bind(&self, addr: Address) -> Self {
        Self {
            name: self.name.clone(),
            input_types: self.input_types.clone(),
            output_types: self.output_types.clone(),
            to: Some(addr),
            selector_cache: OnceCell::new(),
        }
    }

    pub fn to(&self) -> Option<Address> {
        self.to
    }

    pub fn signature(&self) -> String {
        canonical_signature(&self.name, &self.input_types)
    }

    pub fn selector(&self) -> [u8; 4] {
        *self
            .selector_cache
            .get_or_init(|| selector(&self.name, &self.input_types))
    }

    /// Raw call data: selector || ABI-encode(input_types, args).
    pub fn encode_input(&self, args: &[Token]) -> Result<Vec<u8>, CodecError> {
        let mut data = self.selector().to_vec();
        data.extend(ethabi::encode(args));
        Ok(data)
    }

    /// Decodes a raw `eth_call` result. Single-output tuples are unwrapped
    /// to the bare value.
    pub fn decode_output(&self, raw: &[u8]) -> Result<Vec<Token>, CodecError> {
        let tokens = ethabi::decode(&self.output_types, raw)?;
        Ok(tokens)
    }

    /// Like [`MethodCall::decode_output`], but unwraps a single-element
    /// result to that one token (the common case for getters).
    pub fn decode_output_unwrapped(&self, raw: &[u8]) -> Result<Token, CodecError> {
        let mut tokens = self.decode_output(raw)?;
        if tokens.len() == 1 {
            Ok(tokens.remove(0))
        } else {
            Ok(Token::Tuple(tokens))
        }
    }
}

/// Event name + ordered field descriptors, caching its canonical signature
/// and signature hash (the first log topic for any emission).
#[derive(Debug, Clone)]
pub struct EventSpec {
    name: String,
    /// Indexed fields, in declaration order.
    indexed: Vec<(String, ParamType)>,
    /// Non-indexed fields, in declaration order.
    non_indexed: Vec<(String, ParamType)>,
    /// All fields in original declaration order, for signature derivation.
    all_types: Vec<ParamType>,
    signature_hash: H256,
}

impl EventSpec {
    /// `fields` is `(name, abi_type, indexed?)` in declaration order.
    pub fn new(
        name: impl Into<String>,
        fields: &[(&str, &str, bool)],
    ) -> Result<Self, CodecError> {
        let name = name.into();
        let mut indexed = Vec::new();
        let mut non_indexed = Vec::new();
        let mut all_types = Vec::with_capacity(fields.len());
        for (field_name, type_str, is_indexed) in fields {
            let parsed = super::selector::parse_abi_type(type_str)?;
            all_types.push(parsed.clone());
            if *is_indexed {
                indexed.push((field_name.to_string(), parsed));
            } else {
                non_indexed.push((field_name.to_string(), parsed));
            }
        }
        let signature_hash = event_signature_hash(&name, &all_types);
        Ok(Self {
            name,
            indexed,
            non_indexed,
            all_types,
            signature_hash,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> String {
        canonical_signature(&self.name, &self.all_types)
    }

    pub fn signature_hash(&self) -> H256 {
        self.signature_hash
    }

    pub fn signature_hash_hex(&self) -> String {
        format!("0x{:x}", self.signature_hash)
    }
}

/// A decoded event: the spec that matched, its fields bound by name, and
/// the source log.
#[derive(Debug, Clone)]
pub struct ParsedEvent {
    pub event: EventSpec,
    pub fields: HashMap<String, Token>,
    pub log: LogData,
}

fn topic_to_h256(topic: &Hash32) -> H256 {
    H256::from_slice(topic.as_bytes())
}

/// Decodes a single log against a known [`EventSpec`] (`spec.md §4.5`).
pub fn parse_log(event: &EventSpec, log: &LogData) -> Result<HashMap<String, Token>, CodecError> {
    let topic0 = log.topics.first().ok_or(CodecError::NoTopics)?;
    if topic_to_h256(topic0) != event.signature_hash {
        return Err(CodecError::SignatureMismatch {
            expected: event.signature_hash_hex(),
            actual: topic0.to_string(),
        });
    }
    let expected = 1 + event.indexed.len();
    if log.topics.len() != expected {
        return Err(CodecError::TopicCountMismatch {
            expected,
            actual: log.topics.len(),
        });
    }

    let mut fields = HashMap::with_capacity(event.indexed.len() + event.non_indexed.len());

    for (i, (field_name, param_type)) in event.indexed.iter().enumerate() {
        let topic = &log.topics[1 + i];
        let decoded = ethabi::decode(std::slice::from_ref(param_type), topic.as_bytes())?;
        fields.insert(field_name.clone(), decoded.into_iter().next().expect("decode yields one token"));
    }

    if !event.non_indexed.is_empty() {
        let data_bytes = hex::decode(log.data.strip_prefix("0x").unwrap_or(&log.data))
            .map_err(|e| CodecError::InvalidQuantity(format!("log data: {e}")))?;
        let non_indexed_types: Vec<ParamType> =
            event.non_indexed.iter().map(|(_, t)| t.clone()).collect();
        let decoded = ethabi::decode(&non_indexed_types, &data_bytes)?;
        for ((field_name, _), token) in event.non_indexed.iter().zip(decoded.into_iter()) {
            fields.insert(field_name.clone(), token);
        }
    }

    Ok(fields)
}

/// Holds `{signature_hash -> EventSpec}` and does best-effort matching over
/// a heterogeneous log stream: unknown signatures, topic-less logs, and
/// indexed-count mismatches are silently skipped (`spec.md §4.5`).
#[derive(Debug, Clone, Default)]
pub struct EventParser {
    specs: HashMap<H256, EventSpec>,
}

impl EventParser {
    pub fn new() -> Self {
        Self {
            specs: HashMap::new(),
        }
    }

    pub fn register(&mut self, event: EventSpec) {
        self.specs.insert(event.signature_hash(), event);
    }

    pub fn with_events(events: impl IntoIterator<Item = EventSpec>) -> Self {
        let mut parser = Self::new();
        for event in events {
            parser.register(event);
        }
        parser
    }

    /// Best-effort parse over a slice of logs. Logs with no topics, unknown
    /// signatures, or a topic count inconsistent with the matched spec are
    /// skipped rather than surfaced as errors.
    pub fn parse_all(&self, logs: &[LogData]) -> Vec<ParsedEvent> {
        let mut out = Vec::new();
        for log in logs {
            let Some(topic0) = log.topics.first() else {
                continue;
            };
            let Some(spec) = self.specs.get(&topic_to_h256(topic0)) else {
                continue;
            };
            if let Ok(fields) = parse_log(spec, log) {
                out.push(ParsedEvent {
                    event: spec.clone(),
                    fields,
                    log: log.clone(),
                });
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer_event() -> EventSpec {
        EventSpec::new(
            "Transfer",
            &[
                ("from", "address", true),
                ("to", "address", true),
                ("value", "uint256", false),
            ],
        )
        .unwrap()
    }

    #[test]
    fn method_call_selector() {
        let call = MethodCall::new("balanceOf", &["address"], &["uint256"]).unwrap();
        assert_eq!(hex::encode(call.selector()), "70a08231");
    }

    #[test]
    fn bind_does_not_mutate_original() {
        let call = MethodCall::new("balanceOf", &["address"], &["uint256"]).unwrap();
        let addr = Address::parse("0x18c2ccd3e937bb5b1560a6f70de9bdb1340d849d").unwrap();
        let bound = call.bind(addr);
        assert!(call.to().is_none());
        assert_eq!(bound.to(), Some(addr));
    }

    #[test]
    fn event_signature_has_no_spaces() {
        let ev = transfer_event();
        assert_eq!(ev.signature(), "Transfer(address,address,uint256)");
    }

    #[test]
    fn parse_log_rejects_wrong_topic_count() {
        let ev = transfer_event();
        let log = LogData {
            address: Address::parse("0x18c2ccd3e937bb5b1560a6f70de9bdb1340d849d").unwrap(),
            topics: vec![Hash32::from_bytes(ev.signature_hash().0)],
            data: "0x".to_string(),
            block_number: None,
            transaction_hash: None,
            transaction_index: None,
            block_hash: None,
            log_index: None,
            removed: false,
        };
        let err = parse_log(&ev, &log).unwrap_err();
        assert!(matches!(err, CodecError::TopicCountMismatch { .. }));
    }
}
