//! Keccak selector derivation, ABI encode/decode, and event-log parsing
//! (`spec.md §4.5`).

pub mod abi;
pub mod selector;

pub use abi::{EventParser, EventSpec, MethodCall, ParsedEvent};
pub use selector::{canonical_signature, event_signature_hash, parse_abi_type, parse_abi_types, selector};
