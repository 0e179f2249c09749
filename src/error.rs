//! Error taxonomy for the client (see `spec.md §7`).

use std::fmt;

use serde_json::Value;

use crate::wire::{Hash32, TxParams};

/// Top-level error surfaced to callers of the crate.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// A transport-level failure (connection, timeout, protocol).
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// An ABI/codec-level failure.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// A signer/nonce-controller failure.
    #[error(transparent)]
    Signer(#[from] SignerError),
    /// `TxParams` set both legacy `gasPrice` and an EIP-1559 fee field.
    #[error("transaction params set both gasPrice and an EIP-1559 fee field")]
    ConflictingFeeFields,
}

/// The non-null `error` object echoed by a JSON-RPC response.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl fmt::Display for RpcErrorObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// Errors raised by the transport layer (`spec.md §4`, `§7`).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The payload could not be parsed as a JSON-RPC envelope.
    #[error("failed to parse transport payload: {0}")]
    Parse(#[from] serde_json::Error),
    /// The node returned a non-null `error` object.
    #[error("protocol error: {0}")]
    Protocol(RpcErrorObject),
    /// No response arrived within the configured deadline.
    #[error("request {id} timed out after {timeout_secs}s")]
    Timeout { id: u64, timeout_secs: u64 },
    /// The transport does not support the requested capability.
    #[error("{0} is not supported by this transport")]
    NotSupported(&'static str),
    /// The underlying connection failed or was lost.
    #[error("connection lost: {0}")]
    ConnectionLost(String),
    /// The transport (or its listener) has already been closed.
    #[error("transport is closed")]
    Closed,
    /// Failed to establish the underlying connection.
    #[error("failed to connect to {uri}: {source}")]
    Connect {
        uri: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by the codec layer (`spec.md §4.5`).
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// An ABI type string could not be parsed.
    #[error("invalid ABI type {0:?}: {1}")]
    InvalidType(String, String),
    /// ABI encode/decode failed.
    #[error("ABI error: {0}")]
    Abi(#[from] ethabi::Error),
    /// A log's first topic didn't match the event's signature hash.
    #[error("log topic0 {actual} does not match event signature hash {expected}")]
    SignatureMismatch { expected: String, actual: String },
    /// A log didn't carry the expected number of indexed topics.
    #[error("expected {expected} topics, log has {actual}")]
    TopicCountMismatch { expected: usize, actual: usize },
    /// A log had no topics at all (can't even read topic0).
    #[error("log has no topics")]
    NoTopics,
    /// A hex quantity on the wire was malformed.
    #[error("invalid hex quantity {0:?}")]
    InvalidQuantity(String),
    /// A hex address on the wire was malformed.
    #[error("invalid address {0:?}: {1}")]
    InvalidAddress(String, String),
}

/// A snapshot of the offending transaction, attached to signer errors per
/// `spec.md §7`'s "wrap every signer-surfaced error with the offending
/// Transaction" principle. Carries the allocated nonce, the params as
/// submitted, and the submitted hash (when known) rather than the full
/// `signer::Transaction` itself — `error` sits below `signer` in the
/// module graph, so it can only describe the transaction, not own its type.
#[derive(Debug, Clone)]
pub struct FailedTransaction {
    pub nonce: u64,
    pub params: TxParams,
    pub tx_hash: Option<Hash32>,
}

impl fmt::Display for FailedTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transaction nonce={}", self.nonce)?;
        if let Some(h) = &self.tx_hash {
            write!(f, " hash={h}")?;
        }
        Ok(())
    }
}

/// Errors raised by the signer / nonce controller (`spec.md §4.7`, `§7`).
#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    /// Submission failed; the nonce was not consumed.
    #[error("failed to send {tx}: {source}")]
    Send {
        tx: Box<FailedTransaction>,
        #[source]
        source: TransportError,
    },
    /// The node's mined transaction count passed this transaction's nonce
    /// without ever producing a receipt for it.
    #[error("{tx} was dropped (mined count passed it with no receipt)")]
    Dropped { tx: Box<FailedTransaction> },
    /// The per-wait deadline elapsed before a receipt was observed.
    #[error("timed out waiting for {tx} after {waited_secs}s")]
    WaitTimeout {
        tx: Box<FailedTransaction>,
        waited_secs: u64,
    },
    /// Propagated transport/codec failure while polling or estimating.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Propagated codec failure while building the call data.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// The external ECDSA signer rejected or failed to sign the envelope.
    #[error("failed to sign transaction: {0}")]
    Signing(String),
    /// A required field was missing and could not be defaulted.
    #[error("missing required field {0}")]
    MissingField(&'static str),
    /// `TxParams` set both legacy `gasPrice` and an EIP-1559 fee field.
    #[error("transaction params set both gasPrice and an EIP-1559 fee field")]
    ConflictingFeeFields,
}

impl From<ClientError> for SignerError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::Transport(t) => SignerError::Transport(t),
            ClientError::Codec(c) => SignerError::Codec(c),
            ClientError::Signer(s) => s,
            ClientError::ConflictingFeeFields => SignerError::ConflictingFeeFields,
        }
    }
}
