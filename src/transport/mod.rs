//! Transport base contract (`spec.md §4.1`): envelope construction,
//! request-id generation, timeout enforcement, and the shared message-parse
//! dispatch. Concrete transports (`http`, `multiplex` + `ipc`/`websocket`)
//! build on top of [`Transport`]/[`BidirectionalTransport`].

pub mod http;
pub mod ipc;
pub mod multiplex;
pub mod websocket;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::TransportError;

pub use http::HttpTransport;
pub use ipc::IpcConnection;
pub use multiplex::{FrameConnection, Multiplexer, Subscription};
pub use websocket::WebSocketConnection;

/// Monotonically increasing request-id generator. Every transport owns one;
/// ids are unique and strictly ascending for the transport's lifetime
/// (`spec.md §8`'s "unique ascending ids" property).
#[derive(Debug, Default)]
pub struct IdGenerator(AtomicU64);

impl IdGenerator {
    pub fn new() -> Self {
        Self(AtomicU64::new(1))
    }

    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

/// The capability every transport provides: a single request/response
/// round trip (`spec.md §4.1`).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `method`/`params` as a JSON-RPC request and awaits a matching
    /// response within `timeout`. Returns the raw `result` value, still in
    /// wire form — decoding is the caller's responsibility.
    async fn send_request(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, TransportError>;

    /// Releases connection resources. Idempotent.
    async fn close(&self);
}

/// The optional capability of bidirectional transports (`spec.md §4.1`).
/// HTTP does not implement this trait; callers attempting to subscribe over
/// HTTP instead get [`TransportError::NotSupported`] from a concrete
/// `Transport::send_request`-shaped path — see [`http::HttpTransport`].
#[async_trait]
pub trait BidirectionalTransport: Transport {
    /// Issues `eth_subscribe` and returns a live [`Subscription`] whose
    /// queue receives subsequent notification payloads in arrival order.
    async fn subscribe(&self, params: Value) -> Result<Subscription, TransportError>;

    /// Issues `eth_unsubscribe` for `sub`, removing its queue.
    async fn unsubscribe(&self, sub: Subscription) -> Result<(), TransportError>;
}

/// Picks a transport from a URI's scheme (`spec.md §6`): `ws://`/`wss://`
/// builds a WebSocket multiplexer, `http://`/`https://` a one-shot HTTP
/// transport, and anything else is taken as a local IPC socket path.
/// Grounded in `original_source/aioweb3/transport.py`'s `get_transport`.
pub fn from_uri(uri: &str, default_timeout: Duration) -> Result<Arc<dyn Transport>, TransportError> {
    if uri.starts_with("ws://") || uri.starts_with("wss://") {
        let conn = WebSocketConnection::new(uri);
        Ok(Arc::new(Multiplexer::new(conn, default_timeout)))
    } else if uri.starts_with("http://") || uri.starts_with("https://") {
        let url = uri.parse().map_err(|e| TransportError::Connect {
            uri: uri.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, format!("{e}")),
        })?;
        Ok(Arc::new(HttpTransport::new(url)))
    } else {
        let conn = IpcConnection::new(uri);
        Ok(Arc::new(Multiplexer::new(conn, default_timeout)))
    }
}

/// Builds the `{"jsonrpc":"2.0","method":...,"params":...,"id":...}` value.
pub(crate) fn build_envelope(id: u64, method: &str, params: Value) -> Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
        "id": id,
    })
}

/// Applies the outcome of a response's `error`/`result` fields per
/// `spec.md §4.1`: non-null `error` wins and becomes a protocol error.
pub(crate) fn resolve_response(
    result: Option<Value>,
    error: Option<crate::error::RpcErrorObject>,
) -> Result<Value, TransportError> {
    if let Some(err) = error {
        Err(TransportError::Protocol(err))
    } else {
        Ok(result.unwrap_or(Value::Null))
    }
}
