//! One-shot HTTP transport (`spec.md §4.2`): one POST per request over a
//! persistent `reqwest::Client` session. Grounded in the corpus's
//! `reqwest`-based HTTP client usage.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use super::{build_envelope, resolve_response, IdGenerator, Transport};
use crate::error::TransportError;
use crate::wire::types::Response;

/// Does not support subscriptions (`spec.md §4.2`): no IPC fallback, no
/// partial support — `subscribe`/`unsubscribe` always fail explicitly.
pub struct HttpTransport {
    client: reqwest::Client,
    url: Url,
    ids: IdGenerator,
}

impl HttpTransport {
    pub fn new(url: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            ids: IdGenerator::new(),
        }
    }

    /// Always fails: HTTP is not a bidirectional transport (`spec.md §9`).
    pub async fn subscribe(&self, _params: Value) -> Result<Value, TransportError> {
        Err(TransportError::NotSupported("subscribe"))
    }

    /// Always fails, symmetrically with [`HttpTransport::subscribe`].
    pub async fn unsubscribe(&self, _sub_id: &str) -> Result<(), TransportError> {
        Err(TransportError::NotSupported("unsubscribe"))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send_request(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, TransportError> {
        let id = self.ids.next();
        let envelope = build_envelope(id, method, params);

        let send = self
            .client
            .post(self.url.clone())
            .header("Content-Type", "application/json")
            .json(&envelope)
            .send();

        let resp = tokio::time::timeout(timeout, send)
            .await
            .map_err(|_| TransportError::Timeout {
                id,
                timeout_secs: timeout.as_secs(),
            })?
            .map_err(|e| TransportError::ConnectionLost(e.to_string()))?;

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| TransportError::ConnectionLost(e.to_string()))?;
        let parsed: Response = serde_json::from_slice(&bytes)?;
        resolve_response(parsed.result, parsed.error)
    }

    async fn close(&self) {
        // reqwest::Client has no explicit teardown; dropping the handle
        // recycles its pooled connections.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn send_request_posts_and_parses_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": "0x2a",
            })))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(Url::parse(&server.uri()).unwrap());
        let result = transport
            .send_request("eth_blockNumber", Value::Array(vec![]), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(result, Value::String("0x2a".to_string()));
    }

    #[tokio::test]
    async fn send_request_surfaces_protocol_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": {"code": -32601, "message": "method not found"},
            })))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(Url::parse(&server.uri()).unwrap());
        let err = transport
            .send_request("eth_bogus", Value::Array(vec![]), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Protocol(_)));
    }

    #[tokio::test]
    async fn subscribe_not_supported() {
        let transport = HttpTransport::new(Url::parse("http://127.0.0.1:1").unwrap());
        let err = transport.subscribe(Value::Null).await.unwrap_err();
        assert!(matches!(err, TransportError::NotSupported(_)));
    }
}
