//! Two-Way Transport (`spec.md §4.3`): outstanding-request table,
//! subscription queues, and a self-healing persistent listener, generic
//! over a byte-frame connection so IPC and WebSocket share one algorithm
//! (`spec.md §9`'s composition-over-inheritance redesign note).

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::Stream;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{build_envelope, resolve_response, BidirectionalTransport, IdGenerator, Transport};
use crate::error::TransportError;
use crate::wire::types::InboundMessage;

/// A live server-initiated push channel (`spec.md §3`). Notifications for
/// this subscription's id arrive via [`Subscription::next`] / the `Stream`
/// impl, in arrival order.
pub struct Subscription {
    id: String,
    rx: mpsc::UnboundedReceiver<Value>,
}

impl Subscription {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Awaits the next notification payload, or `None` if the subscription
    /// was dropped (listener failure, or `unsubscribe`).
    pub async fn next(&mut self) -> Option<Value> {
        self.rx.recv().await
    }
}

impl Stream for Subscription {
    type Item = Value;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// A single byte-frame connection, lazily opened and cached
/// (`PersistentSocket`/`PersistentWebSocket` in `spec.md §4.3`).
#[async_trait]
pub trait FrameConnection: Send + Sync + 'static {
    /// Opens the connection if not already open. Idempotent.
    async fn open(&self) -> Result<(), TransportError>;
    /// Reads exactly one framed message. Only ever called from the
    /// listener task.
    async fn read_frame(&self) -> Result<Vec<u8>, TransportError>;
    /// Writes exactly one framed message. Callers serialize writes
    /// themselves (the multiplexer holds a write lock).
    async fn write_frame(&self, data: &[u8]) -> Result<(), TransportError>;
    async fn close(&self);
}

type OutstandingMap = DashMap<u64, oneshot::Sender<Result<Value, TransportError>>>;
type SubscriptionMap = DashMap<String, mpsc::UnboundedSender<Value>>;

/// State shared between the send path and the listener task. Kept separate
/// from [`Multiplexer`] so the listener can hold its own `Arc` without the
/// multiplexer needing a self-referential one.
struct Shared<C: FrameConnection> {
    conn: C,
    ids: IdGenerator,
    outstanding: OutstandingMap,
    subscriptions: SubscriptionMap,
    write_lock: Mutex<()>,
}

impl<C: FrameConnection> Shared<C> {
    /// The long-lived read loop (`spec.md §4.3`). Signals `ready` once it
    /// has begun waiting on its first read; on any read failure, fails
    /// every outstanding awaiter with `ConnectionLost` before exiting
    /// (`spec.md §9` Open Question: "fail all outstanding awaiters on
    /// listener termination").
    async fn listen(self: Arc<Self>, ready: Arc<Notify>) {
        ready.notify_one();
        loop {
            match self.conn.read_frame().await {
                Ok(bytes) => self.dispatch(&bytes),
                Err(e) => {
                    warn!(error = %e, "listener read failed, terminating");
                    self.fail_all_outstanding(&e);
                    return;
                }
            }
        }
    }

    fn dispatch(&self, bytes: &[u8]) {
        let parsed = match InboundMessage::parse(bytes) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "failed to parse inbound frame");
                return;
            }
        };
        match parsed {
            InboundMessage::Response(resp) => {
                if let Some((_, tx)) = self.outstanding.remove(&resp.id) {
                    let _ = tx.send(resolve_response(resp.result, resp.error));
                } else {
                    debug!(id = resp.id, "unsolicited response");
                }
            }
            InboundMessage::Notification(notif) => {
                let sub_id = &notif.params.subscription;
                if let Some(queue) = self.subscriptions.get(sub_id) {
                    if queue.send(notif.params.result).is_err() {
                        debug!(subscription = %sub_id, "dropped subscription, discarding notification");
                    }
                } else {
                    debug!(subscription = %sub_id, "unsolicited notification");
                }
            }
        }
    }

    fn fail_all_outstanding(&self, reason: &TransportError) {
        let ids: Vec<u64> = self.outstanding.iter().map(|e| *e.key()).collect();
        for id in ids {
            if let Some((_, tx)) = self.outstanding.remove(&id) {
                debug!(id, "failing outstanding awaiter: listener terminated");
                let _ = tx.send(Err(TransportError::ConnectionLost(reason.to_string())));
            }
        }
    }

    async fn send_request(
        self: &Arc<Self>,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, TransportError> {
        let id = self.ids.next();
        let (tx, rx) = oneshot::channel();
        self.outstanding.insert(id, tx);

        let envelope = build_envelope(id, method, params);
        let payload = serde_json::to_vec(&envelope)?;

        {
            let _guard = self.write_lock.lock().await;
            if let Err(e) = self.conn.write_frame(&payload).await {
                self.outstanding.remove(&id);
                return Err(e);
            }
        }

        let result = tokio::time::timeout(timeout, rx).await;
        self.outstanding.remove(&id);
        match result {
            Ok(Ok(inner)) => inner,
            Ok(Err(_)) => Err(TransportError::ConnectionLost(
                "awaiter dropped without a response".to_string(),
            )),
            Err(_) => Err(TransportError::Timeout {
                id,
                timeout_secs: timeout.as_secs(),
            }),
        }
    }
}

/// Shared multiplexer base for IPC and WebSocket transports.
pub struct Multiplexer<C: FrameConnection> {
    shared: Arc<Shared<C>>,
    listener: Mutex<Option<JoinHandle<()>>>,
    default_timeout: Duration,
}

impl<C: FrameConnection> Multiplexer<C> {
    pub fn new(conn: C, default_timeout: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                conn,
                ids: IdGenerator::new(),
                outstanding: DashMap::new(),
                subscriptions: DashMap::new(),
                write_lock: Mutex::new(()),
            }),
            listener: Mutex::new(None),
            default_timeout,
        }
    }

    /// Ensures the listener task is running, starting it on first use and
    /// after prior completion (`spec.md §4.3`). Blocks until the listener
    /// has begun its first read.
    async fn ensure_listener(&self) -> Result<(), TransportError> {
        let mut guard = self.listener.lock().await;
        let needs_restart = match guard.as_ref() {
            None => true,
            Some(handle) => handle.is_finished(),
        };
        if !needs_restart {
            return Ok(());
        }

        self.shared.conn.open().await?;

        let ready = Arc::new(Notify::new());
        let ready_waiter = Arc::clone(&ready);
        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(async move {
            shared.listen(ready).await;
        });
        *guard = Some(handle);
        ready_waiter.notified().await;
        Ok(())
    }
}

#[async_trait]
impl<C: FrameConnection> Transport for Multiplexer<C> {
    async fn send_request(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, TransportError> {
        self.ensure_listener().await?;
        self.shared.send_request(method, params, timeout).await
    }

    async fn close(&self) {
        self.shared.conn.close().await;
        if let Some(handle) = self.listener.lock().await.take() {
            handle.abort();
        }
    }
}

#[async_trait]
impl<C: FrameConnection> BidirectionalTransport for Multiplexer<C> {
    async fn subscribe(&self, params: Value) -> Result<Subscription, TransportError> {
        self.ensure_listener().await?;
        let result = self
            .shared
            .send_request("eth_subscribe", params, self.default_timeout)
            .await?;
        let sub_id = result
            .as_str()
            .ok_or_else(|| TransportError::ConnectionLost("eth_subscribe returned non-string id".into()))?
            .to_string();
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.subscriptions.insert(sub_id.clone(), tx);
        Ok(Subscription { id: sub_id, rx })
    }

    async fn unsubscribe(&self, sub: Subscription) -> Result<(), TransportError> {
        self.ensure_listener().await?;
        self.shared.subscriptions.remove(&sub.id);
        self.shared
            .send_request("eth_unsubscribe", serde_json::json!([sub.id]), self.default_timeout)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc as tmpsc;

    /// An in-memory `FrameConnection` fed from a channel, for exercising the
    /// multiplexer without a real socket.
    struct FakeConnection {
        inbound: Mutex<tmpsc::UnboundedReceiver<Result<Vec<u8>, TransportError>>>,
        outbound: tmpsc::UnboundedSender<Vec<u8>>,
        opens: AtomicUsize,
    }

    #[async_trait]
    impl FrameConnection for FakeConnection {
        async fn open(&self) -> Result<(), TransportError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn read_frame(&self) -> Result<Vec<u8>, TransportError> {
            let mut guard = self.inbound.lock().await;
            match guard.recv().await {
                Some(Ok(bytes)) => Ok(bytes),
                Some(Err(e)) => Err(e),
                None => Err(TransportError::ConnectionLost("channel closed".into())),
            }
        }

        async fn write_frame(&self, data: &[u8]) -> Result<(), TransportError> {
            self.outbound
                .send(data.to_vec())
                .map_err(|_| TransportError::Closed)
        }

        async fn close(&self) {}
    }

    fn fake_pair() -> (
        Arc<Multiplexer<FakeConnection>>,
        tmpsc::UnboundedSender<Result<Vec<u8>, TransportError>>,
        tmpsc::UnboundedReceiver<Vec<u8>>,
    ) {
        let (in_tx, in_rx) = tmpsc::unbounded_channel();
        let (out_tx, out_rx) = tmpsc::unbounded_channel();
        let conn = FakeConnection {
            inbound: Mutex::new(in_rx),
            outbound: out_tx,
            opens: AtomicUsize::new(0),
        };
        let mux = Arc::new(Multiplexer::new(conn, Duration::from_secs(5)));
        (mux, in_tx, out_rx)
    }

    #[tokio::test]
    async fn send_request_round_trips() {
        let (mux, in_tx, mut out_rx) = fake_pair();
        let mux2 = Arc::clone(&mux);
        let handle = tokio::spawn(async move {
            mux2.send_request("eth_blockNumber", Value::Array(vec![]), Duration::from_secs(5))
                .await
        });

        let sent = out_rx.recv().await.unwrap();
        let req: Value = serde_json::from_slice(&sent).unwrap();
        let id = req["id"].as_u64().unwrap();

        in_tx
            .send(Ok(serde_json::to_vec(&serde_json::json!({
                "jsonrpc": "2.0", "id": id, "result": "0x10"
            }))
            .unwrap()))
            .unwrap();

        let result = handle.await.unwrap().unwrap();
        assert_eq!(result, Value::String("0x10".to_string()));
    }

    #[tokio::test]
    async fn out_of_order_responses_resume_correct_caller() {
        let (mux, in_tx, mut out_rx) = fake_pair();
        let mux_a = Arc::clone(&mux);
        let mux_b = Arc::clone(&mux);

        let handle_a = tokio::spawn(async move {
            mux_a
                .send_request("eth_getBalance", Value::Array(vec![]), Duration::from_secs(5))
                .await
        });
        let req_a = out_rx.recv().await.unwrap();
        let id_a = serde_json::from_slice::<Value>(&req_a).unwrap()["id"].as_u64().unwrap();

        let handle_b = tokio::spawn(async move {
            mux_b
                .send_request("eth_getCode", Value::Array(vec![]), Duration::from_secs(5))
                .await
        });
        let req_b = out_rx.recv().await.unwrap();
        let id_b = serde_json::from_slice::<Value>(&req_b).unwrap()["id"].as_u64().unwrap();

        // Respond out of order: b first, then a.
        in_tx
            .send(Ok(serde_json::to_vec(&serde_json::json!({"jsonrpc":"2.0","id":id_b,"result":"0xb"})).unwrap()))
            .unwrap();
        in_tx
            .send(Ok(serde_json::to_vec(&serde_json::json!({"jsonrpc":"2.0","id":id_a,"result":"0xa"})).unwrap()))
            .unwrap();

        assert_eq!(handle_b.await.unwrap().unwrap(), Value::String("0xb".to_string()));
        assert_eq!(handle_a.await.unwrap().unwrap(), Value::String("0xa".to_string()));
    }

    #[tokio::test]
    async fn listener_failure_fails_outstanding_awaiters() {
        let (mux, in_tx, mut out_rx) = fake_pair();
        let mux2 = Arc::clone(&mux);
        let handle = tokio::spawn(async move {
            mux2.send_request("eth_blockNumber", Value::Array(vec![]), Duration::from_secs(5))
                .await
        });
        let _ = out_rx.recv().await.unwrap();

        in_tx
            .send(Err(TransportError::ConnectionLost("socket reset".into())))
            .unwrap();

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, TransportError::ConnectionLost(_)));
    }

    #[tokio::test]
    async fn listener_restarts_after_termination() {
        let (mux, in_tx, mut out_rx) = fake_pair();

        let mux1 = Arc::clone(&mux);
        let first = tokio::spawn(async move {
            mux1.send_request("eth_blockNumber", Value::Array(vec![]), Duration::from_secs(5))
                .await
        });
        let _ = out_rx.recv().await.unwrap();
        in_tx
            .send(Err(TransportError::ConnectionLost("reset".into())))
            .unwrap();
        assert!(first.await.unwrap().is_err());

        // Listener task has exited; the next send must restart it.
        let mux2 = Arc::clone(&mux);
        let second = tokio::spawn(async move {
            mux2.send_request("eth_chainId", Value::Array(vec![]), Duration::from_secs(5))
                .await
        });
        let sent = out_rx.recv().await.unwrap();
        let id = serde_json::from_slice::<Value>(&sent).unwrap()["id"].as_u64().unwrap();
        in_tx
            .send(Ok(serde_json::to_vec(&serde_json::json!({"jsonrpc":"2.0","id":id,"result":"0x1"})).unwrap()))
            .unwrap();
        assert_eq!(second.await.unwrap().unwrap(), Value::String("0x1".to_string()));
        assert_eq!(mux.shared.conn.opens.load(Ordering::SeqCst), 2);
    }
}
