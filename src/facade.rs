//! RPC Facade (`spec.md §4.4`): a thin typed wrapper over
//! [`Transport::send_request`] — format parameters, issue the request,
//! parse the raw result into a strongly typed value. Grounded in the
//! typed-wrapper-over-provider style of `chain/eip155/mod.rs`'s
//! `Eip155ChainProvider`, generalized from a single fixed chain to any
//! Ethereum-family JSON-RPC node.

use std::time::Duration;

use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::codec::{MethodCall, ParsedEvent};
use crate::config::ClientConfig;
use crate::error::{ClientError, CodecError, TransportError};
use crate::transport::{BidirectionalTransport, Subscription, Transport};
use crate::wire::{
    Address, BlockData, BlockParameter, FilterChanges, Hash32, LogData, NewHead, SyncingStatus,
    TxData, TxParams, TxReceipt, U64Quantity, Wei,
};
use ethabi::Token;

fn omit_nulls(mut value: Value) -> Value {
    if let Value::Object(map) = &mut value {
        map.retain(|_, v| !v.is_null());
    }
    value
}

/// Parameters for `eth_newFilter`/`eth_getLogs` (`spec.md §4.4`). `None`
/// fields are omitted from the wire object.
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub from_block: Option<BlockParameter>,
    pub to_block: Option<BlockParameter>,
    pub address: Option<Vec<Address>>,
    pub topics: Option<Vec<Option<Hash32>>>,
}

impl LogFilter {
    fn to_wire(&self) -> Value {
        let mut obj = serde_json::Map::new();
        if let Some(b) = self.from_block {
            obj.insert("fromBlock".to_string(), b.to_wire());
        }
        if let Some(b) = self.to_block {
            obj.insert("toBlock".to_string(), b.to_wire());
        }
        if let Some(addrs) = &self.address {
            obj.insert(
                "address".to_string(),
                serde_json::to_value(addrs).expect("Address serializes infallibly"),
            );
        }
        if let Some(topics) = &self.topics {
            let wire: Vec<Value> = topics
                .iter()
                .map(|t| match t {
                    Some(h) => serde_json::to_value(h).expect("Hash32 serializes infallibly"),
                    None => Value::Null,
                })
                .collect();
            obj.insert("topics".to_string(), Value::Array(wire));
        }
        Value::Object(obj)
    }
}

/// Address + EIP-1184-style storage slot, state-override entry
/// (`eth_call`'s state-override object, a geth extension).
pub type StateOverride = std::collections::HashMap<Address, Value>;

/// Thin typed wrapper over a [`Transport`], optionally also a
/// [`BidirectionalTransport`] for subscription support.
pub struct Facade {
    transport: std::sync::Arc<dyn Transport>,
    bidi: Option<std::sync::Arc<dyn BidirectionalTransport>>,
    request_timeout: Duration,
    chain_id: OnceCell<u64>,
}

impl Facade {
    /// Builds a Facade over a one-shot transport (HTTP). Subscriptions
    /// always fail with `NotSupported`.
    pub fn new(transport: std::sync::Arc<dyn Transport>, config: &ClientConfig) -> Self {
        Self {
            transport,
            bidi: None,
            request_timeout: config.request_timeout,
            chain_id: OnceCell::new(),
        }
    }

    /// Builds a Facade over a bidirectional transport (IPC/WebSocket),
    /// enabling `subscribe_*` helpers.
    pub fn new_bidirectional(
        transport: std::sync::Arc<dyn BidirectionalTransport>,
        config: &ClientConfig,
    ) -> Self {
        Self {
            transport: transport.clone(),
            bidi: Some(transport),
            request_timeout: config.request_timeout,
            chain_id: OnceCell::new(),
        }
    }

    async fn request_raw(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        self.transport.send_request(method, params, self.request_timeout).await
    }

    async fn call_typed<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, ClientError> {
        let raw = self.request_raw(method, params).await?;
        serde_json::from_value(raw)
            .map_err(|e| ClientError::Transport(TransportError::Parse(e)))
    }

    pub async fn client_version(&self) -> Result<String, ClientError> {
        self.call_typed("web3_clientVersion", Value::Array(vec![])).await
    }

    /// Cached after first fetch (`spec.md §4.4`).
    pub async fn chain_id(&self) -> Result<u64, ClientError> {
        if let Some(v) = self.chain_id.get() {
            return Ok(*v);
        }
        let raw: U64Quantity = self.call_typed("eth_chainId", Value::Array(vec![])).await?;
        Ok(*self.chain_id.get_or_init(|| async { raw.get() }).await)
    }

    pub async fn accounts(&self) -> Result<Vec<Address>, ClientError> {
        self.call_typed("eth_accounts", Value::Array(vec![])).await
    }

    pub async fn block_number(&self) -> Result<u64, ClientError> {
        let q: U64Quantity = self.call_typed("eth_blockNumber", Value::Array(vec![])).await?;
        Ok(q.get())
    }

    pub async fn gas_price(&self) -> Result<Wei, ClientError> {
        self.call_typed("eth_gasPrice", Value::Array(vec![])).await
    }

    pub async fn transaction_count(
        &self,
        address: Address,
        block: BlockParameter,
    ) -> Result<u64, ClientError> {
        let q: U64Quantity = self
            .call_typed(
                "eth_getTransactionCount",
                serde_json::json!([address, block.to_wire()]),
            )
            .await?;
        Ok(q.get())
    }

    pub async fn balance(&self, address: Address, block: BlockParameter) -> Result<Wei, ClientError> {
        self.call_typed("eth_getBalance", serde_json::json!([address, block.to_wire()]))
            .await
    }

    pub async fn storage_at(
        &self,
        address: Address,
        slot: Hash32,
        block: BlockParameter,
    ) -> Result<Hash32, ClientError> {
        self.call_typed(
            "eth_getStorageAt",
            serde_json::json!([address, slot, block.to_wire()]),
        )
        .await
    }

    /// `"0x"` means no contract is deployed at `address`.
    pub async fn code(&self, address: Address, block: BlockParameter) -> Result<String, ClientError> {
        self.call_typed("eth_getCode", serde_json::json!([address, block.to_wire()]))
            .await
    }

    pub fn is_contract_code(code: &str) -> bool {
        !matches!(code, "0x" | "0x0" | "")
    }

    pub async fn call(
        &self,
        tx: &TxParams,
        block: BlockParameter,
        state_override: Option<StateOverride>,
    ) -> Result<String, ClientError> {
        if tx.has_conflicting_fee_fields() {
            return Err(ClientError::ConflictingFeeFields);
        }
        let tx_value = omit_nulls(serde_json::to_value(tx)?);
        let params = match state_override {
            Some(ov) => serde_json::json!([tx_value, block.to_wire(), ov]),
            None => serde_json::json!([tx_value, block.to_wire()]),
        };
        self.call_typed("eth_call", params).await
    }

    pub async fn estimate_gas(&self, tx: &TxParams) -> Result<u64, ClientError> {
        if tx.has_conflicting_fee_fields() {
            return Err(ClientError::ConflictingFeeFields);
        }
        let tx_value = omit_nulls(serde_json::to_value(tx)?);
        let q: U64Quantity = self.call_typed("eth_estimateGas", serde_json::json!([tx_value])).await?;
        Ok(q.get())
    }

    pub async fn get_block_by_number_hashes(
        &self,
        block: BlockParameter,
    ) -> Result<Option<BlockData<Hash32>>, ClientError> {
        self.call_typed("eth_getBlockByNumber", serde_json::json!([block.to_wire(), false]))
            .await
    }

    pub async fn get_block_by_number_full(
        &self,
        block: BlockParameter,
    ) -> Result<Option<BlockData<TxData>>, ClientError> {
        self.call_typed("eth_getBlockByNumber", serde_json::json!([block.to_wire(), true]))
            .await
    }

    pub async fn get_block_by_hash_hashes(
        &self,
        hash: Hash32,
    ) -> Result<Option<BlockData<Hash32>>, ClientError> {
        self.call_typed("eth_getBlockByHash", serde_json::json!([hash, false])).await
    }

    pub async fn get_block_by_hash_full(
        &self,
        hash: Hash32,
    ) -> Result<Option<BlockData<TxData>>, ClientError> {
        self.call_typed("eth_getBlockByHash", serde_json::json!([hash, true])).await
    }

    pub async fn send_raw_transaction(&self, raw: &[u8]) -> Result<Hash32, ClientError> {
        let hex = format!("0x{}", hex::encode(raw));
        self.call_typed("eth_sendRawTransaction", serde_json::json!([hex])).await
    }

    pub async fn get_transaction_by_hash(&self, hash: Hash32) -> Result<Option<TxData>, ClientError> {
        self.call_typed("eth_getTransactionByHash", serde_json::json!([hash])).await
    }

    pub async fn get_transaction_receipt(&self, hash: Hash32) -> Result<Option<TxReceipt>, ClientError> {
        self.call_typed("eth_getTransactionReceipt", serde_json::json!([hash])).await
    }

    /// Polls `get_transaction_receipt` every `poll_interval` until a
    /// receipt appears or `timeout` elapses (`spec.md §4.4`).
    pub async fn wait_for_transaction_receipt(
        &self,
        hash: Hash32,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<TxReceipt, ClientError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(receipt) = self.get_transaction_receipt(hash).await? {
                return Ok(receipt);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(ClientError::Transport(TransportError::Timeout {
                    id: 0,
                    timeout_secs: timeout.as_secs(),
                }));
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    pub async fn new_filter(&self, filter: &LogFilter) -> Result<u64, ClientError> {
        let q: U64Quantity = self.call_typed("eth_newFilter", serde_json::json!([filter.to_wire()])).await?;
        Ok(q.get())
    }

    pub async fn new_block_filter(&self) -> Result<u64, ClientError> {
        let q: U64Quantity = self.call_typed("eth_newBlockFilter", Value::Array(vec![])).await?;
        Ok(q.get())
    }

    pub async fn new_pending_transaction_filter(&self) -> Result<u64, ClientError> {
        let q: U64Quantity = self
            .call_typed("eth_newPendingTransactionFilter", Value::Array(vec![]))
            .await?;
        Ok(q.get())
    }

    pub async fn uninstall_filter(&self, id: u64) -> Result<bool, ClientError> {
        self.call_typed("eth_uninstallFilter", serde_json::json!([crate::wire::to_hex_quantity(id)]))
            .await
    }

    pub async fn get_filter_changes(&self, id: u64) -> Result<FilterChanges, ClientError> {
        self.call_typed(
            "eth_getFilterChanges",
            serde_json::json!([crate::wire::to_hex_quantity(id)]),
        )
        .await
    }

    pub async fn get_filter_logs(&self, id: u64) -> Result<Vec<LogData>, ClientError> {
        self.call_typed("eth_getFilterLogs", serde_json::json!([crate::wire::to_hex_quantity(id)]))
            .await
    }

    pub async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<LogData>, ClientError> {
        self.call_typed("eth_getLogs", serde_json::json!([filter.to_wire()])).await
    }

    fn bidi(&self) -> Result<&std::sync::Arc<dyn BidirectionalTransport>, ClientError> {
        self.bidi
            .as_ref()
            .ok_or(ClientError::Transport(TransportError::NotSupported("subscribe")))
    }

    pub async fn subscribe_new_heads(&self) -> Result<NewHeadSubscription, ClientError> {
        let sub = self.bidi()?.subscribe(serde_json::json!(["newHeads"])).await?;
        Ok(NewHeadSubscription(sub))
    }

    pub async fn subscribe_syncing(&self) -> Result<SyncingSubscription, ClientError> {
        let sub = self.bidi()?.subscribe(serde_json::json!(["syncing"])).await?;
        Ok(SyncingSubscription(sub))
    }

    pub async fn subscribe_new_pending_transactions(&self) -> Result<PendingTxSubscription, ClientError> {
        let sub = self
            .bidi()?
            .subscribe(serde_json::json!(["newPendingTransactions"]))
            .await?;
        Ok(PendingTxSubscription(sub))
    }

    pub async fn subscribe_logs(
        &self,
        address: Option<Vec<Address>>,
        topics: Option<Vec<Option<Hash32>>>,
    ) -> Result<LogSubscription, ClientError> {
        let mut filter = serde_json::Map::new();
        if let Some(addrs) = address {
            filter.insert("address".to_string(), serde_json::to_value(addrs)?);
        }
        if let Some(topics) = topics {
            let wire: Vec<Value> = topics
                .into_iter()
                .map(|t| t.map(|h| serde_json::to_value(h).unwrap_or(Value::Null)).unwrap_or(Value::Null))
                .collect();
            filter.insert("topics".to_string(), Value::Array(wire));
        }
        let sub = self
            .bidi()?
            .subscribe(serde_json::json!(["logs", Value::Object(filter)]))
            .await?;
        Ok(LogSubscription(sub))
    }

    /// Convenience pipeline (`spec.md §4.4`): build selector + ABI-encoded
    /// input, invoke `eth_call`, decode outputs (single-output tuples
    /// unwrapped).
    pub async fn call_method(
        &self,
        call: &MethodCall,
        args: &[Token],
        block: BlockParameter,
    ) -> Result<Token, ClientError> {
        let to = call
            .to()
            .ok_or_else(|| ClientError::Codec(CodecError::InvalidAddress("<unbound>".into(), "MethodCall has no bound address".into())))?;
        let data = call.encode_input(args).map_err(ClientError::Codec)?;
        let tx = TxParams {
            to: Some(to),
            data: Some(format!("0x{}", hex::encode(&data))),
            ..Default::default()
        };
        let raw = self.call(&tx, block, None).await?;
        let bytes = hex::decode(raw.strip_prefix("0x").unwrap_or(&raw))
            .map_err(|e| ClientError::Codec(CodecError::InvalidQuantity(format!("eth_call result: {e}"))))?;
        call.decode_output_unwrapped(&bytes).map_err(ClientError::Codec)
    }
}

macro_rules! typed_subscription {
    ($name:ident, $payload:ty, $parse:expr) => {
        pub struct $name(Subscription);

        impl $name {
            pub fn id(&self) -> &str {
                self.0.id()
            }

            pub async fn next(&mut self) -> Option<Result<$payload, ClientError>> {
                let raw = self.0.next().await?;
                Some(($parse)(raw))
            }
        }
    };
}

fn parse_value<T: serde::de::DeserializeOwned>(raw: Value) -> Result<T, ClientError> {
    serde_json::from_value(raw).map_err(|e| ClientError::Transport(TransportError::Parse(e)))
}

typed_subscription!(NewHeadSubscription, NewHead, parse_value::<NewHead>);
typed_subscription!(SyncingSubscription, SyncingStatus, parse_value::<SyncingStatus>);
typed_subscription!(PendingTxSubscription, Hash32, parse_value::<Hash32>);
typed_subscription!(LogSubscription, LogData, parse_value::<LogData>);

/// An `EventParser` bound to a live [`LogSubscription`], yielding only
/// events the parser recognizes (`spec.md §4.5`).
pub struct LogEventSubscription {
    sub: LogSubscription,
    parser: crate::codec::EventParser,
}

impl LogEventSubscription {
    pub fn new(sub: LogSubscription, parser: crate::codec::EventParser) -> Self {
        Self { sub, parser }
    }

    pub async fn next(&mut self) -> Option<ParsedEvent> {
        loop {
            let log = match self.sub.next().await? {
                Ok(log) => log,
                Err(e) => {
                    debug!(error = %e, "failed to parse log notification, skipping");
                    continue;
                }
            };
            let parsed = self.parser.parse_all(std::slice::from_ref(&log));
            if let Some(event) = parsed.into_iter().next() {
                return Some(event);
            }
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::Transport(TransportError::Parse(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;

    /// A transport that panics if ever called — `call`/`estimate_gas` must
    /// reject conflicting fee fields before issuing any RPC request.
    struct NeverCalledTransport;

    #[async_trait::async_trait]
    impl Transport for NeverCalledTransport {
        async fn send_request(&self, _method: &str, _params: Value, _timeout: Duration) -> Result<Value, TransportError> {
            panic!("transport should not be called");
        }

        async fn close(&self) {}
    }

    fn conflicting_tx() -> TxParams {
        TxParams {
            to: Some(Address::parse("0x18c2ccd3e937bb5b1560a6f70de9bdb1340d849d").unwrap()),
            gas_price: Some(Wei::from_u64(1_000_000_000)),
            max_fee_per_gas: Some(Wei::from_u64(2_000_000_000)),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn call_rejects_conflicting_fee_fields() {
        let facade = Facade::new(std::sync::Arc::new(NeverCalledTransport), &ClientConfig::default());
        let err = facade
            .call(&conflicting_tx(), BlockParameter::Latest, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::ConflictingFeeFields));
    }

    #[tokio::test]
    async fn estimate_gas_rejects_conflicting_fee_fields() {
        let facade = Facade::new(std::sync::Arc::new(NeverCalledTransport), &ClientConfig::default());
        let err = facade.estimate_gas(&conflicting_tx()).await.unwrap_err();
        assert!(matches!(err, ClientError::ConflictingFeeFields));
    }
}
