//! Typed mirrors of JSON-RPC request/response/notification shapes
//! (`spec.md §3`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::address::Address;
use super::hash::Hash32;
use super::quantity::{to_hex_quantity, U64Quantity, Wei};
use crate::error::RpcErrorObject;

/// `{jsonrpc:"2.0", method, params, id}`
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    pub jsonrpc: &'static str,
    pub method: String,
    pub params: Value,
    pub id: u64,
}

impl Request {
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            method: method.into(),
            params,
            id,
        }
    }
}

/// `{jsonrpc:"2.0", id, result, error}`
#[derive(Debug, Clone, Deserialize)]
pub struct Response {
    #[allow(dead_code)]
    pub jsonrpc: Option<String>,
    pub id: u64,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcErrorObject>,
}

/// `{method:"eth_subscription", params:{subscription, result}}`
#[derive(Debug, Clone, Deserialize)]
pub struct Notification {
    #[allow(dead_code)]
    pub jsonrpc: Option<String>,
    pub method: String,
    pub params: NotificationParams,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationParams {
    pub subscription: String,
    pub result: Value,
}

/// A parsed inbound message: either a response to an outstanding request,
/// or a server-initiated notification.
#[derive(Debug, Clone)]
pub enum InboundMessage {
    Response(Response),
    Notification(Notification),
}

impl InboundMessage {
    /// Parses raw bytes per `spec.md §4.1`: an object with a `method` field
    /// is a notification, otherwise a response.
    pub fn parse(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_slice(bytes)?;
        if value.get("method").is_some() {
            Ok(InboundMessage::Notification(serde_json::from_value(
                value,
            )?))
        } else {
            Ok(InboundMessage::Response(serde_json::from_value(value)?))
        }
    }
}

/// `"earliest" | "latest" | "pending"` or a block height.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockParameter {
    Earliest,
    Latest,
    Pending,
    Number(u64),
}

impl BlockParameter {
    pub fn to_wire(self) -> Value {
        match self {
            BlockParameter::Earliest => Value::String("earliest".to_string()),
            BlockParameter::Latest => Value::String("latest".to_string()),
            BlockParameter::Pending => Value::String("pending".to_string()),
            BlockParameter::Number(n) => Value::String(to_hex_quantity(n)),
        }
    }
}

impl Default for BlockParameter {
    fn default() -> Self {
        BlockParameter::Latest
    }
}

/// Transaction parameters accepted by `eth_call`, `eth_estimateGas`,
/// `eth_sendRawTransaction`'s unsigned precursor, etc. (`spec.md §3`).
///
/// Integer fields are serialized as hex quantities; `None` fields are
/// omitted from the wire object entirely.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TxParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas: Option<U64Quantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "gasPrice")]
    pub gas_price: Option<Wei>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "maxFeePerGas")]
    pub max_fee_per_gas: Option<Wei>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "maxPriorityFeePerGas")]
    pub max_priority_fee_per_gas: Option<Wei>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Wei>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<U64Quantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "chainId")]
    pub chain_id: Option<U64Quantity>,
}

impl TxParams {
    /// `true` when legacy (`gasPrice`) and EIP-1559 fee fields are both set
    /// — a caller error per `spec.md §3`'s mutual-exclusivity note.
    pub fn has_conflicting_fee_fields(&self) -> bool {
        self.gas_price.is_some()
            && (self.max_fee_per_gas.is_some() || self.max_priority_fee_per_gas.is_some())
    }

    pub fn is_eip1559(&self) -> bool {
        self.max_fee_per_gas.is_some() || self.max_priority_fee_per_gas.is_some()
    }
}

/// A fully-mined transaction as returned by `eth_getTransactionByHash`.
#[derive(Debug, Clone, Deserialize)]
pub struct TxData {
    pub hash: Hash32,
    pub nonce: U64Quantity,
    #[serde(rename = "blockHash")]
    pub block_hash: Option<Hash32>,
    #[serde(rename = "blockNumber")]
    pub block_number: Option<U64Quantity>,
    #[serde(rename = "transactionIndex")]
    pub transaction_index: Option<U64Quantity>,
    pub from: Address,
    pub to: Option<Address>,
    pub value: Wei,
    #[serde(rename = "gasPrice", default)]
    pub gas_price: Option<Wei>,
    pub gas: U64Quantity,
    #[serde(default)]
    pub input: String,
}

/// A transaction receipt (`spec.md §3`).
#[derive(Debug, Clone, Deserialize)]
pub struct TxReceipt {
    #[serde(rename = "transactionHash")]
    pub transaction_hash: Hash32,
    #[serde(rename = "transactionIndex")]
    pub transaction_index: U64Quantity,
    #[serde(rename = "blockHash")]
    pub block_hash: Hash32,
    #[serde(rename = "blockNumber")]
    pub block_number: U64Quantity,
    pub from: Address,
    pub to: Option<Address>,
    #[serde(rename = "cumulativeGasUsed")]
    pub cumulative_gas_used: U64Quantity,
    #[serde(rename = "gasUsed")]
    pub gas_used: U64Quantity,
    /// Present only for contract-creation receipts.
    #[serde(rename = "contractAddress", default)]
    pub contract_address: Option<Address>,
    pub logs: Vec<LogData>,
    /// Strictly `0` or `1`.
    pub status: U64Quantity,
}

impl TxReceipt {
    pub fn succeeded(&self) -> bool {
        self.status.get() == 1
    }
}

/// An event log entry (`spec.md §3`, §4.5).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogData {
    pub address: Address,
    pub topics: Vec<Hash32>,
    pub data: String,
    #[serde(rename = "blockNumber", default)]
    pub block_number: Option<U64Quantity>,
    #[serde(rename = "transactionHash", default)]
    pub transaction_hash: Option<Hash32>,
    #[serde(rename = "transactionIndex", default)]
    pub transaction_index: Option<U64Quantity>,
    #[serde(rename = "blockHash", default)]
    pub block_hash: Option<Hash32>,
    #[serde(rename = "logIndex", default)]
    pub log_index: Option<U64Quantity>,
    #[serde(default)]
    pub removed: bool,
}

/// A block, generic over its transaction representation: [`Hash32`] when
/// fetched with `full_transactions=false`, [`TxData`] when `true`.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockData<T> {
    pub number: Option<U64Quantity>,
    pub hash: Option<Hash32>,
    #[serde(rename = "parentHash")]
    pub parent_hash: Hash32,
    pub miner: Address,
    #[serde(rename = "gasLimit")]
    pub gas_limit: U64Quantity,
    #[serde(rename = "gasUsed")]
    pub gas_used: U64Quantity,
    pub timestamp: U64Quantity,
    pub transactions: Vec<T>,
}

/// `eth_subscribe("newHeads")` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct NewHead {
    pub number: U64Quantity,
    pub hash: Hash32,
    #[serde(rename = "parentHash")]
    pub parent_hash: Hash32,
    pub miner: Address,
    #[serde(rename = "gasLimit")]
    pub gas_limit: U64Quantity,
    #[serde(rename = "gasUsed")]
    pub gas_used: U64Quantity,
    pub timestamp: U64Quantity,
}

/// `eth_syncing` result: either `false` or sync-progress details.
#[derive(Debug, Clone)]
pub enum SyncingStatus {
    NotSyncing,
    Syncing {
        starting_block: U64Quantity,
        current_block: U64Quantity,
        highest_block: U64Quantity,
    },
}

impl<'de> Deserialize<'de> for SyncingStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        if let Value::Bool(false) = value {
            return Ok(SyncingStatus::NotSyncing);
        }
        #[derive(Deserialize)]
        struct Raw {
            #[serde(rename = "startingBlock")]
            starting_block: U64Quantity,
            #[serde(rename = "currentBlock")]
            current_block: U64Quantity,
            #[serde(rename = "highestBlock")]
            highest_block: U64Quantity,
        }
        let raw: Raw = serde_json::from_value(value).map_err(serde::de::Error::custom)?;
        Ok(SyncingStatus::Syncing {
            starting_block: raw.starting_block,
            current_block: raw.current_block,
            highest_block: raw.highest_block,
        })
    }
}

/// `eth_getFilterChanges`/`eth_getFilterLogs` result shape, which depends
/// on the filter kind (block filter -> hashes, log filter -> logs).
#[derive(Debug, Clone)]
pub enum FilterChanges {
    Hashes(Vec<Hash32>),
    Logs(Vec<LogData>),
}

impl<'de> Deserialize<'de> for FilterChanges {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        let arr = value
            .as_array()
            .ok_or_else(|| serde::de::Error::custom("expected array"))?;
        if arr.first().is_some_and(Value::is_object) {
            let logs: Vec<LogData> =
                serde_json::from_value(value).map_err(serde::de::Error::custom)?;
            Ok(FilterChanges::Logs(logs))
        } else {
            let hashes: Vec<Hash32> =
                serde_json::from_value(value).map_err(serde::de::Error::custom)?;
            Ok(FilterChanges::Hashes(hashes))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tx_data_coerces_hex_fields() {
        let raw = serde_json::json!({
            "hash": "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
            "nonce": "0x15",
            "blockHash": null,
            "blockNumber": null,
            "transactionIndex": null,
            "from": "0x18C2ccD3e937bb5b1560A6f70DE9bDB1340D849d",
            "to": null,
            "value": "0xf3dbb76162000",
            "gas": "0xc350",
            "input": "0x"
        });
        let tx: TxData = serde_json::from_value(raw).unwrap();
        assert_eq!(tx.gas.get(), 50_000);
        assert_eq!(tx.nonce.get(), 21);
        assert_eq!(tx.value.to_string(), "4290000000000000");
    }

    #[test]
    fn inbound_message_distinguishes_by_method_field() {
        let resp = InboundMessage::parse(br#"{"jsonrpc":"2.0","id":1,"result":"0x1"}"#).unwrap();
        assert!(matches!(resp, InboundMessage::Response(_)));

        let notif = InboundMessage::parse(
            br#"{"jsonrpc":"2.0","method":"eth_subscription","params":{"subscription":"0xabc","result":{}}}"#,
        )
        .unwrap();
        assert!(matches!(notif, InboundMessage::Notification(_)));
    }

    #[test]
    fn syncing_status_false() {
        let s: SyncingStatus = serde_json::from_value(Value::Bool(false)).unwrap();
        assert!(matches!(s, SyncingStatus::NotSyncing));
    }
}
