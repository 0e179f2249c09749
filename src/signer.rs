//! Transaction Builder and Signer / Nonce Controller (`spec.md §4.6`, §4.7).
//! Nonce allocation and pending-set bookkeeping are grounded in
//! `chain/eip155/pending_nonce_manager.rs`'s `DashMap`/`Mutex`-guarded
//! per-address nonce cache, generalized here to gap-free allocation over an
//! ordered pending set instead of a bare counter.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::{FailedTransaction, SignerError};
use crate::facade::Facade;
use crate::wire::{Address, BlockParameter, Hash32, TxParams, TxReceipt, U64Quantity, Wei};

/// An external ECDSA signing primitive, injected so the crate doesn't
/// hardcode a signing backend (`spec.md §6` "Configuration for the
/// external signer"). Implementations sign a pre-computed 32-byte
/// transaction signing hash and return the raw `r || s || recovery_id`
/// (65-byte) recoverable signature.
#[async_trait]
pub trait EcdsaSigner: Send + Sync {
    fn address(&self) -> Address;
    async fn sign_hash(&self, hash: [u8; 32]) -> Result<[u8; 65], SignerError>;
}

/// Default [`EcdsaSigner`] backed by `alloy-signer-local`'s
/// `PrivateKeySigner`, matching the teacher's own signer dependency
/// (`alloy-signer`, `alloy-signer-local`).
pub struct PrivateKeySignerAdapter {
    inner: alloy_signer_local::PrivateKeySigner,
    address: Address,
}

impl PrivateKeySignerAdapter {
    pub fn new(inner: alloy_signer_local::PrivateKeySigner) -> Self {
        use alloy_signer::Signer as _;
        let address = Address::from(inner.address());
        Self { inner, address }
    }
}

#[async_trait]
impl EcdsaSigner for PrivateKeySignerAdapter {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign_hash(&self, hash: [u8; 32]) -> Result<[u8; 65], SignerError> {
        use alloy_signer::Signer as _;
        let signature = self
            .inner
            .sign_hash(&alloy_primitives::B256::from(hash))
            .await
            .map_err(|e| SignerError::Signing(e.to_string()))?;
        Ok(signature.as_bytes())
    }
}

/// Minimal recursive-length-prefix encoder, just enough to build legacy
/// (EIP-155) and EIP-1559 transaction payloads for signing and submission.
/// Self-contained rather than pulled from a crate: the encoding rules are
/// small, fixed, and easy to get right without depending on an external
/// API surface this crate can't verify against.
mod rlp {
    pub fn encode_bytes(data: &[u8]) -> Vec<u8> {
        if data.len() == 1 && data[0] < 0x80 {
            vec![data[0]]
        } else {
            let mut out = encode_length(data.len(), 0x80);
            out.extend_from_slice(data);
            out
        }
    }

    pub fn encode_u64(v: u64) -> Vec<u8> {
        if v == 0 {
            return encode_bytes(&[]);
        }
        let bytes = v.to_be_bytes();
        let first_nonzero = bytes.iter().position(|&b| b != 0).unwrap_or(7);
        encode_bytes(&bytes[first_nonzero..])
    }

    pub fn encode_u256(v: alloy_primitives::U256) -> Vec<u8> {
        let bytes = v.to_be_bytes::<32>();
        match bytes.iter().position(|&b| b != 0) {
            Some(i) => encode_bytes(&bytes[i..]),
            None => encode_bytes(&[]),
        }
    }

    pub fn encode_list(items: &[Vec<u8>]) -> Vec<u8> {
        let payload: Vec<u8> = items.concat();
        let mut out = encode_length(payload.len(), 0xc0);
        out.extend(payload);
        out
    }

    fn encode_length(len: usize, offset: u8) -> Vec<u8> {
        if len < 56 {
            vec![offset + len as u8]
        } else {
            let len_bytes = encode_usize_be(len);
            let mut out = vec![offset + 55 + len_bytes.len() as u8];
            out.extend(len_bytes);
            out
        }
    }

    fn encode_usize_be(mut len: usize) -> Vec<u8> {
        let mut bytes = Vec::new();
        while len > 0 {
            bytes.push((len & 0xff) as u8);
            len >>= 8;
        }
        bytes.reverse();
        bytes
    }
}

fn decode_data_field(tx: &TxParams) -> Vec<u8> {
    match &tx.data {
        Some(d) => hex::decode(d.strip_prefix("0x").unwrap_or(d)).unwrap_or_default(),
        None => Vec::new(),
    }
}

fn to_field(tx: &TxParams) -> Vec<u8> {
    match tx.to {
        Some(addr) => rlp::encode_bytes(addr.as_bytes()),
        None => rlp::encode_bytes(&[]),
    }
}

/// Builds the EIP-155 signing payload and keccak of a legacy transaction.
fn legacy_signing_hash(tx: &TxParams, chain_id: u64) -> alloy_primitives::B256 {
    let fields = vec![
        rlp::encode_u64(tx.nonce.map(|q| q.get()).unwrap_or(0)),
        rlp::encode_u256(tx.gas_price.map(|w| w.as_u256()).unwrap_or_default()),
        rlp::encode_u64(tx.gas.map(|q| q.get()).unwrap_or(0)),
        to_field(tx),
        rlp::encode_u256(tx.value.map(|w| w.as_u256()).unwrap_or_default()),
        rlp::encode_bytes(&decode_data_field(tx)),
        rlp::encode_u64(chain_id),
        rlp::encode_bytes(&[]),
        rlp::encode_bytes(&[]),
    ];
    alloy_primitives::keccak256(rlp::encode_list(&fields))
}

fn legacy_signed_bytes(tx: &TxParams, chain_id: u64, sig: [u8; 65]) -> Vec<u8> {
    let recid = sig[64];
    let v = chain_id * 2 + 35 + recid as u64;
    let fields = vec![
        rlp::encode_u64(tx.nonce.map(|q| q.get()).unwrap_or(0)),
        rlp::encode_u256(tx.gas_price.map(|w| w.as_u256()).unwrap_or_default()),
        rlp::encode_u64(tx.gas.map(|q| q.get()).unwrap_or(0)),
        to_field(tx),
        rlp::encode_u256(tx.value.map(|w| w.as_u256()).unwrap_or_default()),
        rlp::encode_bytes(&decode_data_field(tx)),
        rlp::encode_u64(v),
        rlp::encode_bytes(&sig[0..32]),
        rlp::encode_bytes(&sig[32..64]),
    ];
    rlp::encode_list(&fields)
}

/// Builds the EIP-1559 (type `0x02`) signing payload and keccak.
fn eip1559_signing_hash(tx: &TxParams, chain_id: u64) -> alloy_primitives::B256 {
    let fields = vec![
        rlp::encode_u64(chain_id),
        rlp::encode_u64(tx.nonce.map(|q| q.get()).unwrap_or(0)),
        rlp::encode_u256(tx.max_priority_fee_per_gas.map(|w| w.as_u256()).unwrap_or_default()),
        rlp::encode_u256(tx.max_fee_per_gas.map(|w| w.as_u256()).unwrap_or_default()),
        rlp::encode_u64(tx.gas.map(|q| q.get()).unwrap_or(0)),
        to_field(tx),
        rlp::encode_u256(tx.value.map(|w| w.as_u256()).unwrap_or_default()),
        rlp::encode_bytes(&decode_data_field(tx)),
        rlp::encode_list(&[]), // empty access list
    ];
    let mut payload = vec![0x02u8];
    payload.extend(rlp::encode_list(&fields));
    alloy_primitives::keccak256(payload)
}

fn eip1559_signed_bytes(tx: &TxParams, chain_id: u64, sig: [u8; 65]) -> Vec<u8> {
    let y_parity = sig[64];
    let fields = vec![
        rlp::encode_u64(chain_id),
        rlp::encode_u64(tx.nonce.map(|q| q.get()).unwrap_or(0)),
        rlp::encode_u256(tx.max_priority_fee_per_gas.map(|w| w.as_u256()).unwrap_or_default()),
        rlp::encode_u256(tx.max_fee_per_gas.map(|w| w.as_u256()).unwrap_or_default()),
        rlp::encode_u64(tx.gas.map(|q| q.get()).unwrap_or(0)),
        to_field(tx),
        rlp::encode_u256(tx.value.map(|w| w.as_u256()).unwrap_or_default()),
        rlp::encode_bytes(&decode_data_field(tx)),
        rlp::encode_list(&[]),
        rlp::encode_u64(y_parity as u64),
        rlp::encode_bytes(&sig[0..32]),
        rlp::encode_bytes(&sig[32..64]),
    ];
    let mut out = vec![0x02u8];
    out.extend(rlp::encode_list(&fields));
    out
}

/// Per-transaction state machine (`spec.md §4.7`). Terminal states are
/// `Mined`, `Dropped`, `TimedOut`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Unsigned,
    Signed,
    Submitted,
    Mined,
    Dropped,
    TimedOut,
}

/// Holds a mutable [`TxParams`], an optional signed envelope, an optional
/// submitted hash, and an optional receipt (`spec.md §4.6`).
#[derive(Debug, Clone)]
pub struct Transaction {
    pub params: TxParams,
    signed_raw: Option<Vec<u8>>,
    tx_hash: Option<Hash32>,
    receipt: Option<TxReceipt>,
    state: TxState,
}

impl Transaction {
    pub fn new(params: TxParams) -> Self {
        Self {
            params,
            signed_raw: None,
            tx_hash: None,
            receipt: None,
            state: TxState::Unsigned,
        }
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    pub fn tx_hash(&self) -> Option<Hash32> {
        self.tx_hash
    }

    pub fn receipt(&self) -> Option<&TxReceipt> {
        self.receipt.as_ref()
    }

    fn snapshot(&self) -> FailedTransaction {
        FailedTransaction {
            nonce: self.params.nonce.map(|q| q.get()).unwrap_or(0),
            params: self.params.clone(),
            tx_hash: self.tx_hash,
        }
    }

    /// Fills any missing fields in parallel, then invokes the external
    /// ECDSA signer on the populated envelope (`spec.md §4.6`). The four
    /// default-fillers (`from`, `chainId`, `gas`, `gasPrice`) touch
    /// disjoint fields and run concurrently by construction.
    pub async fn sign(
        &mut self,
        facade: &Facade,
        signer: &dyn EcdsaSigner,
        gas_overhead_multiplier: f64,
    ) -> Result<(), SignerError> {
        if self.params.has_conflicting_fee_fields() {
            return Err(SignerError::ConflictingFeeFields);
        }

        let from = self.params.from.unwrap_or_else(|| signer.address());
        self.params.from = Some(from);

        let (chain_id, gas, gas_price): (
            Result<u64, SignerError>,
            Result<u64, SignerError>,
            Result<Option<Wei>, SignerError>,
        ) = tokio::join!(
            async {
                match self.params.chain_id {
                    Some(c) => Ok(c.get()),
                    None => facade.chain_id().await.map_err(SignerError::from),
                }
            },
            async {
                match self.params.gas {
                    Some(g) => Ok(g.get()),
                    None => {
                        let estimate = facade.estimate_gas(&self.params).await?;
                        Ok((estimate as f64 * gas_overhead_multiplier).ceil() as u64)
                    }
                }
            },
            async {
                if self.params.gas_price.is_some() || self.params.is_eip1559() {
                    Ok(self.params.gas_price)
                } else {
                    let price = facade.gas_price().await?;
                    Ok(Some(price))
                }
            },
        );
        let chain_id = chain_id?;
        self.params.chain_id = Some(U64Quantity::new(chain_id));
        self.params.gas = Some(U64Quantity::new(gas?));
        if !self.params.is_eip1559() {
            self.params.gas_price = gas_price?;
        }

        let is_eip1559 = self.params.is_eip1559();
        let hash = if is_eip1559 {
            eip1559_signing_hash(&self.params, chain_id)
        } else {
            legacy_signing_hash(&self.params, chain_id)
        };
        let sig = signer.sign_hash(hash.0).await?;
        let raw = if is_eip1559 {
            eip1559_signed_bytes(&self.params, chain_id, sig)
        } else {
            legacy_signed_bytes(&self.params, chain_id, sig)
        };
        self.signed_raw = Some(raw);
        self.state = TxState::Signed;
        Ok(())
    }

    /// Submits the signed envelope via `eth_sendRawTransaction`.
    pub async fn send(&mut self, facade: &Facade) -> Result<Hash32, SignerError> {
        let raw = self
            .signed_raw
            .as_ref()
            .ok_or(SignerError::MissingField("signed_raw"))?;
        let hash = facade.send_raw_transaction(raw).await?;
        self.tx_hash = Some(hash);
        self.state = TxState::Submitted;
        Ok(hash)
    }

    /// Polls `eth_getTransactionReceipt` under a hard wall-clock timeout
    /// (`spec.md §4.6`, default 120s via [`ClientConfig::wait_timeout`]).
    pub async fn wait(
        &mut self,
        facade: &Facade,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<TxReceipt, SignerError> {
        let hash = self.tx_hash.ok_or(SignerError::MissingField("tx_hash"))?;
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(receipt) = facade.get_transaction_receipt(hash).await? {
                self.receipt = Some(receipt.clone());
                self.state = TxState::Mined;
                return Ok(receipt);
            }
            if tokio::time::Instant::now() >= deadline {
                self.state = TxState::TimedOut;
                return Err(SignerError::WaitTimeout {
                    tx: Box::new(self.snapshot()),
                    waited_secs: timeout.as_secs(),
                });
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}

struct PendingRecord {
    tx: Transaction,
}

/// Tracks `_mined_transaction_count` and `_pending_transactions`, both
/// touched by `send_transaction` and concurrent `wait_for_transaction`
/// calls (`spec.md §5`).
struct NonceState {
    mined_count: u64,
    pending: BTreeMap<u64, PendingRecord>,
}

/// A submitted transaction handed back to the caller to await mining.
#[derive(Debug, Clone, Copy)]
pub struct PendingTransaction {
    pub nonce: u64,
    pub tx_hash: Hash32,
}

/// Signer / Nonce Controller (`spec.md §4.7`): issues gap-free nonces
/// across concurrent submissions, tracks pending transactions, and
/// detects receipts vs. skipped nonces.
pub struct Signer {
    facade: Arc<Facade>,
    signer: Arc<dyn EcdsaSigner>,
    config: ClientConfig,
    state: tokio::sync::Mutex<NonceState>,
    /// Serializes the entire nonce-allocation + sign + submit critical
    /// section (`_send_transaction_lock`).
    send_lock: tokio::sync::Mutex<()>,
}

impl Signer {
    pub fn new(facade: Arc<Facade>, signer: Arc<dyn EcdsaSigner>, config: ClientConfig) -> Self {
        Self {
            facade,
            signer,
            config,
            state: tokio::sync::Mutex::new(NonceState {
                mined_count: 0,
                pending: BTreeMap::new(),
            }),
            send_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// `_allocate_next_nonce` (`spec.md §4.7`). Gap-free: when no
    /// transactions are pending, refreshes from the node; otherwise takes
    /// `max(mined_count, max(pending_nonces) + 1)`.
    async fn allocate_next_nonce(&self, state: &mut NonceState) -> Result<u64, SignerError> {
        if state.pending.is_empty() {
            let count = self
                .facade
                .transaction_count(self.signer.address(), BlockParameter::Latest)
                .await?;
            state.mined_count = count;
            Ok(count)
        } else {
            let max_pending_plus_one = state.pending.keys().next_back().map(|n| n + 1).unwrap_or(0);
            Ok(state.mined_count.max(max_pending_plus_one))
        }
    }

    /// `send_transaction(tx, gas_limit?, gas_price?)` (`spec.md §4.7`).
    /// Any transport/protocol failure inside the critical section surfaces
    /// as *failed to send*; the pending set is not updated in that case.
    pub async fn send_transaction(
        &self,
        mut tx: Transaction,
        gas_limit: Option<u64>,
        gas_price: Option<Wei>,
    ) -> Result<PendingTransaction, SignerError> {
        if let Some(g) = gas_limit {
            tx.params.gas = Some(U64Quantity::new(g));
        }
        if let Some(p) = gas_price {
            tx.params.gas_price = Some(p);
        }

        let _send_guard = self.send_lock.lock().await;
        let mut state = self.state.lock().await;
        let nonce = self.allocate_next_nonce(&mut state).await?;
        drop(state);

        tx.params.nonce = Some(U64Quantity::new(nonce));

        tx.sign(&self.facade, self.signer.as_ref(), self.config.gas_overhead_multiplier)
            .await
            .map_err(|e| match e {
                SignerError::Transport(t) => SignerError::Send {
                    tx: Box::new(tx.snapshot()),
                    source: t,
                },
                other => other,
            })?;
        let hash = tx.send(&self.facade).await.map_err(|e| match e {
            SignerError::Transport(t) => SignerError::Send {
                tx: Box::new(tx.snapshot()),
                source: t,
            },
            other => other,
        })?;

        let mut state = self.state.lock().await;
        state.pending.insert(nonce, PendingRecord { tx });
        drop(state);

        Ok(PendingTransaction { nonce, tx_hash: hash })
    }

    /// `wait_for_transaction(tx, deadline?)` (`spec.md §4.7`). Removes the
    /// pending entry on every exit path.
    pub async fn wait_for_transaction(
        &self,
        nonce: u64,
        timeout: Duration,
    ) -> Result<TxReceipt, SignerError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match self
                .facade
                .transaction_count(self.signer.address(), BlockParameter::Latest)
                .await
            {
                Ok(count) => {
                    let mut state = self.state.lock().await;
                    state.mined_count = state.mined_count.max(count);
                }
                Err(e) => {
                    warn!(error = %e, "failed to refresh mined transaction count, tolerating");
                }
            }

            let (tx_hash, nonce_has_passed) = {
                let state = self.state.lock().await;
                let tx_hash = state.pending.get(&nonce).and_then(|r| r.tx.tx_hash());
                (tx_hash, nonce < state.mined_count)
            };

            let receipt = match tx_hash {
                Some(hash) => match self.facade.get_transaction_receipt(hash).await {
                    Ok(r) => r,
                    Err(e) => {
                        debug!(error = %e, nonce, "failed to check receipt, tolerating");
                        None
                    }
                },
                None => None,
            };

            if let Some(receipt) = receipt {
                let mut state = self.state.lock().await;
                state.mined_count = state.mined_count.max(nonce + 1);
                state.pending.remove(&nonce);
                return Ok(receipt);
            }

            if nonce_has_passed {
                let mut state = self.state.lock().await;
                let snapshot = state
                    .pending
                    .remove(&nonce)
                    .map(|r| r.tx.snapshot())
                    .unwrap_or(FailedTransaction { nonce, params: TxParams::default(), tx_hash: None });
                return Err(SignerError::Dropped { tx: Box::new(snapshot) });
            }

            if tokio::time::Instant::now() >= deadline {
                let mut state = self.state.lock().await;
                let snapshot = state
                    .pending
                    .remove(&nonce)
                    .map(|r| r.tx.snapshot())
                    .unwrap_or(FailedTransaction { nonce, params: TxParams::default(), tx_hash: None });
                return Err(SignerError::WaitTimeout {
                    tx: Box::new(snapshot),
                    waited_secs: timeout.as_secs(),
                });
            }

            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Sends each transaction in submission order (each under the lock in
    /// turn), then waits for all of them with a common deadline
    /// (`spec.md §4.7`). Guarantees in-order nonce assignment; no
    /// guarantees on mined order.
    pub async fn send_in_order_and_wait(
        &self,
        txs: Vec<Transaction>,
        timeout: Duration,
    ) -> Vec<Result<TxReceipt, SignerError>> {
        let mut pending = Vec::with_capacity(txs.len());
        for tx in txs {
            match self.send_transaction(tx, None, None).await {
                Ok(p) => pending.push(Ok(p.nonce)),
                Err(e) => pending.push(Err(e)),
            }
        }

        let waits = pending.into_iter().map(|p| async move {
            match p {
                Ok(nonce) => self.wait_for_transaction(nonce, timeout).await,
                Err(e) => Err(e),
            }
        });
        futures_util::future::join_all(waits).await
    }
}
