//! Async client for Ethereum-family JSON-RPC nodes.
//!
//! This crate provides a multiplexed transport layer, a typed RPC facade,
//! an ABI/event codec, and a nonce-aware transaction signer for talking to
//! any Ethereum-family JSON-RPC endpoint (HTTP, WebSocket, or a local IPC
//! socket).
//!
//! # Overview
//!
//! - [`transport`] — the Transport Multiplexer: one-shot HTTP requests via
//!   [`transport::HttpTransport`], and a shared request/response/
//!   subscription demultiplexer ([`transport::Multiplexer`]) over any
//!   byte-frame connection ([`transport::FrameConnection`]), with concrete
//!   WebSocket ([`transport::WebSocketConnection`]) and IPC
//!   ([`transport::IpcConnection`]) frame sources.
//! - [`facade`] — [`facade::Facade`], a thin typed wrapper over a transport:
//!   one method per JSON-RPC call, plus subscription helpers when the
//!   underlying transport is bidirectional.
//! - [`codec`] — keccak selector/event-signature derivation and dynamic ABI
//!   encode/decode ([`codec::MethodCall`]) and event-log parsing
//!   ([`codec::EventParser`]).
//! - [`signer`] — [`signer::Transaction`] (default-fill, sign, submit, wait)
//!   and [`signer::Signer`], the nonce controller that allocates gap-free
//!   nonces across concurrent submissions and distinguishes a mined
//!   transaction from a dropped one.
//! - [`wire`] — the typed mirror of the wire schema: addresses, hex
//!   quantities, transaction/receipt/block/log shapes.
//! - [`config`] — [`config::ClientConfig`], the library's own timeout/poll/
//!   gas-multiplier knobs.
//! - [`error`] — the `thiserror`-derived error taxonomy
//!   ([`error::TransportError`], [`error::CodecError`],
//!   [`error::SignerError`], [`error::ClientError`]).
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use ethrpc_client::config::ClientConfig;
//! use ethrpc_client::facade::Facade;
//! use ethrpc_client::transport::HttpTransport;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = Arc::new(HttpTransport::new("https://rpc.example".parse()?));
//! let facade = Facade::new(transport, &ClientConfig::default());
//! let block_number = facade.block_number().await?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod facade;
pub mod signer;
pub mod transport;
pub mod wire;
