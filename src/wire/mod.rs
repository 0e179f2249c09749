//! Typed wire schema (`spec.md §3`): request/response envelopes, addresses,
//! hex quantities, transaction/receipt/block/log shapes.

pub mod address;
pub mod hash;
pub mod quantity;
pub mod types;

pub use address::Address;
pub use hash::Hash32;
pub use quantity::{to_hex_quantity, U64Quantity, Wei};
pub use types::{
    BlockData, BlockParameter, FilterChanges, InboundMessage, LogData, NewHead, Notification,
    NotificationParams, Request, Response, SyncingStatus, TxData, TxParams, TxReceipt,
};
