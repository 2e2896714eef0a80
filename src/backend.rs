//! The pull-side capabilities the provider is built on.
//!
//! The provider never talks to a transport directly. Everything it needs from
//! the chain goes through [`Backend::perform`]: a named operation with typed
//! parameters that resolves to a raw JSON payload or fails with an opaque
//! [`BackendError`]. How a concrete backend connects (HTTP, WebSocket, IPC,
//! in-process node) is its own business.

use alloy_primitives::{Address, Bytes, B256};
use async_trait::async_trait;
use serde_json::Value;

use crate::error::BackendError;
use crate::tag::LogFilter;
use crate::types::BlockTag;

/// A single pull-style operation against the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendRequest {
    /// Current chain height.
    BlockNumber,
    /// The backend's live chain id.
    ChainId,
    BlockByNumber { tag: BlockTag },
    BlockByHash { hash: B256 },
    TransactionReceipt { hash: B256 },
    /// Logs matching `filter` over the inclusive `[from_block, to_block]`
    /// range.
    Logs { filter: LogFilter, from_block: BlockTag, to_block: BlockTag },
    /// Broadcast of an already-signed transaction payload.
    SendRawTransaction { payload: Bytes },
}

impl BackendRequest {
    /// Stable operation name, used for logging and request bookkeeping.
    pub fn operation(&self) -> &'static str {
        match self {
            Self::BlockNumber => "getBlockNumber",
            Self::ChainId => "getChainId",
            Self::BlockByNumber { .. } | Self::BlockByHash { .. } => "getBlock",
            Self::TransactionReceipt { .. } => "getTransactionReceipt",
            Self::Logs { .. } => "getLogs",
            Self::SendRawTransaction { .. } => "sendTransaction",
        }
    }
}

/// Asynchronous "perform a named operation, return a raw result or fail"
/// capability.
///
/// A `null` JSON value is meaningful: it is how backends report "no such
/// block/receipt", and the provider's ledger decides whether that means
/// absent or merely not yet indexed.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    async fn perform(&self, request: BackendRequest) -> Result<Value, BackendError>;
}

/// Name-resolution collaborator mapping human-readable names to addresses.
///
/// Only consulted while normalizing transaction and filter parameters; the
/// provider core holds no resolver state.
#[async_trait]
pub trait NameResolver: Send + Sync + 'static {
    async fn resolve_name(&self, name: &str) -> Result<Address, BackendError>;
}
