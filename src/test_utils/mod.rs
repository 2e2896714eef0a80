//! Test helpers: a scriptable in-memory backend and event-stream assertion
//! macros.

mod macros;

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use alloy_primitives::{hex, keccak256, Address, B256};
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::backend::{Backend, BackendRequest};
use crate::error::BackendError;
use crate::types::BlockTag;

/// In-memory backend whose responses are scripted by the test.
///
/// Every handle clones share state, so a test can keep one handle to mutate
/// the scripted chain while the provider polls through another.
#[derive(Clone)]
pub struct MockBackend {
    state: Arc<Mutex<State>>,
}

#[derive(Default)]
struct State {
    chain_id: u64,
    block_number: u64,
    block_number_calls: usize,
    block_number_failures: usize,
    block_number_delay: Option<Duration>,
    receipts: HashMap<B256, Value>,
    log_batches: VecDeque<Value>,
    blocks_by_number: HashMap<u64, Value>,
    blocks_by_hash: HashMap<B256, Value>,
    send_result: Option<Value>,
    operations: Vec<String>,
}

impl MockBackend {
    pub fn new(chain_id: u64, block_number: u64) -> Self {
        let state = State { chain_id, block_number, ..State::default() };
        Self { state: Arc::new(Mutex::new(state)) }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_block_number(&self, number: u64) {
        self.lock().block_number = number;
    }

    pub fn set_chain_id(&self, chain_id: u64) {
        self.lock().chain_id = chain_id;
    }

    /// Number of `getBlockNumber` operations the backend has seen.
    pub fn block_number_calls(&self) -> usize {
        self.lock().block_number_calls
    }

    /// Fails the next `times` block-number queries.
    pub fn fail_block_number(&self, times: usize) {
        self.lock().block_number_failures = times;
    }

    /// Delays every block-number query, to widen in-flight windows.
    pub fn delay_block_number(&self, delay: Duration) {
        self.lock().block_number_delay = Some(delay);
    }

    pub fn add_receipt(&self, hash: B256, receipt: Value) {
        self.lock().receipts.insert(hash, receipt);
    }

    pub fn remove_receipt(&self, hash: B256) {
        self.lock().receipts.remove(&hash);
    }

    /// Queues one `getLogs` response; each query consumes one batch, and an
    /// empty array is served once the queue runs dry.
    pub fn push_logs(&self, batch: Value) {
        self.lock().log_batches.push_back(batch);
    }

    pub fn add_block(&self, number: u64, hash: B256, block: Value) {
        let mut state = self.lock();
        state.blocks_by_number.insert(number, block.clone());
        state.blocks_by_hash.insert(hash, block);
    }

    /// Overrides the hash reported for the next submitted transaction. By
    /// default the backend reports the keccak digest of the payload.
    pub fn set_send_result(&self, value: Value) {
        self.lock().send_result = Some(value);
    }

    /// Operation names in the order the backend served them.
    pub fn operations(&self) -> Vec<String> {
        self.lock().operations.clone()
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn perform(&self, request: BackendRequest) -> Result<Value, BackendError> {
        let delay = {
            let mut state = self.lock();
            state.operations.push(request.operation().to_owned());
            if matches!(request, BackendRequest::BlockNumber) {
                state.block_number_calls += 1;
                state.block_number_delay
            } else {
                None
            }
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.lock();
        match request {
            BackendRequest::BlockNumber => {
                if state.block_number_failures > 0 {
                    state.block_number_failures -= 1;
                    return Err(BackendError::new("scripted block number failure"));
                }
                Ok(json!(format!("{:#x}", state.block_number)))
            }
            BackendRequest::ChainId => Ok(json!(format!("{:#x}", state.chain_id))),
            BackendRequest::TransactionReceipt { hash } => {
                Ok(state.receipts.get(&hash).cloned().unwrap_or(Value::Null))
            }
            BackendRequest::Logs { .. } => {
                Ok(state.log_batches.pop_front().unwrap_or_else(|| json!([])))
            }
            BackendRequest::BlockByNumber { tag } => {
                let number = match tag {
                    BlockTag::Number(number) => number,
                    BlockTag::Latest => state.block_number,
                    BlockTag::Earliest => 0,
                    BlockTag::Pending => state.block_number,
                };
                Ok(state.blocks_by_number.get(&number).cloned().unwrap_or(Value::Null))
            }
            BackendRequest::BlockByHash { hash } => {
                Ok(state.blocks_by_hash.get(&hash).cloned().unwrap_or(Value::Null))
            }
            BackendRequest::SendRawTransaction { payload } => Ok(state
                .send_result
                .take()
                .unwrap_or_else(|| json!(hex::encode_prefixed(keccak256(&payload))))),
        }
    }
}

/// A minimal mined-receipt payload.
pub fn receipt_json(hash: B256, block_number: u64) -> Value {
    json!({
        "transactionHash": hash,
        "blockNumber": format!("{block_number:#x}"),
        "blockHash": B256::repeat_byte(0xbb),
        "transactionIndex": "0x0",
        "from": Address::repeat_byte(0x11),
        "status": "0x1",
    })
}

/// A receipt that has been seen by the backend but not mined yet.
pub fn unmined_receipt_json(hash: B256) -> Value {
    json!({
        "transactionHash": hash,
        "from": Address::repeat_byte(0x11),
    })
}

/// A minimal log payload.
pub fn log_json(
    address: Address,
    topic: B256,
    block_number: u64,
    block_hash: B256,
    transaction_hash: B256,
    log_index: u64,
) -> Value {
    json!({
        "address": address,
        "topics": [topic],
        "data": "0x",
        "blockNumber": format!("{block_number:#x}"),
        "blockHash": block_hash,
        "transactionHash": transaction_hash,
        "transactionIndex": "0x0",
        "logIndex": format!("{log_index:#x}"),
    })
}

/// A minimal block payload.
pub fn block_json(number: u64, hash: B256, parent_hash: B256) -> Value {
    json!({
        "hash": hash,
        "parentHash": parent_hash,
        "number": format!("{number:#x}"),
        "timestamp": "0x64",
        "transactions": [],
    })
}
