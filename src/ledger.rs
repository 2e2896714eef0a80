//! Ledger of chain positions the provider has witnessed.
//!
//! Besides the block watermark (the last height synthetic block events were
//! emitted for), the ledger remembers at which block a given transaction or
//! block hash was last seen. That memory is what lets a `null` backend
//! response be read as "not yet indexed, retry" instead of "does not exist":
//! an entry for a hash means this provider has already associated the hash
//! with a chain position.

use std::collections::HashMap;

use alloy_primitives::B256;

/// Watermark value before the first poll ever completes.
pub const NEVER_POLLED: i64 = -2;

/// Last known chain position of a witnessed hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockPosition {
    /// Known to exist, not yet block-confirmed. Never evicted by block age,
    /// and overrides the "not found" reading of a null backend response.
    Pending,
    Number(u64),
}

/// A witnessed hash, keyed by what the hash identifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeenKey {
    Transaction(B256),
    Block(B256),
}

/// Emitted-event ledger. Pure state; the provider serializes access.
#[derive(Debug)]
pub struct EmittedLedger {
    block: i64,
    seen: HashMap<SeenKey, BlockPosition>,
}

impl EmittedLedger {
    pub fn new() -> Self {
        Self { block: NEVER_POLLED, seen: HashMap::new() }
    }

    /// The block watermark: last height for which synthetic block events were
    /// emitted, or [`NEVER_POLLED`].
    pub fn block(&self) -> i64 {
        self.block
    }

    pub fn set_block(&mut self, block: i64) {
        self.block = block;
    }

    pub fn get(&self, key: &SeenKey) -> Option<BlockPosition> {
        self.seen.get(key).copied()
    }

    pub fn insert(&mut self, key: SeenKey, position: BlockPosition) {
        self.seen.insert(key, position);
    }

    /// Evicts every entry recorded more than `max_age` blocks behind
    /// `current_block`. Pending entries are exempt.
    pub fn sweep(&mut self, current_block: u64, max_age: u64) {
        self.seen.retain(|_, position| match position {
            BlockPosition::Pending => true,
            BlockPosition::Number(number) => current_block.saturating_sub(*number) <= max_age,
        });
    }

    /// Forgets everything, including the watermark. Used when the backend's
    /// network identity changes under a dynamic provider.
    pub fn reset(&mut self) {
        self.block = NEVER_POLLED;
        self.seen.clear();
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.seen.len()
    }
}
