//! Decoding of raw backend payloads into typed values.
//!
//! A [`Formatter`] instance is handed to the provider at construction; there
//! is no process-wide default. The provider surfaces formatter failures
//! unchanged.

use alloy_primitives::{hex, B256, U64};
use serde_json::Value;

use crate::types::{Block, Log, TransactionReceipt};
use crate::ProviderError;

/// Turns raw RPC payloads into typed blocks, receipts, logs, quantities and
/// hashes.
pub trait Formatter: Send + Sync + 'static {
    /// Decodes a hex quantity (`"0x1a"`) or plain integer.
    fn quantity(&self, raw: &Value) -> Result<u64, ProviderError>;

    /// Decodes and validates a 32-byte hash.
    fn hash(&self, raw: &Value) -> Result<B256, ProviderError>;

    fn block(&self, raw: Value) -> Result<Block, ProviderError>;

    fn receipt(&self, raw: Value) -> Result<TransactionReceipt, ProviderError>;

    fn log(&self, raw: Value) -> Result<Log, ProviderError>;

    /// Decodes an array of logs. The default implementation delegates to
    /// [`Formatter::log`] per element.
    fn logs(&self, raw: Value) -> Result<Vec<Log>, ProviderError> {
        match raw {
            Value::Null => Ok(Vec::new()),
            Value::Array(entries) => entries.into_iter().map(|entry| self.log(entry)).collect(),
            other => Err(ProviderError::InvalidResponse(format!(
                "expected a log array, got: {other}"
            ))),
        }
    }
}

/// Serde-backed formatter for JSON-RPC shaped payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormatter;

impl JsonFormatter {
    pub fn new() -> Self {
        Self
    }

    fn decode<T: serde::de::DeserializeOwned>(
        raw: Value,
        what: &'static str,
    ) -> Result<T, ProviderError> {
        serde_json::from_value(raw)
            .map_err(|err| ProviderError::InvalidResponse(format!("malformed {what}: {err}")))
    }
}

impl Formatter for JsonFormatter {
    fn quantity(&self, raw: &Value) -> Result<u64, ProviderError> {
        match raw {
            Value::String(quantity) => U64::from_str_radix(
                quantity.strip_prefix("0x").unwrap_or(quantity),
                16,
            )
            .map(|value| value.to::<u64>())
            .map_err(|_| ProviderError::InvalidResponse(format!("malformed quantity: {quantity:?}"))),
            Value::Number(number) => number
                .as_u64()
                .ok_or_else(|| ProviderError::InvalidResponse(format!("malformed quantity: {number}"))),
            other => {
                Err(ProviderError::InvalidResponse(format!("malformed quantity: {other}")))
            }
        }
    }

    fn hash(&self, raw: &Value) -> Result<B256, ProviderError> {
        let Value::String(hash) = raw else {
            return Err(ProviderError::InvalidResponse(format!("malformed hash: {raw}")));
        };
        let bytes = hex::decode(hash)
            .map_err(|_| ProviderError::InvalidResponse(format!("malformed hash: {hash:?}")))?;
        if bytes.len() != 32 {
            return Err(ProviderError::InvalidResponse(format!(
                "hash must be 32 bytes, got {}",
                bytes.len()
            )));
        }
        Ok(B256::from_slice(&bytes))
    }

    fn block(&self, raw: Value) -> Result<Block, ProviderError> {
        Self::decode(raw, "block")
    }

    fn receipt(&self, raw: Value) -> Result<TransactionReceipt, ProviderError> {
        Self::decode(raw, "transaction receipt")
    }

    fn log(&self, raw: Value) -> Result<Log, ProviderError> {
        Self::decode(raw, "log")
    }
}
