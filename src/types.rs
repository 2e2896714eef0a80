use std::fmt;

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

use crate::tag::TopicPosition;

/// A resolved network identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub name: String,
    pub chain_id: u64,
}

impl Network {
    pub fn new(name: impl Into<String>, chain_id: u64) -> Self {
        Self { name: name.into(), chain_id }
    }

    /// Builds an identity from a bare chain id, naming the handful of
    /// well-known chains and falling back to `"unknown"` for the rest.
    pub fn from_chain_id(chain_id: u64) -> Self {
        let name = match chain_id {
            1 => "mainnet",
            10 => "optimism",
            100 => "gnosis",
            137 => "polygon",
            8453 => "base",
            42161 => "arbitrum",
            11155111 => "sepolia",
            _ => "unknown",
        };
        Self::new(name, chain_id)
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (chain {})", self.name, self.chain_id)
    }
}

/// A block height reference understood by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTag {
    Latest,
    Earliest,
    Pending,
    Number(u64),
}

impl fmt::Display for BlockTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest => f.write_str("latest"),
            Self::Earliest => f.write_str("earliest"),
            Self::Pending => f.write_str("pending"),
            Self::Number(number) => write!(f, "{number:#x}"),
        }
    }
}

impl From<u64> for BlockTag {
    fn from(number: u64) -> Self {
        Self::Number(number)
    }
}

/// Selects a single block, either by height or by hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockSelector {
    Tag(BlockTag),
    Hash(B256),
}

impl From<BlockTag> for BlockSelector {
    fn from(tag: BlockTag) -> Self {
        Self::Tag(tag)
    }
}

impl From<u64> for BlockSelector {
    fn from(number: u64) -> Self {
        Self::Tag(BlockTag::Number(number))
    }
}

impl From<B256> for BlockSelector {
    fn from(hash: B256) -> Self {
        Self::Hash(hash)
    }
}

/// An address parameter that may still need name resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressInput {
    Address(Address),
    Name(String),
}

impl From<Address> for AddressInput {
    fn from(address: Address) -> Self {
        Self::Address(address)
    }
}

impl From<&str> for AddressInput {
    fn from(name: &str) -> Self {
        Self::Name(name.to_owned())
    }
}

/// A block header summary as decoded by the formatter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub hash: B256,
    pub parent_hash: B256,
    #[serde(with = "hex_u64")]
    pub number: u64,
    #[serde(with = "hex_u64")]
    pub timestamp: u64,
    #[serde(default, with = "hex_u64_opt")]
    pub gas_limit: Option<u64>,
    #[serde(default, with = "hex_u64_opt")]
    pub gas_used: Option<u64>,
    /// Hashes of the transactions included in the block.
    #[serde(default)]
    pub transactions: Vec<B256>,
}

/// A mined (or still pending) transaction receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: B256,
    /// `None` while the transaction has been seen but not yet included in a
    /// block.
    #[serde(default, with = "hex_u64_opt")]
    pub block_number: Option<u64>,
    #[serde(default)]
    pub block_hash: Option<B256>,
    #[serde(default, with = "hex_u64_opt")]
    pub transaction_index: Option<u64>,
    pub from: Address,
    #[serde(default)]
    pub to: Option<Address>,
    #[serde(default)]
    pub contract_address: Option<Address>,
    #[serde(default)]
    pub gas_used: Option<U256>,
    #[serde(default)]
    pub cumulative_gas_used: Option<U256>,
    #[serde(default, with = "hex_u64_opt")]
    pub status: Option<u64>,
    #[serde(default)]
    pub logs: Vec<Log>,
    /// Number of blocks mined on top of the containing block, including it.
    /// Filled in by the provider from its block-height caches; zero for a
    /// receipt that has not been mined.
    #[serde(skip)]
    pub confirmations: u64,
}

/// A single emitted log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Log {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    #[serde(with = "hex_u64")]
    pub block_number: u64,
    pub block_hash: B256,
    pub transaction_hash: B256,
    #[serde(with = "hex_u64")]
    pub transaction_index: u64,
    #[serde(with = "hex_u64")]
    pub log_index: u64,
    #[serde(default)]
    pub removed: bool,
}

/// Parameters for a log query, before name resolution.
///
/// `address` may be a literal address or a resolvable name; missing range
/// bounds default to `latest`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogQuery {
    pub address: Option<AddressInput>,
    pub topics: Vec<TopicPosition>,
    pub from_block: Option<BlockTag>,
    pub to_block: Option<BlockTag>,
}

impl LogQuery {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn address(mut self, address: impl Into<AddressInput>) -> Self {
        self.address = Some(address.into());
        self
    }

    #[must_use]
    pub fn topics(mut self, topics: Vec<TopicPosition>) -> Self {
        self.topics = topics;
        self
    }

    #[must_use]
    pub fn from_block(mut self, tag: impl Into<BlockTag>) -> Self {
        self.from_block = Some(tag.into());
        self
    }

    #[must_use]
    pub fn to_block(mut self, tag: impl Into<BlockTag>) -> Self {
        self.to_block = Some(tag.into());
        self
    }
}

/// Serde adapter for `u64` quantities carried as `0x`-prefixed hex strings.
pub(crate) mod hex_u64 {
    use alloy_primitives::U64;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        U64::from(*value).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        Ok(U64::deserialize(deserializer)?.to::<u64>())
    }
}

pub(crate) mod hex_u64_opt {
    use alloy_primitives::U64;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error> {
        value.map(U64::from).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<u64>, D::Error> {
        Ok(Option::<U64>::deserialize(deserializer)?.map(|v| v.to::<u64>()))
    }
}
