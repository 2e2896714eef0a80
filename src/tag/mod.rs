//! Subscription event tags.
//!
//! Every subscription request resolves once, at the API boundary, into an
//! [`EventTag`]: the canonical key identifying its subscription class.
//! Internal logic only ever compares tags; it never re-inspects the original
//! request shape. Encoding ([`fmt::Display`]) and decoding ([`FromStr`]) are
//! inverse on the normalized domain (case-folded hex, sorted OR-sets, no
//! trailing wildcard positions).

use std::fmt;
use std::str::FromStr;

use alloy_primitives::{hex, Address, B256};

use crate::ProviderError;

mod topics;

pub use topics::{
    decode_topics, encode_topics, normalize_topics, parse_topic, Topic, TopicPosition,
};

/// Fixed, well-known subscription classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sentinel {
    /// A new block was observed.
    Block,
    /// The backend's network identity changed (dynamic providers only).
    Network,
    Pending,
    /// A polling tick started.
    Poll,
    /// A polling tick and all of its per-subscription checks settled.
    DidPoll,
    /// A polling-side failure was redirected off the failing path.
    Error,
}

impl Sentinel {
    fn as_str(self) -> &'static str {
        match self {
            Self::Block => "block",
            Self::Network => "network",
            Self::Pending => "pending",
            Self::Poll => "poll",
            Self::DidPoll => "didpoll",
            Self::Error => "error",
        }
    }

    fn parse(name: &str) -> Option<Self> {
        match name {
            "block" => Some(Self::Block),
            "network" => Some(Self::Network),
            "pending" => Some(Self::Pending),
            "poll" => Some(Self::Poll),
            "didpoll" => Some(Self::DidPoll),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// A log filter: an optional address plus topic AND-positions.
///
/// When carried inside an [`EventTag`], the topics are always in normalized
/// form (see [`normalize_topics`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LogFilter {
    pub address: Option<Address>,
    pub topics: Vec<TopicPosition>,
}

impl LogFilter {
    pub fn new(address: Option<Address>, topics: Vec<TopicPosition>) -> Self {
        Self { address, topics: normalize_topics(topics) }
    }
}

/// A subscription request, as accepted at the public API boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventSpec {
    /// One of the fixed sentinel classes.
    Sentinel(Sentinel),
    /// A caller-defined event name. Lower-cased on resolution; must not
    /// contain `:`.
    Custom(String),
    /// Receipt notifications for one transaction hash.
    Transaction(B256),
    /// A log filter given as bare topic positions (any address).
    Topics(Vec<TopicPosition>),
    /// A log filter with optional address and topics.
    Filter(LogFilter),
    /// Re-org fork notifications. Recognized but unsupported.
    Fork(B256),
}

impl EventSpec {
    /// Classifies a string request: a 32-byte hex value subscribes to that
    /// transaction, a sentinel name to the sentinel class, anything else to a
    /// caller-defined event.
    pub fn parse(input: &str) -> Result<Self, ProviderError> {
        if looks_like_hash(input) {
            return Ok(Self::Transaction(parse_topic(input)?));
        }
        let lowered = input.to_lowercase();
        if let Some(sentinel) = Sentinel::parse(&lowered) {
            return Ok(Self::Sentinel(sentinel));
        }
        if lowered.is_empty() || lowered.contains(':') || lowered.contains(char::is_whitespace) {
            return Err(ProviderError::InvalidArgument(format!(
                "invalid event name: {input:?}"
            )));
        }
        Ok(Self::Custom(lowered))
    }

    /// Resolves the request into its canonical tag.
    pub fn tag(&self) -> Result<EventTag, ProviderError> {
        match self {
            Self::Sentinel(sentinel) => Ok(EventTag::Sentinel(*sentinel)),
            Self::Custom(name) => match Self::parse(name)? {
                Self::Custom(lowered) => Ok(EventTag::Custom(lowered)),
                other => other.tag(),
            },
            Self::Transaction(hash) => Ok(EventTag::Transaction(*hash)),
            Self::Topics(positions) => {
                Ok(EventTag::Filter(LogFilter::new(None, positions.clone())))
            }
            Self::Filter(filter) => {
                Ok(EventTag::Filter(LogFilter::new(filter.address, filter.topics.clone())))
            }
            Self::Fork(_) => Err(ProviderError::NotImplemented("fork event subscriptions")),
        }
    }
}

impl From<Sentinel> for EventSpec {
    fn from(sentinel: Sentinel) -> Self {
        Self::Sentinel(sentinel)
    }
}

impl From<B256> for EventSpec {
    fn from(hash: B256) -> Self {
        Self::Transaction(hash)
    }
}

impl From<LogFilter> for EventSpec {
    fn from(filter: LogFilter) -> Self {
        Self::Filter(filter)
    }
}

impl From<Vec<TopicPosition>> for EventSpec {
    fn from(topics: Vec<TopicPosition>) -> Self {
        Self::Topics(topics)
    }
}

/// Classified lazily: the string is carried verbatim and resolved by
/// [`EventSpec::tag`], so a hash string still lands on its transaction class.
impl From<&str> for EventSpec {
    fn from(name: &str) -> Self {
        Self::Custom(name.to_owned())
    }
}

impl From<String> for EventSpec {
    fn from(name: String) -> Self {
        Self::Custom(name)
    }
}

fn looks_like_hash(input: &str) -> bool {
    let bare = input.strip_prefix("0x").unwrap_or(input);
    bare.len() == 64 && bare.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Canonical key of a subscription class.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventTag {
    Sentinel(Sentinel),
    Custom(String),
    Transaction(B256),
    Filter(LogFilter),
}

impl EventTag {
    pub const BLOCK: Self = Self::Sentinel(Sentinel::Block);
    pub const NETWORK: Self = Self::Sentinel(Sentinel::Network);
    pub const PENDING: Self = Self::Sentinel(Sentinel::Pending);
    pub const POLL: Self = Self::Sentinel(Sentinel::Poll);
    pub const DID_POLL: Self = Self::Sentinel(Sentinel::DidPoll);
    pub const ERROR: Self = Self::Sentinel(Sentinel::Error);

    /// Whether a subscription with this tag drives the polling loop.
    pub fn is_pollable(&self) -> bool {
        match self {
            Self::Transaction(_) | Self::Filter(_) => true,
            Self::Sentinel(sentinel) => matches!(
                sentinel,
                Sentinel::Block | Sentinel::Network | Sentinel::Pending | Sentinel::Poll
            ),
            Self::Custom(_) => false,
        }
    }
}

impl fmt::Display for EventTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sentinel(sentinel) => f.write_str(sentinel.as_str()),
            Self::Custom(name) => f.write_str(name),
            Self::Transaction(hash) => write!(f, "tx:{}", hex::encode(hash)),
            Self::Filter(filter) => {
                let address = match &filter.address {
                    Some(address) => hex::encode_prefixed(address),
                    None => "*".to_owned(),
                };
                write!(f, "filter:{address}:{}", encode_topics(&filter.topics))
            }
        }
    }
}

impl FromStr for EventTag {
    type Err = ProviderError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        if let Some(hash) = input.strip_prefix("tx:") {
            return Ok(Self::Transaction(parse_topic(hash)?));
        }
        if let Some(rest) = input.strip_prefix("filter:") {
            let (address, topics) = rest.split_once(':').ok_or_else(|| {
                ProviderError::InvalidArgument(format!("invalid filter tag: {input:?}"))
            })?;
            let address = match address {
                "*" => None,
                literal => Some(Address::from_str(literal).map_err(|_| {
                    ProviderError::InvalidArgument(format!("invalid filter address: {literal:?}"))
                })?),
            };
            return Ok(Self::Filter(LogFilter { address, topics: decode_topics(topics)? }));
        }
        let lowered = input.to_lowercase();
        if let Some(sentinel) = Sentinel::parse(&lowered) {
            return Ok(Self::Sentinel(sentinel));
        }
        if lowered.is_empty() || lowered.contains(':') {
            return Err(ProviderError::InvalidArgument(format!("invalid event tag: {input:?}")));
        }
        Ok(Self::Custom(lowered))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, b256};

    const HASH: B256 = b256!("00000000000000000000000000000000000000000000000000000000000000cd");
    const TOPIC: B256 = b256!("00000000000000000000000000000000000000000000000000000000000000aa");

    #[test]
    fn tag_strings_round_trip() {
        let tags = vec![
            EventTag::BLOCK,
            EventTag::NETWORK,
            EventTag::PENDING,
            EventTag::POLL,
            EventTag::DID_POLL,
            EventTag::ERROR,
            EventTag::Custom("debug".to_owned()),
            EventTag::Transaction(HASH),
            EventTag::Filter(LogFilter::new(None, vec![Some(Topic::Single(TOPIC))])),
            EventTag::Filter(LogFilter::new(
                Some(address!("d8da6bf26964af9d7eed9e03e53415d37aa96045")),
                vec![None, Some(Topic::Any(vec![TOPIC, HASH]))],
            )),
        ];

        for tag in tags {
            let encoded = tag.to_string();
            assert_eq!(encoded.parse::<EventTag>().unwrap(), tag, "tag {encoded:?}");
        }
    }

    #[test]
    fn string_spec_classification() {
        assert_eq!(
            EventSpec::parse("Block").unwrap().tag().unwrap(),
            EventTag::BLOCK
        );
        assert_eq!(
            EventSpec::parse("didPoll").unwrap().tag().unwrap(),
            EventTag::DID_POLL
        );
        assert_eq!(
            EventSpec::parse(&format!("0x{}", hex::encode(HASH))).unwrap().tag().unwrap(),
            EventTag::Transaction(HASH)
        );
        assert_eq!(
            EventSpec::parse("Deploy").unwrap().tag().unwrap(),
            EventTag::Custom("deploy".to_owned())
        );
    }

    #[test]
    fn fork_spec_is_unsupported() {
        let err = EventSpec::Fork(HASH).tag().unwrap_err();
        assert!(matches!(err, ProviderError::NotImplemented(_)));
    }

    #[test]
    fn malformed_specs_are_rejected() {
        assert!(EventSpec::parse("").is_err());
        assert!(EventSpec::parse("has space").is_err());
        assert!(EventSpec::parse("a:b").is_err());
        assert!(EventSpec::Custom("a:b".to_owned()).tag().is_err());
    }

    #[test]
    fn pollable_classification() {
        assert!(EventTag::BLOCK.is_pollable());
        assert!(EventTag::NETWORK.is_pollable());
        assert!(EventTag::PENDING.is_pollable());
        assert!(EventTag::POLL.is_pollable());
        assert!(EventTag::Transaction(HASH).is_pollable());
        assert!(EventTag::Filter(LogFilter::new(None, vec![])).is_pollable());

        assert!(!EventTag::DID_POLL.is_pollable());
        assert!(!EventTag::ERROR.is_pollable());
        assert!(!EventTag::Custom("deploy".to_owned()).is_pollable());
    }

    #[test]
    fn filter_tags_normalize_before_comparison() {
        let unsorted = EventSpec::Filter(LogFilter {
            address: None,
            topics: vec![Some(Topic::Any(vec![HASH, TOPIC, TOPIC])), None],
        });
        let sorted = EventSpec::Topics(vec![Some(Topic::Any(vec![TOPIC, HASH]))]);
        assert_eq!(unsorted.tag().unwrap(), sorted.tag().unwrap());
    }
}
