//! Canonical encoding of log-filter topic positions.
//!
//! A filter is a sequence of AND-positions; each position either matches any
//! topic (`null`), a single topic, or any member of an OR-set. The canonical
//! string form sorts and dedupes OR-sets, strips trailing wildcard positions,
//! and joins members with `|` and positions with `&`, so that equal filters
//! always map to equal tag strings.

use alloy_primitives::{hex, B256};

use crate::ProviderError;

/// One position of a topic filter: a single topic or an OR-set of topics.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    Single(B256),
    Any(Vec<B256>),
}

/// A position in the AND-sequence; `None` matches any topic.
pub type TopicPosition = Option<Topic>;

/// Parses a 32-byte hex value, with or without a `0x` prefix, any case.
pub fn parse_topic(input: &str) -> Result<B256, ProviderError> {
    let bytes = hex::decode(input)
        .map_err(|_| ProviderError::InvalidArgument(format!("invalid hex value: {input:?}")))?;
    if bytes.len() != 32 {
        return Err(ProviderError::InvalidArgument(format!(
            "expected a 32 byte value, got {} bytes",
            bytes.len()
        )));
    }
    Ok(B256::from_slice(&bytes))
}

/// Normalizes a sequence of positions: OR-sets are deduped and sorted, empty
/// OR-sets collapse to the wildcard, singleton OR-sets collapse to a single
/// topic, and trailing wildcards are stripped.
pub fn normalize_topics(positions: Vec<TopicPosition>) -> Vec<TopicPosition> {
    let mut normalized: Vec<TopicPosition> = positions
        .into_iter()
        .map(|position| match position {
            Some(Topic::Any(mut members)) => {
                members.sort_unstable();
                members.dedup();
                match members.len() {
                    0 => None,
                    1 => Some(Topic::Single(members[0])),
                    _ => Some(Topic::Any(members)),
                }
            }
            other => other,
        })
        .collect();

    while normalized.last().is_some_and(Option::is_none) {
        normalized.pop();
    }
    normalized
}

/// Encodes positions into the canonical string form. Normalizes first, so the
/// output is identical for equal filters regardless of input order.
pub fn encode_topics(positions: &[TopicPosition]) -> String {
    let normalized = normalize_topics(positions.to_vec());
    normalized
        .iter()
        .map(|position| match position {
            None => "null".to_owned(),
            Some(Topic::Single(topic)) => hex::encode_prefixed(topic),
            Some(Topic::Any(members)) => members
                .iter()
                .map(hex::encode_prefixed)
                .collect::<Vec<_>>()
                .join("|"),
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Decodes the canonical string form back into normalized positions.
pub fn decode_topics(encoded: &str) -> Result<Vec<TopicPosition>, ProviderError> {
    if encoded.is_empty() {
        return Ok(Vec::new());
    }

    let positions = encoded
        .split('&')
        .map(|token| {
            if token == "null" {
                return Ok(None);
            }
            if token.contains('|') {
                let members =
                    token.split('|').map(parse_topic).collect::<Result<Vec<_>, _>>()?;
                return Ok(Some(Topic::Any(members)));
            }
            parse_topic(token).map(|topic| Some(Topic::Single(topic)))
        })
        .collect::<Result<Vec<_>, ProviderError>>()?;

    Ok(normalize_topics(positions))
}
