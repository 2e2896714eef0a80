use std::sync::Arc;

use thiserror::Error;

use crate::types::Network;

/// Opaque failure reported by a [`Backend`](crate::Backend) operation.
///
/// The provider never inspects the contents; a backend error either propagates
/// to the caller that issued the operation or is redirected onto the `error`
/// event channel during polling.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct BackendError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), source: None }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self { message: message.into(), source: Some(Box::new(source)) }
    }
}

/// Errors surfaced by the provider.
///
/// Values of this type are both returned from the async API and delivered as
/// [`ProviderEvent::Error`](crate::ProviderEvent::Error) payloads, so the type
/// is `Clone` (backend errors are shared behind an `Arc`).
///
/// Per-subscription polling failures are never thrown: they are swallowed
/// locally and redirected to the `error` event channel so one failing
/// subscription cannot stop a tick or starve the others.
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// A malformed hash, topic, address or tag shape. Local and immediate,
    /// never retried.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The requested subscription shape is recognized but unsupported.
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    /// The backend failed to perform an operation.
    #[error("backend error: {0}")]
    Backend(Arc<BackendError>),

    /// A payload returned by the backend did not decode into the expected
    /// shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The backend's live network no longer matches the resolved identity.
    #[error("network changed: {from} -> {to}")]
    NetworkChanged { from: Network, to: Network },

    /// A wait exceeded its deadline.
    #[error("operation timed out")]
    Timeout,

    /// The reported block height jumped farther than the skew threshold.
    /// Treated as a backend discontinuity, not real chain progress.
    #[error("block height skew: {previous} -> {current}")]
    BlockSkew { previous: u64, current: u64 },

    /// Unexpected backend inconsistency.
    #[error("unknown error: {0}")]
    Unknown(String),
}

impl From<BackendError> for ProviderError {
    fn from(error: BackendError) -> Self {
        Self::Backend(Arc::new(error))
    }
}
