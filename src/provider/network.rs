//! Network identity resolution and the consistency guard.
//!
//! The identity is resolved lazily: supplied up front, detected once and
//! then fixed, or continuously re-detected ("dynamic" mode). Resolution is
//! coalesced through a shared in-flight query so concurrent callers share
//! one detection. Every [`get_network`] call re-detects the live identity;
//! a mismatch is fatal for fixed providers and self-healing for dynamic
//! ones.

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{error, info};

use crate::backend::BackendRequest;
use crate::provider::subscription::{emit_event, emit_flushed};
use crate::provider::{lock, Inner, ProviderEvent};
use crate::tag::EventTag;
use crate::types::Network;
use crate::{Backend, ProviderError};

/// How the provider treats its network identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NetworkMode {
    /// Identity supplied at construction; a live mismatch is fatal.
    Fixed,
    /// Identity detected on first use, fixed afterwards.
    Detect,
    /// Identity follows the backend; changes reset provider state.
    Dynamic,
}

pub(crate) type SharedNetworkQuery = Shared<BoxFuture<'static, Result<Network, ProviderError>>>;

/// Resolves the provider's network identity, detecting it on first use.
/// Concurrent callers share a single in-flight detection.
pub(crate) async fn ready<B: Backend>(inner: &Arc<Inner<B>>) -> Result<Network, ProviderError> {
    if let Some(network) = lock(&inner.network).clone() {
        return Ok(network);
    }

    let query = {
        let mut slot = lock(&inner.network_query);
        match &*slot {
            Some(query) => query.clone(),
            None => {
                let query = detect_query(inner);
                *slot = Some(query.clone());
                query
            }
        }
    };
    let result = query.clone().await;
    {
        let mut slot = lock(&inner.network_query);
        if slot.as_ref().is_some_and(|current| current.ptr_eq(&query)) {
            *slot = None;
        }
    }

    let network = result?;
    let mut resolved = lock(&inner.network);
    match &*resolved {
        Some(existing) => Ok(existing.clone()),
        None => {
            info!(network = %network, "network resolved");
            *resolved = Some(network.clone());
            Ok(network)
        }
    }
}

fn detect_query<B: Backend>(inner: &Arc<Inner<B>>) -> SharedNetworkQuery {
    let inner = Arc::clone(inner);
    async move { detect_network(&inner).await }.boxed().shared()
}

/// Asks the backend for its live network identity, bypassing every cache.
pub(crate) async fn detect_network<B: Backend>(
    inner: &Arc<Inner<B>>,
) -> Result<Network, ProviderError> {
    let raw = inner.backend.perform(BackendRequest::ChainId).await.map_err(ProviderError::from)?;
    let chain_id = inner.formatter.quantity(&raw)?;
    Ok(Network::from_chain_id(chain_id))
}

/// The consistency guard: resolves the identity, re-detects the live one,
/// and reconciles the two.
///
/// On a mismatch, a dynamic provider adopts the new identity, resets the
/// block caches, the emitted-event ledger and the poll watermark, and
/// delivers a `network(new, old)` event to every listener before returning,
/// so listeners can tear down now-invalid state ahead of any dependent call.
/// A fixed provider emits an `error` event and fails with
/// [`ProviderError::NetworkChanged`].
pub(crate) async fn get_network<B: Backend>(
    inner: &Arc<Inner<B>>,
) -> Result<Network, ProviderError> {
    let network = ready(inner).await?;
    let current = detect_network(inner).await?;
    if current.chain_id == network.chain_id {
        return Ok(network);
    }

    if inner.network_mode == NetworkMode::Dynamic {
        info!(old = %network, new = %current, "adopting changed backend network");
        lock(&inner.chain).reset();
        *lock(&inner.internal_query) = None;
        lock(&inner.ledger).reset();
        *lock(&inner.network) = Some(current.clone());

        emit_flushed(
            inner,
            &EventTag::NETWORK,
            ProviderEvent::Network { new: current.clone(), old: network },
        )
        .await;
        return Ok(current);
    }

    let err = ProviderError::NetworkChanged { from: network, to: current };
    error!(error = %err, "backend network no longer matches the resolved identity");
    emit_event(inner, &EventTag::ERROR, ProviderEvent::Error(err.clone()));
    Err(err)
}
