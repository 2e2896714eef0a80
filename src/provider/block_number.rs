//! Block-height caches.
//!
//! Two independent caches back every height read:
//!
//! * the *internal* cache holds the result of the latest authoritative
//!   `getBlockNumber`, deduplicated through a shared in-flight query slot so
//!   that concurrent callers inside a freshness window trigger at most one
//!   backend call;
//! * the *fast* cache is advisory: monotone, timestamped, refreshed in the
//!   background, and never a reason to block a caller.
//!
//! Both watermarks only move forward. `max_internal_block` clamps backend
//! responses so a lagging replica can never make the observed height regress.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::backend::BackendRequest;
use crate::ledger::NEVER_POLLED;
use crate::provider::{lock, network, Inner};
use crate::{Backend, ProviderError};

/// Floor for the monotone clamp before any authoritative sample exists.
pub(crate) const MAX_INTERNAL_FLOOR: i64 = -1024;

/// Height watermarks shared by the polling loop and the caches.
#[derive(Debug)]
pub(crate) struct ChainState {
    /// Watermark of the last fully processed poll tick.
    pub(crate) last_block_number: i64,
    /// Monotone floor applied to authoritative responses.
    pub(crate) max_internal_block: i64,
    pub(crate) fast: Option<FastBlock>,
}

impl ChainState {
    pub(crate) fn new() -> Self {
        Self { last_block_number: NEVER_POLLED, max_internal_block: MAX_INTERNAL_FLOOR, fast: None }
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::new();
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct FastBlock {
    pub(crate) number: u64,
    pub(crate) updated_at: Instant,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct BlockSample {
    number: u64,
    at: Instant,
}

/// The shared in-flight authoritative query: at most one outstanding backend
/// call across all concurrent callers within its freshness window.
pub(crate) type SharedBlockQuery = Shared<BoxFuture<'static, Result<BlockSample, ProviderError>>>;

/// Returns the authoritative block number, reusing the previous sample when
/// it completed within `max_age` and joining the in-flight query otherwise.
///
/// A failed query propagates to every caller awaiting it and empties the
/// shared slot, so the next caller retries fresh.
pub(crate) async fn internal_block_number<B: Backend>(
    inner: &Arc<Inner<B>>,
    max_age: Duration,
) -> Result<u64, ProviderError> {
    network::ready(inner).await?;

    if !max_age.is_zero() {
        enum Found {
            Created(SharedBlockQuery),
            Existing(SharedBlockQuery),
        }

        let found = {
            let mut slot = lock(&inner.internal_query);
            match &*slot {
                Some(query) => Found::Existing(query.clone()),
                None => {
                    let query = block_query(inner);
                    *slot = Some(query.clone());
                    Found::Created(query)
                }
            }
        };

        match found {
            Found::Created(query) => return settle(inner, query).await,
            Found::Existing(query) => match query.clone().await {
                Ok(sample) if sample.at.elapsed() <= max_age => return Ok(sample.number),
                Ok(_) => {
                    // Sample too old: replace it, unless another caller
                    // already installed a newer query.
                    let replacement = {
                        let mut slot = lock(&inner.internal_query);
                        match &*slot {
                            Some(current) if !current.ptr_eq(&query) => current.clone(),
                            _ => {
                                let fresh = block_query(inner);
                                *slot = Some(fresh.clone());
                                fresh
                            }
                        }
                    };
                    return settle(inner, replacement).await;
                }
                Err(err) => {
                    clear_if_same(inner, &query);
                    return Err(err);
                }
            },
        }
    }

    // Zero max-age always issues a fresh authoritative query.
    let query = {
        let mut slot = lock(&inner.internal_query);
        let query = block_query(inner);
        *slot = Some(query.clone());
        query
    };
    settle(inner, query).await
}

async fn settle<B: Backend>(
    inner: &Arc<Inner<B>>,
    query: SharedBlockQuery,
) -> Result<u64, ProviderError> {
    match query.clone().await {
        Ok(sample) => Ok(sample.number),
        Err(err) => {
            clear_if_same(inner, &query);
            Err(err)
        }
    }
}

fn clear_if_same<B: Backend>(inner: &Arc<Inner<B>>, query: &SharedBlockQuery) {
    let mut slot = lock(&inner.internal_query);
    if slot.as_ref().is_some_and(|current| current.ptr_eq(query)) {
        *slot = None;
    }
}

fn block_query<B: Backend>(inner: &Arc<Inner<B>>) -> SharedBlockQuery {
    let inner = Arc::clone(inner);
    async move {
        let raw = inner
            .backend
            .perform(BackendRequest::BlockNumber)
            .await
            .map_err(ProviderError::from)?;
        let reported = inner.formatter.quantity(&raw)?;
        let number = {
            let mut chain = lock(&inner.chain);
            let clamped = (reported as i64).max(chain.max_internal_block);
            chain.max_internal_block = clamped;
            clamped as u64
        };
        inner.set_fast_block_number(number);
        trace!(block_number = number, "authoritative block number refreshed");
        Ok(BlockSample { number, at: Instant::now() })
    }
    .boxed()
    .shared()
}

/// Returns the advisory height without blocking. When the cached value is
/// older than twice the polling interval (or absent), an authoritative
/// refresh is kicked off in the background.
pub(crate) fn fast_block_number<B: Backend>(inner: &Arc<Inner<B>>) -> Option<u64> {
    let interval = Duration::from_millis(inner.polling_interval_ms.load(Ordering::SeqCst));
    let (value, stale) = {
        let chain = lock(&inner.chain);
        match &chain.fast {
            Some(fast) => (Some(fast.number), fast.updated_at.elapsed() > interval * 2),
            None => (None, true),
        }
    };

    if stale {
        let refresh = Arc::clone(inner);
        inner.runtime.spawn(async move {
            if let Err(err) = internal_block_number(&refresh, Duration::ZERO).await {
                debug!(error = %err, "background block number refresh failed");
            }
        });
    }
    value
}

impl<B: Backend> Inner<B> {
    /// Monotone fast-cache update: the number only moves forward, the
    /// freshness stamp refreshes whenever `number` is at least the cached
    /// value.
    pub(crate) fn set_fast_block_number(&self, number: u64) {
        let mut chain = lock(&self.chain);
        match &mut chain.fast {
            Some(fast) => {
                if number < fast.number {
                    return;
                }
                fast.number = number;
                fast.updated_at = Instant::now();
            }
            None => chain.fast = Some(FastBlock { number, updated_at: Instant::now() }),
        }
    }
}
