//! The polling provider.
//!
//! [`PollingProvider`] presents a push-style subscription surface (block,
//! receipt and log events) on top of a pull-only [`Backend`]. It is a cheap
//! `Clone` handle over shared state: the state lives behind an `Arc`,
//! background work runs on spawned tasks that hold weak references, and
//! consumers pick between callbacks ([`PollingProvider::on`]) and streams
//! ([`PollingProvider::subscribe`]).

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use alloy_primitives::{Address, B256};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;

use crate::backend::BackendRequest;
use crate::ledger::{EmittedLedger, SeenKey};
use crate::tag::{EventSpec, LogFilter};
use crate::types::{
    AddressInput, Block, BlockSelector, BlockTag, Log, LogQuery, Network, TransactionReceipt,
};
use crate::{Backend, Formatter, NameResolver, ProviderError};

pub(crate) mod block_number;
mod builder;
pub(crate) mod network;
pub(crate) mod poll;
pub(crate) mod subscription;
mod wait;

pub use builder::{
    PollingProviderBuilder, DEFAULT_EVICTION_HORIZON, DEFAULT_POLLING_INTERVAL,
    DEFAULT_SKEW_THRESHOLD,
};
pub use subscription::{EventStream, Listener, ListenerId};
pub use wait::PendingTransaction;

use block_number::{ChainState, SharedBlockQuery};
use network::{NetworkMode, SharedNetworkQuery};
use subscription::{Dispatch, SubscriptionSet};

/// Payload delivered to subscribers.
#[derive(Debug, Clone)]
pub enum ProviderEvent {
    /// A synthetic block event. Within one tick these are strictly
    /// increasing and contiguous.
    Block(u64),
    /// A tick started; `id` increases monotonically.
    Poll { id: u64, block_number: u64 },
    /// The tick with `id`, including its per-subscription checks, settled.
    DidPoll { id: u64 },
    /// A receipt delivered to a `tx:` subscription.
    Receipt(TransactionReceipt),
    /// A log delivered to a `filter:` subscription.
    Log(Log),
    /// The provider adopted a changed backend network (dynamic mode).
    Network { new: Network, old: Network },
    /// A polling-side failure, redirected off the failing path.
    Error(ProviderError),
}

/// Recovers the guard from a poisoned lock; the state protected by these
/// locks stays consistent across panics because every critical section is
/// a plain field update.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) struct Inner<B: Backend> {
    pub(crate) backend: B,
    pub(crate) formatter: Arc<dyn Formatter>,
    pub(crate) resolver: Option<Arc<dyn NameResolver>>,
    pub(crate) network_mode: NetworkMode,
    pub(crate) network: Mutex<Option<Network>>,
    pub(crate) network_query: Mutex<Option<SharedNetworkQuery>>,
    pub(crate) chain: Mutex<ChainState>,
    pub(crate) internal_query: Mutex<Option<SharedBlockQuery>>,
    pub(crate) ledger: Mutex<EmittedLedger>,
    pub(crate) subscriptions: Mutex<SubscriptionSet>,
    pub(crate) dispatch: mpsc::UnboundedSender<Dispatch>,
    /// Serializes logical ticks; held for the watermark-advancing part of a
    /// tick, not for its detached per-subscription checks.
    pub(crate) tick_serial: tokio::sync::Mutex<()>,
    pub(crate) next_poll_id: AtomicU64,
    pub(crate) polling: AtomicBool,
    pub(crate) polling_interval_ms: AtomicU64,
    pub(crate) reschedule: Arc<Notify>,
    pub(crate) last_tick: Mutex<Option<Instant>>,
    pub(crate) skew_threshold: u64,
    pub(crate) eviction_horizon: u64,
    pub(crate) runtime: Handle,
}

/// Push-style subscription provider over a pull-only backend.
pub struct PollingProvider<B: Backend> {
    pub(crate) inner: Arc<Inner<B>>,
}

impl<B: Backend> Clone for PollingProvider<B> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<B: Backend> PollingProvider<B> {
    pub fn builder(backend: B) -> PollingProviderBuilder<B> {
        PollingProviderBuilder::new(backend)
    }

    pub fn backend(&self) -> &B {
        &self.inner.backend
    }

    // --- subscription surface ---

    /// Registers a listener for `spec`. The callback runs on the dispatcher
    /// task, never inside `emit`, so it may freely re-enter the provider.
    pub fn on(
        &self,
        spec: impl Into<EventSpec>,
        listener: impl Fn(ProviderEvent) + Send + Sync + 'static,
    ) -> Result<ListenerId, ProviderError> {
        let tag = spec.into().tag()?;
        Ok(subscription::add_listener(&self.inner, tag, Arc::new(listener), false))
    }

    /// Like [`on`](Self::on), but the listener is removed after its first
    /// delivery.
    pub fn once(
        &self,
        spec: impl Into<EventSpec>,
        listener: impl Fn(ProviderEvent) + Send + Sync + 'static,
    ) -> Result<ListenerId, ProviderError> {
        let tag = spec.into().tag()?;
        Ok(subscription::add_listener(&self.inner, tag, Arc::new(listener), true))
    }

    /// Stream-shaped subscription. Dropping the stream unsubscribes.
    pub fn subscribe(&self, spec: impl Into<EventSpec>) -> Result<EventStream, ProviderError> {
        let tag = spec.into().tag()?;
        let (sender, receiver) = mpsc::unbounded_channel();
        let forward: Listener = Arc::new(move |event| {
            let _ = sender.send(event);
        });
        let id = subscription::add_listener(&self.inner, tag.clone(), forward, false);
        let weak = Arc::downgrade(&self.inner);
        Ok(EventStream::new(receiver, move || {
            if let Some(inner) = weak.upgrade() {
                subscription::remove_listener(&inner, &tag, Some(id));
            }
        }))
    }

    /// Removes one listener by handle, or every listener of the class when
    /// no handle is given. Returns whether anything was removed.
    pub fn unsubscribe(
        &self,
        spec: impl Into<EventSpec>,
        listener: Option<ListenerId>,
    ) -> Result<bool, ProviderError> {
        let tag = spec.into().tag()?;
        Ok(subscription::remove_listener(&self.inner, &tag, listener))
    }

    /// Removes every listener of `spec`, or every listener of the provider.
    pub fn unsubscribe_all(&self, spec: Option<EventSpec>) -> Result<(), ProviderError> {
        let tag = spec.map(|spec| spec.tag()).transpose()?;
        subscription::remove_all_listeners(&self.inner, tag.as_ref());
        Ok(())
    }

    pub fn listener_count(&self, spec: Option<&EventSpec>) -> Result<usize, ProviderError> {
        let tag = spec.map(EventSpec::tag).transpose()?;
        Ok(lock(&self.inner.subscriptions).count(tag.as_ref()))
    }

    pub fn listeners(&self, spec: Option<&EventSpec>) -> Result<Vec<ListenerId>, ProviderError> {
        let tag = spec.map(EventSpec::tag).transpose()?;
        Ok(lock(&self.inner.subscriptions).ids(tag.as_ref()))
    }

    /// Emits `event` to the subscribers of `spec`. Returns true iff at least
    /// one listener matched. Delivery is deferred to the dispatcher task.
    pub fn emit(
        &self,
        spec: impl Into<EventSpec>,
        event: ProviderEvent,
    ) -> Result<bool, ProviderError> {
        let tag = spec.into().tag()?;
        Ok(subscription::emit_event(&self.inner, &tag, event))
    }

    // --- polling switch ---

    pub fn polling(&self) -> bool {
        self.inner.polling.load(Ordering::SeqCst)
    }

    /// Manually flips the poll switch. Subscription changes keep realigning
    /// it: the switch is on iff a pollable subscription exists.
    pub fn set_polling(&self, on: bool) {
        poll::apply_polling(&self.inner, on);
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.inner.polling_interval_ms.load(Ordering::SeqCst))
    }

    /// Changes the tick interval. Takes effect immediately, rescheduling the
    /// active timer.
    ///
    /// # Errors
    ///
    /// [`ProviderError::InvalidArgument`] if `interval` is zero.
    pub fn set_polling_interval(&self, interval: Duration) -> Result<(), ProviderError> {
        if interval.is_zero() {
            return Err(ProviderError::InvalidArgument(
                "polling interval must be positive".to_owned(),
            ));
        }
        self.inner.polling_interval_ms.store(interval.as_millis() as u64, Ordering::SeqCst);
        self.inner.reschedule.notify_waiters();
        Ok(())
    }

    // --- queries ---

    /// Resolves the network identity and verifies the backend still agrees
    /// with it. See the crate docs for the dynamic-mode reset behavior.
    pub async fn get_network(&self) -> Result<Network, ProviderError> {
        network::get_network(&self.inner).await
    }

    /// Fresh authoritative chain height. Concurrent calls share one backend
    /// query.
    pub async fn get_block_number(&self) -> Result<u64, ProviderError> {
        block_number::internal_block_number(&self.inner, Duration::ZERO).await
    }

    /// Advisory chain height: never blocks, `None` until a first
    /// authoritative sample lands. A stale cache kicks a background refresh.
    pub fn fast_block_number(&self) -> Option<u64> {
        block_number::fast_block_number(&self.inner)
    }

    /// Fetches a block. A null response for a block the ledger has already
    /// witnessed means "not yet indexed" and is retried on the next poll;
    /// an unknown block resolves to `None`.
    pub async fn get_block(
        &self,
        selector: impl Into<BlockSelector>,
    ) -> Result<Option<Block>, ProviderError> {
        self.get_network().await?;
        let selector = selector.into();
        loop {
            let request = match selector {
                BlockSelector::Hash(hash) => BackendRequest::BlockByHash { hash },
                BlockSelector::Tag(tag) => BackendRequest::BlockByNumber { tag },
            };
            let raw =
                self.inner.backend.perform(request).await.map_err(ProviderError::from)?;
            if !raw.is_null() {
                return self.inner.formatter.block(raw).map(Some);
            }
            let witnessed = match selector {
                BlockSelector::Hash(hash) => {
                    lock(&self.inner.ledger).get(&SeenKey::Block(hash)).is_some()
                }
                BlockSelector::Tag(BlockTag::Number(number)) => {
                    (number as i64) <= lock(&self.inner.ledger).block()
                }
                BlockSelector::Tag(_) => false,
            };
            if !witnessed {
                return Ok(None);
            }
            subscription::next_poll(&self.inner).await;
        }
    }

    /// Fetches a receipt, with `confirmations` filled in from the
    /// authoritative height.
    ///
    /// A null response resolves to `None` only when the ledger has never
    /// witnessed the hash; otherwise the hash is known to exist and the
    /// query retries on the next poll. The same applies to a receipt that
    /// has not reached a block yet.
    pub async fn get_transaction_receipt(
        &self,
        hash: B256,
    ) -> Result<Option<TransactionReceipt>, ProviderError> {
        self.get_network().await?;
        loop {
            let raw = self
                .inner
                .backend
                .perform(BackendRequest::TransactionReceipt { hash })
                .await
                .map_err(ProviderError::from)?;
            if raw.is_null() {
                if lock(&self.inner.ledger).get(&SeenKey::Transaction(hash)).is_none() {
                    return Ok(None);
                }
            } else {
                let mut receipt = self.inner.formatter.receipt(raw)?;
                if receipt.block_number.is_some() {
                    wait::fill_confirmations(&self.inner, &mut receipt).await;
                    return Ok(Some(receipt));
                }
            }
            subscription::next_poll(&self.inner).await;
        }
    }

    /// Fetches logs matching `query`, resolving a named address first.
    /// Range bounds default to `latest`.
    pub async fn get_logs(&self, query: LogQuery) -> Result<Vec<Log>, ProviderError> {
        self.get_network().await?;
        let address = match query.address {
            Some(AddressInput::Address(address)) => Some(address),
            Some(AddressInput::Name(name)) => Some(self.resolve_name(&name).await?),
            None => None,
        };
        let request = BackendRequest::Logs {
            filter: LogFilter::new(address, query.topics),
            from_block: query.from_block.unwrap_or(BlockTag::Latest),
            to_block: query.to_block.unwrap_or(BlockTag::Latest),
        };
        let raw = self.inner.backend.perform(request).await.map_err(ProviderError::from)?;
        self.inner.formatter.logs(raw)
    }

    /// Resolves a name to an address via the configured resolver. Literal
    /// addresses pass through untouched.
    pub async fn resolve_name(&self, name: &str) -> Result<Address, ProviderError> {
        if let Ok(address) = Address::from_str(name) {
            return Ok(address);
        }
        let Some(resolver) = &self.inner.resolver else {
            return Err(ProviderError::InvalidArgument(format!(
                "cannot resolve {name:?} without a name resolver"
            )));
        };
        resolver.resolve_name(name).await.map_err(ProviderError::from)
    }
}
