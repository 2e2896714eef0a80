use std::sync::atomic::{AtomicBool, AtomicU64};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, Notify};

use crate::formatter::JsonFormatter;
use crate::ledger::EmittedLedger;
use crate::provider::block_number::ChainState;
use crate::provider::network::NetworkMode;
use crate::provider::subscription::{run_dispatcher, SubscriptionSet};
use crate::provider::{Inner, PollingProvider};
use crate::types::Network;
use crate::{Backend, Formatter, NameResolver, ProviderError};

/// Default tick interval of the polling loop.
pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_millis(4000);

/// Height jump beyond which a tick reports a backend discontinuity instead
/// of emitting the intervening blocks.
pub const DEFAULT_SKEW_THRESHOLD: u64 = 1000;

/// How many blocks a ledger entry may trail the watermark before eviction.
pub const DEFAULT_EVICTION_HORIZON: u64 = 12;

/// Builder for [`PollingProvider`].
///
/// ```no_run
/// # use polling_provider::{PollingProvider, Network};
/// # async fn example(backend: impl polling_provider::Backend) -> anyhow::Result<()> {
/// let provider = PollingProvider::builder(backend)
///     .network(Network::from_chain_id(1))
///     .polling_interval(std::time::Duration::from_secs(2))
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct PollingProviderBuilder<B: Backend> {
    backend: B,
    formatter: Arc<dyn Formatter>,
    resolver: Option<Arc<dyn NameResolver>>,
    network: Option<Network>,
    dynamic: bool,
    pub(crate) polling_interval: Duration,
    pub(crate) skew_threshold: u64,
    pub(crate) eviction_horizon: u64,
}

impl<B: Backend> PollingProviderBuilder<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            formatter: Arc::new(JsonFormatter::new()),
            resolver: None,
            network: None,
            dynamic: false,
            polling_interval: DEFAULT_POLLING_INTERVAL,
            skew_threshold: DEFAULT_SKEW_THRESHOLD,
            eviction_horizon: DEFAULT_EVICTION_HORIZON,
        }
    }

    /// Replaces the default [`JsonFormatter`].
    #[must_use]
    pub fn formatter(mut self, formatter: impl Formatter) -> Self {
        self.formatter = Arc::new(formatter);
        self
    }

    #[must_use]
    pub fn resolver(mut self, resolver: impl NameResolver) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    /// Supplies the network identity up front. A live mismatch then fails
    /// with [`ProviderError::NetworkChanged`] instead of being adopted.
    #[must_use]
    pub fn network(mut self, network: Network) -> Self {
        self.network = Some(network);
        self
    }

    /// Follows whatever network the backend reports: identity changes reset
    /// provider state and emit a `network` event instead of failing.
    #[must_use]
    pub fn dynamic_network(mut self) -> Self {
        self.dynamic = true;
        self
    }

    #[must_use]
    pub fn polling_interval(mut self, interval: Duration) -> Self {
        self.polling_interval = interval;
        self
    }

    #[must_use]
    pub fn skew_threshold(mut self, threshold: u64) -> Self {
        self.skew_threshold = threshold;
        self
    }

    #[must_use]
    pub fn eviction_horizon(mut self, horizon: u64) -> Self {
        self.eviction_horizon = horizon;
        self
    }

    /// Builds the provider and spawns its event dispatcher.
    ///
    /// # Errors
    ///
    /// [`ProviderError::InvalidArgument`] if the polling interval is zero.
    pub async fn build(self) -> Result<PollingProvider<B>, ProviderError> {
        if self.polling_interval.is_zero() {
            return Err(ProviderError::InvalidArgument(
                "polling interval must be positive".to_owned(),
            ));
        }

        let runtime = tokio::runtime::Handle::current();
        let (dispatch, queue) = mpsc::unbounded_channel();
        runtime.spawn(run_dispatcher(queue));

        let network_mode = if self.dynamic {
            NetworkMode::Dynamic
        } else if self.network.is_some() {
            NetworkMode::Fixed
        } else {
            NetworkMode::Detect
        };

        let inner = Inner {
            backend: self.backend,
            formatter: self.formatter,
            resolver: self.resolver,
            network_mode,
            network: Mutex::new(self.network),
            network_query: Mutex::new(None),
            chain: Mutex::new(ChainState::new()),
            internal_query: Mutex::new(None),
            ledger: Mutex::new(EmittedLedger::new()),
            subscriptions: Mutex::new(SubscriptionSet::new()),
            dispatch,
            tick_serial: tokio::sync::Mutex::new(()),
            next_poll_id: AtomicU64::new(0),
            polling: AtomicBool::new(false),
            polling_interval_ms: AtomicU64::new(self.polling_interval.as_millis() as u64),
            reschedule: Arc::new(Notify::new()),
            last_tick: Mutex::new(None),
            skew_threshold: self.skew_threshold,
            eviction_horizon: self.eviction_horizon,
            runtime,
        };
        Ok(PollingProvider { inner: Arc::new(inner) })
    }
}
