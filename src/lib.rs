//! polling-provider turns a pull-only chain RPC backend into a push-style
//! event source.
//!
//! The main entry point is [`PollingProvider`], built via
//! [`PollingProviderBuilder`] around any [`Backend`] implementation.
//! Register listeners with [`PollingProvider::on`] / [`PollingProvider::once`]
//! or take a stream with [`PollingProvider::subscribe`]; polling switches on
//! automatically while at least one pollable subscription exists.
//!
//! # Events
//!
//! Subscription classes are identified by canonical [`tag`]s: the sentinel
//! classes (`block`, `network`, `pending`, `poll`, `didpoll`, `error`), one
//! transaction hash (`tx:<hash>`), or a log filter
//! (`filter:<address>:<topics>`). Payloads are [`ProviderEvent`] values.
//!
//! # Ordering
//!
//! Within one polling tick, block events are strictly increasing and
//! contiguous, or replaced by exactly one `error` event when the reported
//! height jumps past the skew threshold. A `poll` event precedes the tick's
//! per-subscription work and `didPoll` follows all of it. Deliveries are
//! posted to a dispatcher task in FIFO order, so callbacks never run inside
//! `emit` and may re-enter the provider freely.
//!
//! # Null responses and retries
//!
//! The backend answers "no such receipt/block" with a JSON `null`. The
//! provider keeps a ledger of hashes it has witnessed, and treats a null
//! response for a witnessed hash as "not yet indexed": the query retries on
//! the next poll instead of resolving to nothing. Ledger entries are evicted
//! once they trail the chain head by more than the eviction horizon.
//!
//! # Confirmation waits
//!
//! [`PollingProvider::send_raw_transaction`] returns a
//! [`PendingTransaction`]; its `wait` (or
//! [`PollingProvider::wait_for_transaction`]) blocks until the receipt has
//! the requested number of confirmations, or fails with
//! [`ProviderError::Timeout`] once the optional deadline elapses. Exactly one
//! of the two happens, and duplicate deliveries after resolution are ignored.
//!
//! # Network changes
//!
//! [`PollingProvider::get_network`] re-detects the backend's live identity on
//! every call. A mismatch fails with [`ProviderError::NetworkChanged`] unless
//! the provider was built with
//! [`dynamic_network`](PollingProviderBuilder::dynamic_network), in which
//! case the new identity is adopted, caches and ledger are reset, and a
//! `network(new, old)` event is delivered to every listener before the call
//! returns.
//!
//! # Backends
//!
//! The crate ships no transport. Implement [`Backend`] (and optionally
//! [`Formatter`] / [`NameResolver`]) over whatever connection you have; the
//! `test-utils` feature provides an in-memory scripted backend.

pub mod tag;

mod backend;
mod error;
mod formatter;
mod ledger;
mod provider;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
mod types;

pub use backend::{Backend, BackendRequest, NameResolver};
pub use error::{BackendError, ProviderError};
pub use formatter::{Formatter, JsonFormatter};
pub use provider::{
    EventStream, Listener, ListenerId, PendingTransaction, PollingProvider,
    PollingProviderBuilder, ProviderEvent, DEFAULT_EVICTION_HORIZON, DEFAULT_POLLING_INTERVAL,
    DEFAULT_SKEW_THRESHOLD,
};
pub use tag::{EventSpec, EventTag, LogFilter, Sentinel, Topic, TopicPosition};
pub use types::{
    AddressInput, Block, BlockSelector, BlockTag, Log, LogQuery, Network, TransactionReceipt,
};
