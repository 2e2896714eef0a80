//! Transaction submission and the confirmation-wait protocol.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{keccak256, Bytes, B256};
use tokio::sync::mpsc;
use tracing::debug;

use crate::backend::BackendRequest;
use crate::ledger::{BlockPosition, SeenKey};
use crate::provider::block_number::internal_block_number;
use crate::provider::poll::fetch_receipt;
use crate::provider::subscription::{self, Listener};
use crate::provider::{lock, Inner, PollingProvider, ProviderEvent};
use crate::tag::EventTag;
use crate::types::TransactionReceipt;
use crate::{Backend, ProviderError};

/// A submitted transaction, returned by
/// [`PollingProvider::send_raw_transaction`].
pub struct PendingTransaction<B: Backend> {
    provider: PollingProvider<B>,
    hash: B256,
}

impl<B: Backend> PendingTransaction<B> {
    pub(crate) fn new(provider: PollingProvider<B>, hash: B256) -> Self {
        Self { provider, hash }
    }

    pub fn hash(&self) -> B256 {
        self.hash
    }

    /// Blocks until the transaction has `confirmations` blocks on top of it,
    /// or `timeout` elapses.
    ///
    /// Unless zero confirmations were requested, the ledger entry for the
    /// hash is marked pending first, so a null receipt response reads as
    /// "not yet indexed" and is retried instead of returned.
    pub async fn wait(
        &self,
        confirmations: u64,
        timeout: Option<Duration>,
    ) -> Result<TransactionReceipt, ProviderError> {
        if confirmations != 0 {
            lock(&self.provider.inner.ledger)
                .insert(SeenKey::Transaction(self.hash), BlockPosition::Pending);
        }
        wait_for_transaction(&self.provider.inner, self.hash, confirmations, timeout).await
    }
}

impl<B: Backend> std::fmt::Debug for PendingTransaction<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingTransaction").field("hash", &self.hash).finish()
    }
}

impl<B: Backend> PollingProvider<B> {
    /// Submits an already-signed transaction payload.
    ///
    /// The hash reported by the backend must equal the keccak digest of the
    /// payload; a mismatch is an [`ProviderError::Unknown`] backend
    /// inconsistency.
    pub async fn send_raw_transaction(
        &self,
        payload: Bytes,
    ) -> Result<PendingTransaction<B>, ProviderError> {
        self.get_network().await?;
        let expected = keccak256(&payload);
        let raw = self
            .inner
            .backend
            .perform(BackendRequest::SendRawTransaction { payload })
            .await
            .map_err(ProviderError::from)?;
        let hash = self.inner.formatter.hash(&raw)?;
        if hash != expected {
            return Err(ProviderError::Unknown(format!(
                "backend returned transaction hash {hash}, expected {expected}"
            )));
        }
        debug!(%hash, "transaction submitted");
        Ok(PendingTransaction::new(self.clone(), hash))
    }

    /// Blocks until `hash` has `confirmations` blocks on top of it, or
    /// `timeout` elapses with [`ProviderError::Timeout`].
    ///
    /// Exactly one of the two outcomes happens; duplicate receipt deliveries
    /// after resolution are ignored, and the internal subscription is
    /// released on both paths.
    pub async fn wait_for_transaction(
        &self,
        hash: B256,
        confirmations: u64,
        timeout: Option<Duration>,
    ) -> Result<TransactionReceipt, ProviderError> {
        wait_for_transaction(&self.inner, hash, confirmations, timeout).await
    }
}

pub(crate) async fn wait_for_transaction<B: Backend>(
    inner: &Arc<Inner<B>>,
    hash: B256,
    confirmations: u64,
    timeout: Option<Duration>,
) -> Result<TransactionReceipt, ProviderError> {
    crate::provider::network::ready(inner).await?;

    // A receipt may already satisfy the target.
    if let Some(mut receipt) = fetch_receipt(inner, hash).await? {
        fill_confirmations(inner, &mut receipt).await;
        if satisfied(&receipt, confirmations) {
            return Ok(receipt);
        }
    }

    let (sender, mut deliveries) = mpsc::unbounded_channel();
    let listener: Listener = Arc::new(move |event| {
        if let ProviderEvent::Receipt(receipt) = event {
            let _ = sender.send(receipt);
        }
    });
    let id = subscription::add_listener(inner, EventTag::Transaction(hash), listener, false);

    let wait = async {
        while let Some(mut receipt) = deliveries.recv().await {
            fill_confirmations(inner, &mut receipt).await;
            if satisfied(&receipt, confirmations) {
                return Ok(receipt);
            }
        }
        Err(ProviderError::Unknown("confirmation wait channel closed".to_owned()))
    };

    let result = match timeout {
        Some(deadline) => match tokio::time::timeout(deadline, wait).await {
            Ok(result) => result,
            Err(_) => {
                debug!(%hash, "confirmation wait timed out");
                Err(ProviderError::Timeout)
            }
        },
        None => wait.await,
    };

    subscription::remove_listener(inner, &EventTag::Transaction(hash), Some(id));
    result
}

fn satisfied(receipt: &TransactionReceipt, confirmations: u64) -> bool {
    if confirmations == 0 {
        return true;
    }
    receipt.block_number.is_some() && receipt.confirmations >= confirmations
}

/// Computes `confirmations` against the authoritative height. Falls back to
/// the containing block when the height cannot be read, which yields the
/// minimum of one confirmation.
pub(crate) async fn fill_confirmations<B: Backend>(
    inner: &Arc<Inner<B>>,
    receipt: &mut TransactionReceipt,
) {
    let Some(number) = receipt.block_number else {
        receipt.confirmations = 0;
        return;
    };
    let interval = inner.polling_interval_ms.load(Ordering::SeqCst);
    let head = match internal_block_number(inner, Duration::from_millis(100 + 2 * interval)).await {
        Ok(head) => head,
        Err(_) => number,
    };
    receipt.confirmations = (head + 1).saturating_sub(number);
}
