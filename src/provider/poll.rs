//! The polling loop.
//!
//! Polling is an on/off switch: it is on iff at least one pollable
//! subscription exists. While on, a single poller task runs one logical tick
//! per interval. Ticks are serialized: the next tick cannot start until the
//! previous tick's watermark writes are applied. The per-subscription
//! backend checks of a tick run as detached sub-tasks whose only effects are
//! ledger inserts and event emission.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::B256;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::backend::BackendRequest;
use crate::ledger::{BlockPosition, SeenKey, NEVER_POLLED};
use crate::provider::block_number::internal_block_number;
use crate::provider::subscription::emit_event;
use crate::provider::{lock, Inner, ProviderEvent};
use crate::tag::{EventTag, LogFilter};
use crate::types::{BlockTag, TransactionReceipt};
use crate::{Backend, ProviderError};

/// Aligns the poll switch with the subscription set: on iff a pollable
/// subscription exists.
pub(crate) fn sync_polling<B: Backend>(inner: &Arc<Inner<B>>) {
    let desired = lock(&inner.subscriptions).has_pollable();
    apply_polling(inner, desired);
}

/// Flips the poll switch. Turning polling off stops future ticks but never
/// cancels the tick in flight.
pub(crate) fn apply_polling<B: Backend>(inner: &Arc<Inner<B>>, on: bool) {
    if on {
        if !inner.polling.swap(true, Ordering::SeqCst) {
            start_poller(inner);
        }
    } else if inner.polling.swap(false, Ordering::SeqCst) {
        debug!("polling stopped");
        inner.reschedule.notify_waiters();
    }
}

/// Spawns the poller task: a bootstrap tick (skipped while the last tick is
/// younger than one interval, so restarting the switch never double-fires),
/// then one tick per interval until the switch goes off or the provider is
/// dropped.
fn start_poller<B: Backend>(inner: &Arc<Inner<B>>) {
    debug!("polling started");
    let weak = Arc::downgrade(inner);
    let reschedule = Arc::clone(&inner.reschedule);

    inner.runtime.spawn(async move {
        loop {
            let wait = {
                let Some(inner) = weak.upgrade() else { return };
                if !inner.polling.load(Ordering::SeqCst) {
                    return;
                }
                let interval =
                    Duration::from_millis(inner.polling_interval_ms.load(Ordering::SeqCst));
                let wait = match *lock(&inner.last_tick) {
                    Some(at) => (at + interval).saturating_duration_since(Instant::now()),
                    None => Duration::ZERO,
                };
                wait
            };

            if !wait.is_zero() {
                tokio::select! {
                    () = sleep(wait) => {}
                    () = reschedule.notified() => continue,
                }
            }

            let Some(inner) = weak.upgrade() else { return };
            if !inner.polling.load(Ordering::SeqCst) {
                return;
            }
            poll_tick(&inner).await;
        }
    });
}

/// One logical polling tick.
pub(crate) async fn poll_tick<B: Backend>(inner: &Arc<Inner<B>>) {
    let _serial = inner.tick_serial.lock().await;
    *lock(&inner.last_tick) = Some(Instant::now());

    let poll_id = inner.next_poll_id.fetch_add(1, Ordering::SeqCst);
    let max_age =
        Duration::from_millis(100 + inner.polling_interval_ms.load(Ordering::SeqCst) / 2);

    let block_number = match internal_block_number(inner, max_age).await {
        Ok(number) => number,
        Err(err) => {
            warn!(poll_id, error = %err, "tick failed to fetch the block number");
            emit_event(inner, &EventTag::ERROR, ProviderEvent::Error(err));
            return;
        }
    };

    emit_event(inner, &EventTag::POLL, ProviderEvent::Poll { id: poll_id, block_number });

    let last_block_number = lock(&inner.chain).last_block_number;
    if block_number as i64 == last_block_number {
        emit_event(inner, &EventTag::DID_POLL, ProviderEvent::DidPoll { id: poll_id });
        return;
    }

    // First tick: seed the watermark just below the reported height so
    // startup does not replay the entire chain as block events.
    {
        let mut ledger = lock(&inner.ledger);
        if ledger.block() == NEVER_POLLED {
            ledger.set_block(block_number as i64 - 1);
        }
    }

    let emitted = lock(&inner.ledger).block();
    if (block_number as i64 - emitted).unsigned_abs() > inner.skew_threshold {
        warn!(
            poll_id,
            previous = emitted,
            current = block_number,
            "block height skew exceeds threshold"
        );
        let skew = ProviderError::BlockSkew {
            previous: emitted.max(0) as u64,
            current: block_number,
        };
        emit_event(inner, &EventTag::ERROR, ProviderEvent::Error(skew));
        emit_event(inner, &EventTag::BLOCK, ProviderEvent::Block(block_number));
    } else {
        for number in (emitted + 1)..=(block_number as i64) {
            emit_event(inner, &EventTag::BLOCK, ProviderEvent::Block(number as u64));
        }
    }

    {
        let mut ledger = lock(&inner.ledger);
        if ledger.block() != block_number as i64 {
            ledger.set_block(block_number as i64);
            ledger.sweep(block_number, inner.eviction_horizon);
        }
    }

    if last_block_number == NEVER_POLLED {
        lock(&inner.chain).last_block_number = block_number as i64 - 1;
    }
    let from_block = (lock(&inner.chain).last_block_number + 1).max(0) as u64;

    // Re-check every transaction/filter subscription against the backend.
    // Failures stay on the error channel; one bad check cannot stall the
    // tick or the other subscriptions.
    let targets = lock(&inner.subscriptions).poll_targets();
    let mut checks = Vec::with_capacity(targets.len());
    for target in targets {
        let task = Arc::clone(inner);
        match target {
            EventTag::Transaction(hash) => {
                checks.push(inner.runtime.spawn(async move {
                    check_transaction(&task, hash).await;
                }));
            }
            EventTag::Filter(filter) => {
                checks.push(inner.runtime.spawn(async move {
                    check_filter(&task, filter, from_block, block_number).await;
                }));
            }
            _ => {}
        }
    }

    lock(&inner.chain).last_block_number = block_number as i64;

    // The tick is closed by `didPoll` only after every check settles.
    let finisher = Arc::clone(inner);
    inner.runtime.spawn(async move {
        for check in checks {
            let _ = check.await;
        }
        emit_event(&finisher, &EventTag::DID_POLL, ProviderEvent::DidPoll { id: poll_id });
    });
}

async fn check_transaction<B: Backend>(inner: &Arc<Inner<B>>, hash: B256) {
    let receipt = match fetch_receipt(inner, hash).await {
        Ok(receipt) => receipt,
        Err(err) => {
            debug!(%hash, error = %err, "receipt check failed");
            emit_event(inner, &EventTag::ERROR, ProviderEvent::Error(err));
            return;
        }
    };
    // Absent or unmined: leave the subscription armed for the next tick.
    let Some(receipt) = receipt else { return };
    let Some(number) = receipt.block_number else { return };

    lock(&inner.ledger).insert(SeenKey::Transaction(hash), BlockPosition::Number(number));
    emit_event(inner, &EventTag::Transaction(hash), ProviderEvent::Receipt(receipt));
}

pub(crate) async fn fetch_receipt<B: Backend>(
    inner: &Arc<Inner<B>>,
    hash: B256,
) -> Result<Option<TransactionReceipt>, ProviderError> {
    let raw = inner
        .backend
        .perform(BackendRequest::TransactionReceipt { hash })
        .await
        .map_err(ProviderError::from)?;
    if raw.is_null() {
        return Ok(None);
    }
    inner.formatter.receipt(raw).map(Some)
}

async fn check_filter<B: Backend>(
    inner: &Arc<Inner<B>>,
    filter: LogFilter,
    from_block: u64,
    to_block: u64,
) {
    let tag = EventTag::Filter(filter.clone());
    let request = BackendRequest::Logs {
        filter,
        from_block: BlockTag::Number(from_block),
        to_block: BlockTag::Number(to_block),
    };
    let logs = match inner.backend.perform(request).await {
        Ok(raw) => match inner.formatter.logs(raw) {
            Ok(logs) => logs,
            Err(err) => {
                emit_event(inner, &EventTag::ERROR, ProviderEvent::Error(err));
                return;
            }
        },
        Err(err) => {
            debug!(from_block, to_block, error = %err, "log check failed");
            emit_event(inner, &EventTag::ERROR, ProviderEvent::Error(err.into()));
            return;
        }
    };

    for log in logs {
        {
            let position = BlockPosition::Number(log.block_number);
            let mut ledger = lock(&inner.ledger);
            ledger.insert(SeenKey::Block(log.block_hash), position);
            ledger.insert(SeenKey::Transaction(log.transaction_hash), position);
        }
        emit_event(inner, &tag, ProviderEvent::Log(log));
    }
}
