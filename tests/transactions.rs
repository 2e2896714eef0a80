use std::time::Duration;

use alloy_primitives::{keccak256, Bytes, B256};
use polling_provider::test_utils::{log_json, receipt_json, unmined_receipt_json};
use polling_provider::{assert_event, ProviderError, ProviderEvent, Sentinel};
use serde_json::json;

mod common;
use common::setup;

#[tokio::test(start_paused = true)]
async fn unknown_receipt_resolves_to_none() -> anyhow::Result<()> {
    let (_backend, provider) = setup(10).await;

    let receipt = provider.get_transaction_receipt(B256::repeat_byte(0x42)).await?;
    assert!(receipt.is_none());

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn mined_receipt_carries_confirmations() -> anyhow::Result<()> {
    let (backend, provider) = setup(105).await;

    let hash = B256::repeat_byte(0x42);
    backend.add_receipt(hash, receipt_json(hash, 100));

    let receipt = provider.get_transaction_receipt(hash).await?.expect("receipt");
    assert_eq!(receipt.block_number, Some(100));
    assert_eq!(receipt.confirmations, 6);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn submission_marks_the_hash_so_null_means_retry() -> anyhow::Result<()> {
    let (backend, provider) = setup(100).await;

    let payload = Bytes::from_static(b"signed transaction bytes");
    let pending = provider.send_raw_transaction(payload.clone()).await?;
    assert_eq!(pending.hash(), keccak256(&payload));

    // The backend has no receipt yet: the wait must keep retrying, not
    // resolve to "does not exist".
    let waiter = {
        let hash = pending.hash();
        let provider = provider.clone();
        tokio::spawn(async move { provider.wait_for_transaction(hash, 1, None).await })
    };
    let wait = pending.wait(1, None);
    tokio::pin!(wait);
    assert!(tokio::time::timeout(Duration::from_millis(200), wait.as_mut()).await.is_err());

    backend.add_receipt(pending.hash(), receipt_json(pending.hash(), 101));
    backend.set_block_number(101);

    let receipt = wait.await?;
    assert_eq!(receipt.block_number, Some(101));
    assert!(receipt.confirmations >= 1);

    let receipt = waiter.await??;
    assert_eq!(receipt.block_number, Some(101));

    // Both waits released their subscriptions.
    assert_eq!(provider.listener_count(None)?, 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn wait_counts_confirmations_before_resolving() -> anyhow::Result<()> {
    let (backend, provider) = setup(100).await;

    let hash = B256::repeat_byte(0x55);
    backend.add_receipt(hash, receipt_json(hash, 100));

    let wait = provider.wait_for_transaction(hash, 3, None);
    tokio::pin!(wait);
    assert!(tokio::time::timeout(Duration::from_millis(200), wait.as_mut()).await.is_err());

    // Two more blocks on top: 100 -> 102 makes three confirmations.
    backend.set_block_number(102);
    let receipt = wait.await?;
    assert_eq!(receipt.confirmations, 3);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn wait_times_out_and_releases_its_subscription() -> anyhow::Result<()> {
    let (_backend, provider) = setup(100).await;

    let hash = B256::repeat_byte(0x66);
    let result = provider.wait_for_transaction(hash, 1, Some(Duration::from_millis(300))).await;
    assert!(matches!(result, Err(ProviderError::Timeout)));

    assert_eq!(provider.listener_count(None)?, 0);
    assert!(!provider.polling());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn duplicate_deliveries_after_resolution_are_ignored() -> anyhow::Result<()> {
    let (backend, provider) = setup(100).await;

    let hash = B256::repeat_byte(0x77);
    backend.add_receipt(hash, receipt_json(hash, 100));

    let receipt = provider.wait_for_transaction(hash, 1, None).await?;
    assert_eq!(receipt.block_number, Some(100));
    assert_eq!(provider.listener_count(None)?, 0);

    // Keep the receipt around and poll further ticks: re-deliveries find no
    // resolved wait to disturb.
    let mut blocks = provider.subscribe(Sentinel::Block)?;
    backend.set_block_number(101);
    assert_event!(blocks, ProviderEvent::Block(100));
    assert_event!(blocks, ProviderEvent::Block(101));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn reported_hash_mismatch_is_an_unknown_error() -> anyhow::Result<()> {
    let (backend, provider) = setup(1).await;

    backend.set_send_result(json!(B256::repeat_byte(0xee)));
    let err = provider
        .send_raw_transaction(Bytes::from_static(b"payload"))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Unknown(_)));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn unmined_receipts_do_not_resolve_transaction_subscriptions() -> anyhow::Result<()> {
    let (backend, provider) = setup(100).await;

    let hash = B256::repeat_byte(0x88);
    backend.add_receipt(hash, unmined_receipt_json(hash));

    let wait = provider.wait_for_transaction(hash, 1, None);
    tokio::pin!(wait);
    assert!(tokio::time::timeout(Duration::from_millis(200), wait.as_mut()).await.is_err());

    backend.add_receipt(hash, receipt_json(hash, 101));
    backend.set_block_number(101);
    let receipt = wait.await?;
    assert_eq!(receipt.block_number, Some(101));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn witnessed_entries_are_evicted_past_the_horizon() -> anyhow::Result<()> {
    let (backend, provider) = setup(100).await;

    // Deliver a log so the ledger witnesses its transaction hash at 100.
    let tx_hash = B256::repeat_byte(0x99);
    let address = alloy_primitives::Address::repeat_byte(0x44);
    backend.push_logs(json!([log_json(
        address,
        B256::repeat_byte(0x01),
        100,
        B256::repeat_byte(0xb0),
        tx_hash,
        0,
    )]));

    let filter = polling_provider::LogFilter::new(Some(address), vec![]);
    let mut logs = provider.subscribe(filter)?;
    assert_event!(logs, ProviderEvent::Log(log) => assert_eq!(log.transaction_hash, tx_hash));

    // Within the horizon a null receipt means "retry".
    let pending_lookup = provider.get_transaction_receipt(tx_hash);
    tokio::pin!(pending_lookup);
    assert!(tokio::time::timeout(Duration::from_millis(200), pending_lookup.as_mut())
        .await
        .is_err());
    drop(pending_lookup);

    // Thirteen blocks later the entry is gone and null means "absent".
    backend.set_block_number(113);
    let mut blocks = provider.subscribe(Sentinel::Block)?;
    for expected in 101..=113 {
        assert_event!(blocks, ProviderEvent::Block(number) => assert_eq!(number, expected));
    }

    let receipt = provider.get_transaction_receipt(tx_hash).await?;
    assert!(receipt.is_none());

    Ok(())
}
