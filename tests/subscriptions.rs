use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use alloy_primitives::B256;
use polling_provider::{
    assert_event, assert_no_event, EventSpec, ProviderError, ProviderEvent, Sentinel,
};

mod common;
use common::setup;

#[tokio::test(start_paused = true)]
async fn emit_reports_whether_a_listener_matched() -> anyhow::Result<()> {
    let (_backend, provider) = setup(0).await;

    assert!(!provider.emit("deploy", ProviderEvent::Block(1))?);

    let mut stream = provider.subscribe("deploy")?;
    assert!(provider.emit("deploy", ProviderEvent::Block(1))?);
    assert_event!(stream, ProviderEvent::Block(1));

    // Event names are case-folded into one class.
    assert!(provider.emit("Deploy", ProviderEvent::Block(2))?);
    assert_event!(stream, ProviderEvent::Block(2));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn once_listeners_fire_a_single_time() -> anyhow::Result<()> {
    let (_backend, provider) = setup(0).await;

    let deliveries = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&deliveries);
    provider.once("deploy", move |_event| {
        seen.fetch_add(1, Ordering::SeqCst);
    })?;

    assert!(provider.emit("deploy", ProviderEvent::Block(1))?);
    assert!(!provider.emit("deploy", ProviderEvent::Block(2))?);

    // Drain the dispatcher before counting.
    let mut stream = provider.subscribe("deploy")?;
    provider.emit("deploy", ProviderEvent::Block(3))?;
    assert_event!(stream, ProviderEvent::Block(3));

    assert_eq!(deliveries.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn callbacks_may_reenter_the_provider() -> anyhow::Result<()> {
    let (_backend, provider) = setup(0).await;

    let reentrant = provider.clone();
    provider.once("deploy", move |_event| {
        // Subscribing from inside a callback must not deadlock.
        let _ = reentrant.on("error", |_event| {});
        let _ = reentrant.emit("relay", ProviderEvent::Block(9));
    })?;
    let mut relayed = provider.subscribe("relay")?;

    provider.emit("deploy", ProviderEvent::Block(1))?;
    assert_event!(relayed, ProviderEvent::Block(9));
    assert_eq!(provider.listener_count(Some(&EventSpec::parse("error")?))?, 1);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn listener_bookkeeping_by_handle() -> anyhow::Result<()> {
    let (_backend, provider) = setup(0).await;

    // The same callback can be registered twice and removed precisely.
    let callback = |_event: ProviderEvent| {};
    let first = provider.on("deploy", callback)?;
    let second = provider.on("deploy", callback)?;
    assert_ne!(first, second);

    let spec = EventSpec::parse("deploy")?;
    assert_eq!(provider.listener_count(Some(&spec))?, 2);
    assert_eq!(provider.listeners(Some(&spec))?, vec![first, second]);

    assert!(provider.unsubscribe("deploy", Some(first))?);
    assert_eq!(provider.listeners(Some(&spec))?, vec![second]);

    provider.unsubscribe_all(Some(spec.clone()))?;
    assert_eq!(provider.listener_count(Some(&spec))?, 0);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn dropping_a_stream_unsubscribes() -> anyhow::Result<()> {
    let (_backend, provider) = setup(3).await;

    let stream = provider.subscribe(Sentinel::Block)?;
    assert!(provider.polling());
    assert_eq!(provider.listener_count(None)?, 1);

    drop(stream);
    assert_eq!(provider.listener_count(None)?, 0);
    assert!(!provider.polling());

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn fork_subscriptions_are_not_implemented() -> anyhow::Result<()> {
    let (_backend, provider) = setup(0).await;

    let err = provider.on(EventSpec::Fork(B256::ZERO), |_event| {}).unwrap_err();
    assert!(matches!(err, ProviderError::NotImplemented(_)));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn a_transaction_hash_string_subscribes_to_the_transaction() -> anyhow::Result<()> {
    let (_backend, provider) = setup(0).await;

    let hash = B256::repeat_byte(0xab);
    let as_string = format!("{hash}");
    provider.on(EventSpec::parse(&as_string)?, |_event| {})?;

    // The string form and the typed form resolve to the same class.
    assert_eq!(provider.listener_count(Some(&EventSpec::Transaction(hash)))?, 1);
    assert!(provider.polling());

    provider.unsubscribe_all(None)?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn delivery_preserves_emission_order() -> anyhow::Result<()> {
    let (_backend, provider) = setup(0).await;
    let mut stream = provider.subscribe("deploy")?;

    for number in 0..100 {
        provider.emit("deploy", ProviderEvent::Block(number))?;
    }
    for expected in 0..100 {
        assert_event!(stream, ProviderEvent::Block(number) => assert_eq!(number, expected));
    }
    assert_no_event!(stream);

    Ok(())
}
