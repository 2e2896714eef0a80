use polling_provider::{assert_event, Network, ProviderError, ProviderEvent, Sentinel};

mod common;
use common::setup;

#[tokio::test(start_paused = true)]
async fn detected_identity_is_fixed_afterwards() -> anyhow::Result<()> {
    let (backend, provider) = setup(10).await;

    let network = provider.get_network().await?;
    assert_eq!(network, Network::from_chain_id(1));

    // Concurrent resolutions agree.
    let (a, b) = tokio::join!(provider.get_network(), provider.get_network());
    assert_eq!(a?, b?);

    backend.set_chain_id(5);
    let err = provider.get_network().await.unwrap_err();
    assert!(matches!(err, ProviderError::NetworkChanged { .. }));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn supplied_identity_mismatch_is_fatal_and_emitted() -> anyhow::Result<()> {
    let backend = polling_provider::test_utils::MockBackend::new(5, 10);
    let provider = polling_provider::PollingProvider::builder(backend.clone())
        .network(Network::from_chain_id(1))
        .build()
        .await?;
    let mut errors = provider.subscribe(Sentinel::Error)?;

    let err = provider.get_network().await.unwrap_err();
    let ProviderError::NetworkChanged { from, to } = err else {
        panic!("expected NetworkChanged, got: {err:?}");
    };
    assert_eq!(from.chain_id, 1);
    assert_eq!(to.chain_id, 5);

    assert_event!(errors, ProviderEvent::Error(ProviderError::NetworkChanged { .. }));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn dynamic_provider_adopts_the_new_identity_and_resets() -> anyhow::Result<()> {
    let backend = polling_provider::test_utils::MockBackend::new(1, 100);
    let provider = polling_provider::PollingProvider::builder(backend.clone())
        .dynamic_network()
        .build()
        .await?;

    let mut blocks = provider.subscribe(Sentinel::Block)?;
    let mut networks = provider.subscribe(Sentinel::Network)?;

    assert_eq!(provider.get_network().await?.chain_id, 1);
    assert_event!(blocks, ProviderEvent::Block(100));

    // The backend moves to another chain.
    backend.set_chain_id(5);
    backend.set_block_number(7_000);

    let adopted = provider.get_network().await?;
    assert_eq!(adopted.chain_id, 5);

    // Exactly one network(new, old) event, delivered before the call
    // returned.
    assert_event!(networks, ProviderEvent::Network { new, old } => {
        assert_eq!(new.chain_id, 5);
        assert_eq!(old.chain_id, 1);
    });

    // The watermark was reset: the first tick on the new chain seeds just
    // below the reported height instead of replaying from 100.
    assert_event!(blocks, ProviderEvent::Block(7_000));

    // And the same call already resolved the new identity.
    assert_eq!(provider.get_network().await?.chain_id, 5);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn network_event_is_flushed_before_get_network_returns() -> anyhow::Result<()> {
    let backend = polling_provider::test_utils::MockBackend::new(1, 10);
    let provider = polling_provider::PollingProvider::builder(backend.clone())
        .dynamic_network()
        .build()
        .await?;

    let observed = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
    let flag = std::sync::Arc::clone(&observed);
    provider.on(Sentinel::Network, move |_event| {
        flag.store(true, std::sync::atomic::Ordering::SeqCst);
    })?;

    provider.get_network().await?;
    backend.set_chain_id(5);
    provider.get_network().await?;

    // The listener ran before the adopting call returned.
    assert!(observed.load(std::sync::atomic::Ordering::SeqCst));

    Ok(())
}
