use std::time::Duration;

use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use polling_provider::test_utils::{block_json, log_json, MockBackend};
use polling_provider::{
    assert_event, BackendError, BlockTag, LogQuery, NameResolver, PollingProvider, ProviderError,
    ProviderEvent, Sentinel,
};
use serde_json::json;

mod common;
use common::setup;

#[tokio::test(start_paused = true)]
async fn get_block_resolves_known_blocks_and_none_for_unknown() -> anyhow::Result<()> {
    let (backend, provider) = setup(20).await;

    let hash = B256::repeat_byte(0x20);
    backend.add_block(20, hash, block_json(20, hash, B256::repeat_byte(0x1f)));

    let block = provider.get_block(20u64).await?.expect("block");
    assert_eq!(block.number, 20);
    assert_eq!(block.hash, hash);

    let by_hash = provider.get_block(hash).await?.expect("block");
    assert_eq!(by_hash.number, 20);

    assert!(provider.get_block(21u64).await?.is_none());
    assert!(provider.get_block(BlockTag::Latest).await?.is_none());

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn null_for_a_height_below_the_watermark_retries() -> anyhow::Result<()> {
    let (backend, provider) = setup(100).await;

    // Drive one tick so the watermark reaches 100.
    let mut blocks = provider.subscribe(Sentinel::Block)?;
    assert_event!(blocks, ProviderEvent::Block(100));

    // Height 95 must exist; a null response means the backend is lagging.
    let lookup = provider.get_block(95u64);
    tokio::pin!(lookup);
    assert!(tokio::time::timeout(Duration::from_millis(200), lookup.as_mut()).await.is_err());

    let hash = B256::repeat_byte(0x5f);
    backend.add_block(95, hash, block_json(95, hash, B256::repeat_byte(0x5e)));
    let block = lookup.await?.expect("block");
    assert_eq!(block.number, 95);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn get_logs_decodes_the_backend_payload() -> anyhow::Result<()> {
    let (backend, provider) = setup(10).await;

    let address = Address::repeat_byte(0x33);
    backend.push_logs(json!([log_json(
        address,
        B256::repeat_byte(0x02),
        9,
        B256::repeat_byte(0xb9),
        B256::repeat_byte(0xc9),
        1,
    )]));

    let logs = provider
        .get_logs(LogQuery::new().address(address).from_block(9u64).to_block(10u64))
        .await?;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].address, address);
    assert_eq!(logs[0].block_number, 9);

    Ok(())
}

struct StaticResolver(Address);

#[async_trait]
impl NameResolver for StaticResolver {
    async fn resolve_name(&self, _name: &str) -> Result<Address, BackendError> {
        Ok(self.0)
    }
}

#[tokio::test(start_paused = true)]
async fn names_resolve_through_the_configured_resolver() -> anyhow::Result<()> {
    let resolved = Address::repeat_byte(0x77);
    let backend = MockBackend::new(1, 5);
    let provider = PollingProvider::builder(backend.clone())
        .resolver(StaticResolver(resolved))
        .build()
        .await?;

    assert_eq!(provider.resolve_name("treasury.eth").await?, resolved);

    // Literal addresses bypass the resolver.
    let literal = Address::repeat_byte(0x12);
    assert_eq!(provider.resolve_name(&format!("{literal:?}")).await?, literal);

    // Named addresses participate in log queries.
    backend.push_logs(json!([]));
    let logs = provider.get_logs(LogQuery::new().address("treasury.eth")).await?;
    assert!(logs.is_empty());

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn name_resolution_without_a_resolver_is_invalid() -> anyhow::Result<()> {
    let (_backend, provider) = setup(5).await;

    let err = provider.resolve_name("treasury.eth").await.unwrap_err();
    assert!(matches!(err, ProviderError::InvalidArgument(_)));

    Ok(())
}
