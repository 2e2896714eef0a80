use polling_provider::test_utils::MockBackend;
use polling_provider::PollingProvider;

/// Builds a provider over a scripted backend on chain 1.
#[allow(dead_code)]
pub async fn setup(head: u64) -> (MockBackend, PollingProvider<MockBackend>) {
    let backend = MockBackend::new(1, head);
    let provider = PollingProvider::builder(backend.clone())
        .build()
        .await
        .expect("provider builds");
    (backend, provider)
}
