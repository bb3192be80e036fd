use anyhow::Result;
use async_trait::async_trait;

/// Read side of a backend under test: how the suite observes what a plugin
/// actually delivered.
#[async_trait]
pub trait DeliveryProbe: Send + Sync {
    /// Payloads delivered for `subscription_id`, oldest first.
    async fn delivered(&self, subscription_id: &str) -> Result<Vec<Vec<u8>>>;
}
