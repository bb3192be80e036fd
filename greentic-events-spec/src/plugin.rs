use crate::error::Result;
use crate::types::{PluginMetadata, SendRequest, SubscribeRequest, UnsubscribeRequest};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Operations a host drives on an event delivery backend.
///
/// `subscribe`, `unsubscribe` and `close` mutate the backend's subscription
/// registry and are serialized against each other. Any number of `send`
/// calls may run concurrently; each observes a single registered handle.
/// Every operation honours the caller's cancellation token.
#[async_trait]
pub trait EventSubscriptionPlugin: Send + Sync {
    /// Install or replace the subscription named in `request`. A replaced
    /// subscription has its resources released.
    async fn subscribe(&self, ctx: &CancellationToken, request: SubscribeRequest) -> Result<()>;

    /// Deliver an event. Unknown subscriptions yield
    /// [`Error::UnknownSubscription`](crate::Error::UnknownSubscription).
    async fn send(&self, ctx: &CancellationToken, request: SendRequest) -> Result<()>;

    /// Remove a subscription. Unknown ids are a successful no-op.
    async fn unsubscribe(&self, ctx: &CancellationToken, request: UnsubscribeRequest)
        -> Result<()>;

    fn plugin_metadata(&self) -> PluginMetadata;

    /// Release every subscription and shut the backend down.
    async fn close(&self, ctx: &CancellationToken) -> Result<()>;
}

#[async_trait]
impl<T> EventSubscriptionPlugin for Arc<T>
where
    T: EventSubscriptionPlugin + ?Sized,
{
    async fn subscribe(&self, ctx: &CancellationToken, request: SubscribeRequest) -> Result<()> {
        (**self).subscribe(ctx, request).await
    }

    async fn send(&self, ctx: &CancellationToken, request: SendRequest) -> Result<()> {
        (**self).send(ctx, request).await
    }

    async fn unsubscribe(
        &self,
        ctx: &CancellationToken,
        request: UnsubscribeRequest,
    ) -> Result<()> {
        (**self).unsubscribe(ctx, request).await
    }

    fn plugin_metadata(&self) -> PluginMetadata {
        (**self).plugin_metadata()
    }

    async fn close(&self, ctx: &CancellationToken) -> Result<()> {
        (**self).close(ctx).await
    }
}

#[async_trait]
impl<T> EventSubscriptionPlugin for Box<T>
where
    T: EventSubscriptionPlugin + ?Sized,
{
    async fn subscribe(&self, ctx: &CancellationToken, request: SubscribeRequest) -> Result<()> {
        (**self).subscribe(ctx, request).await
    }

    async fn send(&self, ctx: &CancellationToken, request: SendRequest) -> Result<()> {
        (**self).send(ctx, request).await
    }

    async fn unsubscribe(
        &self,
        ctx: &CancellationToken,
        request: UnsubscribeRequest,
    ) -> Result<()> {
        (**self).unsubscribe(ctx, request).await
    }

    fn plugin_metadata(&self) -> PluginMetadata {
        (**self).plugin_metadata()
    }

    async fn close(&self, ctx: &CancellationToken) -> Result<()> {
        (**self).close(ctx).await
    }
}
