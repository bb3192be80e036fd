use crate::{
    assert_delivered, assert_error_kind, medium_event, small_event, Capabilities, DeliveryProbe,
    TestEnv,
};
use anyhow::{Context, Result};
use greentic_events_spec::{
    CancellationToken, ConfigMap, ErrorKind, EventSubscriptionPlugin, SendRequest,
    SubscribeRequest, UnsubscribeRequest,
};

/// Runs the shared conformance suite against an event plugin.
pub struct ConformanceSuite<'a, P, D>
where
    P: EventSubscriptionPlugin + ?Sized,
    D: DeliveryProbe + ?Sized,
{
    plugin_name: String,
    plugin: &'a P,
    probe: &'a D,
    config: ConfigMap,
    caps: Capabilities,
    env: TestEnv,
}

impl<'a, P, D> ConformanceSuite<'a, P, D>
where
    P: EventSubscriptionPlugin + ?Sized,
    D: DeliveryProbe + ?Sized,
{
    /// `config` must be a configuration the plugin accepts.
    pub fn new(
        plugin_name: impl Into<String>,
        plugin: &'a P,
        probe: &'a D,
        config: ConfigMap,
        caps: Capabilities,
    ) -> Self {
        let plugin_name = plugin_name.into();
        Self {
            env: TestEnv::from_env(&plugin_name),
            plugin_name,
            plugin,
            probe,
            config,
            caps,
        }
    }

    pub fn env(&self) -> &TestEnv {
        &self.env
    }

    pub async fn run(&self) -> Result<()> {
        let ctx = CancellationToken::new();
        let name = self.plugin_name.as_str();

        let metadata = self.plugin.plugin_metadata();
        if metadata.name.is_empty() || metadata.version.is_empty() {
            anyhow::bail!("{name}: plugin metadata is incomplete ({metadata})");
        }

        let id = self.env.prefix.subscription_id("events");
        assert_error_kind(
            self.plugin
                .send(&ctx, SendRequest::new(&id, small_event()))
                .await,
            ErrorKind::UnknownSubscription,
            "send before subscribe",
        )?;

        self.subscribe(&ctx, &id).await?;
        let first = small_event();
        let second = medium_event();
        self.send(&ctx, &id, &first).await?;
        self.send(&ctx, &id, &second).await?;
        assert_delivered(self.probe, name, &id, &[first.clone(), second.clone()]).await?;

        // Re-subscribing replaces the handle; the id stays usable.
        self.subscribe(&ctx, &id).await?;
        let third = small_event();
        self.send(&ctx, &id, &third).await?;
        assert_delivered(self.probe, name, &id, &[first, second, third]).await?;

        let cancelled = CancellationToken::new();
        cancelled.cancel();
        assert_error_kind(
            self.plugin
                .send(&cancelled, SendRequest::new(&id, small_event()))
                .await,
            ErrorKind::Cancelled,
            "send with cancelled context",
        )?;

        self.plugin
            .unsubscribe(&ctx, UnsubscribeRequest::new(&id))
            .await
            .with_context(|| format!("unsubscribe failed for {name}:{id}"))?;
        assert_error_kind(
            self.plugin
                .send(&ctx, SendRequest::new(&id, small_event()))
                .await,
            ErrorKind::UnknownSubscription,
            "send after unsubscribe",
        )?;
        self.plugin
            .unsubscribe(&ctx, UnsubscribeRequest::new(&id))
            .await
            .with_context(|| format!("repeated unsubscribe failed for {name}:{id}"))?;

        if let Some(invalid) = &self.caps.invalid_config {
            let bad = self.env.prefix.subscription_id("invalid");
            assert_error_kind(
                self.plugin
                    .subscribe(&ctx, SubscribeRequest::new(&bad, invalid.clone()))
                    .await,
                ErrorKind::InvalidConfig,
                "subscribe with invalid configuration",
            )?;
            assert_error_kind(
                self.plugin
                    .send(&ctx, SendRequest::new(&bad, small_event()))
                    .await,
                ErrorKind::UnknownSubscription,
                "send after rejected subscribe",
            )?;
        }

        if self.caps.close {
            let last = self.env.prefix.subscription_id("close");
            self.subscribe(&ctx, &last).await?;
            self.plugin
                .close(&ctx)
                .await
                .with_context(|| format!("close failed for {name}"))?;
            assert_error_kind(
                self.plugin
                    .send(&ctx, SendRequest::new(&last, small_event()))
                    .await,
                ErrorKind::UnknownSubscription,
                "send after close",
            )?;
            if self
                .plugin
                .subscribe(&ctx, SubscribeRequest::new(&last, self.config.clone()))
                .await
                .is_ok()
            {
                anyhow::bail!("{name}: subscribe succeeded after close");
            }
        }

        Ok(())
    }

    async fn subscribe(&self, ctx: &CancellationToken, id: &str) -> Result<()> {
        self.plugin
            .subscribe(ctx, SubscribeRequest::new(id, self.config.clone()))
            .await
            .with_context(|| format!("subscribe failed for {}:{id}", self.plugin_name))
    }

    async fn send(&self, ctx: &CancellationToken, id: &str, event: &[u8]) -> Result<()> {
        self.plugin
            .send(ctx, SendRequest::new(id, event))
            .await
            .with_context(|| format!("send failed for {}:{id}", self.plugin_name))
    }
}
