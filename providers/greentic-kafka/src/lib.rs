//! Kafka event subscription backend.
//!
//! Each subscription owns one producer writing to the subscription's topic,
//! keyed by the subscription id. Sends retry with jittered exponential
//! backoff; unsubscribe and close flush and release producers.

pub mod config;
pub mod producer;
mod tls;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use greentic_events_spec::prelude::*;
use greentic_events_spec::validate_subscription_id;
use greentic_events_support::run_cancellable;
use greentic_events_support::telemetry::{operation_span, subscription_span};
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn, Instrument, Span};

pub use config::{
    Balancer, BatchConfig, KafkaConfig, RequiredAcks, RetryPolicy, SaslConfig, SaslMechanism,
    TlsConfig,
};
pub use producer::{EventProducer, ProducerFactory, RdKafkaFactory, RdKafkaProducer};

pub const PLUGIN_NAME: &str = "kafka";

/// A registered subscription: its decoded configuration and live producer.
pub struct SubscriptionHandle<P> {
    id: String,
    config: KafkaConfig,
    producer: P,
}

impl<P> SubscriptionHandle<P> {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &KafkaConfig {
        &self.config
    }

    pub fn producer(&self) -> &P {
        &self.producer
    }
}

pub struct KafkaBackend<F: ProducerFactory = RdKafkaFactory> {
    factory: F,
    version: String,
    subscriptions: RwLock<HashMap<String, Arc<SubscriptionHandle<F::Producer>>>>,
    // Serializes subscribe, unsubscribe and close across their awaits. Sends
    // only take the registry read lock.
    mutations: tokio::sync::Mutex<()>,
    closed: AtomicBool,
}

impl KafkaBackend<RdKafkaFactory> {
    pub fn new() -> Self {
        Self::with_factory(RdKafkaFactory::default())
    }
}

impl Default for KafkaBackend<RdKafkaFactory> {
    fn default() -> Self {
        Self::new()
    }
}

/// Backend with the librdkafka factory behind the dynamic plugin type.
pub fn new_plugin() -> DynEventPlugin {
    Arc::new(KafkaBackend::new())
}

impl<F: ProducerFactory> KafkaBackend<F> {
    pub fn with_factory(factory: F) -> Self {
        Self {
            factory,
            version: env!("CARGO_PKG_VERSION").to_string(),
            subscriptions: RwLock::new(HashMap::new()),
            mutations: tokio::sync::Mutex::new(()),
            closed: AtomicBool::new(false),
        }
    }

    /// Report `version` in [`PluginMetadata`] instead of the crate version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    pub fn contains(&self, subscription_id: &str) -> bool {
        self.subscriptions.read().contains_key(subscription_id)
    }

    pub fn handle(&self, subscription_id: &str) -> Option<Arc<SubscriptionHandle<F::Producer>>> {
        self.subscriptions.read().get(subscription_id).cloned()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn subscribe_inner(
        &self,
        ctx: &CancellationToken,
        request: SubscribeRequest,
    ) -> Result<()> {
        validate_subscription_id(&request.subscription_id)?;
        let _guard = run_cancellable(ctx, self.mutations.lock()).await?;
        if self.is_closed() {
            return Err(Error::Closed);
        }

        let config = KafkaConfig::from_map(&request.config)?;
        let producer = self.factory.create(&config)?;

        if request.verify_connection {
            let verified = run_cancellable(ctx, producer.verify())
                .await
                .map_err(Error::from)
                .and_then(|verified| verified);
            if let Err(err) = verified {
                if let Err(release_err) = producer.close().await {
                    warn!(error = %release_err, "failed to release unverified producer");
                }
                return Err(err);
            }
        }

        let handle = Arc::new(SubscriptionHandle {
            id: request.subscription_id.clone(),
            config,
            producer,
        });
        debug!(
            topic = %handle.config.topic,
            addresses = ?handle.config.addresses,
            "subscription registered"
        );
        let previous = self
            .subscriptions
            .write()
            .insert(request.subscription_id, handle);

        if let Some(previous) = previous {
            debug!("replaced existing subscription");
            let id = previous.id.clone();
            // Release failures are logged by the release task; the new
            // subscription is in place either way.
            let released = await_release(ctx, &id, spawn_release(previous)).await;
            if let Err(Error::Cancelled) = released {
                return Err(Error::Cancelled);
            }
        }
        Ok(())
    }

    async fn send_inner(&self, ctx: &CancellationToken, request: SendRequest) -> Result<()> {
        let handle = self
            .handle(&request.subscription_id)
            .ok_or_else(|| Error::unknown_subscription(&request.subscription_id))?;

        let policy = handle.config.retry;
        let mut backoff = policy.backoff();
        let producer = &handle.producer;
        let key = handle.id.as_str();
        let payload = request.event_json.as_slice();
        let mut attempts = 0u32;

        let publish = backoff.retry(|| {
            attempts += 1;
            let attempt = attempts;
            async move {
                producer.publish(key, payload).await.inspect_err(|err| {
                    warn!(
                        attempt,
                        max_attempts = policy.max_attempts(),
                        error = %err,
                        "publish attempt failed"
                    );
                })
            }
        });

        match run_cancellable(ctx, publish).await? {
            Ok(()) => Ok(()),
            Err(exhausted) => {
                error!(
                    topic = %handle.config.topic,
                    error = %exhausted.last,
                    "giving up on event after exhausting retries"
                );
                Err(exhausted.into())
            }
        }
    }

    async fn unsubscribe_inner(
        &self,
        ctx: &CancellationToken,
        request: UnsubscribeRequest,
    ) -> Result<()> {
        let _guard = run_cancellable(ctx, self.mutations.lock()).await?;
        let removed = self.subscriptions.write().remove(&request.subscription_id);
        match removed {
            Some(handle) => {
                debug!("subscription removed");
                let id = handle.id.clone();
                await_release(ctx, &id, spawn_release(handle)).await
            }
            None => Ok(()),
        }
    }

    async fn close_inner(&self, ctx: &CancellationToken) -> Result<()> {
        let _guard = run_cancellable(ctx, self.mutations.lock()).await?;
        self.closed.store(true, Ordering::SeqCst);
        let drained: Vec<_> = self
            .subscriptions
            .write()
            .drain()
            .map(|(_, handle)| handle)
            .collect();

        // Every release starts before the first wait, so a cancelled close
        // still flushes each producer once in the background.
        let releases: Vec<_> = drained
            .into_iter()
            .map(|handle| (handle.id.clone(), spawn_release(handle)))
            .collect();

        let mut errors = Vec::new();
        for (id, release) in releases {
            match await_release(ctx, &id, release).await {
                Ok(()) => {}
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(err) => errors.push(err),
            }
        }
        Error::join(errors)
    }
}

/// Start flushing a handle's producer on its own task. The flush runs to
/// completion even if nobody waits for it.
fn spawn_release<P: EventProducer + 'static>(
    handle: Arc<SubscriptionHandle<P>>,
) -> JoinHandle<Result<()>> {
    let release = async move {
        let released = handle.producer.close().await;
        match &released {
            Ok(()) => debug!(subscription_id = %handle.id, "producer released"),
            Err(err) => {
                warn!(subscription_id = %handle.id, error = %err, "producer release failed")
            }
        }
        released
    };
    tokio::spawn(release.instrument(Span::current()))
}

/// Wait for a release started by [`spawn_release`]. Cancellation
/// stops the wait, not the flush.
async fn await_release(
    ctx: &CancellationToken,
    id: &str,
    release: JoinHandle<Result<()>>,
) -> Result<()> {
    match run_cancellable(ctx, release).await? {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(Error::Release {
            id: id.to_string(),
            reason: err.to_string(),
        }),
        Err(join) => Err(Error::Release {
            id: id.to_string(),
            reason: format!("release task failed: {join}"),
        }),
    }
}

#[async_trait]
impl<F: ProducerFactory> EventSubscriptionPlugin for KafkaBackend<F> {
    async fn subscribe(&self, ctx: &CancellationToken, request: SubscribeRequest) -> Result<()> {
        let span = subscription_span(PLUGIN_NAME, "subscribe", &request.subscription_id);
        self.subscribe_inner(ctx, request).instrument(span).await
    }

    async fn send(&self, ctx: &CancellationToken, request: SendRequest) -> Result<()> {
        let span = subscription_span(PLUGIN_NAME, "send", &request.subscription_id);
        self.send_inner(ctx, request).instrument(span).await
    }

    async fn unsubscribe(
        &self,
        ctx: &CancellationToken,
        request: UnsubscribeRequest,
    ) -> Result<()> {
        let span = subscription_span(PLUGIN_NAME, "unsubscribe", &request.subscription_id);
        self.unsubscribe_inner(ctx, request).instrument(span).await
    }

    fn plugin_metadata(&self) -> PluginMetadata {
        PluginMetadata::new(PLUGIN_NAME, self.version.clone())
    }

    async fn close(&self, ctx: &CancellationToken) -> Result<()> {
        self.close_inner(ctx)
            .instrument(operation_span(PLUGIN_NAME, "close"))
            .await
    }
}
