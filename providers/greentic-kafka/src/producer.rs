//! Producer seam between the backend and the Kafka client.
//!
//! [`KafkaBackend`](crate::KafkaBackend) only talks to [`EventProducer`]s
//! built by a [`ProducerFactory`]. [`RdKafkaFactory`] is the production
//! implementation over librdkafka.

use std::time::Duration;

use async_trait::async_trait;
use greentic_events_spec::{Error, Result};
use rdkafka::error::KafkaError;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::util::Timeout;
use tracing::{debug, warn};

use crate::config::{Balancer, KafkaConfig};

pub const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_METADATA_TIMEOUT: Duration = Duration::from_secs(10);

/// A live, configured producer owned by one subscription handle.
#[async_trait]
pub trait EventProducer: Send + Sync {
    /// Produce one message. Synchronous producers resolve once the broker
    /// acknowledged it per the configured acks; asynchronous ones once it is
    /// enqueued.
    async fn publish(&self, key: &str, payload: &[u8]) -> Result<()>;

    /// Round-trip to the cluster.
    async fn verify(&self) -> Result<()>;

    /// Flush outstanding messages. Called once, when the handle leaves the
    /// registry.
    async fn close(&self) -> Result<()>;
}

pub trait ProducerFactory: Send + Sync {
    type Producer: EventProducer + 'static;

    fn create(&self, config: &KafkaConfig) -> Result<Self::Producer>;
}

#[derive(Debug, Clone)]
pub struct RdKafkaFactory {
    flush_timeout: Duration,
    metadata_timeout: Duration,
}

impl Default for RdKafkaFactory {
    fn default() -> Self {
        Self {
            flush_timeout: DEFAULT_FLUSH_TIMEOUT,
            metadata_timeout: DEFAULT_METADATA_TIMEOUT,
        }
    }
}

impl RdKafkaFactory {
    /// Upper bound on the flush performed when a producer is released.
    pub fn with_flush_timeout(mut self, timeout: Duration) -> Self {
        self.flush_timeout = timeout;
        self
    }

    /// Upper bound on the metadata request behind `verify_connection`.
    pub fn with_metadata_timeout(mut self, timeout: Duration) -> Self {
        self.metadata_timeout = timeout;
        self
    }
}

impl ProducerFactory for RdKafkaFactory {
    type Producer = RdKafkaProducer;

    fn create(&self, config: &KafkaConfig) -> Result<RdKafkaProducer> {
        if config.balancer == Balancer::LeastBytes {
            debug!(
                topic = %config.topic,
                "least_bytes balancing unavailable, partitioning by key hash"
            );
        }
        if let Some(server_name) = &config.tls.server_name {
            warn!(
                topic = %config.topic,
                server_name = %server_name,
                "tls_server_name is not supported by the Kafka client and is ignored"
            );
        }

        let producer: FutureProducer = config.client_config().create().map_err(|err| {
            Error::invalid_config(format!("failed to create Kafka producer: {err}"))
        })?;

        Ok(RdKafkaProducer {
            producer,
            topic: config.topic.clone(),
            asynchronous: config.asynchronous,
            flush_timeout: self.flush_timeout,
            metadata_timeout: self.metadata_timeout,
        })
    }
}

pub struct RdKafkaProducer {
    producer: FutureProducer,
    topic: String,
    asynchronous: bool,
    flush_timeout: Duration,
    metadata_timeout: Duration,
}

impl RdKafkaProducer {
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[async_trait]
impl EventProducer for RdKafkaProducer {
    async fn publish(&self, key: &str, payload: &[u8]) -> Result<()> {
        let record = FutureRecord::to(&self.topic).key(key).payload(payload);

        if self.asynchronous {
            // The delivery future is dropped; librdkafka keeps the message
            // queued and reports its outcome only to the log.
            return self
                .producer
                .send_result(record)
                .map(drop)
                .map_err(|(err, _record)| map_kafka_error(err));
        }

        self.producer
            .send(record, Timeout::Never)
            .await
            .map(drop)
            .map_err(|(err, _message)| map_kafka_error(err))
    }

    async fn verify(&self) -> Result<()> {
        let producer = self.producer.clone();
        let topic = self.topic.clone();
        let timeout = self.metadata_timeout;
        let metadata = tokio::task::spawn_blocking(move || {
            producer.client().fetch_metadata(Some(topic.as_str()), timeout)
        })
        .await
        .map_err(|err| Error::Transport(format!("metadata request aborted: {err}")))?
        .map_err(|err| Error::Transport(format!("failed to reach brokers: {err}")))?;

        if metadata.brokers().is_empty() {
            return Err(Error::Transport("cluster metadata listed no brokers".into()));
        }
        debug!(
            topic = %self.topic,
            brokers = metadata.brokers().len(),
            "broker connection verified"
        );
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let producer = self.producer.clone();
        let timeout = self.flush_timeout;
        tokio::task::spawn_blocking(move || producer.flush(timeout))
            .await
            .map_err(|err| Error::Transport(format!("flush aborted: {err}")))?
            .map_err(|err| Error::Transport(format!("flush failed: {err}")))
    }
}

/// Local delivery failures (timeouts, full queue, unreachable brokers) are
/// transport errors; anything the broker answered with is a broker error.
pub(crate) fn map_kafka_error(err: KafkaError) -> Error {
    match err {
        KafkaError::MessageProduction(code) => match code {
            RDKafkaErrorCode::MessageTimedOut
            | RDKafkaErrorCode::QueueFull
            | RDKafkaErrorCode::BrokerTransportFailure
            | RDKafkaErrorCode::AllBrokersDown
            | RDKafkaErrorCode::RequestTimedOut => Error::Transport(code.to_string()),
            other => Error::Broker(other.to_string()),
        },
        other => Error::Transport(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broker_rejections_map_to_broker_errors() {
        let err = map_kafka_error(KafkaError::MessageProduction(
            RDKafkaErrorCode::MessageSizeTooLarge,
        ));
        assert!(matches!(err, Error::Broker(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn local_delivery_failures_map_to_transport_errors() {
        for code in [
            RDKafkaErrorCode::MessageTimedOut,
            RDKafkaErrorCode::QueueFull,
            RDKafkaErrorCode::AllBrokersDown,
        ] {
            let err = map_kafka_error(KafkaError::MessageProduction(code));
            assert!(matches!(err, Error::Transport(_)), "{code:?}");
        }
        assert!(matches!(
            map_kafka_error(KafkaError::Canceled),
            Error::Transport(_)
        ));
    }

    #[test]
    fn factory_builds_plaintext_producer_without_network() {
        let mut config = KafkaConfig::new(vec!["127.0.0.1:9".into()], "events");
        config.tls.enabled = false;
        let producer = RdKafkaFactory::default()
            .create(&config)
            .expect("client construction does not connect");
        assert_eq!(producer.topic(), "events");
    }

    #[test]
    fn factory_builds_tls_producer_from_defaults() {
        let config = KafkaConfig::new(vec!["127.0.0.1:9".into()], "events");
        assert!(config.tls.enabled);
        let producer = RdKafkaFactory::default()
            .create(&config)
            .expect("default build carries the ssl transport");
        assert_eq!(producer.topic(), "events");
    }

    #[test]
    fn factory_rejects_properties_the_client_refuses() {
        let mut config = KafkaConfig::new(vec!["127.0.0.1:9".into()], "events");
        config.tls.enabled = false;
        config.batch.size = Some(0);
        let err = RdKafkaFactory::default()
            .create(&config)
            .err()
            .expect("batch.num.messages=0 is out of range");
        assert!(matches!(err, Error::InvalidConfig(_)));
    }
}
