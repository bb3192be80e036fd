//! In-memory producers for exercising the backend without a broker.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use events_provider_kafka::{EventProducer, KafkaConfig, ProducerFactory};
use events_provider_tests::DeliveryProbe;
use greentic_events_spec::{ConfigMap, Error, Result};
use parking_lot::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub producer: usize,
    pub topic: String,
    pub key: String,
    pub payload: Vec<u8>,
}

#[derive(Debug, Default)]
struct State {
    created: usize,
    closed: Vec<usize>,
    flushed: Vec<usize>,
    attempts: usize,
    published: Vec<Published>,
    fail_publishes: usize,
    fail_verify: bool,
    fail_close: bool,
    publish_delay: Option<Duration>,
    verify_delay: Option<Duration>,
    close_delay: Option<Duration>,
}

/// Shared view of everything the recording producers did.
#[derive(Clone, Default)]
pub struct Recorder {
    state: Arc<Mutex<State>>,
}

impl Recorder {
    pub fn fail_next_publishes(&self, count: usize) {
        self.state.lock().fail_publishes = count;
    }

    pub fn fail_verify(&self) {
        self.state.lock().fail_verify = true;
    }

    pub fn fail_close(&self) {
        self.state.lock().fail_close = true;
    }

    pub fn delay_publishes(&self, delay: Duration) {
        self.state.lock().publish_delay = Some(delay);
    }

    pub fn delay_verify(&self, delay: Duration) {
        self.state.lock().verify_delay = Some(delay);
    }

    /// Releases are recorded when they start, then stall for `delay`.
    pub fn delay_close(&self, delay: Duration) {
        self.state.lock().close_delay = Some(delay);
    }

    pub fn created(&self) -> usize {
        self.state.lock().created
    }

    /// Serial numbers of released producers, in release order.
    pub fn closed(&self) -> Vec<usize> {
        self.state.lock().closed.clone()
    }

    /// Serial numbers of producers whose release ran to completion.
    pub fn flushed(&self) -> Vec<usize> {
        self.state.lock().flushed.clone()
    }

    pub fn attempts(&self) -> usize {
        self.state.lock().attempts
    }

    pub fn published(&self) -> Vec<Published> {
        self.state.lock().published.clone()
    }
}

#[async_trait]
impl DeliveryProbe for Recorder {
    async fn delivered(&self, subscription_id: &str) -> AnyResult<Vec<Vec<u8>>> {
        Ok(self
            .published()
            .into_iter()
            .filter(|message| message.key == subscription_id)
            .map(|message| message.payload)
            .collect())
    }
}

pub struct RecordingFactory {
    recorder: Recorder,
}

impl RecordingFactory {
    pub fn new(recorder: Recorder) -> Self {
        Self { recorder }
    }
}

impl ProducerFactory for RecordingFactory {
    type Producer = RecordingProducer;

    fn create(&self, config: &KafkaConfig) -> Result<RecordingProducer> {
        let mut state = self.recorder.state.lock();
        state.created += 1;
        Ok(RecordingProducer {
            serial: state.created,
            topic: config.topic.clone(),
            recorder: self.recorder.clone(),
        })
    }
}

pub struct RecordingProducer {
    serial: usize,
    topic: String,
    recorder: Recorder,
}

impl RecordingProducer {
    pub fn serial(&self) -> usize {
        self.serial
    }
}

#[async_trait]
impl EventProducer for RecordingProducer {
    async fn publish(&self, key: &str, payload: &[u8]) -> Result<()> {
        let delay = self.recorder.state.lock().publish_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.recorder.state.lock();
        state.attempts += 1;
        if state.fail_publishes > 0 {
            state.fail_publishes -= 1;
            return Err(Error::Transport(format!(
                "injected failure on attempt {}",
                state.attempts
            )));
        }
        state.published.push(Published {
            producer: self.serial,
            topic: self.topic.clone(),
            key: key.to_string(),
            payload: payload.to_vec(),
        });
        Ok(())
    }

    async fn verify(&self) -> Result<()> {
        let delay = self.recorder.state.lock().verify_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.recorder.state.lock().fail_verify {
            return Err(Error::Transport("broker unreachable".into()));
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let delay = {
            let mut state = self.recorder.state.lock();
            state.closed.push(self.serial);
            state.close_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.recorder.state.lock();
        if state.fail_close {
            return Err(Error::Transport("flush failed".into()));
        }
        state.flushed.push(self.serial);
        Ok(())
    }
}

/// Plaintext config with a fast retry schedule.
pub fn config(topic: &str) -> ConfigMap {
    ConfigMap::new()
        .with("addresses", "localhost:9092")
        .with("topic", topic)
        .with("tls_disabled", true)
        .with("retry_min_backoff", "1ms")
        .with("retry_max_backoff", "4ms")
}
