//! Subscription configuration for the Kafka backend.
//!
//! Options arrive as a loosely typed [`ConfigMap`] and are decoded once per
//! `subscribe`. Unknown keys are ignored; unknown values for enumerated
//! options fall back to the default for that option.

use std::fmt;
use std::time::Duration;

use greentic_events_spec::{ConfigMap, Error, Result};
use greentic_events_support::Backoff;
use rdkafka::config::ClientConfig;
use tracing::warn;

use crate::tls::{trust_bundle, validate_ca_pem};

pub const DEFAULT_CLIENT_ID: &str = "vault.hashicorp.com";
pub const DEFAULT_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_MIN_BACKOFF: Duration = Duration::from_millis(100);
pub const DEFAULT_RETRY_MAX_BACKOFF: Duration = Duration::from_secs(5);

// librdkafka accepts retry backoffs in 1..=300000 ms.
const RDKAFKA_MAX_BACKOFF_MS: u128 = 300_000;

const KEY_ADDRESSES: &str = "addresses";
const KEY_TOPIC: &str = "topic";
const KEY_CLIENT_ID: &str = "client_id";
const KEY_BALANCER: &str = "balancer";
const KEY_REQUIRED_ACKS: &str = "required_acks";
const KEY_ASYNC: &str = "async";
const KEY_AUTO_CREATE_TOPIC: &str = "auto_create_topic";
const KEY_BATCH_SIZE: &str = "batch_size";
const KEY_BATCH_BYTES: &str = "batch_bytes";
const KEY_BATCH_TIMEOUT: &str = "batch_timeout";
const KEY_CA_PEM: &str = "ca_pem";
const KEY_TLS_SERVER_NAME: &str = "tls_server_name";
const KEY_TLS_SKIP_VERIFY: &str = "tls_skip_verify";
const KEY_TLS_DISABLED: &str = "tls_disabled";
const KEY_SASL_TYPE: &str = "sasl_type";
const KEY_USERNAME: &str = "username";
const KEY_PASSWORD: &str = "password";
const KEY_RETRIES: &str = "retries";
const KEY_RETRY_MIN_BACKOFF: &str = "retry_min_backoff";
const KEY_RETRY_MAX_BACKOFF: &str = "retry_max_backoff";

/// Partition selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Balancer {
    /// Picks a random partition per message (librdkafka `random`). The
    /// client has no strict round-robin partitioner, so spread is even only
    /// on average.
    RoundRobin,
    /// Hash of the message key. Keeps every event of a subscription on one
    /// partition.
    #[default]
    Hash,
    LeastBytes,
}

impl Balancer {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "round_robin" => Some(Self::RoundRobin),
            "hash" => Some(Self::Hash),
            "least_bytes" => Some(Self::LeastBytes),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RoundRobin => "round_robin",
            Self::Hash => "hash",
            Self::LeastBytes => "least_bytes",
        }
    }

    /// librdkafka `partitioner` value. librdkafka has no least-bytes
    /// partitioner, so that policy uses the key hash.
    pub const fn partitioner(self) -> &'static str {
        match self {
            Self::RoundRobin => "random",
            Self::Hash | Self::LeastBytes => "murmur2_random",
        }
    }
}

/// Durability policy for produced messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RequiredAcks {
    None,
    One,
    #[default]
    All,
}

impl RequiredAcks {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" => Some(Self::None),
            "one" => Some(Self::One),
            "all" => Some(Self::All),
            _ => None,
        }
    }

    /// librdkafka `acks` value.
    pub const fn as_acks(self) -> &'static str {
        match self {
            Self::None => "0",
            Self::One => "1",
            Self::All => "all",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SaslMechanism {
    Plain,
    ScramSha256,
    ScramSha512,
}

impl SaslMechanism {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "plain" => Some(Self::Plain),
            "scram_sha256" => Some(Self::ScramSha256),
            "scram_sha512" => Some(Self::ScramSha512),
            _ => None,
        }
    }

    /// librdkafka `sasl.mechanism` value.
    pub const fn as_mechanism(self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::ScramSha256 => "SCRAM-SHA-256",
            Self::ScramSha512 => "SCRAM-SHA-512",
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct SaslConfig {
    pub mechanism: SaslMechanism,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for SaslConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaslConfig")
            .field("mechanism", &self.mechanism)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsConfig {
    pub enabled: bool,
    pub ca_pem: Option<String>,
    pub server_name: Option<String>,
    pub skip_verify: bool,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ca_pem: None,
            server_name: None,
            skip_verify: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchConfig {
    pub size: Option<u64>,
    pub bytes: Option<u64>,
    pub timeout: Option<Duration>,
}

/// Retry budget for a single `send`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            min_backoff: DEFAULT_RETRY_MIN_BACKOFF,
            max_backoff: DEFAULT_RETRY_MAX_BACKOFF,
        }
    }
}

impl RetryPolicy {
    /// Total publish attempts a send may make.
    pub const fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Fresh schedule for one send.
    pub fn backoff(&self) -> Backoff {
        Backoff::new(self.retries, self.min_backoff, self.max_backoff)
    }
}

/// Decoded subscription options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KafkaConfig {
    pub addresses: Vec<String>,
    pub topic: String,
    pub client_id: String,
    pub balancer: Balancer,
    pub required_acks: RequiredAcks,
    pub asynchronous: bool,
    pub auto_create_topic: bool,
    pub batch: BatchConfig,
    pub tls: TlsConfig,
    pub sasl: Option<SaslConfig>,
    pub retry: RetryPolicy,
}

impl KafkaConfig {
    /// Shortcut for a plaintext config with defaults, mostly for hosts and
    /// tests that build configs in code.
    pub fn new(addresses: Vec<String>, topic: impl Into<String>) -> Self {
        Self {
            addresses,
            topic: topic.into(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            balancer: Balancer::default(),
            required_acks: RequiredAcks::default(),
            asynchronous: false,
            auto_create_topic: false,
            batch: BatchConfig::default(),
            tls: TlsConfig::default(),
            sasl: None,
            retry: RetryPolicy::default(),
        }
    }

    pub fn from_map(map: &ConfigMap) -> Result<Self> {
        let addresses = map.string_list(KEY_ADDRESSES)?.unwrap_or_default();
        if addresses.is_empty() {
            return Err(Error::invalid_config(
                "addresses must list at least one broker",
            ));
        }

        let topic = map
            .string(KEY_TOPIC)?
            .map(|topic| topic.trim().to_string())
            .unwrap_or_default();
        if topic.is_empty() {
            return Err(Error::invalid_config("topic must not be empty"));
        }

        let mut config = Self::new(addresses, topic);

        if let Some(client_id) = map
            .string(KEY_CLIENT_ID)?
            .filter(|id| !id.trim().is_empty())
        {
            config.client_id = client_id;
        }
        config.balancer = enum_option(map, KEY_BALANCER, Balancer::parse)?.unwrap_or_default();
        config.required_acks =
            enum_option(map, KEY_REQUIRED_ACKS, RequiredAcks::parse)?.unwrap_or_default();
        config.asynchronous = map.bool(KEY_ASYNC)?.unwrap_or(false);
        config.auto_create_topic = map.bool(KEY_AUTO_CREATE_TOPIC)?.unwrap_or(false);
        config.batch = BatchConfig {
            size: map.u64(KEY_BATCH_SIZE)?,
            bytes: map.u64(KEY_BATCH_BYTES)?,
            timeout: map.duration(KEY_BATCH_TIMEOUT)?,
        };

        config.tls = TlsConfig {
            enabled: !map.bool(KEY_TLS_DISABLED)?.unwrap_or(false),
            ca_pem: map.string(KEY_CA_PEM)?.filter(|pem| !pem.trim().is_empty()),
            server_name: map
                .string(KEY_TLS_SERVER_NAME)?
                .filter(|name| !name.trim().is_empty()),
            skip_verify: map.bool(KEY_TLS_SKIP_VERIFY)?.unwrap_or(false),
        };
        if config.tls.enabled {
            if let Some(pem) = &config.tls.ca_pem {
                validate_ca_pem(pem)?;
            }
        }

        if let Some(mechanism) = enum_option(map, KEY_SASL_TYPE, SaslMechanism::parse)? {
            config.sasl = Some(SaslConfig {
                mechanism,
                username: map.string(KEY_USERNAME)?.unwrap_or_default(),
                password: map.string(KEY_PASSWORD)?.unwrap_or_default(),
            });
        }

        config.retry = RetryPolicy {
            retries: match map.u64(KEY_RETRIES)? {
                Some(retries) => u32::try_from(retries).map_err(|_| {
                    Error::invalid_config(format!("{KEY_RETRIES}: {retries} is too large"))
                })?,
                None => DEFAULT_RETRIES,
            },
            min_backoff: map
                .duration(KEY_RETRY_MIN_BACKOFF)?
                .unwrap_or(DEFAULT_RETRY_MIN_BACKOFF),
            max_backoff: map
                .duration(KEY_RETRY_MAX_BACKOFF)?
                .unwrap_or(DEFAULT_RETRY_MAX_BACKOFF),
        };
        if config.retry.min_backoff > config.retry.max_backoff {
            return Err(Error::invalid_config(format!(
                "{KEY_RETRY_MIN_BACKOFF} ({:?}) exceeds {KEY_RETRY_MAX_BACKOFF} ({:?})",
                config.retry.min_backoff, config.retry.max_backoff
            )));
        }

        Ok(config)
    }

    pub fn security_protocol(&self) -> &'static str {
        match (self.tls.enabled, self.sasl.is_some()) {
            (false, false) => "plaintext",
            (true, false) => "ssl",
            (false, true) => "sasl_plaintext",
            (true, true) => "sasl_ssl",
        }
    }

    /// Translate into librdkafka producer properties.
    pub fn client_config(&self) -> ClientConfig {
        let mut client = ClientConfig::new();
        client
            .set("bootstrap.servers", self.addresses.join(","))
            .set("client.id", &self.client_id)
            .set("partitioner", self.balancer.partitioner())
            .set("acks", self.required_acks.as_acks())
            .set(
                "allow.auto.create.topics",
                self.auto_create_topic.to_string(),
            )
            .set("retries", self.retry.retries.to_string())
            .set("retry.backoff.ms", backoff_ms(self.retry.min_backoff))
            .set("retry.backoff.max.ms", backoff_ms(self.retry.max_backoff))
            .set("security.protocol", self.security_protocol());

        if let Some(size) = self.batch.size {
            client.set("batch.num.messages", size.to_string());
        }
        if let Some(bytes) = self.batch.bytes {
            client.set("batch.size", bytes.to_string());
        }
        if let Some(timeout) = self.batch.timeout {
            client.set("linger.ms", timeout.as_millis().to_string());
        }

        if self.tls.enabled {
            // `ssl.ca.pem` replaces librdkafka's default store, so the
            // platform roots travel with the extra CA.
            if let Some(pem) = &self.tls.ca_pem {
                client.set("ssl.ca.pem", trust_bundle(pem));
            }
            if self.tls.skip_verify {
                client
                    .set("enable.ssl.certificate.verification", "false")
                    .set("ssl.endpoint.identification.algorithm", "none");
            } else {
                client.set("ssl.endpoint.identification.algorithm", "https");
            }
        }

        if let Some(sasl) = &self.sasl {
            client
                .set("sasl.mechanism", sasl.mechanism.as_mechanism())
                .set("sasl.username", &sasl.username)
                .set("sasl.password", &sasl.password);
        }

        client
    }
}

/// Read an enumerated option; values outside the known set fall back to the
/// option's default.
fn enum_option<T>(
    map: &ConfigMap,
    key: &'static str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<Option<T>> {
    let Some(raw) = map.string(key)? else {
        return Ok(None);
    };
    let parsed = parse(&raw);
    if parsed.is_none() {
        warn!(option = key, value = %raw, "unrecognised value, using default");
    }
    Ok(parsed)
}

fn backoff_ms(delay: Duration) -> String {
    delay.as_millis().clamp(1, RDKAFKA_MAX_BACKOFF_MS).to_string()
}
