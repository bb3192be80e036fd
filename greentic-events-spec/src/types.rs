use crate::config::ConfigMap;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reject identifiers that are empty or only whitespace.
pub fn validate_subscription_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(Error::invalid_config("subscription ID must not be empty"));
    }
    Ok(())
}

/// Registers (or replaces) a subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    pub subscription_id: String,
    #[serde(default)]
    pub config: ConfigMap,
    /// Ask the backend to confirm the destination is reachable before
    /// returning.
    #[serde(default)]
    pub verify_connection: bool,
}

impl SubscribeRequest {
    pub fn new(subscription_id: impl Into<String>, config: ConfigMap) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            config,
            verify_connection: false,
        }
    }

    pub fn with_verify_connection(mut self, verify: bool) -> Self {
        self.verify_connection = verify;
        self
    }
}

/// Delivers one serialized event under a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendRequest {
    pub subscription_id: String,
    pub event_json: Vec<u8>,
}

impl SendRequest {
    pub fn new(subscription_id: impl Into<String>, event_json: impl Into<Vec<u8>>) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            event_json: event_json.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsubscribeRequest {
    pub subscription_id: String,
}

impl UnsubscribeRequest {
    pub fn new(subscription_id: impl Into<String>) -> Self {
        Self {
            subscription_id: subscription_id.into(),
        }
    }
}

/// Fixed description of a backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PluginMetadata {
    pub name: String,
    pub version: String,
}

impl PluginMetadata {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for PluginMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}
