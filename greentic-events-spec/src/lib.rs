//! Contract between a Greentic host and its event subscription backends.

pub mod config;
pub mod error;
pub mod plugin;
pub mod types;

pub use config::ConfigMap;
pub use error::{Error, ErrorKind, Result};
pub use plugin::EventSubscriptionPlugin;
pub use tokio_util::sync::CancellationToken;
pub use types::{
    validate_subscription_id, PluginMetadata, SendRequest, SubscribeRequest, UnsubscribeRequest,
};

use std::sync::Arc;

pub type DynEventPlugin = Arc<dyn EventSubscriptionPlugin>;

pub mod prelude {
    pub use crate::{
        CancellationToken, ConfigMap, DynEventPlugin, Error, ErrorKind, EventSubscriptionPlugin,
        PluginMetadata, Result, SendRequest, SubscribeRequest, UnsubscribeRequest,
    };
}
