use tracing::{info_span, Span};
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a JSON fmt subscriber filtered by `directives` (e.g. `"info"` or
/// `"events_provider_kafka=debug"`). A subscriber installed earlier wins.
pub fn init(directives: &str) -> Result<(), ParseError> {
    let env_filter = EnvFilter::try_new(directives)?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_target(false),
        )
        .try_init()
        .ok();

    Ok(())
}

/// Span for a plugin call that is not tied to one subscription.
pub fn operation_span(plugin: &'static str, operation: &'static str) -> Span {
    info_span!("plugin.op", plugin, operation)
}

/// Span for a plugin call on behalf of a single subscription.
pub fn subscription_span(
    plugin: &'static str,
    operation: &'static str,
    subscription_id: &str,
) -> Span {
    info_span!(
        "plugin.op",
        plugin,
        operation,
        subscription_id = %subscription_id
    )
}
