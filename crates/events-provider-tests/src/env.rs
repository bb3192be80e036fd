use crate::patience::env_flag;
use std::env;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Parsed test environment configuration.
#[derive(Debug, Clone)]
pub struct TestEnv {
    pub prefix: TestPrefix,
    /// `GREENTIC_INTEGRATION` is set; live-broker tests may run.
    pub integration: bool,
}

impl TestEnv {
    pub fn from_env(provider: &str) -> Self {
        Self {
            prefix: TestPrefix::from_env(provider),
            integration: env_flag("GREENTIC_INTEGRATION"),
        }
    }
}

/// Run-unique naming for subscriptions and topics. Names only use
/// `[a-z0-9._-]` so they are valid Kafka topic names as well.
#[derive(Debug, Clone)]
pub struct TestPrefix {
    base: String,
    counter: Arc<AtomicU64>,
}

impl TestPrefix {
    pub fn from_env(provider: &str) -> Self {
        if let Ok(explicit) = env::var("GREENTIC_TEST_PREFIX") {
            return Self::new(sanitize(&explicit));
        }

        let run_id = env::var("GITHUB_RUN_ID").ok();
        let run_attempt = env::var("GITHUB_RUN_ATTEMPT").ok();
        if let (Some(id), Some(attempt)) = (run_id, run_attempt) {
            return Self::new(sanitize(&format!("ci.{provider}.{id}.{attempt}")));
        }

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let pid = std::process::id();
        Self::new(sanitize(&format!("local.{provider}.{now}.{pid}")))
    }

    fn new(base: String) -> Self {
        Self {
            base,
            counter: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Returns the prefix shared by every name of the current test run.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Derive a unique subscription id for a test case.
    pub fn subscription_id(&self, suffix: &str) -> String {
        let next = self.counter.fetch_add(1, Ordering::SeqCst);
        format!("{}.{}-{next}", self.base, sanitize(suffix))
    }

    /// Topic name for this run.
    pub fn topic(&self, suffix: &str) -> String {
        format!("{}.{}", self.base, sanitize(suffix))
    }
}

fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '.' | '_' | '-' => c,
            'A'..='Z' => c.to_ascii_lowercase(),
            _ => '-',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_ids_are_unique_per_call() {
        let prefix = TestPrefix::new("local.kafka.123".to_string());
        assert_eq!(prefix.base(), "local.kafka.123");
        let a = prefix.subscription_id("audit");
        let b = prefix.subscription_id("audit");
        assert_ne!(a, b);
        assert!(a.starts_with("local.kafka.123.audit-"));
    }

    #[test]
    fn names_are_valid_topic_characters() {
        let prefix = TestPrefix::new(sanitize("CI/Repo:42"));
        assert_eq!(prefix.base(), "ci-repo-42");
        assert_eq!(prefix.topic("Events Out"), "ci-repo-42.events-out");
    }
}
