use crate::{DeliveryProbe, Patience};
use anyhow::{Context, Result};
use greentic_events_spec::{Error, ErrorKind};

/// Wait until the probe has seen exactly `expected` for `subscription_id`,
/// in that order.
pub async fn assert_delivered<D: DeliveryProbe + ?Sized>(
    probe: &D,
    plugin_name: &str,
    subscription_id: &str,
    expected: &[Vec<u8>],
) -> Result<()> {
    let got = Patience::DELIVERY
        .until(|| async {
            let got = probe.delivered(subscription_id).await?;
            if got.len() < expected.len() {
                anyhow::bail!(
                    "{plugin_name}:{subscription_id} delivered {} of {} events",
                    got.len(),
                    expected.len()
                );
            }
            Ok(got)
        })
        .await
        .with_context(|| format!("delivery check failed for {plugin_name}:{subscription_id}"))?;

    if got != expected {
        anyhow::bail!(
            "delivery check failed for {plugin_name}:{subscription_id}: {} events vs {} expected",
            got.len(),
            expected.len()
        );
    }
    Ok(())
}

/// Assert `result` failed with an error of `kind`.
pub fn assert_error_kind(
    result: greentic_events_spec::Result<()>,
    kind: ErrorKind,
    what: &str,
) -> Result<Error> {
    match result {
        Ok(()) => anyhow::bail!("{what}: expected {kind:?} error, got success"),
        Err(err) if err.kind() == kind => Ok(err),
        Err(err) => anyhow::bail!("{what}: expected {kind:?} error, got {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Fixed(Vec<Vec<u8>>);

    #[async_trait]
    impl DeliveryProbe for Fixed {
        async fn delivered(&self, _subscription_id: &str) -> Result<Vec<Vec<u8>>> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn matching_delivery_passes() {
        let probe = Fixed(vec![b"a".to_vec(), b"b".to_vec()]);
        assert_delivered(&probe, "fake", "s", &[b"a".to_vec(), b"b".to_vec()])
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn reordered_delivery_fails() {
        let probe = Fixed(vec![b"b".to_vec(), b"a".to_vec()]);
        assert!(assert_delivered(&probe, "fake", "s", &[b"a".to_vec(), b"b".to_vec()])
            .await
            .is_err());
    }

    #[test]
    fn error_kind_mismatch_is_reported() {
        let err = assert_error_kind(Err(Error::Closed), ErrorKind::Closed, "close").unwrap();
        assert_eq!(err, Error::Closed);
        assert!(assert_error_kind(Ok(()), ErrorKind::Closed, "close").is_err());
        assert!(
            assert_error_kind(Err(Error::Cancelled), ErrorKind::Closed, "close").is_err()
        );
    }
}
