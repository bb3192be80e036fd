use greentic_events_support::{Cancelled, RetryExhausted};
use thiserror::Error;

/// Result alias for plugin operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Canonical error surface of the plugin contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("invalid subscription ID {id:?}")]
    UnknownSubscription { id: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("broker rejected request: {0}")]
    Broker(String),
    #[error("operation cancelled")]
    Cancelled,
    #[error("max retries exceeded: {last}")]
    RetryExhausted { last: Box<Error> },
    #[error("failed to release subscription {id:?}: {reason}")]
    Release { id: String, reason: String },
    #[error("{}", join_messages(.0))]
    Aggregate(Vec<Error>),
    #[error("plugin is closed")]
    Closed,
}

/// Coarse classification for hosts that map errors onto their own surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidConfig,
    UnknownSubscription,
    Transport,
    Broker,
    Cancelled,
    RetryExhausted,
    Release,
    Closed,
}

impl Error {
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    pub fn unknown_subscription(id: impl Into<String>) -> Self {
        Self::UnknownSubscription { id: id.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidConfig(_) => ErrorKind::InvalidConfig,
            Self::UnknownSubscription { .. } => ErrorKind::UnknownSubscription,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Broker(_) => ErrorKind::Broker,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::RetryExhausted { .. } => ErrorKind::RetryExhausted,
            Self::Release { .. } | Self::Aggregate(_) => ErrorKind::Release,
            Self::Closed => ErrorKind::Closed,
        }
    }

    /// Transport failures and broker rejections are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Broker(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// The error of the final attempt when retries ran out.
    pub fn last_attempt(&self) -> Option<&Error> {
        match self {
            Self::RetryExhausted { last } => Some(last),
            _ => None,
        }
    }

    /// Collapse release errors into a single result: none is success, one is
    /// returned as-is, more are wrapped in [`Error::Aggregate`].
    pub fn join(mut errors: Vec<Error>) -> Result<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Self::Aggregate(errors)),
        }
    }
}

fn join_messages(errors: &[Error]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<Cancelled> for Error {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

impl From<RetryExhausted<Error>> for Error {
    fn from(value: RetryExhausted<Error>) -> Self {
        Self::RetryExhausted {
            last: Box::new(value.last),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_keeps_single_error_unwrapped() {
        assert_eq!(Error::join(Vec::new()), Ok(()));

        let one = Error::Release {
            id: "sub-1".into(),
            reason: "flush timed out".into(),
        };
        assert_eq!(Error::join(vec![one.clone()]), Err(one));
    }

    #[test]
    fn join_aggregates_many_errors() {
        let errors = vec![
            Error::Release {
                id: "a".into(),
                reason: "x".into(),
            },
            Error::Release {
                id: "b".into(),
                reason: "y".into(),
            },
        ];
        let err = Error::join(errors).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Release);
        assert_eq!(
            err.to_string(),
            "failed to release subscription \"a\": x; failed to release subscription \"b\": y"
        );
    }

    #[test]
    fn exhaustion_wraps_last_attempt() {
        let err: Error = RetryExhausted {
            last: Error::Transport("connection refused".into()),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::RetryExhausted);
        assert_eq!(
            err.last_attempt(),
            Some(&Error::Transport("connection refused".into()))
        );
        assert_eq!(
            err.to_string(),
            "max retries exceeded: transport error: connection refused"
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn cancellation_converts() {
        let err: Error = Cancelled.into();
        assert!(err.is_cancelled());
    }
}
