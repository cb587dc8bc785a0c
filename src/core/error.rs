use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// One failed attempt against one platform, as recorded by the failover runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptFailure {
    pub platform_id: String,
    pub message: String,
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.platform_id, self.message)
    }
}

fn join_failures(failures: &[AttemptFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Unauthenticated,
    Configuration,
    Upstream,
    Storage,
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    Configuration(String),

    /// A single platform call failed. Never surfaced on its own; the failover
    /// runner folds it into `Failover`.
    #[error("{0}")]
    Upstream(String),

    #[error("timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("{operation} failed on every platform: {}", join_failures(.failures))]
    Failover {
        operation: String,
        failures: Vec<AttemptFailure>,
    },

    /// Every failed attempt of every round, in the order they were collected.
    #[error("filled {filled}/{desired} after {attempts} attempts: {}", join_failures(.failures))]
    Shortfall {
        filled: usize,
        desired: usize,
        attempts: usize,
        failures: Vec<AttemptFailure>,
    },

    #[error("storage error: {0}")]
    Storage(String),
}

impl RelayError {
    pub fn upstream(message: impl Into<String>) -> Self {
        RelayError::Upstream(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RelayError::Validation(_) => ErrorKind::Validation,
            RelayError::Unauthenticated(_) => ErrorKind::Unauthenticated,
            RelayError::Configuration(_) => ErrorKind::Configuration,
            RelayError::Upstream(_)
            | RelayError::Timeout(_)
            | RelayError::Failover { .. }
            | RelayError::Shortfall { .. } => ErrorKind::Upstream,
            RelayError::Storage(_) => ErrorKind::Storage,
        }
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RelayError::Upstream(format!("request timed out: {}", err))
        } else {
            RelayError::Upstream(format!("request failed: {}", err))
        }
    }
}

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        RelayError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::Storage(format!("invalid JSON document: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failover_message_lists_platforms_in_attempt_order() {
        let err = RelayError::Failover {
            operation: "generate-image".to_string(),
            failures: vec![
                AttemptFailure {
                    platform_id: "gemini-1-aaaa".to_string(),
                    message: "HTTP 500".to_string(),
                },
                AttemptFailure {
                    platform_id: "openai-2-bbbb".to_string(),
                    message: "no image returned".to_string(),
                },
            ],
        };
        assert_eq!(
            err.to_string(),
            "generate-image failed on every platform: [gemini-1-aaaa] HTTP 500; [openai-2-bbbb] no image returned"
        );
        assert_eq!(err.kind(), ErrorKind::Upstream);
    }

    #[test]
    fn shortfall_message_carries_fill_ratio() {
        let err = RelayError::Shortfall {
            filled: 2,
            desired: 4,
            attempts: 40,
            failures: vec![
                AttemptFailure {
                    platform_id: "a".to_string(),
                    message: "HTTP 500".to_string(),
                },
                AttemptFailure {
                    platform_id: "b".to_string(),
                    message: "timed out after 30s".to_string(),
                },
            ],
        };
        assert_eq!(
            err.to_string(),
            "filled 2/4 after 40 attempts: [a] HTTP 500; [b] timed out after 30s"
        );
    }

    #[test]
    fn timeout_is_an_upstream_error() {
        let err = RelayError::Timeout(Duration::from_secs(30));
        assert_eq!(err.to_string(), "timed out after 30s");
        assert_eq!(err.kind(), ErrorKind::Upstream);
    }
}
