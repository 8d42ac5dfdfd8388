//! Top-level error and retry-policy types for the relay domain.
//!
//! [`RelayError`] covers every condition that ends the processing of one
//! inbound notification with an error outcome. [`UpstreamError`] is what the
//! infrastructure adapters return when a call to GitHub or Jenkins fails; it
//! carries the adapter's [`RetryPolicy`] verdict so the domain can decide
//! whether to try again without knowing anything about HTTP.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::RepositoryName;

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether an error condition is safe to retry and, if so, after what delay.
///
/// Returned by infrastructure error types to let the domain decide whether to
/// re-invoke an operation without escalating.
///
/// - `Retryable` errors: not-found races right after PR creation, server
///   errors, connection failures, timeouts.
/// - `NonRetryable` errors: authentication and permission failures, malformed
///   requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// The operation may be retried.
    Retryable {
        /// Minimum back-off before the next attempt. `None` means apply the
        /// caller's own back-off schedule.
        after: Option<Duration>,
    },
    /// The operation must not be retried.
    NonRetryable,
}

impl RetryPolicy {
    /// Returns `true` for [`RetryPolicy::Retryable`].
    pub fn is_retryable(&self) -> bool {
        matches!(self, RetryPolicy::Retryable { .. })
    }
}

// ---------------------------------------------------------------------------
// Upstream errors
// ---------------------------------------------------------------------------

/// A failed call to GitHub or Jenkins.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{operation} failed: {message}")]
pub struct UpstreamError {
    /// Short name of the upstream operation, e.g. `"list pull request commits"`.
    pub operation: &'static str,

    /// Human-readable description of the failure.
    pub message: String,

    /// HTTP status code, when the upstream answered at all.
    pub status: Option<u16>,

    /// Whether the caller may try again.
    pub retry: RetryPolicy,
}

impl UpstreamError {
    /// Creates an error the caller may retry.
    pub fn transient(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
            status: None,
            retry: RetryPolicy::Retryable { after: None },
        }
    }

    /// Creates an error the caller must not retry.
    pub fn permanent(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
            status: None,
            retry: RetryPolicy::NonRetryable,
        }
    }

    /// Attaches the HTTP status code the upstream responded with.
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

// ---------------------------------------------------------------------------
// Relay-level errors
// ---------------------------------------------------------------------------

/// Errors that end the processing of one inbound notification.
///
/// Everything listed here is reported back to the caller of the endpoint.
/// Failures that happen after the relay has taken ownership of an event (a
/// build that could not be scheduled, a status push that was rejected) are
/// not errors at this level; they surface as commit statuses or log lines.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The GitHub notification carried no event-type header.
    #[error("Got GitHub notification without a type")]
    MissingEventType,

    /// The GitHub notification is of a type the relay does not handle.
    #[error("Got unknown GitHub notification event type: {event_type}")]
    UnsupportedEventType {
        /// The value of the event-type header.
        event_type: String,
    },

    /// The notification body could not be interpreted.
    #[error("Invalid notification payload: {message}")]
    InvalidPayload {
        /// Description of what was wrong with the payload.
        message: String,
    },

    /// No repository configuration is registered for the named repository.
    #[error("No repo config for {repository}")]
    RepoNotConfigured {
        /// The repository the notification referred to.
        repository: RepositoryName,
    },

    /// An upstream call the event depends on failed for good.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// A finished Jenkins build reported a status outside the known set.
    #[error("Did not understand '{status}' build status")]
    UnrecognizedBuildStatus {
        /// The status value Jenkins sent (empty when absent).
        status: String,
    },
}

impl RelayError {
    /// Shorthand for [`RelayError::InvalidPayload`].
    pub fn invalid_payload(message: impl Into<String>) -> Self {
        RelayError::InvalidPayload {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_error_display_names_operation() {
        let err = UpstreamError::transient("list pull request commits", "404 Not Found")
            .with_status(404);
        assert_eq!(
            err.to_string(),
            "list pull request commits failed: 404 Not Found"
        );
        assert_eq!(err.status, Some(404));
        assert!(err.retry.is_retryable());
    }

    #[test]
    fn permanent_errors_are_not_retryable() {
        let err = UpstreamError::permanent("push commit status", "401 Unauthorized");
        assert_eq!(err.retry, RetryPolicy::NonRetryable);
    }

    #[test]
    fn repo_not_configured_message_matches_endpoint_text() {
        let err = RelayError::RepoNotConfigured {
            repository: RepositoryName::new("octo/site").unwrap(),
        };
        assert_eq!(err.to_string(), "No repo config for octo/site");
    }
}
