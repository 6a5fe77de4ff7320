//! Error types for transport and queue operations.

use crate::message::Address;
use thiserror::Error;

/// Errors reported by a queue service backend
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue not found: {queue}")]
    QueueNotFound { queue: String },

    #[error("lease not found or expired for message {message_id}")]
    LeaseNotFound { message_id: String },

    #[error("operation timed out after {seconds}s")]
    Timeout { seconds: i64 },

    #[error("connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("service error ({status}): {code} - {message}")]
    Provider {
        status: u16,
        code: String,
        message: String,
    },
}

impl QueueError {
    /// Check if the error is transient and worth retrying by the caller.
    ///
    /// The transport itself never retries; this classification is for the
    /// coordinator layer that owns retry policy.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::QueueNotFound { .. } => false,
            Self::LeaseNotFound { .. } => false,
            Self::Timeout { .. } => true,
            Self::ConnectionFailed { .. } => true,
            Self::AuthenticationFailed { .. } => false,
            Self::Provider { status, .. } => *status >= 500,
        }
    }
}

/// Errors during wire envelope encoding and decoding
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("envelope JSON is malformed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message body is not valid base64")]
    Body(#[source] base64::DecodeError),
}

/// Invalid construction arguments, rejected before any I/O
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("invalid queue address '{name}': {reason}")]
    InvalidAddress { name: String, reason: String },

    #[error("invalid option '{option}': {reason}")]
    InvalidOption { option: String, reason: String },

    #[error("missing required configuration: {key}")]
    Missing { key: String },

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

/// Errors surfaced by the transport
///
/// Nothing is retried internally and nothing from the queue service is
/// swallowed; failures are wrapped with the operation context and handed to
/// the caller or the transaction coordinator.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Enqueue failed inside a commit effect. Surfaces as a commit-phase
    /// failure to whoever runs the commit hooks.
    #[error("could not deliver message to '{destination}'")]
    Delivery {
        destination: Address,
        #[source]
        source: QueueError,
    },

    /// The purge loop aborted partway. Messages deleted by earlier batches
    /// stay deleted; the purge is not resumed.
    #[error("could not purge queue '{queue}'")]
    Purge {
        queue: Address,
        #[source]
        source: QueueError,
    },

    #[error("serialization failed: {0}")]
    Serialization(#[from] SerializationError),

    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("queue operation failed: {0}")]
    Queue(#[from] QueueError),
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
