//! Message, address, and lease types.

use crate::error::ConfigurationError;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

// ============================================================================
// Core Identifiers
// ============================================================================

/// Case-normalized, validated queue address
///
/// Storage queue names are lower-case; any input is normalized before
/// validation, so two addresses differing only in case compare equal and
/// resolve to the same queue handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    /// Create a new address, normalizing to lower case and validating
    /// against storage queue naming rules.
    pub fn new(name: &str) -> Result<Self, ConfigurationError> {
        let normalized = name.to_lowercase();

        if normalized.is_empty() || normalized.len() > 63 {
            return Err(ConfigurationError::InvalidAddress {
                name: normalized,
                reason: "must be 1-63 characters".to_string(),
            });
        }

        if !normalized
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(ConfigurationError::InvalidAddress {
                name: normalized,
                reason: "only ASCII letters, digits, and hyphens allowed".to_string(),
            });
        }

        if normalized.starts_with('-') || normalized.ends_with('-') || normalized.contains("--") {
            return Err(ConfigurationError::InvalidAddress {
                name: normalized,
                reason: "no leading/trailing hyphens or consecutive hyphens".to_string(),
            });
        }

        Ok(Self(normalized))
    }

    /// Get the address as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Address {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Service-assigned identifier for a queued message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Generate a new random message ID.
    ///
    /// Backends that assign identities server-side return those instead;
    /// generation is used where the backend is local.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get the message ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for MessageId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ============================================================================
// Lease Types
// ============================================================================

/// Credential for acknowledging one leased message instance
///
/// Issued by the queue service when a message is leased. Valid until the
/// message is deleted or its visibility timeout expires; a stale token is
/// rejected with [`QueueError::LeaseNotFound`](crate::error::QueueError).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseToken {
    message_id: MessageId,
    pop_receipt: String,
}

impl LeaseToken {
    /// Create a new lease token.
    pub fn new(message_id: MessageId, pop_receipt: String) -> Self {
        Self {
            message_id,
            pop_receipt,
        }
    }

    /// Identity of the leased message.
    pub fn message_id(&self) -> &MessageId {
        &self.message_id
    }

    /// Receipt proving ownership of the current lease.
    pub fn pop_receipt(&self) -> &str {
        &self.pop_receipt
    }
}

/// A message leased from a queue, with its delivery metadata
#[derive(Debug, Clone)]
pub struct LeasedMessage {
    /// Raw payload as stored on the queue.
    pub payload: String,
    /// Token required to delete this lease.
    pub lease: LeaseToken,
    /// Number of times the message has been leased, this delivery included.
    pub dequeue_count: u32,
    /// When the message was first enqueued, if the backend reports it.
    pub inserted_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Transport Message
// ============================================================================

/// One unit of application data in transit: headers plus an opaque body
///
/// Immutable after construction. Created by the sender, reconstructed by
/// the receiver from the wire envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportMessage {
    headers: HashMap<String, String>,
    body: Bytes,
}

impl TransportMessage {
    /// Create a new transport message.
    pub fn new(headers: HashMap<String, String>, body: Bytes) -> Self {
        Self { headers, body }
    }

    /// Add a header, consuming and returning the message.
    pub fn with_header(mut self, key: String, value: String) -> Self {
        self.headers.insert(key, value);
        self
    }

    /// Message headers.
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Message body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Split the message into its headers and body.
    pub fn into_parts(self) -> (HashMap<String, String>, Bytes) {
        (self.headers, self.body)
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
