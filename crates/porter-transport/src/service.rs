//! Queue service trait.

use crate::error::QueueError;
use crate::message::{Address, LeaseToken, LeasedMessage, MessageId};
use async_trait::async_trait;
use chrono::Duration;

/// Interface implemented by queue service backends
///
/// The backend owns delivery semantics: leases are exclusive for their
/// visibility timeout and expire back into the queue on their own, which is
/// what makes the transport at-least-once. The transport never renews
/// leases.
#[async_trait]
pub trait QueueService: Send + Sync + 'static {
    /// Opaque reference to a named queue on this backend.
    type Handle: Send + Sync + 'static;

    /// Construct a handle for a queue address.
    ///
    /// Purely local: no network I/O, and no statement about whether the
    /// queue exists on the service. Existence is established with
    /// [`create_if_not_exists`](Self::create_if_not_exists).
    fn handle(&self, address: &Address) -> Self::Handle;

    /// Ensure the queue exists. Idempotent; success when it already does.
    async fn create_if_not_exists(&self, handle: &Self::Handle) -> Result<(), QueueError>;

    /// Check whether the queue exists on the service.
    async fn exists(&self, handle: &Self::Handle) -> Result<bool, QueueError>;

    /// Append a payload to the queue, returning the service-assigned
    /// message identity.
    async fn enqueue(&self, handle: &Self::Handle, payload: String)
        -> Result<MessageId, QueueError>;

    /// Lease one message, hiding it for `visibility`.
    ///
    /// Waits at most `wait` for a message to become available and returns
    /// `None` when the window elapses empty. Never blocks past the window;
    /// callers poll in their own outer loop.
    async fn lease(
        &self,
        handle: &Self::Handle,
        wait: Duration,
        visibility: Duration,
    ) -> Result<Option<LeasedMessage>, QueueError>;

    /// Delete one leased message, acknowledging it permanently.
    async fn delete(&self, handle: &Self::Handle, lease: &LeaseToken) -> Result<(), QueueError>;

    /// Lease up to `count` messages without waiting.
    ///
    /// An empty vec means the queue is currently drained.
    async fn fetch_batch(
        &self,
        handle: &Self::Handle,
        count: u32,
        visibility: Duration,
    ) -> Result<Vec<LeasedMessage>, QueueError>;
}
