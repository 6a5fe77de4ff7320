//! In-memory queue service for testing and development.
//!
//! A fully functional lease-based queue in process memory:
//! - FIFO delivery with per-message visibility timeouts
//! - Pop receipts that go stale when a lease expires
//! - Dequeue counts across redeliveries
//! - Thread-safe concurrent access; clones share the same storage
//!
//! Expired leases return their messages to the visible set, so the
//! at-least-once redelivery behavior of a real storage queue can be
//! exercised in tests without a live service.

use crate::error::QueueError;
use crate::message::{Address, LeaseToken, LeasedMessage, MessageId};
use crate::service::QueueService;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock};

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

/// Configuration for the in-memory backend
#[derive(Debug, Clone)]
pub struct MemoryQueueConfig {
    /// How often a bounded-wait lease re-checks for a visible message.
    pub poll_granularity: Duration,
}

impl Default for MemoryQueueConfig {
    fn default() -> Self {
        Self {
            poll_granularity: Duration::milliseconds(10),
        }
    }
}

// ============================================================================
// Internal Storage Structures
// ============================================================================

/// A message stored in a queue with its delivery metadata
struct StoredMessage {
    message_id: MessageId,
    payload: String,
    inserted_at: DateTime<Utc>,
    dequeue_count: u32,
}

/// A message currently leased out, keyed by its pop receipt
struct InFlightMessage {
    message: StoredMessage,
    lease_expires_at: DateTime<Utc>,
}

/// State of a single queue
#[derive(Default)]
struct MemoryQueue {
    /// Visible messages in FIFO order.
    messages: VecDeque<StoredMessage>,
    /// Leased messages, keyed by pop receipt.
    in_flight: HashMap<String, InFlightMessage>,
}

impl MemoryQueue {
    /// Return messages whose leases have expired to the visible set.
    ///
    /// Expired messages re-enter at the front: they are older than anything
    /// still waiting.
    fn reap_expired(&mut self, now: DateTime<Utc>) {
        let expired: Vec<String> = self
            .in_flight
            .iter()
            .filter(|(_, in_flight)| now >= in_flight.lease_expires_at)
            .map(|(receipt, _)| receipt.clone())
            .collect();

        for receipt in expired {
            if let Some(in_flight) = self.in_flight.remove(&receipt) {
                self.messages.push_front(in_flight.message);
            }
        }
    }

    /// Lease the next visible message, if any.
    fn lease_next(&mut self, now: DateTime<Utc>, visibility: Duration) -> Option<LeasedMessage> {
        let mut message = self.messages.pop_front()?;
        message.dequeue_count += 1;

        let pop_receipt = uuid::Uuid::new_v4().to_string();
        let leased = LeasedMessage {
            payload: message.payload.clone(),
            lease: LeaseToken::new(message.message_id.clone(), pop_receipt.clone()),
            dequeue_count: message.dequeue_count,
            inserted_at: Some(message.inserted_at),
        };

        self.in_flight.insert(
            pop_receipt,
            InFlightMessage {
                message,
                lease_expires_at: now + visibility,
            },
        );

        Some(leased)
    }
}

// ============================================================================
// MemoryQueueService
// ============================================================================

/// In-memory queue service implementation
///
/// Cloning is cheap and clones operate on the same queues, which lets a
/// test hold onto the service while the transport owns another handle to
/// it.
#[derive(Clone, Default)]
pub struct MemoryQueueService {
    queues: Arc<RwLock<HashMap<Address, MemoryQueue>>>,
    config: MemoryQueueConfig,
}

impl MemoryQueueService {
    /// Create a new service with the given configuration.
    pub fn new(config: MemoryQueueConfig) -> Self {
        Self {
            queues: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    /// Number of visible messages in a queue, for test assertions.
    pub fn visible_len(&self, address: &Address) -> usize {
        let queues = self.queues.read().unwrap_or_else(PoisonError::into_inner);
        queues
            .get(address)
            .map(|queue| queue.messages.len())
            .unwrap_or(0)
    }

    fn with_queue<T>(
        &self,
        address: &Address,
        f: impl FnOnce(&mut MemoryQueue) -> Result<T, QueueError>,
    ) -> Result<T, QueueError> {
        let mut queues = self.queues.write().unwrap_or_else(PoisonError::into_inner);
        let queue = queues
            .get_mut(address)
            .ok_or_else(|| QueueError::QueueNotFound {
                queue: address.to_string(),
            })?;
        f(queue)
    }
}

#[async_trait]
impl QueueService for MemoryQueueService {
    type Handle = Address;

    fn handle(&self, address: &Address) -> Self::Handle {
        address.clone()
    }

    async fn create_if_not_exists(&self, handle: &Self::Handle) -> Result<(), QueueError> {
        let mut queues = self.queues.write().unwrap_or_else(PoisonError::into_inner);
        queues.entry(handle.clone()).or_default();
        Ok(())
    }

    async fn exists(&self, handle: &Self::Handle) -> Result<bool, QueueError> {
        let queues = self.queues.read().unwrap_or_else(PoisonError::into_inner);
        Ok(queues.contains_key(handle))
    }

    async fn enqueue(
        &self,
        handle: &Self::Handle,
        payload: String,
    ) -> Result<MessageId, QueueError> {
        self.with_queue(handle, |queue| {
            let message_id = MessageId::new();
            queue.messages.push_back(StoredMessage {
                message_id: message_id.clone(),
                payload,
                inserted_at: Utc::now(),
                dequeue_count: 0,
            });
            Ok(message_id)
        })
    }

    async fn lease(
        &self,
        handle: &Self::Handle,
        wait: Duration,
        visibility: Duration,
    ) -> Result<Option<LeasedMessage>, QueueError> {
        let deadline = Utc::now() + wait;
        let granularity = self
            .config
            .poll_granularity
            .to_std()
            .unwrap_or(std::time::Duration::from_millis(10));

        loop {
            let now = Utc::now();
            let leased = self.with_queue(handle, |queue| {
                queue.reap_expired(now);
                Ok(queue.lease_next(now, visibility))
            })?;

            if leased.is_some() || Utc::now() >= deadline {
                return Ok(leased);
            }

            tokio::time::sleep(granularity).await;
        }
    }

    async fn delete(&self, handle: &Self::Handle, lease: &LeaseToken) -> Result<(), QueueError> {
        self.with_queue(handle, |queue| {
            queue.reap_expired(Utc::now());

            let held = queue
                .in_flight
                .get(lease.pop_receipt())
                .is_some_and(|in_flight| &in_flight.message.message_id == lease.message_id());

            if !held {
                return Err(QueueError::LeaseNotFound {
                    message_id: lease.message_id().to_string(),
                });
            }

            queue.in_flight.remove(lease.pop_receipt());
            Ok(())
        })
    }

    async fn fetch_batch(
        &self,
        handle: &Self::Handle,
        count: u32,
        visibility: Duration,
    ) -> Result<Vec<LeasedMessage>, QueueError> {
        self.with_queue(handle, |queue| {
            let now = Utc::now();
            queue.reap_expired(now);

            let mut batch = Vec::new();
            while batch.len() < count as usize {
                match queue.lease_next(now, visibility) {
                    Some(leased) => batch.push(leased),
                    None => break,
                }
            }
            Ok(batch)
        })
    }
}
