//! Common test utilities for porter transport integration tests.
//!
//! This module provides:
//! - Helpers for building transports over a shared in-memory service
//! - A counting queue service wrapper for asserting batch behavior

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Duration;
use porter_transport::{
    Address, LeaseToken, LeasedMessage, MemoryQueueService, MessageId, QueueError, QueueService,
    StorageQueueTransport, TransportMessage, TransportOptions,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[allow(dead_code)]
pub fn address(name: &str) -> Address {
    Address::new(name).unwrap()
}

/// Options tuned for test speed: short polls, short leases.
#[allow(dead_code)]
pub fn fast_options() -> TransportOptions {
    TransportOptions {
        poll_wait: Duration::milliseconds(50),
        visibility_timeout: Duration::milliseconds(200),
        purge_batch_size: 10,
    }
}

#[allow(dead_code)]
pub fn ping_message() -> TransportMessage {
    let mut headers = HashMap::new();
    headers.insert("type".to_string(), "Ping".to_string());
    TransportMessage::new(headers, Bytes::from_static(b"\x01\x02"))
}

/// Build a transport over the given service with its input queue created.
#[allow(dead_code)]
pub async fn initialized_transport<S: QueueService>(
    service: S,
    input: &str,
    options: TransportOptions,
) -> StorageQueueTransport<S> {
    use porter_transport::Transport as _;

    let transport = StorageQueueTransport::new(service, address(input), options).unwrap();
    transport.initialize().await.unwrap();
    transport
}

// ============================================================================
// Counting Queue Service
// ============================================================================

/// Wrapper around the in-memory service that records every batch fetch
#[derive(Clone)]
#[allow(dead_code)]
pub struct CountingQueueService {
    inner: MemoryQueueService,
    batch_sizes: Arc<Mutex<Vec<usize>>>,
}

#[allow(dead_code)]
impl CountingQueueService {
    pub fn new(inner: MemoryQueueService) -> Self {
        Self {
            inner,
            batch_sizes: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Sizes of the batches returned by `fetch_batch`, in call order.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueueService for CountingQueueService {
    type Handle = Address;

    fn handle(&self, address: &Address) -> Self::Handle {
        self.inner.handle(address)
    }

    async fn create_if_not_exists(&self, handle: &Self::Handle) -> Result<(), QueueError> {
        self.inner.create_if_not_exists(handle).await
    }

    async fn exists(&self, handle: &Self::Handle) -> Result<bool, QueueError> {
        self.inner.exists(handle).await
    }

    async fn enqueue(
        &self,
        handle: &Self::Handle,
        payload: String,
    ) -> Result<MessageId, QueueError> {
        self.inner.enqueue(handle, payload).await
    }

    async fn lease(
        &self,
        handle: &Self::Handle,
        wait: Duration,
        visibility: Duration,
    ) -> Result<Option<LeasedMessage>, QueueError> {
        self.inner.lease(handle, wait, visibility).await
    }

    async fn delete(&self, handle: &Self::Handle, lease: &LeaseToken) -> Result<(), QueueError> {
        self.inner.delete(handle, lease).await
    }

    async fn fetch_batch(
        &self,
        handle: &Self::Handle,
        count: u32,
        visibility: Duration,
    ) -> Result<Vec<LeasedMessage>, QueueError> {
        let batch = self.inner.fetch_batch(handle, count, visibility).await?;
        self.batch_sizes.lock().unwrap().push(batch.len());
        Ok(batch)
    }
}
