//! Transport core.
//!
//! [`StorageQueueTransport`] binds queue operations to the lifecycle of a
//! unit of work:
//! - `send` performs no network I/O itself; it registers a commit effect
//!   that encodes and enqueues the message, so nothing is sent for work
//!   that is never committed
//! - `receive` leases one message immediately but defers its deletion to a
//!   completion effect, so a crash before completion leaves the message to
//!   reappear when its visibility timeout lapses
//!
//! Queue handles are resolved through an instance-scoped registry: one
//! handle per distinct address for the lifetime of the transport, resolved
//! without any network I/O.

use crate::codec;
use crate::context::TransactionContext;
use crate::error::{ConfigurationError, TransportError};
use crate::message::{Address, TransportMessage};
use crate::service::QueueService;
use async_trait::async_trait;
use chrono::Duration;
use futures::future::try_join_all;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;

/// Tunable parameters of a transport instance
#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// Wait window for one receive poll. A shorter window means more
    /// frequent empty polls; a longer one raises the per-call latency tail.
    pub poll_wait: Duration,
    /// How long a leased message stays hidden before the service hands it
    /// to another receiver. Lease renewal is the service's business, not
    /// ours.
    pub visibility_timeout: Duration,
    /// Messages fetched per purge iteration.
    pub purge_batch_size: u32,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            poll_wait: Duration::seconds(1),
            visibility_timeout: Duration::seconds(30),
            purge_batch_size: 10,
        }
    }
}

impl TransportOptions {
    fn validate(&self) -> Result<(), ConfigurationError> {
        if self.poll_wait <= Duration::zero() {
            return Err(ConfigurationError::InvalidOption {
                option: "poll_wait".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.visibility_timeout <= Duration::zero() {
            return Err(ConfigurationError::InvalidOption {
                option: "visibility_timeout".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.purge_batch_size == 0 {
            return Err(ConfigurationError::InvalidOption {
                option: "purge_batch_size".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Interface exposed to the bus/dispatch pipeline
#[async_trait]
pub trait Transport: Send + Sync {
    /// The transport's own input queue address.
    fn address(&self) -> &Address;

    /// Ensure a queue exists. Idempotent.
    async fn create_queue(&self, address: &Address) -> Result<(), TransportError>;

    /// Schedule `message` for delivery to `destination` when the unit of
    /// work commits.
    async fn send(
        &self,
        destination: &Address,
        message: TransportMessage,
        context: &dyn TransactionContext,
    ) -> Result<(), TransportError>;

    /// Lease the next message from the input queue, deferring its
    /// acknowledgment to the unit of work's completion. `None` when the
    /// poll window elapses empty.
    async fn receive(
        &self,
        context: &dyn TransactionContext,
    ) -> Result<Option<TransportMessage>, TransportError>;

    /// Ensure the input queue exists. Must run before the first receive.
    async fn initialize(&self) -> Result<(), TransportError>;

    /// Drain the input queue completely. A missing queue is a no-op.
    async fn purge_input_queue(&self) -> Result<(), TransportError>;
}

/// Transport bound to one input queue on a lease-based queue service
pub struct StorageQueueTransport<S: QueueService> {
    service: Arc<S>,
    input_queue: Address,
    options: TransportOptions,
    handles: RwLock<HashMap<Address, Arc<S::Handle>>>,
}

impl<S: QueueService> StorageQueueTransport<S> {
    /// Create a transport reading from `input_queue`.
    pub fn new(
        service: S,
        input_queue: Address,
        options: TransportOptions,
    ) -> Result<Self, ConfigurationError> {
        options.validate()?;

        Ok(Self {
            service: Arc::new(service),
            input_queue,
            options,
            handles: RwLock::new(HashMap::new()),
        })
    }

    /// Resolve the cached handle for an address, constructing it on first
    /// use.
    ///
    /// Purely local: handle construction performs no I/O. Concurrent
    /// resolution of the same address yields the identical handle.
    fn resolve(&self, address: &Address) -> Arc<S::Handle> {
        {
            let handles = self.handles.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(handle) = handles.get(address) {
                return Arc::clone(handle);
            }
        }

        let mut handles = self.handles.write().unwrap_or_else(PoisonError::into_inner);
        // Double-check: another caller may have resolved it meanwhile.
        if let Some(handle) = handles.get(address) {
            return Arc::clone(handle);
        }

        let handle = Arc::new(self.service.handle(address));
        handles.insert(address.clone(), Arc::clone(&handle));
        handle
    }
}

#[async_trait]
impl<S: QueueService> Transport for StorageQueueTransport<S> {
    fn address(&self) -> &Address {
        &self.input_queue
    }

    async fn create_queue(&self, address: &Address) -> Result<(), TransportError> {
        let handle = self.resolve(address);
        self.service.create_if_not_exists(&handle).await?;
        Ok(())
    }

    async fn send(
        &self,
        destination: &Address,
        message: TransportMessage,
        context: &dyn TransactionContext,
    ) -> Result<(), TransportError> {
        let service = Arc::clone(&self.service);
        let handle = self.resolve(destination);
        let destination = destination.clone();

        context.on_commit(Box::new(move || {
            Box::pin(async move {
                let payload = codec::encode(&message)?;

                let message_id = service
                    .enqueue(&handle, payload)
                    .await
                    .map_err(|source| TransportError::Delivery {
                        destination: destination.clone(),
                        source,
                    })?;

                debug!(destination = %destination, message_id = %message_id, "message enqueued");
                Ok(())
            })
        }));

        Ok(())
    }

    async fn receive(
        &self,
        context: &dyn TransactionContext,
    ) -> Result<Option<TransportMessage>, TransportError> {
        let handle = self.resolve(&self.input_queue);

        let Some(leased) = self
            .service
            .lease(&handle, self.options.poll_wait, self.options.visibility_timeout)
            .await?
        else {
            return Ok(None);
        };

        // Decode before scheduling the acknowledgment: a payload we cannot
        // decode stays leased and becomes redeliverable when its
        // visibility timeout lapses.
        let message = codec::decode(&leased.payload)?;

        let service = Arc::clone(&self.service);
        let lease = leased.lease;
        context.on_completed(Box::new(move || {
            Box::pin(async move {
                service.delete(&handle, &lease).await?;
                Ok(())
            })
        }));

        Ok(Some(message))
    }

    async fn initialize(&self) -> Result<(), TransportError> {
        self.create_queue(&self.input_queue).await
    }

    async fn purge_input_queue(&self) -> Result<(), TransportError> {
        let handle = self.resolve(&self.input_queue);
        let queue = self.input_queue.clone();

        if !self.service.exists(&handle).await? {
            return Ok(());
        }

        info!(queue = %queue, "purging queue by deleting all messages");

        loop {
            let batch = self
                .service
                .fetch_batch(
                    &handle,
                    self.options.purge_batch_size,
                    self.options.visibility_timeout,
                )
                .await
                .map_err(|source| TransportError::Purge {
                    queue: queue.clone(),
                    source,
                })?;

            if batch.is_empty() {
                break;
            }

            let deleted = batch.len();
            try_join_all(
                batch
                    .iter()
                    .map(|leased| self.service.delete(&handle, &leased.lease)),
            )
            .await
            .map_err(|source| TransportError::Purge {
                queue: queue.clone(),
                source,
            })?;

            debug!(queue = %queue, deleted, "deleted message batch");
        }

        Ok(())
    }
}
