//! # Porter Transport
//!
//! Transactional message transport over lease-based storage queues.
//!
//! This library moves opaque header-plus-body messages between a sending and
//! a receiving party through a durable, at-least-once queue service. Sends
//! are deferred until the enclosing unit of work commits, and received
//! messages are acknowledged (deleted) only after the unit of work reaches
//! completion. Crash-safety falls out of the queue service's visibility
//! timeouts: a message whose unit of work never completes becomes visible
//! again and is redelivered.
//!
//! This library provides:
//! - A [`Transport`](transport::Transport) trait with a storage-queue
//!   implementation bound to one input queue
//! - A [`TransactionContext`](context::TransactionContext) capability for
//!   registering commit and completion effects
//! - A provider-agnostic [`QueueService`](service::QueueService) seam with
//!   Azure Storage Queue (REST) and in-memory backends
//! - A self-describing JSON wire envelope with byte-safe body armor
//!
//! ## Module Organization
//!
//! - [`error`] - Error types for transport and queue operations
//! - [`message`] - Message, address, and lease types
//! - [`codec`] - Wire envelope encoding and decoding
//! - [`context`] - Transaction context capability and unit of work
//! - [`service`] - Queue service trait
//! - [`services`] - Queue service backends
//! - [`transport`] - Transport core

// Module declarations
pub mod codec;
pub mod context;
pub mod error;
pub mod message;
pub mod service;
pub mod services;
pub mod transport;

// Re-export commonly used types at crate root for convenience
pub use codec::{decode, encode, WireEnvelope};
pub use context::{Effect, EffectFuture, TransactionContext, TransactionScope};
pub use error::{ConfigurationError, QueueError, SerializationError, TransportError};
pub use message::{Address, LeaseToken, LeasedMessage, MessageId, TransportMessage};
pub use service::QueueService;
pub use services::{
    AzureQueueConfig, AzureQueueService, MemoryQueueConfig, MemoryQueueService,
};
pub use transport::{StorageQueueTransport, Transport, TransportOptions};
