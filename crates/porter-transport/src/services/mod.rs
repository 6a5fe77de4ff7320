//! Queue service backends.
//!
//! This module contains concrete implementations of the
//! [`QueueService`](crate::service::QueueService) trait.

pub mod azure;
pub mod memory;

pub use azure::{AzureQueueConfig, AzureQueueService};
pub use memory::{MemoryQueueConfig, MemoryQueueService};
