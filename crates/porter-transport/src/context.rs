//! Transaction context capability and unit of work.
//!
//! The transport never performs its network side effects directly inside a
//! unit of work. It registers them on a [`TransactionContext`]: enqueues run
//! when the unit of work commits, and lease acknowledgments run after it
//! completes. The coordinator that owns the unit of work fires the effects;
//! the transport only registers them.

use crate::error::TransportError;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};

/// Future returned by a deferred effect.
pub type EffectFuture = Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send>>;

/// A one-shot, possibly-asynchronous side effect deferred to a transaction
/// phase.
pub type Effect = Box<dyn FnOnce() -> EffectFuture + Send>;

/// Capability for scheduling side effects on a unit of work
///
/// Implementations fire commit effects once, after the caller's work is
/// accepted, and completion effects once, after the unit of work reaches a
/// terminal state. Registration itself is synchronous and performs no I/O.
pub trait TransactionContext: Send + Sync {
    /// Register an effect to run when the unit of work commits.
    fn on_commit(&self, effect: Effect);

    /// Register an effect to run after the unit of work completes.
    fn on_completed(&self, effect: Effect);
}

/// A minimal unit of work firing registered effects on demand
///
/// Suitable for tests and for callers without a surrounding transaction
/// coordinator. Effects run in registration order; [`commit`](Self::commit)
/// stops at the first failing effect and surfaces its error. Each effect
/// fires at most once.
#[derive(Default)]
pub struct TransactionScope {
    commit_effects: Mutex<Vec<Effect>>,
    completion_effects: Mutex<Vec<Effect>>,
}

impl TransactionScope {
    /// Create a new empty scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run all registered commit effects in registration order.
    ///
    /// Stops at the first error, which then belongs to the whole unit of
    /// work: remaining commit effects never fire.
    pub async fn commit(&self) -> Result<(), TransportError> {
        let effects = drain(&self.commit_effects);
        for effect in effects {
            effect().await?;
        }
        Ok(())
    }

    /// Run all registered completion effects in registration order.
    pub async fn complete(&self) -> Result<(), TransportError> {
        let effects = drain(&self.completion_effects);
        for effect in effects {
            effect().await?;
        }
        Ok(())
    }
}

impl TransactionContext for TransactionScope {
    fn on_commit(&self, effect: Effect) {
        self.commit_effects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(effect);
    }

    fn on_completed(&self, effect: Effect) {
        self.completion_effects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(effect);
    }
}

fn drain(effects: &Mutex<Vec<Effect>>) -> Vec<Effect> {
    std::mem::take(&mut *effects.lock().unwrap_or_else(PoisonError::into_inner))
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
