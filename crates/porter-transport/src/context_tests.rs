//! Tests for the transaction scope.

use super::*;
use crate::error::QueueError;
use std::sync::Arc;

/// Record an effect that appends `label` to a shared log.
fn recording_effect(log: &Arc<Mutex<Vec<&'static str>>>, label: &'static str) -> Effect {
    let log = Arc::clone(log);
    Box::new(move || {
        Box::pin(async move {
            log.lock().unwrap_or_else(PoisonError::into_inner).push(label);
            Ok(())
        })
    })
}

fn failing_effect() -> Effect {
    Box::new(|| {
        Box::pin(async {
            Err(TransportError::Queue(QueueError::ConnectionFailed {
                message: "reset".to_string(),
            }))
        })
    })
}

#[tokio::test]
async fn test_commit_runs_effects_in_registration_order() {
    // Arrange
    let scope = TransactionScope::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    scope.on_commit(recording_effect(&log, "first"));
    scope.on_commit(recording_effect(&log, "second"));

    // Act
    scope.commit().await.unwrap();

    // Assert
    let log = log.lock().unwrap();
    assert_eq!(*log, vec!["first", "second"]);
}

#[tokio::test]
async fn test_effects_fire_at_most_once() {
    // Arrange
    let scope = TransactionScope::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    scope.on_commit(recording_effect(&log, "once"));

    // Act
    scope.commit().await.unwrap();
    scope.commit().await.unwrap();

    // Assert
    assert_eq!(log.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_commit_stops_at_first_failing_effect() {
    // Arrange
    let scope = TransactionScope::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    scope.on_commit(recording_effect(&log, "before"));
    scope.on_commit(failing_effect());
    scope.on_commit(recording_effect(&log, "after"));

    // Act
    let result = scope.commit().await;

    // Assert
    assert!(result.is_err());
    assert_eq!(*log.lock().unwrap(), vec!["before"]);
}

#[tokio::test]
async fn test_completion_effects_are_independent_of_commit_effects() {
    // Arrange
    let scope = TransactionScope::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    scope.on_commit(recording_effect(&log, "commit"));
    scope.on_completed(recording_effect(&log, "completed"));

    // Act
    scope.complete().await.unwrap();

    // Assert - only the completion effect ran
    assert_eq!(*log.lock().unwrap(), vec!["completed"]);
}

#[tokio::test]
async fn test_uncommitted_scope_never_fires_commit_effects() {
    // Arrange
    let log = Arc::new(Mutex::new(Vec::new()));
    {
        let scope = TransactionScope::new();
        scope.on_commit(recording_effect(&log, "commit"));
        // Scope dropped without commit.
    }

    // Assert
    assert!(log.lock().unwrap().is_empty());
}
