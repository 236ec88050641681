// Circuit Breaker Tests - Project Maester
// "Testing the gates before the siege"

use super::*;
use std::time::Duration;
use tokio::time::sleep;

fn fast_config() -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        failure_threshold: 3,
        success_threshold: 2,
        open_duration: Duration::from_millis(20),
        ..CircuitBreakerConfig::default()
    }
}

#[tokio::test]
async fn test_circuit_breaker_creation() {
    let config = CircuitBreakerConfig::default();
    assert_eq!(config.failure_threshold, 5);
    assert_eq!(config.success_threshold, 2);
    assert_eq!(config.open_duration, Duration::from_secs(60));

    let breaker = CircuitBreaker::new("test", config);

    assert_eq!(breaker.name(), "test");
    assert_eq!(breaker.get_state().await, CircuitBreakerState::Closed);
    assert!(breaker.can_execute().await);
}

#[tokio::test]
async fn test_success_clears_failure_streak() {
    let breaker = CircuitBreaker::new("test", fast_config());

    breaker.record_failure().await;
    breaker.record_failure().await;
    assert_eq!(breaker.get_stats().await.failure_count, 2);

    breaker.record_success().await;
    assert_eq!(breaker.get_stats().await.failure_count, 0);

    // The streak starts over, two more failures are not enough to open
    breaker.record_failure().await;
    breaker.record_failure().await;
    assert_eq!(breaker.get_state().await, CircuitBreakerState::Closed);

    breaker.record_failure().await;
    assert_eq!(breaker.get_state().await, CircuitBreakerState::Open);
}

#[tokio::test]
async fn test_circuit_breaker_opens_on_consecutive_failures() {
    let breaker = CircuitBreaker::new("test", fast_config());

    for _ in 0..3 {
        breaker.record_failure().await;
    }

    assert_eq!(breaker.get_state().await, CircuitBreakerState::Open);
    assert!(!breaker.can_execute().await);
}

#[tokio::test]
async fn test_circuit_breaker_half_open_transition() {
    let breaker = CircuitBreaker::new("test", fast_config());

    for _ in 0..3 {
        breaker.record_failure().await;
    }
    assert_eq!(breaker.get_state().await, CircuitBreakerState::Open);

    // Wait out the open duration
    sleep(Duration::from_millis(30)).await;

    // Should transition to half-open when checking
    assert!(breaker.can_execute().await);
    assert_eq!(breaker.get_state().await, CircuitBreakerState::HalfOpen);
}

#[tokio::test]
async fn test_half_open_closes_after_success_threshold() {
    let breaker = CircuitBreaker::new("test", fast_config());

    for _ in 0..3 {
        breaker.record_failure().await;
    }
    sleep(Duration::from_millis(30)).await;
    assert!(breaker.can_execute().await);

    breaker.record_success().await;
    assert_eq!(breaker.get_state().await, CircuitBreakerState::HalfOpen);
    assert_eq!(breaker.get_stats().await.success_count, 1);

    breaker.record_success().await;
    assert_eq!(breaker.get_state().await, CircuitBreakerState::Closed);
    assert_eq!(breaker.get_stats().await.failure_count, 0);
}

#[tokio::test]
async fn test_half_open_reopens_on_single_failure() {
    let breaker = CircuitBreaker::new("test", fast_config());

    for _ in 0..3 {
        breaker.record_failure().await;
    }
    sleep(Duration::from_millis(30)).await;
    assert!(breaker.can_execute().await);

    // One success is not enough to close, and the next failure reopens
    breaker.record_success().await;
    breaker.record_failure().await;

    assert_eq!(breaker.get_state().await, CircuitBreakerState::Open);
    // The retry window restarts from the reopen
    assert!(!breaker.can_execute().await);
}

#[tokio::test]
async fn test_circuit_breaker_execute_success() {
    let breaker = CircuitBreaker::new("test", CircuitBreakerConfig::default());

    let result = breaker.execute(async { Ok::<i32, &str>(42) }).await;

    assert!(result.is_ok());
    assert_eq!(result.unwrap(), 42);

    let stats = breaker.get_stats().await;
    assert_eq!(stats.total_requests, 1);
    assert_eq!(stats.total_failures, 0);
}

#[tokio::test]
async fn test_circuit_breaker_execute_failure() {
    let breaker = CircuitBreaker::new("test", CircuitBreakerConfig::default());

    let result = breaker
        .execute(async { Err::<i32, &str>("test error") })
        .await;

    assert!(result.is_err());
    match result.unwrap_err() {
        CircuitBreakerError::OperationFailed { error } => {
            assert_eq!(error, "test error");
        }
        _ => panic!("Expected OperationFailed error"),
    }

    let stats = breaker.get_stats().await;
    assert_eq!(stats.failure_count, 1);
    assert_eq!(stats.total_failures, 1);
    assert_eq!(stats.total_requests, 1);
}

#[tokio::test]
async fn test_circuit_breaker_execute_rejected() {
    let breaker = CircuitBreaker::new("test", CircuitBreakerConfig::default());

    breaker.force_open().await;

    let result = breaker.execute(async { Ok::<i32, &str>(42) }).await;

    assert!(result.is_err());
    match result.unwrap_err() {
        CircuitBreakerError::CircuitOpen { name, state } => {
            assert_eq!(name, "test");
            assert_eq!(state, CircuitBreakerState::Open);
        }
        _ => panic!("Expected CircuitOpen error"),
    }

    let stats = breaker.get_stats().await;
    assert_eq!(stats.rejected_requests, 1);
    // Rejected requests never reach the store
    assert_eq!(stats.total_requests, 0);
}

#[tokio::test]
async fn test_fallback_covers_rejection_only() {
    let breaker = CircuitBreaker::new("test", CircuitBreakerConfig::default());
    breaker.force_open().await;

    // Fast rejection serves the fallback value
    let result = breaker
        .execute_with_fallback(async { Ok::<i32, &str>(42) }, || -1)
        .await;
    assert_eq!(result.unwrap(), -1);

    // An operation that ran and failed keeps its own error
    breaker.force_close().await;
    let result = breaker
        .execute_with_fallback(async { Err::<i32, &str>("boom") }, || -1)
        .await;
    match result.unwrap_err() {
        CircuitBreakerError::OperationFailed { error } => assert_eq!(error, "boom"),
        _ => panic!("Expected OperationFailed error"),
    }
}

#[tokio::test]
async fn test_error_conversion_preserves_inner_error() {
    let breaker = CircuitBreaker::new("test", CircuitBreakerConfig::default());

    let result = breaker
        .execute(async {
            Err::<(), MaesterError>(MaesterError::constraint_violation("teacher has courses"))
        })
        .await;
    let error: MaesterError = result.unwrap_err().into();
    assert!(matches!(error, MaesterError::ConstraintViolation { .. }));

    breaker.force_open().await;
    let result = breaker
        .execute(async { Ok::<(), MaesterError>(()) })
        .await;
    let error: MaesterError = result.unwrap_err().into();
    assert!(matches!(error, MaesterError::CircuitOpen { .. }));
}

#[tokio::test]
async fn test_stats_expose_retry_window() {
    let breaker = CircuitBreaker::new("test", fast_config());

    assert!(breaker.get_stats().await.time_until_retry.is_none());

    for _ in 0..3 {
        breaker.record_failure().await;
    }

    let stats = breaker.get_stats().await;
    assert_eq!(stats.state, CircuitBreakerState::Open);
    assert!(stats.time_until_retry.is_some());
    assert!(stats.last_failure_time.is_some());
}

#[tokio::test]
async fn test_circuit_breaker_registry() {
    let registry = CircuitBreakerRegistry::new();

    let breaker = registry.get_or_create("test").await;
    assert_eq!(breaker.name(), "test");

    let same_breaker = registry.get("test").await;
    assert!(same_breaker.is_some());

    let names = registry.list_names().await;
    assert!(names.contains(&"test".to_string()));

    assert!(registry.remove("test").await);
    assert!(registry.get("test").await.is_none());
}

#[tokio::test]
async fn test_registry_reset_all() {
    let registry = CircuitBreakerRegistry::new();

    let auth = registry.get_or_create("auth").await;
    let academic = registry.get_or_create("academic").await;

    auth.force_open().await;
    academic.force_open().await;

    registry.reset_all().await;

    assert_eq!(auth.get_state().await, CircuitBreakerState::Closed);
    assert_eq!(academic.get_state().await, CircuitBreakerState::Closed);
}

#[tokio::test]
async fn test_circuit_breaker_reset() {
    let breaker = CircuitBreaker::new("test", CircuitBreakerConfig::default());

    breaker.record_failure().await;
    breaker.force_open().await;

    assert_eq!(breaker.get_state().await, CircuitBreakerState::Open);

    breaker.reset().await;

    assert_eq!(breaker.get_state().await, CircuitBreakerState::Closed);
    let stats = breaker.get_stats().await;
    assert_eq!(stats.failure_count, 0);
    assert!(stats.last_failure_time.is_none());
}
