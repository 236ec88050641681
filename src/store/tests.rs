// Store Layer Tests - Project Maester
// "Knock on every gate until one gives"

use super::*;
use crate::circuit_breaker::{CircuitBreakerConfig, CircuitBreakerState};
use crate::error::MaesterError;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

fn memory_adapter(store: StoreId) -> (Arc<MemoryStoreClient>, StoreAdapter) {
    let client = Arc::new(MemoryStoreClient::new(store.as_str()));
    let adapter = StoreAdapter::with_config(
        store,
        Arc::clone(&client) as Arc<dyn StoreClient>,
        StoreAdapterConfig {
            reconnect_base_delay: Duration::from_millis(5),
            reconnect_max_delay: Duration::from_millis(20),
            ..StoreAdapterConfig::default()
        },
        CircuitBreakerConfig {
            failure_threshold: 3,
            success_threshold: 2,
            ..CircuitBreakerConfig::default()
        },
    );
    (client, adapter)
}

#[tokio::test]
async fn test_memory_client_crud() {
    let client = MemoryStoreClient::new("academic");

    let created = client
        .create("teachers", json!({"name": "Maester Aemon", "email": "aemon@citadel.edu"}))
        .await
        .unwrap();
    assert_eq!(created["id"], json!(1));

    let found = client.find_by_id("teachers", 1).await.unwrap();
    assert_eq!(found.unwrap()["name"], json!("Maester Aemon"));

    let updated = client
        .update("teachers", 1, json!({"email": "aemon@wall.edu"}))
        .await
        .unwrap();
    assert_eq!(updated["email"], json!("aemon@wall.edu"));
    assert_eq!(updated["name"], json!("Maester Aemon"));

    let removed = client.delete("teachers", 1).await.unwrap();
    assert_eq!(removed["id"], json!(1));
    assert!(client.find_by_id("teachers", 1).await.unwrap().is_none());
}

#[tokio::test]
async fn test_memory_client_honors_explicit_id() {
    let client = MemoryStoreClient::new("academic");

    let created = client
        .create("teachers", json!({"id": 42, "name": "Marwyn"}))
        .await
        .unwrap();
    assert_eq!(created["id"], json!(42));

    // Sequence continues past the explicit id
    let next = client
        .create("teachers", json!({"name": "Qyburn"}))
        .await
        .unwrap();
    assert_eq!(next["id"], json!(43));

    // Reusing a taken id is a constraint violation
    let duplicate = client
        .create("teachers", json!({"id": 42, "name": "Pycelle"}))
        .await;
    assert!(matches!(
        duplicate,
        Err(MaesterError::ConstraintViolation { .. })
    ));
}

#[tokio::test]
async fn test_memory_client_find_many_filters() {
    let client = MemoryStoreClient::new("academic");

    for (name, career) in [("Ebrose", 3), ("Vaellyn", 3), ("Perestan", 7)] {
        client
            .create("teachers", json!({"name": name, "career_id": career}))
            .await
            .unwrap();
    }

    let all = client.find_many("teachers", None).await.unwrap();
    assert_eq!(all.len(), 3);
    // Sorted by id
    assert_eq!(all[0]["name"], json!("Ebrose"));

    let filtered = client
        .find_many("teachers", Some(&json!({"career_id": 3})))
        .await
        .unwrap();
    assert_eq!(filtered.len(), 2);
}

#[tokio::test]
async fn test_memory_client_missing_records() {
    let client = MemoryStoreClient::new("profiles");

    assert!(client.find_by_id("teachers", 9).await.unwrap().is_none());

    let update = client.update("teachers", 9, json!({"name": "x"})).await;
    assert!(matches!(update, Err(MaesterError::NotFound { .. })));

    let delete = client.delete("teachers", 9).await;
    assert!(matches!(delete, Err(MaesterError::NotFound { .. })));
}

#[tokio::test]
async fn test_memory_client_unavailable() {
    let client = MemoryStoreClient::new("auth");
    client.set_available(false);

    let result = client.ping().await;
    match result {
        Err(MaesterError::ConnectionError { message }) => {
            assert!(message.contains("connection refused"));
        }
        other => panic!("Expected ConnectionError, got {other:?}"),
    }

    client.set_available(true);
    assert!(client.ping().await.is_ok());
}

#[tokio::test]
async fn test_adapter_connect_and_operate() {
    let (_, adapter) = memory_adapter(StoreId::Academic);

    assert!(!adapter.is_connected());
    adapter.connect().await.unwrap();
    assert!(adapter.is_connected());

    let created = adapter
        .create("courses", json!({"name": "Ravenry", "code": "RAV-101"}))
        .await
        .unwrap();
    assert_eq!(created["id"], json!(1));

    adapter.shutdown().await;
    assert!(!adapter.is_connected());
}

#[tokio::test]
async fn test_adapter_opens_breaker_on_repeated_connection_failures() {
    let (client, adapter) = memory_adapter(StoreId::Profiles);
    adapter.connect().await.unwrap();

    client.set_available(false);

    for _ in 0..3 {
        let result = adapter.find_by_id("teachers", 1).await;
        assert!(matches!(result, Err(MaesterError::ConnectionError { .. })));
    }

    assert_eq!(
        adapter.circuit_breaker().get_state().await,
        CircuitBreakerState::Open
    );
    assert!(!adapter.is_connected());

    // Rejected fast, the store is never consulted
    let result = adapter.find_by_id("teachers", 1).await;
    assert!(matches!(result, Err(MaesterError::CircuitOpen { .. })));

    adapter.shutdown().await;
}

#[tokio::test]
async fn test_adapter_marks_disconnected_only_on_connection_errors() {
    let (client, adapter) = memory_adapter(StoreId::Academic);
    adapter.connect().await.unwrap();

    client
        .inject_failure(MaesterError::constraint_violation("duplicate email"))
        .await;
    let result = adapter
        .create("teachers", json!({"name": "Ebrose"}))
        .await;
    assert!(matches!(
        result,
        Err(MaesterError::ConstraintViolation { .. })
    ));

    // Domain errors leave the connection state alone
    assert!(adapter.is_connected());
    assert_eq!(adapter.reconnect_attempts(), 0);

    adapter.shutdown().await;
}

#[tokio::test]
async fn test_adapter_recovers_through_successful_operation() {
    let (client, adapter) = memory_adapter(StoreId::Academic);
    adapter.connect().await.unwrap();

    client.set_available(false);
    let _ = adapter.find_by_id("teachers", 1).await;
    assert!(!adapter.is_connected());

    // The background reconnect finds the store back up and clears the counter
    client.set_available(true);
    sleep(Duration::from_millis(100)).await;

    assert!(adapter.is_connected());
    assert_eq!(adapter.reconnect_attempts(), 0);

    adapter.shutdown().await;
}

#[tokio::test]
async fn test_adapter_health_check_never_fails() {
    let (client, adapter) = memory_adapter(StoreId::Auth);
    adapter.connect().await.unwrap();

    let health = adapter.health_check().await;
    assert!(health.healthy);
    assert!(health.error.is_none());

    client.set_available(false);
    let health = adapter.health_check().await;
    assert!(!health.healthy);
    assert!(health.error.unwrap().contains("connection refused"));

    adapter.shutdown().await;
}

#[tokio::test]
async fn test_adapter_status_merges_breaker_and_connection() {
    let (client, adapter) = memory_adapter(StoreId::Profiles);
    adapter.connect().await.unwrap();

    client.set_available(false);
    let _ = adapter.find_by_id("teachers", 1).await;
    sleep(Duration::from_millis(5)).await;

    let status = adapter.status().await;
    assert_eq!(status.store, StoreId::Profiles);
    assert!(!status.connected);
    assert!(status.reconnect_attempts >= 1);
    assert!(status.failure_count >= 1);
    assert_eq!(status.breaker_state, "closed");

    adapter.shutdown().await;
}

#[tokio::test]
async fn test_adapter_reset_clears_breaker_and_reconnect_counter() {
    let (client, adapter) = memory_adapter(StoreId::Academic);
    adapter.connect().await.unwrap();

    client.set_available(false);
    for _ in 0..3 {
        let _ = adapter.find_by_id("teachers", 1).await;
    }
    sleep(Duration::from_millis(5)).await;
    assert_eq!(
        adapter.circuit_breaker().get_state().await,
        CircuitBreakerState::Open
    );
    assert!(adapter.reconnect_attempts() >= 1);

    adapter.reset_circuit_breaker().await;

    assert_eq!(
        adapter.circuit_breaker().get_state().await,
        CircuitBreakerState::Closed
    );
    assert_eq!(adapter.reconnect_attempts(), 0);

    adapter.shutdown().await;
}

#[tokio::test]
async fn test_store_id_names() {
    assert_eq!(StoreId::Auth.as_str(), "auth");
    assert_eq!(StoreId::Academic.to_string(), "academic");
    assert_eq!(StoreId::Profiles.to_string(), "profiles");
    assert_eq!(StoreId::all().len(), 3);

    let serialized = serde_json::to_string(&StoreId::Profiles).unwrap();
    assert_eq!(serialized, "\"profiles\"");
    let parsed: StoreId = serde_json::from_str("\"academic\"").unwrap();
    assert_eq!(parsed, StoreId::Academic);
}
