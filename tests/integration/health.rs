// Tests for the operator HTTP endpoints

use crate::{router_state, test_stack};
use academic_records_sync_server::error::MaesterError;
use academic_records_sync_server::monitoring::serve_health_endpoints;
use academic_records_sync_server::sync::CreateTeacherInput;
use serde_json::Value;
use std::time::Duration;

#[tokio::test]
async fn health_endpoint_reports_overall_and_service_status() {
    let stack = test_stack().await;
    let state = router_state(&stack).await;
    let (addr, server) = serve_health_endpoints(state, 0).await.unwrap();
    let base = format!("http://127.0.0.1:{}", addr.port());
    let client = reqwest::Client::new();

    let response = client.get(format!("{base}/health")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["stores"].as_object().unwrap().len(), 3);
    assert_eq!(body["services"]["teachers"], "available");

    // Losing one store degrades the system but keeps the endpoint green
    stack.academic.set_available(false);
    let response = client.get(format!("{base}/health")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["services"]["teachers"], "degraded");
    assert_eq!(body["services"]["students"], "unavailable");

    stack.auth.set_available(false);
    stack.profiles.set_available(false);
    let response = client.get(format!("{base}/health")).send().await.unwrap();
    assert_eq!(response.status(), 503);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "down");

    server.abort();
}

#[tokio::test]
async fn circuit_breaker_endpoints_report_and_reset() {
    let stack = test_stack().await;
    let state = router_state(&stack).await;
    let (addr, server) = serve_health_endpoints(state, 0).await.unwrap();
    let base = format!("http://127.0.0.1:{}", addr.port());
    let client = reqwest::Client::new();

    stack.profiles.set_available(false);
    let _ = stack.profiles_adapter.find_by_id("teachers", 1).await;
    let _ = stack.profiles_adapter.find_by_id("teachers", 2).await;

    let body: Value = client
        .get(format!("{base}/health/circuit-breakers"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(body["profiles"]["failure_count"].as_u64().unwrap() >= 2);
    assert_eq!(body["profiles"]["state"], "closed");
    assert_eq!(body["auth"]["failure_count"], 0);

    // Let the background reconnect settle before asserting on reset state
    stack.profiles.set_available(true);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let response = client
        .post(format!("{base}/health/circuit-breakers/reset"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["message"], "All circuit breakers reset");

    let body: Value = client
        .get(format!("{base}/health/circuit-breakers"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    for store in ["auth", "academic", "profiles"] {
        assert_eq!(body[store]["failure_count"], 0);
        assert_eq!(body[store]["state"], "closed");
    }

    server.abort();
}

#[tokio::test]
async fn sync_queue_endpoints_expose_and_replay() {
    let stack = test_stack().await;
    let state = router_state(&stack).await;
    let (addr, server) = serve_health_endpoints(state, 0).await.unwrap();
    let base = format!("http://127.0.0.1:{}", addr.port());
    let client = reqwest::Client::new();

    stack.profiles.set_available(false);
    let err = stack
        .teachers
        .create(CreateTeacherInput {
            name: "Vaellyn".into(),
            email: "vaellyn@citadel.edu".into(),
            specialty_id: 1,
            career_id: 1,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, MaesterError::SyncQueued { .. }));

    let body: Value = client
        .get(format!("{base}/health/sync-queue"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["total_operations"], 1);
    assert_eq!(body["operations_by_entity"]["teacher"], 1);
    assert_eq!(body["operations_by_store"]["profiles"], 1);

    stack.profiles.set_available(true);
    let operation_id = stack.queue.list_pending().await[0].id.clone();
    let response = client
        .post(format!("{base}/health/sync-queue/{operation_id}/retry"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["operation_id"], operation_id.as_str());

    assert_eq!(stack.profiles.record_count("teachers"), 1);
    assert_eq!(stack.academic.record_count("teachers"), 1);

    let body: Value = client
        .get(format!("{base}/health/sync-queue"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["total_operations"], 0);
    assert_eq!(body["successful_replays"], 1);

    // Replaying an id the queue does not know is an operator error
    let response = client
        .post(format!("{base}/health/sync-queue/unknown-op/retry"))
        .send()
        .await
        .unwrap();
    assert!(!response.status().is_success());

    server.abort();
}
