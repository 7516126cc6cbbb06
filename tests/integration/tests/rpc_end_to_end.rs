//! End-to-end RPC scenarios over the in-process broker.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wetask_broker::{handler_fn, MemoryTransport, RpcClient, RpcServer};
use wetask_core::{patterns, RpcResponse};

#[tokio::test]
async fn test_echo_round_trip_within_deadline() {
    let transport = Arc::new(MemoryTransport::new());
    let server = RpcServer::new(transport.clone());
    server.spawn(
        "echo",
        handler_fn(|payload| async move {
            // Realistic handler latency, well inside the deadline.
            tokio::time::sleep(Duration::from_millis(50)).await;
            RpcResponse::ok(payload)
        }),
    );
    // Let the loop declare its queue before calling.
    tokio::time::sleep(Duration::from_millis(20)).await;

    let client = RpcClient::new(transport);
    let response = client
        .call_with_timeout("echo", &json!({"x": 1}), Duration::from_secs(2))
        .await
        .unwrap();
    assert!(response.success);
    assert_eq!(response.data, Some(json!({"x": 1})));
    assert!(response.error.is_none());
}

#[tokio::test]
async fn test_unanswered_call_times_out_near_the_deadline() {
    let transport = Arc::new(MemoryTransport::new());

    // A server that consumes but never replies.
    let server = RpcServer::new(transport.clone());
    server.spawn(
        "void",
        handler_fn(|_| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            RpcResponse::ok(json!(null))
        }),
    );
    tokio::time::sleep(Duration::from_millis(20)).await;

    let client = RpcClient::new(transport);
    let deadline = Duration::from_millis(300);
    let started = tokio::time::Instant::now();
    let err = client
        .call_with_timeout("void", &json!({}), deadline)
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    assert!(err.is_timeout());
    assert!(elapsed >= deadline, "returned before the deadline: {elapsed:?}");
    assert!(
        elapsed < deadline + Duration::from_secs(1),
        "deadline overshot by too much: {elapsed:?}"
    );
}

#[tokio::test]
async fn test_application_error_passes_through_verbatim() {
    let transport = Arc::new(MemoryTransport::new());
    let server = RpcServer::new(transport.clone());
    server.spawn(
        patterns::TASKS_GET_BY_ID,
        handler_fn(|_| async { RpcResponse::fail(404, "Task not found") }),
    );
    tokio::time::sleep(Duration::from_millis(20)).await;

    let client = RpcClient::new(transport);
    let response = client
        .call(patterns::TASKS_GET_BY_ID, &json!({"id": 999}))
        .await
        .unwrap();

    // An answered failure is not a transport error.
    assert!(!response.success);
    assert_eq!(response.status_code, Some(404));
    assert_eq!(response.error.as_deref(), Some("Task not found"));
}

#[tokio::test]
async fn test_many_patterns_served_concurrently() {
    let transport = Arc::new(MemoryTransport::new());
    let server = RpcServer::new(transport.clone());
    let served = [
        patterns::USERS_GET_ME,
        patterns::TEAMS_GET_ALL,
        patterns::BOARDS_GET_ALL,
    ];
    for pattern in served {
        let name = pattern.to_string();
        server.spawn(
            pattern,
            handler_fn(move |_| {
                let name = name.clone();
                async move { RpcResponse::ok(json!({"pattern": name})) }
            }),
        );
    }
    tokio::time::sleep(Duration::from_millis(20)).await;

    let client = RpcClient::new(transport);
    for pattern in served {
        let response = client.call(pattern, &json!({})).await.unwrap();
        assert_eq!(response.data, Some(json!({"pattern": pattern})));
    }
}
