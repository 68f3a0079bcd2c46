//! End-to-end: coordinator, redb queue and HTTP transport against a local
//! ingestion endpoint

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use batchline_coordinator::{BatchCoordinator, CoordinatorConfig};
use batchline_core::JsonCodec;
use batchline_transport::{HttpTransport, HttpTransportConfig};
use parking_lot::Mutex;
use serde::Serialize;
use tempfile::TempDir;

use common::*;

#[derive(Default)]
struct Endpoint {
    /// Requests to reject with 503 before accepting
    reject_first: AtomicUsize,
    bodies: Mutex<Vec<serde_json::Value>>,
}

async fn ingest(State(endpoint): State<Arc<Endpoint>>, body: axum::body::Bytes) -> StatusCode {
    let body = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    endpoint.bodies.lock().push(body);

    let rejected = endpoint
        .reject_first
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok();
    if rejected {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    }
}

async fn start_endpoint(reject_first: usize) -> (String, Arc<Endpoint>) {
    let endpoint = Arc::new(Endpoint {
        reject_first: AtomicUsize::new(reject_first),
        ..Default::default()
    });
    let app = Router::new()
        .route("/events", post(ingest))
        .with_state(endpoint.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/events", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (url, endpoint)
}

#[derive(Serialize, serde::Deserialize)]
struct Tap {
    x: u32,
    y: u32,
}

#[tokio::test]
async fn test_batches_posted_as_json_arrays() {
    let (url, endpoint) = start_endpoint(0).await;
    let temp_dir = TempDir::new().unwrap();
    let config = CoordinatorConfig {
        data_dir: temp_dir.path().to_path_buf(),
        ..config(3)
    };

    let transport = HttpTransport::new(HttpTransportConfig::new(url)).unwrap();
    let coordinator = BatchCoordinator::open(config, Arc::new(transport))
        .await
        .unwrap();

    for i in 0..3 {
        coordinator
            .enqueue_encoded(&JsonCodec, &Tap { x: i, y: i * 10 })
            .unwrap();
    }
    wait_for_stats(&coordinator, |s| s.batches_delivered == 1 && s.pending == 0).await;

    let bodies = endpoint.bodies.lock().clone();
    assert_eq!(
        bodies,
        vec![serde_json::json!([
            {"x": 0, "y": 0},
            {"x": 1, "y": 10},
            {"x": 2, "y": 20}
        ])]
    );
    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_rejected_batch_is_resent() {
    let (url, endpoint) = start_endpoint(1).await;
    let temp_dir = TempDir::new().unwrap();
    let config = CoordinatorConfig {
        data_dir: temp_dir.path().to_path_buf(),
        ..config(2)
    };

    let transport = HttpTransport::new(HttpTransportConfig::new(url)).unwrap();
    let coordinator = BatchCoordinator::open(config, Arc::new(transport))
        .await
        .unwrap();
    let mut events = coordinator.subscribe();

    coordinator.enqueue(r#"{"n":1}"#).unwrap();
    coordinator.enqueue(r#"{"n":2}"#).unwrap();
    wait_event(&mut events, is_failed).await;

    coordinator.flush(true).unwrap();
    wait_event(&mut events, is_delivered).await;

    let bodies = endpoint.bodies.lock().clone();
    assert_eq!(bodies.len(), 2);
    assert_eq!(bodies[0], bodies[1]);
    assert_eq!(coordinator.stats().await.unwrap().pending, 0);
}
