use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use fleet_state::store::{MemoryBlobStore, MemoryDataStore, MemoryRecordStore};
use fleet_state::{FleetConfig, FleetManager};
use muster_hub::gateway;

fn memory_manager() -> Arc<FleetManager> {
    FleetManager::new(
        Arc::new(MemoryRecordStore::new()),
        Arc::new(MemoryDataStore::new()),
        Arc::new(MemoryBlobStore::new()),
        FleetConfig::default(),
    )
}

#[tokio::test]
async fn health_endpoint_reports_ok() {
    let app = gateway::router(memory_manager());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    let value: serde_json::Value = serde_json::from_slice(&body).expect("json body");
    assert_eq!(value["status"], "ok");
}

#[tokio::test]
async fn agent_route_requires_websocket_upgrade() {
    let app = gateway::router(memory_manager());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/agents/dev-1")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    // A plain GET without the upgrade handshake must be rejected.
    assert_ne!(response.status(), StatusCode::OK);
}
