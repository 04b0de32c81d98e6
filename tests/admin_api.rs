//! Admin API tests.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::StatusCode;
use serde_json::Value;
use tokio::net::TcpListener;

use quota_gateway::admin::{setup_admin_router, AdminState};
use quota_gateway::apps::AppInfoSource;
use quota_gateway::quota::MemoryCounterStore;
use quota_gateway::GatewayCore;

mod common;

const KEY: &str = "test-admin-key";

async fn start_admin(core: GatewayCore) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = setup_admin_router(AdminState {
        core,
        api_key: KEY.to_string(),
    });
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    addr
}

fn core() -> GatewayCore {
    let backend: SocketAddr = "127.0.0.1:9".parse().unwrap();
    let config = common::gateway_config(backend, vec![common::app("k1", 5), common::app("k2", 5)]);
    GatewayCore::build(&config, Arc::new(MemoryCounterStore::new(8)))
}

#[tokio::test]
async fn test_requires_bearer_token() {
    let addr = start_admin(core()).await;
    let client = common::client();

    let res = client
        .get(format!("http://{}/admin/status", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .get(format!("http://{}/admin/status", addr))
        .bearer_auth("wrong")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_status_and_store() {
    let addr = start_admin(core()).await;
    let client = common::client();

    let status: Value = client
        .get(format!("http://{}/admin/status", addr))
        .bearer_auth(KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["status"], "operational");
    assert_eq!(status["routes"], 1);
    assert_eq!(status["apps"], 2);
    assert_eq!(status["stages"], serde_json::json!(["prepare", "validate", "forward"]));

    let store: Value = client
        .get(format!("http://{}/admin/store", addr))
        .bearer_auth(KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(store["backend"], "memory");
    assert_eq!(store["max_size"], 8);
    assert_eq!(store["in_use"], 0);
}

#[tokio::test]
async fn test_cache_invalidation() {
    let core = core();
    let source: &dyn AppInfoSource = core.registry.as_ref();
    core.cache.get_or_load("k1", source).await.unwrap();
    core.cache.get_or_load("k2", source).await.unwrap();

    let addr = start_admin(core.clone()).await;
    let client = common::client();

    let cache: Value = client
        .get(format!("http://{}/admin/cache", addr))
        .bearer_auth(KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(cache["entries"], 2);

    let res = client
        .delete(format!("http://{}/admin/cache/k1", addr))
        .bearer_auth(KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.json::<Value>().await.unwrap()["app_key"], "k1");

    assert!(core.cache.get("k1").await.is_none());
    assert!(core.cache.get("k2").await.is_some());
}
