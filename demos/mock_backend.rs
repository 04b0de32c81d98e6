use axum::{extract::Path, routing::get, Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;

#[tokio::main]
async fn main() {
    let app = Router::new()
        .route("/status", get(|| async { Json(json!({"status": "healthy"})) }))
        .route("/users/{id}", get(user))
        .route("/page", get(|| async { axum::response::Html("<h1>not json</h1>") }));

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    println!("Mock backend listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

async fn user(Path(id): Path<u64>) -> Json<Value> {
    Json(json!({"id": id, "name": format!("user-{}", id)}))
}
