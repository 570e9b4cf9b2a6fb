//! HTTP API tests driven through the router without a socket

mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use catalog_search::api::{build_router, AppState};
use catalog_search::search::ClusterStatus;
use common::{red_shoes_response, StubBackend};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

async fn router(backend: Arc<StubBackend>) -> Router {
    let (service, _) = common::service(backend).await;
    build_router(AppState::new(Arc::new(service)))
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_search_endpoint() {
    let app = router(Arc::new(StubBackend::new(red_shoes_response()))).await;

    let response = app
        .oneshot(post_json(
            "/v1/search",
            json!({
                "q": "red shoes",
                "filters": { "category_ids": ["c-shoes"], "price_max": 1000.0 }
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["total"]["value"], 2);
    assert_eq!(body["hits"][0]["product"]["title"], "Red Trail Running Shoes");
    assert_eq!(body["strategy"], "best_fields");
    assert_eq!(body["facets"][0]["name"], "category");
}

#[tokio::test]
async fn test_invalid_search_is_bad_request() {
    let app = router(Arc::new(StubBackend::new(red_shoes_response()))).await;

    let response = app
        .oneshot(post_json("/v1/search", json!({ "q": "shoes", "limit": 500 })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_unavailable_backend_is_503() {
    let backend = Arc::new(StubBackend::new(red_shoes_response()));
    backend.set_status(ClusterStatus::Red);
    let app = router(backend).await;

    let response = app
        .clone()
        .oneshot(post_json("/v1/search", json!({ "q": "shoes" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "SERVICE_UNAVAILABLE");

    let ready = app.oneshot(get("/health/ready")).await.unwrap();
    assert_eq!(ready.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_health_endpoints() {
    let app = router(Arc::new(StubBackend::new(red_shoes_response()))).await;

    let live = app.clone().oneshot(get("/health/live")).await.unwrap();
    assert_eq!(live.status(), StatusCode::OK);

    let ready = app.clone().oneshot(get("/health/ready")).await.unwrap();
    assert_eq!(ready.status(), StatusCode::OK);

    let health = app.oneshot(get("/health")).await.unwrap();
    let body = json_body(health).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["details"]["connection"]["state"], "connected");
    assert_eq!(body["details"]["cache"], "memory");
}

#[tokio::test]
async fn test_facets_endpoint() {
    let app = router(Arc::new(StubBackend::new(red_shoes_response()))).await;

    let response = app
        .oneshot(post_json("/v1/search/facets", json!({ "q": "shoes" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["facets"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn test_analyze_endpoint() {
    let app = router(Arc::new(StubBackend::new(red_shoes_response()))).await;

    let response = app
        .oneshot(get("/v1/search/analyze?q=%22red%20shoes%22"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["has_phrase"], true);
    assert_eq!(body["recommended_strategy"], "phrase");
}

#[tokio::test]
async fn test_compare_endpoint() {
    let app = router(Arc::new(StubBackend::new(red_shoes_response()))).await;

    let response = app
        .clone()
        .oneshot(post_json("/v1/search/compare", json!({ "query": "red shoes" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["runs"].as_array().unwrap().len(), 5);

    let empty = app
        .oneshot(post_json("/v1/search/compare", json!({ "query": "" })))
        .await
        .unwrap();
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_plan_endpoint() {
    let app = router(Arc::new(StubBackend::new(red_shoes_response()))).await;

    let response = app
        .oneshot(post_json(
            "/v1/search/plan",
            json!({ "q": "running shoes", "strategy": "fuzzy" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["strategy"], "fuzzy");
    assert!(body["body"]["query"].is_object());
    assert!(body["body"]["aggs"].is_object());
}

#[tokio::test]
async fn test_suggest_endpoint() {
    let app = router(Arc::new(StubBackend::new(json!({
        "took": 1,
        "hits": { "total": { "value": 0, "relation": "eq" }, "hits": [] },
        "suggest": {}
    }))))
    .await;

    let response = app
        .clone()
        .oneshot(get("/v1/search/suggest?q=sho&limit=3"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["query"], "sho");

    let too_many = app
        .oneshot(get("/v1/search/suggest?q=sho&limit=50"))
        .await
        .unwrap();
    assert_eq!(too_many.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let _ = catalog_search::metrics::init_metrics();
    let app = router(Arc::new(StubBackend::new(red_shoes_response()))).await;

    app.clone()
        .oneshot(post_json("/v1/search", json!({ "q": "shoes" })))
        .await
        .unwrap();
    let response = app.oneshot(get("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("catalog_search_search_requests_total"));
}
