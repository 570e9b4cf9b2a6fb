//! End-to-end tests for the search service over a scripted backend

mod common;

use async_trait::async_trait;
use catalog_search::search::*;
use common::{empty_response, red_shoes_response, StubBackend};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

fn red_shoes_request() -> SearchRequest {
    SearchRequest::new("red shoes")
        .with_categories(vec!["c-shoes"])
        .with_price_range(None, Some(1000.0))
}

#[tokio::test]
async fn test_red_shoes_search_returns_hits_and_facets() {
    let backend = Arc::new(StubBackend::new(red_shoes_response()));
    let (service, catalog) = common::service(backend.clone()).await;

    let response = service.search(red_shoes_request()).await.unwrap();

    assert_eq!(response.total.value, 2);
    assert!(response.total.exact);
    assert_eq!(response.hits.len(), 2);
    assert_eq!(response.hits[0].product.id, "p-1");
    assert_eq!(response.hits[1].product.id, "2");
    assert_eq!(response.hits[0].score, Some(8.4));
    assert!(response.hits[0].highlights.contains_key("title"));
    assert_eq!(response.strategy, QueryStrategy::BestFields);
    assert!(!response.cached);
    assert_eq!(response.timing.took_ms, 7);
    assert_eq!(response.pagination.page, 1);
    assert_eq!(response.pagination.total_pages, 1);

    // Every default facet is present
    let names: Vec<&str> = response.facets.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["category", "brand", "price", "rating", "availability"]);

    let category = response.facet("category").unwrap();
    let shoes = category.buckets.iter().find(|b| b.key == "c-shoes").unwrap();
    assert_eq!(shoes.label.as_deref(), Some("Shoes"));
    assert_eq!(shoes.count, 2);
    assert!(shoes.selected);
    let running = category.buckets.iter().find(|b| b.key == "c-running").unwrap();
    assert!(!running.selected);

    let brand = response.facet("brand").unwrap();
    assert_eq!(brand.buckets[0].label.as_deref(), Some("Acme Footwear"));
    assert_eq!(brand.buckets[1].label.as_deref(), Some("Other Co"));

    // Zero-count price buckets fall under the default minimum
    let price = response.facet("price").unwrap();
    let keys: Vec<&str> = price.buckets.iter().map(|b| b.key.as_str()).collect();
    assert_eq!(keys, vec!["*-25", "50-100"]);
    assert_eq!(price.buckets[0].label.as_deref(), Some("Under $25"));

    let availability = response.facet("availability").unwrap();
    assert!(availability.buckets.iter().all(|b| b.key != "low_stock"));

    // One batch lookup per enriched facet
    assert_eq!(catalog.lookup_count(), 2);

    // The executed body carries the filters and facet aggregations
    let requests = backend.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].0, "products");
    let body = requests[0].1.to_string();
    assert!(body.contains(r#"{"term":{"is_active":true}}"#));
    assert!(body.contains(r#"{"terms":{"category_ids":["c-shoes"]}}"#));
    assert!(body.contains(r#""lte":1000.0"#));
    assert!(requests[0].1["aggs"]["facet_category"].is_object());
}

#[tokio::test]
async fn test_repeated_search_is_served_from_cache() {
    let backend = Arc::new(StubBackend::new(red_shoes_response()));
    let (service, _) = common::service(backend.clone()).await;

    let first = service.search(red_shoes_request()).await.unwrap();
    let second = service.search(red_shoes_request()).await.unwrap();

    assert!(!first.cached);
    assert!(second.cached);
    assert_eq!(second.hits, first.hits);
    assert_eq!(second.facets, first.facets);
    assert_eq!(backend.search_calls(), 1);
}

#[tokio::test]
async fn test_filter_order_and_whitespace_share_a_cache_entry() {
    let backend = Arc::new(StubBackend::new(red_shoes_response()));
    let (service, _) = common::service(backend.clone()).await;

    let a = SearchRequest::new("  red   shoes ").with_categories(vec!["c-running", "c-shoes"]);
    let b = SearchRequest::new("red shoes").with_categories(vec!["c-shoes", "c-running"]);

    service.search(a).await.unwrap();
    let response = service.search(b).await.unwrap();

    assert!(response.cached);
    assert_eq!(backend.search_calls(), 1);
}

#[tokio::test]
async fn test_different_pages_are_cached_separately() {
    let backend = Arc::new(StubBackend::new(red_shoes_response()));
    let (service, _) = common::service(backend.clone()).await;

    service.search(SearchRequest::new("shoes").with_page(1, 10)).await.unwrap();
    let second = service.search(SearchRequest::new("shoes").with_page(2, 10)).await.unwrap();

    assert!(!second.cached);
    assert_eq!(backend.search_calls(), 2);
}

#[tokio::test]
async fn test_empty_result_keeps_every_enabled_facet() {
    let backend = Arc::new(StubBackend::new(empty_response()));
    let (service, catalog) = common::service(backend).await;

    let response = service.search(SearchRequest::new("unobtainium")).await.unwrap();

    assert_eq!(response.total.value, 0);
    assert!(response.hits.is_empty());
    assert_eq!(response.facets.len(), 5);
    assert!(response.facets.iter().all(|f| f.buckets.is_empty()));
    assert_eq!(catalog.lookup_count(), 0);
    assert!(!response.pagination.has_next);
}

#[tokio::test]
async fn test_facets_disabled_sends_no_aggregations() {
    let backend = Arc::new(StubBackend::new(red_shoes_response()));
    let (service, _) = common::service(backend.clone()).await;

    let response = service
        .search(SearchRequest::new("shoes").with_facets(false))
        .await
        .unwrap();

    assert!(response.facets.is_empty());
    assert!(backend.last_body().unwrap().get("aggs").is_none());
}

#[tokio::test]
async fn test_facets_only_requests_zero_hits() {
    let backend = Arc::new(StubBackend::new(red_shoes_response()));
    let (service, _) = common::service(backend.clone()).await;
    let ctx = service.new_context();

    let response = service
        .facets(SearchRequest::new("shoes").with_facets(false), &ctx)
        .await
        .unwrap();

    let body = backend.last_body().unwrap();
    assert_eq!(body["size"], 0);
    assert!(body["aggs"].is_object());
    assert_eq!(response.facets.len(), 5);
}

#[tokio::test]
async fn test_red_cluster_fails_fast_without_backend_calls() {
    let backend = Arc::new(StubBackend::new(red_shoes_response()));
    backend.set_status(ClusterStatus::Red);
    let (service, _) = common::service(backend.clone()).await;

    let err = tokio_test::assert_err!(service.search(red_shoes_request()).await);

    assert!(matches!(err, SearchError::Unavailable(_)));
    assert_eq!(backend.search_calls(), 0);
    assert!(!service.health().serving);
}

#[tokio::test]
async fn test_yellow_cluster_still_serves() {
    let backend = Arc::new(StubBackend::new(red_shoes_response()));
    backend.set_status(ClusterStatus::Yellow);
    let (service, _) = common::service(backend).await;

    let health = service.health();
    assert_eq!(health.connection.state, ConnectionState::Degraded);
    assert!(health.serving);
    tokio_test::assert_ok!(service.search(red_shoes_request()).await);
}

#[tokio::test]
async fn test_query_error_is_not_retried() {
    let backend = Arc::new(StubBackend::failing(SearchError::BackendQuery {
        error_type: "parsing_exception".to_string(),
        reason: "unknown query [mach]".to_string(),
        status: 400,
    }));
    let (service, _) = common::service(backend.clone()).await;

    let err = service.search(SearchRequest::new("shoes")).await.unwrap_err();

    assert!(matches!(err, SearchError::BackendQuery { status: 400, .. }));
    assert_eq!(backend.search_calls(), 1);
}

#[tokio::test]
async fn test_transient_error_is_retried_then_succeeds() {
    let backend = Arc::new(StubBackend::new(red_shoes_response()));
    backend.push(Err(SearchError::Connection("connection reset".to_string())));
    let (service, _) = common::service(backend.clone()).await;

    let response = service.search(SearchRequest::new("shoes")).await.unwrap();

    assert_eq!(response.total.value, 2);
    assert_eq!(backend.search_calls(), 2);
}

#[tokio::test]
async fn test_invalid_request_is_rejected_before_execution() {
    let backend = Arc::new(StubBackend::new(red_shoes_response()));
    let (service, _) = common::service(backend.clone()).await;

    let mut request = SearchRequest::new("shoes");
    request.limit = 0;
    assert!(matches!(
        service.search(request).await,
        Err(SearchError::Validation(_))
    ));

    let request = SearchRequest::new("shoes").with_price_range(Some(100.0), Some(10.0));
    assert!(matches!(
        service.search(request).await,
        Err(SearchError::Validation(_))
    ));

    assert_eq!(backend.search_calls(), 0);
}

#[tokio::test]
async fn test_incompatible_options_are_corrected_with_warnings() {
    let backend = Arc::new(StubBackend::new(red_shoes_response()));
    let (service, _) = common::service(backend).await;

    let mut request = SearchRequest::new("red shoes")
        .with_strategy(QueryStrategy::Phrase)
        .with_fuzzy(true);
    request.proximity = Some(50);

    let response = service.search(request).await.unwrap();

    assert_eq!(response.strategy, QueryStrategy::Phrase);
    assert_eq!(response.warnings.len(), 2);
}

#[tokio::test]
async fn test_expired_deadline_times_out() {
    let backend = Arc::new(StubBackend::new(red_shoes_response()));
    let (service, _) = common::service(backend).await;
    let ctx = RequestContext::new(Duration::ZERO);

    let err = service
        .search_with_context(SearchRequest::new("shoes"), &ctx)
        .await
        .unwrap_err();

    assert!(matches!(err, SearchError::Timeout(_)));
}

#[tokio::test]
async fn test_cancelled_request_stops() {
    let backend = Arc::new(StubBackend::new(red_shoes_response()));
    let (service, _) = common::service(backend).await;
    let ctx = service.new_context();
    ctx.cancel();

    let err = service
        .search_with_context(SearchRequest::new("shoes"), &ctx)
        .await
        .unwrap_err();

    assert!(matches!(err, SearchError::Cancelled));
}

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<SearchEvent>>,
}

#[async_trait]
impl AnalyticsSink for RecordingSink {
    async fn record(&self, event: SearchEvent) -> SearchResult<()> {
        self.events.lock().push(event);
        Ok(())
    }
}

#[tokio::test]
async fn test_each_search_emits_one_analytics_event() {
    let backend = Arc::new(StubBackend::new(red_shoes_response()));
    let sink = Arc::new(RecordingSink::default());
    let (emitter, handle) = AnalyticsEmitter::spawn(sink.clone(), 16);
    let service = SearchService::new(
        SearchConfig::default(),
        common::connect(backend).await,
        common::memory_cache(),
        Arc::new(common::catalog()),
        emitter,
    );

    service.search(red_shoes_request()).await.unwrap();
    service.search(red_shoes_request()).await.unwrap();
    drop(service);
    handle.await.unwrap();

    let events = sink.events.lock();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].query.as_deref(), Some("red shoes"));
    assert_eq!(events[0].result_count, 2);
    assert_eq!(events[0].filters_used, vec!["category", "price"]);
    assert!(!events[0].cache_hit);
    assert!(events[1].cache_hit);
}

#[tokio::test]
async fn test_plan_matches_executed_body() {
    let backend = Arc::new(StubBackend::new(red_shoes_response()));
    let (service, _) = common::service(backend.clone()).await;

    let plan = service.plan(red_shoes_request()).unwrap();
    service.search(red_shoes_request()).await.unwrap();

    assert_eq!(plan.body(), &backend.last_body().unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_compare_ranking_is_deterministic() {
    let backend = Arc::new(StubBackend::new(red_shoes_response()));
    let (service, _) = common::service(backend.clone()).await;
    let ctx = service.new_context();

    let first = service.compare("red shoes", &ctx).await.unwrap();
    let second = service.compare("red shoes", &ctx).await.unwrap();

    assert_eq!(first.runs.len(), COMPARISON_COMBOS.len());
    assert_eq!(first, second);
    let ranks: Vec<usize> = first.runs.iter().map(|r| r.rank).collect();
    assert_eq!(ranks, vec![1, 2, 3, 4, 5]);
    assert_eq!(first.recommended_strategy, Some(first.runs[0].strategy));
    assert_eq!(backend.search_calls(), 2 * COMPARISON_COMBOS.len());
}

#[tokio::test]
async fn test_compare_rejects_empty_query() {
    let backend = Arc::new(StubBackend::new(red_shoes_response()));
    let (service, _) = common::service(backend).await;
    let ctx = service.new_context();

    assert!(matches!(
        service.compare("   ", &ctx).await,
        Err(SearchError::Validation(_))
    ));
}

#[tokio::test]
async fn test_suggest_degrades_failed_sections() {
    let backend = Arc::new(StubBackend::failing(SearchError::BackendQuery {
        error_type: "index_not_found_exception".to_string(),
        reason: "no such index [search_queries]".to_string(),
        status: 404,
    }));
    let (service, _) = common::service(backend).await;
    let ctx = service.new_context();

    let response = service
        .suggest(&SuggestionRequest::new("sho"), &ctx)
        .await
        .unwrap();

    assert_eq!(response.query, "sho");
    assert!(response.products.is_empty());
    assert!(response.popular_queries.is_empty());
    assert_eq!(response.degraded.len(), 5);
}

#[tokio::test]
async fn test_suggest_blank_prefix_skips_backend() {
    let backend = Arc::new(StubBackend::new(empty_response()));
    let (service, _) = common::service(backend.clone()).await;
    let ctx = service.new_context();

    let response = service
        .suggest(&SuggestionRequest::new("  "), &ctx)
        .await
        .unwrap();

    assert!(response.degraded.is_empty());
    assert_eq!(backend.search_calls(), 0);
}
