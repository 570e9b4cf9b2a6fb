//! Common test utilities for search integration tests
//!
//! Provides an in-process search backend with scripted responses and
//! helpers to assemble a `SearchService` around it.

#![allow(dead_code)]

use async_trait::async_trait;
use catalog_search::search::{
    AnalyticsEmitter, ClusterHealth, ClusterStatus, ConnectionManager, InMemoryCatalog,
    MemoryCacheStore, RetryPolicy, SearchBackend, SearchCache, SearchConfig, SearchError,
    SearchResult, SearchService,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// Backend answering from a queue of scripted search responses, falling
/// back to a fixed response once the queue is empty
pub struct StubBackend {
    status: Mutex<ClusterStatus>,
    queued: Mutex<VecDeque<SearchResult<Value>>>,
    fallback: Mutex<SearchResult<Value>>,
    requests: Mutex<Vec<(String, Value)>>,
}

impl StubBackend {
    pub fn new(fallback: Value) -> Self {
        Self {
            status: Mutex::new(ClusterStatus::Green),
            queued: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(Ok(fallback)),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: SearchError) -> Self {
        let backend = Self::new(Value::Null);
        *backend.fallback.lock() = Err(error);
        backend
    }

    pub fn set_status(&self, status: ClusterStatus) {
        *self.status.lock() = status;
    }

    pub fn push(&self, response: SearchResult<Value>) {
        self.queued.lock().push_back(response);
    }

    pub fn search_calls(&self) -> usize {
        self.requests.lock().len()
    }

    /// `(index, body)` of every search issued so far
    pub fn requests(&self) -> Vec<(String, Value)> {
        self.requests.lock().clone()
    }

    pub fn last_body(&self) -> Option<Value> {
        self.requests.lock().last().map(|(_, body)| body.clone())
    }
}

#[async_trait]
impl SearchBackend for StubBackend {
    async fn ping(&self) -> SearchResult<()> {
        Ok(())
    }

    async fn cluster_health(&self) -> SearchResult<ClusterHealth> {
        Ok(ClusterHealth {
            status: *self.status.lock(),
            cluster_name: "test".to_string(),
            number_of_nodes: 1,
        })
    }

    async fn search(&self, index: &str, body: &Value) -> SearchResult<Value> {
        self.requests.lock().push((index.to_string(), body.clone()));
        if let Some(response) = self.queued.lock().pop_front() {
            return response;
        }
        self.fallback.lock().clone()
    }

    async fn count(&self, _index: &str, _body: &Value) -> SearchResult<u64> {
        Ok(0)
    }
}

pub fn retry_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_delay: Duration::from_millis(10),
        multiplier: 2.0,
        max_delay: Duration::from_millis(50),
    }
}

pub fn catalog() -> InMemoryCatalog {
    InMemoryCatalog::new()
        .with_category("c-shoes", "Shoes")
        .with_category("c-running", "Running")
        .with_brand("b-acme", "Acme Footwear")
}

pub fn memory_cache() -> SearchCache {
    SearchCache::new(
        Arc::new(MemoryCacheStore::new(1_000, Duration::from_secs(60))),
        Duration::from_secs(60),
        "test",
    )
}

/// Connected manager over `backend`
pub async fn connect(backend: Arc<StubBackend>) -> Arc<ConnectionManager> {
    let connection = Arc::new(ConnectionManager::new(
        backend,
        retry_policy(),
        Duration::from_secs(30),
    ));
    connection.connect().await.unwrap();
    connection
}

/// Service with an in-memory cache, the test catalog and no analytics
pub async fn service(backend: Arc<StubBackend>) -> (SearchService, Arc<InMemoryCatalog>) {
    let catalog = Arc::new(catalog());
    let service = SearchService::new(
        SearchConfig::default(),
        connect(backend).await,
        memory_cache(),
        catalog.clone(),
        AnalyticsEmitter::disabled(),
    );
    (service, catalog)
}

/// Two red running shoes with a full set of facet aggregations
pub fn red_shoes_response() -> Value {
    json!({
        "took": 7,
        "timed_out": false,
        "hits": {
            "total": { "value": 2, "relation": "eq" },
            "max_score": 8.4,
            "hits": [
                {
                    "_id": "p-1",
                    "_score": 8.4,
                    "_source": {
                        "id": "p-1",
                        "title": "Red Trail Running Shoes",
                        "price": 89.99,
                        "brand": { "id": "b-acme", "name": "Acme" },
                        "categories": [
                            { "id": "c-shoes", "name": "Shoes", "level": 1 },
                            { "id": "c-running", "name": "Running", "level": 2 }
                        ],
                        "rating_average": 4.6,
                        "review_count": 210,
                        "in_stock": true,
                        "stock_quantity": 40
                    },
                    "highlight": { "title": ["<em>Red</em> Trail Running <em>Shoes</em>"] }
                },
                {
                    "_id": "p-2",
                    "_score": 6.1,
                    "_source": {
                        "id": 2,
                        "title": "Red Canvas Shoes",
                        "price": 24.5,
                        "categories": [{ "id": "c-shoes", "name": "Shoes", "level": 1 }],
                        "in_stock": false
                    }
                }
            ]
        },
        "aggregations": {
            "facet_category": {
                "doc_count": 3,
                "scoped": {
                    "doc_count": 3,
                    "values": {
                        "buckets": [
                            {
                                "key": "c-shoes",
                                "doc_count": 2,
                                "products": { "doc_count": 2 },
                                "name": { "buckets": [{ "key": "shoes", "doc_count": 2 }] }
                            },
                            {
                                "key": "c-running",
                                "doc_count": 1,
                                "products": { "doc_count": 1 },
                                "name": { "buckets": [{ "key": "running", "doc_count": 1 }] }
                            }
                        ]
                    }
                }
            },
            "facet_brand": {
                "buckets": [
                    { "key": "b-acme", "doc_count": 1, "name": { "buckets": [{ "key": "Acme" }] } },
                    { "key": "b-other", "doc_count": 1, "name": { "buckets": [{ "key": "Other Co" }] } }
                ]
            },
            "facet_price": {
                "buckets": [
                    { "key": "*-25", "to": 25.0, "doc_count": 1 },
                    { "key": "25-50", "from": 25.0, "to": 50.0, "doc_count": 0 },
                    { "key": "50-100", "from": 50.0, "to": 100.0, "doc_count": 1 },
                    { "key": "100-200", "from": 100.0, "to": 200.0, "doc_count": 0 },
                    { "key": "200-500", "from": 200.0, "to": 500.0, "doc_count": 0 },
                    { "key": "500-*", "from": 500.0, "doc_count": 0 }
                ]
            },
            "facet_rating": {
                "buckets": [
                    { "key": "4", "from": 4.0, "doc_count": 1 },
                    { "key": "3", "from": 3.0, "doc_count": 1 },
                    { "key": "2", "from": 2.0, "doc_count": 1 },
                    { "key": "1", "from": 1.0, "doc_count": 1 }
                ]
            },
            "facet_availability": {
                "buckets": {
                    "in_stock": { "doc_count": 1 },
                    "out_of_stock": { "doc_count": 1 },
                    "low_stock": { "doc_count": 0 },
                    "high_stock": { "doc_count": 1 }
                }
            }
        }
    })
}

pub fn empty_response() -> Value {
    json!({
        "took": 1,
        "hits": { "total": { "value": 0, "relation": "eq" }, "hits": [] }
    })
}
