//! Faceted product search over an Elasticsearch-class backend
//!
//! This module turns normalized search requests into backend queries,
//! executes them resiliently and converts raw aggregations into client-facing
//! facets:
//!
//! - **Query Building**: best-fields, phrase, prefix, fuzzy, wildcard and
//!   boolean strategies, optionally wrapped in a function-score envelope
//! - **Faceting**: category hierarchy, brand, price, rating, tag, availability
//!   and custom facets, with filtered or global counts
//! - **Resilience**: capped exponential backoff, health polling, per-request
//!   deadline and cancellation
//! - **Caching**: results keyed by a canonical form of the request
//! - **Tooling**: query analysis, strategy comparison and suggestions
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │              Search Service                      │
//! ├─────────────────────────────────────────────────┤
//! │  - search()   - facets()    - suggest()         │
//! │  - analyze()  - compare()   - plan()            │
//! └─────────────────────────────────────────────────┘
//!        │                │                 │
//!        ▼                ▼                 ▼
//! ┌──────────────┐ ┌──────────────┐ ┌──────────────┐
//! │ QueryBuilder │ │ Aggregation  │ │ SearchCache  │
//! │ QueryAnalyzer│ │ Engine       │ │ Analytics    │
//! └──────────────┘ └──────────────┘ └──────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────────────┐
//! │           Connection Manager                     │
//! ├─────────────────────────────────────────────────┤
//! │  - Retry with backoff     - Health polling      │
//! │  - Fail fast when red     - Deadline checks     │
//! └─────────────────────────────────────────────────┘
//!                      │
//!                      ▼
//!              SearchBackend (HTTP)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use catalog_search::search::{
//!     AnalyticsEmitter, ConnectionManager, HttpBackendSettings, HttpSearchBackend,
//!     InMemoryCatalog, RetryPolicy, SearchCache, SearchConfig, SearchRequest, SearchService,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = HttpSearchBackend::new(HttpBackendSettings {
//!         base_url: "http://localhost:9200".to_string(),
//!         username: None,
//!         password: None,
//!         request_timeout: Duration::from_secs(5),
//!     })?;
//!     let connection = Arc::new(ConnectionManager::new(
//!         Arc::new(backend),
//!         RetryPolicy::default(),
//!         Duration::from_secs(30),
//!     ));
//!     connection.connect().await?;
//!
//!     let service = SearchService::new(
//!         SearchConfig::default(),
//!         connection,
//!         SearchCache::disabled(),
//!         Arc::new(InMemoryCatalog::new()),
//!         AnalyticsEmitter::disabled(),
//!     );
//!
//!     let request = SearchRequest::new("red shoes").with_price_range(None, Some(1000.0));
//!     let response = service.search(request).await?;
//!     println!("Found {} products", response.total.value);
//!
//!     Ok(())
//! }
//! ```

mod aggregation;
mod analytics;
mod analyzer;
mod backend;
mod cache;
mod catalog;
mod config;
mod connection;
mod context;
mod error;
mod query;
mod request;
mod response;
mod scoring;
mod service;
mod suggest;

pub use aggregation::{price_key, price_label, AggregationEngine};
pub use analytics::{AnalyticsEmitter, AnalyticsSink, SearchEvent, TracingAnalyticsSink};
pub use analyzer::{
    operator_summary, Complexity, QueryAnalysis, QueryAnalyzer, StrategyComparison, StrategyRun,
    COMPARISON_COMBOS,
};
pub use backend::{
    classify_error_response, ClusterHealth, ClusterStatus, HttpBackendSettings, HttpSearchBackend,
    SearchBackend,
};
pub use cache::{cache_key, CacheStore, MemoryCacheStore, RedisCacheStore, SearchCache};
pub use catalog::{CatalogStore, HttpCatalogStore, InMemoryCatalog};
pub use config::{PriceRange, ScoringConfig, SearchConfig, SearchConfigBuilder};
pub use connection::{
    BackendRequest, ConnectionManager, ConnectionSnapshot, ConnectionState, HealthStatus,
    Operation, RetryPolicy,
};
pub use context::RequestContext;
pub use error::{SearchError, SearchResult};
pub use query::{build_filters, classify_tokens, default_boosts, QueryBuilder, QueryPlan, TokenRole};
pub use request::{
    FacetKind, FacetOptions, FacetSpec, Pagination, QueryStrategy, ScoringOverrides,
    SearchFilters, SearchMode, SearchRequest, SortKey,
};
pub use response::{
    parse_hits, parse_total, BrandRef, CategoryRef, FacetBucket, FacetResult, PaginationMeta,
    ProductSummary, SearchHit, SearchResponse, Timing, TotalHits,
};
pub use service::{SearchService, ServiceHealth};
pub use suggest::{
    Suggestion, SuggestionEngine, SuggestionKind, SuggestionRequest, SuggestionResponse,
};
