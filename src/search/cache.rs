//! Result cache keyed by a canonical form of the request

use crate::search::error::{SearchError, SearchResult};
use crate::search::request::{
    FacetOptions, Pagination, QueryStrategy, ScoringOverrides, SearchMode, SearchRequest, SortKey,
};
use crate::search::response::SearchResponse;
use crate::search::query::sorted_unique;
use async_trait::async_trait;
use moka::future::Cache;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Bumped whenever the canonical key layout changes
const KEY_VERSION: &str = "v1";

/// Key-value store with per-entry TTL
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> SearchResult<Option<String>>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> SearchResult<()>;

    /// Backend name for logs and health output
    fn name(&self) -> &'static str;
}

/// In-process store on a moka future cache.
///
/// Moka applies one TTL to the whole cache, so the `ttl` passed to `set` is
/// only honoured up to the configured cache-wide TTL.
#[derive(Clone)]
pub struct MemoryCacheStore {
    cache: Cache<String, String>,
}

impl MemoryCacheStore {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> SearchResult<Option<String>> {
        Ok(self.cache.get(key).await)
    }

    async fn set(&self, key: &str, value: String, _ttl: Duration) -> SearchResult<()> {
        self.cache.insert(key.to_string(), value).await;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Redis-backed store using `SET key value EX ttl`
#[derive(Clone)]
pub struct RedisCacheStore {
    connection: ConnectionManager,
}

impl RedisCacheStore {
    pub async fn connect(redis_url: &str) -> SearchResult<Self> {
        let client = Client::open(redis_url).map_err(|e| {
            SearchError::CacheUnavailable(format!("Failed to create Redis client: {}", e))
        })?;

        let connection = ConnectionManager::new(client).await.map_err(|e| {
            SearchError::CacheUnavailable(format!("Failed to connect to Redis: {}", e))
        })?;

        let mut test_conn = connection.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut test_conn)
            .await
            .map_err(|e| {
                SearchError::CacheUnavailable(format!("Redis connection test failed: {}", e))
            })?;

        info!("Connected Redis result cache");
        Ok(Self { connection })
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> SearchResult<Option<String>> {
        let mut conn = self.connection.clone();
        conn.get(key)
            .await
            .map_err(|e| SearchError::CacheUnavailable(e.to_string()))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> SearchResult<()> {
        let mut conn = self.connection.clone();
        let _: () = conn
            .set_ex(key, value, ttl.as_secs().max(1))
            .await
            .map_err(|e| SearchError::CacheUnavailable(e.to_string()))?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

/// Canonical request form. Every field that affects the response is present,
/// with defaults resolved and set-like arrays sorted.
#[derive(Serialize)]
struct CanonicalRequest<'a> {
    q: Option<String>,
    strategy: QueryStrategy,
    mode: SearchMode,
    fuzzy: bool,
    proximity: Option<u32>,
    minimum_should_match: Option<u8>,
    category_ids: Vec<String>,
    brand_ids: Vec<String>,
    tags: Vec<String>,
    price_min: Option<f64>,
    price_max: Option<f64>,
    rating_min: Option<f64>,
    in_stock: Option<bool>,
    sort: SortKey,
    page: u32,
    limit: u32,
    include_facets: bool,
    facets: Option<&'a FacetOptions>,
    scoring: &'a ScoringOverrides,
    highlight: bool,
}

/// Normalize free text: trim and collapse inner whitespace. Case is kept
/// because boolean operators (`AND`, `OR`, `NOT`) are case-sensitive.
fn normalize_text(q: &str) -> Option<String> {
    let normalized = q.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

/// Deterministic cache key for a request and its resolved pagination.
///
/// Requests that differ only in filter array order, duplicate filter ids,
/// or surrounding whitespace share a key.
pub fn cache_key(prefix: &str, request: &SearchRequest, pagination: Pagination) -> String {
    let canonical = CanonicalRequest {
        q: request.q.as_deref().and_then(normalize_text),
        strategy: request.effective_strategy(),
        mode: request.effective_mode(),
        fuzzy: request.fuzzy,
        proximity: request.proximity,
        minimum_should_match: request.minimum_should_match,
        category_ids: sorted_unique(&request.filters.category_ids),
        brand_ids: sorted_unique(&request.filters.brand_ids),
        tags: sorted_unique(&request.filters.tags),
        price_min: request.filters.price_min,
        price_max: request.filters.price_max,
        rating_min: request.filters.rating_min,
        in_stock: request.filters.in_stock,
        sort: request.sort,
        page: pagination.page,
        limit: pagination.limit,
        include_facets: request.include_facets,
        facets: request.include_facets.then_some(&request.facets),
        scoring: &request.scoring,
        highlight: request.highlight,
    };

    // Serializing plain structs, vectors and a BTreeMap cannot fail
    let encoded = serde_json::to_vec(&canonical).unwrap_or_default();
    let digest = Sha256::digest(&encoded);
    format!("{}:{}:{:x}", prefix, KEY_VERSION, digest)
}

/// Cache front for search responses. Store failures degrade to a miss.
#[derive(Clone)]
pub struct SearchCache {
    store: Option<Arc<dyn CacheStore>>,
    ttl: Duration,
    prefix: String,
}

impl SearchCache {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration, prefix: impl Into<String>) -> Self {
        Self {
            store: Some(store),
            ttl,
            prefix: prefix.into(),
        }
    }

    /// A cache that never stores anything
    pub fn disabled() -> Self {
        Self {
            store: None,
            ttl: Duration::ZERO,
            prefix: String::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub fn store_name(&self) -> &'static str {
        self.store.as_ref().map_or("disabled", |store| store.name())
    }

    pub fn key_for(&self, request: &SearchRequest, pagination: Pagination) -> String {
        cache_key(&self.prefix, request, pagination)
    }

    pub async fn get(&self, key: &str) -> Option<SearchResponse> {
        let store = self.store.as_ref()?;
        match store.get(key).await {
            Ok(Some(payload)) => match serde_json::from_str(&payload) {
                Ok(response) => {
                    debug!(cache_key = %key, "Cache hit");
                    crate::metrics::CACHE_LOOKUPS.with_label_values(&["hit"]).inc();
                    Some(response)
                }
                Err(e) => {
                    warn!(cache_key = %key, error = %e, "Discarding undecodable cache entry");
                    crate::metrics::CACHE_LOOKUPS.with_label_values(&["error"]).inc();
                    None
                }
            },
            Ok(None) => {
                crate::metrics::CACHE_LOOKUPS.with_label_values(&["miss"]).inc();
                None
            }
            Err(e) => {
                warn!(cache_key = %key, error = %e, "Cache read failed, continuing without cache");
                crate::metrics::CACHE_LOOKUPS.with_label_values(&["error"]).inc();
                None
            }
        }
    }

    pub async fn put(&self, key: &str, response: &SearchResponse) {
        let Some(store) = self.store.as_ref() else {
            return;
        };

        let payload = match serde_json::to_string(response) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(cache_key = %key, error = %e, "Failed to encode response for cache");
                return;
            }
        };

        if let Err(e) = store.set(key, payload, self.ttl).await {
            warn!(cache_key = %key, error = %e, "Cache write failed");
            crate::metrics::CACHE_LOOKUPS.with_label_values(&["error"]).inc();
        }
    }
}
