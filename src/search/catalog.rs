//! Catalog store: read-only display-name lookups for facet enrichment

use crate::search::error::{SearchError, SearchResult};
use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

/// Batch lookups against the canonical catalog. Missing ids are simply absent
/// from the returned map.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn category_names(&self, ids: &[String]) -> SearchResult<HashMap<String, String>>;

    async fn brand_names(&self, ids: &[String]) -> SearchResult<HashMap<String, String>>;
}

/// In-process catalog, also used in tests
#[derive(Default)]
pub struct InMemoryCatalog {
    categories: DashMap<String, String>,
    brands: DashMap<String, String>,
    lookups: AtomicUsize,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_category(self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.categories.insert(id.into(), name.into());
        self
    }

    pub fn with_brand(self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.brands.insert(id.into(), name.into());
        self
    }

    /// Number of batch lookups served so far
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }

    fn lookup(&self, table: &DashMap<String, String>, ids: &[String]) -> HashMap<String, String> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        ids.iter()
            .filter_map(|id| table.get(id).map(|name| (id.clone(), name.value().clone())))
            .collect()
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalog {
    async fn category_names(&self, ids: &[String]) -> SearchResult<HashMap<String, String>> {
        Ok(self.lookup(&self.categories, ids))
    }

    async fn brand_names(&self, ids: &[String]) -> SearchResult<HashMap<String, String>> {
        Ok(self.lookup(&self.brands, ids))
    }
}

#[derive(Debug, Deserialize)]
struct NamedEntity {
    id: serde_json::Value,
    name: String,
}

/// Catalog service reached over HTTP: `GET {base}/{resource}?ids=a,b,c`
/// answering `[{"id": .., "name": ..}]`.
#[derive(Clone)]
pub struct HttpCatalogStore {
    client: Client,
    base_url: String,
}

impl HttpCatalogStore {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> SearchResult<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            SearchError::InvalidConfiguration(format!("Failed to create HTTP client: {}", e))
        })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn fetch(&self, resource: &str, ids: &[String]) -> SearchResult<HashMap<String, String>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let url = format!("{}/{}", self.base_url, resource);
        debug!(url = %url, count = ids.len(), "Catalog batch lookup");

        let response = self
            .client
            .get(&url)
            .query(&[("ids", ids.join(","))])
            .send()
            .await
            .map_err(|e| SearchError::Catalog(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SearchError::Catalog(format!(
                "{} returned status {}",
                url,
                response.status()
            )));
        }

        let entities: Vec<NamedEntity> = response
            .json()
            .await
            .map_err(|e| SearchError::Catalog(format!("invalid catalog payload: {}", e)))?;

        Ok(entities
            .into_iter()
            .map(|entity| {
                let id = match entity.id {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                (id, entity.name)
            })
            .collect())
    }
}

#[async_trait]
impl CatalogStore for HttpCatalogStore {
    async fn category_names(&self, ids: &[String]) -> SearchResult<HashMap<String, String>> {
        self.fetch("categories", ids).await
    }

    async fn brand_names(&self, ids: &[String]) -> SearchResult<HashMap<String, String>> {
        self.fetch("brands", ids).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_lookup() {
        let catalog = InMemoryCatalog::new()
            .with_category("c1", "Shoes")
            .with_brand("b1", "Acme");

        let names = catalog
            .category_names(&["c1".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(names.len(), 1);
        assert_eq!(names["c1"], "Shoes");

        let brands = catalog.brand_names(&["b1".to_string()]).await.unwrap();
        assert_eq!(brands["b1"], "Acme");
        assert_eq!(catalog.lookup_count(), 2);
    }

    #[tokio::test]
    async fn test_http_store_batches_ids() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/categories")
            .match_query(mockito::Matcher::UrlEncoded("ids".into(), "1,2".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"id":1,"name":"Shoes"},{"id":"2","name":"Boots"}]"#)
            .expect(1)
            .create_async()
            .await;

        let store = HttpCatalogStore::new(server.url(), Duration::from_secs(2)).unwrap();
        let names = store
            .category_names(&["1".to_string(), "2".to_string()])
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(names["1"], "Shoes");
        assert_eq!(names["2"], "Boots");
    }

    #[tokio::test]
    async fn test_http_store_error_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/brands")
            .match_query(mockito::Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let store = HttpCatalogStore::new(server.url(), Duration::from_secs(2)).unwrap();
        let result = store.brand_names(&["b1".to_string()]).await;
        assert!(matches!(result, Err(SearchError::Catalog(_))));
    }
}
