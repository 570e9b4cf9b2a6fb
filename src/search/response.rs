//! Search response model and backend hit parsing

use crate::search::request::{FacetKind, Pagination, QueryStrategy, SearchMode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Brand projection on a hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrandRef {
    pub id: String,
    pub name: String,
}

/// Category projection on a hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub level: u32,
}

/// Denormalized product document as stored in the products index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSummary {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub sale_price: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub brand: Option<BrandRef>,
    #[serde(default)]
    pub categories: Vec<CategoryRef>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub rating_average: f64,
    #[serde(default)]
    pub review_count: u64,
    #[serde(default)]
    pub in_stock: bool,
    #[serde(default)]
    pub stock_quantity: u64,
    #[serde(default)]
    pub is_featured: bool,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

/// A single search result hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub product: ProductSummary,

    /// Relevance score (absent when sorting by a field)
    pub score: Option<f64>,

    /// Highlighted fragments by field
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub highlights: BTreeMap<String, Vec<String>>,
}

/// Total hit count; `exact` is false when the backend stopped counting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotalHits {
    pub value: u64,
    pub exact: bool,
}

/// One facet value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacetBucket {
    pub key: String,
    pub count: u64,

    /// Display name from the catalog, or a computed range label
    pub label: Option<String>,

    /// Bucket matches an active filter
    pub selected: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<f64>,
}

/// All buckets for one facet; `buckets` is always present, possibly empty
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacetResult {
    pub name: String,
    pub kind: FacetKind,
    pub buckets: Vec<FacetBucket>,
}

/// Pagination metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationMeta {
    pub page: u32,
    pub limit: u32,
    pub offset: u64,
    pub total_pages: u64,
    pub has_next: bool,
    pub has_previous: bool,
}

impl PaginationMeta {
    pub fn new(pagination: Pagination, total: u64) -> Self {
        let total_pages = if pagination.limit == 0 {
            0
        } else {
            total.div_ceil(pagination.limit as u64)
        };
        Self {
            page: pagination.page,
            limit: pagination.limit,
            offset: pagination.offset,
            total_pages,
            has_next: (pagination.page as u64) < total_pages,
            has_previous: pagination.page > 1,
        }
    }
}

/// Timing breakdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Timing {
    /// Time reported by the backend
    pub took_ms: u64,
    /// Wall-clock time inside the service
    pub total_ms: u64,
}

/// Search response with results and metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub hits: Vec<SearchHit>,
    pub total: TotalHits,
    pub facets: Vec<FacetResult>,
    pub pagination: PaginationMeta,
    pub strategy: QueryStrategy,
    pub mode: SearchMode,

    /// Served from the result cache
    pub cached: bool,

    pub timing: Timing,

    /// Auto-corrections applied to the request
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl SearchResponse {
    pub fn facet(&self, name: &str) -> Option<&FacetResult> {
        self.facets.iter().find(|facet| facet.name == name)
    }
}

/// Parse `hits.hits` from a raw backend response. Documents that do not match
/// the product projection are skipped.
pub fn parse_hits(raw: &Value) -> Vec<SearchHit> {
    raw["hits"]["hits"]
        .as_array()
        .map(|hits| {
            hits.iter()
                .filter_map(|hit| {
                    let product: ProductSummary =
                        match serde_json::from_value(hit["_source"].clone()) {
                            Ok(product) => product,
                            Err(e) => {
                                tracing::warn!(
                                    id = %hit["_id"],
                                    error = %e,
                                    "Skipping hit with unexpected document shape"
                                );
                                return None;
                            }
                        };
                    let highlights = hit["highlight"]
                        .as_object()
                        .map(|fields| {
                            fields
                                .iter()
                                .map(|(field, fragments)| {
                                    let fragments = fragments
                                        .as_array()
                                        .map(|f| {
                                            f.iter()
                                                .filter_map(|s| s.as_str().map(str::to_string))
                                                .collect()
                                        })
                                        .unwrap_or_default();
                                    (field.clone(), fragments)
                                })
                                .collect()
                        })
                        .unwrap_or_default();
                    Some(SearchHit {
                        product,
                        score: hit["_score"].as_f64(),
                        highlights,
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Parse `hits.total`, accepting both the object and legacy integer forms
pub fn parse_total(raw: &Value) -> TotalHits {
    let total = &raw["hits"]["total"];
    if let Some(value) = total.as_u64() {
        return TotalHits { value, exact: true };
    }
    TotalHits {
        value: total["value"].as_u64().unwrap_or(0),
        exact: total["relation"].as_str().map_or(true, |relation| relation == "eq"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw_response() -> Value {
        json!({
            "took": 4,
            "hits": {
                "total": { "value": 10000, "relation": "gte" },
                "max_score": 3.2,
                "hits": [
                    {
                        "_id": "1",
                        "_score": 3.2,
                        "_source": {
                            "id": 1,
                            "title": "Red running shoes",
                            "price": 89.9,
                            "brand": { "id": "b1", "name": "Acme" },
                            "in_stock": true
                        },
                        "highlight": { "title": ["<em>Red</em> running shoes"] }
                    },
                    { "_id": "2", "_score": 1.0, "_source": { "unexpected": true } }
                ]
            }
        })
    }

    #[test]
    fn test_parse_hits() {
        let hits = parse_hits(&raw_response());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].product.id, "1");
        assert_eq!(hits[0].score, Some(3.2));
        assert_eq!(hits[0].highlights["title"][0], "<em>Red</em> running shoes");
        assert_eq!(hits[0].product.brand.as_ref().unwrap().name, "Acme");
    }

    #[test]
    fn test_parse_total_relation() {
        assert_eq!(
            parse_total(&raw_response()),
            TotalHits { value: 10000, exact: false }
        );
        assert_eq!(
            parse_total(&json!({ "hits": { "total": 7 } })),
            TotalHits { value: 7, exact: true }
        );
        assert_eq!(parse_total(&json!({})), TotalHits { value: 0, exact: true });
    }

    #[test]
    fn test_pagination_meta() {
        let meta = PaginationMeta::new(Pagination { page: 2, limit: 20, offset: 20 }, 45);
        assert_eq!(meta.total_pages, 3);
        assert!(meta.has_next);
        assert!(meta.has_previous);

        let meta = PaginationMeta::new(Pagination { page: 1, limit: 0, offset: 0 }, 45);
        assert_eq!(meta.total_pages, 0);
        assert!(!meta.has_next);
    }
}
