//! Facet aggregations: request building and bucket transformation

use crate::search::catalog::CatalogStore;
use crate::search::config::{PriceRange, SearchConfig};
use crate::search::query::ACTIVE_FIELD;
use crate::search::request::{FacetKind, FacetOptions, FacetSpec, SearchFilters, SearchRequest};
use crate::search::response::{FacetBucket, FacetResult};
use crate::search::scoring::{IN_STOCK_FIELD, RATING_FIELD};
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

const FACET_PREFIX: &str = "facet_";
const GLOBAL_SCOPE: &str = "global_facets";
const GLOBAL_ACTIVE: &str = "active";

/// Rating floors offered by the rating facet, highest first
const RATING_FLOORS: [u32; 4] = [4, 3, 2, 1];

const STOCK_QUANTITY_FIELD: &str = "stock_quantity";

/// Availability buckets in presentation order
const AVAILABILITY_BUCKETS: [(&str, &str); 4] = [
    ("in_stock", "In stock"),
    ("out_of_stock", "Out of stock"),
    ("low_stock", "Low stock"),
    ("high_stock", "High stock"),
];

/// Builds facet aggregations and turns raw buckets into facet results
#[derive(Debug, Clone)]
pub struct AggregationEngine {
    price_ranges: Vec<PriceRange>,
    low_stock_threshold: u32,
    high_stock_threshold: u32,
}

impl AggregationEngine {
    pub fn new(config: &SearchConfig) -> Self {
        Self {
            price_ranges: config.price_ranges.clone(),
            low_stock_threshold: config.low_stock_threshold,
            high_stock_threshold: config.high_stock_threshold,
        }
    }

    /// Aggregation section for the enabled facets of `facets`.
    ///
    /// Returns an empty object when the request has facets turned off. With
    /// `global_counts` the facets are nested under a `global` scope narrowed
    /// to active products, so counts ignore the query and user filters.
    pub fn build_aggregations(&self, request: &SearchRequest, facets: &FacetOptions) -> Value {
        if !request.include_facets {
            return json!({});
        }

        let mut aggs = Map::new();
        for spec in facets.enabled_specs() {
            if let Some(agg) = self.facet_aggregation(spec) {
                aggs.insert(agg_name(spec), agg);
            }
        }

        if aggs.is_empty() {
            return json!({});
        }

        if facets.global_counts {
            json!({
                GLOBAL_SCOPE: {
                    "global": {},
                    "aggs": {
                        GLOBAL_ACTIVE: {
                            "filter": { "term": { ACTIVE_FIELD: true } },
                            "aggs": aggs
                        }
                    }
                }
            })
        } else {
            Value::Object(aggs)
        }
    }

    fn facet_aggregation(&self, spec: &FacetSpec) -> Option<Value> {
        let size = spec.size.max(1);
        let min_doc_count = spec.min_doc_count;

        let agg = match spec.kind {
            FacetKind::Category => json!({
                "nested": { "path": "categories" },
                "aggs": {
                    "scoped": {
                        "filter": {
                            "range": { "categories.level": { "lte": spec.hierarchy_depth.max(1) } }
                        },
                        "aggs": {
                            "values": {
                                "terms": {
                                    "field": "categories.id",
                                    "size": size,
                                    "min_doc_count": min_doc_count
                                },
                                "aggs": {
                                    "name": { "terms": { "field": "categories.name.keyword", "size": 1 } },
                                    "products": { "reverse_nested": {} }
                                }
                            }
                        }
                    }
                }
            }),
            FacetKind::Brand => json!({
                "terms": { "field": "brand_id", "size": size, "min_doc_count": min_doc_count },
                "aggs": {
                    "name": { "terms": { "field": "brand_name.keyword", "size": 1 } }
                }
            }),
            FacetKind::Tag => json!({
                "terms": { "field": "tags", "size": size, "min_doc_count": min_doc_count }
            }),
            FacetKind::Custom => {
                let field = spec.field.as_deref()?;
                json!({
                    "terms": { "field": field, "size": size, "min_doc_count": min_doc_count }
                })
            }
            FacetKind::Price => {
                let ranges: Vec<Value> = self
                    .price_ranges
                    .iter()
                    .map(|range| {
                        let mut entry = Map::new();
                        entry.insert("key".to_string(), json!(price_key(range)));
                        if let Some(from) = range.from {
                            entry.insert("from".to_string(), json!(from));
                        }
                        if let Some(to) = range.to {
                            entry.insert("to".to_string(), json!(to));
                        }
                        Value::Object(entry)
                    })
                    .collect();
                json!({ "range": { "field": "price", "ranges": ranges } })
            }
            FacetKind::Rating => {
                let ranges: Vec<Value> = RATING_FLOORS
                    .iter()
                    .map(|floor| json!({ "key": floor.to_string(), "from": *floor as f64 }))
                    .collect();
                json!({ "range": { "field": RATING_FIELD, "ranges": ranges } })
            }
            FacetKind::Availability => json!({
                "filters": {
                    "filters": {
                        "in_stock": { "term": { IN_STOCK_FIELD: true } },
                        "out_of_stock": { "term": { IN_STOCK_FIELD: false } },
                        "low_stock": {
                            "range": { STOCK_QUANTITY_FIELD: { "gt": 0, "lte": self.low_stock_threshold } }
                        },
                        "high_stock": {
                            "range": { STOCK_QUANTITY_FIELD: { "gt": self.high_stock_threshold } }
                        }
                    }
                }
            }),
        };

        Some(agg)
    }

    /// Convert raw aggregation output into facet results.
    ///
    /// Every enabled facet yields a result, with an empty bucket list when the
    /// backend returned nothing for it. Category and brand buckets are
    /// enriched with one catalog batch lookup per facet.
    pub async fn transform(
        &self,
        raw_aggregations: Option<&Value>,
        request: &SearchRequest,
        catalog: &dyn CatalogStore,
    ) -> Vec<FacetResult> {
        if !request.include_facets {
            return Vec::new();
        }

        let empty = Value::Null;
        let raw = raw_aggregations.unwrap_or(&empty);
        let scope = if request.facets.global_counts {
            &raw[GLOBAL_SCOPE][GLOBAL_ACTIVE]
        } else {
            raw
        };

        let mut results = Vec::new();
        for spec in request.facets.enabled_specs() {
            let agg = &scope[agg_name(spec)];
            let mut buckets = match spec.kind {
                FacetKind::Category => {
                    let raw_buckets = terms_buckets(&agg["scoped"]["values"], true);
                    self.enrich(raw_buckets, &request.filters.category_ids, catalog, FacetKind::Category)
                        .await
                }
                FacetKind::Brand => {
                    let raw_buckets = terms_buckets(agg, false);
                    self.enrich(raw_buckets, &request.filters.brand_ids, catalog, FacetKind::Brand)
                        .await
                }
                FacetKind::Tag => {
                    let active: HashSet<&str> =
                        request.filters.tags.iter().map(|s| s.trim()).collect();
                    terms_buckets(agg, false)
                        .into_iter()
                        .map(|b| {
                            let selected = active.contains(b.key.as_str());
                            b.into_bucket(None, selected)
                        })
                        .collect()
                }
                FacetKind::Custom => terms_buckets(agg, false)
                    .into_iter()
                    .map(|b| b.into_bucket(None, false))
                    .collect(),
                FacetKind::Price => self.price_buckets(agg, &request.filters),
                FacetKind::Rating => rating_buckets(agg, &request.filters),
                FacetKind::Availability => availability_buckets(agg, &request.filters),
            };

            buckets.retain(|bucket| bucket.count >= spec.min_doc_count);
            debug!(facet = %spec.key(), buckets = buckets.len(), "Facet transformed");

            results.push(FacetResult {
                name: spec.key(),
                kind: spec.kind,
                buckets,
            });
        }

        results
    }

    async fn enrich(
        &self,
        raw_buckets: Vec<RawTermsBucket>,
        active: &[String],
        catalog: &dyn CatalogStore,
        kind: FacetKind,
    ) -> Vec<FacetBucket> {
        if raw_buckets.is_empty() {
            return Vec::new();
        }

        let ids: Vec<String> = raw_buckets.iter().map(|b| b.key.clone()).collect();
        let lookup = match kind {
            FacetKind::Category => catalog.category_names(&ids).await,
            _ => catalog.brand_names(&ids).await,
        };
        let names = lookup.unwrap_or_else(|e| {
            warn!(facet = %kind, error = %e, "Catalog enrichment failed, using indexed names");
            HashMap::new()
        });

        let active: HashSet<&str> = active.iter().map(|s| s.trim()).collect();
        raw_buckets
            .into_iter()
            .map(|bucket| {
                let label = names.get(&bucket.key).cloned().or_else(|| bucket.name.clone());
                let selected = active.contains(bucket.key.as_str());
                bucket.into_bucket(label, selected)
            })
            .collect()
    }

    fn price_buckets(&self, agg: &Value, filters: &SearchFilters) -> Vec<FacetBucket> {
        let by_key = range_counts(agg);
        self.price_ranges
            .iter()
            .filter_map(|range| {
                let key = price_key(range);
                let count = *by_key.get(&key)?;
                Some(FacetBucket {
                    selected: same_bound(filters.price_min, range.from)
                        && same_bound(filters.price_max, range.to),
                    label: Some(price_label(range)),
                    key,
                    count,
                    from: range.from,
                    to: range.to,
                })
            })
            .collect()
    }
}

fn agg_name(spec: &FacetSpec) -> String {
    format!("{}{}", FACET_PREFIX, spec.key())
}

/// Intermediate terms bucket
struct RawTermsBucket {
    key: String,
    count: u64,
    name: Option<String>,
}

impl RawTermsBucket {
    fn into_bucket(self, label: Option<String>, selected: bool) -> FacetBucket {
        FacetBucket {
            key: self.key,
            count: self.count,
            label,
            selected,
            from: None,
            to: None,
        }
    }
}

/// Read `buckets` of a terms aggregation. Nested facets count parent
/// documents through their `products` reverse-nested sub-aggregation.
fn terms_buckets(agg: &Value, nested: bool) -> Vec<RawTermsBucket> {
    agg["buckets"]
        .as_array()
        .map(|buckets| {
            buckets
                .iter()
                .filter_map(|bucket| {
                    let key = bucket_key(bucket)?;
                    let count = if nested {
                        bucket["products"]["doc_count"]
                            .as_u64()
                            .or_else(|| bucket["doc_count"].as_u64())
                    } else {
                        bucket["doc_count"].as_u64()
                    }
                    .unwrap_or(0);
                    let name = bucket["name"]["buckets"][0]["key"]
                        .as_str()
                        .map(str::to_string);
                    Some(RawTermsBucket { key, count, name })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn bucket_key(bucket: &Value) -> Option<String> {
    if let Some(key) = bucket["key_as_string"].as_str() {
        return Some(key.to_string());
    }
    match &bucket["key"] {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        }),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// `key -> doc_count` for range aggregations (array or keyed form)
fn range_counts(agg: &Value) -> HashMap<String, u64> {
    match &agg["buckets"] {
        Value::Array(buckets) => buckets
            .iter()
            .filter_map(|b| Some((b["key"].as_str()?.to_string(), b["doc_count"].as_u64()?)))
            .collect(),
        Value::Object(buckets) => buckets
            .iter()
            .filter_map(|(key, b)| Some((key.clone(), b["doc_count"].as_u64()?)))
            .collect(),
        _ => HashMap::new(),
    }
}

fn rating_buckets(agg: &Value, filters: &SearchFilters) -> Vec<FacetBucket> {
    let by_key = range_counts(agg);
    RATING_FLOORS
        .iter()
        .filter_map(|floor| {
            let key = floor.to_string();
            let count = *by_key.get(&key)?;
            let from = *floor as f64;
            Some(FacetBucket {
                selected: filters.rating_min.map_or(false, |min| (min - from).abs() < 1e-9),
                label: Some(format!("{}★ & up", floor)),
                key,
                count,
                from: Some(from),
                to: None,
            })
        })
        .collect()
}

fn availability_buckets(agg: &Value, filters: &SearchFilters) -> Vec<FacetBucket> {
    let by_key = range_counts(agg);
    AVAILABILITY_BUCKETS
        .iter()
        .filter_map(|(key, label)| {
            let count = *by_key.get(*key)?;
            let selected = match *key {
                "in_stock" => filters.in_stock == Some(true),
                "out_of_stock" => filters.in_stock == Some(false),
                _ => false,
            };
            Some(FacetBucket {
                key: key.to_string(),
                count,
                label: Some(label.to_string()),
                selected,
                from: None,
                to: None,
            })
        })
        .collect()
}

fn same_bound(filter: Option<f64>, bound: Option<f64>) -> bool {
    match (filter, bound) {
        (None, None) => true,
        (Some(a), Some(b)) => (a - b).abs() < 1e-9,
        _ => false,
    }
}

fn format_amount(amount: f64) -> String {
    if amount.fract() == 0.0 {
        format!("{}", amount as i64)
    } else {
        format!("{:.2}", amount)
    }
}

/// Stable bucket key, `*` for an open bound: `*-25`, `25-50`, `500-*`
pub fn price_key(range: &PriceRange) -> String {
    let bound = |b: Option<f64>| b.map(format_amount).unwrap_or_else(|| "*".to_string());
    format!("{}-{}", bound(range.from), bound(range.to))
}

/// Human label derived only from the bounds
pub fn price_label(range: &PriceRange) -> String {
    match (range.from, range.to) {
        (None, Some(to)) => format!("Under ${}", format_amount(to)),
        (Some(from), None) => format!("${} & Above", format_amount(from)),
        (Some(from), Some(to)) => format!("${} - ${}", format_amount(from), format_amount(to)),
        (None, None) => "Any price".to_string(),
    }
}
